use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheMode, default_tracked_classes};
use crate::domain::EntityId;
use crate::error::XrefError;
use crate::probe::ProbeSettings;
use crate::resolver::ResolverSettings;

pub const DEFAULT_CONFIG_FILE: &str = "kira-xref.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub author: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default)]
    pub cache_mode: Option<CacheMode>,
    #[serde(default)]
    pub tracked_classes: Option<Vec<String>>,
    #[serde(default)]
    pub probe: Option<ProbeSettings>,
    #[serde(default)]
    pub kegg: Option<ResolverSettings>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub author: EntityId,
    pub note: String,
    pub dry_run: bool,
    pub workers: usize,
    pub cache_mode: CacheMode,
    pub tracked_classes: Vec<String>,
    pub probe: Option<ProbeSettings>,
    pub kegg: ResolverSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, XrefError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| XrefError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| XrefError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, XrefError> {
        let author = config
            .author
            .as_deref()
            .ok_or_else(|| XrefError::Configuration("author is required".to_string()))?
            .parse::<EntityId>()?;

        let tracked_classes = config
            .tracked_classes
            .filter(|classes| !classes.is_empty())
            .unwrap_or_else(default_tracked_classes);

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            author,
            note: config.note.unwrap_or_else(default_note),
            dry_run: config.dry_run,
            workers: config.workers.unwrap_or_else(default_workers).max(1),
            cache_mode: config.cache_mode.unwrap_or_default(),
            tracked_classes,
            probe: config.probe,
            kegg: config.kegg.unwrap_or_default(),
        })
    }
}

pub fn default_note() -> String {
    "kira-xref cross-reference update".to_string()
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}
