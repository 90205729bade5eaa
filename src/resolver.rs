use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::ReferenceCache;
use crate::creator::{NewDatabase, ReferenceCreator};
use crate::domain::EntityId;
use crate::error::XrefError;

pub const ID_PLACEHOLDER: &str = "###ID###";
pub const PREFIX_PLACEHOLDER: &str = "###PREFIX###";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    #[serde(default = "default_base_name")]
    pub base_name: String,
    #[serde(default = "default_fixed_buckets")]
    pub fixed_buckets: BTreeMap<String, String>,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_access_url")]
    pub access_url: String,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            base_name: default_base_name(),
            fixed_buckets: default_fixed_buckets(),
            url: default_url(),
            access_url: default_access_url(),
        }
    }
}

fn default_base_name() -> String {
    "KEGG Gene".to_string()
}

pub fn default_fixed_buckets() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("vg".to_string(), "KEGG Gene (Viruses)".to_string()),
        ("ag".to_string(), "KEGG Gene (Addendum)".to_string()),
    ])
}

fn default_url() -> String {
    "https://www.genome.jp/kegg/genes.html".to_string()
}

fn default_access_url() -> String {
    format!("https://www.genome.jp/dbget-bin/www_bget?{PREFIX_PLACEHOLDER}:{ID_PLACEHOLDER}")
}

#[derive(Debug, Clone, Default)]
pub struct PrefixCatalog {
    names: HashMap<String, String>,
}

impl PrefixCatalog {
    pub fn from_pairs<I, P, N>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, N)>,
        P: Into<String>,
        N: Into<String>,
    {
        Self {
            names: pairs
                .into_iter()
                .map(|(prefix, name)| (prefix.into(), name.into()))
                .collect(),
        }
    }

    pub fn parse(listing: &str) -> Self {
        let mut names = HashMap::new();
        for line in listing.lines() {
            let columns = line.split('\t').map(str::trim).collect::<Vec<_>>();
            let (prefix, name) = match columns.as_slice() {
                [_, prefix, name, ..] => (*prefix, *name),
                [prefix, name] => (*prefix, *name),
                _ => continue,
            };
            if prefix.is_empty() || name.is_empty() {
                continue;
            }
            names.insert(prefix.to_string(), display_species(name).to_string());
        }
        Self { names }
    }

    pub fn species_name(&self, prefix: &str) -> Option<&str> {
        self.names.get(prefix).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn display_species(name: &str) -> &str {
    match name.find(" (") {
        Some(index) if name.ends_with(')') => name[..index].trim(),
        _ => name,
    }
}

pub trait CatalogSource: Send + Sync {
    fn fetch_listing(&self) -> Result<String, XrefError>;
}

#[derive(Clone)]
pub struct KeggCatalogHttpClient {
    client: Client,
    url: String,
}

impl KeggCatalogHttpClient {
    pub fn new() -> Result<Self, XrefError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("kira-xref/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| XrefError::CatalogHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| XrefError::CatalogHttp(err.to_string()))?;
        Ok(Self {
            client,
            url: "https://rest.kegg.jp/list/organism".to_string(),
        })
    }
}

impl CatalogSource for KeggCatalogHttpClient {
    fn fetch_listing(&self) -> Result<String, XrefError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| XrefError::CatalogHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "organism listing request failed".to_string());
            return Err(XrefError::CatalogStatus { status, message });
        }
        response
            .text()
            .map_err(|err| XrefError::CatalogHttp(err.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved {
        database: String,
        identifier: String,
    },
    Pending {
        prefix: String,
        species: String,
        database: String,
        identifier: String,
    },
    Unresolved {
        raw: String,
        reason: String,
    },
}

impl Resolution {
    pub fn identifier(&self) -> &str {
        match self {
            Resolution::Resolved { identifier, .. } | Resolution::Pending { identifier, .. } => {
                identifier
            }
            Resolution::Unresolved { raw, .. } => raw,
        }
    }
}

pub fn split_prefix(raw: &str) -> Option<(&str, &str)> {
    let (prefix, rest) = raw.trim().split_once(':')?;
    let valid = !prefix.is_empty()
        && !rest.is_empty()
        && prefix.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    valid.then_some((prefix, rest))
}

pub struct DynamicResolver {
    cache: Arc<ReferenceCache>,
    catalog: PrefixCatalog,
    settings: ResolverSettings,
    create_lock: Mutex<()>,
}

impl DynamicResolver {
    pub fn new(cache: Arc<ReferenceCache>, catalog: PrefixCatalog, settings: ResolverSettings) -> Self {
        info!(prefixes = catalog.len(), "prefix catalog loaded");
        Self {
            cache,
            catalog,
            settings,
            create_lock: Mutex::new(()),
        }
    }

    pub fn from_source(
        cache: Arc<ReferenceCache>,
        source: &dyn CatalogSource,
        settings: ResolverSettings,
    ) -> Result<Self, XrefError> {
        let listing = source.fetch_listing()?;
        Ok(Self::new(cache, PrefixCatalog::parse(&listing), settings))
    }

    pub fn prefix_alias(&self, prefix: &str) -> String {
        format!("{} ({prefix})", self.settings.base_name)
    }

    pub fn species_database(&self, species: &str) -> String {
        format!("{} ({species})", self.settings.base_name)
    }

    pub fn access_url(&self, prefix: &str) -> String {
        self.settings.access_url.replace(PREFIX_PLACEHOLDER, prefix)
    }

    pub fn peek(&self, raw: &str) -> Resolution {
        let Some((prefix, identifier)) = split_prefix(raw) else {
            return Resolution::Unresolved {
                raw: raw.to_string(),
                reason: "identifier has no database prefix".to_string(),
            };
        };

        if let Some(database) = self.settings.fixed_buckets.get(prefix) {
            return Resolution::Resolved {
                database: database.clone(),
                identifier: identifier.to_string(),
            };
        }

        let species = self.catalog.species_name(prefix);
        if let Some(database) = self.known_database(prefix, species) {
            return Resolution::Resolved {
                database,
                identifier: identifier.to_string(),
            };
        }

        match species {
            Some(species) => Resolution::Pending {
                prefix: prefix.to_string(),
                species: species.to_string(),
                database: self.species_database(species),
                identifier: identifier.to_string(),
            },
            None => Resolution::Unresolved {
                raw: raw.to_string(),
                reason: format!("no species known for prefix {prefix}"),
            },
        }
    }

    /// The result is never `Pending`.
    pub fn resolve(
        &self,
        raw: &str,
        creator: &ReferenceCreator,
        author: EntityId,
    ) -> Result<Resolution, XrefError> {
        let first = self.peek(raw);
        if !matches!(first, Resolution::Pending { .. }) {
            return Ok(first);
        }

        let _guard = self.create_lock.lock();
        let second = self.peek(raw);
        let Resolution::Pending {
            prefix,
            database,
            identifier,
            ..
        } = second
        else {
            debug!(raw, "database appeared while waiting for resolver lock");
            return Ok(second);
        };

        let access_url = self.access_url(&prefix);
        creator.create_database(
            &NewDatabase {
                names: vec![database.clone(), self.prefix_alias(&prefix)],
                url: Some(self.settings.url.clone()),
                access_url: Some(access_url),
            },
            author,
        )?;
        Ok(Resolution::Resolved {
            database,
            identifier,
        })
    }

    fn known_database(&self, prefix: &str, species: Option<&str>) -> Option<String> {
        let databases = self.cache.database_names_to_ids();
        let id = databases
            .id(&self.prefix_alias(prefix))
            .or_else(|| species.and_then(|species| databases.id(&self.species_database(species))))?;
        databases.primary_name(id).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_listing() {
        let catalog = PrefixCatalog::parse(
            "T01001\thsa\tHomo sapiens (human)\tEukaryotes;Animals;Vertebrates;Mammals\n\
             T01002\tptr\tPan troglodytes (chimpanzee)\tEukaryotes;Animals\n\
             eco\tEscherichia coli K-12 MG1655\n\
             garbage\n",
        );
        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.species_name("hsa"), Some("Homo sapiens"));
        assert_eq!(catalog.species_name("eco"), Some("Escherichia coli K-12 MG1655"));
        assert_eq!(catalog.species_name("garbage"), None);
    }

    #[test]
    fn prefix_split() {
        assert_eq!(split_prefix("hsa:7157"), Some(("hsa", "7157")));
        assert_eq!(split_prefix("vg:155971"), Some(("vg", "155971")));
        assert_eq!(split_prefix("7157"), None);
        assert_eq!(split_prefix(":7157"), None);
        assert_eq!(split_prefix("hsa:"), None);
    }
}
