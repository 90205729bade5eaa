use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::EntityId;

#[derive(Debug, Error, Diagnostic)]
pub enum XrefError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("reference cache requires a store handle")]
    MissingStore,

    #[error("unknown target database: {0}")]
    UnknownTargetDatabase(String),

    #[error("value for {attribute} exceeds store limit of {limit} characters: {value}")]
    ValueTooLong {
        attribute: String,
        value: String,
        limit: usize,
    },

    #[error("cross-reference {identifier} for entity {owner} was truncated by the store")]
    #[diagnostic(help("the store rejected {attribute}; shorten the value or widen the column"))]
    PersistenceTruncation {
        identifier: String,
        owner: EntityId,
        attribute: String,
        limit: usize,
    },

    #[error("probe timed out after {attempts} attempts: {url}")]
    ProbeTimeout { url: String, attempts: usize },

    #[error("probe request failed: {0}")]
    ProbeHttp(String),

    #[error("probe returned status {status}: {url}")]
    ProbeStatus { status: u16, url: String },

    #[error("prefix catalog request failed: {0}")]
    CatalogHttp(String),

    #[error("prefix catalog returned status {status}: {message}")]
    CatalogStatus { status: u16, message: String },

    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid identifier pattern: {0}")]
    InvalidPattern(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl XrefError {
    pub fn is_per_identifier(&self) -> bool {
        matches!(self, XrefError::UnknownTargetDatabase(_)) || self.is_probe_failure()
    }

    pub fn is_probe_failure(&self) -> bool {
        matches!(
            self,
            XrefError::ProbeTimeout { .. } | XrefError::ProbeStatus { .. } | XrefError::ProbeHttp(_)
        )
    }
}
