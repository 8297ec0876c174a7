use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("metadata missing: {0}")]
    MetadataMissing(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("group type mismatch: expected {expected}, found {found}")]
    GroupTypeMismatch { expected: String, found: String },

    #[error("invalid UUID: {0}")]
    InvalidUuid(String),

    #[error("invalid group type: {0}")]
    InvalidGroupType(String),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("record already exists: {0}")]
    DuplicateRecord(String),

    #[error("invalid filter pattern: {0}")]
    InvalidPattern(String),

    #[error("missing config file metacatalog.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("data read failed: {0}")]
    DataRead(String),
}

impl CatalogError {
    pub fn not_found(kind: &'static str, key: impl ToString) -> Self {
        CatalogError::NotFound {
            kind,
            key: key.to_string(),
        }
    }
}
