use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::store::Store;

pub const CONFIG_FILE: &str = "metacatalog.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub store: Option<Utf8PathBuf>,
    #[serde(default)]
    pub data_root: Option<Utf8PathBuf>,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub store: Utf8PathBuf,
    pub data_root: Utf8PathBuf,
    pub log_level: String,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `metacatalog.json` in the working directory when no
    /// path is given. Only an explicitly named file has to exist.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, CatalogError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| CatalogError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| CatalogError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, CatalogError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let store = match config.store {
            Some(store) => store,
            None => Store::default_path()?,
        };
        let data_root = config.data_root.unwrap_or_else(|| default_data_root(&store));

        Ok(ResolvedConfig {
            schema_version,
            store,
            data_root,
            log_level: config.log_level.unwrap_or_else(|| "info".to_string()),
        })
    }
}

pub fn default_data_root(store: &Utf8PathBuf) -> Utf8PathBuf {
    store
        .parent()
        .map(|parent| parent.join("data"))
        .unwrap_or_else(|| Utf8PathBuf::from("data"))
}
