use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use metacatalog::config::{Config, ConfigLoader};
use metacatalog::error::CatalogError;

#[test]
fn explicit_config_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metacatalog.json");
    fs::write(
        &path,
        r#"{"store": "/srv/meta/catalog.json", "data_root": "/mnt/data", "log_level": "debug"}"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.schema_version, 1);
    assert_eq!(resolved.store, Utf8PathBuf::from("/srv/meta/catalog.json"));
    assert_eq!(resolved.data_root, Utf8PathBuf::from("/mnt/data"));
    assert_eq!(resolved.log_level, "debug");
}

#[test]
fn explicit_missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CatalogError::ConfigRead(missing)) if missing == path
    );
}

#[test]
fn malformed_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("metacatalog.json");
    fs::write(&path, "{ store = 1 }").unwrap();
    assert_matches!(
        ConfigLoader::resolve(path.to_str()),
        Err(CatalogError::ConfigParse(_))
    );
}

#[test]
fn store_only_config_derives_the_data_root() {
    let config = Config {
        store: Some(Utf8PathBuf::from("catalogs/main.json")),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config).unwrap();
    assert_eq!(resolved.data_root, Utf8PathBuf::from("catalogs/data"));
}
