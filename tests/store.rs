use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;

use metacatalog::add::{NewEntry, NewPerson, add_entry, add_person};
use metacatalog::error::CatalogError;
use metacatalog::store::{EntityStore, Store};

fn catalog_path(dir: &tempfile::TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().join("nested").join("catalog.json")).unwrap()
}

#[test]
fn catalog_persists_between_opens() {
    let dir = tempfile::tempdir().unwrap();
    let path = catalog_path(&dir);

    let mut store = Store::open(&path).unwrap();
    assert!(store.catalog().entries.is_empty());
    store.populate_defaults().unwrap();
    let person = add_person(
        &mut store,
        NewPerson {
            last_name: Some("Lovelace".to_string()),
            ..NewPerson::default()
        },
    )
    .unwrap();
    let entry = add_entry(&mut store, NewEntry::new("Engine log", person.id, "air temperature")).unwrap();
    assert!(path.as_std_path().exists());

    let reopened = Store::open(&path).unwrap();
    assert_eq!(reopened.path(), Some(path.as_path()));
    let loaded = reopened.get_entry(entry.id).unwrap();
    assert_eq!(loaded.uuid, entry.uuid);
    assert_eq!(loaded.checksum, entry.checksum);
    assert_eq!(loaded.variable.unit.symbol, "C");
    assert_eq!(reopened.catalog().group_types.len(), 4);
}

#[test]
fn failed_transaction_leaves_the_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = catalog_path(&dir);
    let mut store = Store::open(&path).unwrap();
    store.populate_defaults().unwrap();
    let before = fs::read(path.as_std_path()).unwrap();

    let result = add_entry(&mut store, NewEntry::new("Orphan", "Nobody", "discharge"));
    assert_matches!(result, Err(CatalogError::NotFound { kind: "person", .. }));
    assert_eq!(fs::read(path.as_std_path()).unwrap(), before);
    assert!(store.catalog().entries.is_empty());
}

#[test]
fn populate_defaults_is_idempotent() {
    let mut store = Store::in_memory();
    let roles = store.catalog().roles.len();
    let licenses = store.catalog().licenses.len();
    store.populate_defaults().unwrap();
    assert_eq!(store.catalog().roles.len(), roles);
    assert_eq!(store.catalog().licenses.len(), licenses);
}

#[test]
fn unreadable_catalog_is_a_serialization_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = catalog_path(&dir);
    fs::create_dir_all(path.parent().unwrap().as_std_path()).unwrap();
    fs::write(path.as_std_path(), "not json").unwrap();
    assert_matches!(Store::open(&path), Err(CatalogError::Serialization(_)));
}
