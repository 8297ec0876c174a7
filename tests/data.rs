use std::collections::HashMap;
use std::fs;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::{Map, Value, json};

use metacatalog::add::{NewEntry, NewPerson, add_entry, add_group, add_person, create_datasource, make_composite};
use metacatalog::app::App;
use metacatalog::data::{DataFilter, DataReader, FileDataReader, Payload, Table};
use metacatalog::domain::{DataSourceKind, Entry, Lookup, RecordId, parse_timestamp};
use metacatalog::error::CatalogError;
use metacatalog::results::{DataSet, ResultSet};
use metacatalog::store::{EntityStore, Store};

#[derive(Default)]
struct MockReader {
    payloads: HashMap<String, Payload>,
}

impl MockReader {
    fn with(mut self, title: &str, payload: Payload) -> Self {
        self.payloads.insert(title.to_string(), payload);
        self
    }
}

impl DataReader for MockReader {
    fn read(&self, entry: &Entry, filter: &DataFilter) -> Result<Payload, CatalogError> {
        match self.payloads.get(&entry.title) {
            Some(Payload::Table(table)) => Ok(Payload::Table(table.filter_range(filter.start, filter.end))),
            Some(payload) => Ok(payload.clone()),
            None => Err(CatalogError::MetadataMissing(format!("no data for {}", entry.title))),
        }
    }
}

fn ts(value: &str) -> DateTime<Utc> {
    parse_timestamp(value).unwrap()
}

fn series(start: &str, rows: usize, step: TimeDelta, column: &str) -> Table {
    let first = ts(start);
    let index = (0..rows).map(|i| first + step * i as i32).collect();
    let values = (0..rows).map(|i| Some(i as f64)).collect();
    Table::new(index).with_column(column, values).unwrap()
}

fn catalog_with(titles: &[&str]) -> (Store, Vec<RecordId>) {
    let mut store = Store::in_memory();
    let person = add_person(
        &mut store,
        NewPerson {
            last_name: Some("Hydro".to_string()),
            ..NewPerson::default()
        },
    )
    .unwrap();
    let ids = titles
        .iter()
        .map(|title| {
            let entry = add_entry(&mut store, NewEntry::new(*title, person.id, "discharge")).unwrap();
            create_datasource(&mut store, entry.id, DataSourceKind::Internal, &format!("{}.json", entry.id), Map::new())
                .unwrap();
            entry.id
        })
        .collect();
    (store, ids)
}

#[test]
fn composite_merges_on_the_index() {
    let (mut store, ids) = catalog_with(&["Temperature", "Humidity"]);
    let group = make_composite(&mut store, ids[0], &[ids[1]], None, None).unwrap();
    let reader = MockReader::default()
        .with("Temperature", Payload::Table(series("2020-01-01", 10, TimeDelta::hours(1), "temp")))
        .with("Humidity", Payload::Table(series("2020-01-01 02:00:00", 10, TimeDelta::hours(1), "humidity")));

    let set = ResultSet::from_group(&store, group).unwrap();
    let data = set.get_data(&reader, false, &DataFilter::default()).unwrap();
    let table = data.table().unwrap();

    assert_eq!(table.len(), 12);
    assert_eq!(table.column_names(), vec!["temp", "humidity"]);
    assert_eq!(table.value("temp", ts("2020-01-01 11:00:00")), None);
    assert_eq!(table.value("humidity", ts("2020-01-01 00:00:00")), None);
    assert_eq!(table.value("humidity", ts("2020-01-01 11:00:00")), Some(9.0));
}

#[test]
fn split_dataset_concatenates() {
    let (mut store, ids) = catalog_with(&["Part one", "Part two"]);
    let group = add_group(&mut store, &Lookup::from("Split dataset"), &ids, None, None).unwrap();
    let reader = MockReader::default()
        .with("Part one", Payload::Table(series("2020-01-01", 100, TimeDelta::minutes(144), "q")))
        .with("Part two", Payload::Table(series("2020-01-11", 100, TimeDelta::minutes(144), "q")));

    let set = ResultSet::from_group(&store, group).unwrap();
    let data = set.get_data(&reader, false, &DataFilter::default()).unwrap();
    let table = data.table().unwrap();

    assert_eq!(table.len(), 200);
    assert_eq!(table.column_names(), vec!["q"]);
    assert_eq!(table.index()[0], ts("2020-01-01"));
    assert_eq!(table.index()[199], ts("2020-01-21") - TimeDelta::minutes(144));
}

#[test]
fn nested_split_is_concatenated_before_the_merge() {
    let (mut store, ids) = catalog_with(&["Old", "Recent", "Rain"]);
    add_group(&mut store, &Lookup::from("Split dataset"), &ids[..2], None, None).unwrap();
    let composite = make_composite(&mut store, ids[0], &ids[1..], None, None).unwrap();
    let reader = MockReader::default()
        .with("Old", Payload::Table(series("2020-01-01", 24, TimeDelta::hours(1), "q")))
        .with("Recent", Payload::Table(series("2020-01-02", 24, TimeDelta::hours(1), "q")))
        .with("Rain", Payload::Table(series("2020-01-01", 48, TimeDelta::hours(1), "p")));

    let set = ResultSet::from_group(&store, composite).unwrap();
    let data = set.get_data(&reader, false, &DataFilter::default()).unwrap();
    let table = data.table().unwrap();

    assert_eq!(table.len(), 48);
    assert_eq!(table.column_names(), vec!["q", "q_1", "q_2", "p"]);
    assert_eq!(table.value("q_1", ts("2020-01-02 05:00:00")), Some(5.0));
}

#[test]
fn ungrouped_members_are_returned_as_is() {
    let (store, ids) = catalog_with(&["Single"]);
    let entry = store.get_entry(ids[0]).unwrap();
    let reader = MockReader::default().with("Single", Payload::Table(series("2020-01-01", 5, TimeDelta::days(1), "q")));
    let set = ResultSet::from_entry(&store, &entry).unwrap();

    let data = set.get_data(&reader, false, &DataFilter::default()).unwrap();
    assert_matches!(&data, DataSet::Members(members) if members.len() == 1 && members[0].0 == entry.checksum);

    let merged = set.get_data(&reader, true, &DataFilter::default()).unwrap();
    assert_eq!(merged.table().map(Table::len), Some(5));
}

#[test]
fn members_without_data_are_skipped() {
    let (mut store, ids) = catalog_with(&["Has data", "Lost data"]);
    let group = make_composite(&mut store, ids[0], &[ids[1]], None, None).unwrap();
    let reader = MockReader::default().with("Has data", Payload::Table(series("2020-01-01", 3, TimeDelta::hours(1), "q")));

    let set = ResultSet::from_group(&store, group).unwrap();
    let data = set.get_data(&reader, false, &DataFilter::default()).unwrap();
    assert_eq!(data.table().map(Table::len), Some(3));
}

#[test]
fn raw_payloads_stay_unmerged() {
    let (mut store, ids) = catalog_with(&["Table", "Document"]);
    let group = make_composite(&mut store, ids[0], &[ids[1]], None, None).unwrap();
    let reader = MockReader::default()
        .with("Table", Payload::Table(series("2020-01-01", 3, TimeDelta::hours(1), "q")))
        .with("Document", Payload::Raw(json!({"station": "GS-12"})));

    let set = ResultSet::from_group(&store, group).unwrap();
    match set.get_data(&reader, false, &DataFilter::default()).unwrap() {
        DataSet::Combined { table, unmerged } => {
            assert_eq!(table.map(|t| t.len()), Some(3));
            assert_eq!(unmerged.len(), 1);
            assert_eq!(unmerged[0].1, Payload::Raw(json!({"station": "GS-12"})));
        }
        other => panic!("expected combined data, got {other:?}"),
    }
}

#[test]
fn filters_reach_the_reader() {
    let (mut store, ids) = catalog_with(&["Part one", "Part two"]);
    let group = add_group(&mut store, &Lookup::from("Split dataset"), &ids, None, None).unwrap();
    let reader = MockReader::default()
        .with("Part one", Payload::Table(series("2020-01-01", 10, TimeDelta::days(1), "q")))
        .with("Part two", Payload::Table(series("2020-01-11", 10, TimeDelta::days(1), "q")));
    let filter = DataFilter {
        start: Some(ts("2020-01-09")),
        end: Some(ts("2020-01-12")),
    };

    let set = ResultSet::from_group(&store, group).unwrap();
    let data = set.get_data(&reader, false, &filter).unwrap();
    assert_eq!(data.table().map(Table::len), Some(4));
}

#[test]
fn file_reader_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let (store, ids) = catalog_with(&["Stored"]);
    let entry = store.get_entry(ids[0]).unwrap();
    let reader = FileDataReader::new(root.clone());

    let table = series("2020-01-01", 6, TimeDelta::hours(1), "q");
    let path = reader.import_data(&entry, &table).unwrap();
    assert!(path.starts_with(&root));

    let payload = reader.read(&entry, &DataFilter::default()).unwrap();
    assert_eq!(payload, Payload::Table(table));

    let filtered = reader
        .read(
            &entry,
            &DataFilter {
                start: Some(ts("2020-01-01 04:00:00")),
                end: None,
            },
        )
        .unwrap();
    assert_eq!(filtered.as_table().map(Table::len), Some(2));
}

#[test]
fn file_reader_returns_raw_documents() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let (store, ids) = catalog_with(&["Document"]);
    let entry = store.get_entry(ids[0]).unwrap();
    fs::write(root.join(format!("{}.json", entry.id)), r#"{"station": "GS-12"}"#).unwrap();

    let payload = FileDataReader::new(root).read(&entry, &DataFilter::default()).unwrap();
    assert_eq!(payload, Payload::Raw(json!({"station": "GS-12"})));
}

#[test]
fn file_reader_honours_the_index_argument() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let mut store = Store::in_memory();
    let person = add_person(
        &mut store,
        NewPerson {
            last_name: Some("Hydro".to_string()),
            ..NewPerson::default()
        },
    )
    .unwrap();
    let entry = add_entry(&mut store, NewEntry::new("Custom index", person.id, "discharge")).unwrap();
    let mut args = Map::new();
    args.insert("index".to_string(), Value::String("date".to_string()));
    let entry = create_datasource(&mut store, entry.id, DataSourceKind::Local, "custom.json", args).unwrap();
    fs::write(
        root.join("custom.json"),
        r#"[{"date": "2020-01-01", "q": 1.5}, {"date": "2020-01-02", "q": null}]"#,
    )
    .unwrap();

    let payload = FileDataReader::new(root).read(&entry, &DataFilter::default()).unwrap();
    let table = payload.as_table().unwrap();
    assert_eq!(table.len(), 2);
    assert_eq!(table.column("q").unwrap().values, vec![Some(1.5), None]);
}

#[test]
fn file_reader_errors() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let mut store = Store::in_memory();
    let person = add_person(
        &mut store,
        NewPerson {
            last_name: Some("Hydro".to_string()),
            ..NewPerson::default()
        },
    )
    .unwrap();
    let bare = add_entry(&mut store, NewEntry::new("No datasource", person.id, "discharge")).unwrap();
    let reader = FileDataReader::new(root);
    assert_matches!(
        reader.read(&bare, &DataFilter::default()),
        Err(CatalogError::MetadataMissing(_))
    );

    let csv = create_datasource(&mut store, bare.id, DataSourceKind::Csv, "data.csv", Map::new()).unwrap();
    assert_matches!(
        reader.read(&csv, &DataFilter::default()),
        Err(CatalogError::UnsupportedType(_))
    );
}

#[test]
fn file_reader_appends_and_deletes() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let (store, ids) = catalog_with(&["Growing", "Fresh"]);
    let growing = store.get_entry(ids[0]).unwrap();
    let fresh = store.get_entry(ids[1]).unwrap();
    let reader = FileDataReader::new(root);

    reader
        .import_data(&growing, &series("2020-01-01", 6, TimeDelta::hours(1), "q"))
        .unwrap();
    let (path, rows) = reader
        .append_data(&growing, &series("2020-01-01 06:00:00", 4, TimeDelta::hours(1), "q"))
        .unwrap();
    assert_eq!(rows, 10);
    let table = reader.read(&growing, &DataFilter::default()).unwrap();
    let table = table.as_table().unwrap();
    assert_eq!(table.len(), 10);
    assert_eq!(table.value("q", ts("2020-01-01 09:00:00")), Some(3.0));

    let (_, rows) = reader
        .append_data(&fresh, &series("2020-01-01", 2, TimeDelta::hours(1), "q"))
        .unwrap();
    assert_eq!(rows, 2);

    assert_eq!(reader.delete_data(&growing).unwrap(), path);
    assert!(!path.as_std_path().exists());
    assert_matches!(
        reader.read(&growing, &DataFilter::default()),
        Err(CatalogError::DataRead(_))
    );
    assert_matches!(reader.delete_data(&growing), Err(CatalogError::Filesystem(_)));
}

#[test]
fn appending_to_raw_data_fails() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let (store, ids) = catalog_with(&["Document"]);
    let entry = store.get_entry(ids[0]).unwrap();
    fs::write(root.join(format!("{}.json", entry.id)), r#"{"station": "GS-12"}"#).unwrap();

    let reader = FileDataReader::new(root);
    assert_matches!(
        reader.append_data(&entry, &series("2020-01-01", 2, TimeDelta::hours(1), "q")),
        Err(CatalogError::DataRead(_))
    );
}

#[test]
fn app_import_append_and_delete() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("data")).unwrap();
    let (store, ids) = catalog_with(&["Managed"]);
    let first = Utf8PathBuf::from_path_buf(dir.path().join("first.json")).unwrap();
    let second = Utf8PathBuf::from_path_buf(dir.path().join("second.json")).unwrap();
    fs::write(
        first.as_std_path(),
        r#"[{"tstamp": "2020-01-01T00:00:00Z", "q": 1.0}, {"tstamp": "2020-01-01T01:00:00Z", "q": 2.0}]"#,
    )
    .unwrap();
    fs::write(second.as_std_path(), r#"[{"tstamp": "2020-01-01T02:00:00Z", "q": 3.0}]"#).unwrap();

    let mut app = App::with_files(store, &root);
    assert_eq!(app.import(ids[0], &first).unwrap().rows, 2);
    assert_eq!(app.append(ids[0], &second).unwrap().rows, 3);

    let deleted = app.delete(ids[0], true).unwrap();
    assert!(deleted.source_removed);
    assert!(!Utf8PathBuf::from(deleted.path).as_std_path().exists());
    assert_eq!(app.store().get_entry(ids[0]).unwrap().datasource, None);
    assert_matches!(app.delete(ids[0], false), Err(CatalogError::MetadataMissing(_)));
}
