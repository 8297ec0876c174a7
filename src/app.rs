use std::fs;

use camino::Utf8Path;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::add::remove_datasource;
use crate::data::{DataFilter, DataReader, FileDataReader, Table};
use crate::domain::{Entry, RecordId};
use crate::error::CatalogError;
use crate::find::{
    CatalogObject, EntryQuery, Found, GroupQuery, PersonQuery, find_entry, find_group, find_person,
    get_uuid,
};
use crate::results::{DataSet, ResultSet};
use crate::store::{EntityStore, Store};

#[derive(Debug, Clone, Serialize)]
pub struct FindResult {
    pub count: usize,
    pub items: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShowResult {
    pub kind: String,
    pub checksum: Option<String>,
    pub uuids: Vec<Uuid>,
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataResult {
    pub checksum: String,
    pub data: DataSet,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportResult {
    pub entry: RecordId,
    pub path: String,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResult {
    pub entry: RecordId,
    pub path: String,
    pub source_removed: bool,
}

pub struct App<R: DataReader> {
    store: Store,
    reader: R,
}

impl App<FileDataReader> {
    pub fn with_files(store: Store, data_root: &Utf8Path) -> Self {
        Self::new(store, FileDataReader::new(data_root.to_path_buf()))
    }

    pub fn import(&self, entry_id: RecordId, file: &Utf8Path) -> Result<ImportResult, CatalogError> {
        let (entry, table) = self.load_records(entry_id, file)?;
        let path = self.reader.import_data(&entry, &table)?;
        info!(entry = entry_id, rows = table.len(), "imported data file");
        Ok(ImportResult {
            entry: entry_id,
            path: path.to_string(),
            rows: table.len(),
        })
    }

    /// Appends a JSON records file to the internal data of an entry. `rows`
    /// is the row count after appending.
    pub fn append(&self, entry_id: RecordId, file: &Utf8Path) -> Result<ImportResult, CatalogError> {
        let (entry, table) = self.load_records(entry_id, file)?;
        let (path, rows) = self.reader.append_data(&entry, &table)?;
        info!(entry = entry_id, appended = table.len(), rows, "appended data file");
        Ok(ImportResult {
            entry: entry_id,
            path: path.to_string(),
            rows,
        })
    }

    /// Deletes the internal data of an entry and, with `delete_source`, the
    /// datasource record as well.
    pub fn delete(&mut self, entry_id: RecordId, delete_source: bool) -> Result<DeleteResult, CatalogError> {
        let entry = self.store.get_entry(entry_id)?;
        let path = self.reader.delete_data(&entry)?;
        if delete_source {
            remove_datasource(&mut self.store, entry_id)?;
        }
        info!(entry = entry_id, path = %path, delete_source, "deleted data");
        Ok(DeleteResult {
            entry: entry_id,
            path: path.to_string(),
            source_removed: delete_source,
        })
    }

    fn load_records(&self, entry_id: RecordId, file: &Utf8Path) -> Result<(Entry, Table), CatalogError> {
        let entry = self.store.get_entry(entry_id)?;
        let content = fs::read_to_string(file.as_std_path())
            .map_err(|err| CatalogError::DataRead(format!("{file}: {err}")))?;
        let records: Vec<Value> = serde_json::from_str(&content)
            .map_err(|err| CatalogError::DataRead(format!("{file}: {err}")))?;
        let index = entry
            .datasource
            .as_ref()
            .and_then(|ds| ds.args.get("index"))
            .and_then(Value::as_str)
            .unwrap_or(crate::data::DEFAULT_INDEX_COLUMN);
        let table = Table::from_records(&records, index)?;
        Ok((entry, table))
    }
}

impl<R: DataReader> App<R> {
    pub fn new(store: Store, reader: R) -> Self {
        Self { store, reader }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn find_entries(&self, query: &EntryQuery) -> Result<FindResult, CatalogError> {
        Ok(found_items(find_entry(&self.store, query)?))
    }

    pub fn find_groups(&self, query: &GroupQuery) -> Result<FindResult, CatalogError> {
        Ok(found_items(find_group(&self.store, query)?))
    }

    pub fn find_persons(&self, query: &PersonQuery) -> Result<FindResult, CatalogError> {
        let persons = find_person(&self.store, query)?;
        Ok(FindResult {
            count: persons.len(),
            items: persons.iter().map(to_json).collect(),
        })
    }

    /// Consolidated view of whatever `uuid` names. Persons and keywords are
    /// shown as stored.
    pub fn show(&self, uuid: &Uuid) -> Result<ShowResult, CatalogError> {
        match get_uuid(&self.store, uuid, true)? {
            CatalogObject::Result(set) => Ok(ShowResult {
                kind: "result_set".to_string(),
                checksum: Some(set.checksum().to_string()),
                uuids: set.uuids(),
                fields: set.to_dict(),
            }),
            object => {
                let kind = match &object {
                    CatalogObject::Person(_) => "person",
                    CatalogObject::Keyword(_) => "keyword",
                    _ => "record",
                };
                let fields = match to_json(&object) {
                    Value::Object(mut tagged) => match tagged.remove("object") {
                        Some(Value::Object(fields)) => fields,
                        _ => Map::new(),
                    },
                    _ => Map::new(),
                };
                Ok(ShowResult {
                    kind: kind.to_string(),
                    checksum: None,
                    uuids: vec![*uuid],
                    fields,
                })
            }
        }
    }

    pub fn data(&self, uuid: &Uuid, merge: bool, filter: &DataFilter) -> Result<DataResult, CatalogError> {
        let set = get_uuid(&self.store, uuid, false)?.into_result_set(&self.store)?;
        let data = set.get_data(&self.reader, merge, filter)?;
        Ok(DataResult {
            checksum: set.checksum().to_string(),
            data,
        })
    }

    pub fn result_set(&self, entry: &Entry) -> Result<ResultSet, CatalogError> {
        ResultSet::from_entry(&self.store, entry)
    }
}

fn found_items<T: Serialize>(found: Found<T>) -> FindResult {
    let items = match found {
        Found::Records(records) => records.iter().map(to_json).collect::<Vec<_>>(),
        Found::Results(sets) => sets
            .iter()
            .map(|set| Value::Object(set.to_short_info()))
            .collect(),
    };
    FindResult {
        count: items.len(),
        items,
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use chrono::TimeDelta;

    use super::*;
    use crate::add::{NewEntry, NewPerson, add_entry, add_person, create_datasource};
    use crate::data::Payload;
    use crate::domain::{DataSourceKind, parse_timestamp};

    struct MockReader {
        reads: RefCell<Vec<RecordId>>,
    }

    impl DataReader for MockReader {
        fn read(&self, entry: &Entry, _filter: &DataFilter) -> Result<Payload, CatalogError> {
            self.reads.borrow_mut().push(entry.id);
            let first = parse_timestamp("2021-06-01").map_err(|err| CatalogError::DataRead(err.to_string()))?;
            let index = (0..3).map(|i| first + TimeDelta::hours(i)).collect();
            Ok(Payload::Table(Table::new(index).with_column("value", vec![Some(1.0); 3])?))
        }
    }

    #[test]
    fn data_reads_every_member_once() {
        let mut store = Store::in_memory();
        let person = add_person(
            &mut store,
            NewPerson {
                last_name: Some("Curie".to_string()),
                ..NewPerson::default()
            },
        )
        .unwrap();
        let entry = add_entry(&mut store, NewEntry::new("Gauge", person.id, "discharge")).unwrap();
        create_datasource(&mut store, entry.id, DataSourceKind::Internal, "gauge.json", Map::new()).unwrap();

        let app = App::new(
            store,
            MockReader {
                reads: RefCell::new(Vec::new()),
            },
        );
        let result = app.data(&entry.uuid, false, &DataFilter::default()).unwrap();
        assert_eq!(app.reader.reads.borrow().as_slice(), &[entry.id]);
        match result.data {
            DataSet::Members(members) => assert_eq!(members.len(), 1),
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn show_consolidates_entries() {
        let mut store = Store::in_memory();
        let person = add_person(
            &mut store,
            NewPerson {
                last_name: Some("Curie".to_string()),
                ..NewPerson::default()
            },
        )
        .unwrap();
        let entry = add_entry(&mut store, NewEntry::new("Gauge", person.id, "discharge")).unwrap();

        let app = App::new(
            store,
            MockReader {
                reads: RefCell::new(Vec::new()),
            },
        );
        let shown = app.show(&entry.uuid).unwrap();
        assert_eq!(shown.kind, "result_set");
        assert_eq!(shown.uuids, vec![entry.uuid]);
        assert_eq!(shown.fields["title"], Value::String("Gauge".to_string()));

        let shown = app.show(&person.uuid).unwrap();
        assert_eq!(shown.kind, "person");
        assert_eq!(shown.fields["last_name"], Value::String("Curie".to_string()));
    }
}
