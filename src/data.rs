use std::collections::{BTreeSet, HashMap};
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::{DataSourceKind, Entry, parse_timestamp};
use crate::error::CatalogError;
use crate::store::write_bytes_atomic;

pub const DEFAULT_INDEX_COLUMN: &str = "tstamp";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

/// Timestamp indexed table of numeric columns. Missing cells are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    index: Vec<DateTime<Utc>>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(index: Vec<DateTime<Utc>>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    pub fn with_column(
        mut self,
        name: impl Into<String>,
        values: Vec<Option<f64>>,
    ) -> Result<Self, CatalogError> {
        let name = name.into();
        if values.len() != self.index.len() {
            return Err(CatalogError::DataRead(format!(
                "column {name} has {} values for an index of {}",
                values.len(),
                self.index.len()
            )));
        }
        if self.column(&name).is_some() {
            return Err(CatalogError::DataRead(format!("duplicate column {name}")));
        }
        self.columns.push(Column { name, values });
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[DateTime<Utc>] {
        &self.index
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn value(&self, column: &str, at: DateTime<Utc>) -> Option<f64> {
        let row = self.index.iter().position(|ts| *ts == at)?;
        self.column(column)?.values[row]
    }

    pub fn filter_range(&self, start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Table {
        let keep = self
            .index
            .iter()
            .map(|ts| start.is_none_or(|s| *ts >= s) && end.is_none_or(|e| *ts <= e))
            .collect::<Vec<_>>();
        Table {
            index: select(&self.index, &keep),
            columns: self
                .columns
                .iter()
                .map(|column| Column {
                    name: column.name.clone(),
                    values: select(&column.values, &keep),
                })
                .collect(),
        }
    }

    /// Column-wise outer join on the index. The result index is the sorted
    /// union of all input indexes. A column name already taken by an earlier
    /// table gets the table position as suffix (`temp_1`), counting upwards
    /// while that name is taken as well.
    pub fn merge_outer(tables: Vec<Table>) -> Option<Table> {
        if tables.is_empty() {
            return None;
        }
        let index = tables
            .iter()
            .flat_map(|table| table.index.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>();

        let mut columns: Vec<Column> = Vec::new();
        for (position, table) in tables.iter().enumerate() {
            let mut rows = HashMap::new();
            for (row, ts) in table.index.iter().enumerate() {
                rows.entry(*ts).or_insert(row);
            }
            for column in &table.columns {
                let mut name = column.name.clone();
                let mut suffix = position;
                while columns.iter().any(|c| c.name == name) {
                    name = format!("{}_{suffix}", column.name);
                    suffix += 1;
                }
                let values = index
                    .iter()
                    .map(|ts| rows.get(ts).and_then(|row| column.values[*row]))
                    .collect();
                columns.push(Column { name, values });
            }
        }
        Some(Table { index, columns })
    }

    /// Row-wise concatenation in input order. Columns are the union of all
    /// input columns; cells a table does not have stay empty.
    pub fn concat(tables: Vec<Table>) -> Option<Table> {
        if tables.is_empty() {
            return None;
        }
        let mut names: Vec<String> = Vec::new();
        for table in &tables {
            for column in &table.columns {
                if !names.contains(&column.name) {
                    names.push(column.name.clone());
                }
            }
        }

        let mut index = Vec::new();
        let mut columns = names
            .iter()
            .map(|name| Column {
                name: name.clone(),
                values: Vec::new(),
            })
            .collect::<Vec<_>>();
        for table in tables {
            let rows = table.len();
            index.extend(table.index.iter().copied());
            for column in columns.iter_mut() {
                match table.column(&column.name) {
                    Some(source) => column.values.extend(source.values.iter().copied()),
                    None => column.values.extend(std::iter::repeat_n(None, rows)),
                }
            }
        }
        Some(Table { index, columns })
    }

    pub fn from_records(records: &[Value], index_column: &str) -> Result<Table, CatalogError> {
        let mut index = Vec::with_capacity(records.len());
        let mut names: Vec<String> = Vec::new();
        for record in records {
            let object = record
                .as_object()
                .ok_or_else(|| CatalogError::DataRead("record is not an object".to_string()))?;
            let ts = object
                .get(index_column)
                .and_then(Value::as_str)
                .ok_or_else(|| CatalogError::DataRead(format!("record without {index_column}")))?;
            index.push(parse_timestamp(ts)?);
            for key in object.keys() {
                if key != index_column && !names.contains(key) {
                    names.push(key.clone());
                }
            }
        }

        let mut table = Table::new(index);
        for name in names {
            let values = records
                .iter()
                .map(|record| record.get(&name).and_then(Value::as_f64))
                .collect();
            table = table.with_column(name, values)?;
        }
        Ok(table)
    }

    pub fn to_records(&self, index_column: &str) -> Vec<Value> {
        (0..self.len())
            .map(|row| {
                let mut object = Map::new();
                object.insert(
                    index_column.to_string(),
                    Value::String(self.index[row].to_rfc3339()),
                );
                for column in &self.columns {
                    let value = column.values[row]
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                        .unwrap_or(Value::Null);
                    object.insert(column.name.clone(), value);
                }
                Value::Object(object)
            })
            .collect()
    }
}

fn select<T: Copy>(values: &[T], keep: &[bool]) -> Vec<T> {
    values
        .iter()
        .zip(keep)
        .filter(|(_, keep)| **keep)
        .map(|(value, _)| *value)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Table(Table),
    Raw(Value),
    Many(Vec<Payload>),
    Split { merged: Table, unmerged: Vec<Payload> },
}

impl Payload {
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Payload::Table(table) => Some(table),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// Loads the observation payload described by an entry's datasource.
pub trait DataReader {
    fn read(&self, entry: &Entry, filter: &DataFilter) -> Result<Payload, CatalogError>;
}

#[derive(Debug, Clone)]
pub struct FileDataReader {
    root: Utf8PathBuf,
}

impl FileDataReader {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn data_path(&self, entry: &Entry) -> Result<Utf8PathBuf, CatalogError> {
        let datasource = entry.datasource.as_ref().ok_or_else(|| {
            CatalogError::MetadataMissing(format!("entry {} needs datasource information", entry.id))
        })?;
        let path = Utf8Path::new(&datasource.path);
        Ok(if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        })
    }

    /// Writes `table` as the internal data file of `entry`, replacing any
    /// previous content.
    pub fn import_data(&self, entry: &Entry, table: &Table) -> Result<Utf8PathBuf, CatalogError> {
        let path = self.data_path(entry)?;
        let index_column = index_column(entry);
        let content = serde_json::to_vec_pretty(&table.to_records(&index_column))
            .map_err(|err| CatalogError::Serialization(err.to_string()))?;
        write_bytes_atomic(&path, &content)?;
        debug!(entry = entry.id, path = %path, rows = table.len(), "imported data");
        Ok(path)
    }

    /// Appends the rows of `table` to the internal data file of `entry`. A
    /// missing file is created. Returns the path and the stored row count.
    pub fn append_data(&self, entry: &Entry, table: &Table) -> Result<(Utf8PathBuf, usize), CatalogError> {
        let path = self.data_path(entry)?;
        let combined = if path.as_std_path().exists() {
            let existing = match self.read(entry, &DataFilter::default())? {
                Payload::Table(existing) => existing,
                _ => {
                    return Err(CatalogError::DataRead(format!(
                        "{path}: existing data is not a table"
                    )));
                }
            };
            Table::concat(vec![existing, table.clone()]).unwrap_or_default()
        } else {
            table.clone()
        };
        self.import_data(entry, &combined)?;
        debug!(entry = entry.id, path = %path, appended = table.len(), rows = combined.len(), "appended data");
        Ok((path, combined.len()))
    }

    /// Removes the internal data file of `entry`.
    pub fn delete_data(&self, entry: &Entry) -> Result<Utf8PathBuf, CatalogError> {
        let path = self.data_path(entry)?;
        fs::remove_file(path.as_std_path())
            .map_err(|err| CatalogError::Filesystem(format!("{path}: {err}")))?;
        debug!(entry = entry.id, path = %path, "deleted data");
        Ok(path)
    }
}

impl DataReader for FileDataReader {
    fn read(&self, entry: &Entry, filter: &DataFilter) -> Result<Payload, CatalogError> {
        let path = self.data_path(entry)?;
        let kind = entry
            .datasource
            .as_ref()
            .map(|ds| ds.kind)
            .unwrap_or(DataSourceKind::Internal);
        if !matches!(kind, DataSourceKind::Internal | DataSourceKind::Local) {
            return Err(CatalogError::UnsupportedType(format!(
                "no reader for datasource type {kind}"
            )));
        }

        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| CatalogError::DataRead(format!("{path}: {err}")))?;
        let value: Value = serde_json::from_str(&content)
            .map_err(|err| CatalogError::DataRead(format!("{path}: {err}")))?;

        let index_column = index_column(entry);
        let is_table = value.as_array().is_some_and(|rows| {
            rows.iter()
                .all(|row| row.get(&index_column).is_some_and(Value::is_string))
        });
        if !is_table {
            return Ok(Payload::Raw(value));
        }
        let rows = value.as_array().map(Vec::as_slice).unwrap_or_default();
        let table = Table::from_records(rows, &index_column)?;
        Ok(Payload::Table(table.filter_range(filter.start, filter.end)))
    }
}

fn index_column(entry: &Entry) -> String {
    entry
        .datasource
        .as_ref()
        .and_then(|ds| ds.args.get("index"))
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_INDEX_COLUMN)
        .to_string()
}
