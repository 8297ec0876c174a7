use serde::Serialize;
use tracing::{debug, warn};

use crate::data::{DataFilter, DataReader, Payload, Table};
use crate::domain::GroupType;
use crate::error::CatalogError;

use super::set::{Member, ResultSet};

/// Data of a result set. Without a group and without an explicit merge the
/// member payloads are handed back as they are, keyed by member checksum.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSet {
    Members(Vec<(String, Payload)>),
    Combined {
        table: Option<Table>,
        unmerged: Vec<(String, Payload)>,
    },
}

impl DataSet {
    pub fn table(&self) -> Option<&Table> {
        match self {
            DataSet::Combined { table, .. } => table.as_ref(),
            DataSet::Members(_) => None,
        }
    }
}

enum Combination {
    Merge,
    Concat,
}

impl ResultSet {
    pub fn get_data<R>(&self, reader: &R, merge: bool, filter: &DataFilter) -> Result<DataSet, CatalogError>
    where
        R: DataReader + ?Sized,
    {
        let mut collected = Vec::new();
        for member in self.members() {
            if let Some(payload) = member_payload(member, reader, filter)? {
                collected.push((member.checksum().to_string(), payload));
            }
        }

        let combination = match self.group() {
            None if !merge => return Ok(DataSet::Members(collected)),
            Some(group) if group.group_type == GroupType::SplitDataset => Combination::Concat,
            _ => Combination::Merge,
        };

        let mut tables = Vec::new();
        let mut unmerged = Vec::new();
        for (owner, payload) in collected {
            match payload {
                Payload::Table(table) => tables.push(table),
                other => unmerged.push((owner, other)),
            }
        }
        debug!(set = %self.checksum(), tables = tables.len(), unmerged = unmerged.len(), "combining data");

        let table = match combination {
            Combination::Merge => Table::merge_outer(tables),
            Combination::Concat => Table::concat(tables),
        };
        Ok(DataSet::Combined { table, unmerged })
    }
}

fn member_payload<R>(member: &Member, reader: &R, filter: &DataFilter) -> Result<Option<Payload>, CatalogError>
where
    R: DataReader + ?Sized,
{
    match member {
        Member::Record(entry) => {
            if entry.datasource.is_none() {
                return Ok(None);
            }
            match reader.read(entry, filter) {
                Ok(payload) => Ok(Some(payload)),
                Err(CatalogError::MetadataMissing(reason)) => {
                    warn!(entry = entry.id, %reason, "skipping entry without data");
                    Ok(None)
                }
                Err(err) => Err(err),
            }
        }
        Member::Nested(set) => {
            let mut tables = Vec::new();
            let mut others = Vec::new();
            for inner in set.members() {
                match member_payload(inner, reader, filter)? {
                    Some(Payload::Table(table)) => tables.push(table),
                    Some(other) => others.push(other),
                    None => {}
                }
            }
            Ok(match (Table::concat(tables), others.is_empty()) {
                (Some(merged), true) => Some(Payload::Table(merged)),
                (Some(merged), false) => Some(Payload::Split {
                    merged,
                    unmerged: others,
                }),
                (None, false) => Some(Payload::Many(others)),
                (None, true) => None,
            })
        }
    }
}
