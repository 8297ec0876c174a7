use serde_json::{Map, Value};
use uuid::Uuid;

use crate::checksum::{combined_checksum, digest};
use crate::domain::{Entry, EntryGroup, TemporalScale};
use crate::error::CatalogError;
use crate::store::EntityStore;

use super::expand::Expansion;
use super::fields::{self, FieldValue};
use super::list::common_temporal_scale;

#[derive(Debug, Clone, PartialEq)]
pub enum Member {
    Record(Entry),
    Nested(ResultSet),
}

impl Member {
    pub fn checksum(&self) -> &str {
        match self {
            Member::Record(entry) => &entry.checksum,
            Member::Nested(set) => set.checksum(),
        }
    }

    pub fn as_entry(&self) -> Option<&Entry> {
        match self {
            Member::Record(entry) => Some(entry),
            Member::Nested(_) => None,
        }
    }
}

/// Anything a result set can be built from.
#[derive(Debug, Clone)]
pub enum ResultInput {
    Entry(Entry),
    Group(EntryGroup),
    Set(ResultSet),
}

impl From<Entry> for ResultInput {
    fn from(value: Entry) -> Self {
        ResultInput::Entry(value)
    }
}

impl From<EntryGroup> for ResultInput {
    fn from(value: EntryGroup) -> Self {
        ResultInput::Group(value)
    }
}

impl From<ResultSet> for ResultInput {
    fn from(value: ResultSet) -> Self {
        ResultInput::Set(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    group: Option<EntryGroup>,
    members: Vec<Member>,
    checksum: String,
}

impl ResultSet {
    pub fn build<S>(store: &S, input: impl Into<ResultInput>) -> Result<Self, CatalogError>
    where
        S: EntityStore + ?Sized,
    {
        match input.into() {
            ResultInput::Entry(entry) => Self::from_entry(store, &entry),
            ResultInput::Group(group) => Self::from_group(store, group),
            ResultInput::Set(set) => Ok(set),
        }
    }

    pub fn from_entry<S>(store: &S, entry: &Entry) -> Result<Self, CatalogError>
    where
        S: EntityStore + ?Sized,
    {
        Expansion::new(store).from_entry(entry)
    }

    pub fn from_group<S>(store: &S, group: EntryGroup) -> Result<Self, CatalogError>
    where
        S: EntityStore + ?Sized,
    {
        Expansion::new(store).from_group(group)
    }

    pub(super) fn assemble(group: Option<EntryGroup>, members: Vec<Member>) -> Self {
        let member_checksums = combined_checksum(members.iter().map(Member::checksum));
        let group_checksum = group.as_ref().map(|g| g.checksum.as_str()).unwrap_or_default();
        let checksum = digest(&format!("{group_checksum}{member_checksums}"));
        Self {
            group,
            members,
            checksum,
        }
    }

    pub fn group(&self) -> Option<&EntryGroup> {
        self.group.as_ref()
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Group UUID first, then member UUIDs in discovery order. Nested sets
    /// contribute all of their UUIDs.
    pub fn uuids(&self) -> Vec<Uuid> {
        let mut uuids = Vec::new();
        let own = self.group.iter().map(|group| group.uuid);
        let members = self.members.iter().flat_map(|member| match member {
            Member::Record(entry) => vec![entry.uuid],
            Member::Nested(set) => set.uuids(),
        });
        for uuid in own.chain(members) {
            if !uuids.contains(&uuid) {
                uuids.push(uuid);
            }
        }
        uuids
    }

    pub fn contains_uuid(&self, uuid: &Uuid) -> bool {
        self.group.as_ref().is_some_and(|group| group.uuid == *uuid)
            || self.members.iter().any(|member| match member {
                Member::Record(entry) => entry.uuid == *uuid,
                Member::Nested(set) => set.contains_uuid(uuid),
            })
    }

    pub fn contains_checksum(&self, checksum: &str) -> bool {
        self.checksum == checksum
            || self.members.iter().any(|member| match member {
                Member::Record(entry) => entry.checksum == checksum,
                Member::Nested(set) => set.contains_checksum(checksum),
            })
    }

    /// Every entry of the set, nested ones included, without duplicates.
    pub fn entries(&self) -> Vec<&Entry> {
        let mut entries: Vec<&Entry> = Vec::new();
        for member in &self.members {
            let found = match member {
                Member::Record(entry) => vec![entry],
                Member::Nested(set) => set.entries(),
            };
            for entry in found {
                if !entries.iter().any(|known| known.checksum == entry.checksum) {
                    entries.push(entry);
                }
            }
        }
        entries
    }

    /// Consolidated value of `name` over the group and all members. Equal
    /// values collapse into one; differing values are reported per owner.
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        fields::consolidate(self, name)
    }

    pub fn get_or(&self, name: &str, default: Value) -> FieldValue {
        self.get(name).unwrap_or(FieldValue::Single(default))
    }

    pub fn to_dict(&self) -> Map<String, Value> {
        self.field_names()
            .into_iter()
            .filter_map(|name| Some((name.to_string(), self.get(name)?.into_value())))
            .collect()
    }

    pub fn to_short_info(&self) -> Map<String, Value> {
        ["id", "uuid", "title", "variable", "datasource"]
            .into_iter()
            .map(|name| {
                let value = self.get(name).map(FieldValue::into_value).unwrap_or(Value::Null);
                (name.to_string(), value)
            })
            .collect()
    }

    /// Common temporal scale of all member datasources: the union of the
    /// extents at the coarsest resolution.
    pub fn temporal_scale(&self) -> Option<TemporalScale> {
        let scales = self
            .entries()
            .into_iter()
            .filter_map(|entry| entry.datasource.as_ref()?.temporal_scale.as_ref())
            .cloned()
            .collect::<Vec<_>>();
        common_temporal_scale(&scales)
    }

    fn field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.group.is_some() {
            names.extend(fields::GROUP_FIELDS);
        }
        if !self.members.is_empty() {
            for name in fields::ENTRY_FIELDS {
                if !names.contains(name) {
                    names.push(*name);
                }
            }
        }
        names
    }
}
