use std::collections::HashSet;

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::checksum::value_digest;
use crate::domain::{Entry, EntryGroup};

use super::set::{Member, ResultSet};

pub const ENTRY_FIELDS: &[&str] = &[
    "id",
    "uuid",
    "title",
    "abstract",
    "external_id",
    "location",
    "version",
    "latest_version_id",
    "is_latest_version",
    "license",
    "variable",
    "datasource",
    "embargo",
    "embargo_end",
    "is_partial",
    "comment",
    "citation",
    "publication",
    "last_update",
    "author",
    "authors",
    "contributors",
    "keywords",
    "plain_keywords",
    "details",
    "associated_groups",
    "projects",
    "checksum",
];

pub const GROUP_FIELDS: &[&str] = &["id", "uuid", "title", "description", "type", "checksum"];

/// Consolidated attribute value of a result set.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// All contributors agree.
    Single(Value),
    /// Distinct values keyed by the owner that contributed them: a group or
    /// entry UUID, or the checksum of a nested set.
    ByOwner(Vec<(String, Value)>),
    /// Distinct UUIDs of the set.
    List(Vec<Value>),
}

impl FieldValue {
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            FieldValue::Single(value) => Some(value),
            _ => None,
        }
    }

    pub fn owners(&self) -> Vec<&str> {
        match self {
            FieldValue::ByOwner(values) => values.iter().map(|(owner, _)| owner.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            FieldValue::Single(value) => value,
            FieldValue::ByOwner(values) => Value::Object(values.into_iter().collect::<Map<_, _>>()),
            FieldValue::List(values) => Value::Array(values),
        }
    }
}

pub fn entry_field(entry: &Entry, name: &str) -> Option<Value> {
    let value = match name {
        "id" => json!(entry.id),
        "uuid" => json!(entry.uuid),
        "title" => json!(entry.title),
        "abstract" => json!(entry.abstract_text),
        "external_id" => json!(entry.external_id),
        "location" => json!(entry.location.map(|location| location.wkt())),
        "version" => json!(entry.version),
        "latest_version_id" => json!(entry.latest_version_id),
        "is_latest_version" => json!(entry.is_latest_version()),
        "license" => to_value(&entry.license),
        "variable" => to_value(&entry.variable),
        "datasource" => to_value(&entry.datasource),
        "embargo" => json!(entry.embargo),
        "embargo_end" => to_value(&entry.embargo_end),
        "is_partial" => json!(entry.is_partial),
        "comment" => json!(entry.comment),
        "citation" => json!(entry.citation),
        "publication" => to_value(&entry.publication),
        "last_update" => to_value(&entry.last_update),
        "author" => to_value(&entry.author()),
        "authors" => to_value(&entry.authors()),
        "contributors" => to_value(&entry.contributors),
        "keywords" => Value::Array(
            entry
                .keywords
                .iter()
                .map(|tag| json!({"path": tag.keyword.full_path, "alias": tag.alias, "value": tag.value}))
                .collect(),
        ),
        "plain_keywords" => json!(entry.plain_keywords_list()),
        "details" => Value::Object(entry.details_map()),
        "associated_groups" => to_value(&entry.associated_groups),
        "projects" => to_value(&entry.projects()),
        "checksum" => json!(entry.checksum),
        _ => return None,
    };
    Some(value)
}

pub fn group_field(group: &EntryGroup, name: &str) -> Option<Value> {
    let value = match name {
        "id" => json!(group.id),
        "uuid" => json!(group.uuid),
        "title" => json!(group.title),
        "description" => json!(group.description),
        "type" => json!(group.group_type.name()),
        "checksum" => json!(group.checksum),
        _ => return None,
    };
    Some(value).filter(|value| !value.is_null())
}

pub(super) fn consolidate(set: &ResultSet, name: &str) -> Option<FieldValue> {
    let mut found: Vec<(String, Value)> = Vec::new();
    if let Some(group) = set.group() {
        if let Some(value) = group_field(group, name) {
            found.push((group.uuid.to_string(), value));
        }
    }
    for member in set.members() {
        match member {
            Member::Record(entry) => {
                if let Some(value) = entry_field(entry, name) {
                    found.push((entry.uuid.to_string(), value));
                }
            }
            Member::Nested(nested) => {
                let owner = nested.checksum().to_string();
                match nested.get(name) {
                    Some(FieldValue::List(values)) => {
                        found.extend(values.into_iter().map(|value| (owner.clone(), value)))
                    }
                    Some(value) => found.push((owner, value.into_value())),
                    None => {}
                }
            }
        }
    }

    let mut seen = HashSet::new();
    found.retain(|(_, value)| seen.insert(value_digest(value)));

    match found.len() {
        0 => None,
        1 => found.pop().map(|(_, value)| FieldValue::Single(value)),
        _ if name == "uuid" => Some(FieldValue::List(
            found.into_iter().map(|(_, value)| value).collect(),
        )),
        _ => Some(FieldValue::ByOwner(found)),
    }
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_value_shapes() {
        let single = FieldValue::Single(json!(3));
        assert_eq!(single.as_single(), Some(&json!(3)));
        assert_eq!(single.into_value(), json!(3));

        let by_owner = FieldValue::ByOwner(vec![("a".into(), json!(1)), ("b".into(), json!(2))]);
        assert_eq!(by_owner.owners(), vec!["a", "b"]);
        assert_eq!(by_owner.into_value(), json!({"a": 1, "b": 2}));

        let list = FieldValue::List(vec![json!("x"), json!("y")]);
        assert_eq!(list.into_value(), json!(["x", "y"]));
    }
}
