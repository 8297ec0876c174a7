use serde::Serialize;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::domain::{Contributor, Entry, KeywordTag};

pub fn digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash of a JSON value. `serde_json::Map` keeps its keys sorted, so equal
/// values always serialize to the same text.
pub fn value_digest(value: &Value) -> String {
    digest(&value.to_string())
}

/// Content checksum of an entry. Database ids and the UUID are left out, so the
/// same metadata yields the same checksum in every installation.
pub fn entry_checksum(entry: &Entry) -> String {
    value_digest(&entry_content(entry))
}

/// Checksum over a set of member checksums. The input order does not matter.
pub fn combined_checksum<I, S>(checksums: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut sorted = checksums
        .into_iter()
        .map(|value| value.as_ref().to_string())
        .collect::<Vec<_>>();
    sorted.sort();
    digest(&sorted.concat())
}

fn entry_content(entry: &Entry) -> Value {
    json!({
        "title": entry.title,
        "abstract": entry.abstract_text,
        "external_id": entry.external_id,
        "location": entry.location.map(|loc| loc.wkt()),
        "version": entry.version,
        "license": entry.license.as_ref().map(|license| json!({
            "short_title": license.short_title,
            "title": license.title,
            "link": license.link,
        })),
        "variable": {
            "name": entry.variable.name,
            "symbol": entry.variable.symbol,
            "unit": entry.variable.unit.symbol,
        },
        "datasource": entry.datasource.as_ref().map(|ds| json!({
            "kind": ds.kind.to_string(),
            "path": ds.path,
            "args": ds.args,
            "temporal_scale": to_value(&ds.temporal_scale),
            "spatial_scale": to_value(&ds.spatial_scale),
        })),
        "embargo": entry.embargo,
        "is_partial": entry.is_partial,
        "comment": entry.comment,
        "citation": entry.citation,
        "contributors": entry.contributors.iter().map(contributor_content).collect::<Vec<_>>(),
        "keywords": entry.keywords.iter().map(keyword_content).collect::<Vec<_>>(),
        "details": entry.details.iter().map(|d| json!([d.key, d.value])).collect::<Vec<_>>(),
    })
}

fn contributor_content(contributor: &Contributor) -> Value {
    json!({
        "name": contributor.person.full_name(),
        "affiliation": contributor.person.affiliation,
        "role": contributor.role,
        "order": contributor.order,
    })
}

fn keyword_content(tag: &KeywordTag) -> Value {
    json!({
        "path": tag.keyword.full_path,
        "alias": tag.alias,
        "value": tag.value,
    })
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}
