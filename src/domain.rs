use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::CatalogError;

pub type RecordId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum GroupType {
    Project,
    Composite,
    SplitDataset,
    Label,
    Other(String),
}

impl GroupType {
    pub fn name(&self) -> &str {
        match self {
            GroupType::Project => "Project",
            GroupType::Composite => "Composite",
            GroupType::SplitDataset => "Split dataset",
            GroupType::Label => "Label",
            GroupType::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for GroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for GroupType {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidGroupType(value.to_string()));
        }
        match trimmed.to_lowercase().as_str() {
            "project" => Ok(GroupType::Project),
            "composite" => Ok(GroupType::Composite),
            "split dataset" | "split-dataset" | "split" => Ok(GroupType::SplitDataset),
            "label" => Ok(GroupType::Label),
            _ => Ok(GroupType::Other(trimmed.to_string())),
        }
    }
}

impl From<GroupType> for String {
    fn from(value: GroupType) -> Self {
        value.name().to_string()
    }
}

impl TryFrom<String> for GroupType {
    type Error = CatalogError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Internal,
    External,
    Csv,
    Local,
    NetCdf,
}

impl fmt::Display for DataSourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSourceKind::Internal => write!(f, "internal"),
            DataSourceKind::External => write!(f, "external"),
            DataSourceKind::Csv => write!(f, "csv"),
            DataSourceKind::Local => write!(f, "local"),
            DataSourceKind::NetCdf => write!(f, "netcdf"),
        }
    }
}

impl FromStr for DataSourceKind {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "internal" => Ok(DataSourceKind::Internal),
            "external" => Ok(DataSourceKind::External),
            "csv" => Ok(DataSourceKind::Csv),
            "local" => Ok(DataSourceKind::Local),
            "netcdf" => Ok(DataSourceKind::NetCdf),
            _ => Err(CatalogError::UnsupportedType(format!(
                "datasource type {value}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: RecordId,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: RecordId,
    pub name: String,
    pub symbol: String,
    pub unit: Unit,
    #[serde(default)]
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct License {
    pub id: RecordId,
    pub short_title: String,
    pub title: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub by_attribution: Option<bool>,
    #[serde(default)]
    pub share_alike: Option<bool>,
    #[serde(default)]
    pub commercial_use: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: RecordId,
    pub uuid: Uuid,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub affiliation: Option<String>,
    #[serde(default)]
    pub organisation_name: Option<String>,
    #[serde(default)]
    pub is_organisation: bool,
}

impl Person {
    pub fn full_name(&self) -> String {
        if self.is_organisation {
            return self.organisation_name.clone().unwrap_or_default();
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (None, Some(last)) => last.clone(),
            (Some(first), None) => first.clone(),
            (None, None) => self.organisation_name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonRole {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contributor {
    pub person: Person,
    pub role: String,
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Keyword {
    pub id: RecordId,
    pub uuid: Uuid,
    pub value: String,
    pub full_path: String,
    #[serde(default)]
    pub parent_id: Option<RecordId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTag {
    pub keyword: Keyword,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detail {
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalScale {
    pub extent: (DateTime<Utc>, DateTime<Utc>),
    #[serde(rename = "resolution_ms", with = "duration_millis")]
    pub resolution: TimeDelta,
    pub support: f64,
    #[serde(default)]
    pub dimension_names: Vec<String>,
}

impl TemporalScale {
    pub fn support_duration(&self) -> TimeDelta {
        let millis = self.resolution.num_milliseconds() as f64 * self.support;
        TimeDelta::milliseconds(millis.round() as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialScale {
    #[serde(default)]
    pub extent: Option<String>,
    #[serde(default)]
    pub resolution: Option<f64>,
    #[serde(default)]
    pub support: Option<f64>,
    #[serde(default)]
    pub dimension_names: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub kind: DataSourceKind,
    pub path: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default)]
    pub variable_names: Vec<String>,
    #[serde(default)]
    pub temporal_scale: Option<TemporalScale>,
    #[serde(default)]
    pub spatial_scale: Option<SpatialScale>,
    #[serde(default)]
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn wkt(&self) -> String {
        format!("POINT ({} {})", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: RecordId,
    pub uuid: Uuid,
    pub group_type: GroupType,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: RecordId,
    pub uuid: Uuid,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    pub version: u32,
    #[serde(default)]
    pub latest_version_id: Option<RecordId>,
    #[serde(default)]
    pub license: Option<License>,
    pub variable: Variable,
    #[serde(default)]
    pub datasource: Option<DataSource>,
    pub embargo: bool,
    #[serde(default)]
    pub embargo_end: Option<DateTime<Utc>>,
    pub is_partial: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub publication: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contributors: Vec<Contributor>,
    #[serde(default)]
    pub keywords: Vec<KeywordTag>,
    #[serde(default)]
    pub details: Vec<Detail>,
    #[serde(default)]
    pub associated_groups: Vec<GroupRef>,
    pub checksum: String,
}

impl Entry {
    pub fn author(&self) -> Option<&Person> {
        self.contributors
            .iter()
            .filter(|c| c.role == "author" || c.role == "originator")
            .min_by_key(|c| c.order)
            .map(|c| &c.person)
    }

    pub fn authors(&self) -> Vec<&Person> {
        let mut ordered = self
            .contributors
            .iter()
            .filter(|c| matches!(c.role.as_str(), "author" | "originator" | "coAuthor"))
            .collect::<Vec<_>>();
        ordered.sort_by_key(|c| c.order);
        ordered.into_iter().map(|c| &c.person).collect()
    }

    pub fn projects(&self) -> Vec<&GroupRef> {
        self.associated_groups
            .iter()
            .filter(|g| g.group_type == GroupType::Project)
            .collect()
    }

    pub fn composite_groups(&self) -> Vec<&GroupRef> {
        self.associated_groups
            .iter()
            .filter(|g| g.group_type == GroupType::Composite)
            .collect()
    }

    pub fn is_latest_version(&self) -> bool {
        self.latest_version_id.is_none() || self.latest_version_id == Some(self.id)
    }

    pub fn plain_keywords_list(&self) -> Vec<String> {
        self.keywords
            .iter()
            .map(|tag| tag.keyword.full_path.clone())
            .collect()
    }

    pub fn details_map(&self) -> Map<String, Value> {
        self.details
            .iter()
            .map(|detail| (detail.key.clone(), detail.value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryGroup {
    pub id: RecordId,
    pub uuid: Uuid,
    pub group_type: GroupType,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub entry_ids: Vec<RecordId>,
    pub checksum: String,
}

/// Reference to a lookup row either by database id or by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Id(RecordId),
    Name(String),
}

impl From<RecordId> for Lookup {
    fn from(value: RecordId) -> Self {
        Lookup::Id(value)
    }
}

impl From<&str> for Lookup {
    fn from(value: &str) -> Self {
        Lookup::Name(value.to_string())
    }
}

impl From<String> for Lookup {
    fn from(value: String) -> Self {
        Lookup::Name(value)
    }
}

impl FromStr for Lookup {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Ok(match trimmed.parse::<RecordId>() {
            Ok(id) => Lookup::Id(id),
            Err(_) => Lookup::Name(trimmed.to_string()),
        })
    }
}

impl fmt::Display for Lookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lookup::Id(id) => write!(f, "{id}"),
            Lookup::Name(name) => write!(f, "{name}"),
        }
    }
}

pub fn parse_uuid(value: &str) -> Result<Uuid, CatalogError> {
    Uuid::parse_str(value.trim()).map_err(|_| CatalogError::InvalidUuid(value.to_string()))
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, CatalogError> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(naive.and_utc());
        }
    }
    chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CatalogError::InvalidTimestamp(value.to_string()))
}

/// Parses resolutions such as `15min`, `1h`, `30s`, `2d` or `1w`.
pub fn parse_duration(value: &str) -> Result<TimeDelta, CatalogError> {
    let trimmed = value.trim();
    let split = trimmed
        .find(|ch: char| !ch.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (number, unit) = trimmed.split_at(split);
    let amount: i64 = if number.is_empty() {
        1
    } else {
        number
            .parse()
            .map_err(|_| CatalogError::InvalidDuration(value.to_string()))?
    };
    let delta = match unit.trim() {
        "s" | "sec" | "S" => TimeDelta::try_seconds(amount),
        "min" | "T" | "m" => TimeDelta::try_minutes(amount),
        "h" | "H" => TimeDelta::try_hours(amount),
        "d" | "D" => TimeDelta::try_days(amount),
        "w" | "W" => TimeDelta::try_weeks(amount),
        _ => None,
    };
    match delta {
        Some(delta) if delta > TimeDelta::zero() => Ok(delta),
        _ => Err(CatalogError::InvalidDuration(value.to_string())),
    }
}

mod duration_millis {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        TimeDelta::try_milliseconds(millis)
            .ok_or_else(|| serde::de::Error::custom("duration out of range"))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_group_type_names() {
        assert_eq!("Composite".parse::<GroupType>().unwrap(), GroupType::Composite);
        assert_eq!(
            "split dataset".parse::<GroupType>().unwrap(),
            GroupType::SplitDataset
        );
        assert_eq!(
            "Campaign".parse::<GroupType>().unwrap(),
            GroupType::Other("Campaign".to_string())
        );
        assert_eq!(GroupType::SplitDataset.to_string(), "Split dataset");
    }

    #[test]
    fn parse_group_type_empty() {
        let err = "  ".parse::<GroupType>().unwrap_err();
        assert_matches!(err, CatalogError::InvalidGroupType(_));
    }

    #[test]
    fn parse_durations() {
        assert_eq!(parse_duration("15min").unwrap(), TimeDelta::minutes(15));
        assert_eq!(parse_duration("1h").unwrap(), TimeDelta::hours(1));
        assert_eq!(parse_duration("d").unwrap(), TimeDelta::days(1));
        assert_matches!(parse_duration("3 lightyears"), Err(CatalogError::InvalidDuration(_)));
        assert_matches!(parse_duration("0s"), Err(CatalogError::InvalidDuration(_)));
    }

    #[test]
    fn support_is_fraction_of_resolution() {
        let scale = TemporalScale {
            extent: (
                parse_timestamp("2018-06-13").unwrap(),
                parse_timestamp("2018-06-14").unwrap(),
            ),
            resolution: TimeDelta::minutes(15),
            support: 0.5,
            dimension_names: Vec::new(),
        };
        assert_eq!(scale.support_duration(), TimeDelta::seconds(450));
    }

    #[test]
    fn sub_second_resolution_survives_serialization() {
        let scale = TemporalScale {
            extent: (
                parse_timestamp("2018-06-13").unwrap(),
                parse_timestamp("2018-06-14").unwrap(),
            ),
            resolution: TimeDelta::milliseconds(500),
            support: 1.0,
            dimension_names: Vec::new(),
        };
        let value = serde_json::to_value(&scale).unwrap();
        assert_eq!(value["resolution_ms"], 500);
        let parsed: TemporalScale = serde_json::from_value(value).unwrap();
        assert_eq!(parsed.resolution, TimeDelta::milliseconds(500));
        assert_eq!(parsed, scale);
    }

    #[test]
    fn group_type_serializes_as_name() {
        let json = serde_json::to_string(&GroupType::SplitDataset).unwrap();
        assert_eq!(json, "\"Split dataset\"");
        let parsed: GroupType = serde_json::from_str("\"Composite\"").unwrap();
        assert_eq!(parsed, GroupType::Composite);
    }
}
