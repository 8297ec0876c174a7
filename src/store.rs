use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::checksum::{combined_checksum, entry_checksum};
use crate::domain::{
    Contributor, DataSource, Entry, EntryGroup, GroupRef, GroupType, Keyword, KeywordTag,
    License, Location, Lookup, Person, PersonRole, RecordId, Unit, Variable,
};
use crate::error::CatalogError;

pub const CATALOG_SCHEMA_VERSION: u32 = 1;

/// Read access to the entity graph. Everything the consolidation engine needs
/// goes through these four calls.
pub trait EntityStore {
    fn get_entry(&self, id: RecordId) -> Result<Entry, CatalogError>;

    fn get_group(&self, id: RecordId) -> Result<EntryGroup, CatalogError>;

    fn associated_groups(&self, entry: &Entry) -> Result<Vec<EntryGroup>, CatalogError> {
        entry
            .associated_groups
            .iter()
            .map(|group| self.get_group(group.id))
            .collect()
    }

    fn group_entries(&self, group: &EntryGroup) -> Result<Vec<Entry>, CatalogError> {
        group
            .entry_ids
            .iter()
            .map(|id| self.get_entry(*id))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryRow {
    pub id: RecordId,
    pub uuid: Uuid,
    pub title: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
    pub version: u32,
    #[serde(default)]
    pub latest_version_id: Option<RecordId>,
    #[serde(default)]
    pub license_id: Option<RecordId>,
    pub variable_id: RecordId,
    #[serde(default)]
    pub datasource: Option<DataSource>,
    #[serde(default)]
    pub embargo: bool,
    #[serde(default)]
    pub embargo_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_partial: bool,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub citation: Option<String>,
    #[serde(default)]
    pub publication: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupTypeRow {
    pub id: RecordId,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRow {
    pub id: RecordId,
    pub uuid: Uuid,
    pub type_id: RecordId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMemberRow {
    pub group_id: RecordId,
    pub entry_id: RecordId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonAssociationRow {
    pub person_id: RecordId,
    pub entry_id: RecordId,
    pub role_id: RecordId,
    pub order: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableRow {
    pub id: RecordId,
    pub name: String,
    pub symbol: String,
    pub unit_id: RecordId,
    #[serde(default)]
    pub column_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordAssociationRow {
    pub keyword_id: RecordId,
    pub entry_id: RecordId,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetailRow {
    pub id: RecordId,
    pub entry_id: RecordId,
    pub key: String,
    pub value: Value,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub entries: Vec<EntryRow>,
    #[serde(default)]
    pub group_types: Vec<GroupTypeRow>,
    #[serde(default)]
    pub groups: Vec<GroupRow>,
    #[serde(default)]
    pub group_members: Vec<GroupMemberRow>,
    #[serde(default)]
    pub persons: Vec<Person>,
    #[serde(default)]
    pub roles: Vec<PersonRole>,
    #[serde(default)]
    pub person_associations: Vec<PersonAssociationRow>,
    #[serde(default)]
    pub licenses: Vec<License>,
    #[serde(default)]
    pub units: Vec<Unit>,
    #[serde(default)]
    pub variables: Vec<VariableRow>,
    #[serde(default)]
    pub keywords: Vec<Keyword>,
    #[serde(default)]
    pub keyword_associations: Vec<KeywordAssociationRow>,
    #[serde(default)]
    pub details: Vec<DetailRow>,
}

macro_rules! next_id {
    ($name:ident, $table:ident) => {
        pub fn $name(&self) -> RecordId {
            self.$table.iter().map(|row| row.id).max().unwrap_or(0) + 1
        }
    };
}

impl Catalog {
    next_id!(next_entry_id, entries);
    next_id!(next_group_id, groups);
    next_id!(next_group_type_id, group_types);
    next_id!(next_person_id, persons);
    next_id!(next_role_id, roles);
    next_id!(next_license_id, licenses);
    next_id!(next_unit_id, units);
    next_id!(next_variable_id, variables);
    next_id!(next_keyword_id, keywords);
    next_id!(next_detail_id, details);

    pub fn entry_row(&self, id: RecordId) -> Result<&EntryRow, CatalogError> {
        self.entries
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("entry", id))
    }

    pub fn entry_row_mut(&mut self, id: RecordId) -> Result<&mut EntryRow, CatalogError> {
        self.entries
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("entry", id))
    }

    pub fn group_row(&self, id: RecordId) -> Result<&GroupRow, CatalogError> {
        self.groups
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("group", id))
    }

    pub fn group_type_row(&self, id: RecordId) -> Result<&GroupTypeRow, CatalogError> {
        self.group_types
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("group type", id))
    }

    pub fn group_type_by_name(&self, name: &str) -> Result<&GroupTypeRow, CatalogError> {
        let wanted: GroupType = name.parse()?;
        self.group_types
            .iter()
            .find(|row| row.name.parse::<GroupType>().ok().as_ref() == Some(&wanted))
            .ok_or_else(|| CatalogError::not_found("group type", name))
    }

    pub fn person(&self, id: RecordId) -> Result<&Person, CatalogError> {
        self.persons
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("person", id))
    }

    pub fn role(&self, id: RecordId) -> Result<&PersonRole, CatalogError> {
        self.roles
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("person role", id))
    }

    pub fn role_by_name(&self, name: &str) -> Result<&PersonRole, CatalogError> {
        self.roles
            .iter()
            .find(|row| row.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| CatalogError::not_found("person role", name))
    }

    pub fn license(&self, id: RecordId) -> Result<&License, CatalogError> {
        self.licenses
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("license", id))
    }

    pub fn unit(&self, id: RecordId) -> Result<&Unit, CatalogError> {
        self.units
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("unit", id))
    }

    pub fn variable(&self, id: RecordId) -> Result<Variable, CatalogError> {
        let row = self
            .variables
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("variable", id))?;
        Ok(Variable {
            id: row.id,
            name: row.name.clone(),
            symbol: row.symbol.clone(),
            unit: self.unit(row.unit_id)?.clone(),
            column_names: row.column_names.clone(),
        })
    }

    pub fn keyword(&self, id: RecordId) -> Result<&Keyword, CatalogError> {
        self.keywords
            .iter()
            .find(|row| row.id == id)
            .ok_or_else(|| CatalogError::not_found("keyword", id))
    }

    pub fn resolve_person(&self, lookup: &Lookup) -> Result<&Person, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.person(*id),
            Lookup::Name(name) => self
                .persons
                .iter()
                .find(|person| {
                    person.full_name() == *name
                        || person.last_name.as_deref() == Some(name.as_str())
                        || person.organisation_name.as_deref() == Some(name.as_str())
                })
                .ok_or_else(|| CatalogError::not_found("person", name)),
        }
    }

    pub fn resolve_role(&self, lookup: &Lookup) -> Result<&PersonRole, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.role(*id),
            Lookup::Name(name) => self.role_by_name(name),
        }
    }

    pub fn resolve_license(&self, lookup: &Lookup) -> Result<&License, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.license(*id),
            Lookup::Name(name) => self
                .licenses
                .iter()
                .find(|license| license.short_title == *name || license.title == *name)
                .ok_or_else(|| CatalogError::not_found("license", name)),
        }
    }

    pub fn resolve_unit(&self, lookup: &Lookup) -> Result<&Unit, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.unit(*id),
            Lookup::Name(name) => self
                .units
                .iter()
                .find(|unit| unit.name == *name || unit.symbol == *name)
                .ok_or_else(|| CatalogError::not_found("unit", name)),
        }
    }

    pub fn resolve_variable(&self, lookup: &Lookup) -> Result<Variable, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.variable(*id),
            Lookup::Name(name) => {
                let id = self
                    .variables
                    .iter()
                    .find(|variable| variable.name == *name || variable.symbol == *name)
                    .map(|variable| variable.id)
                    .ok_or_else(|| CatalogError::not_found("variable", name))?;
                self.variable(id)
            }
        }
    }

    pub fn resolve_group_type(&self, lookup: &Lookup) -> Result<&GroupTypeRow, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.group_type_row(*id),
            Lookup::Name(name) => self.group_type_by_name(name),
        }
    }

    pub fn resolve_keyword(&self, lookup: &Lookup) -> Result<&Keyword, CatalogError> {
        match lookup {
            Lookup::Id(id) => self.keyword(*id),
            Lookup::Name(path) => {
                let normalized = path.to_uppercase();
                self.keywords
                    .iter()
                    .find(|keyword| keyword.full_path == normalized)
                    .ok_or_else(|| CatalogError::not_found("keyword", path))
            }
        }
    }

    pub fn group_type(&self, group: &GroupRow) -> Result<GroupType, CatalogError> {
        self.group_type_row(group.type_id)?.name.parse()
    }

    pub fn hydrate_entry(&self, row: &EntryRow) -> Result<Entry, CatalogError> {
        let license = row
            .license_id
            .map(|id| self.license(id).cloned())
            .transpose()?;

        let mut contributors = self
            .person_associations
            .iter()
            .filter(|assoc| assoc.entry_id == row.id)
            .map(|assoc| {
                Ok(Contributor {
                    person: self.person(assoc.person_id)?.clone(),
                    role: self.role(assoc.role_id)?.name.clone(),
                    order: assoc.order,
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;
        contributors.sort_by_key(|c| c.order);

        let keywords = self
            .keyword_associations
            .iter()
            .filter(|assoc| assoc.entry_id == row.id)
            .map(|assoc| {
                Ok(KeywordTag {
                    keyword: self.keyword(assoc.keyword_id)?.clone(),
                    alias: assoc.alias.clone(),
                    value: assoc.value.clone(),
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        let details = self
            .details
            .iter()
            .filter(|detail| detail.entry_id == row.id)
            .map(|detail| crate::domain::Detail {
                key: detail.key.clone(),
                value: detail.value.clone(),
                description: detail.description.clone(),
            })
            .collect();

        let associated_groups = self
            .group_members
            .iter()
            .filter(|member| member.entry_id == row.id)
            .map(|member| {
                let group = self.group_row(member.group_id)?;
                Ok(GroupRef {
                    id: group.id,
                    uuid: group.uuid,
                    group_type: self.group_type(group)?,
                    title: group.title.clone(),
                })
            })
            .collect::<Result<Vec<_>, CatalogError>>()?;

        let mut entry = Entry {
            id: row.id,
            uuid: row.uuid,
            title: row.title.clone(),
            abstract_text: row.abstract_text.clone(),
            external_id: row.external_id.clone(),
            location: row.location,
            version: row.version,
            latest_version_id: row.latest_version_id,
            license,
            variable: self.variable(row.variable_id)?,
            datasource: row.datasource.clone(),
            embargo: row.embargo,
            embargo_end: row.embargo_end,
            is_partial: row.is_partial,
            comment: row.comment.clone(),
            citation: row.citation.clone(),
            publication: row.publication,
            last_update: row.last_update,
            contributors,
            keywords,
            details,
            associated_groups,
            checksum: String::new(),
        };
        entry.checksum = entry_checksum(&entry);
        Ok(entry)
    }

    pub fn hydrate_group(&self, row: &GroupRow) -> Result<EntryGroup, CatalogError> {
        let entry_ids = self
            .group_members
            .iter()
            .filter(|member| member.group_id == row.id)
            .map(|member| member.entry_id)
            .collect::<Vec<_>>();
        let checksums = entry_ids
            .iter()
            .map(|id| Ok(self.get_entry(*id)?.checksum))
            .collect::<Result<Vec<_>, CatalogError>>()?;

        Ok(EntryGroup {
            id: row.id,
            uuid: row.uuid,
            group_type: self.group_type(row)?,
            title: row.title.clone(),
            description: row.description.clone(),
            entry_ids,
            checksum: combined_checksum(checksums),
        })
    }

    pub fn populate_defaults(&mut self) {
        if self.schema_version == 0 {
            self.schema_version = CATALOG_SCHEMA_VERSION;
        }

        let group_types = [
            ("Project", "A project groups datasets that were collected or published together."),
            ("Composite", "The member datasets together form one logical dataset."),
            ("Split dataset", "The member datasets are consecutive parts of one series."),
            ("Label", "A free label attached to a set of datasets."),
        ];
        for (name, description) in group_types {
            if self.group_type_by_name(name).is_err() {
                let id = self.next_group_type_id();
                self.group_types.push(GroupTypeRow {
                    id,
                    name: name.to_string(),
                    description: description.to_string(),
                });
            }
        }

        let roles = [
            ("author", "Party who authored the resource."),
            ("coAuthor", "Party who jointly authored the resource."),
            ("pointOfContact", "Party who can be contacted about the resource."),
            ("contributor", "Party contributing to the resource."),
            ("originator", "Party who created the resource."),
            ("owner", "Party that owns the resource."),
            ("publisher", "Party who published the resource."),
        ];
        for (name, description) in roles {
            if self.role_by_name(name).is_err() {
                let id = self.next_role_id();
                self.roles.push(PersonRole {
                    id,
                    name: name.to_string(),
                    description: Some(description.to_string()),
                });
            }
        }

        if self.licenses.is_empty() {
            let licenses = [
                ("CC BY 4.0", "Creative Commons Attribution 4.0 International", "https://creativecommons.org/licenses/by/4.0/", true, false, true),
                ("CC BY-SA 4.0", "Creative Commons Attribution-ShareAlike 4.0 International", "https://creativecommons.org/licenses/by-sa/4.0/", true, true, true),
                ("CC0", "Creative Commons Zero Public Domain Dedication", "https://creativecommons.org/publicdomain/zero/1.0/", false, false, true),
                ("ODbL", "Open Data Commons Open Database License", "https://opendatacommons.org/licenses/odbl/1-0/", true, true, true),
            ];
            for (short_title, title, link, by_attribution, share_alike, commercial_use) in licenses {
                let id = self.next_license_id();
                self.licenses.push(License {
                    id,
                    short_title: short_title.to_string(),
                    title: title.to_string(),
                    summary: None,
                    link: Some(link.to_string()),
                    by_attribution: Some(by_attribution),
                    share_alike: Some(share_alike),
                    commercial_use: Some(commercial_use),
                });
            }
        }

        if self.units.is_empty() {
            let units = [
                ("degree Celsius", "C"),
                ("percent", "%"),
                ("millimeter", "mm"),
                ("cubic meter per second", "m3/s"),
                ("meter per second", "m/s"),
            ];
            for (name, symbol) in units {
                let id = self.next_unit_id();
                self.units.push(Unit {
                    id,
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                });
            }
        }

        if self.variables.is_empty() {
            let variables = [
                ("air temperature", "Ta", "C", "air_temperature"),
                ("relative humidity", "RH", "%", "relative_humidity"),
                ("precipitation", "P", "mm", "precipitation"),
                ("discharge", "Q", "m3/s", "discharge"),
                ("wind speed", "uv", "m/s", "wind_speed"),
            ];
            for (name, symbol, unit_symbol, column) in variables {
                let Some(unit_id) = self
                    .units
                    .iter()
                    .find(|unit| unit.symbol == unit_symbol)
                    .map(|unit| unit.id)
                else {
                    continue;
                };
                let id = self.next_variable_id();
                self.variables.push(VariableRow {
                    id,
                    name: name.to_string(),
                    symbol: symbol.to_string(),
                    unit_id,
                    column_names: vec![column.to_string()],
                });
            }
        }
    }
}

impl EntityStore for Catalog {
    fn get_entry(&self, id: RecordId) -> Result<Entry, CatalogError> {
        self.hydrate_entry(self.entry_row(id)?)
    }

    fn get_group(&self, id: RecordId) -> Result<EntryGroup, CatalogError> {
        self.hydrate_group(self.group_row(id)?)
    }
}

#[derive(Debug, Clone)]
pub struct Store {
    path: Option<Utf8PathBuf>,
    catalog: Catalog,
}

impl Store {
    pub fn open(path: &Utf8Path) -> Result<Self, CatalogError> {
        let catalog = if path.as_std_path().exists() {
            let content = fs::read_to_string(path.as_std_path())
                .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
            serde_json::from_str(&content)
                .map_err(|err| CatalogError::Serialization(err.to_string()))?
        } else {
            Catalog::default()
        };
        info!(path = %path, entries = catalog.entries.len(), "opened catalog");
        Ok(Self {
            path: Some(path.to_path_buf()),
            catalog,
        })
    }

    pub fn in_memory() -> Self {
        let mut catalog = Catalog::default();
        catalog.populate_defaults();
        Self {
            path: None,
            catalog,
        }
    }

    pub fn default_path() -> Result<Utf8PathBuf, CatalogError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("metacatalog").join("catalog.json"))
                    .ok()
            })
            .ok_or_else(|| CatalogError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn path(&self) -> Option<&Utf8Path> {
        self.path.as_deref()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Runs `apply` against a working copy of the catalog. The copy replaces
    /// the live catalog (and is written to disk) only when `apply` succeeds.
    pub fn transaction<T, F>(&mut self, apply: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&mut Catalog) -> Result<T, CatalogError>,
    {
        let mut working = self.catalog.clone();
        match apply(&mut working) {
            Ok(value) => {
                if let Some(path) = &self.path {
                    Self::write_catalog(path, &working)?;
                }
                self.catalog = working;
                debug!("transaction committed");
                Ok(value)
            }
            Err(err) => {
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
        }
    }

    pub fn populate_defaults(&mut self) -> Result<(), CatalogError> {
        self.transaction(|catalog| {
            catalog.populate_defaults();
            Ok(())
        })
    }

    pub fn write_catalog(path: &Utf8Path, catalog: &Catalog) -> Result<(), CatalogError> {
        let content = serde_json::to_vec_pretty(catalog)
            .map_err(|err| CatalogError::Serialization(err.to_string()))?;
        write_bytes_atomic(path, &content)
    }
}

impl EntityStore for Store {
    fn get_entry(&self, id: RecordId) -> Result<Entry, CatalogError> {
        self.catalog.get_entry(id)
    }

    fn get_group(&self, id: RecordId) -> Result<EntryGroup, CatalogError> {
        self.catalog.get_group(id)
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), CatalogError> {
    let parent = path
        .parent()
        .filter(|parent| !parent.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    let temp = tempfile::Builder::new()
        .prefix(".metacatalog")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    fs::write(temp.path(), content).map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| CatalogError::Filesystem(err.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn defaults_are_idempotent() {
        let mut catalog = Catalog::default();
        catalog.populate_defaults();
        let types = catalog.group_types.len();
        let roles = catalog.roles.len();
        catalog.populate_defaults();
        assert_eq!(catalog.group_types.len(), types);
        assert_eq!(catalog.roles.len(), roles);
        assert!(catalog.group_type_by_name("split dataset").is_ok());
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let mut store = Store::in_memory();
        let before = store.catalog().units.len();
        let result: Result<(), CatalogError> = store.transaction(|catalog| {
            let id = catalog.next_unit_id();
            catalog.units.push(Unit {
                id,
                name: "kelvin".to_string(),
                symbol: "K".to_string(),
            });
            Err(CatalogError::MetadataMissing("abort".to_string()))
        });
        assert_matches!(result, Err(CatalogError::MetadataMissing(_)));
        assert_eq!(store.catalog().units.len(), before);
    }

    #[test]
    fn missing_rows_are_not_found() {
        let store = Store::in_memory();
        assert_matches!(store.get_entry(42), Err(CatalogError::NotFound { kind: "entry", .. }));
        assert_matches!(store.get_group(7), Err(CatalogError::NotFound { kind: "group", .. }));
    }
}
