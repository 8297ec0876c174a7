use chrono::Utc;
use serde_json::{Map, Value};
use tracing::info;
use uuid::Uuid;

use crate::domain::{
    DataSource, DataSourceKind, Detail, Entry, EntryGroup, GroupType, Keyword, License, Location,
    Lookup, Person, RecordId, SpatialScale, TemporalScale, Unit, Variable,
};
use crate::error::CatalogError;
use crate::store::{
    Catalog, DetailRow, EntityStore, EntryRow, GroupMemberRow, GroupRow, KeywordAssociationRow,
    PersonAssociationRow, Store, VariableRow,
};

#[derive(Debug, Clone, Default)]
pub struct NewPerson {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub affiliation: Option<String>,
    pub organisation_name: Option<String>,
    pub is_organisation: bool,
}

#[derive(Debug, Clone, Default)]
pub struct NewLicense {
    pub short_title: String,
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub by_attribution: Option<bool>,
    pub share_alike: Option<bool>,
    pub commercial_use: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub title: String,
    pub author: Lookup,
    pub variable: Lookup,
    pub license: Option<Lookup>,
    pub abstract_text: Option<String>,
    pub external_id: Option<String>,
    pub location: Option<Location>,
    pub embargo: bool,
    pub is_partial: bool,
    pub comment: Option<String>,
    pub citation: Option<String>,
}

impl NewEntry {
    pub fn new(title: impl Into<String>, author: impl Into<Lookup>, variable: impl Into<Lookup>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            variable: variable.into(),
            license: None,
            abstract_text: None,
            external_id: None,
            location: None,
            embargo: false,
            is_partial: false,
            comment: None,
            citation: None,
        }
    }
}

pub fn add_person(store: &mut Store, person: NewPerson) -> Result<Person, CatalogError> {
    if person.last_name.is_none() && person.organisation_name.is_none() {
        return Err(CatalogError::MetadataMissing(
            "a person needs a last name or an organisation name".to_string(),
        ));
    }
    store.transaction(|catalog| {
        let row = Person {
            id: catalog.next_person_id(),
            uuid: Uuid::new_v4(),
            first_name: person.first_name,
            last_name: person.last_name,
            affiliation: person.affiliation,
            organisation_name: person.organisation_name,
            is_organisation: person.is_organisation,
        };
        catalog.persons.push(row.clone());
        Ok(row)
    })
}

pub fn add_license(store: &mut Store, license: NewLicense) -> Result<License, CatalogError> {
    store.transaction(|catalog| {
        if catalog.resolve_license(&Lookup::Name(license.short_title.clone())).is_ok() {
            return Err(CatalogError::DuplicateRecord(format!(
                "license {}",
                license.short_title
            )));
        }
        let row = License {
            id: catalog.next_license_id(),
            short_title: license.short_title,
            title: license.title,
            summary: license.summary,
            link: license.link,
            by_attribution: license.by_attribution,
            share_alike: license.share_alike,
            commercial_use: license.commercial_use,
        };
        catalog.licenses.push(row.clone());
        Ok(row)
    })
}

pub fn add_unit(store: &mut Store, name: &str, symbol: &str) -> Result<Unit, CatalogError> {
    store.transaction(|catalog| {
        let row = Unit {
            id: catalog.next_unit_id(),
            name: name.to_string(),
            symbol: symbol.to_string(),
        };
        catalog.units.push(row.clone());
        Ok(row)
    })
}

pub fn add_variable(
    store: &mut Store,
    name: &str,
    symbol: &str,
    unit: &Lookup,
    column_names: Vec<String>,
) -> Result<Variable, CatalogError> {
    store.transaction(|catalog| {
        let unit_id = catalog.resolve_unit(unit)?.id;
        let id = catalog.next_variable_id();
        catalog.variables.push(VariableRow {
            id,
            name: name.to_string(),
            symbol: symbol.to_string(),
            unit_id,
            column_names,
        });
        catalog.variable(id)
    })
}

/// Adds every missing level of a `TOPIC > TERM > LEVEL` keyword path and
/// returns the whole chain, root first.
pub fn add_keyword(store: &mut Store, path: &str) -> Result<Vec<Keyword>, CatalogError> {
    let levels = path
        .to_uppercase()
        .split(" > ")
        .map(|level| level.trim().to_string())
        .collect::<Vec<_>>();
    if levels.iter().any(|level| level.is_empty()) {
        return Err(CatalogError::MetadataMissing(format!(
            "keyword path contains an empty level: {path}"
        )));
    }

    store.transaction(|catalog| {
        let mut parent_id = None;
        let mut chain = Vec::new();
        for (depth, level) in levels.iter().enumerate() {
            let existing = catalog
                .keywords
                .iter()
                .find(|kw| kw.value == *level && kw.parent_id == parent_id)
                .cloned();
            let keyword = match existing {
                Some(keyword) => keyword,
                None => {
                    let keyword = Keyword {
                        id: catalog.next_keyword_id(),
                        uuid: Uuid::new_v4(),
                        value: level.clone(),
                        full_path: levels[..=depth].join(" > "),
                        parent_id,
                    };
                    catalog.keywords.push(keyword.clone());
                    keyword
                }
            };
            parent_id = Some(keyword.id);
            chain.push(keyword);
        }
        Ok(chain)
    })
}

pub fn add_entry(store: &mut Store, entry: NewEntry) -> Result<Entry, CatalogError> {
    let created = store.transaction(|catalog| {
        let author = catalog.resolve_person(&entry.author)?.id;
        let variable_id = catalog.resolve_variable(&entry.variable)?.id;
        let license_id = entry
            .license
            .as_ref()
            .map(|license| catalog.resolve_license(license).map(|l| l.id))
            .transpose()?;
        let role_id = catalog.role_by_name("author")?.id;

        let id = catalog.next_entry_id();
        let now = Utc::now();
        catalog.entries.push(EntryRow {
            id,
            uuid: Uuid::new_v4(),
            title: entry.title,
            abstract_text: entry.abstract_text,
            external_id: entry.external_id,
            location: entry.location,
            version: 1,
            latest_version_id: None,
            license_id,
            variable_id,
            datasource: None,
            embargo: entry.embargo,
            embargo_end: entry
                .embargo
                .then(|| now + chrono::TimeDelta::days(2 * 365)),
            is_partial: entry.is_partial,
            comment: entry.comment,
            citation: entry.citation,
            publication: Some(now),
            last_update: Some(now),
        });
        catalog.person_associations.push(PersonAssociationRow {
            person_id: author,
            entry_id: id,
            role_id,
            order: 1,
        });
        catalog.get_entry(id)
    })?;
    info!(id = created.id, uuid = %created.uuid, "added entry");
    Ok(created)
}

pub fn add_persons_to_entry(
    store: &mut Store,
    entry_id: RecordId,
    persons: &[Lookup],
    role: &Lookup,
    order: Option<u32>,
) -> Result<Entry, CatalogError> {
    store.transaction(|catalog| {
        catalog.entry_row(entry_id)?;
        let role_id = catalog.resolve_role(role)?.id;
        let mut next_order = order.unwrap_or_else(|| {
            catalog
                .person_associations
                .iter()
                .filter(|assoc| assoc.entry_id == entry_id)
                .map(|assoc| assoc.order)
                .max()
                .unwrap_or(0)
                + 1
        });
        for lookup in persons {
            let person_id = catalog.resolve_person(lookup)?.id;
            if catalog
                .person_associations
                .iter()
                .any(|assoc| assoc.entry_id == entry_id && assoc.person_id == person_id)
            {
                return Err(CatalogError::DuplicateRecord(format!(
                    "person {lookup} is already associated with entry {entry_id}"
                )));
            }
            catalog.person_associations.push(PersonAssociationRow {
                person_id,
                entry_id,
                role_id,
                order: next_order,
            });
            next_order += 1;
        }
        touch(catalog, entry_id)?;
        catalog.get_entry(entry_id)
    })
}

pub fn add_keywords_to_entry(
    store: &mut Store,
    entry_id: RecordId,
    keywords: &[Lookup],
    alias: Option<String>,
    value: Option<String>,
) -> Result<Entry, CatalogError> {
    store.transaction(|catalog| {
        catalog.entry_row(entry_id)?;
        for lookup in keywords {
            let keyword_id = catalog.resolve_keyword(lookup)?.id;
            catalog.keyword_associations.push(KeywordAssociationRow {
                keyword_id,
                entry_id,
                alias: alias.clone(),
                value: value.clone(),
            });
        }
        touch(catalog, entry_id)?;
        catalog.get_entry(entry_id)
    })
}

pub fn add_details_to_entry(
    store: &mut Store,
    entry_id: RecordId,
    details: Vec<Detail>,
) -> Result<Entry, CatalogError> {
    store.transaction(|catalog| {
        catalog.entry_row(entry_id)?;
        for detail in details {
            let key = detail.key.trim().to_string();
            if catalog
                .details
                .iter()
                .any(|row| row.entry_id == entry_id && row.key.eq_ignore_ascii_case(&key))
            {
                return Err(CatalogError::DuplicateRecord(format!(
                    "detail {key} on entry {entry_id}"
                )));
            }
            let id = catalog.next_detail_id();
            catalog.details.push(DetailRow {
                id,
                entry_id,
                key,
                value: detail.value,
                description: detail.description,
            });
        }
        touch(catalog, entry_id)?;
        catalog.get_entry(entry_id)
    })
}

pub fn add_group(
    store: &mut Store,
    group_type: &Lookup,
    entry_ids: &[RecordId],
    title: Option<String>,
    description: Option<String>,
) -> Result<EntryGroup, CatalogError> {
    let group = store.transaction(|catalog| {
        let type_id = catalog.resolve_group_type(group_type)?.id;
        let id = catalog.next_group_id();
        catalog.groups.push(GroupRow {
            id,
            uuid: Uuid::new_v4(),
            type_id,
            title,
            description,
        });
        for entry_id in entry_ids {
            catalog.entry_row(*entry_id)?;
            if !catalog
                .group_members
                .iter()
                .any(|m| m.group_id == id && m.entry_id == *entry_id)
            {
                catalog.group_members.push(GroupMemberRow {
                    group_id: id,
                    entry_id: *entry_id,
                });
            }
        }
        catalog.get_group(id)
    })?;
    info!(id = group.id, group_type = %group.group_type, members = group.entry_ids.len(), "added group");
    Ok(group)
}

pub fn add_project(
    store: &mut Store,
    entry_ids: &[RecordId],
    title: Option<String>,
    description: Option<String>,
) -> Result<EntryGroup, CatalogError> {
    add_group(store, &Lookup::Name("Project".to_string()), entry_ids, title, description)
}

pub fn make_composite(
    store: &mut Store,
    entry_id: RecordId,
    others: &[RecordId],
    title: Option<String>,
    description: Option<String>,
) -> Result<EntryGroup, CatalogError> {
    let mut members = vec![entry_id];
    members.extend(others.iter().copied().filter(|id| *id != entry_id));
    add_group(
        store,
        &Lookup::Name("Composite".to_string()),
        &members,
        title,
        description,
    )
}

pub fn add_entry_to_project(
    store: &mut Store,
    entry_id: RecordId,
    group_id: RecordId,
) -> Result<EntryGroup, CatalogError> {
    store.transaction(|catalog| {
        catalog.entry_row(entry_id)?;
        let group = catalog.group_row(group_id)?;
        let group_type = catalog.group_type(group)?;
        if group_type != GroupType::Project {
            return Err(CatalogError::GroupTypeMismatch {
                expected: GroupType::Project.to_string(),
                found: group_type.to_string(),
            });
        }
        if !catalog
            .group_members
            .iter()
            .any(|m| m.group_id == group_id && m.entry_id == entry_id)
        {
            catalog.group_members.push(GroupMemberRow { group_id, entry_id });
        }
        catalog.get_group(group_id)
    })
}

pub fn create_datasource(
    store: &mut Store,
    entry_id: RecordId,
    kind: DataSourceKind,
    path: &str,
    args: Map<String, Value>,
) -> Result<Entry, CatalogError> {
    store.transaction(|catalog| {
        let row = catalog.entry_row_mut(entry_id)?;
        if row.datasource.is_some() {
            return Err(CatalogError::DuplicateRecord(format!(
                "datasource of entry {entry_id}"
            )));
        }
        row.datasource = Some(DataSource {
            kind,
            path: path.to_string(),
            args,
            variable_names: Vec::new(),
            temporal_scale: None,
            spatial_scale: None,
            encoding: Some("utf-8".to_string()),
        });
        touch(catalog, entry_id)?;
        catalog.get_entry(entry_id)
    })
}

/// Detaches the datasource from an entry. The data itself is left alone.
pub fn remove_datasource(store: &mut Store, entry_id: RecordId) -> Result<Entry, CatalogError> {
    let entry = store.transaction(|catalog| {
        let row = catalog.entry_row_mut(entry_id)?;
        if row.datasource.take().is_none() {
            return Err(CatalogError::MetadataMissing(format!(
                "entry {entry_id} has no datasource"
            )));
        }
        touch(catalog, entry_id)?;
        catalog.get_entry(entry_id)
    })?;
    info!(id = entry_id, "removed datasource");
    Ok(entry)
}

pub fn create_temporal_scale(
    store: &mut Store,
    entry_id: RecordId,
    scale: TemporalScale,
) -> Result<Entry, CatalogError> {
    if scale.extent.0 > scale.extent.1 {
        return Err(CatalogError::InvalidTimestamp(format!(
            "extent starts after it ends: {} > {}",
            scale.extent.0, scale.extent.1
        )));
    }
    update_datasource(store, entry_id, |datasource| {
        datasource.temporal_scale = Some(scale);
    })
}

pub fn create_spatial_scale(
    store: &mut Store,
    entry_id: RecordId,
    scale: SpatialScale,
) -> Result<Entry, CatalogError> {
    update_datasource(store, entry_id, |datasource| {
        datasource.spatial_scale = Some(scale);
    })
}

fn update_datasource<F>(store: &mut Store, entry_id: RecordId, update: F) -> Result<Entry, CatalogError>
where
    F: FnOnce(&mut DataSource),
{
    store.transaction(|catalog| {
        let row = catalog.entry_row_mut(entry_id)?;
        let datasource = row.datasource.as_mut().ok_or_else(|| {
            CatalogError::MetadataMissing(format!("entry {entry_id} has no datasource"))
        })?;
        update(datasource);
        touch(catalog, entry_id)?;
        catalog.get_entry(entry_id)
    })
}

fn touch(catalog: &mut Catalog, entry_id: RecordId) -> Result<(), CatalogError> {
    catalog.entry_row_mut(entry_id)?.last_update = Some(Utc::now());
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn store_with_author() -> Store {
        let mut store = Store::in_memory();
        add_person(
            &mut store,
            NewPerson {
                first_name: Some("Homer".to_string()),
                last_name: Some("Simpson".to_string()),
                ..NewPerson::default()
            },
        )
        .unwrap();
        store
    }

    #[test]
    fn add_entry_sets_first_author() {
        let mut store = store_with_author();
        let entry = add_entry(
            &mut store,
            NewEntry::new("Telegraph", "Simpson", "air temperature"),
        )
        .unwrap();
        assert_eq!(entry.author().unwrap().full_name(), "Homer Simpson");
        assert_eq!(entry.version, 1);
        assert_eq!(entry.checksum.len(), 64);
    }

    #[test]
    fn add_keyword_reuses_levels() {
        let mut store = Store::in_memory();
        let first = add_keyword(&mut store, "Earth Science > Atmosphere > Air Temperature").unwrap();
        let second = add_keyword(&mut store, "EARTH SCIENCE > Atmosphere > Humidity").unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[1].id, second[1].id);
        assert_ne!(first[2].id, second[2].id);
        assert_eq!(second[2].full_path, "EARTH SCIENCE > ATMOSPHERE > HUMIDITY");
    }

    #[test]
    fn duplicate_detail_keys_roll_back() {
        let mut store = store_with_author();
        let entry = add_entry(&mut store, NewEntry::new("Gauge", "Simpson", "discharge")).unwrap();
        let detail = |key: &str| Detail {
            key: key.to_string(),
            value: Value::from(1),
            description: None,
        };
        let err = add_details_to_entry(&mut store, entry.id, vec![detail("depth"), detail("Depth")])
            .unwrap_err();
        assert_matches!(err, CatalogError::DuplicateRecord(_));
        assert!(store.get_entry(entry.id).unwrap().details.is_empty());
    }

    #[test]
    fn project_membership_requires_project_group() {
        let mut store = store_with_author();
        let a = add_entry(&mut store, NewEntry::new("A", "Simpson", "discharge")).unwrap();
        let b = add_entry(&mut store, NewEntry::new("B", "Simpson", "discharge")).unwrap();
        let composite = make_composite(&mut store, a.id, &[b.id], None, None).unwrap();
        let err = add_entry_to_project(&mut store, b.id, composite.id).unwrap_err();
        assert_matches!(err, CatalogError::GroupTypeMismatch { .. });

        let project = add_project(&mut store, &[a.id], Some("Campaign".to_string()), None).unwrap();
        let project = add_entry_to_project(&mut store, b.id, project.id).unwrap();
        assert_eq!(project.entry_ids, vec![a.id, b.id]);
    }

    #[test]
    fn datasource_is_created_once() {
        let mut store = store_with_author();
        let entry = add_entry(&mut store, NewEntry::new("Gauge", "Simpson", "discharge")).unwrap();
        let err = create_temporal_scale(
            &mut store,
            entry.id,
            TemporalScale {
                extent: (Utc::now(), Utc::now()),
                resolution: chrono::TimeDelta::minutes(10),
                support: 1.0,
                dimension_names: Vec::new(),
            },
        )
        .unwrap_err();
        assert_matches!(err, CatalogError::MetadataMissing(_));

        create_datasource(&mut store, entry.id, DataSourceKind::Internal, "gauge.json", Map::new())
            .unwrap();
        let err = create_datasource(&mut store, entry.id, DataSourceKind::Internal, "x.json", Map::new())
            .unwrap_err();
        assert_matches!(err, CatalogError::DuplicateRecord(_));
    }
}
