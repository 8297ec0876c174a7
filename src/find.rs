use std::collections::HashSet;
use std::str::FromStr;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::domain::{
    Entry, EntryGroup, GroupType, Keyword, License, Lookup, Person, PersonRole, RecordId, Variable,
};
use crate::error::CatalogError;
use crate::results::ResultSet;
use crate::store::{Catalog, EntityStore, GroupTypeRow, Store};

/// String filter with `*`/`%` wildcards. A leading `!` inverts the match.
#[derive(Debug, Clone)]
pub struct Pattern {
    regex: Regex,
    invert: bool,
}

impl Pattern {
    pub fn new(raw: &str) -> Result<Self, CatalogError> {
        let (invert, body) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let expression = body
            .split(['*', '%'])
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{expression}$"))
            .map_err(|err| CatalogError::InvalidPattern(format!("{raw}: {err}")))?;
        Ok(Self { regex, invert })
    }

    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value) != self.invert
    }

    /// Missing values never match, inverted or not.
    pub fn matches(&self, value: Option<&str>) -> bool {
        value.is_some_and(|value| self.is_match(value))
    }
}

impl FromStr for Pattern {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::new(s)
    }
}

fn pattern(raw: &Option<String>) -> Result<Option<Pattern>, CatalogError> {
    raw.as_deref().map(Pattern::new).transpose()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionFilter {
    #[default]
    Latest,
    Exact(u32),
    Any,
}

#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
    pub id: Option<RecordId>,
    pub uuid: Option<Uuid>,
    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub external_id: Option<String>,
    pub version: VersionFilter,
    /// Project group by id, or a title pattern over all projects.
    pub project: Option<Lookup>,
    /// Person id, or a pattern on the last or organisation name.
    pub author: Option<Lookup>,
    pub coauthor: Option<Lookup>,
    /// Keyword ids or path patterns. Every keyword has to be tagged.
    pub keywords: Vec<Lookup>,
    /// Key and value patterns. Every pair has to match one detail.
    pub details: Vec<(String, String)>,
    pub variable: Option<Lookup>,
    pub license: Option<Lookup>,
    pub include_partial: bool,
    pub as_result: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct GroupQuery {
    pub id: Option<RecordId>,
    pub uuid: Option<Uuid>,
    pub title: Option<String>,
    pub group_type: Option<Lookup>,
    pub as_result: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PersonQuery {
    pub id: Option<RecordId>,
    pub uuid: Option<Uuid>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation_name: Option<String>,
    pub affiliation: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct KeywordQuery {
    pub id: Option<RecordId>,
    pub uuid: Option<Uuid>,
    pub value: Option<String>,
    pub full_path: Option<String>,
}

/// Hits of a find call, either as stored records or wrapped into result sets.
#[derive(Debug, Clone)]
pub enum Found<T> {
    Records(Vec<T>),
    Results(Vec<ResultSet>),
}

impl<T> Found<T> {
    pub fn len(&self) -> usize {
        match self {
            Found::Records(records) => records.len(),
            Found::Results(sets) => sets.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<T> {
        match self {
            Found::Records(records) => records,
            Found::Results(_) => Vec::new(),
        }
    }

    pub fn into_results(self) -> Vec<ResultSet> {
        match self {
            Found::Records(_) => Vec::new(),
            Found::Results(sets) => sets,
        }
    }
}

struct PersonFilter {
    id: Option<RecordId>,
    name: Option<Pattern>,
    roles: &'static [&'static str],
}

impl PersonFilter {
    fn new(lookup: &Option<Lookup>, roles: &'static [&'static str]) -> Result<Option<Self>, CatalogError> {
        Ok(match lookup {
            None => None,
            Some(Lookup::Id(id)) => Some(Self {
                id: Some(*id),
                name: None,
                roles,
            }),
            Some(Lookup::Name(name)) => Some(Self {
                id: None,
                name: Some(Pattern::new(name)?),
                roles,
            }),
        })
    }

    fn matches(&self, entry: &Entry) -> bool {
        entry
            .contributors
            .iter()
            .filter(|c| self.roles.contains(&c.role.as_str()))
            .any(|c| match (&self.id, &self.name) {
                (Some(id), _) => c.person.id == *id,
                (None, Some(name)) => {
                    name.matches(c.person.last_name.as_deref())
                        || name.matches(c.person.organisation_name.as_deref())
                }
                (None, None) => true,
            })
    }
}

enum ProjectFilter {
    Id(RecordId),
    Title(Pattern),
}

fn project_filter(catalog: &Catalog, lookup: &Option<Lookup>) -> Result<Option<ProjectFilter>, CatalogError> {
    match lookup {
        None => Ok(None),
        Some(Lookup::Id(id)) => {
            let group = catalog.group_row(*id)?;
            let group_type = catalog.group_type(group)?;
            if group_type != GroupType::Project {
                return Err(CatalogError::GroupTypeMismatch {
                    expected: GroupType::Project.to_string(),
                    found: group_type.to_string(),
                });
            }
            Ok(Some(ProjectFilter::Id(*id)))
        }
        Some(Lookup::Name(title)) => Ok(Some(ProjectFilter::Title(Pattern::new(title)?))),
    }
}

enum LookupFilter {
    Id(RecordId),
    Name(Pattern),
}

impl LookupFilter {
    fn new(lookup: &Lookup) -> Result<Self, CatalogError> {
        Ok(match lookup {
            Lookup::Id(id) => LookupFilter::Id(*id),
            Lookup::Name(name) => LookupFilter::Name(Pattern::new(name)?),
        })
    }

    fn matches(&self, id: RecordId, names: &[&str]) -> bool {
        match self {
            LookupFilter::Id(wanted) => id == *wanted,
            LookupFilter::Name(pattern) => names.iter().any(|name| pattern.is_match(name)),
        }
    }
}

fn detail_matches(entry: &Entry, key: &Pattern, value: &Pattern) -> bool {
    entry.details.iter().any(|detail| {
        let text = match &detail.value {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        key.is_match(&detail.key) && value.is_match(&text)
    })
}

pub fn find_entry(store: &Store, query: &EntryQuery) -> Result<Found<Entry>, CatalogError> {
    let catalog = store.catalog();
    let title = pattern(&query.title)?;
    let abstract_text = pattern(&query.abstract_text)?;
    let external_id = pattern(&query.external_id)?;
    let project = project_filter(catalog, &query.project)?;
    let author = PersonFilter::new(&query.author, &["author", "originator"])?;
    let coauthor = PersonFilter::new(&query.coauthor, &["author", "originator", "coAuthor"])?;
    let keywords = query
        .keywords
        .iter()
        .map(LookupFilter::new)
        .collect::<Result<Vec<_>, _>>()?;
    let details = query
        .details
        .iter()
        .map(|(key, value)| Ok((Pattern::new(key)?, Pattern::new(value)?)))
        .collect::<Result<Vec<_>, CatalogError>>()?;
    let variable = query.variable.as_ref().map(LookupFilter::new).transpose()?;
    let license = query.license.as_ref().map(LookupFilter::new).transpose()?;

    let mut hits = Vec::new();
    for row in &catalog.entries {
        if query.id.is_some_and(|id| id != row.id) || query.uuid.is_some_and(|uuid| uuid != row.uuid) {
            continue;
        }
        let entry = catalog.hydrate_entry(row)?;

        let keep = (query.include_partial || !entry.is_partial)
            && match query.version {
                VersionFilter::Latest => entry.is_latest_version(),
                VersionFilter::Exact(version) => entry.version == version,
                VersionFilter::Any => true,
            }
            && title.as_ref().is_none_or(|p| p.is_match(&entry.title))
            && abstract_text.as_ref().is_none_or(|p| p.matches(entry.abstract_text.as_deref()))
            && external_id.as_ref().is_none_or(|p| p.matches(entry.external_id.as_deref()))
            && project.as_ref().is_none_or(|filter| {
                entry.projects().iter().any(|group| match filter {
                    ProjectFilter::Id(id) => group.id == *id,
                    ProjectFilter::Title(pattern) => pattern.matches(group.title.as_deref()),
                })
            })
            && author.as_ref().is_none_or(|filter| filter.matches(&entry))
            && coauthor.as_ref().is_none_or(|filter| filter.matches(&entry))
            && keywords.iter().all(|filter| {
                entry.keywords.iter().any(|tag| {
                    filter.matches(
                        tag.keyword.id,
                        &[tag.keyword.full_path.as_str(), tag.keyword.value.as_str()],
                    )
                })
            })
            && details.iter().all(|(key, value)| detail_matches(&entry, key, value))
            && variable.as_ref().is_none_or(|filter| {
                filter.matches(
                    entry.variable.id,
                    &[entry.variable.name.as_str(), entry.variable.symbol.as_str()],
                )
            })
            && license.as_ref().is_none_or(|filter| {
                entry.license.as_ref().is_some_and(|l| {
                    filter.matches(l.id, &[l.short_title.as_str(), l.title.as_str()])
                })
            });

        if keep {
            hits.push(entry);
            if query.limit.is_some_and(|limit| hits.len() >= limit) {
                break;
            }
        }
    }
    debug!(hits = hits.len(), as_result = query.as_result, "find entry");

    if !query.as_result {
        return Ok(Found::Records(hits));
    }
    let sets = hits
        .into_iter()
        .map(|entry| ResultSet::from_entry(store, &entry))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Found::Results(unique_sets(sets)))
}

/// Drops empty sets and repeated checksums; the first set wins.
fn unique_sets(sets: Vec<ResultSet>) -> Vec<ResultSet> {
    let mut seen = HashSet::new();
    sets.into_iter()
        .filter(|set| !set.is_empty())
        .filter(|set| seen.insert(set.checksum().to_string()))
        .collect()
}

pub fn find_group(store: &Store, query: &GroupQuery) -> Result<Found<EntryGroup>, CatalogError> {
    let catalog = store.catalog();
    let title = pattern(&query.title)?;
    let group_type = query
        .group_type
        .as_ref()
        .map(|lookup| catalog.resolve_group_type(lookup).map(|row| row.id))
        .transpose()?;

    let mut hits = Vec::new();
    for row in &catalog.groups {
        let keep = query.id.is_none_or(|id| id == row.id)
            && query.uuid.is_none_or(|uuid| uuid == row.uuid)
            && group_type.is_none_or(|type_id| type_id == row.type_id)
            && title.as_ref().is_none_or(|p| p.matches(row.title.as_deref()));
        if keep {
            hits.push(catalog.hydrate_group(row)?);
        }
    }
    debug!(hits = hits.len(), as_result = query.as_result, "find group");

    if !query.as_result {
        return Ok(Found::Records(hits));
    }
    let sets = hits
        .into_iter()
        .map(|group| ResultSet::from_group(store, group))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Found::Results(sets))
}

pub fn find_person(store: &Store, query: &PersonQuery) -> Result<Vec<Person>, CatalogError> {
    let first_name = pattern(&query.first_name)?;
    let last_name = pattern(&query.last_name)?;
    let organisation_name = pattern(&query.organisation_name)?;
    let affiliation = pattern(&query.affiliation)?;

    Ok(store
        .catalog()
        .persons
        .iter()
        .filter(|person| {
            query.id.is_none_or(|id| id == person.id)
                && query.uuid.is_none_or(|uuid| uuid == person.uuid)
                && first_name.as_ref().is_none_or(|p| p.matches(person.first_name.as_deref()))
                && last_name.as_ref().is_none_or(|p| p.matches(person.last_name.as_deref()))
                && organisation_name
                    .as_ref()
                    .is_none_or(|p| p.matches(person.organisation_name.as_deref()))
                && affiliation.as_ref().is_none_or(|p| p.matches(person.affiliation.as_deref()))
        })
        .cloned()
        .collect())
}

pub fn find_license(store: &Store, lookup: &Lookup) -> Result<Vec<License>, CatalogError> {
    let filter = LookupFilter::new(lookup)?;
    Ok(store
        .catalog()
        .licenses
        .iter()
        .filter(|l| filter.matches(l.id, &[l.short_title.as_str(), l.title.as_str()]))
        .cloned()
        .collect())
}

pub fn find_variable(store: &Store, lookup: &Lookup) -> Result<Vec<Variable>, CatalogError> {
    let filter = LookupFilter::new(lookup)?;
    let catalog = store.catalog();
    catalog
        .variables
        .iter()
        .filter(|v| filter.matches(v.id, &[v.name.as_str(), v.symbol.as_str()]))
        .map(|v| catalog.variable(v.id))
        .collect()
}

pub fn find_keyword(store: &Store, query: &KeywordQuery) -> Result<Vec<Keyword>, CatalogError> {
    let value = pattern(&query.value)?;
    let full_path = pattern(&query.full_path)?;
    Ok(store
        .catalog()
        .keywords
        .iter()
        .filter(|keyword| {
            query.id.is_none_or(|id| id == keyword.id)
                && query.uuid.is_none_or(|uuid| uuid == keyword.uuid)
                && value.as_ref().is_none_or(|p| p.is_match(&keyword.value))
                && full_path.as_ref().is_none_or(|p| p.is_match(&keyword.full_path))
        })
        .cloned()
        .collect())
}

pub fn find_group_type(store: &Store, lookup: &Lookup) -> Result<Vec<GroupTypeRow>, CatalogError> {
    let filter = LookupFilter::new(lookup)?;
    Ok(store
        .catalog()
        .group_types
        .iter()
        .filter(|row| filter.matches(row.id, &[row.name.as_str()]))
        .cloned()
        .collect())
}

pub fn find_role(store: &Store, lookup: &Lookup) -> Result<Vec<PersonRole>, CatalogError> {
    let filter = LookupFilter::new(lookup)?;
    Ok(store
        .catalog()
        .roles
        .iter()
        .filter(|role| filter.matches(role.id, &[role.name.as_str()]))
        .cloned()
        .collect())
}

/// Any catalog object addressable by UUID.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "object", rename_all = "snake_case")]
pub enum CatalogObject {
    Entry(Entry),
    Group(EntryGroup),
    Person(Person),
    Keyword(Keyword),
    #[serde(skip)]
    Result(ResultSet),
}

impl CatalogObject {
    pub fn into_result_set<S>(self, store: &S) -> Result<ResultSet, CatalogError>
    where
        S: EntityStore + ?Sized,
    {
        match self {
            CatalogObject::Entry(entry) => ResultSet::from_entry(store, &entry),
            CatalogObject::Group(group) => ResultSet::from_group(store, group),
            CatalogObject::Result(set) => Ok(set),
            CatalogObject::Person(_) => Err(CatalogError::UnsupportedType(
                "a person cannot be consolidated into a result set".to_string(),
            )),
            CatalogObject::Keyword(_) => Err(CatalogError::UnsupportedType(
                "a keyword cannot be consolidated into a result set".to_string(),
            )),
        }
    }
}

/// Resolves `uuid` against entries, groups, persons and keywords, in that
/// order. With `as_result` entries and groups come back as result sets.
pub fn get_uuid(store: &Store, uuid: &Uuid, as_result: bool) -> Result<CatalogObject, CatalogError> {
    let catalog = store.catalog();
    let object = if let Some(row) = catalog.entries.iter().find(|row| row.uuid == *uuid) {
        CatalogObject::Entry(catalog.hydrate_entry(row)?)
    } else if let Some(row) = catalog.groups.iter().find(|row| row.uuid == *uuid) {
        CatalogObject::Group(catalog.hydrate_group(row)?)
    } else if let Some(person) = catalog.persons.iter().find(|p| p.uuid == *uuid) {
        CatalogObject::Person(person.clone())
    } else if let Some(keyword) = catalog.keywords.iter().find(|k| k.uuid == *uuid) {
        CatalogObject::Keyword(keyword.clone())
    } else {
        return Err(CatalogError::not_found("uuid", uuid));
    };

    match object {
        CatalogObject::Entry(_) | CatalogObject::Group(_) if as_result => {
            Ok(CatalogObject::Result(object.into_result_set(store)?))
        }
        other => Ok(other),
    }
}
