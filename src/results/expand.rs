use std::collections::HashSet;

use tracing::debug;

use crate::domain::{Entry, EntryGroup, GroupType, RecordId};
use crate::error::CatalogError;
use crate::store::EntityStore;

use super::set::{Member, ResultSet};

/// The composite group an entry belongs to, if any. Split datasets never act
/// as base group; they show up as nested sets instead.
pub fn find_base_group<S>(store: &S, entry: &Entry) -> Result<Option<EntryGroup>, CatalogError>
where
    S: EntityStore + ?Sized,
{
    entry
        .associated_groups
        .iter()
        .find(|group| group.group_type == GroupType::Composite)
        .map(|group| store.get_group(group.id))
        .transpose()
}

/// Flattens one level of candidate lists and keeps the first member for every
/// checksum.
pub fn dedupe(candidates: Vec<Vec<Member>>) -> Vec<Member> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .flatten()
        .filter(|member| seen.insert(member.checksum().to_string()))
        .collect()
}

/// Walks the group graph for one result set. `building` holds the groups whose
/// sets are currently under construction; meeting one of them again ends the
/// walk for that branch.
pub(super) struct Expansion<'a, S: ?Sized> {
    store: &'a S,
    building: Vec<RecordId>,
}

impl<'a, S> Expansion<'a, S>
where
    S: EntityStore + ?Sized,
{
    pub(super) fn new(store: &'a S) -> Self {
        Self {
            store,
            building: Vec::new(),
        }
    }

    pub(super) fn from_entry(&mut self, entry: &Entry) -> Result<ResultSet, CatalogError> {
        match find_base_group(self.store, entry)? {
            Some(group) => self.from_group(group),
            None => {
                let related = self.expand(entry, None)?;
                let members = dedupe(vec![vec![Member::Record(entry.clone())], related]);
                Ok(ResultSet::assemble(None, members))
            }
        }
    }

    pub(super) fn from_group(&mut self, group: EntryGroup) -> Result<ResultSet, CatalogError> {
        self.building.push(group.id);
        let entries = self.store.group_entries(&group);
        let candidates = entries.and_then(|entries| {
            let mut candidates = Vec::with_capacity(entries.len() * 2);
            for entry in entries {
                let related = self.expand(&entry, Some(&group))?;
                candidates.push(vec![Member::Record(entry)]);
                candidates.push(related);
            }
            Ok(candidates)
        });
        self.building.pop();

        let members = dedupe(candidates?);
        debug!(group = group.id, kind = %group.group_type, members = members.len(), "built result set");
        Ok(ResultSet::assemble(Some(group), members))
    }

    /// Related members of `entry`: the parts of its split datasets as nested
    /// sets and the siblings of its composite groups as plain records.
    fn expand(
        &mut self,
        entry: &Entry,
        base: Option<&EntryGroup>,
    ) -> Result<Vec<Member>, CatalogError> {
        let mut related = Vec::new();

        for group in &entry.associated_groups {
            let terminal = base.is_some_and(|base| base.id == group.id)
                || self.building.contains(&group.id);
            match group.group_type {
                GroupType::SplitDataset if terminal => related.push(Member::Record(entry.clone())),
                GroupType::SplitDataset => {
                    let split = self.store.get_group(group.id)?;
                    related.push(Member::Nested(self.from_group(split)?));
                }
                GroupType::Composite if terminal => related.push(Member::Record(entry.clone())),
                GroupType::Composite => {
                    let composite = self.store.get_group(group.id)?;
                    related.extend(
                        self.store
                            .group_entries(&composite)?
                            .into_iter()
                            .map(Member::Record),
                    );
                }
                _ => {}
            }
        }
        Ok(related)
    }
}
