use serde_json::Value;
use tracing::warn;

use crate::domain::{Entry, TemporalScale};
use crate::error::CatalogError;
use crate::flatten::{flatten, leaves};
use crate::store::EntityStore;

use super::set::{ResultInput, ResultSet};

/// Lookup key for [`ResultList::index`].
#[derive(Debug, Clone, Copy)]
pub enum IndexKey<'a> {
    Set(&'a ResultSet),
    Entry(&'a Entry),
    /// A set checksum, or any metadata value of a set.
    Text(&'a str),
    Value(&'a Value),
}

impl<'a> From<&'a ResultSet> for IndexKey<'a> {
    fn from(value: &'a ResultSet) -> Self {
        IndexKey::Set(value)
    }
}

impl<'a> From<&'a Entry> for IndexKey<'a> {
    fn from(value: &'a Entry) -> Self {
        IndexKey::Entry(value)
    }
}

impl<'a> From<&'a str> for IndexKey<'a> {
    fn from(value: &'a str) -> Self {
        IndexKey::Text(value)
    }
}

impl<'a> From<&'a Value> for IndexKey<'a> {
    fn from(value: &'a Value) -> Self {
        IndexKey::Value(value)
    }
}

/// Ordered collection of result sets, unique by checksum.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultList {
    sets: Vec<ResultSet>,
}

impl ResultList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_inputs<S, I>(store: &S, inputs: I) -> Result<Self, CatalogError>
    where
        S: EntityStore + ?Sized,
        I: IntoIterator,
        I::Item: Into<ResultInput>,
    {
        let mut list = Self::new();
        for input in inputs {
            let set = ResultSet::build(store, input)?;
            if !list.contains(&set) {
                list.sets.push(set);
            }
        }
        Ok(list)
    }

    /// Adds the set built from `item`. Returns `false` when a set with the same
    /// checksum is already listed; the list is left unchanged in that case.
    pub fn append<S>(&mut self, store: &S, item: impl Into<ResultInput>) -> Result<bool, CatalogError>
    where
        S: EntityStore + ?Sized,
    {
        let set = ResultSet::build(store, item)?;
        if self.contains(&set) {
            warn!(checksum = %set.checksum(), "result set already listed");
            return Ok(false);
        }
        self.sets.push(set);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&ResultSet> {
        self.sets.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultSet> {
        self.sets.iter()
    }

    pub fn contains(&self, set: &ResultSet) -> bool {
        self.sets.iter().any(|known| known.checksum() == set.checksum())
    }

    pub fn index<'a>(&self, key: impl Into<IndexKey<'a>>) -> Result<usize, CatalogError> {
        match key.into() {
            IndexKey::Set(set) => self.position_of_checksum(set.checksum()),
            IndexKey::Entry(entry) => self
                .sets
                .iter()
                .position(|set| set.contains_checksum(&entry.checksum))
                .ok_or_else(|| CatalogError::not_found("result set", &entry.uuid)),
            IndexKey::Text(text) => self
                .position_of_checksum(text)
                .or_else(|_| self.position_of_value(text)),
            IndexKey::Value(Value::String(text)) => self
                .position_of_checksum(text)
                .or_else(|_| self.position_of_value(text)),
            IndexKey::Value(other) => Err(CatalogError::UnsupportedType(format!(
                "cannot look up a result set by {other}"
            ))),
        }
    }

    /// Common temporal scale over every listed set.
    pub fn temporal_scale(&self) -> Option<TemporalScale> {
        let scales = self
            .sets
            .iter()
            .filter_map(ResultSet::temporal_scale)
            .collect::<Vec<_>>();
        common_temporal_scale(&scales)
    }

    fn position_of_checksum(&self, checksum: &str) -> Result<usize, CatalogError> {
        self.sets
            .iter()
            .position(|set| set.checksum() == checksum)
            .ok_or_else(|| CatalogError::not_found("result set", checksum))
    }

    fn position_of_value(&self, text: &str) -> Result<usize, CatalogError> {
        self.sets
            .iter()
            .position(|set| {
                let flat = Value::Object(flatten(&set.to_dict()));
                leaves(&flat).into_iter().any(|leaf| match leaf {
                    Value::String(value) => value == text,
                    other => other.to_string() == text,
                })
            })
            .ok_or_else(|| CatalogError::not_found("result set", text))
    }
}

impl<'a> IntoIterator for &'a ResultList {
    type Item = &'a ResultSet;
    type IntoIter = std::slice::Iter<'a, ResultSet>;

    fn into_iter(self) -> Self::IntoIter {
        self.sets.iter()
    }
}

/// Extent is the union of all extents, resolution the coarsest one. Support is
/// the smallest support duration expressed in units of that resolution.
pub fn common_temporal_scale(scales: &[TemporalScale]) -> Option<TemporalScale> {
    let start = scales.iter().map(|scale| scale.extent.0).min()?;
    let end = scales.iter().map(|scale| scale.extent.1).max()?;
    let resolution = scales.iter().map(|scale| scale.resolution).max()?;
    let support = scales.iter().map(TemporalScale::support_duration).min()?;

    let mut dimension_names: Vec<String> = Vec::new();
    for name in scales.iter().flat_map(|scale| &scale.dimension_names) {
        if !dimension_names.contains(name) {
            dimension_names.push(name.clone());
        }
    }

    let resolution_ms = resolution.num_milliseconds();
    let support = if resolution_ms == 0 {
        1.0
    } else {
        support.num_milliseconds() as f64 / resolution_ms as f64
    };
    Some(TemporalScale {
        extent: (start, end),
        resolution,
        support,
        dimension_names,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::domain::parse_timestamp;

    fn scale(start: &str, end: &str, resolution: TimeDelta, support: f64) -> TemporalScale {
        TemporalScale {
            extent: (parse_timestamp(start).unwrap(), parse_timestamp(end).unwrap()),
            resolution,
            support,
            dimension_names: vec!["tstamp".to_string()],
        }
    }

    #[test]
    fn extent_is_a_union() {
        let scales = vec![
            scale("2020-01-01", "2020-01-05", TimeDelta::minutes(10), 1.0),
            scale("2020-01-03", "2020-01-08", TimeDelta::hours(1), 1.0),
            scale("2020-01-10", "2020-01-12", TimeDelta::minutes(30), 1.0),
        ];
        let common = common_temporal_scale(&scales).unwrap();
        assert_eq!(common.extent.0, parse_timestamp("2020-01-01").unwrap());
        assert_eq!(common.extent.1, parse_timestamp("2020-01-12").unwrap());
        assert_eq!(common.resolution, TimeDelta::hours(1));
        // 10 minutes of support in units of one hour
        assert!((common.support - 1.0 / 6.0).abs() < 1e-9);
        assert_eq!(common.dimension_names, vec!["tstamp".to_string()]);
    }

    #[test]
    fn no_scales_no_result() {
        assert_eq!(common_temporal_scale(&[]), None);
    }
}
