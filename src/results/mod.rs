//! Consolidation of related catalog records into immutable result sets.
//!
//! A result set bundles everything that belongs to one logical dataset: the
//! entries of a composite group, the parts of a split dataset (as a nested
//! set) and the record that was asked for. Construction walks the group graph
//! once; afterwards the set is a plain value.

mod combine;
mod expand;
mod fields;
mod list;
mod set;

pub use combine::DataSet;
pub use expand::{dedupe, find_base_group};
pub use fields::{ENTRY_FIELDS, FieldValue, GROUP_FIELDS, entry_field, group_field};
pub use list::{IndexKey, ResultList, common_temporal_scale};
pub use set::{Member, ResultInput, ResultSet};
