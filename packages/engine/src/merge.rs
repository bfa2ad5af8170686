//! Per-layer record merging.

use std::collections::BTreeMap;

use wri_intersect_models::{AttributeRecord, FieldValue, multiset_key};

/// Accumulates the records of one layer, merging features whose attribute
/// tuples are equal as unordered multisets.
///
/// Records keep the order in which each distinct tuple was first seen.
#[derive(Debug, Default)]
pub struct RecordAccumulator {
    records: Vec<AttributeRecord>,
    positions: BTreeMap<Vec<FieldValue>, usize>,
}

impl RecordAccumulator {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one feature's contribution. Returns `true` if it was merged
    /// into an existing record.
    pub fn add(&mut self, attributes: Vec<FieldValue>, measure: f64) -> bool {
        let key = multiset_key(&attributes);

        if let Some(&position) = self.positions.get(&key) {
            self.records[position].intersect += measure;
            return true;
        }

        self.positions.insert(key, self.records.len());
        self.records.push(AttributeRecord::new(attributes, measure));
        false
    }

    /// Number of distinct tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The merged records in first-seen order.
    #[must_use]
    pub fn into_records(self) -> Vec<AttributeRecord> {
        self.records
    }
}
