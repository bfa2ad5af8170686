//! Request-scoped layer criteria.
//!
//! Criteria map a catalog layer index (as a string key, matching the JSON
//! wire format) to the field names whose values should be extracted from
//! each intersecting feature of that layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Category whose features also report stream lengths.
const AQUATIC_CATEGORY: &str = "aquatic/riparian treatment area";

/// Layer index -> requested field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntersectionCriteria(BTreeMap<String, Vec<String>>);

impl IntersectionCriteria {
    /// Creates empty criteria.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Parses criteria from their JSON object form, e.g.
    /// `{"14": ["name"], "4": ["owner", "admin"]}`.
    ///
    /// # Errors
    ///
    /// Returns a [`serde_json::Error`] if the text is not an object of
    /// string arrays.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Requests `fields` for the layer at `index`, replacing any earlier
    /// request for that layer.
    pub fn insert(&mut self, index: impl ToString, fields: &[&str]) {
        self.0.insert(
            index.to_string(),
            fields.iter().map(|f| (*f).to_string()).collect(),
        );
    }

    /// Builder form of [`Self::insert`].
    #[must_use]
    pub fn with(mut self, index: impl ToString, fields: &[&str]) -> Self {
        self.insert(index, fields);
        self
    }

    /// Iterates `(layer index key, requested fields)` in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of requested layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no layer is requested.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The criteria the project web layer sends for a feature of the given
    /// category: focus area region, land ownership, sage grouse management
    /// area, and county. Aquatic/riparian treatment areas also request the
    /// stream layer so stream lengths are recorded.
    #[must_use]
    pub fn standard_for_category(category: &str) -> Self {
        let criteria = Self::new()
            .with(0, &["region"])
            .with(4, &["owner", "admin"])
            .with(5, &["area_name"])
            .with(14, &["name"]);

        if category.trim().eq_ignore_ascii_case(AQUATIC_CATEGORY) {
            criteria.with(15, &["fcode_text"])
        } else {
            criteria
        }
    }
}

impl FromIterator<(String, Vec<String>)> for IntersectionCriteria {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
