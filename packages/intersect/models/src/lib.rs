#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Intersection request, result, and API envelope types.
//!
//! These types are shared by the catalog, the intersection engine, and
//! the HTTP host. Engine-side records keep full precision; the `Api*`
//! types are what gets serialized back to callers and carry the rounded
//! `Intersect` value.

pub mod criteria;

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use criteria::IntersectionCriteria;

/// Number of decimal places `Intersect` values are rounded to in API
/// responses.
pub const INTERSECT_PRECISION: i32 = 4;

/// A single attribute value read from a reference layer feature.
///
/// Values are totally ordered (doubles via [`f64::total_cmp`]) so that
/// attribute tuples can be compared as multisets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Field missing from the schema or holding no value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Floating point value.
    Double(f64),
    /// Text value.
    Text(String),
}

impl FieldValue {
    /// Converts a JSON property value into a [`FieldValue`].
    ///
    /// Arrays and objects have no scalar representation and are kept as
    /// their JSON text.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Double(n.as_f64().unwrap_or(f64::NAN)), Self::Integer),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            other => Self::Text(other.to_string()),
        }
    }

    /// Whether this is [`FieldValue::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Integer(_) => 2,
            Self::Double(_) => 3,
            Self::Text(_) => 4,
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FieldValue {}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FieldValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Null, Self::Null) => Ordering::Equal,
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

/// Returns the order-independent form of an attribute tuple.
///
/// Two tuples are the same multiset iff their keys are equal:
/// `[A, B, A]` and `[A, A, B]` share a key, `[A, B]` and `[A, B, B]` do
/// not.
#[must_use]
pub fn multiset_key(attributes: &[FieldValue]) -> Vec<FieldValue> {
    let mut key = attributes.to_vec();
    key.sort();
    key
}

/// Compares two attribute tuples as unordered multisets.
#[must_use]
pub fn same_multiset(a: &[FieldValue], b: &[FieldValue]) -> bool {
    a.len() == b.len() && multiset_key(a) == multiset_key(b)
}

/// One merged result unit: the attribute tuple of a reference feature and
/// the overlap measure accumulated across every feature sharing it.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeRecord {
    /// Requested attribute values, in requested field order.
    pub attributes: Vec<FieldValue>,
    /// Accumulated area (m²) or length (m) in the measurement CRS.
    pub intersect: f64,
}

impl AttributeRecord {
    /// Creates a record with a single contribution.
    #[must_use]
    pub const fn new(attributes: Vec<FieldValue>, intersect: f64) -> Self {
        Self {
            attributes,
            intersect,
        }
    }
}

/// Complete engine output keyed by layer display name.
///
/// Layers without any intersecting feature are absent.
pub type IntersectionResult = BTreeMap<String, Vec<AttributeRecord>>;

/// Rounds a measure to [`INTERSECT_PRECISION`] decimal places.
#[must_use]
pub fn round_intersect(value: f64) -> f64 {
    let scale = 10_f64.powi(INTERSECT_PRECISION);
    (value * scale).round() / scale
}

/// An attribute record as returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiIntersectAttributes {
    /// Attribute values in requested field order.
    #[serde(rename = "Attributes")]
    pub attributes: Vec<FieldValue>,
    /// Overlap measure rounded to [`INTERSECT_PRECISION`] places.
    #[serde(rename = "Intersect")]
    pub intersect: f64,
}

impl From<AttributeRecord> for ApiIntersectAttributes {
    fn from(record: AttributeRecord) -> Self {
        Self {
            attributes: record.attributes,
            intersect: round_intersect(record.intersect),
        }
    }
}

/// `ExtractIntersections` success body: layer name -> merged records.
pub type ApiIntersectResponse = BTreeMap<String, Vec<ApiIntersectAttributes>>;

/// Converts an engine result into its API representation.
#[must_use]
pub fn to_api_response(result: IntersectionResult) -> ApiIntersectResponse {
    result
        .into_iter()
        .map(|(layer, records)| {
            (
                layer,
                records
                    .into_iter()
                    .map(ApiIntersectAttributes::from)
                    .collect(),
            )
        })
        .collect()
}

/// Area and length of a single geometry in the measurement CRS.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeResult {
    /// Area in square meters (zero for lines and points).
    pub area: f64,
    /// Length in meters; the perimeter for polygons.
    pub length: f64,
}

impl SizeResult {
    /// Rounds both values to [`INTERSECT_PRECISION`] places.
    #[must_use]
    pub fn rounded(self) -> Self {
        Self {
            area: round_intersect(self.area),
            length: round_intersect(self.length),
        }
    }
}

/// Failure envelope returned by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`.
    pub success: bool,
    /// User-facing failure description.
    pub message: String,
}

impl ApiError {
    /// Creates a failure envelope.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Service description returned by the root endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApiServiceInfo {
    /// What the service does.
    pub description: String,
    /// Crate version.
    pub version: String,
}

/// A catalog entry as listed by the layers endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLayer {
    /// Catalog index used as the criteria key.
    pub index: u32,
    /// Layer display name.
    pub name: String,
    /// Mapped field names; fields missing from the schema are listed with
    /// index `-1`.
    pub fields: Vec<ApiLayerField>,
}

/// A single field-map entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLayerField {
    /// Field name.
    pub field: String,
    /// Positional index in the schema, or `-1`.
    pub index: i32,
}

/// `ExtractIntersections` parameters posted as a form.
///
/// Both fields are optional here so that a missing value is reported with
/// the API error envelope rather than an extractor error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractIntersectionsForm {
    /// Base64-encoded (E)WKB.
    pub geometry: Option<String>,
    /// Criteria as JSON text.
    pub criteria: Option<String>,
    /// Response format. Only `json` is produced.
    pub f: Option<String>,
}

/// `ExtractIntersections` parameters posted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractIntersectionsJson {
    /// Base64-encoded (E)WKB.
    pub geometry: Option<String>,
    /// Criteria as a JSON object, or JSON text holding one.
    pub criteria: Option<serde_json::Value>,
    /// Response format. Only `json` is produced.
    pub f: Option<String>,
}

/// `AreasAndLengths` parameters, as a form or JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeometryParams {
    /// Base64-encoded (E)WKB.
    pub geometry: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(values: &[&str]) -> Vec<FieldValue> {
        values.iter().map(|v| FieldValue::from(*v)).collect()
    }

    #[test]
    fn multiset_ignores_order() {
        assert!(same_multiset(&text(&["A", "B", "A"]), &text(&["A", "A", "B"])));
    }

    #[test]
    fn multiset_counts_duplicates() {
        assert!(!same_multiset(&text(&["A", "B"]), &text(&["A", "B", "B"])));
        assert!(!same_multiset(&text(&["A", "A", "B"]), &text(&["A", "B", "B"])));
    }

    #[test]
    fn null_values_compare_equal() {
        let a = vec![FieldValue::Null, FieldValue::from("x")];
        let b = vec![FieldValue::from("x"), FieldValue::Null];
        assert!(same_multiset(&a, &b));
    }

    #[test]
    fn integer_and_text_are_distinct() {
        assert_ne!(FieldValue::Integer(1), FieldValue::from("1"));
        assert_ne!(FieldValue::Integer(1), FieldValue::Double(1.0));
    }

    #[test]
    fn from_json_maps_scalars() {
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(42)),
            FieldValue::Integer(42)
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!(1.5)),
            FieldValue::Double(1.5)
        );
        assert_eq!(
            FieldValue::from_json(&serde_json::json!("Utah")),
            FieldValue::from("Utah")
        );
        assert!(FieldValue::from_json(&serde_json::Value::Null).is_null());
    }

    #[test]
    fn rounds_to_four_places() {
        assert!((round_intersect(25.123_456) - 25.1235).abs() < 1e-12);
        assert!((round_intersect(0.000_04) - 0.0).abs() < 1e-12);
    }

    #[test]
    fn api_record_serializes_with_pascal_case_keys() {
        let record = AttributeRecord::new(
            vec![FieldValue::from("CountyA"), FieldValue::Null],
            25.000_01,
        );
        let json = serde_json::to_value(ApiIntersectAttributes::from(record)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "Attributes": ["CountyA", null], "Intersect": 25.0 })
        );
    }

    #[test]
    fn error_envelope_shape() {
        let json = serde_json::to_value(ApiError::new("geometry parameter is required.")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "success": false, "message": "geometry parameter is required." })
        );
    }
}
