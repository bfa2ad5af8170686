//! Feature classes and the cursors that stream their rows.
//!
//! A [`FeatureClass`] is the read handle the catalog keeps open for each
//! leaf layer. Searches return a [`FeatureCursor`] that yields rows one at
//! a time; the cursor borrows the feature class and releases it when
//! dropped, whichever way the consumer stops iterating.

use std::path::Path;

use geo::Geometry;
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use wri_geometry::Shape;
use wri_intersect_models::FieldValue;

use crate::CatalogError;

/// Spatial relationship a search must satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpatialRelation {
    /// Bounding boxes overlap. Cheap, may return features that do not
    /// actually touch the filter geometry.
    EnvelopeIntersects,
    /// The geometries share at least one point.
    Intersects,
}

/// A search filter. The geometry must be in the feature class's spatial
/// reference.
#[derive(Debug, Clone)]
pub struct SpatialFilter {
    /// Filter geometry.
    pub shape: Shape,
    /// Relationship candidates must have with [`Self::shape`].
    pub relation: SpatialRelation,
}

impl SpatialFilter {
    /// Filter for features intersecting `shape`.
    #[must_use]
    pub const fn intersects(shape: Shape) -> Self {
        Self {
            shape,
            relation: SpatialRelation::Intersects,
        }
    }

    fn envelope(&self) -> Option<AABB<[f64; 2]>> {
        self.shape
            .bounding_rect()
            .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
    }

    fn accepts(&self, shape: &Shape) -> bool {
        match self.relation {
            SpatialRelation::EnvelopeIntersects => true,
            SpatialRelation::Intersects => self.shape.intersects(shape),
        }
    }
}

/// One feature returned by a cursor.
#[derive(Debug, Clone, Copy)]
pub struct FeatureRow<'a> {
    /// Object id, unique within the feature class.
    pub oid: u64,
    /// Feature geometry in the feature class's spatial reference.
    pub shape: &'a Shape,
    /// Attribute values in schema order.
    pub values: &'a [FieldValue],
}

/// A streaming search result.
pub struct FeatureCursor<'a> {
    layer: &'a str,
    rows: Box<dyn Iterator<Item = Result<FeatureRow<'a>, CatalogError>> + 'a>,
    fetched: u64,
}

impl<'a> FeatureCursor<'a> {
    /// Wraps a row iterator as a cursor over `layer`.
    pub fn new(
        layer: &'a str,
        rows: impl Iterator<Item = Result<FeatureRow<'a>, CatalogError>> + 'a,
    ) -> Self {
        Self {
            layer,
            rows: Box::new(rows),
            fetched: 0,
        }
    }

    /// Rows fetched so far.
    #[must_use]
    pub const fn fetched(&self) -> u64 {
        self.fetched
    }
}

impl<'a> Iterator for FeatureCursor<'a> {
    type Item = Result<FeatureRow<'a>, CatalogError>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        self.fetched += 1;
        Some(row)
    }
}

impl Drop for FeatureCursor<'_> {
    fn drop(&mut self) {
        log::trace!(
            "Released cursor on {} after {} rows",
            self.layer,
            self.fetched
        );
    }
}

/// Read access to one layer's features.
pub trait FeatureClass: Send + Sync {
    /// Data source name.
    fn name(&self) -> &str;

    /// Spatial reference id of the stored geometries.
    fn srid(&self) -> u32;

    /// Field names in positional order.
    fn fields(&self) -> &[String];

    /// Opens a cursor over the features satisfying `filter`, in object id
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the search cannot be started.
    fn search<'a>(&'a self, filter: &SpatialFilter) -> Result<FeatureCursor<'a>, CatalogError>;
}

/// A feature held in the R-tree with its attribute row.
struct StoredFeature {
    oid: u64,
    shape: Shape,
    values: Vec<FieldValue>,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for StoredFeature {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// A feature class loaded from a `GeoJSON` `FeatureCollection` and indexed
/// with an R-tree.
///
/// The schema is the union of property names across all features, in
/// first-seen order. Features without a geometry are skipped.
pub struct GeoJsonFeatureClass {
    name: String,
    srid: u32,
    fields: Vec<String>,
    features: RTree<StoredFeature>,
}

impl GeoJsonFeatureClass {
    /// Loads a `GeoJSON` file.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the file cannot be read or parsed.
    pub fn from_path(name: &str, path: &Path, srid: u32) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        let class = Self::from_geojson_str(name, &text, srid)?;
        log::info!(
            "Loaded {} features for {name} from {}",
            class.len(),
            path.display()
        );
        Ok(class)
    }

    /// Parses `GeoJSON` text.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::GeoJson`] for invalid `GeoJSON` and
    /// [`CatalogError::Conversion`] when the document is not a
    /// `FeatureCollection`.
    pub fn from_geojson_str(name: &str, text: &str, srid: u32) -> Result<Self, CatalogError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(CatalogError::Conversion {
                message: format!("{name}: expected a GeoJSON FeatureCollection"),
            });
        };

        let mut fields: Vec<String> = Vec::new();
        for feature in &collection.features {
            for key in feature.properties.iter().flat_map(serde_json::Map::keys) {
                if !fields.contains(key) {
                    fields.push(key.clone());
                }
            }
        }

        let mut rows = Vec::with_capacity(collection.features.len());
        for (position, feature) in collection.features.into_iter().enumerate() {
            let Some(geometry) = feature.geometry else {
                log::warn!("{name}: skipping feature {position} without geometry");
                continue;
            };
            let geometry: Geometry<f64> = geometry.try_into()?;
            let values = fields
                .iter()
                .map(|field| {
                    feature
                        .properties
                        .as_ref()
                        .and_then(|props| props.get(field))
                        .map_or(FieldValue::Null, FieldValue::from_json)
                })
                .collect();
            rows.push((geometry, values));
        }

        Self::from_features(name, srid, fields, rows)
    }

    /// Builds a feature class from in-memory rows. Object ids are assigned
    /// from 1 in row order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Conversion`] if a row's value count does not
    /// match the schema, or [`CatalogError::Geometry`] for a geometry
    /// collection mixing dimensions.
    pub fn from_features(
        name: &str,
        srid: u32,
        fields: Vec<String>,
        rows: Vec<(Geometry<f64>, Vec<FieldValue>)>,
    ) -> Result<Self, CatalogError> {
        let mut features = Vec::with_capacity(rows.len());

        for (oid, (geometry, values)) in (1..).zip(rows) {
            if values.len() != fields.len() {
                return Err(CatalogError::Conversion {
                    message: format!(
                        "{name}: feature {oid} has {} values for {} fields",
                        values.len(),
                        fields.len()
                    ),
                });
            }

            let shape = Shape::from_geometry(geometry)?;
            let Some(rect) = shape.bounding_rect() else {
                log::warn!("{name}: skipping feature {oid} with empty geometry");
                continue;
            };

            features.push(StoredFeature {
                oid,
                shape,
                values,
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
            });
        }

        Ok(Self {
            name: name.to_string(),
            srid,
            fields,
            features: RTree::bulk_load(features),
        })
    }

    /// Number of indexed features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.size()
    }

    /// Whether the feature class has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeatureClass for GeoJsonFeatureClass {
    fn name(&self) -> &str {
        &self.name
    }

    fn srid(&self) -> u32 {
        self.srid
    }

    fn fields(&self) -> &[String] {
        &self.fields
    }

    fn search<'a>(&'a self, filter: &SpatialFilter) -> Result<FeatureCursor<'a>, CatalogError> {
        let Some(envelope) = filter.envelope() else {
            return Ok(FeatureCursor::new(&self.name, std::iter::empty()));
        };

        let mut hits: Vec<&StoredFeature> = self
            .features
            .locate_in_envelope_intersecting(&envelope)
            .collect();
        hits.sort_unstable_by_key(|feature| feature.oid);

        let filter = filter.clone();
        let rows = hits
            .into_iter()
            .filter(move |feature| filter.accepts(&feature.shape))
            .map(|feature| {
                Ok(FeatureRow {
                    oid: feature.oid,
                    shape: &feature.shape,
                    values: &feature.values,
                })
            });

        Ok(FeatureCursor::new(&self.name, rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{MultiLineString, MultiPolygon, line_string, polygon};

    const COUNTIES: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "NAME": "Alpha", "FIPS": 1 },
                "geometry": { "type": "Polygon", "coordinates": [[[0,0],[10,0],[10,10],[0,10],[0,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "NAME": "Beta", "STATE": "UT" },
                "geometry": { "type": "Polygon", "coordinates": [[[20,0],[30,0],[30,10],[20,10],[20,0]]] }
            },
            {
                "type": "Feature",
                "properties": { "NAME": "Nowhere" },
                "geometry": null
            }
        ]
    }"#;

    fn square(min: f64, max: f64) -> Shape {
        Shape::Polygon(MultiPolygon::new(vec![polygon![
            (x: min, y: min), (x: max, y: min), (x: max, y: max), (x: min, y: max)
        ]]))
    }

    fn names(class: &GeoJsonFeatureClass, filter: &SpatialFilter) -> Vec<FieldValue> {
        let mut names: Vec<FieldValue> = class
            .search(filter)
            .unwrap()
            .map(|row| row.unwrap().values[0].clone())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn schema_is_union_of_properties() {
        let class = GeoJsonFeatureClass::from_geojson_str("counties", COUNTIES, 26912).unwrap();
        assert_eq!(class.fields(), ["NAME", "FIPS", "STATE"]);
        assert_eq!(class.len(), 2);
    }

    #[test]
    fn missing_properties_are_null() {
        let class = GeoJsonFeatureClass::from_geojson_str("counties", COUNTIES, 26912).unwrap();
        let filter = SpatialFilter::intersects(square(25.0, 26.0));
        let row_values: Vec<Vec<FieldValue>> = class
            .search(&filter)
            .unwrap()
            .map(|row| row.unwrap().values.to_vec())
            .collect();
        assert_eq!(
            row_values,
            vec![vec![
                FieldValue::from("Beta"),
                FieldValue::Null,
                FieldValue::from("UT")
            ]]
        );
    }

    #[test]
    fn search_returns_only_intersecting_features() {
        let class = GeoJsonFeatureClass::from_geojson_str("counties", COUNTIES, 26912).unwrap();
        assert_eq!(
            names(&class, &SpatialFilter::intersects(square(5.0, 25.0))),
            vec![FieldValue::from("Alpha"), FieldValue::from("Beta")]
        );
        assert_eq!(
            names(&class, &SpatialFilter::intersects(square(12.0, 18.0))),
            Vec::<FieldValue>::new()
        );
    }

    #[test]
    fn envelope_relation_is_loose() {
        let class = GeoJsonFeatureClass::from_geojson_str("counties", COUNTIES, 26912).unwrap();
        let diagonal = Shape::Polyline(MultiLineString::new(vec![line_string![
            (x: 11.0, y: 11.0), (x: 19.0, y: 19.0), (x: 35.0, y: 11.0)
        ]]));
        let loose = SpatialFilter {
            shape: diagonal.clone(),
            relation: SpatialRelation::EnvelopeIntersects,
        };
        assert_eq!(names(&class, &loose).len(), 2);
        assert!(names(&class, &SpatialFilter::intersects(diagonal)).is_empty());
    }

    #[test]
    fn rows_stream_in_object_id_order() {
        let rows = (0..50_u32)
            .map(|i| {
                let x = f64::from((i * 37) % 50) * 2.0;
                let cell: geo::Polygon<f64> = polygon![
                    (x: x, y: 0.0), (x: x + 1.0, y: 0.0), (x: x + 1.0, y: 1.0), (x: x, y: 1.0)
                ];
                (Geometry::Polygon(cell), vec![FieldValue::Integer(i64::from(i))])
            })
            .collect();
        let class =
            GeoJsonFeatureClass::from_features("cells", 26912, vec!["ID".to_string()], rows)
                .unwrap();

        let oids: Vec<u64> = class
            .search(&SpatialFilter::intersects(square(-1.0, 200.0)))
            .unwrap()
            .map(|row| row.unwrap().oid)
            .collect();
        assert_eq!(oids, (1..=50).collect::<Vec<u64>>());
    }

    #[test]
    fn cursor_counts_fetched_rows() {
        let class = GeoJsonFeatureClass::from_geojson_str("counties", COUNTIES, 26912).unwrap();
        let mut cursor = class
            .search(&SpatialFilter::intersects(square(-100.0, 100.0)))
            .unwrap();
        assert!(cursor.next().is_some());
        assert_eq!(cursor.fetched(), 1);
    }

    #[test]
    fn rejects_non_collection() {
        let result = GeoJsonFeatureClass::from_geojson_str(
            "bad",
            r#"{ "type": "Point", "coordinates": [1, 2] }"#,
            26912,
        );
        assert!(matches!(result, Err(CatalogError::Conversion { .. })));
    }

    #[test]
    fn rejects_ragged_rows() {
        let result = GeoJsonFeatureClass::from_features(
            "bad",
            26912,
            vec!["NAME".to_string()],
            vec![(Geometry::Polygon(polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)]), Vec::new())],
        );
        assert!(matches!(result, Err(CatalogError::Conversion { .. })));
    }
}
