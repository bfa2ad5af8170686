//! The layer catalog and field maps.

use std::sync::Arc;

use wri_intersect_models::FieldValue;

use crate::{CatalogError, FeatureClass, MapService};

/// Field index recorded for a field the layer's schema does not have.
pub const MISSING_FIELD: i32 = -1;

/// A field name and its position in the layer's rows, or
/// [`MISSING_FIELD`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFieldMap {
    /// Field name as requested.
    pub field: String,
    /// Position in the feature row.
    pub index: i32,
}

/// A leaf layer of the catalog.
#[derive(Clone)]
pub struct LayerEntry {
    index: u32,
    name: String,
    feature_class: Arc<dyn FeatureClass>,
    field_map: Vec<IndexFieldMap>,
}

impl std::fmt::Debug for LayerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayerEntry")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("source", &self.feature_class.name())
            .field("field_map", &self.field_map)
            .finish()
    }
}

impl LayerEntry {
    /// Catalog index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Open feature class.
    #[must_use]
    pub fn feature_class(&self) -> &dyn FeatureClass {
        self.feature_class.as_ref()
    }

    /// Mapped fields in schema (or configured) order.
    #[must_use]
    pub fn field_map(&self) -> &[IndexFieldMap] {
        &self.field_map
    }

    /// Position of `name` in this layer's rows, compared ASCII
    /// case-insensitively. [`MISSING_FIELD`] when the layer has no such
    /// field.
    #[must_use]
    pub fn field_index(&self, name: &str) -> i32 {
        self.field_map
            .iter()
            .find(|map| map.field.eq_ignore_ascii_case(name))
            .map_or(MISSING_FIELD, |map| map.index)
    }

    /// Resolves `names` into a field map in the order given.
    #[must_use]
    pub fn field_indexes(&self, names: &[String]) -> Vec<IndexFieldMap> {
        names
            .iter()
            .map(|name| IndexFieldMap {
                field: name.clone(),
                index: self.field_index(name),
            })
            .collect()
    }
}

/// Pulls the mapped values out of a feature row, one per map entry.
/// Missing and out-of-range fields come back as [`FieldValue::Null`].
#[must_use]
pub fn get_value_at_index(values: &[FieldValue], maps: &[IndexFieldMap]) -> Vec<FieldValue> {
    maps.iter()
        .map(|map| {
            usize::try_from(map.index)
                .ok()
                .and_then(|index| values.get(index))
                .cloned()
                .unwrap_or(FieldValue::Null)
        })
        .collect()
}

/// Immutable index of the leaf layers of a map.
#[derive(Debug, Clone)]
pub struct LayerCatalog {
    map_name: String,
    entries: Vec<LayerEntry>,
}

impl LayerCatalog {
    /// Builds the catalog from the default map of `service`.
    ///
    /// Group layers are skipped without consuming an index, so leaf
    /// layers are numbered `0..n` in document order.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::NoLayers`] if the map has no leaf layers, or
    /// any error raised while reading the service or opening a feature
    /// class.
    pub fn build(service: &dyn MapService) -> Result<Self, CatalogError> {
        let map_name = service.default_map_name()?;
        let infos = service.layer_infos()?;

        if infos.iter().all(|info| info.is_composite) {
            return Err(CatalogError::NoLayers { map: map_name });
        }

        let mut entries = Vec::with_capacity(infos.len());

        for (position, info) in infos.into_iter().enumerate() {
            if info.is_composite {
                log::debug!("Skipping group layer {}", info.name);
                continue;
            }

            let feature_class = service.open_feature_class(position)?;
            let schema = feature_class.fields();

            let field_map: Vec<IndexFieldMap> = match &info.fields {
                Some(names) => names
                    .iter()
                    .map(|name| IndexFieldMap {
                        field: name.clone(),
                        index: schema
                            .iter()
                            .position(|field| field.eq_ignore_ascii_case(name))
                            .and_then(|position| i32::try_from(position).ok())
                            .unwrap_or(MISSING_FIELD),
                    })
                    .collect(),
                None => schema
                    .iter()
                    .zip(0..)
                    .map(|(field, index)| IndexFieldMap {
                        field: field.clone(),
                        index,
                    })
                    .collect(),
            };

            let index = u32::try_from(entries.len()).map_err(|_| CatalogError::Conversion {
                message: "too many layers".to_string(),
            })?;

            log::debug!(
                "Layer {index} {} ({} fields mapped)",
                info.name,
                field_map.len()
            );

            entries.push(LayerEntry {
                index,
                name: info.name,
                feature_class,
                field_map,
            });
        }

        log::info!("Built catalog for {map_name} with {} layers", entries.len());

        Ok(Self { map_name, entries })
    }

    /// Looks up the leaf layer at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::LayerNotFound`] if no leaf layer has that
    /// index.
    pub fn resolve(&self, index: u32) -> Result<&LayerEntry, CatalogError> {
        usize::try_from(index)
            .ok()
            .and_then(|position| self.entries.get(position))
            .ok_or(CatalogError::LayerNotFound { index })
    }

    /// All leaf layers in index order.
    #[must_use]
    pub fn entries(&self) -> &[LayerEntry] {
        &self.entries
    }

    /// Name of the map the catalog was built from.
    #[must_use]
    pub fn map_name(&self) -> &str {
        &self.map_name
    }

    /// Number of leaf layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog has no leaf layers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoJsonFeatureClass, InMemoryMapService, LayerInfo};
    use geo::{Geometry, polygon};

    fn class(name: &str, fields: &[&str]) -> Arc<dyn FeatureClass> {
        let values = fields
            .iter()
            .map(|field| FieldValue::from(format!("{field} value")))
            .collect();
        Arc::new(
            GeoJsonFeatureClass::from_features(
                name,
                26912,
                fields.iter().map(ToString::to_string).collect(),
                vec![(
                    Geometry::Polygon(polygon![
                        (x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)
                    ]),
                    values,
                )],
            )
            .unwrap(),
        )
    }

    fn reference_map() -> InMemoryMapService {
        InMemoryMapService::new("Reference")
            .with_group("Boundaries")
            .with_layer("Counties", class("counties", &["NAME", "FIPS"]))
            .with_group("Ownership")
            .with_layer("Land Ownership", class("ownership", &["OWNER", "ADMIN"]))
            .with_layer("Streams", class("streams", &["FCODE_TEXT"]))
    }

    #[test]
    fn leaf_layers_are_numbered_densely() {
        let catalog = LayerCatalog::build(&reference_map()).unwrap();
        let names: Vec<(u32, &str)> = catalog
            .entries()
            .iter()
            .map(|entry| (entry.index(), entry.name()))
            .collect();
        assert_eq!(
            names,
            vec![(0, "Counties"), (1, "Land Ownership"), (2, "Streams")]
        );
        assert_eq!(catalog.map_name(), "Reference");
    }

    #[test]
    fn resolve_unknown_index_fails() {
        let catalog = LayerCatalog::build(&reference_map()).unwrap();
        assert_eq!(catalog.resolve(1).unwrap().name(), "Land Ownership");
        assert!(matches!(
            catalog.resolve(3),
            Err(CatalogError::LayerNotFound { index: 3 })
        ));
    }

    #[test]
    fn empty_map_is_fatal() {
        let result = LayerCatalog::build(&InMemoryMapService::new("Empty"));
        assert!(matches!(result, Err(CatalogError::NoLayers { map }) if map == "Empty"));
    }

    #[test]
    fn only_groups_is_fatal() {
        let service = InMemoryMapService::new("Groups")
            .with_group("A")
            .with_group("B");
        let result = LayerCatalog::build(&service);
        assert!(matches!(result, Err(CatalogError::NoLayers { map }) if map == "Groups"));
    }

    #[test]
    fn field_index_ignores_case() {
        let catalog = LayerCatalog::build(&reference_map()).unwrap();
        let ownership = catalog.resolve(1).unwrap();
        assert_eq!(ownership.field_index("owner"), 0);
        assert_eq!(ownership.field_index("Admin"), 1);
        assert_eq!(ownership.field_index("region"), MISSING_FIELD);
    }

    #[test]
    fn configured_fields_resolve_against_schema() {
        let service = InMemoryMapService::new("Reference").with_mapped_layer(
            "Counties",
            &["fips", "REGION"],
            class("counties", &["NAME", "FIPS"]),
        );
        let catalog = LayerCatalog::build(&service).unwrap();
        assert_eq!(
            catalog.resolve(0).unwrap().field_map(),
            [
                IndexFieldMap {
                    field: "fips".to_string(),
                    index: 1
                },
                IndexFieldMap {
                    field: "REGION".to_string(),
                    index: MISSING_FIELD
                },
            ]
        );
    }

    #[test]
    fn missing_fields_extract_as_null() {
        let catalog = LayerCatalog::build(&reference_map()).unwrap();
        let counties = catalog.resolve(0).unwrap();
        let maps = counties.field_indexes(&["region".to_string(), "name".to_string()]);
        let row = [FieldValue::from("Utah"), FieldValue::from("49049")];
        assert_eq!(
            get_value_at_index(&row, &maps),
            vec![FieldValue::Null, FieldValue::from("Utah")]
        );
    }

    #[test]
    fn out_of_range_index_is_null() {
        let maps = [IndexFieldMap {
            field: "x".to_string(),
            index: 5,
        }];
        assert_eq!(
            get_value_at_index(&[FieldValue::from(1_i64)], &maps),
            vec![FieldValue::Null]
        );
    }

    #[test]
    fn leaf_without_data_fails_build() {
        struct Broken;

        impl MapService for Broken {
            fn default_map_name(&self) -> Result<String, CatalogError> {
                Ok("Broken".to_string())
            }

            fn layer_infos(&self) -> Result<Vec<LayerInfo>, CatalogError> {
                Ok(vec![LayerInfo::feature("Orphan")])
            }

            fn open_feature_class(
                &self,
                _position: usize,
            ) -> Result<Arc<dyn FeatureClass>, CatalogError> {
                Err(CatalogError::MissingDataSource {
                    layer: "Orphan".to_string(),
                })
            }
        }

        assert!(matches!(
            LayerCatalog::build(&Broken),
            Err(CatalogError::MissingDataSource { .. })
        ));
    }
}
