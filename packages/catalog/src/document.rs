//! TOML map documents.
//!
//! A map document lists the layers of a map in drawing order. Leaf layers
//! point at a `GeoJSON` file holding their features; group layers only
//! organize the document and carry no data.
//!
//! ```toml
//! name = "Utah Reference Layers"
//!
//! [[layers]]
//! name = "Boundaries"
//! kind = "group"
//!
//! [[layers]]
//! name = "Counties"
//! path = "counties.geojson"
//! srid = 26912
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    CatalogError, DEFAULT_DATA_SRID, FeatureClass, GeoJsonFeatureClass, LayerInfo, MapService,
};

/// A map document, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDocument {
    /// Map name.
    pub name: String,
    /// Layers in document order.
    #[serde(default)]
    pub layers: Vec<LayerDefinition>,
}

/// One layer of a [`MapDocument`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayerDefinition {
    /// Display name.
    pub name: String,
    /// Whether this is a leaf layer or a group.
    #[serde(default)]
    pub kind: LayerKind,
    /// `GeoJSON` file, relative to the document's directory.
    pub path: Option<PathBuf>,
    /// Spatial reference of the file's coordinates.
    pub srid: Option<u32>,
    /// Field names to map. Omitted maps every field in the file.
    pub fields: Option<Vec<String>>,
}

/// Layer kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    /// Leaf layer backed by features.
    #[default]
    Feature,
    /// Group of other layers.
    Group,
}

/// A [`MapService`] backed by a [`MapDocument`] on disk.
///
/// Feature classes are loaded when the catalog opens them.
#[derive(Debug, Clone)]
pub struct DocumentMapService {
    document: MapDocument,
    base_dir: PathBuf,
}

impl DocumentMapService {
    /// Reads a map document file. Layer paths resolve against the
    /// document's directory.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let text = std::fs::read_to_string(path)?;
        let base_dir = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        Self::from_toml_str(&text, &base_dir)
    }

    /// Parses a map document.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Toml`] if the document is not valid.
    pub fn from_toml_str(text: &str, base_dir: &Path) -> Result<Self, CatalogError> {
        let document: MapDocument = toml::de::from_str(text)?;
        log::debug!(
            "Parsed map document '{}' with {} layers",
            document.name,
            document.layers.len()
        );
        Ok(Self {
            document,
            base_dir: base_dir.to_path_buf(),
        })
    }

    /// The parsed document.
    #[must_use]
    pub const fn document(&self) -> &MapDocument {
        &self.document
    }
}

impl MapService for DocumentMapService {
    fn default_map_name(&self) -> Result<String, CatalogError> {
        Ok(self.document.name.clone())
    }

    fn layer_infos(&self) -> Result<Vec<LayerInfo>, CatalogError> {
        Ok(self
            .document
            .layers
            .iter()
            .map(|layer| match layer.kind {
                LayerKind::Feature => LayerInfo {
                    fields: layer.fields.clone(),
                    ..LayerInfo::feature(&layer.name)
                },
                LayerKind::Group => LayerInfo::group(&layer.name),
            })
            .collect())
    }

    fn open_feature_class(&self, position: usize) -> Result<Arc<dyn FeatureClass>, CatalogError> {
        let layer = self.document.layers.get(position).ok_or_else(|| {
            CatalogError::ServiceUnavailable {
                message: format!("no layer at position {position}"),
            }
        })?;

        let Some(path) = layer.path.as_ref().filter(|_| layer.kind == LayerKind::Feature) else {
            return Err(CatalogError::MissingDataSource {
                layer: layer.name.clone(),
            });
        };

        let class = GeoJsonFeatureClass::from_path(
            &layer.name,
            &self.base_dir.join(path),
            layer.srid.unwrap_or(DEFAULT_DATA_SRID),
        )?;

        Ok(Arc::new(class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"
        name = "Reference"

        [[layers]]
        name = "Boundaries"
        kind = "group"

        [[layers]]
        name = "Counties"
        path = "counties.geojson"
        srid = 3857
        fields = ["NAME", "FIPS"]

        [[layers]]
        name = "Streams"
        path = "streams.geojson"
    "#;

    #[test]
    fn parses_layers_in_document_order() {
        let service = DocumentMapService::from_toml_str(DOCUMENT, Path::new("data")).unwrap();
        assert_eq!(service.default_map_name().unwrap(), "Reference");
        assert_eq!(
            service.layer_infos().unwrap(),
            vec![
                LayerInfo::group("Boundaries"),
                LayerInfo::feature("Counties").with_fields(&["NAME", "FIPS"]),
                LayerInfo::feature("Streams"),
            ]
        );
        assert_eq!(service.document().layers[1].srid, Some(3857));
        assert_eq!(service.document().layers[2].srid, None);
    }

    #[test]
    fn group_has_no_data_source() {
        let service = DocumentMapService::from_toml_str(DOCUMENT, Path::new("data")).unwrap();
        assert!(matches!(
            service.open_feature_class(0),
            Err(CatalogError::MissingDataSource { layer }) if layer == "Boundaries"
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let service =
            DocumentMapService::from_toml_str(DOCUMENT, Path::new("/nonexistent/wri")).unwrap();
        assert!(matches!(
            service.open_feature_class(1),
            Err(CatalogError::Io(_))
        ));
    }

    #[test]
    fn rejects_unknown_kind() {
        let result = DocumentMapService::from_toml_str(
            "name = \"x\"\n[[layers]]\nname = \"a\"\nkind = \"raster\"\n",
            Path::new("."),
        );
        assert!(matches!(result, Err(CatalogError::Toml(_))));
    }
}
