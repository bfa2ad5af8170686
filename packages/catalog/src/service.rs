//! Host map service abstraction.

use std::sync::Arc;

use crate::{CatalogError, FeatureClass};

/// A layer as listed by the host map service, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerInfo {
    /// Display name.
    pub name: String,
    /// Whether the layer is a group of other layers.
    pub is_composite: bool,
    /// Field names the catalog should map. `None` maps every field of the
    /// layer's schema.
    pub fields: Option<Vec<String>>,
}

impl LayerInfo {
    /// A leaf layer.
    #[must_use]
    pub fn feature(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_composite: false,
            fields: None,
        }
    }

    /// A group layer.
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_composite: true,
            fields: None,
        }
    }

    /// Restricts the mapped fields to `fields`.
    #[must_use]
    pub fn with_fields(mut self, fields: &[&str]) -> Self {
        self.fields = Some(fields.iter().map(ToString::to_string).collect());
        self
    }
}

/// The host map service the catalog is built from.
pub trait MapService: Send + Sync {
    /// Name of the default map.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ServiceUnavailable`] if the service cannot
    /// be read.
    fn default_map_name(&self) -> Result<String, CatalogError>;

    /// All layers of the default map in document order, groups included.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::ServiceUnavailable`] if the service cannot
    /// be read.
    fn layer_infos(&self) -> Result<Vec<LayerInfo>, CatalogError>;

    /// Opens the feature class behind the layer at `position` in
    /// [`Self::layer_infos`].
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::MissingDataSource`] if the layer has no
    /// feature data, or any error raised while loading it.
    fn open_feature_class(&self, position: usize) -> Result<Arc<dyn FeatureClass>, CatalogError>;
}

/// A map service whose layers are already loaded in memory.
#[derive(Default)]
pub struct InMemoryMapService {
    name: String,
    layers: Vec<(LayerInfo, Option<Arc<dyn FeatureClass>>)>,
}

impl InMemoryMapService {
    /// Creates an empty map.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            layers: Vec::new(),
        }
    }

    /// Appends a leaf layer backed by `feature_class`.
    #[must_use]
    pub fn with_layer(mut self, name: impl Into<String>, feature_class: Arc<dyn FeatureClass>) -> Self {
        self.layers.push((LayerInfo::feature(name), Some(feature_class)));
        self
    }

    /// Appends a leaf layer that maps only `fields`.
    #[must_use]
    pub fn with_mapped_layer(
        mut self,
        name: impl Into<String>,
        fields: &[&str],
        feature_class: Arc<dyn FeatureClass>,
    ) -> Self {
        self.layers.push((
            LayerInfo::feature(name).with_fields(fields),
            Some(feature_class),
        ));
        self
    }

    /// Appends a group layer.
    #[must_use]
    pub fn with_group(mut self, name: impl Into<String>) -> Self {
        self.layers.push((LayerInfo::group(name), None));
        self
    }
}

impl MapService for InMemoryMapService {
    fn default_map_name(&self) -> Result<String, CatalogError> {
        Ok(self.name.clone())
    }

    fn layer_infos(&self) -> Result<Vec<LayerInfo>, CatalogError> {
        Ok(self.layers.iter().map(|(info, _)| info.clone()).collect())
    }

    fn open_feature_class(&self, position: usize) -> Result<Arc<dyn FeatureClass>, CatalogError> {
        let (info, feature_class) =
            self.layers
                .get(position)
                .ok_or_else(|| CatalogError::ServiceUnavailable {
                    message: format!("no layer at position {position}"),
                })?;

        feature_class
            .clone()
            .ok_or_else(|| CatalogError::MissingDataSource {
                layer: info.name.clone(),
            })
    }
}
