#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Reference layer catalog.
//!
//! Maps the leaf layers of a host map document to stable integer indices,
//! holds an open handle to each layer's feature class, and resolves the
//! field-name-to-position map used to pull attribute values out of
//! feature rows. The catalog is built once, never mutated, and shared
//! read-only by every intersection request; a changed data source means
//! building a new catalog.

pub mod catalog;
pub mod document;
pub mod feature_class;
pub mod service;

use thiserror::Error;

pub use catalog::{IndexFieldMap, LayerCatalog, LayerEntry, MISSING_FIELD, get_value_at_index};
pub use document::{DocumentMapService, MapDocument};
pub use feature_class::{
    FeatureClass, FeatureCursor, FeatureRow, GeoJsonFeatureClass, SpatialFilter, SpatialRelation,
};
pub use service::{InMemoryMapService, LayerInfo, MapService};

/// Spatial reference assumed for layers that do not declare one (NAD83 /
/// UTM zone 12N).
pub const DEFAULT_DATA_SRID: u32 = 26912;

/// Errors that can occur while building or querying the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The host map service could not be reached or read.
    #[error("Map service unavailable: {message}")]
    ServiceUnavailable {
        /// Description of what went wrong.
        message: String,
    },

    /// The map has no leaf layers.
    #[error("Map '{map}' has no layers")]
    NoLayers {
        /// Map name.
        map: String,
    },

    /// No leaf layer occupies the index.
    #[error("Layer {index} was not found in the catalog")]
    LayerNotFound {
        /// Requested catalog index.
        index: u32,
    },

    /// A leaf layer has no feature class behind it.
    #[error("Layer '{layer}' has no feature data source")]
    MissingDataSource {
        /// Layer name.
        layer: String,
    },

    /// Reading a document or data file failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A data file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// A map document is not valid TOML.
    #[error("Map document error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A feature or filter geometry is unusable.
    #[error(transparent)]
    Geometry(#[from] wri_geometry::GeometryError),

    /// Data conversion error.
    #[error("Conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
