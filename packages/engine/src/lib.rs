#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Intersection engine.
//!
//! For each layer named in the criteria, streams the features that
//! intersect the query geometry, measures the overlap according to the
//! dimensions of the two geometries, reads the requested attributes, and
//! merges features whose attribute tuples are equal as multisets.
//!
//! The engine is stateless across calls. A request either returns its
//! complete result or fails; nothing partial is returned.

pub mod cancel;
pub mod merge;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use thiserror::Error;
use wri_catalog::{CatalogError, LayerCatalog, LayerEntry, SpatialFilter, get_value_at_index};
use wri_geometry::{Crs, DEFAULT_MEASURE_SRID, DEFAULT_SRID, GeometryError, QueryGeometry, measure};
use wri_intersect_models::{IntersectionCriteria, IntersectionResult, SizeResult};

pub use cancel::CancelToken;
pub use merge::RecordAccumulator;

/// Errors returned by the engine. Messages are safe to show to callers.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The criteria do not match the catalog.
    #[error("{message}")]
    Configuration {
        /// Description of the mismatch.
        message: String,
    },

    /// The query geometry cannot be used.
    #[error(transparent)]
    InvalidGeometry(GeometryError),

    /// Intersecting a reference feature with the query failed.
    #[error("Intersection with feature {feature} of layer '{layer}' failed: {message}")]
    IntersectionComputation {
        /// Layer name.
        layer: String,
        /// Object id of the feature.
        feature: u64,
        /// Underlying failure.
        message: String,
    },

    /// The caller cancelled the request.
    #[error("The request was cancelled")]
    Cancelled,

    /// The request ran past its deadline.
    #[error("The request exceeded its deadline")]
    DeadlineExceeded,

    /// Reading reference data failed.
    #[error("Reference data error: {0}")]
    Source(#[from] CatalogError),
}

impl EngineError {
    /// HTTP status code class for this error.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Configuration { .. } | Self::InvalidGeometry(_) => 400,
            Self::IntersectionComputation { .. } | Self::Source(_) => 500,
            Self::Cancelled | Self::DeadlineExceeded => 503,
        }
    }
}

/// Engine settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Spatial reference assigned to query geometries without one.
    pub default_srid: u32,
    /// Spatial reference areas and lengths are measured in.
    pub measure_srid: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_srid: DEFAULT_SRID,
            measure_srid: DEFAULT_MEASURE_SRID,
        }
    }
}

/// Computes intersections against a shared, read-only layer catalog.
#[derive(Debug, Clone)]
pub struct IntersectionEngine {
    catalog: Arc<LayerCatalog>,
    default_srid: u32,
    measure_crs: Crs,
}

impl IntersectionEngine {
    /// Creates an engine over `catalog`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Configuration`] if either configured spatial
    /// reference is unknown or the measurement system is not projected.
    pub fn new(catalog: Arc<LayerCatalog>, config: EngineConfig) -> Result<Self, EngineError> {
        Crs::from_srid(config.default_srid).map_err(configuration)?;
        let measure_crs = Crs::from_srid(config.measure_srid).map_err(configuration)?;

        if !measure_crs.is_projected() {
            return Err(EngineError::Configuration {
                message: format!("Measurement system {measure_crs} is not projected"),
            });
        }

        Ok(Self {
            catalog,
            default_srid: config.default_srid,
            measure_crs,
        })
    }

    /// The catalog requests are resolved against.
    #[must_use]
    pub fn catalog(&self) -> &LayerCatalog {
        &self.catalog
    }

    /// The measurement coordinate system.
    #[must_use]
    pub const fn measure_crs(&self) -> Crs {
        self.measure_crs
    }

    /// Decodes (E)WKB into a query geometry, assigning the configured
    /// default spatial reference when the payload has none.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGeometry`] if the bytes are not a
    /// usable geometry.
    pub fn decode_geometry(&self, bytes: &[u8]) -> Result<QueryGeometry, EngineError> {
        let decoded = wri_geometry::wkb::decode(bytes).map_err(EngineError::InvalidGeometry)?;
        QueryGeometry::new(decoded.geometry, decoded.srid, self.default_srid)
            .map_err(EngineError::InvalidGeometry)
    }

    /// Computes the intersections of `geometry` with every layer named in
    /// `criteria`.
    ///
    /// Records are keyed by layer name; layers sharing a name are merged
    /// into one list. A layer with no intersecting features is absent from
    /// the result.
    ///
    /// # Errors
    ///
    /// * [`EngineError::Configuration`] for a criteria key that is not a
    ///   catalog index, or two keys naming the same layer.
    /// * [`EngineError::InvalidGeometry`] if the query cannot be projected
    ///   into a layer's coordinate system.
    /// * [`EngineError::IntersectionComputation`] on the first feature whose
    ///   overlap cannot be measured.
    /// * [`EngineError::Cancelled`] or [`EngineError::DeadlineExceeded`]
    ///   once `cancel` fires.
    /// * [`EngineError::Source`] if reading a layer fails.
    pub fn compute_intersections(
        &self,
        geometry: &QueryGeometry,
        criteria: &IntersectionCriteria,
        cancel: &CancelToken,
    ) -> Result<IntersectionResult, EngineError> {
        cancel.check()?;

        let mut seen = BTreeSet::new();
        let mut layers = Vec::with_capacity(criteria.len());
        for (key, fields) in criteria.iter() {
            let layer = self.resolve(key)?;
            if !seen.insert(layer.index()) {
                return Err(EngineError::Configuration {
                    message: format!(
                        "Layer {} is named by more than one criteria key",
                        layer.index()
                    ),
                });
            }
            layers.push((layer, fields));
        }

        // Layers sharing a display name merge into one record list.
        let mut merged: BTreeMap<&str, RecordAccumulator> = BTreeMap::new();
        for (layer, fields) in layers {
            let records = merged.entry(layer.name()).or_default();
            self.intersect_layer(geometry, layer, fields, records, cancel)?;
        }

        Ok(merged
            .into_iter()
            .filter_map(|(name, records)| {
                if records.is_empty() {
                    log::trace!("No features of {name} intersect");
                    return None;
                }
                log::debug!("{name}: {} records", records.len());
                Some((name.to_string(), records.into_records()))
            })
            .collect())
    }

    /// Decodes `bytes` and runs [`Self::compute_intersections`].
    ///
    /// # Errors
    ///
    /// See [`Self::decode_geometry`] and [`Self::compute_intersections`].
    pub fn compute_intersections_wkb(
        &self,
        bytes: &[u8],
        criteria: &IntersectionCriteria,
        cancel: &CancelToken,
    ) -> Result<IntersectionResult, EngineError> {
        let geometry = self.decode_geometry(bytes)?;
        self.compute_intersections(&geometry, criteria, cancel)
    }

    /// Area and length of `geometry` in the measurement system.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidGeometry`] if the geometry cannot be
    /// projected into the measurement system.
    pub fn measure(&self, geometry: &QueryGeometry) -> Result<SizeResult, EngineError> {
        let (area, length) = measure::size(geometry.shape(), geometry.crs(), self.measure_crs)
            .map_err(EngineError::InvalidGeometry)?;
        Ok(SizeResult { area, length })
    }

    fn resolve(&self, key: &str) -> Result<&LayerEntry, EngineError> {
        let index = key
            .trim()
            .parse::<u32>()
            .map_err(|_| EngineError::Configuration {
                message: format!("Criteria key '{key}' is not a layer index"),
            })?;

        self.catalog.resolve(index).map_err(|e| match e {
            CatalogError::LayerNotFound { .. } => EngineError::Configuration {
                message: e.to_string(),
            },
            other => EngineError::Source(other),
        })
    }

    fn intersect_layer(
        &self,
        geometry: &QueryGeometry,
        layer: &LayerEntry,
        fields: &[String],
        records: &mut RecordAccumulator,
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        let class = layer.feature_class();
        let data_crs = Crs::from_srid(class.srid()).map_err(|e| EngineError::Configuration {
            message: format!("Layer '{}': {e}", layer.name()),
        })?;
        let query = geometry
            .to_crs(data_crs)
            .map_err(EngineError::InvalidGeometry)?;
        let field_map = layer.field_indexes(fields);

        log::debug!(
            "Querying {} in {data_crs} for {} fields",
            layer.name(),
            field_map.len()
        );

        cancel.check()?;
        let mut cursor = class.search(&SpatialFilter::intersects(query.shape().clone()))?;

        loop {
            cancel.check()?;
            let Some(row) = cursor.next() else {
                break;
            };
            let row = row?;

            let overlap = measure::overlap(query.shape(), row.shape, data_crs, self.measure_crs)
                .map_err(|e| EngineError::IntersectionComputation {
                    layer: layer.name().to_string(),
                    feature: row.oid,
                    message: e.to_string(),
                })?;

            records.add(get_value_at_index(row.values, &field_map), overlap);
        }

        log::trace!(
            "{}: {} features merged into {} records",
            layer.name(),
            cursor.fetched(),
            records.len()
        );

        Ok(())
    }
}

fn configuration(error: GeometryError) -> EngineError {
    EngineError::Configuration {
        message: error.to_string(),
    }
}
