#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Geometry handling for reference-layer intersections.
//!
//! Decodes caller geometries from (E)WKB, assigns a default projected CRS
//! when none is supplied, normalizes polygons (self-intersections resolved,
//! positive orientation), reprojects between the supported coordinate
//! systems, and computes the dimensional overlap measure between a query
//! shape and a reference feature.

pub mod crs;
pub mod measure;
pub mod shape;
pub mod wkb;

use thiserror::Error;

pub use crs::Crs;
pub use shape::{GeometryKind, QueryGeometry, Shape};

/// Spatial reference assigned to geometries that arrive without one
/// (Web Mercator).
pub const DEFAULT_SRID: u32 = 3857;

/// Spatial reference areas and lengths are measured in (NAD83 / UTM zone
/// 12N).
pub const DEFAULT_MEASURE_SRID: u32 = 26912;

/// Errors that can occur while decoding, projecting, or measuring
/// geometries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// The WKB payload could not be decoded.
    #[error("Invalid geometry: {message}")]
    InvalidWkb {
        /// Description of what went wrong.
        message: String,
    },

    /// The geometry has no usable content.
    #[error("Geometry is empty: {message}")]
    Empty {
        /// Description of what is missing.
        message: String,
    },

    /// The geometry type has no intersection semantics.
    #[error("Unsupported geometry: {message}")]
    Unsupported {
        /// Description of the offending geometry.
        message: String,
    },

    /// No projection is known for the spatial reference id.
    #[error("Unsupported spatial reference: {srid}")]
    UnsupportedSrid {
        /// The spatial reference id.
        srid: u32,
    },

    /// Reprojecting produced coordinates outside the target system.
    #[error("Projection from {from} to {to} failed")]
    Projection {
        /// Source spatial reference id.
        from: u32,
        /// Target spatial reference id.
        to: u32,
    },

    /// A geometric operation failed on the given input.
    #[error("{message}")]
    Computation {
        /// Description of the failure.
        message: String,
    },
}
