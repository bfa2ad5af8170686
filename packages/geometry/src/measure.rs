//! Dimensional overlap measures.
//!
//! | query    | candidate | measure                                   |
//! |----------|-----------|-------------------------------------------|
//! | polygon  | polygon   | area of the 2-D intersection              |
//! | polygon  | polyline  | length of the candidate inside the query  |
//! | polyline | polygon   | length of the query inside the candidate  |
//! | polyline | polyline  | length of collinear overlap               |
//! | any      | point     | `0.0` (membership only)                   |
//! | point    | any       | `0.0` (membership only)                   |
//!
//! Intersections are computed in the data's coordinate system and then
//! reprojected into the measurement system, so reported values are square
//! meters or meters.

use std::panic::{AssertUnwindSafe, catch_unwind};

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{
    Area, BooleanOps, BoundingRect, Euclidean, Intersects, Length, Line, LineString,
    MultiLineString, MultiPolygon,
};

use crate::crs::{Crs, transform};
use crate::{GeometryError, Shape};

/// Runs a geometric operation, converting a panic inside the geometry
/// kernel into [`GeometryError::Computation`].
///
/// # Errors
///
/// Returns [`GeometryError::Computation`] if `op` panics.
pub fn guard<T>(what: &str, op: impl FnOnce() -> T) -> Result<T, GeometryError> {
    catch_unwind(AssertUnwindSafe(op)).map_err(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown failure".to_string());
        GeometryError::Computation {
            message: format!("{what} failed: {detail}"),
        }
    })
}

/// Computes the overlap measure between a query shape and a candidate
/// feature shape, both in `data_crs`, measured in `measure_crs`.
///
/// The result is always non-negative.
///
/// # Errors
///
/// Returns [`GeometryError::Computation`] if the intersection cannot be
/// computed or yields non-finite values, and
/// [`GeometryError::Projection`] if it cannot be reprojected.
pub fn overlap(
    query: &Shape,
    candidate: &Shape,
    data_crs: Crs,
    measure_crs: Crs,
) -> Result<f64, GeometryError> {
    let measure = match (query, candidate) {
        (Shape::Polygon(q), Shape::Polygon(c)) => {
            let intersection = guard("polygon intersection", || q.intersection(c))?;
            area(&transform(&intersection, data_crs, measure_crs)?)
        }
        (Shape::Polygon(q), Shape::Polyline(c)) => {
            let inside = guard("line clip", || q.clip(c, false))?;
            length(&transform(&inside, data_crs, measure_crs)?)
        }
        (Shape::Polyline(q), Shape::Polygon(c)) => {
            let inside = guard("line clip", || c.clip(q, false))?;
            length(&transform(&inside, data_crs, measure_crs)?)
        }
        (Shape::Polyline(q), Shape::Polyline(c)) => {
            let shared = collinear_overlap(q, c);
            length(&transform(&shared, data_crs, measure_crs)?)
        }
        (Shape::Points(_), _) | (_, Shape::Points(_)) => 0.0,
    };

    if measure.is_finite() {
        Ok(measure.abs())
    } else {
        Err(GeometryError::Computation {
            message: "intersection produced a non-finite measure".to_string(),
        })
    }
}

/// Area and length of a single shape in `measure_crs`. Polygons report
/// their perimeter as the length.
///
/// # Errors
///
/// Returns [`GeometryError::Projection`] if the shape cannot be
/// reprojected.
pub fn size(shape: &Shape, from: Crs, measure_crs: Crs) -> Result<(f64, f64), GeometryError> {
    Ok(match shape.transform(from, measure_crs)? {
        Shape::Polygon(mp) => {
            let rings: MultiLineString<f64> = MultiLineString::new(
                mp.0.iter()
                    .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                    .cloned()
                    .collect(),
            );
            (area(&mp), length(&rings))
        }
        Shape::Polyline(mls) => (0.0, length(&mls)),
        Shape::Points(_) => (0.0, 0.0),
    })
}

fn area(polygons: &MultiPolygon<f64>) -> f64 {
    polygons.unsigned_area()
}

fn length(lines: &MultiLineString<f64>) -> f64 {
    Euclidean.length(lines)
}

/// Segments shared by both line sets.
fn collinear_overlap(a: &MultiLineString<f64>, b: &MultiLineString<f64>) -> MultiLineString<f64> {
    let b_lines: Vec<Line<f64>> = b.0.iter().flat_map(LineString::lines).collect();
    let mut shared = Vec::new();

    for line in a.0.iter().flat_map(LineString::lines) {
        let bounds = line.bounding_rect();
        for other in &b_lines {
            if !bounds.intersects(&other.bounding_rect()) {
                continue;
            }
            if let Some(LineIntersection::Collinear { intersection }) = line_intersection(line, *other) {
                shared.push(LineString::from(intersection));
            }
        }
    }

    MultiLineString::new(shared)
}
