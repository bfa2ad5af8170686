//! Dimension-classified shapes and the caller's query geometry.

use geo::algorithm::orient::{Direction, Orient};
use geo::{
    Area, BooleanOps, BoundingRect, Geometry, Intersects, LineString, MultiLineString, MultiPoint,
    MultiPolygon, Polygon, Rect,
};
use strum_macros::{AsRefStr, Display};

use crate::crs::{self, Crs};
use crate::{DEFAULT_SRID, GeometryError, wkb};

/// Topological dimension of a shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum GeometryKind {
    /// Zero-dimensional point set.
    Point,
    /// One-dimensional line work.
    Polyline,
    /// Two-dimensional area.
    Polygon,
}

/// A geometry collapsed to a single dimension.
///
/// Every geometry the engine touches is one of these three; `Line`,
/// `Rect`, `Triangle`, and single-part types are widened to their multi
/// forms.
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Points.
    Points(MultiPoint<f64>),
    /// Line strings.
    Polyline(MultiLineString<f64>),
    /// Polygons.
    Polygon(MultiPolygon<f64>),
}

impl Shape {
    /// Classifies a geometry by dimension.
    ///
    /// Geometry collections are accepted when every member has the same
    /// dimension.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Unsupported`] for collections mixing
    /// dimensions.
    pub fn from_geometry(geometry: Geometry<f64>) -> Result<Self, GeometryError> {
        Ok(match geometry {
            Geometry::Point(p) => Self::Points(MultiPoint::new(vec![p])),
            Geometry::MultiPoint(mp) => Self::Points(mp),
            Geometry::Line(line) => {
                Self::Polyline(MultiLineString::new(vec![LineString::from(line)]))
            }
            Geometry::LineString(ls) => Self::Polyline(MultiLineString::new(vec![ls])),
            Geometry::MultiLineString(mls) => Self::Polyline(mls),
            Geometry::Polygon(p) => Self::Polygon(MultiPolygon::new(vec![p])),
            Geometry::MultiPolygon(mp) => Self::Polygon(mp),
            Geometry::Rect(rect) => Self::Polygon(MultiPolygon::new(vec![rect.to_polygon()])),
            Geometry::Triangle(t) => Self::Polygon(MultiPolygon::new(vec![t.to_polygon()])),
            Geometry::GeometryCollection(gc) => {
                let mut members = gc.0.into_iter().map(Self::from_geometry);
                let Some(first) = members.next().transpose()? else {
                    return Ok(Self::Points(MultiPoint::new(Vec::new())));
                };
                members.try_fold(first, |acc, member| acc.merge(member?))?
            }
        })
    }

    fn merge(self, other: Self) -> Result<Self, GeometryError> {
        match (self, other) {
            (Self::Points(mut a), Self::Points(b)) => {
                a.0.extend(b.0);
                Ok(Self::Points(a))
            }
            (Self::Polyline(mut a), Self::Polyline(b)) => {
                a.0.extend(b.0);
                Ok(Self::Polyline(a))
            }
            (Self::Polygon(mut a), Self::Polygon(b)) => {
                a.0.extend(b.0);
                Ok(Self::Polygon(a))
            }
            (a, b) => Err(GeometryError::Unsupported {
                message: format!(
                    "geometry collection mixes {} and {} members",
                    a.kind(),
                    b.kind()
                ),
            }),
        }
    }

    /// The shape's dimension.
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        match self {
            Self::Points(_) => GeometryKind::Point,
            Self::Polyline(_) => GeometryKind::Polyline,
            Self::Polygon(_) => GeometryKind::Polygon,
        }
    }

    /// Whether the shape has no coordinates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Points(mp) => mp.0.is_empty(),
            Self::Polyline(mls) => mls.0.iter().all(|ls| ls.0.len() < 2),
            Self::Polygon(mp) => mp.0.iter().all(|p| p.exterior().0.len() < 4),
        }
    }

    /// Converts back into a plain geometry.
    #[must_use]
    pub fn to_geometry(&self) -> Geometry<f64> {
        match self {
            Self::Points(mp) => Geometry::MultiPoint(mp.clone()),
            Self::Polyline(mls) => Geometry::MultiLineString(mls.clone()),
            Self::Polygon(mp) => Geometry::MultiPolygon(mp.clone()),
        }
    }

    /// Bounding rectangle, `None` when empty.
    #[must_use]
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        match self {
            Self::Points(mp) => mp.bounding_rect(),
            Self::Polyline(mls) => mls.bounding_rect(),
            Self::Polygon(mp) => mp.bounding_rect(),
        }
    }

    /// Whether the two shapes share at least one point.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        match other {
            Self::Points(g) => self.intersects_geometry(g),
            Self::Polyline(g) => self.intersects_geometry(g),
            Self::Polygon(g) => self.intersects_geometry(g),
        }
    }

    fn intersects_geometry<G>(&self, other: &G) -> bool
    where
        MultiPoint<f64>: Intersects<G>,
        MultiLineString<f64>: Intersects<G>,
        MultiPolygon<f64>: Intersects<G>,
    {
        match self {
            Self::Points(s) => s.intersects(other),
            Self::Polyline(s) => s.intersects(other),
            Self::Polygon(s) => s.intersects(other),
        }
    }

    /// Reprojects the shape.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if a coordinate cannot be
    /// represented in `to`.
    pub fn transform(&self, from: Crs, to: Crs) -> Result<Self, GeometryError> {
        Ok(match self {
            Self::Points(mp) => Self::Points(crs::transform(mp, from, to)?),
            Self::Polyline(mls) => Self::Polyline(crs::transform(mls, from, to)?),
            Self::Polygon(mp) => Self::Polygon(crs::transform(mp, from, to)?),
        })
    }

    fn has_finite_coords(&self) -> bool {
        use geo::CoordsIter;

        let finite = |c: geo::Coord<f64>| c.x.is_finite() && c.y.is_finite();
        match self {
            Self::Points(mp) => mp.coords_iter().all(finite),
            Self::Polyline(mls) => mls.coords_iter().all(finite),
            Self::Polygon(mp) => mp.coords_iter().all(finite),
        }
    }
}

/// The caller-supplied geometry, validated, normalized, and tagged with
/// its coordinate system.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGeometry {
    shape: Shape,
    crs: Crs,
}

impl QueryGeometry {
    /// Validates a geometry for use as an intersection query.
    ///
    /// Geometries without a spatial reference are assigned `default_srid`.
    /// SRID 0 means "no spatial reference" and is treated the same way.
    /// Polygons are made topologically simple and positively oriented.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the geometry is empty, has non-finite
    /// coordinates, mixes dimensions, uses an unknown SRID, or is a
    /// polygon with no area.
    pub fn new(
        geometry: Geometry<f64>,
        srid: Option<u32>,
        default_srid: u32,
    ) -> Result<Self, GeometryError> {
        let srid = srid.filter(|&srid| srid != 0).unwrap_or(default_srid);
        let crs = Crs::from_srid(srid)?;
        let shape = Shape::from_geometry(geometry)?;

        if shape.is_empty() {
            return Err(GeometryError::Empty {
                message: format!("{} has no coordinates", shape.kind()),
            });
        }
        if !shape.has_finite_coords() {
            return Err(GeometryError::InvalidWkb {
                message: "coordinates must be finite numbers".to_string(),
            });
        }

        let shape = match shape {
            Shape::Polygon(mp) => Shape::Polygon(normalize_polygon(&mp)?),
            other => other,
        };

        Ok(Self { shape, crs })
    }

    /// Decodes (E)WKB bytes into a query geometry, assigning
    /// [`DEFAULT_SRID`] when the payload carries no SRID.
    ///
    /// # Errors
    ///
    /// See [`wkb::decode`] and [`Self::new`].
    pub fn from_wkb(bytes: &[u8]) -> Result<Self, GeometryError> {
        let decoded = wkb::decode(bytes)?;
        Self::new(decoded.geometry, decoded.srid, DEFAULT_SRID)
    }

    /// The normalized shape.
    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    /// The coordinate system of [`Self::shape`].
    #[must_use]
    pub const fn crs(&self) -> Crs {
        self.crs
    }

    /// The shape's dimension.
    #[must_use]
    pub const fn kind(&self) -> GeometryKind {
        self.shape.kind()
    }

    /// Reprojects into another coordinate system.
    ///
    /// Both supported projections are conformal, so polygon orientation
    /// and simplicity survive the transform.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::Projection`] if a coordinate cannot be
    /// represented in `to`.
    pub fn to_crs(&self, to: Crs) -> Result<Self, GeometryError> {
        Ok(Self {
            shape: self.shape.transform(self.crs, to)?,
            crs: to,
        })
    }
}

/// Resolves self-intersections and orients every polygon so its exterior
/// ring is counter-clockwise (positive signed area).
///
/// # Errors
///
/// Returns [`GeometryError::Empty`] when nothing with area remains.
pub fn normalize_polygon(polygons: &MultiPolygon<f64>) -> Result<MultiPolygon<f64>, GeometryError> {
    let simple = crate::measure::guard("simplifying polygon", || {
        polygons.union(&MultiPolygon::<f64>::new(Vec::new()))
    })?;
    let mut oriented = simple.orient(Direction::Default);

    if oriented.signed_area() < 0.0 {
        log::trace!("Reversing negatively oriented polygon");
        oriented = MultiPolygon::new(oriented.0.iter().map(reverse_rings).collect());
    }

    if oriented.0.len() != polygons.0.len() {
        log::trace!(
            "Simplified {} polygons into {}",
            polygons.0.len(),
            oriented.0.len()
        );
    }

    if oriented.0.is_empty() || oriented.unsigned_area() <= 0.0 {
        return Err(GeometryError::Empty {
            message: "polygon has no area".to_string(),
        });
    }

    Ok(oriented)
}

fn reverse_rings(polygon: &Polygon<f64>) -> Polygon<f64> {
    let reverse = |ring: &LineString<f64>| LineString::new(ring.0.iter().rev().copied().collect());
    Polygon::new(
        reverse(polygon.exterior()),
        polygon.interiors().iter().map(reverse).collect(),
    )
}

/// Name of a geometry's type, for messages.
#[must_use]
pub const fn geometry_type_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
