//! Supported coordinate reference systems and the transforms between them.
//!
//! Systems are resolved from EPSG ids and handed to `proj4rs` as PROJ
//! definitions. No datum is declared, so shifts between NAD83 and WGS84
//! are ignored (sub-meter in the conterminous US).

use geo::{Coord, MapCoords};
use proj4rs::proj::Proj;

use crate::GeometryError;

/// Ellipsoid of a UTM system's datum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datum {
    /// North American Datum 1983 (GRS 80).
    Nad83,
    /// World Geodetic System 1984.
    Wgs84,
}

impl Datum {
    const fn ellipsoid(self) -> &'static str {
        match self {
            Self::Nad83 => "GRS80",
            Self::Wgs84 => "WGS84",
        }
    }
}

/// A coordinate reference system the engine can project between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crs {
    /// Longitude/latitude in degrees (EPSG:4326, EPSG:4269).
    Geographic {
        /// Spatial reference id.
        srid: u32,
    },
    /// Spherical Web Mercator (EPSG:3857 and its legacy aliases).
    WebMercator {
        /// Spatial reference id.
        srid: u32,
    },
    /// Universal Transverse Mercator.
    Utm {
        /// Spatial reference id.
        srid: u32,
        /// Zone number, 1-60.
        zone: u8,
        /// Whether the zone is in the northern hemisphere.
        north: bool,
        /// Datum the zone is defined on.
        datum: Datum,
    },
}

impl Crs {
    /// Resolves an EPSG spatial reference id.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError::UnsupportedSrid`] for ids outside the
    /// geographic, Web Mercator, and UTM families.
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_srid(srid: u32) -> Result<Self, GeometryError> {
        let utm = |zone: u32, north: bool, datum: Datum| Self::Utm {
            srid,
            zone: zone as u8,
            north,
            datum,
        };

        match srid {
            4326 | 4269 => Ok(Self::Geographic { srid }),
            3857 | 3785 | 900_913 | 102_100 | 102_113 => Ok(Self::WebMercator { srid }),
            26901..=26923 => Ok(utm(srid - 26900, true, Datum::Nad83)),
            32601..=32660 => Ok(utm(srid - 32600, true, Datum::Wgs84)),
            32701..=32760 => Ok(utm(srid - 32700, false, Datum::Wgs84)),
            _ => Err(GeometryError::UnsupportedSrid { srid }),
        }
    }

    /// The spatial reference id this system was resolved from.
    #[must_use]
    pub const fn srid(&self) -> u32 {
        match self {
            Self::Geographic { srid } | Self::WebMercator { srid } | Self::Utm { srid, .. } => {
                *srid
            }
        }
    }

    /// Whether coordinates in this system are planar meters.
    #[must_use]
    pub const fn is_projected(&self) -> bool {
        !matches!(self, Self::Geographic { .. })
    }

    /// PROJ definition string for this system.
    #[must_use]
    pub fn definition(&self) -> String {
        match self {
            Self::Geographic { srid: 4269 } => "+proj=latlong +ellps=GRS80".to_string(),
            Self::Geographic { .. } => "+proj=latlong +ellps=WGS84".to_string(),
            Self::WebMercator { .. } => {
                "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m"
                    .to_string()
            }
            Self::Utm {
                zone, north, datum, ..
            } => format!(
                "+proj=utm +zone={zone}{} +ellps={} +units=m",
                if *north { "" } else { " +south" },
                datum.ellipsoid()
            ),
        }
    }

    fn projection(&self) -> Result<Proj, GeometryError> {
        Proj::from_proj_string(&self.definition()).map_err(|e| {
            log::debug!("Failed to build projection for {self}: {e}");
            GeometryError::UnsupportedSrid { srid: self.srid() }
        })
    }

    /// `proj4rs` takes geographic coordinates in radians.
    fn to_proj_units(&self, coord: Coord<f64>) -> (f64, f64, f64) {
        if self.is_projected() {
            (coord.x, coord.y, 0.0)
        } else {
            (coord.x.to_radians(), coord.y.to_radians(), 0.0)
        }
    }

    fn from_proj_units(&self, (x, y, _): (f64, f64, f64)) -> Coord<f64> {
        if self.is_projected() {
            Coord { x, y }
        } else {
            Coord {
                x: x.to_degrees(),
                y: y.to_degrees(),
            }
        }
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.srid())
    }
}

/// Reprojects any geometry from `from` to `to`.
///
/// Identical systems return an unchanged copy.
///
/// # Errors
///
/// Returns [`GeometryError::Projection`] if any coordinate fails to
/// convert or does not map to a finite coordinate in the target system
/// (e.g. a pole in Web Mercator).
pub fn transform<G>(geometry: &G, from: Crs, to: Crs) -> Result<G, GeometryError>
where
    G: MapCoords<f64, f64, Output = G> + Clone,
{
    if from == to {
        return Ok(geometry.clone());
    }

    let source = from.projection()?;
    let target = to.projection()?;
    let failed = || GeometryError::Projection {
        from: from.srid(),
        to: to.srid(),
    };

    geometry.try_map_coords(|coord| {
        let mut point = from.to_proj_units(coord);
        proj4rs::transform::transform(&source, &target, &mut point).map_err(|e| {
            log::trace!("Conversion of ({}, {}) failed: {e}", coord.x, coord.y);
            failed()
        })?;

        let projected = to.from_proj_units(point);
        if projected.x.is_finite() && projected.y.is_finite() {
            Ok(projected)
        } else {
            Err(failed())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Point, Polygon, polygon};

    fn close(a: f64, b: f64, tolerance: f64) -> bool {
        (a - b).abs() <= tolerance
    }

    fn wgs84() -> Crs {
        Crs::from_srid(4326).unwrap()
    }

    #[test]
    fn resolves_known_srids() {
        assert_eq!(Crs::from_srid(3857).unwrap(), Crs::WebMercator { srid: 3857 });
        assert_eq!(Crs::from_srid(4326).unwrap(), Crs::Geographic { srid: 4326 });
        assert_eq!(
            Crs::from_srid(26912).unwrap(),
            Crs::Utm {
                srid: 26912,
                zone: 12,
                north: true,
                datum: Datum::Nad83,
            }
        );
        assert!(matches!(
            Crs::from_srid(32733).unwrap(),
            Crs::Utm {
                zone: 33,
                north: false,
                ..
            }
        ));
    }

    #[test]
    fn rejects_unknown_srid() {
        assert_eq!(
            Crs::from_srid(2152),
            Err(GeometryError::UnsupportedSrid { srid: 2152 })
        );
    }

    #[test]
    fn southern_zone_definition() {
        assert_eq!(
            Crs::from_srid(32733).unwrap().definition(),
            "+proj=utm +zone=33 +south +ellps=WGS84 +units=m"
        );
    }

    #[test]
    fn utm_central_meridian_has_false_easting() {
        let utm = Crs::from_srid(26912).unwrap();
        let projected = transform(&Point::new(-111.0, 40.0), wgs84(), utm).unwrap();
        assert!(close(projected.x(), 500_000.0, 1e-3));
        assert!(projected.y() > 4_427_000.0 && projected.y() < 4_428_500.0);
    }

    #[test]
    fn utm_round_trips() {
        let utm = Crs::from_srid(26912).unwrap();
        for (lon, lat) in [(-111.9, 40.76), (-109.05, 37.0), (-113.9, 41.99)] {
            let projected = transform(&Point::new(lon, lat), wgs84(), utm).unwrap();
            let back = transform(&projected, utm, wgs84()).unwrap();
            assert!(close(back.x(), lon, 1e-7), "lon {lon} -> {}", back.x());
            assert!(close(back.y(), lat, 1e-7), "lat {lat} -> {}", back.y());
        }
    }

    #[test]
    fn web_mercator_round_trips() {
        let mercator = Crs::from_srid(3857).unwrap();
        let projected = transform(&Point::new(-111.9, 40.76), wgs84(), mercator).unwrap();
        assert!(close(projected.x(), -12_456_651.0, 1.0));
        let back = transform(&projected, mercator, wgs84()).unwrap();
        assert!(close(back.x(), -111.9, 1e-9));
        assert!(close(back.y(), 40.76, 1e-9));
    }

    #[test]
    fn identity_transform_keeps_coordinates() {
        let utm = Crs::from_srid(26912).unwrap();
        let square: Polygon<f64> = polygon![(x: 0.0, y: 0.0), (x: 10.0, y: 0.0), (x: 10.0, y: 10.0), (x: 0.0, y: 10.0)];
        let same = transform(&square, utm, utm).unwrap();
        assert_eq!(same, square);
    }

    #[test]
    fn web_mercator_area_shrinks_to_ground_area_in_utm() {
        let mercator = Crs::from_srid(3857).unwrap();
        let utm = Crs::from_srid(26912).unwrap();
        let center = transform(&Point::new(-111.0, 40.0), wgs84(), mercator).unwrap();
        let half = 500.0;
        let square: Polygon<f64> = polygon![
            (x: center.x() - half, y: center.y() - half),
            (x: center.x() + half, y: center.y() - half),
            (x: center.x() + half, y: center.y() + half),
            (x: center.x() - half, y: center.y() + half),
        ];

        let projected = transform(&square, mercator, utm).unwrap();
        let expected = 1_000_000.0 * 40_f64.to_radians().cos().powi(2);
        let area = projected.unsigned_area();
        assert!(
            (area - expected).abs() / expected < 0.01,
            "area {area} expected about {expected}"
        );
    }

    #[test]
    fn pole_fails_in_web_mercator() {
        let mercator = Crs::from_srid(3857).unwrap();
        let pole = Point::new(0.0, 90.0);
        assert!(matches!(
            transform(&pole, wgs84(), mercator),
            Err(GeometryError::Projection {
                from: 4326,
                to: 3857
            })
        ));
    }
}
