//! Well-known binary geometry codec.
//!
//! Reads OGC WKB as produced by SQL Server's `STAsBinary()`, ISO WKB with
//! Z/M type offsets, and `PostGIS` EWKB (SRID and Z/M flag bits). Extra
//! ordinates are read and dropped; all intersection math is 2D.

use std::io::{Cursor, Read};

use geo::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

use crate::GeometryError;

mod type_codes {
    pub const POINT: u32 = 1;
    pub const LINESTRING: u32 = 2;
    pub const POLYGON: u32 = 3;
    pub const MULTIPOINT: u32 = 4;
    pub const MULTILINESTRING: u32 = 5;
    pub const MULTIPOLYGON: u32 = 6;
    pub const GEOMETRY_COLLECTION: u32 = 7;

    pub const EWKB_Z: u32 = 0x8000_0000;
    pub const EWKB_M: u32 = 0x4000_0000;
    pub const EWKB_SRID: u32 = 0x2000_0000;
}

/// Collections nested deeper than this are rejected.
const MAX_DEPTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ByteOrder {
    Big,
    Little,
}

/// A decoded geometry and the SRID it carried, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWkb {
    /// The geometry.
    pub geometry: Geometry<f64>,
    /// SRID from an EWKB header.
    pub srid: Option<u32>,
}

/// Decodes a WKB or EWKB payload.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidWkb`] if the payload is truncated, uses
/// an unknown byte order or type code, or has trailing bytes.
pub fn decode(bytes: &[u8]) -> Result<DecodedWkb, GeometryError> {
    if bytes.is_empty() {
        return Err(invalid("no bytes supplied"));
    }

    let mut reader = WkbReader {
        cursor: Cursor::new(bytes),
    };
    let (geometry, srid) = reader.geometry(0)?;

    if reader.remaining() != 0 {
        return Err(invalid(format!(
            "{} trailing bytes after geometry",
            reader.remaining()
        )));
    }

    Ok(DecodedWkb { geometry, srid })
}

fn invalid(message: impl Into<String>) -> GeometryError {
    GeometryError::InvalidWkb {
        message: message.into(),
    }
}

struct WkbReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl WkbReader<'_> {
    fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        #[allow(clippy::cast_possible_truncation)]
        let pos = self.cursor.position() as usize;
        len.saturating_sub(pos)
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], GeometryError> {
        let mut buf = [0u8; N];
        self.cursor
            .read_exact(&mut buf)
            .map_err(|_| invalid("unexpected end of input"))?;
        Ok(buf)
    }

    fn byte_order(&mut self) -> Result<ByteOrder, GeometryError> {
        match self.bytes::<1>()?[0] {
            0 => Ok(ByteOrder::Big),
            1 => Ok(ByteOrder::Little),
            other => Err(invalid(format!("invalid byte order marker {other}"))),
        }
    }

    fn u32(&mut self, order: ByteOrder) -> Result<u32, GeometryError> {
        let buf = self.bytes::<4>()?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(buf),
            ByteOrder::Little => u32::from_le_bytes(buf),
        })
    }

    fn f64(&mut self, order: ByteOrder) -> Result<f64, GeometryError> {
        let buf = self.bytes::<8>()?;
        Ok(match order {
            ByteOrder::Big => f64::from_be_bytes(buf),
            ByteOrder::Little => f64::from_le_bytes(buf),
        })
    }

    /// Reads an element count and checks it against the bytes left, so a
    /// corrupt count cannot trigger a huge allocation.
    fn count(&mut self, order: ByteOrder, min_element_size: usize) -> Result<usize, GeometryError> {
        let count = self.u32(order)? as usize;
        if count.saturating_mul(min_element_size) > self.remaining() {
            return Err(invalid(format!("element count {count} exceeds payload size")));
        }
        Ok(count)
    }

    fn geometry(&mut self, depth: usize) -> Result<(Geometry<f64>, Option<u32>), GeometryError> {
        if depth > MAX_DEPTH {
            return Err(invalid("geometry collections nested too deeply"));
        }

        let order = self.byte_order()?;
        let raw_type = self.u32(order)?;

        let srid = if raw_type & type_codes::EWKB_SRID == 0 {
            None
        } else {
            Some(self.u32(order)?)
        };

        let flags_z = raw_type & type_codes::EWKB_Z != 0;
        let flags_m = raw_type & type_codes::EWKB_M != 0;
        let iso_type = raw_type & 0x0FFF_FFFF;
        let (base, iso_z, iso_m) = match iso_type / 1000 {
            0 => (iso_type, false, false),
            1 => (iso_type - 1000, true, false),
            2 => (iso_type - 2000, false, true),
            3 => (iso_type - 3000, true, true),
            _ => return Err(invalid(format!("unknown geometry type {raw_type}"))),
        };
        let dims = 2 + usize::from(flags_z || iso_z) + usize::from(flags_m || iso_m);

        let geometry = match base {
            type_codes::POINT => self.point(order, dims)?.map_or_else(
                || Geometry::MultiPoint(MultiPoint::new(Vec::new())),
                Geometry::Point,
            ),
            type_codes::LINESTRING => Geometry::LineString(self.line_string(order, dims)?),
            type_codes::POLYGON => Geometry::Polygon(self.polygon(order, dims)?),
            type_codes::MULTIPOINT => {
                let count = self.count(order, 5)?;
                let mut points = Vec::with_capacity(count);
                for _ in 0..count {
                    match self.geometry(depth + 1)?.0 {
                        Geometry::Point(p) => points.push(p),
                        Geometry::MultiPoint(empty) if empty.0.is_empty() => {}
                        other => return Err(unexpected_member("MultiPoint", &other)),
                    }
                }
                Geometry::MultiPoint(MultiPoint::new(points))
            }
            type_codes::MULTILINESTRING => {
                let count = self.count(order, 9)?;
                let mut lines = Vec::with_capacity(count);
                for _ in 0..count {
                    match self.geometry(depth + 1)?.0 {
                        Geometry::LineString(ls) => lines.push(ls),
                        other => return Err(unexpected_member("MultiLineString", &other)),
                    }
                }
                Geometry::MultiLineString(MultiLineString::new(lines))
            }
            type_codes::MULTIPOLYGON => {
                let count = self.count(order, 9)?;
                let mut polygons = Vec::with_capacity(count);
                for _ in 0..count {
                    match self.geometry(depth + 1)?.0 {
                        Geometry::Polygon(p) => polygons.push(p),
                        other => return Err(unexpected_member("MultiPolygon", &other)),
                    }
                }
                Geometry::MultiPolygon(MultiPolygon::new(polygons))
            }
            type_codes::GEOMETRY_COLLECTION => {
                let count = self.count(order, 5)?;
                let mut members = Vec::with_capacity(count);
                for _ in 0..count {
                    members.push(self.geometry(depth + 1)?.0);
                }
                Geometry::GeometryCollection(GeometryCollection(members))
            }
            other => return Err(invalid(format!("unsupported geometry type {other}"))),
        };

        Ok((geometry, srid))
    }

    fn coord(&mut self, order: ByteOrder, dims: usize) -> Result<Coord<f64>, GeometryError> {
        let x = self.f64(order)?;
        let y = self.f64(order)?;
        for _ in 2..dims {
            self.f64(order)?;
        }
        Ok(Coord { x, y })
    }

    /// An empty point is encoded with NaN ordinates.
    fn point(&mut self, order: ByteOrder, dims: usize) -> Result<Option<Point<f64>>, GeometryError> {
        let coord = self.coord(order, dims)?;
        if coord.x.is_nan() && coord.y.is_nan() {
            Ok(None)
        } else {
            Ok(Some(Point(coord)))
        }
    }

    fn line_string(&mut self, order: ByteOrder, dims: usize) -> Result<LineString<f64>, GeometryError> {
        let count = self.count(order, dims * 8)?;
        let mut coords = Vec::with_capacity(count);
        for _ in 0..count {
            coords.push(self.coord(order, dims)?);
        }
        Ok(LineString::new(coords))
    }

    fn polygon(&mut self, order: ByteOrder, dims: usize) -> Result<Polygon<f64>, GeometryError> {
        let ring_count = self.count(order, 4)?;
        let mut rings = Vec::with_capacity(ring_count);
        for _ in 0..ring_count {
            rings.push(self.line_string(order, dims)?);
        }

        let mut rings = rings.into_iter();
        let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
        Ok(Polygon::new(exterior, rings.collect()))
    }
}

fn unexpected_member(container: &str, member: &Geometry<f64>) -> GeometryError {
    invalid(format!(
        "{container} contains a {} member",
        crate::shape::geometry_type_name(member)
    ))
}

/// Encodes a geometry as little-endian WKB, or EWKB when `srid` is given.
///
/// `Line`, `Rect`, and `Triangle` are written as their line string or
/// polygon equivalents.
#[must_use]
pub fn encode(geometry: &Geometry<f64>, srid: Option<u32>) -> Vec<u8> {
    let mut out = Vec::new();
    write_geometry(&mut out, geometry, srid);
    out
}

fn write_header(out: &mut Vec<u8>, type_code: u32, srid: Option<u32>) {
    out.push(1);
    match srid {
        Some(srid) => {
            out.extend_from_slice(&(type_code | type_codes::EWKB_SRID).to_le_bytes());
            out.extend_from_slice(&srid.to_le_bytes());
        }
        None => out.extend_from_slice(&type_code.to_le_bytes()),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn write_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&(len as u32).to_le_bytes());
}

fn write_coord(out: &mut Vec<u8>, coord: Coord<f64>) {
    out.extend_from_slice(&coord.x.to_le_bytes());
    out.extend_from_slice(&coord.y.to_le_bytes());
}

fn write_coords(out: &mut Vec<u8>, line: &LineString<f64>) {
    write_len(out, line.0.len());
    for coord in &line.0 {
        write_coord(out, *coord);
    }
}

fn write_polygon_body(out: &mut Vec<u8>, polygon: &Polygon<f64>) {
    write_len(out, 1 + polygon.interiors().len());
    write_coords(out, polygon.exterior());
    for ring in polygon.interiors() {
        write_coords(out, ring);
    }
}

fn write_geometry(out: &mut Vec<u8>, geometry: &Geometry<f64>, srid: Option<u32>) {
    match geometry {
        Geometry::Point(p) => {
            write_header(out, type_codes::POINT, srid);
            write_coord(out, p.0);
        }
        Geometry::Line(line) => {
            write_geometry(out, &Geometry::LineString(LineString::from(*line)), srid);
        }
        Geometry::LineString(ls) => {
            write_header(out, type_codes::LINESTRING, srid);
            write_coords(out, ls);
        }
        Geometry::Polygon(p) => {
            write_header(out, type_codes::POLYGON, srid);
            write_polygon_body(out, p);
        }
        Geometry::Rect(rect) => write_geometry(out, &Geometry::Polygon(rect.to_polygon()), srid),
        Geometry::Triangle(t) => write_geometry(out, &Geometry::Polygon(t.to_polygon()), srid),
        Geometry::MultiPoint(mp) => {
            write_header(out, type_codes::MULTIPOINT, srid);
            write_len(out, mp.0.len());
            for p in &mp.0 {
                write_geometry(out, &Geometry::Point(*p), None);
            }
        }
        Geometry::MultiLineString(mls) => {
            write_header(out, type_codes::MULTILINESTRING, srid);
            write_len(out, mls.0.len());
            for ls in &mls.0 {
                write_header(out, type_codes::LINESTRING, None);
                write_coords(out, ls);
            }
        }
        Geometry::MultiPolygon(mp) => {
            write_header(out, type_codes::MULTIPOLYGON, srid);
            write_len(out, mp.0.len());
            for p in &mp.0 {
                write_header(out, type_codes::POLYGON, None);
                write_polygon_body(out, p);
            }
        }
        Geometry::GeometryCollection(gc) => {
            write_header(out, type_codes::GEOMETRY_COLLECTION, srid);
            write_len(out, gc.0.len());
            for member in &gc.0 {
                write_geometry(out, member, None);
            }
        }
    }
}
