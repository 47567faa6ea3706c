//! Decoding of the geometry command stream.
//!
//! A feature's geometry is a packed sequence of unsigned 32 bit integers: a
//! command integer packing a command id (3 bits) and a count (29 bits),
//! followed by `count` pairs of zigzag-encoded parameter integers which are
//! deltas relative to a running cursor. The decoders below walk that stream
//! and report the structured geometry through a [`GeomHandler`].

use crate::error::{Error, Result};
use crate::pbf;

pub(crate) const CMD_MOVE_TO: u32 = 1;
pub(crate) const CMD_LINE_TO: u32 = 2;
pub(crate) const CMD_CLOSE_PATH: u32 = 7;

/// Pack a command id and count into a command integer.
pub(crate) const fn command_integer(id: u32, count: u32) -> u32 {
    (id & 0x7) | (count << 3)
}

pub(crate) trait ZigZag {
    /// Encodes a value to zigzag
    fn zigzag(self) -> u32;
}

pub(crate) trait ZagZig {
    /// Decodes a value from zigzag encoding
    fn zagzig(self) -> i32;
}

impl ZigZag for i32 {
    fn zigzag(self) -> u32 {
        ((self << 1) ^ (self >> 31)) as u32
    }
}

impl ZagZig for u32 {
    fn zagzig(self) -> i32 {
        (self >> 1) as i32 ^ -((self & 1) as i32)
    }
}

/// A point in the integer coordinate space of a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

impl From<(i32, i32)> for Point {
    fn from((x, y): (i32, i32)) -> Self {
        Self { x, y }
    }
}

/// The geometry type declared by a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GeomType {
    #[default]
    Unknown,
    Point,
    Linestring,
    Polygon,
}

impl GeomType {
    pub(crate) fn from_wire(value: u64) -> Result<Self> {
        match value {
            0 => Ok(GeomType::Unknown),
            1 => Ok(GeomType::Point),
            2 => Ok(GeomType::Linestring),
            3 => Ok(GeomType::Polygon),
            other => Err(Error::Format(
                format!("unknown geometry type {other} in feature").into(),
            )),
        }
    }

    pub(crate) fn to_wire(self) -> u64 {
        match self {
            GeomType::Unknown => 0,
            GeomType::Point => 1,
            GeomType::Linestring => 2,
            GeomType::Polygon => 3,
        }
    }
}

/// An undecoded geometry: the declared type plus the raw command stream.
#[derive(Debug, Clone, Copy)]
pub struct Geometry<'a> {
    geom_type: GeomType,
    data: &'a [u8],
}

impl<'a> Geometry<'a> {
    pub fn new(geom_type: GeomType, data: &'a [u8]) -> Self {
        Self { geom_type, data }
    }

    pub fn geom_type(&self) -> GeomType {
        self.geom_type
    }

    /// The packed command stream, still varint-encoded.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}

/// Receiver for decoded geometry.
///
/// Only the method group matching the decoder entry point is invoked:
/// `points_*` for point geometries, `linestring_*` for linestrings and
/// `ring_*` for polygons. All methods default to doing nothing, so a handler
/// implements just the group it cares about. The `*_begin` count is the
/// number of points the primitive will report; it is a reservation hint.
pub trait GeomHandler {
    fn points_begin(&mut self, _count: u32) {}
    fn points_point(&mut self, _point: Point) {}
    fn points_end(&mut self) {}

    fn linestring_begin(&mut self, _count: u32) {}
    fn linestring_point(&mut self, _point: Point) {}
    fn linestring_end(&mut self) {}

    fn ring_begin(&mut self, _count: u32) {}
    fn ring_point(&mut self, _point: Point) {}
    /// Called once per ring; `is_outer` is true when the shoelace sum over
    /// the closed ring is positive (clockwise in y-down screen space).
    fn ring_end(&mut self, _is_outer: bool) {}
}

fn det(a: Point, b: Point) -> i64 {
    i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y)
}

/// Walks a command stream one command and one point at a time.
struct CommandScanner<'a> {
    pbf: pbf::Reader<'a>,
    cursor: Point,
    command_id: u32,
    count: u32,
    strict: bool,
}

impl<'a> CommandScanner<'a> {
    fn new(data: &'a [u8], strict: bool) -> Self {
        Self {
            pbf: pbf::Reader::new(data),
            cursor: Point::default(),
            command_id: 0,
            count: 0,
            strict,
        }
    }

    fn count(&self) -> u32 {
        self.count
    }

    fn done(&self) -> bool {
        self.pbf.at_end()
    }

    /// Read the next command integer; errors unless it matches `expected`.
    /// Returns false at the end of the stream.
    fn next_command(&mut self, expected: u32) -> Result<bool> {
        debug_assert_eq!(self.count, 0);

        if self.done() {
            return Ok(false);
        }

        let word = self
            .pbf
            .read_u32()
            .map_err(|_| Error::Geometry("malformed command integer".into()))?;
        self.command_id = word & 0x7;
        if self.command_id == CMD_CLOSE_PATH {
            // "A ClosePath command MUST have a command count of 1"
            if word >> 3 != 1 {
                return Err(Error::Geometry("ClosePath command count is not 1".into()));
            }
        } else {
            self.count = word >> 3;
        }

        if self.command_id != expected {
            return Err(Error::Geometry(
                format!(
                    "expected command {expected} but got {}",
                    self.command_id
                )
                .into(),
            ));
        }

        Ok(true)
    }

    /// Decode the next parameter pair and advance the cursor.
    fn next_point(&mut self) -> Result<Point> {
        debug_assert!(self.count > 0);

        let x = self.next_param()?;
        let y = self.next_param()?;

        // "For any pair of (dX, dY) the dX and dY MUST NOT both be 0."
        if self.strict && self.command_id == CMD_LINE_TO && x == 0 && y == 0 {
            return Err(Error::Geometry(
                "found consecutive equal points (strict mode)".into(),
            ));
        }

        self.cursor.x = self.cursor.x.wrapping_add(x);
        self.cursor.y = self.cursor.y.wrapping_add(y);
        self.count -= 1;

        Ok(self.cursor)
    }

    fn next_param(&mut self) -> Result<i32> {
        if self.done() {
            return Err(Error::Geometry("too few points in geometry".into()));
        }
        let raw = self
            .pbf
            .read_u32()
            .map_err(|_| Error::Geometry("malformed parameter integer".into()))?;
        Ok(raw.zagzig())
    }
}

/// Decode a point geometry: a single MoveTo with a count of at least one,
/// and nothing after it.
pub fn decode_point_geometry<H: GeomHandler>(
    geometry: Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    if geometry.geom_type() != GeomType::Point {
        return Err(Error::Type(
            "geometry is not of type Point".into(),
        ));
    }
    let mut scanner = CommandScanner::new(geometry.data(), strict);

    if !scanner.next_command(CMD_MOVE_TO)? {
        return Err(Error::Geometry("expected MoveTo command".into()));
    }
    if scanner.count() == 0 {
        return Err(Error::Geometry("MoveTo command count is zero".into()));
    }

    handler.points_begin(scanner.count());
    while scanner.count() > 0 {
        handler.points_point(scanner.next_point()?);
    }

    if !scanner.done() {
        return Err(Error::Geometry(
            "additional data after end of geometry".into(),
        ));
    }

    handler.points_end();
    Ok(())
}

/// Decode a linestring geometry: one or more pairs of a MoveTo with count 1
/// and a LineTo with a count of at least one.
pub fn decode_linestring_geometry<H: GeomHandler>(
    geometry: Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    if geometry.geom_type() != GeomType::Linestring {
        return Err(Error::Type(
            "geometry is not of type Linestring".into(),
        ));
    }
    let mut scanner = CommandScanner::new(geometry.data(), strict);

    while scanner.next_command(CMD_MOVE_TO)? {
        if scanner.count() != 1 {
            return Err(Error::Geometry("MoveTo command count is not 1".into()));
        }
        let first_point = scanner.next_point()?;

        if !scanner.next_command(CMD_LINE_TO)? {
            return Err(Error::Geometry("expected LineTo command".into()));
        }
        if scanner.count() == 0 {
            return Err(Error::Geometry("LineTo command count is zero".into()));
        }

        handler.linestring_begin(scanner.count() + 1);
        handler.linestring_point(first_point);
        while scanner.count() > 0 {
            handler.linestring_point(scanner.next_point()?);
        }
        handler.linestring_end();
    }

    Ok(())
}

/// Decode a polygon geometry: one or more rings, each a MoveTo with count 1,
/// a LineTo and a ClosePath. The closing point is reported explicitly, and
/// `ring_end` carries the ring orientation computed from the shoelace sum.
pub fn decode_polygon_geometry<H: GeomHandler>(
    geometry: Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    if geometry.geom_type() != GeomType::Polygon {
        return Err(Error::Type(
            "geometry is not of type Polygon".into(),
        ));
    }
    let mut scanner = CommandScanner::new(geometry.data(), strict);

    while scanner.next_command(CMD_MOVE_TO)? {
        if scanner.count() != 1 {
            return Err(Error::Geometry("MoveTo command count is not 1".into()));
        }
        let start_point = scanner.next_point()?;
        let mut sum = 0i64;
        let mut last_point = start_point;

        if !scanner.next_command(CMD_LINE_TO)? {
            return Err(Error::Geometry("expected LineTo command".into()));
        }
        // a valid ring has at least four points including the closing one
        if strict && scanner.count() <= 1 {
            return Err(Error::Geometry(
                "LineTo command count is not greater than 1 (strict mode)".into(),
            ));
        }
        if scanner.count() == 0 {
            return Err(Error::Geometry("LineTo command count is zero".into()));
        }

        handler.ring_begin(scanner.count() + 2);
        handler.ring_point(start_point);

        while scanner.count() > 0 {
            let p = scanner.next_point()?;
            sum += det(last_point, p);
            last_point = p;
            handler.ring_point(p);
        }

        if !scanner.next_command(CMD_CLOSE_PATH)? {
            return Err(Error::Geometry("expected ClosePath command".into()));
        }

        sum += det(last_point, start_point);
        handler.ring_point(start_point);
        handler.ring_end(sum > 0);
    }

    Ok(())
}

/// Decode a geometry of any of the three known types, dispatching on the
/// type the feature declared.
pub fn decode_geometry<H: GeomHandler>(
    geometry: Geometry<'_>,
    strict: bool,
    handler: &mut H,
) -> Result<()> {
    match geometry.geom_type() {
        GeomType::Point => decode_point_geometry(geometry, strict, handler),
        GeomType::Linestring => decode_linestring_geometry(geometry, strict, handler),
        GeomType::Polygon => decode_polygon_geometry(geometry, strict, handler),
        GeomType::Unknown => Err(Error::Type(
            "cannot decode a geometry of unknown type".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbf::Writer;

    fn pack(words: &[u32]) -> Vec<u8> {
        let mut buf = Vec::new();
        Writer::new(&mut buf).packed_u32_field(4, words);
        // strip the field header and length so only the payload remains
        let mut reader = crate::pbf::Reader::new(&buf);
        reader.next().unwrap().unwrap();
        reader.read_bytes().unwrap().to_vec()
    }

    #[derive(Default)]
    struct Collector {
        points: Vec<Point>,
        begins: Vec<u32>,
        linestrings: Vec<Vec<Point>>,
        rings: Vec<(Vec<Point>, bool)>,
    }

    impl GeomHandler for Collector {
        fn points_begin(&mut self, count: u32) {
            self.begins.push(count);
        }
        fn points_point(&mut self, point: Point) {
            self.points.push(point);
        }
        fn linestring_begin(&mut self, count: u32) {
            self.begins.push(count);
            self.linestrings.push(Vec::new());
        }
        fn linestring_point(&mut self, point: Point) {
            self.linestrings.last_mut().unwrap().push(point);
        }
        fn ring_begin(&mut self, count: u32) {
            self.begins.push(count);
            self.rings.push((Vec::new(), false));
        }
        fn ring_point(&mut self, point: Point) {
            self.rings.last_mut().unwrap().0.push(point);
        }
        fn ring_end(&mut self, is_outer: bool) {
            self.rings.last_mut().unwrap().1 = is_outer;
        }
    }

    #[test]
    fn zigzag_values() {
        assert_eq!(0i32.zigzag(), 0);
        assert_eq!((-1i32).zigzag(), 1);
        assert_eq!(1i32.zigzag(), 2);
        assert_eq!((-2i32).zigzag(), 3);
        assert_eq!(4096i32.zigzag(), 8192);
        for v in [-4096, -100, -1, 0, 1, 100, 4096, i32::MIN, i32::MAX] {
            assert_eq!(v.zigzag().zagzig(), v);
        }
    }

    #[test]
    fn command_integer_packing() {
        // MoveTo with count 1 is the format's canonical `9`
        assert_eq!(command_integer(CMD_MOVE_TO, 1), 9);
        assert_eq!(command_integer(CMD_LINE_TO, 3), 26);
        assert_eq!(command_integer(CMD_CLOSE_PATH, 1), 15);
    }

    #[test]
    fn decode_single_point() {
        // MoveTo(1), (25, 17) -- the worked example from the format description
        let data = pack(&[9, 50, 34]);
        let mut out = Collector::default();
        decode_point_geometry(Geometry::new(GeomType::Point, &data), true, &mut out).unwrap();
        assert_eq!(out.begins, vec![1]);
        assert_eq!(out.points, vec![Point::new(25, 17)]);
    }

    #[test]
    fn decode_multipoint_accumulates_cursor() {
        // MoveTo(2), (5,7), (3,2)
        let data = pack(&[17, 10, 14, 3, 9]);
        let mut out = Collector::default();
        decode_point_geometry(Geometry::new(GeomType::Point, &data), true, &mut out).unwrap();
        assert_eq!(out.points, vec![Point::new(5, 7), Point::new(3, 2)]);
    }

    #[test]
    fn point_rejects_trailing_data() {
        let data = pack(&[9, 50, 34, 9, 2, 2]);
        let mut out = Collector::default();
        let err = decode_point_geometry(Geometry::new(GeomType::Point, &data), true, &mut out)
            .unwrap_err();
        assert!(matches!(err, Error::Geometry(_)));
    }

    #[test]
    fn point_rejects_wrong_command() {
        let data = pack(&[command_integer(CMD_LINE_TO, 1), 2, 2]);
        let mut out = Collector::default();
        assert!(matches!(
            decode_point_geometry(Geometry::new(GeomType::Point, &data), true, &mut out),
            Err(Error::Geometry(_))
        ));
    }

    #[test]
    fn point_rejects_truncated_params() {
        let data = pack(&[command_integer(CMD_MOVE_TO, 2), 2, 2]);
        let mut out = Collector::default();
        assert!(matches!(
            decode_point_geometry(Geometry::new(GeomType::Point, &data), true, &mut out),
            Err(Error::Geometry(_))
        ));
    }

    #[test]
    fn wrong_geometry_type_is_a_type_error() {
        let data = pack(&[9, 50, 34]);
        let mut out = Collector::default();
        assert!(matches!(
            decode_point_geometry(Geometry::new(GeomType::Linestring, &data), true, &mut out),
            Err(Error::Type(_))
        ));
    }

    #[test]
    fn decode_multilinestring() {
        // two linestrings, from the format description's worked example
        let data = pack(&[9, 4, 4, 18, 0, 16, 16, 0, 9, 17, 17, 10, 4, 8]);
        let mut out = Collector::default();
        decode_linestring_geometry(Geometry::new(GeomType::Linestring, &data), true, &mut out)
            .unwrap();
        assert_eq!(
            out.linestrings,
            vec![
                vec![Point::new(2, 2), Point::new(2, 10), Point::new(10, 10)],
                vec![Point::new(1, 1), Point::new(3, 5)],
            ]
        );
        assert_eq!(out.begins, vec![3, 2]);
    }

    #[test]
    fn linestring_requires_moveto_count_1() {
        let data = pack(&[command_integer(CMD_MOVE_TO, 2), 2, 2, 2, 2]);
        let mut out = Collector::default();
        assert!(matches!(
            decode_linestring_geometry(Geometry::new(GeomType::Linestring, &data), true, &mut out),
            Err(Error::Geometry(_))
        ));
    }

    #[test]
    fn strict_mode_rejects_zero_length_segment() {
        // MoveTo(1) (2,2), LineTo(2) (0,0) (1,1)
        let data = pack(&[9, 4, 4, 18, 0, 0, 2, 2]);

        let mut out = Collector::default();
        assert!(matches!(
            decode_linestring_geometry(
                Geometry::new(GeomType::Linestring, &data),
                true,
                &mut out
            ),
            Err(Error::Geometry(_))
        ));

        let mut out = Collector::default();
        decode_linestring_geometry(Geometry::new(GeomType::Linestring, &data), false, &mut out)
            .unwrap();
        assert_eq!(
            out.linestrings,
            vec![vec![Point::new(2, 2), Point::new(2, 2), Point::new(3, 3)]]
        );
    }

    #[test]
    fn decode_polygon_reports_orientation() {
        // clockwise square in y-down screen space: positive shoelace sum
        let data = pack(&[9, 0, 0, 26, 20, 0, 0, 20, 19, 0, 15]);
        let mut out = Collector::default();
        decode_polygon_geometry(Geometry::new(GeomType::Polygon, &data), true, &mut out).unwrap();
        assert_eq!(out.rings.len(), 1);
        let (ring, is_outer) = &out.rings[0];
        assert_eq!(
            *ring,
            vec![
                Point::new(0, 0),
                Point::new(10, 0),
                Point::new(10, 10),
                Point::new(0, 10),
                Point::new(0, 0),
            ]
        );
        assert!(is_outer);
        assert_eq!(out.begins, vec![5]);
    }

    #[test]
    fn degenerate_ring_is_not_outer() {
        // all points collinear: shoelace sum is zero
        let data = pack(&[
            9,
            0,
            0,
            command_integer(CMD_LINE_TO, 2),
            2,
            0,
            2,
            0,
            15,
        ]);
        let mut out = Collector::default();
        decode_polygon_geometry(Geometry::new(GeomType::Polygon, &data), true, &mut out).unwrap();
        assert!(!out.rings[0].1);
    }

    #[test]
    fn polygon_requires_close_path() {
        let data = pack(&[9, 0, 0, command_integer(CMD_LINE_TO, 2), 2, 0, 0, 2]);
        let mut out = Collector::default();
        assert!(matches!(
            decode_polygon_geometry(Geometry::new(GeomType::Polygon, &data), true, &mut out),
            Err(Error::Geometry(_))
        ));
    }

    #[test]
    fn close_path_count_must_be_1_even_in_lax_mode() {
        let data = pack(&[
            9,
            0,
            0,
            command_integer(CMD_LINE_TO, 2),
            2,
            0,
            0,
            2,
            command_integer(CMD_CLOSE_PATH, 2),
        ]);
        let mut out = Collector::default();
        assert!(matches!(
            decode_polygon_geometry(Geometry::new(GeomType::Polygon, &data), false, &mut out),
            Err(Error::Geometry(_))
        ));
    }

    #[test]
    fn strict_mode_rejects_two_point_ring() {
        // LineTo count of 1 gives only three ring points including closing
        let data = pack(&[9, 0, 0, command_integer(CMD_LINE_TO, 1), 2, 0, 15]);

        let mut out = Collector::default();
        assert!(matches!(
            decode_polygon_geometry(Geometry::new(GeomType::Polygon, &data), true, &mut out),
            Err(Error::Geometry(_))
        ));

        let mut out = Collector::default();
        decode_polygon_geometry(Geometry::new(GeomType::Polygon, &data), false, &mut out)
            .unwrap();
        assert_eq!(out.rings[0].0.len(), 3);
    }

    #[test]
    fn dispatch_by_type() {
        let data = pack(&[9, 50, 34]);
        let mut out = Collector::default();
        decode_geometry(Geometry::new(GeomType::Point, &data), true, &mut out).unwrap();
        assert_eq!(out.points.len(), 1);

        assert!(matches!(
            decode_geometry(Geometry::new(GeomType::Unknown, &data), true, &mut out),
            Err(Error::Type(_))
        ));
    }
}
