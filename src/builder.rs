//! Incremental construction of vector tiles.
//!
//! Building is hierarchical: a [`TileBuilder`] owns the output, a
//! [`LayerBuilder`] accumulates one layer into it, and the three feature
//! builder flavors append features to a layer. A feature builder must
//! either `commit()` or be dropped; dropping it rolls its in-progress bytes
//! back out of the layer buffer.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::geometry::{
    command_integer, GeomType, Point, ZigZag, CMD_CLOSE_PATH, CMD_LINE_TO, CMD_MOVE_TO,
};
use crate::layer::Layer;
use crate::pbf::{self, Writer};
use crate::value::{encode_value, PropertyValue};

/// Builds a tile by concatenating serialized layers.
#[derive(Default)]
pub struct TileBuilder {
    buf: Vec<u8>,
}

impl TileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a decoded layer into this tile unchanged.
    pub fn add_existing_layer(&mut self, layer: &Layer<'_>) {
        Writer::new(&mut self.buf).bytes_field(pbf::tile::LAYERS, layer.data());
    }

    /// Consume the builder and return the encoded tile.
    pub fn serialize(self) -> Vec<u8> {
        self.buf
    }
}

/// Builds one layer of a tile.
///
/// The header fields are written at construction; the key and value
/// dictionaries grow as features intern properties. The finished layer is
/// appended to the owning tile builder on [`finish`](Self::finish) or drop,
/// whichever comes first.
pub struct LayerBuilder<'t> {
    tile: &'t mut TileBuilder,
    buf: Vec<u8>,
    keys_buf: Vec<u8>,
    values_buf: Vec<u8>,
    num_keys: u32,
    num_values: u32,
    key_dedup: HashMap<Vec<u8>, u32>,
    value_dedup: HashMap<Vec<u8>, u32>,
    finished: bool,
}

impl<'t> LayerBuilder<'t> {
    /// Start a layer with version 2 and the default extent of 4096.
    pub fn new(tile: &'t mut TileBuilder, name: &str) -> Self {
        Self::with_options(tile, name, 2, 4096)
    }

    pub fn with_options(
        tile: &'t mut TileBuilder,
        name: &str,
        version: u32,
        extent: u32,
    ) -> Self {
        let mut buf = Vec::new();
        let mut writer = Writer::new(&mut buf);
        writer.varint_field(pbf::layer::VERSION, u64::from(version));
        writer.bytes_field(pbf::layer::NAME, name.as_bytes());
        writer.varint_field(pbf::layer::EXTENT, u64::from(extent));
        Self {
            tile,
            buf,
            keys_buf: Vec::new(),
            values_buf: Vec::new(),
            num_keys: 0,
            num_values: 0,
            key_dedup: HashMap::new(),
            value_dedup: HashMap::new(),
            finished: false,
        }
    }

    /// Add a key to the dictionary, reusing the index of an equal key added
    /// earlier.
    pub fn add_key(&mut self, key: &[u8]) -> u32 {
        if let Some(&index) = self.key_dedup.get(key) {
            return index;
        }
        let index = self.add_key_without_dup_check(key);
        self.key_dedup.insert(key.to_vec(), index);
        index
    }

    /// Append a key to the dictionary unconditionally. Used by external
    /// indexes which track duplicates themselves.
    pub fn add_key_without_dup_check(&mut self, key: &[u8]) -> u32 {
        Writer::new(&mut self.keys_buf).bytes_field(pbf::layer::KEYS, key);
        let index = self.num_keys;
        self.num_keys += 1;
        index
    }

    /// Add a value to the dictionary, reusing the index of an equal value
    /// added earlier. Equality is on the encoded record, so float values
    /// dedup by bit pattern.
    pub fn add_value(&mut self, value: &PropertyValue<'_>) -> u32 {
        let mut encoded = Vec::new();
        encode_value(&mut encoded, value);
        if let Some(&index) = self.value_dedup.get(&encoded) {
            return index;
        }
        let index = self.add_encoded_value(&encoded);
        self.value_dedup.insert(encoded, index);
        index
    }

    /// Append a value to the dictionary unconditionally.
    pub fn add_value_without_dup_check(&mut self, value: &PropertyValue<'_>) -> u32 {
        let mut encoded = Vec::new();
        encode_value(&mut encoded, value);
        self.add_encoded_value(&encoded)
    }

    pub(crate) fn add_encoded_value(&mut self, encoded: &[u8]) -> u32 {
        Writer::new(&mut self.values_buf).bytes_field(pbf::layer::VALUES, encoded);
        let index = self.num_values;
        self.num_values += 1;
        index
    }

    /// The current size of the key dictionary.
    pub fn num_keys(&self) -> u32 {
        self.num_keys
    }

    /// The current size of the value dictionary.
    pub fn num_values(&self) -> u32 {
        self.num_values
    }

    /// Serialize the layer into the owning tile builder. Dropping the
    /// builder has the same effect.
    pub fn finish(mut self) {
        self.flush();
    }

    fn flush(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        let total = self.buf.len() + self.keys_buf.len() + self.values_buf.len();
        let mut header = pbf::length_delimited_header(pbf::tile::LAYERS, total);
        self.tile.buf.reserve(header.len() + total);
        self.tile.buf.append(&mut header);
        self.tile.buf.extend_from_slice(&self.buf);
        self.tile.buf.extend_from_slice(&self.keys_buf);
        self.tile.buf.extend_from_slice(&self.values_buf);
    }
}

impl Drop for LayerBuilder<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Init,
    HasId,
    Geometry,
    Properties,
}

/// State shared by the three feature builder flavors.
struct FeatureCore<'a, 't> {
    layer: &'a mut LayerBuilder<'t>,
    rollback_len: usize,
    stage: Stage,
    geom_type: GeomType,
    commands: Vec<u32>,
    tags: Vec<u32>,
    cursor: Point,
    points_left: u32,
    declared: u32,
    start_of_part: bool,
    ring_start: Point,
    committed: bool,
}

impl<'a, 't> FeatureCore<'a, 't> {
    fn new(layer: &'a mut LayerBuilder<'t>, geom_type: GeomType) -> Self {
        let rollback_len = layer.buf.len();
        Self {
            layer,
            rollback_len,
            stage: Stage::Init,
            geom_type,
            commands: Vec::new(),
            tags: Vec::new(),
            cursor: Point::default(),
            points_left: 0,
            declared: 0,
            start_of_part: false,
            ring_start: Point::default(),
            committed: false,
        }
    }

    fn set_id(&mut self, id: u64) -> Result<()> {
        if self.stage != Stage::Init {
            return Err(Error::Assert("set_id must come before the geometry"));
        }
        Writer::new(&mut self.layer.buf).varint_field(pbf::feature::ID, id);
        self.stage = Stage::HasId;
        Ok(())
    }

    fn begin_points(&mut self, count: u32) -> Result<()> {
        if self.stage > Stage::HasId {
            return Err(Error::Assert("add_points may only be called once"));
        }
        if count == 0 {
            return Err(Error::Assert("add_points needs at least one point"));
        }
        self.commands.push(command_integer(CMD_MOVE_TO, count));
        self.points_left = count;
        self.declared = count;
        self.stage = Stage::Geometry;
        Ok(())
    }

    fn begin_linestring(&mut self, count: u32) -> Result<()> {
        if self.stage > Stage::Geometry {
            return Err(Error::Assert("geometry must come before the properties"));
        }
        if self.points_left != 0 {
            return Err(Error::Assert("previous linestring is missing points"));
        }
        if count < 2 {
            return Err(Error::Assert("a linestring needs at least two points"));
        }
        self.commands.push(command_integer(CMD_MOVE_TO, 1));
        self.points_left = count;
        self.declared = count;
        self.start_of_part = true;
        self.stage = Stage::Geometry;
        Ok(())
    }

    fn begin_ring(&mut self, count: u32) -> Result<()> {
        if self.stage > Stage::Geometry {
            return Err(Error::Assert("geometry must come before the properties"));
        }
        if self.points_left != 0 {
            return Err(Error::Assert("previous ring is missing points"));
        }
        if count < 4 {
            return Err(Error::Assert(
                "a ring needs at least four points including the closing one",
            ));
        }
        self.commands.push(command_integer(CMD_MOVE_TO, 1));
        self.points_left = count;
        self.declared = count;
        self.start_of_part = true;
        self.stage = Stage::Geometry;
        Ok(())
    }

    fn set_point(&mut self, p: Point) -> Result<()> {
        if self.stage != Stage::Geometry {
            return Err(Error::Assert(
                "set_point without a preceding geometry declaration",
            ));
        }
        if self.points_left == 0 {
            return Err(Error::Assert("too many calls to set_point"));
        }
        match self.geom_type {
            GeomType::Point => {
                self.push_delta(p);
                self.points_left -= 1;
            }
            GeomType::Linestring => {
                self.push_delta(p);
                if self.start_of_part {
                    // the MoveTo point is written; open the LineTo run
                    self.commands
                        .push(command_integer(CMD_LINE_TO, self.declared - 1));
                    self.start_of_part = false;
                }
                self.points_left -= 1;
            }
            GeomType::Polygon => {
                if self.start_of_part {
                    self.ring_start = p;
                    self.push_delta(p);
                    self.commands
                        .push(command_integer(CMD_LINE_TO, self.declared - 2));
                    self.start_of_part = false;
                    self.points_left -= 1;
                } else if self.points_left == 1 {
                    // the closing point carries no parameters of its own
                    if p != self.ring_start {
                        return Err(Error::Assert(
                            "the closing point of a ring must equal its first point",
                        ));
                    }
                    self.commands.push(command_integer(CMD_CLOSE_PATH, 1));
                    self.points_left = 0;
                } else {
                    self.push_delta(p);
                    self.points_left -= 1;
                }
            }
            GeomType::Unknown => {
                return Err(Error::Assert("feature builder without a geometry type"))
            }
        }
        Ok(())
    }

    fn close_ring(&mut self) -> Result<()> {
        if self.stage != Stage::Geometry || self.start_of_part || self.points_left != 1 {
            return Err(Error::Assert(
                "close_ring is only valid in place of a ring's closing point",
            ));
        }
        self.commands.push(command_integer(CMD_CLOSE_PATH, 1));
        self.points_left = 0;
        Ok(())
    }

    fn push_delta(&mut self, p: Point) {
        self.commands.push(p.x.wrapping_sub(self.cursor.x).zigzag());
        self.commands.push(p.y.wrapping_sub(self.cursor.y).zigzag());
        self.cursor = p;
    }

    fn require_properties_stage(&mut self) -> Result<()> {
        if self.stage < Stage::Geometry {
            return Err(Error::Assert("add_property before the geometry"));
        }
        if self.points_left != 0 {
            return Err(Error::Assert("geometry is missing points"));
        }
        self.stage = Stage::Properties;
        Ok(())
    }

    fn add_property(&mut self, key: &[u8], value: &PropertyValue<'_>) -> Result<()> {
        self.require_properties_stage()?;
        let key_index = self.layer.add_key(key);
        let value_index = self.layer.add_value(value);
        self.tags.push(key_index);
        self.tags.push(value_index);
        Ok(())
    }

    fn add_property_ids(&mut self, key_index: u32, value_index: u32) -> Result<()> {
        self.require_properties_stage()?;
        self.tags.push(key_index);
        self.tags.push(value_index);
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        if self.stage < Stage::Geometry {
            return Err(Error::Assert("cannot commit a feature without geometry"));
        }
        if self.points_left != 0 {
            return Err(Error::Assert("geometry is missing points"));
        }

        {
            let mut writer = Writer::new(&mut self.layer.buf);
            if !self.tags.is_empty() {
                writer.packed_u32_field(pbf::feature::TAGS, &self.tags);
            }
            writer.varint_field(pbf::feature::TYPE, self.geom_type.to_wire());
            writer.packed_u32_field(pbf::feature::GEOMETRY, &self.commands);
        }

        let body_len = self.layer.buf.len() - self.rollback_len;
        let header = pbf::length_delimited_header(pbf::layer::FEATURES, body_len);
        self.layer
            .buf
            .splice(self.rollback_len..self.rollback_len, header);
        self.committed = true;
        Ok(())
    }
}

impl Drop for FeatureCore<'_, '_> {
    fn drop(&mut self) {
        if !self.committed {
            self.layer.buf.truncate(self.rollback_len);
        }
    }
}

/// Builds a feature of type Point.
pub struct PointFeatureBuilder<'a, 't> {
    core: FeatureCore<'a, 't>,
}

impl<'a, 't> PointFeatureBuilder<'a, 't> {
    pub fn new(layer: &'a mut LayerBuilder<'t>) -> Self {
        Self {
            core: FeatureCore::new(layer, GeomType::Point),
        }
    }

    /// Set the feature id. Only valid before the geometry.
    pub fn set_id(&mut self, id: u64) -> Result<()> {
        self.core.set_id(id)
    }

    /// Declare the number of points in this (multi)point geometry.
    pub fn add_points(&mut self, count: u32) -> Result<()> {
        self.core.begin_points(count)
    }

    pub fn set_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.core.set_point(Point::new(x, y))
    }

    /// Shorthand for a single-point geometry.
    pub fn add_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.add_points(1)?;
        self.set_point(x, y)
    }

    pub fn add_points_from(&mut self, points: &[Point]) -> Result<()> {
        self.add_points(points.len() as u32)?;
        for p in points {
            self.core.set_point(*p)?;
        }
        Ok(())
    }

    pub fn add_property(&mut self, key: &[u8], value: &PropertyValue<'_>) -> Result<()> {
        self.core.add_property(key, value)
    }

    pub fn add_property_ids(&mut self, key_index: u32, value_index: u32) -> Result<()> {
        self.core.add_property_ids(key_index, value_index)
    }

    /// Finalize the feature and append it to the layer.
    pub fn commit(mut self) -> Result<()> {
        self.core.commit()
    }
}

/// Builds a feature of type Linestring.
pub struct LinestringFeatureBuilder<'a, 't> {
    core: FeatureCore<'a, 't>,
}

impl<'a, 't> LinestringFeatureBuilder<'a, 't> {
    pub fn new(layer: &'a mut LayerBuilder<'t>) -> Self {
        Self {
            core: FeatureCore::new(layer, GeomType::Linestring),
        }
    }

    pub fn set_id(&mut self, id: u64) -> Result<()> {
        self.core.set_id(id)
    }

    /// Declare the point count of the next linestring. May be repeated for
    /// multilinestrings once the previous linestring is complete.
    pub fn add_linestring(&mut self, count: u32) -> Result<()> {
        self.core.begin_linestring(count)
    }

    pub fn set_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.core.set_point(Point::new(x, y))
    }

    pub fn add_linestring_from(&mut self, points: &[Point]) -> Result<()> {
        self.add_linestring(points.len() as u32)?;
        for p in points {
            self.core.set_point(*p)?;
        }
        Ok(())
    }

    pub fn add_property(&mut self, key: &[u8], value: &PropertyValue<'_>) -> Result<()> {
        self.core.add_property(key, value)
    }

    pub fn add_property_ids(&mut self, key_index: u32, value_index: u32) -> Result<()> {
        self.core.add_property_ids(key_index, value_index)
    }

    pub fn commit(mut self) -> Result<()> {
        self.core.commit()
    }
}

/// Builds a feature of type Polygon.
///
/// A ring of `n` points may be finished either with a final `set_point`
/// equal to its first point or with [`close_ring`](Self::close_ring) in
/// place of that point; both emit the same ClosePath command. Ring
/// orientation is the caller's responsibility.
pub struct PolygonFeatureBuilder<'a, 't> {
    core: FeatureCore<'a, 't>,
}

impl<'a, 't> PolygonFeatureBuilder<'a, 't> {
    pub fn new(layer: &'a mut LayerBuilder<'t>) -> Self {
        Self {
            core: FeatureCore::new(layer, GeomType::Polygon),
        }
    }

    pub fn set_id(&mut self, id: u64) -> Result<()> {
        self.core.set_id(id)
    }

    /// Declare the point count (including the closing point) of the next
    /// ring. May be repeated for multipolygons once the previous ring is
    /// closed.
    pub fn add_ring(&mut self, count: u32) -> Result<()> {
        self.core.begin_ring(count)
    }

    pub fn set_point(&mut self, x: i32, y: i32) -> Result<()> {
        self.core.set_point(Point::new(x, y))
    }

    /// Close the current ring in place of its final point.
    pub fn close_ring(&mut self) -> Result<()> {
        self.core.close_ring()
    }

    /// Add a complete ring from a slice whose last point equals its first.
    pub fn add_ring_from(&mut self, points: &[Point]) -> Result<()> {
        self.add_ring(points.len() as u32)?;
        for p in points {
            self.core.set_point(*p)?;
        }
        Ok(())
    }

    pub fn add_property(&mut self, key: &[u8], value: &PropertyValue<'_>) -> Result<()> {
        self.core.add_property(key, value)
    }

    pub fn add_property_ids(&mut self, key_index: u32, value_index: u32) -> Result<()> {
        self.core.add_property_ids(key_index, value_index)
    }

    pub fn commit(mut self) -> Result<()> {
        self.core.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn add_ring_with_too_few_points_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PolygonFeatureBuilder::new(&mut layer);
        assert!(matches!(feature.add_ring(3), Err(Error::Assert(_))));
    }

    #[test]
    fn add_linestring_needs_two_points() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = LinestringFeatureBuilder::new(&mut layer);
        assert!(matches!(feature.add_linestring(1), Err(Error::Assert(_))));
    }

    #[test]
    fn add_points_zero_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PointFeatureBuilder::new(&mut layer);
        assert!(matches!(feature.add_points(0), Err(Error::Assert(_))));
    }

    #[test]
    fn set_id_after_geometry_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PointFeatureBuilder::new(&mut layer);
        feature.add_point(1, 2).unwrap();
        assert!(matches!(feature.set_id(1), Err(Error::Assert(_))));
    }

    #[test]
    fn set_point_without_declaration_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PolygonFeatureBuilder::new(&mut layer);
        assert!(matches!(feature.set_point(1, 1), Err(Error::Assert(_))));
        assert!(matches!(feature.close_ring(), Err(Error::Assert(_))));
    }

    #[test]
    fn too_many_points_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PolygonFeatureBuilder::new(&mut layer);
        feature.add_ring(4).unwrap();
        feature.set_point(10, 20).unwrap();
        feature.set_point(20, 20).unwrap();
        feature.set_point(30, 20).unwrap();
        feature.set_point(10, 20).unwrap();
        assert!(matches!(feature.set_point(50, 20), Err(Error::Assert(_))));
        assert!(matches!(feature.close_ring(), Err(Error::Assert(_))));
    }

    #[test]
    fn ring_must_close_on_its_first_point() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PolygonFeatureBuilder::new(&mut layer);
        feature.add_ring(4).unwrap();
        feature.set_point(0, 0).unwrap();
        feature.set_point(4, 0).unwrap();
        feature.set_point(4, 4).unwrap();
        assert!(matches!(feature.set_point(9, 9), Err(Error::Assert(_))));
    }

    #[test]
    fn add_ring_while_incomplete_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PolygonFeatureBuilder::new(&mut layer);
        feature.add_ring(4).unwrap();
        assert!(matches!(feature.add_ring(4), Err(Error::Assert(_))));
    }

    #[test]
    fn add_points_twice_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PointFeatureBuilder::new(&mut layer);
        feature.add_point(1, 1).unwrap();
        assert!(matches!(feature.add_points(1), Err(Error::Assert(_))));
    }

    #[test]
    fn commit_without_geometry_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let feature = PointFeatureBuilder::new(&mut layer);
        assert!(matches!(feature.commit(), Err(Error::Assert(_))));
    }

    #[test]
    fn commit_with_missing_points_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = LinestringFeatureBuilder::new(&mut layer);
        feature.add_linestring(3).unwrap();
        feature.set_point(1, 1).unwrap();
        assert!(matches!(feature.commit(), Err(Error::Assert(_))));
    }

    #[test]
    fn property_before_geometry_is_an_assert() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let mut feature = PointFeatureBuilder::new(&mut layer);
        assert!(matches!(
            feature.add_property(b"foo", &PropertyValue::Bool(true)),
            Err(Error::Assert(_))
        ));
    }

    #[test]
    fn layer_dedups_keys_and_values() {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        let k0 = layer.add_key(b"kind");
        let k1 = layer.add_key(b"name");
        assert_eq!(layer.add_key(b"kind"), k0);
        assert_eq!((k0, k1), (0, 1));

        let v0 = layer.add_value(&PropertyValue::Float(1.5));
        let v1 = layer.add_value(&PropertyValue::Double(1.5));
        assert_eq!(layer.add_value(&PropertyValue::Float(1.5)), v0);
        assert_ne!(v0, v1);
        assert_eq!(layer.num_values(), 2);
    }
}
