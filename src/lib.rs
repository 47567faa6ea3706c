//! Zero-copy decoding and incremental encoding of Mapbox vector tiles
//! (format versions 1 and 2).
//!
//! Readers ([`Tile`], [`Layer`], [`Feature`]) borrow the tile buffer and
//! parse on access; geometry decoding reports through a [`GeomHandler`].
//! Builders emit the wire format through a tile → layer → feature
//! hierarchy with optional key/value deduplication.

mod builder;
mod error;
mod feature;
mod geometry;
mod index;
mod layer;
mod pbf;
mod tile;
mod value;


pub use builder::{
    LayerBuilder, LinestringFeatureBuilder, PointFeatureBuilder, PolygonFeatureBuilder,
    TileBuilder,
};
pub use error::{Error, Result};
pub use feature::{Feature, Properties};
pub use geometry::{
    decode_geometry, decode_linestring_geometry, decode_point_geometry,
    decode_polygon_geometry, GeomHandler, GeomType, Geometry, Point,
};
pub use index::{
    HashedKeyIndex, HashedValueIndex, KeyIndex, LinearKeyIndex, LinearValueIndex, ValueIndex,
};
pub use layer::Layer;
pub use tile::Tile;
pub use value::{PropertyValue, ValueType, ValueView};
