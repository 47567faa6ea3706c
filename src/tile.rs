//! Tile reader: iteration over the layers of an encoded tile.

use crate::error::Result;
use crate::layer::Layer;
use crate::pbf::{self, Reader, WireType};

/// A vector tile over a borrowed byte buffer.
///
/// The buffer must stay alive for as long as the tile and any layer or
/// feature read from it; nothing is copied out of it.
pub struct Tile<'a> {
    data: &'a [u8],
    cursor: Reader<'a>,
}

impl<'a> Tile<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            cursor: Reader::new(data),
        }
    }

    /// Get the next layer, or `None` after the last one.
    pub fn next_layer(&mut self) -> Result<Option<Layer<'a>>> {
        while let Some((field, wire_type)) = self.cursor.next()? {
            match (field, wire_type) {
                (pbf::tile::LAYERS, WireType::LengthDelimited) => {
                    return Layer::new(self.cursor.read_bytes()?).map(Some);
                }
                _ => {
                    log::trace!("skipping unknown field {field} in tile");
                    self.cursor.skip(field, wire_type)?;
                }
            }
        }
        Ok(None)
    }

    /// Restore the layer iteration to the first layer.
    pub fn reset(&mut self) {
        self.cursor = Reader::new(self.data);
    }

    /// Get the layer with the given name, scanning from the start. The
    /// iteration cursor is not touched.
    pub fn layer_by_name(&self, name: &str) -> Result<Option<Layer<'a>>> {
        let mut reader = Reader::new(self.data);
        while let Some((field, wire_type)) = reader.next()? {
            match (field, wire_type) {
                (pbf::tile::LAYERS, WireType::LengthDelimited) => {
                    let data = reader.read_bytes()?;
                    if scan_layer_name(data)? == Some(name.as_bytes()) {
                        return Layer::new(data).map(Some);
                    }
                }
                _ => reader.skip(field, wire_type)?,
            }
        }
        Ok(None)
    }
}

/// Scan a layer record for its name field without parsing the layer.
fn scan_layer_name(data: &[u8]) -> Result<Option<&[u8]>> {
    let mut reader = Reader::new(data);
    while let Some((field, wire_type)) = reader.next()? {
        match (field, wire_type) {
            (pbf::layer::NAME, WireType::LengthDelimited) => {
                return Ok(Some(reader.read_bytes()?))
            }
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(None)
}
