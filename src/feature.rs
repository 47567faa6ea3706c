//! Feature reader and property iteration.

use crate::error::{Error, Result};
use crate::geometry::{GeomType, Geometry};
use crate::layer::Layer;
use crate::pbf::{self, Reader, WireType};
use crate::value::ValueView;

/// One feature of a layer.
///
/// Construction scans the record once and stores views; the geometry
/// command stream and the property tags are decoded on access only.
pub struct Feature<'l, 'a> {
    layer: &'l Layer<'a>,
    id: Option<u64>,
    geom_type: GeomType,
    tags: &'a [u8],
    geometry: &'a [u8],
}

impl<'l, 'a> Feature<'l, 'a> {
    pub(crate) fn new(layer: &'l Layer<'a>, data: &'a [u8]) -> Result<Self> {
        let mut id = None;
        let mut geom_type = GeomType::Unknown;
        let mut tags: &[u8] = &[];
        let mut geometry: &[u8] = &[];

        let mut reader = Reader::new(data);
        while let Some((field, wire_type)) = reader.next()? {
            match (field, wire_type) {
                (pbf::feature::ID, WireType::Varint) => id = Some(reader.read_varint()?),
                (pbf::feature::TAGS, WireType::LengthDelimited) => tags = reader.read_bytes()?,
                (pbf::feature::TYPE, WireType::Varint) => {
                    geom_type = GeomType::from_wire(reader.read_varint()?)?
                }
                (pbf::feature::GEOMETRY, WireType::LengthDelimited) => {
                    geometry = reader.read_bytes()?
                }
                _ => {
                    log::trace!("skipping unknown field {field} in feature");
                    reader.skip(field, wire_type)?;
                }
            }
        }

        if geometry.is_empty() {
            return Err(Error::Format("missing geometry field in feature".into()));
        }

        Ok(Self {
            layer,
            id,
            geom_type,
            tags,
            geometry,
        })
    }

    /// The feature id, or 0 when the record carries none.
    pub fn id(&self) -> u64 {
        self.id.unwrap_or(0)
    }

    pub fn has_id(&self) -> bool {
        self.id.is_some()
    }

    pub fn geom_type(&self) -> GeomType {
        self.geom_type
    }

    /// The undecoded geometry: declared type plus raw command stream.
    pub fn geometry(&self) -> Geometry<'a> {
        Geometry::new(self.geom_type, self.geometry)
    }

    /// The number of key/value pairs in the tags list. Linear in the size
    /// of the (varint-encoded) list.
    pub fn num_properties(&self) -> Result<usize> {
        let mut reader = Reader::new(self.tags);
        let mut entries = 0usize;
        while !reader.at_end() {
            reader.read_varint()?;
            entries += 1;
        }
        Ok(entries / 2)
    }

    /// Iterate the feature's properties, resolving key and value indexes
    /// through the layer's dictionaries.
    pub fn properties(&self) -> Properties<'l, 'a> {
        Properties {
            layer: self.layer,
            tags: Reader::new(self.tags),
        }
    }
}

/// Iterator over the resolved properties of one feature.
///
/// Yields `(key, value)` pairs; the key is the raw (UTF-8) key bytes from
/// the layer's dictionary. Errors end the iteration.
pub struct Properties<'l, 'a> {
    layer: &'l Layer<'a>,
    tags: Reader<'a>,
}

impl<'l, 'a> Properties<'l, 'a> {
    fn next_pair(&mut self) -> Result<(&'a [u8], ValueView<'a>)> {
        let key_index = self.tags.read_u32()?;
        if self.tags.at_end() {
            return Err(Error::Format(
                "odd number of entries in feature tags".into(),
            ));
        }
        let value_index = self.tags.read_u32()?;
        Ok((self.layer.key(key_index)?, self.layer.value(value_index)?))
    }
}

impl<'l, 'a> Iterator for Properties<'l, 'a> {
    type Item = Result<(&'a [u8], ValueView<'a>)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.tags.at_end() {
            return None;
        }
        let pair = self.next_pair();
        if pair.is_err() {
            // poison the cursor so iteration stops after an error
            self.tags = Reader::new(&[]);
        }
        Some(pair)
    }
}
