//! Layer reader with lazily materialized key/value dictionaries.

use std::sync::OnceLock;

use crate::error::{Error, Result};
use crate::feature::Feature;
use crate::pbf::{self, Reader, WireType};
use crate::value::ValueView;

/// A single layer of a vector tile.
///
/// Parsing the header fields (version, name, extent) and counting the
/// contained records happens at construction; features are decoded on
/// iteration and the key/value dictionaries on first dictionary access.
///
/// ```text
/// let mut tile = Tile::new(&data);
/// while let Some(mut layer) = tile.next_layer()? {
///     while let Some(feature) = layer.next_feature()? {
///         ...
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Layer<'a> {
    data: &'a [u8],
    name: &'a str,
    version: u32,
    extent: u32,
    num_features: usize,
    num_keys: usize,
    num_values: usize,
    features_cursor: Reader<'a>,
    tables: OnceLock<(Vec<&'a [u8]>, Vec<ValueView<'a>>)>,
}

impl<'a> Layer<'a> {
    /// Parse the header of an encoded layer record.
    ///
    /// Fails with [`Error::Version`] for layer versions other than 1 and 2
    /// and with [`Error::Format`] for unknown fields or a missing name.
    pub fn new(data: &'a [u8]) -> Result<Self> {
        let mut version = 1;
        let mut extent = 4096;
        let mut name = None;
        let mut num_features = 0;
        let mut num_keys = 0;
        let mut num_values = 0;

        let mut reader = Reader::new(data);
        while let Some((field, wire_type)) = reader.next()? {
            match (field, wire_type) {
                (pbf::layer::VERSION, WireType::Varint) => version = reader.read_u32()?,
                (pbf::layer::NAME, WireType::LengthDelimited) => {
                    name = Some(reader.read_string()?)
                }
                (pbf::layer::FEATURES, WireType::LengthDelimited) => {
                    reader.read_bytes()?;
                    num_features += 1;
                }
                (pbf::layer::KEYS, WireType::LengthDelimited) => {
                    reader.read_bytes()?;
                    num_keys += 1;
                }
                (pbf::layer::VALUES, WireType::LengthDelimited) => {
                    reader.read_bytes()?;
                    num_values += 1;
                }
                (pbf::layer::EXTENT, WireType::Varint) => extent = reader.read_u32()?,
                _ => {
                    return Err(Error::Format(
                        format!("unknown field in layer (tag={field}, type={wire_type:?})")
                            .into(),
                    ))
                }
            }
        }

        if !(1..=2).contains(&version) {
            return Err(Error::Version(version));
        }
        let name = match name {
            Some(name) if !name.is_empty() => name,
            Some(_) => return Err(Error::Format("empty name field in layer".into())),
            None => return Err(Error::Format("missing name field in layer".into())),
        };
        if extent == 0 {
            return Err(Error::Format("zero extent in layer".into()));
        }

        Ok(Self {
            data,
            name,
            version,
            extent,
            num_features,
            num_keys,
            num_values,
            features_cursor: Reader::new(data),
            tables: OnceLock::new(),
        })
    }

    /// The raw record this layer was created from.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn extent(&self) -> u32 {
        self.extent
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn empty(&self) -> bool {
        self.num_features == 0
    }

    /// Get the next feature in this layer, or `None` after the last one.
    pub fn next_feature(&mut self) -> Result<Option<Feature<'_, 'a>>> {
        while let Some((field, wire_type)) = self.features_cursor.next()? {
            match (field, wire_type) {
                (pbf::layer::FEATURES, WireType::LengthDelimited) => {
                    let data = self.features_cursor.read_bytes()?;
                    return Feature::new(&*self, data).map(Some);
                }
                _ => self.features_cursor.skip(field, wire_type)?,
            }
        }
        Ok(None)
    }

    /// Restore the feature iteration to the first feature.
    pub fn reset(&mut self) {
        self.features_cursor = Reader::new(self.data);
    }

    /// Get the feature with the given id, scanning linearly. If several
    /// features carry the same id it is unspecified which one is returned.
    pub fn feature_by_id(&self, id: u64) -> Result<Option<Feature<'_, 'a>>> {
        let mut reader = Reader::new(self.data);
        while let Some((field, wire_type)) = reader.next()? {
            match (field, wire_type) {
                (pbf::layer::FEATURES, WireType::LengthDelimited) => {
                    let data = reader.read_bytes()?;
                    if scan_feature_id(data)? == Some(id) {
                        return Feature::new(self, data).map(Some);
                    }
                }
                _ => reader.skip(field, wire_type)?,
            }
        }
        Ok(None)
    }

    /// The key dictionary, in appearance order.
    pub fn key_table(&self) -> &[&'a [u8]] {
        &self.tables().0
    }

    /// The value dictionary, in appearance order.
    pub fn value_table(&self) -> &[ValueView<'a>] {
        &self.tables().1
    }

    /// Look up a property key by index.
    pub fn key(&self, index: u32) -> Result<&'a [u8]> {
        self.tables()
            .0
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfRange(index))
    }

    /// Look up a property value by index.
    pub fn value(&self, index: u32) -> Result<ValueView<'a>> {
        self.tables()
            .1
            .get(index as usize)
            .copied()
            .ok_or(Error::OutOfRange(index))
    }

    /// Collect the dictionaries, at most once per layer. The construction
    /// scan has already validated the framing, so the second pass only
    /// gathers the views it saw there.
    fn tables(&self) -> &(Vec<&'a [u8]>, Vec<ValueView<'a>>) {
        self.tables.get_or_init(|| {
            let mut keys = Vec::with_capacity(self.num_keys);
            let mut values = Vec::with_capacity(self.num_values);
            let mut reader = Reader::new(self.data);
            while let Ok(Some((field, wire_type))) = reader.next() {
                let ok = match (field, wire_type) {
                    (pbf::layer::KEYS, WireType::LengthDelimited) => {
                        reader.read_bytes().map(|k| keys.push(k)).is_ok()
                    }
                    (pbf::layer::VALUES, WireType::LengthDelimited) => reader
                        .read_bytes()
                        .map(|v| values.push(ValueView::new(v)))
                        .is_ok(),
                    _ => reader.skip(field, wire_type).is_ok(),
                };
                if !ok {
                    break;
                }
            }
            (keys, values)
        })
    }
}

/// Scan a feature record for its id field without decoding the rest.
fn scan_feature_id(data: &[u8]) -> Result<Option<u64>> {
    let mut reader = Reader::new(data);
    while let Some((field, wire_type)) = reader.next()? {
        match (field, wire_type) {
            (pbf::feature::ID, WireType::Varint) => return Ok(Some(reader.read_varint()?)),
            _ => reader.skip(field, wire_type)?,
        }
    }
    Ok(None)
}
