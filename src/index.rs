//! Deduplication indexes for builders.
//!
//! A layer stores every property key and value once and features refer to
//! them by index. The [`LayerBuilder`](crate::LayerBuilder) dedups through
//! internal hash maps by default; the indexes here let callers control that
//! policy instead, e.g. to avoid hashing for small dictionaries. An index
//! mirrors one layer's dictionary and must not be reused across layers.

use std::collections::HashMap;

use crate::builder::LayerBuilder;
use crate::value::{encode_value, PropertyValue};

/// Maps property keys to their index in a layer's key dictionary.
pub trait KeyIndex {
    /// Return the dictionary index for `key`, appending it to the layer's
    /// key table on first sight.
    fn intern(&mut self, layer: &mut LayerBuilder<'_>, key: &[u8]) -> u32;
}

/// Maps property values to their index in a layer's value dictionary.
pub trait ValueIndex {
    /// Return the dictionary index for `value`, appending it to the layer's
    /// value table on first sight.
    fn intern(&mut self, layer: &mut LayerBuilder<'_>, value: &PropertyValue<'_>) -> u32;
}

/// Key index backed by a linear scan. No hashing; meant for layers with a
/// handful of distinct keys.
#[derive(Default)]
pub struct LinearKeyIndex {
    entries: Vec<(Vec<u8>, u32)>,
}

impl LinearKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyIndex for LinearKeyIndex {
    fn intern(&mut self, layer: &mut LayerBuilder<'_>, key: &[u8]) -> u32 {
        if let Some((_, index)) = self.entries.iter().find(|(k, _)| k.as_slice() == key) {
            return *index;
        }
        let index = layer.add_key_without_dup_check(key);
        self.entries.push((key.to_vec(), index));
        index
    }
}

/// Key index backed by a hash map.
#[derive(Default)]
pub struct HashedKeyIndex {
    map: HashMap<Vec<u8>, u32>,
}

impl HashedKeyIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyIndex for HashedKeyIndex {
    fn intern(&mut self, layer: &mut LayerBuilder<'_>, key: &[u8]) -> u32 {
        if let Some(&index) = self.map.get(key) {
            return index;
        }
        let index = layer.add_key_without_dup_check(key);
        self.map.insert(key.to_vec(), index);
        index
    }
}

/// Value index backed by a linear scan over the encoded records.
#[derive(Default)]
pub struct LinearValueIndex {
    entries: Vec<(Vec<u8>, u32)>,
}

impl LinearValueIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueIndex for LinearValueIndex {
    fn intern(&mut self, layer: &mut LayerBuilder<'_>, value: &PropertyValue<'_>) -> u32 {
        let mut encoded = Vec::new();
        encode_value(&mut encoded, value);
        if let Some((_, index)) = self.entries.iter().find(|(v, _)| *v == encoded) {
            return *index;
        }
        let index = layer.add_encoded_value(&encoded);
        self.entries.push((encoded, index));
        index
    }
}

/// Value index backed by a hash map. The map is keyed on the encoded value
/// record, which sidesteps equality and hashing of raw floats.
#[derive(Default)]
pub struct HashedValueIndex {
    map: HashMap<Vec<u8>, u32>,
}

impl HashedValueIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ValueIndex for HashedValueIndex {
    fn intern(&mut self, layer: &mut LayerBuilder<'_>, value: &PropertyValue<'_>) -> u32 {
        let mut encoded = Vec::new();
        encode_value(&mut encoded, value);
        if let Some(&index) = self.map.get(&encoded) {
            return index;
        }
        let index = layer.add_encoded_value(&encoded);
        self.map.insert(encoded, index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TileBuilder;

    fn check_key_index(index: &mut dyn KeyIndex) {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        assert_eq!(index.intern(&mut layer, b"highway"), 0);
        assert_eq!(index.intern(&mut layer, b"name"), 1);
        assert_eq!(index.intern(&mut layer, b"highway"), 0);
        assert_eq!(layer.num_keys(), 2);
    }

    fn check_value_index(index: &mut dyn ValueIndex) {
        let mut tile = TileBuilder::new();
        let mut layer = LayerBuilder::new(&mut tile, "test");
        assert_eq!(index.intern(&mut layer, &PropertyValue::Str("primary")), 0);
        assert_eq!(index.intern(&mut layer, &PropertyValue::Float(2.5)), 1);
        assert_eq!(index.intern(&mut layer, &PropertyValue::Float(2.5)), 1);
        // same number, different scalar type: a distinct dictionary entry
        assert_eq!(index.intern(&mut layer, &PropertyValue::Double(2.5)), 2);
        assert_eq!(layer.num_values(), 3);
    }

    #[test]
    fn linear_key_index_dedups() {
        check_key_index(&mut LinearKeyIndex::new());
    }

    #[test]
    fn hashed_key_index_dedups() {
        check_key_index(&mut HashedKeyIndex::new());
    }

    #[test]
    fn linear_value_index_dedups() {
        check_value_index(&mut LinearValueIndex::new());
    }

    #[test]
    fn hashed_value_index_dedups() {
        check_value_index(&mut HashedValueIndex::new());
    }
}
