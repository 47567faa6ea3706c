//! Thin cursor over the protobuf record codec.
//!
//! The actual wire primitives (keys, varints, field skipping) come from
//! [`prost::encoding`]; this module only binds them to the borrowed byte
//! slices the readers hand around and to the `Vec<u8>` buffers the builders
//! own. Length-delimited payloads are returned as sub-slices of the source
//! buffer, never copied.

use bytes::{Buf, BufMut};
use prost::encoding::{self, DecodeContext};

pub(crate) use prost::encoding::WireType;

use crate::error::{Error, Result};

/// Field numbers of the tile message.
pub(crate) mod tile {
    pub const LAYERS: u32 = 3;
}

/// Field numbers of the layer message.
pub(crate) mod layer {
    pub const NAME: u32 = 1;
    pub const FEATURES: u32 = 2;
    pub const KEYS: u32 = 3;
    pub const VALUES: u32 = 4;
    pub const EXTENT: u32 = 5;
    pub const VERSION: u32 = 15;
}

/// Field numbers of the feature message.
pub(crate) mod feature {
    pub const ID: u32 = 1;
    pub const TAGS: u32 = 2;
    pub const TYPE: u32 = 3;
    pub const GEOMETRY: u32 = 4;
}

/// Field numbers of the value message.
pub(crate) mod value {
    pub const STRING: u32 = 1;
    pub const FLOAT: u32 = 2;
    pub const DOUBLE: u32 = 3;
    pub const INT: u32 = 4;
    pub const UINT: u32 = 5;
    pub const SINT: u32 = 6;
    pub const BOOL: u32 = 7;
}

/// Forward cursor over one encoded message.
///
/// The cursor consumes the slice from the front; everything it returns for
/// length-delimited fields borrows from the original buffer.
#[derive(Clone, Debug)]
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn at_end(&self) -> bool {
        self.buf.is_empty()
    }

    /// Read the next field header, or `None` at the end of the message.
    pub fn next(&mut self) -> Result<Option<(u32, WireType)>> {
        if self.buf.is_empty() {
            return Ok(None);
        }
        let (field, wire_type) = encoding::decode_key(&mut self.buf)?;
        Ok(Some((field, wire_type)))
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        Ok(encoding::decode_varint(&mut self.buf)?)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        u32::try_from(self.read_varint()?)
            .map_err(|_| Error::Format("varint overflows 32 bits".into()))
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_varint()? != 0)
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_varint()? as i64)
    }

    /// Read a zigzag-encoded signed varint.
    pub fn read_sint64(&mut self) -> Result<i64> {
        let v = self.read_varint()?;
        Ok((v >> 1) as i64 ^ -((v & 1) as i64))
    }

    pub fn read_fixed_f32(&mut self) -> Result<f32> {
        if self.buf.remaining() < 4 {
            return Err(Error::Format("truncated fixed32 field".into()));
        }
        Ok(self.buf.get_f32_le())
    }

    pub fn read_fixed_f64(&mut self) -> Result<f64> {
        if self.buf.remaining() < 8 {
            return Err(Error::Format("truncated fixed64 field".into()));
        }
        Ok(self.buf.get_f64_le())
    }

    /// Read a length-delimited payload as a view into the source buffer.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_varint()? as usize;
        if len > self.buf.len() {
            return Err(Error::Format(
                "length-delimited field overruns the buffer".into(),
            ));
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_string(&mut self) -> Result<&'a str> {
        std::str::from_utf8(self.read_bytes()?)
            .map_err(|_| Error::Format("invalid UTF-8 in string field".into()))
    }

    /// Skip over the payload of the field whose header was just read.
    pub fn skip(&mut self, field: u32, wire_type: WireType) -> Result<()> {
        encoding::skip_field(wire_type, field, &mut self.buf, DecodeContext::default())?;
        Ok(())
    }
}

/// Appends fields to a growing message buffer.
pub(crate) struct Writer<'a> {
    buf: &'a mut Vec<u8>,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut Vec<u8>) -> Self {
        Self { buf }
    }

    pub fn varint_field(&mut self, field: u32, value: u64) {
        encoding::encode_key(field, WireType::Varint, self.buf);
        encoding::encode_varint(value, self.buf);
    }

    pub fn sint64_field(&mut self, field: u32, value: i64) {
        let zigzag = ((value << 1) ^ (value >> 63)) as u64;
        self.varint_field(field, zigzag);
    }

    pub fn fixed_f32_field(&mut self, field: u32, value: f32) {
        encoding::encode_key(field, WireType::ThirtyTwoBit, self.buf);
        self.buf.put_f32_le(value);
    }

    pub fn fixed_f64_field(&mut self, field: u32, value: f64) {
        encoding::encode_key(field, WireType::SixtyFourBit, self.buf);
        self.buf.put_f64_le(value);
    }

    pub fn bytes_field(&mut self, field: u32, value: &[u8]) {
        encoding::encode_key(field, WireType::LengthDelimited, self.buf);
        encoding::encode_varint(value.len() as u64, self.buf);
        self.buf.extend_from_slice(value);
    }

    pub fn packed_u32_field(&mut self, field: u32, values: &[u32]) {
        encoding::encode_key(field, WireType::LengthDelimited, self.buf);
        let len: usize = values
            .iter()
            .map(|&v| encoding::encoded_len_varint(u64::from(v)))
            .sum();
        encoding::encode_varint(len as u64, self.buf);
        for &v in values {
            encoding::encode_varint(u64::from(v), self.buf);
        }
    }
}

/// Encode the header of a length-delimited field, for splicing in front of
/// an already-written payload.
pub(crate) fn length_delimited_header(field: u32, len: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(6);
    encoding::encode_key(field, WireType::LengthDelimited, &mut header);
    encoding::encode_varint(len as u64, &mut header);
    header
}
