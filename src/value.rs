//! Typed views over property value records.
//!
//! A value record carries exactly one of seven scalar fields. The view keeps
//! the encoded record and decodes on access; string payloads alias the
//! source buffer.

use crate::error::{Error, Result};
use crate::pbf::{self, Reader, WireType, Writer};

/// The scalar type stored in a value record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Float,
    Double,
    Int,
    UInt,
    SInt,
    Bool,
}

/// A decoded property value borrowing from the tile buffer.
///
/// This is also the input type of the builders: encoding a feature property
/// goes through the same representation decoding produces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyValue<'a> {
    Str(&'a str),
    Float(f32),
    Double(f64),
    Int(i64),
    UInt(u64),
    SInt(i64),
    Bool(bool),
}

impl PropertyValue<'_> {
    pub fn value_type(&self) -> ValueType {
        match self {
            PropertyValue::Str(_) => ValueType::String,
            PropertyValue::Float(_) => ValueType::Float,
            PropertyValue::Double(_) => ValueType::Double,
            PropertyValue::Int(_) => ValueType::Int,
            PropertyValue::UInt(_) => ValueType::UInt,
            PropertyValue::SInt(_) => ValueType::SInt,
            PropertyValue::Bool(_) => ValueType::Bool,
        }
    }
}

impl<'a> From<&'a str> for PropertyValue<'a> {
    fn from(v: &'a str) -> Self {
        PropertyValue::Str(v)
    }
}

impl From<f32> for PropertyValue<'_> {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<f64> for PropertyValue<'_> {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<i64> for PropertyValue<'_> {
    fn from(v: i64) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<u64> for PropertyValue<'_> {
    fn from(v: u64) -> Self {
        PropertyValue::UInt(v)
    }
}

impl From<bool> for PropertyValue<'_> {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

/// Non-owning view over one encoded value record.
#[derive(Debug, Clone, Copy)]
pub struct ValueView<'a> {
    data: &'a [u8],
}

impl<'a> ValueView<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The encoded record this view is over.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Decode the record. Exactly one scalar field must be present; an empty
    /// record or one with several populated fields is a format error.
    pub fn decode(&self) -> Result<PropertyValue<'a>> {
        let mut reader = Reader::new(self.data);
        let mut decoded = None;

        while let Some((field, wire_type)) = reader.next()? {
            let value = match (field, wire_type) {
                (pbf::value::STRING, WireType::LengthDelimited) => {
                    PropertyValue::Str(reader.read_string()?)
                }
                (pbf::value::FLOAT, WireType::ThirtyTwoBit) => {
                    PropertyValue::Float(reader.read_fixed_f32()?)
                }
                (pbf::value::DOUBLE, WireType::SixtyFourBit) => {
                    PropertyValue::Double(reader.read_fixed_f64()?)
                }
                (pbf::value::INT, WireType::Varint) => PropertyValue::Int(reader.read_i64()?),
                (pbf::value::UINT, WireType::Varint) => {
                    PropertyValue::UInt(reader.read_varint()?)
                }
                (pbf::value::SINT, WireType::Varint) => {
                    PropertyValue::SInt(reader.read_sint64()?)
                }
                (pbf::value::BOOL, WireType::Varint) => PropertyValue::Bool(reader.read_bool()?),
                _ => {
                    return Err(Error::Format(
                        format!("unknown field {field} in value record").into(),
                    ))
                }
            };
            if decoded.is_some() {
                return Err(Error::Format(
                    "more than one scalar in value record".into(),
                ));
            }
            decoded = Some(value);
        }

        decoded.ok_or_else(|| Error::Format("value record contains no scalar".into()))
    }

    /// The type of the stored scalar.
    pub fn value_type(&self) -> Result<ValueType> {
        Ok(self.decode()?.value_type())
    }

    pub fn str_value(&self) -> Result<&'a str> {
        match self.decode()? {
            PropertyValue::Str(v) => Ok(v),
            other => Err(type_mismatch(ValueType::String, other)),
        }
    }

    pub fn float_value(&self) -> Result<f32> {
        match self.decode()? {
            PropertyValue::Float(v) => Ok(v),
            other => Err(type_mismatch(ValueType::Float, other)),
        }
    }

    pub fn double_value(&self) -> Result<f64> {
        match self.decode()? {
            PropertyValue::Double(v) => Ok(v),
            other => Err(type_mismatch(ValueType::Double, other)),
        }
    }

    pub fn int_value(&self) -> Result<i64> {
        match self.decode()? {
            PropertyValue::Int(v) => Ok(v),
            other => Err(type_mismatch(ValueType::Int, other)),
        }
    }

    pub fn uint_value(&self) -> Result<u64> {
        match self.decode()? {
            PropertyValue::UInt(v) => Ok(v),
            other => Err(type_mismatch(ValueType::UInt, other)),
        }
    }

    pub fn sint_value(&self) -> Result<i64> {
        match self.decode()? {
            PropertyValue::SInt(v) => Ok(v),
            other => Err(type_mismatch(ValueType::SInt, other)),
        }
    }

    pub fn bool_value(&self) -> Result<bool> {
        match self.decode()? {
            PropertyValue::Bool(v) => Ok(v),
            other => Err(type_mismatch(ValueType::Bool, other)),
        }
    }
}

fn type_mismatch(expected: ValueType, found: PropertyValue<'_>) -> Error {
    Error::Type(
        format!(
            "expected {expected:?} value, found {:?}",
            found.value_type()
        )
        .into(),
    )
}

/// Append one encoded value record to `buf`.
pub(crate) fn encode_value(buf: &mut Vec<u8>, value: &PropertyValue<'_>) {
    let mut writer = Writer::new(buf);
    match *value {
        PropertyValue::Str(v) => writer.bytes_field(pbf::value::STRING, v.as_bytes()),
        PropertyValue::Float(v) => writer.fixed_f32_field(pbf::value::FLOAT, v),
        PropertyValue::Double(v) => writer.fixed_f64_field(pbf::value::DOUBLE, v),
        PropertyValue::Int(v) => writer.varint_field(pbf::value::INT, v as u64),
        PropertyValue::UInt(v) => writer.varint_field(pbf::value::UINT, v),
        PropertyValue::SInt(v) => writer.sint64_field(pbf::value::SINT, v),
        PropertyValue::Bool(v) => writer.varint_field(pbf::value::BOOL, u64::from(v)),
    }
}
