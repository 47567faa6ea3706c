//! Errors which can happen while decoding or building vector tiles.

use std::borrow::Cow;

use thiserror::Error;

/// Enumeration of errors which can happen during the operation of the library.
#[derive(Error, Debug)]
pub enum Error {
    /// Structural violation of the wire format, e.g. an unknown field in a
    /// layer, a missing layer name or a malformed record payload.
    #[error("format error: {0}")]
    Format(Cow<'static, str>),
    /// A layer declared a version this library does not understand. Only
    /// versions 1 and 2 are supported; the observed version is carried.
    #[error("unsupported vector tile layer version {0}")]
    Version(u32),
    /// Violation of the geometry command stream rules.
    #[error("geometry error: {0}")]
    Geometry(Cow<'static, str>),
    /// A property value was accessed as the wrong scalar type, or a geometry
    /// was decoded as the wrong geometry type.
    #[error("type mismatch: {0}")]
    Type(Cow<'static, str>),
    /// A tag index pointing beyond the layer's key or value dictionary.
    #[error("index {0} out of range")]
    OutOfRange(u32),
    /// A builder precondition was violated. These indicate programming
    /// errors in the caller, not malformed input.
    #[error("builder precondition violated: {0}")]
    Assert(&'static str),
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Format(e.to_string().into())
    }
}

/// Result alias used throughout this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
