//! Error types for wire encoding and decoding

use thiserror::Error;

/// Result type for wire operations
pub type Result<T> = std::result::Result<T, WireError>;

/// Errors raised while encoding or decoding signaling messages
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Buffer ends before a fixed-size field
    #[error("Buffer too short: required {required} bytes, available {available}")]
    TooShort { required: usize, available: usize },

    /// Q.931 call reference length octet was not 2
    #[error("Invalid call reference length: {0}")]
    InvalidCallReferenceLength(u8),

    /// Unexpected protocol discriminator
    #[error("Invalid protocol discriminator: {0:#04x}")]
    InvalidProtocolDiscriminator(u8),

    /// An information element claims more octets than remain
    #[error("Element {code:#04x} length {length} overruns buffer ({remaining} remaining)")]
    ElementOverrun {
        code: u8,
        length: usize,
        remaining: usize,
    },

    /// A message that must carry a user-user element did not
    #[error("Missing user-user information element in {message_type}")]
    MissingUserUser { message_type: String },

    /// The user-user payload could not be decoded
    #[error("Invalid user-user payload: {0}")]
    InvalidUserUser(String),

    /// TPKT framing violation
    #[error("Invalid TPKT frame: {0}")]
    InvalidTpkt(String),

    /// Unknown discriminating tag
    #[error("Unknown {context} tag {tag}")]
    UnknownTag { context: &'static str, tag: u8 },

    /// Encoding failure
    #[error("Encode error: {0}")]
    Encode(String),

    /// Decoding failure
    #[error("Decode error: {0}")]
    Decode(String),
}

impl WireError {
    /// Create a decode error
    pub fn decode(details: impl Into<String>) -> Self {
        Self::Decode(details.into())
    }

    /// Create an encode error
    pub fn encode(details: impl Into<String>) -> Self {
        Self::Encode(details.into())
    }

    /// Whether the error describes a malformed buffer rather than a
    /// well-formed but unsupported element
    pub fn is_structural(&self) -> bool {
        !matches!(self, WireError::UnknownTag { .. })
    }
}

/// Check that `available` bytes cover `required`
pub(crate) fn ensure(required: usize, available: usize) -> Result<()> {
    if available < required {
        return Err(WireError::TooShort { required, available });
    }
    Ok(())
}
