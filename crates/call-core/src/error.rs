//! Error types for call control

use h323_wire_core::WireError;
use thiserror::Error;

/// Result type for call-control operations
pub type Result<T> = std::result::Result<T, CallError>;

/// Errors raised by call control
#[derive(Debug, Error)]
pub enum CallError {
    /// Message could not be encoded or decoded
    #[error("Wire error: {0}")]
    Wire(#[from] WireError),

    /// No call with this token
    #[error("Call not found: {0}")]
    CallNotFound(String),

    /// A call with this token is already registered
    #[error("Duplicate call token: {0}")]
    DuplicateCall(String),

    /// Requested state change is not legal from the current state
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// A channel for this session and direction is already established
    #[error("Session {session_id} already established ({direction})")]
    DuplicateSession { session_id: u8, direction: String },

    /// No logical channel with this number
    #[error("Logical channel not found: {0}")]
    ChannelNotFound(u16),

    /// Every logical channel number in the configured range is in use
    #[error("No logical channel number available")]
    NoChannelNumberAvailable,

    /// Capability or mode not supported locally
    #[error("Capability not supported: {0}")]
    CapabilityNotSupported(String),

    /// Preference list already holds the maximum number of entries
    #[error("Preference list full ({0} entries)")]
    PreferenceListFull(usize),

    /// Alias value not acceptable for its kind
    #[error("Invalid alias: {0}")]
    AliasInvalid(String),

    /// Configuration rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Destination string could not be parsed
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    /// Gatekeeper client failure
    #[error("Gatekeeper error: {0}")]
    Gatekeeper(String),

    /// No admission answer within the configured wait
    #[error("Admission timed out after {0} seconds")]
    AdmissionTimeout(u64),

    /// Media channel operation failed
    #[error("Media error: {0}")]
    Media(String),

    /// Application callback failed
    #[error("Callback error: {0}")]
    Callback(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CallError {
    pub fn call_not_found(token: impl Into<String>) -> Self {
        Self::CallNotFound(token.into())
    }

    pub fn invalid_transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidStateTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }

    pub fn not_supported(details: impl Into<String>) -> Self {
        Self::CapabilityNotSupported(details.into())
    }

    pub fn invalid_config(details: impl Into<String>) -> Self {
        Self::InvalidConfig(details.into())
    }

    pub fn alias_invalid(details: impl Into<String>) -> Self {
        Self::AliasInvalid(details.into())
    }

    pub fn gatekeeper(details: impl Into<String>) -> Self {
        Self::Gatekeeper(details.into())
    }

    pub fn media(details: impl Into<String>) -> Self {
        Self::Media(details.into())
    }

    pub fn callback(details: impl Into<String>) -> Self {
        Self::Callback(details.into())
    }

    /// Whether the failure only concerns a single message
    pub fn is_message_local(&self) -> bool {
        matches!(self, CallError::Wire(_))
    }
}
