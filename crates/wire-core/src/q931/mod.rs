//! Q.931 call-signaling messages as carried over H.225
//!
//! A message is a fixed header (protocol discriminator, call reference,
//! message type) followed by information elements. H.323 terminals carry
//! their own payload in the User-User element.

mod ie;
mod message;

pub use ie::{BearerCapability, CauseIe, CauseLocation, ProgressDescription};
pub use message::{Q931Message, Q931_PROTOCOL_DISCRIMINATOR};

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Q.931 message type octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    Alerting,
    CallProceeding,
    Progress,
    Setup,
    Connect,
    SetupAck,
    ConnectAck,
    ReleaseComplete,
    Facility,
    Notify,
    StatusEnquiry,
    Information,
    Status,
    Other(u8),
}

impl MessageType {
    pub fn value(&self) -> u8 {
        match self {
            MessageType::Alerting => 0x01,
            MessageType::CallProceeding => 0x02,
            MessageType::Progress => 0x03,
            MessageType::Setup => 0x05,
            MessageType::Connect => 0x07,
            MessageType::SetupAck => 0x0d,
            MessageType::ConnectAck => 0x0f,
            MessageType::ReleaseComplete => 0x5a,
            MessageType::Facility => 0x62,
            MessageType::Notify => 0x6e,
            MessageType::StatusEnquiry => 0x75,
            MessageType::Information => 0x7b,
            MessageType::Status => 0x7d,
            MessageType::Other(v) => *v,
        }
    }

    /// Whether an H.323 message of this type must carry a User-User element
    pub fn carries_user_user(&self) -> bool {
        !matches!(self, MessageType::Notify | MessageType::Status)
    }
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            0x01 => MessageType::Alerting,
            0x02 => MessageType::CallProceeding,
            0x03 => MessageType::Progress,
            0x05 => MessageType::Setup,
            0x07 => MessageType::Connect,
            0x0d => MessageType::SetupAck,
            0x0f => MessageType::ConnectAck,
            0x5a => MessageType::ReleaseComplete,
            0x62 => MessageType::Facility,
            0x6e => MessageType::Notify,
            0x75 => MessageType::StatusEnquiry,
            0x7b => MessageType::Information,
            0x7d => MessageType::Status,
            other => MessageType::Other(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Other(v) => write!(f, "Unknown({:#04x})", v),
            named => write!(f, "{:?}", named),
        }
    }
}

/// Information element identifiers
pub mod ie_code {
    pub const BEARER_CAPABILITY: u8 = 0x04;
    pub const CAUSE: u8 = 0x08;
    pub const CALL_STATE: u8 = 0x14;
    pub const FACILITY: u8 = 0x1c;
    pub const PROGRESS_INDICATOR: u8 = 0x1e;
    pub const DISPLAY: u8 = 0x28;
    pub const KEYPAD: u8 = 0x2c;
    pub const SIGNAL: u8 = 0x34;
    pub const CALLING_PARTY_NUMBER: u8 = 0x6c;
    pub const CALLED_PARTY_NUMBER: u8 = 0x70;
    pub const REDIRECTING_NUMBER: u8 = 0x74;
    pub const USER_USER: u8 = 0x7e;

    /// Elements with the high bit set are a single octet with no length
    pub fn is_single_octet(code: u8) -> bool {
        code & 0x80 != 0
    }
}

/// Raw information element, kept in wire order on decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InformationElement {
    pub code: u8,
    pub data: Bytes,
}

impl InformationElement {
    pub fn new(code: u8, data: impl Into<Bytes>) -> Self {
        Self { code, data: data.into() }
    }
}
