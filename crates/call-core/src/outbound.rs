//! Framed messages handed to the transport

use bytes::Bytes;
use h323_wire_core::{MessageType, TransportAddress};
use h323_wire_core::h245::message::H245MessageKind;

/// What an outbound payload is, so the transport can route it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboundKind {
    /// Q.931 message for the H.225 signaling connection
    Q931(MessageType),
    /// H.245 message for the separate H.245 connection
    H245(H245MessageKind),
    /// Facility carrying nothing but tunneled H.245
    TunneledFacility,
}

impl OutboundKind {
    /// Whether the payload goes on the H.225 connection
    pub fn is_signaling(&self) -> bool {
        !matches!(self, OutboundKind::H245(_))
    }
}

/// One TPKT-framed message ready to write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub token: String,
    pub kind: OutboundKind,
    pub logical_channel: Option<u16>,
    pub payload: Bytes,
}

/// Everything the engine asks the transport to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Outbound(OutboundMessage),
    /// Open the H.245 connection to the peer's advertised address
    ConnectH245 { token: String, address: TransportAddress },
    /// Close the separate H.245 connection, keeping H.225 up
    CloseH245 { token: String },
    /// Close every connection of the call
    CloseTransport { token: String },
}

impl EngineEvent {
    pub fn token(&self) -> &str {
        match self {
            EngineEvent::Outbound(msg) => &msg.token,
            EngineEvent::ConnectH245 { token, .. }
            | EngineEvent::CloseH245 { token }
            | EngineEvent::CloseTransport { token } => token,
        }
    }
}
