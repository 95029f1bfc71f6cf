//! # h323-wire-core
//!
//! Message codecs for the H.323 signaling suite: Q.931 with its information
//! elements, the H.225 user-user PDU, H.245 control messages and TPKT
//! framing. Nothing here holds call state; `h323-call-core` drives these
//! types.
//!
//! ```
//! use bytes::Bytes;
//! use h323_wire_core::q931::{MessageType, Q931Message};
//!
//! let msg = Q931Message::new(MessageType::Notify, 42, false);
//! let decoded = Q931Message::decode(msg.encode().unwrap()).unwrap();
//! assert_eq!(decoded.call_reference, 42);
//! ```

pub mod address;
pub mod cause;
pub mod error;
pub mod h245;
pub mod identifiers;
pub mod q931;
pub mod tlv;
pub mod tpkt;
pub mod uuie;

pub use address::{AliasAddress, AliasKind, TransportAddress};
pub use cause::{Q931Cause, ReleaseCompleteReason};
pub use error::{Result, WireError};
pub use identifiers::{CallIdentifier, ConferenceIdentifier};
pub use q931::{InformationElement, MessageType, Q931Message};
pub use uuie::{FacilityReason, UserUserPdu, UuieBody};
