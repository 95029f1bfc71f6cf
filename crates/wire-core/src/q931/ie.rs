//! Typed views of the Q.931 information elements H.323 uses

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::cause::Q931Cause;
use crate::error::{Result, WireError};

/// Information transfer capability of the bearer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BearerCapability {
    /// Speech, circuit mode, 64 kbit/s, G.711 u-law
    Speech,
    /// Unrestricted digital, circuit mode, 64 kbit/s, H.221/H.242
    UnrestrictedDigital,
}

impl BearerCapability {
    pub fn octets(&self) -> [u8; 3] {
        match self {
            BearerCapability::Speech => [0x80, 0x90, 0xa2],
            BearerCapability::UnrestrictedDigital => [0x88, 0x90, 0xa5],
        }
    }

    /// Classify by the transfer capability bits of octet 3
    pub fn from_octets(data: &[u8]) -> Option<Self> {
        match data.first().map(|b| b & 0x1f) {
            Some(0x00) | Some(0x10) => Some(BearerCapability::Speech),
            Some(0x08) | Some(0x09) => Some(BearerCapability::UnrestrictedDigital),
            _ => None,
        }
    }
}

/// Location field of the Cause element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum CauseLocation {
    User = 0,
    PrivateLocal = 1,
    PublicLocal = 2,
    Transit = 3,
    PublicRemote = 4,
    PrivateRemote = 5,
    International = 7,
    BeyondInterworking = 10,
}

impl From<u8> for CauseLocation {
    fn from(value: u8) -> Self {
        match value & 0x0f {
            1 => CauseLocation::PrivateLocal,
            2 => CauseLocation::PublicLocal,
            3 => CauseLocation::Transit,
            4 => CauseLocation::PublicRemote,
            5 => CauseLocation::PrivateRemote,
            7 => CauseLocation::International,
            10 => CauseLocation::BeyondInterworking,
            _ => CauseLocation::User,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseIe {
    pub location: CauseLocation,
    pub cause: Q931Cause,
}

impl CauseIe {
    pub fn new(cause: Q931Cause) -> Self {
        Self { location: CauseLocation::User, cause }
    }

    pub fn octets(&self) -> [u8; 2] {
        [0x80 | self.location as u8, 0x80 | self.cause.value()]
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        match data {
            [loc, cause, ..] => Ok(Self {
                location: CauseLocation::from(*loc),
                cause: Q931Cause::from(*cause),
            }),
            _ => Err(WireError::decode(format!("cause element of {} octets", data.len()))),
        }
    }
}

/// Progress descriptions used by H.323 endpoints
pub struct ProgressDescription;

impl ProgressDescription {
    pub const NOT_END_TO_END_ISDN: u8 = 1;
    pub const DESTINATION_NOT_ISDN: u8 = 2;
    pub const ORIGIN_NOT_ISDN: u8 = 3;
    pub const RETURNED_TO_ISDN: u8 = 4;
    pub const INBAND_AVAILABLE: u8 = 8;

    pub fn octets(description: u8) -> [u8; 2] {
        [0x80, 0x80 | (description & 0x7f)]
    }

    pub fn decode(data: &[u8]) -> Result<u8> {
        match data {
            [_, desc, ..] => Ok(desc & 0x7f),
            _ => Err(WireError::decode(format!("progress element of {} octets", data.len()))),
        }
    }
}

/// Numbering plan ISDN/telephony (E.164), type unknown
const PLAN_E164: u8 = 1;
const TYPE_UNKNOWN: u8 = 0;

pub(crate) fn encode_calling_number(digits: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(digits.len() + 2);
    buf.put_u8((TYPE_UNKNOWN << 4) | PLAN_E164);
    // presentation allowed, user-provided not screened
    buf.put_u8(0x80);
    buf.put_slice(digits.as_bytes());
    buf.freeze()
}

pub(crate) fn decode_calling_number(data: &[u8]) -> Result<String> {
    let skip = match data.first() {
        Some(octet) if octet & 0x80 != 0 => 1,
        Some(_) => 2,
        None => return Err(WireError::decode("empty calling party number")),
    };
    digits(data.get(skip..).unwrap_or_default())
}

pub(crate) fn encode_called_number(digits: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(digits.len() + 1);
    buf.put_u8(0x80 | (TYPE_UNKNOWN << 4) | PLAN_E164);
    buf.put_slice(digits.as_bytes());
    buf.freeze()
}

pub(crate) fn decode_called_number(data: &[u8]) -> Result<String> {
    match data.split_first() {
        Some((_, rest)) => digits(rest),
        None => Err(WireError::decode("empty called party number")),
    }
}

fn digits(data: &[u8]) -> Result<String> {
    String::from_utf8(data.to_vec())
        .map_err(|_| WireError::decode("party number is not ASCII"))
}

/// Display text travels NUL-terminated; decode tolerates either form
pub(crate) fn encode_display(text: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.put_slice(text.as_bytes());
    buf.put_u8(0);
    buf.freeze()
}

pub(crate) fn decode_display(data: &[u8]) -> String {
    let end = data.iter().position(|b| *b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_octets() {
        assert_eq!(BearerCapability::Speech.octets(), [0x80, 0x90, 0xa2]);
        assert_eq!(
            BearerCapability::from_octets(&BearerCapability::UnrestrictedDigital.octets()),
            Some(BearerCapability::UnrestrictedDigital)
        );
    }

    #[test]
    fn test_cause_octets() {
        let ie = CauseIe::new(Q931Cause::UserBusy);
        assert_eq!(ie.octets(), [0x80, 0x91]);
        assert_eq!(CauseIe::decode(&ie.octets()).unwrap(), ie);
        assert!(CauseIe::decode(&[0x80]).is_err());
    }

    #[test]
    fn test_calling_number_skip_rules() {
        let encoded = encode_calling_number("5551234");
        assert_eq!(&encoded[..2], &[0x01, 0x80]);
        assert_eq!(decode_calling_number(&encoded).unwrap(), "5551234");
        // octet 3 with the extension bit set has no octet 3a
        assert_eq!(decode_calling_number(&[0x81, b'4', b'2']).unwrap(), "42");
    }

    #[test]
    fn test_called_number() {
        let encoded = encode_called_number("100");
        assert_eq!(encoded.as_ref(), &[0x81, b'1', b'0', b'0']);
        assert_eq!(decode_called_number(&encoded).unwrap(), "100");
    }

    #[test]
    fn test_display_nul() {
        assert_eq!(encode_display("Alice").as_ref(), b"Alice\0");
        assert_eq!(decode_display(b"Alice\0"), "Alice");
        assert_eq!(decode_display(b"Bob"), "Bob");
    }
}
