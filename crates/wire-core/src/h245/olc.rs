//! OpenLogicalChannel and its acknowledgement
//!
//! The same encoding is used for H.245 channel signaling and for the
//! fast-start elements embedded in H.225 messages.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::capability::MediaCapability;
use crate::address::{TransportAddress, decode_address, encode_address};
use crate::error::{Result, WireError};
use crate::tlv::{FieldMap, TlvWriter};

/// Payload a logical channel carries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// No media in this direction
    Null,
    Media(MediaCapability),
}

impl DataType {
    pub fn is_null(&self) -> bool {
        matches!(self, DataType::Null)
    }

    pub fn capability(&self) -> Option<&MediaCapability> {
        match self {
            DataType::Media(cap) => Some(cap),
            DataType::Null => None,
        }
    }
}

/// H.225.0 multiplex parameters of one direction
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct H2250Parameters {
    /// 0 means "assigned by the master"
    pub session_id: u8,
    pub media_channel: Option<TransportAddress>,
    pub media_control_channel: Option<TransportAddress>,
    pub dynamic_payload_type: Option<u8>,
}

impl H2250Parameters {
    fn encode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.put_u8(1, self.session_id)?;
        if let Some(addr) = &self.media_channel {
            encode_address(w, 2, addr)?;
        }
        if let Some(addr) = &self.media_control_channel {
            encode_address(w, 3, addr)?;
        }
        if let Some(pt) = self.dynamic_payload_type {
            w.put_u8(4, pt)?;
        }
        Ok(())
    }

    fn decode(value: Bytes) -> Result<Self> {
        let f = FieldMap::decode(value)?;
        Ok(Self {
            session_id: f.u8(1)?.unwrap_or(0),
            media_channel: f.get(2).map(decode_address).transpose()?,
            media_control_channel: f.get(3).map(decode_address).transpose()?,
            dynamic_payload_type: f.u8(4)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalChannelParameters {
    pub data_type: DataType,
    pub h2250: Option<H2250Parameters>,
}

impl LogicalChannelParameters {
    pub fn null() -> Self {
        Self { data_type: DataType::Null, h2250: None }
    }

    fn encode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.put_nested(1, |inner| match &self.data_type {
            DataType::Null => Ok(()),
            DataType::Media(cap) => cap.encode(inner),
        })?;
        if let Some(h2250) = &self.h2250 {
            w.put_nested(2, |inner| h2250.encode(inner))?;
        }
        Ok(())
    }

    fn decode(value: Bytes) -> Result<Self> {
        let f = FieldMap::decode(value)?;
        let data_type = match f.get(1) {
            Some(v) if !v.is_empty() => DataType::Media(MediaCapability::decode(v.clone())?),
            _ => DataType::Null,
        };
        Ok(Self {
            data_type,
            h2250: f.get(2).map(|v| H2250Parameters::decode(v.clone())).transpose()?,
        })
    }
}

/// Which way media flows on a proposed channel, seen from its proposer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OlcDirection {
    /// Proposer transmits
    Forward,
    /// Proposer receives
    Reverse,
    Bidirectional,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLogicalChannel {
    pub forward_lcn: u16,
    pub forward: LogicalChannelParameters,
    pub reverse: Option<LogicalChannelParameters>,
}

impl OpenLogicalChannel {
    /// Classify the proposal; `None` when it carries no media at all
    pub fn direction(&self) -> Option<OlcDirection> {
        let reverse_media = self
            .reverse
            .as_ref()
            .is_some_and(|r| !r.data_type.is_null());
        match (self.forward.data_type.is_null(), reverse_media) {
            (false, true) => Some(OlcDirection::Bidirectional),
            (true, true) => Some(OlcDirection::Reverse),
            (false, false) => Some(OlcDirection::Forward),
            (true, false) => None,
        }
    }

    /// Parameters of the direction that carries media
    pub fn media_parameters(&self) -> Option<&LogicalChannelParameters> {
        match self.direction()? {
            OlcDirection::Reverse => self.reverse.as_ref(),
            _ => Some(&self.forward),
        }
    }

    pub(crate) fn encode_fields(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.put_u16(1, self.forward_lcn)?;
        w.put_nested(2, |inner| self.forward.encode(inner))?;
        if let Some(reverse) = &self.reverse {
            w.put_nested(3, |inner| reverse.encode(inner))?;
        }
        Ok(())
    }

    pub(crate) fn decode_fields(f: &FieldMap) -> Result<Self> {
        let forward_lcn = f
            .u16(1)?
            .ok_or_else(|| WireError::decode("open logical channel without channel number"))?;
        let forward = LogicalChannelParameters::decode(f.require(2, "forward parameters")?.clone())?;
        let reverse = f
            .get(3)
            .map(|v| LogicalChannelParameters::decode(v.clone()))
            .transpose()?;
        Ok(Self { forward_lcn, forward, reverse })
    }

    /// Standalone encoding, as used for one fast-start element
    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        self.encode_fields(&mut TlvWriter::new(&mut buf))?;
        Ok(buf.freeze())
    }

    pub fn decode(data: Bytes) -> Result<Self> {
        Self::decode_fields(&FieldMap::decode(data)?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenLogicalChannelAck {
    pub forward_lcn: u16,
    pub reverse_lcn: Option<u16>,
    pub session_id: Option<u8>,
    pub media_channel: Option<TransportAddress>,
    pub media_control_channel: Option<TransportAddress>,
}

impl OpenLogicalChannelAck {
    pub(crate) fn encode_fields(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.put_u16(1, self.forward_lcn)?;
        if let Some(lcn) = self.reverse_lcn {
            w.put_u16(2, lcn)?;
        }
        if let Some(session) = self.session_id {
            w.put_u8(3, session)?;
        }
        if let Some(addr) = &self.media_channel {
            encode_address(w, 4, addr)?;
        }
        if let Some(addr) = &self.media_control_channel {
            encode_address(w, 5, addr)?;
        }
        Ok(())
    }

    pub(crate) fn decode_fields(f: &FieldMap) -> Result<Self> {
        Ok(Self {
            forward_lcn: f
                .u16(1)?
                .ok_or_else(|| WireError::decode("channel ack without channel number"))?,
            reverse_lcn: f.u16(2)?,
            session_id: f.u8(3)?,
            media_channel: f.get(4).map(decode_address).transpose()?,
            media_control_channel: f.get(5).map(decode_address).transpose()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum OlcRejectCause {
    Unspecified = 0,
    UnsuitableReverseParameters = 1,
    DataTypeNotSupported = 2,
    DataTypeNotAvailable = 3,
    UnknownDataType = 4,
    DataTypeAlCombinationNotSupported = 5,
    MulticastChannelNotAllowed = 6,
    InsufficientBandwidth = 7,
    SeparateStackEstablishmentFailed = 8,
    InvalidSessionId = 9,
    MasterSlaveConflict = 10,
    WaitForCommunicationMode = 11,
    InvalidDependentChannel = 12,
    ReplacementForRejected = 13,
}

impl From<u8> for OlcRejectCause {
    fn from(value: u8) -> Self {
        match value {
            1 => OlcRejectCause::UnsuitableReverseParameters,
            2 => OlcRejectCause::DataTypeNotSupported,
            3 => OlcRejectCause::DataTypeNotAvailable,
            4 => OlcRejectCause::UnknownDataType,
            5 => OlcRejectCause::DataTypeAlCombinationNotSupported,
            6 => OlcRejectCause::MulticastChannelNotAllowed,
            7 => OlcRejectCause::InsufficientBandwidth,
            8 => OlcRejectCause::SeparateStackEstablishmentFailed,
            9 => OlcRejectCause::InvalidSessionId,
            10 => OlcRejectCause::MasterSlaveConflict,
            11 => OlcRejectCause::WaitForCommunicationMode,
            12 => OlcRejectCause::InvalidDependentChannel,
            13 => OlcRejectCause::ReplacementForRejected,
            _ => OlcRejectCause::Unspecified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h245::capability::CapType;
    use std::net::Ipv4Addr;

    fn ulaw(frames: u32) -> DataType {
        DataType::Media(MediaCapability::Audio {
            cap: CapType::G711Ulaw64k,
            frames,
            silence_suppression: false,
        })
    }

    fn params(data_type: DataType) -> LogicalChannelParameters {
        LogicalChannelParameters {
            data_type,
            h2250: Some(H2250Parameters {
                session_id: 1,
                media_channel: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 2), 10000)),
                media_control_channel: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 2), 10001)),
                dynamic_payload_type: None,
            }),
        }
    }

    #[test]
    fn test_direction_classification() {
        let forward = OpenLogicalChannel { forward_lcn: 1, forward: params(ulaw(20)), reverse: None };
        assert_eq!(forward.direction(), Some(OlcDirection::Forward));

        let reverse = OpenLogicalChannel {
            forward_lcn: 2,
            forward: LogicalChannelParameters::null(),
            reverse: Some(params(ulaw(20))),
        };
        assert_eq!(reverse.direction(), Some(OlcDirection::Reverse));
        assert_eq!(reverse.media_parameters(), reverse.reverse.as_ref());

        let both = OpenLogicalChannel {
            forward_lcn: 3,
            forward: params(ulaw(20)),
            reverse: Some(params(ulaw(20))),
        };
        assert_eq!(both.direction(), Some(OlcDirection::Bidirectional));

        let none = OpenLogicalChannel { forward_lcn: 4, forward: LogicalChannelParameters::null(), reverse: None };
        assert_eq!(none.direction(), None);
    }

    #[test]
    fn test_fast_start_element_decode() {
        let olc = OpenLogicalChannel {
            forward_lcn: 1001,
            forward: LogicalChannelParameters::null(),
            reverse: Some(params(ulaw(240))),
        };
        assert_eq!(OpenLogicalChannel::decode(olc.encode().unwrap()).unwrap(), olc);
    }
}
