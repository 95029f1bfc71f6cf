//! Media capability descriptors as they appear in capability sets and
//! logical channel proposals

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WireError};
use crate::tlv::{FieldMap, TlvWriter};

/// Codec tags with stable numeric values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CapType {
    G726 = 1,
    G711Alaw64k = 2,
    G711Alaw56k = 3,
    G711Ulaw64k = 4,
    G711Ulaw56k = 5,
    G722_64k = 6,
    G722_56k = 7,
    G722_48k = 8,
    G7231 = 9,
    G728 = 10,
    G729 = 11,
    G729A = 12,
    AmrNb = 13,
    G726Aal2 = 14,
    G729B = 15,
    G729AB = 16,
    G7231C = 17,
    GsmFullRate = 18,
    GsmHalfRate = 19,
    GsmEnhancedFullRate = 20,
    Speex = 23,
    H263Video = 31,
    T38 = 35,
}

/// Tags above this value describe video or data capabilities
pub const CAP_VIDEO_BASE: u8 = 27;

impl CapType {
    pub const ALL: [CapType; 23] = [
        CapType::G726,
        CapType::G711Alaw64k,
        CapType::G711Alaw56k,
        CapType::G711Ulaw64k,
        CapType::G711Ulaw56k,
        CapType::G722_64k,
        CapType::G722_56k,
        CapType::G722_48k,
        CapType::G7231,
        CapType::G728,
        CapType::G729,
        CapType::G729A,
        CapType::AmrNb,
        CapType::G726Aal2,
        CapType::G729B,
        CapType::G729AB,
        CapType::G7231C,
        CapType::GsmFullRate,
        CapType::GsmHalfRate,
        CapType::GsmEnhancedFullRate,
        CapType::Speex,
        CapType::H263Video,
        CapType::T38,
    ];

    pub fn value(&self) -> u8 {
        *self as u8
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            CapType::T38 => MediaType::Data,
            other if other.value() > CAP_VIDEO_BASE => MediaType::Video,
            _ => MediaType::Audio,
        }
    }

    pub fn is_gsm(&self) -> bool {
        matches!(
            self,
            CapType::GsmFullRate | CapType::GsmHalfRate | CapType::GsmEnhancedFullRate
        )
    }

    /// Codecs whose descriptors carry a silence-suppression flag
    pub fn supports_silence_suppression(&self) -> bool {
        matches!(self, CapType::G7231 | CapType::G7231C)
    }
}

impl TryFrom<u8> for CapType {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        CapType::ALL
            .iter()
            .copied()
            .find(|c| c.value() == value)
            .ok_or(WireError::UnknownTag { context: "capability", tag: value })
    }
}

impl fmt::Display for CapType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapType::G726 => "G726",
            CapType::G711Alaw64k => "G711ALAW64K",
            CapType::G711Alaw56k => "G711ALAW56K",
            CapType::G711Ulaw64k => "G711ULAW64K",
            CapType::G711Ulaw56k => "G711ULAW56K",
            CapType::G722_64k => "G722_64K",
            CapType::G722_56k => "G722_56K",
            CapType::G722_48k => "G722_48K",
            CapType::G7231 => "G7231",
            CapType::G728 => "G728",
            CapType::G729 => "G729",
            CapType::G729A => "G729A",
            CapType::AmrNb => "AMRNB",
            CapType::G726Aal2 => "G726AAL2",
            CapType::G729B => "G729B",
            CapType::G729AB => "G729AB",
            CapType::G7231C => "G7231C",
            CapType::GsmFullRate => "GSMFULLRATE",
            CapType::GsmHalfRate => "GSMHALFRATE",
            CapType::GsmEnhancedFullRate => "GSMENHANCEDFULLRATE",
            CapType::Speex => "SPEEX",
            CapType::H263Video => "H263VIDEO",
            CapType::T38 => "T38",
        };
        f.write_str(name)
    }
}

/// Broad media family of a capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Audio,
    Video,
    Data,
}

impl MediaType {
    /// Session ID reserved for the first channel of this type
    pub fn default_session_id(&self) -> u8 {
        match self {
            MediaType::Audio => 1,
            MediaType::Video => 2,
            MediaType::Data => 3,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Audio => f.write_str("audio"),
            MediaType::Video => f.write_str("video"),
            MediaType::Data => f.write_str("data"),
        }
    }
}

/// H.263 picture formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum PictureFormat {
    Sqcif = 0,
    Qcif = 1,
    Cif = 2,
    Cif4 = 3,
    Cif16 = 4,
}

impl TryFrom<u8> for PictureFormat {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(PictureFormat::Sqcif),
            1 => Ok(PictureFormat::Qcif),
            2 => Ok(PictureFormat::Cif),
            3 => Ok(PictureFormat::Cif4),
            4 => Ok(PictureFormat::Cif16),
            tag => Err(WireError::UnknownTag { context: "picture format", tag }),
        }
    }
}

/// GSM frames are counted in units of 33 octets
pub const GSM_FRAME_OCTETS: u32 = 33;

/// One capability as advertised by an endpoint or carried in a channel
/// proposal. Audio descriptors carry a single frame count: the receive
/// limit in a capability set, the packetisation in a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaCapability {
    Audio {
        cap: CapType,
        frames: u32,
        silence_suppression: bool,
    },
    Gsm {
        cap: CapType,
        audio_unit_size: u32,
        comfort_noise: bool,
        scrambled: bool,
    },
    H263 {
        format: PictureFormat,
        mpi: u32,
        max_bitrate: u32,
    },
    T38 {
        max_bitrate: u32,
    },
}

const KIND_AUDIO: u8 = 1;
const KIND_GSM: u8 = 2;
const KIND_H263: u8 = 3;
const KIND_T38: u8 = 4;

impl MediaCapability {
    pub fn cap_type(&self) -> CapType {
        match self {
            MediaCapability::Audio { cap, .. } | MediaCapability::Gsm { cap, .. } => *cap,
            MediaCapability::H263 { .. } => CapType::H263Video,
            MediaCapability::T38 { .. } => CapType::T38,
        }
    }

    pub fn media_type(&self) -> MediaType {
        self.cap_type().media_type()
    }

    /// Frame count for audio families (GSM expressed in frames)
    pub fn frames(&self) -> Option<u32> {
        match self {
            MediaCapability::Audio { frames, .. } => Some(*frames),
            MediaCapability::Gsm { audio_unit_size, .. } => Some(audio_unit_size / GSM_FRAME_OCTETS),
            _ => None,
        }
    }

    pub(crate) fn encode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        match self {
            MediaCapability::Audio { cap, frames, silence_suppression } => {
                w.put_u8(1, KIND_AUDIO)?;
                w.put_u8(2, cap.value())?;
                w.put_u32(3, *frames)?;
                w.put_bool(4, *silence_suppression)
            }
            MediaCapability::Gsm { cap, audio_unit_size, comfort_noise, scrambled } => {
                w.put_u8(1, KIND_GSM)?;
                w.put_u8(2, cap.value())?;
                w.put_u32(3, *audio_unit_size)?;
                w.put_bool(5, *comfort_noise)?;
                w.put_bool(6, *scrambled)
            }
            MediaCapability::H263 { format, mpi, max_bitrate } => {
                w.put_u8(1, KIND_H263)?;
                w.put_u8(7, *format as u8)?;
                w.put_u32(8, *mpi)?;
                w.put_u32(9, *max_bitrate)
            }
            MediaCapability::T38 { max_bitrate } => {
                w.put_u8(1, KIND_T38)?;
                w.put_u32(9, *max_bitrate)
            }
        }
    }

    pub(crate) fn decode(value: Bytes) -> Result<Self> {
        let f = FieldMap::decode(value)?;
        let kind = f
            .u8(1)?
            .ok_or_else(|| WireError::decode("capability without kind"))?;
        let cap = || -> Result<CapType> {
            let tag = f.u8(2)?.ok_or_else(|| WireError::decode("capability without codec"))?;
            CapType::try_from(tag)
        };
        match kind {
            KIND_AUDIO => Ok(MediaCapability::Audio {
                cap: cap()?,
                frames: f.u32(3)?.unwrap_or(0),
                silence_suppression: f.bool(4)?,
            }),
            KIND_GSM => Ok(MediaCapability::Gsm {
                cap: cap()?,
                audio_unit_size: f.u32(3)?.unwrap_or(0),
                comfort_noise: f.bool(5)?,
                scrambled: f.bool(6)?,
            }),
            KIND_H263 => Ok(MediaCapability::H263 {
                format: PictureFormat::try_from(
                    f.u8(7)?.ok_or_else(|| WireError::decode("H.263 without picture format"))?,
                )?,
                mpi: f.u32(8)?.unwrap_or(1),
                max_bitrate: f.u32(9)?.unwrap_or(0),
            }),
            KIND_T38 => Ok(MediaCapability::T38 {
                max_bitrate: f.u32(9)?.unwrap_or(0),
            }),
            tag => Err(WireError::UnknownTag { context: "media capability", tag }),
        }
    }
}

/// Direction a capability-set entry applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum CapabilityDirection {
    Receive = 1,
    Transmit = 2,
    ReceiveAndTransmit = 3,
}

impl TryFrom<u8> for CapabilityDirection {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(CapabilityDirection::Receive),
            2 => Ok(CapabilityDirection::Transmit),
            3 => Ok(CapabilityDirection::ReceiveAndTransmit),
            tag => Err(WireError::UnknownTag { context: "capability direction", tag }),
        }
    }
}

/// User-input (DTMF) capabilities advertised in a capability set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserInputCapability {
    /// RFC 2833 telephone events with the given RTP payload type
    Rfc2833 { payload_type: u8 },
    /// Cisco RTP DTMF relay with the given RTP payload type
    Cisco { payload_type: u8 },
    /// H.245 alphanumeric user input
    BasicString,
    /// H.245 signal user input
    Dtmf,
}

impl UserInputCapability {
    fn encode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        match self {
            UserInputCapability::Rfc2833 { payload_type } => {
                w.put_u8(1, 1)?;
                w.put_u8(2, *payload_type)
            }
            UserInputCapability::Cisco { payload_type } => {
                w.put_u8(1, 2)?;
                w.put_u8(2, *payload_type)
            }
            UserInputCapability::BasicString => w.put_u8(1, 3),
            UserInputCapability::Dtmf => w.put_u8(1, 4),
        }
    }

    fn decode(value: Bytes) -> Result<Self> {
        let f = FieldMap::decode(value)?;
        match f.u8(1)? {
            Some(1) => Ok(UserInputCapability::Rfc2833 {
                payload_type: f.u8(2)?.unwrap_or(101),
            }),
            Some(2) => Ok(UserInputCapability::Cisco {
                payload_type: f.u8(2)?.unwrap_or(121),
            }),
            Some(3) => Ok(UserInputCapability::BasicString),
            Some(4) => Ok(UserInputCapability::Dtmf),
            Some(tag) => Err(WireError::UnknownTag { context: "user input capability", tag }),
            None => Err(WireError::decode("user input capability without kind")),
        }
    }
}

/// One entry of a terminal capability set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminalCapability {
    Media {
        direction: CapabilityDirection,
        capability: MediaCapability,
    },
    UserInput(UserInputCapability),
}

impl TerminalCapability {
    pub(crate) fn encode(&self, w: &mut TlvWriter<'_>, tag: u8) -> Result<()> {
        w.put_nested(tag, |inner| match self {
            TerminalCapability::Media { direction, capability } => {
                inner.put_u8(1, *direction as u8)?;
                inner.put_nested(2, |cap| capability.encode(cap))
            }
            TerminalCapability::UserInput(ui) => inner.put_nested(3, |cap| ui.encode(cap)),
        })
    }

    pub(crate) fn decode(value: Bytes) -> Result<Self> {
        let f = FieldMap::decode(value)?;
        if let Some(ui) = f.get(3) {
            return Ok(TerminalCapability::UserInput(UserInputCapability::decode(ui.clone())?));
        }
        let direction = CapabilityDirection::try_from(
            f.u8(1)?
                .ok_or_else(|| WireError::decode("capability entry without direction"))?,
        )?;
        let capability = MediaCapability::decode(f.require(2, "capability")?.clone())?;
        Ok(TerminalCapability::Media { direction, capability })
    }
}
