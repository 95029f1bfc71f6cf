use std::fmt;

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::capability::TerminalCapability;
use super::olc::{OlcRejectCause, OpenLogicalChannel, OpenLogicalChannelAck};
use crate::error::{Result, WireError};
use crate::tlv::{FieldMap, TlvWriter};

/// Outcome reported in a MasterSlaveDeterminationAck, from the receiver's
/// point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MsdDecision {
    Master,
    Slave,
}

/// Who initiated a CloseLogicalChannel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelCloseSource {
    User,
    Lcse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserInput {
    Alphanumeric(String),
    Signal { signal: char, duration: Option<u16> },
}

impl UserInput {
    /// The digits this indication conveys
    pub fn digits(&self) -> String {
        match self {
            UserInput::Alphanumeric(s) => s.clone(),
            UserInput::Signal { signal, .. } => signal.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum H245Message {
    MasterSlaveDetermination {
        terminal_type: u8,
        status_determination_number: u32,
    },
    MasterSlaveDeterminationAck { decision: MsdDecision },
    MasterSlaveDeterminationReject,
    MasterSlaveDeterminationRelease,
    /// `capabilities: None` is the empty capability set
    TerminalCapabilitySet {
        sequence_number: u8,
        capabilities: Option<Vec<TerminalCapability>>,
    },
    TerminalCapabilitySetAck { sequence_number: u8 },
    TerminalCapabilitySetReject { sequence_number: u8 },
    TerminalCapabilitySetRelease,
    OpenLogicalChannel(OpenLogicalChannel),
    OpenLogicalChannelAck(OpenLogicalChannelAck),
    OpenLogicalChannelReject { forward_lcn: u16, cause: OlcRejectCause },
    OpenLogicalChannelConfirm { forward_lcn: u16 },
    CloseLogicalChannel { forward_lcn: u16, source: ChannelCloseSource },
    CloseLogicalChannelAck { forward_lcn: u16 },
    RequestChannelClose { forward_lcn: u16 },
    RequestChannelCloseAck { forward_lcn: u16 },
    RequestChannelCloseReject { forward_lcn: u16 },
    RequestChannelCloseRelease { forward_lcn: u16 },
    RoundTripDelayRequest { sequence_number: u8 },
    RoundTripDelayResponse { sequence_number: u8 },
    EndSessionCommand,
    UserInputIndication(UserInput),
}

/// Discriminant of an [`H245Message`], used to route and log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum H245MessageKind {
    MasterSlaveDetermination = 1,
    MasterSlaveDeterminationAck = 2,
    MasterSlaveDeterminationReject = 3,
    MasterSlaveDeterminationRelease = 4,
    TerminalCapabilitySet = 5,
    TerminalCapabilitySetAck = 6,
    TerminalCapabilitySetReject = 7,
    TerminalCapabilitySetRelease = 8,
    OpenLogicalChannel = 9,
    OpenLogicalChannelAck = 10,
    OpenLogicalChannelReject = 11,
    OpenLogicalChannelConfirm = 12,
    CloseLogicalChannel = 13,
    CloseLogicalChannelAck = 14,
    RequestChannelClose = 15,
    RequestChannelCloseAck = 16,
    RequestChannelCloseReject = 17,
    RequestChannelCloseRelease = 18,
    RoundTripDelayRequest = 19,
    RoundTripDelayResponse = 20,
    EndSessionCommand = 21,
    UserInputIndication = 22,
}

impl fmt::Display for H245MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl H245Message {
    pub fn kind(&self) -> H245MessageKind {
        use H245MessageKind as K;
        match self {
            H245Message::MasterSlaveDetermination { .. } => K::MasterSlaveDetermination,
            H245Message::MasterSlaveDeterminationAck { .. } => K::MasterSlaveDeterminationAck,
            H245Message::MasterSlaveDeterminationReject => K::MasterSlaveDeterminationReject,
            H245Message::MasterSlaveDeterminationRelease => K::MasterSlaveDeterminationRelease,
            H245Message::TerminalCapabilitySet { .. } => K::TerminalCapabilitySet,
            H245Message::TerminalCapabilitySetAck { .. } => K::TerminalCapabilitySetAck,
            H245Message::TerminalCapabilitySetReject { .. } => K::TerminalCapabilitySetReject,
            H245Message::TerminalCapabilitySetRelease => K::TerminalCapabilitySetRelease,
            H245Message::OpenLogicalChannel(_) => K::OpenLogicalChannel,
            H245Message::OpenLogicalChannelAck(_) => K::OpenLogicalChannelAck,
            H245Message::OpenLogicalChannelReject { .. } => K::OpenLogicalChannelReject,
            H245Message::OpenLogicalChannelConfirm { .. } => K::OpenLogicalChannelConfirm,
            H245Message::CloseLogicalChannel { .. } => K::CloseLogicalChannel,
            H245Message::CloseLogicalChannelAck { .. } => K::CloseLogicalChannelAck,
            H245Message::RequestChannelClose { .. } => K::RequestChannelClose,
            H245Message::RequestChannelCloseAck { .. } => K::RequestChannelCloseAck,
            H245Message::RequestChannelCloseReject { .. } => K::RequestChannelCloseReject,
            H245Message::RequestChannelCloseRelease { .. } => K::RequestChannelCloseRelease,
            H245Message::RoundTripDelayRequest { .. } => K::RoundTripDelayRequest,
            H245Message::RoundTripDelayResponse { .. } => K::RoundTripDelayResponse,
            H245Message::EndSessionCommand => K::EndSessionCommand,
            H245Message::UserInputIndication(_) => K::UserInputIndication,
        }
    }

    /// Logical channel the message refers to, if any
    pub fn logical_channel(&self) -> Option<u16> {
        match self {
            H245Message::OpenLogicalChannel(olc) => Some(olc.forward_lcn),
            H245Message::OpenLogicalChannelAck(ack) => Some(ack.forward_lcn),
            H245Message::OpenLogicalChannelReject { forward_lcn, .. }
            | H245Message::OpenLogicalChannelConfirm { forward_lcn }
            | H245Message::CloseLogicalChannel { forward_lcn, .. }
            | H245Message::CloseLogicalChannelAck { forward_lcn }
            | H245Message::RequestChannelClose { forward_lcn }
            | H245Message::RequestChannelCloseAck { forward_lcn }
            | H245Message::RequestChannelCloseReject { forward_lcn }
            | H245Message::RequestChannelCloseRelease { forward_lcn } => Some(*forward_lcn),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(64);
        let mut w = TlvWriter::new(&mut buf);
        w.put_u8(1, self.kind() as u8)?;
        match self {
            H245Message::MasterSlaveDetermination { terminal_type, status_determination_number } => {
                w.put_u8(2, *terminal_type)?;
                w.put_u32(3, *status_determination_number)?;
            }
            H245Message::MasterSlaveDeterminationAck { decision } => {
                w.put_bool(2, *decision == MsdDecision::Master)?;
            }
            H245Message::TerminalCapabilitySet { sequence_number, capabilities } => {
                w.put_u8(2, *sequence_number)?;
                if let Some(caps) = capabilities {
                    w.put_bool(3, true)?;
                    for cap in caps {
                        cap.encode(&mut w, 4)?;
                    }
                }
            }
            H245Message::TerminalCapabilitySetAck { sequence_number }
            | H245Message::TerminalCapabilitySetReject { sequence_number }
            | H245Message::RoundTripDelayRequest { sequence_number }
            | H245Message::RoundTripDelayResponse { sequence_number } => {
                w.put_u8(2, *sequence_number)?;
            }
            H245Message::OpenLogicalChannel(olc) => {
                w.put_nested(2, |inner| olc.encode_fields(inner))?;
            }
            H245Message::OpenLogicalChannelAck(ack) => {
                w.put_nested(2, |inner| ack.encode_fields(inner))?;
            }
            H245Message::OpenLogicalChannelReject { forward_lcn, cause } => {
                w.put_u16(2, *forward_lcn)?;
                w.put_u8(3, *cause as u8)?;
            }
            H245Message::CloseLogicalChannel { forward_lcn, source } => {
                w.put_u16(2, *forward_lcn)?;
                w.put_bool(3, *source == ChannelCloseSource::Lcse)?;
            }
            H245Message::OpenLogicalChannelConfirm { forward_lcn }
            | H245Message::CloseLogicalChannelAck { forward_lcn }
            | H245Message::RequestChannelClose { forward_lcn }
            | H245Message::RequestChannelCloseAck { forward_lcn }
            | H245Message::RequestChannelCloseReject { forward_lcn }
            | H245Message::RequestChannelCloseRelease { forward_lcn } => {
                w.put_u16(2, *forward_lcn)?;
            }
            H245Message::UserInputIndication(input) => match input {
                UserInput::Alphanumeric(text) => w.put_str(2, text)?,
                UserInput::Signal { signal, duration } => {
                    w.put_str(3, &signal.to_string())?;
                    if let Some(duration) = duration {
                        w.put_u16(4, *duration)?;
                    }
                }
            },
            H245Message::MasterSlaveDeterminationReject
            | H245Message::MasterSlaveDeterminationRelease
            | H245Message::TerminalCapabilitySetRelease
            | H245Message::EndSessionCommand => {}
        }
        Ok(buf.freeze())
    }

    pub fn decode(data: Bytes) -> Result<Self> {
        let f = FieldMap::decode(data)?;
        let kind = f.u8(1)?.ok_or_else(|| WireError::decode("H.245 message without kind"))?;
        let lcn = |f: &FieldMap| -> Result<u16> {
            f.u16(2)?
                .ok_or_else(|| WireError::decode("H.245 message without channel number"))
        };
        let seq = |f: &FieldMap| -> Result<u8> { Ok(f.u8(2)?.unwrap_or(0)) };

        let msg = match kind {
            1 => H245Message::MasterSlaveDetermination {
                terminal_type: f.u8(2)?.unwrap_or(0),
                status_determination_number: f.u32(3)?.unwrap_or(0),
            },
            2 => H245Message::MasterSlaveDeterminationAck {
                decision: if f.bool(2)? { MsdDecision::Master } else { MsdDecision::Slave },
            },
            3 => H245Message::MasterSlaveDeterminationReject,
            4 => H245Message::MasterSlaveDeterminationRelease,
            5 => {
                let capabilities = if f.bool(3)? {
                    Some(
                        f.all(4)
                            .map(|v| TerminalCapability::decode(v.clone()))
                            .collect::<Result<Vec<_>>>()?,
                    )
                } else {
                    None
                };
                H245Message::TerminalCapabilitySet { sequence_number: seq(&f)?, capabilities }
            }
            6 => H245Message::TerminalCapabilitySetAck { sequence_number: seq(&f)? },
            7 => H245Message::TerminalCapabilitySetReject { sequence_number: seq(&f)? },
            8 => H245Message::TerminalCapabilitySetRelease,
            9 => H245Message::OpenLogicalChannel(OpenLogicalChannel::decode_fields(
                &FieldMap::decode(f.require(2, "open logical channel")?.clone())?,
            )?),
            10 => H245Message::OpenLogicalChannelAck(OpenLogicalChannelAck::decode_fields(
                &FieldMap::decode(f.require(2, "open logical channel ack")?.clone())?,
            )?),
            11 => H245Message::OpenLogicalChannelReject {
                forward_lcn: lcn(&f)?,
                cause: OlcRejectCause::from(f.u8(3)?.unwrap_or(0)),
            },
            12 => H245Message::OpenLogicalChannelConfirm { forward_lcn: lcn(&f)? },
            13 => H245Message::CloseLogicalChannel {
                forward_lcn: lcn(&f)?,
                source: if f.bool(3)? { ChannelCloseSource::Lcse } else { ChannelCloseSource::User },
            },
            14 => H245Message::CloseLogicalChannelAck { forward_lcn: lcn(&f)? },
            15 => H245Message::RequestChannelClose { forward_lcn: lcn(&f)? },
            16 => H245Message::RequestChannelCloseAck { forward_lcn: lcn(&f)? },
            17 => H245Message::RequestChannelCloseReject { forward_lcn: lcn(&f)? },
            18 => H245Message::RequestChannelCloseRelease { forward_lcn: lcn(&f)? },
            19 => H245Message::RoundTripDelayRequest { sequence_number: seq(&f)? },
            20 => H245Message::RoundTripDelayResponse { sequence_number: seq(&f)? },
            21 => H245Message::EndSessionCommand,
            22 => {
                let input = if let Some(text) = f.string(2)? {
                    UserInput::Alphanumeric(text)
                } else {
                    let signal = f
                        .string(3)?
                        .and_then(|s| s.chars().next())
                        .ok_or_else(|| WireError::decode("user input without content"))?;
                    UserInput::Signal { signal, duration: f.u16(4)? }
                };
                H245Message::UserInputIndication(input)
            }
            tag => return Err(WireError::UnknownTag { context: "H.245 message", tag }),
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::h245::capability::{CapType, CapabilityDirection, MediaCapability, UserInputCapability};

    #[test]
    fn test_empty_capability_set_distinct() {
        let empty = H245Message::TerminalCapabilitySet { sequence_number: 3, capabilities: None };
        let decoded = H245Message::decode(empty.encode().unwrap()).unwrap();
        assert_eq!(decoded, empty);

        let none_listed = H245Message::TerminalCapabilitySet {
            sequence_number: 3,
            capabilities: Some(Vec::new()),
        };
        assert_eq!(H245Message::decode(none_listed.encode().unwrap()).unwrap(), none_listed);
    }

    #[test]
    fn test_capability_set_order() {
        let caps = vec![
            TerminalCapability::Media {
                direction: CapabilityDirection::Receive,
                capability: MediaCapability::Audio {
                    cap: CapType::G711Ulaw64k,
                    frames: 240,
                    silence_suppression: false,
                },
            },
            TerminalCapability::Media {
                direction: CapabilityDirection::Transmit,
                capability: MediaCapability::Audio {
                    cap: CapType::G729A,
                    frames: 2,
                    silence_suppression: false,
                },
            },
            TerminalCapability::UserInput(UserInputCapability::Rfc2833 { payload_type: 101 }),
        ];
        let tcs = H245Message::TerminalCapabilitySet { sequence_number: 1, capabilities: Some(caps) };
        assert_eq!(H245Message::decode(tcs.encode().unwrap()).unwrap(), tcs);
    }

    #[test]
    fn test_logical_channel_accessor() {
        let msg = H245Message::CloseLogicalChannel { forward_lcn: 1002, source: ChannelCloseSource::User };
        assert_eq!(msg.logical_channel(), Some(1002));
        assert_eq!(msg.kind(), H245MessageKind::CloseLogicalChannel);
        assert_eq!(H245Message::EndSessionCommand.logical_channel(), None);
    }

    #[test]
    fn test_user_input_signal() {
        let msg = H245Message::UserInputIndication(UserInput::Signal { signal: '#', duration: Some(100) });
        let decoded = H245Message::decode(msg.encode().unwrap()).unwrap();
        assert_eq!(decoded, msg);
        if let H245Message::UserInputIndication(input) = decoded {
            assert_eq!(input.digits(), "#");
        }
    }

    #[test]
    fn test_unknown_kind() {
        let mut buf = BytesMut::new();
        TlvWriter::new(&mut buf).put_u8(1, 99).unwrap();
        assert!(matches!(
            H245Message::decode(buf.freeze()),
            Err(WireError::UnknownTag { tag: 99, .. })
        ));
    }
}
