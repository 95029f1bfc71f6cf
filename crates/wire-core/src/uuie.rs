//! H.225 user-user information carried in the Q.931 User-User element
//!
//! The PDU names the message body, holds the H.245 tunneling flag and any
//! tunneled H.245 PDUs. Bodies share one field numbering so a single
//! collector decodes all of them.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::address::{AliasAddress, TransportAddress, decode_address, encode_address};
use crate::cause::ReleaseCompleteReason;
use crate::error::{Result, WireError};
use crate::identifiers::{CallIdentifier, ConferenceIdentifier};
use crate::tlv::{FieldMap, TlvWriter, read_string};

/// H.225 version 4 protocol identifier
pub const H225_PROTOCOL_IDENTIFIER: &str = "0.0.8.2250.0.4";

mod pdu_tag {
    pub const KIND: u8 = 1;
    pub const BODY: u8 = 2;
    pub const TUNNELING: u8 = 3;
    pub const CONTROL: u8 = 4;
}

mod field {
    pub const PROTOCOL_IDENTIFIER: u8 = 1;
    pub const CALL_IDENTIFIER: u8 = 2;
    pub const CONFERENCE_ID: u8 = 3;
    pub const H245_ADDRESS: u8 = 4;
    pub const FAST_START: u8 = 5;
    pub const ENDPOINT_INFO: u8 = 6;
    pub const SOURCE_ALIAS: u8 = 7;
    pub const DESTINATION_ALIAS: u8 = 8;
    pub const SOURCE_SIGNAL_ADDRESS: u8 = 9;
    pub const DESTINATION_SIGNAL_ADDRESS: u8 = 10;
    pub const ACTIVE_MC: u8 = 11;
    pub const CONFERENCE_GOAL: u8 = 12;
    pub const MEDIA_WAIT_FOR_CONNECT: u8 = 13;
    pub const CAN_OVERLAP_SEND: u8 = 14;
    pub const RELEASE_REASON: u8 = 15;
    pub const FACILITY_REASON: u8 = 16;
    pub const ALTERNATIVE_ADDRESS: u8 = 17;
    pub const ALTERNATIVE_ALIAS: u8 = 18;
}

/// What kind of H.323 entity sent the message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum EndpointKind {
    Terminal = 0,
    Gateway = 1,
    Gatekeeper = 2,
    Mcu = 3,
}

impl From<u8> for EndpointKind {
    fn from(value: u8) -> Self {
        match value {
            1 => EndpointKind::Gateway,
            2 => EndpointKind::Gatekeeper,
            3 => EndpointKind::Mcu,
            _ => EndpointKind::Terminal,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorInfo {
    pub product_id: String,
    pub version_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInfo {
    pub kind: EndpointKind,
    pub vendor: Option<VendorInfo>,
}

impl EndpointInfo {
    fn encode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        w.put_nested(field::ENDPOINT_INFO, |inner| {
            inner.put_u8(1, self.kind as u8)?;
            if let Some(vendor) = &self.vendor {
                inner.put_str(2, &vendor.product_id)?;
                inner.put_str(3, &vendor.version_id)?;
            }
            Ok(())
        })
    }

    fn decode(value: Bytes) -> Result<Self> {
        let f = FieldMap::decode(value)?;
        let vendor = match (f.string(2)?, f.string(3)?) {
            (Some(product_id), Some(version_id)) => Some(VendorInfo { product_id, version_id }),
            _ => None,
        };
        Ok(Self {
            kind: EndpointKind::from(f.u8(1)?.unwrap_or(0)),
            vendor,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConferenceGoal {
    #[default]
    Create = 0,
    Join = 1,
    Invite = 2,
}

impl From<u8> for ConferenceGoal {
    fn from(value: u8) -> Self {
        match value {
            1 => ConferenceGoal::Join,
            2 => ConferenceGoal::Invite,
            _ => ConferenceGoal::Create,
        }
    }
}

/// Reason carried by a Facility message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum FacilityReason {
    RouteCallToGatekeeper = 0,
    CallForwarded = 1,
    RouteCallToMc = 2,
    UndefinedReason = 3,
    ConferenceListChoice = 4,
    StartH245 = 5,
    NoH245 = 6,
    NewTokens = 7,
    FeatureSetUpdate = 8,
    ForwardedElements = 9,
    TransportedInformation = 10,
}

impl From<u8> for FacilityReason {
    fn from(value: u8) -> Self {
        match value {
            0 => FacilityReason::RouteCallToGatekeeper,
            1 => FacilityReason::CallForwarded,
            2 => FacilityReason::RouteCallToMc,
            4 => FacilityReason::ConferenceListChoice,
            5 => FacilityReason::StartH245,
            6 => FacilityReason::NoH245,
            7 => FacilityReason::NewTokens,
            8 => FacilityReason::FeatureSetUpdate,
            9 => FacilityReason::ForwardedElements,
            10 => FacilityReason::TransportedInformation,
            _ => FacilityReason::UndefinedReason,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupUuie {
    pub protocol_identifier: String,
    pub call_identifier: CallIdentifier,
    pub conference_id: ConferenceIdentifier,
    pub conference_goal: ConferenceGoal,
    pub source_info: EndpointInfo,
    pub source_aliases: Vec<AliasAddress>,
    pub destination_aliases: Vec<AliasAddress>,
    pub source_call_signal_address: Option<TransportAddress>,
    pub destination_call_signal_address: Option<TransportAddress>,
    pub h245_address: Option<TransportAddress>,
    pub fast_start: Vec<Bytes>,
    pub active_mc: bool,
    pub media_wait_for_connect: bool,
    pub can_overlap_send: bool,
}

/// Body shared by CallProceeding, Alerting and Progress
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUuie {
    pub protocol_identifier: String,
    pub call_identifier: Option<CallIdentifier>,
    pub destination_info: Option<EndpointInfo>,
    pub h245_address: Option<TransportAddress>,
    pub fast_start: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectUuie {
    pub protocol_identifier: String,
    pub call_identifier: Option<CallIdentifier>,
    pub conference_id: ConferenceIdentifier,
    pub destination_info: Option<EndpointInfo>,
    pub h245_address: Option<TransportAddress>,
    pub fast_start: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityUuie {
    pub protocol_identifier: String,
    pub call_identifier: Option<CallIdentifier>,
    pub conference_id: Option<ConferenceIdentifier>,
    pub reason: FacilityReason,
    pub alternative_address: Option<TransportAddress>,
    pub alternative_aliases: Vec<AliasAddress>,
    pub h245_address: Option<TransportAddress>,
    pub fast_start: Vec<Bytes>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UuieBody {
    Setup(SetupUuie),
    CallProceeding(ProgressUuie),
    Connect(ConnectUuie),
    Alerting(ProgressUuie),
    Information {
        protocol_identifier: String,
        call_identifier: Option<CallIdentifier>,
    },
    ReleaseComplete {
        protocol_identifier: String,
        call_identifier: Option<CallIdentifier>,
        reason: Option<ReleaseCompleteReason>,
    },
    Facility(FacilityUuie),
    Progress(ProgressUuie),
    /// Carries only tunneled H.245 or nothing at all
    Empty,
}

impl UuieBody {
    fn kind(&self) -> u8 {
        match self {
            UuieBody::Setup(_) => 0,
            UuieBody::CallProceeding(_) => 1,
            UuieBody::Connect(_) => 2,
            UuieBody::Alerting(_) => 3,
            UuieBody::Information { .. } => 4,
            UuieBody::ReleaseComplete { .. } => 5,
            UuieBody::Facility(_) => 6,
            UuieBody::Progress(_) => 7,
            UuieBody::Empty => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UuieBody::Setup(_) => "setup",
            UuieBody::CallProceeding(_) => "callProceeding",
            UuieBody::Connect(_) => "connect",
            UuieBody::Alerting(_) => "alerting",
            UuieBody::Information { .. } => "information",
            UuieBody::ReleaseComplete { .. } => "releaseComplete",
            UuieBody::Facility(_) => "facility",
            UuieBody::Progress(_) => "progress",
            UuieBody::Empty => "empty",
        }
    }

    pub fn fast_start(&self) -> &[Bytes] {
        match self {
            UuieBody::Setup(b) => &b.fast_start,
            UuieBody::CallProceeding(b) | UuieBody::Alerting(b) | UuieBody::Progress(b) => {
                &b.fast_start
            }
            UuieBody::Connect(b) => &b.fast_start,
            UuieBody::Facility(b) => &b.fast_start,
            _ => &[],
        }
    }

    pub fn h245_address(&self) -> Option<TransportAddress> {
        match self {
            UuieBody::Setup(b) => b.h245_address,
            UuieBody::CallProceeding(b) | UuieBody::Alerting(b) | UuieBody::Progress(b) => {
                b.h245_address
            }
            UuieBody::Connect(b) => b.h245_address,
            UuieBody::Facility(b) => b.h245_address,
            _ => None,
        }
    }

    pub fn call_identifier(&self) -> Option<CallIdentifier> {
        match self {
            UuieBody::Setup(b) => Some(b.call_identifier),
            UuieBody::CallProceeding(b) | UuieBody::Alerting(b) | UuieBody::Progress(b) => {
                b.call_identifier
            }
            UuieBody::Connect(b) => b.call_identifier,
            UuieBody::Facility(b) => b.call_identifier,
            UuieBody::Information { call_identifier, .. }
            | UuieBody::ReleaseComplete { call_identifier, .. } => *call_identifier,
            UuieBody::Empty => None,
        }
    }

    fn encode(&self, w: &mut TlvWriter<'_>) -> Result<()> {
        match self {
            UuieBody::Setup(b) => {
                w.put_str(field::PROTOCOL_IDENTIFIER, &b.protocol_identifier)?;
                w.put_bytes(field::CALL_IDENTIFIER, b.call_identifier.as_bytes())?;
                w.put_bytes(field::CONFERENCE_ID, b.conference_id.as_bytes())?;
                w.put_u8(field::CONFERENCE_GOAL, b.conference_goal as u8)?;
                b.source_info.encode(w)?;
                for alias in &b.source_aliases {
                    alias.encode(w, field::SOURCE_ALIAS)?;
                }
                for alias in &b.destination_aliases {
                    alias.encode(w, field::DESTINATION_ALIAS)?;
                }
                if let Some(addr) = &b.source_call_signal_address {
                    encode_address(w, field::SOURCE_SIGNAL_ADDRESS, addr)?;
                }
                if let Some(addr) = &b.destination_call_signal_address {
                    encode_address(w, field::DESTINATION_SIGNAL_ADDRESS, addr)?;
                }
                encode_h245_and_fast_start(w, b.h245_address.as_ref(), &b.fast_start)?;
                w.put_bool(field::ACTIVE_MC, b.active_mc)?;
                w.put_bool(field::MEDIA_WAIT_FOR_CONNECT, b.media_wait_for_connect)?;
                w.put_bool(field::CAN_OVERLAP_SEND, b.can_overlap_send)
            }
            UuieBody::CallProceeding(b) | UuieBody::Alerting(b) | UuieBody::Progress(b) => {
                w.put_str(field::PROTOCOL_IDENTIFIER, &b.protocol_identifier)?;
                encode_call_identifier(w, b.call_identifier.as_ref())?;
                if let Some(info) = &b.destination_info {
                    info.encode(w)?;
                }
                encode_h245_and_fast_start(w, b.h245_address.as_ref(), &b.fast_start)
            }
            UuieBody::Connect(b) => {
                w.put_str(field::PROTOCOL_IDENTIFIER, &b.protocol_identifier)?;
                encode_call_identifier(w, b.call_identifier.as_ref())?;
                w.put_bytes(field::CONFERENCE_ID, b.conference_id.as_bytes())?;
                if let Some(info) = &b.destination_info {
                    info.encode(w)?;
                }
                encode_h245_and_fast_start(w, b.h245_address.as_ref(), &b.fast_start)
            }
            UuieBody::Information { protocol_identifier, call_identifier } => {
                w.put_str(field::PROTOCOL_IDENTIFIER, protocol_identifier)?;
                encode_call_identifier(w, call_identifier.as_ref())
            }
            UuieBody::ReleaseComplete { protocol_identifier, call_identifier, reason } => {
                w.put_str(field::PROTOCOL_IDENTIFIER, protocol_identifier)?;
                encode_call_identifier(w, call_identifier.as_ref())?;
                if let Some(reason) = reason {
                    w.put_u8(field::RELEASE_REASON, reason.index())?;
                }
                Ok(())
            }
            UuieBody::Facility(b) => {
                w.put_str(field::PROTOCOL_IDENTIFIER, &b.protocol_identifier)?;
                encode_call_identifier(w, b.call_identifier.as_ref())?;
                if let Some(conf) = &b.conference_id {
                    w.put_bytes(field::CONFERENCE_ID, conf.as_bytes())?;
                }
                w.put_u8(field::FACILITY_REASON, b.reason as u8)?;
                if let Some(addr) = &b.alternative_address {
                    encode_address(w, field::ALTERNATIVE_ADDRESS, addr)?;
                }
                for alias in &b.alternative_aliases {
                    alias.encode(w, field::ALTERNATIVE_ALIAS)?;
                }
                encode_h245_and_fast_start(w, b.h245_address.as_ref(), &b.fast_start)
            }
            UuieBody::Empty => Ok(()),
        }
    }

    fn decode(kind: u8, value: Bytes) -> Result<Self> {
        let f = BodyFields::collect(value)?;
        let body = match kind {
            0 => UuieBody::Setup(SetupUuie {
                protocol_identifier: f.protocol_identifier()?,
                call_identifier: f
                    .call_identifier
                    .ok_or_else(|| WireError::decode("setup without call identifier"))?,
                conference_id: f
                    .conference_id
                    .ok_or_else(|| WireError::decode("setup without conference identifier"))?,
                conference_goal: f.conference_goal,
                source_info: f.endpoint_info.unwrap_or(EndpointInfo {
                    kind: EndpointKind::Terminal,
                    vendor: None,
                }),
                source_aliases: f.source_aliases,
                destination_aliases: f.destination_aliases,
                source_call_signal_address: f.source_signal_address,
                destination_call_signal_address: f.destination_signal_address,
                h245_address: f.h245_address,
                fast_start: f.fast_start,
                active_mc: f.active_mc,
                media_wait_for_connect: f.media_wait_for_connect,
                can_overlap_send: f.can_overlap_send,
            }),
            1 | 3 | 7 => {
                let body = ProgressUuie {
                    protocol_identifier: f.protocol_identifier()?,
                    call_identifier: f.call_identifier,
                    destination_info: f.endpoint_info,
                    h245_address: f.h245_address,
                    fast_start: f.fast_start,
                };
                match kind {
                    1 => UuieBody::CallProceeding(body),
                    3 => UuieBody::Alerting(body),
                    _ => UuieBody::Progress(body),
                }
            }
            2 => UuieBody::Connect(ConnectUuie {
                protocol_identifier: f.protocol_identifier()?,
                call_identifier: f.call_identifier,
                conference_id: f.conference_id.unwrap_or_default(),
                destination_info: f.endpoint_info,
                h245_address: f.h245_address,
                fast_start: f.fast_start,
            }),
            4 => UuieBody::Information {
                protocol_identifier: f.protocol_identifier()?,
                call_identifier: f.call_identifier,
            },
            5 => UuieBody::ReleaseComplete {
                protocol_identifier: f.protocol_identifier()?,
                call_identifier: f.call_identifier,
                reason: f.release_reason,
            },
            6 => UuieBody::Facility(FacilityUuie {
                protocol_identifier: f.protocol_identifier()?,
                call_identifier: f.call_identifier,
                conference_id: f.conference_id,
                reason: f.facility_reason.unwrap_or(FacilityReason::UndefinedReason),
                alternative_address: f.alternative_address,
                alternative_aliases: f.alternative_aliases,
                h245_address: f.h245_address,
                fast_start: f.fast_start,
            }),
            8 => UuieBody::Empty,
            tag => return Err(WireError::UnknownTag { context: "h323-uu-pdu body", tag }),
        };
        Ok(body)
    }
}

fn encode_call_identifier(w: &mut TlvWriter<'_>, id: Option<&CallIdentifier>) -> Result<()> {
    match id {
        Some(id) => w.put_bytes(field::CALL_IDENTIFIER, id.as_bytes()),
        None => Ok(()),
    }
}

fn encode_h245_and_fast_start(
    w: &mut TlvWriter<'_>,
    h245_address: Option<&TransportAddress>,
    fast_start: &[Bytes],
) -> Result<()> {
    if let Some(addr) = h245_address {
        encode_address(w, field::H245_ADDRESS, addr)?;
    }
    for olc in fast_start {
        w.put_bytes(field::FAST_START, olc)?;
    }
    Ok(())
}

/// Every body field, decoded once
#[derive(Default)]
struct BodyFields {
    protocol_identifier: Option<String>,
    call_identifier: Option<CallIdentifier>,
    conference_id: Option<ConferenceIdentifier>,
    h245_address: Option<TransportAddress>,
    fast_start: Vec<Bytes>,
    endpoint_info: Option<EndpointInfo>,
    source_aliases: Vec<AliasAddress>,
    destination_aliases: Vec<AliasAddress>,
    source_signal_address: Option<TransportAddress>,
    destination_signal_address: Option<TransportAddress>,
    active_mc: bool,
    conference_goal: ConferenceGoal,
    media_wait_for_connect: bool,
    can_overlap_send: bool,
    release_reason: Option<ReleaseCompleteReason>,
    facility_reason: Option<FacilityReason>,
    alternative_address: Option<TransportAddress>,
    alternative_aliases: Vec<AliasAddress>,
}

impl BodyFields {
    fn collect(value: Bytes) -> Result<Self> {
        let map = FieldMap::decode(value)?;
        let mut f = BodyFields {
            protocol_identifier: map.get(field::PROTOCOL_IDENTIFIER).map(read_string).transpose()?,
            call_identifier: map
                .get(field::CALL_IDENTIFIER)
                .map(CallIdentifier::from_field)
                .transpose()?,
            conference_id: map
                .get(field::CONFERENCE_ID)
                .map(ConferenceIdentifier::from_field)
                .transpose()?,
            h245_address: map.get(field::H245_ADDRESS).map(decode_address).transpose()?,
            fast_start: map.all(field::FAST_START).cloned().collect(),
            endpoint_info: map
                .get(field::ENDPOINT_INFO)
                .map(|v| EndpointInfo::decode(v.clone()))
                .transpose()?,
            source_signal_address: map
                .get(field::SOURCE_SIGNAL_ADDRESS)
                .map(decode_address)
                .transpose()?,
            destination_signal_address: map
                .get(field::DESTINATION_SIGNAL_ADDRESS)
                .map(decode_address)
                .transpose()?,
            active_mc: map.bool(field::ACTIVE_MC)?,
            conference_goal: ConferenceGoal::from(map.u8(field::CONFERENCE_GOAL)?.unwrap_or(0)),
            media_wait_for_connect: map.bool(field::MEDIA_WAIT_FOR_CONNECT)?,
            can_overlap_send: map.bool(field::CAN_OVERLAP_SEND)?,
            release_reason: map.u8(field::RELEASE_REASON)?.map(ReleaseCompleteReason::from),
            facility_reason: map.u8(field::FACILITY_REASON)?.map(FacilityReason::from),
            alternative_address: map
                .get(field::ALTERNATIVE_ADDRESS)
                .map(decode_address)
                .transpose()?,
            ..Default::default()
        };
        f.source_aliases = decode_aliases(&map, field::SOURCE_ALIAS)?;
        f.destination_aliases = decode_aliases(&map, field::DESTINATION_ALIAS)?;
        f.alternative_aliases = decode_aliases(&map, field::ALTERNATIVE_ALIAS)?;
        Ok(f)
    }

    fn protocol_identifier(&self) -> Result<String> {
        self.protocol_identifier
            .clone()
            .ok_or_else(|| WireError::decode("missing protocol identifier"))
    }
}

fn decode_aliases(map: &FieldMap, tag: u8) -> Result<Vec<AliasAddress>> {
    map.all(tag).map(|v| AliasAddress::decode(v.clone())).collect()
}

/// The H323-UU-PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUserPdu {
    pub body: UuieBody,
    pub h245_tunneling: bool,
    /// Tunneled H.245 PDUs, in order
    pub h245_control: Vec<Bytes>,
}

impl UserUserPdu {
    pub fn new(body: UuieBody) -> Self {
        Self {
            body,
            h245_tunneling: false,
            h245_control: Vec::new(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut buf = BytesMut::with_capacity(128);
        let mut w = TlvWriter::new(&mut buf);
        w.put_u8(pdu_tag::KIND, self.body.kind())?;
        w.put_nested(pdu_tag::BODY, |inner| self.body.encode(inner))?;
        w.put_bool(pdu_tag::TUNNELING, self.h245_tunneling)?;
        for pdu in &self.h245_control {
            w.put_bytes(pdu_tag::CONTROL, pdu)?;
        }
        Ok(buf.freeze())
    }

    pub fn decode(data: Bytes) -> Result<Self> {
        let map = FieldMap::decode(data)?;
        let kind = map
            .u8(pdu_tag::KIND)?
            .ok_or_else(|| WireError::decode("h323-uu-pdu without body kind"))?;
        let body = UuieBody::decode(kind, map.get(pdu_tag::BODY).cloned().unwrap_or_default())?;
        Ok(Self {
            body,
            h245_tunneling: map.bool(pdu_tag::TUNNELING)?,
            h245_control: map.all(pdu_tag::CONTROL).cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn setup() -> SetupUuie {
        SetupUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: CallIdentifier([1u8; 16]),
            conference_id: ConferenceIdentifier([2u8; 16]),
            conference_goal: ConferenceGoal::Create,
            source_info: EndpointInfo {
                kind: EndpointKind::Gateway,
                vendor: Some(VendorInfo {
                    product_id: "h323".into(),
                    version_id: "0.1.0".into(),
                }),
            },
            source_aliases: vec![AliasAddress::h323_id("alice")],
            destination_aliases: vec![AliasAddress::h323_id("support"), AliasAddress::dialed_digits("100")],
            source_call_signal_address: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 1), 1720)),
            destination_call_signal_address: None,
            h245_address: None,
            fast_start: vec![Bytes::from_static(b"olc-1"), Bytes::from_static(b"olc-2")],
            active_mc: false,
            media_wait_for_connect: false,
            can_overlap_send: false,
        }
    }

    #[test]
    fn test_setup_identifiers_verbatim() {
        let mut pdu = UserUserPdu::new(UuieBody::Setup(setup()));
        pdu.h245_tunneling = true;
        let decoded = UserUserPdu::decode(pdu.encode().unwrap()).unwrap();
        assert_eq!(decoded, pdu);
        assert_eq!(decoded.body.call_identifier(), Some(CallIdentifier([1u8; 16])));
        assert_eq!(decoded.body.fast_start().len(), 2);
    }

    #[test]
    fn test_setup_requires_call_identifier() {
        let mut buf = BytesMut::new();
        let mut w = TlvWriter::new(&mut buf);
        w.put_u8(pdu_tag::KIND, 0).unwrap();
        w.put_nested(pdu_tag::BODY, |inner| inner.put_str(field::PROTOCOL_IDENTIFIER, H225_PROTOCOL_IDENTIFIER))
            .unwrap();
        assert!(UserUserPdu::decode(buf.freeze()).is_err());
    }

    #[test]
    fn test_unknown_body_kind() {
        let mut buf = BytesMut::new();
        TlvWriter::new(&mut buf).put_u8(pdu_tag::KIND, 42).unwrap();
        assert_eq!(
            UserUserPdu::decode(buf.freeze()),
            Err(WireError::UnknownTag { context: "h323-uu-pdu body", tag: 42 })
        );
    }

    #[test]
    fn test_facility_forward_fields() {
        let body = UuieBody::Facility(FacilityUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(CallIdentifier([9u8; 16])),
            conference_id: None,
            reason: FacilityReason::CallForwarded,
            alternative_address: Some(TransportAddress::new(Ipv4Addr::new(192, 168, 1, 5), 1720)),
            alternative_aliases: vec![AliasAddress::dialed_digits("200")],
            h245_address: None,
            fast_start: Vec::new(),
        });
        let pdu = UserUserPdu::new(body);
        assert_eq!(UserUserPdu::decode(pdu.encode().unwrap()).unwrap(), pdu);
    }

    #[test]
    fn test_tunneled_control_order() {
        let mut pdu = UserUserPdu::new(UuieBody::Empty);
        pdu.h245_tunneling = true;
        pdu.h245_control = vec![Bytes::from_static(b"first"), Bytes::from_static(b"second")];
        let decoded = UserUserPdu::decode(pdu.encode().unwrap()).unwrap();
        assert_eq!(decoded.h245_control, pdu.h245_control);
    }
}
