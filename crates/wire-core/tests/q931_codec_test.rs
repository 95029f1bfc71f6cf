//! Q.931 / H.225 codec tests over complete messages

use std::net::Ipv4Addr;

use bytes::{Bytes, BytesMut};
use h323_wire_core::h245::{
    CapType, DataType, H2250Parameters, LogicalChannelParameters, MediaCapability,
    OlcDirection, OpenLogicalChannel,
};
use h323_wire_core::q931::{BearerCapability, CauseIe, ie_code};
use h323_wire_core::uuie::{
    ConferenceGoal, EndpointInfo, EndpointKind, H225_PROTOCOL_IDENTIFIER, SetupUuie,
};
use h323_wire_core::{
    AliasAddress, CallIdentifier, ConferenceIdentifier, MessageType, Q931Cause, Q931Message,
    TransportAddress, UserUserPdu, UuieBody, WireError, tpkt,
};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn fast_start_offer() -> Vec<Bytes> {
    let ulaw = DataType::Media(MediaCapability::Audio {
        cap: CapType::G711Ulaw64k,
        frames: 20,
        silence_suppression: false,
    });
    let rtcp = TransportAddress::new(Ipv4Addr::new(10, 0, 0, 1), 10001);
    let transmit = OpenLogicalChannel {
        forward_lcn: 1001,
        forward: LogicalChannelParameters {
            data_type: ulaw.clone(),
            h2250: Some(H2250Parameters {
                session_id: 1,
                media_channel: None,
                media_control_channel: Some(rtcp),
                dynamic_payload_type: None,
            }),
        },
        reverse: None,
    };
    let receive = OpenLogicalChannel {
        forward_lcn: 1002,
        forward: LogicalChannelParameters::null(),
        reverse: Some(LogicalChannelParameters {
            data_type: ulaw,
            h2250: Some(H2250Parameters {
                session_id: 1,
                media_channel: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 1), 10000)),
                media_control_channel: Some(rtcp),
                dynamic_payload_type: None,
            }),
        }),
    };
    vec![transmit.encode().unwrap(), receive.encode().unwrap()]
}

fn setup_message() -> Q931Message {
    let mut msg = Q931Message::new(MessageType::Setup, 0x0123, false);
    msg.bearer_capability = Some(BearerCapability::Speech);
    msg.display = Some("Front Desk".into());
    msg.calling_party_number = Some("5551000".into());
    msg.called_party_number = Some("100".into());
    let mut pdu = UserUserPdu::new(UuieBody::Setup(SetupUuie {
        protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
        call_identifier: CallIdentifier([0x11; 16]),
        conference_id: ConferenceIdentifier([0x22; 16]),
        conference_goal: ConferenceGoal::Create,
        source_info: EndpointInfo { kind: EndpointKind::Gateway, vendor: None },
        source_aliases: vec![AliasAddress::h323_id("frontdesk")],
        destination_aliases: vec![AliasAddress::dialed_digits("100")],
        source_call_signal_address: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 1), 1720)),
        destination_call_signal_address: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 9), 1720)),
        h245_address: None,
        fast_start: fast_start_offer(),
        active_mc: false,
        media_wait_for_connect: false,
        can_overlap_send: false,
    }));
    pdu.h245_tunneling = true;
    msg.user_user = Some(pdu);
    msg
}

#[test]
fn test_setup_survives_the_wire() {
    let msg = setup_message();
    let decoded = Q931Message::decode(msg.encode().unwrap()).unwrap();

    assert_eq!(decoded.call_reference, 0x0123);
    assert_eq!(decoded.bearer_capability, Some(BearerCapability::Speech));
    assert_eq!(decoded.display.as_deref(), Some("Front Desk"));
    assert_eq!(decoded.calling_party_number.as_deref(), Some("5551000"));
    assert_eq!(decoded.called_party_number.as_deref(), Some("100"));
    assert_eq!(decoded.user_user, msg.user_user);

    let codes: Vec<u8> = decoded.elements.iter().map(|e| e.code).collect();
    assert_eq!(
        codes,
        vec![
            ie_code::BEARER_CAPABILITY,
            ie_code::DISPLAY,
            ie_code::CALLING_PARTY_NUMBER,
            ie_code::CALLED_PARTY_NUMBER,
            ie_code::USER_USER,
        ]
    );
}

#[test]
fn test_reencode_is_stable() {
    let first = setup_message().encode().unwrap();
    let second = Q931Message::decode(first.clone()).unwrap().encode().unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_fast_start_elements_classify() {
    let decoded = Q931Message::decode(setup_message().encode().unwrap()).unwrap();
    let uuie = decoded.user_user.unwrap();
    let directions: Vec<_> = uuie
        .body
        .fast_start()
        .iter()
        .map(|raw| OpenLogicalChannel::decode(raw.clone()).unwrap().direction())
        .collect();
    assert_eq!(directions, vec![Some(OlcDirection::Forward), Some(OlcDirection::Reverse)]);
}

#[test]
fn test_release_complete_with_cause() {
    let mut msg = Q931Message::new(MessageType::ReleaseComplete, 7, true);
    msg.cause = Some(CauseIe::new(Q931Cause::NoAnswer));
    msg.user_user = Some(UserUserPdu::new(UuieBody::ReleaseComplete {
        protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
        call_identifier: Some(CallIdentifier([3; 16])),
        reason: None,
    }));
    let decoded = Q931Message::decode(msg.encode().unwrap()).unwrap();
    assert_eq!(decoded.cause.map(|c| c.cause), Some(Q931Cause::NoAnswer));
    assert!(decoded.from_destination);
}

#[test]
fn test_framed_stream() {
    let payload = setup_message().encode().unwrap();
    let mut stream = BytesMut::new();
    stream.extend_from_slice(&tpkt::encode(&payload).unwrap());
    let frame = tpkt::decode(&mut stream).unwrap().unwrap();
    assert_eq!(Q931Message::decode(frame).unwrap().message_type, MessageType::Setup);
}

#[test]
fn test_truncated_setup_is_structural() {
    let bytes = setup_message().encode().unwrap();
    let cut = bytes.slice(..bytes.len() - 10);
    let err = Q931Message::decode(cut).unwrap_err();
    assert!(matches!(err, WireError::ElementOverrun { code: 0x7e, .. }));
    assert!(err.is_structural());
}

proptest! {
    #[test]
    fn prop_decode_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = Q931Message::decode(Bytes::from(data));
    }

    #[test]
    fn prop_call_reference_preserved(reference in 0u16..0x8000, from_destination in any::<bool>()) {
        let msg = Q931Message::new(MessageType::Status, reference, from_destination);
        let decoded = Q931Message::decode(msg.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded.call_reference, reference);
        prop_assert_eq!(decoded.from_destination, from_destination);
    }
}
