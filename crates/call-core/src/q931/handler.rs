use bytes::Bytes;
use chrono::Utc;
use h323_wire_core::q931::BearerCapability;
use h323_wire_core::uuie::{FacilityUuie, SetupUuie};
use h323_wire_core::{AliasKind, FacilityReason, MessageType, Q931Message, UuieBody};
use tracing::{debug, info, warn};

use crate::call::{Call, CallDirection, CallMode, CallState, ForwardData};
use crate::callbacks::CallEvent;
use crate::capability::DtmfMode;
use crate::cause::CallClearReason;
use crate::error::Result;
use crate::timer::TimerKind;

impl Call {
    /// Apply one received Q.931 message, then any H.245 tunneled in it
    pub fn handle_q931(&mut self, msg: Q931Message) -> Result<()> {
        if self.state() >= CallState::Cleared {
            debug!(parent: self.span(), message = %msg.message_type, "ignoring message for a cleared call");
            return Ok(());
        }
        debug!(
            parent: self.span(),
            message = %msg.message_type,
            body = msg.user_user.as_ref().map(|uu| uu.body.name()).unwrap_or("none"),
            "received Q.931 message"
        );

        if matches!(
            msg.message_type,
            MessageType::Setup
                | MessageType::CallProceeding
                | MessageType::Alerting
                | MessageType::Progress
                | MessageType::Connect
        ) {
            self.update_tunneling(&msg);
        }

        let tunneled: Vec<Bytes> = msg
            .user_user
            .as_ref()
            .map(|uu| uu.h245_control.clone())
            .unwrap_or_default();

        match msg.message_type {
            MessageType::Setup => self.on_setup(&msg)?,
            MessageType::CallProceeding | MessageType::Alerting | MessageType::Progress => self.on_response(&msg)?,
            MessageType::Connect => self.on_connect(&msg)?,
            MessageType::ReleaseComplete => return self.on_release_complete(&msg),
            MessageType::Facility => self.on_facility(&msg)?,
            MessageType::Information => self.on_information(&msg),
            MessageType::StatusEnquiry => self.send_status()?,
            MessageType::Status => {
                debug!(parent: self.span(), cause = ?msg.cause.map(|c| c.cause), "status received");
            }
            other => debug!(parent: self.span(), message = %other, "unhandled Q.931 message"),
        }

        for pdu in tunneled {
            self.handle_h245(pdu)?;
        }
        Ok(())
    }

    /// Tunneling stays on only while the peer tunnels and offers no
    /// separate H.245 address
    fn update_tunneling(&mut self, msg: &Q931Message) {
        if !self.flags.tunneling {
            return;
        }
        let keep = msg
            .user_user
            .as_ref()
            .is_some_and(|uu| uu.h245_tunneling && uu.body.h245_address().is_none());
        if !keep {
            info!(parent: self.span(), message = %msg.message_type, "peer does not tunnel H.245");
            self.flags.tunneling = false;
        }
    }

    fn on_setup(&mut self, msg: &Q931Message) -> Result<()> {
        if self.direction() != CallDirection::Incoming || self.state() != CallState::Created {
            warn!(parent: self.span(), state = %self.state(), "unexpected setup");
            return Ok(());
        }
        let Some(UuieBody::Setup(setup)) = msg.user_user.as_ref().map(|uu| &uu.body) else {
            warn!(parent: self.span(), "setup without an H.225 setup body");
            self.mark_for_clearing(CallClearReason::InvalidMessage, None);
            return Ok(());
        };

        self.call_reference = msg.call_reference;
        self.call_identifier = setup.call_identifier;
        self.conference_id = setup.conference_id;
        self.remote_display_name = msg.display.clone();
        self.calling_party_number = msg.calling_party_number.clone();
        self.called_party_number = msg.called_party_number.clone();
        self.store_setup_aliases(setup);

        if self.remote_address.is_none() {
            self.remote_address = setup.source_call_signal_address;
        }
        self.flags.media_wait_for_connect = setup.media_wait_for_connect;
        if msg.bearer_capability == Some(BearerCapability::UnrestrictedDigital) {
            self.mode = CallMode::Video;
        }

        if setup.fast_start.is_empty() {
            self.flags.fast_start = false;
        } else if self.flags.fast_start {
            self.remote_fast_start = setup.fast_start.clone();
        }

        info!(
            parent: self.span(),
            calling = ?self.calling_party_number,
            called = ?self.called_party_number,
            fast_start = self.flags.fast_start,
            tunneling = self.flags.tunneling,
            "incoming setup"
        );

        if self.flags.tunneling {
            self.start_h245()?;
        } else if let Some(address) = setup.h245_address {
            self.request_h245_connect(address);
        }
        self.send_call_proceeding()?;
        self.needs_admission = true;
        Ok(())
    }

    fn store_setup_aliases(&mut self, setup: &SetupUuie) {
        for alias in &setup.source_aliases {
            if alias.kind == AliasKind::DialedDigits && self.calling_party_number.is_none() {
                self.calling_party_number = Some(alias.value.clone());
            }
            self.remote_aliases.push(alias.clone());
        }
        for alias in &setup.destination_aliases {
            if alias.kind == AliasKind::DialedDigits && self.called_party_number.is_none() {
                self.called_party_number = Some(alias.value.clone());
            }
            self.local_aliases.push(alias.clone());
        }
    }

    /// The call may proceed: send Setup, or ring and maybe answer
    pub fn on_admitted(&mut self) -> Result<()> {
        self.admitted = true;
        self.needs_admission = false;
        match self.direction() {
            CallDirection::Outgoing => self.send_setup(),
            CallDirection::Incoming => {
                self.transition(CallState::Connecting)?;
                self.start_timer(TimerKind::Establishment);
                self.push_event(CallEvent::IncomingCall);
                if !self.flags.manual_ringback {
                    self.send_alerting()?;
                }
                if self.flags.auto_answer {
                    self.send_connect()?;
                }
                Ok(())
            }
        }
    }

    /// CallProceeding, Alerting or Progress from the callee
    fn on_response(&mut self, msg: &Q931Message) -> Result<()> {
        if self.direction() != CallDirection::Outgoing || self.state() != CallState::Connecting {
            debug!(parent: self.span(), message = %msg.message_type, state = %self.state(), "response ignored");
            return Ok(());
        }
        if let Some(uu) = &msg.user_user {
            let fast_start = uu.body.fast_start().to_vec();
            self.process_fast_start_answer(&fast_start)?;
            if let Some(address) = uu.body.h245_address() {
                self.request_h245_connect(address);
            }
        }
        if self.flags.tunneling {
            self.start_h245()?;
        }
        match msg.message_type {
            MessageType::Alerting => {
                info!(parent: self.span(), "remote is alerting");
                self.push_event(CallEvent::Alerting);
            }
            MessageType::Progress => self.push_event(CallEvent::Progress),
            _ => {}
        }
        Ok(())
    }

    fn on_connect(&mut self, msg: &Q931Message) -> Result<()> {
        if self.direction() != CallDirection::Outgoing || self.state() >= CallState::Connected {
            debug!(parent: self.span(), state = %self.state(), "connect ignored");
            return Ok(());
        }
        self.timers.delete(TimerKind::Establishment);

        if let Some(uu) = &msg.user_user {
            if let Some(remote) = uu.body.call_identifier().filter(|id| *id != self.call_identifier) {
                debug!(parent: self.span(), ?remote, "connect for a different call identifier");
            }
            let fast_start = uu.body.fast_start().to_vec();
            self.process_fast_start_answer(&fast_start)?;
            if let Some(address) = uu.body.h245_address() {
                self.request_h245_connect(address);
            }
        }
        if !self.flags.fast_start_answered {
            self.abandon_fast_start();
        }
        self.remote_display_name = msg.display.clone().or(self.remote_display_name.take());

        self.transition(CallState::Connected)?;
        self.connected_at = Some(Utc::now());
        info!(parent: self.span(), "call connected");
        self.push_event(CallEvent::CallEstablished);

        if self.flags.tunneling {
            self.start_h245()?;
        }
        Ok(())
    }

    fn on_release_complete(&mut self, msg: &Q931Message) -> Result<()> {
        self.timers.delete(TimerKind::SessionEnd);
        self.timers.delete(TimerKind::Establishment);
        let cause = msg.cause.map(|c| c.cause);
        let release_reason = match msg.user_user.as_ref().map(|uu| &uu.body) {
            Some(UuieBody::ReleaseComplete { reason, .. }) => *reason,
            _ => None,
        };
        let reason = CallClearReason::from_wire(cause, release_reason).remote_view();
        info!(parent: self.span(), %reason, cause = ?cause, "release complete received");

        self.mark_for_clearing(reason, cause);
        self.close_h245();
        self.transition(CallState::Cleared)
    }

    fn on_facility(&mut self, msg: &Q931Message) -> Result<()> {
        let Some(UuieBody::Facility(facility)) = msg.user_user.as_ref().map(|uu| &uu.body) else {
            // Tunneled H.245 only
            return Ok(());
        };
        match facility.reason {
            FacilityReason::CallForwarded => self.on_forwarded(facility),
            FacilityReason::StartH245 => {
                if let Some(address) = facility.h245_address {
                    info!(parent: self.span(), %address, "peer asks for a separate H.245 connection");
                    self.flags.tunneling = false;
                    self.request_h245_connect(address);
                }
            }
            reason => debug!(parent: self.span(), ?reason, "facility"),
        }
        if self.direction() == CallDirection::Outgoing && !facility.fast_start.is_empty() {
            self.process_fast_start_answer(&facility.fast_start)?;
        }
        Ok(())
    }

    fn on_forwarded(&mut self, facility: &FacilityUuie) {
        info!(
            parent: self.span(),
            address = ?facility.alternative_address,
            aliases = facility.alternative_aliases.len(),
            "call forwarded by remote"
        );
        self.forward = Some(ForwardData {
            address: facility.alternative_address,
            aliases: facility.alternative_aliases.clone(),
            forwarded_by_remote: true,
        });
        self.mark_for_clearing(CallClearReason::RemoteForwarded, None);
    }

    fn on_information(&mut self, msg: &Q931Message) {
        let Some(keypad) = msg.keypad.clone().filter(|k| !k.is_empty()) else {
            return;
        };
        if !self.caps.dtmf_modes().contains(DtmfMode::Q931Keypad) {
            debug!(parent: self.span(), "keypad received but Q.931 keypad DTMF is disabled");
            return;
        }
        debug!(parent: self.span(), digits = %keypad, "DTMF received in keypad element");
        self.push_event(CallEvent::ReceivedDtmf(keypad));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use h323_wire_core::uuie::{ConferenceGoal, EndpointInfo, EndpointKind, H225_PROTOCOL_IDENTIFIER};
    use h323_wire_core::{
        AliasAddress, CallIdentifier, ConferenceIdentifier, Q931Cause, ReleaseCompleteReason, UserUserPdu,
    };
    use h323_wire_core::q931::CauseIe;

    use super::*;
    use crate::config::EndpointDefaults;
    use crate::context::EndpointContext;

    fn context() -> Arc<EndpointContext> {
        Arc::new(EndpointContext::new(EndpointDefaults::default()).unwrap())
    }

    fn setup_message(dest: Vec<AliasAddress>, called: Option<&str>) -> Q931Message {
        let mut msg = Q931Message::new(MessageType::Setup, 77, false);
        msg.called_party_number = called.map(str::to_string);
        let mut uu = UserUserPdu::new(UuieBody::Setup(SetupUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: CallIdentifier([9u8; 16]),
            conference_id: ConferenceIdentifier([8u8; 16]),
            conference_goal: ConferenceGoal::Create,
            source_info: EndpointInfo { kind: EndpointKind::Terminal, vendor: None },
            source_aliases: vec![AliasAddress::dialed_digits("2000")],
            destination_aliases: dest,
            source_call_signal_address: None,
            destination_call_signal_address: None,
            h245_address: None,
            fast_start: Vec::new(),
            active_mc: false,
            media_wait_for_connect: false,
            can_overlap_send: false,
        }));
        uu.h245_tunneling = true;
        msg.user_user = Some(uu);
        msg
    }

    #[test]
    fn test_setup_copies_identity() {
        let mut call = Call::new(context(), "in", CallDirection::Incoming);
        call.handle_q931(setup_message(vec![AliasAddress::h323_id("support")], None))
            .unwrap();

        assert_eq!(call.call_reference, 77);
        assert_eq!(call.call_identifier, CallIdentifier([9u8; 16]));
        assert_eq!(call.conference_id, ConferenceIdentifier([8u8; 16]));
        assert_eq!(call.calling_party_number.as_deref(), Some("2000"));
        assert_eq!(call.destination_extension(), "support");
        assert!(call.flags.tunneling);
        assert!(!call.flags.fast_start);
        assert!(call.needs_admission);
    }

    #[test]
    fn test_extension_falls_back_to_s() {
        let mut call = Call::new(context(), "in", CallDirection::Incoming);
        call.handle_q931(setup_message(Vec::new(), None)).unwrap();
        assert_eq!(call.destination_extension(), "s");
    }

    #[test]
    fn test_release_complete_maps_reason() {
        let mut call = Call::new(context(), "out", CallDirection::Outgoing);
        call.on_admitted().unwrap();
        let mut rc = Q931Message::new(MessageType::ReleaseComplete, call.call_reference, true);
        rc.cause = Some(CauseIe::new(Q931Cause::UserBusy));
        rc.user_user = Some(UserUserPdu::new(UuieBody::ReleaseComplete {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(call.call_identifier),
            reason: Some(ReleaseCompleteReason::NonStandardReason),
        }));
        call.handle_q931(rc).unwrap();

        assert_eq!(call.state(), CallState::Cleared);
        assert_eq!(call.end_reason(), CallClearReason::RemoteBusy);
    }

    #[test]
    fn test_remote_forward_recorded() {
        let mut call = Call::new(context(), "out", CallDirection::Outgoing);
        call.on_admitted().unwrap();
        let mut facility = Q931Message::new(MessageType::Facility, call.call_reference, true);
        facility.user_user = Some(UserUserPdu::new(UuieBody::Facility(FacilityUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(call.call_identifier),
            conference_id: None,
            reason: FacilityReason::CallForwarded,
            alternative_address: None,
            alternative_aliases: vec![AliasAddress::dialed_digits("3000")],
            h245_address: None,
            fast_start: Vec::new(),
        })));
        call.handle_q931(facility).unwrap();

        assert_eq!(call.end_reason(), CallClearReason::RemoteForwarded);
        assert!(call.forward.as_ref().unwrap().forwarded_by_remote);
        call.end().unwrap();
        call.end().unwrap();
        assert!(call.take_events().contains(&CallEvent::CallForwarded));
    }
}
