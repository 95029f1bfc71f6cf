use bytes::{BufMut, BytesMut};
use chrono::Utc;
use h323_wire_core::q931::ie_code;
use h323_wire_core::q931::{BearerCapability, CauseIe, ProgressDescription};
use h323_wire_core::uuie::{
    ConferenceGoal, ConnectUuie, EndpointInfo, EndpointKind, FacilityUuie, H225_PROTOCOL_IDENTIFIER, ProgressUuie,
    SetupUuie,
};
use h323_wire_core::{
    AliasKind, FacilityReason, InformationElement, MessageType, Q931Cause, Q931Message, TransportAddress,
    UserUserPdu, UuieBody, tpkt,
};
use tracing::{debug, info};

use super::q931_call_state;
use crate::call::{Call, CallDirection, CallMode, CallState, Destination, ForwardData};
use crate::callbacks::CallEvent;
use crate::cause::CallClearReason;
use crate::error::{CallError, Result};
use crate::outbound::OutboundKind;
use crate::timer::TimerKind;

/// Terminal type announced by gateways
const GATEWAY_TERMINAL_TYPE: u8 = 60;

impl Call {
    fn new_message(&self, message_type: MessageType) -> Q931Message {
        Q931Message::new(
            message_type,
            self.call_reference,
            self.direction() == CallDirection::Incoming,
        )
    }

    fn endpoint_info(&self) -> EndpointInfo {
        let defaults = &self.ctx.defaults;
        EndpointInfo {
            kind: if defaults.terminal_type == GATEWAY_TERMINAL_TYPE {
                EndpointKind::Gateway
            } else {
                EndpointKind::Terminal
            },
            vendor: Some(defaults.vendor.clone()),
        }
    }

    /// Our H.245 address, advertised only when not tunneling
    fn advertised_h245_address(&self) -> Option<TransportAddress> {
        if self.flags.tunneling { None } else { self.local_h245_address }
    }

    fn progress_uuie(&self, fast_start: Vec<bytes::Bytes>) -> ProgressUuie {
        ProgressUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(self.call_identifier),
            destination_info: Some(self.endpoint_info()),
            h245_address: self.advertised_h245_address(),
            fast_start,
        }
    }

    /// Fast-start answer for a response message
    ///
    /// With media-wait-for-connect only Connect carries it.
    fn fast_start_for_response(&mut self, message_type: MessageType) -> Result<Vec<bytes::Bytes>> {
        if !self.flags.fast_start || (self.flags.media_wait_for_connect && message_type != MessageType::Connect) {
            return Ok(Vec::new());
        }
        self.fast_start_response()
    }

    pub(crate) fn send_q931(&mut self, msg: Q931Message) -> Result<()> {
        self.send_q931_as(msg, None)
    }

    /// Encode, frame and queue a Q.931 message
    ///
    /// Pending tunneled H.245 rides in the user-user part.
    fn send_q931_as(&mut self, mut msg: Q931Message, kind: Option<OutboundKind>) -> Result<()> {
        let message_type = msg.message_type;
        let tunneling = self.flags.tunneling;
        let mut tunneled = 0;
        if let Some(uu) = msg.user_user.as_mut() {
            uu.h245_tunneling = tunneling;
            if tunneling {
                tunneled = self.h245_queue.len();
                uu.h245_control.extend(self.h245_queue.drain(..).map(|(_, _, payload)| payload));
            }
        }
        let payload = tpkt::encode(&msg.encode()?)?;
        debug!(parent: self.span(), %message_type, tunneled, "Q.931 message built");
        self.push_outbound(kind.unwrap_or(OutboundKind::Q931(message_type)), None, payload);
        Ok(())
    }

    /// Build and queue Setup for an outgoing call
    pub(crate) fn send_setup(&mut self) -> Result<()> {
        if self.direction() != CallDirection::Outgoing {
            return Err(CallError::not_supported("setup on an incoming call"));
        }
        let fast_start = if self.flags.fast_start { self.fast_start_offer()? } else { Vec::new() };

        let mut msg = self.new_message(MessageType::Setup);
        msg.bearer_capability = Some(if self.mode == CallMode::Video {
            BearerCapability::UnrestrictedDigital
        } else {
            BearerCapability::Speech
        });
        msg.display = self.display_name.clone().filter(|d| !d.is_empty());
        msg.calling_party_number = self.calling_party_number.clone();
        msg.called_party_number = self.called_party_number.clone().or_else(|| {
            self.remote_aliases
                .iter()
                .find(|a| a.kind == AliasKind::DialedDigits)
                .map(|a| a.value.clone())
        });
        msg.user_user = Some(UserUserPdu::new(UuieBody::Setup(SetupUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: self.call_identifier,
            conference_id: self.conference_id,
            conference_goal: ConferenceGoal::Create,
            source_info: self.endpoint_info(),
            source_aliases: self.local_aliases.clone(),
            destination_aliases: self.remote_aliases.clone(),
            source_call_signal_address: Some(self.local_address),
            destination_call_signal_address: self.remote_address,
            h245_address: self.advertised_h245_address(),
            fast_start,
            active_mc: false,
            media_wait_for_connect: self.flags.media_wait_for_connect,
            can_overlap_send: false,
        })));

        self.send_q931(msg)?;
        self.signaling_started = true;
        self.transition(CallState::Connecting)?;
        self.start_timer(TimerKind::Establishment);
        info!(parent: self.span(), remote = ?self.remote_address, "setup sent");
        self.push_event(CallEvent::OutgoingCall);
        Ok(())
    }

    pub(crate) fn send_call_proceeding(&mut self) -> Result<()> {
        let mut msg = self.new_message(MessageType::CallProceeding);
        msg.user_user = Some(UserUserPdu::new(UuieBody::CallProceeding(self.progress_uuie(Vec::new()))));
        self.send_q931(msg)
    }

    /// Tell the caller the callee is ringing
    pub fn send_alerting(&mut self) -> Result<()> {
        self.check_answerable()?;
        if self.flags.alerting_sent {
            debug!(parent: self.span(), "alerting already sent");
            return Ok(());
        }
        let fast_start = self.fast_start_for_response(MessageType::Alerting)?;
        let mut msg = self.new_message(MessageType::Alerting);
        msg.user_user = Some(UserUserPdu::new(UuieBody::Alerting(self.progress_uuie(fast_start))));
        self.send_q931(msg)?;
        self.flags.alerting_sent = true;
        Ok(())
    }

    /// Signal in-band progress, e.g. early media
    pub fn send_progress(&mut self) -> Result<()> {
        self.check_answerable()?;
        let fast_start = self.fast_start_for_response(MessageType::Progress)?;
        let mut msg = self.new_message(MessageType::Progress);
        msg.progress = Some(ProgressDescription::INBAND_AVAILABLE);
        msg.user_user = Some(UserUserPdu::new(UuieBody::Progress(self.progress_uuie(fast_start))));
        self.send_q931(msg)
    }

    /// Answer an incoming call
    pub fn send_connect(&mut self) -> Result<()> {
        self.check_answerable()?;
        if self.flags.connect_sent {
            return Ok(());
        }
        let fast_start = self.fast_start_for_response(MessageType::Connect)?;
        let mut msg = self.new_message(MessageType::Connect);
        msg.display = self.display_name.clone().filter(|d| !d.is_empty());
        msg.user_user = Some(UserUserPdu::new(UuieBody::Connect(ConnectUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(self.call_identifier),
            conference_id: self.conference_id,
            destination_info: Some(self.endpoint_info()),
            h245_address: self.advertised_h245_address(),
            fast_start,
        })));
        self.send_q931(msg)?;
        self.flags.connect_sent = true;
        self.timers.delete(TimerKind::Establishment);
        self.transition(CallState::Connected)?;
        self.connected_at = Some(Utc::now());
        info!(parent: self.span(), "call answered");
        self.push_event(CallEvent::CallEstablished);
        Ok(())
    }

    fn check_answerable(&self) -> Result<()> {
        if self.direction() != CallDirection::Incoming {
            return Err(CallError::not_supported("only incoming calls can be answered"));
        }
        if self.state() >= CallState::Connected {
            return Err(CallError::invalid_transition(self.state(), CallState::Connected));
        }
        Ok(())
    }

    /// Build the one ReleaseComplete of the call
    pub(crate) fn send_release_complete(&mut self) -> Result<()> {
        if self.flags.release_built {
            return Ok(());
        }
        let reason = self.end_reason();
        let (wire_cause, release_reason) = reason.to_wire();
        let cause = self.q931_cause().unwrap_or(wire_cause);

        let mut msg = self.new_message(MessageType::ReleaseComplete);
        msg.cause = Some(CauseIe::new(cause));
        msg.user_user = Some(UserUserPdu::new(UuieBody::ReleaseComplete {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(self.call_identifier),
            reason: Some(release_reason),
        }));
        self.flags.release_built = true;
        self.send_q931(msg)?;
        self.timers.delete(TimerKind::Establishment);
        info!(parent: self.span(), %reason, cause = cause.value(), "release complete sent");

        match self.state() {
            CallState::Clear => {
                self.transition(CallState::ClearReleaseSent)?;
                if !self.timers.is_active(TimerKind::SessionEnd) {
                    self.transition(CallState::Cleared)?;
                }
            }
            CallState::ClearReleaseRecvd => self.transition(CallState::Cleared)?,
            _ => {}
        }
        Ok(())
    }

    /// Redirect the peer elsewhere and clear the call
    pub fn forward_to(&mut self, destination: &Destination) -> Result<()> {
        if self.state().is_clearing() {
            return Err(CallError::not_supported("forwarding a call that is clearing"));
        }
        let mut msg = self.new_message(MessageType::Facility);
        msg.user_user = Some(UserUserPdu::new(UuieBody::Facility(FacilityUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(self.call_identifier),
            conference_id: Some(self.conference_id),
            reason: FacilityReason::CallForwarded,
            alternative_address: destination.address,
            alternative_aliases: destination.aliases.clone(),
            h245_address: None,
            fast_start: Vec::new(),
        })));
        self.send_q931(msg)?;
        self.forward = Some(ForwardData {
            address: destination.address,
            aliases: destination.aliases.clone(),
            forwarded_by_remote: false,
        });
        info!(parent: self.span(), address = ?destination.address, "call forwarded");
        self.mark_for_clearing(CallClearReason::LocalForwarded, None);
        Ok(())
    }

    /// Carry queued tunneled H.245 in a Facility of its own
    pub(crate) fn flush_h245_queue(&mut self) -> Result<()> {
        if !self.flags.tunneling
            || self.h245_queue.is_empty()
            || !self.signaling_started
            || self.flags.release_built
            || self.state() == CallState::Removed
        {
            return Ok(());
        }
        let mut msg = self.new_message(MessageType::Facility);
        msg.user_user = Some(UserUserPdu::new(UuieBody::Facility(FacilityUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(self.call_identifier),
            conference_id: Some(self.conference_id),
            reason: FacilityReason::TransportedInformation,
            alternative_address: None,
            alternative_aliases: Vec::new(),
            h245_address: None,
            fast_start: Vec::new(),
        })));
        self.send_q931_as(msg, Some(OutboundKind::TunneledFacility))
    }

    /// Send digits in a Q.931 Keypad element
    pub(crate) fn send_keypad(&mut self, digits: &str) -> Result<()> {
        let mut msg = self.new_message(MessageType::Information);
        msg.keypad = Some(digits.to_string());
        msg.user_user = Some(UserUserPdu::new(UuieBody::Information {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: Some(self.call_identifier),
        }));
        self.send_q931(msg)
    }

    /// Answer a StatusEnquiry
    pub(crate) fn send_status(&mut self) -> Result<()> {
        let mut msg = self.new_message(MessageType::Status);
        msg.cause = Some(CauseIe::new(Q931Cause::StatusEnquiryResponse));
        let mut state = BytesMut::with_capacity(1);
        state.put_u8(q931_call_state(self.state(), self.direction()));
        msg.elements.push(InformationElement::new(ie_code::CALL_STATE, state.freeze()));
        self.send_q931(msg)
    }
}
