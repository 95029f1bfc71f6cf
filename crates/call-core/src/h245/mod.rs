//! H.245 control procedures of a call
//!
//! Messages go out tunneled inside Q.931 when tunneling is active, or on
//! the separate H.245 connection once the transport reports it open.
//! Until then they wait in the call's queue.

pub mod msd;
pub mod olc;
pub mod tcs;

use bytes::Bytes;
use h323_wire_core::TransportAddress;
use h323_wire_core::h245::message::{H245Message, UserInput};
use h323_wire_core::tpkt;
use tracing::{debug, info, trace, warn};

use crate::call::{Call, CallState, H245SessionState};
use crate::callbacks::CallEvent;
use crate::capability::DtmfMode;
use crate::cause::CallClearReason;
use crate::error::{CallError, Result};
use crate::outbound::{EngineEvent, OutboundKind};
use crate::timer::TimerKind;

impl Call {
    /// Queue or send one H.245 message
    pub(crate) fn send_h245(&mut self, msg: H245Message) -> Result<()> {
        let payload = msg.encode()?;
        trace!(parent: self.span(), kind = %msg.kind(), "H.245 message built");
        if self.flags.tunneling || !self.flags.h245_connected {
            self.h245_queue.push((msg.kind(), msg.logical_channel(), payload));
        } else {
            let framed = tpkt::encode(&payload)?;
            self.push_outbound(OutboundKind::H245(msg.kind()), msg.logical_channel(), framed);
        }
        Ok(())
    }

    /// Start the H.245 session: send our capability set
    pub(crate) fn start_h245(&mut self) -> Result<()> {
        if self.h245_state != H245SessionState::Idle {
            return Ok(());
        }
        info!(parent: self.span(), tunneled = self.flags.tunneling, "H.245 session started");
        self.h245_state = H245SessionState::Active;
        self.send_tcs()
    }

    /// Decode and handle one H.245 PDU
    ///
    /// An undecodable PDU is logged and dropped; the call carries on.
    pub fn handle_h245(&mut self, data: Bytes) -> Result<()> {
        let msg = match H245Message::decode(data) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(parent: self.span(), "dropping undecodable H.245 message: {}", e);
                return Ok(());
            }
        };
        self.handle_h245_message(msg)
    }

    pub(crate) fn handle_h245_message(&mut self, msg: H245Message) -> Result<()> {
        if self.state() >= CallState::Cleared {
            debug!(parent: self.span(), kind = %msg.kind(), "ignoring H.245 message for a cleared call");
            return Ok(());
        }
        debug!(parent: self.span(), kind = %msg.kind(), "received H.245 message");
        match msg {
            H245Message::MasterSlaveDetermination { terminal_type, status_determination_number } => {
                self.on_msd(terminal_type, status_determination_number)
            }
            H245Message::MasterSlaveDeterminationAck { decision } => self.on_msd_ack(decision),
            H245Message::MasterSlaveDeterminationReject | H245Message::MasterSlaveDeterminationRelease => {
                self.on_msd_reject()
            }
            H245Message::TerminalCapabilitySet { sequence_number, capabilities } => {
                self.on_tcs(sequence_number, capabilities)
            }
            H245Message::TerminalCapabilitySetAck { sequence_number } => self.on_tcs_ack(sequence_number),
            H245Message::TerminalCapabilitySetReject { sequence_number } => self.on_tcs_reject(sequence_number),
            H245Message::TerminalCapabilitySetRelease => {
                warn!(parent: self.span(), "peer released its capability set wait");
                Ok(())
            }
            H245Message::OpenLogicalChannel(olc) => self.on_open_logical_channel(olc),
            H245Message::OpenLogicalChannelAck(ack) => self.on_open_logical_channel_ack(ack),
            H245Message::OpenLogicalChannelReject { forward_lcn, cause } => {
                self.on_open_logical_channel_reject(forward_lcn, cause)
            }
            H245Message::OpenLogicalChannelConfirm { forward_lcn } => {
                debug!(parent: self.span(), lcn = forward_lcn, "logical channel confirmed");
                Ok(())
            }
            H245Message::CloseLogicalChannel { forward_lcn, .. } => self.on_close_logical_channel(forward_lcn),
            H245Message::CloseLogicalChannelAck { forward_lcn } => self.on_close_logical_channel_ack(forward_lcn),
            H245Message::RequestChannelClose { forward_lcn } => self.on_request_channel_close(forward_lcn),
            H245Message::RequestChannelCloseAck { forward_lcn } => {
                self.timers.delete(TimerKind::RequestChannelClose(forward_lcn));
                Ok(())
            }
            H245Message::RequestChannelCloseReject { forward_lcn }
            | H245Message::RequestChannelCloseRelease { forward_lcn } => {
                warn!(parent: self.span(), lcn = forward_lcn, "request to close channel refused");
                self.timers.delete(TimerKind::RequestChannelClose(forward_lcn));
                Ok(())
            }
            H245Message::RoundTripDelayRequest { sequence_number } => {
                self.send_h245(H245Message::RoundTripDelayResponse { sequence_number })
            }
            H245Message::RoundTripDelayResponse { sequence_number } => {
                trace!(parent: self.span(), sequence_number, "round trip delay response");
                Ok(())
            }
            H245Message::EndSessionCommand => self.on_end_session(),
            H245Message::UserInputIndication(input) => {
                self.on_user_input(input);
                Ok(())
            }
        }
    }

    pub(crate) fn send_end_session(&mut self) -> Result<()> {
        self.flags.end_session_built = true;
        self.send_h245(H245Message::EndSessionCommand)?;
        if self.h245_state.is_open() {
            self.h245_state = H245SessionState::EndSent;
        }
        self.start_timer(TimerKind::SessionEnd);
        Ok(())
    }

    fn on_end_session(&mut self) -> Result<()> {
        if self.h245_state == H245SessionState::EndSent {
            // Our own EndSession is answered
            self.timers.delete(TimerKind::SessionEnd);
            self.close_h245();
            match self.state() {
                CallState::ClearReleaseSent => self.transition(CallState::Cleared)?,
                state if !state.is_clearing() => self.mark_for_clearing(CallClearReason::RemoteCleared, None),
                _ => {}
            }
            return Ok(());
        }

        self.h245_state = H245SessionState::EndRecvd;
        self.clear_channels();
        if !self.flags.end_session_built {
            self.flags.end_session_built = true;
            self.send_h245(H245Message::EndSessionCommand)?;
        }
        if !self.state().is_clearing() {
            self.mark_for_clearing(CallClearReason::RemoteCleared, None);
            self.transition(CallState::ClearReleaseRecvd)?;
        }
        Ok(())
    }

    fn on_user_input(&mut self, input: UserInput) {
        let mode = match input {
            UserInput::Alphanumeric(_) => DtmfMode::H245Alphanumeric,
            UserInput::Signal { .. } => DtmfMode::H245Signal,
        };
        if !self.caps.dtmf_modes().contains(mode) {
            debug!(parent: self.span(), ?mode, "user input in a disabled DTMF mode");
            return;
        }
        let digits = input.digits();
        debug!(parent: self.span(), %digits, "DTMF received over H.245");
        self.push_event(CallEvent::ReceivedDtmf(digits));
    }

    /// Send DTMF in the best mode both sides support
    ///
    /// H.245 alphanumeric, then H.245 signal, then a Q.931 keypad. RTP
    /// based modes are up to the media layer.
    pub fn send_dtmf(&mut self, digits: &str) -> Result<()> {
        let joint = self.caps.joint_dtmf();
        if joint.contains(DtmfMode::H245Alphanumeric) {
            return self.send_h245(H245Message::UserInputIndication(UserInput::Alphanumeric(digits.to_string())));
        }
        if joint.contains(DtmfMode::H245Signal) {
            for signal in digits.chars() {
                self.send_h245(H245Message::UserInputIndication(UserInput::Signal { signal, duration: None }))?;
            }
            return Ok(());
        }
        if self.caps.dtmf_modes().contains(DtmfMode::Q931Keypad) {
            return self.send_keypad(digits);
        }
        Err(CallError::not_supported("no signaling DTMF mode in common with the peer"))
    }

    /// Record the peer's H.245 address and ask the transport to connect
    pub(crate) fn request_h245_connect(&mut self, address: TransportAddress) {
        if self.flags.tunneling || self.flags.h245_connected {
            return;
        }
        if self.remote_h245_address == Some(address) && self.h245_connect_attempts > 0 {
            return;
        }
        info!(parent: self.span(), %address, "connecting to remote H.245 address");
        self.remote_h245_address = Some(address);
        self.h245_connect_attempts = 1;
        self.push_engine_event(EngineEvent::ConnectH245 { token: self.token().to_string(), address });
    }

    /// The transport opened the H.245 connection
    pub fn on_h245_connected(&mut self) -> Result<()> {
        self.timers.delete(TimerKind::H245ConnectRetry);
        self.flags.h245_connected = true;
        if self.state().is_clearing() {
            return Ok(());
        }
        for (kind, lcn, payload) in std::mem::take(&mut self.h245_queue) {
            let framed = tpkt::encode(&payload)?;
            self.push_outbound(OutboundKind::H245(kind), lcn, framed);
        }
        self.start_h245()
    }

    /// The transport could not open the H.245 connection
    pub fn on_h245_connect_failed(&mut self) {
        let retries = self.ctx.defaults.timeouts.h245_connect_retries;
        if self.h245_connect_attempts < retries {
            debug!(parent: self.span(), attempt = self.h245_connect_attempts, "H.245 connect failed, will retry");
            self.start_timer(TimerKind::H245ConnectRetry);
        } else {
            warn!(parent: self.span(), attempts = self.h245_connect_attempts, "giving up on H.245 connection");
            self.mark_for_clearing(CallClearReason::TransportFailure, None);
        }
    }

    pub(crate) fn retry_h245_connect(&mut self) -> Result<()> {
        let Some(address) = self.remote_h245_address else {
            return Ok(());
        };
        if self.flags.h245_connected || self.state().is_clearing() {
            return Ok(());
        }
        self.h245_connect_attempts += 1;
        self.push_engine_event(EngineEvent::ConnectH245 { token: self.token().to_string(), address });
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::call::CallDirection;
    use crate::capability::CapabilityDescriptor;
    use crate::config::EndpointDefaults;
    use crate::context::EndpointContext;
    use h323_wire_core::h245::capability::{CapType, CapabilityDirection};
    use h323_wire_core::h245::message::H245MessageKind;
    use pretty_assertions::assert_eq;

    /// Connected ULAW call with its H.245 session started and drained
    pub(crate) fn active_call(token: &str) -> Call {
        let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default()).unwrap());
        let mut call = Call::new(ctx, token, CallDirection::Incoming);
        call.add_capability(CapabilityDescriptor::audio(
            CapType::G711Ulaw64k,
            20,
            240,
            CapabilityDirection::ReceiveAndTransmit,
        ))
        .unwrap();
        call.transition(CallState::Connecting).unwrap();
        call.transition(CallState::Connected).unwrap();
        call.start_h245().unwrap();
        call.take_events();
        call.h245_queue.clear();
        call
    }

    /// Kinds of the H.245 messages queued since the last drain
    pub(crate) fn sent_kinds(call: &mut Call) -> Vec<H245MessageKind> {
        call.h245_queue.drain(..).map(|(kind, _, _)| kind).collect()
    }

    #[test]
    fn test_start_sends_capability_set_once() {
        let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default()).unwrap());
        let mut call = Call::new(ctx, "start", CallDirection::Outgoing);
        call.start_h245().unwrap();
        call.start_h245().unwrap();
        assert_eq!(call.h245_state(), H245SessionState::Active);
        assert_eq!(sent_kinds(&mut call), vec![H245MessageKind::TerminalCapabilitySet]);
    }

    #[test]
    fn test_end_session_from_peer_clears_call() {
        let mut call = active_call("end-recvd");
        let pdu = H245Message::EndSessionCommand.encode().unwrap();
        call.handle_h245(pdu).unwrap();

        assert_eq!(call.state(), CallState::ClearReleaseRecvd);
        assert_eq!(call.h245_state(), H245SessionState::EndRecvd);
        assert_eq!(call.end_reason(), CallClearReason::RemoteCleared);
        assert_eq!(sent_kinds(&mut call), vec![H245MessageKind::EndSessionCommand]);

        // A repeated command is not answered twice
        call.handle_h245_message(H245Message::EndSessionCommand).unwrap();
        assert!(sent_kinds(&mut call).is_empty());
    }

    #[test]
    fn test_end_session_answers_ours() {
        let mut call = active_call("end-sent");
        call.mark_for_clearing(CallClearReason::LocalCleared, None);
        call.send_end_session().unwrap();
        call.transition(CallState::ClearReleaseSent).unwrap();
        assert_eq!(call.h245_state(), H245SessionState::EndSent);
        assert!(call.timers.is_active(TimerKind::SessionEnd));

        call.handle_h245_message(H245Message::EndSessionCommand).unwrap();
        assert_eq!(call.state(), CallState::Cleared);
        assert_eq!(call.h245_state(), H245SessionState::Closed);
        assert!(!call.timers.is_active(TimerKind::SessionEnd));
        assert_eq!(call.end_reason(), CallClearReason::LocalCleared);
    }

    #[test]
    fn test_undecodable_message_dropped() {
        let mut call = active_call("garbage");
        call.handle_h245(Bytes::new()).unwrap();
        assert_eq!(call.state(), CallState::Connected);
        assert_eq!(call.h245_state(), H245SessionState::Active);
        assert!(sent_kinds(&mut call).is_empty());
    }
}
