//! Terminal capability exchange

use h323_wire_core::h245::capability::TerminalCapability;
use h323_wire_core::h245::message::H245Message;
use tracing::{debug, info, warn};

use crate::call::{Call, CallState, H245SessionState, LocalTcsState, MasterSlaveState, RemoteTcsState};
use crate::callbacks::CallEvent;
use crate::cause::CallClearReason;
use crate::channel::ChannelDirection;
use crate::error::Result;
use crate::timer::TimerKind;

impl Call {
    pub(crate) fn send_tcs(&mut self) -> Result<()> {
        self.local_tcs_seq = self.local_tcs_seq.wrapping_add(1);
        let capabilities = self.caps.terminal_capabilities();
        debug!(parent: self.span(), seq = self.local_tcs_seq, entries = capabilities.len(), "sending capability set");
        self.send_h245(H245Message::TerminalCapabilitySet {
            sequence_number: self.local_tcs_seq,
            capabilities: Some(capabilities),
        })?;
        self.local_tcs = LocalTcsState::SetSent;
        self.start_timer(TimerKind::TcsResponse);
        Ok(())
    }

    pub(super) fn on_tcs(&mut self, seq: u8, capabilities: Option<Vec<TerminalCapability>>) -> Result<()> {
        if self.remote_tcs_seq.is_some_and(|last| seq < last) {
            warn!(parent: self.span(), seq, last = ?self.remote_tcs_seq, "stale capability set");
            return self.send_h245(H245Message::TerminalCapabilitySetReject { sequence_number: seq });
        }
        self.remote_tcs_seq = Some(seq);

        let Some(capabilities) = capabilities else {
            return self.pause_for_empty_tcs(seq);
        };

        if self.h245_state == H245SessionState::Paused {
            self.resume_after_pause()?;
        }

        self.remote_tcs = RemoteTcsState::SetReceived;
        self.caps.clear_remote();
        let joint = capabilities.iter().filter(|entry| self.caps.add_remote(entry)).count();
        debug!(parent: self.span(), seq, received = capabilities.len(), joint, "remote capability set stored");

        self.send_h245(H245Message::TerminalCapabilitySetAck { sequence_number: seq })?;
        self.remote_tcs = RemoteTcsState::SetAckSent;

        let t38 = self.caps.t38_joint();
        if t38 != self.flags.t38 {
            debug!(parent: self.span(), t38, "T.38 support changed");
            self.flags.t38 = t38;
        }

        if self.local_tcs == LocalTcsState::Idle {
            self.send_tcs()?;
        }
        self.check_negotiation_complete()
    }

    /// An empty capability set puts the call on hold for a reroute
    fn pause_for_empty_tcs(&mut self, seq: u8) -> Result<()> {
        info!(parent: self.span(), "empty capability set, pausing media");
        self.send_h245(H245Message::TerminalCapabilitySetAck { sequence_number: seq })?;

        let transmitting: Vec<u16> = self
            .channels
            .iter()
            .filter(|c| c.direction == ChannelDirection::Transmit && c.is_established())
            .map(|c| c.number)
            .collect();
        for lcn in transmitting {
            self.send_close_logical_channel(lcn)?;
        }

        self.caps.clear_remote();
        self.remote_tcs = RemoteTcsState::Idle;
        self.h245_state = H245SessionState::Paused;
        if self.state() == CallState::Connected {
            self.transition(CallState::Paused)?;
        }
        Ok(())
    }

    fn resume_after_pause(&mut self) -> Result<()> {
        info!(parent: self.span(), "capability set after pause, renegotiating");
        self.h245_state = H245SessionState::Active;
        if self.state() == CallState::Paused {
            self.transition(CallState::Connected)?;
        }
        self.msd.state = MasterSlaveState::Idle;
        self.msd.retries = 0;
        self.local_tcs = LocalTcsState::Idle;
        self.channels_requested = false;
        Ok(())
    }

    pub(super) fn on_tcs_ack(&mut self, seq: u8) -> Result<()> {
        if seq != self.local_tcs_seq {
            debug!(parent: self.span(), seq, expected = self.local_tcs_seq, "ack for an older capability set");
            return Ok(());
        }
        self.timers.delete(TimerKind::TcsResponse);
        self.local_tcs = LocalTcsState::SetAckReceived;
        self.check_negotiation_complete()
    }

    pub(super) fn on_tcs_reject(&mut self, seq: u8) -> Result<()> {
        warn!(parent: self.span(), seq, "capability set rejected");
        self.timers.delete(TimerKind::TcsResponse);
        self.mark_for_clearing(CallClearReason::NoCommonCapabilities, None);
        Ok(())
    }

    /// Move on once both capability sets are acknowledged
    ///
    /// Starts master/slave determination if nobody has yet, and asks for
    /// channels once the roles are known.
    pub(crate) fn check_negotiation_complete(&mut self) -> Result<()> {
        if self.state().is_clearing() {
            return Ok(());
        }
        if self.local_tcs != LocalTcsState::SetAckReceived || self.remote_tcs != RemoteTcsState::SetAckSent {
            return Ok(());
        }
        match self.msd.state {
            MasterSlaveState::Idle => self.send_msd(),
            state if state.is_decided() => {
                if !self.channels_requested {
                    self.channels_requested = true;
                    debug!(parent: self.span(), "capability exchange and determination complete");
                    self.push_event(CallEvent::OpenLogicalChannels);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use super::*;
    use crate::h245::tests::{active_call, sent_kinds};
    use h323_wire_core::TransportAddress;
    use h323_wire_core::h245::capability::MediaType;
    use h323_wire_core::h245::message::H245MessageKind;
    use h323_wire_core::h245::olc::OpenLogicalChannelAck;
    use pretty_assertions::assert_eq;

    fn peer_capabilities() -> Vec<TerminalCapability> {
        active_call("peer").caps.terminal_capabilities()
    }

    #[test]
    fn test_stale_capability_set_rejected() {
        let mut call = active_call("stale");
        call.on_tcs(5, Some(peer_capabilities())).unwrap();
        assert_eq!(sent_kinds(&mut call), vec![H245MessageKind::TerminalCapabilitySetAck]);

        call.on_tcs(3, Some(peer_capabilities())).unwrap();
        assert_eq!(sent_kinds(&mut call), vec![H245MessageKind::TerminalCapabilitySetReject]);
        assert_eq!(call.remote_tcs_seq, Some(5));
        assert_eq!(call.state(), CallState::Connected);
    }

    #[test]
    fn test_both_sets_acked_starts_determination() {
        let mut call = active_call("acked");
        call.on_tcs(1, Some(peer_capabilities())).unwrap();
        assert_eq!(call.caps.joint().len(), 1);
        sent_kinds(&mut call);

        call.on_tcs_ack(call.local_tcs_seq).unwrap();
        assert_eq!(call.local_tcs_state(), LocalTcsState::SetAckReceived);
        assert!(!call.timers.is_active(TimerKind::TcsResponse));
        assert_eq!(sent_kinds(&mut call), vec![H245MessageKind::MasterSlaveDetermination]);
    }

    #[test]
    fn test_empty_set_pauses_then_resumes() {
        let mut call = active_call("reroute");
        call.on_tcs(1, Some(peer_capabilities())).unwrap();
        let cap = call.caps.select_transmit(MediaType::Audio, false).cloned().unwrap();
        call.open_channel(cap).unwrap();
        let lcn = call.channels.iter().next().unwrap().number;
        call.on_open_logical_channel_ack(OpenLogicalChannelAck {
            forward_lcn: lcn,
            reverse_lcn: None,
            session_id: Some(1),
            media_channel: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 2), 20000)),
            media_control_channel: Some(TransportAddress::new(Ipv4Addr::new(10, 0, 0, 2), 20001)),
        })
        .unwrap();
        sent_kinds(&mut call);

        call.on_tcs(2, None).unwrap();
        assert_eq!(call.state(), CallState::Paused);
        assert_eq!(call.h245_state(), H245SessionState::Paused);
        assert_eq!(call.remote_tcs_state(), RemoteTcsState::Idle);
        assert!(call.caps.joint().is_empty());
        assert_eq!(
            sent_kinds(&mut call),
            vec![H245MessageKind::TerminalCapabilitySetAck, H245MessageKind::CloseLogicalChannel]
        );

        call.on_tcs(3, Some(peer_capabilities())).unwrap();
        assert_eq!(call.state(), CallState::Connected);
        assert_eq!(call.h245_state(), H245SessionState::Active);
        assert_eq!(call.master_slave().state, MasterSlaveState::Idle);
        assert_eq!(call.local_tcs_state(), LocalTcsState::SetSent);
        assert_eq!(call.caps.joint().len(), 1);
        assert_eq!(
            sent_kinds(&mut call),
            vec![H245MessageKind::TerminalCapabilitySetAck, H245MessageKind::TerminalCapabilitySet]
        );
    }

    #[test]
    fn test_rejected_set_clears_call() {
        let mut call = active_call("refused");
        call.on_tcs_reject(call.local_tcs_seq).unwrap();
        assert_eq!(call.state(), CallState::Clear);
        assert_eq!(call.end_reason(), CallClearReason::NoCommonCapabilities);
        assert!(!call.timers.is_active(TimerKind::TcsResponse));
    }
}
