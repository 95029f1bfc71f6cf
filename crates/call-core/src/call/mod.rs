//! The call aggregate
//!
//! A [`Call`] holds everything about one H.323 call: the main state and
//! the three H.245 state axes, the capability bins, logical channels,
//! aliases, timers and the messages waiting for the transport. All of it
//! is mutated under the call's lock; Q.931 handling, H.245 procedures and
//! fast start are implemented as further `impl Call` blocks in their own
//! modules.
//!
//! Nothing in here talks to the network. Built messages are collected as
//! [`EngineEvent`]s and lifecycle notifications as [`CallEvent`]s; the
//! engine drains both after each operation.

pub mod destination;
pub mod state;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use h323_wire_core::h245::capability::MediaType;
use h323_wire_core::h245::message::{H245Message, H245MessageKind};
use h323_wire_core::{AliasAddress, AliasKind, CallIdentifier, ConferenceIdentifier, Q931Cause, TransportAddress};
use serde::{Deserialize, Serialize};
use tracing::{Span, debug, info, warn};

use crate::callbacks::CallEvent;
use crate::capability::{CallCapabilities, CapabilityDescriptor, DtmfMode};
use crate::cause::CallClearReason;
use crate::channel::{ChannelDirection, ChannelManager, LogicalChannel, RtpPorts};
use crate::context::EndpointContext;
use crate::error::{CallError, Result};
use crate::logging::call_span;
use crate::outbound::{EngineEvent, OutboundKind, OutboundMessage};
use crate::timer::{PendingTimer, TimerKind, TimerList};

pub use destination::Destination;
pub use state::{CallFlags, CallState, H245SessionState, LocalTcsState, MasterSlaveState, RemoteTcsState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallDirection::Incoming => f.write_str("incoming"),
            CallDirection::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// Media the call carries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMode {
    #[default]
    Audio,
    Video,
    /// T.38 fax has replaced audio
    Fax,
}

/// Where a forwarded call should be re-placed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardData {
    pub address: Option<TransportAddress>,
    pub aliases: Vec<AliasAddress>,
    pub forwarded_by_remote: bool,
}

/// Master/slave determination progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MasterSlave {
    pub state: MasterSlaveState,
    pub status_determination_number: u32,
    pub retries: u32,
}

#[derive(Debug)]
pub struct Call {
    pub(crate) ctx: Arc<EndpointContext>,
    token: String,
    direction: CallDirection,
    pub mode: CallMode,

    pub call_reference: u16,
    pub call_identifier: CallIdentifier,
    pub conference_id: ConferenceIdentifier,

    state: CallState,
    pub(crate) h245_state: H245SessionState,
    pub(crate) msd: MasterSlave,
    pub(crate) local_tcs: LocalTcsState,
    pub(crate) local_tcs_seq: u8,
    pub(crate) remote_tcs: RemoteTcsState,
    pub(crate) remote_tcs_seq: Option<u8>,
    pub flags: CallFlags,

    end_reason: Option<CallClearReason>,
    q931_cause: Option<Q931Cause>,

    pub local_address: TransportAddress,
    pub remote_address: Option<TransportAddress>,
    /// Our H.245 listener, advertised when not tunneling
    pub local_h245_address: Option<TransportAddress>,
    pub remote_h245_address: Option<TransportAddress>,
    pub(crate) h245_connect_attempts: u32,

    pub caps: CallCapabilities,
    pub channels: ChannelManager,
    pub(crate) media_ports: HashMap<MediaType, RtpPorts>,

    pub local_aliases: Vec<AliasAddress>,
    pub remote_aliases: Vec<AliasAddress>,
    pub calling_party_number: Option<String>,
    pub called_party_number: Option<String>,
    pub display_name: Option<String>,
    pub remote_display_name: Option<String>,
    pub forward: Option<ForwardData>,

    /// Outgoing calls have nothing to release until Setup is sent
    pub(crate) signaling_started: bool,
    pub(crate) admitted: bool,
    pub(crate) needs_admission: bool,
    pub(crate) fast_start_elements: Option<Vec<Bytes>>,
    pub(crate) remote_fast_start: Vec<Bytes>,
    /// H.245 waiting for a Q.931 carrier or the H.245 connection
    pub(crate) h245_queue: Vec<(H245MessageKind, Option<u16>, Bytes)>,
    pub(crate) channels_requested: bool,
    pub(crate) timers: TimerList,

    outbox: Vec<EngineEvent>,
    events: Vec<CallEvent>,

    pub created_at: DateTime<Utc>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    span: Span,
}

impl Call {
    pub fn new(ctx: Arc<EndpointContext>, token: impl Into<String>, direction: CallDirection) -> Self {
        let token = token.into();
        let defaults = &ctx.defaults;
        let flags = CallFlags {
            fast_start: defaults.fast_start,
            tunneling: defaults.tunneling,
            media_wait_for_connect: defaults.media_wait_for_connect,
            manual_ringback: defaults.manual_ringback,
            auto_answer: defaults.auto_answer,
            try_be_master: defaults.try_be_master,
            ..Default::default()
        };
        let outgoing = direction == CallDirection::Outgoing;
        let mut caps = CallCapabilities::new(ctx.capabilities(), ctx.preferences().clone(), ctx.dtmf_modes());
        caps.rfc2833_payload_type = defaults.dtmf.rfc2833_payload_type;
        caps.cisco_payload_type = defaults.dtmf.cisco_payload_type;
        let span = call_span(&token, direction);

        let call = Self {
            token,
            direction,
            mode: CallMode::Audio,
            call_reference: ctx.call_references.next(),
            call_identifier: CallIdentifier::generate(),
            conference_id: ConferenceIdentifier::generate(),
            state: CallState::Created,
            h245_state: H245SessionState::Idle,
            msd: MasterSlave {
                state: MasterSlaveState::Idle,
                status_determination_number: crate::h245::msd::random_sdn(),
                retries: 0,
            },
            local_tcs: LocalTcsState::Idle,
            local_tcs_seq: 0,
            remote_tcs: RemoteTcsState::Idle,
            remote_tcs_seq: None,
            flags,
            end_reason: None,
            q931_cause: None,
            local_address: TransportAddress::new(defaults.local_ip, defaults.h225_port),
            remote_address: None,
            local_h245_address: None,
            remote_h245_address: None,
            h245_connect_attempts: 0,
            caps,
            channels: ChannelManager::new(defaults.lcn_base, defaults.lcn_max),
            media_ports: HashMap::new(),
            local_aliases: if outgoing { defaults.aliases.clone() } else { Vec::new() },
            remote_aliases: Vec::new(),
            calling_party_number: if outgoing { defaults.calling_party_number.clone() } else { None },
            called_party_number: None,
            display_name: Some(defaults.caller_id.clone()),
            remote_display_name: None,
            forward: None,
            signaling_started: !outgoing,
            admitted: false,
            needs_admission: false,
            fast_start_elements: None,
            remote_fast_start: Vec::new(),
            h245_queue: Vec::new(),
            channels_requested: false,
            timers: TimerList::new(),
            outbox: Vec::new(),
            events: vec![CallEvent::NewCallCreated],
            created_at: Utc::now(),
            connected_at: None,
            ended_at: None,
            span,
            ctx,
        };
        info!(parent: &call.span, call_reference = call.call_reference, "call created");
        call
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn h245_state(&self) -> H245SessionState {
        self.h245_state
    }

    pub fn master_slave(&self) -> MasterSlave {
        self.msd
    }

    pub fn local_tcs_state(&self) -> LocalTcsState {
        self.local_tcs
    }

    pub fn remote_tcs_state(&self) -> RemoteTcsState {
        self.remote_tcs
    }

    pub fn is_master(&self) -> bool {
        self.msd.state == MasterSlaveState::Master
    }

    /// Why the call is clearing; `Unknown` until a reason is recorded
    pub fn end_reason(&self) -> CallClearReason {
        self.end_reason.unwrap_or(CallClearReason::Unknown)
    }

    pub fn q931_cause(&self) -> Option<Q931Cause> {
        self.q931_cause
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn context(&self) -> &Arc<EndpointContext> {
        &self.ctx
    }

    /// Move the main state, refusing illegal transitions
    pub(crate) fn transition(&mut self, next: CallState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            warn!(parent: &self.span, from = %self.state, to = %next, "illegal call state transition");
            return Err(CallError::invalid_transition(self.state, next));
        }
        if self.state != next {
            info!(parent: &self.span, from = %self.state, to = %next, "call state changed");
            self.state = next;
        }
        Ok(())
    }

    /// Record why the call ends and move it to `Clear`
    ///
    /// The first reason recorded wins; later ones are only logged.
    pub fn mark_for_clearing(&mut self, reason: CallClearReason, cause: Option<Q931Cause>) {
        match self.end_reason {
            None => {
                info!(parent: &self.span, %reason, "call marked for clearing");
                self.end_reason = Some(reason);
                self.q931_cause = cause;
            }
            Some(existing) => {
                debug!(parent: &self.span, %existing, ignored = %reason, "clear reason already recorded");
            }
        }
        if !self.state.is_clearing() {
            self.state = CallState::Clear;
            info!(parent: &self.span, to = %self.state, "call state changed");
        }
        self.ended_at.get_or_insert_with(Utc::now);
    }

    /// Decide what clearing still needs to go on the wire
    ///
    /// Sends at most one EndSessionCommand and one ReleaseComplete over
    /// the life of the call. A call already released, or with nothing to
    /// release, is cleaned up instead.
    pub fn end(&mut self) -> Result<()> {
        match self.state {
            CallState::Removed => return Ok(()),
            CallState::Cleared | CallState::ClearReleaseSent => {
                self.clean();
                return Ok(());
            }
            _ => {}
        }
        if !self.state.is_clearing() {
            self.mark_for_clearing(CallClearReason::LocalCleared, None);
        }
        if !self.signaling_started || self.call_identifier.is_nil() {
            debug!(parent: &self.span, "no signaling exchanged, nothing to release");
            return self.transition(CallState::Cleared);
        }

        self.clear_channels();

        if !self.flags.end_session_built
            && matches!(self.h245_state, H245SessionState::Active | H245SessionState::Paused)
        {
            self.send_end_session()?;
        }

        if !self.flags.release_built && matches!(self.state, CallState::Clear | CallState::ClearReleaseRecvd) {
            self.send_release_complete()?;
        }
        Ok(())
    }

    /// Tear the call down and mark it `Removed`
    ///
    /// The engine detaches the call from the gatekeeper and the registry
    /// once it sees the terminal state.
    pub(crate) fn clean(&mut self) {
        if self.state == CallState::Removed {
            return;
        }
        self.clear_channels();
        self.close_h245();
        self.outbox.push(EngineEvent::CloseTransport { token: self.token.clone() });
        self.timers.clear();
        self.h245_queue.clear();
        self.state = CallState::Removed;
        self.ended_at.get_or_insert_with(Utc::now);

        let forwarded = self.forward.as_ref().is_some_and(|f| f.forwarded_by_remote);
        info!(parent: &self.span, reason = %self.end_reason(), forwarded, "call cleaned up");
        self.events.push(if forwarded { CallEvent::CallForwarded } else { CallEvent::CallCleared });
    }

    /// Stop media on every channel and forget them
    pub(crate) fn clear_channels(&mut self) {
        for channel in self.channels.drain() {
            self.stop_media(&channel);
        }
    }

    /// Close the H.245 session and, if separate, its connection
    pub(crate) fn close_h245(&mut self) {
        if matches!(self.h245_state, H245SessionState::Idle | H245SessionState::Closed) {
            return;
        }
        debug!(parent: &self.span, from = ?self.h245_state, "H.245 session closed");
        self.h245_state = H245SessionState::Closed;
        if self.flags.h245_connected {
            self.flags.h245_connected = false;
            self.outbox.push(EngineEvent::CloseH245 { token: self.token.clone() });
        }
    }

    pub(crate) fn push_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    pub(crate) fn push_outbound(&mut self, kind: OutboundKind, logical_channel: Option<u16>, payload: Bytes) {
        self.outbox.push(EngineEvent::Outbound(OutboundMessage {
            token: self.token.clone(),
            kind,
            logical_channel,
            payload,
        }));
    }

    pub(crate) fn push_engine_event(&mut self, event: EngineEvent) {
        self.outbox.push(event);
    }

    /// Lifecycle events recorded since the last call
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Transport work recorded since the last call
    pub fn take_outbox(&mut self) -> Vec<EngineEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub(crate) fn take_pending_timers(&mut self) -> Vec<PendingTimer> {
        self.timers.take_pending()
    }

    pub(crate) fn start_timer(&mut self, kind: TimerKind) {
        let t = &self.ctx.defaults.timeouts;
        let secs = match kind {
            TimerKind::H245ConnectRetry => t.h245_connect_retry_interval,
            TimerKind::MsdResponse => t.msd_response,
            TimerKind::TcsResponse => t.tcs_response,
            TimerKind::OpenLogicalChannel(_)
            | TimerKind::CloseLogicalChannel(_)
            | TimerKind::RequestChannelClose(_) => t.logical_channel,
            TimerKind::SessionEnd => t.session_close,
            TimerKind::Establishment => t.call_establishment,
        };
        self.timers.start(kind, Duration::from_secs(secs));
    }

    /// Local RTP/RTCP pair for a media type, allocated on first use
    pub(crate) fn media_ports(&mut self, media_type: MediaType) -> RtpPorts {
        let pool = &self.ctx.rtp_ports;
        *self.media_ports.entry(media_type).or_insert_with(|| pool.allocate())
    }

    pub(crate) fn start_media(&self, channel: &LogicalChannel) {
        let Some(ops) = &channel.capability.ops else {
            debug!(parent: &self.span, lcn = channel.number, "no media operations for channel");
            return;
        };
        let result = match channel.direction {
            ChannelDirection::Receive => ops.start_receive(&self.token, channel),
            ChannelDirection::Transmit => ops.start_transmit(&self.token, channel),
        };
        if let Err(e) = result {
            warn!(parent: &self.span, lcn = channel.number, direction = %channel.direction, "failed to start media: {}", e);
        }
    }

    pub(crate) fn stop_media(&self, channel: &LogicalChannel) {
        if !channel.is_established() {
            return;
        }
        let Some(ops) = &channel.capability.ops else {
            return;
        };
        let result = match channel.direction {
            ChannelDirection::Receive => ops.stop_receive(&self.token, channel),
            ChannelDirection::Transmit => ops.stop_transmit(&self.token, channel),
        };
        if let Err(e) = result {
            warn!(parent: &self.span, lcn = channel.number, direction = %channel.direction, "failed to stop media: {}", e);
        }
    }

    /// Extension the caller dialed
    ///
    /// The called party number, then a local alias (dialed digits, H.323
    /// ID, email user part), then `"s"`.
    pub fn destination_extension(&self) -> String {
        if let Some(number) = self.called_party_number.as_deref().filter(|n| !n.is_empty()) {
            return number.to_string();
        }
        for kind in [AliasKind::DialedDigits, AliasKind::H323Id, AliasKind::EmailId] {
            if let Some(alias) = self.local_aliases.iter().find(|a| a.kind == kind) {
                return match kind {
                    AliasKind::EmailId => alias.value.split('@').next().unwrap_or_default().to_string(),
                    _ => alias.value.clone(),
                };
            }
        }
        "s".to_string()
    }

    pub fn add_alias(&mut self, alias: AliasAddress, local: bool) -> Result<()> {
        alias.validate().map_err(CallError::alias_invalid)?;
        debug!(parent: &self.span, %alias, local, "alias added");
        if local {
            self.local_aliases.push(alias);
        } else {
            self.remote_aliases.push(alias);
        }
        Ok(())
    }

    pub fn set_calling_party_number(&mut self, number: impl Into<String>) -> Result<()> {
        let number = number.into();
        AliasAddress::dialed_digits(number.as_str())
            .validate()
            .map_err(CallError::alias_invalid)?;
        self.calling_party_number = Some(number);
        Ok(())
    }

    pub fn set_called_party_number(&mut self, number: impl Into<String>) -> Result<()> {
        let number = number.into();
        AliasAddress::dialed_digits(number.as_str())
            .validate()
            .map_err(CallError::alias_invalid)?;
        self.called_party_number = Some(number);
        Ok(())
    }

    /// Offer a capability on this call only
    pub fn add_capability(&mut self, capability: CapabilityDescriptor) -> Result<()> {
        if self.fast_start_elements.is_some() || self.local_tcs != LocalTcsState::Idle {
            warn!(parent: &self.span, cap = %capability.cap, "capability added after it was advertised");
        }
        self.caps.add_local(capability)
    }

    pub fn enable_dtmf(&mut self, mode: DtmfMode) {
        self.caps.enable_dtmf(mode);
    }

    pub fn disable_dtmf(&mut self, mode: DtmfMode) {
        self.caps.disable_dtmf(mode);
    }

    /// Apply an expired timer that was still registered
    pub(crate) fn on_timer(&mut self, kind: TimerKind) -> Result<()> {
        debug!(parent: &self.span, ?kind, "timer expired");
        match kind {
            TimerKind::H245ConnectRetry => self.retry_h245_connect(),
            TimerKind::MsdResponse => {
                self.send_h245(H245Message::MasterSlaveDeterminationRelease)?;
                self.msd.state = MasterSlaveState::Idle;
                self.mark_for_clearing(CallClearReason::LocalCleared, None);
                Ok(())
            }
            TimerKind::TcsResponse => {
                self.send_h245(H245Message::TerminalCapabilitySetRelease)?;
                self.mark_for_clearing(CallClearReason::LocalCleared, None);
                Ok(())
            }
            TimerKind::OpenLogicalChannel(lcn) => {
                self.send_close_logical_channel(lcn)?;
                if let Some(channel) = self.channels.remove(lcn, ChannelDirection::Transmit) {
                    self.stop_media(&channel);
                }
                self.mark_for_clearing(CallClearReason::LocalCleared, None);
                Ok(())
            }
            TimerKind::CloseLogicalChannel(lcn) => {
                if let Some(channel) = self.channels.remove(lcn, ChannelDirection::Transmit) {
                    self.stop_media(&channel);
                }
                self.mark_for_clearing(CallClearReason::LocalCleared, None);
                Ok(())
            }
            TimerKind::RequestChannelClose(lcn) => {
                if let Some(channel) = self.channels.remove(lcn, ChannelDirection::Receive) {
                    self.stop_media(&channel);
                }
                self.mark_for_clearing(CallClearReason::LocalCleared, None);
                Ok(())
            }
            TimerKind::SessionEnd => {
                self.close_h245();
                if self.state == CallState::ClearReleaseSent {
                    self.transition(CallState::Cleared)?;
                }
                Ok(())
            }
            TimerKind::Establishment => {
                if self.state < CallState::Connected {
                    let reason = match self.direction {
                        CallDirection::Outgoing => CallClearReason::RemoteNoAnswer,
                        CallDirection::Incoming => CallClearReason::LocalNotAnswered,
                    };
                    self.mark_for_clearing(reason, None);
                }
                Ok(())
            }
        }
    }
}
