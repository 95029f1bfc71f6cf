//! Logical channel signaling over H.245

use h323_wire_core::h245::capability::{CapType, MediaType};
use h323_wire_core::h245::message::{ChannelCloseSource, H245Message};
use h323_wire_core::h245::olc::{
    DataType, H2250Parameters, LogicalChannelParameters, OlcDirection, OlcRejectCause, OpenLogicalChannel,
    OpenLogicalChannelAck,
};
use tracing::{debug, info, warn};

use crate::call::{Call, CallMode};
use crate::callbacks::CallEvent;
use crate::capability::CapabilityDescriptor;
use crate::cause::CallClearReason;
use crate::channel::{ChannelDirection, ChannelState, LogicalChannel};
use crate::error::{CallError, Result};
use crate::timer::TimerKind;

impl Call {
    /// Open the default transmit channels
    ///
    /// One audio channel, plus video when the call is a video call. Media
    /// that already has a transmit channel, from fast start for example,
    /// is left alone.
    pub fn open_default_channels(&mut self) -> Result<()> {
        if self.state().is_clearing() {
            return Ok(());
        }
        let master = self.is_master();
        let mut wanted = vec![MediaType::Audio];
        if self.mode == CallMode::Video {
            wanted.push(MediaType::Video);
        }

        for media in wanted {
            if self.channels.has_media(media, ChannelDirection::Transmit) {
                continue;
            }
            match self.caps.select_transmit(media, master).cloned() {
                Some(cap) => self.open_channel(cap)?,
                None if media == MediaType::Audio => {
                    warn!(parent: self.span(), "no joint audio capability");
                    self.mark_for_clearing(CallClearReason::NoCommonCapabilities, None);
                    return Ok(());
                }
                None => debug!(parent: self.span(), ?media, "no joint capability, channel not opened"),
            }
        }
        Ok(())
    }

    /// Propose a transmit channel for one capability
    pub fn open_channel(&mut self, capability: CapabilityDescriptor) -> Result<()> {
        if !capability.can_transmit() {
            return Err(CallError::not_supported(format!("{} is not a transmit capability", capability.cap)));
        }
        let media_type = capability.media_type();
        let number = self.channels.next_number()?;
        let master = self.is_master();
        let session_id = self
            .channels
            .session_id_for(media_type, ChannelDirection::Transmit, master)
            .unwrap_or(0);
        let ports = self.media_ports(media_type);

        let olc = OpenLogicalChannel {
            forward_lcn: number,
            forward: LogicalChannelParameters {
                data_type: DataType::Media(capability.to_media_capability(false)),
                h2250: Some(H2250Parameters {
                    session_id,
                    media_channel: None,
                    media_control_channel: Some(ports.rtcp),
                    dynamic_payload_type: None,
                }),
            },
            reverse: None,
        };
        info!(parent: self.span(), lcn = number, cap = %capability.cap, session = session_id, "opening logical channel");

        self.channels.add(LogicalChannel {
            number,
            session_id,
            media_type,
            direction: ChannelDirection::Transmit,
            state: ChannelState::Proposed,
            capability,
            local_rtp: None,
            local_rtcp: Some(ports.rtcp),
            remote_rtp: None,
            remote_rtcp: None,
        });
        self.send_h245(H245Message::OpenLogicalChannel(olc))?;
        self.start_timer(TimerKind::OpenLogicalChannel(number));
        Ok(())
    }

    pub(super) fn on_open_logical_channel_ack(&mut self, ack: OpenLogicalChannelAck) -> Result<()> {
        let lcn = ack.forward_lcn;
        self.timers.delete(TimerKind::OpenLogicalChannel(lcn));
        let Some(channel) = self.channels.find_mut(lcn, ChannelDirection::Transmit) else {
            warn!(parent: self.span(), lcn, "ack for unknown logical channel");
            return Ok(());
        };
        channel.remote_rtp = ack.media_channel;
        channel.remote_rtcp = ack.media_control_channel;
        if let Some(session) = ack.session_id.filter(|s| *s != 0) {
            channel.session_id = session;
        }

        match self.channels.establish(lcn, ChannelDirection::Transmit) {
            Ok(channel) => {
                let channel = channel.clone();
                self.on_channel_established(&channel);
                Ok(())
            }
            Err(CallError::DuplicateSession { session_id, .. }) => {
                warn!(parent: self.span(), lcn, session = session_id, "session already established, closing channel");
                self.channels.remove(lcn, ChannelDirection::Transmit);
                self.send_h245(H245Message::CloseLogicalChannel { forward_lcn: lcn, source: ChannelCloseSource::User })
            }
            Err(e) => Err(e),
        }
    }

    pub(super) fn on_open_logical_channel_reject(&mut self, lcn: u16, cause: OlcRejectCause) -> Result<()> {
        self.timers.delete(TimerKind::OpenLogicalChannel(lcn));
        let Some(channel) = self.channels.remove(lcn, ChannelDirection::Transmit) else {
            debug!(parent: self.span(), lcn, "reject for unknown logical channel");
            return Ok(());
        };
        warn!(parent: self.span(), lcn, ?cause, cap = %channel.capability.cap, "logical channel rejected");
        if !self.channels.has_media(channel.media_type, ChannelDirection::Transmit) {
            self.mark_for_clearing(CallClearReason::NoCommonCapabilities, None);
        }
        Ok(())
    }

    pub(super) fn on_open_logical_channel(&mut self, olc: OpenLogicalChannel) -> Result<()> {
        let lcn = olc.forward_lcn;
        let reject = |cause| H245Message::OpenLogicalChannelReject { forward_lcn: lcn, cause };

        if olc.direction() != Some(OlcDirection::Forward) {
            debug!(parent: self.span(), lcn, direction = ?olc.direction(), "unsupported channel proposal");
            return self.send_h245(reject(OlcRejectCause::DataTypeNotSupported));
        }
        let Some(remote_cap) = olc.forward.data_type.capability() else {
            return self.send_h245(reject(OlcRejectCause::DataTypeNotSupported));
        };
        let Some(local) = self.caps.receivable(remote_cap) else {
            debug!(parent: self.span(), lcn, cap = %remote_cap.cap_type(), "cannot receive proposed capability");
            return self.send_h245(reject(OlcRejectCause::DataTypeNotSupported));
        };

        let media_type = remote_cap.media_type();
        let remote = olc.forward.h2250.clone().unwrap_or_default();
        let session_id = if remote.session_id == 0 {
            self.channels
                .session_id_for(media_type, ChannelDirection::Receive, self.is_master())
                .unwrap_or(media_type.default_session_id())
        } else {
            remote.session_id
        };
        let ports = self.media_ports(media_type);

        self.channels.remove(lcn, ChannelDirection::Receive);
        self.channels.add(LogicalChannel {
            number: lcn,
            session_id,
            media_type,
            direction: ChannelDirection::Receive,
            state: ChannelState::Proposed,
            capability: local,
            local_rtp: Some(ports.rtp),
            local_rtcp: Some(ports.rtcp),
            remote_rtp: None,
            remote_rtcp: remote.media_control_channel,
        });
        let channel = match self.channels.establish(lcn, ChannelDirection::Receive) {
            Ok(channel) => channel.clone(),
            Err(CallError::DuplicateSession { session_id, .. }) => {
                warn!(parent: self.span(), lcn, session = session_id, "receive session already established");
                self.channels.remove(lcn, ChannelDirection::Receive);
                return self.send_h245(reject(OlcRejectCause::InvalidSessionId));
            }
            Err(e) => return Err(e),
        };

        self.send_h245(H245Message::OpenLogicalChannelAck(OpenLogicalChannelAck {
            forward_lcn: lcn,
            reverse_lcn: None,
            session_id: Some(session_id),
            media_channel: Some(ports.rtp),
            media_control_channel: Some(ports.rtcp),
        }))?;
        info!(parent: self.span(), lcn, cap = %channel.capability.cap, session = session_id, "receive channel opened");
        self.on_channel_established(&channel);
        Ok(())
    }

    pub(super) fn on_close_logical_channel(&mut self, lcn: u16) -> Result<()> {
        match self.channels.remove(lcn, ChannelDirection::Receive) {
            Some(channel) => {
                debug!(parent: self.span(), lcn, "peer closed receive channel");
                self.stop_media(&channel);
                self.on_channel_removed(&channel);
            }
            None => debug!(parent: self.span(), lcn, "close for unknown logical channel"),
        }
        self.send_h245(H245Message::CloseLogicalChannelAck { forward_lcn: lcn })
    }

    pub(super) fn on_close_logical_channel_ack(&mut self, lcn: u16) -> Result<()> {
        self.timers.delete(TimerKind::CloseLogicalChannel(lcn));
        if let Some(channel) = self.channels.remove(lcn, ChannelDirection::Transmit) {
            debug!(parent: self.span(), lcn, "transmit channel closed");
            self.stop_media(&channel);
            self.on_channel_removed(&channel);
        }
        Ok(())
    }

    /// Ask the peer to drop one of our transmit channels
    pub(crate) fn send_close_logical_channel(&mut self, lcn: u16) -> Result<()> {
        self.send_h245(H245Message::CloseLogicalChannel { forward_lcn: lcn, source: ChannelCloseSource::User })?;
        self.start_timer(TimerKind::CloseLogicalChannel(lcn));
        Ok(())
    }

    /// Ask the peer to close a channel it transmits to us
    pub fn request_channel_close(&mut self, lcn: u16) -> Result<()> {
        if self.channels.find(lcn, ChannelDirection::Receive).is_none() {
            return Err(CallError::ChannelNotFound(lcn));
        }
        self.send_h245(H245Message::RequestChannelClose { forward_lcn: lcn })?;
        self.start_timer(TimerKind::RequestChannelClose(lcn));
        Ok(())
    }

    pub(super) fn on_request_channel_close(&mut self, lcn: u16) -> Result<()> {
        if self.channels.find(lcn, ChannelDirection::Transmit).is_none() {
            debug!(parent: self.span(), lcn, "request to close unknown channel");
            return self.send_h245(H245Message::RequestChannelCloseReject { forward_lcn: lcn });
        }
        self.send_h245(H245Message::RequestChannelCloseAck { forward_lcn: lcn })?;
        self.send_close_logical_channel(lcn)
    }

    /// Media start and mode bookkeeping for a freshly established channel
    pub(crate) fn on_channel_established(&mut self, channel: &LogicalChannel) {
        self.start_media(channel);
        if channel.capability.cap == CapType::T38 && self.mode != CallMode::Fax {
            info!(parent: self.span(), lcn = channel.number, "call switched to T.38");
            self.mode = CallMode::Fax;
            self.push_event(CallEvent::ModeChanged { t38: true });
        }
    }

    fn on_channel_removed(&mut self, channel: &LogicalChannel) {
        let t38_left = self.channels.iter().any(|c| c.capability.cap == CapType::T38);
        if channel.capability.cap == CapType::T38 && self.mode == CallMode::Fax && !t38_left {
            info!(parent: self.span(), "call switched back to audio");
            self.mode = CallMode::Audio;
            self.push_event(CallEvent::ModeChanged { t38: false });
        }
    }
}
