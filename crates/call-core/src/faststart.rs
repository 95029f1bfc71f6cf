//! Fast start: logical channels carried in the H.225 messages
//!
//! The caller puts one proposal per direction and capability into Setup.
//! The callee answers in CallProceeding, Alerting, Progress or Connect
//! with the proposals it accepts, and media can flow before any H.245
//! exchange. Both the offer and the answer are built once per call and
//! then returned from cache, so every message that carries them carries
//! the same bytes.

use bytes::Bytes;
use h323_wire_core::h245::capability::MediaType;
use h323_wire_core::h245::olc::{
    DataType, H2250Parameters, LogicalChannelParameters, OlcDirection, OpenLogicalChannel,
};
use tracing::{debug, info, warn};

use crate::call::{Call, CallMode};
use crate::channel::{ChannelDirection, ChannelState, LogicalChannel};
use crate::error::{CallError, Result};

impl Call {
    /// Proposals to put in Setup
    pub fn fast_start_offer(&mut self) -> Result<Vec<Bytes>> {
        if let Some(cached) = &self.fast_start_elements {
            return Ok(cached.clone());
        }

        let local: Vec<_> = self.caps.ordered_local().into_iter().cloned().collect();
        let mut elements = Vec::new();
        for cap in local {
            let media_type = cap.media_type();
            if media_type == MediaType::Video && self.mode != CallMode::Video {
                continue;
            }
            let session_id = media_type.default_session_id();
            let ports = self.media_ports(media_type);

            if cap.can_receive() {
                let number = self.channels.next_number()?;
                let olc = OpenLogicalChannel {
                    forward_lcn: number,
                    forward: LogicalChannelParameters::null(),
                    reverse: Some(LogicalChannelParameters {
                        data_type: DataType::Media(cap.to_media_capability(true)),
                        h2250: Some(H2250Parameters {
                            session_id,
                            media_channel: Some(ports.rtp),
                            media_control_channel: Some(ports.rtcp),
                            dynamic_payload_type: None,
                        }),
                    }),
                };
                elements.push(olc.encode()?);
                self.channels.add(LogicalChannel {
                    number,
                    session_id,
                    media_type,
                    direction: ChannelDirection::Receive,
                    state: ChannelState::ProposedFs,
                    capability: cap.clone(),
                    local_rtp: Some(ports.rtp),
                    local_rtcp: Some(ports.rtcp),
                    remote_rtp: None,
                    remote_rtcp: None,
                });
            }

            if cap.can_transmit() {
                let number = self.channels.next_number()?;
                let olc = OpenLogicalChannel {
                    forward_lcn: number,
                    forward: LogicalChannelParameters {
                        data_type: DataType::Media(cap.to_media_capability(false)),
                        h2250: Some(H2250Parameters {
                            session_id,
                            media_channel: None,
                            media_control_channel: Some(ports.rtcp),
                            dynamic_payload_type: None,
                        }),
                    },
                    reverse: None,
                };
                elements.push(olc.encode()?);
                self.channels.add(LogicalChannel {
                    number,
                    session_id,
                    media_type,
                    direction: ChannelDirection::Transmit,
                    state: ChannelState::ProposedFs,
                    capability: cap,
                    local_rtp: None,
                    local_rtcp: Some(ports.rtcp),
                    remote_rtp: None,
                    remote_rtcp: None,
                });
            }
        }

        if elements.is_empty() {
            warn!(parent: self.span(), "no capability to offer in fast start");
            self.flags.fast_start = false;
        } else {
            debug!(parent: self.span(), proposals = elements.len(), "fast-start offer built");
        }
        self.fast_start_elements = Some(elements.clone());
        Ok(elements)
    }

    /// Accepted proposals to return to the caller
    ///
    /// When nothing the caller proposed is acceptable, fast start is
    /// turned off for the call and channels are negotiated over H.245.
    pub fn fast_start_response(&mut self) -> Result<Vec<Bytes>> {
        if let Some(cached) = &self.fast_start_elements {
            return Ok(cached.clone());
        }
        if !self.flags.fast_start || self.remote_fast_start.is_empty() {
            return Ok(Vec::new());
        }

        let mut elements = Vec::new();
        for raw in self.remote_fast_start.clone() {
            let olc = match OpenLogicalChannel::decode(raw) {
                Ok(olc) => olc,
                Err(e) => {
                    warn!(parent: self.span(), "skipping undecodable fast-start proposal: {}", e);
                    continue;
                }
            };
            let held: Vec<(u16, ChannelDirection)> = self.channels.iter().map(|c| (c.number, c.direction)).collect();
            let answer = match olc.direction() {
                Some(OlcDirection::Forward) => self.accept_forward_proposal(&olc),
                Some(OlcDirection::Reverse) => self.accept_reverse_proposal(&olc),
                Some(OlcDirection::Bidirectional) | None => {
                    debug!(parent: self.span(), lcn = olc.forward_lcn, "bidirectional fast-start proposal not supported");
                    Ok(None)
                }
            };
            let encoded = answer.and_then(|answer| answer.map(|a| a.encode().map_err(CallError::from)).transpose());
            match encoded {
                Ok(Some(element)) => elements.push(element),
                Ok(None) => {}
                Err(e) => {
                    // Treated as rejected; drop whatever it set up
                    warn!(parent: self.span(), lcn = olc.forward_lcn, "fast-start proposal rejected: {}", e);
                    let dropped = self.channels.remove_where(|c| !held.contains(&(c.number, c.direction)));
                    for channel in &dropped {
                        self.stop_media(channel);
                    }
                }
            }
        }

        if elements.is_empty() {
            info!(parent: self.span(), "no fast-start proposal accepted, falling back to H.245");
            self.flags.fast_start = false;
        } else {
            self.flags.fast_start_answered = true;
        }
        self.fast_start_elements = Some(elements.clone());
        Ok(elements)
    }

    /// Peer transmits, we receive on the number it chose
    fn accept_forward_proposal(&mut self, olc: &OpenLogicalChannel) -> Result<Option<OpenLogicalChannel>> {
        let Some(remote_cap) = olc.forward.data_type.capability() else {
            return Ok(None);
        };
        let Some(local) = self.caps.receivable(remote_cap) else {
            debug!(parent: self.span(), cap = %remote_cap.cap_type(), "cannot receive proposed capability");
            return Ok(None);
        };
        let media_type = remote_cap.media_type();
        let remote = olc.forward.h2250.clone().unwrap_or_default();
        let session_id = if remote.session_id == 0 { media_type.default_session_id() } else { remote.session_id };
        if self.channels.session_established(session_id, ChannelDirection::Receive)
            || self.channels.find(olc.forward_lcn, ChannelDirection::Receive).is_some()
        {
            debug!(parent: self.span(), session = session_id, "receive session already set up");
            return Ok(None);
        }

        let ports = self.media_ports(media_type);
        self.channels.add(LogicalChannel {
            number: olc.forward_lcn,
            session_id,
            media_type,
            direction: ChannelDirection::Receive,
            state: ChannelState::ProposedFs,
            capability: local,
            local_rtp: Some(ports.rtp),
            local_rtcp: Some(ports.rtcp),
            remote_rtp: None,
            remote_rtcp: remote.media_control_channel,
        });
        let channel = self.channels.establish(olc.forward_lcn, ChannelDirection::Receive)?.clone();
        self.on_channel_established(&channel);

        Ok(Some(OpenLogicalChannel {
            forward_lcn: olc.forward_lcn,
            forward: LogicalChannelParameters {
                data_type: olc.forward.data_type.clone(),
                h2250: Some(H2250Parameters {
                    session_id,
                    media_channel: Some(ports.rtp),
                    media_control_channel: Some(ports.rtcp),
                    dynamic_payload_type: remote.dynamic_payload_type,
                }),
            },
            reverse: None,
        }))
    }

    /// Peer receives, we transmit on a number of our own
    fn accept_reverse_proposal(&mut self, olc: &OpenLogicalChannel) -> Result<Option<OpenLogicalChannel>> {
        let Some(params) = &olc.reverse else {
            return Ok(None);
        };
        let Some(remote_cap) = params.data_type.capability() else {
            return Ok(None);
        };
        let Some(local) = self.caps.transmittable(remote_cap) else {
            debug!(parent: self.span(), cap = %remote_cap.cap_type(), "cannot transmit proposed capability");
            return Ok(None);
        };
        let media_type = remote_cap.media_type();
        let remote = params.h2250.clone().unwrap_or_default();
        let session_id = if remote.session_id == 0 { media_type.default_session_id() } else { remote.session_id };
        if self.channels.session_established(session_id, ChannelDirection::Transmit) {
            debug!(parent: self.span(), session = session_id, "transmit session already set up");
            return Ok(None);
        }
        let Some(remote_rtp) = remote.media_channel else {
            warn!(parent: self.span(), lcn = olc.forward_lcn, "reverse proposal without a media address");
            return Ok(None);
        };

        let number = self.channels.next_number()?;
        let ports = self.media_ports(media_type);
        let offered = local.to_media_capability(false);
        self.channels.add(LogicalChannel {
            number,
            session_id,
            media_type,
            direction: ChannelDirection::Transmit,
            state: ChannelState::ProposedFs,
            capability: local,
            local_rtp: None,
            local_rtcp: Some(ports.rtcp),
            remote_rtp: Some(remote_rtp),
            remote_rtcp: remote.media_control_channel,
        });
        let channel = self.channels.establish(number, ChannelDirection::Transmit)?.clone();
        self.on_channel_established(&channel);

        Ok(Some(OpenLogicalChannel {
            forward_lcn: number,
            forward: LogicalChannelParameters::null(),
            reverse: Some(LogicalChannelParameters {
                data_type: DataType::Media(offered),
                h2250: Some(H2250Parameters {
                    session_id,
                    media_channel: Some(remote_rtp),
                    media_control_channel: Some(ports.rtcp),
                    dynamic_payload_type: remote.dynamic_payload_type,
                }),
            }),
        }))
    }

    /// Apply the callee's answer to our offer
    ///
    /// Only the first answer counts. Proposals the callee did not accept
    /// are dropped.
    pub(crate) fn process_fast_start_answer(&mut self, elements: &[Bytes]) -> Result<()> {
        if elements.is_empty() || !self.flags.fast_start || self.flags.fast_start_answered {
            return Ok(());
        }

        for raw in elements {
            let olc = match OpenLogicalChannel::decode(raw.clone()) {
                Ok(olc) => olc,
                Err(e) => {
                    warn!(parent: self.span(), "skipping undecodable fast-start answer: {}", e);
                    continue;
                }
            };
            match olc.direction() {
                Some(OlcDirection::Forward) => self.accept_transmit_answer(&olc)?,
                Some(OlcDirection::Reverse) => self.accept_receive_answer(&olc)?,
                _ => warn!(parent: self.span(), lcn = olc.forward_lcn, "fast-start answer carries no usable direction"),
            }
        }

        let dropped = self.channels.remove_where(|c| c.state == ChannelState::ProposedFs);
        debug!(parent: self.span(), dropped = dropped.len(), "fast-start answer applied");
        self.flags.fast_start_answered = true;
        if !self.channels.iter().any(|c| c.is_established()) {
            info!(parent: self.span(), "fast start accepted nothing, falling back to H.245");
            self.flags.fast_start = false;
        }
        Ok(())
    }

    fn accept_transmit_answer(&mut self, olc: &OpenLogicalChannel) -> Result<()> {
        let remote = olc.forward.h2250.clone().unwrap_or_default();
        let Some(channel) = self
            .channels
            .find_mut(olc.forward_lcn, ChannelDirection::Transmit)
            .filter(|c| c.state == ChannelState::ProposedFs)
        else {
            warn!(parent: self.span(), lcn = olc.forward_lcn, "fast-start answer for unknown transmit channel");
            return Ok(());
        };
        channel.remote_rtp = remote.media_channel;
        channel.remote_rtcp = remote.media_control_channel;
        let channel = self.channels.establish(olc.forward_lcn, ChannelDirection::Transmit)?.clone();
        self.on_channel_established(&channel);
        Ok(())
    }

    fn accept_receive_answer(&mut self, olc: &OpenLogicalChannel) -> Result<()> {
        let Some(params) = &olc.reverse else {
            return Ok(());
        };
        let Some(cap_type) = params.data_type.capability().map(|c| c.cap_type()) else {
            return Ok(());
        };
        let remote = params.h2250.clone().unwrap_or_default();
        let Some(channel) = self.channels.iter_mut().find(|c| {
            c.direction == ChannelDirection::Receive
                && c.state == ChannelState::ProposedFs
                && c.capability.cap == cap_type
                && (remote.session_id == 0 || c.session_id == remote.session_id)
        }) else {
            warn!(parent: self.span(), cap = %cap_type, "fast-start answer for a receive channel we did not offer");
            return Ok(());
        };
        channel.number = olc.forward_lcn;
        channel.remote_rtcp = remote.media_control_channel;
        let channel = self.channels.establish(olc.forward_lcn, ChannelDirection::Receive)?.clone();
        self.on_channel_established(&channel);
        Ok(())
    }

    /// Give up on fast start, e.g. when Connect arrives without an answer
    pub(crate) fn abandon_fast_start(&mut self) {
        if !self.flags.fast_start {
            return;
        }
        self.flags.fast_start = false;
        let dropped = self.channels.remove_where(|c| c.state == ChannelState::ProposedFs);
        info!(parent: self.span(), dropped = dropped.len(), "fast start not answered, using H.245");
    }
}
