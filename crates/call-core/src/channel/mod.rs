//! Logical channels of one call

pub mod ports;

use std::fmt;

use h323_wire_core::TransportAddress;
use h323_wire_core::h245::capability::MediaType;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::CapabilityDescriptor;
use crate::error::{CallError, Result};

pub use ports::{RtpPortPool, RtpPorts};

/// First session ID handed out once the reserved ones are taken
const FIRST_DYNAMIC_SESSION: u8 = 4;

/// Direction of a channel from our side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelDirection {
    Transmit,
    Receive,
}

impl fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelDirection::Transmit => f.write_str("transmit"),
            ChannelDirection::Receive => f.write_str("receive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Idle,
    Proposed,
    /// Offered in a fast-start element, not yet accepted
    ProposedFs,
    Established,
}

#[derive(Debug, Clone)]
pub struct LogicalChannel {
    pub number: u16,
    /// 0 until the master assigns one
    pub session_id: u8,
    pub media_type: MediaType,
    pub direction: ChannelDirection,
    pub state: ChannelState,
    pub capability: CapabilityDescriptor,
    pub local_rtp: Option<TransportAddress>,
    pub local_rtcp: Option<TransportAddress>,
    pub remote_rtp: Option<TransportAddress>,
    pub remote_rtcp: Option<TransportAddress>,
}

impl LogicalChannel {
    pub fn is_established(&self) -> bool {
        self.state == ChannelState::Established
    }
}

/// Allocates channel numbers and session IDs and tracks every channel
#[derive(Debug, Clone)]
pub struct ChannelManager {
    base: u16,
    max: u16,
    current: u16,
    next_session_id: u8,
    channels: Vec<LogicalChannel>,
}

impl ChannelManager {
    pub fn new(base: u16, max: u16) -> Self {
        Self {
            base,
            max,
            current: base,
            next_session_id: FIRST_DYNAMIC_SESSION,
            channels: Vec::new(),
        }
    }

    /// Next free channel number
    ///
    /// The counter always advances and wraps to the base after the max.
    /// Numbers still held by a channel are skipped.
    pub fn next_number(&mut self) -> Result<u16> {
        let span = usize::from(self.max - self.base) + 1;
        for _ in 0..span {
            let candidate = self.current;
            self.current = if self.current >= self.max { self.base } else { self.current + 1 };
            if !self.channels.iter().any(|c| c.number == candidate) {
                return Ok(candidate);
            }
        }
        Err(CallError::NoChannelNumberAvailable)
    }

    /// Session ID for a new channel of `media_type` in `direction`
    ///
    /// `None` means the field is left for the master to fill in.
    pub fn session_id_for(&mut self, media_type: MediaType, direction: ChannelDirection, master: bool) -> Option<u8> {
        let reserved = media_type.default_session_id();
        let taken = self
            .channels
            .iter()
            .any(|c| c.direction == direction && c.session_id == reserved);
        if !taken {
            Some(reserved)
        } else if master {
            let id = self.next_session_id;
            self.next_session_id = self.next_session_id.saturating_add(1);
            Some(id)
        } else {
            None
        }
    }

    pub fn add(&mut self, channel: LogicalChannel) {
        debug!(
            lcn = channel.number,
            session = channel.session_id,
            direction = %channel.direction,
            state = ?channel.state,
            "logical channel added"
        );
        self.channels.push(channel);
    }

    pub fn find(&self, number: u16, direction: ChannelDirection) -> Option<&LogicalChannel> {
        self.channels.iter().find(|c| c.number == number && c.direction == direction)
    }

    pub fn find_mut(&mut self, number: u16, direction: ChannelDirection) -> Option<&mut LogicalChannel> {
        self.channels.iter_mut().find(|c| c.number == number && c.direction == direction)
    }

    /// Any channel with this number, whichever direction
    pub fn find_any(&self, number: u16) -> Option<&LogicalChannel> {
        self.channels.iter().find(|c| c.number == number)
    }

    /// Mark a channel established
    ///
    /// Fails if another channel in the same direction already established
    /// the same session.
    pub fn establish(&mut self, number: u16, direction: ChannelDirection) -> Result<&LogicalChannel> {
        let session_id = self
            .find(number, direction)
            .ok_or(CallError::ChannelNotFound(number))?
            .session_id;
        let duplicate = session_id != 0
            && self.channels.iter().any(|c| {
                c.number != number && c.direction == direction && c.session_id == session_id && c.is_established()
            });
        if duplicate {
            return Err(CallError::DuplicateSession { session_id, direction: direction.to_string() });
        }
        let channel = self
            .find_mut(number, direction)
            .ok_or(CallError::ChannelNotFound(number))?;
        channel.state = ChannelState::Established;
        debug!(lcn = number, session = session_id, %direction, "logical channel established");
        Ok(&*channel)
    }

    /// Whether a session is already established in a direction
    pub fn session_established(&self, session_id: u8, direction: ChannelDirection) -> bool {
        self.channels
            .iter()
            .any(|c| c.direction == direction && c.session_id == session_id && c.is_established())
    }

    pub fn remove(&mut self, number: u16, direction: ChannelDirection) -> Option<LogicalChannel> {
        let pos = self
            .channels
            .iter()
            .position(|c| c.number == number && c.direction == direction)?;
        Some(self.channels.remove(pos))
    }

    /// Drop every channel matching the predicate, returning them
    pub fn remove_where(&mut self, mut pred: impl FnMut(&LogicalChannel) -> bool) -> Vec<LogicalChannel> {
        let mut removed = Vec::new();
        let mut i = 0;
        while i < self.channels.len() {
            if pred(&self.channels[i]) {
                removed.push(self.channels.remove(i));
            } else {
                i += 1;
            }
        }
        removed
    }

    pub fn drain(&mut self) -> Vec<LogicalChannel> {
        std::mem::take(&mut self.channels)
    }

    pub fn iter(&self) -> impl Iterator<Item = &LogicalChannel> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LogicalChannel> {
        self.channels.iter_mut()
    }

    pub fn has_media(&self, media_type: MediaType, direction: ChannelDirection) -> bool {
        self.channels
            .iter()
            .any(|c| c.media_type == media_type && c.direction == direction)
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
