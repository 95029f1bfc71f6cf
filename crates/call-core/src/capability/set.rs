//! Per-call capability bins: ours, remote and joint

use std::sync::Arc;

use h323_wire_core::h245::capability::{
    CapType, CapabilityDirection, MediaCapability, MediaType, TerminalCapability, UserInputCapability,
};
use tracing::{debug, trace};

use super::matcher::{MatchDirection, check_compatible};
use super::preferences::PreferenceList;
use super::{CapabilityDescriptor, DtmfMode, DtmfModes};
use crate::error::Result;

/// Capabilities of one call
///
/// Until the call adds its own capability the endpoint defaults are used
/// as "ours". The first call-specific addition starts a private list and
/// resets the call's preference order.
#[derive(Debug, Clone)]
pub struct CallCapabilities {
    defaults: Arc<Vec<CapabilityDescriptor>>,
    ours: Option<Vec<CapabilityDescriptor>>,
    remote: Vec<CapabilityDescriptor>,
    joint: Vec<CapabilityDescriptor>,
    prefs: PreferenceList,
    dtmf: DtmfModes,
    joint_dtmf: DtmfModes,
    pub rfc2833_payload_type: u8,
    pub cisco_payload_type: u8,
}

impl CallCapabilities {
    pub fn new(defaults: Arc<Vec<CapabilityDescriptor>>, prefs: PreferenceList, dtmf: DtmfModes) -> Self {
        Self {
            defaults,
            ours: None,
            remote: Vec::new(),
            joint: Vec::new(),
            prefs,
            dtmf,
            joint_dtmf: DtmfModes::empty(),
            rfc2833_payload_type: 101,
            cisco_payload_type: 121,
        }
    }

    /// Capabilities currently offered, in declaration order
    pub fn local(&self) -> &[CapabilityDescriptor] {
        match &self.ours {
            Some(ours) => ours,
            None => &self.defaults,
        }
    }

    pub fn is_customized(&self) -> bool {
        self.ours.is_some()
    }

    pub fn add_local(&mut self, desc: CapabilityDescriptor) -> Result<()> {
        if self.ours.is_none() {
            debug!(cap = %desc.cap, "call-specific capabilities replace endpoint defaults");
            self.prefs.reset();
        }
        let ours = self.ours.get_or_insert_with(Vec::new);
        ours.retain(|c| c.cap != desc.cap);
        ours.push(desc);
        Ok(())
    }

    pub fn remove_local(&mut self, cap: CapType) -> bool {
        let ours = self.ours.get_or_insert_with(|| self.defaults.as_ref().clone());
        let before = ours.len();
        ours.retain(|c| c.cap != cap);
        self.prefs.remove(cap);
        before != ours.len()
    }

    pub fn find_local(&self, cap: CapType) -> Option<&CapabilityDescriptor> {
        self.local().iter().find(|c| c.cap == cap)
    }

    /// Local capabilities ranked by preference, unranked ones after
    pub fn ordered_local(&self) -> Vec<&CapabilityDescriptor> {
        let local = self.local();
        let mut ordered: Vec<&CapabilityDescriptor> = self
            .prefs
            .iter()
            .filter_map(|tag| local.iter().find(|c| c.cap == tag))
            .collect();
        for cap in local {
            if !self.prefs.contains(cap.cap) {
                ordered.push(cap);
            }
        }
        ordered
    }

    pub fn preferences(&self) -> &PreferenceList {
        &self.prefs
    }

    pub fn preferences_mut(&mut self) -> &mut PreferenceList {
        &mut self.prefs
    }

    pub fn remote(&self) -> &[CapabilityDescriptor] {
        &self.remote
    }

    pub fn joint(&self) -> &[CapabilityDescriptor] {
        &self.joint
    }

    /// Forget what the peer advertised before a new capability set
    pub fn clear_remote(&mut self) {
        self.remote.clear();
        self.joint.clear();
        self.joint_dtmf = DtmfModes::empty();
    }

    /// Record one entry of the peer's capability set and try to promote it
    ///
    /// Returns whether a joint capability was added.
    pub fn add_remote(&mut self, entry: &TerminalCapability) -> bool {
        match entry {
            TerminalCapability::Media { direction, capability } => {
                self.remote.push(CapabilityDescriptor::from_remote(*direction, capability));
                let checks: &[MatchDirection] = match direction {
                    CapabilityDirection::Receive => &[MatchDirection::Transmit],
                    CapabilityDirection::Transmit => &[MatchDirection::Receive],
                    CapabilityDirection::ReceiveAndTransmit => {
                        &[MatchDirection::Transmit, MatchDirection::Receive]
                    }
                };
                for dir in checks {
                    let found = self
                        .ordered_local()
                        .into_iter()
                        .find_map(|local| check_compatible(local, capability, *dir));
                    if let Some(joint) = found {
                        debug!(cap = %joint.cap, direction = ?joint.direction, "joint capability");
                        self.joint.push(joint);
                        return true;
                    }
                }
                trace!(cap = %capability.cap_type(), "no local match for remote capability");
                false
            }
            TerminalCapability::UserInput(ui) => {
                let mode = match ui {
                    UserInputCapability::Rfc2833 { payload_type } => {
                        self.rfc2833_payload_type = *payload_type;
                        DtmfMode::Rfc2833
                    }
                    UserInputCapability::Cisco { payload_type } => {
                        self.cisco_payload_type = *payload_type;
                        DtmfMode::Cisco
                    }
                    UserInputCapability::BasicString => DtmfMode::H245Alphanumeric,
                    UserInputCapability::Dtmf => DtmfMode::H245Signal,
                };
                if self.dtmf.contains(mode) {
                    self.joint_dtmf.insert(mode);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// First joint capability we may transmit with
    ///
    /// The master honours its own preference order; the slave takes the
    /// first joint entry of the media type.
    pub fn select_transmit(&self, media: MediaType, master: bool) -> Option<&CapabilityDescriptor> {
        let transmit = |c: &&CapabilityDescriptor| {
            c.direction == CapabilityDirection::Transmit && c.media_type() == media
        };
        if master {
            let by_pref = self
                .prefs
                .iter()
                .find_map(|tag| self.joint.iter().filter(transmit).find(|c| c.cap == tag));
            if by_pref.is_some() {
                return by_pref;
            }
        }
        self.joint.iter().find(transmit)
    }

    /// Local descriptor able to receive a channel carrying `capability`
    pub fn receivable(&self, capability: &MediaCapability) -> Option<CapabilityDescriptor> {
        self.ordered_local()
            .into_iter()
            .find_map(|local| check_compatible(local, capability, MatchDirection::Receive))
    }

    /// Local descriptor able to transmit a channel carrying `capability`
    pub fn transmittable(&self, capability: &MediaCapability) -> Option<CapabilityDescriptor> {
        self.ordered_local()
            .into_iter()
            .find_map(|local| check_compatible(local, capability, MatchDirection::Transmit))
    }

    pub fn dtmf_modes(&self) -> DtmfModes {
        self.dtmf
    }

    pub fn joint_dtmf(&self) -> DtmfModes {
        self.joint_dtmf
    }

    pub fn enable_dtmf(&mut self, mode: DtmfMode) {
        self.dtmf.insert(mode);
    }

    pub fn disable_dtmf(&mut self, mode: DtmfMode) {
        self.dtmf.remove(mode);
        self.joint_dtmf.remove(mode);
    }

    /// Entries for our capability set
    ///
    /// Audio and video advertise receive with the receive frame count when
    /// we can receive, transmit otherwise. T.38 keeps its declared
    /// direction. Enabled DTMF modes follow as user-input entries.
    pub fn terminal_capabilities(&self) -> Vec<TerminalCapability> {
        let mut entries: Vec<TerminalCapability> = self
            .ordered_local()
            .into_iter()
            .map(|cap| {
                let direction = if cap.cap == CapType::T38 {
                    cap.direction
                } else if cap.can_receive() {
                    CapabilityDirection::Receive
                } else {
                    CapabilityDirection::Transmit
                };
                let receive = direction != CapabilityDirection::Transmit;
                TerminalCapability::Media { direction, capability: cap.to_media_capability(receive) }
            })
            .collect();

        for mode in self.dtmf.iter() {
            let ui = match mode {
                DtmfMode::Rfc2833 => UserInputCapability::Rfc2833 { payload_type: self.rfc2833_payload_type },
                DtmfMode::Cisco => UserInputCapability::Cisco { payload_type: self.cisco_payload_type },
                DtmfMode::H245Alphanumeric => UserInputCapability::BasicString,
                DtmfMode::H245Signal => UserInputCapability::Dtmf,
                DtmfMode::Q931Keypad => continue,
            };
            entries.push(TerminalCapability::UserInput(ui));
        }
        entries
    }

    /// Whether both sides can do T.38
    pub fn t38_joint(&self) -> bool {
        self.joint.iter().any(|c| c.cap == CapType::T38)
    }
}
