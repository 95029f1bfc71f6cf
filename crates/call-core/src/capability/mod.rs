//! Local and remote media capabilities
//!
//! A [`CapabilityDescriptor`] is what an endpoint can do with one codec in
//! one or both directions. Local descriptors carry the [`MediaChannelOps`]
//! that start and stop media once a channel using them is established.

pub mod matcher;
pub mod preferences;
pub mod set;

use std::fmt;
use std::sync::Arc;

use h323_wire_core::h245::capability::{
    CapType, CapabilityDirection, GSM_FRAME_OCTETS, MediaCapability, MediaType, PictureFormat,
};
use serde::{Deserialize, Serialize};

use crate::channel::LogicalChannel;
use crate::config::CapabilityConfig;

pub use matcher::{MatchDirection, check_compatible};
pub use preferences::{MAX_PREFERENCES, PreferenceList};
pub use set::CallCapabilities;

/// Maximum T.38 bitrate advertised, in units of 100 bit/s
pub const T38_MAX_BITRATE: u32 = 144;

/// Media start/stop hooks for one codec family
///
/// Invoked by the call engine with the call token and the channel that
/// was just established or is being torn down.
pub trait MediaChannelOps: Send + Sync {
    fn start_receive(&self, token: &str, channel: &LogicalChannel) -> anyhow::Result<()>;
    fn start_transmit(&self, token: &str, channel: &LogicalChannel) -> anyhow::Result<()>;
    fn stop_receive(&self, token: &str, channel: &LogicalChannel) -> anyhow::Result<()>;
    fn stop_transmit(&self, token: &str, channel: &LogicalChannel) -> anyhow::Result<()>;
}

/// Type-specific capability parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CapParams {
    Simple {
        tx_frames: u32,
        rx_frames: u32,
        silence_suppression: bool,
    },
    Gsm {
        tx_frames: u32,
        rx_frames: u32,
        comfort_noise: bool,
        scrambled: bool,
    },
    H263 {
        format: PictureFormat,
        mpi: u32,
        max_bitrate: u32,
    },
    T38,
}

impl CapParams {
    pub fn tx_frames(&self) -> Option<u32> {
        match self {
            CapParams::Simple { tx_frames, .. } | CapParams::Gsm { tx_frames, .. } => Some(*tx_frames),
            _ => None,
        }
    }

    pub fn rx_frames(&self) -> Option<u32> {
        match self {
            CapParams::Simple { rx_frames, .. } | CapParams::Gsm { rx_frames, .. } => Some(*rx_frames),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct CapabilityDescriptor {
    pub cap: CapType,
    pub direction: CapabilityDirection,
    pub params: CapParams,
    pub ops: Option<Arc<dyn MediaChannelOps>>,
}

impl fmt::Debug for CapabilityDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityDescriptor")
            .field("cap", &self.cap)
            .field("direction", &self.direction)
            .field("params", &self.params)
            .field("ops", &self.ops.is_some())
            .finish()
    }
}

impl CapabilityDescriptor {
    /// Simple audio descriptor
    pub fn audio(cap: CapType, tx_frames: u32, rx_frames: u32, direction: CapabilityDirection) -> Self {
        let params = if cap.is_gsm() {
            CapParams::Gsm { tx_frames, rx_frames, comfort_noise: false, scrambled: false }
        } else {
            CapParams::Simple { tx_frames, rx_frames, silence_suppression: false }
        };
        Self { cap, direction, params, ops: None }
    }

    pub fn h263(format: PictureFormat, mpi: u32, max_bitrate: u32, direction: CapabilityDirection) -> Self {
        Self {
            cap: CapType::H263Video,
            direction,
            params: CapParams::H263 { format, mpi, max_bitrate },
            ops: None,
        }
    }

    pub fn t38(direction: CapabilityDirection) -> Self {
        Self { cap: CapType::T38, direction, params: CapParams::T38, ops: None }
    }

    pub fn from_config(config: &CapabilityConfig) -> Self {
        let params = match config.codec {
            CapType::H263Video => CapParams::H263 {
                format: config.picture_format,
                mpi: config.mpi,
                max_bitrate: config.max_bitrate,
            },
            CapType::T38 => CapParams::T38,
            codec if codec.is_gsm() => CapParams::Gsm {
                tx_frames: config.tx_frames,
                rx_frames: config.rx_frames,
                comfort_noise: config.comfort_noise,
                scrambled: config.scrambled,
            },
            codec => CapParams::Simple {
                tx_frames: config.tx_frames,
                rx_frames: config.rx_frames,
                silence_suppression: config.silence_suppression && codec.supports_silence_suppression(),
            },
        };
        Self { cap: config.codec, direction: config.direction, params, ops: None }
    }

    /// Descriptor for a capability learned from the peer
    ///
    /// The single frame count the peer advertised becomes both limits.
    pub fn from_remote(direction: CapabilityDirection, capability: &MediaCapability) -> Self {
        let params = match capability {
            MediaCapability::Audio { frames, silence_suppression, .. } => CapParams::Simple {
                tx_frames: *frames,
                rx_frames: *frames,
                silence_suppression: *silence_suppression,
            },
            MediaCapability::Gsm { audio_unit_size, comfort_noise, scrambled, .. } => {
                let frames = audio_unit_size / GSM_FRAME_OCTETS;
                CapParams::Gsm {
                    tx_frames: frames,
                    rx_frames: frames,
                    comfort_noise: *comfort_noise,
                    scrambled: *scrambled,
                }
            }
            MediaCapability::H263 { format, mpi, max_bitrate } => CapParams::H263 {
                format: *format,
                mpi: *mpi,
                max_bitrate: *max_bitrate,
            },
            MediaCapability::T38 { .. } => CapParams::T38,
        };
        Self { cap: capability.cap_type(), direction, params, ops: None }
    }

    pub fn with_ops(mut self, ops: Arc<dyn MediaChannelOps>) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn media_type(&self) -> MediaType {
        self.cap.media_type()
    }

    pub fn can_receive(&self) -> bool {
        matches!(
            self.direction,
            CapabilityDirection::Receive | CapabilityDirection::ReceiveAndTransmit
        )
    }

    pub fn can_transmit(&self) -> bool {
        matches!(
            self.direction,
            CapabilityDirection::Transmit | CapabilityDirection::ReceiveAndTransmit
        )
    }

    /// Wire form, using the receive frame count when `receive` is set
    pub fn to_media_capability(&self, receive: bool) -> MediaCapability {
        let pick = |tx: u32, rx: u32| if receive { rx } else { tx };
        match &self.params {
            CapParams::Simple { tx_frames, rx_frames, silence_suppression } => MediaCapability::Audio {
                cap: self.cap,
                frames: pick(*tx_frames, *rx_frames),
                silence_suppression: *silence_suppression && self.cap.supports_silence_suppression(),
            },
            CapParams::Gsm { tx_frames, rx_frames, comfort_noise, scrambled } => MediaCapability::Gsm {
                cap: self.cap,
                audio_unit_size: pick(*tx_frames, *rx_frames) * GSM_FRAME_OCTETS,
                comfort_noise: *comfort_noise,
                scrambled: *scrambled,
            },
            CapParams::H263 { format, mpi, max_bitrate } => MediaCapability::H263 {
                format: *format,
                mpi: *mpi,
                max_bitrate: *max_bitrate,
            },
            CapParams::T38 => MediaCapability::T38 { max_bitrate: T38_MAX_BITRATE },
        }
    }
}

/// Ways of conveying DTMF digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtmfMode {
    Rfc2833,
    Cisco,
    Q931Keypad,
    H245Alphanumeric,
    H245Signal,
}

impl DtmfMode {
    pub const ALL: [DtmfMode; 5] = [
        DtmfMode::Rfc2833,
        DtmfMode::Cisco,
        DtmfMode::Q931Keypad,
        DtmfMode::H245Alphanumeric,
        DtmfMode::H245Signal,
    ];

    fn bit(self) -> u8 {
        match self {
            DtmfMode::Rfc2833 => 1 << 0,
            DtmfMode::Cisco => 1 << 1,
            DtmfMode::Q931Keypad => 1 << 2,
            DtmfMode::H245Alphanumeric => 1 << 3,
            DtmfMode::H245Signal => 1 << 4,
        }
    }
}

/// Set of enabled DTMF modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DtmfModes(u8);

impl DtmfModes {
    pub fn empty() -> Self {
        Self(0)
    }

    pub fn contains(&self, mode: DtmfMode) -> bool {
        self.0 & mode.bit() != 0
    }

    pub fn insert(&mut self, mode: DtmfMode) {
        self.0 |= mode.bit();
    }

    pub fn remove(&mut self, mode: DtmfMode) {
        self.0 &= !mode.bit();
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = DtmfMode> + '_ {
        DtmfMode::ALL.into_iter().filter(|m| self.contains(*m))
    }
}

impl FromIterator<DtmfMode> for DtmfModes {
    fn from_iter<I: IntoIterator<Item = DtmfMode>>(iter: I) -> Self {
        let mut modes = Self::empty();
        for mode in iter {
            modes.insert(mode);
        }
        modes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_suppression_only_for_g7231() {
        let config = CapabilityConfig {
            codec: CapType::G711Ulaw64k,
            silence_suppression: true,
            ..Default::default()
        };
        let desc = CapabilityDescriptor::from_config(&config);
        assert!(matches!(desc.params, CapParams::Simple { silence_suppression: false, .. }));

        let config = CapabilityConfig { codec: CapType::G7231, silence_suppression: true, ..Default::default() };
        let desc = CapabilityDescriptor::from_config(&config);
        assert!(matches!(desc.params, CapParams::Simple { silence_suppression: true, .. }));
    }

    #[test]
    fn test_gsm_frames_on_the_wire() {
        let desc = CapabilityDescriptor::audio(CapType::GsmFullRate, 2, 4, CapabilityDirection::ReceiveAndTransmit);
        match desc.to_media_capability(true) {
            MediaCapability::Gsm { audio_unit_size, .. } => assert_eq!(audio_unit_size, 132),
            other => panic!("unexpected {:?}", other),
        }
        let remote = CapabilityDescriptor::from_remote(
            CapabilityDirection::Receive,
            &MediaCapability::Gsm {
                cap: CapType::GsmFullRate,
                audio_unit_size: 99,
                comfort_noise: false,
                scrambled: false,
            },
        );
        assert_eq!(remote.params.rx_frames(), Some(3));
    }

    #[test]
    fn test_dtmf_modes() {
        let mut modes: DtmfModes = [DtmfMode::Rfc2833, DtmfMode::Q931Keypad].into_iter().collect();
        assert!(modes.contains(DtmfMode::Rfc2833));
        modes.remove(DtmfMode::Rfc2833);
        modes.insert(DtmfMode::H245Signal);
        assert_eq!(modes.iter().collect::<Vec<_>>(), vec![DtmfMode::Q931Keypad, DtmfMode::H245Signal]);
    }
}
