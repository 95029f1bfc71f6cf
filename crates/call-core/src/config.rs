//! Endpoint-wide defaults
//!
//! Every call starts from an [`EndpointDefaults`]. A call that customizes
//! its capabilities, aliases or DTMF modes copies what it changes instead
//! of mutating the shared defaults.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use h323_wire_core::AliasAddress;
use h323_wire_core::h245::capability::{CapType, CapabilityDirection, MediaType, PictureFormat};
use h323_wire_core::uuie::VendorInfo;
use serde::{Deserialize, Serialize};

use crate::capability::DtmfMode;
use crate::capability::preferences::MAX_PREFERENCES;
use crate::error::{CallError, Result};

/// Terminal type advertised in master/slave determination (gateway)
pub const DEFAULT_TERMINAL_TYPE: u8 = 60;

/// One entry of the default capability list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityConfig {
    pub codec: CapType,
    pub tx_frames: u32,
    pub rx_frames: u32,
    pub direction: CapabilityDirection,
    pub silence_suppression: bool,
    /// H.263 only
    pub picture_format: PictureFormat,
    /// H.263 only
    pub mpi: u32,
    /// H.263 only, in units of 100 bit/s
    pub max_bitrate: u32,
    /// GSM only
    pub comfort_noise: bool,
    /// GSM only
    pub scrambled: bool,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            codec: CapType::G711Ulaw64k,
            tx_frames: 20,
            rx_frames: 240,
            direction: CapabilityDirection::ReceiveAndTransmit,
            silence_suppression: false,
            picture_format: PictureFormat::Qcif,
            mpi: 1,
            max_bitrate: 1920,
            comfort_noise: false,
            scrambled: false,
        }
    }
}

impl CapabilityConfig {
    pub fn audio(codec: CapType, tx_frames: u32, rx_frames: u32) -> Self {
        Self { codec, tx_frames, rx_frames, ..Default::default() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DtmfConfig {
    pub modes: Vec<DtmfMode>,
    pub rfc2833_payload_type: u8,
    pub cisco_payload_type: u8,
}

impl Default for DtmfConfig {
    fn default() -> Self {
        Self {
            modes: vec![DtmfMode::Rfc2833],
            rfc2833_payload_type: 101,
            cisco_payload_type: 121,
        }
    }
}

/// Protocol timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub admission: u64,
    pub h245_connect_retries: u32,
    pub h245_connect_retry_interval: u64,
    pub msd_response: u64,
    pub tcs_response: u64,
    pub call_establishment: u64,
    pub session_close: u64,
    pub logical_channel: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            admission: 24,
            h245_connect_retries: 3,
            h245_connect_retry_interval: 1,
            msd_response: 15,
            tcs_response: 15,
            call_establishment: 60,
            session_close: 15,
            logical_channel: 15,
        }
    }
}

impl Timeouts {
    pub fn admission(&self) -> Duration {
        Duration::from_secs(self.admission)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointDefaults {
    pub local_ip: Ipv4Addr,
    pub h225_port: u16,

    pub fast_start: bool,
    pub tunneling: bool,
    pub media_wait_for_connect: bool,
    pub manual_ringback: bool,
    pub auto_answer: bool,
    pub try_be_master: bool,

    /// Display name sent in Setup
    pub caller_id: String,
    pub calling_party_number: Option<String>,
    pub aliases: Vec<AliasAddress>,

    pub capabilities: Vec<CapabilityConfig>,
    pub preferences: Vec<CapType>,
    pub dtmf: DtmfConfig,

    pub lcn_base: u16,
    pub lcn_max: u16,
    pub rtp_port_base: u16,
    pub rtp_port_max: u16,

    pub terminal_type: u8,
    pub vendor: VendorInfo,
    pub timeouts: Timeouts,
}

impl Default for EndpointDefaults {
    fn default() -> Self {
        Self {
            local_ip: Ipv4Addr::LOCALHOST,
            h225_port: 1720,
            fast_start: true,
            tunneling: true,
            media_wait_for_connect: false,
            manual_ringback: false,
            auto_answer: false,
            try_be_master: false,
            caller_id: "h323".to_string(),
            calling_party_number: None,
            aliases: Vec::new(),
            capabilities: vec![
                CapabilityConfig::audio(CapType::G711Ulaw64k, 20, 240),
                CapabilityConfig::audio(CapType::G711Alaw64k, 20, 240),
            ],
            preferences: Vec::new(),
            dtmf: DtmfConfig::default(),
            lcn_base: 1001,
            lcn_max: 1100,
            rtp_port_base: 10000,
            rtp_port_max: 11000,
            terminal_type: DEFAULT_TERMINAL_TYPE,
            vendor: VendorInfo {
                product_id: "h323-rs".to_string(),
                version_id: env!("CARGO_PKG_VERSION").to_string(),
            },
            timeouts: Timeouts::default(),
        }
    }
}

impl EndpointDefaults {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| CallError::invalid_config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.lcn_base == 0 || self.lcn_base > self.lcn_max {
            return Err(CallError::invalid_config(format!(
                "logical channel range {}..={} is empty",
                self.lcn_base, self.lcn_max
            )));
        }
        if self.rtp_port_base >= self.rtp_port_max {
            return Err(CallError::invalid_config(format!(
                "RTP port range {}..={} is empty",
                self.rtp_port_base, self.rtp_port_max
            )));
        }
        if self.rtp_port_base % 2 != 0 {
            return Err(CallError::invalid_config(format!(
                "RTP port base {} must be even",
                self.rtp_port_base
            )));
        }
        if self.preferences.len() > MAX_PREFERENCES {
            return Err(CallError::invalid_config(format!(
                "{} preferences configured, at most {} allowed",
                self.preferences.len(),
                MAX_PREFERENCES
            )));
        }
        for alias in &self.aliases {
            alias.validate().map_err(CallError::alias_invalid)?;
        }
        for cap in &self.capabilities {
            if cap.codec.media_type() == MediaType::Video && cap.mpi == 0 {
                return Err(CallError::invalid_config(format!("{} needs a non-zero MPI", cap.codec)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let defaults = EndpointDefaults::default();
        defaults.validate().unwrap();
        assert_eq!(defaults.h225_port, 1720);
        assert_eq!(defaults.lcn_base, 1001);
        assert_eq!(defaults.lcn_max, 1100);
        assert_eq!(defaults.terminal_type, 60);
        assert_eq!(defaults.timeouts.admission, 24);
        assert_eq!(defaults.timeouts.h245_connect_retries, 3);
    }

    #[test]
    fn test_from_toml() {
        let config = EndpointDefaults::from_toml_str(
            r#"
            local_ip = "192.168.1.10"
            auto_answer = true
            preferences = ["g729_a", "g711_ulaw64k"]

            [[aliases]]
            kind = "h323_id"
            value = "gateway"

            [[capabilities]]
            codec = "g729_a"
            tx_frames = 2
            rx_frames = 24

            [timeouts]
            admission = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.local_ip, Ipv4Addr::new(192, 168, 1, 10));
        assert!(config.auto_answer);
        assert_eq!(config.preferences, vec![CapType::G729A, CapType::G711Ulaw64k]);
        assert_eq!(config.aliases, vec![AliasAddress::h323_id("gateway")]);
        assert_eq!(config.capabilities.len(), 1);
        assert_eq!(config.capabilities[0].direction, CapabilityDirection::ReceiveAndTransmit);
        assert_eq!(config.timeouts.admission, 5);
        assert_eq!(config.timeouts.tcs_response, 15);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let config = EndpointDefaults { lcn_base: 2000, ..Default::default() };
        assert!(matches!(config.validate(), Err(CallError::InvalidConfig(_))));

        let config = EndpointDefaults { rtp_port_base: 10001, ..Default::default() };
        assert!(matches!(config.validate(), Err(CallError::InvalidConfig(_))));

        let config = EndpointDefaults { preferences: vec![CapType::G729; 21], ..Default::default() };
        assert!(matches!(config.validate(), Err(CallError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_alias() {
        let config = EndpointDefaults {
            aliases: vec![AliasAddress::dialed_digits("12a4")],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CallError::AliasInvalid(_))));
    }
}
