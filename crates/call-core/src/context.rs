//! Endpoint-wide state shared by every call

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use h323_wire_core::h245::capability::MediaType;
use parking_lot::Mutex;
use rand::Rng;
use tracing::debug;

use crate::capability::{CapabilityDescriptor, DtmfModes, MediaChannelOps, PreferenceList};
use crate::channel::RtpPortPool;
use crate::config::EndpointDefaults;
use crate::error::Result;

/// Highest call reference handed out before wrapping back to 1
const MAX_CALL_REFERENCE: u16 = 32766;

/// Hands out Q.931 call references
///
/// Starts at a random value and increments per call.
#[derive(Debug)]
pub struct CallReferenceGenerator {
    next: Mutex<u16>,
}

impl CallReferenceGenerator {
    pub fn new() -> Self {
        Self::starting_at(rand::thread_rng().gen_range(1..=MAX_CALL_REFERENCE))
    }

    pub fn starting_at(start: u16) -> Self {
        Self { next: Mutex::new(start.clamp(1, MAX_CALL_REFERENCE)) }
    }

    pub fn next(&self) -> u16 {
        let mut next = self.next.lock();
        let value = *next;
        *next = if value >= MAX_CALL_REFERENCE { 1 } else { value + 1 };
        value
    }
}

impl Default for CallReferenceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Defaults, default capabilities and generators for one endpoint
///
/// Calls read the defaults and copy on customize; nothing here is mutated
/// on behalf of a single call.
#[derive(Debug)]
pub struct EndpointContext {
    pub defaults: EndpointDefaults,
    capabilities: Arc<Vec<CapabilityDescriptor>>,
    preferences: PreferenceList,
    dtmf: DtmfModes,
    pub rtp_ports: RtpPortPool,
    pub call_references: CallReferenceGenerator,
    tokens: AtomicU64,
}

impl EndpointContext {
    pub fn new(defaults: EndpointDefaults) -> Result<Self> {
        defaults.validate()?;
        let capabilities = defaults
            .capabilities
            .iter()
            .map(CapabilityDescriptor::from_config)
            .collect::<Vec<_>>();
        let preferences = PreferenceList::from_tags(&defaults.preferences)?;
        let dtmf = defaults.dtmf.modes.iter().copied().collect();
        let rtp_ports = RtpPortPool::new(defaults.local_ip, defaults.rtp_port_base, defaults.rtp_port_max);
        debug!(
            capabilities = capabilities.len(),
            preferences = preferences.len(),
            "endpoint context created"
        );
        Ok(Self {
            capabilities: Arc::new(capabilities),
            preferences,
            dtmf,
            rtp_ports,
            call_references: CallReferenceGenerator::new(),
            tokens: AtomicU64::new(0),
            defaults,
        })
    }

    /// Attach media operations to every default capability of a media type
    pub fn with_media_ops(mut self, media_type: MediaType, ops: Arc<dyn MediaChannelOps>) -> Self {
        let updated = self
            .capabilities
            .iter()
            .cloned()
            .map(|cap| {
                if cap.media_type() == media_type {
                    cap.with_ops(ops.clone())
                } else {
                    cap
                }
            })
            .collect();
        self.capabilities = Arc::new(updated);
        self
    }

    pub fn capabilities(&self) -> Arc<Vec<CapabilityDescriptor>> {
        self.capabilities.clone()
    }

    pub fn preferences(&self) -> &PreferenceList {
        &self.preferences
    }

    pub fn dtmf_modes(&self) -> DtmfModes {
        self.dtmf
    }

    /// Fresh `h323c_<n>` token
    pub fn next_token(&self) -> String {
        format!("h323c_{}", self.tokens.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_reference_wraps_to_one() {
        let generator = CallReferenceGenerator::starting_at(32765);
        assert_eq!(generator.next(), 32765);
        assert_eq!(generator.next(), 32766);
        assert_eq!(generator.next(), 1);
    }

    #[test]
    fn test_random_start_in_range() {
        for _ in 0..100 {
            let value = CallReferenceGenerator::new().next();
            assert!((1..=MAX_CALL_REFERENCE).contains(&value));
        }
    }

    #[test]
    fn test_tokens_are_sequential() {
        let ctx = EndpointContext::new(EndpointDefaults::default()).unwrap();
        assert_eq!(ctx.next_token(), "h323c_1");
        assert_eq!(ctx.next_token(), "h323c_2");
    }

    #[test]
    fn test_invalid_defaults_rejected() {
        let defaults = EndpointDefaults { lcn_base: 0, ..Default::default() };
        assert!(EndpointContext::new(defaults).is_err());
    }
}
