//! Gatekeeper boundary
//!
//! RAS itself lives outside this crate. The engine asks a
//! [`GatekeeperClient`] to admit a call and waits, bounded, for the client
//! to report the answer through
//! [`CallEngine::admission_granted`](crate::engine::CallEngine::admission_granted)
//! or [`CallEngine::admission_denied`](crate::engine::CallEngine::admission_denied).

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use h323_wire_core::{AliasAddress, CallIdentifier, TransportAddress};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::call::CallDirection;
use crate::cause::CallClearReason;
use crate::error::{CallError, Result};

/// What the gatekeeper needs to decide on a call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionRequest {
    pub token: String,
    pub direction: CallDirection,
    pub call_identifier: CallIdentifier,
    pub call_reference: u16,
    pub source_aliases: Vec<AliasAddress>,
    pub destination_aliases: Vec<AliasAddress>,
    pub destination_address: Option<TransportAddress>,
}

/// The gatekeeper's answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    /// Go ahead, signaling to `destination` when the gatekeeper routes
    Granted { destination: Option<TransportAddress> },
    Denied { reason: CallClearReason },
}

#[async_trait]
pub trait GatekeeperClient: Send + Sync {
    /// Whether calls have to be admitted at all
    fn is_registered(&self) -> bool;

    /// Start admission; the answer comes back through the engine
    async fn request_admission(&self, request: AdmissionRequest) -> anyhow::Result<()>;

    /// Release whatever the gatekeeper holds for a finished call
    async fn cleanup_call(&self, token: &str) -> anyhow::Result<()>;
}

/// Calls waiting for an admission answer
#[derive(Debug, Default)]
pub struct AdmissionWaiters {
    pending: DashMap<String, oneshot::Sender<AdmissionResult>>,
}

impl AdmissionWaiters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `token`, replacing a stale one
    pub fn register(&self, token: &str) -> oneshot::Receiver<AdmissionResult> {
        let (tx, rx) = oneshot::channel();
        if self.pending.insert(token.to_string(), tx).is_some() {
            debug!(token, "replaced stale admission waiter");
        }
        rx
    }

    /// Deliver an answer; fails if nobody is waiting
    pub fn resolve(&self, token: &str, result: AdmissionResult) -> Result<()> {
        let Some((_, tx)) = self.pending.remove(token) else {
            warn!(token, "admission answer for a call that is not waiting");
            return Err(CallError::gatekeeper(format!("no admission pending for {}", token)));
        };
        tx.send(result)
            .map_err(|_| CallError::gatekeeper(format!("admission waiter for {} went away", token)))
    }

    pub fn cancel(&self, token: &str) {
        self.pending.remove(token);
    }

    pub fn is_waiting(&self, token: &str) -> bool {
        self.pending.contains_key(token)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Wait for the answer, treating silence as an unreachable gatekeeper
pub async fn await_admission(rx: oneshot::Receiver<AdmissionResult>, wait: Duration) -> Result<AdmissionResult> {
    match tokio::time::timeout(wait, rx).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(_)) => Err(CallError::gatekeeper("admission waiter dropped")),
        Err(_) => Err(CallError::AdmissionTimeout(wait.as_secs())),
    }
}
