//! Call engine
//!
//! [`CallEngine`] owns the registry of live calls and is the only thing the
//! transport and the application talk to. Every operation locks one call,
//! lets it do its protocol work, then settles it: lifecycle events go to
//! the [`CallCallbacks`], clearing is driven as far as it can go, framed
//! messages are handed to the transport channel and new timers are
//! scheduled.
//!
//! ```no_run
//! use std::sync::Arc;
//! use h323_call_core::{CallEngine, CallOptions, EndpointContext, EndpointDefaults};
//!
//! # async fn run() -> h323_call_core::Result<()> {
//! let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default())?);
//! let (engine, mut transport_rx) = CallEngine::builder(ctx).build();
//! let token = engine.make_call("192.168.1.20", CallOptions::default()).await?;
//! while let Some(event) = transport_rx.recv().await {
//!     // write event to the call's connection
//!     # let _ = (&token, event);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use h323_wire_core::{AliasAddress, MessageType, Q931Cause, Q931Message, TransportAddress};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, warn};

use crate::call::{Call, CallDirection, CallMode, CallState, Destination};
use crate::callbacks::{CallCallbacks, CallEvent, NoopCallbacks};
use crate::capability::{CapabilityDescriptor, DtmfMode};
use crate::cause::CallClearReason;
use crate::context::EndpointContext;
use crate::error::{CallError, Result};
use crate::gatekeeper::{AdmissionRequest, AdmissionResult, AdmissionWaiters, GatekeeperClient, await_admission};
use crate::outbound::EngineEvent;
use crate::registry::{CallHandle, CallRegistry, RegistryStats};
use crate::timer::PendingTimer;

/// Upper bound on callback rounds per operation
const MAX_SETTLE_ROUNDS: usize = 16;

/// Per-call overrides for an outgoing call
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Token to use instead of a generated one
    pub token: Option<String>,
    /// Extra local aliases
    pub aliases: Vec<AliasAddress>,
    pub calling_party_number: Option<String>,
    pub called_party_number: Option<String>,
    pub display_name: Option<String>,
    pub mode: CallMode,
    pub fast_start: Option<bool>,
    pub tunneling: Option<bool>,
    /// Capabilities offered on top of the endpoint defaults
    pub capabilities: Vec<CapabilityDescriptor>,
    pub dtmf: Vec<DtmfMode>,
}

impl CallOptions {
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn with_mode(mut self, mode: CallMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_calling_party_number(mut self, number: impl Into<String>) -> Self {
        self.calling_party_number = Some(number.into());
        self
    }

    pub fn with_called_party_number(mut self, number: impl Into<String>) -> Self {
        self.called_party_number = Some(number.into());
        self
    }

    pub fn with_fast_start(mut self, enabled: bool) -> Self {
        self.fast_start = Some(enabled);
        self
    }

    pub fn with_tunneling(mut self, enabled: bool) -> Self {
        self.tunneling = Some(enabled);
        self
    }

    pub fn with_capability(mut self, capability: CapabilityDescriptor) -> Self {
        self.capabilities.push(capability);
        self
    }

    fn apply(self, call: &mut Call) -> Result<()> {
        call.mode = self.mode;
        if let Some(enabled) = self.fast_start {
            call.flags.fast_start = enabled;
        }
        if let Some(enabled) = self.tunneling {
            call.flags.tunneling = enabled;
        }
        if let Some(name) = self.display_name {
            call.display_name = Some(name);
        }
        if let Some(number) = self.calling_party_number {
            call.set_calling_party_number(number)?;
        }
        if let Some(number) = self.called_party_number {
            call.set_called_party_number(number)?;
        }
        for alias in self.aliases {
            call.add_alias(alias, true)?;
        }
        for capability in self.capabilities {
            call.add_capability(capability)?;
        }
        for mode in self.dtmf {
            call.enable_dtmf(mode);
        }
        Ok(())
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub calls: RegistryStats,
    pub pending_admissions: usize,
}

struct EngineInner {
    ctx: Arc<EndpointContext>,
    registry: CallRegistry,
    callbacks: Arc<dyn CallCallbacks>,
    gatekeeper: Option<Arc<dyn GatekeeperClient>>,
    waiters: AdmissionWaiters,
    transport_tx: mpsc::UnboundedSender<EngineEvent>,
}

/// Builder for [`CallEngine`]
pub struct CallEngineBuilder {
    ctx: Arc<EndpointContext>,
    callbacks: Arc<dyn CallCallbacks>,
    gatekeeper: Option<Arc<dyn GatekeeperClient>>,
}

impl CallEngineBuilder {
    pub fn callbacks(mut self, callbacks: Arc<dyn CallCallbacks>) -> Self {
        self.callbacks = callbacks;
        self
    }

    pub fn gatekeeper(mut self, gatekeeper: Arc<dyn GatekeeperClient>) -> Self {
        self.gatekeeper = Some(gatekeeper);
        self
    }

    /// Build the engine and the receiver the transport reads from
    pub fn build(self) -> (CallEngine, mpsc::UnboundedReceiver<EngineEvent>) {
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let inner = EngineInner {
            ctx: self.ctx,
            registry: CallRegistry::new(),
            callbacks: self.callbacks,
            gatekeeper: self.gatekeeper,
            waiters: AdmissionWaiters::new(),
            transport_tx,
        };
        info!(gatekeeper = inner.gatekeeper.is_some(), "call engine started");
        (CallEngine { inner: Arc::new(inner) }, transport_rx)
    }
}

#[derive(Clone)]
pub struct CallEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for CallEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallEngine")
            .field("registry", &self.inner.registry)
            .field("gatekeeper", &self.inner.gatekeeper.is_some())
            .finish()
    }
}

impl CallEngine {
    pub fn builder(ctx: Arc<EndpointContext>) -> CallEngineBuilder {
        CallEngineBuilder {
            ctx,
            callbacks: Arc::new(NoopCallbacks),
            gatekeeper: None,
        }
    }

    pub fn context(&self) -> &Arc<EndpointContext> {
        &self.inner.ctx
    }

    pub fn registry(&self) -> &CallRegistry {
        &self.inner.registry
    }

    pub async fn find_call(&self, token: &str) -> Option<CallHandle> {
        self.inner.registry.get(token).await
    }

    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            calls: self.inner.registry.stats().await,
            pending_admissions: self.inner.waiters.len(),
        }
    }

    fn active_gatekeeper(&self) -> Option<Arc<dyn GatekeeperClient>> {
        self.inner.gatekeeper.as_ref().filter(|gk| gk.is_registered()).cloned()
    }

    async fn handle(&self, token: &str) -> Result<CallHandle> {
        self.inner
            .registry
            .get(token)
            .await
            .ok_or_else(|| CallError::call_not_found(token))
    }

    /// Run `op` on a call under its lock, then settle the call
    async fn with_call<F>(&self, token: &str, op: F) -> Result<()>
    where
        F: FnOnce(&mut Call) -> Result<()> + Send,
    {
        let handle = self.handle(token).await?;
        let mut call = handle.lock().await;
        let result = op(&mut call);
        if let Err(e) = &result {
            debug!(parent: call.span(), "operation failed: {}", e);
        }
        self.settle(&mut call).await;
        result
    }

    /// Place an outgoing call; returns its token
    pub async fn make_call(&self, destination: &str, options: CallOptions) -> Result<String> {
        let destination: Destination = destination.parse()?;
        if destination.address.is_none() && self.active_gatekeeper().is_none() {
            return Err(CallError::InvalidDestination(
                "an alias destination needs a registered gatekeeper".to_string(),
            ));
        }

        let token = options.token.clone().unwrap_or_else(|| self.inner.ctx.next_token());
        let mut call = Call::new(self.inner.ctx.clone(), token.clone(), CallDirection::Outgoing);
        options.apply(&mut call)?;
        call.remote_address = destination.address;
        call.remote_aliases.extend(destination.aliases.iter().cloned());
        if call.called_party_number.is_none() {
            call.called_party_number = destination.dialed_digits().map(str::to_string);
        }

        info!(%token, destination = ?destination.address, aliases = destination.aliases.len(), "placing call");
        let handle = self.inner.registry.insert(call).await?;
        self.admit(&handle).await?;
        Ok(token)
    }

    /// Feed one Q.931 message received on a call's signaling connection
    ///
    /// An unknown token starts a new incoming call, but only on Setup.
    pub async fn handle_incoming(&self, token: &str, data: Bytes) -> Result<()> {
        let msg = Q931Message::decode(data).map_err(|e| {
            warn!(token, "undecodable Q.931 message: {}", e);
            CallError::from(e)
        })?;

        let handle = match self.inner.registry.get(token).await {
            Some(handle) => handle,
            None if msg.message_type == MessageType::Setup => {
                let call = Call::new(self.inner.ctx.clone(), token, CallDirection::Incoming);
                self.inner.registry.insert(call).await?
            }
            None => {
                warn!(token, message = %msg.message_type, "new call does not start with Setup");
                return Err(CallError::call_not_found(token));
            }
        };

        let needs_admission = {
            let mut call = handle.lock().await;
            let result = call.handle_q931(msg);
            self.settle(&mut call).await;
            result?;
            call.needs_admission && !call.state().is_clearing()
        };
        if needs_admission {
            self.admit(&handle).await?;
        }
        Ok(())
    }

    /// Feed H.245 received on a call's separate H.245 connection
    pub async fn handle_h245(&self, token: &str, data: Bytes) -> Result<()> {
        self.with_call(token, |call| call.handle_h245(data)).await
    }

    pub async fn answer_call(&self, token: &str) -> Result<()> {
        self.with_call(token, |call| call.send_connect()).await
    }

    pub async fn send_alerting(&self, token: &str) -> Result<()> {
        self.with_call(token, |call| call.send_alerting()).await
    }

    pub async fn send_progress(&self, token: &str) -> Result<()> {
        self.with_call(token, |call| call.send_progress()).await
    }

    /// Redirect a call to another destination
    pub async fn forward_call(&self, token: &str, destination: &str) -> Result<()> {
        let destination: Destination = destination.parse()?;
        self.with_call(token, move |call| call.forward_to(&destination)).await
    }

    pub async fn send_dtmf(&self, token: &str, digits: &str) -> Result<()> {
        self.with_call(token, |call| call.send_dtmf(digits)).await
    }

    /// Clear a call
    ///
    /// Repeated calls are harmless: release messages go out at most once.
    pub async fn end_call(&self, token: &str, reason: Option<CallClearReason>, cause: Option<Q931Cause>) -> Result<()> {
        self.inner.waiters.cancel(token);
        self.with_call(token, |call| {
            call.mark_for_clearing(reason.unwrap_or(CallClearReason::LocalCleared), cause);
            call.end()
        })
        .await
    }

    /// The gatekeeper admitted a call
    pub fn admission_granted(&self, token: &str, destination: Option<TransportAddress>) -> Result<()> {
        self.inner.waiters.resolve(token, AdmissionResult::Granted { destination })
    }

    /// The gatekeeper refused a call
    pub fn admission_denied(&self, token: &str, reason: CallClearReason) -> Result<()> {
        self.inner.waiters.resolve(token, AdmissionResult::Denied { reason })
    }

    pub async fn h245_connected(&self, token: &str) -> Result<()> {
        self.with_call(token, |call| call.on_h245_connected()).await
    }

    pub async fn h245_connection_failed(&self, token: &str) -> Result<()> {
        self.with_call(token, |call| {
            call.on_h245_connect_failed();
            Ok(())
        })
        .await
    }

    /// The call's signaling connection went away
    pub async fn transport_closed(&self, token: &str) -> Result<()> {
        self.inner.waiters.cancel(token);
        self.with_call(token, |call| {
            if call.state() < CallState::Cleared {
                call.mark_for_clearing(CallClearReason::TransportFailure, None);
            }
            call.clean();
            Ok(())
        })
        .await
    }

    async fn admit(&self, handle: &CallHandle) -> Result<()> {
        let Some(gatekeeper) = self.active_gatekeeper() else {
            let mut call = handle.lock().await;
            let result = call.on_admitted();
            self.settle(&mut call).await;
            return result;
        };

        let (token, request, rx) = {
            let mut call = handle.lock().await;
            if let Err(e) = call.transition(CallState::WaitingAdmission) {
                self.settle(&mut call).await;
                return Err(e);
            }
            let token = call.token().to_string();
            let rx = self.inner.waiters.register(&token);
            (token, admission_request(&call), rx)
        };

        debug!(%token, "requesting admission");
        if let Err(e) = gatekeeper.request_admission(request).await {
            warn!(%token, "admission request failed: {}", e);
            self.inner.waiters.cancel(&token);
            return self.clear_after_admission(handle, CallClearReason::GkUnreachable).await;
        }

        let wait = self.inner.ctx.defaults.timeouts.admission();
        match await_admission(rx, wait).await {
            Ok(AdmissionResult::Granted { destination }) => {
                let mut call = handle.lock().await;
                if call.state().is_clearing() {
                    debug!(parent: call.span(), "admitted after the call was cleared");
                    return Ok(());
                }
                if let (Some(address), CallDirection::Outgoing) = (destination, call.direction()) {
                    call.remote_address = Some(address);
                }
                info!(parent: call.span(), "call admitted");
                let result = call.on_admitted();
                self.settle(&mut call).await;
                result
            }
            Ok(AdmissionResult::Denied { reason }) => {
                info!(%token, %reason, "admission denied");
                self.clear_after_admission(handle, reason).await
            }
            Err(e) => {
                warn!(%token, "no admission answer: {}", e);
                self.inner.waiters.cancel(&token);
                self.clear_after_admission(handle, CallClearReason::GkUnreachable).await
            }
        }
    }

    async fn clear_after_admission(&self, handle: &CallHandle, reason: CallClearReason) -> Result<()> {
        let mut call = handle.lock().await;
        call.mark_for_clearing(reason, None);
        self.settle(&mut call).await;
        Ok(())
    }

    /// Clean calls that finished clearing and drop removed ones
    ///
    /// Returns how many calls were removed. Calls busy under their lock
    /// are left for the next round.
    pub async fn reap(&self) -> usize {
        let mut removed = Vec::new();
        for (token, handle) in self.inner.registry.handles().await {
            let Ok(mut call) = handle.try_lock() else {
                continue;
            };
            if call.state() == CallState::Cleared {
                if let Err(e) = call.end() {
                    warn!(parent: call.span(), "cleanup failed: {}", e);
                }
                self.settle(&mut call).await;
            }
            if call.state() == CallState::Removed {
                removed.push((token, call.admitted));
            }
        }

        let count = removed.len();
        join_all(removed.into_iter().map(|(token, admitted)| self.detach(token, admitted))).await;
        if count > 0 {
            debug!(count, "reaped calls");
        }
        count
    }

    async fn detach(&self, token: String, admitted: bool) {
        self.inner.waiters.cancel(&token);
        self.inner.registry.remove(&token).await;
        if !admitted {
            return;
        }
        if let Some(gatekeeper) = self.active_gatekeeper() {
            if let Err(e) = gatekeeper.cleanup_call(&token).await {
                warn!(%token, "gatekeeper cleanup failed: {}", e);
            }
        }
    }

    /// Reap on a fixed interval until the handle is aborted
    pub fn spawn_monitor(&self, interval: Duration) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                engine.reap().await;
            }
        })
    }

    /// Dispatch events, drive clearing, hand off output and timers
    async fn settle(&self, call: &mut Call) {
        let span = call.span().clone();
        async {
            for _ in 0..MAX_SETTLE_ROUNDS {
                for event in call.take_events() {
                    self.dispatch(call, event).await;
                }
                if let Err(e) = drive_clearing(call) {
                    warn!("clearing failed: {}", e);
                }
                if let Err(e) = call.flush_h245_queue() {
                    warn!("failed to flush queued H.245: {}", e);
                }
                if !call.has_events() {
                    break;
                }
            }

            for event in call.take_outbox() {
                if self.inner.transport_tx.send(event).is_err() {
                    debug!("transport receiver gone, dropping output");
                }
            }
            for timer in call.take_pending_timers() {
                self.schedule_timer(call.token().to_string(), timer);
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch(&self, call: &mut Call, event: CallEvent) {
        let callbacks = &self.inner.callbacks;
        let result = match &event {
            CallEvent::NewCallCreated => callbacks.on_new_call_created(call).await,
            CallEvent::Alerting => callbacks.on_alerting(call).await,
            CallEvent::Progress => callbacks.on_progress(call).await,
            CallEvent::IncomingCall => callbacks.on_incoming_call(call).await,
            CallEvent::OutgoingCall => callbacks.on_outgoing_call(call).await,
            CallEvent::CallEstablished => callbacks.on_call_established(call).await,
            CallEvent::CallForwarded => callbacks.on_call_forwarded(call).await,
            CallEvent::CallCleared => callbacks.on_call_cleared(call).await,
            CallEvent::OpenLogicalChannels => match callbacks.open_logical_channels(call).await {
                Ok(true) => Ok(()),
                Ok(false) => call.open_default_channels().map_err(anyhow::Error::from),
                Err(e) => {
                    warn!("channel opening callback failed, opening defaults: {}", e);
                    call.open_default_channels().map_err(anyhow::Error::from)
                }
            },
            CallEvent::ReceivedDtmf(digits) => callbacks.on_received_dtmf(call, digits).await,
            CallEvent::ModeChanged { t38 } => callbacks.on_mode_changed(call, *t38).await,
        };
        if let Err(e) = result {
            warn!(?event, "callback failed: {}", e);
        }
    }

    fn schedule_timer(&self, token: String, timer: PendingTimer) {
        let engine = self.clone();
        let span = tracing::debug_span!("timer", %token, kind = ?timer.kind);
        tokio::spawn(
            async move {
                tokio::time::sleep(timer.after).await;
                engine.fire_timer(&token, timer.id).await;
            }
            .instrument(span),
        );
    }

    async fn fire_timer(&self, token: &str, id: u64) {
        let Some(handle) = self.inner.registry.get(token).await else {
            return;
        };
        let mut call = handle.lock().await;
        let Some(kind) = call.timers.fire(id) else {
            return;
        };
        if let Err(e) = call.on_timer(kind) {
            warn!(parent: call.span(), ?kind, "timer handling failed: {}", e);
        }
        self.settle(&mut call).await;
    }
}

/// Push a clearing call one step further
///
/// A call with nothing left to release goes straight on to `Removed`.
fn drive_clearing(call: &mut Call) -> Result<()> {
    if matches!(call.state(), CallState::Clear | CallState::ClearReleaseRecvd) && !call.flags.release_built {
        call.end()?;
    }
    if call.state() == CallState::Cleared {
        call.end()?;
    }
    Ok(())
}

fn admission_request(call: &Call) -> AdmissionRequest {
    let (source, destination) = match call.direction() {
        CallDirection::Outgoing => (&call.local_aliases, &call.remote_aliases),
        CallDirection::Incoming => (&call.remote_aliases, &call.local_aliases),
    };
    AdmissionRequest {
        token: call.token().to_string(),
        direction: call.direction(),
        call_identifier: call.call_identifier,
        call_reference: call.call_reference,
        source_aliases: source.clone(),
        destination_aliases: destination.clone(),
        destination_address: match call.direction() {
            CallDirection::Outgoing => call.remote_address,
            CallDirection::Incoming => Some(call.local_address),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EndpointDefaults;
    use h323_wire_core::uuie::{H225_PROTOCOL_IDENTIFIER, ProgressUuie};
    use h323_wire_core::{UserUserPdu, UuieBody};

    fn engine() -> (CallEngine, mpsc::UnboundedReceiver<EngineEvent>) {
        let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default()).unwrap());
        CallEngine::builder(ctx).build()
    }

    #[tokio::test]
    async fn test_alias_destination_needs_gatekeeper() {
        let (engine, _rx) = engine();
        let err = engine.make_call("alice", CallOptions::default()).await.unwrap_err();
        assert!(matches!(err, CallError::InvalidDestination(_)));
        assert!(engine.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_call_operations_fail() {
        let (engine, _rx) = engine();
        assert!(matches!(engine.answer_call("nope").await, Err(CallError::CallNotFound(_))));
        assert!(engine.admission_granted("nope", None).is_err());
    }

    #[tokio::test]
    async fn test_non_setup_first_message_rejected() {
        let (engine, _rx) = engine();
        let mut msg = Q931Message::new(MessageType::Alerting, 7, true);
        msg.user_user = Some(UserUserPdu::new(UuieBody::Alerting(ProgressUuie {
            protocol_identifier: H225_PROTOCOL_IDENTIFIER.to_string(),
            call_identifier: None,
            destination_info: None,
            h245_address: None,
            fast_start: Vec::new(),
        })));
        let err = engine.handle_incoming("in-1", msg.encode().unwrap()).await.unwrap_err();
        assert!(matches!(err, CallError::CallNotFound(_)));
        assert!(engine.find_call("in-1").await.is_none());
    }

    #[tokio::test]
    async fn test_undecodable_first_message_rejected() {
        let (engine, _rx) = engine();
        // Alerting without its user-user element
        let msg = Q931Message::new(MessageType::Alerting, 7, true);
        let err = engine.handle_incoming("in-2", msg.encode().unwrap()).await.unwrap_err();
        assert!(matches!(err, CallError::Wire(_)));

        let err = engine
            .handle_incoming("in-2", Bytes::from_static(&[0x08, 0x02]))
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Wire(_)));
        assert!(engine.registry().is_empty().await);
    }

    #[tokio::test]
    async fn test_repeated_end_call_then_reap() {
        let (engine, mut rx) = engine();
        let token = engine
            .make_call("10.0.0.5", CallOptions::default().with_token("out-1"))
            .await
            .unwrap();
        // Setup went out
        let first = rx.recv().await.unwrap();
        assert_eq!(first.token(), token);

        engine.end_call(&token, None, None).await.unwrap();
        engine.end_call(&token, None, None).await.unwrap();
        assert_eq!(engine.reap().await, 1);
        assert!(engine.find_call(&token).await.is_none());
        assert_eq!(engine.stats().await.calls.cleared, 1);
    }
}
