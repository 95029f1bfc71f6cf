//! Application callbacks fired on call lifecycle events
//!
//! The call records a [`CallEvent`] whenever something the application
//! should hear about happens. The engine dispatches them to a
//! [`CallCallbacks`] implementation once the call's own bookkeeping for
//! the message is complete, so a callback always sees post-transition
//! state. A callback error is logged and otherwise ignored.

use async_trait::async_trait;

use crate::call::Call;

/// Lifecycle event awaiting dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    NewCallCreated,
    Alerting,
    Progress,
    IncomingCall,
    OutgoingCall,
    CallEstablished,
    CallForwarded,
    CallCleared,
    OpenLogicalChannels,
    ReceivedDtmf(String),
    ModeChanged { t38: bool },
}

/// Hooks invoked by the engine under the call's lock
///
/// Every method has a do-nothing default, so an implementation only
/// overrides what it cares about.
#[async_trait]
pub trait CallCallbacks: Send + Sync {
    async fn on_new_call_created(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_alerting(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_progress(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_incoming_call(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_outgoing_call(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_call_established(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_call_forwarded(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_call_cleared(&self, _call: &mut Call) -> anyhow::Result<()> {
        Ok(())
    }

    /// Open the call's media channels
    ///
    /// Return `Ok(false)` to let the engine open default channels.
    async fn open_logical_channels(&self, _call: &mut Call) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn on_received_dtmf(&self, _call: &mut Call, _digits: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn on_mode_changed(&self, _call: &mut Call, _t38: bool) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Callbacks that accept every event and do nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCallbacks;

#[async_trait]
impl CallCallbacks for NoopCallbacks {}
