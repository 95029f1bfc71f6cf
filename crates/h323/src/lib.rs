//! # h323 - H.323 call control for Rust
//!
//! This crate bundles the pieces of the stack:
//!
//! - [`wire_core`]: Q.931 with its information elements, the H.225
//!   user-user PDU, H.245 messages and TPKT framing
//! - [`call_core`]: calls, capability negotiation, fast start, H.245
//!   procedures, clearing and the [`CallEngine`](call_core::CallEngine)
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use h323::prelude::*;
//!
//! # async fn run() -> h323::call_core::Result<()> {
//! let ctx = Arc::new(EndpointContext::new(EndpointDefaults::default())?);
//! let (engine, _transport_rx) = CallEngine::builder(ctx).build();
//! engine.make_call("10.0.0.7:1720", CallOptions::default()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(rust_2018_idioms)]

pub use h323_call_core as call_core;
pub use h323_wire_core as wire_core;

pub mod prelude {
    //! Common imports for h323 applications

    pub use crate::call_core::{
        Call, CallCallbacks, CallClearReason, CallDirection, CallEngine, CallError, CallEvent, CallMode,
        CallOptions, CallState, CapabilityConfig, CapabilityDescriptor, Destination, DtmfMode, EndpointContext,
        EndpointDefaults, EngineEvent, GatekeeperClient, LoggingConfig, MediaChannelOps, OutboundKind,
        OutboundMessage, setup_logging,
    };
    pub use crate::wire_core::{AliasAddress, AliasKind, MessageType, Q931Cause, Q931Message, TransportAddress};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
