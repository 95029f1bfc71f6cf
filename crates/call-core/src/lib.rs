//! # h323-call-core
//!
//! Call control for H.323 endpoints and gateways, on top of the message
//! codecs in `h323-wire-core`.
//!
//! ## Features
//!
//! - **Call state machine**: main call state plus H.245 session,
//!   master/slave and capability exchange axes, advanced under one lock
//! - **Capability negotiation**: direction-aware matching, preference order
//!   and joint capability selection
//! - **Fast start**: cached offers and answers embedded in Q.931
//! - **H.245 procedures**: tunneled or over a separate connection
//! - **Clearing**: end-session and release-complete sent at most once,
//!   with causes mapped both ways
//! - **Gatekeeper boundary**: bounded admission wait
//!
//! ## Usage
//!
//! The transport reads [`EngineEvent`]s from the channel returned by
//! [`CallEngineBuilder::build`] and feeds received bytes back through
//! [`CallEngine::handle_incoming`] and [`CallEngine::handle_h245`].
//! Applications hook in through [`CallCallbacks`].

pub mod call;
pub mod callbacks;
pub mod capability;
pub mod cause;
pub mod channel;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod faststart;
pub mod gatekeeper;
pub mod h245;
pub mod logging;
pub mod outbound;
pub mod q931;
pub mod registry;
pub mod timer;

pub use call::{Call, CallDirection, CallMode, CallState, Destination, ForwardData};
pub use callbacks::{CallCallbacks, CallEvent, NoopCallbacks};
pub use capability::{CallCapabilities, CapabilityDescriptor, DtmfMode, MediaChannelOps, PreferenceList};
pub use cause::CallClearReason;
pub use channel::{ChannelDirection, ChannelState, LogicalChannel};
pub use config::{CapabilityConfig, EndpointDefaults, Timeouts};
pub use context::EndpointContext;
pub use engine::{CallEngine, CallEngineBuilder, CallOptions, EngineStats};
pub use error::{CallError, Result};
pub use gatekeeper::{AdmissionRequest, AdmissionResult, GatekeeperClient};
pub use logging::{LoggingConfig, setup_logging};
pub use outbound::{EngineEvent, OutboundKind, OutboundMessage};
pub use registry::{CallHandle, CallRegistry, RegistryStats};

/// Version of the call-control library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
