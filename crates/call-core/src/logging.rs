//! Tracing subscriber setup and per-call spans
//!
//! Every call runs inside a `call` span carrying its token and direction,
//! so filtering on a token follows one call through the engine, its timers
//! and the codecs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{Level, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt};

use crate::call::CallDirection;
use crate::error::{CallError, Result};

/// Target of the message codecs
const WIRE_TARGET: &str = "h323_wire_core";

/// Logging section of an endpoint configuration
///
/// `RUST_LOG`, when set, replaces the levels given here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level for call control
    pub level: String,
    /// Separate level for the codecs; `trace` logs every element decoded
    pub wire_level: Option<String>,
    pub json: bool,
    /// Log when each call span opens and closes, giving call lifetimes
    pub call_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            wire_level: None,
            json: false,
            call_spans: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level.to_string().to_lowercase();
        self
    }

    pub fn with_wire_level(mut self, level: Level) -> Self {
        self.wire_level = Some(level.to_string().to_lowercase());
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_call_spans(mut self) -> Self {
        self.call_spans = true;
        self
    }

    /// Filter directives for this configuration
    pub fn directives(&self) -> Result<Vec<String>> {
        let mut directives = vec![parse_log_level(&self.level)?.to_string().to_lowercase()];
        if let Some(wire) = &self.wire_level {
            let wire = parse_log_level(wire)?;
            directives.push(format!("{}={}", WIRE_TARGET, wire.to_string().to_lowercase()));
        }
        Ok(directives)
    }

    fn filter(&self) -> Result<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.directives()?.join(","))
            .map_err(|e| CallError::invalid_config(format!("log filter: {}", e)))
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let span_events = if config.call_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.filter()?)
        .with_span_events(span_events)
        .with_target(config.wire_level.is_some());

    let installed = if config.json {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CallError::invalid_config(format!("logging: {}", e)))?;

    tracing::info!(level = %config.level, wire = ?config.wire_level, "logging initialised");
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| CallError::invalid_config(format!("Invalid log level: {}", level)))
}

/// Span entered while processing anything for one call
pub fn call_span(token: &str, direction: CallDirection) -> Span {
    tracing::info_span!("call", token = %token, direction = %direction)
}
