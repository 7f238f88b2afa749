//! Telemetry module for NetPulse observability.
//!
//! This module provides structured logging via the `tracing` crate with
//! pretty, compact, JSON, and full output formats. Every process role (API
//! server, node supervisor, pinned worker, fifo worker) calls the same
//! `init` helper at startup so log format is uniform across the fleet.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use netpulse::telemetry::logging::init_from_verbosity;
//!
//! init_from_verbosity(1)?;
//! tracing::info!(host = %host, "dispatching job");
//! ```

pub mod config;
pub mod logging;

pub use config::{LogFormat, LogLevel, LoggingConfig, TelemetryConfig};
pub use logging::{LoggingBuilder, LoggingLayer};

/// Initialize logging for the current process from a [`TelemetryConfig`].
///
/// This is the single entry point every `netpulse` subcommand calls at
/// startup; it is idempotent in the sense that a second call simply fails
/// with a logged warning rather than panicking (`tracing_subscriber`
/// refuses to install a second global subscriber).
pub fn init(config: &TelemetryConfig) -> crate::error::Result<()> {
    if !config.logging.enabled {
        return Ok(());
    }
    LoggingBuilder::from_config(config.logging.clone()).init()
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use super::config::{LogFormat, LogLevel, LoggingConfig, TelemetryConfig};
    pub use super::init;
    pub use tracing::{debug, error, info, instrument, trace, warn, Instrument, Span};
}
