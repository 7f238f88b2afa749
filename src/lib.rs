//! # NetPulse — a distributed control plane for network device fleets
//!
//! NetPulse schedules operations (show commands, configuration pushes,
//! connectivity probes) against large fleets of routers, switches, and
//! Linux hosts reachable over SSH, Telnet, or vendor HTTP APIs. Clients
//! submit work through a REST API; the Dispatcher classifies each request
//! into a queue strategy and hands it to either a shared FIFO worker pool
//! or a device-pinned worker process with a long-lived, health-monitored
//! session.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         REST API (api::)                             │
//! │             device/execute, device/bulk, job, worker                 │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      Dispatcher (dispatcher::)                        │
//! │     classify -> resolve binding/scheduler -> enqueue -> job handle    │
//! └─────────────────────────────────────────────────────────────────────┘
//!                │                                    │
//!                ▼                                    ▼
//! ┌─────────────────────────┐          ┌─────────────────────────────────┐
//! │  ClusterRegistry /        │          │     SharedStore (store::)        │
//! │  Scheduler (cluster::,    │◄────────►│  KV + queues + pub/sub, backed   │
//! │  scheduler::)             │          │  by Redis or an in-memory fake   │
//! └─────────────────────────┘          └─────────────────────────────────┘
//!                │                                    │
//!                ▼                                    ▼
//! ┌─────────────────────────┐          ┌─────────────────────────────────┐
//! │  NodeSupervisor           │  forks   │      PinnedWorker / FifoWorker   │
//! │  (supervisor::)           │─────────►│  (pinned_worker::, fifo_worker::)│
//! └─────────────────────────┘          └─────────────────────────────────┘
//! ```
//!
//! ## Quick example
//!
//! ```rust,ignore
//! use netpulse::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> netpulse::error::Result<()> {
//!     let store: Arc<dyn SharedStore> = Arc::new(netpulse::store::InMemoryStore::new());
//!     let cluster = ClusterRegistry::new(store.clone(), 30);
//!     let scheduler: Arc<dyn Scheduler> = Arc::new(netpulse::scheduler::Greedy);
//!     let drivers = Arc::new(DriverRegistry::with_builtins());
//!
//!     let dispatcher = Dispatcher::new(store, cluster, scheduler, drivers, 300, 60, 3600);
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude {
    pub use crate::cluster::{ClusterRegistry, NodeInfo};
    pub use crate::control::{ControlMessage, ControlReply};
    pub use crate::dispatcher::{BulkOutcome, Dispatcher};
    pub use crate::driver::DriverRegistry;
    pub use crate::error::{Error, ErrorKind, Result};
    pub use crate::job::{
        Job, JobError, JobResult, JobStatus, Operation, QueueStrategy, Request, RequestOptions,
        WebhookSpec, WorkerRecord, WorkerStatus,
    };
    pub use crate::traits::{Connection, ConnectionArgs, Driver, Scheduler, SharedStore};
}

// ============================================================================
// Core seams: SharedStore, Driver, Scheduler traits
// ============================================================================

/// Core trait definitions: [`traits::SharedStore`], [`traits::Driver`],
/// [`traits::Scheduler`] — the three seams the rest of the crate plugs
/// into.
pub mod traits;

// ============================================================================
// Error handling
// ============================================================================

/// Crate-wide error type and the wire-visible `ErrorKind` taxonomy.
pub mod error;

// ============================================================================
// Configuration
// ============================================================================

/// Typed configuration, loaded from file and `NETPULSE_*` environment
/// overrides.
pub mod config;

// ============================================================================
// Data model
// ============================================================================

/// Core data model: [`job::Request`], [`job::Job`], [`job::WorkerRecord`],
/// [`job::WebhookSpec`].
pub mod job;

// ============================================================================
// Shared store
// ============================================================================

/// The `SharedStore` adapter: reserved key layout plus the Redis-backed
/// and in-memory implementations.
pub mod store;

// ============================================================================
// Cluster state
// ============================================================================

/// `ClusterRegistry`: live nodes, capacity, and host-to-node bindings.
pub mod cluster;

// ============================================================================
// Scheduler plugins
// ============================================================================

/// Pinned-worker placement policies (`greedy`, `least_load`,
/// `least_load_random`, `load_weighted_random`).
pub mod scheduler;

// ============================================================================
// Driver registry
// ============================================================================

/// Device connectivity adapters and the registry that looks them up by
/// name.
pub mod driver;

// ============================================================================
// Inter-process control protocol
// ============================================================================

/// Pub/sub control messages exchanged between the Dispatcher and
/// `NodeSupervisor`s.
pub mod control;

// ============================================================================
// PinnedSession
// ============================================================================

/// Long-lived, self-healing device connection owned by a `PinnedWorker`.
pub mod session;

// ============================================================================
// Process roles
// ============================================================================

/// The per-host daemon that forks and supervises `PinnedWorker` children.
pub mod supervisor;

/// Single-host serial job executor bound to one device.
pub mod pinned_worker;

/// Stateless parallel job executor consuming the shared FIFO queue.
pub mod fifo_worker;

/// Stateless request-handling front end tying the above together.
pub mod dispatcher;

// ============================================================================
// Webhooks
// ============================================================================

/// Best-effort outgoing webhook delivery on job terminal transitions.
pub mod webhook;

// ============================================================================
// Observability
// ============================================================================

/// Structured logging/tracing setup, uniform across every process role.
pub mod telemetry;

/// Prometheus-compatible metrics collector: connection, pool, and
/// command counters/histograms, carried as ambient observability
/// scaffolding. Not yet wired into any job or connection path.
pub mod metrics;

// ============================================================================
// REST API
// ============================================================================

/// The REST API surface consumed by clients (`spec.md` §6.1), built on
/// top of the [`dispatcher::Dispatcher`].
pub mod api;

// ============================================================================
// Version information
// ============================================================================

/// Returns the current version of NetPulse.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Returns detailed version information including build metadata.
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION"),
        target: std::env::consts::ARCH,
        profile: if cfg!(debug_assertions) {
            "debug"
        } else {
            "release"
        },
    }
}

/// Detailed version information for the running NetPulse build.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// Semantic version string.
    pub version: &'static str,
    /// Target architecture for the build.
    pub target: &'static str,
    /// Build profile (debug or release).
    pub profile: &'static str,
}

impl std::fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "netpulse {} ({}, {})", self.version, self.target, self.profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_nonempty() {
        assert!(!version().is_empty());
    }

    #[test]
    fn version_info_displays() {
        let info = version_info();
        assert!(info.to_string().starts_with("netpulse"));
    }
}
