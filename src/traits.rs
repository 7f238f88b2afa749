//! Core traits defining the fundamental abstractions in NetPulse.
//!
//! This module centralizes the three seams the rest of the crate plugs
//! into: [`SharedStore`] (the storage/queue/pubsub backend), [`Driver`]
//! (a device connectivity adapter), and [`Scheduler`] (pinned-worker
//! placement policy). Concrete implementations live in `store/`,
//! `driver/`, and `scheduler/` respectively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::time::Duration;

use crate::cluster::NodeInfo;
use crate::error::Result;

// ============================================================================
// SharedStore
// ============================================================================

/// A message received from a [`SharedStore::subscribe`] stream.
#[derive(Debug, Clone)]
pub struct StoreMessage {
    /// Channel the message was published on.
    pub channel: String,
    /// Raw payload, JSON-encoded by the publisher.
    pub payload: String,
}

/// Contract for the backing store: atomic key/value, hash, list, and
/// pub/sub primitives. All operations are total — failures surface as
/// `Error::StoreUnavailable`, never panics.
///
/// Every key lives in the flat `netpulse:` namespace; see `store::keys`
/// for the reserved key layout.
#[async_trait]
pub trait SharedStore: Send + Sync + Debug {
    /// Fetches a string value, if present.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Sets a string value unconditionally.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Deletes a key. Returns the number of keys removed (0 or 1).
    async fn delete(&self, key: &str) -> Result<u64>;

    /// Sets a single hash field.
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Fetches a single hash field.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Removes a single hash field.
    async fn hdel(&self, key: &str, field: &str) -> Result<u64>;

    /// Sets a hash field only if it is not already present. Returns
    /// `true` if the field was set, `false` if it already existed. This
    /// is the atomic primitive `ClusterRegistry::bind` is built on.
    async fn hsetnx(&self, key: &str, field: &str, value: &str) -> Result<bool>;

    /// Conditional hash-field delete: succeeds only if the field's
    /// current value equals `expected`.
    async fn hcas_delete(&self, key: &str, field: &str, expected: &str) -> Result<bool>;

    /// Fetches all fields of a hash.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Atomically increments an integer hash field by `delta` (may be
    /// negative) and returns the resulting value.
    async fn hincrby(&self, key: &str, field: &str, delta: i64) -> Result<i64>;

    /// Pushes a value onto the tail of a list (queue).
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;

    /// Pops a value from the head of a list, blocking up to `timeout`.
    /// Returns `None` on timeout.
    async fn list_pop_blocking(&self, key: &str, timeout: Duration) -> Result<Option<String>>;

    /// Returns the current length of a list.
    async fn list_len(&self, key: &str) -> Result<u64>;

    /// Removes the first occurrence of `value` (matched by `id_of`
    /// callers comparing a serialized id) from a list. Returns the
    /// number of elements removed (0 or 1).
    async fn list_remove_by_value(&self, key: &str, value: &str) -> Result<u64>;

    /// Non-destructively snapshots every element currently in a list, in
    /// order. Used by the REST layer to enumerate still-queued job ids
    /// for a queue/host filter; never removes anything.
    async fn list_items(&self, key: &str) -> Result<Vec<String>>;

    /// Publishes a message to a pub/sub channel.
    async fn publish(&self, channel: &str, message: &str) -> Result<()>;

    /// Subscribes to a pub/sub channel, polling for the next message up
    /// to `timeout`. Returns `None` on timeout. Implementations may back
    /// this with a persistent subscriber task internally.
    async fn subscribe_once(&self, channel: &str, timeout: Duration) -> Result<Option<StoreMessage>>;

    /// Conditional set: succeeds only if the current value equals
    /// `expected` (or the key is absent and `expected` is `None`).
    /// Returns `true` on success.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
    ) -> Result<bool>;

    /// Conditional delete: succeeds only if the current value equals
    /// `expected`. Returns `true` on success.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// Sets an expiration, in seconds, on a key.
    async fn expire(&self, key: &str, seconds: u64) -> Result<()>;

    /// Lists every string key currently matching `prefix*`. Backs the
    /// REST layer's unfiltered `GET /job` and `GET /worker` listings,
    /// which have no single id/name to look up directly.
    async fn scan_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

// ============================================================================
// Driver
// ============================================================================

/// Opaque, driver-owned connection handle. Core code never inspects its
/// contents; it is passed back into [`Driver`] methods verbatim. The
/// `as_any` seam exists only so a `Driver` impl can downcast a connection
/// it knows it produced itself — callers outside that driver never do so.
pub trait Connection: Send + Sync + Debug {
    /// Supports downcasting back to the concrete connection type inside
    /// the driver that produced it.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// Per-command output map, keyed by the command string that produced it.
pub type CommandOutputs = HashMap<String, String>;

/// Connection arguments forwarded opaquely to the driver. `host` is the
/// only field the core inspects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionArgs {
    /// Target device host/address.
    pub host: String,
    /// Remaining fields, opaque to the core (port, username, auth, etc.).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ConnectionArgs {
    /// A stable fingerprint of the fields that affect connection
    /// identity: if this differs between two requests for the same
    /// host, the PinnedSession must be replaced rather than reused.
    pub fn fingerprint(&self) -> String {
        let mut keys: Vec<&String> = self.extra.keys().collect();
        keys.sort();
        let mut parts = vec![format!("host={}", self.host)];
        for k in keys {
            parts.push(format!("{k}={}", self.extra[k]));
        }
        parts.join("|")
    }

    /// The configured keepalive interval (`conn_args.keepalive`),
    /// defaulting to 30s (inside the recommended [10, 300] second range)
    /// when absent. An explicit value is taken as given, including below
    /// 10s — invariant 8's "dead connection observed within
    /// 3*keepalive_interval" bound has to hold for whatever value is
    /// actually configured, not just the recommended default.
    pub fn keepalive_interval(&self) -> Duration {
        let secs = match self.extra.get("keepalive").and_then(|v| v.as_u64()) {
            Some(secs) => secs.clamp(1, 300),
            None => 30,
        };
        Duration::from_secs(secs)
    }
}

/// Adapter to a device family's management protocol (SSH/Telnet/HTTP/…).
/// Implementations own the transport; the core only ever calls through
/// this trait.
#[async_trait]
pub trait Driver: Send + Sync + Debug {
    /// Unique registry name, e.g. `"netmiko_ssh"`.
    fn name(&self) -> &str;

    /// `true` if this driver's connections may be kept open and reused
    /// across jobs (the default queue strategy is then `pinned`);
    /// `false` selects `fifo` by default.
    fn supports_persistent_session(&self) -> bool;

    /// Opens a connection. Fails with `ConnectionFailed`,
    /// `AuthenticationFailed`, or `Timeout`.
    async fn connect(&self, conn_args: &ConnectionArgs) -> Result<Box<dyn Connection>>;

    /// Runs a batch of read-only query commands serially, returning
    /// each command's output. Fails with `CommandFailed`,
    /// `ProtocolError`, or `Timeout`.
    async fn send(
        &self,
        connection: &dyn Connection,
        commands: &[String],
    ) -> Result<CommandOutputs>;

    /// Applies configuration lines, returning the device's response.
    async fn configure(
        &self,
        connection: &dyn Connection,
        config: &[String],
        flags: &HashMap<String, serde_json::Value>,
    ) -> Result<String>;

    /// Closes the connection. Idempotent: a second call never errors.
    async fn disconnect(&self, connection: &dyn Connection) -> Result<()>;

    /// Cheap health probe, used by the PinnedSession monitor loop.
    async fn is_alive(&self, connection: &dyn Connection) -> Result<bool>;

    /// Sends application-layer keepalive traffic.
    async fn keepalive(&self, connection: &dyn Connection) -> Result<()>;
}

// ============================================================================
// Scheduler
// ============================================================================

/// Placement policy for pinned workers. Implementations are pure
/// functions of their inputs; the active scheduler is fixed at process
/// start and does not change at runtime.
pub trait Scheduler: Send + Sync + Debug {
    /// Registry name, e.g. `"greedy"`, `"least_load"`.
    fn name(&self) -> &str;

    /// Selects a single node for `host` from a read-only snapshot.
    /// Fails with `CapacityExhausted` if no node has `count < capacity`.
    fn select(&self, snapshot: &[NodeInfo], host: &str) -> Result<NodeInfo>;

    /// Selects nodes for many hosts at once against a shared residual
    /// capacity view, returning one `(host, NodeInfo)` pair per host
    /// that could be placed. Hosts that cannot be placed are omitted;
    /// callers compare the output length against the input to detect
    /// partial failures.
    fn batch_select(&self, snapshot: &[NodeInfo], hosts: &[String]) -> Vec<(String, NodeInfo)>;
}
