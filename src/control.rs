//! Inter-process control messages exchanged over the pub/sub channels
//! `netpulse:control:<node_id>` and `netpulse:control:reply:<request_id>`
//! (`spec.md` §6.3).

use std::time::Duration;

use tracing::trace;

use crate::error::Result;
use crate::store::keys;
use crate::traits::SharedStore;

/// A TTL applied to reply keys/channels isn't needed for pub/sub itself
/// (messages aren't retained), but mirrors the 10s default spawn_timeout
/// recommended by `spec.md` §4.9 for how long a requester should wait.
pub const DEFAULT_REPLY_WAIT: Duration = Duration::from_secs(10);

/// A message published to a node's control channel.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Asks the node to spawn a PinnedWorker for `host`.
    SpawnPinned {
        /// Correlates this request with its reply.
        request_id: String,
        /// Target device host.
        host: String,
        /// `ConnectionArgs::fingerprint()` of the requesting job, so the
        /// supervisor can detect a stale spawn request.
        conn_args_fingerprint: String,
    },
    /// Asks the node to terminate the PinnedWorker for `host`.
    KillPinned {
        /// Correlates this request with its reply.
        request_id: String,
        /// Target device host.
        host: String,
    },
    /// Asks the node to terminate every PinnedWorker it owns.
    KillAll {
        /// Correlates this request with its reply.
        request_id: String,
    },
    /// Asks the node to stop accepting spawns and wind down.
    Drain {
        /// Correlates this request with its reply.
        request_id: String,
    },
}

impl ControlMessage {
    /// The `request_id` every variant carries.
    pub fn request_id(&self) -> &str {
        match self {
            ControlMessage::SpawnPinned { request_id, .. }
            | ControlMessage::KillPinned { request_id, .. }
            | ControlMessage::KillAll { request_id }
            | ControlMessage::Drain { request_id } => request_id,
        }
    }
}

/// A reply published to `netpulse:control:reply:<request_id>`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ControlReply {
    /// The PinnedWorker was created and published its `WorkerRecord`.
    Spawned {
        /// Target device host.
        host: String,
        /// Node that now owns the host binding.
        node_id: String,
        /// Name of the spawned `WorkerRecord`.
        worker_name: String,
    },
    /// The node is already at `capacity`; the Dispatcher should retry
    /// scheduling elsewhere.
    CapacityExhausted,
    /// Another node won the `ClusterRegistry::bind` race; `node_id` is
    /// the winner the Dispatcher should enqueue to instead.
    LostRace {
        /// Winning node's id.
        node_id: String,
    },
    /// The request completed or was acknowledged with no further data
    /// (`KillPinned`, `KillAll`, `Drain`).
    Ack,
    /// The child process was spawned but never published a `WorkerRecord`
    /// within the spawn timeout; the node rolled the attempt back.
    SpawnFailed {
        /// Human-readable detail.
        message: String,
    },
}

/// Publishes `message` to `node_id`'s control channel.
pub async fn send(store: &dyn SharedStore, node_id: &str, message: &ControlMessage) -> Result<()> {
    let payload = serde_json::to_string(message)?;
    trace!(node_id, request_id = message.request_id(), "publishing control message");
    store.publish(&keys::control_channel(node_id), &payload).await
}

/// Publishes `reply` for `request_id` on its reply channel.
pub async fn reply(store: &dyn SharedStore, request_id: &str, reply: &ControlReply) -> Result<()> {
    let payload = serde_json::to_string(reply)?;
    store
        .publish(&keys::control_reply_channel(request_id), &payload)
        .await
}

/// Receives the next control message on `node_id`'s channel, waiting up
/// to `timeout`. Malformed payloads are logged and skipped rather than
/// surfaced as errors, since a hostile or stale publisher shouldn't take
/// the supervisor down.
pub async fn receive(
    store: &dyn SharedStore,
    node_id: &str,
    timeout: Duration,
) -> Result<Option<ControlMessage>> {
    let Some(msg) = store.subscribe_once(&keys::control_channel(node_id), timeout).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&msg.payload) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(err) => {
            tracing::warn!(error = %err, payload = %msg.payload, "dropping malformed control message");
            Ok(None)
        }
    }
}

/// Waits up to `timeout` for a reply to `request_id`.
pub async fn await_reply(
    store: &dyn SharedStore,
    request_id: &str,
    timeout: Duration,
) -> Result<Option<ControlReply>> {
    let Some(msg) = store
        .subscribe_once(&keys::control_reply_channel(request_id), timeout)
        .await?
    else {
        return Ok(None);
    };
    Ok(serde_json::from_str(&msg.payload).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    #[tokio::test]
    async fn round_trips_spawn_request_and_reply() {
        let store = InMemoryStore::new();
        let msg = ControlMessage::SpawnPinned {
            request_id: "req-1".into(),
            host: "r1".into(),
            conn_args_fingerprint: "host=r1".into(),
        };
        send(&store, "node-a", &msg).await.unwrap();
        let received = receive(&store, "node-a", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.request_id(), "req-1");

        reply(
            &store,
            "req-1",
            &ControlReply::Spawned {
                host: "r1".into(),
                node_id: "node-a".into(),
                worker_name: "pinned:r1:123".into(),
            },
        )
        .await
        .unwrap();
        let got = await_reply(&store, "req-1", Duration::from_millis(50))
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(got, ControlReply::Spawned { .. }));
    }

    #[tokio::test]
    async fn receive_times_out_with_no_message() {
        let store = InMemoryStore::new();
        let result = receive(&store, "node-a", Duration::from_millis(20)).await.unwrap();
        assert!(result.is_none());
    }
}
