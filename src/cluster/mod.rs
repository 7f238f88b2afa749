//! ClusterRegistry: the shared-store-backed view of which nodes exist
//! and which device hosts are currently bound to which node.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Error, Result};
use crate::store::keys;
use crate::traits::SharedStore;

/// Describes a worker host known to the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Unique node identifier.
    pub node_id: String,
    /// Hostname; stable, used as the final tie-break in scheduling.
    pub hostname: String,
    /// Maximum concurrent PinnedWorkers this node will host.
    pub capacity: u32,
    /// Current pinned worker count.
    pub count: u32,
    /// Unix timestamp of the last heartbeat.
    pub last_heartbeat: u64,
}

impl NodeInfo {
    /// `true` if `count < capacity`.
    pub fn has_capacity(&self) -> bool {
        self.count < self.capacity
    }

    /// Remaining slots (`capacity - count`).
    pub fn residual_capacity(&self) -> u32 {
        self.capacity.saturating_sub(self.count)
    }

    fn is_alive(&self, node_ttl_secs: u64) -> bool {
        now_unix().saturating_sub(self.last_heartbeat) <= node_ttl_secs
    }
}

/// Read-write handle onto the cluster's shared state: node heartbeats
/// and host-to-node bindings.
#[derive(Debug, Clone)]
pub struct ClusterRegistry {
    store: Arc<dyn SharedStore>,
    node_ttl_secs: u64,
}

impl ClusterRegistry {
    /// Builds a registry over `store`, treating nodes silent for more
    /// than `node_ttl_secs` as dead.
    pub fn new(store: Arc<dyn SharedStore>, node_ttl_secs: u64) -> Self {
        Self {
            store,
            node_ttl_secs,
        }
    }

    /// Upserts `info` (stamping `last_heartbeat` to now) and sets the
    /// record's expiration to `node_ttl`.
    pub async fn heartbeat(&self, node_id: &str, mut info: NodeInfo) -> Result<()> {
        info.node_id = node_id.to_string();
        info.last_heartbeat = now_unix();
        let serialized = serde_json::to_string(&info)?;
        self.store
            .hset(keys::NODE_INFO_MAP, node_id, &serialized)
            .await?;
        self.store.expire(keys::NODE_INFO_MAP, self.node_ttl_secs).await
    }

    /// Returns every node whose heartbeat is within TTL. Dead nodes are
    /// silently excluded, never reported.
    pub async fn snapshot(&self) -> Result<Vec<NodeInfo>> {
        let raw = self.store.hgetall(keys::NODE_INFO_MAP).await?;
        let mut nodes = Vec::with_capacity(raw.len());
        for value in raw.values() {
            let info: NodeInfo = serde_json::from_str(value)?;
            if info.is_alive(self.node_ttl_secs) {
                nodes.push(info);
            }
        }
        nodes.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        Ok(nodes)
    }

    /// Reads the current binding for `host`, if any.
    pub async fn get_binding(&self, host: &str) -> Result<Option<String>> {
        self.store.hget(keys::HOST_TO_NODE_MAP, host).await
    }

    /// Conditional set: succeeds only if `host` has no existing binding.
    /// On conflict, returns `Err` carrying the winning node id via
    /// `Error::HostAlreadyPinned`, which the Dispatcher recovers from
    /// internally. Backed by the store's atomic `hsetnx`, the single
    /// primitive preventing two pinned workers for the same host.
    pub async fn bind(&self, host: &str, node_id: &str) -> Result<()> {
        let set = self
            .store
            .hsetnx(keys::HOST_TO_NODE_MAP, host, node_id)
            .await?;
        if set {
            return Ok(());
        }
        let winner = self.get_binding(host).await?.unwrap_or_default();
        Err(Error::HostAlreadyPinned {
            host: host.to_string(),
            queue: format!("pinned:{winner}"),
        })
    }

    /// Conditional delete: succeeds only if `host` is currently bound to
    /// `expected_node_id`.
    pub async fn unbind(&self, host: &str, expected_node_id: &str) -> Result<bool> {
        self.store
            .hcas_delete(keys::HOST_TO_NODE_MAP, host, expected_node_id)
            .await
    }

    /// Atomically adjusts a node's pinned worker count by `delta`.
    pub async fn adjust_count(&self, node_id: &str, delta: i64) -> Result<()> {
        let raw = self.store.hget(keys::NODE_INFO_MAP, node_id).await?;
        let Some(raw) = raw else {
            return Ok(());
        };
        let mut info: NodeInfo = serde_json::from_str(&raw)?;
        info.count = (info.count as i64 + delta).max(0) as u32;
        let serialized = serde_json::to_string(&info)?;
        self.store.hset(keys::NODE_INFO_MAP, node_id, &serialized).await
    }

    /// Increments a node's pinned worker count by `delta` (delta >= 0).
    pub async fn increment_count(&self, node_id: &str, delta: u32) -> Result<()> {
        self.adjust_count(node_id, delta as i64).await
    }

    /// Decrements a node's pinned worker count by `delta` (delta >= 0).
    pub async fn decrement_count(&self, node_id: &str, delta: u32) -> Result<()> {
        self.adjust_count(node_id, -(delta as i64)).await
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;

    fn node(id: &str, capacity: u32, count: u32) -> NodeInfo {
        NodeInfo {
            node_id: id.to_string(),
            hostname: id.to_string(),
            capacity,
            count,
            last_heartbeat: now_unix(),
        }
    }

    #[tokio::test]
    async fn bind_is_compare_and_swap() {
        let store = Arc::new(InMemoryStore::new());
        let registry = ClusterRegistry::new(store, 30);
        registry.heartbeat("node-a", node("node-a", 4, 0)).await.unwrap();

        registry.bind("r1", "node-a").await.unwrap();
        let err = registry.bind("r1", "node-b").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HostAlreadyPinned);
        assert_eq!(registry.get_binding("r1").await.unwrap().as_deref(), Some("node-a"));
    }

    #[tokio::test]
    async fn unbind_requires_matching_owner() {
        let store = Arc::new(InMemoryStore::new());
        let registry = ClusterRegistry::new(store, 30);
        registry.bind("r1", "node-a").await.unwrap();
        assert!(!registry.unbind("r1", "node-b").await.unwrap());
        assert!(registry.unbind("r1", "node-a").await.unwrap());
        assert!(registry.get_binding("r1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshot_excludes_dead_nodes() {
        let store = Arc::new(InMemoryStore::new());
        let registry = ClusterRegistry::new(store.clone(), 30);
        let mut stale = node("node-stale", 4, 0);
        stale.last_heartbeat = 0;
        let serialized = serde_json::to_string(&stale).unwrap();
        store
            .hset(keys::NODE_INFO_MAP, "node-stale", &serialized)
            .await
            .unwrap();
        registry.heartbeat("node-fresh", node("node-fresh", 4, 0)).await.unwrap();

        let snapshot = registry.snapshot().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].node_id, "node-fresh");
    }
}
