//! SharedStore adapter: the flat `netpulse:` key namespace and the two
//! concrete backends (a Redis-backed implementation for production, an
//! in-memory fake for tests).

pub mod memory;
pub mod redis_store;

pub use memory::InMemoryStore;
pub use redis_store::RedisStore;

/// Reserved key names under the `netpulse:` namespace, per `spec.md` §4.1.
pub mod keys {
    /// Hash mapping device host -> owning node id.
    pub const HOST_TO_NODE_MAP: &str = "netpulse:host_to_node_map";
    /// Hash mapping node id -> serialized `NodeInfo`.
    pub const NODE_INFO_MAP: &str = "netpulse:node_info_map";
    /// FIFO job queue.
    pub const QUEUE_FIFO: &str = "netpulse:queue:fifo";

    /// Key for a worker's published `WorkerRecord`.
    pub fn worker(name: &str) -> String {
        format!("netpulse:workers:{name}")
    }

    /// Key for a job record.
    pub fn job(id: &str) -> String {
        format!("netpulse:jobs:{id}")
    }

    /// Pinned queue name for `host`.
    pub fn queue_pinned(host: &str) -> String {
        format!("netpulse:queue:pinned:{host}")
    }

    /// Control channel for `node_id`.
    pub fn control_channel(node_id: &str) -> String {
        format!("netpulse:control:{node_id}")
    }

    /// Reply channel for a control message's `request_id`.
    pub fn control_reply_channel(request_id: &str) -> String {
        format!("netpulse:control:reply:{request_id}")
    }
}
