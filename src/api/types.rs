//! REST request/response DTOs (`spec.md` §6.1). The wire shapes here are
//! deliberately thin wrappers over the core [`crate::job`] types — the API
//! layer's only job is translating HTTP in and out of the Dispatcher.

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus, Request};

// ============================================================================
// POST /device/execute
// ============================================================================

/// Body of `POST /device/execute`. Identical in shape to the core
/// [`Request`] the Dispatcher consumes.
pub type DeviceExecuteRequest = Request;

/// `data` payload of a successful `POST /device/execute` response.
#[derive(Debug, Serialize)]
pub struct DeviceExecuteResponse {
    /// Id of the newly created job.
    pub id: String,
    /// Always `queued` immediately after submission.
    pub status: JobStatus,
    /// Queue the job was placed on (`netpulse:queue:fifo` or
    /// `pinned:<host>`).
    pub queue: String,
}

// ============================================================================
// POST /device/bulk
// ============================================================================

/// Body of `POST /device/bulk`: one [`Request`] per target device.
#[derive(Debug, Deserialize)]
pub struct DeviceBulkRequest {
    /// Requests to dispatch in one batch.
    pub requests: Vec<Request>,
}

/// A request that could not be placed, with the reason why.
#[derive(Debug, Serialize)]
pub struct BulkFailure {
    /// Target host that failed to dispatch.
    pub host: String,
    /// Human-readable failure reason.
    pub error: String,
}

/// `data` payload of `POST /device/bulk`. Requests in `requests` are
/// processed independently; a partial failure still returns 200 with
/// both lists populated.
#[derive(Debug, Serialize)]
pub struct DeviceBulkResponse {
    /// Jobs that were successfully enqueued.
    pub succeeded: Vec<DeviceExecuteResponse>,
    /// Requests that could not be placed.
    pub failed: Vec<BulkFailure>,
}

// ============================================================================
// POST /device/test-connection
// ============================================================================

/// Body of `POST /device/test-connection`: a synchronous connect probe,
/// never produces a [`Job`].
#[derive(Debug, Deserialize)]
pub struct TestConnectionRequest {
    /// Selects a `DriverRegistry` entry.
    pub driver: String,
    /// Connection parameters to probe.
    pub connection_args: crate::traits::ConnectionArgs,
}

/// `data` payload of `POST /device/test-connection`.
#[derive(Debug, Serialize)]
pub struct TestConnectionResponse {
    /// Whether `connect` (and `disconnect`) both succeeded.
    pub success: bool,
    /// Wall-clock time the probe took, in milliseconds.
    pub connection_time_ms: u64,
    /// Populated when `success` is `false`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

// ============================================================================
// GET /job, DELETE /job
// ============================================================================

/// Query parameters shared by `GET /job` and `DELETE /job`. At least one
/// of `id`, `queue`, or `host` should be supplied; `id` takes precedence
/// when present since it can resolve jobs in any status, while `queue`/
/// `host` filters can only enumerate jobs still sitting in a queue.
#[derive(Debug, Default, Deserialize)]
pub struct JobQuery {
    /// Direct lookup by job id.
    pub id: Option<String>,
    /// Restrict to a specific queue (`fifo` or `pinned:<host>`).
    pub queue: Option<String>,
    /// Restrict to a specific job status.
    pub status: Option<JobStatus>,
    /// Restrict to jobs most recently hosted on this node.
    pub node: Option<String>,
    /// Restrict to a specific target device host.
    pub host: Option<String>,
}

/// `data` payload of `GET /job`.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    /// Matching jobs.
    pub jobs: Vec<Job>,
}

/// `data` payload of `DELETE /job`.
#[derive(Debug, Serialize)]
pub struct JobCancelResponse {
    /// Number of jobs actually removed from their queue.
    pub cancelled_count: usize,
    /// Ids of the jobs that were cancelled.
    pub cancelled_jobs: Vec<String>,
}

// ============================================================================
// GET /worker, DELETE /worker
// ============================================================================

/// Query parameters shared by `GET /worker` and `DELETE /worker`.
#[derive(Debug, Default, Deserialize)]
pub struct WorkerQuery {
    /// Direct lookup by worker name.
    pub name: Option<String>,
    /// Restrict to workers running on a given host machine.
    pub hostname: Option<String>,
    /// Restrict to workers servicing a given queue.
    pub queue: Option<String>,
    /// Restrict to pinned workers whose device host is currently bound
    /// to this node id in the `ClusterRegistry`.
    pub node: Option<String>,
    /// Restrict to pinned workers servicing this target device host
    /// (i.e. whose queue is `pinned:<host>`).
    pub host: Option<String>,
}

/// `data` payload of `GET /worker`.
#[derive(Debug, Serialize)]
pub struct WorkerListResponse {
    /// Matching workers.
    pub workers: Vec<crate::job::WorkerRecord>,
}

/// `data` payload of `DELETE /worker`: a suicide control message was
/// published to each matched worker; termination is asynchronous.
#[derive(Debug, Serialize)]
pub struct WorkerTerminateResponse {
    /// Number of workers signalled.
    pub signalled_count: usize,
    /// Names of the workers signalled.
    pub signalled_workers: Vec<String>,
}

// ============================================================================
// GET /health
// ============================================================================

/// `data` payload of `GET /health`.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the store is reachable; handlers return a
    /// `Core(Error::StoreUnavailable)` error otherwise, which never
    /// reaches this type.
    pub status: String,
}
