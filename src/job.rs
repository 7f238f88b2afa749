//! Core data model: [`Request`], [`Job`], [`WorkerRecord`], and
//! [`WebhookSpec`] — the entities that flow between the REST API, the
//! Dispatcher, the shared store, and the workers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::ErrorKind;
use crate::traits::ConnectionArgs;

/// Queue strategy a request resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStrategy {
    /// One long-lived worker process owns the connection for a host.
    Pinned,
    /// Stateless workers pull from a shared FIFO queue.
    Fifo,
}

/// The operation a [`Request`] asks a driver to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Read-only query commands.
    Query {
        /// Commands to run, in order.
        commands: Vec<String>,
    },
    /// Configuration lines to apply.
    Config {
        /// Configuration lines, in order.
        commands: Vec<String>,
    },
    /// A synchronous connect probe; never produces a Job.
    TestConnection,
}

/// Per-request options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Explicit queue strategy override; if absent the driver's
    /// `supports_persistent_session` metadata decides.
    #[serde(default)]
    pub queue_strategy: Option<QueueStrategy>,
    /// Job TTL in seconds, overriding the configured default.
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Webhook to invoke on terminal transitions.
    #[serde(default)]
    pub webhook: Option<WebhookSpec>,
}

/// Input unit to the Dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Selects a `DriverRegistry` entry.
    pub driver: String,
    /// Connection parameters; `host` is required, the rest opaque.
    pub connection_args: ConnectionArgs,
    /// The operation to perform.
    pub operation: Operation,
    /// Per-request options.
    #[serde(default)]
    pub options: RequestOptions,
    /// Resolved before dispatch; never persisted in core state.
    #[serde(default)]
    pub credential_ref: Option<String>,
}

impl Request {
    /// Validates the invariants `spec.md` §3.1 requires before this
    /// request may be dispatched.
    pub fn validate(&self) -> crate::error::Result<()> {
        if matches!(self.operation, Operation::TestConnection) {
            return Ok(());
        }
        if self.connection_args.host.trim().is_empty() {
            return Err(crate::error::Error::validation(
                "connection_args.host must be non-empty",
            ));
        }
        if self.driver.trim().is_empty() {
            return Err(crate::error::Error::validation("driver must be non-empty"));
        }
        Ok(())
    }
}

/// Job status. Allowed transitions are exactly `queued -> {started,
/// cancelled, failed}` and `started -> {finished, failed}`; see invariant
/// 5 (status monotonicity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Enqueued, not yet claimed by a worker.
    Queued,
    /// Claimed by a worker, executing.
    Started,
    /// Completed successfully.
    Finished,
    /// Completed with an error.
    Failed,
    /// Removed from its queue before being claimed.
    Cancelled,
}

impl JobStatus {
    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Started)
                | (JobStatus::Queued, JobStatus::Cancelled)
                | (JobStatus::Queued, JobStatus::Failed)
                | (JobStatus::Started, JobStatus::Finished)
                | (JobStatus::Started, JobStatus::Failed)
        )
    }

    /// Terminal statuses persist for `result_ttl_seconds` before GC.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Standardized job-result error shape, used both internally and in the
/// `data` field of non-2xx API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    /// Wire-visible error taxonomy member.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl From<&crate::error::Error> for JobError {
    fn from(err: &crate::error::Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Outcome of a finished or failed job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum JobResult {
    /// Successful completion.
    Success {
        /// Driver's return value (command outputs or config response).
        retval: serde_json::Value,
    },
    /// Failed completion.
    Failure {
        /// The error that terminated the job.
        error: JobError,
    },
}

/// A scheduled unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique, stable across retries of status queries.
    pub id: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Either the FIFO queue name or `pinned:<host>`.
    pub queue_name: String,
    /// The node currently (or most recently) hosting this job's worker.
    #[serde(default)]
    pub node_id: Option<String>,
    /// Target device host.
    pub host: String,
    /// The request that produced this job.
    pub request: Request,
    /// Unix timestamp (seconds) this job was enqueued.
    pub enqueued_at: u64,
    /// Unix timestamp this job was claimed by a worker.
    #[serde(default)]
    pub started_at: Option<u64>,
    /// Unix timestamp this job reached a terminal status.
    #[serde(default)]
    pub ended_at: Option<u64>,
    /// Id of the worker that claimed this job.
    #[serde(default)]
    pub worker: Option<String>,
    /// Result, present only in terminal states.
    #[serde(default)]
    pub result: Option<JobResult>,
    /// Job TTL: how long it may sit `queued` before expiring.
    pub ttl_seconds: u64,
    /// Execution deadline once claimed.
    pub timeout_seconds: u64,
    /// How long a terminal result stays retrievable.
    pub result_ttl_seconds: u64,
}

impl Job {
    /// Builds a new `queued` job for `request` targeting `host`, bound
    /// to `queue_name`, stamped with the current time.
    pub fn new(
        id: String,
        request: Request,
        host: String,
        queue_name: String,
        ttl_seconds: u64,
        timeout_seconds: u64,
        result_ttl_seconds: u64,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Queued,
            queue_name,
            node_id: None,
            host,
            request,
            enqueued_at: now_unix(),
            started_at: None,
            ended_at: None,
            worker: None,
            result: None,
            ttl_seconds,
            timeout_seconds,
            result_ttl_seconds,
        }
    }

    /// Whether this job has been queued longer than its TTL allows.
    pub fn is_ttl_expired(&self) -> bool {
        self.status == JobStatus::Queued && now_unix().saturating_sub(self.enqueued_at) > self.ttl_seconds
    }

    /// Attempts the `queued -> started` transition, stamping `worker`
    /// and `started_at`. Returns `false` if the transition is illegal.
    pub fn mark_started(&mut self, worker: impl Into<String>, node_id: Option<String>) -> bool {
        if !self.status.can_transition_to(JobStatus::Started) {
            return false;
        }
        self.status = JobStatus::Started;
        self.worker = Some(worker.into());
        self.node_id = node_id;
        self.started_at = Some(now_unix());
        true
    }

    /// Attempts a terminal transition (`finished`, `failed`, or
    /// `cancelled`), stamping `ended_at` and the result. Returns `false`
    /// if the transition is illegal.
    pub fn mark_terminal(&mut self, status: JobStatus, result: Option<JobResult>) -> bool {
        if !status.is_terminal() || !self.status.can_transition_to(status) {
            return false;
        }
        self.status = status;
        self.result = result;
        self.ended_at = Some(now_unix());
        true
    }
}

/// Worker health/liveness status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Actively executing a job.
    Busy,
    /// Idle, waiting for the next job.
    Idle,
    /// Drain requested; no longer accepting new jobs.
    Suspended,
    /// Process exited.
    Dead,
}

/// Per-worker metadata published to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRecord {
    /// Unique worker name, e.g. `pinned:<host>:<pid>`.
    pub name: String,
    /// OS process id.
    pub pid: u32,
    /// Hostname the worker process runs on.
    pub hostname: String,
    /// Queue name(s) this worker services.
    pub queues: Vec<String>,
    /// Current status.
    pub status: WorkerStatus,
    /// Unix timestamp the worker registered.
    pub birth_at: u64,
    /// Unix timestamp of the last heartbeat.
    pub last_heartbeat: u64,
    /// Count of jobs that finished successfully.
    pub successful_job_count: u64,
    /// Count of jobs that finished with a failure.
    pub failed_job_count: u64,
}

impl WorkerRecord {
    /// Builds a freshly-registered, idle `WorkerRecord`.
    pub fn new(name: impl Into<String>, pid: u32, hostname: impl Into<String>, queues: Vec<String>) -> Self {
        let now = now_unix();
        Self {
            name: name.into(),
            pid,
            hostname: hostname.into(),
            queues,
            status: WorkerStatus::Idle,
            birth_at: now,
            last_heartbeat: now,
            successful_job_count: 0,
            failed_job_count: 0,
        }
    }
}

/// Webhook configuration, copied verbatim into a job and invoked on
/// terminal transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSpec {
    /// Human-readable name.
    pub name: String,
    /// Target URL.
    pub url: String,
    /// HTTP method, e.g. `"POST"`.
    pub method: String,
    /// Extra headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Extra cookies.
    #[serde(default)]
    pub cookies: HashMap<String, String>,
    /// Optional HTTP basic auth.
    #[serde(default)]
    pub basic_auth: Option<(String, String)>,
    /// Timeout in seconds, clamped to `[0.5, 120]`.
    pub timeout_seconds: f64,
}

impl WebhookSpec {
    /// Clamped timeout as a `Duration`.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.timeout_seconds.clamp(0.5, 120.0))
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

    fn sample_request() -> Request {
        Request {
            driver: "netmiko_ssh".to_string(),
            connection_args: ConnectionArgs {
                host: "r1.example.net".to_string(),
                extra: HashMap::new(),
            },
            operation: Operation::Query {
                commands: vec!["show version".to_string()],
            },
            options: RequestOptions::default(),
            credential_ref: None,
        }
    }

    #[test]
    fn status_monotonicity_matches_invariant_five() {
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Started));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Cancelled));
        assert!(JobStatus::Started.can_transition_to(JobStatus::Finished));
        assert!(!JobStatus::Started.can_transition_to(JobStatus::Queued));
        assert!(!JobStatus::Finished.can_transition_to(JobStatus::Started));
        assert!(!JobStatus::Started.can_transition_to(JobStatus::Cancelled));
    }

    #[test]
    fn mark_started_then_finished() {
        let mut job = Job::new(
            "j1".into(),
            sample_request(),
            "r1.example.net".into(),
            "pinned:r1.example.net".into(),
            300,
            60,
            3600,
        );
        assert!(job.mark_started("pinned:r1:1", Some("node-a".into())));
        assert_eq!(job.status, JobStatus::Started);
        assert!(job.mark_terminal(
            JobStatus::Finished,
            Some(JobResult::Success {
                retval: serde_json::json!({"show version": "IOS 15.2"})
            })
        ));
        assert_eq!(job.status, JobStatus::Finished);
        assert!(job.ended_at.is_some());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut job = Job::new(
            "j2".into(),
            sample_request(),
            "r1.example.net".into(),
            "pinned:r1.example.net".into(),
            300,
            60,
            3600,
        );
        assert!(job.mark_started("w1", None));
        assert!(!job.mark_terminal(JobStatus::Cancelled, None));
        assert_eq!(job.status, JobStatus::Started);
    }

    #[test]
    fn request_validation_rejects_empty_host() {
        let mut req = sample_request();
        req.connection_args.host = "".to_string();
        assert!(req.validate().is_err());
    }

    #[test]
    fn connection_args_fingerprint_is_stable() {
        let mut a = ConnectionArgs {
            host: "r1".into(),
            extra: HashMap::new(),
        };
        a.extra.insert("username".into(), serde_json::json!("admin"));
        let mut b = a.clone();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.extra.insert("username".into(), serde_json::json!("other"));
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
