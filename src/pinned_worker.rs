//! PinnedWorker process: a single-threaded job loop owning one long-lived
//! device connection per host (`spec.md` §4.7).
//!
//! Forked by a `NodeSupervisor` with `--host`, `--queue`, `--node-id`, and
//! `--request-id` arguments (see `src/supervisor.rs::spawn_pinned_worker`).
//! Serial execution per host is invariant: jobs popped from the pinned
//! queue run strictly in pop order because this process never runs two
//! jobs concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, instrument, warn};

use crate::cluster::ClusterRegistry;
use crate::driver::DriverRegistry;
use crate::error::{Error, ErrorKind, Result};
use crate::job::{Job, JobError, JobResult, JobStatus, Operation, WorkerRecord, WorkerStatus};
use crate::session::PinnedSession;
use crate::store::keys;
use crate::traits::{ConnectionArgs, SharedStore};

/// How long a single `list_pop_blocking` call waits before looping again
/// to re-check signals. Bounds worst-case shutdown/suicide detection
/// latency while idle.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// The job loop for a single pinned host. Owns at most one
/// [`PinnedSession`] at a time, replacing it when a job's connection
/// arguments no longer match.
pub struct PinnedWorker {
    host: String,
    queue_name: String,
    node_id: String,
    worker_name: String,
    hostname: String,
    pid: u32,
    store: Arc<dyn SharedStore>,
    cluster: ClusterRegistry,
    drivers: Arc<DriverRegistry>,
    session: Option<PinnedSession>,
}

impl PinnedWorker {
    /// Builds a worker for `host`, pulling jobs from `queue_name` and
    /// reporting itself as owned by `node_id`.
    pub fn new(
        host: String,
        queue_name: String,
        node_id: String,
        store: Arc<dyn SharedStore>,
        cluster: ClusterRegistry,
        drivers: Arc<DriverRegistry>,
    ) -> Self {
        let pid = std::process::id();
        let worker_name = format!("pinned:{host}:{pid}");
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            host,
            queue_name,
            node_id,
            worker_name,
            hostname,
            pid,
            store,
            cluster,
            drivers,
            session: None,
        }
    }

    /// Runs the job loop to completion: registers, pops and executes
    /// jobs until a session suicide signal or `SIGTERM` is observed, then
    /// tears down cleanly.
    #[instrument(skip(self), fields(host = %self.host, worker = %self.worker_name))]
    pub async fn run(mut self) -> Result<()> {
        self.register().await?;
        info!("pinned worker registered");

        let mut sigterm = signal(SignalKind::terminate()).map_err(Error::Io)?;
        let mut draining = false;

        loop {
            if draining {
                info!("pinned worker draining; refusing further pops");
                break;
            }

            tokio::select! {
                biased;
                _ = sigterm.recv() => {
                    info!("received SIGTERM; entering drain phase");
                    draining = true;
                    continue;
                }
                popped = self.store.list_pop_blocking(&self.queue_name, POLL_INTERVAL) => {
                    match popped {
                        Ok(Some(job_id)) => {
                            if let Err(err) = self.execute_job(&job_id).await {
                                warn!(job_id = %job_id, error = %err, "job execution failed unexpectedly");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, "store error while polling pinned queue");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }

            if self.session.as_ref().is_some_and(|s| s.is_terminated()) {
                warn!("session monitor signalled suicide; stopping loop");
                break;
            }
        }

        self.shutdown().await
    }

    async fn execute_job(&mut self, job_id: &str) -> Result<()> {
        let Some(raw) = self.store.get(&keys::job(job_id)).await? else {
            warn!(job_id, "claimed job id has no matching job record; skipping");
            return Ok(());
        };
        let mut job: Job = serde_json::from_str(&raw)?;

        if job.is_ttl_expired() {
            job.mark_terminal(
                JobStatus::Failed,
                Some(JobResult::Failure {
                    error: JobError {
                        kind: ErrorKind::JobTTLExpired,
                        message: format!("job expired after {}s in queue", job.ttl_seconds),
                    },
                }),
            );
            self.persist_job(&job).await?;
            return Ok(());
        }

        self.set_status(WorkerStatus::Busy).await?;
        if !job.mark_started(&self.worker_name, Some(self.node_id.clone())) {
            warn!(job_id = %job.id, status = ?job.status, "job in unexpected state at claim time; skipping");
            self.set_status(WorkerStatus::Idle).await?;
            return Ok(());
        }
        self.persist_job(&job).await?;

        let outcome = self.run_operation(&job).await;
        let (status, succeeded, result) = match outcome {
            Ok(retval) => (JobStatus::Finished, true, JobResult::Success { retval }),
            Err(err) => (JobStatus::Failed, false, JobResult::Failure { error: JobError::from(&err) }),
        };
        job.mark_terminal(status, Some(result.clone()));
        self.persist_job(&job).await?;
        self.bump_counters(succeeded).await?;
        self.set_status(WorkerStatus::Idle).await?;

        if let Some(webhook) = job.request.options.webhook.clone() {
            let job_id = job.id.clone();
            tokio::spawn(async move {
                crate::webhook::deliver(&webhook, &job_id, &result).await;
            });
        }
        Ok(())
    }

    async fn run_operation(&mut self, job: &Job) -> Result<serde_json::Value> {
        let driver = self.drivers.get(&job.request.driver)?;
        self.ensure_session(driver, &job.request.connection_args).await?;
        let session = self.session.as_ref().expect("session established above");

        let run = async {
            match &job.request.operation {
                Operation::Query { commands } => {
                    let outputs = session.send(commands).await?;
                    Ok(serde_json::to_value(outputs)?)
                }
                Operation::Config { commands } => {
                    let output = session.configure(commands, &HashMap::new()).await?;
                    Ok(serde_json::Value::String(output))
                }
                Operation::TestConnection => {
                    unreachable!("test_connection requests never produce a pinned job")
                }
            }
        };

        match tokio::time::timeout(Duration::from_secs(job.timeout_seconds), run).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                host: job.host.clone(),
                timeout_secs: job.timeout_seconds,
            }),
        }
    }

    /// Opens a fresh session if none exists, the current one already
    /// signalled suicide, or `conn_args`' fingerprint no longer matches
    /// (`spec.md` §4.5 session replacement rule).
    async fn ensure_session(&mut self, driver: Arc<dyn crate::traits::Driver>, conn_args: &ConnectionArgs) -> Result<()> {
        let needs_new = match &self.session {
            Some(session) => session.is_terminated() || session.needs_replacement_for(conn_args),
            None => true,
        };
        if !needs_new {
            return Ok(());
        }
        if let Some(old) = self.session.take() {
            if let Err(err) = old.close().await {
                warn!(error = %err, "error closing replaced pinned session");
            }
        }
        self.session = Some(PinnedSession::open(driver, conn_args.clone()).await?);
        Ok(())
    }

    async fn register(&self) -> Result<()> {
        let record = WorkerRecord::new(&self.worker_name, self.pid, &self.hostname, vec![self.queue_name.clone()]);
        self.persist_worker(&record).await
    }

    async fn set_status(&self, status: WorkerStatus) -> Result<()> {
        let Some(mut record) = self.load_worker().await? else {
            return Ok(());
        };
        record.status = status;
        record.last_heartbeat = unix_now();
        self.persist_worker(&record).await
    }

    async fn bump_counters(&self, succeeded: bool) -> Result<()> {
        let Some(mut record) = self.load_worker().await? else {
            return Ok(());
        };
        if succeeded {
            record.successful_job_count += 1;
        } else {
            record.failed_job_count += 1;
        }
        self.persist_worker(&record).await
    }

    async fn load_worker(&self) -> Result<Option<WorkerRecord>> {
        match self.store.get(&keys::worker(&self.worker_name)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn persist_worker(&self, record: &WorkerRecord) -> Result<()> {
        let serialized = serde_json::to_string(record)?;
        self.store.set(&keys::worker(&self.worker_name), &serialized).await
    }

    async fn persist_job(&self, job: &Job) -> Result<()> {
        let serialized = serde_json::to_string(job)?;
        self.store.set(&keys::job(&job.id), &serialized).await
    }

    /// Closes any open session, releases the host binding, and marks
    /// this worker `dead` (`spec.md` §4.7 steps 5-6).
    async fn shutdown(mut self) -> Result<()> {
        if let Some(session) = self.session.take() {
            if let Err(err) = session.close().await {
                warn!(error = %err, "error closing pinned session during shutdown");
            }
        }
        if let Err(err) = self.cluster.unbind(&self.host, &self.node_id).await {
            warn!(error = %err, "failed to unbind host during shutdown");
        }
        self.set_status(WorkerStatus::Dead).await?;
        info!("pinned worker shut down");
        Ok(())
    }
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverRegistry, NullDriver};
    use crate::job::{Job, Operation, Request, RequestOptions};
    use crate::store::memory::InMemoryStore;
    use crate::traits::ConnectionArgs;

    fn drivers() -> Arc<DriverRegistry> {
        let mut registry = DriverRegistry::with_builtins();
        registry.register(crate::driver::NULL, Arc::new(NullDriver::pinned()));
        Arc::new(registry)
    }

    fn worker(store: Arc<InMemoryStore>) -> PinnedWorker {
        let cluster = ClusterRegistry::new(store.clone(), 30);
        PinnedWorker::new(
            "r1".to_string(),
            keys::queue_pinned("r1"),
            "node-a".to_string(),
            store,
            cluster,
            drivers(),
        )
    }

    fn sample_job(id: &str) -> Job {
        Job::new(
            id.to_string(),
            Request {
                driver: crate::driver::NULL.to_string(),
                connection_args: ConnectionArgs {
                    host: "r1".to_string(),
                    extra: HashMap::new(),
                },
                operation: Operation::Query {
                    commands: vec!["show version".to_string()],
                },
                options: RequestOptions::default(),
                credential_ref: None,
            },
            "r1".to_string(),
            keys::queue_pinned("r1"),
            300,
            60,
            3600,
        )
    }

    #[tokio::test]
    async fn register_publishes_idle_worker_record() {
        let store = Arc::new(InMemoryStore::new());
        let worker = worker(store.clone());
        worker.register().await.unwrap();
        let record = worker.load_worker().await.unwrap().unwrap();
        assert_eq!(record.status, WorkerStatus::Idle);
        assert_eq!(record.queues, vec![keys::queue_pinned("r1")]);
    }

    #[tokio::test]
    async fn execute_job_runs_query_and_marks_finished() {
        let store = Arc::new(InMemoryStore::new());
        let mut worker = worker(store.clone());
        worker.register().await.unwrap();
        let job = sample_job("job-1");
        store
            .set(&keys::job("job-1"), &serde_json::to_string(&job).unwrap())
            .await
            .unwrap();

        worker.execute_job("job-1").await.unwrap();

        let raw = store.get(&keys::job("job-1")).await.unwrap().unwrap();
        let finished: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(finished.status, JobStatus::Finished);
        assert!(matches!(finished.result, Some(JobResult::Success { .. })));

        let record = worker.load_worker().await.unwrap().unwrap();
        assert_eq!(record.successful_job_count, 1);
        assert_eq!(record.status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn expired_job_fails_without_executing() {
        let store = Arc::new(InMemoryStore::new());
        let mut worker = worker(store.clone());
        worker.register().await.unwrap();
        let mut job = sample_job("job-2");
        job.ttl_seconds = 0;
        job.enqueued_at = 0;
        store
            .set(&keys::job("job-2"), &serde_json::to_string(&job).unwrap())
            .await
            .unwrap();

        worker.execute_job("job-2").await.unwrap();

        let raw = store.get(&keys::job("job-2")).await.unwrap().unwrap();
        let finished: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        match finished.result {
            Some(JobResult::Failure { error }) => assert_eq!(error.kind, ErrorKind::JobTTLExpired),
            other => panic!("expected failure result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn shutdown_unbinds_host_and_marks_dead() {
        let store = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        cluster.bind("r1", "node-a").await.unwrap();
        let worker = worker(store.clone());
        worker.register().await.unwrap();

        worker.shutdown().await.unwrap();

        assert!(cluster.get_binding("r1").await.unwrap().is_none());
    }
}
