//! FifoWorker process: a parallel, stateless executor pulling jobs off the
//! shared `netpulse:queue:fifo` queue (`spec.md` §4.8).
//!
//! Unlike [`crate::pinned_worker::PinnedWorker`], a FifoWorker never reuses a
//! connection across jobs: each job is `connect` -> execute -> `disconnect`
//! (always, even on failure). A single `fifo-worker` process is a singleton
//! per host machine (enforced by [`crate::supervisor::NodeLock`]) but forks
//! several internal tasks to process jobs concurrently; the exact
//! concurrency mechanism is implementation freedom, so these are plain
//! tokio tasks sharing one `Arc<DriverRegistry>` and one store handle.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::driver::DriverRegistry;
use crate::error::{Error, ErrorKind, Result};
use crate::job::{Job, JobError, JobResult, JobStatus, Operation, WorkerRecord, WorkerStatus};
use crate::store::keys;
use crate::supervisor::NodeLock;
use crate::traits::SharedStore;

/// How long a single `list_pop_blocking` call waits before looping again to
/// re-check the stop signal.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// A `FifoWorker` instance: one per host machine, internally running
/// `concurrency` independent job-claiming tasks.
pub struct FifoWorker {
    hostname: String,
    pid: u32,
    concurrency: u32,
    store: Arc<dyn SharedStore>,
    drivers: Arc<DriverRegistry>,
    _lock: NodeLock,
}

impl FifoWorker {
    /// Acquires the singleton lock for this host under `lock_dir` and
    /// builds a worker ready to [`run`](Self::run).
    pub fn start(
        lock_dir: &Path,
        concurrency: u32,
        store: Arc<dyn SharedStore>,
        drivers: Arc<DriverRegistry>,
    ) -> Result<Self> {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let lock = NodeLock::acquire(lock_dir, &format!("fifo-{hostname}"))?;
        Ok(Self {
            hostname,
            pid: std::process::id(),
            concurrency: concurrency.max(1),
            store,
            drivers,
            _lock: lock,
        })
    }

    /// Forks `concurrency` internal tasks and runs until `SIGTERM`, then
    /// waits for every task to finish its current job and exit.
    #[instrument(skip(self), fields(hostname = %self.hostname, pid = self.pid))]
    pub async fn run(self) -> Result<()> {
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut tasks = Vec::with_capacity(self.concurrency as usize);
        for index in 0..self.concurrency {
            let task = FifoTask::new(
                index,
                self.hostname.clone(),
                self.pid,
                self.store.clone(),
                self.drivers.clone(),
            );
            tasks.push(tokio::spawn(task.run(stop_rx.clone())));
        }

        let mut sigterm = signal(SignalKind::terminate()).map_err(Error::Io)?;
        sigterm.recv().await;
        info!(concurrency = self.concurrency, "received SIGTERM; draining fifo worker tasks");
        let _ = stop_tx.send(true);

        for task in tasks {
            if let Err(err) = task.await {
                warn!(error = %err, "fifo worker task panicked");
            }
        }
        info!("fifo worker stopped");
        Ok(())
    }
}

/// One of a `FifoWorker`'s internal concurrent job-claiming loops. Each
/// registers and maintains its own [`WorkerRecord`], named
/// `fifo:<hostname>:<pid>:<index>`.
struct FifoTask {
    worker_name: String,
    hostname: String,
    pid: u32,
    store: Arc<dyn SharedStore>,
    drivers: Arc<DriverRegistry>,
}

impl FifoTask {
    fn new(index: u32, hostname: String, pid: u32, store: Arc<dyn SharedStore>, drivers: Arc<DriverRegistry>) -> Self {
        let worker_name = format!("fifo:{hostname}:{pid}:{index}");
        Self {
            worker_name,
            hostname,
            pid,
            store,
            drivers,
        }
    }

    #[instrument(skip(self, stop_rx), fields(worker = %self.worker_name))]
    async fn run(self, mut stop_rx: watch::Receiver<bool>) {
        if let Err(err) = self.register().await {
            warn!(error = %err, "failed to register fifo worker record");
            return;
        }
        info!("fifo worker task registered");

        loop {
            if *stop_rx.borrow() {
                break;
            }

            tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
                popped = self.store.list_pop_blocking(keys::QUEUE_FIFO, POLL_INTERVAL) => {
                    match popped {
                        Ok(Some(job_id)) => {
                            if let Err(err) = self.execute_job(&job_id).await {
                                warn!(job_id = %job_id, error = %err, "job execution failed unexpectedly");
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, "store error while polling fifo queue");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                    }
                }
            }
        }

        if let Err(err) = self.set_status(WorkerStatus::Dead).await {
            warn!(error = %err, "failed to mark fifo worker dead during shutdown");
        }
        info!("fifo worker task stopped");
    }

    async fn execute_job(&self, job_id: &str) -> Result<()> {
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
        if !job.mark_started(&self.worker_name, None) {
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

    /// Runs one job's full `connect` -> execute -> `disconnect` cycle.
    /// `disconnect` is always attempted, even when `connect` succeeded but
    /// the operation itself failed.
    async fn run_operation(&self, job: &Job) -> Result<serde_json::Value> {
        let driver = self.drivers.get(&job.request.driver)?;

        let run = async {
            let connection = driver.connect(&job.request.connection_args).await?;
            let outcome = match &job.request.operation {
                Operation::Query { commands } => driver
                    .send(connection.as_ref(), commands)
                    .await
                    .and_then(|outputs| Ok(serde_json::to_value(outputs)?)),
                Operation::Config { commands } => driver
                    .configure(connection.as_ref(), commands, &HashMap::new())
                    .await
                    .map(serde_json::Value::String),
                Operation::TestConnection => {
                    unreachable!("test_connection requests never produce a fifo job")
                }
            };
            if let Err(err) = driver.disconnect(connection.as_ref()).await {
                warn!(host = %job.host, error = %err, "error disconnecting fifo connection");
            }
            outcome
        };

        match tokio::time::timeout(Duration::from_secs(job.timeout_seconds), run).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                host: job.host.clone(),
                timeout_secs: job.timeout_seconds,
            }),
        }
    }

    async fn register(&self) -> Result<()> {
        let record = WorkerRecord::new(
            &self.worker_name,
            self.pid,
            &self.hostname,
            vec![keys::QUEUE_FIFO.to_string()],
        );
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
    use crate::driver::NullDriver;
    use crate::job::{Job, Operation, Request, RequestOptions};
    use crate::store::memory::InMemoryStore;
    use crate::traits::ConnectionArgs;

    fn drivers() -> Arc<DriverRegistry> {
        let mut registry = DriverRegistry::with_builtins();
        registry.register(crate::driver::NULL, Arc::new(NullDriver::fifo()));
        Arc::new(registry)
    }

    fn task(store: Arc<InMemoryStore>) -> FifoTask {
        FifoTask::new(0, "node-a".to_string(), 1234, store, drivers())
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
            keys::QUEUE_FIFO.to_string(),
            300,
            60,
            3600,
        )
    }

    #[tokio::test]
    async fn register_publishes_idle_worker_record() {
        let store = Arc::new(InMemoryStore::new());
        let task = task(store.clone());
        task.register().await.unwrap();
        let record = task.load_worker().await.unwrap().unwrap();
        assert_eq!(record.status, WorkerStatus::Idle);
        assert_eq!(record.name, "fifo:node-a:1234:0");
    }

    #[tokio::test]
    async fn execute_job_runs_query_and_marks_finished() {
        let store = Arc::new(InMemoryStore::new());
        let task = task(store.clone());
        task.register().await.unwrap();
        let job = sample_job("job-1");
        store
            .set(&keys::job("job-1"), &serde_json::to_string(&job).unwrap())
            .await
            .unwrap();

        task.execute_job("job-1").await.unwrap();

        let raw = store.get(&keys::job("job-1")).await.unwrap().unwrap();
        let finished: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(finished.status, JobStatus::Finished);
        assert!(matches!(finished.result, Some(JobResult::Success { .. })));
        assert!(finished.node_id.is_none());

        let record = task.load_worker().await.unwrap().unwrap();
        assert_eq!(record.successful_job_count, 1);
        assert_eq!(record.status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn expired_job_fails_without_executing() {
        let store = Arc::new(InMemoryStore::new());
        let task = task(store.clone());
        task.register().await.unwrap();
        let mut job = sample_job("job-2");
        job.ttl_seconds = 0;
        job.enqueued_at = 0;
        store
            .set(&keys::job("job-2"), &serde_json::to_string(&job).unwrap())
            .await
            .unwrap();

        task.execute_job("job-2").await.unwrap();

        let raw = store.get(&keys::job("job-2")).await.unwrap().unwrap();
        let finished: Job = serde_json::from_str(&raw).unwrap();
        assert_eq!(finished.status, JobStatus::Failed);
        match finished.result {
            Some(JobResult::Failure { error }) => assert_eq!(error.kind, ErrorKind::JobTTLExpired),
            other => panic!("expected failure result, got {other:?}"),
        }
    }

    #[test]
    fn second_fifo_lock_on_same_hostname_fails() {
        use tempfile::tempdir;
        let dir = tempdir().unwrap();
        let first = NodeLock::acquire(dir.path(), "fifo-node-a").unwrap();
        let second = NodeLock::acquire(dir.path(), "fifo-node-a");
        assert!(second.is_err());
        drop(first);
    }
}
