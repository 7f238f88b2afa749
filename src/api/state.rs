//! Shared application state for the REST API (`spec.md` §6.1).
//!
//! Every handler reaches the Dispatcher, ClusterRegistry, and SharedStore
//! through this one `Clone`-able struct, threaded in via axum's
//! `State` extractor.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;
use uuid::Uuid;

use crate::cluster::ClusterRegistry;
use crate::config::Config;
use crate::control::{self, ControlMessage};
use crate::dispatcher::Dispatcher;
use crate::driver::DriverRegistry;
use crate::error::Result;
use crate::job::{Job, JobStatus, WorkerRecord};
use crate::store::keys;
use crate::traits::{Scheduler, SharedStore};

use super::types::{JobQuery, WorkerQuery};

/// How long `terminate_workers` waits for a `KillPinned` reply before
/// moving on to the next matched worker. Termination itself is
/// asynchronous (`spec.md` §6.1), this only bounds how long the request
/// handler blocks trying to confirm delivery.
const KILL_REPLY_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared, cheaply-cloned handle every API handler operates against.
#[derive(Clone)]
pub struct AppState {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) cluster: ClusterRegistry,
    pub(crate) store: Arc<dyn SharedStore>,
    pub(crate) drivers: Arc<DriverRegistry>,
    pub(crate) config: Arc<Config>,
    start_time: Instant,
}

impl AppState {
    /// Builds the dispatcher internally from `store`/`cluster`/`scheduler`/
    /// `drivers` plus the configured job default lifetimes and spawn
    /// policy, matching the wiring `main.rs` performs at boot.
    pub fn new(
        store: Arc<dyn SharedStore>,
        cluster: ClusterRegistry,
        scheduler: Arc<dyn Scheduler>,
        drivers: Arc<DriverRegistry>,
        config: Arc<Config>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            store.clone(),
            cluster.clone(),
            scheduler,
            drivers.clone(),
            config.job.ttl.as_secs(),
            config.job.timeout.as_secs(),
            config.job.result_ttl.as_secs(),
        )
        .with_spawn_policy(config.worker.spawn_timeout, config.worker.spawn_retries);

        Self {
            dispatcher,
            cluster,
            store,
            drivers,
            config,
            start_time: Instant::now(),
        }
    }

    /// Seconds since the API server started, for `GET /health`.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Looks up a single job by id.
    pub async fn find_job(&self, id: &str) -> Result<Option<Job>> {
        match self.store.get(&keys::job(id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Resolves `GET /job`'s query: a direct `id` lookup takes precedence
    /// since it can find a job in any status; otherwise every known job
    /// record is scanned and filtered by `queue`/`status`/`node`/`host`.
    pub async fn list_jobs(&self, query: &JobQuery) -> Result<Vec<Job>> {
        if let Some(id) = &query.id {
            return Ok(self.find_job(id).await?.into_iter().collect());
        }

        let mut jobs = self.all_jobs().await?;
        if let Some(queue) = &query.queue {
            jobs.retain(|j| &j.queue_name == queue);
        }
        if let Some(status) = &query.status {
            jobs.retain(|j| j.status == *status);
        }
        if let Some(node) = &query.node {
            jobs.retain(|j| j.node_id.as_deref() == Some(node.as_str()));
        }
        if let Some(host) = &query.host {
            jobs.retain(|j| &j.host == host);
        }
        Ok(jobs)
    }

    /// Cancels every job matched by `query` that is still `queued`,
    /// removing it from its queue before a worker can claim it. Jobs
    /// already `started` or terminal are left untouched (invariant 5
    /// forbids cancelling them).
    pub async fn cancel_jobs(&self, query: &JobQuery) -> Result<(usize, Vec<String>)> {
        let candidates = self.list_jobs(query).await?;
        let mut cancelled = Vec::new();

        for mut job in candidates {
            if job.status != JobStatus::Queued {
                continue;
            }
            let removed = self.store.list_remove_by_value(&job.queue_name, &job.id).await?;
            if removed == 0 {
                continue;
            }
            job.mark_terminal(JobStatus::Cancelled, None);
            let serialized = serde_json::to_string(&job)?;
            self.store.set(&keys::job(&job.id), &serialized).await?;
            cancelled.push(job.id);
        }
        Ok((cancelled.len(), cancelled))
    }

    /// Resolves `GET /worker`'s query the same way as `list_jobs`: a
    /// direct `name` lookup, or a full scan filtered by `hostname`/
    /// `queue`/`host`/`node`.
    pub async fn list_workers(&self, query: &WorkerQuery) -> Result<Vec<WorkerRecord>> {
        if let Some(name) = &query.name {
            let record = match self.store.get(&keys::worker(name)).await? {
                Some(raw) => Some(serde_json::from_str(&raw)?),
                None => None,
            };
            return Ok(record.into_iter().collect());
        }

        let mut workers = self.all_workers().await?;
        if let Some(hostname) = &query.hostname {
            workers.retain(|w| &w.hostname == hostname);
        }
        if let Some(queue) = &query.queue {
            workers.retain(|w| w.queues.iter().any(|q| q == queue));
        }
        if let Some(host) = &query.host {
            let pinned_queue = keys::queue_pinned(host);
            workers.retain(|w| w.queues.iter().any(|q| q == &pinned_queue));
        }
        if let Some(node) = &query.node {
            let mut matched = Vec::new();
            for worker in workers {
                if let Some(host) = pinned_host(&worker) {
                    if self.cluster.get_binding(host).await?.as_deref() == Some(node.as_str()) {
                        matched.push(worker);
                    }
                }
            }
            workers = matched;
        }
        Ok(workers)
    }

    /// Signals every matched pinned worker's owning node to terminate it.
    /// Only pinned workers can be remotely terminated this way: a
    /// `FifoWorker` has no control channel of its own and is stopped only
    /// by signalling its own process directly, so fifo matches are
    /// silently excluded from the signalled count rather than erroring.
    pub async fn terminate_workers(&self, query: &WorkerQuery) -> Result<(usize, Vec<String>)> {
        let workers = self.list_workers(query).await?;
        let mut signalled = Vec::new();

        for worker in workers {
            let Some(host) = pinned_host(&worker) else {
                continue;
            };
            let Some(node_id) = self.cluster.get_binding(host).await? else {
                continue;
            };
            let request_id = Uuid::new_v4().to_string();
            let message = ControlMessage::KillPinned {
                request_id: request_id.clone(),
                host: host.to_string(),
            };
            if let Err(err) = control::send(self.store.as_ref(), &node_id, &message).await {
                warn!(worker = %worker.name, error = %err, "failed to publish kill request");
                continue;
            }
            let _ = control::await_reply(self.store.as_ref(), &request_id, KILL_REPLY_TIMEOUT).await;
            signalled.push(worker.name);
        }
        Ok((signalled.len(), signalled))
    }

    async fn all_jobs(&self) -> Result<Vec<Job>> {
        let keys = self.store.scan_keys("netpulse:jobs:").await?;
        let mut jobs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                jobs.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(jobs)
    }

    async fn all_workers(&self) -> Result<Vec<WorkerRecord>> {
        let keys = self.store.scan_keys("netpulse:workers:").await?;
        let mut workers = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.store.get(&key).await? {
                workers.push(serde_json::from_str(&raw)?);
            }
        }
        Ok(workers)
    }
}

/// Extracts the device host a `WorkerRecord` is pinned to, if any, from
/// its `netpulse:queue:pinned:<host>` queue entry.
fn pinned_host(worker: &WorkerRecord) -> Option<&str> {
    worker
        .queues
        .iter()
        .find_map(|q| q.strip_prefix("netpulse:queue:pinned:"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Operation, Request, RequestOptions};
    use crate::scheduler::Greedy;
    use crate::store::memory::InMemoryStore;
    use crate::traits::ConnectionArgs;
    use std::collections::HashMap;

    fn state() -> AppState {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        AppState::new(
            store,
            cluster,
            Arc::new(Greedy),
            Arc::new(DriverRegistry::with_builtins()),
            Arc::new(Config::default()),
        )
    }

    fn sample_request(host: &str) -> Request {
        Request {
            driver: crate::driver::NULL.to_string(),
            connection_args: ConnectionArgs {
                host: host.to_string(),
                extra: HashMap::new(),
            },
            operation: Operation::Query {
                commands: vec!["show version".to_string()],
            },
            options: RequestOptions {
                queue_strategy: Some(crate::job::QueueStrategy::Fifo),
                ttl: None,
                webhook: None,
            },
            credential_ref: None,
        }
    }

    #[tokio::test]
    async fn list_jobs_filters_by_host() {
        let state = state();
        state.dispatcher.submit(sample_request("r1")).await.unwrap();
        state.dispatcher.submit(sample_request("r2")).await.unwrap();

        let all = state.list_jobs(&JobQuery::default()).await.unwrap();
        assert_eq!(all.len(), 2);

        let filtered = state
            .list_jobs(&JobQuery {
                host: Some("r1".to_string()),
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].host, "r1");
    }

    #[tokio::test]
    async fn cancel_jobs_removes_only_queued_jobs() {
        let state = state();
        let job = state.dispatcher.submit(sample_request("r1")).await.unwrap();

        let (count, ids) = state
            .cancel_jobs(&JobQuery {
                id: Some(job.id.clone()),
                ..JobQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(ids, vec![job.id.clone()]);

        let reloaded = state.find_job(&job.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, JobStatus::Cancelled);
        assert_eq!(state.store.list_len(crate::store::keys::QUEUE_FIFO).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn list_workers_filters_by_hostname() {
        let state = state();
        let record = WorkerRecord::new(
            "fifo:host-a:1:0",
            1,
            "host-a",
            vec![crate::store::keys::QUEUE_FIFO.to_string()],
        );
        let serialized = serde_json::to_string(&record).unwrap();
        state
            .store
            .set(&crate::store::keys::worker("fifo:host-a:1:0"), &serialized)
            .await
            .unwrap();

        let found = state
            .list_workers(&WorkerQuery {
                hostname: Some("host-a".to_string()),
                ..WorkerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].status, crate::job::WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn terminate_workers_skips_unbound_pinned_host() {
        let state = state();
        let record = WorkerRecord::new(
            "pinned:r1:123",
            123,
            "host-a",
            vec![crate::store::keys::queue_pinned("r1")],
        );
        let serialized = serde_json::to_string(&record).unwrap();
        state
            .store
            .set(&crate::store::keys::worker("pinned:r1:123"), &serialized)
            .await
            .unwrap();

        let (count, signalled) = state
            .terminate_workers(&WorkerQuery {
                name: Some("pinned:r1:123".to_string()),
                ..WorkerQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(signalled.is_empty());
    }
}
