//! Dispatcher: stateless request-handling entry point tying together the
//! `ClusterRegistry`, `Scheduler`, `DriverRegistry`, and control-plane
//! pub/sub protocol (`spec.md` §4.9).
//!
//! Multiple dispatchers may run concurrently — `ClusterRegistry::bind`'s
//! compare-and-swap is the only serialization point.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cluster::ClusterRegistry;
use crate::control::{self, ControlMessage, ControlReply};
use crate::driver::DriverRegistry;
use crate::error::{Error, Result};
use crate::job::{Job, Operation, QueueStrategy, Request};
use crate::store::keys;
use crate::traits::{Scheduler, SharedStore};

/// Default spawn-reply wait, overridable via `WorkerConfig::spawn_timeout`.
const DEFAULT_SPAWN_TIMEOUT: Duration = Duration::from_secs(10);
/// Default number of bind/spawn retries before surfacing `WorkerUnavailable`.
const DEFAULT_SPAWN_RETRIES: u32 = 3;

/// Outcome of a bulk submission: per-host success or failure.
#[derive(Debug)]
pub struct BulkOutcome {
    /// Jobs successfully enqueued, one per reachable host.
    pub succeeded: Vec<Job>,
    /// Hosts that could not be scheduled, with the error that stopped them.
    pub failed: Vec<(String, Error)>,
}

/// Stateless request-handling facade. Holds only shared, cheaply-cloned
/// handles; safe to construct once per process and share across tasks.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn SharedStore>,
    cluster: ClusterRegistry,
    scheduler: Arc<dyn Scheduler>,
    drivers: Arc<DriverRegistry>,
    spawn_timeout: Duration,
    spawn_retries: u32,
    default_ttl_secs: u64,
    default_timeout_secs: u64,
    default_result_ttl_secs: u64,
}

impl Dispatcher {
    /// Builds a dispatcher over `store`/`cluster`/`scheduler`/`drivers`,
    /// using the configured job default lifetimes.
    pub fn new(
        store: Arc<dyn SharedStore>,
        cluster: ClusterRegistry,
        scheduler: Arc<dyn Scheduler>,
        drivers: Arc<DriverRegistry>,
        default_ttl_secs: u64,
        default_timeout_secs: u64,
        default_result_ttl_secs: u64,
    ) -> Self {
        Self {
            store,
            cluster,
            scheduler,
            drivers,
            spawn_timeout: DEFAULT_SPAWN_TIMEOUT,
            spawn_retries: DEFAULT_SPAWN_RETRIES,
            default_ttl_secs,
            default_timeout_secs,
            default_result_ttl_secs,
        }
    }

    /// Overrides the spawn-reply wait and retry count (used by tests and
    /// by `WorkerConfig::{spawn_timeout,spawn_retries}` at process boot).
    pub fn with_spawn_policy(mut self, timeout: Duration, retries: u32) -> Self {
        self.spawn_timeout = timeout;
        self.spawn_retries = retries;
        self
    }

    /// Submits a single request, enqueuing a `Job` onto either the FIFO
    /// queue or a device-pinned queue (`spec.md` §4.9 steps 1-4).
    /// `Operation::TestConnection` requests must never reach this path —
    /// the REST layer serves those synchronously without creating a job.
    pub async fn submit(&self, request: Request) -> Result<Job> {
        request.validate()?;
        if matches!(request.operation, Operation::TestConnection) {
            return Err(Error::validation(
                "test_connection requests are served synchronously and never create a job",
            ));
        }

        let host = request.connection_args.host.clone();
        let strategy = self.resolve_strategy(&request)?;
        let job = match strategy {
            QueueStrategy::Fifo => self.enqueue_fifo(request).await?,
            QueueStrategy::Pinned => self.enqueue_pinned(request, &host).await?,
        };
        Ok(job)
    }

    /// Submits the same operation against many hosts. Schedules pinned
    /// hosts that still need a fresh binding via a single
    /// `Scheduler::batch_select` call, then issues parallel spawn
    /// requests (`spec.md` §4.9 step 5).
    pub async fn submit_bulk(&self, requests: Vec<Request>) -> BulkOutcome {
        let mut succeeded = Vec::with_capacity(requests.len());
        let mut failed = Vec::new();
        let mut needs_scheduling: Vec<Request> = Vec::new();

        for request in requests {
            let host = request.connection_args.host.clone();
            if let Err(err) = request.validate() {
                failed.push((host, err));
                continue;
            }
            if matches!(request.operation, Operation::TestConnection) {
                failed.push((host, Error::validation("test_connection is not valid in a bulk request")));
                continue;
            }
            let strategy = match self.resolve_strategy(&request) {
                Ok(s) => s,
                Err(err) => {
                    failed.push((host, err));
                    continue;
                }
            };
            if strategy == QueueStrategy::Fifo {
                match self.enqueue_fifo(request).await {
                    Ok(job) => succeeded.push(job),
                    Err(err) => failed.push((host, err)),
                }
                continue;
            }

            match self.cluster.get_binding(&host).await {
                Ok(Some(node_id)) => match self.enqueue_to_bound_pinned(request.clone(), &host, node_id).await {
                    Ok(job) => succeeded.push(job),
                    Err(_) => needs_scheduling.push(request),
                },
                Ok(None) => needs_scheduling.push(request),
                Err(err) => failed.push((host, err)),
            }
        }

        if needs_scheduling.is_empty() {
            return BulkOutcome { succeeded, failed };
        }

        let snapshot = match self.cluster.snapshot().await {
            Ok(s) => s,
            Err(err) => {
                for request in needs_scheduling {
                    failed.push((request.connection_args.host.clone(), clone_store_error(&err)));
                }
                return BulkOutcome { succeeded, failed };
            }
        };
        let hosts: Vec<String> = needs_scheduling
            .iter()
            .map(|r| r.connection_args.host.clone())
            .collect();
        let placements = self.scheduler.batch_select(&snapshot, &hosts);

        for request in needs_scheduling {
            let host = request.connection_args.host.clone();
            let Some((_, target)) = placements.iter().find(|(h, _)| *h == host) else {
                failed.push((host.clone(), Error::WorkerUnavailable { host }));
                continue;
            };
            match self.spawn_and_enqueue(request, &host, target.node_id.clone()).await {
                Ok(job) => succeeded.push(job),
                Err(err) => failed.push((host, err)),
            }
        }

        BulkOutcome { succeeded, failed }
    }

    fn resolve_strategy(&self, request: &Request) -> Result<QueueStrategy> {
        match request.options.queue_strategy {
            Some(strategy) => Ok(strategy),
            None => self.drivers.default_strategy(&request.driver),
        }
    }

    async fn enqueue_fifo(&self, request: Request) -> Result<Job> {
        let host = request.connection_args.host.clone();
        let job = self.new_job(request, host, keys::QUEUE_FIFO.to_string());
        self.persist_and_push(&job, keys::QUEUE_FIFO).await?;
        info!(job_id = %job.id, queue = %job.queue_name, "job enqueued to fifo");
        Ok(job)
    }

    async fn enqueue_pinned(&self, request: Request, host: &str) -> Result<Job> {
        if let Some(node_id) = self.cluster.get_binding(host).await? {
            match self
                .enqueue_to_bound_pinned(request.clone(), host, node_id)
                .await
            {
                Ok(job) => return Ok(job),
                Err(_) => {
                    // Binding existed but the node turned out dead or the
                    // race unwound; fall through to (re)schedule below.
                }
            }
        }

        for attempt in 1..=self.spawn_retries {
            let snapshot = self.cluster.snapshot().await?;
            // `CapacityExhausted` here is recoverable the same way a failed
            // spawn is: every node being full right now doesn't mean it
            // stays that way, so retry rather than surfacing it directly.
            // Exhausting the retries collapses it into `WorkerUnavailable`
            // per `spec.md` §7 ("subsumed by WorkerUnavailable if all nodes
            // exhausted").
            let target = match self.scheduler.select(&snapshot, host) {
                Ok(target) => target,
                Err(_) if attempt < self.spawn_retries => {
                    warn!(host, attempt, "no node has capacity, retrying");
                    continue;
                }
                Err(_) => return Err(Error::WorkerUnavailable { host: host.to_string() }),
            };

            match self.spawn_and_enqueue(request.clone(), host, target.node_id.clone()).await {
                Ok(job) => return Ok(job),
                Err(err) if err.is_recoverable() && attempt < self.spawn_retries => {
                    warn!(host, attempt, error = %err, "pinned spawn attempt failed, retrying");
                }
                Err(err) if err.is_recoverable() => {
                    return Err(Error::WorkerUnavailable { host: host.to_string() });
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::WorkerUnavailable { host: host.to_string() })
    }

    /// A binding already names `node_id`; enqueue directly if the node is
    /// still alive in the latest snapshot, otherwise return an error so
    /// the caller reschedules from scratch.
    async fn enqueue_to_bound_pinned(&self, request: Request, host: &str, node_id: String) -> Result<Job> {
        let snapshot = self.cluster.snapshot().await?;
        if !snapshot.iter().any(|n| n.node_id == node_id) {
            return Err(Error::WorkerUnavailable { host: host.to_string() });
        }
        let queue_name = keys::queue_pinned(host);
        let mut job = self.new_job(request, host.to_string(), queue_name.clone());
        job.node_id = Some(node_id);
        self.persist_and_push(&job, &queue_name).await?;
        debug!(job_id = %job.id, host, "job enqueued to existing pinned binding");
        Ok(job)
    }

    /// Publishes `SpawnPinned` to `node_id`'s control channel and awaits
    /// its reply, recovering internally from `CapacityExhausted` and
    /// `LostRace` per `spec.md` §4.9 step 4(f).
    async fn spawn_and_enqueue(&self, request: Request, host: &str, node_id: String) -> Result<Job> {
        let request_id = Uuid::new_v4().to_string();
        let message = ControlMessage::SpawnPinned {
            request_id: request_id.clone(),
            host: host.to_string(),
            conn_args_fingerprint: request.connection_args.fingerprint(),
        };
        control::send(self.store.as_ref(), &node_id, &message).await?;

        let reply = control::await_reply(self.store.as_ref(), &request_id, self.spawn_timeout).await?;
        match reply {
            Some(ControlReply::Spawned { host: spawned_host, node_id, .. }) => {
                let queue_name = keys::queue_pinned(&spawned_host);
                let mut job = self.new_job(request, spawned_host, queue_name.clone());
                job.node_id = Some(node_id);
                self.persist_and_push(&job, &queue_name).await?;
                info!(job_id = %job.id, host, "job enqueued after spawning pinned worker");
                Ok(job)
            }
            Some(ControlReply::CapacityExhausted) => Err(Error::CapacityExhausted { candidates: 1 }),
            Some(ControlReply::LostRace { node_id: winner }) => {
                self.enqueue_to_bound_pinned(request, host, winner).await
            }
            Some(ControlReply::SpawnFailed { message }) => {
                warn!(host, %message, "pinned worker spawn failed");
                Err(Error::WorkerUnavailable { host: host.to_string() })
            }
            Some(ControlReply::Ack) | None => Err(Error::WorkerUnavailable { host: host.to_string() }),
        }
    }

    fn new_job(&self, request: Request, host: String, queue_name: String) -> Job {
        let ttl = request.options.ttl.unwrap_or(self.default_ttl_secs);
        Job::new(
            Uuid::new_v4().to_string(),
            request,
            host,
            queue_name,
            ttl,
            self.default_timeout_secs,
            self.default_result_ttl_secs,
        )
    }

    async fn persist_and_push(&self, job: &Job, queue_name: &str) -> Result<()> {
        let serialized = serde_json::to_string(job)?;
        self.store.set(&keys::job(&job.id), &serialized).await?;
        self.store.expire(&keys::job(&job.id), job.ttl_seconds.max(job.result_ttl_seconds)).await?;
        self.store.list_push(queue_name, &job.id).await
    }
}

fn clone_store_error(err: &Error) -> Error {
    Error::StoreUnavailable(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::NodeInfo;
    use crate::driver::NullDriver;
    use crate::job::{JobStatus, RequestOptions};
    use crate::scheduler::Greedy;
    use crate::store::memory::InMemoryStore;
    use crate::traits::ConnectionArgs;
    use std::collections::HashMap;

    fn sample_request(host: &str, strategy: Option<QueueStrategy>) -> Request {
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
                queue_strategy: strategy,
                ttl: None,
                webhook: None,
            },
            credential_ref: None,
        }
    }

    fn dispatcher(store: Arc<InMemoryStore>) -> Dispatcher {
        let cluster = ClusterRegistry::new(store.clone(), 30);
        let mut drivers = DriverRegistry::with_builtins();
        drivers.register(crate::driver::NULL, Arc::new(NullDriver::fifo()));
        Dispatcher::new(
            store,
            cluster,
            Arc::new(Greedy),
            Arc::new(drivers),
            300,
            60,
            3600,
        )
    }

    #[tokio::test]
    async fn fifo_request_enqueues_to_fifo_queue() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(store.clone());
        let job = dispatcher
            .submit(sample_request("r1", Some(QueueStrategy::Fifo)))
            .await
            .unwrap();
        assert_eq!(job.queue_name, keys::QUEUE_FIFO);
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(store.list_len(keys::QUEUE_FIFO).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connection_operation_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(store);
        let mut request = sample_request("r1", Some(QueueStrategy::Fifo));
        request.operation = Operation::TestConnection;
        let err = dispatcher.submit(request).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn pinned_request_reuses_existing_live_binding() {
        let store = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        cluster
            .heartbeat(
                "node-a",
                NodeInfo {
                    node_id: "node-a".into(),
                    hostname: "node-a".into(),
                    capacity: 4,
                    count: 1,
                    last_heartbeat: 0,
                },
            )
            .await
            .unwrap();
        cluster.bind("r1", "node-a").await.unwrap();

        let dispatcher = dispatcher(store.clone());
        let job = dispatcher
            .submit(sample_request("r1", Some(QueueStrategy::Pinned)))
            .await
            .unwrap();
        assert_eq!(job.queue_name, keys::queue_pinned("r1"));
        assert_eq!(job.node_id.as_deref(), Some("node-a"));
        assert_eq!(store.list_len(&keys::queue_pinned("r1")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pinned_request_with_no_live_node_is_worker_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        let dispatcher = dispatcher(store);
        let err = dispatcher
            .submit(sample_request("r1", Some(QueueStrategy::Pinned)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CapacityExhausted { .. } | Error::WorkerUnavailable { .. }
        ));
    }
}
