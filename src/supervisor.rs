//! NodeSupervisor: the per-host daemon that forks/reaps PinnedWorker child
//! processes, publishes capacity heartbeats, and answers control-channel
//! commands. One instance runs per worker host, singleton-enforced by an
//! exclusive file lock acquired at startup.

use std::collections::HashMap;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::sync::{watch, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::cluster::{ClusterRegistry, NodeInfo};
use crate::control::{self, ControlMessage, ControlReply};
use crate::error::{Error, ErrorContext, Result};
use crate::store::keys;
use crate::traits::SharedStore;

/// How often the control channel is polled for the next message. Bounds
/// how quickly drain/heartbeat state transitions are noticed when no
/// message is pending.
const CONTROL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Lifecycle state of a [`NodeSupervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Acquiring the node lock and performing initial registration.
    Starting,
    /// Accepting spawn/kill commands and publishing heartbeats.
    Running,
    /// No longer accepting spawns; waiting for children to finish.
    Draining,
    /// All children reaped; safe to exit.
    Stopped,
}

/// Exclusive, non-blocking advisory lock on a well-known path, enforcing
/// at most one active [`NodeSupervisor`] (or `FifoWorker` instance) per
/// host. Held for the process lifetime; released on drop.
#[derive(Debug)]
pub struct NodeLock {
    _file: std::fs::File,
    path: PathBuf,
}

impl NodeLock {
    /// Acquires the lock at `dir/<name>.lock`, creating `dir` if needed.
    /// Fails if another process already holds it — the caller treats
    /// this as fatal, since running two supervisors for one host would
    /// let them both believe they own the same pinned bindings.
    pub fn acquire(dir: &Path, name: &str) -> Result<Self> {
        std::fs::create_dir_all(dir).context(format!(
            "creating node lock directory {}",
            dir.display()
        ))?;
        let path = dir.join(format!("{name}.lock"));
        let file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .context(format!("opening node lock file {}", path.display()))?;

        let fd = file.as_raw_fd();
        // SAFETY: fd is a valid, open file descriptor owned by `file` for
        // the duration of this call.
        let rc = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            return Err(Error::Other {
                message: format!(
                    "node lock {} is already held by another process",
                    path.display()
                ),
                source: None,
            });
        }
        Ok(Self { _file: file, path })
    }
}

impl Drop for NodeLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "released node lock");
        // Closing `_file` on drop releases the flock automatically.
    }
}

#[derive(Debug)]
struct ChildInfo {
    pid: u32,
}

/// Per-host daemon. Owns the node's entry in the `ClusterRegistry`, a set
/// of live `PinnedWorker` child processes, and the control-channel loop
/// that spawns/kills them on request.
pub struct NodeSupervisor {
    node_id: String,
    hostname: String,
    store: Arc<dyn SharedStore>,
    cluster: ClusterRegistry,
    capacity: u32,
    heartbeat_interval: Duration,
    spawn_timeout: Duration,
    drain_timeout: Duration,
    binary: PathBuf,
    children: Arc<Mutex<HashMap<String, ChildInfo>>>,
    state: SupervisorState,
    _lock: NodeLock,
}

impl NodeSupervisor {
    /// Acquires the singleton lock for `node_id` under `lock_dir` and
    /// builds a supervisor ready to [`run`](Self::run). `binary` is the
    /// executable forked for each `pinned-worker` child (typically
    /// `std::env::current_exe()`).
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        node_id: impl Into<String>,
        hostname: impl Into<String>,
        store: Arc<dyn SharedStore>,
        cluster: ClusterRegistry,
        capacity: u32,
        heartbeat_interval: Duration,
        spawn_timeout: Duration,
        drain_timeout: Duration,
        lock_dir: &Path,
        binary: PathBuf,
    ) -> Result<Self> {
        let node_id = node_id.into();
        let lock = NodeLock::acquire(lock_dir, &node_id)?;
        Ok(Self {
            node_id,
            hostname: hostname.into(),
            store,
            cluster,
            capacity,
            heartbeat_interval,
            spawn_timeout,
            drain_timeout,
            binary,
            children: Arc::new(Mutex::new(HashMap::new())),
            state: SupervisorState::Starting,
            _lock: lock,
        })
    }

    /// Runs the supervisor until it drains to completion. Consumes
    /// `self`: a supervisor has no further use once stopped.
    #[instrument(skip(self), fields(node_id = %self.node_id))]
    pub async fn run(mut self) -> Result<()> {
        self.publish_heartbeat().await?;
        self.state = SupervisorState::Running;
        info!(capacity = self.capacity, "node supervisor running");

        let (heartbeat_stop_tx, heartbeat_stop_rx) = watch::channel(false);
        let heartbeat_task = tokio::spawn(heartbeat_loop(
            self.cluster.clone(),
            self.node_id.clone(),
            self.hostname.clone(),
            self.capacity,
            self.children.clone(),
            self.heartbeat_interval,
            heartbeat_stop_rx,
        ));

        let mut drain_deadline: Option<Instant> = None;

        loop {
            match control::receive(&*self.store, &self.node_id, CONTROL_POLL_INTERVAL).await {
                Ok(Some(message)) => {
                    if let Err(err) = self.handle_message(message).await {
                        warn!(error = %err, "failed to handle control message");
                    }
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "control channel receive failed"),
            }

            if self.state == SupervisorState::Draining {
                if drain_deadline.is_none() {
                    drain_deadline = Some(Instant::now() + self.drain_timeout);
                }
                let empty = self.children.lock().await.is_empty();
                let expired = drain_deadline.is_some_and(|d| Instant::now() >= d);
                if empty {
                    self.state = SupervisorState::Stopped;
                } else if expired {
                    warn!("drain timeout elapsed; force-killing remaining pinned workers");
                    self.force_kill_all().await;
                    self.state = SupervisorState::Stopped;
                }
            }

            if self.state == SupervisorState::Stopped {
                break;
            }
        }

        let _ = heartbeat_stop_tx.send(true);
        let _ = heartbeat_task.await;
        info!("node supervisor stopped");
        Ok(())
    }

    async fn handle_message(&mut self, message: ControlMessage) -> Result<()> {
        match message {
            ControlMessage::SpawnPinned {
                request_id,
                host,
                conn_args_fingerprint,
            } => self.handle_spawn(request_id, host, conn_args_fingerprint).await,
            ControlMessage::KillPinned { request_id, host } => {
                self.handle_kill_pinned(&host).await;
                control::reply(&*self.store, &request_id, &ControlReply::Ack).await
            }
            ControlMessage::KillAll { request_id } => {
                self.signal_all(Signal::SIGTERM).await;
                control::reply(&*self.store, &request_id, &ControlReply::Ack).await
            }
            ControlMessage::Drain { request_id } => {
                info!("draining: no longer accepting new pinned worker spawns");
                self.state = SupervisorState::Draining;
                self.signal_all(Signal::SIGTERM).await;
                control::reply(&*self.store, &request_id, &ControlReply::Ack).await
            }
        }
    }

    async fn handle_spawn(
        &mut self,
        request_id: String,
        host: String,
        _conn_args_fingerprint: String,
    ) -> Result<()> {
        if self.state != SupervisorState::Running {
            return control::reply(&*self.store, &request_id, &ControlReply::CapacityExhausted).await;
        }

        let count = self.children.lock().await.len() as u32;
        if count >= self.capacity {
            return control::reply(&*self.store, &request_id, &ControlReply::CapacityExhausted).await;
        }

        if let Err(err) = self.cluster.bind(&host, &self.node_id).await {
            if let Error::HostAlreadyPinned { .. } = err {
                let winner = self.cluster.get_binding(&host).await?.unwrap_or_default();
                return control::reply(
                    &*self.store,
                    &request_id,
                    &ControlReply::LostRace { node_id: winner },
                )
                .await;
            }
            return Err(err);
        }

        let queue_name = keys::queue_pinned(&host);
        match self.spawn_pinned_worker(&host, &queue_name, &request_id) {
            Ok((child, pid)) => {
                let worker_name = format!("pinned:{host}:{pid}");
                self.children
                    .lock()
                    .await
                    .insert(host.clone(), ChildInfo { pid });
                self.cluster.increment_count(&self.node_id, 1).await?;
                tokio::spawn(reap(
                    child,
                    host.clone(),
                    self.node_id.clone(),
                    self.cluster.clone(),
                    self.children.clone(),
                ));

                if self.wait_for_registration(&worker_name).await {
                    self.publish_heartbeat().await?;
                    control::reply(
                        &*self.store,
                        &request_id,
                        &ControlReply::Spawned {
                            host,
                            node_id: self.node_id.clone(),
                            worker_name,
                        },
                    )
                    .await
                } else {
                    warn!(host = %host, "pinned worker never published a WorkerRecord; rolling back");
                    self.handle_kill_pinned(&host).await;
                    control::reply(
                        &*self.store,
                        &request_id,
                        &ControlReply::SpawnFailed {
                            message: format!("{host} did not register within the spawn timeout"),
                        },
                    )
                    .await
                }
            }
            Err(err) => {
                let _ = self.cluster.unbind(&host, &self.node_id).await;
                control::reply(
                    &*self.store,
                    &request_id,
                    &ControlReply::SpawnFailed {
                        message: err.to_string(),
                    },
                )
                .await
            }
        }
    }

    /// Signals `host`'s child (if any) to finish its current job and
    /// exit. Unbinding, count adjustment, and `WorkerRecord` cleanup all
    /// happen in the child's own `reap` task once it actually exits.
    async fn handle_kill_pinned(&self, host: &str) {
        if let Some(info) = self.children.lock().await.get(host) {
            self.signal_pid(info.pid, Signal::SIGTERM);
        }
    }

    async fn signal_all(&self, signal: Signal) {
        let pids: Vec<u32> = self.children.lock().await.values().map(|c| c.pid).collect();
        for pid in pids {
            self.signal_pid(pid, signal);
        }
    }

    async fn force_kill_all(&self) {
        self.signal_all(Signal::SIGKILL).await;
    }

    fn signal_pid(&self, pid: u32, signal: Signal) {
        if let Err(err) = kill(Pid::from_raw(pid as i32), signal) {
            warn!(pid, signal = ?signal, error = %err, "failed to signal pinned worker");
        }
    }

    fn spawn_pinned_worker(
        &self,
        host: &str,
        queue_name: &str,
        request_id: &str,
    ) -> Result<(Child, u32)> {
        let mut command = Command::new(&self.binary);
        command
            .arg("pinned-worker")
            .arg("--host")
            .arg(host)
            .arg("--queue")
            .arg(queue_name)
            .arg("--node-id")
            .arg(&self.node_id)
            .arg("--request-id")
            .arg(request_id)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .context(format!("forking pinned worker for host '{host}'"))?;
        let pid = child.id().unwrap_or(0);
        info!(host, pid, "forked pinned worker");
        Ok((child, pid))
    }

    /// Polls the store for `worker_name`'s `WorkerRecord` until it
    /// appears or `spawn_timeout` elapses.
    async fn wait_for_registration(&self, worker_name: &str) -> bool {
        let deadline = Instant::now() + self.spawn_timeout;
        loop {
            match self.store.get(&keys::worker(worker_name)).await {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(err) => warn!(error = %err, "store error while awaiting worker registration"),
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    async fn publish_heartbeat(&self) -> Result<()> {
        let count = self.children.lock().await.len() as u32;
        self.cluster
            .heartbeat(
                &self.node_id,
                NodeInfo {
                    node_id: self.node_id.clone(),
                    hostname: self.hostname.clone(),
                    capacity: self.capacity,
                    count,
                    last_heartbeat: 0,
                },
            )
            .await
    }
}

async fn heartbeat_loop(
    cluster: ClusterRegistry,
    node_id: String,
    hostname: String,
    capacity: u32,
    children: Arc<Mutex<HashMap<String, ChildInfo>>>,
    interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        let woke_by_stop = tokio::select! {
            _ = tokio::time::sleep(interval) => false,
            result = stop_rx.changed() => result.is_err() || *stop_rx.borrow(),
        };
        if woke_by_stop || *stop_rx.borrow() {
            return;
        }

        let count = children.lock().await.len() as u32;
        if let Err(err) = cluster
            .heartbeat(
                &node_id,
                NodeInfo {
                    node_id: node_id.clone(),
                    hostname: hostname.clone(),
                    capacity,
                    count,
                    last_heartbeat: 0,
                },
            )
            .await
        {
            warn!(error = %err, "failed to publish node heartbeat");
        }
    }
}

/// Waits for a forked `PinnedWorker` child to exit, then releases its
/// cluster bindings. Runs for the lifetime of the child.
async fn reap(
    mut child: Child,
    host: String,
    node_id: String,
    cluster: ClusterRegistry,
    children: Arc<Mutex<HashMap<String, ChildInfo>>>,
) {
    match child.wait().await {
        Ok(status) if status.success() => info!(host = %host, "pinned worker exited"),
        Ok(status) => warn!(host = %host, code = ?status.code(), "pinned worker exited uncleanly"),
        Err(err) => warn!(host = %host, error = %err, "failed to wait on pinned worker"),
    }

    children.lock().await.remove(&host);
    if let Err(err) = cluster.unbind(&host, &node_id).await {
        warn!(host = %host, error = %err, "failed to unbind host after worker exit");
    }
    if let Err(err) = cluster.decrement_count(&node_id, 1).await {
        warn!(host = %host, error = %err, "failed to decrement node count after worker exit");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_lock_on_same_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let first = NodeLock::acquire(dir.path(), "node-a").unwrap();
        let second = NodeLock::acquire(dir.path(), "node-a");
        assert!(second.is_err());
        drop(first);
        assert!(NodeLock::acquire(dir.path(), "node-a").is_ok());
    }

    #[test]
    fn locks_on_different_names_do_not_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let _a = NodeLock::acquire(dir.path(), "node-a").unwrap();
        let _b = NodeLock::acquire(dir.path(), "node-b").unwrap();
    }
}
