//! PinnedSession: a concurrency-safe, self-healing long-lived device
//! connection owned by exactly one PinnedWorker (`spec.md` §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::traits::{CommandOutputs, Connection, ConnectionArgs, Driver};

/// A long-lived device connection plus its health-monitor task. Both job
/// execution and the monitor's keepalive traffic serialize through
/// `connection_lock` because driver connections are not safe for
/// concurrent use.
pub struct PinnedSession {
    conn_args: ConnectionArgs,
    driver: Arc<dyn Driver>,
    connection: Arc<Mutex<Box<dyn Connection>>>,
    stop_tx: watch::Sender<bool>,
    suicide_rx: watch::Receiver<bool>,
    monitor: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for PinnedSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedSession")
            .field("host", &self.conn_args.host)
            .field("driver", &self.driver.name())
            .finish_non_exhaustive()
    }
}

impl PinnedSession {
    /// Opens a connection for `conn_args` via `driver` and starts its
    /// monitor task. Fails with whatever `Driver::connect` fails with.
    pub async fn open(driver: Arc<dyn Driver>, conn_args: ConnectionArgs) -> Result<Self> {
        let connection = driver.connect(&conn_args).await?;
        let connection = Arc::new(Mutex::new(connection));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (suicide_tx, suicide_rx) = watch::channel(false);

        let monitor = tokio::spawn(monitor_loop(
            driver.clone(),
            connection.clone(),
            conn_args.keepalive_interval(),
            stop_rx,
            suicide_tx,
        ));

        Ok(Self {
            conn_args,
            driver,
            connection,
            stop_tx,
            suicide_rx,
            monitor: Some(monitor),
        })
    }

    /// The connection arguments this session was opened with.
    pub fn conn_args(&self) -> &ConnectionArgs {
        &self.conn_args
    }

    /// `true` if `other` would require replacing this session (§4.5
    /// session replacement rule: any identity-affecting field differs).
    pub fn needs_replacement_for(&self, other: &ConnectionArgs) -> bool {
        self.conn_args.fingerprint() != other.fingerprint()
    }

    /// A receiver that changes to `true` once the monitor has declared
    /// this session dead and the owning PinnedWorker should terminate.
    pub fn suicide_signal(&self) -> watch::Receiver<bool> {
        self.suicide_rx.clone()
    }

    /// `true` if the monitor has already signalled suicide.
    pub fn is_terminated(&self) -> bool {
        *self.suicide_rx.borrow()
    }

    /// Runs query commands under `connection_lock`.
    pub async fn send(&self, commands: &[String]) -> Result<CommandOutputs> {
        let connection = self.connection.lock().await;
        self.driver.send(connection.as_ref(), commands).await
    }

    /// Applies configuration lines under `connection_lock`.
    pub async fn configure(
        &self,
        config: &[String],
        flags: &HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        let connection = self.connection.lock().await;
        self.driver.configure(connection.as_ref(), config, flags).await
    }

    /// Stops the monitor task and disconnects. Idempotent with respect
    /// to the driver's own idempotent `disconnect`.
    pub async fn close(mut self) -> Result<()> {
        self.stop_monitor().await;
        let connection = self.connection.lock().await;
        self.driver.disconnect(connection.as_ref()).await
    }

    async fn stop_monitor(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.monitor.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PinnedSession {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(true);
        if let Some(handle) = self.monitor.take() {
            handle.abort();
        }
    }
}

async fn monitor_loop(
    driver: Arc<dyn Driver>,
    connection: Arc<Mutex<Box<dyn Connection>>>,
    keepalive_interval: Duration,
    mut stop_rx: watch::Receiver<bool>,
    suicide_tx: watch::Sender<bool>,
) {
    loop {
        let woke_by_stop = tokio::select! {
            _ = tokio::time::sleep(keepalive_interval) => false,
            result = stop_rx.changed() => result.is_err() || *stop_rx.borrow(),
        };
        if woke_by_stop || *stop_rx.borrow() {
            return;
        }

        let guard = connection.lock().await;
        if *stop_rx.borrow() {
            return;
        }

        match driver.is_alive(guard.as_ref()).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("pinned session health check reported dead connection; signalling suicide");
                drop(guard);
                let _ = suicide_tx.send(true);
                return;
            }
            Err(err) => {
                warn!(error = %err, "pinned session health check failed; signalling suicide");
                drop(guard);
                let _ = suicide_tx.send(true);
                return;
            }
        }

        if let Err(err) = driver.keepalive(guard.as_ref()).await {
            warn!(error = %err, "pinned session keepalive failed; signalling suicide");
            drop(guard);
            let _ = suicide_tx.send(true);
            return;
        }
        debug!("pinned session keepalive ok");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NullDriver;
    use std::collections::HashMap as Map;

    fn args(host: &str) -> ConnectionArgs {
        let mut extra = Map::new();
        extra.insert("keepalive".to_string(), serde_json::json!(10));
        ConnectionArgs { host: host.to_string(), extra }
    }

    #[tokio::test]
    async fn open_send_close_round_trip() {
        let driver = Arc::new(NullDriver::pinned());
        let session = PinnedSession::open(driver, args("r1")).await.unwrap();
        let outputs = session.send(&["show version".to_string()]).await.unwrap();
        assert_eq!(outputs.get("show version").unwrap(), "ok: show version @ r1");
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn fingerprint_change_requires_replacement() {
        let driver = Arc::new(NullDriver::pinned());
        let session = PinnedSession::open(driver, args("r1")).await.unwrap();
        let same = args("r1");
        let mut different = args("r1");
        different.extra.insert("username".to_string(), serde_json::json!("bob"));

        assert!(!session.needs_replacement_for(&same));
        assert!(session.needs_replacement_for(&different));
        session.close().await.unwrap();
    }

    #[tokio::test]
    async fn monitor_signals_suicide_when_connection_dies() {
        let driver = Arc::new(NullDriver::pinned());
        let mut extra = Map::new();
        extra.insert("keepalive".to_string(), serde_json::json!(1));
        let session = PinnedSession::open(
            driver,
            ConnectionArgs {
                host: "r1".into(),
                extra,
            },
        )
        .await
        .unwrap();

        let mut suicide = session.suicide_signal();
        {
            let guard = session.connection.lock().await;
            guard
                .as_any()
                .downcast_ref::<crate::driver::NullConnection>()
                .unwrap()
                .kill();
        }
        // invariant 8: a dead connection must be observed within
        // 3*keepalive_interval, i.e. within 3s here.
        tokio::time::timeout(Duration::from_secs(3), suicide.changed())
            .await
            .expect("monitor did not detect the dead connection within 3*keepalive_interval")
            .unwrap();
        assert!(*suicide.borrow());
    }
}
