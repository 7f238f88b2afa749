//! `null` driver: an in-memory mock used by tests, `test-connection`
//! examples, and anywhere a real device isn't available. Per `spec.md`
//! §1 Out-of-scope, device protocol handling is not part of the core; this
//! driver exists only so `DriverRegistry::get` has a second real
//! implementation to return alongside the SSH one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{CommandOutputs, Connection, ConnectionArgs, Driver};

/// Connection handle for [`NullDriver`]. Carries no real transport state;
/// `alive` flips to `false` when a test wants to simulate a dead session
/// so `PinnedSession`'s health checks have something to observe.
#[derive(Debug)]
pub struct NullConnection {
    host: String,
    alive: AtomicBool,
}

impl NullConnection {
    /// Simulates the underlying transport dying, without going through
    /// `disconnect`. Used by `PinnedSession` monitor-loop tests.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

impl Connection for NullConnection {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// A driver that never touches the network: `connect` always succeeds,
/// `send`/`configure` echo their input back as output. `supports_persistent_session`
/// defaults to `true` so it exercises the pinned path by default; tests
/// needing the FIFO path construct it with `fifo()`.
#[derive(Debug, Clone)]
pub struct NullDriver {
    persistent: bool,
}

impl NullDriver {
    /// A null driver defaulting to the `pinned` queue strategy.
    pub fn pinned() -> Self {
        Self { persistent: true }
    }

    /// A null driver defaulting to the `fifo` queue strategy.
    pub fn fifo() -> Self {
        Self { persistent: false }
    }
}

impl Default for NullDriver {
    fn default() -> Self {
        Self::pinned()
    }
}

#[async_trait]
impl Driver for NullDriver {
    fn name(&self) -> &str {
        "null"
    }

    fn supports_persistent_session(&self) -> bool {
        self.persistent
    }

    async fn connect(&self, conn_args: &ConnectionArgs) -> Result<Box<dyn Connection>> {
        Ok(Box::new(NullConnection {
            host: conn_args.host.clone(),
            alive: AtomicBool::new(true),
        }))
    }

    async fn send(&self, connection: &dyn Connection, commands: &[String]) -> Result<CommandOutputs> {
        let conn = downcast(connection)?;
        let mut outputs = CommandOutputs::new();
        for cmd in commands {
            outputs.insert(cmd.clone(), format!("ok: {cmd} @ {}", conn.host));
        }
        Ok(outputs)
    }

    async fn configure(
        &self,
        connection: &dyn Connection,
        config: &[String],
        _flags: &HashMap<String, serde_json::Value>,
    ) -> Result<String> {
        let conn = downcast(connection)?;
        Ok(format!("applied {} line(s) on {}", config.len(), conn.host))
    }

    async fn disconnect(&self, _connection: &dyn Connection) -> Result<()> {
        // Idempotent by construction: there is no resource to release.
        Ok(())
    }

    async fn is_alive(&self, connection: &dyn Connection) -> Result<bool> {
        let conn = downcast(connection)?;
        Ok(conn.alive.load(Ordering::SeqCst))
    }

    async fn keepalive(&self, connection: &dyn Connection) -> Result<()> {
        let _ = downcast(connection)?;
        Ok(())
    }
}

fn downcast(connection: &dyn Connection) -> Result<&NullConnection> {
    connection.as_any().downcast_ref::<NullConnection>().ok_or_else(|| {
        crate::error::Error::ProtocolError {
            host: "unknown".into(),
            message: "connection was not opened by the null driver".into(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_send_disconnect_round_trip() {
        let driver = NullDriver::pinned();
        let args = ConnectionArgs {
            host: "r1.example.net".into(),
            extra: HashMap::new(),
        };
        let conn = driver.connect(&args).await.unwrap();
        let outputs = driver
            .send(conn.as_ref(), &["show version".to_string()])
            .await
            .unwrap();
        assert_eq!(
            outputs.get("show version").unwrap(),
            "ok: show version @ r1.example.net"
        );
        assert!(driver.is_alive(conn.as_ref()).await.unwrap());
        driver.disconnect(conn.as_ref()).await.unwrap();
        // Idempotent per invariant 4.
        driver.disconnect(conn.as_ref()).await.unwrap();
    }

    #[tokio::test]
    async fn killed_connection_reports_not_alive() {
        let driver = NullDriver::pinned();
        let args = ConnectionArgs {
            host: "r1".into(),
            extra: HashMap::new(),
        };
        let conn = driver.connect(&args).await.unwrap();
        conn.as_ref()
            .as_any()
            .downcast_ref::<NullConnection>()
            .unwrap()
            .kill();
        assert!(!driver.is_alive(conn.as_ref()).await.unwrap());
    }
}
