//! `netmiko_ssh` driver: a thin SSH adapter built on `russh`. Per `spec.md`
//! §1 Out-of-scope ("device driver implementations themselves"), this is
//! deliberately not a full network-OS command library the way netmiko
//! itself is — it opens a channel per command/config batch, runs it, and
//! hands the raw output back. Anything richer (prompt detection, paging,
//! privileged-mode handling) belongs in a driver plugin, not here.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Handler};
use russh::keys::key::PublicKey;
use russh::{ChannelMsg, Disconnect};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::traits::{CommandOutputs, Connection, ConnectionArgs, Driver};

const DEFAULT_PORT: u16 = 22;
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Accepts any host key. A production driver would consult
/// `~/.ssh/known_hosts`; NetPulse's device fleet is reached through a
/// jump host whose key rotation is out of scope here.
struct AcceptAllKeys;

impl Handler for AcceptAllKeys {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _server_public_key: &PublicKey) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// Live SSH session. `handle` is behind a [`Mutex`] because `russh`'s
/// `Handle` needs `&mut` for `authenticate_password` but the rest of the
/// crate only ever takes shared references to a [`Connection`].
#[derive(Debug)]
pub struct SshConnection {
    host: String,
    handle: Mutex<Handle<AcceptAllKeys>>,
    alive: AtomicBool,
}

impl Connection for SshConnection {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Pure-Rust SSH driver for command execution and configuration push.
/// Always selects the `pinned` queue strategy by default: opening a new
/// TCP+SSH handshake per command is expensive enough that reuse matters
/// (`spec.md` §4.2).
#[derive(Debug, Default, Clone, Copy)]
pub struct NetmikoSsh;

impl NetmikoSsh {
    fn field_str<'a>(args: &'a ConnectionArgs, key: &str) -> Option<&'a str> {
        args.extra.get(key).and_then(|v| v.as_str())
    }

    fn port(args: &ConnectionArgs) -> u16 {
        args.extra
            .get("port")
            .and_then(|v| v.as_u64())
            .map(|p| p as u16)
            .unwrap_or(DEFAULT_PORT)
    }

    async fn authenticate(handle: &mut Handle<AcceptAllKeys>, args: &ConnectionArgs) -> Result<()> {
        let user = Self::field_str(args, "username").unwrap_or("admin");
        let Some(password) = Self::field_str(args, "password") else {
            return Err(Error::AuthenticationFailed { host: args.host.clone() });
        };
        let auth_failed = || Error::AuthenticationFailed { host: args.host.clone() };
        let authenticated = handle
            .authenticate_password(user, password)
            .await
            .map_err(|_| auth_failed())?;
        if authenticated {
            Ok(())
        } else {
            Err(auth_failed())
        }
    }

    async fn run_channel(connection: &SshConnection, command: &str) -> Result<(i32, String)> {
        let handle = connection.handle.lock().await;
        let mut channel = handle.channel_open_session().await.map_err(|e| Error::ProtocolError {
            host: connection.host.clone(),
            message: format!("failed to open channel: {e}"),
        })?;
        drop(handle);

        channel.exec(true, command).await.map_err(|e| Error::CommandFailed {
            host: connection.host.clone(),
            message: format!("exec failed: {e}"),
        })?;

        let mut output = Vec::new();
        let mut exit_code = 0i32;
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } | ChannelMsg::ExtendedData { ref data, .. } => {
                    output.extend_from_slice(data);
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    exit_code = exit_status as i32;
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        Ok((exit_code, String::from_utf8_lossy(&output).into_owned()))
    }
}

#[async_trait]
impl Driver for NetmikoSsh {
    fn name(&self) -> &str {
        "netmiko_ssh"
    }

    fn supports_persistent_session(&self) -> bool {
        true
    }

    async fn connect(&self, conn_args: &ConnectionArgs) -> Result<Box<dyn Connection>> {
        let port = Self::port(conn_args);
        let addr = (conn_args.host.as_str(), port);
        let config = client::Config {
            inactivity_timeout: Some(DEFAULT_CONNECT_TIMEOUT),
            ..Default::default()
        };
        debug!(host = %conn_args.host, port, "opening ssh connection");

        let mut handle = tokio::time::timeout(
            DEFAULT_CONNECT_TIMEOUT,
            client::connect(Arc::new(config), addr, AcceptAllKeys),
        )
        .await
        .map_err(|_| Error::Timeout {
            host: conn_args.host.clone(),
            timeout_secs: DEFAULT_CONNECT_TIMEOUT.as_secs(),
        })?
        .map_err(|e| Error::ConnectionFailed {
            host: conn_args.host.clone(),
            message: e.to_string(),
        })?;

        Self::authenticate(&mut handle, conn_args).await?;

        Ok(Box::new(SshConnection {
            host: conn_args.host.clone(),
            handle: Mutex::new(handle),
            alive: AtomicBool::new(true),
        }))
    }

    async fn send(&self, connection: &dyn Connection, commands: &[String]) -> Result<CommandOutputs> {
        let conn = downcast(connection)?;
        let mut outputs = CommandOutputs::new();
        for cmd in commands {
            trace!(host = %conn.host, command = %cmd, "running command");
            let (exit_code, text) = Self::run_channel(conn, cmd).await?;
            if exit_code != 0 {
                return Err(Error::CommandFailed {
                    host: conn.host.clone(),
                    message: format!("'{cmd}' exited with status {exit_code}: {text}"),
                });
            }
            outputs.insert(cmd.clone(), text);
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
        let mut combined = String::new();
        for line in config {
            let (exit_code, text) = Self::run_channel(conn, line).await?;
            if exit_code != 0 {
                return Err(Error::CommandFailed {
                    host: conn.host.clone(),
                    message: format!("config line '{line}' exited with status {exit_code}: {text}"),
                });
            }
            combined.push_str(&text);
        }
        Ok(combined)
    }

    async fn disconnect(&self, connection: &dyn Connection) -> Result<()> {
        let conn = downcast(connection)?;
        if !conn.alive.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let handle = conn.handle.lock().await;
        let _ = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await;
        Ok(())
    }

    async fn is_alive(&self, connection: &dyn Connection) -> Result<bool> {
        Ok(downcast(connection)?.alive.load(Ordering::SeqCst))
    }

    async fn keepalive(&self, connection: &dyn Connection) -> Result<()> {
        let conn = downcast(connection)?;
        if !conn.alive.load(Ordering::SeqCst) {
            return Err(Error::ProtocolError {
                host: conn.host.clone(),
                message: "connection already closed".into(),
            });
        }
        let handle = conn.handle.lock().await;
        match handle.channel_open_session().await {
            Ok(mut channel) => {
                let _ = channel.exec(true, "true").await;
                let _ = channel.eof().await;
                Ok(())
            }
            Err(e) => {
                conn.alive.store(false, Ordering::SeqCst);
                Err(Error::ProtocolError {
                    host: conn.host.clone(),
                    message: format!("keepalive failed: {e}"),
                })
            }
        }
    }
}

fn downcast(connection: &dyn Connection) -> Result<&SshConnection> {
    connection.as_any().downcast_ref::<SshConnection>().ok_or_else(|| Error::ProtocolError {
        host: "unknown".into(),
        message: "connection was not opened by the netmiko_ssh driver".into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_defaults_to_22() {
        let args = ConnectionArgs {
            host: "r1".into(),
            extra: HashMap::new(),
        };
        assert_eq!(NetmikoSsh::port(&args), 22);
    }

    #[test]
    fn port_reads_override() {
        let mut extra = HashMap::new();
        extra.insert("port".to_string(), serde_json::json!(2222));
        let args = ConnectionArgs { host: "r1".into(), extra };
        assert_eq!(NetmikoSsh::port(&args), 2222);
    }

    #[test]
    fn driver_defaults_to_pinned_strategy() {
        assert!(NetmikoSsh.supports_persistent_session());
    }
}
