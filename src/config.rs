//! Configuration module for NetPulse.
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - System configuration (`/etc/netpulse/netpulse.toml`)
//! - User configuration (`~/.netpulse.toml`)
//! - Project configuration (`./netpulse.toml`)
//! - Environment variables (`NETPULSE_*`)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure, matching `§6.5` of the design exactly:
/// `job`, `worker`, `store`, `plugin`, `server`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Default job lifetimes.
    pub job: JobConfig,

    /// Worker/scheduler/capacity settings.
    pub worker: WorkerConfig,

    /// Shared store connection parameters.
    pub store: StoreConfig,

    /// Plugin directory paths consumed by the registries at boot.
    pub plugin: PluginConfig,

    /// REST API server settings.
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            job: JobConfig::default(),
            worker: WorkerConfig::default(),
            store: StoreConfig::default(),
            plugin: PluginConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

/// Default lifetimes for submitted jobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// How long a queued job may wait before it is reaped as expired.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Per-job execution deadline once a worker picks it up.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// How long a finished job's result stays retrievable via `GET /job`.
    #[serde(with = "humantime_serde")]
    pub result_ttl: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(300),
            timeout: Duration::from_secs(60),
            result_ttl: Duration::from_secs(3600),
        }
    }
}

/// Worker, scheduler, and node capacity settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Name of the active scheduler plugin (`greedy`, `least_load`,
    /// `least_load_random`, `load_weighted_random`).
    pub scheduler: String,

    /// Node heartbeat expiry; a node missing this many seconds of
    /// heartbeats is considered dead by the ClusterRegistry.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,

    /// Per-node pinned worker capacity.
    pub pinned_per_node: u32,

    /// Interval between a PinnedSession's keepalive probes.
    #[serde(with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// How long the Dispatcher waits for a `SpawnPinned` reply before
    /// treating the attempt as failed.
    #[serde(with = "humantime_serde")]
    pub spawn_timeout: Duration,

    /// Number of bind/spawn retries the Dispatcher attempts before
    /// surfacing `WorkerUnavailable`.
    pub spawn_retries: u32,

    /// How often a `NodeSupervisor` publishes its `NodeInfo` heartbeat.
    /// Must stay at or below `ttl / 3` per `spec.md` §4.6.
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,

    /// How long a `NodeSupervisor` waits for draining children to finish
    /// their current job before force-killing them.
    #[serde(with = "humantime_serde")]
    pub drain_timeout: Duration,

    /// Directory holding the per-host singleton lock files used by
    /// `NodeSupervisor` and `FifoWorker` to enforce "at most one active
    /// instance per host" (`spec.md` §4.6, §4.8).
    pub lock_dir: PathBuf,

    /// Number of concurrent job-executing tasks a single `FifoWorker`
    /// instance forks internally (`spec.md` §4.8 leaves the concurrency
    /// mechanism to implementation freedom).
    pub fifo_concurrency: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scheduler: "least_load".to_string(),
            ttl: Duration::from_secs(30),
            pinned_per_node: 64,
            keepalive_interval: Duration::from_secs(30),
            spawn_timeout: Duration::from_secs(10),
            spawn_retries: 3,
            heartbeat_interval: Duration::from_secs(10),
            drain_timeout: Duration::from_secs(30),
            lock_dir: PathBuf::from("/var/run/netpulse"),
            fifo_concurrency: 8,
        }
    }
}

/// Which `SharedStore` implementation a process boots against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// The Redis-backed production implementation.
    Redis,
    /// The in-process fake, for local demos and single-process testing;
    /// state does not survive past the process and isn't shared across
    /// the fleet, so every process role must point at the same one to
    /// cooperate (`cargo run -- serve` plus `node-worker` in one process
    /// tree, for instance).
    Memory,
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Redis
    }
}

/// Connection parameters to the shared store backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Which `SharedStore` implementation to use.
    pub backend: StoreBackend,

    /// Store host.
    pub host: String,

    /// Store port.
    pub port: u16,

    /// Optional password/credential.
    pub password: Option<String>,

    /// Whether to connect over TLS.
    pub tls: bool,

    /// Optional sentinel master name, when running against Redis
    /// Sentinel instead of a single node.
    pub sentinel: Option<String>,

    /// Logical database index.
    pub db: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            tls: false,
            sentinel: None,
            db: 0,
        }
    }
}

impl StoreConfig {
    /// Builds a `redis://` connection URL from the configured parameters.
    pub fn connection_url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        match &self.password {
            Some(pw) => format!(
                "{scheme}://:{pw}@{host}:{port}/{db}",
                scheme = scheme,
                pw = pw,
                host = self.host,
                port = self.port,
                db = self.db
            ),
            None => format!(
                "{scheme}://{host}:{port}/{db}",
                scheme = scheme,
                host = self.host,
                port = self.port,
                db = self.db
            ),
        }
    }
}

/// Plugin directory paths consumed by the DriverRegistry/SchedulerRegistry
/// at process boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginConfig {
    /// Extra directories searched for driver plugins.
    pub driver: Vec<PathBuf>,

    /// Extra directories searched for scheduler plugins.
    pub scheduler: Vec<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            driver: vec![],
            scheduler: vec![],
        }
    }
}

/// REST API server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the API server binds to.
    pub bind: String,

    /// Shared API key clients must present.
    pub api_key: Option<String>,

    /// Header name the API key is read from.
    pub api_key_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            api_key: None,
            api_key_name: "X-API-KEY".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources: an explicit path if given,
    /// otherwise the standard search locations, then `NETPULSE_*`
    /// environment variable overrides.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Config::default();

        for path in Self::config_paths(config_path) {
            if path.exists() {
                config = config.merge_from_file(&path)?;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration, falling back to defaults (with a logged
    /// warning) if no source could be read or parsed.
    pub fn load_or_default(config_path: Option<&PathBuf>) -> Self {
        match Self::load(config_path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load configuration, using defaults");
                Config::default()
            }
        }
    }

    fn config_paths(explicit_path: Option<&PathBuf>) -> Vec<PathBuf> {
        if let Some(path) = explicit_path {
            return vec![path.clone()];
        }

        let mut paths = Vec::new();
        paths.push(PathBuf::from("/etc/netpulse/netpulse.toml"));
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".netpulse.toml"));
            paths.push(home.join(".netpulse/config.toml"));
        }
        paths.push(PathBuf::from("netpulse.toml"));

        if let Ok(env_path) = std::env::var("NETPULSE_CONFIG") {
            paths.insert(0, PathBuf::from(env_path));
        }

        paths
    }

    fn merge_from_file(self, path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let file_config: Config = match extension {
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?,
        };

        Ok(file_config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("NETPULSE_JOB_TTL") {
            if let Ok(secs) = v.parse() {
                self.job.ttl = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("NETPULSE_JOB_TIMEOUT") {
            if let Ok(secs) = v.parse() {
                self.job.timeout = Duration::from_secs(secs);
            }
        }
        if let Ok(v) = std::env::var("NETPULSE_WORKER_SCHEDULER") {
            self.worker.scheduler = v;
        }
        if let Ok(v) = std::env::var("NETPULSE_WORKER_PINNED_PER_NODE") {
            if let Ok(n) = v.parse() {
                self.worker.pinned_per_node = n;
            }
        }
        if let Ok(v) = std::env::var("NETPULSE_WORKER_FIFO_CONCURRENCY") {
            if let Ok(n) = v.parse() {
                self.worker.fifo_concurrency = n;
            }
        }
        if let Ok(v) = std::env::var("NETPULSE_STORE_BACKEND") {
            if v.eq_ignore_ascii_case("memory") {
                self.store.backend = StoreBackend::Memory;
            } else if v.eq_ignore_ascii_case("redis") {
                self.store.backend = StoreBackend::Redis;
            }
        }
        if let Ok(v) = std::env::var("NETPULSE_STORE_HOST") {
            self.store.host = v;
        }
        if let Ok(v) = std::env::var("NETPULSE_STORE_PORT") {
            if let Ok(p) = v.parse() {
                self.store.port = p;
            }
        }
        if let Ok(v) = std::env::var("NETPULSE_STORE_PASSWORD") {
            self.store.password = Some(v);
        }
        if let Ok(v) = std::env::var("NETPULSE_SERVER_BIND") {
            self.server.bind = v;
        }
        if let Ok(v) = std::env::var("NETPULSE_SERVER_API_KEY") {
            self.server.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("NETPULSE_SERVER_API_KEY_NAME") {
            self.server.api_key_name = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.worker.keepalive_interval, Duration::from_secs(30));
        assert_eq!(config.worker.spawn_timeout, Duration::from_secs(10));
        assert_eq!(config.worker.spawn_retries, 3);
        assert_eq!(config.worker.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.worker.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.worker.fifo_concurrency, 8);
        assert_eq!(config.server.api_key_name, "X-API-KEY");
    }

    #[test]
    fn store_connection_url_without_password() {
        let store = StoreConfig::default();
        assert_eq!(store.connection_url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn store_backend_defaults_to_redis() {
        assert_eq!(StoreConfig::default().backend, StoreBackend::Redis);
    }

    #[test]
    fn store_connection_url_with_password_and_tls() {
        let store = StoreConfig {
            password: Some("secret".to_string()),
            tls: true,
            ..StoreConfig::default()
        };
        assert_eq!(store.connection_url(), "rediss://:secret@127.0.0.1:6379/0");
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let config = Config::load_or_default(Some(&PathBuf::from("/nonexistent/netpulse.toml")));
        assert_eq!(config.worker.scheduler, "least_load");
    }
}
