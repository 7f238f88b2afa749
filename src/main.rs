//! `netpulse` — single binary, one subcommand per process role
//! (`SPEC_FULL.md` §SUPPLEMENT.1).
//!
//! - `netpulse serve` — the REST API server (Dispatcher front end).
//! - `netpulse node-worker` — a `NodeSupervisor` daemon for the local host.
//! - `netpulse pinned-worker` — a single `PinnedWorker` process; this is
//!   the subcommand a `NodeSupervisor` forks into as a child.
//! - `netpulse fifo-worker` — a `FifoWorker` instance.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use netpulse::api::ApiServer;
use netpulse::cluster::ClusterRegistry;
use netpulse::config::{Config, StoreBackend};
use netpulse::driver::DriverRegistry;
use netpulse::error::{Error, Result};
use netpulse::fifo_worker::FifoWorker;
use netpulse::pinned_worker::PinnedWorker;
use netpulse::scheduler;
use netpulse::store::{InMemoryStore, RedisStore};
use netpulse::supervisor::NodeSupervisor;
use netpulse::telemetry;
use netpulse::traits::SharedStore;

/// NetPulse: a distributed control plane for large network device fleets.
#[derive(Parser)]
#[command(name = "netpulse", version, about, long_about = None)]
struct Cli {
    /// Path to a config file. Defaults to the standard search locations
    /// (`/etc/netpulse/netpulse.toml`, `~/.netpulse.toml`, `./netpulse.toml`).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity; repeatable (`-v`, `-vv`, `-vvv`).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server (`spec.md` §6.1).
    Serve,

    /// Run a `NodeSupervisor` daemon for this host (`spec.md` §4.6).
    NodeWorker {
        /// Unique id for this node. Defaults to the local hostname.
        #[arg(long)]
        node_id: Option<String>,

        /// Maximum concurrent pinned workers this node will host.
        /// Defaults to `worker.pinned_per_node` from configuration.
        #[arg(long)]
        capacity: Option<u32>,
    },

    /// Run a single `PinnedWorker` process bound to one device host
    /// (`spec.md` §4.7). Forked by a `NodeSupervisor`; not normally
    /// invoked directly.
    PinnedWorker {
        /// Device host this worker serially executes jobs for.
        #[arg(long)]
        host: String,

        /// Pinned queue name to pop jobs from.
        #[arg(long)]
        queue: String,

        /// Id of the node supervisor that forked this worker.
        #[arg(long)]
        node_id: String,

        /// Correlates this fork back to the `SpawnPinned` request that
        /// created it; carried for diagnostics only, the worker itself
        /// does not reply on the control channel.
        #[arg(long)]
        request_id: String,
    },

    /// Run a `FifoWorker` instance for this host (`spec.md` §4.8).
    FifoWorker {
        /// Number of concurrent job-claiming tasks. Defaults to
        /// `worker.fifo_concurrency` from configuration.
        #[arg(long)]
        concurrency: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    telemetry::logging::init_from_verbosity(cli.verbose)
        .unwrap_or_else(|err| eprintln!("warning: failed to initialize logging: {err}"));

    let config = Arc::new(Config::load_or_default(cli.config.as_ref()));

    let result = match cli.command {
        Commands::Serve => run_serve(config).await,
        Commands::NodeWorker { node_id, capacity } => run_node_worker(config, node_id, capacity).await,
        Commands::PinnedWorker {
            host,
            queue,
            node_id,
            request_id,
        } => run_pinned_worker(config, host, queue, node_id, request_id).await,
        Commands::FifoWorker { concurrency } => run_fifo_worker(config, concurrency).await,
    };

    if let Err(err) = &result {
        error!(error = %err, "netpulse exited with an error");
    }
    result.map_err(Into::into)
}

/// Builds the `SharedStore` backend selected by `config.store.backend`.
async fn build_store(config: &Config) -> Result<Arc<dyn SharedStore>> {
    match config.store.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryStore::new())),
        StoreBackend::Redis => {
            let store = RedisStore::connect(&config.store.connection_url()).await?;
            Ok(Arc::new(store))
        }
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

async fn run_serve(config: Arc<Config>) -> Result<()> {
    let store = build_store(&config).await?;
    let cluster = ClusterRegistry::new(store.clone(), config.worker.ttl.as_secs());
    let schedule = scheduler::build(&config.worker.scheduler)?;
    let drivers = Arc::new(DriverRegistry::with_builtins());

    let server = ApiServer::new(config, store, cluster, Arc::from(schedule), drivers)?;
    server.run().await.map_err(Error::Io)
}

async fn run_node_worker(config: Arc<Config>, node_id: Option<String>, capacity: Option<u32>) -> Result<()> {
    let store = build_store(&config).await?;
    let cluster = ClusterRegistry::new(store.clone(), config.worker.ttl.as_secs());
    let hostname = local_hostname();
    let node_id = node_id.unwrap_or_else(|| hostname.clone());
    let capacity = capacity.unwrap_or(config.worker.pinned_per_node);
    let binary = std::env::current_exe().map_err(Error::Io)?;

    info!(node_id = %node_id, capacity, "starting node supervisor");
    let supervisor = NodeSupervisor::start(
        node_id,
        hostname,
        store,
        cluster,
        capacity,
        config.worker.heartbeat_interval,
        config.worker.spawn_timeout,
        config.worker.drain_timeout,
        &config.worker.lock_dir,
        binary,
    )?;
    supervisor.run().await
}

async fn run_pinned_worker(
    config: Arc<Config>,
    host: String,
    queue: String,
    node_id: String,
    request_id: String,
) -> Result<()> {
    let store = build_store(&config).await?;
    let cluster = ClusterRegistry::new(store.clone(), config.worker.ttl.as_secs());
    let drivers = Arc::new(DriverRegistry::with_builtins());

    info!(host = %host, queue = %queue, node_id = %node_id, request_id = %request_id, "starting pinned worker");
    let worker = PinnedWorker::new(host, queue, node_id, store, cluster, drivers);
    worker.run().await
}

async fn run_fifo_worker(config: Arc<Config>, concurrency: Option<u32>) -> Result<()> {
    let store = build_store(&config).await?;
    let drivers = Arc::new(DriverRegistry::with_builtins());
    let concurrency = concurrency.unwrap_or(config.worker.fifo_concurrency);

    let worker = FifoWorker::start(&config.worker.lock_dir, concurrency, store, drivers)?;
    worker.run().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_serve_subcommand() {
        let cli = Cli::parse_from(["netpulse", "serve"]);
        assert!(matches!(cli.command, Commands::Serve));
    }

    #[test]
    fn cli_parses_pinned_worker_subcommand_with_args() {
        let cli = Cli::parse_from([
            "netpulse",
            "pinned-worker",
            "--host",
            "10.0.0.1",
            "--queue",
            "netpulse:queue:pinned:10.0.0.1",
            "--node-id",
            "node-a",
            "--request-id",
            "req-1",
        ]);
        match cli.command {
            Commands::PinnedWorker {
                host,
                queue,
                node_id,
                request_id,
            } => {
                assert_eq!(host, "10.0.0.1");
                assert_eq!(queue, "netpulse:queue:pinned:10.0.0.1");
                assert_eq!(node_id, "node-a");
                assert_eq!(request_id, "req-1");
            }
            _ => panic!("expected PinnedWorker subcommand"),
        }
    }

    #[test]
    fn cli_parses_verbosity_flags() {
        let cli = Cli::parse_from(["netpulse", "-vv", "node-worker"]);
        assert_eq!(cli.verbose, 2);
    }
}
