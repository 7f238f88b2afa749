//! REST API server (`spec.md` §6.1): one HTTP surface over the
//! Dispatcher, ClusterRegistry, and SharedStore, API-key authenticated.
//!
//! # Endpoints
//!
//! - `POST /device/execute` — submit one request, returns a job id
//! - `POST /device/bulk` — submit many requests in one call
//! - `POST /device/test-connection` — synchronous connect probe
//! - `GET /job`, `DELETE /job` — query and cancel jobs
//! - `GET /worker`, `DELETE /worker` — query and terminate workers
//! - `GET /health` — liveness probe

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;
pub mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::cluster::ClusterRegistry;
use crate::config::Config;
use crate::driver::DriverRegistry;
use crate::error::{Error, Result};
use crate::traits::{Scheduler, SharedStore};

pub use error::{ApiError, ApiResult};
pub use state::AppState;

/// The REST API server process: owns the listener and the router built
/// from a fully-assembled [`AppState`].
pub struct ApiServer {
    bind: SocketAddr,
    state: AppState,
}

impl ApiServer {
    /// Assembles the server's `AppState` from its components and the
    /// configured bind address.
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn SharedStore>,
        cluster: ClusterRegistry,
        scheduler: Arc<dyn Scheduler>,
        drivers: Arc<DriverRegistry>,
    ) -> Result<Self> {
        let bind: SocketAddr = config
            .server
            .bind
            .parse()
            .map_err(|e| Error::Config(format!("invalid server.bind '{}': {e}", config.server.bind)))?;
        let state = AppState::new(store, cluster, scheduler, drivers, config);
        Ok(Self { bind, state })
    }

    /// Builds the axum router: the full route table plus an HTTP tracing
    /// layer (`spec.md` §6.1's auth requirement is applied per-route in
    /// [`routes::api_routes`], not here).
    pub fn router(&self) -> axum::Router {
        routes::api_routes(self.state.clone()).layer(TraceLayer::new_for_http())
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> std::io::Result<()> {
        let router = self.router();
        info!(bind = %self.bind, "starting netpulse API server");
        let listener = TcpListener::bind(self.bind).await?;
        axum::serve(listener, router).await
    }

    /// Runs the server until `shutdown` resolves.
    pub async fn run_with_shutdown(self, shutdown: impl std::future::Future<Output = ()>) -> std::io::Result<()> {
        let router = self.router();
        info!(bind = %self.bind, "starting netpulse API server");
        let listener = TcpListener::bind(self.bind).await?;
        axum::serve(listener, router).with_graceful_shutdown(shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Greedy;
    use crate::store::memory::InMemoryStore;

    #[test]
    fn rejects_unparsable_bind_address() {
        let mut config = Config::default();
        config.server.bind = "not-an-address".to_string();
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        let result = ApiServer::new(
            Arc::new(config),
            store,
            cluster,
            Arc::new(Greedy),
            Arc::new(DriverRegistry::with_builtins()),
        );
        assert!(result.is_err());
    }
}
