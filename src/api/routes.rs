//! REST API route table (`spec.md` §6.1): every endpoint requires auth,
//! including `GET /health`.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use super::auth::require_api_key;
use super::handlers;
use super::state::AppState;

/// Builds the full router over `state`, with [`require_api_key`] applied
/// to every route.
pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/device/execute", post(handlers::device_execute))
        .route("/device/bulk", post(handlers::device_bulk))
        .route("/device/test-connection", post(handlers::device_test_connection))
        .route("/job", get(handlers::list_jobs).delete(handlers::cancel_jobs))
        .route("/worker", get(handlers::list_workers).delete(handlers::terminate_workers))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterRegistry;
    use crate::config::Config;
    use crate::driver::DriverRegistry;
    use crate::scheduler::Greedy;
    use crate::store::memory::InMemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let store: Arc<dyn crate::traits::SharedStore> = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        AppState::new(
            store,
            cluster,
            Arc::new(Greedy),
            Arc::new(DriverRegistry::with_builtins()),
            Arc::new(Config::default()),
        )
    }

    #[tokio::test]
    async fn health_requires_auth_when_key_configured() {
        let mut config = Config::default();
        config.server.api_key = Some("secret".to_string());
        let store: Arc<dyn crate::traits::SharedStore> = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        let state = AppState::new(
            store,
            cluster,
            Arc::new(Greedy),
            Arc::new(DriverRegistry::with_builtins()),
            Arc::new(config),
        );

        let response = api_routes(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn health_is_open_with_no_key_configured() {
        let response = api_routes(state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
