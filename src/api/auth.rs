//! Shared API-key authentication (`spec.md` §6.1: "all require auth").
//!
//! There is no session or token concept here, just a single static key the
//! operator configures via `server.api_key`; every request must carry it
//! under the `server.api_key_name` header (`X-API-KEY` by default). When no
//! key is configured the server runs open — useful for local development
//! and the integration test suite, never the production default.

use axum::extract::{Request, State};
use axum::http::HeaderName;
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::state::AppState;

/// Axum middleware: rejects the request with [`ApiError::Unauthorized`]
/// unless the configured header carries the configured key.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(expected) = state.config.server.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let header_name = HeaderName::from_bytes(state.config.server.api_key_name.as_bytes())
        .map_err(|_| ApiError::Unauthorized)?;
    let presented = request
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(key) if key == expected => Ok(next.run(request).await),
        _ => Err(ApiError::Unauthorized),
    }
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
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(api_key: Option<&str>) -> Router {
        let store: Arc<dyn crate::traits::SharedStore> = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        let mut config = Config::default();
        config.server.api_key = api_key.map(str::to_string);
        let state = AppState::new(
            store.clone(),
            cluster,
            Arc::new(Greedy),
            Arc::new(DriverRegistry::with_builtins()),
            Arc::new(config),
        );

        Router::new()
            .route("/probe", get(|| async { "ok" }))
            .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
            .with_state(state)
    }

    #[tokio::test]
    async fn rejects_missing_key_when_configured() {
        let response = app(Some("secret"))
            .oneshot(Request::builder().uri("/probe").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn accepts_matching_key() {
        let response = app(Some("secret"))
            .oneshot(
                Request::builder()
                    .uri("/probe")
                    .header("X-API-KEY", "secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn runs_open_when_no_key_configured() {
        let response = app(None)
            .oneshot(Request::builder().uri("/probe").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
