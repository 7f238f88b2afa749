//! REST API handlers (`spec.md` §6.1).
//!
//! Handlers translate HTTP in and out of the [`Dispatcher`]/[`AppState`];
//! business logic lives there, not here.

use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use tracing::error;

use crate::job::Operation;

use super::error::{ok, ApiError, ApiResult};
use super::state::AppState;
use super::types::*;

/// `GET /health`. Requires auth like every other endpoint (`spec.md`
/// §6.1); surfaces `Core(StoreUnavailable)` rather than a degraded body
/// if the store cannot be reached.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    state.store.scan_keys("netpulse:health-probe:").await?;
    Ok(ok(StatusCode::OK, HealthResponse { status: "ok".to_string() }))
}

/// `POST /device/execute`.
pub async fn device_execute(
    State(state): State<AppState>,
    Json(request): Json<DeviceExecuteRequest>,
) -> ApiResult<impl IntoResponse> {
    if matches!(request.operation, Operation::TestConnection) {
        return Err(ApiError::BadRequest(
            "use POST /device/test-connection for test_connection operations".to_string(),
        ));
    }
    let job = state.dispatcher.submit(request).await?;
    Ok(ok(
        StatusCode::CREATED,
        DeviceExecuteResponse {
            id: job.id,
            status: job.status,
            queue: job.queue_name,
        },
    ))
}

/// `POST /device/bulk`. Partial failure still returns `200`: each
/// request is dispatched independently (`spec.md` §4.9 step 5).
pub async fn device_bulk(
    State(state): State<AppState>,
    Json(request): Json<DeviceBulkRequest>,
) -> ApiResult<impl IntoResponse> {
    let outcome = state.dispatcher.submit_bulk(request.requests).await;
    let succeeded = outcome
        .succeeded
        .into_iter()
        .map(|job| DeviceExecuteResponse {
            id: job.id,
            status: job.status,
            queue: job.queue_name,
        })
        .collect();
    let failed = outcome
        .failed
        .into_iter()
        .map(|(host, err)| BulkFailure {
            host,
            error: err.to_string(),
        })
        .collect();
    Ok(ok(StatusCode::OK, DeviceBulkResponse { succeeded, failed }))
}

/// `POST /device/test-connection`. Served synchronously: never creates a
/// job, just times a `connect`/`disconnect` round trip.
pub async fn device_test_connection(
    State(state): State<AppState>,
    Json(request): Json<TestConnectionRequest>,
) -> ApiResult<impl IntoResponse> {
    let driver = state.drivers.get(&request.driver)?;
    let started = Instant::now();

    let response = match driver.connect(&request.connection_args).await {
        Ok(connection) => {
            let disconnect_result = driver.disconnect(connection.as_ref()).await;
            let elapsed_ms = started.elapsed().as_millis() as u64;
            match disconnect_result {
                Ok(()) => TestConnectionResponse {
                    success: true,
                    connection_time_ms: elapsed_ms,
                    error_message: None,
                },
                Err(err) => {
                    error!(host = %request.connection_args.host, error = %err, "disconnect failed after successful connect probe");
                    TestConnectionResponse {
                        success: false,
                        connection_time_ms: elapsed_ms,
                        error_message: Some(err.to_string()),
                    }
                }
            }
        }
        Err(err) => TestConnectionResponse {
            success: false,
            connection_time_ms: started.elapsed().as_millis() as u64,
            error_message: Some(err.to_string()),
        },
    };
    Ok(ok(StatusCode::OK, response))
}

/// `GET /job`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<impl IntoResponse> {
    let jobs = state.list_jobs(&query).await?;
    Ok(ok(StatusCode::OK, JobListResponse { jobs }))
}

/// `DELETE /job`. Only jobs still `queued` are cancelled; see invariant 5
/// (status monotonicity) for why a started job can't be.
pub async fn cancel_jobs(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> ApiResult<impl IntoResponse> {
    let (cancelled_count, cancelled_jobs) = state.cancel_jobs(&query).await?;
    Ok(ok(
        StatusCode::OK,
        JobCancelResponse {
            cancelled_count,
            cancelled_jobs,
        },
    ))
}

/// `GET /worker`.
pub async fn list_workers(
    State(state): State<AppState>,
    Query(query): Query<WorkerQuery>,
) -> ApiResult<impl IntoResponse> {
    let workers = state.list_workers(&query).await?;
    Ok(ok(StatusCode::OK, WorkerListResponse { workers }))
}

/// `DELETE /worker`. Only pinned workers can be remotely signalled; a
/// matched fifo worker is silently excluded from the count (see
/// `AppState::terminate_workers`).
pub async fn terminate_workers(
    State(state): State<AppState>,
    Query(query): Query<WorkerQuery>,
) -> ApiResult<impl IntoResponse> {
    let (signalled_count, signalled_workers) = state.terminate_workers(&query).await?;
    Ok(ok(
        StatusCode::OK,
        WorkerTerminateResponse {
            signalled_count,
            signalled_workers,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterRegistry;
    use crate::config::Config;
    use crate::driver::DriverRegistry;
    use crate::job::{Operation, Request, RequestOptions};
    use crate::scheduler::Greedy;
    use crate::store::memory::InMemoryStore;
    use crate::traits::ConnectionArgs;
    use axum::body::{to_bytes, Body};
    use axum::http::Request as HttpRequest;
    use axum::routing::{delete, get, post};
    use axum::Router;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let store: Arc<dyn crate::traits::SharedStore> = Arc::new(InMemoryStore::new());
        let cluster = ClusterRegistry::new(store.clone(), 30);
        let state = AppState::new(
            store,
            cluster,
            Arc::new(Greedy),
            Arc::new(DriverRegistry::with_builtins()),
            Arc::new(Config::default()),
        );
        Router::new()
            .route("/health", get(health_check))
            .route("/device/execute", post(device_execute))
            .route("/device/bulk", post(device_bulk))
            .route("/device/test-connection", post(device_test_connection))
            .route("/job", get(list_jobs).delete(cancel_jobs))
            .route("/worker", get(list_workers).delete(terminate_workers))
            .with_state(state)
    }

    fn execute_body(host: &str) -> Request {
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
                queue_strategy: Some(crate::job::QueueStrategy::Fifo),
                ttl: None,
                webhook: None,
            },
            credential_ref: None,
        }
    }

    #[tokio::test]
    async fn health_check_returns_ok_envelope() {
        let response = app()
            .oneshot(HttpRequest::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn device_execute_creates_queued_job() {
        let body = serde_json::to_vec(&execute_body("r1")).unwrap();
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/device/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["data"]["status"], "queued");
    }

    #[tokio::test]
    async fn device_execute_rejects_test_connection_operation() {
        let mut body = execute_body("r1");
        body.operation = Operation::TestConnection;
        let payload = serde_json::to_vec(&body).unwrap();
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/device/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(payload))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn device_test_connection_probes_null_driver() {
        let payload = serde_json::json!({
            "driver": crate::driver::NULL,
            "connection_args": {"host": "r1"},
        });
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/device/test-connection")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["data"]["success"], true);
    }

    #[tokio::test]
    async fn device_bulk_reports_partial_failure() {
        let payload = serde_json::json!({
            "requests": [execute_body("r1"), { "driver": "", "connection_args": {"host": ""}, "operation": {"kind": "query", "commands": []} }],
        });
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/device/bulk")
                    .header("content-type", "application/json")
                    .body(Body::from(serde_json::to_vec(&payload).unwrap()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["data"]["succeeded"].as_array().unwrap().len(), 1);
        assert_eq!(parsed["data"]["failed"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_and_cancel_job_round_trip() {
        let router = app();
        let body = serde_json::to_vec(&execute_body("r1")).unwrap();
        let create = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/device/execute")
                    .header("content-type", "application/json")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(create.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let id = parsed["data"]["id"].as_str().unwrap().to_string();

        let list = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri(format!("/job?id={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(list.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["data"]["jobs"].as_array().unwrap().len(), 1);

        let cancel = router
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri(format!("/job?id={id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let bytes = to_bytes(cancel.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["data"]["cancelled_count"], 1);
    }

    #[tokio::test]
    async fn list_workers_empty_by_default() {
        let response = app()
            .oneshot(HttpRequest::builder().uri("/worker").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed["data"]["workers"].as_array().unwrap().len(), 0);
    }
}
