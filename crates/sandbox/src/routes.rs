use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_derive_error::ErrorResponse;
use common::{
    config,
    execution::{ExecutionRequest, ExecutionResult},
};
use derive_more::{Display, Error, From};
use tracing::{info, instrument};

use crate::executor::{self, Executor, ExecutorError};

/// Shared sandbox state.
pub(crate) struct SandboxState {
    /// Backend used to run programs.
    pub executor: Box<dyn Executor>,

    /// Sandbox configuration.
    pub config: Arc<config::Sandbox>,
}

/// Build the sandbox HTTP router.
pub(crate) fn router(state: Arc<SandboxState>) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_request_size);

    Router::new()
        .route("/execute", post(execute).layer(body_limit))
        .route("/health", get(health))
        .with_state(state)
}

/// Errors that may occur while handling a request.
#[derive(ErrorResponse, Display, From, Error)]
enum SandboxError {
    #[status(StatusCode::SERVICE_UNAVAILABLE)]
    #[display(fmt = "execution backend is unavailable")]
    BackendUnavailable(ExecutorError),

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "code must not be empty")]
    EmptyCode,
}

/// Run a single program.
///
/// Failing programs, timeouts and resource limit violations are all
/// successful responses, described by the returned [`ExecutionResult`].
#[instrument(skip_all)]
async fn execute(
    State(state): State<Arc<SandboxState>>,
    Json(request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResult>, SandboxError> {
    if request.code.trim().is_empty() {
        return Err(SandboxError::EmptyCode);
    }

    let timeout = executor::timeout(request.timeout_ms, &state.config);
    let result = state.executor.run(&request, timeout).await?;

    info!(
        runtime = %request.runtime,
        exit_code = ?result.exit_code,
        duration_ms = result.duration_ms,
        "execution finished"
    );

    Ok(Json(result))
}

async fn health(State(state): State<Arc<SandboxState>>) -> Result<StatusCode, SandboxError> {
    state.executor.health_check().await?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Arc, time::Duration};

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        Router,
    };
    use common::execution::{ExecutionRequest, ExecutionResult};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, SandboxState};
    use crate::executor::{tests::test_config, Executor, ExecutorError};

    /// Executor that reports the resolved timeout in the program output.
    struct EchoExecutor;

    #[async_trait]
    impl Executor for EchoExecutor {
        async fn run(
            &self,
            request: &ExecutionRequest,
            timeout: Duration,
        ) -> Result<ExecutionResult, ExecutorError> {
            Ok(ExecutionResult {
                output: Some(format!("{}:{}", request.runtime, timeout.as_millis())),
                exit_code: Some(0),
                duration_ms: 1,
                ..Default::default()
            })
        }

        async fn health_check(&self) -> Result<(), ExecutorError> {
            Ok(())
        }
    }

    /// Executor with an unreachable backend.
    struct BrokenExecutor;

    #[async_trait]
    impl Executor for BrokenExecutor {
        async fn run(
            &self,
            _: &ExecutionRequest,
            _: Duration,
        ) -> Result<ExecutionResult, ExecutorError> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
        }

        async fn health_check(&self) -> Result<(), ExecutorError> {
            Err(io::Error::from(io::ErrorKind::ConnectionRefused).into())
        }
    }

    fn app(executor: Box<dyn Executor>) -> Router {
        router(Arc::new(SandboxState {
            executor,
            config: Arc::new(test_config()),
        }))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn execute_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/execute")
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn timeout_is_clamped() {
        let (status, body) = send(
            app(Box::new(EchoExecutor)),
            execute_request(json!({ "code": "print(1)", "runtime": "python", "timeout_ms": 60_000 })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "output": "python:5000", "exit_code": 0, "duration_ms": 1 })
        );

        let (_, body) = send(
            app(Box::new(EchoExecutor)),
            execute_request(json!({ "code": "1", "runtime": "go" })),
        )
        .await;

        assert_eq!(body["output"], "go:1000");
    }

    #[tokio::test]
    async fn large_programs() {
        let code = format!("{}\nprint(1)", "#".repeat(10 * 1024 * 1024));

        let (status, body) = send(
            app(Box::new(EchoExecutor)),
            execute_request(json!({ "code": code, "runtime": "python" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["output"], "python:1000");

        let (status, _) = send(
            app(Box::new(EchoExecutor)),
            execute_request(json!({ "code": "#".repeat(17 * 1024 * 1024), "runtime": "python" })),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn malformed_requests() {
        for body in [
            json!({ "code": "", "runtime": "python" }),
            json!({ "code": "puts 1", "runtime": "ruby" }),
            json!({ "runtime": "python" }),
        ] {
            let (status, _) = send(app(Box::new(EchoExecutor)), execute_request(body)).await;

            assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[tokio::test]
    async fn backend_failures() {
        let (status, _) = send(
            app(Box::new(BrokenExecutor)),
            execute_request(json!({ "code": "print(1)", "runtime": "python" })),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = send(
            app(Box::new(BrokenExecutor)),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn healthy() {
        let (status, _) = send(
            app(Box::new(EchoExecutor)),
            Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await;

        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
