mod invoke;
mod sandbox;

use std::time::Instant;

use axum::http::StatusCode;
use axum_derive_error::ErrorResponse;
use common::{
    execution::{ExecutionRequest, ExecutionResult},
    storage,
};
use db::{execution, ActiveValue, DatabaseConnection, DbErr, EntityTrait};
use derive_more::{Display, Error, From};
use tracing::warn;

use crate::sandbox::SandboxClient;

pub(crate) use invoke::invoke;
pub(crate) use sandbox::execute;

/// Errors that may occur while running code.
#[derive(ErrorResponse, Display, From, Error)]
pub(super) enum ExecutionError {
    /// Database-related error.
    DatabaseError(DbErr),

    /// Artifact storage error.
    StorageError(storage::Error),

    /// Stored artifact is not valid UTF-8.
    #[display(fmt = "stored code artifact is corrupted")]
    CorruptedArtifact,

    #[status(StatusCode::SERVICE_UNAVAILABLE)]
    #[display(fmt = "execution sandbox is unavailable")]
    #[from(ignore)]
    SandboxUnavailable(crate::sandbox::Error),

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "execution request was rejected by the sandbox")]
    #[from(ignore)]
    SandboxRejected(crate::sandbox::Error),

    #[status(StatusCode::NOT_FOUND)]
    #[display(fmt = "API endpoint not found")]
    EndpointNotFound,

    #[status(StatusCode::UNAUTHORIZED)]
    #[display(fmt = "valid API key is required")]
    InvalidApiKey,

    #[status(StatusCode::FORBIDDEN)]
    #[display(fmt = "API key does not grant access to this API")]
    Forbidden,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "code exceeds the maximum size of {} bytes", limit)]
    #[from(ignore)]
    CodeTooLarge { limit: usize },

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "code must not be empty")]
    EmptyCode,
}

impl From<crate::sandbox::Error> for ExecutionError {
    fn from(err: crate::sandbox::Error) -> Self {
        if err.is_unavailable() {
            ExecutionError::SandboxUnavailable(err)
        } else {
            ExecutionError::SandboxRejected(err)
        }
    }
}

/// Caller of a recorded execution.
#[derive(Copy, Clone)]
pub(super) struct Caller {
    pub api_id: Option<i64>,
    pub user_id: Option<i64>,
}

/// Run the request in the sandbox and record its outcome.
///
/// A failure to record the execution is logged and doesn't affect the response.
pub(super) async fn run_recorded(
    db: &DatabaseConnection,
    sandbox: &SandboxClient,
    request: &ExecutionRequest,
    caller: Caller,
) -> Result<ExecutionResult, ExecutionError> {
    let started_at = Instant::now();
    let outcome = sandbox.execute(request).await.map_err(ExecutionError::from);
    let elapsed_ms = started_at.elapsed().as_millis() as u64;

    let request_size = request.code.len()
        + request
            .input
            .as_ref()
            .map_or(0, |input| input.to_string().len());

    let (status_code, exit_code, duration_ms, response_size, error) = match &outcome {
        Ok(result) => (
            StatusCode::OK,
            result.exit_code,
            result.duration_ms,
            result.output.as_ref().map_or(0, String::len)
                + result.error.as_ref().map_or(0, String::len),
            result.error.clone(),
        ),
        Err(err @ ExecutionError::SandboxRejected(_)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            None,
            elapsed_ms,
            0,
            Some(err.to_string()),
        ),
        Err(err) => (
            StatusCode::SERVICE_UNAVAILABLE,
            None,
            elapsed_ms,
            0,
            Some(err.to_string()),
        ),
    };

    let record = execution::ActiveModel {
        api_id: ActiveValue::Set(caller.api_id),
        user_id: ActiveValue::Set(caller.user_id),
        status_code: ActiveValue::Set(status_code.as_u16().into()),
        exit_code: ActiveValue::Set(exit_code),
        duration_ms: ActiveValue::Set(duration_ms as i64),
        request_size: ActiveValue::Set(request_size as i64),
        response_size: ActiveValue::Set(response_size as i64),
        error: ActiveValue::Set(error),
        created_at: ActiveValue::Set(db::now()),
        ..Default::default()
    };

    if let Err(err) = execution::Entity::insert(record)
        .exec_without_returning(db)
        .await
    {
        warn!(%err, api_id = ?caller.api_id, "unable to record execution");
    }

    outcome
}
