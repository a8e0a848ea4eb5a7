use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use common::{
    config::Config,
    execution::{ExecutionRequest, ExecutionResult},
};
use db::{code_artifact, DatabaseConnection};
use tracing::info;

use super::{run_recorded, Caller, ExecutionError};
use crate::{
    auth::AuthenticatedUserId,
    sandbox::{effective_timeout, SandboxClient},
};

/// Run ad-hoc code in the execution sandbox.
///
/// The result is returned as is, so a program that exits with a non-zero
/// code is still a successful response.
pub(crate) async fn execute(
    Extension(current_user): Extension<AuthenticatedUserId>,
    Extension(config): Extension<Arc<Config>>,
    Extension(sandbox): Extension<SandboxClient>,
    State(db): State<Arc<DatabaseConnection>>,
    Json(mut request): Json<ExecutionRequest>,
) -> Result<Json<ExecutionResult>, ExecutionError> {
    let server = config.server.as_ref();
    let limit = server.map_or(code_artifact::MAX_SIZE, |server| server.max_upload_size);

    if request.code.trim().is_empty() {
        return Err(ExecutionError::EmptyCode);
    }

    if request.code.len() > limit {
        return Err(ExecutionError::CodeTooLarge { limit });
    }

    if let Some(server) = server {
        request.timeout_ms = Some(effective_timeout(request.timeout_ms, server));
    }

    info!(user_id = current_user.id(), runtime = %request.runtime, "running test execution");

    let caller = Caller {
        api_id: None,
        user_id: Some(current_user.id()),
    };

    Ok(Json(run_recorded(&db, &sandbox, &request, caller).await?))
}
