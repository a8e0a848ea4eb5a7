use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Extension, Json,
};
use common::{
    config::Config,
    execution::{ExecutionRequest, ExecutionResult},
    storage::ArtifactStore,
};
use db::{
    api_resource::{self, Status, Visibility},
    code_artifact, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{run_recorded, Caller, ExecutionError};
use crate::{
    api_key,
    sandbox::{effective_timeout, SandboxClient},
};

#[derive(Default, Deserialize)]
pub(crate) struct InvocationRequest {
    /// JSON input passed to the program.
    #[serde(default)]
    input: Option<Value>,

    /// Requested wall-clock limit, in milliseconds.
    #[serde(default)]
    timeout_ms: Option<u64>,
}

/// Invoke a deployed API resource through its public endpoint.
///
/// Public resources are open to anyone. Paid resources require a usable API key
/// scoped to the resource, unless the key is owned by the resource owner.
/// Private resources accept only keys owned by the resource owner.
pub(crate) async fn invoke(
    Extension(config): Extension<Arc<Config>>,
    Extension(storage): Extension<Arc<ArtifactStore>>,
    Extension(sandbox): Extension<SandboxClient>,
    State(db): State<Arc<DatabaseConnection>>,
    Path((id, slug)): Path<(i64, String)>,
    headers: HeaderMap,
    body: Option<Json<InvocationRequest>>,
) -> Result<Json<ExecutionResult>, ExecutionError> {
    let Json(request) = body.unwrap_or_default();

    let model = api_resource::Entity::find_by_id(id)
        .filter(api_resource::Column::Status.eq(Status::Deployed))
        .filter(api_resource::Column::Endpoint.eq(format!("/execute/{id}/{slug}")))
        .one(&*db)
        .await?
        .ok_or(ExecutionError::EndpointNotFound)?;

    let mut caller = Caller {
        api_id: Some(model.id),
        user_id: None,
    };

    if model.visibility != Visibility::Public {
        let presented = api_key::presented_key(&headers).ok_or(ExecutionError::InvalidApiKey)?;

        let key = api_key::verify(&*db, presented)
            .await?
            .ok_or(ExecutionError::InvalidApiKey)?;

        let owned = key.user_id == model.owner_id;

        let allowed = match model.visibility {
            Visibility::Paid => {
                key.api_id == Some(model.id) || (owned && key.is_scoped_to(model.id))
            }
            _ => owned && key.is_scoped_to(model.id),
        };

        if !allowed {
            debug!(api_id = id, key_id = key.id, "API key rejected");
            return Err(ExecutionError::Forbidden);
        }

        caller.user_id = Some(key.user_id);
    }

    let artifact = model
        .find_related(code_artifact::Entity)
        .one(&*db)
        .await?
        .ok_or(ExecutionError::EndpointNotFound)?;

    let code = String::from_utf8(storage.get(&artifact.content_key).await?)
        .map_err(|_| ExecutionError::CorruptedArtifact)?;

    let timeout_ms = config
        .server
        .as_ref()
        .map(|server| effective_timeout(request.timeout_ms, server))
        .or(request.timeout_ms);

    info!(api_id = id, runtime = ?model.runtime, "invoking API");

    let request = ExecutionRequest {
        code,
        runtime: model.runtime.into(),
        input: request.input,
        timeout_ms,
    };

    Ok(Json(run_recorded(&db, &sandbox, &request, caller).await?))
}
