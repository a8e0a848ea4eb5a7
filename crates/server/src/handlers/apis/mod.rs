mod create;
mod delete;
mod deploy;
mod details;
mod executions;
mod list;
mod stats;
mod stop;
mod update;
mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum_derive_error::ErrorResponse;
use common::storage::{self, ArtifactStore};
use db::{
    api_resource::{self, Status, Transition},
    code_artifact,
    sea_query::Expr,
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, ModelTrait,
    PrimitiveDateTime, QueryFilter, TransactionErrorExt, TransactionTrait,
};
use derive_more::{Display, Error, From};
use serde::Serialize;
use tracing::{info, warn};
use validator::ValidationError;

use crate::auth::AuthenticatedUserId;

pub(crate) fn routes() -> Router<Arc<DatabaseConnection>> {
    Router::new()
        .route("/", get(list::list).post(create::create))
        .route(
            "/:id",
            get(details::details)
                .patch(update::update)
                .delete(delete::delete),
        )
        .route(
            "/:id/upload",
            post(upload::upload).layer(DefaultBodyLimit::disable()),
        )
        .route("/:id/deploy", post(deploy::deploy))
        .route("/:id/stop", post(stop::stop))
        .route("/:id/executions", get(executions::executions))
        .route("/:id/stats", get(stats::stats))
}

/// Errors that may occur while handling API resource requests.
#[derive(ErrorResponse, Display, From, Error)]
pub(super) enum ApiResourceError {
    /// Database-related error.
    DatabaseError(DbErr),

    /// Artifact storage error.
    StorageError(storage::Error),

    /// `multipart/form-data` request handling error.
    MultipartError(axum::extract::multipart::MultipartError),

    #[status(StatusCode::NOT_FOUND)]
    #[display(fmt = "API resource not found")]
    NotFound,

    #[status(StatusCode::FORBIDDEN)]
    #[display(fmt = "API resource is owned by another user")]
    Forbidden,

    #[status(StatusCode::PRECONDITION_FAILED)]
    #[display(fmt = "code must be uploaded before deploying")]
    MissingArtifact,

    #[status(StatusCode::PRECONDITION_FAILED)]
    #[display(fmt = "unable to {} API resource with {} status", transition, status)]
    #[from(ignore)]
    TransitionNotAllowed {
        transition: Transition,
        status: Status,
    },

    #[status(StatusCode::CONFLICT)]
    #[display(fmt = "API resource was modified concurrently, reload it and retry")]
    Conflict,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "runtime cannot be changed after creation")]
    ImmutableRuntime,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "multipart field \"code\" with a file is required")]
    MissingCodeField,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "file extension must be one of .py, .js, .go, .ts")]
    UnsupportedExtension,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "file exceeds the maximum upload size of {} bytes", limit)]
    #[from(ignore)]
    FileTooLarge { limit: usize },

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "uploaded file is empty")]
    EmptyFile,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "uploaded file is not valid UTF-8 text")]
    InvalidEncoding,
}

/// Uploaded code artifact data.
#[derive(Serialize)]
pub(crate) struct CodeArtifactData {
    pub filename: String,
    pub size_bytes: i64,
    pub language_hint: String,
    pub uploaded_at: i64,
}

/// API resource data, as seen by its owner.
#[derive(Serialize)]
pub(crate) struct ApiResourceData {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub runtime: api_resource::Runtime,
    pub visibility: api_resource::Visibility,
    pub status: Status,
    pub endpoint: Option<String>,

    /// Hex-encoded hash of the current code artifact.
    pub code_artifact_ref: Option<String>,
    pub artifact: Option<CodeArtifactData>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ApiResourceData {
    pub fn new(model: api_resource::Model, artifact: Option<code_artifact::Model>) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            name: model.name,
            description: model.description,
            version: model.version,
            runtime: model.runtime,
            visibility: model.visibility,
            status: model.status,
            endpoint: model.endpoint,
            code_artifact_ref: artifact
                .as_ref()
                .map(|artifact| hex::encode(&artifact.content_hash)),
            artifact: artifact.map(|artifact| CodeArtifactData {
                filename: artifact.filename,
                size_bytes: artifact.size_bytes,
                language_hint: artifact.language_hint,
                uploaded_at: artifact.uploaded_at.assume_utc().unix_timestamp(),
            }),
            created_at: model.created_at.assume_utc().unix_timestamp(),
            updated_at: model.updated_at.assume_utc().unix_timestamp(),
        }
    }
}

/// Reject names that consist of whitespace only.
pub(super) fn non_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }

    Ok(())
}

/// Find a non-deleted API resource owned by the current user.
pub(super) async fn find_owned<C: ConnectionTrait>(
    db: &C,
    id: i64,
    current_user: AuthenticatedUserId,
) -> Result<api_resource::Model, ApiResourceError> {
    let model = api_resource::Entity::find_by_id(id)
        .filter(api_resource::Column::Status.ne(Status::Deleted))
        .one(db)
        .await?
        .ok_or(ApiResourceError::NotFound)?;

    if model.owner_id != current_user.id() {
        return Err(ApiResourceError::Forbidden);
    }

    Ok(model)
}

/// Swap the status of an API resource, if it's still the `expected` one.
///
/// Fails with [`ApiResourceError::Conflict`] otherwise, so out of two
/// concurrent transitions that observed the same status only one succeeds.
pub(super) async fn swap_status<C: ConnectionTrait>(
    db: &C,
    id: i64,
    expected: Status,
    target: Status,
    now: PrimitiveDateTime,
    clear_endpoint: bool,
) -> Result<(), ApiResourceError> {
    let mut update = api_resource::Entity::update_many()
        .col_expr(api_resource::Column::Status, Expr::value(target))
        .col_expr(api_resource::Column::UpdatedAt, Expr::value(now))
        .filter(api_resource::Column::Id.eq(id))
        .filter(api_resource::Column::Status.eq(expected));

    if clear_endpoint {
        update = update.col_expr(
            api_resource::Column::Endpoint,
            Expr::value(Option::<String>::None),
        );
    }

    if update.exec(db).await?.rows_affected == 0 {
        return Err(ApiResourceError::Conflict);
    }

    Ok(())
}

/// Apply a lifecycle transition to an API resource.
///
/// The status is swapped with [`swap_status`], so two concurrent
/// transitions of the same resource can't both succeed.
pub(super) async fn transition(
    db: &DatabaseConnection,
    storage: &ArtifactStore,
    id: i64,
    current_user: AuthenticatedUserId,
    transition: Transition,
) -> Result<ApiResourceData, ApiResourceError> {
    let (data, released_key) = db
        .transaction::<_, _, ApiResourceError>(|txn| {
            Box::pin(async move {
                let model = find_owned(txn, id, current_user).await?;

                if !transition.is_allowed_from(model.status) {
                    return Err(ApiResourceError::TransitionNotAllowed {
                        transition,
                        status: model.status,
                    });
                }

                let artifact = model.find_related(code_artifact::Entity).one(txn).await?;

                if transition == Transition::Deploy && artifact.is_none() {
                    return Err(ApiResourceError::MissingArtifact);
                }

                let now = db::now();
                let target = transition.target();

                swap_status(
                    txn,
                    id,
                    model.status,
                    target,
                    now,
                    transition == Transition::Delete,
                )
                .await?;

                let (endpoint, artifact, released_key) = match (transition, artifact) {
                    (Transition::Delete, Some(artifact)) => {
                        code_artifact::Entity::delete_by_id(artifact.id)
                            .exec(txn)
                            .await?;

                        (None, None, Some(artifact.content_key))
                    }
                    (Transition::Delete, None) => (None, None, None),
                    (_, artifact) => (model.endpoint.clone(), artifact, None),
                };

                let model = api_resource::Model {
                    status: target,
                    endpoint,
                    updated_at: now,
                    ..model
                };

                Ok((ApiResourceData::new(model, artifact), released_key))
            })
        })
        .await
        .into_raw_result()?;

    info!(id, %transition, "API resource status changed");

    if let Some(key) = released_key {
        if let Err(err) = storage.remove(&key).await {
            warn!(%err, %key, "unable to remove released code artifact");
        }
    }

    Ok(data)
}
