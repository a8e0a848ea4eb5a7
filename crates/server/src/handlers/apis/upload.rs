use std::sync::Arc;

use axum::{
    extract::{Multipart, Path, State},
    Extension, Json,
};
use common::{
    config::Config,
    hash,
    storage::{self, ArtifactStore},
};
use db::{
    api_resource::{self, Status},
    code_artifact,
    sea_query::Expr,
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionErrorExt, TransactionTrait,
};
use tracing::{info, warn};

use super::{find_owned, ApiResourceData, ApiResourceError};
use crate::auth::AuthenticatedUserId;

/// Multipart field that carries the uploaded file.
const CODE_FIELD: &str = "code";

/// Upload a source code file for an API resource.
///
/// The uploaded file supersedes the current code artifact, if any.
/// Upload never changes the resource status.
pub(super) async fn upload(
    Extension(current_user): Extension<AuthenticatedUserId>,
    Extension(config): Extension<Arc<Config>>,
    Extension(storage): Extension<Arc<ArtifactStore>>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<ApiResourceData>, ApiResourceError> {
    find_owned(&*db, id, current_user).await?;

    let limit = config
        .server
        .as_ref()
        .map(|server| server.max_upload_size)
        .unwrap_or(code_artifact::MAX_SIZE);

    let mut field = loop {
        let field = multipart
            .next_field()
            .await?
            .ok_or(ApiResourceError::MissingCodeField)?;

        if field.name() == Some(CODE_FIELD) {
            break field;
        }
    };

    let filename = field
        .file_name()
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .filter(|name| !name.is_empty())
        .ok_or(ApiResourceError::MissingCodeField)?
        .to_string();

    let language_hint =
        code_artifact::language_hint(&filename).ok_or(ApiResourceError::UnsupportedExtension)?;

    let mut contents = Vec::new();

    while let Some(chunk) = field.chunk().await? {
        if contents.len() + chunk.len() > limit {
            return Err(ApiResourceError::FileTooLarge { limit });
        }

        contents.extend_from_slice(&chunk);
    }

    if contents.is_empty() {
        return Err(ApiResourceError::EmptyFile);
    }

    if std::str::from_utf8(&contents).is_err() {
        return Err(ApiResourceError::InvalidEncoding);
    }

    let size_bytes = contents.len() as i64;
    let content_hash = hash::blake2(&contents).to_vec();
    let content_key = storage::artifact_key(id, &filename);

    storage.put(&content_key, contents).await?;

    let new_key = content_key.clone();

    let result = db
        .transaction::<_, _, ApiResourceError>(|txn| {
            Box::pin(async move {
                let now = db::now();

                // Locks the resource row until the artifact is replaced.
                let touched = api_resource::Entity::update_many()
                    .col_expr(api_resource::Column::UpdatedAt, Expr::value(now))
                    .filter(api_resource::Column::Id.eq(id))
                    .filter(api_resource::Column::Status.ne(Status::Deleted))
                    .exec(txn)
                    .await?;

                if touched.rows_affected == 0 {
                    return Err(ApiResourceError::NotFound);
                }

                let model = api_resource::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or(ApiResourceError::NotFound)?;

                let previous = code_artifact::Entity::find()
                    .filter(code_artifact::Column::ApiId.eq(id))
                    .one(txn)
                    .await?;

                let mut artifact = code_artifact::ActiveModel {
                    api_id: ActiveValue::Set(id),
                    filename: ActiveValue::Set(filename),
                    size_bytes: ActiveValue::Set(size_bytes),
                    language_hint: ActiveValue::Set(language_hint.to_string()),
                    content_hash: ActiveValue::Set(content_hash),
                    content_key: ActiveValue::Set(content_key),
                    uploaded_at: ActiveValue::Set(now),
                    ..Default::default()
                };

                let (artifact, previous_key) = match previous {
                    Some(previous) => {
                        artifact.id = ActiveValue::Unchanged(previous.id);
                        (artifact.update(txn).await?, Some(previous.content_key))
                    }
                    None => (artifact.insert(txn).await?, None),
                };

                Ok((ApiResourceData::new(model, Some(artifact)), previous_key))
            })
        })
        .await
        .into_raw_result();

    let (data, previous_key) = match result {
        Ok(result) => result,
        Err(err) => {
            if let Err(err) = storage.remove(&new_key).await {
                warn!(%err, key = %new_key, "unable to remove orphaned code artifact");
            }

            return Err(err);
        }
    };

    info!(id, size_bytes, "code artifact uploaded");

    if let Some(key) = previous_key {
        if let Err(err) = storage.remove(&key).await {
            warn!(%err, %key, "unable to remove superseded code artifact");
        }
    }

    Ok(Json(data))
}
