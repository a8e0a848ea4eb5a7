use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use db::{
    api_key,
    api_resource::{self, Status, Visibility},
    ActiveValue, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect,
    SelectExt, TransactionErrorExt, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use super::{ApiKeyData, ApiKeyError};
use crate::{auth::AuthenticatedUserId, validation::ValidatedJson};

#[derive(Deserialize, Validate)]
pub(super) struct ApiKeyCreateRequest {
    #[validate(length(min = 1, max = 100))]
    name: String,

    /// API resource that the key is scoped to.
    api_id: Option<i64>,

    /// Expiration time, as a unix timestamp.
    expires_at: Option<i64>,
}

/// Created API key, including its plaintext secret.
#[derive(Serialize)]
pub(super) struct ApiKeyCreateResponse {
    #[serde(flatten)]
    data: ApiKeyData,

    /// Plaintext secret, returned only once.
    key: String,
}

/// Issue a new API key.
///
/// The plaintext secret is a part of this response only, and can't
/// be retrieved later.
pub(super) async fn create(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    ValidatedJson(request): ValidatedJson<ApiKeyCreateRequest>,
) -> Result<(StatusCode, Json<ApiKeyCreateResponse>), ApiKeyError> {
    let now = db::now();

    let expires_at = match request.expires_at {
        Some(timestamp) => Some(
            api_key::timestamp_to_datetime(timestamp)
                .filter(|expires_at| *expires_at > now)
                .ok_or(ApiKeyError::InvalidExpiration)?,
        ),
        None => None,
    };

    let secret = api_key::generate_secret();

    let model = api_key::ActiveModel {
        user_id: ActiveValue::Set(current_user.id()),
        api_id: ActiveValue::Set(request.api_id),
        name: ActiveValue::Set(request.name),
        secret_hash: ActiveValue::Set(api_key::secret_hash(&secret)),
        masked: ActiveValue::Set(api_key::mask(&secret)),
        is_active: ActiveValue::Set(true),
        expires_at: ActiveValue::Set(expires_at),
        created_at: ActiveValue::Set(now),
        ..Default::default()
    };

    let model = db
        .transaction::<_, _, ApiKeyError>(|txn| {
            Box::pin(async move {
                // Only own resources and the ones listed in the marketplace can be
                // used as a scope, other private resources are reported as missing.
                if let Some(api_id) = request.api_id {
                    let api_exists = api_resource::Entity::find_by_id(api_id)
                        .select_only()
                        .filter(api_resource::Column::Status.ne(Status::Deleted))
                        .filter(
                            Condition::any()
                                .add(api_resource::Column::OwnerId.eq(current_user.id()))
                                .add(
                                    Condition::all()
                                        .add(
                                            api_resource::Column::Visibility
                                                .is_in(Visibility::LISTED),
                                        )
                                        .add(api_resource::Column::Status.eq(Status::Deployed)),
                                ),
                        )
                        .exists(txn)
                        .await?;

                    if !api_exists {
                        return Err(ApiKeyError::ApiNotFound);
                    }
                }

                Ok(api_key::Entity::insert(model)
                    .exec_with_returning(txn)
                    .await?)
            })
        })
        .await
        .into_raw_result()?;

    info!(id = model.id, user_id = model.user_id, "API key issued");

    Ok((
        StatusCode::CREATED,
        Json(ApiKeyCreateResponse {
            data: model.into(),
            key: secret,
        }),
    ))
}
