use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Extension, Json};
use db::{
    api_resource::{self, Runtime, Status, Visibility},
    sea_query::Expr,
    ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, TransactionErrorExt,
    TransactionTrait,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{ApiResourceData, ApiResourceError};
use crate::{auth::AuthenticatedUserId, validation::ValidatedJson};

fn default_version() -> String {
    String::from("v1")
}

#[derive(Deserialize, Validate)]
pub(super) struct ApiResourceCreateRequest {
    #[validate(custom = "super::non_blank", length(max = 128))]
    name: String,

    #[serde(default)]
    #[validate(length(max = 4096))]
    description: String,

    #[serde(default = "default_version")]
    #[validate(custom = "super::non_blank", length(max = 32))]
    version: String,

    runtime: Runtime,

    #[serde(default)]
    visibility: Visibility,
}

/// Register a new API resource in the `pending` status.
///
/// The endpoint path is derived from the assigned identifier and the name,
/// and is never changed afterwards.
pub(super) async fn create(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    ValidatedJson(request): ValidatedJson<ApiResourceCreateRequest>,
) -> Result<(StatusCode, Json<ApiResourceData>), ApiResourceError> {
    let model = db
        .transaction::<_, _, ApiResourceError>(|txn| {
            Box::pin(async move {
                let now = db::now();

                let model = api_resource::Entity::insert(api_resource::ActiveModel {
                    owner_id: ActiveValue::Set(current_user.id()),
                    name: ActiveValue::Set(request.name.trim().to_string()),
                    description: ActiveValue::Set(request.description),
                    version: ActiveValue::Set(request.version.trim().to_string()),
                    runtime: ActiveValue::Set(request.runtime),
                    visibility: ActiveValue::Set(request.visibility),
                    status: ActiveValue::Set(Status::Pending),
                    endpoint: ActiveValue::Set(None),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                })
                .exec_with_returning(txn)
                .await?;

                let endpoint = api_resource::endpoint(model.id, &model.name);

                api_resource::Entity::update_many()
                    .col_expr(
                        api_resource::Column::Endpoint,
                        Expr::value(Some(endpoint.clone())),
                    )
                    .filter(api_resource::Column::Id.eq(model.id))
                    .exec(txn)
                    .await?;

                Ok(api_resource::Model {
                    endpoint: Some(endpoint),
                    ..model
                })
            })
        })
        .await
        .into_raw_result()?;

    info!(id = model.id, owner_id = model.owner_id, "API resource created");

    Ok((StatusCode::CREATED, Json(ApiResourceData::new(model, None))))
}
