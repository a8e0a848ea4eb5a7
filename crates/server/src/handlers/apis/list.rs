use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use db::{
    api_resource::{self, Status},
    code_artifact, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use super::{ApiResourceData, ApiResourceError};
use crate::{auth::AuthenticatedUserId, pagination::Pagination};

/// List API resources of the current user, newest first.
pub(super) async fn list(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ApiResourceData>>, ApiResourceError> {
    let resources = api_resource::Entity::find()
        .find_also_related(code_artifact::Entity)
        .filter(api_resource::Column::OwnerId.eq(current_user.id()))
        .filter(api_resource::Column::Status.ne(Status::Deleted))
        .order_by_desc(api_resource::Column::Id)
        .limit(pagination.limit())
        .offset(pagination.offset())
        .all(&*db)
        .await?;

    Ok(Json(
        resources
            .into_iter()
            .map(|(model, artifact)| ApiResourceData::new(model, artifact))
            .collect(),
    ))
}
