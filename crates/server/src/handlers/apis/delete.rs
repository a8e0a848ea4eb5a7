use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::storage::ArtifactStore;
use db::{api_resource::Transition, DatabaseConnection};

use super::{ApiResourceData, ApiResourceError};
use crate::auth::AuthenticatedUserId;

/// Delete an API resource.
///
/// Deletion is irreversible. The record is kept with the `deleted` status,
/// while its endpoint and code artifact are released.
pub(super) async fn delete(
    Extension(current_user): Extension<AuthenticatedUserId>,
    Extension(storage): Extension<Arc<ArtifactStore>>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResourceData>, ApiResourceError> {
    super::transition(&db, &storage, id, current_user, Transition::Delete)
        .await
        .map(Json)
}
