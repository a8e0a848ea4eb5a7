use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::storage::ArtifactStore;
use db::{api_resource::Transition, DatabaseConnection};

use super::{ApiResourceData, ApiResourceError};
use crate::auth::AuthenticatedUserId;

/// Deploy a `pending` or `stopped` API resource.
///
/// Deployment requires an uploaded code artifact, and makes the resource
/// reachable through its endpoint.
pub(super) async fn deploy(
    Extension(current_user): Extension<AuthenticatedUserId>,
    Extension(storage): Extension<Arc<ArtifactStore>>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResourceData>, ApiResourceError> {
    super::transition(&db, &storage, id, current_user, Transition::Deploy)
        .await
        .map(Json)
}
