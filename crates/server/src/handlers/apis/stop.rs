use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use common::storage::ArtifactStore;
use db::{api_resource::Transition, DatabaseConnection};

use super::{ApiResourceData, ApiResourceError};
use crate::auth::AuthenticatedUserId;

/// Stop a deployed API resource.
///
/// The endpoint path is retained, but invocations are no longer routed to it.
pub(super) async fn stop(
    Extension(current_user): Extension<AuthenticatedUserId>,
    Extension(storage): Extension<Arc<ArtifactStore>>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResourceData>, ApiResourceError> {
    super::transition(&db, &storage, id, current_user, Transition::Stop)
        .await
        .map(Json)
}
