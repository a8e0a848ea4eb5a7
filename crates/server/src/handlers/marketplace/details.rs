use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use db::{api_resource, ColumnTrait, DatabaseConnection, QueryFilter};

use super::{MarketplaceApiData, MarketplaceError};

/// Get a single listed API resource.
pub(super) async fn details(
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
) -> Result<Json<MarketplaceApiData>, MarketplaceError> {
    super::listed()
        .filter(api_resource::Column::Id.eq(id))
        .one(&*db)
        .await?
        .map(|model| Json(model.into()))
        .ok_or(MarketplaceError::NotFound)
}
