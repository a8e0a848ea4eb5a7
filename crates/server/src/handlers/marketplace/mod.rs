mod details;
mod list;

use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Router};
use axum_derive_error::ErrorResponse;
use db::{
    api_resource::{self, Runtime, Status, Visibility},
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Select,
};
use derive_more::{Display, Error, From};
use serde::Serialize;

pub(crate) fn routes() -> Router<Arc<DatabaseConnection>> {
    Router::new()
        .route("/apis", get(list::list))
        .route("/apis/:id", get(details::details))
}

/// Errors that may occur while browsing the marketplace.
#[derive(ErrorResponse, Display, From, Error)]
pub(super) enum MarketplaceError {
    /// Database-related error.
    DatabaseError(DbErr),

    #[status(StatusCode::NOT_FOUND)]
    #[display(fmt = "API not found")]
    NotFound,
}

/// Publicly visible API resource data.
#[derive(Serialize)]
pub(crate) struct MarketplaceApiData {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub runtime: Runtime,
    pub visibility: Visibility,
    pub endpoint: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<api_resource::Model> for MarketplaceApiData {
    fn from(model: api_resource::Model) -> Self {
        Self {
            id: model.id,
            owner_id: model.owner_id,
            name: model.name,
            description: model.description,
            version: model.version,
            runtime: model.runtime,
            visibility: model.visibility,
            endpoint: model.endpoint,
            created_at: model.created_at.assume_utc().unix_timestamp(),
            updated_at: model.updated_at.assume_utc().unix_timestamp(),
        }
    }
}

/// Select API resources that are listed in the marketplace.
fn listed() -> Select<api_resource::Entity> {
    api_resource::Entity::find()
        .filter(api_resource::Column::Visibility.is_in(Visibility::LISTED))
        .filter(api_resource::Column::Status.eq(Status::Deployed))
}
