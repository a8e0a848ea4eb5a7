mod create;
mod deactivate;
mod list;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use axum_derive_error::ErrorResponse;
use db::{api_key, DatabaseConnection, DbErr};
use derive_more::{Display, Error, From};
use serde::Serialize;

pub(crate) fn routes() -> Router<Arc<DatabaseConnection>> {
    Router::new()
        .route("/", get(list::list).post(create::create))
        .route("/:id/deactivate", post(deactivate::deactivate))
}

/// Errors that may occur while managing API keys.
#[derive(ErrorResponse, Display, From, Error)]
pub(super) enum ApiKeyError {
    /// Database-related error.
    DatabaseError(DbErr),

    #[status(StatusCode::NOT_FOUND)]
    #[display(fmt = "API key not found")]
    KeyNotFound,

    #[status(StatusCode::FORBIDDEN)]
    #[display(fmt = "API key is owned by another user")]
    Forbidden,

    #[status(StatusCode::NOT_FOUND)]
    #[display(fmt = "API resource not found")]
    ApiNotFound,

    #[status(StatusCode::UNPROCESSABLE_ENTITY)]
    #[display(fmt = "expiration time must be in the future")]
    InvalidExpiration,
}

/// API key data, without the secret.
#[derive(Serialize)]
pub(crate) struct ApiKeyData {
    pub id: i64,
    pub name: String,
    pub api_id: Option<i64>,

    /// Masked secret, suitable for display.
    pub masked: String,
    pub is_active: bool,
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl From<api_key::Model> for ApiKeyData {
    fn from(model: api_key::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            api_id: model.api_id,
            masked: model.masked,
            is_active: model.is_active,
            expires_at: model
                .expires_at
                .map(|expires_at| expires_at.assume_utc().unix_timestamp()),
            created_at: model.created_at.assume_utc().unix_timestamp(),
        }
    }
}
