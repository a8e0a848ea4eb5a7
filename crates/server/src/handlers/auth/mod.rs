/// User authentication route.
mod login;

/// Current user profile route.
mod me;

/// Password change route.
mod password;

/// User registration route.
mod signup;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use axum_derive_error::ErrorResponse;
use db::{token, user, DatabaseConnection, DbErr, EntityTrait};
use derive_more::{Display, Error, From};
use serde::Serialize;

use crate::{auth, password as password_hash};

/// Create a router that provides an API server with authentication routes.
pub(crate) fn routes(database: Arc<DatabaseConnection>) -> Router<Arc<DatabaseConnection>> {
    Router::new()
        .route("/me", get(me::me))
        .route("/password", post(password::change))
        .route_layer(from_fn_with_state(database, auth::require_authentication))
        .route("/signup", post(signup::signup))
        .route("/login", post(login::login))
}

/// Errors that may occur during identity management.
#[derive(ErrorResponse, Display, From, Error)]
pub(super) enum IdentityError {
    /// Database-related error.
    DatabaseError(DbErr),

    /// Password hashing error.
    PasswordHashError(password_hash::Error),

    #[status(StatusCode::CONFLICT)]
    #[display(fmt = "email is already registered")]
    EmailTaken,

    #[status(StatusCode::UNAUTHORIZED)]
    #[display(fmt = "invalid email or password")]
    InvalidCredentials,

    #[status(StatusCode::NOT_FOUND)]
    #[display(fmt = "user not found")]
    UserNotFound,
}

/// Public user profile.
#[derive(Serialize)]
pub(crate) struct UserData {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: user::Role,
    pub created_at: i64,
}

impl From<user::Model> for UserData {
    fn from(model: user::Model) -> Self {
        Self {
            id: model.id,
            email: model.email,
            name: model.name,
            role: model.role,
            created_at: model.created_at.assume_utc().unix_timestamp(),
        }
    }
}

/// Authentication token alongside the authenticated user profile.
#[derive(Serialize)]
pub(super) struct SessionResponse {
    token: String,
    user: UserData,
}

/// Issue a new authentication token for the provided user.
pub(super) async fn start_session<C: db::ConnectionTrait>(
    db: &C,
    user: user::Model,
) -> Result<SessionResponse, DbErr> {
    let (model, token) = token::generate_token(user.id);

    token::Entity::insert(model).exec_without_returning(db).await?;

    Ok(SessionResponse {
        token,
        user: user.into(),
    })
}
