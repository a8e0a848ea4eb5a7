use std::sync::Arc;

use axum::{extract::State, Json};
use db::{user, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use serde::Deserialize;
use validator::Validate;

use super::{start_session, IdentityError, SessionResponse};
use crate::{password, validation::ValidatedJson};

#[derive(Deserialize, Validate)]
pub(super) struct LoginRequest {
    #[validate(length(min = 1))]
    email: String,

    #[validate(length(min = 1))]
    password: String,
}

/// Authenticate a user with an email and a password.
///
/// Unknown emails and wrong passwords result in the same error.
pub(super) async fn login(
    State(db): State<Arc<DatabaseConnection>>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<SessionResponse>, IdentityError> {
    let user = user::Entity::find()
        .filter(user::Column::Email.eq(request.email.trim().to_lowercase()))
        .one(&*db)
        .await?
        .ok_or(IdentityError::InvalidCredentials)?;

    // Stored hashes that can't be parsed never match.
    let valid = password::verify(request.password, user.password_hash.clone()).await;

    if !valid.unwrap_or(false) {
        return Err(IdentityError::InvalidCredentials);
    }

    Ok(Json(start_session(&*db, user).await?))
}
