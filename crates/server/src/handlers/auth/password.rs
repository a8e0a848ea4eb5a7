use std::sync::Arc;

use axum::{extract::State, Extension};
use db::{
    sea_query::Expr, user, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::IdentityError;
use crate::{auth::AuthenticatedUserId, password, validation::ValidatedJson};

#[derive(Deserialize, Validate)]
pub(super) struct PasswordChangeRequest {
    #[validate(length(min = 1))]
    old_password: String,

    #[validate(length(min = 8, max = 128))]
    new_password: String,
}

/// Change the current user's password.
pub(super) async fn change(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    ValidatedJson(request): ValidatedJson<PasswordChangeRequest>,
) -> Result<(), IdentityError> {
    let user = user::Entity::find_by_id(current_user.id())
        .one(&*db)
        .await?
        .ok_or(IdentityError::UserNotFound)?;

    let valid = password::verify(request.old_password, user.password_hash.clone()).await;

    if !valid.unwrap_or(false) {
        return Err(IdentityError::InvalidCredentials);
    }

    let password_hash = password::hash(request.new_password).await?;

    user::Entity::update_many()
        .col_expr(user::Column::PasswordHash, Expr::value(password_hash))
        .col_expr(user::Column::UpdatedAt, Expr::value(db::now()))
        .filter(user::Column::Id.eq(user.id))
        .exec(&*db)
        .await?;

    info!(user_id = user.id, "password changed");

    Ok(())
}
