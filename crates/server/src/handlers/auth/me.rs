use std::sync::Arc;

use axum::{extract::State, Extension, Json};
use db::{user, DatabaseConnection, EntityTrait};

use super::{IdentityError, UserData};
use crate::auth::AuthenticatedUserId;

/// Get the current user profile.
pub(super) async fn me(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
) -> Result<Json<UserData>, IdentityError> {
    user::Entity::find_by_id(current_user.id())
        .one(&*db)
        .await?
        .map(|user| Json(user.into()))
        .ok_or(IdentityError::UserNotFound)
}
