use std::sync::Arc;

use axum::{extract::State, http::StatusCode, Json};
use db::{
    user::{self, Role},
    ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QuerySelect, SelectExt,
    TransactionErrorExt, TransactionTrait,
};
use serde::Deserialize;
use tracing::info;
use validator::Validate;

use super::{start_session, IdentityError, SessionResponse};
use crate::{password, validation::ValidatedJson};

#[derive(Deserialize, Validate)]
pub(super) struct SignupRequest {
    #[validate(email, length(max = 254))]
    email: String,

    #[validate(length(min = 8, max = 128))]
    password: String,

    #[validate(length(min = 1, max = 100))]
    name: String,

    #[serde(default)]
    role: Role,
}

/// User registration handler.
///
/// A registered user is signed in immediately.
pub(super) async fn signup(
    State(db): State<Arc<DatabaseConnection>>,
    ValidatedJson(request): ValidatedJson<SignupRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), IdentityError> {
    let email = request.email.trim().to_lowercase();
    let password_hash = password::hash(request.password).await?;

    let response = db
        .transaction::<_, _, IdentityError>(|txn| {
            Box::pin(async move {
                let email_taken = user::Entity::find()
                    .select_only()
                    .filter(user::Column::Email.eq(&*email))
                    .exists(txn)
                    .await?;

                if email_taken {
                    return Err(IdentityError::EmailTaken);
                }

                let now = db::now();

                let user = user::Entity::insert(user::ActiveModel {
                    email: ActiveValue::Set(email),
                    password_hash: ActiveValue::Set(password_hash),
                    name: ActiveValue::Set(request.name),
                    role: ActiveValue::Set(request.role),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                    ..Default::default()
                })
                .exec_with_returning(txn)
                .await?;

                Ok(start_session(txn, user).await?)
            })
        })
        .await
        .into_raw_result()?;

    info!(user_id = response.user.id, "user registered");

    Ok((StatusCode::CREATED, Json(response)))
}
