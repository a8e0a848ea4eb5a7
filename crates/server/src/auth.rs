use std::sync::Arc;

use axum::{
    extract::State,
    headers::{authorization::Bearer, Authorization},
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
    TypedHeader,
};
use axum_derive_error::ErrorResponse;
use db::{token, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QuerySelect};
use derive_more::{Display, Error, From};

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuthenticatedUserId(i64);

impl AuthenticatedUserId {
    /// Get raw user identifier value.
    pub fn id(&self) -> i64 {
        self.0
    }
}

#[derive(ErrorResponse, Display, From, Error)]
pub(super) enum AuthenticationError {
    DatabaseError(DbErr),

    #[status(StatusCode::UNAUTHORIZED)]
    #[display(fmt = "authentication token is required")]
    MissingAuthenticationToken,

    #[status(StatusCode::UNAUTHORIZED)]
    #[display(fmt = "invalid authentication token was provided")]
    InvalidAuthenticationToken,

    #[status(StatusCode::UNAUTHORIZED)]
    #[display(fmt = "authentication token has expired")]
    ExpiredAuthenticationToken,
}

/// Resolve the bearer token into an [`AuthenticatedUserId`] request extension.
pub(super) async fn require_authentication<B>(
    State(db): State<Arc<DatabaseConnection>>,
    authorization: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request<B>,
    next: Next<B>,
) -> Result<Response, AuthenticationError> {
    let TypedHeader(authorization) =
        authorization.ok_or(AuthenticationError::MissingAuthenticationToken)?;

    let (user_id, created_at) = token::Entity::find()
        .select_only()
        .columns([token::Column::UserId, token::Column::CreatedAt])
        .filter(token::Column::Token.eq(authorization.token()))
        .into_tuple::<(i64, db::PrimitiveDateTime)>()
        .one(&*db)
        .await?
        .ok_or(AuthenticationError::InvalidAuthenticationToken)?;

    if token::is_expired(created_at) {
        return Err(AuthenticationError::ExpiredAuthenticationToken);
    }

    req.extensions_mut().insert(AuthenticatedUserId(user_id));

    Ok(next.run(req).await)
}
