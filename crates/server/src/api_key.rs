//! API key verification.

use axum::http::{header::AUTHORIZATION, HeaderMap};
use db::{api_key, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};

/// Header carrying an API key.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Extract an API key from the `X-API-Key` header, falling back to a bearer token.
pub fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers.get(API_KEY_HEADER) {
        return value.to_str().ok().map(str::trim).filter(|key| !key.is_empty());
    }

    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

/// Find a usable key matching the presented secret.
///
/// Returns [`None`] if no key matches, or if the matching key was deactivated or expired.
pub async fn verify<C: ConnectionTrait>(
    db: &C,
    presented: &str,
) -> Result<Option<api_key::Model>, DbErr> {
    let key = api_key::Entity::find()
        .filter(api_key::Column::SecretHash.eq(api_key::secret_hash(presented)))
        .one(db)
        .await?;

    Ok(key.filter(|key| key.is_usable_at(db::now())))
}
