//! Issued API key.
//!
//! API keys gate invocation of paid and private API resources. The plaintext
//! secret is returned to the caller exactly once, at creation time. Only its
//! [`blake2`](common::hash::blake2) hash and a masked hint are stored.
//!
//! Deactivation is terminal: no operation ever sets `is_active` back to `true`.

use rand::{rngs::OsRng, RngCore};
use sea_orm::entity::prelude::*;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Prefix prepended to every generated secret.
pub const SECRET_PREFIX: &str = "apk_";

/// Count of random bytes in a generated secret.
pub const SECRET_BYTES: usize = 32;

/// API key model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_keys")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub user_id: i64,
    pub api_id: Option<i64>,
    pub name: String,
    #[sea_orm(unique)]
    pub secret_hash: Vec<u8>,
    pub masked: String,
    pub is_active: bool,
    pub expires_at: Option<TimeDateTime>,
    pub created_at: TimeDateTime,
}

impl Model {
    /// Check if the key is active and not expired at the provided time.
    pub fn is_usable_at(&self, now: PrimitiveDateTime) -> bool {
        self.is_active && !self.expires_at.map_or(false, |expires_at| expires_at <= now)
    }

    /// Check if the key grants access to the provided API resource.
    ///
    /// Keys without a scope grant access to any resource.
    pub fn is_scoped_to(&self, api_id: i64) -> bool {
        self.api_id.map_or(true, |scope| scope == api_id)
    }
}

/// API key model relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,

    #[sea_orm(
        belongs_to = "super::api_resource::Entity",
        from = "Column::ApiId",
        to = "super::api_resource::Column::Id"
    )]
    ApiResource,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::api_resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiResource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Generate a new random secret.
///
/// ## Example
///
/// ```
/// use db::api_key::{generate_secret, SECRET_BYTES, SECRET_PREFIX};
///
/// let secret = generate_secret();
/// assert!(secret.starts_with(SECRET_PREFIX));
/// assert_eq!(secret.len(), SECRET_PREFIX.len() + SECRET_BYTES * 2);
/// ```
pub fn generate_secret() -> String {
    let mut bytes = [0; SECRET_BYTES];
    OsRng.fill_bytes(&mut bytes);

    format!("{SECRET_PREFIX}{}", hex::encode(bytes))
}

/// Hash a presented secret into its stored form.
pub fn secret_hash(secret: &str) -> Vec<u8> {
    common::hash::blake2(secret.as_bytes()).to_vec()
}

/// Mask a secret for display.
///
/// Secrets of at least 16 characters keep their first 12 and last 8 characters,
/// shorter values are returned unmodified.
pub fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();

    if chars.len() < 16 {
        return secret.to_string();
    }

    let head: String = chars[..12].iter().collect();
    let tail: String = chars[chars.len() - 8..].iter().collect();

    format!("{head}••••••••••••••{tail}")
}

/// Convert a unix timestamp into the form stored by the database.
pub fn timestamp_to_datetime(timestamp: i64) -> Option<PrimitiveDateTime> {
    let datetime = OffsetDateTime::from_unix_timestamp(timestamp).ok()?;

    Some(PrimitiveDateTime::new(datetime.date(), datetime.time()))
}

#[cfg(test)]
mod tests {
    use time::Duration;

    use super::{generate_secret, mask, secret_hash, Model};

    fn model() -> Model {
        Model {
            id: 1,
            user_id: 1,
            api_id: Some(5),
            name: String::from("test"),
            secret_hash: Vec::new(),
            masked: String::new(),
            is_active: true,
            expires_at: None,
            created_at: crate::now(),
        }
    }

    #[test]
    fn masking() {
        let secret = generate_secret();
        let masked = mask(&secret);

        assert!(masked.starts_with(&secret[..12]));
        assert!(masked.ends_with(&secret[secret.len() - 8..]));
        assert!(!masked.contains(&secret[12..secret.len() - 8]));

        assert_eq!(mask("0123456789abcdef"), "0123456789ab••••••••••••••89abcdef");
        assert_eq!(mask("short"), "short");
        assert_eq!(mask("0123456789abcde"), "0123456789abcde");
    }

    #[test]
    fn secrets_are_unique() {
        let first = generate_secret();
        let second = generate_secret();

        assert_ne!(first, second);
        assert_ne!(secret_hash(&first), secret_hash(&second));
        assert_eq!(secret_hash(&first), secret_hash(&first));
    }

    #[test]
    fn usability() {
        let now = crate::now();
        let mut key = model();

        assert!(key.is_usable_at(now));

        key.expires_at = Some(now - Duration::seconds(1));
        assert!(!key.is_usable_at(now));

        key.expires_at = Some(now + Duration::hours(1));
        assert!(key.is_usable_at(now));

        key.is_active = false;
        assert!(!key.is_usable_at(now));
    }

    #[test]
    fn scopes() {
        let mut key = model();

        assert!(key.is_scoped_to(5));
        assert!(!key.is_scoped_to(6));

        key.api_id = None;
        assert!(key.is_scoped_to(6));
    }
}
