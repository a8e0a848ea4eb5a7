//! Registered API resource and its lifecycle.
//!
//! An API resource is a unit of deployable code owned by a single user.
//! Its lifecycle is a small state machine:
//!
//! ```text
//! pending ──deploy──▶ deployed ◀──deploy── stopped
//!                        │                    ▲
//!                        └───────stop─────────┘
//! ```
//!
//! Any non-deleted resource may be deleted, and [`Status::Deleted`] is terminal.
//! Deleted resources are kept as tombstones and are never visible to readers.

use std::fmt;

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// API resource model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_resources")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub description: String,
    pub version: String,
    pub runtime: Runtime,
    pub visibility: Visibility,
    pub status: Status,
    pub endpoint: Option<String>,
    pub created_at: TimeDateTime,
    pub updated_at: TimeDateTime,
}

/// Runtime used to execute the resource code.
///
/// Runtime is fixed at creation time and never updated afterwards.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i16", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    #[sea_orm(num_value = 0)]
    Python,
    #[sea_orm(num_value = 1)]
    Nodejs,
    #[sea_orm(num_value = 2)]
    Go,
}

impl From<Runtime> for common::execution::Runtime {
    fn from(runtime: Runtime) -> Self {
        match runtime {
            Runtime::Python => common::execution::Runtime::Python,
            Runtime::Nodejs => common::execution::Runtime::Nodejs,
            Runtime::Go => common::execution::Runtime::Go,
        }
    }
}

/// Access tier of an API resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "i16", db_type = "Integer")]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    /// Visible to the owner only.
    #[sea_orm(num_value = 0)]
    Private,

    /// Listed in the marketplace and free to invoke.
    #[sea_orm(num_value = 1)]
    Public,

    /// Listed in the marketplace, invocation requires a scoped API key.
    #[sea_orm(num_value = 2)]
    Paid,
}

impl Default for Visibility {
    fn default() -> Self {
        Visibility::Private
    }
}

impl Visibility {
    /// Visibility values that are listed in the marketplace.
    pub const LISTED: [Visibility; 2] = [Visibility::Public, Visibility::Paid];
}

/// Lifecycle status.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize)]
#[sea_orm(rs_type = "i16", db_type = "Integer")]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[sea_orm(num_value = 0)]
    Pending,
    #[sea_orm(num_value = 1)]
    Deployed,
    #[sea_orm(num_value = 2)]
    Stopped,
    #[sea_orm(num_value = 3)]
    Deleted,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Deployed => write!(f, "deployed"),
            Status::Stopped => write!(f, "stopped"),
            Status::Deleted => write!(f, "deleted"),
        }
    }
}

/// Caller-initiated lifecycle transition.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transition {
    Deploy,
    Stop,
    Delete,
}

impl Transition {
    /// Status that the resource ends up in after the transition.
    pub fn target(&self) -> Status {
        match self {
            Transition::Deploy => Status::Deployed,
            Transition::Stop => Status::Stopped,
            Transition::Delete => Status::Deleted,
        }
    }

    /// Check if the transition is allowed from the provided status.
    pub fn is_allowed_from(&self, status: Status) -> bool {
        matches!(
            (self, status),
            (Transition::Deploy, Status::Pending | Status::Stopped)
                | (Transition::Stop, Status::Deployed)
                | (
                    Transition::Delete,
                    Status::Pending | Status::Deployed | Status::Stopped
                )
        )
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::Deploy => write!(f, "deploy"),
            Transition::Stop => write!(f, "stop"),
            Transition::Delete => write!(f, "delete"),
        }
    }
}

/// API resource model relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::OwnerId",
        to = "super::user::Column::Id"
    )]
    Owner,

    #[sea_orm(has_one = "super::code_artifact::Entity")]
    CodeArtifact,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Owner.def()
    }
}

impl Related<super::code_artifact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CodeArtifact.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Build the public endpoint path for a resource.
///
/// The path depends only on values known at creation time, so it
/// stays the same across renames and redeploys.
///
/// ## Example
///
/// ```
/// use db::api_resource::endpoint;
///
/// assert_eq!(endpoint(42, "Sum Numbers!"), "/execute/42/sum-numbers");
/// ```
pub fn endpoint(id: i64, name: &str) -> String {
    let mut slug = String::with_capacity(name.len());

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        format!("/execute/{id}/api")
    } else {
        format!("/execute/{id}/{slug}")
    }
}
