//! Recorded execution.
//!
//! One row per invocation of a deployed API resource or an ad-hoc sandbox run.
//! Ad-hoc runs have no `api_id`, and anonymous invocations of public resources
//! have no `user_id`.

use sea_orm::{entity::prelude::*, sea_query::Expr, FromQueryResult, QuerySelect};
use time::PrimitiveDateTime;

/// Execution model.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "executions")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub api_id: Option<i64>,
    pub user_id: Option<i64>,

    /// HTTP status code returned to the caller.
    pub status_code: i32,
    pub exit_code: Option<i64>,
    pub duration_ms: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub error: Option<String>,
    pub created_at: TimeDateTime,
}

/// Execution model relations.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::api_resource::Entity",
        from = "Column::ApiId",
        to = "super::api_resource::Column::Id"
    )]
    ApiResource,

    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
}

impl Related<super::api_resource::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiResource.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check if the request was served, whatever the program exit code.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Aggregated execution statistics of a single API resource.
#[derive(Clone, Debug, PartialEq, FromQueryResult)]
pub struct Stats {
    pub total_requests: i64,
    pub success_count: i64,
    pub error_count: i64,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
}

impl Stats {
    /// Share of served requests, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }

        self.success_count as f64 / self.total_requests as f64 * 100.0
    }
}

/// Aggregate executions of the provided API resource recorded since the provided time.
pub async fn stats<C: ConnectionTrait>(
    db: &C,
    api_id: i64,
    since: PrimitiveDateTime,
) -> Result<Stats, DbErr> {
    Entity::find()
        .select_only()
        .column_as(Expr::cust("COUNT(*)"), "total_requests")
        .column_as(
            Expr::cust("COUNT(CASE WHEN status_code >= 200 AND status_code < 300 THEN 1 END)"),
            "success_count",
        )
        .column_as(
            Expr::cust("COUNT(CASE WHEN status_code >= 400 THEN 1 END)"),
            "error_count",
        )
        .column_as(
            Expr::cust("CAST(AVG(duration_ms) AS DOUBLE PRECISION)"),
            "avg_duration_ms",
        )
        .column_as(Expr::cust("MIN(duration_ms)"), "min_duration_ms")
        .column_as(Expr::cust("MAX(duration_ms)"), "max_duration_ms")
        .filter(Column::ApiId.eq(api_id))
        .filter(Column::CreatedAt.gte(since))
        .into_model::<Stats>()
        .one(db)
        .await?
        .ok_or_else(|| DbErr::RecordNotFound(String::from("empty aggregate query result")))
}
