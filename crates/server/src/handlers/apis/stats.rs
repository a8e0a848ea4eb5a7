use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use db::{execution, DatabaseConnection};
use serde::{Deserialize, Serialize};
use time::Duration;
use validator::Validate;

use super::{find_owned, ApiResourceError};
use crate::{auth::AuthenticatedUserId, validation::ValidatedQuery};

#[derive(Deserialize, Validate)]
pub(super) struct StatsQuery {
    /// Size of the aggregation window, counted back from now.
    #[serde(default = "default_hours")]
    #[validate(range(min = 1, max = 8760))]
    hours: i64,
}

fn default_hours() -> i64 {
    24
}

#[derive(Serialize)]
pub(super) struct StatsData {
    pub api_id: i64,
    pub period_hours: i64,
    pub total_requests: i64,
    pub success_count: i64,
    pub error_count: i64,

    /// Share of served requests, in percent.
    pub success_rate: f64,
    pub avg_duration_ms: Option<f64>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
}

/// Aggregate recent invocations of an API resource.
pub(super) async fn stats(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
    ValidatedQuery(query): ValidatedQuery<StatsQuery>,
) -> Result<Json<StatsData>, ApiResourceError> {
    let model = find_owned(&*db, id, current_user).await?;

    let since = db::now() - Duration::hours(query.hours);
    let stats = execution::stats(&*db, model.id, since).await?;

    Ok(Json(StatsData {
        api_id: model.id,
        period_hours: query.hours,
        success_rate: stats.success_rate(),
        total_requests: stats.total_requests,
        success_count: stats.success_count,
        error_count: stats.error_count,
        avg_duration_ms: stats.avg_duration_ms,
        min_duration_ms: stats.min_duration_ms,
        max_duration_ms: stats.max_duration_ms,
    }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use db::{api_resource::endpoint, execution, ActiveValue, EntityTrait};
    use serde_json::{json, Value};
    use time::Duration;

    use crate::testing::{create_user, json_request, stub_sandbox, TestApp};

    async fn stats(app: &TestApp, token: &str, query: &str) -> (StatusCode, Value) {
        app.send(json_request("GET", &format!("/apis/{query}"), Some(token), Value::Null))
            .await
    }

    #[tokio::test]
    async fn aggregates() {
        let app = TestApp::with_sandbox(Some(stub_sandbox())).await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;

        let id = app.deployed_api(&token, "public").await;

        let (status, body) = stats(&app, &token, &format!("{id}/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "api_id": id,
                "period_hours": 24,
                "total_requests": 0,
                "success_count": 0,
                "error_count": 0,
                "success_rate": 0.0,
                "avg_duration_ms": null,
                "min_duration_ms": null,
                "max_duration_ms": null,
            })
        );

        let (status, _) = app
            .send(json_request("POST", &endpoint(id, "public api"), None, json!({})))
            .await;
        assert_eq!(status, StatusCode::OK);

        // Failed and stale executions recorded directly.
        for (status_code, duration_ms, age) in [(503, 9, 0), (200, 1, 48)] {
            execution::Entity::insert(execution::ActiveModel {
                api_id: ActiveValue::Set(Some(id)),
                user_id: ActiveValue::Set(None),
                status_code: ActiveValue::Set(status_code),
                exit_code: ActiveValue::Set(None),
                duration_ms: ActiveValue::Set(duration_ms),
                request_size: ActiveValue::Set(0),
                response_size: ActiveValue::Set(0),
                error: ActiveValue::Set(None),
                created_at: ActiveValue::Set(db::now() - Duration::hours(age)),
                ..Default::default()
            })
            .exec_without_returning(&*app.db)
            .await
            .unwrap();
        }

        let (_, body) = stats(&app, &token, &format!("{id}/stats")).await;
        assert_eq!(body["total_requests"], 2);
        assert_eq!(body["success_count"], 1);
        assert_eq!(body["error_count"], 1);
        assert_eq!(body["success_rate"], 50.0);
        assert_eq!(body["avg_duration_ms"], 6.0);
        assert_eq!(body["min_duration_ms"], 3);
        assert_eq!(body["max_duration_ms"], 9);

        let (_, body) = stats(&app, &token, &format!("{id}/stats?hours=72")).await;
        assert_eq!(body["period_hours"], 72);
        assert_eq!(body["total_requests"], 3);
        assert_eq!(body["min_duration_ms"], 1);
    }

    #[tokio::test]
    async fn owner_only() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;
        let (_, other_token) = create_user(&app.db, "other@example.com").await;

        let id = app.deployed_api(&token, "public").await;

        let (status, _) = stats(&app, &other_token, &format!("{id}/stats")).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = stats(&app, &token, "100/stats").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = stats(&app, &token, &format!("{id}/stats?hours=0")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn unavailable_sandbox_is_an_error() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;

        let id = app.deployed_api(&token, "public").await;

        let (status, _) = app
            .send(json_request("POST", &endpoint(id, "public api"), None, json!({})))
            .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (_, body) = stats(&app, &token, &format!("{id}/stats")).await;
        assert_eq!(body["total_requests"], 1);
        assert_eq!(body["error_count"], 1);
        assert_eq!(body["success_rate"], 0.0);
    }
}
