use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use db::{
    execution, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Serialize;

use super::{find_owned, ApiResourceError};
use crate::{auth::AuthenticatedUserId, pagination::Pagination};

/// Recorded execution, as seen by the resource owner.
#[derive(Serialize)]
pub(super) struct ExecutionData {
    pub id: i64,

    /// Owner of the presented API key, if any.
    pub user_id: Option<i64>,
    pub status_code: i32,
    pub exit_code: Option<i64>,
    pub duration_ms: i64,
    pub request_size: i64,
    pub response_size: i64,
    pub error: Option<String>,
    pub created_at: i64,
}

impl From<execution::Model> for ExecutionData {
    fn from(model: execution::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            status_code: model.status_code,
            exit_code: model.exit_code,
            duration_ms: model.duration_ms,
            request_size: model.request_size,
            response_size: model.response_size,
            error: model.error,
            created_at: model.created_at.assume_utc().unix_timestamp(),
        }
    }
}

/// List recorded invocations of an API resource, newest first.
pub(super) async fn executions(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ExecutionData>>, ApiResourceError> {
    let model = find_owned(&*db, id, current_user).await?;

    let executions = execution::Entity::find()
        .filter(execution::Column::ApiId.eq(model.id))
        .order_by_desc(execution::Column::Id)
        .limit(pagination.limit())
        .offset(pagination.offset())
        .all(&*db)
        .await?;

    Ok(Json(executions.into_iter().map(ExecutionData::from).collect()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use db::api_resource::endpoint;
    use serde_json::{json, Value};

    use crate::testing::{create_user, json_request, stub_sandbox, TestApp};

    #[tokio::test]
    async fn invocations_are_recorded() {
        let app = TestApp::with_sandbox(Some(stub_sandbox())).await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;
        let (_, other_token) = create_user(&app.db, "other@example.com").await;

        let id = app.deployed_api(&token, "public").await;
        let other = app.deployed_api(&token, "public").await;

        for input in [json!(1), json!("abc")] {
            let (status, _) = app
                .send(json_request(
                    "POST",
                    &endpoint(id, "public api"),
                    None,
                    json!({ "input": input }),
                ))
                .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = app
            .send(json_request(
                "GET",
                &format!("/apis/{id}/executions"),
                Some(&token),
                Value::Null,
            ))
            .await;

        assert_eq!(status, StatusCode::OK);

        let executions = body.as_array().unwrap();
        assert_eq!(executions.len(), 2);

        // Newest first, the second call sent a five bytes long input.
        assert_eq!(executions[0]["request_size"], 14 + 5);
        assert_eq!(executions[1]["request_size"], 14 + 1);

        for execution in executions {
            assert_eq!(execution["status_code"], 200);
            assert_eq!(execution["exit_code"], 2);
            assert_eq!(execution["duration_ms"], 3);
            assert_eq!(execution["user_id"], Value::Null);
            assert!(execution["response_size"].as_i64().unwrap() > 0);
        }

        let (_, body) = app
            .send(json_request(
                "GET",
                &format!("/apis/{other}/executions"),
                Some(&token),
                Value::Null,
            ))
            .await;
        assert_eq!(body, json!([]));

        let (status, _) = app
            .send(json_request(
                "GET",
                &format!("/apis/{id}/executions"),
                Some(&other_token),
                Value::Null,
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn key_owner_is_recorded() {
        let app = TestApp::with_sandbox(Some(stub_sandbox())).await;
        let (_, owner) = create_user(&app.db, "dev@example.com").await;
        let (consumer_id, consumer) = create_user(&app.db, "consumer@example.com").await;

        let id = app.deployed_api(&owner, "paid").await;

        let (status, body) = app
            .send(json_request(
                "POST",
                "/keys",
                Some(&consumer),
                json!({ "name": "consumer key", "api_id": id }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let key = body["key"].as_str().unwrap();

        let (status, _) = app
            .send(
                axum::http::Request::post(endpoint(id, "paid api"))
                    .header("X-API-Key", key)
                    .body(hyper::Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = app
            .send(json_request(
                "GET",
                &format!("/apis/{id}/executions"),
                Some(&owner),
                Value::Null,
            ))
            .await;

        assert_eq!(body[0]["user_id"], consumer_id);
    }
}
