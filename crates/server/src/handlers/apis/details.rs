use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use db::{code_artifact, DatabaseConnection, ModelTrait};

use super::{find_owned, ApiResourceData, ApiResourceError};
use crate::auth::AuthenticatedUserId;

/// Get details of a single API resource.
pub(super) async fn details(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResourceData>, ApiResourceError> {
    let model = find_owned(&*db, id, current_user).await?;
    let artifact = model.find_related(code_artifact::Entity).one(&*db).await?;

    Ok(Json(ApiResourceData::new(model, artifact)))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::{create_user, json_request, TestApp};

    #[tokio::test]
    async fn owner_only() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;
        let (_, other_token) = create_user(&app.db, "other@example.com").await;

        let created = app
            .create_api(&token, json!({ "name": "Sum", "runtime": "python" }))
            .await;
        let id = created["id"].as_i64().unwrap();

        let (status, body) = app
            .send(json_request("GET", &format!("/apis/{id}"), Some(&token), json!(null)))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, created);

        let (status, _) = app
            .send(json_request(
                "GET",
                &format!("/apis/{id}"),
                Some(&other_token),
                json!(null),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(json_request("GET", "/apis/100", Some(&token), json!(null)))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
