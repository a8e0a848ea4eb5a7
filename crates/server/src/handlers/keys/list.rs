use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use db::{api_key, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use futures_util::TryStreamExt;

use super::{ApiKeyData, ApiKeyError};
use crate::{auth::AuthenticatedUserId, pagination::Pagination};

/// List API keys issued to the current user, newest first.
///
/// Secrets are never included, only their masked form.
pub(super) async fn list(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Query(pagination): Query<Pagination>,
) -> Result<Json<Vec<ApiKeyData>>, ApiKeyError> {
    api_key::Entity::find()
        .filter(api_key::Column::UserId.eq(current_user.id()))
        .order_by_desc(api_key::Column::Id)
        .limit(pagination.limit())
        .offset(pagination.offset())
        .stream(&*db)
        .await?
        .err_into()
        .map_ok(ApiKeyData::from)
        .try_collect()
        .await
        .map(Json)
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::{create_user, json_request, TestApp};

    #[tokio::test]
    async fn secrets_are_not_listed() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "consumer@example.com").await;
        let (_, other_token) = create_user(&app.db, "other@example.com").await;

        let (_, created) = app
            .send(json_request("POST", "/keys", Some(&token), json!({ "name": "Main" })))
            .await;
        app.send(json_request(
            "POST",
            "/keys",
            Some(&other_token),
            json!({ "name": "Foreign" }),
        ))
        .await;

        let (status, body) = app
            .send(json_request("GET", "/keys", Some(&token), json!(null)))
            .await;

        assert_eq!(status, StatusCode::OK);

        let keys = body.as_array().unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0]["name"], "Main");
        assert_eq!(keys[0]["masked"], created["masked"]);
        assert!(keys[0].get("key").is_none());

        let secret = created["key"].as_str().unwrap();
        assert!(!body.to_string().contains(secret));
    }
}
