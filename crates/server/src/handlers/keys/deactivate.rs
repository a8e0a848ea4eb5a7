use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use db::{
    api_key, sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    TransactionErrorExt, TransactionTrait,
};
use tracing::info;

use super::{ApiKeyData, ApiKeyError};
use crate::auth::AuthenticatedUserId;

/// Deactivate an API key.
///
/// Deactivation is terminal, and repeated calls leave the key inactive.
pub(super) async fn deactivate(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
) -> Result<Json<ApiKeyData>, ApiKeyError> {
    let model = db
        .transaction::<_, _, ApiKeyError>(|txn| {
            Box::pin(async move {
                let model = api_key::Entity::find_by_id(id)
                    .one(txn)
                    .await?
                    .ok_or(ApiKeyError::KeyNotFound)?;

                if model.user_id != current_user.id() {
                    return Err(ApiKeyError::Forbidden);
                }

                api_key::Entity::update_many()
                    .col_expr(api_key::Column::IsActive, Expr::value(false))
                    .filter(api_key::Column::Id.eq(id))
                    .exec(txn)
                    .await?;

                Ok(api_key::Model {
                    is_active: false,
                    ..model
                })
            })
        })
        .await
        .into_raw_result()?;

    info!(id, "API key deactivated");

    Ok(Json(model.into()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::testing::{create_user, json_request, TestApp};

    #[tokio::test]
    async fn deactivation_is_terminal() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "consumer@example.com").await;

        let (_, created) = app
            .send(json_request("POST", "/keys", Some(&token), json!({ "name": "Main" })))
            .await;
        let uri = format!("/keys/{}/deactivate", created["id"]);

        for _ in 0..2 {
            let (status, body) = app
                .send(json_request("POST", &uri, Some(&token), json!(null)))
                .await;

            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["is_active"], false);
        }

        let (_, body) = app
            .send(json_request("GET", "/keys", Some(&token), json!(null)))
            .await;
        assert_eq!(body[0]["is_active"], false);

        let secret = created["key"].as_str().unwrap();
        assert!(crate::api_key::verify(&*app.db, secret)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn owner_only() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "consumer@example.com").await;
        let (_, other_token) = create_user(&app.db, "other@example.com").await;

        let (_, created) = app
            .send(json_request("POST", "/keys", Some(&token), json!({ "name": "Main" })))
            .await;
        let uri = format!("/keys/{}/deactivate", created["id"]);

        let (status, _) = app
            .send(json_request("POST", &uri, Some(&other_token), json!(null)))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .send(json_request("POST", "/keys/100/deactivate", Some(&token), json!(null)))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let secret = created["key"].as_str().unwrap();
        assert!(crate::api_key::verify(&*app.db, secret)
            .await
            .unwrap()
            .is_some());
    }
}
