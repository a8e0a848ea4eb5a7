use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use db::{
    api_resource::{self, Runtime, Visibility},
    code_artifact,
    sea_query::Expr,
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    TransactionErrorExt, TransactionTrait,
};
use serde::Deserialize;
use validator::Validate;

use super::{find_owned, ApiResourceData, ApiResourceError};
use crate::{auth::AuthenticatedUserId, validation::ValidatedJson};

#[derive(Deserialize, Validate)]
pub(super) struct ApiResourceUpdateRequest {
    #[validate(custom = "super::non_blank", length(max = 128))]
    name: Option<String>,

    #[validate(length(max = 4096))]
    description: Option<String>,

    visibility: Option<Visibility>,

    /// Accepted only if equal to the current runtime.
    runtime: Option<Runtime>,
}

/// Update mutable API resource fields.
///
/// Neither the runtime nor the endpoint path change on update.
pub(super) async fn update(
    Extension(current_user): Extension<AuthenticatedUserId>,
    State(db): State<Arc<DatabaseConnection>>,
    Path(id): Path<i64>,
    ValidatedJson(request): ValidatedJson<ApiResourceUpdateRequest>,
) -> Result<Json<ApiResourceData>, ApiResourceError> {
    db.transaction::<_, _, ApiResourceError>(|txn| {
        Box::pin(async move {
            let mut model = find_owned(txn, id, current_user).await?;

            if matches!(request.runtime, Some(runtime) if runtime != model.runtime) {
                return Err(ApiResourceError::ImmutableRuntime);
            }

            if let Some(name) = request.name {
                model.name = name.trim().to_string();
            }

            if let Some(description) = request.description {
                model.description = description;
            }

            if let Some(visibility) = request.visibility {
                model.visibility = visibility;
            }

            model.updated_at = db::now();

            save_if_unchanged(txn, &model).await?;

            let artifact = model.find_related(code_artifact::Entity).one(txn).await?;

            Ok(Json(ApiResourceData::new(model, artifact)))
        })
    })
    .await
    .into_raw_result()
}

/// Store mutable fields of the model, unless its status changed since it was loaded.
async fn save_if_unchanged<C: ConnectionTrait>(
    db: &C,
    model: &api_resource::Model,
) -> Result<(), ApiResourceError> {
    let result = api_resource::Entity::update_many()
        .col_expr(api_resource::Column::Name, Expr::value(model.name.clone()))
        .col_expr(
            api_resource::Column::Description,
            Expr::value(model.description.clone()),
        )
        .col_expr(api_resource::Column::Visibility, Expr::value(model.visibility))
        .col_expr(api_resource::Column::UpdatedAt, Expr::value(model.updated_at))
        .filter(api_resource::Column::Id.eq(model.id))
        .filter(api_resource::Column::Status.eq(model.status))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(ApiResourceError::Conflict);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use db::{api_resource, EntityTrait};
    use serde_json::json;

    use super::{save_if_unchanged, ApiResourceError};
    use crate::testing::{create_user, json_request, TestApp};

    #[tokio::test]
    async fn update() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;

        let created = app
            .create_api(&token, json!({ "name": "Sum", "runtime": "python" }))
            .await;
        let id = created["id"].as_i64().unwrap();

        let (status, body) = app
            .send(json_request(
                "PATCH",
                &format!("/apis/{id}"),
                Some(&token),
                json!({ "name": "Renamed", "visibility": "paid", "runtime": "python" }),
            ))
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["name"], "Renamed");
        assert_eq!(body["visibility"], "paid");
        assert_eq!(body["runtime"], "python");
        assert_eq!(body["endpoint"], created["endpoint"]);
        assert_eq!(body["description"], "");
    }

    #[tokio::test]
    async fn runtime_is_immutable() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;

        let created = app
            .create_api(&token, json!({ "name": "Sum", "runtime": "python" }))
            .await;
        let id = created["id"].as_i64().unwrap();

        let (status, _) = app
            .send(json_request(
                "PATCH",
                &format!("/apis/{id}"),
                Some(&token),
                json!({ "runtime": "go" }),
            ))
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (_, body) = app
            .send(json_request("GET", &format!("/apis/{id}"), Some(&token), json!(null)))
            .await;
        assert_eq!(body["runtime"], "python");
    }

    #[tokio::test]
    async fn foreign_and_deleted_resources() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;
        let (_, other_token) = create_user(&app.db, "other@example.com").await;

        let created = app
            .create_api(&token, json!({ "name": "Sum", "runtime": "python" }))
            .await;
        let id = created["id"].as_i64().unwrap();
        let uri = format!("/apis/{id}");

        let (status, _) = app
            .send(json_request(
                "PATCH",
                &uri,
                Some(&other_token),
                json!({ "name": "Stolen" }),
            ))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        app.send(json_request("DELETE", &uri, Some(&token), json!(null)))
            .await;

        let (status, _) = app
            .send(json_request("PATCH", &uri, Some(&token), json!({ "name": "Late" })))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_racing_a_transition() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;

        let id = app.deployed_api(&token, "public").await;

        let mut stale = api_resource::Entity::find_by_id(id)
            .one(&*app.db)
            .await
            .unwrap()
            .unwrap();

        let (status, _) = app.action(&token, id, "stop").await;
        assert_eq!(status, StatusCode::OK);

        stale.name = String::from("Renamed");

        let result = save_if_unchanged(&*app.db, &stale).await;
        assert!(matches!(result, Err(ApiResourceError::Conflict)));

        let (_, body) = app
            .send(json_request("GET", &format!("/apis/{id}"), Some(&token), json!(null)))
            .await;
        assert_eq!(body["name"], "public api");
        assert_eq!(body["status"], "stopped");
    }
}
