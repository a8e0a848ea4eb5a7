use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use db::{
    api_resource::{self, Runtime},
    sea_query::{Expr, Func, LikeExpr},
    ColumnTrait, Condition, DatabaseConnection, QueryFilter, QueryOrder, QuerySelect,
};
use serde::Deserialize;
use validator::Validate;

use super::{MarketplaceApiData, MarketplaceError};
use crate::{pagination::Pagination, validation::ValidatedQuery};

/// Runtime filter, either a single runtime or all of them.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum RuntimeFilter {
    #[default]
    All,
    Python,
    Nodejs,
    Go,
}

impl RuntimeFilter {
    fn runtime(self) -> Option<Runtime> {
        match self {
            RuntimeFilter::All => None,
            RuntimeFilter::Python => Some(Runtime::Python),
            RuntimeFilter::Nodejs => Some(Runtime::Nodejs),
            RuntimeFilter::Go => Some(Runtime::Go),
        }
    }
}

#[derive(Deserialize, Validate)]
pub(super) struct MarketplaceQuery {
    #[serde(default)]
    #[validate(length(max = 200))]
    search: Option<String>,

    #[serde(default)]
    runtime: RuntimeFilter,
}

/// Build a `LIKE` pattern matching any value that contains the needle.
///
/// Wildcards in the needle itself are escaped with `\`.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');

    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }

    pattern.push('%');
    pattern
}

/// Case-insensitive substring condition over the name and the description.
fn search_condition(needle: &str) -> Condition {
    let pattern = contains_pattern(&needle.to_lowercase());

    [api_resource::Column::Name, api_resource::Column::Description]
        .into_iter()
        .fold(Condition::any(), |condition, column| {
            condition.add(
                Expr::expr(Func::lower(Expr::col(column)))
                    .like(LikeExpr::str(&pattern).escape('\\')),
            )
        })
}

/// List deployed public and paid API resources, newest first.
///
/// Search is case-insensitive and matches either the name or the description.
pub(super) async fn list(
    State(db): State<Arc<DatabaseConnection>>,
    Query(pagination): Query<Pagination>,
    ValidatedQuery(query): ValidatedQuery<MarketplaceQuery>,
) -> Result<Json<Vec<MarketplaceApiData>>, MarketplaceError> {
    let mut select = super::listed();

    if let Some(runtime) = query.runtime.runtime() {
        select = select.filter(api_resource::Column::Runtime.eq(runtime));
    }

    if let Some(needle) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|search| !search.is_empty())
    {
        select = select.filter(search_condition(needle));
    }

    let models = select
        .order_by_desc(api_resource::Column::Id)
        .limit(pagination.limit())
        .offset(pagination.offset())
        .all(&*db)
        .await?;

    Ok(Json(models.into_iter().map(MarketplaceApiData::from).collect()))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{json, Value};

    use super::contains_pattern;
    use crate::testing::{create_user, json_request, TestApp};

    async fn names(app: &TestApp, query: &str) -> Vec<String> {
        let (status, body) = app
            .send(json_request(
                "GET",
                &format!("/marketplace/apis{query}"),
                None,
                json!(null),
            ))
            .await;

        assert_eq!(status, StatusCode::OK, "{query}");

        body.as_array()
            .unwrap()
            .iter()
            .map(|api| api["name"].as_str().unwrap().to_string())
            .collect()
    }

    #[tokio::test]
    async fn listing_filters() {
        let app = TestApp::new().await;
        let (_, token) = create_user(&app.db, "dev@example.com").await;

        let public = app.deployed_api(&token, "public").await;
        app.deployed_api(&token, "paid").await;
        app.deployed_api(&token, "private").await;

        app.create_api(
            &token,
            json!({ "name": "Pending Go", "runtime": "go", "visibility": "public" }),
        )
        .await;

        let stopped = app.deployed_api(&token, "public").await;
        app.action(&token, stopped, "stop").await;

        let golang = app
            .create_api(
                &token,
                json!({
                    "name": "Golang",
                    "description": "Fast SUM service",
                    "runtime": "go",
                    "visibility": "paid",
                }),
            )
            .await;
        let golang = golang["id"].as_i64().unwrap();
        app.upload(&token, golang, "main.go", b"package main".to_vec())
            .await;
        app.action(&token, golang, "deploy").await;

        assert_eq!(
            names(&app, "").await,
            ["Golang", "paid api", "public api"]
        );
        assert_eq!(names(&app, "?runtime=go").await, ["Golang"]);
        assert_eq!(
            names(&app, "?runtime=python").await,
            ["paid api", "public api"]
        );
        assert_eq!(
            names(&app, "?runtime=all&search=API").await,
            ["paid api", "public api"]
        );
        assert_eq!(names(&app, "?search=sum").await, ["Golang"]);
        assert_eq!(names(&app, "?search=%20GoLang%20").await, ["Golang"]);
        assert_eq!(names(&app, "?search=%25").await, Vec::<String>::new());
        assert_eq!(names(&app, "?search=paid_").await, Vec::<String>::new());
        assert_eq!(names(&app, "?search=private").await, Vec::<String>::new());
        assert_eq!(names(&app, "?page=2").await, Vec::<String>::new());

        let (status, body) = app
            .send(json_request(
                "GET",
                &format!("/marketplace/apis/{public}"),
                None,
                json!(null),
            ))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["visibility"], "public");
        assert!(body.get("code_artifact_ref").is_none());
        assert_ne!(body["endpoint"], Value::Null);
    }

    #[tokio::test]
    async fn invalid_runtime() {
        let app = TestApp::new().await;

        let (status, _) = app
            .send(json_request(
                "GET",
                "/marketplace/apis?runtime=ruby",
                None,
                json!(null),
            ))
            .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn wildcards_are_escaped() {
        assert_eq!(contains_pattern("sum"), "%sum%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern("a\\b"), "%a\\\\b%");
    }
}
