use std::{error::Error, net::TcpListener, sync::Arc};

use axum::{
    async_trait,
    body::Body,
    http::{Request, StatusCode},
    routing::post,
    Json, Router, Server,
};
use common::{
    config::Config,
    execution::{ExecutionRequest, ExecutionResult},
    storage::ArtifactStore,
};
use common_multipart_rfc7578::client::multipart;
use db::{token, user, ActiveValue, Database, DatabaseConnection, EntityTrait};
use hyper::body::{self, Bytes, HttpBody};
use migration::MigratorTrait;
use serde::Serialize;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use crate::sandbox::SandboxClient;

pub(crate) async fn create_database() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("unable to create test database");

    migration::Migrator::up(&db, None)
        .await
        .expect("unable to run migrations");

    db
}

fn serve_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("unable to bind stub sandbox");
    let address = listener.local_addr().expect("unable to get stub address");

    tokio::spawn(
        Server::from_tcp(listener)
            .expect("unable to start stub sandbox")
            .serve(router.into_make_service()),
    );

    format!("http://{address}")
}

/// Serve a sandbox stub on an ephemeral port, returning its base URL.
///
/// The stub echoes the received request as JSON in the `output` field,
/// and always exits with code `2`.
pub(crate) fn stub_sandbox() -> String {
    serve_stub(Router::new().route(
        "/execute",
        post(|Json(request): Json<ExecutionRequest>| async move {
            Json(ExecutionResult {
                output: Some(serde_json::to_string(&request).expect("unable to serialize")),
                exit_code: Some(2),
                duration_ms: 3,
                ..Default::default()
            })
        }),
    ))
}

/// Serve a sandbox stub that refuses every request as too large.
pub(crate) fn rejecting_sandbox() -> String {
    serve_stub(Router::new().route(
        "/execute",
        post(|| async { StatusCode::PAYLOAD_TOO_LARGE }),
    ))
}

/// Application router backed by an in-memory database and a temporary storage directory.
pub(crate) struct TestApp {
    pub router: Router,
    pub db: Arc<DatabaseConnection>,
    pub storage: Arc<ArtifactStore>,
    _storage_dir: TempDir,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_sandbox(None).await
    }

    pub async fn with_sandbox(sandbox_url: Option<String>) -> Self {
        let storage_dir = tempfile::tempdir().expect("unable to create storage directory");

        let mut config = Config::for_tests(storage_dir.path().to_path_buf());

        if let (Some(server), Some(url)) = (config.server.as_mut(), sandbox_url) {
            server.sandbox_url = url;
        }

        let storage = Arc::new(
            ArtifactStore::new(config.storage.as_ref().expect("missing storage config"))
                .await
                .expect("unable to create artifact store"),
        );

        let sandbox = SandboxClient::new(
            &config
                .server
                .as_ref()
                .expect("missing server config")
                .sandbox_url,
        )
        .expect("unable to create sandbox client");

        let db = Arc::new(create_database().await);

        let router = crate::app_router(db.clone(), Arc::new(config), storage.clone(), sandbox);

        Self {
            router,
            db,
            storage,
            _storage_dir: storage_dir,
        }
    }

    /// Send a request and return its status code alongside the JSON body, if any.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("unable to send request");

        let status = response.status();
        let bytes = response.into_body().bytes().await;

        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    /// Create a new API resource owned by the token's user.
    pub async fn create_api(&self, token: &str, body: Value) -> Value {
        let (status, body) = self
            .send(json_request("POST", "/apis", Some(token), body))
            .await;

        assert_eq!(status, StatusCode::CREATED, "{body}");

        body
    }

    /// Upload a source file into the provided API resource.
    pub async fn upload(
        &self,
        token: &str,
        id: i64,
        filename: &str,
        contents: Vec<u8>,
    ) -> (StatusCode, Value) {
        self.send(upload_request(token, id, filename, contents))
            .await
    }

    /// Apply a lifecycle action, such as `deploy` or `stop`.
    pub async fn action(&self, token: &str, id: i64, action: &str) -> (StatusCode, Value) {
        self.send(json_request(
            "POST",
            &format!("/apis/{id}/{action}"),
            Some(token),
            Value::Null,
        ))
        .await
    }

    /// Create a deployed API resource with a small Python artifact.
    pub async fn deployed_api(&self, token: &str, visibility: &str) -> i64 {
        let created = self
            .create_api(
                token,
                json!({
                    "name": format!("{visibility} api"),
                    "runtime": "python",
                    "visibility": visibility,
                }),
            )
            .await;

        let id = created["id"].as_i64().expect("missing identifier");

        let (status, _) = self
            .upload(token, id, "main.py", b"print(input())".to_vec())
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = self.action(token, id, "deploy").await;
        assert_eq!(status, StatusCode::OK);

        id
    }
}

/// Insert a user with an authentication token, returning both.
///
/// The stored password hash is not a valid PHC string, so the user can't log in.
pub(crate) async fn create_user(db: &DatabaseConnection, email: &str) -> (i64, String) {
    let now = db::now();

    let user = user::Entity::insert(user::ActiveModel {
        email: ActiveValue::Set(email.to_string()),
        password_hash: ActiveValue::Set(String::from("-")),
        name: ActiveValue::Set(String::from("Test User")),
        role: ActiveValue::Set(user::Role::Both),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
        ..Default::default()
    })
    .exec_with_returning(db)
    .await
    .expect("unable to create user");

    let (model, token) = token::generate_token(user.id);

    token::Entity::insert(model)
        .exec_without_returning(db)
        .await
        .expect("unable to insert token");

    (user.id, token)
}

/// Build a JSON request, with an optional bearer token.
///
/// A `null` body produces an empty request body.
pub(crate) fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> Request<Body> {
    let mut request = Request::builder().method(method).uri(uri);

    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }

    let body = if body.is_null() {
        Body::empty()
    } else {
        request = request.header("Content-Type", "application/json");
        Body::from_json(body)
    };

    request.body(body).expect("unable to build request")
}

/// Build a `multipart/form-data` upload request with a single `code` field.
pub(crate) fn upload_request(
    token: &str,
    id: i64,
    filename: &str,
    contents: Vec<u8>,
) -> Request<Body> {
    let mut form = multipart::Form::default();
    form.add_reader_file("code", std::io::Cursor::new(contents), filename);

    let content_type = form.content_type();

    Request::builder()
        .method("POST")
        .uri(format!("/apis/{id}/upload"))
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", content_type)
        .body(Body::wrap_stream(multipart::Body::from(form)))
        .expect("unable to build request")
}

pub(crate) trait RequestBodyExt: Sized {
    fn from_json<B: Serialize>(val: B) -> Self;
}

impl<T> RequestBodyExt for T
where
    T: HttpBody + From<Vec<u8>>,
{
    fn from_json<B: Serialize>(val: B) -> Self {
        T::from(serde_json::to_vec(&val).expect("unable to serialize"))
    }
}

#[async_trait(?Send)]
pub(crate) trait ResponseBodyExt {
    async fn bytes(self) -> Bytes;

    async fn text(self) -> String;

    async fn json(self) -> serde_json::Value;
}

#[async_trait(?Send)]
impl<T> ResponseBodyExt for T
where
    T: HttpBody,
    T::Error: Error,
{
    async fn bytes(self) -> Bytes {
        body::to_bytes(self)
            .await
            .expect("unable to convert to bytes")
    }

    async fn text(self) -> String {
        String::from_utf8(self.bytes().await.to_vec()).expect("unable to convert to text")
    }

    async fn json(self) -> serde_json::Value {
        serde_json::from_slice(&self.bytes().await).expect("unable to convert to json")
    }
}
