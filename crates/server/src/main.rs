mod api_key;
mod auth;
mod handlers;
mod pagination;
mod password;
mod sandbox;
mod validation;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit, middleware::from_fn_with_state, routing::post, Extension, Router,
    Server,
};
use common::{config::Config, logging, storage::ArtifactStore};
use db::{Database, DatabaseConnection};
use sandbox::SandboxClient;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::new(None)?;

    logging::init(&config);

    let Some(server_config) = config.server.as_ref() else {
        return Err(anyhow::Error::msg("unable to load server config"));
    };

    let Some(database_config) = config.database.as_ref() else {
        return Err(anyhow::Error::msg("unable to load database config"));
    };

    let Some(storage_config) = config.storage.as_ref() else {
        return Err(anyhow::Error::msg("unable to load storage config"));
    };

    info!("connecting to database");
    let database = Arc::new(Database::connect(&database_config.url).await?);
    let storage = Arc::new(ArtifactStore::new(storage_config).await?);
    let sandbox = SandboxClient::new(&server_config.sandbox_url)?;

    info!(address = %server_config.address, "starting server");
    let server = Server::bind(&server_config.address);
    let config = Arc::new(config);

    server
        .serve(app_router(database, config, storage, sandbox).into_make_service())
        .await?;

    Ok(())
}

fn app_router(
    database: Arc<DatabaseConnection>,
    config: Arc<Config>,
    storage: Arc<ArtifactStore>,
    sandbox: SandboxClient,
) -> Router {
    let code_limit = config
        .server
        .as_ref()
        .map_or(db::code_artifact::MAX_SIZE, |server| server.max_upload_size);

    let protected_routes = Router::new()
        .nest("/apis", handlers::apis::routes())
        .nest("/keys", handlers::keys::routes())
        .route(
            "/sandbox/execute",
            // JSON escaping may grow the body well past the raw code size.
            post(handlers::execute::execute).layer(DefaultBodyLimit::max(code_limit * 2)),
        )
        .route_layer(from_fn_with_state(
            database.clone(),
            auth::require_authentication,
        ));

    Router::new()
        .merge(protected_routes)
        .nest("/auth", handlers::auth::routes(database.clone()))
        .nest("/marketplace", handlers::marketplace::routes())
        .route("/execute/:id/:slug", post(handlers::execute::invoke))
        .layer(Extension(sandbox))
        .layer(Extension(storage))
        .layer(Extension(config))
        .with_state(database)
}
