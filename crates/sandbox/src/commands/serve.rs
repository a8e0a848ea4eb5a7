use std::sync::Arc;

use axum::Server;
use bollard::Docker;
use common::config;
use derive_more::{Display, Error, From};
use tracing::{info, instrument};

use crate::{
    executor::DockerExecutor,
    routes::{self, SandboxState},
};

/// `serve` command errors.
#[derive(Display, Debug, From, Error)]
pub(crate) enum ServeError {
    /// Docker-related error.
    Docker(bollard::errors::Error),

    /// HTTP server error.
    Server(hyper::Error),
}

/// Start accepting execution requests.
#[instrument(skip_all, err)]
pub(crate) async fn serve(sandbox_config: config::Sandbox) -> Result<(), ServeError> {
    let docker = Docker::connect_with_socket_defaults()?;
    let address = sandbox_config.address;
    let config = Arc::new(sandbox_config);

    let state = Arc::new(SandboxState {
        executor: Box::new(DockerExecutor::new(docker, config.clone())),
        config,
    });

    info!(%address, "started execution sandbox");

    Server::bind(&address)
        .serve(routes::router(state).into_make_service())
        .await?;

    Ok(())
}
