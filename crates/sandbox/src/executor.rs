/// Docker-backed executor.
mod docker;

use std::{io, time::Duration};

use async_trait::async_trait;
use common::{
    config,
    execution::{ExecutionRequest, ExecutionResult},
};
use derive_more::{Display, Error, From};

pub(crate) use docker::DockerExecutor;

/// Errors that prevent the backend from running a program at all.
///
/// A program that fails, times out or exceeds its limits is not an error,
/// and is reported through [`ExecutionResult`] instead.
#[derive(Debug, Display, Error, From)]
pub(crate) enum ExecutorError {
    /// Docker-related error.
    Docker(bollard::errors::Error),

    /// IO-related error.
    Io(io::Error),

    /// Unable to serialize program input.
    Json(serde_json::Error),
}

/// Code execution backend.
#[async_trait]
pub(crate) trait Executor: Send + Sync {
    /// Run the provided program, killing it after `timeout` elapses.
    async fn run(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError>;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<(), ExecutorError>;
}

/// Resolve the wall-clock limit for a request.
///
/// Missing or zero values fall back to the configured default,
/// larger values are capped at the configured maximum.
pub(crate) fn timeout(requested_ms: Option<u64>, config: &config::Sandbox) -> Duration {
    let ms = match requested_ms {
        Some(ms) if ms > 0 => ms,
        _ => config.default_timeout,
    };

    Duration::from_millis(ms.min(config.max_timeout))
}
