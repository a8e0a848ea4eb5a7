//! Execution sandbox gateway.
//!
//! The sandbox is a separate network service. Each execution is a single
//! `POST /execute` request, and dropping the returned future closes the
//! connection, which in turn makes the sandbox tear the container down.

use std::time::Duration;

use common::{
    config,
    execution::{ExecutionRequest, ExecutionResult},
};
use derive_more::{Display, Error, From};
use tracing::{instrument, warn};

/// Time allowed for the sandbox to report back after the execution deadline.
const RESPONSE_GRACE: Duration = Duration::from_secs(5);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors that may occur while running code in the sandbox.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// Sandbox is unreachable, or it didn't respond in time.
    Transport(reqwest::Error),

    /// Sandbox refused the request itself, with a client error status code.
    #[display(fmt = "sandbox rejected the request with status code {}", _0)]
    #[from(ignore)]
    Rejected(#[error(not(source))] u16),

    /// Sandbox failed with a server error status code.
    #[display(fmt = "sandbox responded with status code {}", _0)]
    #[from(ignore)]
    Status(#[error(not(source))] u16),
}

impl Error {
    /// Check if the sandbox itself is unavailable, as opposed to refusing a request.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, Error::Rejected(_))
    }
}

/// HTTP client of the execution sandbox.
#[derive(Clone)]
pub struct SandboxClient {
    client: reqwest::Client,
    execute_url: String,
}

impl SandboxClient {
    /// Create new client for the sandbox listening on the provided base URL.
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            execute_url: format!("{}/execute", base_url.trim_end_matches('/')),
        })
    }

    /// Run the provided request in the sandbox.
    ///
    /// Connection failures are retried once. A non-zero exit code is
    /// a successful result, not an error.
    #[instrument(skip_all, fields(runtime = %request.runtime))]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, Error> {
        let timeout = Duration::from_millis(request.timeout_ms.unwrap_or_default()) + RESPONSE_GRACE;

        let response = match self.send(request, timeout).await {
            Err(err) if err.is_connect() => {
                warn!(%err, "unable to connect to sandbox, retrying");
                self.send(request, timeout).await?
            }
            response => response?,
        };

        let status = response.status();

        if status.is_client_error() {
            warn!(%status, "sandbox rejected execution request");
            return Err(Error::Rejected(status.as_u16()));
        }

        if !status.is_success() {
            warn!(%status, "sandbox failed to run execution request");
            return Err(Error::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }

    async fn send(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response, reqwest::Error> {
        self.client
            .post(&self.execute_url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
    }
}

/// Resolve the caller-provided timeout into the effective wall-clock limit in milliseconds.
pub fn effective_timeout(requested_ms: Option<u64>, server: &config::Server) -> u64 {
    let max = server.max_execution_timeout.saturating_mul(1000);

    requested_ms
        .filter(|ms| *ms > 0)
        .unwrap_or(server.execution_timeout.saturating_mul(1000))
        .min(max)
}
