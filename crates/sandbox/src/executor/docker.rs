use std::{
    collections::HashMap,
    io,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bollard::{
    container::{
        AttachContainerOptions, Config, RemoveContainerOptions, UploadToContainerOptions,
    },
    errors::Error,
    image::{CreateImageOptions, ListImagesOptions},
    service::HostConfig,
    Docker,
};
use common::{
    config,
    execution::{ExecutionRequest, ExecutionResult, Runtime},
};
use futures_util::{StreamExt, TryStreamExt};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use super::{Executor, ExecutorError};

/// Directory inside of a container that holds the program source and input.
const WORKING_DIR: &str = "/sandbox";

/// Program input file name.
const INPUT_FILE: &str = "input.json";

/// Executor that runs each program inside of a fresh Docker container.
pub(crate) struct DockerExecutor {
    client: Docker,
    config: Arc<config::Sandbox>,
}

impl DockerExecutor {
    pub(crate) fn new(client: Docker, config: Arc<config::Sandbox>) -> Self {
        Self { client, config }
    }

    /// Ensure that the image with the provided name exists.
    ///
    /// If it doesn't, an attempt to pull it from Docker registry will be made.
    async fn ensure_image_exists(&self, image: &str) -> Result<(), Error> {
        let list = self
            .client
            .list_images(Some(ListImagesOptions {
                filters: HashMap::from([("reference", vec![image])]),
                ..Default::default()
            }))
            .await?;

        if list.is_empty() {
            info!(%image, "downloading missing docker image");

            self.client
                .create_image(
                    Some(CreateImageOptions {
                        from_image: image,
                        ..Default::default()
                    }),
                    None,
                    None,
                )
                .map_ok(|_| ())
                .try_collect::<()>()
                .await?;
        }

        Ok(())
    }

    /// Create a container for the provided request, with the program already copied in.
    async fn create(&self, request: &ExecutionRequest) -> Result<ContainerGuard, ExecutorError> {
        let image = self.config.images.for_runtime(request.runtime);
        self.ensure_image_exists(image).await?;

        let archive = build_archive(request)?;

        // Nothing from the host is mounted, and the container has no network
        // interfaces apart from loopback.
        let host_config = HostConfig {
            cap_drop: Some(vec![String::from("ALL")]),
            memory: Some(self.config.memory_limit),
            memory_swap: Some(self.config.memory_limit),
            nano_cpus: Some(self.config.nano_cpus),
            network_mode: Some(String::from("none")),
            pids_limit: Some(self.config.pids_limit),
            security_opt: Some(vec![String::from("no-new-privileges")]),
            ..Default::default()
        };

        let container = self
            .client
            .create_container::<String, String>(
                None,
                Config {
                    image: Some(image.to_string()),
                    cmd: Some(request.runtime.command(WORKING_DIR)),
                    env: Some(environment(request.runtime)),
                    working_dir: Some(WORKING_DIR.to_string()),
                    network_disabled: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    host_config: Some(host_config),
                    ..Default::default()
                },
            )
            .await?;

        let guard = ContainerGuard::new(self.client.clone(), container.id);

        self.client
            .upload_to_container(
                guard.id(),
                Some(UploadToContainerOptions {
                    path: "/",
                    ..Default::default()
                }),
                archive.into(),
            )
            .await?;

        Ok(guard)
    }

    /// Start the container and wait for the program to finish.
    ///
    /// Returns the captured output, capped at the configured limit,
    /// and the exit code, if the program ran to completion.
    async fn attach_and_wait(&self, id: &str) -> Result<(Vec<u8>, Option<i64>), Error> {
        let mut logs = self
            .client
            .attach_container::<String>(
                id,
                Some(AttachContainerOptions {
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    logs: Some(true),
                    ..Default::default()
                }),
            )
            .await?
            .output;

        self.client.start_container::<String>(id, None).await?;

        let limit = self.config.output_limit;
        let mut output = Vec::new();

        // Keep draining past the limit, so that the program never blocks on a full pipe.
        while let Some(chunk) = logs.try_next().await? {
            let bytes = chunk.into_bytes();
            let take = bytes.len().min(limit.saturating_sub(output.len()));
            output.extend_from_slice(&bytes[..take]);
        }

        let exit_code = match self.client.wait_container::<String>(id, None).next().await {
            Some(Ok(response)) => Some(response.status_code),
            Some(Err(Error::DockerContainerWaitError { code, .. })) => Some(code),
            Some(Err(err)) => return Err(err),
            None => None,
        };

        Ok((output, exit_code))
    }

    /// Check if the container was killed by the OOM killer.
    async fn oom_killed(&self, id: &str) -> bool {
        match self.client.inspect_container(id, None).await {
            Ok(response) => response
                .state
                .and_then(|state| state.oom_killed)
                .unwrap_or(false),
            Err(err) => {
                warn!(%err, "unable to inspect container");
                false
            }
        }
    }
}

#[async_trait]
impl Executor for DockerExecutor {
    async fn run(
        &self,
        request: &ExecutionRequest,
        timeout: Duration,
    ) -> Result<ExecutionResult, ExecutorError> {
        let container = self.create(request).await?;
        let id = container.id().to_string();

        let started_at = Instant::now();
        let outcome = tokio::time::timeout(timeout, self.attach_and_wait(&id)).await;
        let duration_ms = started_at.elapsed().as_millis() as u64;

        let result = match outcome {
            Err(_) => {
                debug!(%id, ?timeout, "execution timed out");
                ExecutionResult::failure("execution timed out", duration_ms)
            }
            Ok(Err(err)) => return Err(err.into()),
            Ok(Ok((output, exit_code))) => {
                let output = String::from_utf8_lossy(&output).into_owned();

                if self.oom_killed(&id).await {
                    ExecutionResult {
                        output: Some(output),
                        ..ExecutionResult::failure("memory limit exceeded", duration_ms)
                    }
                } else if let Some(exit_code) = exit_code {
                    ExecutionResult {
                        output: Some(output),
                        exit_code: Some(exit_code),
                        duration_ms,
                        ..Default::default()
                    }
                } else {
                    ExecutionResult {
                        output: Some(output),
                        ..ExecutionResult::failure("container exited unexpectedly", duration_ms)
                    }
                }
            }
        };

        if let Err(err) = container.remove().await {
            warn!(%err, %id, "unable to remove container");
        }

        Ok(result)
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        self.client.ping().await?;

        Ok(())
    }
}

/// Owned Docker container, force-removed when dropped.
struct ContainerGuard {
    client: Docker,
    id: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(client: Docker, id: String) -> Self {
        Self {
            client,
            id,
            armed: true,
        }
    }

    fn id(&self) -> &str {
        &self.id
    }

    /// Remove the container, killing it if it's still running.
    async fn remove(mut self) -> Result<(), Error> {
        self.armed = false;

        remove_container(&self.client, &self.id).await
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!(id = %self.id, "unable to remove abandoned container");
            return;
        };

        let client = self.client.clone();
        let id = std::mem::take(&mut self.id);

        debug!(%id, "removing abandoned container");

        handle.spawn(async move {
            if let Err(err) = remove_container(&client, &id).await {
                warn!(%err, %id, "unable to remove abandoned container");
            }
        });
    }
}

async fn remove_container(client: &Docker, id: &str) -> Result<(), Error> {
    client
        .remove_container(
            id,
            Some(RemoveContainerOptions {
                v: true,
                force: true,
                ..Default::default()
            }),
        )
        .await
}

/// Environment variables passed to the program.
fn environment(runtime: Runtime) -> Vec<String> {
    let mut env = vec![
        format!("INPUT_PATH={WORKING_DIR}/{INPUT_FILE}"),
        String::from("HOME=/tmp"),
    ];

    if runtime == Runtime::Go {
        env.push(String::from("GOCACHE=/tmp/go-cache"));
    }

    env
}

/// Build a `tar` archive with the program source and its input,
/// to be extracted into the container's root.
pub(crate) fn build_archive(request: &ExecutionRequest) -> Result<Vec<u8>, ExecutorError> {
    let dir = WORKING_DIR.trim_start_matches('/');
    let input = serde_json::to_vec(request.input.as_ref().unwrap_or(&Value::Null))?;

    let mut builder = tar::Builder::new(Vec::new());

    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    builder.append_data(&mut header, format!("{dir}/"), io::empty())?;

    for (name, contents) in [
        (request.runtime.source_file(), request.code.as_bytes()),
        (INPUT_FILE, &input[..]),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_mode(0o644);
        header.set_size(contents.len() as u64);
        builder.append_data(&mut header, format!("{dir}/{name}"), contents)?;
    }

    Ok(builder.into_inner()?)
}
