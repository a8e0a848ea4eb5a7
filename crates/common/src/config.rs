use std::{net::SocketAddr, path::PathBuf};

use byte_unit::{n_kib_bytes, n_mib_bytes};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::Deserialize;

#[cfg(feature = "logging")]
use tracing_subscriber::filter::LevelFilter;

use crate::execution::Runtime;

/// Database configuration.
#[derive(Deserialize)]
pub struct Database {
    /// Database URL string.
    pub url: String,
}

/// HTTP API server configuration.
#[derive(Deserialize)]
pub struct Server {
    /// Address, that HTTP server will listen on.
    pub address: SocketAddr,

    /// Base URL of the execution sandbox service.
    pub sandbox_url: String,

    /// Default wall-clock limit for a single execution, in seconds.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout: u64,

    /// Upper bound for a caller-provided execution timeout, in seconds.
    #[serde(default = "default_max_execution_timeout")]
    pub max_execution_timeout: u64,

    /// Max uploaded source file size, in bytes.
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

fn default_execution_timeout() -> u64 {
    30
}

fn default_max_execution_timeout() -> u64 {
    120
}

fn default_max_upload_size() -> usize {
    n_mib_bytes!(10) as usize
}

/// Implementation of [`serde`]'s deserializer for [`FromStr`] types.
#[cfg(feature = "logging")]
fn deserialize_from_str<'de, T, D>(deserializer: D) -> Result<T, D::Error>
where
    T: std::str::FromStr,
    T::Err: std::error::Error,
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    std::str::FromStr::from_str(&s).map_err(serde::de::Error::custom)
}

/// Logging configuration.
#[cfg(feature = "logging")]
#[derive(Deserialize)]
pub struct Logging {
    /// Log level.
    #[serde(deserialize_with = "deserialize_from_str")]
    pub level: LevelFilter,
}

#[cfg(feature = "logging")]
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
        }
    }
}

/// Container images used for each supported runtime.
#[derive(Deserialize)]
pub struct Images {
    #[serde(default = "default_python_image")]
    pub python: String,

    #[serde(default = "default_nodejs_image")]
    pub nodejs: String,

    #[serde(default = "default_go_image")]
    pub go: String,
}

impl Images {
    /// Get the image name for the provided runtime.
    pub fn for_runtime(&self, runtime: Runtime) -> &str {
        match runtime {
            Runtime::Python => &self.python,
            Runtime::Nodejs => &self.nodejs,
            Runtime::Go => &self.go,
        }
    }
}

impl Default for Images {
    fn default() -> Self {
        Self {
            python: default_python_image(),
            nodejs: default_nodejs_image(),
            go: default_go_image(),
        }
    }
}

fn default_python_image() -> String {
    String::from("python:3.11-slim")
}

fn default_nodejs_image() -> String {
    String::from("node:18-alpine")
}

fn default_go_image() -> String {
    String::from("golang:1.22-alpine")
}

/// Code execution sandbox configuration.
#[derive(Deserialize)]
pub struct Sandbox {
    /// Address, that sandbox HTTP server will listen on.
    pub address: SocketAddr,

    /// Memory limit per execution.
    #[serde(default = "default_memory_limit")]
    pub memory_limit: i64,

    /// CPU quota per execution, in billionths of a CPU.
    #[serde(default = "default_nano_cpus")]
    pub nano_cpus: i64,

    /// Max count of processes a single execution may spawn.
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,

    /// Wall-clock limit used when a request doesn't specify one, in milliseconds.
    #[serde(default = "default_sandbox_timeout")]
    pub default_timeout: u64,

    /// Upper bound for a requested wall-clock limit, in milliseconds.
    #[serde(default = "default_sandbox_max_timeout")]
    pub max_timeout: u64,

    /// Max captured output size, in bytes.
    #[serde(default = "default_output_limit")]
    pub output_limit: usize,

    /// Max execution request body size, in bytes.
    ///
    /// Must fit the largest uploadable source file after JSON escaping.
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,

    /// Runtime image overrides.
    #[serde(default)]
    pub images: Images,
}

// Default values used for sandbox configuration.
// These are conservative enough for short test runs of interpreted code,
// Go builds may need a larger memory limit.
fn default_memory_limit() -> i64 {
    n_mib_bytes!(256) as i64
}

fn default_nano_cpus() -> i64 {
    500_000_000
}

fn default_pids_limit() -> i64 {
    64
}

fn default_sandbox_timeout() -> u64 {
    30_000
}

fn default_sandbox_max_timeout() -> u64 {
    120_000
}

fn default_output_limit() -> usize {
    n_kib_bytes!(256) as usize
}

fn default_max_request_size() -> usize {
    n_mib_bytes!(64) as usize
}

/// Source code artifact storage configuration.
#[derive(Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum Storage {
    /// AWS S3-compatible storage.
    S3 {
        /// Access key identifier.
        access_key_id: String,

        /// Secret access key.
        secret_access_key: String,

        /// S3 region name.
        region: String,

        /// S3 endpoint URL.
        endpoint_url: String,

        /// S3 bucket name for source code artifacts.
        artifact_bucket: String,
    },

    /// Local filesystem storage rooted at the provided directory.
    Filesystem {
        /// Root directory path.
        path: PathBuf,
    },
}

/// General configuration.
#[derive(Deserialize)]
pub struct Config {
    /// General database configuration.
    #[serde(default)]
    pub database: Option<Database>,

    /// HTTP API server configuration.
    #[serde(default)]
    pub server: Option<Server>,

    /// Logging configuration.
    #[cfg(feature = "logging")]
    #[serde(default)]
    pub logging: Logging,

    /// Execution sandbox configuration.
    #[serde(default)]
    pub sandbox: Option<Sandbox>,

    /// Storage configuration.
    #[serde(default)]
    pub storage: Option<Storage>,
}

impl Config {
    /// Create new config using default configuration file or environment variables.
    ///
    /// See [`Env`] for more details on how to use environment variables configuration.
    ///
    /// [`Env`]: figment::providers::Env
    pub fn new(path: Option<PathBuf>) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path.unwrap_or(PathBuf::from("Config.toml"))))
            .merge(Env::prefixed("CONFIG_").split("__"))
            .extract()
    }

    /// Create new config suitable for running unit tests.
    ///
    /// Uploaded artifacts are written into the provided directory.
    #[cfg(feature = "test-utils")]
    pub fn for_tests(storage_path: PathBuf) -> Self {
        Self {
            database: Some(Database {
                url: String::from("sqlite::memory:"),
            }),
            server: Some(Server {
                address: SocketAddr::from(([127, 0, 0, 1], 3000)),
                sandbox_url: String::from("http://127.0.0.1:9"),
                execution_timeout: default_execution_timeout(),
                max_execution_timeout: default_max_execution_timeout(),
                max_upload_size: default_max_upload_size(),
            }),
            #[cfg(feature = "logging")]
            logging: Logging::default(),
            sandbox: None,
            storage: Some(Storage::Filesystem { path: storage_path }),
        }
    }
}
