//! Wire contract between the API server and the execution sandbox.
//!
//! Both sides exchange JSON bodies: the API server sends an
//! [`ExecutionRequest`] to `POST /execute` and receives an [`ExecutionResult`].
//!
//! An [`ExecutionResult`] with a non-zero `exit_code` is a successful sandbox
//! run of a failing program. Sandbox-level failures (timeouts, crashes, resource
//! limit violations) are reported through the `error` field with no `exit_code`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported code runtimes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Python,
    Nodejs,
    Go,
}

impl Runtime {
    /// File name used for the program source inside of a sandbox.
    pub fn source_file(&self) -> &'static str {
        match self {
            Runtime::Python => "main.py",
            Runtime::Nodejs => "main.js",
            Runtime::Go => "main.go",
        }
    }

    /// Command used to start a program placed into the provided directory.
    pub fn command(&self, dir: &str) -> Vec<String> {
        let source = format!("{dir}/{}", self.source_file());

        match self {
            Runtime::Python => vec![String::from("python"), String::from("-u"), source],
            Runtime::Nodejs => vec![String::from("node"), source],
            Runtime::Go => vec![String::from("go"), String::from("run"), source],
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Runtime::Python => write!(f, "python"),
            Runtime::Nodejs => write!(f, "nodejs"),
            Runtime::Go => write!(f, "go"),
        }
    }
}

/// Ad-hoc execution request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Program source code.
    pub code: String,

    /// Runtime used to run the program.
    pub runtime: Runtime,

    /// Optional JSON input made available to the program.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,

    /// Requested wall-clock limit, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Normalized execution result.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Combined program output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Sandbox-level failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Program exit code, present only if the program ran to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i64>,

    /// Total execution duration.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Create a result describing a sandbox-level failure.
    pub fn failure(error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            error: Some(error.into()),
            duration_ms,
            ..Default::default()
        }
    }
}
