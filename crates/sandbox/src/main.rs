//! # Execution sandbox
//!
//! Sandbox service runs untrusted code submitted by the API server,
//! one fresh Docker container per request.
//!
//! # CLI subcommands
//!
//! Currently, sandbox provides just one command - [`serve`],
//! which starts an HTTP server accepting execution requests.
//!
//! [`serve`]: commands::serve
//!
//! # Isolation
//!
//! Containers are started with networking disabled, all capabilities dropped
//! and memory, CPU and process count limits applied. Program source and input
//! are copied into the container before it starts, no host paths are mounted.
//!
//! Each container is owned by a guard that force-removes it on drop,
//! so a run abandoned by its caller is cleaned up as well.
//! See the [`executor`] module for more details.

#![deny(missing_docs)]

/// CLI configuration and available subcommands.
mod cli;

/// Subcommand implementations.
mod commands;

/// Execution backends.
mod executor;

/// HTTP routes.
mod routes;

use clap::Parser;
use cli::{Cli, Command};
use common::{config::Config, logging};

/// Execution sandbox entrypoint.
#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    let config = Config::new(cli.config)?;

    logging::init(&config);

    let Some(sandbox_config) = config.sandbox else {
        return Err(anyhow::Error::msg("unable to load sandbox config"));
    };

    match cli.command {
        Command::Serve => commands::serve(sandbox_config).await?,
    }

    Ok(())
}
