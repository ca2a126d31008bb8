//! CLI for the mirrorget downloader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mirrorget_core::config;
use std::path::PathBuf;

use commands::{run_dest, run_fetch, run_probe, run_servers, FetchArgs};

/// Top-level CLI for mirrorget.
#[derive(Debug, Parser)]
#[command(name = "mirrorget")]
#[command(about = "mirrorget: segmented downloads from several mirrors at once", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download one file, split across the configured mirrors.
    Fetch {
        /// Path of the file relative to every mirror root.
        path: String,
        /// Identifier echoed in progress and result events.
        #[arg(long, default_value = "1")]
        id: i64,
        /// Mirror base URL (repeatable); replaces the configured list.
        #[arg(long = "server", value_name = "URL")]
        servers: Vec<String>,
        /// Destination folder (default: config value, else the current directory).
        #[arg(long, value_name = "DIR")]
        dest: Option<PathBuf>,
        /// Print every event as a JSON line instead of a progress line.
        #[arg(long)]
        json: bool,
    },

    /// Ask each mirror for size, range support and content hash of a file.
    Probe {
        /// Path of the file relative to every mirror root.
        path: String,
        /// Mirror base URL (repeatable); replaces the configured list.
        #[arg(long = "server", value_name = "URL")]
        servers: Vec<String>,
    },

    /// Show or replace the configured mirror list.
    Servers {
        #[command(subcommand)]
        command: ServersCommand,
    },

    /// Print where a file would be saved.
    Dest {
        /// Path of the file relative to every mirror root.
        path: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum ServersCommand {
    /// Print the configured mirrors in order.
    List,
    /// Replace the configured mirrors (order matters).
    Set {
        #[arg(required = true, value_name = "URL")]
        urls: Vec<String>,
    },
}

impl CliCommand {
    /// Parses arguments, runs the command and returns the process exit code.
    pub async fn run_from_args() -> Result<i32> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                path,
                id,
                servers,
                dest,
                json,
            } => {
                let args = FetchArgs {
                    path,
                    id,
                    servers,
                    dest,
                    json,
                };
                return run_fetch(cfg, args).await;
            }
            CliCommand::Probe { path, servers } => run_probe(&cfg, &path, servers).await?,
            CliCommand::Servers { command } => run_servers(cfg, command)?,
            CliCommand::Dest { path } => run_dest(&cfg, &path),
        }

        Ok(0)
    }
}

#[cfg(test)]
mod tests;
