// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardenctl - control client for the warden supervisor

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use warden_daemon::protocol::Request;

use crate::client::Client;

#[derive(Parser)]
#[command(name = "wardenctl")]
#[command(about = "Control the warden service supervisor")]
#[command(version)]
struct Cli {
    /// Daemon control socket
    #[arg(long, global = true, default_value = "/run/wardend.sock")]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a job
    Start {
        job: String,
        /// KEY=VALUE environment for the instance
        env: Vec<String>,
        /// Return immediately instead of waiting for the job to start
        #[arg(long)]
        no_wait: bool,
    },
    /// Stop a job
    Stop {
        job: String,
        env: Vec<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Restart a job
    Restart {
        job: String,
        env: Vec<String>,
        #[arg(long)]
        no_wait: bool,
    },
    /// Emit an event
    Emit {
        event: String,
        env: Vec<String>,
        /// Return immediately instead of waiting for handlers to finish
        #[arg(long)]
        no_wait: bool,
    },
    /// List jobs and their states
    List,
    /// Show daemon status
    Status,
    /// Check the daemon is alive
    Ping,
    /// Re-scan job definitions
    Reload,
    /// Ask the daemon to re-exec itself, preserving state
    Reexec,
    /// Shut the daemon down
    Shutdown,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new(&cli.socket);

    let (request, wait) = match cli.command {
        Commands::Start { job, env, no_wait } => (
            Request::Start {
                name: job,
                env,
                wait: !no_wait,
            },
            !no_wait,
        ),
        Commands::Stop { job, env, no_wait } => (
            Request::Stop {
                name: job,
                env,
                wait: !no_wait,
            },
            !no_wait,
        ),
        Commands::Restart { job, env, no_wait } => (
            Request::Restart {
                name: job,
                env,
                wait: !no_wait,
            },
            !no_wait,
        ),
        Commands::Emit {
            event,
            env,
            no_wait,
        } => (
            Request::Emit {
                name: event,
                env,
                wait: !no_wait,
            },
            !no_wait,
        ),
        Commands::List => (Request::List, false),
        Commands::Status => (Request::Status, false),
        Commands::Ping => (Request::Ping, false),
        Commands::Reload => (Request::Reload, false),
        Commands::Reexec => (Request::Reexec, false),
        Commands::Shutdown => (Request::Shutdown, false),
    };

    let response = client.request(&request, wait).await?;
    output::print_response(&response)
}
