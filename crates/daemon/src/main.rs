// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! wardend - the warden service supervisor daemon
//!
//! Owns the event loop: control connections, SIGCHLD reaping, kill
//! timers, and stateful re-exec on SIGTERM.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod lifecycle;
mod server;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::{error, info};
use warden_core::Console;

use crate::lifecycle::{Config, LifecycleError};

#[derive(Parser)]
#[command(name = "wardend")]
#[command(about = "warden service supervisor")]
#[command(version)]
struct Args {
    /// Directory of job definitions
    #[arg(long, default_value = "/etc/warden")]
    confdir: PathBuf,

    /// Directory for daemon and job logs
    #[arg(long, default_value = "/var/log/warden")]
    logdir: PathBuf,

    /// Control socket path
    #[arg(long, default_value = "/run/wardend.sock")]
    socket: PathBuf,

    /// Console disposition for jobs that do not choose one (log, output,
    /// none)
    #[arg(long, value_name = "VALUE")]
    default_console: Option<String>,

    /// Disable job output capture
    #[arg(long)]
    no_log: bool,

    /// Disable per-user session scoping
    #[arg(long)]
    no_sessions: bool,

    /// Do not emit the startup event
    #[arg(long)]
    no_startup_event: bool,

    /// Flag that a re-exec has occurred
    #[arg(long)]
    restart: bool,

    /// Read serialised state from this descriptor
    #[arg(long, value_name = "FD")]
    state_fd: Option<i32>,

    /// Run as a per-user supervisor on the session bus
    #[arg(long)]
    session: bool,

    /// Name of the event emitted at startup
    #[arg(long, default_value = "startup", value_name = "NAME")]
    startup_event: String,
}

fn config_from(args: &Args) -> Result<Config, String> {
    let default_console = match &args.default_console {
        None => Console::Log,
        Some(value) => {
            Console::parse(value).ok_or_else(|| format!("unknown console mode: {}", value))?
        }
    };

    // A per-user supervisor keeps its socket in the user's runtime dir.
    let socket_path = if args.session {
        match std::env::var_os("XDG_RUNTIME_DIR") {
            Some(dir) => PathBuf::from(dir).join("wardend.sock"),
            None => args.socket.clone(),
        }
    } else {
        args.socket.clone()
    };
    let lock_path = socket_path.with_extension("pid");

    Ok(Config {
        confdir: args.confdir.clone(),
        logdir: args.logdir.clone(),
        socket_path,
        lock_path,
        default_console,
        no_log: args.no_log,
        no_startup_event: args.no_startup_event,
        startup_event: args.startup_event.clone(),
        restart: args.restart,
        state_fd: args.state_fd,
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let config = match config_from(&args) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("wardend: {}", message);
            std::process::exit(1);
        }
    };

    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(error) => {
            eprintln!("wardend: failed to set up logging: {}", error);
            std::process::exit(1);
        }
    };

    info!(
        confdir = %config.confdir.display(),
        restart = config.restart,
        "starting wardend"
    );

    let mut daemon = match lifecycle::startup(config) {
        Ok(daemon) => daemon,
        Err(error) => {
            error!(%error, "failed to start daemon");
            std::process::exit(1);
        }
    };

    if args.no_sessions {
        info!("per-user session scoping disabled");
    }

    // The startup event fires on fresh boots only; a re-exec'd
    // supervisor is resuming, not booting.
    if !daemon.config.restart && !daemon.config.no_startup_event {
        let name = daemon.config.startup_event.clone();
        daemon.supervisor.emit(name, vec![], None);
    }

    if let Err(error) = run(&mut daemon).await {
        error!(%error, "event loop failed");
        std::process::exit(1);
    }
    info!("daemon stopped");
}

async fn run(daemon: &mut lifecycle::DaemonState) -> std::io::Result<()> {
    let mut sigchld = signal(SignalKind::child())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sighup = signal(SignalKind::hangup())?;

    let (request_tx, mut request_rx) = mpsc::channel::<server::ControlRequest>(64);

    loop {
        // Drain the queue before sleeping; nothing below may run with
        // unhandled events pending.
        let replies = daemon.supervisor.poll();
        daemon.deliver(replies);

        if daemon.shutdown_requested {
            daemon.shutdown();
            break;
        }
        if daemon.reexec_requested {
            let error = daemon.reexec();
            error!(%error, "re-exec failed, continuing");
            daemon.reexec_requested = false;
        }

        let tick = daemon
            .supervisor
            .next_timer_deadline()
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::from_secs(1))
            .min(Duration::from_secs(1));

        tokio::select! {
            result = daemon.listener.accept() => {
                match result {
                    Ok((stream, _)) => {
                        tokio::spawn(server::handle_connection(stream, request_tx.clone()));
                    }
                    Err(error) => error!(%error, "accept failed"),
                }
            }

            Some((request, reply)) = request_rx.recv() => {
                daemon.dispatch(request, reply);
            }

            _ = sigchld.recv() => {
                daemon.reap();
            }

            _ = sigterm.recv() => {
                info!("SIGTERM received, scheduling stateful re-exec");
                daemon.reexec_requested = true;
            }

            _ = sigint.recv() => {
                info!("SIGINT received, shutting down");
                daemon.shutdown_requested = true;
            }

            _ = sighup.recv() => {
                info!("SIGHUP received, reloading configuration");
                daemon.reload();
            }

            _ = tokio::time::sleep(tick) => {
                daemon.supervisor.fire_timers();
            }
        }
    }
    Ok(())
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    std::fs::create_dir_all(&config.logdir)?;
    let file_appender = tracing_appender::rolling::never(&config.logdir, "wardend.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
