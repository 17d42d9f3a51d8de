// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup, request dispatch, re-exec, shutdown.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::os::fd::{FromRawFd, IntoRawFd};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::time::Instant;

use fs2::FileExt;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tracing::{info, warn};
use warden_adapters::{JobLogger, ProcessSpawner};
use warden_core::{Console, CoreError, ExitStatus, ReplyId, SystemClock};
use warden_daemon::conf::{self, ConfError};
use warden_daemon::protocol::{JobInfo, Request, Response, PROTOCOL_VERSION};
use warden_engine::{Reply, Supervisor};
use warden_storage::Snapshot;

pub type DaemonSupervisor = Supervisor<ProcessSpawner, SystemClock>;

/// Resolved daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub confdir: PathBuf,
    pub logdir: PathBuf,
    pub socket_path: PathBuf,
    pub lock_path: PathBuf,
    pub default_console: Console,
    pub no_log: bool,
    pub no_startup_event: bool,
    pub startup_event: String,
    pub restart: bool,
    pub state_fd: Option<i32>,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("failed to bind socket at {0}: {1}")]
    BindFailed(PathBuf, std::io::Error),

    #[error("configuration error: {0}")]
    Conf(#[from] ConfError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Live daemon state.
pub struct DaemonState {
    pub config: Config,
    // NOTE(lifetime): held to keep the exclusive pid-file lock
    #[allow(dead_code)]
    lock_file: File,
    pub listener: UnixListener,
    pub supervisor: DaemonSupervisor,
    pub start_time: Instant,
    pub shutdown_requested: bool,
    pub reexec_requested: bool,
    pending: HashMap<ReplyId, oneshot::Sender<Response>>,
    next_reply: ReplyId,
}

/// Start the daemon: lock first, bind the socket last.
pub fn startup(config: Config) -> Result<DaemonState, LifecycleError> {
    if let Some(parent) = config.socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.logdir)?;

    // Lock before anything else to keep startup races out.
    let mut lock_file = File::create(&config.lock_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    use std::io::Write;
    writeln!(lock_file, "{}", std::process::id())?;

    let logger = if config.no_log {
        None
    } else {
        Some(JobLogger::new(config.logdir.join("jobs")))
    };
    let spawner = ProcessSpawner::new(logger);

    // Restore from the state fd when re-exec'd; a bad snapshot means a
    // fresh boot, not a dead init.
    let mut supervisor = match (config.restart, config.state_fd) {
        (true, Some(fd)) => match read_state(fd) {
            Ok(restored) => {
                info!(
                    jobs = restored.core.jobs.len(),
                    events = restored.core.events.len(),
                    "restored state from previous instance"
                );
                let mut sup = Supervisor::with_core(restored.core, spawner, SystemClock);
                sup.restore_kill_timers(restored.kill_timers);
                sup
            }
            Err(error) => {
                warn!(%error, "state restore failed, continuing as fresh boot");
                Supervisor::new(spawner, SystemClock)
            }
        },
        _ => Supervisor::new(spawner, SystemClock),
    };

    let classes = conf::load_dir(&config.confdir, config.default_console)?;
    info!(classes = classes.len(), "loaded job definitions");
    supervisor.reload_classes(classes);

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)
        .map_err(|e| LifecycleError::BindFailed(config.socket_path.clone(), e))?;

    info!(socket = %config.socket_path.display(), "daemon ready");

    Ok(DaemonState {
        config,
        lock_file,
        listener,
        supervisor,
        start_time: Instant::now(),
        shutdown_requested: false,
        reexec_requested: false,
        pending: HashMap::new(),
        next_reply: 1,
    })
}

fn read_state(fd: i32) -> Result<warden_storage::Restored, Box<dyn std::error::Error>> {
    let file = unsafe { File::from_raw_fd(fd) };
    let snapshot = Snapshot::from_reader(BufReader::new(file))?;
    Ok(snapshot.restore(Instant::now())?)
}

impl DaemonState {
    /// Handle one control request. Wait-style requests park the reply
    /// sender until the supervisor resolves it.
    pub fn dispatch(&mut self, request: Request, reply: oneshot::Sender<Response>) {
        match request {
            Request::Ping => {
                let _ = reply.send(Response::Pong);
            }

            Request::Status => {
                let core = self.supervisor.core();
                let response = Response::Status {
                    version: PROTOCOL_VERSION,
                    uptime_secs: self.start_time.elapsed().as_secs(),
                    classes: core.classes.ids().len(),
                    instances: core.jobs.len(),
                    events_pending: core.events.len(),
                };
                let _ = reply.send(response);
            }

            Request::List => {
                let jobs = self
                    .supervisor
                    .list_jobs()
                    .into_iter()
                    .map(|row| JobInfo {
                        name: row.class,
                        instance: row.instance,
                        goal: row.goal.name().to_string(),
                        state: row.state.name().to_string(),
                        pid: row.pid,
                    })
                    .collect();
                let _ = reply.send(Response::Jobs { jobs });
            }

            Request::Start { name, env, wait } => {
                self.control(reply, wait, |sup, rid| sup.start_job(&name, env, None, rid));
            }

            Request::Stop { name, env, wait } => {
                self.control(reply, wait, |sup, rid| sup.stop_job(&name, env, None, rid));
            }

            Request::Restart { name, env, wait } => {
                self.control(reply, wait, |sup, rid| {
                    sup.restart_job(&name, env, None, rid)
                });
            }

            Request::Emit { name, env, wait } => {
                if wait {
                    let rid = self.allocate_reply(reply);
                    self.supervisor.emit_with_reply(name, env, None, rid);
                } else {
                    self.supervisor.emit(name, env, None);
                    let _ = reply.send(Response::Ok);
                }
            }

            Request::Reload => {
                self.reload();
                let _ = reply.send(Response::Ok);
            }

            Request::Reexec => {
                self.reexec_requested = true;
                let _ = reply.send(Response::Restarting);
            }

            Request::Shutdown => {
                self.shutdown_requested = true;
                let _ = reply.send(Response::ShuttingDown);
            }
        }
    }

    fn control(
        &mut self,
        reply: oneshot::Sender<Response>,
        wait: bool,
        operation: impl FnOnce(&mut DaemonSupervisor, Option<ReplyId>) -> Result<(), CoreError>,
    ) {
        if wait {
            let rid = self.allocate_reply(reply);
            if let Err(error) = operation(&mut self.supervisor, Some(rid)) {
                if let Some(sender) = self.pending.remove(&rid) {
                    let _ = sender.send(Response::error(&error));
                }
            }
        } else {
            let response = match operation(&mut self.supervisor, None) {
                Ok(()) => Response::Ok,
                Err(error) => Response::error(&error),
            };
            let _ = reply.send(response);
        }
    }

    fn allocate_reply(&mut self, sender: oneshot::Sender<Response>) -> ReplyId {
        let rid = self.next_reply;
        self.next_reply += 1;
        self.pending.insert(rid, sender);
        rid
    }

    /// Deliver replies the supervisor resolved during a poll.
    pub fn deliver(&mut self, replies: Vec<Reply>) {
        for Reply { id, result } in replies {
            let Some(sender) = self.pending.remove(&id) else {
                continue;
            };
            let response = match result {
                Ok(()) => Response::Ok,
                Err(error) => Response::error(&error),
            };
            let _ = sender.send(response);
        }
    }

    /// Reap every exited child and route it into the supervisor.
    pub fn reap(&mut self) {
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::Exited(pid, code)) => {
                    self.supervisor
                        .handle_child_exit(pid.as_raw(), ExitStatus::Code(code));
                }
                Ok(WaitStatus::Signaled(pid, signal, _)) => {
                    self.supervisor
                        .handle_child_exit(pid.as_raw(), ExitStatus::Signal(signal as i32));
                }
                Ok(WaitStatus::StillAlive) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }
    }

    /// Re-scan the configuration directory.
    pub fn reload(&mut self) {
        match conf::load_dir(&self.config.confdir, self.config.default_console) {
            Ok(classes) => {
                info!(classes = classes.len(), "reloaded job definitions");
                self.supervisor.reload_classes(classes);
            }
            Err(error) => warn!(%error, "configuration reload failed"),
        }
    }

    /// Serialise state and replace the running binary. Only returns on
    /// failure; the caller logs and carries on.
    pub fn reexec(&mut self) -> std::io::Error {
        info!("performing stateful re-exec");

        let state_path = self.config.logdir.join("wardend.state");
        let snapshot = warden_storage::capture(
            self.supervisor.core(),
            &self.supervisor.kill_timers(),
            self.supervisor.now(),
            vec![self.config.confdir.clone()],
        );

        let fd = match write_state_file(&state_path, &snapshot) {
            Ok(fd) => fd,
            Err(error) => return error,
        };

        let mut command = std::process::Command::new("/proc/self/exe");
        command
            .arg("--restart")
            .arg("--state-fd")
            .arg(fd.to_string())
            .arg("--confdir")
            .arg(&self.config.confdir)
            .arg("--logdir")
            .arg(&self.config.logdir)
            .arg("--socket")
            .arg(&self.config.socket_path)
            .arg("--startup-event")
            .arg(&self.config.startup_event);
        if self.config.no_log {
            command.arg("--no-log");
        }
        if self.config.no_startup_event {
            command.arg("--no-startup-event");
        }

        // The lock and listener descriptors are close-on-exec; the child
        // re-acquires both.
        let error = command.exec();
        let _ = nix::unistd::close(fd);
        error
    }

    /// Remove the socket and pid file on the way out.
    pub fn shutdown(&mut self) {
        info!("shutting down");
        if self.config.socket_path.exists() {
            if let Err(error) = std::fs::remove_file(&self.config.socket_path) {
                warn!(%error, "failed to remove socket");
            }
        }
        if self.config.lock_path.exists() {
            if let Err(error) = std::fs::remove_file(&self.config.lock_path) {
                warn!(%error, "failed to remove pid file");
            }
        }
        info!("shutdown complete");
    }
}

/// Write the snapshot, reopen it for reading with close-on-exec cleared,
/// and unlink the path so only the descriptor remains.
fn write_state_file(
    path: &std::path::Path,
    snapshot: &Snapshot,
) -> Result<i32, std::io::Error> {
    let file = File::create(path)?;
    snapshot
        .to_writer(&file)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    file.sync_all()?;
    drop(file);

    let read_side = File::open(path)?;
    let _ = std::fs::remove_file(path);
    let fd = read_side.into_raw_fd();

    nix::fcntl::fcntl(fd, nix::fcntl::FcntlArg::F_SETFD(nix::fcntl::FdFlag::empty()))
        .map_err(std::io::Error::from)?;
    Ok(fd)
}
