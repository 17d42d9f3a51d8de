// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Real fork/exec spawner

use super::{SpawnError, SpawnRequest, Spawner};
use crate::log::JobLogger;
use nix::sys::resource::Resource;
use nix::sys::signal::{kill, Signal};
use nix::unistd::{Gid, Pid, Uid};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use warden_core::{process::signal_number, Console};

/// Spawns hook processes with the class's credential and resource
/// settings applied between fork and exec.
pub struct ProcessSpawner {
    logger: Option<JobLogger>,
}

impl ProcessSpawner {
    /// `logger` is the per-job output sink; `None` disables log capture
    /// (children with `console = log` fall back to null).
    pub fn new(logger: Option<JobLogger>) -> Self {
        Self { logger }
    }

    fn build_command(&self, request: &SpawnRequest) -> Result<Command, SpawnError> {
        let mut command = if request.command.script {
            let mut c = Command::new("/bin/sh");
            c.args(["-e", "-c", &request.command.command]);
            c
        } else {
            let mut parts = request.command.command.split_whitespace();
            let program = parts.next().ok_or(SpawnError::EmptyCommand)?;
            let mut c = Command::new(program);
            c.args(parts);
            c
        };

        command.env_clear();
        for entry in &request.env {
            let (key, value) = warden_core::environ::split(entry);
            command.env(key, value);
        }

        self.wire_console(&mut command, request)?;
        Ok(command)
    }

    fn wire_console(
        &self,
        command: &mut Command,
        request: &SpawnRequest,
    ) -> Result<(), SpawnError> {
        command.stdin(Stdio::null());
        match request.console {
            Console::Output => {
                command.stdout(Stdio::inherit());
                command.stderr(Stdio::inherit());
            }
            Console::None => {
                command.stdout(Stdio::null());
                command.stderr(Stdio::null());
            }
            Console::Log => match &self.logger {
                Some(logger) => {
                    let sink = logger.sink(&request.class, &request.instance)?;
                    command.stdout(Stdio::from(sink.try_clone()?));
                    command.stderr(Stdio::from(sink));
                }
                None => {
                    command.stdout(Stdio::null());
                    command.stderr(Stdio::null());
                }
            },
        }
        Ok(())
    }
}

impl Spawner for ProcessSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<i32, SpawnError> {
        let mut command = self.build_command(request)?;

        // Resolve names before forking; lookups are not fork-safe.
        let uid = resolve_uid(request.setuid.as_deref())?;
        let gid = resolve_gid(request.setgid.as_deref())?;
        let limits = resolve_limits(&request.limits)?;

        let umask = request.umask;
        let nice = request.nice;
        let chroot = request.chroot.clone();
        let chdir = request.chdir.clone();

        let setup = move || -> std::io::Result<()> {
            nix::unistd::setsid().map_err(std::io::Error::from)?;
            nix::sys::stat::umask(nix::sys::stat::Mode::from_bits_truncate(umask));

            if let Some(nice) = nice {
                let rc =
                    unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice as libc::c_int) };
                if rc != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            for (resource, soft, hard) in &limits {
                nix::sys::resource::setrlimit(*resource, *soft, *hard)
                    .map_err(std::io::Error::from)?;
            }
            if let Some(root) = &chroot {
                nix::unistd::chroot(root.as_path()).map_err(std::io::Error::from)?;
            }
            if let Some(dir) = &chdir {
                nix::unistd::chdir(dir.as_path()).map_err(std::io::Error::from)?;
            }
            // Group before user, while we still can.
            if let Some(gid) = gid {
                nix::unistd::setgid(gid).map_err(std::io::Error::from)?;
            }
            if let Some(uid) = uid {
                nix::unistd::setuid(uid).map_err(std::io::Error::from)?;
            }
            Ok(())
        };
        unsafe {
            command.pre_exec(setup);
        }

        let child = command.spawn()?;
        let pid = child.id() as i32;

        if let Some(score) = request.oom_score {
            let path = format!("/proc/{}/oom_score_adj", pid);
            if let Err(error) = std::fs::write(&path, score.to_string()) {
                tracing::warn!(pid, %error, "failed to set oom score");
            }
        }

        tracing::debug!(
            class = %request.class,
            process = %request.process,
            pid,
            "spawned"
        );
        Ok(pid)
    }

    fn kill(&self, pid: i32, signal: &str) -> Result<(), SpawnError> {
        let number =
            signal_number(signal).ok_or_else(|| SpawnError::UnknownSignal(signal.to_string()))?;
        let signal = Signal::try_from(number)
            .map_err(|_| SpawnError::UnknownSignal(number.to_string()))?;
        kill(Pid::from_raw(pid), signal).map_err(|e| SpawnError::Kill(e.to_string()))
    }
}

fn resolve_uid(name: Option<&str>) -> Result<Option<Uid>, SpawnError> {
    match name {
        None => Ok(None),
        Some(name) => nix::unistd::User::from_name(name)
            .map_err(|e| SpawnError::Failed(e.to_string()))?
            .map(|user| user.uid)
            .ok_or_else(|| SpawnError::UnknownUser(name.to_string()))
            .map(Some),
    }
}

fn resolve_gid(name: Option<&str>) -> Result<Option<Gid>, SpawnError> {
    match name {
        None => Ok(None),
        Some(name) => nix::unistd::Group::from_name(name)
            .map_err(|e| SpawnError::Failed(e.to_string()))?
            .map(|group| group.gid)
            .ok_or_else(|| SpawnError::UnknownGroup(name.to_string()))
            .map(Some),
    }
}

fn resolve_limits(
    limits: &[warden_core::Rlimit],
) -> Result<Vec<(Resource, u64, u64)>, SpawnError> {
    limits
        .iter()
        .map(|limit| {
            let resource = match limit.resource.as_str() {
                "core" => Resource::RLIMIT_CORE,
                "cpu" => Resource::RLIMIT_CPU,
                "data" => Resource::RLIMIT_DATA,
                "fsize" => Resource::RLIMIT_FSIZE,
                "memlock" => Resource::RLIMIT_MEMLOCK,
                "nofile" => Resource::RLIMIT_NOFILE,
                "nproc" => Resource::RLIMIT_NPROC,
                "stack" => Resource::RLIMIT_STACK,
                "as" => Resource::RLIMIT_AS,
                other => return Err(SpawnError::UnknownResource(other.to_string())),
            };
            Ok((resource, limit.soft, limit.hard))
        })
        .collect()
}
