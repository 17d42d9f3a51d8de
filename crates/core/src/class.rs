// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job classes
//!
//! A class is the template a job instance is stamped from: process table,
//! start/stop predicates, kill and respawn policy, and the credential and
//! resource settings handed to the spawner.

use crate::operator::EventOperator;
use crate::process::{ProcessCommand, ProcessType};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How many forks to expect after the main process before the real pid
/// settles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ExpectMode {
    #[default]
    None,
    /// Double fork into a daemon.
    Daemon,
    /// Single fork.
    Fork,
    /// Raises SIGSTOP when ready.
    Stop,
}

/// Respawn policy for the main process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespawnPolicy {
    pub enabled: bool,
    /// Maximum respawns within `interval` before giving up.
    pub limit: u32,
    pub interval: Duration,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            limit: 10,
            interval: Duration::from_secs(5),
        }
    }
}

/// An exit the class considers normal (no failure, no respawn).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormalExit {
    Code(i32),
    Signal(String),
}

/// A recorded resource limit, applied by the spawner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rlimit {
    /// Resource name (`nofile`, `core`, ...).
    pub resource: String,
    pub soft: u64,
    pub hard: u64,
}

/// Where child process output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Console {
    /// Captured to the job's log sink.
    #[default]
    Log,
    /// Inherit the supervisor's console.
    Output,
    /// Discarded.
    None,
}

impl Console {
    pub fn parse(value: &str) -> Option<Console> {
        Some(match value {
            "log" => Console::Log,
            "output" => Console::Output,
            "none" => Console::None,
            _ => return None,
        })
    }
}

/// A job template, keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct JobClass {
    pub name: String,
    pub description: Option<String>,
    /// Instance name template, expanded per-start against the start
    /// environment. `None` makes the class a singleton.
    pub instance: Option<String>,
    pub session: Option<SessionId>,

    pub start_on: Option<EventOperator>,
    pub stop_on: Option<EventOperator>,

    /// Process table indexed by `ProcessType::index`.
    pub process: [Option<ProcessCommand>; 5],

    /// Expected to run to completion rather than stay running.
    pub task: bool,
    pub expect: ExpectMode,

    /// Signal name sent by the kill discipline before SIGKILL.
    pub kill_signal: String,
    pub kill_timeout: Duration,

    pub respawn: RespawnPolicy,
    /// Exits treated as normal for the main process.
    pub normal_exit: Vec<NormalExit>,

    pub umask: u32,
    pub nice: Option<i8>,
    pub oom_score: Option<i16>,
    pub limits: Vec<Rlimit>,
    pub chroot: Option<PathBuf>,
    pub chdir: Option<PathBuf>,
    pub setuid: Option<String>,
    pub setgid: Option<String>,
    pub console: Console,

    /// Default environment for new instances.
    pub env: Vec<String>,
    /// Job environment keys exported onto lifecycle events.
    pub export: Vec<String>,
    /// Events this class documents itself as emitting.
    pub emits: Vec<String>,

    /// Reload dropped this class but instances remain; destroyed once the
    /// last instance stops.
    pub deleted: bool,
}

impl JobClass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            instance: None,
            session: None,
            start_on: None,
            stop_on: None,
            process: Default::default(),
            task: false,
            expect: ExpectMode::None,
            kill_signal: "TERM".to_string(),
            kill_timeout: Duration::from_secs(5),
            respawn: RespawnPolicy::default(),
            normal_exit: Vec::new(),
            umask: 0o022,
            nice: None,
            oom_score: None,
            limits: Vec::new(),
            chroot: None,
            chdir: None,
            setuid: None,
            setgid: None,
            console: Console::default(),
            env: Vec::new(),
            export: Vec::new(),
            emits: Vec::new(),
            deleted: false,
        }
    }

    pub fn process(&self, ptype: ProcessType) -> Option<&ProcessCommand> {
        self.process[ptype.index()].as_ref()
    }

    pub fn set_process(&mut self, ptype: ProcessType, command: ProcessCommand) {
        self.process[ptype.index()] = Some(command);
    }

    pub fn has_process(&self, ptype: ProcessType) -> bool {
        self.process[ptype.index()].is_some()
    }

    /// Whether an exit matches the class's normal-exit set. Exits with
    /// code 0 are always normal.
    pub fn exit_is_normal(&self, status: crate::process::ExitStatus) -> bool {
        use crate::process::ExitStatus;
        match status {
            ExitStatus::Code(0) => true,
            ExitStatus::Code(code) => self
                .normal_exit
                .iter()
                .any(|n| matches!(n, NormalExit::Code(c) if *c == code)),
            ExitStatus::Signal(sig) => self.normal_exit.iter().any(|n| match n {
                NormalExit::Signal(name) => crate::process::signal_number(name) == Some(sig),
                NormalExit::Code(_) => false,
            }),
        }
    }
}

#[cfg(test)]
#[path = "class_tests.rs"]
mod tests;
