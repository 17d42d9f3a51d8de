// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawner contract
//!
//! The state machine asks the spawner to fork+exec hook processes under a
//! class's credential and resource settings. The contract is synchronous:
//! `spawn` returns the live child pid or a failure, and the state machine
//! observes the failure inside the same transition. Child exits arrive
//! later through the reaper.

mod process;

pub use process::ProcessSpawner;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeSpawner, SpawnCall};

use std::path::PathBuf;
use thiserror::Error;
use warden_core::{Console, ProcessCommand, ProcessType, Rlimit};

/// Errors from spawning or signalling a process.
#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("unknown signal: {0}")]
    UnknownSignal(String),

    #[error("unknown resource limit: {0}")]
    UnknownResource(String),

    #[error("empty command")]
    EmptyCommand,

    #[error("kill failed: {0}")]
    Kill(String),

    #[error("{0}")]
    Failed(String),
}

/// Everything the spawner needs to run one hook process.
#[derive(Debug, Clone)]
pub struct SpawnRequest {
    /// Class name, used for log sink naming and diagnostics.
    pub class: String,
    /// Instance name; empty for singletons.
    pub instance: String,
    pub process: ProcessType,
    pub command: ProcessCommand,
    /// Ordered `KEY=VALUE` environment for the child.
    pub env: Vec<String>,

    pub umask: u32,
    pub nice: Option<i8>,
    pub oom_score: Option<i16>,
    pub limits: Vec<Rlimit>,
    pub chroot: Option<PathBuf>,
    pub chdir: Option<PathBuf>,
    pub setuid: Option<String>,
    pub setgid: Option<String>,
    pub console: Console,
}

/// Fork/exec and signalling seam between the engine and the kernel.
pub trait Spawner {
    /// Start the requested process, returning its pid.
    fn spawn(&self, request: &SpawnRequest) -> Result<i32, SpawnError>;

    /// Send a named signal (`TERM`, `KILL`, ...) to a process.
    fn kill(&self, pid: i32, signal: &str) -> Result<(), SpawnError>;
}
