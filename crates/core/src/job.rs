// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job instances
//!
//! A job is a live instantiation of a class with its own (goal, state)
//! machine. The legal successor for every (state, goal) pair is fixed;
//! `next_state` is that table. Asking for an illegal successor is a
//! programming error and panics, on the grounds that a confused PID 1 is
//! worse than a restarted one.

use crate::blocked::Blocked;
use crate::class::JobClass;
use crate::event::EventId;
use crate::operator::EventOperator;
use crate::process::ProcessType;
use crate::registry::ClassId;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Index into the job table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub usize);

/// The intent a job is being driven toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Goal {
    Stop,
    Start,
    /// Like Start, but skips pre-stop on the way down; set by the reaper
    /// when a respawnable main process dies.
    Respawn,
}

impl Goal {
    pub fn name(self) -> &'static str {
        match self {
            Goal::Stop => "stop",
            Goal::Start => "start",
            Goal::Respawn => "respawn",
        }
    }
}

impl std::fmt::Display for Goal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The current phase of the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    Waiting,
    Starting,
    PreStart,
    Spawned,
    PostStart,
    Running,
    PreStop,
    Stopping,
    Killed,
    PostStop,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Waiting => "waiting",
            State::Starting => "starting",
            State::PreStart => "pre-start",
            State::Spawned => "spawned",
            State::PostStart => "post-start",
            State::Running => "running",
            State::PreStop => "pre-stop",
            State::Stopping => "stopping",
            State::Killed => "killed",
            State::PostStop => "post-stop",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fork tracer progress for `expect` modes other than `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TraceState {
    #[default]
    None,
    /// Waiting for the tracer to report the settled pid.
    Active,
    Done,
}

/// A live instantiation of a class.
#[derive(Debug, Clone)]
pub struct Job {
    pub class: ClassId,
    /// Expanded instance name; empty for a singleton class.
    pub name: String,

    pub goal: Goal,
    pub state: State,

    /// Current job environment.
    pub env: Vec<String>,
    /// Environment to swap in at the next STARTING entry.
    pub start_env: Option<Vec<String>>,
    /// Environment appended for the next pre-stop script.
    pub stop_env: Option<Vec<String>>,

    /// Per-instance copy of the class stop predicate, so match state is
    /// not shared between instances.
    pub stop_on: Option<EventOperator>,

    /// Pid per process slot; `None` when not running.
    pub pid: [Option<i32>; 5],

    /// Event this job is waiting on, if any. While set, nothing but that
    /// event finishing advances the state machine.
    pub blocker: Option<EventId>,
    /// Events this job is holding open plus waiting control callers.
    pub blocking: Vec<Blocked>,

    pub failed: bool,
    /// Process that caused the failure; `None` with `failed` set means a
    /// respawn-loop failure.
    pub failed_process: Option<ProcessType>,
    /// Encoded exit status (signal in the high byte); `None` means the
    /// spawn itself failed.
    pub exit_status: Option<i32>,

    /// Start of the current respawn-rate window.
    pub respawn_time: Option<Instant>,
    pub respawn_count: u32,

    pub trace_forks: u32,
    pub trace_state: TraceState,
}

impl Job {
    /// Create a fresh instance of `class`, copying its stop predicate.
    pub fn new(class_id: ClassId, class: &JobClass, name: impl Into<String>) -> Self {
        Self {
            class: class_id,
            name: name.into(),
            goal: Goal::Stop,
            state: State::Waiting,
            env: class.env.clone(),
            start_env: None,
            stop_env: None,
            stop_on: class.stop_on.clone(),
            pid: [None; 5],
            blocker: None,
            blocking: Vec::new(),
            failed: false,
            failed_process: None,
            exit_status: None,
            respawn_time: None,
            respawn_count: 0,
            trace_forks: 0,
            trace_state: TraceState::None,
        }
    }

    pub fn pid_of(&self, ptype: ProcessType) -> Option<i32> {
        self.pid[ptype.index()]
    }

    pub fn set_pid(&mut self, ptype: ProcessType, pid: i32) {
        self.pid[ptype.index()] = Some(pid);
    }

    pub fn clear_pid(&mut self, ptype: ProcessType) {
        self.pid[ptype.index()] = None;
    }

    pub fn main_alive(&self) -> bool {
        self.pid_of(ProcessType::Main).is_some()
    }

    /// The legal successor for the current (state, goal), given whether
    /// the class has a main process and whether it is alive.
    ///
    /// This is the whole transition table; everything else in the state
    /// machine consults it. (WAITING, STOP) has no successor and panics.
    pub fn next_state(&self, has_main: bool, main_alive: bool) -> State {
        match (self.state, self.goal) {
            (State::Waiting, Goal::Stop) => {
                panic!("no transition from waiting with goal stop")
            }
            (State::Waiting, _) => State::Starting,

            (State::Starting, Goal::Stop) => State::Stopping,
            (State::Starting, _) => State::PreStart,

            (State::PreStart, Goal::Stop) => State::Stopping,
            (State::PreStart, _) => State::Spawned,

            (State::Spawned, Goal::Stop) => State::Stopping,
            (State::Spawned, _) => State::PostStart,

            (State::PostStart, Goal::Stop) => State::Stopping,
            (State::PostStart, Goal::Start) => State::Running,
            (State::PostStart, Goal::Respawn) => State::Stopping,

            (State::Running, Goal::Stop) => {
                if has_main && main_alive {
                    State::PreStop
                } else {
                    State::Stopping
                }
            }
            (State::Running, _) => State::Stopping,

            (State::PreStop, Goal::Stop) => State::Stopping,
            (State::PreStop, Goal::Start) => State::Running,
            (State::PreStop, Goal::Respawn) => State::Stopping,

            (State::Stopping, _) => State::Killed,
            (State::Killed, _) => State::PostStop,

            (State::PostStop, Goal::Stop) => State::Waiting,
            (State::PostStop, _) => State::Starting,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
