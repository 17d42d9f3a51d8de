// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process slots and exit status handling

use serde::{Deserialize, Serialize};

/// The hook processes a job class may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    PreStart,
    Main,
    PostStart,
    PreStop,
    PostStop,
}

impl ProcessType {
    /// All slots, in pid-table order.
    pub const ALL: [ProcessType; 5] = [
        ProcessType::PreStart,
        ProcessType::Main,
        ProcessType::PostStart,
        ProcessType::PreStop,
        ProcessType::PostStop,
    ];

    /// Index into per-job pid tables.
    pub fn index(self) -> usize {
        match self {
            ProcessType::PreStart => 0,
            ProcessType::Main => 1,
            ProcessType::PostStart => 2,
            ProcessType::PreStop => 3,
            ProcessType::PostStop => 4,
        }
    }

    /// Name used in `PROCESS=` event variables and log lines.
    pub fn name(self) -> &'static str {
        match self {
            ProcessType::PreStart => "pre-start",
            ProcessType::Main => "main",
            ProcessType::PostStart => "post-start",
            ProcessType::PreStop => "pre-stop",
            ProcessType::PostStop => "post-stop",
        }
    }
}

impl std::fmt::Display for ProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A command attached to a process slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCommand {
    /// Command line or shell script body.
    pub command: String,
    /// Run through `sh -e` rather than exec'd directly.
    pub script: bool,
}

impl ProcessCommand {
    pub fn exec(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            script: false,
        }
    }

    pub fn script(body: impl Into<String>) -> Self {
        Self {
            command: body.into(),
            script: true,
        }
    }
}

/// How a reaped child ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Normal exit with the given code.
    Code(i32),
    /// Terminated by the given signal number.
    Signal(i32),
}

impl ExitStatus {
    /// Encode into the job's `exit_status` field: signals are stored in
    /// the high byte, exit codes in the low byte.
    pub fn encode(self) -> i32 {
        match self {
            ExitStatus::Code(code) => code & 0xff,
            ExitStatus::Signal(sig) => (sig & 0xff) << 8,
        }
    }

    pub fn is_signal(self) -> bool {
        matches!(self, ExitStatus::Signal(_))
    }
}

/// Name of a signal number, without the `SIG` prefix.
pub fn signal_name(signal: i32) -> Option<&'static str> {
    Some(match signal {
        1 => "HUP",
        2 => "INT",
        3 => "QUIT",
        4 => "ILL",
        6 => "ABRT",
        8 => "FPE",
        9 => "KILL",
        10 => "USR1",
        11 => "SEGV",
        12 => "USR2",
        13 => "PIPE",
        14 => "ALRM",
        15 => "TERM",
        17 => "CHLD",
        18 => "CONT",
        19 => "STOP",
        20 => "TSTP",
        _ => return None,
    })
}

/// Signal number for a name, accepting both `TERM` and `SIGTERM` forms.
pub fn signal_number(name: &str) -> Option<i32> {
    let name = name.strip_prefix("SIG").unwrap_or(name);
    Some(match name {
        "HUP" => 1,
        "INT" => 2,
        "QUIT" => 3,
        "ILL" => 4,
        "ABRT" => 6,
        "FPE" => 8,
        "KILL" => 9,
        "USR1" => 10,
        "SEGV" => 11,
        "USR2" => 12,
        "PIPE" => 13,
        "ALRM" => 14,
        "TERM" => 15,
        "CHLD" => 17,
        "CONT" => 18,
        "STOP" => 19,
        "TSTP" => 20,
        _ => return None,
    })
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
