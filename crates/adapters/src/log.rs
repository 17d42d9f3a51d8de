// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-job output sinks
//!
//! Each job gets an append-only log file under the log directory, named
//! `<class>.log` or `<class>-<instance>.log`. Sinks are opened lazily at
//! spawn time and shared between stdout and stderr of the child.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Factory for per-job log files.
#[derive(Debug, Clone)]
pub struct JobLogger {
    logdir: PathBuf,
}

impl JobLogger {
    pub fn new(logdir: impl Into<PathBuf>) -> Self {
        Self {
            logdir: logdir.into(),
        }
    }

    /// Path of the sink for a job.
    pub fn path(&self, class: &str, instance: &str) -> PathBuf {
        let name = if instance.is_empty() {
            format!("{}.log", class)
        } else {
            format!("{}-{}.log", class, instance)
        };
        self.logdir.join(name)
    }

    /// Open the sink, creating the log directory on first use.
    pub fn sink(&self, class: &str, instance: &str) -> io::Result<File> {
        std::fs::create_dir_all(&self.logdir)?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(class, instance))
    }

    pub fn logdir(&self) -> &Path {
        &self.logdir
    }
}

#[cfg(test)]
#[path = "log_tests.rs"]
mod tests;
