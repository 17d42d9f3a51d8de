// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fake spawner for testing

use super::{SpawnError, SpawnRequest, Spawner};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use warden_core::ProcessType;

/// Recorded spawn call.
#[derive(Debug, Clone)]
pub struct SpawnCall {
    pub class: String,
    pub instance: String,
    pub process: ProcessType,
    pub command: String,
    pub env: Vec<String>,
    pub pid: i32,
}

#[derive(Default)]
struct Inner {
    next_pid: i32,
    calls: Vec<SpawnCall>,
    kills: Vec<(i32, String)>,
    fail: HashSet<(String, ProcessType)>,
}

/// Records spawn and kill requests, handing out sequential pids.
/// Individual (class, process) pairs can be scripted to fail.
#[derive(Clone, Default)]
pub struct FakeSpawner {
    inner: Arc<Mutex<Inner>>,
}

impl FakeSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next spawns of this class/process pair to fail.
    pub fn fail_process(&self, class: &str, process: ProcessType) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.fail.insert((class.to_string(), process));
    }

    /// All recorded spawn calls, in order.
    pub fn calls(&self) -> Vec<SpawnCall> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .clone()
    }

    /// All recorded kill requests, in order.
    pub fn kills(&self) -> Vec<(i32, String)> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .kills
            .clone()
    }

    /// The most recent pid handed out.
    pub fn last_pid(&self) -> Option<i32> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .calls
            .last()
            .map(|call| call.pid)
    }
}

impl Spawner for FakeSpawner {
    fn spawn(&self, request: &SpawnRequest) -> Result<i32, SpawnError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        if inner
            .fail
            .contains(&(request.class.clone(), request.process))
        {
            return Err(SpawnError::Failed(format!(
                "scripted failure for {} {}",
                request.class, request.process
            )));
        }

        inner.next_pid += 1;
        let pid = 1000 + inner.next_pid;
        inner.calls.push(SpawnCall {
            class: request.class.clone(),
            instance: request.instance.clone(),
            process: request.process,
            command: request.command.command.clone(),
            env: request.env.clone(),
            pid,
        });
        Ok(pid)
    }

    fn kill(&self, pid: i32, signal: &str) -> Result<(), SpawnError> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.kills.push((pid, signal.to_string()));
        Ok(())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
