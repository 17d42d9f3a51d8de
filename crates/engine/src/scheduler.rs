// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deadline timers
//!
//! One timer per job, used for the kill discipline. The owner drives the
//! clock: it asks for the next deadline to sleep toward and collects the
//! fired set afterwards.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use warden_core::JobId;

#[derive(Debug, Default)]
pub struct Scheduler {
    deadlines: HashMap<JobId, Instant>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm (or re-arm) the timer for a job.
    pub fn set(&mut self, job: JobId, after: Duration, now: Instant) {
        self.deadlines.insert(job, now + after);
    }

    pub fn cancel(&mut self, job: JobId) {
        self.deadlines.remove(&job);
    }

    /// Remove and return every timer due at `now`, earliest first.
    pub fn fired(&mut self, now: Instant) -> Vec<JobId> {
        let mut due: Vec<(JobId, Instant)> = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(job, at)| (*job, *at))
            .collect();
        due.sort_by_key(|(_, at)| *at);

        for (job, _) in &due {
            self.deadlines.remove(job);
        }
        due.into_iter().map(|(job, _)| job).collect()
    }

    /// The earliest armed deadline, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Time left on a job's timer; zero if already due.
    pub fn remaining(&self, job: JobId, now: Instant) -> Option<Duration> {
        self.deadlines
            .get(&job)
            .map(|at| at.saturating_duration_since(now))
    }

    /// Remaining time per armed timer, for the re-exec snapshot.
    pub fn all_remaining(&self, now: Instant) -> Vec<(JobId, Duration)> {
        self.deadlines
            .iter()
            .map(|(job, at)| (*job, at.saturating_duration_since(now)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.deadlines.is_empty()
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
