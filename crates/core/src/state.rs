// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The core graph
//!
//! A single root value owning the session table, event queue, class
//! registry, and job table. Everything else borrows from it, which keeps
//! the process-wide singletons a PID 1 needs without static mutable
//! state.

use crate::blocked::Blocked;
use crate::event::EventQueue;
use crate::job::{Job, JobId};
use crate::process::ProcessType;
use crate::registry::ClassRegistry;
use crate::session::Session;
use std::collections::HashMap;

/// Slab of live jobs.
#[derive(Debug, Default)]
pub struct JobTable {
    slots: Vec<Option<Job>>,
    free: Vec<usize>,
}

impl JobTable {
    pub fn insert(&mut self, job: Job) -> JobId {
        match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(job);
                JobId(slot)
            }
            None => {
                self.slots.push(Some(job));
                JobId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: JobId) -> Option<&mut Job> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    pub fn remove(&mut self, id: JobId) -> Option<Job> {
        let job = self.slots.get_mut(id.0).and_then(Option::take);
        if job.is_some() {
            self.free.push(id.0);
        }
        job
    }

    pub fn ids(&self) -> Vec<JobId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| JobId(i)))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JobId, &Job)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|job| (JobId(i), job)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The complete supervisor graph.
#[derive(Debug, Default)]
pub struct Core {
    pub sessions: Vec<Session>,
    pub events: EventQueue,
    pub classes: ClassRegistry,
    pub jobs: JobTable,
}

impl Core {
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name for a job: the class name, with the instance name in
    /// brackets when set.
    pub fn job_name(&self, id: JobId) -> String {
        let Some(job) = self.jobs.get(id) else {
            return format!("job#{}", id.0);
        };
        let class = self
            .classes
            .get(job.class)
            .map(|c| c.name.as_str())
            .unwrap_or("?");
        if job.name.is_empty() {
            class.to_string()
        } else {
            format!("{} ({})", class, job.name)
        }
    }

    /// Locate the job and process slot owning a live pid. At most one job
    /// references any given pid.
    pub fn find_pid(&self, pid: i32) -> Option<(JobId, ProcessType)> {
        for (id, job) in self.jobs.iter() {
            for ptype in ProcessType::ALL {
                if job.pid_of(ptype) == Some(pid) {
                    return Some((id, ptype));
                }
            }
        }
        None
    }

    /// Verify that every event's blocker count equals the number of
    /// `Blocked::Event` records referencing it, across all blocking
    /// lists. Used by tests and snapshot restore.
    pub fn blocker_counts_consistent(&self) -> bool {
        let mut counts: HashMap<crate::event::EventId, u32> = HashMap::new();

        let mut tally = |records: &[Blocked]| {
            for record in records {
                if let Blocked::Event(id) = record {
                    *counts.entry(*id).or_default() += 1;
                }
            }
        };

        for (_, job) in self.jobs.iter() {
            tally(&job.blocking);
        }
        for (_, event) in self.events.iter() {
            tally(&event.blocking);
        }

        self.events
            .iter()
            .all(|(id, event)| counts.get(&id).copied().unwrap_or(0) == event.blockers)
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
