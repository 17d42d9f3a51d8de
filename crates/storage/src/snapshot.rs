// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot capture and restore
//!
//! The graph is flattened into serde records with stable integer
//! references: events keep their queue ids, jobs are numbered in capture
//! order. Control-reply blocked records cannot cross an exec boundary
//! (they name live connections) and are dropped with a warning.
//!
//! Restore rebuilds the graph and then recomputes every event's blocker
//! count from the restored blocking lists, so the count invariant holds
//! even against a snapshot written by a buggy peer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use thiserror::Error;
use warden_core::{
    Blocked, ClassId, Console, Core, Event, EventId, EventOperator, ExpectMode, Goal, Job,
    JobClass, JobId, NormalExit, Progress, ProcessCommand, Rlimit, Session, State, TraceState,
};

/// Bumped when the record layout changes incompatibly.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Errors from snapshot capture or restore.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error("dangling job reference {0}")]
    DanglingJob(usize),
}

/// A serialised "waiting on" edge. Reply variants are never written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BlockedRecord {
    Job { job: usize },
    Event { event: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: u64,
    pub name: String,
    pub env: Vec<String>,
    pub session: Option<usize>,
    pub fd: Option<i32>,
    pub progress: Progress,
    pub failed: bool,
    pub failed_by: Option<String>,
    pub blockers: u32,
    pub blocking: Vec<BlockedRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub goal: Goal,
    pub state: State,
    pub env: Vec<String>,
    pub start_env: Option<Vec<String>>,
    pub stop_env: Option<Vec<String>>,
    pub stop_on: Option<EventOperator>,
    pub pid: [Option<i32>; 5],
    pub blocker: Option<u64>,
    pub blocking: Vec<BlockedRecord>,
    pub kill_timer_ms: Option<u64>,
    pub failed: bool,
    pub failed_process: Option<warden_core::ProcessType>,
    pub exit_status: Option<i32>,
    pub respawn_count: u32,
    pub respawn_window_ms: Option<u64>,
    pub trace_forks: u32,
    pub trace_state: TraceState,
}

/// The full policy surface of a class, with its live instances nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassRecord {
    pub name: String,
    pub description: Option<String>,
    pub instance: Option<String>,
    pub session: Option<usize>,
    pub start_on: Option<EventOperator>,
    pub stop_on: Option<EventOperator>,
    pub process: [Option<ProcessCommand>; 5],
    pub task: bool,
    pub expect: ExpectMode,
    pub kill_signal: String,
    pub kill_timeout_ms: u64,
    pub respawn: bool,
    pub respawn_limit: u32,
    pub respawn_interval_ms: u64,
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
    pub env: Vec<String>,
    pub export: Vec<String>,
    pub emits: Vec<String>,
    pub deleted: bool,
    pub instances: Vec<JobRecord>,
}

/// The serialised graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    pub sessions: Vec<Session>,
    pub conf_sources: Vec<PathBuf>,
    pub next_event_id: u64,
    pub events: Vec<EventRecord>,
    pub classes: Vec<ClassRecord>,
}

/// A restored graph plus the side tables the engine re-arms.
pub struct Restored {
    pub core: Core,
    pub kill_timers: Vec<(JobId, Duration)>,
    pub conf_sources: Vec<PathBuf>,
}

/// Flatten the live graph. Only classes with at least one instance are
/// written; everything else is reloadable from configuration.
pub fn capture(
    core: &Core,
    kill_timers: &[(JobId, Duration)],
    now: Instant,
    conf_sources: Vec<PathBuf>,
) -> Snapshot {
    let timers: HashMap<JobId, Duration> = kill_timers.iter().copied().collect();

    // Stable job numbering: class slab order, instance name order.
    let mut job_index = HashMap::new();
    let mut ordered_jobs = Vec::new();
    for class_id in core.classes.ids() {
        for (_, job_id) in core.classes.instances(class_id) {
            job_index.insert(job_id, ordered_jobs.len());
            ordered_jobs.push(job_id);
        }
    }

    let encode_blocking = |records: &[Blocked]| -> Vec<BlockedRecord> {
        records
            .iter()
            .filter_map(|record| match record {
                Blocked::Job(job) => match job_index.get(job) {
                    Some(index) => Some(BlockedRecord::Job { job: *index }),
                    None => {
                        tracing::warn!(job = job.0, "dropping edge to unregistered job");
                        None
                    }
                },
                Blocked::Event(event) => Some(BlockedRecord::Event { event: event.0 }),
                other => {
                    tracing::warn!(
                        ?other,
                        "dropping control reply edge, connections cannot cross re-exec"
                    );
                    None
                }
            })
            .collect()
    };

    let events = core
        .events
        .iter()
        .map(|(id, event)| EventRecord {
            id: id.0,
            name: event.name.clone(),
            env: event.env.clone(),
            session: event.session.map(|s| s.0),
            fd: event.fd,
            progress: event.progress,
            failed: event.failed,
            failed_by: event.failed_by.clone(),
            blockers: event.blockers,
            blocking: encode_blocking(&event.blocking),
        })
        .collect();

    let mut classes = Vec::new();
    for class_id in core.classes.ids() {
        let Some(class) = core.classes.get(class_id) else {
            continue;
        };
        let instances = core.classes.instances(class_id);
        if instances.is_empty() {
            continue;
        }

        let jobs = instances
            .iter()
            .filter_map(|(_, job_id)| core.jobs.get(*job_id).map(|job| (*job_id, job)))
            .map(|(job_id, job)| JobRecord {
                name: job.name.clone(),
                goal: job.goal,
                state: job.state,
                env: job.env.clone(),
                start_env: job.start_env.clone(),
                stop_env: job.stop_env.clone(),
                stop_on: job.stop_on.clone(),
                pid: job.pid,
                blocker: job.blocker.map(|e| e.0),
                blocking: encode_blocking(&job.blocking),
                kill_timer_ms: timers.get(&job_id).map(|d| d.as_millis() as u64),
                failed: job.failed,
                failed_process: job.failed_process,
                exit_status: job.exit_status,
                respawn_count: job.respawn_count,
                respawn_window_ms: job
                    .respawn_time
                    .map(|t| now.saturating_duration_since(t).as_millis() as u64),
                trace_forks: job.trace_forks,
                trace_state: job.trace_state,
            })
            .collect();

        classes.push(ClassRecord {
            name: class.name.clone(),
            description: class.description.clone(),
            instance: class.instance.clone(),
            session: class.session.map(|s| s.0),
            start_on: class.start_on.clone(),
            stop_on: class.stop_on.clone(),
            process: class.process.clone(),
            task: class.task,
            expect: class.expect,
            kill_signal: class.kill_signal.clone(),
            kill_timeout_ms: class.kill_timeout.as_millis() as u64,
            respawn: class.respawn.enabled,
            respawn_limit: class.respawn.limit,
            respawn_interval_ms: class.respawn.interval.as_millis() as u64,
            normal_exit: class.normal_exit.clone(),
            umask: class.umask,
            nice: class.nice,
            oom_score: class.oom_score,
            limits: class.limits.clone(),
            chroot: class.chroot.clone(),
            chdir: class.chdir.clone(),
            setuid: class.setuid.clone(),
            setgid: class.setgid.clone(),
            console: class.console,
            env: class.env.clone(),
            export: class.export.clone(),
            emits: class.emits.clone(),
            deleted: class.deleted,
            instances: jobs,
        });
    }

    Snapshot {
        version: SNAPSHOT_VERSION,
        sessions: core.sessions.clone(),
        conf_sources,
        next_event_id: core.events.next_id(),
        events,
        classes,
    }
}

impl Snapshot {
    /// Rebuild the graph. `now` anchors restored respawn windows.
    pub fn restore(self, now: Instant) -> Result<Restored, SnapshotError> {
        if self.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(self.version));
        }

        let mut core = Core::new();
        core.sessions = self.sessions;
        core.events.reserve_ids(self.next_event_id);

        let mut kill_timers = Vec::new();
        let mut jobs_by_index: Vec<JobId> = Vec::new();
        let mut deferred_deleted: Vec<ClassId> = Vec::new();

        // Classes and jobs first, so event blocking lists can resolve
        // job indices.
        for record in self.classes {
            let deleted = record.deleted;
            let class = JobClass {
                name: record.name,
                description: record.description,
                instance: record.instance,
                session: record.session.map(warden_core::SessionId),
                start_on: record.start_on,
                stop_on: record.stop_on,
                process: record.process,
                task: record.task,
                expect: record.expect,
                kill_signal: record.kill_signal,
                kill_timeout: Duration::from_millis(record.kill_timeout_ms),
                respawn: warden_core::RespawnPolicy {
                    enabled: record.respawn,
                    limit: record.respawn_limit,
                    interval: Duration::from_millis(record.respawn_interval_ms),
                },
                normal_exit: record.normal_exit,
                umask: record.umask,
                nice: record.nice,
                oom_score: record.oom_score,
                limits: record.limits,
                chroot: record.chroot,
                chdir: record.chdir,
                setuid: record.setuid,
                setgid: record.setgid,
                console: record.console,
                env: record.env,
                export: record.export,
                emits: record.emits,
                // Registered visible first so instances can reattach;
                // the flag is reapplied below.
                deleted: false,
            };
            let class_id = core.classes.register(class);
            if deleted {
                deferred_deleted.push(class_id);
            }

            for job in record.instances {
                let job_id = core.jobs.insert(Job {
                    class: class_id,
                    name: job.name.clone(),
                    goal: job.goal,
                    state: job.state,
                    env: job.env,
                    start_env: job.start_env,
                    stop_env: job.stop_env,
                    stop_on: job.stop_on,
                    pid: job.pid,
                    blocker: job.blocker.map(EventId),
                    blocking: Vec::new(),
                    failed: job.failed,
                    failed_process: job.failed_process,
                    exit_status: job.exit_status,
                    respawn_time: job
                        .respawn_window_ms
                        .and_then(|ms| now.checked_sub(Duration::from_millis(ms))),
                    respawn_count: job.respawn_count,
                    trace_forks: job.trace_forks,
                    trace_state: job.trace_state,
                });
                core.classes.add_instance(class_id, &job.name, job_id);
                jobs_by_index.push(job_id);

                if let Some(ms) = job.kill_timer_ms {
                    kill_timers.push((job_id, Duration::from_millis(ms)));
                }
                // Reattach the job's own blocking list.
                let blocking = decode_blocking(&job.blocking, &jobs_by_index)?;
                if let Some(job) = core.jobs.get_mut(job_id) {
                    job.blocking = blocking;
                }
            }
        }

        for class_id in deferred_deleted {
            if let Some(class) = core.classes.get_mut(class_id) {
                class.deleted = true;
            }
        }

        for record in self.events {
            let blocking = decode_blocking(&record.blocking, &jobs_by_index)?;
            core.events.restore(
                EventId(record.id),
                Event {
                    name: record.name,
                    env: record.env,
                    session: record.session.map(warden_core::SessionId),
                    fd: record.fd,
                    progress: record.progress,
                    failed: record.failed,
                    failed_by: record.failed_by,
                    blockers: record.blockers,
                    blocking,
                },
            );
        }

        rebalance_blockers(&mut core);

        Ok(Restored {
            core,
            kill_timers,
            conf_sources: self.conf_sources,
        })
    }

    pub fn to_writer(&self, writer: impl Write) -> Result<(), SnapshotError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_reader(reader)?)
    }
}

fn decode_blocking(
    records: &[BlockedRecord],
    jobs_by_index: &[JobId],
) -> Result<Vec<Blocked>, SnapshotError> {
    records
        .iter()
        .map(|record| match record {
            BlockedRecord::Job { job } => jobs_by_index
                .get(*job)
                .copied()
                .map(Blocked::Job)
                .ok_or(SnapshotError::DanglingJob(*job)),
            BlockedRecord::Event { event } => Ok(Blocked::Event(EventId(*event))),
        })
        .collect()
}

/// Re-register blockers: the counts are recomputed from the restored
/// blocking lists rather than trusted.
fn rebalance_blockers(core: &mut Core) {
    let mut counts: HashMap<EventId, u32> = HashMap::new();
    let mut tally = |records: &[Blocked]| {
        for record in records {
            if let Blocked::Event(event) = record {
                *counts.entry(*event).or_default() += 1;
            }
        }
    };
    for (_, job) in core.jobs.iter() {
        tally(&job.blocking);
    }
    for (_, event) in core.events.iter() {
        tally(&event.blocking);
    }

    for id in core.events.ids() {
        let computed = counts.get(&id).copied().unwrap_or(0);
        if let Some(event) = core.events.get_mut(id) {
            if event.blockers != computed {
                tracing::warn!(
                    event = %event.name,
                    serialised = event.blockers,
                    computed,
                    "rebalanced blocker count"
                );
                event.blockers = computed;
            }
        }
    }
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
