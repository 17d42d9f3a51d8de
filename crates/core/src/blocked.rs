// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Blocked records
//!
//! A `Blocked` expresses "X is waiting on Y". Each record lives in exactly
//! one blocking list: either an event's (things the event set in motion)
//! or a job's (events the job is holding open). The reply variants carry a
//! handle to a pending control-request reply; they never survive a re-exec
//! since the connection they name cannot cross an exec boundary.

use crate::event::EventId;
use crate::job::JobId;
use serde::{Deserialize, Serialize};

/// Opaque handle for a pending control-request reply.
pub type ReplyId = u64;

/// One "waiting on" edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Blocked {
    /// A job is waiting for the event holding this record to finish.
    Job(JobId),
    /// An event is being held open; its `blockers` count includes this
    /// record.
    Event(EventId),
    /// A `start --wait` caller awaiting the job's rest state.
    StartReply(ReplyId),
    /// A `stop --wait` caller.
    StopReply(ReplyId),
    /// A `restart --wait` caller.
    RestartReply(ReplyId),
    /// An `emit --wait` caller awaiting the emitted event.
    EmitReply(ReplyId),
}

impl Blocked {
    /// Whether this record can be carried across a re-exec.
    pub fn is_serialisable(&self) -> bool {
        matches!(self, Blocked::Job(_) | Blocked::Event(_))
    }

    /// The reply handle, for the reply-carrying variants.
    pub fn reply(&self) -> Option<ReplyId> {
        match self {
            Blocked::StartReply(id)
            | Blocked::StopReply(id)
            | Blocked::RestartReply(id)
            | Blocked::EmitReply(id) => Some(*id),
            _ => None,
        }
    }
}
