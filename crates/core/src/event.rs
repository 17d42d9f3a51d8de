// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event queue
//!
//! Events move monotonically through PENDING → HANDLING → FINISHED and are
//! freed after FINISHED has been dispatched once. The queue is keyed by a
//! monotonically increasing id, so iteration order is insertion order and
//! the id doubles as a stable reference for blocked records and the
//! re-exec snapshot.

use crate::blocked::Blocked;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Stable identifier of a queued event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(pub u64);

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Handling phase of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Progress {
    Pending,
    Handling,
    Finished,
}

/// A named occurrence with an environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub name: String,
    /// Ordered `KEY=VALUE` entries, keys unique.
    pub env: Vec<String>,
    /// Supervision domain, if scoped.
    pub session: Option<SessionId>,
    /// Descriptor attached by the emitter (socket activation), if any.
    pub fd: Option<i32>,
    pub progress: Progress,
    pub failed: bool,
    /// Name of the job whose failure marked this event failed, if any.
    pub failed_by: Option<String>,
    /// Number of `Blocked::Event` records anywhere that reference this
    /// event. The event stays HANDLING while nonzero.
    pub blockers: u32,
    /// Records this event holds responsible for things it set in motion:
    /// jobs it transitioned and waiting emit callers.
    pub blocking: Vec<Blocked>,
}

/// The ordered queue of live events.
#[derive(Debug, Default)]
pub struct EventQueue {
    events: BTreeMap<EventId, Event>,
    next_id: u64,
    /// Optional diagnostic record of emissions, in order.
    trace: Option<Vec<(String, Vec<String>)>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new PENDING event and return its id.
    pub fn emit(
        &mut self,
        name: impl Into<String>,
        env: Vec<String>,
        session: Option<SessionId>,
    ) -> EventId {
        let name = name.into();
        assert!(!name.is_empty(), "event name must be non-empty");

        let id = EventId(self.next_id);
        self.next_id += 1;

        if let Some(trace) = &mut self.trace {
            trace.push((name.clone(), env.clone()));
        }
        tracing::debug!(event = %name, id = %id, "pending event");
        self.events.insert(
            id,
            Event {
                name,
                env,
                session,
                fd: None,
                progress: Progress::Pending,
                failed: false,
                failed_by: None,
                blockers: 0,
                blocking: Vec::new(),
            },
        );
        id
    }

    pub fn get(&self, id: EventId) -> Option<&Event> {
        self.events.get(&id)
    }

    pub fn get_mut(&mut self, id: EventId) -> Option<&mut Event> {
        self.events.get_mut(&id)
    }

    /// Take a blocking reference on the event.
    pub fn block(&mut self, id: EventId) {
        let event = self.events.get_mut(&id).expect("block on freed event");
        event.blockers += 1;
    }

    /// Drop a blocking reference. Must match a previous `block`.
    pub fn unblock(&mut self, id: EventId) {
        let event = self.events.get_mut(&id).expect("unblock on freed event");
        assert!(event.blockers > 0, "unblock without matching block");
        event.blockers -= 1;
    }

    /// Remove and return a finished event.
    pub fn free(&mut self, id: EventId) -> Event {
        let event = self.events.remove(&id).expect("free on freed event");
        assert!(
            event.blockers == 0,
            "event {} freed with {} blockers",
            event.name,
            event.blockers
        );
        event
    }

    /// Snapshot of live ids in queue order; safe to iterate while handlers
    /// enqueue or free events.
    pub fn ids(&self) -> Vec<EventId> {
        self.events.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (EventId, &Event)> {
        self.events.iter().map(|(id, e)| (*id, e))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Next id to be assigned; preserved across re-exec so references
    /// stay unambiguous.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Re-insert an event under a known id (snapshot restore).
    pub fn restore(&mut self, id: EventId, event: Event) {
        self.next_id = self.next_id.max(id.0 + 1);
        self.events.insert(id, event);
    }

    /// Ensure future ids start at or after `next` (snapshot restore).
    pub fn reserve_ids(&mut self, next: u64) {
        self.next_id = self.next_id.max(next);
    }

    /// Start recording `(name, env)` of every emission, for diagnostics.
    pub fn enable_trace(&mut self) {
        self.trace = Some(Vec::new());
    }

    /// Drain the recorded emissions.
    pub fn take_trace(&mut self) -> Vec<(String, Vec<String>)> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
