// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event operator trees
//!
//! A boolean expression over event names and argument matches, built by
//! the config loader and cloned per job instance so match state is
//! per-instance. Structure is immutable; `value` and the matched-event
//! captures are the mutable evaluation state.

use crate::environ;
use crate::event::{Event, EventId};
use serde::{Deserialize, Serialize};

/// One argument matcher on a `Match` node.
///
/// A keyed matcher compares against the named variable of the event
/// environment; a bare matcher compares positionally. Values beginning
/// with `$` are resolved against the evaluation's reference environment
/// before comparing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matcher {
    pub key: Option<String>,
    pub value: String,
}

impl Matcher {
    pub fn literal(value: impl Into<String>) -> Self {
        Self {
            key: None,
            value: value.into(),
        }
    }

    pub fn keyed(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: Some(key.into()),
            value: value.into(),
        }
    }
}

/// Captured state of a successful match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCapture {
    pub event: EventId,
    pub name: String,
    /// Concrete `KEY=VALUE` bindings the matchers touched.
    pub bindings: Vec<String>,
}

/// A node in the predicate tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventOperator {
    /// True when every child is true.
    All {
        children: Vec<EventOperator>,
        #[serde(default)]
        value: bool,
    },
    /// True when any child is true.
    Any {
        children: Vec<EventOperator>,
        #[serde(default)]
        value: bool,
    },
    /// True when an event with this name and matching arguments has been
    /// seen since the last reset.
    Match {
        name: String,
        matchers: Vec<Matcher>,
        #[serde(default)]
        value: bool,
        #[serde(default)]
        captured: Option<MatchCapture>,
    },
}

impl EventOperator {
    /// Convenience constructor for a bare event-name match.
    pub fn match_name(name: impl Into<String>) -> Self {
        EventOperator::Match {
            name: name.into(),
            matchers: Vec::new(),
            value: false,
            captured: None,
        }
    }

    pub fn all(children: Vec<EventOperator>) -> Self {
        EventOperator::All {
            children,
            value: false,
        }
    }

    pub fn any(children: Vec<EventOperator>) -> Self {
        EventOperator::Any {
            children,
            value: false,
        }
    }

    /// Current value of this node.
    pub fn value(&self) -> bool {
        match self {
            EventOperator::All { value, .. }
            | EventOperator::Any { value, .. }
            | EventOperator::Match { value, .. } => *value,
        }
    }

    /// Offer an event to the tree, post-order. Matching `Match` nodes
    /// capture the event and its bindings; internal nodes recompute.
    /// `reference` is the environment `$VAR` matcher values resolve
    /// against (the job environment for stop matching, nothing for start
    /// matching). Returns true if any node newly matched this event.
    pub fn handle(&mut self, id: EventId, event: &Event, reference: Option<&[String]>) -> bool {
        match self {
            EventOperator::Match {
                name,
                matchers,
                value,
                captured,
            } => {
                if *value || name != &event.name {
                    return false;
                }
                match match_arguments(matchers, event, reference) {
                    Some(bindings) => {
                        *value = true;
                        *captured = Some(MatchCapture {
                            event: id,
                            name: event.name.clone(),
                            bindings,
                        });
                        true
                    }
                    None => false,
                }
            }
            EventOperator::All { children, value } => {
                let mut matched = false;
                for child in children.iter_mut() {
                    matched |= child.handle(id, event, reference);
                }
                *value = children.iter().all(|c| c.value());
                matched
            }
            EventOperator::Any { children, value } => {
                let mut matched = false;
                for child in children.iter_mut() {
                    matched |= child.handle(id, event, reference);
                }
                *value = children.iter().any(|c| c.value());
                matched
            }
        }
    }

    /// Clear every node's value and captured event.
    pub fn reset(&mut self) {
        match self {
            EventOperator::Match {
                value, captured, ..
            } => {
                *value = false;
                *captured = None;
            }
            EventOperator::All { children, value } | EventOperator::Any { children, value } => {
                *value = false;
                for child in children.iter_mut() {
                    child.reset();
                }
            }
        }
    }

    /// Append the captured bindings of the true subtree to `env`, plus a
    /// space-separated list of the matched event names under `extra_key`.
    pub fn environment(&self, env: &mut Vec<String>, extra_key: &str) {
        let mut names = Vec::new();
        self.for_matched(&mut |capture| {
            for binding in &capture.bindings {
                environ::add(env, binding);
            }
            names.push(capture.name.clone());
        });
        environ::set(env, extra_key, &names.join(" "));
    }

    /// Event ids captured in the true subtree, in tree order.
    pub fn matched_events(&self) -> Vec<EventId> {
        let mut ids = Vec::new();
        self.for_matched(&mut |capture| ids.push(capture.event));
        ids
    }

    fn for_matched(&self, f: &mut impl FnMut(&MatchCapture)) {
        if !self.value() {
            return;
        }
        match self {
            EventOperator::Match { captured, .. } => {
                if let Some(capture) = captured {
                    f(capture);
                }
            }
            EventOperator::All { children, .. } | EventOperator::Any { children, .. } => {
                for child in children {
                    if child.value() {
                        child.for_matched(f);
                    }
                }
            }
        }
    }
}

/// Compare the matcher list against an event's environment. Returns the
/// touched `KEY=VALUE` bindings on success.
fn match_arguments(
    matchers: &[Matcher],
    event: &Event,
    reference: Option<&[String]>,
) -> Option<Vec<String>> {
    let mut bindings = Vec::new();

    for (position, matcher) in matchers.iter().enumerate() {
        let wanted = if let Some(var) = matcher.value.strip_prefix('$') {
            environ::lookup(reference?, var)?.to_string()
        } else {
            matcher.value.clone()
        };

        let entry = match &matcher.key {
            Some(key) => {
                let value = environ::lookup(&event.env, key)?;
                if value != wanted {
                    return None;
                }
                format!("{}={}", key, value)
            }
            None => {
                let entry = event.env.get(position)?;
                if environ::split(entry).1 != wanted {
                    return None;
                }
                entry.clone()
            }
        };
        bindings.push(entry);
    }

    Some(bindings)
}

#[cfg(test)]
#[path = "operator_tests.rs"]
mod tests;
