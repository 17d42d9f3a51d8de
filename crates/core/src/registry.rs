// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Class registry
//!
//! Classes live in a slab, with a chain per name in registration order.
//! The newest non-deleted registration is the visible class for a name,
//! except that a visible class with live instances is never displaced in
//! place: it is marked deleted and keeps running, and `reconsider` at
//! instance teardown lets the successor take over.

use crate::class::JobClass;
use crate::job::JobId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Index into the class slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId(pub usize);

#[derive(Debug, Default)]
pub struct ClassRegistry {
    slots: Vec<Option<JobClass>>,
    free: Vec<usize>,
    /// Registration chains per name, oldest first.
    chains: HashMap<String, Vec<ClassId>>,
    /// The class currently matched against events, per name.
    visible: HashMap<String, ClassId>,
    /// Live instances per class, keyed by instance name.
    instances: HashMap<ClassId, BTreeMap<String, JobId>>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class and recompute visibility for its name.
    pub fn register(&mut self, class: JobClass) -> ClassId {
        let name = class.name.clone();
        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(class);
                ClassId(slot)
            }
            None => {
                self.slots.push(Some(class));
                ClassId(self.slots.len() - 1)
            }
        };
        self.chains.entry(name.clone()).or_default().push(id);
        self.consider(&name);
        id
    }

    pub fn get(&self, id: ClassId) -> Option<&JobClass> {
        self.slots.get(id.0).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: ClassId) -> Option<&mut JobClass> {
        self.slots.get_mut(id.0).and_then(|slot| slot.as_mut())
    }

    /// The visible class for a name.
    pub fn visible(&self, name: &str) -> Option<ClassId> {
        self.visible.get(name).copied()
    }

    /// Visible classes in stable name order, for event matching.
    pub fn visible_ids(&self) -> Vec<ClassId> {
        let mut names: Vec<_> = self.visible.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| self.visible.get(&n).copied())
            .collect()
    }

    /// Every registered class id, visible or not.
    pub fn ids(&self) -> Vec<ClassId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ClassId(i)))
            .collect()
    }

    /// Recompute the visible class for `name`: a visible class with live
    /// instances stays put; otherwise the newest non-deleted registration
    /// wins.
    pub fn consider(&mut self, name: &str) {
        if let Some(current) = self.visible.get(name) {
            if self.has_instances(*current) {
                return;
            }
        }

        let best = self
            .chains
            .get(name)
            .into_iter()
            .flatten()
            .rev()
            .find(|id| self.get(**id).is_some_and(|c| !c.deleted))
            .copied();

        match best {
            Some(id) => {
                self.visible.insert(name.to_string(), id);
            }
            None => {
                self.visible.remove(name);
            }
        }
    }

    /// Called when an instance of `id` has stopped. If the class was kept
    /// alive only for its instances (deleted, or displaced by a reload),
    /// let a successor take over. Returns true when the class itself was
    /// destroyed.
    pub fn reconsider(&mut self, id: ClassId) -> bool {
        if self.has_instances(id) {
            return false;
        }

        let Some(class) = self.get(id) else {
            return false;
        };
        let name = class.name.clone();
        let deleted = class.deleted;

        if deleted {
            self.remove(id);
            self.consider(&name);
            true
        } else {
            self.consider(&name);
            false
        }
    }

    /// Mark a class dropped by reload. Destroys it immediately when it has
    /// no instances; otherwise it lingers until the last instance stops.
    /// Returns true when the class was destroyed.
    pub fn mark_deleted(&mut self, id: ClassId) -> bool {
        let Some(class) = self.get_mut(id) else {
            return false;
        };
        class.deleted = true;
        let name = class.name.clone();

        if self.has_instances(id) {
            tracing::info!(class = %name, "class deleted, instances still running");
            return false;
        }
        self.remove(id);
        self.consider(&name);
        true
    }

    fn remove(&mut self, id: ClassId) {
        let Some(class) = self.slots.get_mut(id.0).and_then(Option::take) else {
            return;
        };
        self.free.push(id.0);
        self.instances.remove(&id);
        if let Some(chain) = self.chains.get_mut(&class.name) {
            chain.retain(|c| *c != id);
            if chain.is_empty() {
                self.chains.remove(&class.name);
            }
        }
        if self.visible.get(&class.name) == Some(&id) {
            self.visible.remove(&class.name);
        }
    }

    pub fn add_instance(&mut self, class: ClassId, name: impl Into<String>, job: JobId) {
        self.instances
            .entry(class)
            .or_default()
            .insert(name.into(), job);
    }

    pub fn remove_instance(&mut self, class: ClassId, name: &str) -> Option<JobId> {
        let removed = self.instances.get_mut(&class)?.remove(name);
        if self.instances.get(&class).is_some_and(BTreeMap::is_empty) {
            self.instances.remove(&class);
        }
        removed
    }

    /// Find an instance of a class. Singleton classes always resolve to
    /// their only instance regardless of `name`.
    pub fn instance(&self, class: ClassId, name: &str) -> Option<JobId> {
        let instances = self.instances.get(&class)?;
        if self.get(class).is_some_and(|c| c.instance.is_none()) {
            return instances.values().next().copied();
        }
        instances.get(name).copied()
    }

    pub fn instances(&self, class: ClassId) -> Vec<(String, JobId)> {
        self.instances
            .get(&class)
            .map(|m| m.iter().map(|(n, j)| (n.clone(), *j)).collect())
            .unwrap_or_default()
    }

    pub fn has_instances(&self, class: ClassId) -> bool {
        self.instances
            .get(&class)
            .is_some_and(|m| !m.is_empty())
    }

    pub fn instance_count(&self, class: ClassId) -> usize {
        self.instances.get(&class).map_or(0, BTreeMap::len)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
