use super::{ObjectAdapter, Oid, Version};
use crate::core::{ExecutionContext, Result, StoreError};
use std::collections::BTreeMap;

/// Arena of the adapters owned by one unit of work, keyed by identity.
///
/// Each identity maps to exactly one adapter, so a domain object is never
/// wrapped twice within the same unit of work.
#[derive(Debug, Default)]
pub struct AdapterManager {
    adapters: BTreeMap<Oid, ObjectAdapter>,
}

impl AdapterManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.adapters.contains_key(oid)
    }

    /// Adds an adapter. Adding a second adapter for a known identity is a
    /// programming error.
    pub fn insert(&mut self, adapter: ObjectAdapter) -> Result<&mut ObjectAdapter> {
        let oid = adapter.oid().clone();
        if self.adapters.contains_key(&oid) {
            return Err(StoreError::InternalConsistency(format!(
                "An adapter for {} already exists",
                oid
            )));
        }
        Ok(self.adapters.entry(oid).or_insert(adapter))
    }

    pub fn get(&self, oid: &Oid) -> Option<&ObjectAdapter> {
        self.adapters.get(oid)
    }

    pub fn get_mut(&mut self, oid: &Oid) -> Option<&mut ObjectAdapter> {
        self.adapters.get_mut(oid)
    }

    pub fn require(&self, oid: &Oid) -> Result<&ObjectAdapter> {
        self.get(oid)
            .ok_or_else(|| StoreError::ObjectNotFound(oid.to_string()))
    }

    pub fn require_mut(&mut self, oid: &Oid) -> Result<&mut ObjectAdapter> {
        self.adapters
            .get_mut(oid)
            .ok_or_else(|| StoreError::ObjectNotFound(oid.to_string()))
    }

    pub fn oids(&self) -> impl Iterator<Item = &Oid> {
        self.adapters.keys()
    }

    pub fn adapters(&self) -> impl Iterator<Item = &ObjectAdapter> {
        self.adapters.values()
    }

    /// Returns the adapter itself for a root, or its owning root for an
    /// aggregated object.
    pub fn get_aggregate_root(&self, oid: &Oid) -> Result<&ObjectAdapter> {
        self.require(oid)?;
        self.require(oid.root())
    }

    /// Lock check that delegates aggregated objects to their root.
    pub fn check_lock(
        &self,
        oid: &Oid,
        incoming: Option<&Version>,
        ctx: &ExecutionContext,
    ) -> Result<()> {
        self.get_aggregate_root(oid)?.check_lock(incoming, ctx)
    }

    /// Direct aggregated children of `oid`.
    pub fn aggregated_children(&self, oid: &Oid) -> Vec<Oid> {
        self.adapters
            .keys()
            .filter(|candidate| candidate.parent() == Some(oid))
            .cloned()
            .collect()
    }

    /// All aggregated objects owned, directly or not, by `oid`.
    pub fn aggregated_descendants(&self, oid: &Oid) -> Vec<Oid> {
        let mut found = Vec::new();
        let mut pending = vec![oid.clone()];
        while let Some(next) = pending.pop() {
            for child in self.aggregated_children(&next) {
                pending.push(child.clone());
                found.push(child);
            }
        }
        found
    }

    /// Removes an adapter together with every aggregate it owns.
    pub fn remove(&mut self, oid: &Oid) -> Option<ObjectAdapter> {
        for descendant in self.aggregated_descendants(oid) {
            self.adapters.remove(&descendant);
        }
        self.adapters.remove(oid)
    }

    /// Re-keys a root (and everything it owns) under a new identity and
    /// rewrites references held by other objects. Returns the (old, new)
    /// pairs of every identity that changed.
    pub fn remap(&mut self, old: &Oid, new: Oid) -> Result<Vec<(Oid, Oid)>> {
        if old.is_aggregated() || new.is_aggregated() {
            return Err(StoreError::AggregateMisuse(format!(
                "Cannot re-key aggregated identity {}",
                old
            )));
        }
        if self.adapters.contains_key(&new) {
            return Err(StoreError::InternalConsistency(format!(
                "Cannot re-key {} as {}: identity already in use",
                old, new
            )));
        }

        let mut moved = vec![old.clone()];
        moved.extend(self.aggregated_descendants(old));

        let mut changes = Vec::with_capacity(moved.len());
        for previous in moved {
            let mut adapter = self
                .adapters
                .remove(&previous)
                .ok_or_else(|| StoreError::ObjectNotFound(previous.to_string()))?;
            let rebased = previous.rebased(old, &new);
            adapter.replace_oid(rebased.clone());
            self.adapters.insert(rebased.clone(), adapter);
            changes.push((previous, rebased));
        }

        for adapter in self.adapters.values_mut() {
            adapter.pojo_mut().rebase_references(old, &new);
        }
        Ok(changes)
    }
}
