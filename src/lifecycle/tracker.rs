use super::{PropertyChangeRecord, PropertyValue};
use crate::object::{AdapterManager, ObjectAdapter, Oid};
use std::collections::BTreeMap;

/// What happened to an entity during the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityChangeKind {
    Created,
    Updated,
    Deleted,
}

/// Property changes enlisted for publication during one transaction.
///
/// Keyed by (entity, property): a property touched twice keeps the pre value
/// of its first touch and the post value of its last.
#[derive(Debug, Clone, Default)]
pub struct EntityChangeTracker {
    records: BTreeMap<(Oid, String), PropertyChangeRecord>,
    kinds: BTreeMap<Oid, EntityChangeKind>,
}

impl EntityChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.kinds.is_empty()
    }

    /// Every publishable property becomes (NEW → post captured later).
    pub fn enlist_created(&mut self, adapter: &ObjectAdapter) {
        let oid = adapter.oid();
        self.kinds.insert(oid.clone(), EntityChangeKind::Created);
        for association in adapter.specification().associations() {
            if !association.is_publishable() {
                continue;
            }
            self.records.insert(
                (oid.clone(), association.id.clone()),
                PropertyChangeRecord::new(oid, &association.id, PropertyValue::New),
            );
        }
    }

    /// Enlists update records whose pre values were captured at first touch.
    pub fn enlist_updating(&mut self, oid: &Oid, records: Vec<PropertyChangeRecord>) {
        self.kinds
            .entry(oid.clone())
            .or_insert(EntityChangeKind::Updated);
        for record in records {
            let key = (oid.clone(), record.property_id().to_string());
            let merged = match self.records.remove(&key) {
                Some(existing) => existing.merged_with(&record),
                None => record,
            };
            self.records.insert(key, merged);
        }
    }

    /// Every publishable property becomes (current → DELETED), keeping the
    /// pre value of properties already enlisted.
    pub fn enlist_deleting(&mut self, adapter: &ObjectAdapter) {
        let oid = adapter.oid();
        match self.kinds.get(oid) {
            // created and deleted in the same unit of work: nothing happened
            Some(EntityChangeKind::Created) => {
                self.kinds.remove(oid);
            }
            _ => {
                self.kinds.insert(oid.clone(), EntityChangeKind::Deleted);
            }
        }

        for association in adapter.specification().associations() {
            if !association.is_publishable() {
                continue;
            }
            let key = (oid.clone(), association.id.clone());
            let record = match self.records.remove(&key) {
                Some(existing) => existing,
                None => PropertyChangeRecord::new(
                    oid,
                    &association.id,
                    PropertyValue::Present(association.get(adapter).clone()),
                ),
            };
            self.records
                .insert(key, record.with_post(PropertyValue::Deleted));
        }
    }

    /// Refreshes the post values of created entities from their current state.
    pub fn capture_created_post_values(&mut self, adapters: &AdapterManager) {
        for ((oid, property_id), record) in self.records.iter_mut() {
            if self.kinds.get(oid) != Some(&EntityChangeKind::Created) {
                continue;
            }
            let Some(adapter) = adapters.get(oid) else {
                continue;
            };
            let Some(association) = adapter.specification().association(property_id) else {
                continue;
            };
            *record = record
                .clone()
                .with_post(PropertyValue::Present(association.get(adapter).clone()));
        }
    }

    /// Moves everything enlisted under `old` to `new`.
    pub fn rebase(&mut self, old: &Oid, new: &Oid) {
        if let Some(kind) = self.kinds.remove(old) {
            self.kinds.insert(new.clone(), kind);
        }
        let moved: Vec<(Oid, String)> = self
            .records
            .keys()
            .filter(|(oid, _)| oid == old)
            .cloned()
            .collect();
        for key in moved {
            if let Some(record) = self.records.remove(&key) {
                self.records
                    .insert((new.clone(), key.1), record.rebased(new));
            }
        }
    }

    pub fn kind_of(&self, oid: &Oid) -> Option<EntityChangeKind> {
        self.kinds.get(oid).copied()
    }

    pub fn changed_entities(&self) -> impl Iterator<Item = (&Oid, &EntityChangeKind)> {
        self.kinds.iter()
    }

    pub fn records_for(&self, oid: &Oid) -> Vec<&PropertyChangeRecord> {
        self.records
            .iter()
            .filter(|((owner, _), _)| owner == oid)
            .map(|(_, record)| record)
            .collect()
    }

    /// Records that pass the publish filter, in (entity, property) order.
    pub fn publishable(&self) -> Vec<PropertyChangeRecord> {
        self.records
            .values()
            .filter(|record| record.should_publish())
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.kinds.clear();
    }
}
