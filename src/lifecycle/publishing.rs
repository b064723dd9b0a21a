use super::{EntityChangeKind, PropertyChangeRecord};
use crate::store::TransactionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Flattened property change handed to audit subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPropertyChange {
    pub transaction_id: u64,
    pub sequence: usize,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub target_type: String,
    pub target: String,
    pub member_id: String,
    pub property_id: String,
    pub pre_value: Option<String>,
    pub post_value: Option<String>,
}

/// Property changes of a transaction, turned into DTOs only when a
/// subscriber asks for them.
pub trait HasEnlistedEntityPropertyChanges: Send + Sync {
    fn entity_property_changes(
        &self,
        timestamp: DateTime<Utc>,
        user: &str,
        transaction_id: TransactionId,
    ) -> Vec<EntityPropertyChange>;
}

/// The publishable records of one transaction.
#[derive(Debug, Clone, Default)]
pub struct EnlistedPropertyChanges {
    records: Vec<PropertyChangeRecord>,
}

impl EnlistedPropertyChanges {
    pub fn new(records: Vec<PropertyChangeRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> &[PropertyChangeRecord] {
        &self.records
    }
}

impl HasEnlistedEntityPropertyChanges for EnlistedPropertyChanges {
    fn entity_property_changes(
        &self,
        timestamp: DateTime<Utc>,
        user: &str,
        transaction_id: TransactionId,
    ) -> Vec<EntityPropertyChange> {
        self.records
            .iter()
            .enumerate()
            .map(|(sequence, record)| EntityPropertyChange {
                transaction_id: transaction_id.as_u64(),
                sequence,
                timestamp,
                user: user.to_string(),
                target_type: record.bookmark().object_type.clone(),
                target: record.bookmark_string().to_string(),
                member_id: record.member_id().to_string(),
                property_id: record.property_id().to_string(),
                pre_value: record.value().pre_string().map(str::to_string),
                post_value: record.value().post_string().map(str::to_string),
            })
            .collect()
    }
}

/// Summary of one committed transaction for change-log subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityChanges {
    pub transaction_id: u64,
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub property_changes: usize,
}

impl EntityChanges {
    pub fn from_kinds<'a>(
        kinds: impl Iterator<Item = &'a EntityChangeKind>,
        property_changes: usize,
        timestamp: DateTime<Utc>,
        user: &str,
        transaction_id: TransactionId,
    ) -> Self {
        let mut changes = EntityChanges {
            transaction_id: transaction_id.as_u64(),
            timestamp,
            user: user.to_string(),
            created: 0,
            updated: 0,
            deleted: 0,
            property_changes,
        };
        for kind in kinds {
            match kind {
                EntityChangeKind::Created => changes.created += 1,
                EntityChangeKind::Updated => changes.updated += 1,
                EntityChangeKind::Deleted => changes.deleted += 1,
            }
        }
        changes
    }

    pub fn is_empty(&self) -> bool {
        self.created + self.updated + self.deleted == 0
    }
}

pub trait EntityPropertyChangeSubscriber: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    fn on_changing(
        &self,
        changes: &dyn HasEnlistedEntityPropertyChanges,
        timestamp: DateTime<Utc>,
        user: &str,
        transaction_id: TransactionId,
    );
}

pub trait EntityChangesSubscriber: Send + Sync {
    fn is_enabled(&self) -> bool {
        true
    }

    fn on_changes(&self, changes: &EntityChanges);
}

/// Keeps everything it is told in memory. Useful as an audit log in tests
/// and small deployments.
#[derive(Debug, Default)]
pub struct InMemoryAuditTrail {
    property_changes: Mutex<Vec<EntityPropertyChange>>,
    entity_changes: Mutex<Vec<EntityChanges>>,
}

impl InMemoryAuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn property_changes(&self) -> Vec<EntityPropertyChange> {
        self.property_changes
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    pub fn entity_changes(&self) -> Vec<EntityChanges> {
        self.entity_changes
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl EntityPropertyChangeSubscriber for InMemoryAuditTrail {
    fn on_changing(
        &self,
        changes: &dyn HasEnlistedEntityPropertyChanges,
        timestamp: DateTime<Utc>,
        user: &str,
        transaction_id: TransactionId,
    ) {
        if let Ok(mut entries) = self.property_changes.lock() {
            entries.extend(changes.entity_property_changes(timestamp, user, transaction_id));
        }
    }
}

impl EntityChangesSubscriber for InMemoryAuditTrail {
    fn on_changes(&self, changes: &EntityChanges) {
        if let Ok(mut entries) = self.entity_changes.lock() {
            entries.push(changes.clone());
        }
    }
}
