use super::{
    EnlistedPropertyChanges, EntityChangeTracker, EntityChanges, EntityChangesSubscriber,
    EntityPropertyChangeSubscriber, PropertyChangeRecord,
};
use crate::core::Result;
use crate::object::{LifecycleEvent, ObjectAdapter};
use crate::store::TransactionId;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{Level, event};

/// Runs lifecycle callbacks and enlists entity changes for publication.
///
/// Every hook is synchronous. Callback errors propagate and abort the
/// enclosing unit of work.
#[derive(Clone, Default)]
pub struct ObjectLifecyclePublisher {
    property_subscribers: Vec<Arc<dyn EntityPropertyChangeSubscriber>>,
    change_subscribers: Vec<Arc<dyn EntityChangesSubscriber>>,
}

impl ObjectLifecyclePublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_property_subscriber(&mut self, subscriber: Arc<dyn EntityPropertyChangeSubscriber>) {
        self.property_subscribers.push(subscriber);
    }

    pub fn add_changes_subscriber(&mut self, subscriber: Arc<dyn EntityChangesSubscriber>) {
        self.change_subscribers.push(subscriber);
    }

    fn invoke_callbacks(adapter: &mut ObjectAdapter, lifecycle: LifecycleEvent) -> Result<()> {
        let spec = adapter.specification().clone();
        for callback in spec.callbacks(lifecycle) {
            callback(adapter.pojo_mut())?;
        }
        Ok(())
    }

    pub fn on_post_create(&self, adapter: &mut ObjectAdapter) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Created)
    }

    pub fn on_post_load(&self, adapter: &mut ObjectAdapter) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Loaded)
    }

    pub fn on_pre_persist(
        &self,
        adapter: &mut ObjectAdapter,
        tracker: &mut EntityChangeTracker,
    ) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Persisting)?;
        tracker.enlist_created(adapter);
        Ok(())
    }

    pub fn on_post_persist(&self, adapter: &mut ObjectAdapter) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Persisted)
    }

    /// `records` carry the pre values captured at first touch and the post
    /// values captured at flush.
    pub fn on_pre_update(
        &self,
        adapter: &mut ObjectAdapter,
        records: Vec<PropertyChangeRecord>,
        tracker: &mut EntityChangeTracker,
    ) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Updating)?;
        tracker.enlist_updating(adapter.oid(), records);
        Ok(())
    }

    pub fn on_post_update(&self, adapter: &mut ObjectAdapter) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Updated)
    }

    pub fn on_pre_remove(
        &self,
        adapter: &mut ObjectAdapter,
        tracker: &mut EntityChangeTracker,
    ) -> Result<()> {
        Self::invoke_callbacks(adapter, LifecycleEvent::Removing)?;
        tracker.enlist_deleting(adapter);
        Ok(())
    }

    /// Hands the committed transaction's changes to the subscribers.
    pub fn publish(
        &self,
        tracker: &EntityChangeTracker,
        timestamp: DateTime<Utc>,
        user: &str,
        transaction_id: TransactionId,
    ) {
        let payload = EnlistedPropertyChanges::new(tracker.publishable());
        if !payload.is_empty() {
            for subscriber in self.property_subscribers.iter().filter(|s| s.is_enabled()) {
                subscriber.on_changing(&payload, timestamp, user, transaction_id);
            }
        }

        let summary = EntityChanges::from_kinds(
            tracker.changed_entities().map(|(_, kind)| kind),
            payload.len(),
            timestamp,
            user,
            transaction_id,
        );
        if !summary.is_empty() {
            for subscriber in self.change_subscribers.iter().filter(|s| s.is_enabled()) {
                subscriber.on_changes(&summary);
            }
        }

        event!(
            Level::DEBUG,
            transaction = %transaction_id,
            property_changes = payload.len(),
            created = summary.created,
            updated = summary.updated,
            deleted = summary.deleted,
            "entity changes published"
        );
    }
}
