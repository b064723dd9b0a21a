use super::{DataStore, InstanceQuery, ObjectStore, Transaction, TransactionId};
use crate::command::{
    ObjectReader, PersistenceCommand, WriteMode, create_create_object_command,
    create_destroy_object_command, create_save_object_command,
};
use crate::core::{ExecutionContext, Result, StoreError};
use crate::lifecycle::{EntityChangeTracker, ObjectLifecyclePublisher, PropertyChangeRecord, PropertyValue};
use crate::object::{AdapterManager, AssociationKind, FieldValue, ObjectAdapter, Oid, Pojo, Version};
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{Level, event, info_span};
use uuid::Uuid;

/// One transaction's worth of work against an `ObjectStore`.
///
/// Objects are loaded into a private adapter arena, changed in place, and
/// written back as a single command batch on `commit`. Dropping an
/// uncommitted unit of work aborts it.
pub struct UnitOfWork<'s, D: DataStore> {
    store: &'s ObjectStore<D>,
    ctx: ExecutionContext,
    transaction: Transaction,
    adapters: AdapterManager,
    tracker: EntityChangeTracker,
    /// State of each touched persistent object before its first change.
    touched: BTreeMap<Oid, Pojo>,
    /// Roots with changes not yet flushed.
    dirty: BTreeSet<Oid>,
}

impl<'s, D: DataStore> UnitOfWork<'s, D> {
    pub(crate) fn new(store: &'s ObjectStore<D>, ctx: ExecutionContext) -> Self {
        let transaction = Transaction::new(TransactionId::new());
        event!(Level::DEBUG, transaction = %transaction.id(), user = %ctx.user, "unit of work started");
        Self {
            store,
            ctx,
            transaction,
            adapters: AdapterManager::new(),
            tracker: EntityChangeTracker::new(),
            touched: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction.id()
    }

    pub fn adapters(&self) -> &AdapterManager {
        &self.adapters
    }

    pub fn tracker(&self) -> &EntityChangeTracker {
        &self.tracker
    }

    fn ensure_active(&self) -> Result<()> {
        if !self.transaction.state().is_active() {
            return Err(StoreError::Transaction(format!(
                "Transaction {} is {}",
                self.transaction.id(),
                self.transaction.state()
            )));
        }
        Ok(())
    }

    fn require_live(&self, oid: &Oid) -> Result<&ObjectAdapter> {
        let adapter = self.adapters.require(oid)?;
        if adapter.is_destroyed() {
            return Err(StoreError::ObjectNotFound(format!("{} (deleted)", oid)));
        }
        Ok(adapter)
    }

    // ===== Creation =====

    /// New transient root object of the given type.
    pub fn create(&mut self, spec_name: &str) -> Result<Oid> {
        self.ensure_active()?;
        let spec = self.store.specifications().get(spec_name)?;
        if spec.is_aggregated() {
            return Err(StoreError::AggregateMisuse(format!(
                "Aggregated type '{}' can only be created through its owner",
                spec_name
            )));
        }
        let oid = self.store.generator().next_transient(spec_name);
        let pojo = Pojo::for_specification(&spec);
        let adapter = self.adapters.insert(ObjectAdapter::new(oid.clone(), spec, pojo))?;
        self.store.publisher().on_post_create(adapter)?;
        Ok(oid)
    }

    /// New aggregated object owned by `parent` through `association`.
    ///
    /// For a single-valued aggregate the previous occupant is dropped; it
    /// disappears from the store when the root is rewritten.
    pub fn create_aggregated(&mut self, parent: &Oid, association: &str) -> Result<Oid> {
        self.load(parent)?;
        let parent_spec = self.require_live(parent)?.specification().clone();
        let kind = parent_spec.require_association(association)?.kind.clone();

        let (target, local_id, single) = match kind {
            AssociationKind::Reference {
                target,
                aggregated: true,
            } => (target, association.to_string(), true),
            AssociationKind::Collection {
                element,
                element_aggregated: true,
            } => (element, Uuid::new_v4().simple().to_string(), false),
            _ => {
                return Err(StoreError::AggregateMisuse(format!(
                    "{}#{} does not hold aggregated objects",
                    parent_spec.name(),
                    association
                )));
            }
        };

        let spec = self.store.specifications().get(&target)?;
        let oid = Oid::aggregated(target, parent.clone(), local_id);
        self.touch(parent)?;

        if single {
            let previous = self.adapters.require(parent)?.pojo().reference(association).cloned();
            if let Some(previous) = previous {
                self.discard_aggregate(&previous)?;
            }
            self.adapters
                .require_mut(parent)?
                .pojo_mut()
                .set(association, oid.clone());
        } else {
            let pojo = self.adapters.require_mut(parent)?.pojo_mut();
            let mut elements = pojo.collection(association).to_vec();
            elements.push(oid.clone());
            pojo.set(association, FieldValue::Collection(elements));
        }

        let pojo = Pojo::for_specification(&spec);
        let adapter = self.adapters.insert(ObjectAdapter::new(oid.clone(), spec, pojo))?;
        self.store.publisher().on_post_create(adapter)?;
        if oid.is_persistent() {
            let adapter = self.adapters.require_mut(&oid)?;
            self.store.publisher().on_pre_persist(adapter, &mut self.tracker)?;
        }
        Ok(oid)
    }

    /// Drops an aggregate (and everything it owns) from the arena.
    fn discard_aggregate(&mut self, oid: &Oid) -> Result<()> {
        if !self.adapters.contains(oid) {
            return Ok(());
        }
        if oid.is_persistent() {
            let mut gone = self.adapters.aggregated_descendants(oid);
            gone.push(oid.clone());
            for descendant in gone {
                let adapter = self.adapters.require_mut(&descendant)?;
                self.store.publisher().on_pre_remove(adapter, &mut self.tracker)?;
            }
        }
        self.adapters.remove(oid);
        Ok(())
    }

    // ===== Loading and queries =====

    /// Brings an object into the arena, reading it from the store unless it
    /// is already there. Aggregated objects are loaded through their root.
    pub fn load(&mut self, oid: &Oid) -> Result<()> {
        self.ensure_active()?;
        if self.adapters.contains(oid) {
            return Ok(());
        }
        if oid.is_aggregated() {
            self.load(oid.root())?;
            if !self.adapters.contains(oid) {
                return Err(StoreError::ObjectNotFound(oid.to_string()));
            }
            return Ok(());
        }
        if oid.is_transient() {
            return Err(StoreError::ObjectNotFound(oid.to_string()));
        }

        let record = self
            .store
            .backend()?
            .get_instance(&oid.to_string(), oid.spec_name())?
            .ok_or_else(|| StoreError::ObjectNotFound(oid.to_string()))?;
        self.read_record(&record)?;
        Ok(())
    }

    fn read_record(&mut self, record: &D::Reader) -> Result<Oid> {
        let config = self.store.config();
        let reader = ObjectReader::new(self.store.specifications(), config.versioning)
            .with_encryption(&config.encryption, config.encryption_key.as_deref());
        let known = self.adapters.len();
        let loaded = reader.read_object(record, &mut self.adapters)?;
        if self.adapters.len() > known {
            for oid in &loaded {
                if let Some(adapter) = self.adapters.get_mut(oid) {
                    self.store.publisher().on_post_load(adapter)?;
                }
            }
        }
        loaded
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Storage("Stored record has no identity".into()))
    }

    pub fn get_object(&mut self, oid: &Oid) -> Result<&ObjectAdapter> {
        self.load(oid)?;
        self.require_live(oid)
    }

    pub fn value(&mut self, oid: &Oid, field: &str) -> Result<FieldValue> {
        let adapter = self.get_object(oid)?;
        adapter.specification().require_association(field)?;
        Ok(adapter
            .pojo()
            .get(field)
            .cloned()
            .unwrap_or_else(FieldValue::null))
    }

    /// Matching roots, combining stored instances with this unit of work's
    /// own changes, in identity order.
    pub fn instances(&mut self, query: &InstanceQuery) -> Result<Vec<Oid>> {
        self.ensure_active()?;
        let spec_name = query.spec_name();
        if self.store.specifications().get(spec_name)?.is_aggregated() {
            return Err(StoreError::AggregateMisuse(format!(
                "Aggregated type '{}' cannot be queried on its own",
                spec_name
            )));
        }

        let records = self.store.backend()?.instances_of(spec_name)?;
        for record in &records {
            self.read_record(record)?;
        }

        Ok(self
            .adapters
            .adapters()
            .filter(|adapter| !adapter.is_aggregated() && query.matches(adapter))
            .map(|adapter| adapter.oid().clone())
            .collect())
    }

    pub fn check_lock(&self, oid: &Oid, incoming: Option<&Version>) -> Result<()> {
        self.adapters.check_lock(oid, incoming, &self.ctx)
    }

    // ===== Mutation =====

    /// Remembers an object's state before its first change and marks its
    /// root dirty. Objects not yet stored are tracked as creations instead.
    fn touch(&mut self, oid: &Oid) -> Result<()> {
        let root = oid.root().clone();
        if self.adapters.require(&root)?.is_transient() {
            return Ok(());
        }
        if !self.touched.contains_key(oid) {
            let snapshot = self.adapters.require(oid)?.pojo().clone();
            self.touched.insert(oid.clone(), snapshot);
        }
        self.dirty.insert(root);
        Ok(())
    }

    pub fn set(&mut self, oid: &Oid, field: &str, value: impl Into<FieldValue>) -> Result<()> {
        self.load(oid)?;
        let value = value.into();
        let adapter = self.require_live(oid)?;
        let spec = adapter.specification().clone();
        let association = spec.require_association(field)?;
        let value = match (&association.kind, value) {
            (AssociationKind::Value(codec), FieldValue::Value(scalar)) => {
                FieldValue::Value(codec.widen(scalar))
            }
            (_, value) => value,
        };

        match (&association.kind, &value) {
            (AssociationKind::Value(codec), FieldValue::Value(scalar)) => {
                if !codec.is_compatible(scalar) {
                    return Err(StoreError::DomainModel(format!(
                        "{}#{} expects {}, got {}",
                        spec.name(),
                        field,
                        codec,
                        scalar.type_name()
                    )));
                }
            }
            (AssociationKind::Reference { aggregated: true, .. }, FieldValue::Reference(None)) => {
                if let Some(previous) = adapter.pojo().reference(field).cloned() {
                    self.touch(oid)?;
                    self.discard_aggregate(&previous)?;
                }
            }
            (AssociationKind::Reference { aggregated: true, .. }, FieldValue::Reference(Some(_))) => {
                return Err(StoreError::AggregateMisuse(format!(
                    "{}#{} is an aggregate; use create_aggregated",
                    spec.name(),
                    field
                )));
            }
            (
                AssociationKind::Reference {
                    target,
                    aggregated: false,
                },
                FieldValue::Reference(reference),
            ) => {
                if let Some(reference) = reference {
                    if reference.is_aggregated() || reference.spec_name() != target {
                        return Err(StoreError::DomainModel(format!(
                            "{}#{} must refer to a {} root, got {}",
                            spec.name(),
                            field,
                            target,
                            reference
                        )));
                    }
                }
            }
            (AssociationKind::Collection { .. }, _) => {
                return Err(StoreError::DomainModel(format!(
                    "{}#{} is a collection; use add and remove",
                    spec.name(),
                    field
                )));
            }
            (kind, other) => {
                return Err(StoreError::DomainModel(format!(
                    "{}#{} is declared as {:?} but was given {}",
                    spec.name(),
                    field,
                    kind,
                    other
                )));
            }
        }

        self.touch(oid)?;
        self.adapters.require_mut(oid)?.pojo_mut().set(field, value);
        Ok(())
    }

    /// Adds a reference to a plain (non-aggregated) collection.
    pub fn add(&mut self, oid: &Oid, collection: &str, element: &Oid) -> Result<()> {
        self.load(oid)?;
        let spec = self.require_live(oid)?.specification().clone();
        match &spec.require_association(collection)?.kind {
            AssociationKind::Collection {
                element: element_type,
                element_aggregated: false,
            } => {
                if element.is_aggregated() || element.spec_name() != element_type {
                    return Err(StoreError::DomainModel(format!(
                        "{}#{} holds {} roots, got {}",
                        spec.name(),
                        collection,
                        element_type,
                        element
                    )));
                }
            }
            AssociationKind::Collection { .. } => {
                return Err(StoreError::AggregateMisuse(format!(
                    "{}#{} holds aggregated objects; use create_aggregated",
                    spec.name(),
                    collection
                )));
            }
            _ => {
                return Err(StoreError::DomainModel(format!(
                    "{}#{} is not a collection",
                    spec.name(),
                    collection
                )));
            }
        }

        if self.adapters.require(oid)?.pojo().collection(collection).contains(element) {
            return Ok(());
        }
        self.touch(oid)?;
        let pojo = self.adapters.require_mut(oid)?.pojo_mut();
        let mut elements = pojo.collection(collection).to_vec();
        elements.push(element.clone());
        pojo.set(collection, FieldValue::Collection(elements));
        Ok(())
    }

    /// Removes an element from a collection. Aggregated elements are
    /// discarded along with everything they own.
    pub fn remove(&mut self, oid: &Oid, collection: &str, element: &Oid) -> Result<()> {
        self.load(oid)?;
        let adapter = self.require_live(oid)?;
        let spec = adapter.specification().clone();
        if !spec.require_association(collection)?.is_one_to_many() {
            return Err(StoreError::DomainModel(format!(
                "{}#{} is not a collection",
                spec.name(),
                collection
            )));
        }
        if !adapter.pojo().collection(collection).contains(element) {
            return Ok(());
        }

        self.touch(oid)?;
        if let Some(elements) = self.adapters.require_mut(oid)?.pojo_mut().collection_mut(collection) {
            elements.retain(|existing| existing != element);
        }
        if element.is_aggregated() {
            self.discard_aggregate(element)?;
        }
        Ok(())
    }

    /// Schedules a root object for deletion. Aggregated objects are removed
    /// through their owner instead.
    pub fn destroy(&mut self, oid: &Oid) -> Result<()> {
        self.load(oid)?;
        let adapter = self.adapters.require(oid)?;
        if adapter.is_destroyed() {
            return Ok(());
        }
        let command = create_destroy_object_command(adapter)?;
        let never_stored = adapter.is_transient();

        let mut removed = self.adapters.aggregated_descendants(oid);
        removed.insert(0, oid.clone());
        if oid.is_persistent() {
            self.enlist_all(&removed, ObjectLifecyclePublisher::on_pre_remove)?;
        }
        self.dirty.remove(oid);

        if never_stored {
            // nothing in the store yet: drop the pending insert and forget it
            self.transaction.discard(oid)?;
            self.adapters.remove(oid);
            return Ok(());
        }

        self.transaction.queue(command)?;
        for target in removed {
            self.adapters.require_mut(&target)?.mark_destroyed();
        }
        Ok(())
    }

    /// Gives a transient root (and every transient root reachable from it)
    /// a persistent identity and queues their inserts. Returns the root's
    /// new identity.
    pub fn make_persistent(&mut self, oid: &Oid) -> Result<Oid> {
        self.load(oid)?;
        let adapter = self.require_live(oid)?;
        if adapter.is_aggregated() {
            return Err(StoreError::AggregateMisuse(format!(
                "{} is aggregated; it is stored with its root",
                oid
            )));
        }
        if oid.is_persistent() {
            return Ok(oid.clone());
        }

        let span = info_span!("make_persistent", oid = %oid);
        let _guard = span.enter();

        let mut pending = self.reachable_transients(oid)?;
        let mut root = oid.clone();
        while let Some(transient) = pending.pop() {
            let persisted = self.persist_one(&transient)?;
            for other in pending.iter_mut() {
                *other = other.rebased(&transient, &persisted);
            }
            if transient == root {
                root = persisted;
            }
        }
        Ok(root)
    }

    /// Transient roots reachable through plain references, `start` first;
    /// persisting from the end of the list handles referenced objects
    /// before their referrers.
    fn reachable_transients(&self, start: &Oid) -> Result<Vec<Oid>> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut stack = vec![start.clone()];
        while let Some(next) = stack.pop() {
            if !seen.insert(next.clone()) {
                continue;
            }
            order.push(next.clone());

            let mut owned = self.adapters.aggregated_descendants(&next);
            owned.push(next.clone());
            for holder in owned {
                let adapter = self.adapters.require(&holder)?;
                for (_, value) in adapter.pojo().fields() {
                    let targets: Vec<&Oid> = match value {
                        FieldValue::Reference(Some(target)) => vec![target],
                        FieldValue::Collection(elements) => elements.iter().collect(),
                        _ => continue,
                    };
                    for target in targets {
                        if !target.is_aggregated()
                            && target.is_transient()
                            && self.adapters.contains(target)
                        {
                            stack.push(target.clone());
                        }
                    }
                }
            }
        }
        Ok(order)
    }

    /// Runs a publisher hook over `targets` as one step: if any callback
    /// fails, nothing they enlisted stays in the tracker.
    fn enlist_all<F>(&mut self, targets: &[Oid], hook: F) -> Result<()>
    where
        F: Fn(&ObjectLifecyclePublisher, &mut ObjectAdapter, &mut EntityChangeTracker) -> Result<()>,
    {
        let saved = self.tracker.clone();
        let outcome = targets.iter().try_for_each(|target| {
            let adapter = self.adapters.require_mut(target)?;
            hook(self.store.publisher(), adapter, &mut self.tracker)
        });
        if outcome.is_err() {
            self.tracker = saved;
        }
        outcome
    }

    fn persist_one(&mut self, transient: &Oid) -> Result<Oid> {
        let mut members = vec![transient.clone()];
        members.extend(self.adapters.aggregated_descendants(transient));
        self.enlist_all(&members, ObjectLifecyclePublisher::on_pre_persist)?;

        let persisted = self.store.persistent_oid_for(transient)?;
        for (old, new) in self.adapters.remap(transient, persisted.clone())? {
            self.tracker.rebase(&old, &new);
            if let Some(snapshot) = self.touched.remove(&old) {
                self.touched.insert(new.clone(), snapshot);
            }
            if self.dirty.remove(&old) {
                self.dirty.insert(new);
            }
        }

        if let Some(command) = create_create_object_command(self.adapters.require(&persisted)?)? {
            self.transaction.queue(command)?;
        }
        event!(Level::DEBUG, from = %transient, to = %persisted, "object made persistent");
        Ok(persisted)
    }

    // ===== Flush / commit / abort =====

    /// Turns pending changes into update commands and change records.
    pub fn flush(&mut self) -> Result<()> {
        self.ensure_active()?;
        let dirty: Vec<Oid> = std::mem::take(&mut self.dirty).into_iter().collect();
        for root in dirty {
            let Some(adapter) = self.adapters.get(&root) else {
                continue;
            };
            if adapter.is_destroyed() || adapter.is_transient() {
                continue;
            }

            let entities: Vec<Oid> = self
                .touched
                .keys()
                .filter(|oid| oid.root() == &root && self.adapters.contains(oid))
                .cloned()
                .collect();
            for entity in entities {
                let records = self.change_records(&entity)?;
                let adapter = self.adapters.require_mut(&entity)?;
                self.store
                    .publisher()
                    .on_pre_update(adapter, records, &mut self.tracker)?;
            }

            let command = create_save_object_command(self.adapters.require(&root)?)?;
            self.transaction.queue(command)?;
        }
        self.tracker.capture_created_post_values(&self.adapters);
        Ok(())
    }

    fn change_records(&self, oid: &Oid) -> Result<Vec<PropertyChangeRecord>> {
        let adapter = self.adapters.require(oid)?;
        let Some(before) = self.touched.get(oid) else {
            return Ok(Vec::new());
        };
        let mut records = Vec::new();
        for association in adapter.specification().associations() {
            if !association.is_publishable() {
                continue;
            }
            let pre = before.get(&association.id).cloned().unwrap_or_else(FieldValue::null);
            let post = association.get(adapter).clone();
            if pre == post {
                continue;
            }
            records.push(
                PropertyChangeRecord::new(oid, &association.id, PropertyValue::Present(pre))
                    .with_post(PropertyValue::Present(post)),
            );
        }
        Ok(records)
    }

    /// Flushes, executes every queued command in one store transaction and
    /// publishes the resulting changes.
    pub fn commit(&mut self) -> Result<TransactionId> {
        let span = info_span!("commit", transaction = %self.transaction.id(), user = %self.ctx.user);
        let _guard = span.enter();

        if let Err(err) = self.flush() {
            self.abort_quietly();
            return Err(err);
        }
        let commands = self.transaction.drain_commands()?;

        if let Err(err) = self.store.execute(&commands, &mut self.adapters, &self.ctx) {
            self.abort_quietly();
            return Err(err);
        }
        self.transaction.commit()?;

        self.after_commit(&commands);
        self.store
            .publisher()
            .publish(&self.tracker, Utc::now(), &self.ctx.user, self.transaction.id());
        event!(Level::INFO, commands = commands.len(), "transaction committed");

        self.touched.clear();
        self.tracker.clear();
        Ok(self.transaction.id())
    }

    fn after_commit(&mut self, commands: &[PersistenceCommand]) {
        let publisher = self.store.publisher();
        for command in commands {
            let Some(adapter) = self.adapters.get_mut(command.oid()) else {
                continue;
            };
            let outcome = match command {
                PersistenceCommand::Create { .. }
                | PersistenceCommand::Write {
                    mode: WriteMode::Insert,
                    ..
                } => publisher.on_post_persist(adapter),
                PersistenceCommand::Write { .. } => publisher.on_post_update(adapter),
                PersistenceCommand::Destroy { .. } => Ok(()),
            };
            // the data is already stored; a failing post hook cannot undo it
            if let Err(err) = outcome {
                log::warn!("post-commit callback failed for {}: {}", command.oid(), err);
            }
        }
    }

    /// Discards queued commands and puts touched objects back the way they
    /// were loaded.
    pub fn abort(&mut self) -> Result<()> {
        self.transaction.rollback()?;
        for (oid, snapshot) in std::mem::take(&mut self.touched) {
            if let Some(adapter) = self.adapters.get_mut(&oid) {
                *adapter.pojo_mut() = snapshot;
            }
        }
        self.dirty.clear();
        self.tracker.clear();
        event!(Level::DEBUG, transaction = %self.transaction.id(), "unit of work aborted");
        Ok(())
    }

    fn abort_quietly(&mut self) {
        if let Err(err) = self.abort() {
            event!(Level::ERROR, error = %err, "abort failed");
        }
    }
}

impl<D: DataStore> Drop for UnitOfWork<'_, D> {
    fn drop(&mut self) {
        if self.transaction.state().is_active() {
            self.abort_quietly();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Value, ValueType};
    use crate::object::{ObjectSpecification, SpecificationRegistry};
    use crate::store::{MemoryDataStore, StoreConfig};

    fn store() -> ObjectStore<MemoryDataStore> {
        let specs = SpecificationRegistry::new();
        specs
            .register(
                ObjectSpecification::builder("Customer")
                    .property("name", ValueType::Text)
                    .aggregate("address", "Address")
                    .aggregate_collection("phones", "Phone")
                    .reference("referrer", "Customer")
                    .build(),
            )
            .unwrap();
        specs
            .register(
                ObjectSpecification::builder("Address")
                    .aggregated()
                    .property("city", ValueType::Text)
                    .build(),
            )
            .unwrap();
        specs
            .register(
                ObjectSpecification::builder("Phone")
                    .aggregated()
                    .property("number", ValueType::Text)
                    .build(),
            )
            .unwrap();
        let store = ObjectStore::new(MemoryDataStore::new(), specs, StoreConfig::default()).unwrap();
        store.open().unwrap();
        store
    }

    fn alice() -> ExecutionContext {
        ExecutionContext::new("alice")
    }

    fn saved_customer(store: &ObjectStore<MemoryDataStore>, name: &str) -> Oid {
        let mut uow = store.begin(alice());
        let oid = uow.create("Customer").unwrap();
        uow.set(&oid, "name", Value::from(name)).unwrap();
        let oid = uow.make_persistent(&oid).unwrap();
        uow.commit().unwrap();
        oid
    }

    #[test]
    fn test_created_object_is_stored_on_commit() {
        let store = store();
        let oid = saved_customer(&store, "Alice");
        assert!(oid.is_persistent());

        let mut uow = store.begin(alice());
        assert_eq!(
            uow.value(&oid, "name").unwrap(),
            FieldValue::Value(Value::from("Alice"))
        );
        assert_eq!(
            uow.get_object(&oid).unwrap().version().map(Version::sequence_string),
            Some("1".to_string())
        );
    }

    #[test]
    fn test_update_advances_version() {
        let store = store();
        let oid = saved_customer(&store, "Alice");

        let mut uow = store.begin(alice());
        uow.set(&oid, "name", Value::from("Alicia")).unwrap();
        uow.commit().unwrap();

        let mut uow = store.begin(alice());
        let adapter = uow.get_object(&oid).unwrap();
        assert_eq!(adapter.pojo().value("name"), Some(&Value::from("Alicia")));
        assert_eq!(
            adapter.version().map(Version::sequence_string),
            Some("2".to_string())
        );
    }

    #[test]
    fn test_uncommitted_work_is_dropped() {
        let store = store();
        {
            let mut uow = store.begin(alice());
            let oid = uow.create("Customer").unwrap();
            uow.make_persistent(&oid).unwrap();
        }
        assert!(!store.has_instances("Customer").unwrap());
    }

    #[test]
    fn test_stale_update_conflicts() {
        let store = store();
        let oid = saved_customer(&store, "Alice");

        let mut first = store.begin(alice());
        let mut second = store.begin(ExecutionContext::new("bob"));
        first.set(&oid, "name", Value::from("One")).unwrap();
        second.set(&oid, "name", Value::from("Two")).unwrap();

        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_aggregates_travel_with_their_root() {
        let store = store();
        let mut uow = store.begin(alice());
        let customer = uow.create("Customer").unwrap();
        let address = uow.create_aggregated(&customer, "address").unwrap();
        uow.set(&address, "city", Value::from("Oslo")).unwrap();
        let phone = uow.create_aggregated(&customer, "phones").unwrap();
        uow.set(&phone, "number", Value::from("555")).unwrap();
        let customer = uow.make_persistent(&customer).unwrap();
        uow.commit().unwrap();

        let mut uow = store.begin(alice());
        uow.load(&customer).unwrap();
        let address = uow.adapters().require(&customer).unwrap().pojo().reference("address").cloned().unwrap();
        assert_eq!(address.root(), &customer);
        assert_eq!(
            uow.value(&address, "city").unwrap(),
            FieldValue::Value(Value::from("Oslo"))
        );
        let phones = uow.adapters().require(&customer).unwrap().pojo().collection("phones").to_vec();
        assert_eq!(phones.len(), 1);

        uow.remove(&customer, "phones", &phones[0]).unwrap();
        uow.commit().unwrap();

        let mut uow = store.begin(alice());
        uow.load(&customer).unwrap();
        assert!(uow.adapters().require(&customer).unwrap().pojo().collection("phones").is_empty());
    }

    #[test]
    fn test_aggregates_cannot_be_destroyed_or_created_directly() {
        let store = store();
        let mut uow = store.begin(alice());
        assert!(uow.create("Address").unwrap_err().is_domain_model_error());

        let customer = uow.create("Customer").unwrap();
        let address = uow.create_aggregated(&customer, "address").unwrap();
        let err = uow.destroy(&address).unwrap_err();
        assert!(err.is_domain_model_error());
        assert!(uow.make_persistent(&address).unwrap_err().is_domain_model_error());
    }

    #[test]
    fn test_make_persistent_covers_referenced_transients() {
        let store = store();
        let mut uow = store.begin(alice());
        let referrer = uow.create("Customer").unwrap();
        let customer = uow.create("Customer").unwrap();
        uow.set(&customer, "referrer", referrer.clone()).unwrap();
        let customer = uow.make_persistent(&customer).unwrap();

        let reference = uow.adapters().require(&customer).unwrap().pojo().reference("referrer").cloned().unwrap();
        assert!(reference.is_persistent());
        assert!(uow.adapters().contains(&reference));
        assert_eq!(uow.transaction().command_count(), 2);
        uow.commit().unwrap();

        let mut uow = store.begin(alice());
        assert_eq!(uow.instances(&InstanceQuery::all("Customer")).unwrap().len(), 2);
    }

    #[test]
    fn test_destroy_removes_record() {
        let store = store();
        let oid = saved_customer(&store, "Alice");

        let mut uow = store.begin(alice());
        uow.load(&oid).unwrap();
        uow.destroy(&oid).unwrap();
        uow.destroy(&oid).unwrap();
        assert!(uow.set(&oid, "name", Value::from("x")).is_err());
        uow.commit().unwrap();

        assert!(!store.has_instances("Customer").unwrap());
    }

    #[test]
    fn test_destroying_pending_insert_drops_it() {
        let store = store();
        let mut uow = store.begin(alice());
        let oid = uow.create("Customer").unwrap();
        let oid = uow.make_persistent(&oid).unwrap();
        uow.destroy(&oid).unwrap();
        assert_eq!(uow.transaction().command_count(), 0);
        uow.commit().unwrap();
        assert!(!store.has_instances("Customer").unwrap());
    }

    #[test]
    fn test_set_rejects_incompatible_values() {
        let store = store();
        let mut uow = store.begin(alice());
        let oid = uow.create("Customer").unwrap();
        assert!(uow.set(&oid, "name", Value::from(3i64)).unwrap_err().is_domain_model_error());
        assert!(uow.set(&oid, "phones", FieldValue::Collection(vec![])).is_err());
        assert!(uow.set(&oid, "missing", Value::from("x")).is_err());
    }

    #[test]
    fn test_committed_unit_of_work_rejects_more_work() {
        let store = store();
        let mut uow = store.begin(alice());
        uow.commit().unwrap();
        assert!(matches!(
            uow.create("Customer").unwrap_err(),
            StoreError::Transaction(_)
        ));
    }
}
