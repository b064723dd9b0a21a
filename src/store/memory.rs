use super::{DataStore, SerialNumberSource};
use crate::command::ObjectData;
use crate::core::{Result, StoreError};
use crate::object::Oid;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records and service registrations held by a memory store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreContents {
    /// specification name -> key -> record
    pub objects: BTreeMap<String, BTreeMap<String, ObjectData>>,
    pub services: BTreeMap<String, String>,
}

impl StoreContents {
    pub fn record_count(&self) -> usize {
        self.objects.values().map(BTreeMap::len).sum()
    }
}

/// In-memory backend.
///
/// A transaction stages a copy of the committed contents; ending it swaps the
/// copy in, aborting drops it. Writes outside a transaction apply directly.
/// Serial numbers are never rolled back.
#[derive(Debug)]
pub struct MemoryDataStore {
    committed: StoreContents,
    staged: Option<StoreContents>,
    next_serial: i64,
    open: bool,
}

impl MemoryDataStore {
    pub fn new() -> Self {
        Self {
            committed: StoreContents::default(),
            staged: None,
            next_serial: 1,
            open: false,
        }
    }

    /// Rebuilds a store from previously saved contents.
    pub fn restore(contents: StoreContents, next_serial: i64) -> Self {
        Self {
            committed: contents,
            staged: None,
            next_serial: next_serial.max(1),
            open: false,
        }
    }

    pub fn committed(&self) -> &StoreContents {
        &self.committed
    }

    pub fn next_serial(&self) -> i64 {
        self.next_serial
    }

    pub fn in_transaction(&self) -> bool {
        self.staged.is_some()
    }

    /// What reads see: the staged copy inside a transaction.
    pub fn contents(&self) -> &StoreContents {
        self.staged.as_ref().unwrap_or(&self.committed)
    }

    fn contents_mut(&mut self) -> &mut StoreContents {
        match &mut self.staged {
            Some(staged) => staged,
            None => &mut self.committed,
        }
    }

    fn identify(state: &ObjectData) -> Result<(String, String)> {
        let key = state
            .oid
            .clone()
            .ok_or_else(|| StoreError::Storage("Record has no identity".into()))?;
        let spec = state
            .spec
            .clone()
            .ok_or_else(|| StoreError::Storage(format!("Record {} has no type", key)))?;
        Ok((spec, key))
    }

    fn check_version(stored: &ObjectData, expected: Option<&str>, key: &str, user: &str) -> Result<()> {
        match (stored.version.as_deref(), expected) {
            (Some(current), Some(expected)) if current != expected => {
                Err(StoreError::ConcurrencyConflict {
                    user: user.to_string(),
                    oid: key.to_string(),
                    current: current.to_string(),
                    incoming: expected.to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl Default for MemoryDataStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SerialNumberSource for MemoryDataStore {
    fn next_serial_number_batch(&mut self, size: usize) -> Result<i64> {
        if size == 0 {
            return Err(StoreError::InternalConsistency(
                "Serial number batch size must be > 0".into(),
            ));
        }
        let first = self.next_serial;
        self.next_serial += size as i64;
        Ok(first)
    }
}

impl DataStore for MemoryDataStore {
    type Writer = ObjectData;
    type Reader = ObjectData;

    fn open(&mut self) -> Result<()> {
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.staged = None;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn create_state_writer(&self) -> ObjectData {
        ObjectData::new()
    }

    fn start_transaction(&mut self) -> Result<()> {
        if self.staged.is_some() {
            return Err(StoreError::Transaction(
                "A store transaction is already in progress".into(),
            ));
        }
        self.staged = Some(self.committed.clone());
        Ok(())
    }

    fn end_transaction(&mut self) -> Result<()> {
        let staged = self
            .staged
            .take()
            .ok_or_else(|| StoreError::Transaction("No store transaction to end".into()))?;
        self.committed = staged;
        Ok(())
    }

    fn abort_transaction(&mut self) -> Result<()> {
        self.staged = None;
        Ok(())
    }

    fn insert(&mut self, mut state: ObjectData) -> Result<()> {
        let (spec, key) = Self::identify(&state)?;
        state.expected_version = None;
        let records = self.contents_mut().objects.entry(spec).or_default();
        if records.contains_key(&key) {
            return Err(StoreError::Storage(format!("Object {} already exists", key)));
        }
        records.insert(key, state);
        Ok(())
    }

    fn update(&mut self, mut state: ObjectData, user: &str) -> Result<()> {
        let (spec, key) = Self::identify(&state)?;
        let expected = state.expected_version.take();
        let stored = self
            .contents_mut()
            .objects
            .get_mut(&spec)
            .and_then(|records| records.get_mut(&key))
            .ok_or_else(|| StoreError::ObjectNotFound(key.clone()))?;
        Self::check_version(stored, expected.as_deref(), &key, user)?;
        *stored = state;
        Ok(())
    }

    fn delete(
        &mut self,
        spec_name: &str,
        key: &str,
        version: Option<&str>,
        _oid: &Oid,
        user: &str,
    ) -> Result<()> {
        let records = self
            .contents_mut()
            .objects
            .get_mut(spec_name)
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
        let stored = records
            .get(key)
            .ok_or_else(|| StoreError::ObjectNotFound(key.to_string()))?;
        Self::check_version(stored, version, key, user)?;
        records.remove(key);
        Ok(())
    }

    fn get_instance(&self, key: &str, spec_name: &str) -> Result<Option<ObjectData>> {
        Ok(self
            .contents()
            .objects
            .get(spec_name)
            .and_then(|records| records.get(key))
            .cloned())
    }

    fn instances_of(&self, spec_name: &str) -> Result<Vec<ObjectData>> {
        Ok(self
            .contents()
            .objects
            .get(spec_name)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default())
    }

    fn has_instances(&self, spec_name: &str) -> Result<bool> {
        Ok(self
            .contents()
            .objects
            .get(spec_name)
            .is_some_and(|records| !records.is_empty()))
    }

    fn add_service(&mut self, name: &str, key: &str) -> Result<()> {
        self.contents_mut()
            .services
            .insert(name.to_string(), key.to_string());
        Ok(())
    }

    fn get_service(&self, name: &str) -> Result<Option<String>> {
        Ok(self.contents().services.get(name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::StateWriter;

    fn record(key: &str, version: &str) -> ObjectData {
        let mut data = ObjectData::new();
        data.write_oid(key);
        data.write_type("Customer");
        data.write_version(None, version);
        data
    }

    #[test]
    fn test_abort_discards_staged_writes() {
        let mut store = MemoryDataStore::new();
        store.insert(record("Customer:1", "1")).unwrap();

        store.start_transaction().unwrap();
        store.insert(record("Customer:2", "1")).unwrap();
        assert!(store.get_instance("Customer:2", "Customer").unwrap().is_some());
        store.abort_transaction().unwrap();

        assert!(store.get_instance("Customer:2", "Customer").unwrap().is_none());
        assert_eq!(store.committed().record_count(), 1);
    }

    #[test]
    fn test_end_publishes_staged_writes() {
        let mut store = MemoryDataStore::new();
        store.start_transaction().unwrap();
        assert!(store.start_transaction().is_err());
        store.insert(record("Customer:1", "1")).unwrap();
        store.end_transaction().unwrap();

        assert!(store.has_instances("Customer").unwrap());
        assert!(store.end_transaction().is_err());
    }

    #[test]
    fn test_update_checks_expected_version() {
        let mut store = MemoryDataStore::new();
        store.insert(record("Customer:1", "5")).unwrap();

        let mut stale = record("Customer:1", "5");
        stale.write_version(Some("4"), "5");
        let err = store.update(stale, "bob").unwrap_err();
        match err {
            StoreError::ConcurrencyConflict { user, current, incoming, .. } => {
                assert_eq!(user, "bob");
                assert_eq!(current, "5");
                assert_eq!(incoming, "4");
            }
            other => panic!("unexpected error {other}"),
        }

        let mut fresh = record("Customer:1", "6");
        fresh.write_version(Some("5"), "6");
        store.update(fresh, "bob").unwrap();
        assert_eq!(
            store.get_instance("Customer:1", "Customer").unwrap().unwrap().version.as_deref(),
            Some("6")
        );
    }

    #[test]
    fn test_insert_rejects_duplicates_and_delete_missing() {
        let mut store = MemoryDataStore::new();
        store.insert(record("Customer:1", "1")).unwrap();
        assert!(store.insert(record("Customer:1", "1")).is_err());

        let oid = Oid::persistent("Customer", 9);
        assert!(matches!(
            store.delete("Customer", "Customer:9", None, &oid, "alice"),
            Err(StoreError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_serial_batches_survive_abort() {
        let mut store = MemoryDataStore::new();
        store.start_transaction().unwrap();
        assert_eq!(store.next_serial_number_batch(10).unwrap(), 1);
        store.abort_transaction().unwrap();
        assert_eq!(store.next_serial_number_batch(10).unwrap(), 11);
        assert!(store.next_serial_number_batch(0).is_err());
    }

    #[test]
    fn test_services() {
        let mut store = MemoryDataStore::new();
        assert_eq!(store.get_service("Repository").unwrap(), None);
        store.add_service("Repository", "Repository:4").unwrap();
        assert_eq!(
            store.get_service("Repository").unwrap().as_deref(),
            Some("Repository:4")
        );
    }
}
