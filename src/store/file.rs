//! File-backed store: a memory store whose committed contents are written as
//! a whole snapshot after every successful store transaction.

use super::{DataStore, MemoryDataStore, SerialNumberSource, SnapshotFormat, StoreContents};
use crate::command::ObjectData;
use crate::core::{Result, StoreError};
use crate::object::Oid;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{Level, event};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub created_at: i64,
    pub next_serial: i64,
    pub contents: StoreContents,
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
    format: SnapshotFormat,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P, format: SnapshotFormat) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Writes the snapshot to a temp file next to the target and renames it
    /// into place, so readers never see a half-written file.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let directory = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&directory).map_err(|e| {
            StoreError::Io(format!("Failed to create snapshot directory: {}", e))
        })?;

        let serialized = match self.format {
            SnapshotFormat::Json => serde_json::to_vec_pretty(snapshot)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize snapshot: {}", e)))?,
            SnapshotFormat::MessagePack => rmp_serde::to_vec_named(snapshot)
                .map_err(|e| StoreError::Storage(format!("Failed to serialize snapshot: {}", e)))?,
        };

        let mut temp = NamedTempFile::new_in(&directory)?;
        temp.write_all(&serialized)?;
        temp.as_file().sync_all()?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| StoreError::Io(format!("Failed to replace snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&self.snapshot_path)?;
        let snapshot: StoreSnapshot = match self.format {
            SnapshotFormat::Json => serde_json::from_slice(&bytes)
                .map_err(|e| StoreError::Storage(format!("Failed to read snapshot: {}", e)))?,
            SnapshotFormat::MessagePack => rmp_serde::from_slice(&bytes)
                .map_err(|e| StoreError::Storage(format!("Failed to read snapshot: {}", e)))?,
        };
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::Storage(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }
}

// ============================================================================
// File Data Store
// ============================================================================

pub struct FileDataStore {
    inner: MemoryDataStore,
    snapshots: SnapshotManager,
}

impl FileDataStore {
    pub fn new<P: AsRef<Path>>(path: P, format: SnapshotFormat) -> Self {
        Self {
            inner: MemoryDataStore::new(),
            snapshots: SnapshotManager::new(path, format),
        }
    }

    pub fn path(&self) -> &Path {
        self.snapshots.path()
    }

    fn checkpoint(&self) -> Result<()> {
        self.write_snapshot(self.inner.committed())
    }

    fn write_snapshot(&self, contents: &StoreContents) -> Result<()> {
        let snapshot = StoreSnapshot {
            version: SNAPSHOT_VERSION,
            created_at: Utc::now().timestamp_millis(),
            next_serial: self.inner.next_serial(),
            contents: contents.clone(),
        };
        self.snapshots.save(&snapshot)?;
        event!(
            Level::DEBUG,
            path = %self.snapshots.path().display(),
            records = snapshot.contents.record_count(),
            "snapshot written"
        );
        Ok(())
    }

    /// Outside a store transaction every write is its own transaction and
    /// is durable on return; a write whose snapshot fails is not applied.
    fn autocommit<F>(&mut self, write: F) -> Result<()>
    where
        F: FnOnce(&mut MemoryDataStore) -> Result<()>,
    {
        if self.inner.in_transaction() {
            return write(&mut self.inner);
        }
        self.inner.start_transaction()?;
        let outcome = write(&mut self.inner).and_then(|()| self.end_transaction());
        if outcome.is_err() {
            self.inner.abort_transaction()?;
        }
        outcome
    }
}

impl SerialNumberSource for FileDataStore {
    fn next_serial_number_batch(&mut self, size: usize) -> Result<i64> {
        let first = self.inner.next_serial_number_batch(size)?;
        // the reserved range must survive a restart even if nothing commits
        self.checkpoint()?;
        Ok(first)
    }
}

impl DataStore for FileDataStore {
    type Writer = ObjectData;
    type Reader = ObjectData;

    fn open(&mut self) -> Result<()> {
        if let Some(snapshot) = self.snapshots.load()? {
            event!(
                Level::INFO,
                path = %self.snapshots.path().display(),
                records = snapshot.contents.record_count(),
                "snapshot loaded"
            );
            self.inner = MemoryDataStore::restore(snapshot.contents, snapshot.next_serial);
        }
        self.inner.open()
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()?;
        self.checkpoint()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn create_state_writer(&self) -> ObjectData {
        self.inner.create_state_writer()
    }

    fn start_transaction(&mut self) -> Result<()> {
        self.inner.start_transaction()
    }

    /// The staged contents reach disk before they become visible; a failed
    /// snapshot leaves the transaction open for the caller to abort.
    fn end_transaction(&mut self) -> Result<()> {
        if self.inner.in_transaction() {
            self.write_snapshot(self.inner.contents())?;
        }
        self.inner.end_transaction()
    }

    fn abort_transaction(&mut self) -> Result<()> {
        self.inner.abort_transaction()
    }

    fn insert(&mut self, state: ObjectData) -> Result<()> {
        self.autocommit(|inner| inner.insert(state))
    }

    fn update(&mut self, state: ObjectData, user: &str) -> Result<()> {
        self.autocommit(|inner| inner.update(state, user))
    }

    fn delete(
        &mut self,
        spec_name: &str,
        key: &str,
        version: Option<&str>,
        oid: &Oid,
        user: &str,
    ) -> Result<()> {
        self.autocommit(|inner| inner.delete(spec_name, key, version, oid, user))
    }

    fn get_instance(&self, key: &str, spec_name: &str) -> Result<Option<ObjectData>> {
        self.inner.get_instance(key, spec_name)
    }

    fn instances_of(&self, spec_name: &str) -> Result<Vec<ObjectData>> {
        self.inner.instances_of(spec_name)
    }

    fn has_instances(&self, spec_name: &str) -> Result<bool> {
        self.inner.has_instances(spec_name)
    }

    fn add_service(&mut self, name: &str, key: &str) -> Result<()> {
        self.autocommit(|inner| inner.add_service(name, key))
    }

    fn get_service(&self, name: &str) -> Result<Option<String>> {
        self.inner.get_service(name)
    }
}
