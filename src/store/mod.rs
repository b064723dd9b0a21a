// ============================================================================
// Object Store
// ============================================================================
//
// Storage backends, identity generation and the unit of work. An
// ObjectStore owns one DataStore backend; every unit of work borrows the
// store, collects changes in its own adapter arena and hands the resulting
// command batch back to the store on commit.
//
// ============================================================================

pub mod config;
pub mod container;
pub mod data_store;
pub mod file;
pub mod memory;
pub mod object_store;
pub mod oid_generator;
pub mod query;
pub mod transaction;
pub mod unit_of_work;

pub use config::{SnapshotFormat, StoreConfig};
pub use container::ObjectContainer;
pub use data_store::{DataStore, SerialNumberSource};
pub use file::{FileDataStore, SnapshotManager, StoreSnapshot};
pub use memory::{MemoryDataStore, StoreContents};
pub use object_store::ObjectStore;
pub use oid_generator::{OidGenerator, SerialCursor, TRANSIENT_ID_START};
pub use query::InstanceQuery;
pub use transaction::{Transaction, TransactionId, TransactionState};
pub use unit_of_work::UnitOfWork;
