//! Recommended imports grouped by how deep an application reaches.
//!
//! `domain` is what application code defining and changing objects needs.
//! `backend` is for code that implements or inspects storage backends.

pub mod domain {
    //! Specifications, units of work and actions.
    pub use crate::core::{ExecutionContext, Result, StoreError, Value, ValueType};
    pub use crate::lifecycle::InMemoryAuditTrail;
    pub use crate::object::{
        FieldValue, LifecycleEvent, ObjectSpecification, Oid, SpecificationRegistry, Version,
        VersionScheme,
    };
    pub use crate::store::{InstanceQuery, ObjectContainer, ObjectStore, StoreConfig, UnitOfWork};
    pub use crate::wrapper::{ExecutionMode, ObjectAction, WrapperFactory};
}

pub mod backend {
    //! Escape hatch for storage backends and the command pipeline.
    pub use crate::command::{ObjectData, PersistenceCommand, StateReader, StateWriter};
    pub use crate::store::{
        DataStore, FileDataStore, MemoryDataStore, SerialNumberSource, SnapshotFormat,
    };
}
