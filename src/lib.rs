// ============================================================================
// memostore Library
// ============================================================================
//
// Object lifecycle tracking and the persistence-command pipeline for
// metadata-driven domain models. Domain objects are described by
// specifications, changed inside a unit of work, and written back to a
// pluggable DataStore as one ordered batch of commands, with optimistic
// concurrency checks and post-commit change publishing.
//
// ============================================================================

pub mod command;
pub mod core;
pub mod lifecycle;
pub mod object;
pub mod prelude;
pub mod store;
pub mod tasks;
pub mod wrapper;

pub use crate::core::{ExecutionContext, InteractionVeto, Result, StoreError, Value, ValueType};
pub use crate::object::{
    AssociationKind, FieldValue, ObjectAdapter, ObjectSpecification, Oid, Pojo,
    SpecificationRegistry, Version, VersionScheme,
};
pub use crate::store::{
    FileDataStore, InstanceQuery, MemoryDataStore, ObjectContainer, ObjectStore, StoreConfig,
    UnitOfWork,
};

/// Opens an object store over an in-memory backend.
///
/// # Examples
///
/// ```
/// use memostore::{ExecutionContext, ObjectSpecification, SpecificationRegistry, Value, ValueType};
///
/// # fn main() -> memostore::Result<()> {
/// let specs = SpecificationRegistry::new();
/// specs.register(
///     ObjectSpecification::builder("Customer")
///         .property("name", ValueType::Text)
///         .build(),
/// )?;
///
/// let store = memostore::open_in_memory(specs)?;
/// let mut uow = store.begin(ExecutionContext::new("alice"));
/// let customer = uow.create("Customer")?;
/// uow.set(&customer, "name", Value::from("Alice"))?;
/// let customer = uow.make_persistent(&customer)?;
/// uow.commit()?;
///
/// assert!(customer.is_persistent());
/// assert!(store.has_instances("Customer")?);
/// # Ok(())
/// # }
/// ```
pub fn open_in_memory(specs: SpecificationRegistry) -> Result<ObjectStore<MemoryDataStore>> {
    let store = ObjectStore::new(MemoryDataStore::new(), specs, StoreConfig::default())?;
    store.open()?;
    Ok(store)
}

/// Opens an object store backed by the snapshot file named in `config`.
pub fn open_file_store(
    specs: SpecificationRegistry,
    config: StoreConfig,
) -> Result<ObjectStore<FileDataStore>> {
    let path = config.data_file.clone().ok_or_else(|| {
        StoreError::DomainModel("A file-backed store needs a data_file".to_string())
    })?;
    let backend = FileDataStore::new(path, config.snapshot_format);
    let store = ObjectStore::new(backend, specs, config)?;
    store.open()?;
    Ok(store)
}
