use super::{DataStore, InstanceQuery, UnitOfWork};
use crate::core::{ExecutionContext, Result};
use crate::object::{FieldValue, Oid, Version};

/// What action bodies see of the unit of work they run in.
///
/// Object safe, so action closures can take `&mut dyn ObjectContainer`
/// without knowing the backend type.
pub trait ObjectContainer {
    fn execution_context(&self) -> &ExecutionContext;

    fn create(&mut self, spec_name: &str) -> Result<Oid>;

    fn create_aggregated(&mut self, parent: &Oid, association: &str) -> Result<Oid>;

    fn load(&mut self, oid: &Oid) -> Result<()>;

    fn value(&mut self, oid: &Oid, field: &str) -> Result<FieldValue>;

    fn set_value(&mut self, oid: &Oid, field: &str, value: FieldValue) -> Result<()>;

    fn add(&mut self, oid: &Oid, collection: &str, element: &Oid) -> Result<()>;

    fn remove(&mut self, oid: &Oid, collection: &str, element: &Oid) -> Result<()>;

    fn destroy(&mut self, oid: &Oid) -> Result<()>;

    fn make_persistent(&mut self, oid: &Oid) -> Result<Oid>;

    fn instances(&mut self, query: &InstanceQuery) -> Result<Vec<Oid>>;

    fn version(&mut self, oid: &Oid) -> Result<Option<Version>>;
}

impl<D: DataStore> ObjectContainer for UnitOfWork<'_, D> {
    fn execution_context(&self) -> &ExecutionContext {
        UnitOfWork::execution_context(self)
    }

    fn create(&mut self, spec_name: &str) -> Result<Oid> {
        UnitOfWork::create(self, spec_name)
    }

    fn create_aggregated(&mut self, parent: &Oid, association: &str) -> Result<Oid> {
        UnitOfWork::create_aggregated(self, parent, association)
    }

    fn load(&mut self, oid: &Oid) -> Result<()> {
        UnitOfWork::load(self, oid)
    }

    fn value(&mut self, oid: &Oid, field: &str) -> Result<FieldValue> {
        UnitOfWork::value(self, oid, field)
    }

    fn set_value(&mut self, oid: &Oid, field: &str, value: FieldValue) -> Result<()> {
        UnitOfWork::set(self, oid, field, value)
    }

    fn add(&mut self, oid: &Oid, collection: &str, element: &Oid) -> Result<()> {
        UnitOfWork::add(self, oid, collection, element)
    }

    fn remove(&mut self, oid: &Oid, collection: &str, element: &Oid) -> Result<()> {
        UnitOfWork::remove(self, oid, collection, element)
    }

    fn destroy(&mut self, oid: &Oid) -> Result<()> {
        UnitOfWork::destroy(self, oid)
    }

    fn make_persistent(&mut self, oid: &Oid) -> Result<Oid> {
        UnitOfWork::make_persistent(self, oid)
    }

    fn instances(&mut self, query: &InstanceQuery) -> Result<Vec<Oid>> {
        UnitOfWork::instances(self, query)
    }

    fn version(&mut self, oid: &Oid) -> Result<Option<Version>> {
        let root = oid.root().clone();
        Ok(self.get_object(&root)?.version().cloned())
    }
}
