use crate::command::{StateReader, StateWriter};
use crate::core::Result;
use crate::object::Oid;

/// Source of persistent serial numbers, handed out in blocks.
pub trait SerialNumberSource {
    /// Reserves `size` consecutive serial numbers and returns the first.
    fn next_serial_number_batch(&mut self, size: usize) -> Result<i64>;
}

/// Physical backend contract the persistence commands talk to.
///
/// Writes between `start_transaction` and `end_transaction` become visible
/// to other units of work together, or not at all after
/// `abort_transaction`.
pub trait DataStore: SerialNumberSource + Send {
    type Writer: StateWriter + Send;
    type Reader: StateReader + Clone + Send;

    fn open(&mut self) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn is_open(&self) -> bool;

    fn create_state_writer(&self) -> Self::Writer;

    fn start_transaction(&mut self) -> Result<()>;

    fn end_transaction(&mut self) -> Result<()>;

    fn abort_transaction(&mut self) -> Result<()>;

    fn insert(&mut self, state: Self::Writer) -> Result<()>;

    /// Replaces a stored record. When the state carries an expected version
    /// that no longer matches the stored one, the update fails with a
    /// concurrency conflict reported against `user`.
    fn update(&mut self, state: Self::Writer, user: &str) -> Result<()>;

    fn delete(
        &mut self,
        spec_name: &str,
        key: &str,
        version: Option<&str>,
        oid: &Oid,
        user: &str,
    ) -> Result<()>;

    fn get_instance(&self, key: &str, spec_name: &str) -> Result<Option<Self::Reader>>;

    fn instances_of(&self, spec_name: &str) -> Result<Vec<Self::Reader>>;

    fn has_instances(&self, spec_name: &str) -> Result<bool> {
        Ok(!self.instances_of(spec_name)?.is_empty())
    }

    fn add_service(&mut self, name: &str, key: &str) -> Result<()>;

    fn get_service(&self, name: &str) -> Result<Option<String>>;
}
