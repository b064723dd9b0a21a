use super::SerialNumberSource;
use crate::core::{Result, StoreError};
use crate::object::Oid;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{Level, event};

/// First transient id; transient ids count down from here so they never
/// meet the positive persistent ids.
pub const TRANSIENT_ID_START: i64 = -9_999_999;

/// Position within the current block of store-assigned serial numbers.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SerialCursor {
    next: i64,
    limit: i64,
}

impl SerialCursor {
    pub fn is_exhausted(&self) -> bool {
        self.next >= self.limit
    }

    pub fn remaining(&self) -> i64 {
        (self.limit - self.next).max(0)
    }

    /// Installs a freshly fetched block `[first, first + size)`.
    pub fn refill(&mut self, first: i64, size: usize) -> Result<()> {
        if first < self.limit {
            return Err(StoreError::InternalConsistency(format!(
                "Serial batch starting at {} overlaps ids already issued below {}",
                first, self.limit
            )));
        }
        self.next = first;
        self.limit = first + size as i64;
        Ok(())
    }

    /// Hands out the next id of the block.
    pub fn take(&mut self) -> Result<i64> {
        if self.is_exhausted() {
            return Err(StoreError::InternalConsistency(format!(
                "Serial cursor at {} is past its batch boundary {}",
                self.next, self.limit
            )));
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }
}

/// Mints transient and persistent identities.
#[derive(Debug)]
pub struct OidGenerator {
    transient: AtomicI64,
    cursor: Mutex<SerialCursor>,
    batch_size: usize,
}

impl OidGenerator {
    pub fn new(batch_size: usize) -> Self {
        Self {
            transient: AtomicI64::new(TRANSIENT_ID_START),
            cursor: Mutex::new(SerialCursor::default()),
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn next_transient(&self, spec_name: &str) -> Oid {
        Oid::transient(spec_name, self.transient.fetch_sub(1, Ordering::SeqCst))
    }

    /// Next persistent serial number, fetching a new block from `source`
    /// when the current one is used up. Reading the cursor, refetching and
    /// advancing happen under one lock.
    pub fn next_serial<S: SerialNumberSource + ?Sized>(&self, source: &mut S) -> Result<i64> {
        let mut cursor = self.cursor.lock()?;
        if cursor.is_exhausted() {
            let first = source.next_serial_number_batch(self.batch_size)?;
            cursor.refill(first, self.batch_size)?;
            event!(Level::DEBUG, first, size = self.batch_size, "serial batch fetched");
        }
        cursor.take()
    }

    /// Persistent identity for a transient root. Aggregated identities
    /// follow their parent and consume no serial number.
    pub fn persistent_oid_for<S: SerialNumberSource + ?Sized>(
        &self,
        oid: &Oid,
        source: &mut S,
    ) -> Result<Oid> {
        if oid.is_aggregated() {
            return Ok(oid.clone());
        }
        if oid.is_persistent() {
            return Err(StoreError::InternalConsistency(format!(
                "{} is already persistent",
                oid
            )));
        }
        Ok(Oid::persistent(oid.spec_name(), self.next_serial(source)?))
    }
}
