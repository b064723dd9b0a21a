// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each unit of work runs inside exactly one transaction that moves through
// Active -> Committed | Aborted. The persistence commands of the unit of
// work are queued while Active and executed as one batch on commit.
//
// ============================================================================

use crate::command::PersistenceCommand;
use crate::core::{Result, StoreError};
use crate::object::Oid;
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// ```text
/// Active ──commit──> Committed
///   │
///   └──abort──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::Aborted
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Ordered command queue of one unit of work.
///
/// Queue policy for an object both written and destroyed: a destroy
/// supersedes any pending create or write of the same object, while a write
/// queued after a destroy is rejected.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    commands: Vec<PersistenceCommand>,
    start_time: std::time::Instant,
}

impl Transaction {
    pub fn new(id: TransactionId) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            commands: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn commands(&self) -> &[PersistenceCommand] {
        &self.commands
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    fn ensure_active(&self, operation: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(StoreError::Transaction(format!(
                "Cannot {}: transaction {} is already {}",
                operation, self.id, self.state
            )));
        }
        Ok(())
    }

    /// Queues a command, keeping at most one command per (object, kind).
    ///
    /// Returns false when an equivalent command was already queued.
    pub fn queue(&mut self, command: PersistenceCommand) -> Result<bool> {
        self.ensure_active("queue command")?;

        if self.commands.iter().any(|queued| queued == &command) {
            return Ok(false);
        }

        let oid = command.oid().clone();
        match command {
            PersistenceCommand::Destroy { .. } => {
                self.commands.retain(|queued| queued.oid() != &oid);
            }
            _ => {
                if self
                    .commands
                    .iter()
                    .any(|queued| queued.oid() == &oid && queued.is_destroy())
                {
                    return Err(StoreError::InternalConsistency(format!(
                        "Cannot queue {} for {}: object is already scheduled for deletion",
                        command.kind(),
                        oid
                    )));
                }
                // an insert already covers any later write of the same object
                if !command.is_create()
                    && self
                        .commands
                        .iter()
                        .any(|queued| queued.oid() == &oid && queued.is_create())
                {
                    return Ok(false);
                }
            }
        }
        self.commands.push(command);
        Ok(true)
    }

    /// Drops every queued command for `oid`. Returns how many were dropped.
    pub fn discard(&mut self, oid: &Oid) -> Result<usize> {
        self.ensure_active("discard commands")?;
        let before = self.commands.len();
        self.commands.retain(|queued| queued.oid() != oid);
        Ok(before - self.commands.len())
    }

    /// Takes the queued commands for execution.
    pub fn drain_commands(&mut self) -> Result<Vec<PersistenceCommand>> {
        self.ensure_active("execute commands")?;
        Ok(std::mem::take(&mut self.commands))
    }

    pub fn commit(&mut self) -> Result<()> {
        self.ensure_active("commit")?;
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Marks the transaction aborted and discards queued commands
    pub fn rollback(&mut self) -> Result<()> {
        self.ensure_active("rollback")?;
        self.commands.clear();
        self.state = TransactionState::Aborted;
        Ok(())
    }
}
