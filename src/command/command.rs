use super::{DataEncryption, ObjectWriter, StateReader, StateWriter};
use crate::core::{ExecutionContext, Result, StoreError};
use crate::object::{AdapterManager, ObjectAdapter, Oid, Version, VersionScheme};
use crate::store::DataStore;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{Level, event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WriteMode {
    Insert,
    Update,
}

/// Durable mutation intent bound to one root object.
///
/// The object's state is read when the command executes, so a command
/// queued early still stores the latest values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PersistenceCommand {
    Create { oid: Oid },
    Write { oid: Oid, mode: WriteMode },
    Destroy { oid: Oid },
}

impl PersistenceCommand {
    pub fn oid(&self) -> &Oid {
        match self {
            PersistenceCommand::Create { oid }
            | PersistenceCommand::Write { oid, .. }
            | PersistenceCommand::Destroy { oid } => oid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PersistenceCommand::Create { .. } => "create",
            PersistenceCommand::Write {
                mode: WriteMode::Insert,
                ..
            } => "insert",
            PersistenceCommand::Write {
                mode: WriteMode::Update,
                ..
            } => "update",
            PersistenceCommand::Destroy { .. } => "destroy",
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, PersistenceCommand::Create { .. })
    }

    pub fn is_destroy(&self) -> bool {
        matches!(self, PersistenceCommand::Destroy { .. })
    }

    /// Runs the command against the store. On success the returned outcome
    /// carries the version the object held before, so the caller can put
    /// it back if the transaction later aborts.
    pub fn execute<D: DataStore>(&self, context: &mut CommandContext<'_, D>) -> Result<CommandOutcome> {
        event!(Level::TRACE, command = self.kind(), oid = %self.oid(), "executing command");
        match self {
            PersistenceCommand::Create { oid } => execute_write(oid, WriteMode::Insert, context),
            PersistenceCommand::Write { oid, mode } => execute_write(oid, *mode, context),
            PersistenceCommand::Destroy { oid } => execute_destroy(oid, context),
        }
    }
}

impl fmt::Display for PersistenceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.oid())
    }
}

/// Everything a command needs while it runs.
pub struct CommandContext<'a, D: DataStore> {
    pub store: &'a mut D,
    pub adapters: &'a mut AdapterManager,
    pub execution: &'a ExecutionContext,
    pub encryption: &'a dyn DataEncryption,
    pub versioning: VersionScheme,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub oid: Oid,
    pub previous_version: Option<Version>,
}

fn require_root<'a>(adapters: &'a AdapterManager, oid: &Oid, action: &str) -> Result<&'a ObjectAdapter> {
    let adapter = adapters.require(oid)?;
    if adapter.is_aggregated() || adapter.specification().is_aggregated() {
        return Err(StoreError::AggregateMisuse(format!(
            "Can't {} an aggregated object: {}",
            action, oid
        )));
    }
    Ok(adapter)
}

fn execute_write<D: DataStore>(
    oid: &Oid,
    mode: WriteMode,
    context: &mut CommandContext<'_, D>,
) -> Result<CommandOutcome> {
    let adapter = require_root(context.adapters, oid, "write")?;
    let current = adapter.version().cloned();
    let base = match mode {
        WriteMode::Update => base_version(oid, current.as_ref(), context)?,
        WriteMode::Insert => None,
    };

    let mut writer = context.store.create_state_writer();
    ObjectWriter::new(context.adapters, context.encryption).write_object(&mut writer, oid)?;

    let user = context.execution.user.as_str();
    let now = Utc::now();
    let next = match (mode, &base) {
        (WriteMode::Update, Some(base)) => Some(base.next(user, now)),
        _ => Version::initial(context.versioning, user, now),
    };

    if let Some(next) = &next {
        let expected = base.as_ref().map(Version::sequence_string);
        writer.write_version(expected.as_deref(), &next.sequence_string());
        writer.write_user(user);
        writer.write_time(&next.time_string());
        writer.write_encryption_type(context.encryption.type_name());
    }

    match mode {
        WriteMode::Insert => context.store.insert(writer)?,
        WriteMode::Update => context.store.update(writer, &context.execution.user)?,
    }

    let adapter = context.adapters.require_mut(oid)?;
    adapter.set_version(next);
    adapter.mark_resolved();
    for owned in context.adapters.aggregated_descendants(oid) {
        if let Some(adapter) = context.adapters.get_mut(&owned) {
            adapter.mark_resolved();
        }
    }
    Ok(CommandOutcome {
        oid: oid.clone(),
        previous_version: current,
    })
}

fn execute_destroy<D: DataStore>(oid: &Oid, context: &mut CommandContext<'_, D>) -> Result<CommandOutcome> {
    let adapter = require_root(context.adapters, oid, "delete")?;
    let current = adapter.version().cloned();
    let spec_name = adapter.specification().name().to_string();
    let expected = base_version(oid, current.as_ref(), context)?
        .as_ref()
        .map(Version::sequence_string);

    context.store.delete(
        &spec_name,
        &oid.to_string(),
        expected.as_deref(),
        oid,
        &context.execution.user,
    )?;
    context.adapters.require_mut(oid)?.mark_destroyed();
    Ok(CommandOutcome {
        oid: oid.clone(),
        previous_version: current,
    })
}

/// The version a write or delete replaces, always handed to the store for
/// comparison. With checking off, a stored version that has moved on is
/// logged and becomes the base, so versions keep advancing.
fn base_version<D: DataStore>(
    oid: &Oid,
    current: Option<&Version>,
    context: &CommandContext<'_, D>,
) -> Result<Option<Version>> {
    let Some(current) = current else {
        return Ok(None);
    };
    if context.execution.concurrency_checking {
        return Ok(Some(current.clone()));
    }
    let Some(record) = context.store.get_instance(&oid.to_string(), oid.spec_name())? else {
        return Ok(Some(current.clone()));
    };
    let stored = match record.read_version() {
        Some(sequence) => Version::from_parts(
            current.scheme(),
            sequence,
            record.read_user().unwrap_or_default(),
            record.read_time().unwrap_or("0"),
        )?,
        None => None,
    };
    match stored {
        Some(stored) if stored.differs(current) => {
            log::warn!(
                "concurrency conflict ignored for {} (user '{}'): stored {}, loaded {}",
                oid,
                context.execution.user,
                stored,
                current
            );
            Ok(Some(stored))
        }
        _ => Ok(Some(current.clone())),
    }
}

// ===== Command construction =====

/// Insert command for a root object; aggregated objects yield no command
/// because their state travels with their root.
pub fn create_create_object_command(adapter: &ObjectAdapter) -> Result<Option<PersistenceCommand>> {
    if adapter.is_aggregated() || adapter.specification().is_aggregated() {
        return Ok(None);
    }
    if !adapter.represents_persistent() {
        return Err(StoreError::InternalConsistency(format!(
            "{} must be given a persistent identity before it is created",
            adapter.oid()
        )));
    }
    Ok(Some(PersistenceCommand::Create {
        oid: adapter.oid().clone(),
    }))
}

pub fn create_write_object_command(adapter: &ObjectAdapter, mode: WriteMode) -> Result<PersistenceCommand> {
    if adapter.is_aggregated() || adapter.specification().is_aggregated() {
        return Err(StoreError::AggregateMisuse(format!(
            "Can't write an aggregated object on its own: {}",
            adapter.oid()
        )));
    }
    if !adapter.represents_persistent() {
        return Err(StoreError::InternalConsistency(format!(
            "{} has no persistent identity to write",
            adapter.oid()
        )));
    }
    Ok(PersistenceCommand::Write {
        oid: adapter.oid().clone(),
        mode,
    })
}

pub fn create_save_object_command(adapter: &ObjectAdapter) -> Result<PersistenceCommand> {
    create_write_object_command(adapter, WriteMode::Update)
}

pub fn create_destroy_object_command(adapter: &ObjectAdapter) -> Result<PersistenceCommand> {
    if adapter.is_aggregated() || adapter.specification().is_aggregated() {
        return Err(StoreError::AggregateMisuse(format!(
            "Can't delete an aggregated object: {}",
            adapter.oid()
        )));
    }
    Ok(PersistenceCommand::Destroy {
        oid: adapter.oid().clone(),
    })
}
