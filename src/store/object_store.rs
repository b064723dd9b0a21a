use super::{DataStore, OidGenerator, StoreConfig, UnitOfWork};
use crate::command::{CommandContext, CommandOutcome, DataEncryption, PersistenceCommand, encryption_for};
use crate::core::{ExecutionContext, Result, StoreError};
use crate::lifecycle::ObjectLifecyclePublisher;
use crate::object::{AdapterManager, Oid, SpecificationRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{Level, event, info_span};

/// Long-lived entry point to persistent objects.
///
/// Owns the backend, the identity generator, the service cache and the
/// lifecycle publisher. Each unit of work borrows the store.
pub struct ObjectStore<D: DataStore> {
    backend: Mutex<D>,
    generator: OidGenerator,
    services: RwLock<HashMap<String, Oid>>,
    specs: Arc<SpecificationRegistry>,
    publisher: ObjectLifecyclePublisher,
    encryption: Arc<dyn DataEncryption>,
    config: StoreConfig,
}

impl<D: DataStore> ObjectStore<D> {
    pub fn new(backend: D, specs: SpecificationRegistry, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        specs.validate()?;
        let encryption = encryption_for(&config.encryption, config.encryption_key.as_deref())?;
        Ok(Self {
            backend: Mutex::new(backend),
            generator: OidGenerator::new(config.serial_batch_size),
            services: RwLock::new(HashMap::new()),
            specs: Arc::new(specs),
            publisher: ObjectLifecyclePublisher::new(),
            encryption,
            config,
        })
    }

    pub fn publisher_mut(&mut self) -> &mut ObjectLifecyclePublisher {
        &mut self.publisher
    }

    pub fn publisher(&self) -> &ObjectLifecyclePublisher {
        &self.publisher
    }

    pub fn specifications(&self) -> &SpecificationRegistry {
        &self.specs
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn generator(&self) -> &OidGenerator {
        &self.generator
    }

    pub fn encryption(&self) -> &dyn DataEncryption {
        self.encryption.as_ref()
    }

    pub(crate) fn backend(&self) -> Result<MutexGuard<'_, D>> {
        Ok(self.backend.lock()?)
    }

    pub fn open(&self) -> Result<()> {
        self.backend()?.open()?;
        event!(Level::INFO, "object store opened");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.backend()?.close()?;
        event!(Level::INFO, "object store closed");
        Ok(())
    }

    pub fn is_open(&self) -> Result<bool> {
        Ok(self.backend()?.is_open())
    }

    /// Opens a unit of work for the given caller.
    pub fn begin(&self, ctx: ExecutionContext) -> UnitOfWork<'_, D> {
        let ctx = if self.config.concurrency_checking {
            ctx
        } else {
            ctx.without_concurrency_checking()
        };
        UnitOfWork::new(self, ctx)
    }

    pub fn has_instances(&self, spec_name: &str) -> Result<bool> {
        if self.specs.get(spec_name)?.is_aggregated() {
            return Err(StoreError::AggregateMisuse(format!(
                "Aggregated type '{}' cannot be queried on its own",
                spec_name
            )));
        }
        self.backend()?.has_instances(spec_name)
    }

    /// Records the identity of a singleton service.
    pub fn register_service(&self, name: &str, oid: &Oid) -> Result<()> {
        if !oid.is_persistent() || oid.is_aggregated() {
            return Err(StoreError::InternalConsistency(format!(
                "Service '{}' needs a persistent root identity, got {}",
                name, oid
            )));
        }
        self.backend()?.add_service(name, &oid.to_string())?;
        self.services.write()?.insert(name.to_string(), oid.clone());
        Ok(())
    }

    /// Identity of a registered service. Lookups are cached for the life of
    /// the store and never invalidated; service identities do not change.
    pub fn oid_for_service(&self, name: &str) -> Result<Option<Oid>> {
        if let Some(oid) = self.services.read()?.get(name) {
            return Ok(Some(oid.clone()));
        }
        let Some(key) = self.backend()?.get_service(name)? else {
            return Ok(None);
        };
        let oid = Oid::parse(&key)?;
        self.services.write()?.insert(name.to_string(), oid.clone());
        Ok(Some(oid))
    }

    /// Persistent identity for a transient root, drawing from the batched
    /// serial cursor.
    pub(crate) fn persistent_oid_for(&self, oid: &Oid) -> Result<Oid> {
        let mut backend = self.backend()?;
        self.generator.persistent_oid_for(oid, &mut *backend)
    }

    /// Applies `commands` in order inside one store transaction.
    ///
    /// Either every command reaches the store or none does; on failure the
    /// in-memory versions already advanced are put back.
    pub fn execute(
        &self,
        commands: &[PersistenceCommand],
        adapters: &mut AdapterManager,
        ctx: &ExecutionContext,
    ) -> Result<Vec<CommandOutcome>> {
        let span = info_span!("execute_commands", count = commands.len(), user = %ctx.user);
        let _guard = span.enter();

        let mut backend = self.backend()?;
        backend.start_transaction()?;

        let mut outcomes = Vec::with_capacity(commands.len());
        let result = {
            let mut context = CommandContext {
                store: &mut *backend,
                adapters: &mut *adapters,
                execution: ctx,
                encryption: self.encryption.as_ref(),
                versioning: self.config.versioning,
            };
            commands.iter().try_for_each(|command| {
                outcomes.push(command.execute(&mut context)?);
                Ok::<(), StoreError>(())
            })
        };

        match result.and_then(|_| backend.end_transaction()) {
            Ok(()) => {
                event!(Level::DEBUG, executed = outcomes.len(), "commands applied");
                Ok(outcomes)
            }
            Err(err) => {
                if let Err(abort_err) = backend.abort_transaction() {
                    event!(Level::ERROR, error = %abort_err, "store abort failed");
                }
                for outcome in outcomes.iter().rev() {
                    if let Some(adapter) = adapters.get_mut(&outcome.oid) {
                        adapter.restore_version(outcome.previous_version.clone());
                    }
                }
                event!(Level::WARN, error = %err, "command batch rolled back");
                Err(err)
            }
        }
    }
}
