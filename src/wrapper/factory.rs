use super::{ExecutionMode, ObjectAction};
use crate::core::{ExecutionContext, InteractionVeto, Result, StoreError, Value};
use crate::object::{Oid, Version};
use crate::store::{DataStore, ObjectStore};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// Runs domain actions on behalf of a caller: rules first, then the
/// optimistic lock check, then the action body inside one unit of work.
pub struct WrapperFactory<D: DataStore> {
    store: Arc<ObjectStore<D>>,
}

impl<D: DataStore> Clone for WrapperFactory<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<D: DataStore> WrapperFactory<D> {
    pub fn new(store: Arc<ObjectStore<D>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ObjectStore<D>> {
        &self.store
    }

    /// Invokes `action_id` on `target`.
    ///
    /// `expected` is the version the caller last saw; a different current
    /// version is a concurrency conflict. The unit of work commits when the
    /// body succeeds and is rolled back otherwise. `NoExecute` stops after
    /// the checks and returns `Value::Null`.
    pub fn invoke(
        &self,
        ctx: ExecutionContext,
        target: &Oid,
        action_id: &str,
        args: &[Value],
        mode: ExecutionMode,
        expected: Option<&Version>,
    ) -> Result<Value> {
        let span = info_span!("invoke", action = action_id, target = %target, user = %ctx.user);
        let _guard = span.enter();

        let mut uow = self.store.begin(ctx);
        let adapter = uow.get_object(target)?;
        let action: ObjectAction = adapter
            .specification()
            .action(action_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::DomainModel(format!(
                    "{} has no action '{}'",
                    adapter.specification().name(),
                    action_id
                ))
            })?;

        if mode.checks_rules() {
            let pojo = adapter.pojo();
            let veto = if action.is_hidden(pojo) {
                Some(InteractionVeto::Hidden(action_id.to_string()))
            } else if let Some(reason) = action.disabled_reason(pojo) {
                Some(InteractionVeto::Disabled(reason))
            } else {
                action.invalid_reason(pojo, args).map(InteractionVeto::Invalid)
            };
            if let Some(veto) = veto {
                event!(Level::DEBUG, %veto, "interaction refused");
                return Err(StoreError::Interaction(veto));
            }
        }

        uow.check_lock(target, expected)?;
        if !mode.executes() {
            return Ok(Value::Null);
        }

        let result = action.execute(&mut uow, target, args)?;
        let transaction = uow.commit()?;
        event!(Level::DEBUG, %transaction, "action committed");
        Ok(result)
    }
}

impl<D: DataStore + 'static> WrapperFactory<D> {
    /// `invoke` on tokio's blocking pool. The returned future must be
    /// polled within a tokio runtime.
    pub fn invoke_async(
        &self,
        ctx: ExecutionContext,
        target: Oid,
        action_id: impl Into<String>,
        args: Vec<Value>,
        mode: ExecutionMode,
        expected: Option<Version>,
    ) -> BoxFuture<'static, Result<Value>> {
        let factory = self.clone();
        let action_id = action_id.into();
        async move {
            tokio::task::spawn_blocking(move || {
                factory.invoke(ctx, &target, &action_id, &args, mode, expected.as_ref())
            })
            .await
            .map_err(|err| {
                StoreError::InternalConsistency(format!("action task did not complete: {}", err))
            })?
        }
        .boxed()
    }
}
