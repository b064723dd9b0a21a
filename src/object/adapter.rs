use super::{ObjectSpecification, Oid, Pojo, Version};
use crate::core::{ExecutionContext, Result, StoreError};
use log::warn;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveState {
    /// Created in this unit of work, not yet stored.
    Transient,
    /// Backed by a stored record.
    Resolved,
    /// Scheduled for deletion or deleted.
    Destroyed,
}

/// Binds one domain object to its identity and specification.
#[derive(Debug, Clone)]
pub struct ObjectAdapter {
    oid: Oid,
    spec: Arc<ObjectSpecification>,
    pojo: Pojo,
    version: Option<Version>,
    state: ResolveState,
}

impl ObjectAdapter {
    pub fn new(oid: Oid, spec: Arc<ObjectSpecification>, pojo: Pojo) -> Self {
        let state = if oid.is_transient() {
            ResolveState::Transient
        } else {
            ResolveState::Resolved
        };
        Self {
            oid,
            spec,
            pojo,
            version: None,
            state,
        }
    }

    pub fn oid(&self) -> &Oid {
        &self.oid
    }

    pub fn specification(&self) -> &Arc<ObjectSpecification> {
        &self.spec
    }

    pub fn pojo(&self) -> &Pojo {
        &self.pojo
    }

    pub fn pojo_mut(&mut self) -> &mut Pojo {
        &mut self.pojo
    }

    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Replaces the version only when it actually changed. Aggregated
    /// objects carry no version of their own.
    pub fn set_version(&mut self, version: Option<Version>) {
        if self.is_aggregated() {
            return;
        }
        let changed = match (&self.version, &version) {
            (Some(current), Some(next)) => next.differs(current),
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.version = version;
        }
    }

    /// Compares this root object's version against one supplied by a caller.
    ///
    /// A missing version on either side never conflicts. With concurrency
    /// checking switched off the conflict is logged and ignored. Aggregated
    /// adapters must be checked through `AdapterManager::check_lock`.
    pub fn check_lock(&self, incoming: Option<&Version>, ctx: &ExecutionContext) -> Result<()> {
        if self.is_aggregated() {
            return Err(StoreError::InternalConsistency(format!(
                "{} is aggregated; lock checks apply to its root",
                self.oid
            )));
        }
        let (Some(current), Some(incoming)) = (self.version.as_ref(), incoming) else {
            return Ok(());
        };
        if !current.differs(incoming) {
            return Ok(());
        }

        if ctx.concurrency_checking {
            return Err(StoreError::ConcurrencyConflict {
                user: ctx.user.clone(),
                oid: self.oid.to_string(),
                current: current.to_string(),
                incoming: incoming.to_string(),
            });
        }
        warn!(
            "concurrency conflict ignored for {} (user '{}'): current {}, incoming {}",
            self.oid, ctx.user, current, incoming
        );
        Ok(())
    }

    pub fn is_transient(&self) -> bool {
        self.state == ResolveState::Transient
    }

    pub fn represents_persistent(&self) -> bool {
        self.oid.is_persistent()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == ResolveState::Destroyed
    }

    pub fn is_aggregated(&self) -> bool {
        self.oid.is_aggregated()
    }

    pub fn resolve_state(&self) -> ResolveState {
        self.state
    }

    pub(crate) fn mark_resolved(&mut self) {
        self.state = ResolveState::Resolved;
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.state = ResolveState::Destroyed;
    }

    pub(crate) fn replace_oid(&mut self, oid: Oid) {
        self.oid = oid;
    }

    pub(crate) fn restore_version(&mut self, version: Option<Version>) {
        self.version = version;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValueType;
    use chrono::Utc;

    fn spec() -> Arc<ObjectSpecification> {
        Arc::new(
            ObjectSpecification::builder("Customer")
                .property("name", ValueType::Text)
                .build(),
        )
    }

    fn serial(sequence: u64, user: &str) -> Version {
        Version::Serial {
            sequence,
            user: user.to_string(),
            time: Utc::now(),
        }
    }

    fn persistent_adapter(sequence: u64) -> ObjectAdapter {
        let mut adapter = ObjectAdapter::new(Oid::persistent("Customer", 1), spec(), Pojo::new());
        adapter.set_version(Some(serial(sequence, "alice")));
        adapter
    }

    #[test]
    fn test_state_follows_oid() {
        let transient = ObjectAdapter::new(Oid::transient("Customer", -1), spec(), Pojo::new());
        assert!(transient.is_transient());
        assert!(!transient.represents_persistent());

        let persistent = persistent_adapter(1);
        assert!(!persistent.is_transient());
        assert!(persistent.represents_persistent());
        assert!(!persistent.is_destroyed());
    }

    #[test]
    fn test_set_version_keeps_prior_when_not_different() {
        let mut adapter = persistent_adapter(5);
        adapter.set_version(Some(serial(5, "bob")));
        assert_eq!(adapter.version().unwrap().user(), "alice");

        adapter.set_version(Some(serial(6, "bob")));
        assert_eq!(adapter.version().unwrap().user(), "bob");
        assert_eq!(adapter.version().unwrap().sequence_string(), "6");
    }

    #[test]
    fn test_set_version_ignored_for_aggregates() {
        let parent = Oid::persistent("Customer", 1);
        let mut adapter = ObjectAdapter::new(Oid::aggregated("Address", parent, "home"), spec(), Pojo::new());
        adapter.set_version(Some(serial(1, "alice")));
        assert!(adapter.version().is_none());
    }

    #[test]
    fn test_check_lock_conflict_names_user() {
        let adapter = persistent_adapter(5);
        let err = adapter
            .check_lock(Some(&serial(4, "bob")), &ExecutionContext::new("carol"))
            .unwrap_err();
        match err {
            StoreError::ConcurrencyConflict { user, oid, .. } => {
                assert_eq!(user, "carol");
                assert_eq!(oid, "Customer:1");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_check_lock_suppressed() {
        let adapter = persistent_adapter(5);
        let ctx = ExecutionContext::new("carol").without_concurrency_checking();
        adapter.check_lock(Some(&serial(4, "bob")), &ctx).unwrap();
    }

    #[test]
    fn test_check_lock_unversioned_never_conflicts() {
        let adapter = ObjectAdapter::new(Oid::persistent("Customer", 1), spec(), Pojo::new());
        let ctx = ExecutionContext::new("carol");
        adapter.check_lock(Some(&serial(4, "bob")), &ctx).unwrap();
        persistent_adapter(5).check_lock(None, &ctx).unwrap();
        persistent_adapter(5).check_lock(Some(&serial(5, "x")), &ctx).unwrap();
    }
}
