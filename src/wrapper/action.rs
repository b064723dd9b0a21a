use crate::core::{Result, Value};
use crate::object::{Oid, Pojo};
use crate::store::ObjectContainer;
use std::fmt;
use std::sync::Arc;

pub type HideRule = Arc<dyn Fn(&Pojo) -> bool + Send + Sync>;
/// Returns the reason the action is unavailable, if it is.
pub type DisableRule = Arc<dyn Fn(&Pojo) -> Option<String> + Send + Sync>;
/// Returns the reason the arguments are rejected, if they are.
pub type ValidateRule = Arc<dyn Fn(&Pojo, &[Value]) -> Option<String> + Send + Sync>;
pub type ActionBody =
    Arc<dyn Fn(&mut dyn ObjectContainer, &Oid, &[Value]) -> Result<Value> + Send + Sync>;

/// A behaviour a domain type exposes to its callers, guarded by
/// hide/disable/validate rules.
#[derive(Clone)]
pub struct ObjectAction {
    id: String,
    hide: Option<HideRule>,
    disable: Option<DisableRule>,
    validate: Option<ValidateRule>,
    body: ActionBody,
}

impl ObjectAction {
    pub fn new<F>(id: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut dyn ObjectContainer, &Oid, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            id: id.into(),
            hide: None,
            disable: None,
            validate: None,
            body: Arc::new(body),
        }
    }

    pub fn hidden_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Pojo) -> bool + Send + Sync + 'static,
    {
        self.hide = Some(Arc::new(rule));
        self
    }

    pub fn disabled_when<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Pojo) -> Option<String> + Send + Sync + 'static,
    {
        self.disable = Some(Arc::new(rule));
        self
    }

    pub fn validated_by<F>(mut self, rule: F) -> Self
    where
        F: Fn(&Pojo, &[Value]) -> Option<String> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(rule));
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_hidden(&self, target: &Pojo) -> bool {
        self.hide.as_ref().is_some_and(|rule| rule(target))
    }

    pub fn disabled_reason(&self, target: &Pojo) -> Option<String> {
        self.disable.as_ref().and_then(|rule| rule(target))
    }

    pub fn invalid_reason(&self, target: &Pojo, args: &[Value]) -> Option<String> {
        self.validate.as_ref().and_then(|rule| rule(target, args))
    }

    pub fn execute(
        &self,
        container: &mut dyn ObjectContainer,
        target: &Oid,
        args: &[Value],
    ) -> Result<Value> {
        (self.body)(container, target, args)
    }
}

impl fmt::Debug for ObjectAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectAction")
            .field("id", &self.id)
            .field("hide", &self.hide.is_some())
            .field("disable", &self.disable.is_some())
            .field("validate", &self.validate.is_some())
            .finish()
    }
}
