use super::{AGGREGATE_SEPARATOR, FieldValue, ObjectAdapter, Pojo, REFERENCE_DELIMITER, TYPE_SEPARATOR};
use crate::core::{Result, StoreError, Value, ValueType};
use crate::wrapper::ObjectAction;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

static NULL_FIELD: FieldValue = FieldValue::Value(Value::Null);

/// The shape of an association; the write traversal switches on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssociationKind {
    Value(ValueType),
    Reference { target: String, aggregated: bool },
    Collection { element: String, element_aggregated: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Association {
    pub id: String,
    pub kind: AssociationKind,
    pub not_persisted: bool,
    pub excluded_from_publishing: bool,
}

impl Association {
    pub fn new(id: impl Into<String>, kind: AssociationKind) -> Self {
        Self {
            id: id.into(),
            kind,
            not_persisted: false,
            excluded_from_publishing: false,
        }
    }

    pub fn is_one_to_many(&self) -> bool {
        matches!(self.kind, AssociationKind::Collection { .. })
    }

    pub fn is_not_persisted(&self) -> bool {
        self.not_persisted
    }

    /// Properties (not collections) that are stored and not excluded take
    /// part in change publishing.
    pub fn is_publishable(&self) -> bool {
        !self.is_one_to_many() && !self.not_persisted && !self.excluded_from_publishing
    }

    pub fn get<'a>(&self, adapter: &'a ObjectAdapter) -> &'a FieldValue {
        adapter.pojo().get(&self.id).unwrap_or(&NULL_FIELD)
    }
}

/// Points in an object's life at which callbacks run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Created,
    Loaded,
    Persisting,
    Persisted,
    Updating,
    Updated,
    Removing,
}

pub type LifecycleCallback = Arc<dyn Fn(&mut Pojo) -> Result<()> + Send + Sync>;

/// Structural and behavioural descriptor of a domain type.
pub struct ObjectSpecification {
    name: String,
    aggregated: bool,
    value: bool,
    associations: Vec<Association>,
    callbacks: HashMap<LifecycleEvent, Vec<LifecycleCallback>>,
    actions: Vec<ObjectAction>,
}

impl ObjectSpecification {
    pub fn builder(name: impl Into<String>) -> SpecificationBuilder {
        SpecificationBuilder {
            spec: ObjectSpecification {
                name: name.into(),
                aggregated: false,
                value: false,
                associations: Vec::new(),
                callbacks: HashMap::new(),
                actions: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_aggregated(&self) -> bool {
        self.aggregated
    }

    /// Parented types live only inside an owning entity.
    pub fn is_parented(&self) -> bool {
        self.aggregated
    }

    pub fn is_value(&self) -> bool {
        self.value
    }

    pub fn associations(&self) -> &[Association] {
        &self.associations
    }

    pub fn association(&self, id: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.id == id)
    }

    pub fn require_association(&self, id: &str) -> Result<&Association> {
        self.association(id).ok_or_else(|| {
            StoreError::DomainModel(format!("'{}' has no association '{}'", self.name, id))
        })
    }

    pub fn callbacks(&self, event: LifecycleEvent) -> &[LifecycleCallback] {
        self.callbacks.get(&event).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn actions(&self) -> &[ObjectAction] {
        &self.actions
    }

    pub fn action(&self, id: &str) -> Option<&ObjectAction> {
        self.actions.iter().find(|a| a.id() == id)
    }
}

impl fmt::Debug for ObjectSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectSpecification")
            .field("name", &self.name)
            .field("aggregated", &self.aggregated)
            .field("value", &self.value)
            .field("associations", &self.associations)
            .field("callbacks", &self.callbacks.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

pub struct SpecificationBuilder {
    spec: ObjectSpecification,
}

impl SpecificationBuilder {
    pub fn aggregated(mut self) -> Self {
        self.spec.aggregated = true;
        self
    }

    pub fn value_type(mut self) -> Self {
        self.spec.value = true;
        self
    }

    pub fn property(mut self, id: &str, value_type: ValueType) -> Self {
        self.spec
            .associations
            .push(Association::new(id, AssociationKind::Value(value_type)));
        self
    }

    pub fn reference(mut self, id: &str, target: &str) -> Self {
        self.spec.associations.push(Association::new(
            id,
            AssociationKind::Reference {
                target: target.to_string(),
                aggregated: false,
            },
        ));
        self
    }

    pub fn aggregate(mut self, id: &str, target: &str) -> Self {
        self.spec.associations.push(Association::new(
            id,
            AssociationKind::Reference {
                target: target.to_string(),
                aggregated: true,
            },
        ));
        self
    }

    pub fn collection(mut self, id: &str, element: &str) -> Self {
        self.spec.associations.push(Association::new(
            id,
            AssociationKind::Collection {
                element: element.to_string(),
                element_aggregated: false,
            },
        ));
        self
    }

    pub fn aggregate_collection(mut self, id: &str, element: &str) -> Self {
        self.spec.associations.push(Association::new(
            id,
            AssociationKind::Collection {
                element: element.to_string(),
                element_aggregated: true,
            },
        ));
        self
    }

    /// Marks the most recently added association as derived (never stored).
    pub fn not_persisted(mut self) -> Self {
        if let Some(last) = self.spec.associations.last_mut() {
            last.not_persisted = true;
        }
        self
    }

    /// Marks the most recently added association as hidden from audit output.
    pub fn excluded_from_publishing(mut self) -> Self {
        if let Some(last) = self.spec.associations.last_mut() {
            last.excluded_from_publishing = true;
        }
        self
    }

    pub fn on<F>(mut self, event: LifecycleEvent, callback: F) -> Self
    where
        F: Fn(&mut Pojo) -> Result<()> + Send + Sync + 'static,
    {
        self.spec
            .callbacks
            .entry(event)
            .or_default()
            .push(Arc::new(callback));
        self
    }

    pub fn action(mut self, action: ObjectAction) -> Self {
        self.spec.actions.push(action);
        self
    }

    pub fn build(self) -> ObjectSpecification {
        self.spec
    }
}

/// Name → specification lookup shared by the store and its units of work.
#[derive(Default)]
pub struct SpecificationRegistry {
    specs: RwLock<HashMap<String, Arc<ObjectSpecification>>>,
}

impl SpecificationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, spec: ObjectSpecification) -> Result<Arc<ObjectSpecification>> {
        let name = spec.name().to_string();
        if !is_encodable(&name) {
            return Err(StoreError::DomainModel(format!(
                "Invalid specification name '{}'",
                name
            )));
        }
        // association ids become aggregated local ids inside oids
        if let Some(association) = spec.associations().iter().find(|a| !is_encodable(&a.id)) {
            return Err(StoreError::DomainModel(format!(
                "Invalid association id '{}' on '{}'",
                association.id, name
            )));
        }

        let spec = Arc::new(spec);
        let mut specs = self.specs.write()?;
        if specs.contains_key(&name) {
            return Err(StoreError::DomainModel(format!(
                "Specification '{}' is already registered",
                name
            )));
        }
        specs.insert(name, spec.clone());
        Ok(spec)
    }

    pub fn get(&self, name: &str) -> Result<Arc<ObjectSpecification>> {
        self.specs
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::DomainModel(format!("Unknown specification '{}'", name)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.specs
            .read()
            .map(|specs| specs.contains_key(name))
            .unwrap_or(false)
    }

    pub fn names(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.specs.read()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Checks that every association target is registered and that the
    /// aggregation flags agree with the target types.
    pub fn validate(&self) -> Result<()> {
        let specs = self.specs.read()?;
        for spec in specs.values() {
            for association in spec.associations() {
                let (target, expect_aggregated) = match &association.kind {
                    AssociationKind::Value(_) => continue,
                    AssociationKind::Reference { target, aggregated } => (target, *aggregated),
                    AssociationKind::Collection {
                        element,
                        element_aggregated,
                    } => (element, *element_aggregated),
                };
                let target_spec = specs.get(target).ok_or_else(|| {
                    StoreError::DomainModel(format!(
                        "{}.{} refers to unknown type '{}'",
                        spec.name(),
                        association.id,
                        target
                    ))
                })?;
                if target_spec.is_aggregated() != expect_aggregated {
                    return Err(StoreError::DomainModel(format!(
                        "{}.{}: aggregation of '{}' does not match the association",
                        spec.name(),
                        association.id,
                        target
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Names that survive the oid encoding unchanged.
fn is_encodable(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(TYPE_SEPARATOR)
        && !name.contains(AGGREGATE_SEPARATOR)
        && !name.contains(REFERENCE_DELIMITER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer() -> ObjectSpecification {
        ObjectSpecification::builder("Customer")
            .property("name", ValueType::Text)
            .property("password", ValueType::Text)
            .excluded_from_publishing()
            .property("displayName", ValueType::Text)
            .not_persisted()
            .aggregate("address", "Address")
            .collection("orders", "Order")
            .build()
    }

    #[test]
    fn test_association_flags() {
        let spec = customer();
        assert!(!spec.is_aggregated());
        assert!(spec.association("name").unwrap().is_publishable());
        assert!(!spec.association("password").unwrap().is_publishable());
        assert!(spec.association("displayName").unwrap().is_not_persisted());
        assert!(spec.association("orders").unwrap().is_one_to_many());
        assert!(!spec.association("orders").unwrap().is_publishable());
        assert!(spec.require_association("missing").is_err());
    }

    #[test]
    fn test_registry_validation() {
        let registry = SpecificationRegistry::new();
        registry.register(customer()).unwrap();
        assert!(registry.validate().is_err());

        registry
            .register(
                ObjectSpecification::builder("Address")
                    .aggregated()
                    .property("city", ValueType::Text)
                    .build(),
            )
            .unwrap();
        registry
            .register(ObjectSpecification::builder("Order").build())
            .unwrap();
        registry.validate().unwrap();
        assert_eq!(registry.names().unwrap(), vec!["Address", "Customer", "Order"]);
    }

    #[test]
    fn test_registry_rejects_bad_names() {
        let registry = SpecificationRegistry::new();
        assert!(registry.register(ObjectSpecification::builder("a:b").build()).is_err());
        registry.register(ObjectSpecification::builder("A").build()).unwrap();
        assert!(registry.register(ObjectSpecification::builder("A").build()).is_err());
        assert!(registry.get("B").is_err());
    }

    #[test]
    fn test_registry_rejects_bad_association_ids() {
        let registry = SpecificationRegistry::new();
        for id in ["home:city", "a~b", "x|y", ""] {
            let err = registry
                .register(ObjectSpecification::builder("Customer").aggregate(id, "Address").build())
                .unwrap_err();
            assert!(matches!(err, StoreError::DomainModel(ref message) if message.contains("association id")));
        }
        assert!(!registry.contains("Customer"));
        registry
            .register(ObjectSpecification::builder("Customer").aggregate("home_address", "Address").build())
            .unwrap();
    }

    #[test]
    fn test_aggregation_mismatch() {
        let registry = SpecificationRegistry::new();
        registry
            .register(
                ObjectSpecification::builder("Customer")
                    .aggregate("address", "Address")
                    .build(),
            )
            .unwrap();
        registry
            .register(ObjectSpecification::builder("Address").build())
            .unwrap();
        assert!(matches!(registry.validate(), Err(StoreError::DomainModel(_))));
    }
}
