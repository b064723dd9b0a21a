use super::{AssociationKind, ObjectSpecification, Oid};
use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Content of one association slot on a domain object.
///
/// References point at other objects by identity; the adapter arena of the
/// unit of work resolves them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Value(Value),
    Reference(Option<Oid>),
    Collection(Vec<Oid>),
}

impl FieldValue {
    pub fn null() -> Self {
        FieldValue::Value(Value::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Value(Value::Null) | FieldValue::Reference(None))
    }

    /// Title used in audit output; `None` for null values.
    pub fn render(&self) -> Option<String> {
        match self {
            FieldValue::Value(Value::Null) | FieldValue::Reference(None) => None,
            FieldValue::Value(value) => Some(value.to_string()),
            FieldValue::Reference(Some(oid)) => Some(oid.to_string()),
            FieldValue::Collection(elements) => Some(format!(
                "[{}]",
                elements
                    .iter()
                    .map(|oid| oid.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.render() {
            Some(rendered) => write!(f, "{}", rendered),
            None => write!(f, "NULL"),
        }
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        FieldValue::Value(value)
    }
}

impl From<Oid> for FieldValue {
    fn from(oid: Oid) -> Self {
        FieldValue::Reference(Some(oid))
    }
}

/// The plain domain object wrapped by an adapter: a field map.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pojo {
    fields: BTreeMap<String, FieldValue>,
}

impl Pojo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Object with every association of `spec` set to its empty value.
    pub fn for_specification(spec: &ObjectSpecification) -> Self {
        let mut pojo = Pojo::new();
        for association in spec.associations() {
            let empty = match association.kind {
                AssociationKind::Value(_) => FieldValue::null(),
                AssociationKind::Reference { .. } => FieldValue::Reference(None),
                AssociationKind::Collection { .. } => FieldValue::Collection(Vec::new()),
            };
            pojo.fields.insert(association.id.clone(), empty);
        }
        pojo
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        match self.fields.get(name) {
            Some(FieldValue::Value(value)) => Some(value),
            _ => None,
        }
    }

    pub fn reference(&self, name: &str) -> Option<&Oid> {
        match self.fields.get(name) {
            Some(FieldValue::Reference(oid)) => oid.as_ref(),
            _ => None,
        }
    }

    pub fn collection(&self, name: &str) -> &[Oid] {
        match self.fields.get(name) {
            Some(FieldValue::Collection(elements)) => elements,
            _ => &[],
        }
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut Vec<Oid>> {
        match self.fields.get_mut(name) {
            Some(FieldValue::Collection(elements)) => Some(elements),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.fields.iter()
    }

    /// Replaces every reference to `old` with `new`.
    pub fn rebase_references(&mut self, old: &Oid, new: &Oid) {
        for value in self.fields.values_mut() {
            match value {
                FieldValue::Reference(Some(oid)) => *oid = oid.rebased(old, new),
                FieldValue::Collection(elements) => {
                    for oid in elements.iter_mut() {
                        *oid = oid.rebased(old, new);
                    }
                }
                _ => {}
            }
        }
    }
}
