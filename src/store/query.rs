use crate::core::Value;
use crate::object::ObjectAdapter;

/// Selects instances of one specification.
#[derive(Debug, Clone, PartialEq)]
pub enum InstanceQuery {
    All(String),
    FieldEquals {
        spec: String,
        field: String,
        value: Value,
    },
}

impl InstanceQuery {
    pub fn all(spec: impl Into<String>) -> Self {
        InstanceQuery::All(spec.into())
    }

    pub fn field_equals(spec: impl Into<String>, field: impl Into<String>, value: impl Into<Value>) -> Self {
        InstanceQuery::FieldEquals {
            spec: spec.into(),
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn spec_name(&self) -> &str {
        match self {
            InstanceQuery::All(spec) | InstanceQuery::FieldEquals { spec, .. } => spec,
        }
    }

    pub fn matches(&self, adapter: &ObjectAdapter) -> bool {
        if adapter.specification().name() != self.spec_name() || adapter.is_destroyed() {
            return false;
        }
        match self {
            InstanceQuery::All(_) => true,
            InstanceQuery::FieldEquals { field, value, .. } => {
                adapter.pojo().value(field) == Some(value)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ValueType;
    use crate::object::{ObjectSpecification, Oid, Pojo};
    use std::sync::Arc;

    #[test]
    fn test_matches() {
        let spec = Arc::new(
            ObjectSpecification::builder("Customer")
                .property("name", ValueType::Text)
                .build(),
        );
        let mut pojo = Pojo::for_specification(&spec);
        pojo.set("name", Value::from("Alice"));
        let adapter = ObjectAdapter::new(Oid::persistent("Customer", 1), spec, pojo);

        assert!(InstanceQuery::all("Customer").matches(&adapter));
        assert!(!InstanceQuery::all("Order").matches(&adapter));
        assert!(InstanceQuery::field_equals("Customer", "name", "Alice").matches(&adapter));
        assert!(!InstanceQuery::field_equals("Customer", "name", "Bob").matches(&adapter));
    }
}
