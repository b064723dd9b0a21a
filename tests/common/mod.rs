//! Domain model shared by the integration tests.

#![allow(dead_code)]

use memostore::object::LifecycleEvent;
use memostore::wrapper::ObjectAction;
use memostore::{
    ExecutionContext, MemoryDataStore, ObjectSpecification, ObjectStore, SpecificationRegistry,
    StoreConfig, Value, ValueType,
};

/// Customer (root) owns an Address and a list of Notes; Orders are roots
/// that refer to their Customer.
pub fn specifications() -> SpecificationRegistry {
    let specs = SpecificationRegistry::new();
    specs
        .register(
            ObjectSpecification::builder("Customer")
                .property("name", ValueType::Text)
                .property("credit", ValueType::Integer)
                .property("closed", ValueType::Boolean)
                .property("session", ValueType::Text)
                .not_persisted()
                .property("internal", ValueType::Text)
                .excluded_from_publishing()
                .aggregate("address", "Address")
                .aggregate_collection("notes", "Note")
                .collection("orders", "Order")
                .on(LifecycleEvent::Created, |pojo| {
                    pojo.set("credit", Value::from(100i64));
                    Ok(())
                })
                .action(
                    ObjectAction::new("rename", |container, target, args| {
                        let name = args.first().cloned().unwrap_or(Value::Null);
                        container.set_value(target, "name", name.clone().into())?;
                        Ok(name)
                    })
                    .validated_by(|_, args| match args.first() {
                        Some(Value::Text(name)) if !name.is_empty() => None,
                        _ => Some("a non-empty name is required".to_string()),
                    })
                    .disabled_when(|pojo| {
                        (pojo.value("closed").and_then(Value::as_bool) == Some(true))
                            .then(|| "customer is closed".to_string())
                    }),
                )
                .action(
                    ObjectAction::new("audit", |_, _, _| Ok(Value::Null))
                        .hidden_when(|_| true),
                )
                .action(ObjectAction::new("fail_after_change", |container, target, _| {
                    container.set_value(target, "name", Value::from("half-done").into())?;
                    Err(memostore::StoreError::DomainModel("refused".to_string()))
                }))
                .build(),
        )
        .unwrap();
    specs
        .register(
            ObjectSpecification::builder("Address")
                .aggregated()
                .property("city", ValueType::Text)
                .build(),
        )
        .unwrap();
    specs
        .register(
            ObjectSpecification::builder("Note")
                .aggregated()
                .property("text", ValueType::Text)
                .build(),
        )
        .unwrap();
    specs
        .register(
            ObjectSpecification::builder("Order")
                .property("total", ValueType::Float)
                .reference("customer", "Customer")
                .build(),
        )
        .unwrap();
    specs
}

pub fn memory_store(config: StoreConfig) -> ObjectStore<MemoryDataStore> {
    let store = ObjectStore::new(MemoryDataStore::new(), specifications(), config).unwrap();
    store.open().unwrap();
    store
}

pub fn user(name: &str) -> ExecutionContext {
    ExecutionContext::new(name)
}
