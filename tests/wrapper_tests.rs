/// Action invocation tests
///
/// Rule checks, lock checks and the commit/rollback of action bodies,
/// synchronously and on the tokio blocking pool.
/// Run with: cargo test --test wrapper_tests
mod common;

use chrono::Utc;
use common::{memory_store, user};
use memostore::wrapper::{ExecutionMode, WrapperFactory};
use memostore::{
    FieldValue, InteractionVeto, MemoryDataStore, Oid, StoreConfig, StoreError, Value, Version,
};
use std::sync::Arc;

fn factory_with_customer(closed: bool) -> (WrapperFactory<MemoryDataStore>, Oid) {
    let store = memory_store(StoreConfig::default());
    let mut uow = store.begin(user("setup"));
    let customer = uow.create("Customer").unwrap();
    uow.set(&customer, "name", Value::from("Original")).unwrap();
    uow.set(&customer, "closed", Value::from(closed)).unwrap();
    let customer = uow.make_persistent(&customer).unwrap();
    uow.commit().unwrap();
    drop(uow);
    (WrapperFactory::new(Arc::new(store)), customer)
}

fn stored_name(factory: &WrapperFactory<MemoryDataStore>, customer: &Oid) -> FieldValue {
    let mut uow = factory.store().begin(user("checker"));
    uow.value(customer, "name").unwrap()
}

fn current_version(factory: &WrapperFactory<MemoryDataStore>, customer: &Oid) -> Version {
    let mut uow = factory.store().begin(user("checker"));
    uow.get_object(customer).unwrap().version().cloned().unwrap()
}

#[test]
fn test_invoke_commits_action() {
    let (factory, customer) = factory_with_customer(false);
    let seen = current_version(&factory, &customer);

    let result = factory
        .invoke(
            user("alice"),
            &customer,
            "rename",
            &[Value::from("Renamed")],
            ExecutionMode::Execute,
            Some(&seen),
        )
        .unwrap();

    assert_eq!(result, Value::from("Renamed"));
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Renamed")));
    let version = current_version(&factory, &customer);
    assert_eq!(version.sequence_string(), "2");
    assert_eq!(version.user(), "alice");
}

#[test]
fn test_rules_veto_in_order() {
    let (factory, customer) = factory_with_customer(true);

    let hidden = factory
        .invoke(user("alice"), &customer, "audit", &[], ExecutionMode::Execute, None)
        .unwrap_err();
    assert!(matches!(hidden, StoreError::Interaction(InteractionVeto::Hidden(ref id)) if id == "audit"));

    // disabled is reported before the empty argument is
    let disabled = factory
        .invoke(user("alice"), &customer, "rename", &[], ExecutionMode::Execute, None)
        .unwrap_err();
    assert!(disabled.is_recoverable());
    assert!(matches!(
        disabled,
        StoreError::Interaction(InteractionVeto::Disabled(ref reason)) if reason == "customer is closed"
    ));
}

#[test]
fn test_invalid_arguments_are_refused() {
    let (factory, customer) = factory_with_customer(false);

    let err = factory
        .invoke(
            user("alice"),
            &customer,
            "rename",
            &[Value::from("")],
            ExecutionMode::Execute,
            None,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Interaction(InteractionVeto::Invalid(_))));
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Original")));
}

#[test]
fn test_skip_rules_runs_vetoed_action() {
    let (factory, customer) = factory_with_customer(true);

    factory
        .invoke(
            user("system"),
            &customer,
            "rename",
            &[Value::from("Forced")],
            ExecutionMode::SkipRules,
            None,
        )
        .unwrap();
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Forced")));
}

#[test]
fn test_no_execute_only_checks() {
    let (factory, customer) = factory_with_customer(false);

    let result = factory
        .invoke(
            user("alice"),
            &customer,
            "rename",
            &[Value::from("Unused")],
            ExecutionMode::NoExecute,
            None,
        )
        .unwrap();
    assert_eq!(result, Value::Null);
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Original")));

    let refused = factory.invoke(
        user("alice"),
        &customer,
        "rename",
        &[],
        ExecutionMode::NoExecute,
        None,
    );
    assert!(refused.is_err());
}

#[test]
fn test_stale_version_is_a_conflict() {
    let (factory, customer) = factory_with_customer(false);
    let stale = Version::Serial {
        sequence: 7,
        user: "bob".to_string(),
        time: Utc::now(),
    };

    let err = factory
        .invoke(
            user("alice"),
            &customer,
            "rename",
            &[Value::from("Late")],
            ExecutionMode::Execute,
            Some(&stale),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Original")));
}

#[test]
fn test_failing_body_rolls_back() {
    let (factory, customer) = factory_with_customer(false);

    let err = factory
        .invoke(
            user("alice"),
            &customer,
            "fail_after_change",
            &[],
            ExecutionMode::Execute,
            None,
        )
        .unwrap_err();
    assert!(err.is_domain_model_error());
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Original")));
    assert_eq!(current_version(&factory, &customer).sequence_string(), "1");
}

#[test]
fn test_unknown_action() {
    let (factory, customer) = factory_with_customer(false);
    let err = factory
        .invoke(user("alice"), &customer, "explode", &[], ExecutionMode::Execute, None)
        .unwrap_err();
    assert!(matches!(err, StoreError::DomainModel(ref message) if message.contains("explode")));
}

#[tokio::test]
async fn test_invoke_async_on_blocking_pool() {
    let (factory, customer) = factory_with_customer(false);

    let result = factory
        .invoke_async(
            user("alice"),
            customer.clone(),
            "rename",
            vec![Value::from("Async")],
            ExecutionMode::Execute,
            None,
        )
        .await
        .unwrap();
    assert_eq!(result, Value::from("Async"));
    assert_eq!(stored_name(&factory, &customer), FieldValue::Value(Value::from("Async")));
}

#[test]
fn test_invoke_async_reports_vetoes() {
    let (factory, customer) = factory_with_customer(true);

    let outcome = tokio_test::block_on(factory.invoke_async(
        user("alice"),
        customer,
        "rename",
        vec![Value::from("Nope")],
        ExecutionMode::Execute,
        None,
    ));
    assert!(matches!(
        outcome,
        Err(StoreError::Interaction(InteractionVeto::Disabled(_)))
    ));
}
