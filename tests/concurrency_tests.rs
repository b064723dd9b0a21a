/// Optimistic concurrency tests
///
/// Stale writes, suppressed checking and the in-memory lock check.
/// Run with: cargo test --test concurrency_tests
mod common;

use chrono::Utc;
use common::{memory_store, user};
use memostore::{ExecutionContext, Oid, StoreConfig, StoreError, Value, Version};

fn saved_customer(store: &memostore::ObjectStore<memostore::MemoryDataStore>) -> Oid {
    let mut uow = store.begin(user("setup"));
    let customer = uow.create("Customer").unwrap();
    uow.set(&customer, "name", Value::from("Initial")).unwrap();
    let customer = uow.make_persistent(&customer).unwrap();
    uow.commit().unwrap();
    customer
}

#[test]
fn test_second_writer_gets_conflict() {
    let store = memory_store(StoreConfig::default());
    let customer = saved_customer(&store);

    let mut alice = store.begin(user("alice"));
    let mut bob = store.begin(user("bob"));
    alice.set(&customer, "name", Value::from("Alice's")).unwrap();
    bob.set(&customer, "name", Value::from("Bob's")).unwrap();

    alice.commit().unwrap();
    match bob.commit().unwrap_err() {
        StoreError::ConcurrencyConflict {
            user,
            current,
            incoming,
            ..
        } => {
            assert_eq!(user, "bob");
            assert_eq!(current, "2");
            assert_eq!(incoming, "1");
        }
        other => panic!("expected a conflict, got {other}"),
    }

    let mut check = store.begin(user("carol"));
    assert_eq!(
        check.get_object(&customer).unwrap().pojo().value("name"),
        Some(&Value::from("Alice's"))
    );
}

#[test]
fn test_failed_batch_leaves_store_untouched() {
    let store = memory_store(StoreConfig::default());
    let customer = saved_customer(&store);
    let other = saved_customer(&store);

    let mut stale = store.begin(user("bob"));
    stale.set(&other, "name", Value::from("changed")).unwrap();
    stale.set(&customer, "name", Value::from("changed")).unwrap();

    let mut winner = store.begin(user("alice"));
    winner.set(&customer, "name", Value::from("winner")).unwrap();
    winner.commit().unwrap();

    assert!(stale.commit().is_err());

    let mut check = store.begin(user("carol"));
    assert_eq!(
        check.get_object(&other).unwrap().pojo().value("name"),
        Some(&Value::from("Initial"))
    );
    assert_eq!(
        check
            .get_object(&other)
            .unwrap()
            .version()
            .map(Version::sequence_string)
            .as_deref(),
        Some("1")
    );
}

#[test]
fn test_checking_disabled_lets_last_writer_win() {
    let store = memory_store(StoreConfig::new().concurrency_checking(false));
    let customer = saved_customer(&store);

    let mut alice = store.begin(user("alice"));
    let mut bob = store.begin(user("bob"));
    let mut dave = store.begin(user("dave"));
    alice.set(&customer, "name", Value::from("Alice's")).unwrap();
    bob.set(&customer, "name", Value::from("Bob's")).unwrap();
    dave.load(&customer).unwrap();
    alice.commit().unwrap();
    bob.commit().unwrap();

    let mut check = store.begin(user("carol"));
    let adapter = check.get_object(&customer).unwrap();
    assert_eq!(adapter.pojo().value("name"), Some(&Value::from("Bob's")));
    assert_eq!(adapter.version().map(Version::sequence_string).as_deref(), Some("3"));
    assert_eq!(adapter.version().map(Version::user), Some("bob"));

    // still holding version 1, the third writer moves the version on again
    dave.set(&customer, "name", Value::from("Dave's")).unwrap();
    dave.commit().unwrap();
    let mut check = store.begin(user("carol"));
    let adapter = check.get_object(&customer).unwrap();
    assert_eq!(adapter.pojo().value("name"), Some(&Value::from("Dave's")));
    assert_eq!(adapter.version().map(Version::sequence_string).as_deref(), Some("4"));
}

#[test]
fn test_checking_disabled_delete_of_moved_record() {
    let store = memory_store(StoreConfig::new().concurrency_checking(false));
    let customer = saved_customer(&store);

    let mut stale = store.begin(user("bob"));
    stale.load(&customer).unwrap();
    let mut winner = store.begin(user("alice"));
    winner.set(&customer, "name", Value::from("winner")).unwrap();
    winner.commit().unwrap();

    stale.destroy(&customer).unwrap();
    stale.commit().unwrap();

    let mut check = store.begin(user("carol"));
    assert!(check.get_object(&customer).is_err());
}

#[test]
fn test_lock_check_against_caller_version() {
    let store = memory_store(StoreConfig::default());
    let customer = saved_customer(&store);

    let stale = Version::Serial {
        sequence: 0,
        user: "someone".to_string(),
        time: Utc::now(),
    };

    let mut uow = store.begin(user("alice"));
    uow.load(&customer).unwrap();
    let current = uow.get_object(&customer).unwrap().version().cloned();
    uow.check_lock(&customer, current.as_ref()).unwrap();
    uow.check_lock(&customer, None).unwrap();

    let err = uow.check_lock(&customer, Some(&stale)).unwrap_err();
    assert!(err.is_recoverable());
    assert!(matches!(err, StoreError::ConcurrencyConflict { ref user, .. } if user == "alice"));

    let mut trusted = store.begin(ExecutionContext::system());
    trusted.load(&customer).unwrap();
    trusted.check_lock(&customer, Some(&stale)).unwrap();
}

#[test]
fn test_aggregated_lock_checks_use_root_version() {
    let store = memory_store(StoreConfig::default());

    let mut uow = store.begin(user("alice"));
    let customer = uow.create("Customer").unwrap();
    uow.create_aggregated(&customer, "address").unwrap();
    let customer = uow.make_persistent(&customer).unwrap();
    uow.commit().unwrap();

    let mut uow = store.begin(user("alice"));
    uow.load(&customer).unwrap();
    let address = uow
        .adapters()
        .require(&customer)
        .unwrap()
        .pojo()
        .reference("address")
        .cloned()
        .unwrap();
    let root_version = uow.get_object(&customer).unwrap().version().cloned();
    uow.check_lock(&address, root_version.as_ref()).unwrap();

    let newer = root_version.map(|v| v.next("bob", Utc::now()));
    assert!(uow.check_lock(&address, newer.as_ref()).is_err());
}
