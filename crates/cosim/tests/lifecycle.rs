// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Federate state machine and broker termination through the public API.

use cosim::{
    BrokerQuery, CoreType, DataType, Error, FederateInfo, FederateState, Library, QueryResult,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn info() -> FederateInfo {
    FederateInfo::new("core")
        .with_core_init_string("--broker=main")
        .with_grant_timeout(Duration::from_secs(10))
}

#[test]
fn test_operations_rejected_after_finalize() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 1").unwrap();
    let fed = lib.create_federate("fed", &info()).unwrap();
    let publication = fed
        .register_global_publication("p", DataType::Double, "")
        .unwrap();
    fed.enter_executing_mode().unwrap();
    fed.finalize().unwrap();

    assert_eq!(fed.state(), FederateState::Finalized);
    assert!(matches!(
        fed.publish(&publication, 1.0),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        fed.request_time(1.0),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        fed.finalize(),
        Err(Error::InvalidStateTransition { .. })
    ));
}

#[test]
fn test_values_and_time_need_executing() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 1").unwrap();
    let fed = lib.create_federate("fed", &info()).unwrap();
    let publication = fed
        .register_global_publication("p", DataType::Double, "")
        .unwrap();
    let input = fed.register_subscription("p", "").unwrap();

    assert!(matches!(
        fed.publish(&publication, 1.0),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        fed.get_value(&input),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        fed.request_time(1.0),
        Err(Error::InvalidStateTransition { .. })
    ));
    // Defaults may be set ahead of execution.
    fed.set_default(&input, 0.0).unwrap();
}

#[test]
fn test_broker_disconnects_after_last_finalize() {
    let lib = Library::open();
    let broker = lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let a = lib.create_federate("a", &info()).unwrap();
    let b = lib.create_federate("b", &info()).unwrap();
    a.enter_executing_mode_async().unwrap();
    b.enter_executing_mode_async().unwrap();
    a.enter_executing_mode_complete().unwrap();
    b.enter_executing_mode_complete().unwrap();

    a.finalize().unwrap();
    assert!(broker.is_connected());
    b.finalize().unwrap();
    assert!(broker.wait_for_disconnect(Some(Duration::from_secs(5))));
    assert!(!broker.is_connected());

    let stats = broker.stats();
    assert_eq!(stats.federates_joined, 2);
    assert_eq!(stats.federates_left, 2);
}

#[test]
fn test_dropped_federate_counts_as_finalized() {
    let lib = Library::open();
    let broker = lib.create_broker(CoreType::Inproc, "main", "-f 1").unwrap();
    let fed = lib.create_federate("fed", &info()).unwrap();
    fed.enter_executing_mode().unwrap();
    drop(fed);
    assert!(broker.wait_for_disconnect(Some(Duration::from_secs(5))));
}

#[test]
fn test_exec_waits_for_expected_federates() {
    let lib = Library::open();
    let broker = lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let early = lib.create_federate("early", &info()).unwrap();
    early.enter_executing_mode_async().unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!early.is_async_operation_completed());

    match broker.query(BrokerQuery::Federates).unwrap() {
        QueryResult::Federates(feds) => {
            assert_eq!(feds.len(), 1);
            assert!(feds[0].exec_requested);
        }
        other => panic!("unexpected {:?}", other),
    }

    let late = lib.create_federate("late", &info()).unwrap();
    late.enter_executing_mode().unwrap();
    early.enter_executing_mode_complete().unwrap();
    assert_eq!(early.state(), FederateState::Executing);
}

#[test]
fn test_late_registration_rejected() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 1").unwrap();
    let fed = lib.create_federate("fed", &info()).unwrap();
    fed.enter_executing_mode().unwrap();
    assert!(lib.create_federate("latecomer", &info()).is_err());
}

#[test]
fn test_finalize_from_other_thread_unblocks_request() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let producer = lib.create_federate("producer", &info()).unwrap();
    let consumer = Arc::new(
        lib.create_federate("consumer", &FederateInfo::new("core").with_core_init_string("--broker=main"))
            .unwrap(),
    );
    producer
        .register_global_publication("x", DataType::Double, "")
        .unwrap();
    consumer.register_subscription("x", "").unwrap();
    producer.enter_executing_mode_async().unwrap();
    consumer.enter_executing_mode_async().unwrap();
    producer.enter_executing_mode_complete().unwrap();
    consumer.enter_executing_mode_complete().unwrap();

    let blocked = {
        let consumer = consumer.clone();
        thread::spawn(move || consumer.request_time(100.0))
    };
    thread::sleep(Duration::from_millis(50));
    consumer.finalize().unwrap();
    assert!(matches!(
        blocked.join().unwrap(),
        Err(Error::InvalidStateTransition { .. })
    ));
}

#[test]
fn test_library_close_fails_federate() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let fed = lib.create_federate("fed", &info()).unwrap();
    lib.close();
    lib.close();
    assert!(matches!(fed.enter_executing_mode(), Err(Error::LibraryClosed)));
    assert!(matches!(lib.broker("main"), Err(Error::LibraryClosed)));
}
