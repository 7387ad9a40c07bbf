// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Time grant integration tests: causality across dependencies, time
//! properties, async requests and stall diagnostics.

use cosim::{
    BrokerQuery, CoreType, DataType, Error, Federate, FederateInfo, Input, Library, LogLevel,
    Property, Publication, QueryResult, Time,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn secs(s: f64) -> Time {
    Time::from_secs_f64(s)
}

fn info() -> FederateInfo {
    FederateInfo::new("core")
        .with_core_init_string("--broker=main")
        .with_grant_timeout(Duration::from_secs(10))
}

/// Producer publishes "signal", consumer subscribes to it.
fn producer_consumer(lib: &Library, producer_info: FederateInfo) -> (Federate, Federate) {
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let producer = lib.create_federate("producer", &producer_info).unwrap();
    let consumer = lib.create_federate("consumer", &info()).unwrap();
    producer
        .register_global_publication("signal", DataType::Double, "")
        .unwrap();
    consumer.register_subscription("signal", "").unwrap();
    producer.enter_executing_mode_async().unwrap();
    consumer.enter_executing_mode_async().unwrap();
    producer.enter_executing_mode_complete().unwrap();
    consumer.enter_executing_mode_complete().unwrap();
    (producer, consumer)
}

/// Like [`producer_consumer`] but keeps the interface handles.
fn linked(lib: &Library, producer_info: FederateInfo) -> (Federate, Publication, Federate, Input) {
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let producer = lib.create_federate("producer", &producer_info).unwrap();
    let consumer = lib.create_federate("consumer", &info()).unwrap();
    let signal = producer
        .register_global_publication("signal", DataType::Double, "")
        .unwrap();
    let input = consumer.register_subscription("signal", "").unwrap();
    producer.enter_executing_mode_async().unwrap();
    consumer.enter_executing_mode_async().unwrap();
    producer.enter_executing_mode_complete().unwrap();
    consumer.enter_executing_mode_complete().unwrap();
    (producer, signal, consumer, input)
}

#[test]
fn test_consumer_waits_for_producer() {
    let lib = Library::open();
    let (producer, consumer) = producer_consumer(&lib, info());

    consumer.request_time_async(10.0).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_async_operation_completed());

    assert_eq!(producer.request_time(4.0).unwrap(), secs(4.0));
    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_async_operation_completed());

    assert_eq!(producer.request_time(12.0).unwrap(), secs(12.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(10.0));
}

#[test]
fn test_lookahead_lets_consumer_run_ahead() {
    let lib = Library::open();
    let (producer, consumer) = producer_consumer(&lib, info().with_lookahead(2.0));

    // Producer at 0 with lookahead 2 cannot affect anything before 2.
    assert_eq!(consumer.request_time(2.0).unwrap(), secs(2.0));

    consumer.request_time_async(3.0).unwrap();
    assert_eq!(producer.request_time(1.0).unwrap(), secs(1.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(3.0));
}

#[test]
fn test_grants_never_decrease() {
    let lib = Library::open();
    let (producer, consumer) = producer_consumer(&lib, info());
    let producer = Arc::new(producer);

    let runner = {
        let producer = producer.clone();
        thread::spawn(move || {
            let mut last = Time::ZERO;
            for _ in 0..20 {
                let step = f64::from(fastrand::u8(1..4)) * 0.5;
                let granted = producer.request_time(last.as_secs_f64() + step).unwrap();
                assert!(granted >= last);
                last = granted;
            }
            producer.request_time(Time::MAX).unwrap()
        })
    };

    let mut last = Time::ZERO;
    let mut target = 0.0;
    while last < secs(15.0) {
        target += 0.7;
        let granted = consumer.request_time(target).unwrap();
        assert!(granted >= last);
        last = granted;
    }
    consumer.finalize().unwrap();
    assert_eq!(runner.join().unwrap(), Time::MAX);
}

#[test]
fn test_regressing_request_rejected() {
    let lib = Library::open();
    let (producer, _consumer) = producer_consumer(&lib, info());
    producer.request_time(3.0).unwrap();
    let err = producer.request_time(1.0).unwrap_err();
    assert!(matches!(err, Error::InvalidTimeRequest { .. }));
    assert_eq!(producer.granted_time(), secs(3.0));
    assert_eq!(producer.request_time(4.0).unwrap(), secs(4.0));
}

#[test]
fn test_time_delta_and_period() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let stepped = lib
        .create_federate("stepped", &info().with_time_delta(0.5))
        .unwrap();
    let periodic = lib
        .create_federate("periodic", &info().with_period(1.0).with_offset(0.25))
        .unwrap();
    stepped.enter_executing_mode_async().unwrap();
    periodic.enter_executing_mode_async().unwrap();
    stepped.enter_executing_mode_complete().unwrap();
    periodic.enter_executing_mode_complete().unwrap();

    assert_eq!(stepped.request_time(0.1).unwrap(), secs(0.5));
    assert_eq!(stepped.request_time(2.0).unwrap(), secs(2.0));
    assert_eq!(periodic.request_time(0.1).unwrap(), secs(0.25));
    assert_eq!(periodic.request_time(0.3).unwrap(), secs(1.25));

    periodic.set_property(Property::Period(Time::ZERO)).unwrap();
    assert_eq!(periodic.request_time(1.5).unwrap(), secs(1.5));
}

#[test]
fn test_lookahead_property_reaches_broker() {
    let lib = Library::open();
    let (producer, consumer) = producer_consumer(&lib, info());
    producer.set_property(Property::Lookahead(secs(5.0))).unwrap();
    assert_eq!(consumer.request_time(5.0).unwrap(), secs(5.0));
}

#[test]
fn test_stall_roots_and_time_status() {
    let lib = Library::open();
    let (producer, consumer) = producer_consumer(&lib, info());
    let broker = lib.broker("main").unwrap();

    consumer.request_time_async(5.0).unwrap();
    thread::sleep(Duration::from_millis(50));

    match broker.query(BrokerQuery::StallRoots).unwrap() {
        QueryResult::StallRoots(roots) => assert_eq!(roots, vec![producer.id()]),
        other => panic!("unexpected {:?}", other),
    }
    match broker.query(BrokerQuery::TimeStatus).unwrap() {
        QueryResult::TimeStatus(status) => {
            let waiting = status
                .iter()
                .find(|s| s.federate == consumer.id())
                .unwrap();
            assert_eq!(waiting.requested, Some(secs(5.0)));
            assert_eq!(waiting.blocked_by, vec![producer.id()]);
        }
        other => panic!("unexpected {:?}", other),
    }

    producer.finalize().unwrap();
    assert_eq!(consumer.request_time_complete().unwrap(), secs(5.0));
}

#[test]
fn test_grant_timeout_reports_not_ready() {
    let lib = Library::open();
    let short = info().with_grant_timeout(Duration::from_millis(50));
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let producer = lib.create_federate("producer", &info()).unwrap();
    let consumer = lib.create_federate("consumer", &short).unwrap();
    producer
        .register_global_publication("signal", DataType::Double, "")
        .unwrap();
    consumer.register_subscription("signal", "").unwrap();
    producer.enter_executing_mode_async().unwrap();
    consumer.enter_executing_mode_async().unwrap();
    producer.enter_executing_mode_complete().unwrap();
    consumer.enter_executing_mode_complete().unwrap();

    assert!(matches!(consumer.request_time(1.0), Err(Error::NotReady(_))));
    // The request stays outstanding and completes once the producer moves.
    producer.request_time(2.0).unwrap();
    assert_eq!(consumer.request_time_complete().unwrap(), secs(1.0));
}

#[test]
fn test_outputs_refused_while_request_pending() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let producer = lib.create_federate("producer", &info()).unwrap();
    let consumer = lib.create_federate("consumer", &info()).unwrap();
    let signal = producer
        .register_global_publication("signal", DataType::Double, "")
        .unwrap();
    let producer_port = producer.register_global_endpoint("producer/port").unwrap();
    let input = consumer.register_subscription("signal", "").unwrap();
    let consumer_port = consumer.register_global_endpoint("consumer/port").unwrap();
    producer.enter_executing_mode_async().unwrap();
    consumer.enter_executing_mode_async().unwrap();
    producer.enter_executing_mode_complete().unwrap();
    consumer.enter_executing_mode_complete().unwrap();

    // Endpoint owners depend on each other, so this request waits on the consumer.
    producer.request_time_async(10.0).unwrap();
    assert!(matches!(
        producer.publish(&signal, 1.0),
        Err(Error::InvalidStateTransition { .. })
    ));
    assert!(matches!(
        producer.send_message(&producer_port, "consumer/port", b"early".to_vec()),
        Err(Error::InvalidStateTransition { .. })
    ));
    producer.set_property(Property::TimeDelta(secs(0.5))).unwrap();
    producer.set_property(Property::LogLevel(LogLevel::Warning)).unwrap();

    assert_eq!(consumer.request_time(5.0).unwrap(), secs(5.0));
    assert_eq!(consumer.last_update_time(&input).unwrap(), None);
    assert_eq!(consumer.pending_messages(&consumer_port).unwrap(), 0);

    consumer.request_time_async(10.0).unwrap();
    assert_eq!(producer.request_time_complete().unwrap(), secs(10.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(10.0));

    producer.publish(&signal, 2.0).unwrap();
    producer.request_time_async(11.0).unwrap();
    assert_eq!(consumer.request_time(11.0).unwrap(), secs(11.0));
    assert_eq!(producer.request_time_complete().unwrap(), secs(11.0));
    assert_eq!(consumer.last_update_time(&input).unwrap(), Some(secs(10.0)));
}

#[test]
fn test_lookahead_decrease_after_dependent_advanced() {
    let lib = Library::open();
    let (producer, signal, consumer, input) = linked(&lib, info().with_lookahead(2.0));

    // The consumer runs ahead on the producer's original lookahead.
    assert_eq!(consumer.request_time(2.0).unwrap(), secs(2.0));

    producer.set_property(Property::Lookahead(Time::ZERO)).unwrap();
    producer.publish(&signal, 1.0).unwrap();

    consumer.request_time_async(3.0).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(!consumer.is_async_operation_completed());
    assert_eq!(producer.request_time(3.0).unwrap(), secs(3.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(3.0));

    let tag = consumer.last_update_time(&input).unwrap().unwrap();
    assert!(tag >= secs(2.0), "value tagged {} behind a granted dependent", tag);
    assert_eq!(consumer.get::<f64>(&input).unwrap(), 1.0);

    // Past the promised window the smaller lookahead applies.
    producer.publish(&signal, 2.0).unwrap();
    consumer.request_time_async(4.0).unwrap();
    assert_eq!(producer.request_time(4.0).unwrap(), secs(4.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(4.0));
    assert_eq!(consumer.last_update_time(&input).unwrap(), Some(secs(3.0)));
}

#[test]
fn test_lookahead_decrease_while_request_pending() {
    let lib = Library::open();
    let (producer, signal, consumer, input) = linked(&lib, info().with_lookahead(1.0));

    assert_eq!(consumer.request_time(1.0).unwrap(), secs(1.0));
    consumer.request_time_async(2.0).unwrap();
    producer.request_time_async(1.0).unwrap();
    producer.set_property(Property::Lookahead(Time::ZERO)).unwrap();
    assert_eq!(producer.request_time_complete().unwrap(), secs(1.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(2.0));

    producer.publish(&signal, 5.0).unwrap();
    consumer.request_time_async(3.0).unwrap();
    assert_eq!(producer.request_time(3.0).unwrap(), secs(3.0));
    assert_eq!(consumer.request_time_complete().unwrap(), secs(3.0));
    assert_eq!(consumer.last_update_time(&input).unwrap(), Some(secs(2.0)));
}
