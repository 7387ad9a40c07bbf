// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Endpoint messaging integration tests.

use cosim::{
    CoreType, Error, Federate, FederateInfo, FilterMode, FilterOperation, Library, Property, Time,
};
use std::time::Duration;

fn secs(s: f64) -> Time {
    Time::from_secs_f64(s)
}

fn info() -> FederateInfo {
    FederateInfo::new("core")
        .with_core_init_string("--broker=main")
        .with_grant_timeout(Duration::from_secs(10))
}

fn start_both(a: &Federate, b: &Federate) {
    a.enter_executing_mode_async().unwrap();
    b.enter_executing_mode_async().unwrap();
    a.enter_executing_mode_complete().unwrap();
    b.enter_executing_mode_complete().unwrap();
}

fn advance_both(a: &Federate, b: &Federate, to: f64) {
    a.request_time_async(to).unwrap();
    b.request_time_async(to).unwrap();
    assert_eq!(a.request_time_complete().unwrap(), secs(to));
    assert_eq!(b.request_time_complete().unwrap(), secs(to));
}

#[test]
fn test_message_delivered_in_order() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let alice = lib.create_federate("alice", &info()).unwrap();
    let bob = lib.create_federate("bob", &info()).unwrap();
    let ep_a = alice.register_global_endpoint("alice/port").unwrap();
    let ep_b = bob.register_global_endpoint("bob/port").unwrap();
    start_both(&alice, &bob);

    alice.send_message(&ep_a, "bob/port", b"first".to_vec()).unwrap();
    alice.send_message(&ep_a, "bob/port", b"second".to_vec()).unwrap();
    advance_both(&alice, &bob, 1.0);

    assert_eq!(bob.pending_messages(&ep_b).unwrap(), 2);
    let first = bob.receive_message(&ep_b).unwrap().unwrap();
    assert_eq!(first.source, "alice/port");
    assert_eq!(first.destination, "bob/port");
    assert_eq!(first.time, Time::ZERO);
    assert_eq!(first.payload, b"first");
    assert_eq!(bob.receive_message(&ep_b).unwrap().unwrap().payload, b"second");
    assert!(bob.receive_message(&ep_b).unwrap().is_none());
    assert_eq!(alice.pending_messages(&ep_a).unwrap(), 0);
}

#[test]
fn test_message_held_until_its_time() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let alice = lib.create_federate("alice", &info()).unwrap();
    let bob = lib.create_federate("bob", &info()).unwrap();
    let ep_a = alice.register_global_endpoint("a").unwrap();
    let ep_b = bob.register_global_endpoint("b").unwrap();
    alice.set_property(Property::Lookahead(secs(2.0))).unwrap();
    start_both(&alice, &bob);

    alice.send_message(&ep_a, "b", vec![1u8, 2, 3]).unwrap();
    advance_both(&alice, &bob, 1.0);
    assert_eq!(bob.pending_messages(&ep_b).unwrap(), 0);

    advance_both(&alice, &bob, 2.0);
    let msg = bob.receive_message(&ep_b).unwrap().unwrap();
    assert_eq!(msg.time, secs(2.0));
    assert_eq!(msg.payload, vec![1, 2, 3]);
}

#[test]
fn test_unknown_destination_dropped_and_counted() {
    let lib = Library::open();
    let broker = lib.create_broker(CoreType::Inproc, "main", "-f 1").unwrap();
    let fed = lib.create_federate("fed", &info()).unwrap();
    let ep = fed.register_global_endpoint("only").unwrap();
    fed.enter_executing_mode().unwrap();

    let before = broker.stats().messages_dropped;
    fed.send_message(&ep, "nobody", vec![0u8]).unwrap();
    fed.request_time(1.0).unwrap();
    assert_eq!(broker.stats().messages_dropped, before + 1);
    assert!(fed.receive_message(&ep).unwrap().is_none());
}

#[test]
fn test_endpoint_name_collision() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let a = lib.create_federate("a", &info()).unwrap();
    let b = lib.create_federate("b", &info()).unwrap();
    a.register_global_endpoint("port").unwrap();
    assert!(matches!(
        b.register_global_endpoint("port"),
        Err(Error::NameCollision(_))
    ));
}

#[test]
fn test_destination_filter_delays_delivery() {
    let lib = Library::open();
    lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let alice = lib.create_federate("alice", &info()).unwrap();
    let bob = lib.create_federate("bob", &info()).unwrap();
    let ep_a = alice.register_global_endpoint("alice/port").unwrap();
    let ep_b = bob.register_global_endpoint("bob/port").unwrap();
    let filter = bob
        .register_filter(
            "bob/port",
            FilterMode::Destination,
            FilterOperation::Delay { delay: secs(1.0) },
        )
        .unwrap();
    assert_eq!(filter.target(), "bob/port");
    start_both(&alice, &bob);

    alice.send_message(&ep_a, "bob/port", b"late".to_vec()).unwrap();
    advance_both(&alice, &bob, 0.5);
    assert_eq!(bob.pending_messages(&ep_b).unwrap(), 0);

    advance_both(&alice, &bob, 1.0);
    let msg = bob.receive_message(&ep_b).unwrap().unwrap();
    assert_eq!(msg.time, secs(1.0));
    assert_eq!(msg.payload, b"late");
}

#[test]
fn test_source_drop_filter_discards_messages() {
    let lib = Library::open();
    let broker = lib.create_broker(CoreType::Inproc, "main", "-f 2").unwrap();
    let alice = lib.create_federate("alice", &info()).unwrap();
    let bob = lib.create_federate("bob", &info()).unwrap();
    let ep_a = alice.register_global_endpoint("alice/port").unwrap();
    let ep_b = bob.register_global_endpoint("bob/port").unwrap();
    bob.register_filter("alice/port", FilterMode::Source, FilterOperation::Drop)
        .unwrap();
    start_both(&alice, &bob);

    let before = broker.stats().messages_dropped;
    alice.send_message(&ep_a, "bob/port", vec![7u8]).unwrap();
    advance_both(&alice, &bob, 1.0);
    assert_eq!(bob.pending_messages(&ep_b).unwrap(), 0);
    assert_eq!(broker.stats().messages_dropped, before + 1);

    assert!(matches!(
        bob.register_filter("bob/port", FilterMode::Destination, FilterOperation::Drop),
        Err(Error::InvalidStateTransition { .. })
    ));
}
