// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::float_cmp)] // Test assertions with constants
#![allow(clippy::missing_panics_doc)] // Tests panic on failure

//! Federation over the TCP transport on loopback.

use cosim::{CoreType, DataType, Error, FederateInfo, Library, Time};
use std::net::TcpListener;
use std::time::Duration;

fn tcp_info(address: &str) -> FederateInfo {
    FederateInfo::new("core")
        .with_core_type(CoreType::Tcp)
        .with_core_init_string(format!("--broker_address={}", address))
        .with_grant_timeout(Duration::from_secs(10))
}

#[test]
fn test_two_federates_over_tcp() {
    let lib = Library::open();
    let broker = lib
        .create_broker(CoreType::Tcp, "net", "-f 2 --interface=127.0.0.1 --port=0")
        .unwrap();
    let address = broker.address().unwrap().to_string();

    let producer = lib.create_federate("producer", &tcp_info(&address)).unwrap();
    let consumer = lib.create_federate("consumer", &tcp_info(&address)).unwrap();
    let load = producer
        .register_global_publication("load", DataType::Vector, "MW")
        .unwrap();
    let input = consumer.register_subscription("load", "MW").unwrap();

    producer.enter_executing_mode_async().unwrap();
    consumer.enter_executing_mode_async().unwrap();
    producer.enter_executing_mode_complete().unwrap();
    consumer.enter_executing_mode_complete().unwrap();

    producer.publish(&load, vec![1.0, 2.5]).unwrap();
    assert_eq!(producer.request_time(3.0).unwrap(), Time::from_secs_f64(3.0));
    assert_eq!(consumer.request_time(1.0).unwrap(), Time::from_secs_f64(1.0));
    assert_eq!(consumer.get::<Vec<f64>>(&input).unwrap(), vec![1.0, 2.5]);

    producer.finalize().unwrap();
    consumer.finalize().unwrap();
    assert!(broker.wait_for_disconnect(Some(Duration::from_secs(5))));
}

#[test]
fn test_unreachable_broker_is_transport_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let lib = Library::open();
    let info = tcp_info(&address).with_core_init_string(format!("--broker_address={} --timeout=200", address));
    let err = lib.create_federate("lonely", &info).unwrap_err();
    assert!(matches!(err, Error::TransportFailure(_)));
}

#[test]
fn test_broker_loss_fails_tcp_federate() {
    let lib = Library::open();
    let broker = lib
        .create_broker(CoreType::Tcp, "net", "-f 2 --interface=127.0.0.1 --port=0")
        .unwrap();
    let address = broker.address().unwrap().to_string();
    let fed = lib.create_federate("fed", &tcp_info(&address)).unwrap();

    broker.disconnect();
    assert!(matches!(
        fed.enter_executing_mode(),
        Err(Error::TransportFailure(_))
    ));
}
