// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Co-simulation coordination engine.
//!
//! Independently running simulations ("federates") advance simulated time in
//! lockstep under a broker while exchanging typed values over
//! publish/subscribe channels and raw messages between endpoints.
//!
//! # Features
//!
//! - **Time coordination**: conservative grants from requests, lookahead and
//!   the dependency graph, with stall diagnostics
//! - **Value exchange**: typed, versioned values visible exactly at grant time
//! - **Endpoints**: timestamped messages routed by endpoint name
//! - **Filters**: delay, drop or reroute messages at the broker
//! - **Iteration**: re-grant the current time until coupled values converge
//! - **Transports**: in-process channels or length-prefixed JSON over TCP
//! - **Broker hierarchies**: sub-brokers relay to a root broker
//!
//! # Quick Start
//!
//! ```ignore
//! use cosim::{CoreType, DataType, FederateInfo, Library};
//!
//! let lib = Library::open();
//! let broker = lib.create_broker(CoreType::Inproc, "main", "-f 1")?;
//! let fed = lib.create_federate("fed1", &FederateInfo::new("core1"))?;
//! let voltage = fed.register_global_publication("voltage", DataType::Double, "V")?;
//! let input = fed.register_subscription("voltage", "V")?;
//! fed.enter_executing_mode()?;
//! fed.publish(&voltage, 2.0)?;
//! fed.request_time(1.0)?;
//! assert_eq!(fed.get::<f64>(&input)?, 2.0);
//! fed.finalize()?;
//! broker.wait_for_disconnect(None);
//! ```

pub mod broker;
pub mod comms;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod federate;
pub mod filter;
pub mod ids;
pub mod library;
pub mod logging;
pub mod protocol;
pub mod registry;
pub mod state;
pub mod time;
pub mod value;
pub mod value_store;

pub use broker::{Broker, BrokerQuery, QueryResult, StatsSnapshot};
pub use config::{BrokerArgs, ConfigError, CoreArgs, CoreType, FederateInfo, Property};
pub use coordinator::{TimeCoordinator, TimeProperties, TimeStatus};
pub use error::{Error, Result};
pub use federate::{
    Endpoint, Federate, Filter, Input, IterationRequest, IterationResult, IterationTime, Message,
    Publication,
};
pub use filter::{FilterMode, FilterOperation};
pub use ids::{FederateId, InterfaceHandle};
pub use library::Library;
pub use logging::LogLevel;
pub use state::FederateState;
pub use time::Time;
pub use value::{Complex, DataType, NamedPoint, Value, ValueType};
pub use value_store::TimedValue;

/// Version of this crate.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
