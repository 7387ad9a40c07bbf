// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Message filters.
//!
//! A filter is bound to an endpoint name and runs at the root broker on every
//! message crossing that endpoint:
//!
//! ```text
//! sender ──> source filters(source) ──> destination filters(destination) ──> receiver
//! ```
//!
//! Filters run in registration order within each stage. A drop ends the
//! chain. A source-stage reroute picks which endpoint's destination filters
//! run; a destination-stage reroute does not restart the stage.

use crate::config::ConfigError;
use crate::error::{Error, Result};
use crate::federate::Message;
use crate::ids::{FederateId, InterfaceHandle};
use crate::time::Time;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Which side of the endpoint a filter watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterMode {
    /// Messages sent from the endpoint.
    Source,
    /// Messages addressed to the endpoint.
    Destination,
}

/// What a filter does to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOperation {
    /// Push the message's time tag later.
    Delay { delay: Time },
    /// Discard the message.
    Drop,
    /// Deliver to another endpoint instead.
    Reroute { destination: String },
}

impl FilterOperation {
    pub fn validate(&self) -> Result<()> {
        match self {
            FilterOperation::Delay { delay } if *delay < Time::ZERO => Err(Error::Config(
                ConfigError::Invalid(format!("filter delay cannot be negative, got {}", delay)),
            )),
            FilterOperation::Reroute { destination } if destination.is_empty() => Err(
                Error::Config(ConfigError::Invalid("reroute destination cannot be empty".into())),
            ),
            _ => Ok(()),
        }
    }

    /// Transform `message`; `None` when it is dropped.
    pub fn apply(&self, mut message: Message) -> Option<Message> {
        match self {
            FilterOperation::Delay { delay } => {
                message.time = message.time + *delay;
                Some(message)
            }
            FilterOperation::Drop => None,
            FilterOperation::Reroute { destination } => {
                message.destination = destination.clone();
                Some(message)
            }
        }
    }
}

impl fmt::Display for FilterOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOperation::Delay { delay } => write!(f, "delay {}", delay),
            FilterOperation::Drop => f.write_str("drop"),
            FilterOperation::Reroute { destination } => write!(f, "reroute to '{}'", destination),
        }
    }
}

/// A filter installed at the root broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub owner: FederateId,
    /// Endpoint name the filter is bound to.
    pub target: String,
    pub mode: FilterMode,
    pub operation: FilterOperation,
}

/// Installed filters keyed by handle, so iteration is registration order.
#[derive(Debug, Default)]
pub struct FilterSet {
    rules: BTreeMap<InterfaceHandle, FilterRule>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, handle: InterfaceHandle, rule: FilterRule) {
        self.rules.insert(handle, rule);
    }

    /// Uninstall every filter of `owner`; returns how many went away.
    pub fn remove_owner(&mut self, owner: FederateId) -> usize {
        let before = self.rules.len();
        self.rules.retain(|_, r| r.owner != owner);
        before - self.rules.len()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the source then destination stage; `None` when a filter dropped it.
    pub fn route(&self, mut message: Message) -> Option<Message> {
        let source = message.source.clone();
        for rule in self.stage(FilterMode::Source, &source) {
            message = rule.operation.apply(message)?;
        }
        let destination = message.destination.clone();
        for rule in self.stage(FilterMode::Destination, &destination) {
            message = rule.operation.apply(message)?;
        }
        Some(message)
    }

    fn stage<'a>(&'a self, mode: FilterMode, endpoint: &'a str) -> impl Iterator<Item = &'a FilterRule> {
        self.rules
            .values()
            .filter(move |r| r.mode == mode && r.target == endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(source: &str, destination: &str) -> Message {
        Message {
            source: source.into(),
            destination: destination.into(),
            time: Time::from_secs_f64(1.0),
            payload: vec![1, 2],
        }
    }

    fn rule(target: &str, mode: FilterMode, operation: FilterOperation) -> FilterRule {
        FilterRule {
            owner: FederateId(1),
            target: target.into(),
            mode,
            operation,
        }
    }

    #[test]
    fn test_no_filters_passes_through() {
        let set = FilterSet::new();
        assert_eq!(set.route(message("a", "b")), Some(message("a", "b")));
    }

    #[test]
    fn test_source_delay_then_destination_drop() {
        let mut set = FilterSet::new();
        let delay = FilterOperation::Delay {
            delay: Time::from_secs_f64(0.5),
        };
        set.insert(InterfaceHandle(1), rule("a", FilterMode::Source, delay));
        let routed = set.route(message("a", "b")).unwrap();
        assert_eq!(routed.time, Time::from_secs_f64(1.5));

        set.insert(InterfaceHandle(2), rule("b", FilterMode::Destination, FilterOperation::Drop));
        assert!(set.route(message("a", "b")).is_none());
        assert!(set.route(message("c", "d")).is_some());
    }

    #[test]
    fn test_source_reroute_selects_destination_stage() {
        let mut set = FilterSet::new();
        let reroute = FilterOperation::Reroute {
            destination: "c".into(),
        };
        set.insert(InterfaceHandle(1), rule("a", FilterMode::Source, reroute));
        set.insert(InterfaceHandle(2), rule("b", FilterMode::Destination, FilterOperation::Drop));
        let routed = set.route(message("a", "b")).unwrap();
        assert_eq!(routed.destination, "c");
    }

    #[test]
    fn test_remove_owner() {
        let mut set = FilterSet::new();
        set.insert(InterfaceHandle(1), rule("a", FilterMode::Source, FilterOperation::Drop));
        set.insert(
            InterfaceHandle(2),
            FilterRule {
                owner: FederateId(2),
                ..rule("b", FilterMode::Source, FilterOperation::Drop)
            },
        );
        assert_eq!(set.remove_owner(FederateId(1)), 1);
        assert_eq!(set.len(), 1);
        assert!(set.route(message("a", "x")).is_some());
    }

    #[test]
    fn test_invalid_operations() {
        assert!(FilterOperation::Delay {
            delay: Time::from_nanos(-1)
        }
        .validate()
        .is_err());
        assert!(FilterOperation::Reroute {
            destination: String::new()
        }
        .validate()
        .is_err());
        assert!(FilterOperation::Drop.validate().is_ok());
    }
}
