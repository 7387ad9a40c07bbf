// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interface handles returned by federate registration calls.

use crate::filter::{FilterMode, FilterOperation};
use crate::ids::InterfaceHandle;
use crate::time::Time;
use crate::value::DataType;
use std::fmt;

/// A registered global publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub(crate) handle: InterfaceHandle,
    pub(crate) name: String,
    pub(crate) data_type: DataType,
}

impl Publication {
    pub fn handle(&self) -> InterfaceHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// A subscription to a publication by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub(crate) handle: InterfaceHandle,
    pub(crate) target: String,
}

impl Input {
    pub fn handle(&self) -> InterfaceHandle {
        self.handle
    }

    /// Name of the targeted publication.
    pub fn target(&self) -> &str {
        &self.target
    }
}

/// A registered global message endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub(crate) handle: InterfaceHandle,
    pub(crate) name: String,
}

impl Endpoint {
    pub fn handle(&self) -> InterfaceHandle {
        self.handle
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A filter installed at the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub(crate) handle: InterfaceHandle,
    pub(crate) target: String,
    pub(crate) mode: FilterMode,
    pub(crate) operation: FilterOperation,
}

impl Filter {
    pub fn handle(&self) -> InterfaceHandle {
        self.handle
    }

    /// Name of the filtered endpoint.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn operation(&self) -> &FilterOperation {
        &self.operation
    }
}

/// A message received on an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sending endpoint name.
    pub source: String,
    /// Receiving endpoint name.
    pub destination: String,
    /// Simulated time the message was sent at, including the sender's lookahead.
    pub time: Time,
    pub payload: Vec<u8>,
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} @{} ({} bytes)",
            self.source,
            self.destination,
            self.time,
            self.payload.len()
        )
    }
}
