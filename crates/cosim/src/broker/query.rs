// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker diagnostic queries.
//!
//! Queries are answered on the broker thread, so every result is a
//! consistent snapshot of the federation at one point in its message order.

use super::stats::StatsSnapshot;
use crate::coordinator::TimeStatus;
use crate::ids::{FederateId, InterfaceHandle};
use crate::state::FederateState;
use crate::value::DataType;
use serde::{Deserialize, Serialize};

/// What to ask a broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BrokerQuery {
    Federates,
    Publications,
    Dependencies,
    TimeStatus,
    StallRoots,
    Stats,
}

/// One federate known to the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederateSummary {
    pub id: FederateId,
    pub name: String,
    pub state: FederateState,
    pub exec_requested: bool,
}

/// One live publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicationSummary {
    pub handle: InterfaceHandle,
    pub name: String,
    pub owner: FederateId,
    pub data_type: DataType,
    pub units: String,
    pub subscribers: Vec<FederateId>,
}

/// Coordination edges of one federate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencySummary {
    pub federate: FederateId,
    pub dependencies: Vec<FederateId>,
    pub dependents: Vec<FederateId>,
}

/// Answer to a [`BrokerQuery`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "query", content = "result", rename_all = "snake_case")]
pub enum QueryResult {
    Federates(Vec<FederateSummary>),
    Publications(Vec<PublicationSummary>),
    Dependencies(Vec<DependencySummary>),
    TimeStatus(Vec<TimeStatus>),
    StallRoots(Vec<FederateId>),
    Stats(StatsSnapshot),
}

impl QueryResult {
    /// Pretty JSON rendering, as logged by the broker binary.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\":\"{}\"}}", e))
    }
}
