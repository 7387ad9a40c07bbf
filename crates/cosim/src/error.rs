// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error taxonomy shared by every federation entry point.

use crate::config::ConfigError;
use crate::state::FederateState;
use crate::time::Time;
use crate::value::DataType;
use thiserror::Error;

/// Errors returned by federation operations.
///
/// A failed operation never leaves a partial mutation behind: a rejected
/// registration reserves nothing, a rejected time request leaves the pending
/// state untouched.
#[derive(Debug, Error)]
pub enum Error {
    /// Operation is not legal in the federate's current state.
    #[error("{operation} is not allowed in state {state}")]
    InvalidStateTransition {
        operation: &'static str,
        state: FederateState,
    },

    /// Name already claimed in the federation namespace.
    #[error("name collision: {0}")]
    NameCollision(String),

    /// Lookup against an unknown name or handle.
    #[error("not found: {0}")]
    NotFound(String),

    /// Value type disagreement between writer and reader.
    #[error("type mismatch: expected {expected}, found {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },

    /// Requested time regresses behind the last grant.
    #[error("invalid time request: requested {requested} but already granted {granted}")]
    InvalidTimeRequest { requested: Time, granted: Time },

    /// Broker or peer unreachable, or the peer violated the protocol.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// The library context was closed.
    #[error("library closed")]
    LibraryClosed,

    /// The broker did not confirm federation readiness in time.
    #[error("federation not ready: {0}")]
    NotReady(String),

    /// Invalid configuration or init string.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Shorthand for [`Error::InvalidStateTransition`].
    pub(crate) fn invalid_state(operation: &'static str, state: FederateState) -> Self {
        Self::InvalidStateTransition { operation, state }
    }

    /// True for errors that drive a federate into the `Error` state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::TransportFailure(_))
    }
}

/// Convenient alias for results using the crate [`Error`].
pub type Result<T> = core::result::Result<T, Error>;
