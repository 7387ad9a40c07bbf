// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Federation wire protocol.
//!
//! Every interaction between a federate's core and its broker is an
//! [`ActionMessage`]. In-process transports move the enum directly; TCP
//! carries it as length-prefixed JSON.
//!
//! Wire format:
//! ```text
//! +----------------+-------------------+
//! | Length (4B BE) | JSON payload      |
//! +----------------+-------------------+
//! ```
//!
//! Messages flowing *up* (core to broker) carry the sending federate's id
//! once it has one. Messages flowing *down* carry the addressed federate's
//! id, except registration replies which are matched by name because the
//! federate has no id yet.

use crate::error::Error;
use crate::filter::{FilterMode, FilterOperation};
use crate::ids::{FederateId, InterfaceHandle};
use crate::registry::InterfaceKind;
use crate::time::Time;
use crate::value::{DataType, Value};
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Default upper bound on a single frame (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Error categories carried by rejection messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NameCollision,
    NotFound,
    TypeMismatch,
    InvalidTimeRequest,
    InvalidState,
    NotReady,
    Protocol,
}

impl ErrorCode {
    /// Build the caller-facing error for a rejection.
    pub fn into_error(self, message: String) -> Error {
        match self {
            ErrorCode::NameCollision => Error::NameCollision(message),
            ErrorCode::NotFound => Error::NotFound(message),
            ErrorCode::NotReady | ErrorCode::InvalidState => Error::NotReady(message),
            ErrorCode::TypeMismatch
            | ErrorCode::InvalidTimeRequest
            | ErrorCode::Protocol => Error::TransportFailure(message),
        }
    }

    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::NameCollision(_) => ErrorCode::NameCollision,
            Error::NotFound(_) => ErrorCode::NotFound,
            Error::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Error::InvalidTimeRequest { .. } => ErrorCode::InvalidTimeRequest,
            Error::InvalidStateTransition { .. } => ErrorCode::InvalidState,
            Error::NotReady(_) => ErrorCode::NotReady,
            _ => ErrorCode::Protocol,
        }
    }
}

/// Federation protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionMessage {
    // ---- core -> broker ----
    /// A federate asks to join.
    RegisterFederate { name: String, lookahead: Time },

    /// A sub-broker announces itself to its parent.
    RegisterBroker { name: String },

    /// Interface registration; answered by `InterfaceAck`/`InterfaceRejected`.
    RegisterInterface {
        fed: FederateId,
        request: u64,
        kind: InterfaceKind,
        name: Option<String>,
        data_type: DataType,
        units: String,
        target: Option<String>,
    },

    /// Filter on the endpoint named `target`; answered like `RegisterInterface`.
    RegisterFilter {
        fed: FederateId,
        request: u64,
        name: Option<String>,
        target: String,
        mode: FilterMode,
        operation: FilterOperation,
    },

    /// Federate is ready to execute.
    ExecRequest { fed: FederateId },

    /// Federate requests to advance to `time`.
    TimeRequest { fed: FederateId, time: Time },

    /// Federate asks to be granted its current time again.
    IterationRequest { fed: FederateId },

    /// Federate changed its lookahead.
    TimingUpdate { fed: FederateId, lookahead: Time },

    /// Value published on `publication`, tagged with simulated `time`.
    Publish {
        fed: FederateId,
        publication: InterfaceHandle,
        time: Time,
        format: u16,
        value: Value,
    },

    /// Message sent from endpoint `source` to the endpoint named `destination`.
    SendMessage {
        fed: FederateId,
        source: InterfaceHandle,
        destination: String,
        time: Time,
        payload: Vec<u8>,
    },

    /// Federate leaves the federation.
    Finalize { fed: FederateId },

    // ---- broker -> core ----
    FederateAck { name: String, fed: FederateId },

    FederateRejected {
        name: String,
        code: ErrorCode,
        message: String,
    },

    BrokerAck { name: String },

    BrokerRejected { name: String, message: String },

    InterfaceAck {
        fed: FederateId,
        request: u64,
        handle: InterfaceHandle,
    },

    InterfaceRejected {
        fed: FederateId,
        request: u64,
        code: ErrorCode,
        message: String,
    },

    /// Input `input` of `fed` resolved to `publication`.
    InputLinked {
        fed: FederateId,
        input: InterfaceHandle,
        publication: InterfaceHandle,
        data_type: DataType,
    },

    /// Federation entered executing mode.
    ExecGrant { fed: FederateId },

    TimeGrant { fed: FederateId, time: Time },

    /// A value for one of `fed`'s subscriptions.
    Deliver {
        fed: FederateId,
        publication: InterfaceHandle,
        time: Time,
        format: u16,
        value: Value,
    },

    /// A message for endpoint `endpoint` owned by `fed`.
    MessageDelivery {
        fed: FederateId,
        endpoint: InterfaceHandle,
        source: String,
        time: Time,
        payload: Vec<u8>,
    },

    /// Protocol violation attributed to `fed`.
    FederateError {
        fed: FederateId,
        code: ErrorCode,
        message: String,
    },

    /// The broker is going away.
    Disconnect { reason: String },

    /// Local wake-up for a thread blocked on its federate's inbox. Never sent
    /// over a transport.
    Cancel,
}

impl ActionMessage {
    /// Sending federate of an upward message or addressee of a downward one.
    pub fn federate(&self) -> Option<FederateId> {
        match self {
            ActionMessage::RegisterInterface { fed, .. }
            | ActionMessage::RegisterFilter { fed, .. }
            | ActionMessage::ExecRequest { fed }
            | ActionMessage::TimeRequest { fed, .. }
            | ActionMessage::IterationRequest { fed }
            | ActionMessage::TimingUpdate { fed, .. }
            | ActionMessage::Publish { fed, .. }
            | ActionMessage::SendMessage { fed, .. }
            | ActionMessage::Finalize { fed }
            | ActionMessage::FederateAck { fed, .. }
            | ActionMessage::InterfaceAck { fed, .. }
            | ActionMessage::InterfaceRejected { fed, .. }
            | ActionMessage::InputLinked { fed, .. }
            | ActionMessage::ExecGrant { fed }
            | ActionMessage::TimeGrant { fed, .. }
            | ActionMessage::Deliver { fed, .. }
            | ActionMessage::MessageDelivery { fed, .. }
            | ActionMessage::FederateError { fed, .. } => Some(*fed),
            ActionMessage::RegisterFederate { .. }
            | ActionMessage::RegisterBroker { .. }
            | ActionMessage::FederateRejected { .. }
            | ActionMessage::BrokerAck { .. }
            | ActionMessage::BrokerRejected { .. }
            | ActionMessage::Disconnect { .. }
            | ActionMessage::Cancel => None,
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ActionMessage::RegisterFederate { .. } => "register_federate",
            ActionMessage::RegisterBroker { .. } => "register_broker",
            ActionMessage::RegisterInterface { .. } => "register_interface",
            ActionMessage::RegisterFilter { .. } => "register_filter",
            ActionMessage::ExecRequest { .. } => "exec_request",
            ActionMessage::TimeRequest { .. } => "time_request",
            ActionMessage::IterationRequest { .. } => "iteration_request",
            ActionMessage::TimingUpdate { .. } => "timing_update",
            ActionMessage::Publish { .. } => "publish",
            ActionMessage::SendMessage { .. } => "send_message",
            ActionMessage::Finalize { .. } => "finalize",
            ActionMessage::FederateAck { .. } => "federate_ack",
            ActionMessage::FederateRejected { .. } => "federate_rejected",
            ActionMessage::BrokerAck { .. } => "broker_ack",
            ActionMessage::BrokerRejected { .. } => "broker_rejected",
            ActionMessage::InterfaceAck { .. } => "interface_ack",
            ActionMessage::InterfaceRejected { .. } => "interface_rejected",
            ActionMessage::InputLinked { .. } => "input_linked",
            ActionMessage::ExecGrant { .. } => "exec_grant",
            ActionMessage::TimeGrant { .. } => "time_grant",
            ActionMessage::Deliver { .. } => "deliver",
            ActionMessage::MessageDelivery { .. } => "message_delivery",
            ActionMessage::FederateError { .. } => "federate_error",
            ActionMessage::Disconnect { .. } => "disconnect",
            ActionMessage::Cancel => "cancel",
        }
    }
}

/// Encode one message as a length-prefixed frame.
pub fn encode_frame(msg: &ActionMessage, max_size: usize) -> io::Result<Vec<u8>> {
    let json = serde_json::to_vec(msg).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if json.len() > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit {}", json.len(), max_size),
        ));
    }
    let len = u32::try_from(json.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "frame length overflow"))?;
    let mut frame = Vec::with_capacity(4 + json.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&json);
    Ok(frame)
}

/// Write one frame.
pub fn write_frame<W: Write>(writer: &mut W, msg: &ActionMessage, max_size: usize) -> io::Result<()> {
    let frame = encode_frame(msg, max_size)?;
    writer.write_all(&frame)?;
    writer.flush()
}

/// Read one frame. Returns `Ok(None)` on a clean end of stream.
pub fn read_frame<R: Read>(reader: &mut R, max_size: usize) -> io::Result<Option<ActionMessage>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "empty frame"));
    }
    if len > max_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit {}", len, max_size),
        ));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload)?;
    serde_json::from_slice(&payload)
        .map(Some)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
