// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Mutable state of one federate and the handling of broker messages.
//!
//! The core never blocks. Waiting threads pull messages from the inbox and
//! hand them to [`FederateCore::apply`] one at a time, in arrival order.

use super::interfaces::Message;
use crate::config::FederateInfo;
use crate::coordinator::TimeProperties;
use crate::error::{Error, Result};
use crate::ids::{FederateId, InterfaceHandle};
use crate::logging::{emit, Logger};
use crate::protocol::ActionMessage;
use crate::state::{FederateState, StateMachine};
use crate::time::Time;
use crate::value::{DataType, Value, VALUE_FORMAT_VERSION};
use crate::value_store::ValueStore;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// Outstanding blocking operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    Exec,
    Time(Time),
    /// Re-grant of the current time.
    Iteration,
}

pub(crate) struct PublicationSlot {
    pub(crate) name: String,
    pub(crate) data_type: DataType,
}

pub(crate) struct InputSlot {
    pub(crate) target: String,
    pub(crate) default: Option<Value>,
    pub(crate) publication: Option<InterfaceHandle>,
    pub(crate) data_type: Option<DataType>,
    pub(crate) updated: bool,
}

pub(crate) struct EndpointSlot {
    pub(crate) name: String,
    pub(crate) queue: VecDeque<Message>,
}

impl EndpointSlot {
    /// Index of the first message visible at `granted`.
    fn first_ready(&self, granted: Time) -> Option<usize> {
        self.queue.iter().position(|m| m.time <= granted)
    }

    pub(crate) fn pop_ready(&mut self, granted: Time) -> Option<Message> {
        let idx = self.first_ready(granted)?;
        self.queue.remove(idx)
    }

    pub(crate) fn ready_count(&self, granted: Time) -> usize {
        self.queue.iter().filter(|m| m.time <= granted).count()
    }
}

pub(crate) struct FederateCore {
    pub(crate) id: FederateId,
    pub(crate) machine: StateMachine,
    pub(crate) info: FederateInfo,
    pub(crate) props: TimeProperties,
    pub(crate) logger: Logger,
    pub(crate) granted: Time,
    /// Lowest tag outputs may carry after a lookahead decrease.
    pub(crate) output_floor: Time,
    /// Iterations granted at the current time.
    pub(crate) iterations: u32,
    /// Last grant made new input values visible.
    pub(crate) inputs_changed: bool,
    pub(crate) pending: Option<Pending>,
    pub(crate) completed: Option<Result<Time>>,
    pub(crate) fault: Option<String>,
    pub(crate) publications: BTreeMap<InterfaceHandle, PublicationSlot>,
    pub(crate) inputs: BTreeMap<InterfaceHandle, InputSlot>,
    pub(crate) endpoints: BTreeMap<InterfaceHandle, EndpointSlot>,
    pub(crate) values: ValueStore,
    pub(crate) replies: HashMap<u64, Result<InterfaceHandle>>,
    next_request: u64,
}

impl FederateCore {
    pub(crate) fn new(id: FederateId, info: FederateInfo, logger: Logger) -> Self {
        Self {
            id,
            machine: StateMachine::new(),
            props: info.time_properties(),
            info,
            logger,
            granted: Time::ZERO,
            output_floor: Time::ZERO,
            iterations: 0,
            inputs_changed: false,
            pending: None,
            completed: None,
            fault: None,
            publications: BTreeMap::new(),
            inputs: BTreeMap::new(),
            endpoints: BTreeMap::new(),
            values: ValueStore::default(),
            replies: HashMap::new(),
            next_request: 0,
        }
    }

    pub(crate) fn state(&self) -> FederateState {
        self.machine.state()
    }

    pub(crate) fn next_request(&mut self) -> u64 {
        self.next_request += 1;
        self.next_request
    }

    /// Time tag for outputs sent now.
    pub(crate) fn output_time(&self) -> Time {
        (self.granted + self.props.lookahead).max(self.output_floor)
    }

    /// Keep the tags already promised to dependents before the lookahead
    /// changes. Only binding once the federation executes.
    pub(crate) fn hold_output_floor(&mut self) {
        if self.state() != FederateState::Executing {
            return;
        }
        let base = match self.pending {
            Some(Pending::Time(requested)) => requested,
            _ => self.granted,
        };
        self.output_floor = self.output_floor.max(base + self.props.lookahead);
    }

    /// True when a blocked waiter has something to return.
    pub(crate) fn settled(&self) -> bool {
        self.completed.is_some() || self.pending.is_none() || self.state().is_terminal()
    }

    /// Error to report for a transport failure, keeping the first cause.
    pub(crate) fn transport_error(&self) -> Error {
        Error::TransportFailure(
            self.fault
                .clone()
                .unwrap_or_else(|| "federate lost its broker".to_string()),
        )
    }

    /// Move to `Error` and fail any outstanding operation.
    pub(crate) fn fail(&mut self, reason: String) {
        if !self.machine.fail() {
            return;
        }
        emit!(self.logger, Error, "{}", reason);
        self.fault = Some(reason);
        if self.pending.take().is_some() {
            self.completed = Some(Err(self.transport_error()));
        }
    }

    /// Apply one message from the broker.
    pub(crate) fn apply(&mut self, msg: ActionMessage) {
        if let Some(fed) = msg.federate() {
            if fed != self.id {
                emit!(self.logger, Warning, "{} addressed to {} ignored", msg.kind(), fed);
                return;
            }
        }
        match msg {
            ActionMessage::InterfaceAck { request, handle, .. } => {
                self.replies.insert(request, Ok(handle));
            }
            ActionMessage::InterfaceRejected {
                request, code, message, ..
            } => {
                self.replies.insert(request, Err(code.into_error(message)));
            }
            ActionMessage::InputLinked {
                input,
                publication,
                data_type,
                ..
            } => match self.inputs.get_mut(&input) {
                Some(slot) => {
                    emit!(self.logger, Interfaces, "input {} -> '{}' ({})", input, slot.target, publication);
                    slot.publication = Some(publication);
                    slot.data_type = Some(data_type);
                    self.values.track(publication);
                }
                None => emit!(self.logger, Warning, "link for unknown input {}", input),
            },
            ActionMessage::ExecGrant { .. } => self.on_exec_grant(),
            ActionMessage::TimeGrant { time, .. } => self.on_time_grant(time),
            ActionMessage::Deliver {
                publication,
                time,
                format,
                value,
                ..
            } => {
                if format != VALUE_FORMAT_VERSION {
                    emit!(self.logger, Warning, "value format {} from {} dropped", format, publication);
                    return;
                }
                emit!(self.logger, Data, "staged {} = {} @{}", publication, value, time);
                self.values.stage(publication, time, value);
            }
            ActionMessage::MessageDelivery {
                endpoint,
                source,
                time,
                payload,
                ..
            } => match self.endpoints.get_mut(&endpoint) {
                Some(slot) => {
                    let message = Message {
                        source,
                        destination: slot.name.clone(),
                        time,
                        payload,
                    };
                    emit!(self.logger, Data, "received {}", message);
                    slot.queue.push_back(message);
                }
                None => emit!(self.logger, Warning, "message for unknown endpoint {}", endpoint),
            },
            ActionMessage::FederateError { code, message, .. } => {
                let err = code.into_error(message);
                if err.is_fatal() {
                    self.fail(err.to_string());
                } else if self.pending.take().is_some() {
                    emit!(self.logger, Warning, "broker rejected request: {}", err);
                    self.completed = Some(Err(err));
                } else {
                    emit!(self.logger, Warning, "broker reported: {}", err);
                }
            }
            ActionMessage::Disconnect { reason } => {
                if !self.state().is_terminal() {
                    self.fail(format!("broker disconnected: {}", reason));
                }
            }
            ActionMessage::Cancel => {}
            other => {
                emit!(self.logger, Warning, "unexpected {} from broker", other.kind());
            }
        }
    }

    fn on_exec_grant(&mut self) {
        if let Err(e) = self.machine.executing() {
            emit!(self.logger, Warning, "exec grant ignored: {}", e);
            return;
        }
        emit!(self.logger, Summary, "entered executing mode");
        self.granted = Time::ZERO;
        self.commit_values();
        if self.pending == Some(Pending::Exec) {
            self.pending = None;
            self.completed = Some(Ok(Time::ZERO));
        }
    }

    fn on_time_grant(&mut self, time: Time) {
        if time < self.granted {
            self.fail(format!("time grant {} regresses behind {}", time, self.granted));
            return;
        }
        emit!(self.logger, Timing, "granted {}", time);
        if time > self.granted {
            self.iterations = 0;
        }
        self.granted = time;
        self.commit_values();
        match self.pending {
            Some(Pending::Time(requested)) => {
                if time < requested {
                    emit!(self.logger, Warning, "granted {} below request {}", time, requested);
                }
                self.pending = None;
                self.completed = Some(Ok(time));
            }
            Some(Pending::Iteration) => {
                self.iterations += 1;
                self.pending = None;
                self.completed = Some(Ok(time));
            }
            _ => {}
        }
    }

    /// Make staged values at or before the granted time visible.
    fn commit_values(&mut self) {
        let changed = self.values.commit(self.granted);
        self.inputs_changed = !changed.is_empty();
        if changed.is_empty() {
            return;
        }
        for slot in self.inputs.values_mut() {
            if slot.publication.is_some_and(|p| changed.contains(&p)) {
                slot.updated = true;
            }
        }
    }

    /// Value an input reads right now: the committed value, else the
    /// default, else the zero value of the linked type.
    pub(crate) fn input_value(&self, input: InterfaceHandle) -> Result<Value> {
        let slot = self
            .inputs
            .get(&input)
            .ok_or_else(|| Error::NotFound(format!("input {}", input)))?;
        if let Some(current) = slot.publication.and_then(|p| self.values.current(p)) {
            return Ok(current.value.clone());
        }
        Ok(slot
            .default
            .clone()
            .unwrap_or_else(|| slot.data_type.unwrap_or(DataType::Any).zero_value()))
    }
}
