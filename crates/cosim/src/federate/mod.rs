// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Federates: simulation participants joined to a broker.
//!
//! A [`Federate`] owns one transport route to its broker and an inbox fed by
//! that route. Blocking calls (`enter_executing_mode`, `request_time`) send a
//! request and then drain the inbox until the matching grant arrives; no
//! thread polls.
//!
//! ```text
//!  caller ──request──> Comms ──> broker
//!    ^                               │
//!    └── apply <── inbox <── grant ──┘
//! ```
//!
//! All methods take `&self`, so a federate can be shared between threads:
//! `finalize` from one thread wakes another blocked on a grant.
//!
//! Outputs are tagged `granted + lookahead`. While a time request is
//! outstanding the granted time is stale, so publishing and sending are
//! refused until the grant arrives.

mod interfaces;
mod runtime;

pub use interfaces::{Endpoint, Filter, Input, Message, Publication};

use self::runtime::{EndpointSlot, FederateCore, InputSlot, Pending, PublicationSlot};
use crate::broker::Broker;
use crate::comms::{tcp, Comms, InboxSink, RetryConfig, TcpConnection};
use crate::config::{CoreArgs, FederateInfo, Property};
use crate::error::{Error, Result};
use crate::filter::{FilterMode, FilterOperation};
use crate::ids::{FederateId, InterfaceHandle};
use crate::logging::{emit, Logger};
use crate::protocol::{ActionMessage, DEFAULT_MAX_FRAME_SIZE};
use crate::registry::InterfaceKind;
use crate::state::{FederateState, Operation};
use crate::time::Time;
use crate::value::{DataType, Value, ValueType, VALUE_FORMAT_VERSION};
use crate::value_store::TimedValue;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Registration handshake bound when the init string sets no `--timeout`.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Whether a time request may re-grant the current time first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationRequest {
    /// Advance normally.
    NoIteration,
    /// Iterate at the current time regardless of input changes.
    ForceIteration,
    /// Iterate only while new input values keep arriving.
    IterateIfNeeded,
}

/// Outcome of an iterative request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationResult {
    /// Time advanced.
    NextStep,
    /// Re-granted the current time.
    Iterating,
    /// Granted the end of time; nothing left to simulate.
    Halted,
}

/// Grant returned by [`Federate::request_time_iterative`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationTime {
    pub granted: Time,
    pub state: IterationResult,
}

/// How a new federate reaches its broker.
pub(crate) enum Attachment {
    Inproc(Broker),
    Tcp { address: String, retry: RetryConfig },
}

/// A simulation participant.
pub struct Federate {
    name: String,
    id: FederateId,
    comms: Box<dyn Comms>,
    inbox: Receiver<ActionMessage>,
    self_tx: Sender<ActionMessage>,
    library_open: Arc<AtomicBool>,
    grant_timeout: Option<Duration>,
    /// Serializes inbox consumers so messages apply in arrival order.
    pump: Mutex<()>,
    core: Mutex<FederateCore>,
    /// Keeps an in-process broker alive as long as its federates.
    _broker: Option<Broker>,
}

impl fmt::Debug for Federate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Federate")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("state", &self.core.lock().state())
            .finish()
    }
}

impl Federate {
    /// Join the federation served by `attachment`.
    pub(crate) fn connect(
        name: &str,
        info: &FederateInfo,
        args: &CoreArgs,
        attachment: Attachment,
        library_open: Arc<AtomicBool>,
    ) -> Result<Federate> {
        let mut info = info.clone();
        if let Some(level) = args.log_level {
            info.log_level = level;
        }
        let logger = Logger::new(format!("federate {}", name), info.log_level);
        let (tx, rx) = channel::unbounded();

        let (comms, broker): (Box<dyn Comms>, Option<Broker>) = match attachment {
            Attachment::Inproc(broker) => {
                let link = broker.connect(Box::new(InboxSink::new(tx.clone())))?;
                (Box::new(link), Some(broker))
            }
            Attachment::Tcp { address, retry } => {
                (Box::new(connect_tcp(name, &address, &retry, &tx)?), None)
            }
        };

        comms.transmit(ActionMessage::RegisterFederate {
            name: name.to_string(),
            lookahead: info.lookahead,
        })?;
        let timeout = args.connect_timeout().unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        let id = handshake(&rx, name, Instant::now() + timeout)?;

        emit!(logger, Connections, "joined as {}", id);
        let grant_timeout = info.grant_timeout;
        let mut core = FederateCore::new(id, info, logger);
        core.machine.initialized()?;

        Ok(Federate {
            name: name.to_string(),
            id,
            comms,
            inbox: rx,
            self_tx: tx,
            library_open,
            grant_timeout,
            pump: Mutex::new(()),
            core: Mutex::new(core),
            _broker: broker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Id assigned by the root broker.
    pub fn id(&self) -> FederateId {
        self.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> FederateState {
        self.drain();
        self.core.lock().state()
    }

    /// Last granted time.
    pub fn granted_time(&self) -> Time {
        self.core.lock().granted
    }

    // ---- registration ----

    /// Claim a federation-wide publication name.
    pub fn register_global_publication(
        &self,
        name: &str,
        data_type: DataType,
        units: &str,
    ) -> Result<Publication> {
        let handle = self.register(
            InterfaceKind::Publication,
            Some(name.to_string()),
            data_type,
            units,
            None,
        )?;
        self.core.lock().publications.insert(
            handle,
            PublicationSlot {
                name: name.to_string(),
                data_type,
            },
        );
        Ok(Publication {
            handle,
            name: name.to_string(),
            data_type,
        })
    }

    /// Subscribe to the publication named `target`. The target need not
    /// exist yet; unresolved inputs read their default.
    pub fn register_subscription(&self, target: &str, units: &str) -> Result<Input> {
        let handle = self.register(
            InterfaceKind::Input,
            None,
            DataType::Any,
            units,
            Some(target.to_string()),
        )?;
        self.core.lock().inputs.insert(
            handle,
            InputSlot {
                target: target.to_string(),
                default: None,
                publication: None,
                data_type: None,
                updated: false,
            },
        );
        Ok(Input {
            handle,
            target: target.to_string(),
        })
    }

    /// Claim a federation-wide endpoint name.
    pub fn register_global_endpoint(&self, name: &str) -> Result<Endpoint> {
        let handle = self.register(
            InterfaceKind::Endpoint,
            Some(name.to_string()),
            DataType::Raw,
            "",
            None,
        )?;
        self.core.lock().endpoints.insert(
            handle,
            EndpointSlot {
                name: name.to_string(),
                queue: VecDeque::new(),
            },
        );
        Ok(Endpoint {
            handle,
            name: name.to_string(),
        })
    }

    /// Install a filter on the endpoint named `target`. The endpoint need not
    /// exist yet; the filter applies from the first message that crosses it.
    pub fn register_filter(
        &self,
        target: &str,
        mode: FilterMode,
        operation: FilterOperation,
    ) -> Result<Filter> {
        operation.validate()?;
        let fed = self.id;
        let msg_operation = operation.clone();
        let handle = self.register_with(InterfaceKind::Filter, |request| ActionMessage::RegisterFilter {
            fed,
            request,
            name: None,
            target: target.to_string(),
            mode,
            operation: msg_operation,
        })?;
        Ok(Filter {
            handle,
            target: target.to_string(),
            mode,
            operation,
        })
    }

    fn register(
        &self,
        kind: InterfaceKind,
        name: Option<String>,
        data_type: DataType,
        units: &str,
        target: Option<String>,
    ) -> Result<InterfaceHandle> {
        let fed = self.id;
        self.register_with(kind, |request| ActionMessage::RegisterInterface {
            fed,
            request,
            kind,
            name,
            data_type,
            units: units.to_string(),
            target,
        })
    }

    /// Send the registration `build` makes and wait for the broker's answer.
    fn register_with(
        &self,
        kind: InterfaceKind,
        build: impl FnOnce(u64) -> ActionMessage,
    ) -> Result<InterfaceHandle> {
        self.check_open()?;
        let request = {
            let mut core = self.core.lock();
            core.machine.check(Operation::RegisterInterface)?;
            let request = core.next_request();
            self.transmit(&mut core, build(request))?;
            request
        };

        let timeout = self.grant_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT);
        self.wait_until(Some(Instant::now() + timeout), |c| {
            c.replies.contains_key(&request) || c.state().is_terminal()
        });

        let mut core = self.core.lock();
        match core.replies.remove(&request) {
            Some(Ok(handle)) => {
                emit!(core.logger, Interfaces, "registered {} {}", kind, handle);
                Ok(handle)
            }
            Some(Err(e)) => Err(e),
            None => match core.state() {
                FederateState::Error => Err(core.transport_error()),
                state if state.is_terminal() => {
                    Err(Error::invalid_state(Operation::RegisterInterface.name(), state))
                }
                _ => Err(Error::NotReady(format!(
                    "broker did not confirm {} registration within {:?}",
                    kind, timeout
                ))),
            },
        }
    }

    // ---- execution and time ----

    /// Block until the broker grants entry into executing mode.
    pub fn enter_executing_mode(&self) -> Result<()> {
        self.enter_executing_mode_async()?;
        self.enter_executing_mode_complete()
    }

    /// Announce readiness without blocking.
    pub fn enter_executing_mode_async(&self) -> Result<()> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::EnterExecutingMode)?;
        if core.pending.is_some() || core.completed.is_some() {
            return Err(Error::invalid_state("enter_executing_mode_async", core.state()));
        }
        self.transmit(&mut core, ActionMessage::ExecRequest { fed: self.id })?;
        core.pending = Some(Pending::Exec);
        emit!(core.logger, Summary, "requested executing mode");
        Ok(())
    }

    /// Wait for the exec grant requested by [`Self::enter_executing_mode_async`].
    pub fn enter_executing_mode_complete(&self) -> Result<()> {
        self.check_open()?;
        self.complete(Operation::EnterExecutingMode).map(|_| ())
    }

    /// Block until the broker grants a time `>= time`; returns the grant.
    pub fn request_time(&self, time: impl Into<Time>) -> Result<Time> {
        self.request_time_async(time)?;
        self.request_time_complete()
    }

    /// Send a time request without blocking.
    pub fn request_time_async(&self, time: impl Into<Time>) -> Result<()> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::RequestTime)?;
        if core.pending.is_some() || core.completed.is_some() {
            return Err(Error::invalid_state("request_time_async", core.state()));
        }
        let requested = core.props.effective_request(core.granted, time.into())?;
        self.transmit(
            &mut core,
            ActionMessage::TimeRequest {
                fed: self.id,
                time: requested,
            },
        )?;
        emit!(core.logger, Timing, "requested {}", requested);
        core.pending = Some(Pending::Time(requested));
        Ok(())
    }

    /// Wait for the grant requested by [`Self::request_time_async`].
    pub fn request_time_complete(&self) -> Result<Time> {
        self.check_open()?;
        self.complete(Operation::RequestTime)
    }

    /// Request `time`, optionally re-granting the current time first.
    ///
    /// An iteration is granted once every upstream federate either moved past
    /// the current time or iterates too. After `max_iterations` rounds at one
    /// time the request advances regardless.
    pub fn request_time_iterative(
        &self,
        time: impl Into<Time>,
        iterate: IterationRequest,
    ) -> Result<IterationTime> {
        let time = time.into();
        if let Some(granted) = self.iterate(iterate)? {
            return Ok(IterationTime {
                granted,
                state: IterationResult::Iterating,
            });
        }
        let granted = self.request_time(time)?;
        let state = if granted.is_max() {
            IterationResult::Halted
        } else {
            IterationResult::NextStep
        };
        Ok(IterationTime { granted, state })
    }

    /// Enter executing mode, then iterate at time zero as requested.
    ///
    /// May be called again while it returns `Iterating`.
    pub fn enter_executing_mode_iterative(&self, iterate: IterationRequest) -> Result<IterationResult> {
        self.check_open()?;
        let (state, granted) = {
            let core = self.core.lock();
            (core.state(), core.granted)
        };
        match state {
            FederateState::Initializing => self.enter_executing_mode()?,
            FederateState::Executing if granted == Time::ZERO => {}
            state => {
                return Err(Error::invalid_state("enter_executing_mode_iterative", state));
            }
        }
        Ok(match self.iterate(iterate)? {
            Some(_) => IterationResult::Iterating,
            None => IterationResult::NextStep,
        })
    }

    /// One iteration round at the granted time. `None` when none was due or
    /// nothing changed and the caller should advance.
    fn iterate(&self, iterate: IterationRequest) -> Result<Option<Time>> {
        self.check_open()?;
        {
            let mut core = self.core.lock();
            core.machine.check(Operation::RequestTime)?;
            let due = iterate != IterationRequest::NoIteration
                && core.iterations < core.info.max_iterations;
            if !due {
                return Ok(None);
            }
            if core.pending.is_some() || core.completed.is_some() {
                return Err(Error::invalid_state("request_time_iterative", core.state()));
            }
            self.transmit(&mut core, ActionMessage::IterationRequest { fed: self.id })?;
            emit!(core.logger, Timing, "requested iteration {} at {}", core.iterations + 1, core.granted);
            core.pending = Some(Pending::Iteration);
        }
        let granted = self.complete(Operation::RequestTime)?;
        let changed = self.core.lock().inputs_changed;
        Ok((iterate == IterationRequest::ForceIteration || changed).then_some(granted))
    }

    /// True once an async exec or time request can be completed without blocking.
    pub fn is_async_operation_completed(&self) -> bool {
        self.drain();
        self.core.lock().completed.is_some()
    }

    fn complete(&self, op: Operation) -> Result<Time> {
        let deadline = self.grant_timeout.map(|t| Instant::now() + t);
        let settled = self.wait_until(deadline, FederateCore::settled);

        let mut core = self.core.lock();
        if let Some(result) = core.completed.take() {
            return result;
        }
        match core.state() {
            FederateState::Error => Err(core.transport_error()),
            state if !settled && !state.is_terminal() => Err(Error::NotReady(format!(
                "no grant for {} within {:?}",
                op.name(),
                self.grant_timeout.unwrap_or_default()
            ))),
            state => Err(Error::invalid_state(op.name(), state)),
        }
    }

    // ---- values ----

    /// Publish `value`, tagged with the granted time plus lookahead.
    pub fn publish(&self, publication: &Publication, value: impl Into<Value>) -> Result<()> {
        self.check_open()?;
        let value = value.into();
        let mut core = self.core.lock();
        core.machine.check(Operation::Publish)?;
        if core.pending.is_some() {
            return Err(Error::invalid_state("publish while a time request is pending", core.state()));
        }
        let slot = core
            .publications
            .get(&publication.handle)
            .ok_or_else(|| Error::NotFound(format!("publication '{}'", publication.name)))?;
        if !slot.data_type.accepts(value.data_type()) {
            return Err(Error::TypeMismatch {
                expected: slot.data_type,
                actual: value.data_type(),
            });
        }
        let time = core.output_time();
        emit!(core.logger, Data, "publish {} = {} @{}", slot.name, value, time);
        self.transmit(
            &mut core,
            ActionMessage::Publish {
                fed: self.id,
                publication: publication.handle,
                time,
                format: VALUE_FORMAT_VERSION,
                value,
            },
        )
    }

    /// Most recent value visible at the granted time, or the input's default.
    pub fn get_value(&self, input: &Input) -> Result<Value> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::ReadValue)?;
        let value = core.input_value(input.handle)?;
        if let Some(slot) = core.inputs.get_mut(&input.handle) {
            slot.updated = false;
        }
        Ok(value)
    }

    /// Typed read; fails with `TypeMismatch` when the value carries another tag.
    pub fn get<T: ValueType>(&self, input: &Input) -> Result<T> {
        self.get_value(input)?.get::<T>()
    }

    /// Value returned while the input has nothing newer.
    pub fn set_default(&self, input: &Input, value: impl Into<Value>) -> Result<()> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::SetDefault)?;
        let slot = core
            .inputs
            .get_mut(&input.handle)
            .ok_or_else(|| Error::NotFound(format!("input {}", input.handle)))?;
        slot.default = Some(value.into());
        Ok(())
    }

    /// True when a new value became visible since the last read.
    pub fn is_updated(&self, input: &Input) -> Result<bool> {
        self.read_input(input, |_, slot| slot.updated)
    }

    /// Time tag of the visible value, `None` before the first one.
    pub fn last_update_time(&self, input: &Input) -> Result<Option<Time>> {
        self.read_input(input, |core, slot| {
            slot.publication.and_then(|p| core.values.last_update_time(p))
        })
    }

    /// Visible values of the input's publication, oldest first.
    pub fn value_history(&self, input: &Input) -> Result<Vec<TimedValue>> {
        self.read_input(input, |core, slot| {
            slot.publication
                .map(|p| core.values.history(p))
                .unwrap_or_default()
        })
    }

    /// Declared type of the publication an input resolved to.
    pub fn input_type(&self, input: &Input) -> Result<Option<DataType>> {
        self.read_input(input, |_, slot| slot.data_type)
    }

    fn read_input<T>(&self, input: &Input, f: impl FnOnce(&FederateCore, &InputSlot) -> T) -> Result<T> {
        self.check_open()?;
        let core = self.core.lock();
        core.machine.check(Operation::ReadValue)?;
        let slot = core
            .inputs
            .get(&input.handle)
            .ok_or_else(|| Error::NotFound(format!("input {}", input.handle)))?;
        Ok(f(&*core, slot))
    }

    // ---- messages ----

    /// Send `payload` to the endpoint named `destination`.
    pub fn send_message(
        &self,
        endpoint: &Endpoint,
        destination: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<()> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::SendMessage)?;
        if core.pending.is_some() {
            return Err(Error::invalid_state(
                "send_message while a time request is pending",
                core.state(),
            ));
        }
        if !core.endpoints.contains_key(&endpoint.handle) {
            return Err(Error::NotFound(format!("endpoint '{}'", endpoint.name)));
        }
        let time = core.output_time();
        emit!(core.logger, Data, "message {} -> {} @{}", endpoint.name, destination, time);
        self.transmit(
            &mut core,
            ActionMessage::SendMessage {
                fed: self.id,
                source: endpoint.handle,
                destination: destination.to_string(),
                time,
                payload: payload.into(),
            },
        )
    }

    /// Next message on `endpoint` due at the granted time, in arrival order.
    pub fn receive_message(&self, endpoint: &Endpoint) -> Result<Option<Message>> {
        self.with_endpoint(endpoint, |slot, granted| slot.pop_ready(granted))
    }

    /// Number of messages [`Self::receive_message`] would return now.
    pub fn pending_messages(&self, endpoint: &Endpoint) -> Result<usize> {
        self.with_endpoint(endpoint, |slot, granted| slot.ready_count(granted))
    }

    fn with_endpoint<T>(&self, endpoint: &Endpoint, f: impl FnOnce(&mut EndpointSlot, Time) -> T) -> Result<T> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::ReceiveMessage)?;
        let granted = core.granted;
        let slot = core
            .endpoints
            .get_mut(&endpoint.handle)
            .ok_or_else(|| Error::NotFound(format!("endpoint '{}'", endpoint.name)))?;
        Ok(f(slot, granted))
    }

    // ---- properties and teardown ----

    /// Change a time or logging property. Lookahead changes reach the broker.
    ///
    /// Lowering the lookahead while executing takes effect once the federate
    /// has advanced past the outputs it already allowed dependents to skip.
    pub fn set_property(&self, property: Property) -> Result<()> {
        self.check_open()?;
        let mut core = self.core.lock();
        core.machine.check(Operation::SetProperty)?;
        let mut updated = core.info.clone();
        updated.apply(property)?;
        if matches!(property, Property::Lookahead(_)) {
            core.hold_output_floor();
        }
        core.info = updated;
        core.props = core.info.time_properties();
        match property {
            Property::LogLevel(level) => core.logger.set_level(level),
            Property::Lookahead(lookahead) => {
                self.transmit(
                    &mut core,
                    ActionMessage::TimingUpdate {
                        fed: self.id,
                        lookahead,
                    },
                )?;
            }
            _ => {}
        }
        emit!(core.logger, Summary, "property {:?} set", property);
        Ok(())
    }

    /// Leave the federation. Wakes any thread blocked on this federate.
    pub fn finalize(&self) -> Result<()> {
        self.check_open()?;
        self.finalize_inner()
    }

    fn finalize_inner(&self) -> Result<()> {
        let mut core = self.core.lock();
        core.machine.finalize()?;
        if let Err(e) = self.comms.transmit(ActionMessage::Finalize { fed: self.id }) {
            emit!(core.logger, Warning, "finalize not delivered: {}", e);
        }
        core.pending = None;
        core.completed = None;
        emit!(core.logger, Summary, "finalized at {}", core.granted);
        drop(core);

        self.comms.disconnect();
        let _ = self.self_tx.send(ActionMessage::Cancel);
        Ok(())
    }

    // ---- internals ----

    fn check_open(&self) -> Result<()> {
        if self.library_open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::LibraryClosed)
        }
    }

    /// Send upward; a failed send moves the federate to `Error`.
    fn transmit(&self, core: &mut FederateCore, msg: ActionMessage) -> Result<()> {
        match self.comms.transmit(msg) {
            Ok(()) => Ok(()),
            Err(e) => {
                core.fail(e.to_string());
                Err(core.transport_error())
            }
        }
    }

    /// Apply inbox messages until `done` holds. Returns false on timeout.
    fn wait_until(&self, deadline: Option<Instant>, done: impl Fn(&FederateCore) -> bool) -> bool {
        let _pump = self.pump.lock();
        loop {
            if done(&*self.core.lock()) {
                return true;
            }
            let next = match deadline {
                Some(deadline) => self.inbox.recv_deadline(deadline),
                None => self.inbox.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };
            match next {
                Ok(msg) => self.core.lock().apply(msg),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => {
                    self.core.lock().fail("federate inbox closed".into());
                    return true;
                }
            }
        }
    }

    /// Apply whatever is queued, unless another thread is already waiting.
    fn drain(&self) {
        let Some(_pump) = self.pump.try_lock() else {
            return;
        };
        while let Ok(msg) = self.inbox.try_recv() {
            self.core.lock().apply(msg);
        }
    }
}

impl Drop for Federate {
    fn drop(&mut self) {
        let state = self.core.lock().state();
        if matches!(state, FederateState::Initializing | FederateState::Executing) {
            let _ = self.finalize_inner();
        } else {
            self.comms.disconnect();
        }
    }
}

/// Wait for the broker's answer to `RegisterFederate`.
fn handshake(inbox: &Receiver<ActionMessage>, name: &str, deadline: Instant) -> Result<FederateId> {
    loop {
        let msg = inbox.recv_deadline(deadline).map_err(|e| match e {
            RecvTimeoutError::Timeout => {
                Error::NotReady(format!("broker did not acknowledge federate '{}'", name))
            }
            RecvTimeoutError::Disconnected => Error::TransportFailure("inbox closed".into()),
        })?;
        match msg {
            ActionMessage::FederateAck { name: n, fed } if n == name => return Ok(fed),
            ActionMessage::FederateRejected {
                name: n,
                code,
                message,
            } if n == name => return Err(code.into_error(message)),
            ActionMessage::Disconnect { reason } => {
                return Err(Error::TransportFailure(format!("broker disconnected: {}", reason)))
            }
            other => log::debug!("[federate] {} ignored during registration", other.kind()),
        }
    }
}

fn connect_tcp(
    name: &str,
    address: &str,
    retry: &RetryConfig,
    inbox: &Sender<ActionMessage>,
) -> Result<TcpConnection> {
    let stream = tcp::connect(address, retry)?;
    let reader = stream
        .try_clone()
        .map_err(|e| Error::TransportFailure(format!("clone socket: {}", e)))?;
    let conn = TcpConnection::new(stream, DEFAULT_MAX_FRAME_SIZE)
        .map_err(|e| Error::TransportFailure(format!("socket setup: {}", e)))?;

    let msg_inbox = inbox.clone();
    let close_inbox = inbox.clone();
    tcp::spawn_reader(
        format!("cosim-fed-{}", name),
        reader,
        DEFAULT_MAX_FRAME_SIZE,
        move |msg| msg_inbox.send(msg).is_ok(),
        move || {
            let _ = close_inbox.send(ActionMessage::Disconnect {
                reason: "connection closed".into(),
            });
        },
    )
    .map_err(|e| Error::TransportFailure(format!("spawn reader: {}", e)))?;
    Ok(conn)
}
