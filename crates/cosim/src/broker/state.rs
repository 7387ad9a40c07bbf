// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker event processing.
//!
//! A broker runs in one of two modes:
//!
//! ```text
//!            ┌──────────────┐
//!            │  Root broker │  registry + time coordinator
//!            └──────┬───────┘
//!           ┌───────┴────────┐
//!      ┌────┴─────┐     ┌────┴─────┐
//!      │  Relay   │     │  core    │   relay: forwards up/down,
//!      └────┬─────┘     └──────────┘   tracks its own federates
//!        core(s)
//! ```
//!
//! All mutation happens on the broker thread through [`BrokerState::handle`].

use super::query::{
    BrokerQuery, DependencySummary, FederateSummary, PublicationSummary, QueryResult,
};
use super::stats::BrokerStats;
use super::BrokerEvent;
use crate::comms::Comms;
use crate::coordinator::{Grant, TimeCoordinator};
use crate::error::Error;
use crate::federate::Message;
use crate::filter::{FilterMode, FilterOperation, FilterRule, FilterSet};
use crate::ids::{FederateId, InterfaceHandle, RouteId};
use crate::logging::{emit, Logger};
use crate::protocol::{ActionMessage, ErrorCode};
use crate::registry::{InterfaceKind, InterfaceRegistry, InterfaceSpec};
use crate::state::FederateState;
use crate::time::Time;
use crate::value::VALUE_FORMAT_VERSION;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

/// One transport route to a core or a child broker.
struct Route {
    sink: Box<dyn Comms>,
    federates: BTreeSet<FederateId>,
}

/// Route table shared by both modes.
struct Router {
    routes: HashMap<RouteId, Route>,
    stats: Arc<BrokerStats>,
    logger: Logger,
}

impl Router {
    fn send(&self, route: RouteId, msg: ActionMessage) {
        match self.routes.get(&route) {
            Some(r) => {
                let kind = msg.kind();
                if let Err(e) = r.sink.transmit(msg) {
                    self.stats.dropped();
                    emit!(self.logger, Warning, "{} on {} failed: {}", kind, route, e);
                } else {
                    self.stats.routed();
                }
            }
            None => {
                self.stats.dropped();
                emit!(self.logger, Data, "{} for closed {} dropped", msg.kind(), route);
            }
        }
    }

    fn broadcast(&self, msg: &ActionMessage) {
        for route in self.routes.keys() {
            self.send(*route, msg.clone());
        }
    }

    fn close_all(&mut self) {
        for (_, route) in self.routes.drain() {
            route.sink.disconnect();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    ExecRequested,
    Executing,
    Finalized,
}

struct FederateEntry {
    name: String,
    route: RouteId,
    phase: Phase,
}

impl FederateEntry {
    fn summary(&self, id: FederateId) -> FederateSummary {
        FederateSummary {
            id,
            name: self.name.clone(),
            state: match self.phase {
                Phase::Initializing | Phase::ExecRequested => FederateState::Initializing,
                Phase::Executing => FederateState::Executing,
                Phase::Finalized => FederateState::Finalized,
            },
            exec_requested: self.phase != Phase::Initializing,
        }
    }
}

fn live_count(federates: &BTreeMap<FederateId, FederateEntry>) -> usize {
    federates
        .values()
        .filter(|f| f.phase != Phase::Finalized)
        .count()
}

/// Resolved input.
struct Link {
    publication: InterfaceHandle,
    owner: FederateId,
}

/// Authoritative federation state, held by the root broker.
struct Root {
    federates: BTreeMap<FederateId, FederateEntry>,
    next_fed: u32,
    sub_brokers: BTreeSet<String>,
    registry: InterfaceRegistry,
    coordinator: TimeCoordinator,
    links: BTreeMap<InterfaceHandle, Link>,
    subscribers: BTreeMap<InterfaceHandle, BTreeSet<FederateId>>,
    filters: FilterSet,
    exec_granted: bool,
}

/// Forwarding state of a broker with a parent.
struct Relay {
    parent: Box<dyn Comms>,
    pending_federates: HashMap<String, VecDeque<RouteId>>,
    pending_brokers: HashMap<String, VecDeque<RouteId>>,
    /// Federates joined through this broker, with the phase seen in transit.
    federates: BTreeMap<FederateId, FederateEntry>,
}

enum Mode {
    Root(Root),
    Relay(Relay),
}

/// Event-loop state of one broker.
pub(crate) struct BrokerState {
    name: String,
    expected: usize,
    min_brokers: usize,
    router: Router,
    mode: Mode,
    terminated: bool,
}

impl BrokerState {
    pub(crate) fn new(
        name: String,
        expected: usize,
        min_brokers: usize,
        parent: Option<Box<dyn Comms>>,
        stats: Arc<BrokerStats>,
        logger: Logger,
    ) -> Self {
        let mode = match parent {
            Some(parent) => Mode::Relay(Relay {
                parent,
                pending_federates: HashMap::new(),
                pending_brokers: HashMap::new(),
                federates: BTreeMap::new(),
            }),
            None => Mode::Root(Root {
                federates: BTreeMap::new(),
                next_fed: 0,
                sub_brokers: BTreeSet::new(),
                registry: InterfaceRegistry::new(),
                coordinator: TimeCoordinator::new(),
                links: BTreeMap::new(),
                subscribers: BTreeMap::new(),
                filters: FilterSet::new(),
                exec_granted: false,
            }),
        };
        Self {
            name,
            expected,
            min_brokers,
            router: Router {
                routes: HashMap::new(),
                stats,
                logger,
            },
            mode,
            terminated: false,
        }
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// Announce this broker to its parent, if any.
    pub(crate) fn announce(&mut self) {
        if let Mode::Relay(relay) = &self.mode {
            let msg = ActionMessage::RegisterBroker {
                name: self.name.clone(),
            };
            if let Err(e) = relay.parent.transmit(msg) {
                emit!(self.router.logger, Error, "cannot reach parent broker: {}", e);
                self.terminate("parent broker unreachable");
            }
        }
    }

    pub(crate) fn handle(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::RouteOpened { route, sink } => {
                emit!(self.router.logger, Connections, "{} opened", route);
                self.router.routes.insert(
                    route,
                    Route {
                        sink,
                        federates: BTreeSet::new(),
                    },
                );
            }
            BrokerEvent::Message { route, msg } => self.on_child_message(route, msg),
            BrokerEvent::RouteClosed { route } => self.on_route_closed(route),
            BrokerEvent::FromParent(msg) => self.on_parent_message(msg),
            BrokerEvent::ParentLost => {
                emit!(self.router.logger, Warning, "lost connection to parent broker");
                self.terminate("parent broker disconnected");
            }
            BrokerEvent::Query { query, reply } => {
                let _ = reply.send(self.answer(query));
            }
            BrokerEvent::Shutdown => self.terminate("broker shut down"),
        }
    }

    fn on_child_message(&mut self, route: RouteId, msg: ActionMessage) {
        if !self.router.routes.contains_key(&route) {
            emit!(self.router.logger, Data, "{} from unknown {} ignored", msg.kind(), route);
            return;
        }
        match &mut self.mode {
            Mode::Root(root) => root.on_message(&mut self.router, route, msg, self.expected, self.min_brokers),
            Mode::Relay(relay) => relay.on_child_message(&mut self.router, route, msg),
        }
        self.check_termination();
    }

    fn on_parent_message(&mut self, msg: ActionMessage) {
        let Mode::Relay(relay) = &mut self.mode else {
            emit!(self.router.logger, Warning, "root broker got a parent message {}", msg.kind());
            return;
        };
        if let ActionMessage::Disconnect { reason } = &msg {
            emit!(self.router.logger, Summary, "parent broker disconnected: {}", reason);
            let reason = reason.clone();
            self.terminate(&reason);
            return;
        }
        relay.on_parent_message(&mut self.router, &self.name, msg);
    }

    fn on_route_closed(&mut self, route: RouteId) {
        let Some(closed) = self.router.routes.remove(&route) else {
            return;
        };
        emit!(self.router.logger, Connections, "{} closed", route);
        match &mut self.mode {
            Mode::Root(root) => {
                for fed in closed.federates {
                    root.finalize_federate(&mut self.router, fed, self.expected, self.min_brokers);
                }
            }
            Mode::Relay(relay) => {
                for fed in closed.federates {
                    relay.finalize_federate(&self.router, fed);
                }
            }
        }
        self.check_termination();
    }

    /// Disconnect once every expected federate has joined and left.
    fn check_termination(&mut self) {
        if self.terminated {
            return;
        }
        let federates = match &self.mode {
            Mode::Root(root) => &root.federates,
            Mode::Relay(relay) => &relay.federates,
        };
        let (registered, live) = (federates.len(), live_count(federates));
        if registered > 0 && registered >= self.expected && live == 0 {
            emit!(self.router.logger, Summary, "all {} federates finalized", registered);
            self.terminate("federation complete");
        }
    }

    fn terminate(&mut self, reason: &str) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        emit!(self.router.logger, Summary, "disconnecting: {}", reason);
        self.router.broadcast(&ActionMessage::Disconnect {
            reason: reason.to_string(),
        });
        self.router.close_all();
        if let Mode::Relay(relay) = &self.mode {
            relay.parent.disconnect();
        }
    }

    fn answer(&self, query: BrokerQuery) -> QueryResult {
        match &self.mode {
            Mode::Root(root) => root.answer(query, &self.router),
            Mode::Relay(relay) => relay.answer(query, &self.router),
        }
    }
}

impl Root {
    fn is_live(&self, fed: FederateId) -> bool {
        self.federates
            .get(&fed)
            .is_some_and(|f| f.phase != Phase::Finalized)
    }

    fn send_to(&self, router: &Router, fed: FederateId, msg: ActionMessage) {
        match self.federates.get(&fed) {
            Some(entry) if entry.phase != Phase::Finalized => router.send(entry.route, msg),
            _ => router.stats.dropped(),
        }
    }

    fn reject(&self, router: &Router, fed: FederateId, err: &Error) {
        self.send_to(
            router,
            fed,
            ActionMessage::FederateError {
                fed,
                code: ErrorCode::from_error(err),
                message: err.to_string(),
            },
        );
    }

    fn send_grants(&self, router: &Router, grants: Vec<Grant>) {
        for grant in grants {
            emit!(router.logger, Timing, "{} granted {}", grant.federate, grant.time);
            router.stats.granted();
            self.send_to(
                router,
                grant.federate,
                ActionMessage::TimeGrant {
                    fed: grant.federate,
                    time: grant.time,
                },
            );
        }
    }

    fn on_message(
        &mut self,
        router: &mut Router,
        route: RouteId,
        msg: ActionMessage,
        expected: usize,
        min_brokers: usize,
    ) {
        // Everything but registrations must come from a live federate on
        // the route it registered through.
        if let Some(fed) = msg.federate() {
            let owned = self.federates.get(&fed).is_some_and(|f| f.route == route);
            if !owned || !self.is_live(fed) {
                emit!(router.logger, Warning, "{} from {} via {} ignored", msg.kind(), fed, route);
                router.stats.dropped();
                return;
            }
        }

        match msg {
            ActionMessage::RegisterFederate { name, lookahead } => {
                self.register_federate(router, route, name, lookahead)
            }
            ActionMessage::RegisterBroker { name } => {
                if self.sub_brokers.insert(name.clone()) {
                    emit!(router.logger, Connections, "sub-broker '{}' registered", name);
                    router.send(route, ActionMessage::BrokerAck { name });
                    self.try_exec(router, expected, min_brokers);
                } else {
                    router.send(
                        route,
                        ActionMessage::BrokerRejected {
                            message: format!("broker name '{}' already registered", name),
                            name,
                        },
                    );
                }
            }
            ActionMessage::RegisterInterface {
                fed,
                request,
                kind,
                name,
                data_type,
                units,
                target,
            } => {
                let reply = if self.exec_granted {
                    ActionMessage::InterfaceRejected {
                        fed,
                        request,
                        code: ErrorCode::InvalidState,
                        message: "federation is already executing".into(),
                    }
                } else {
                    let spec = InterfaceSpec {
                        kind,
                        name,
                        owner: fed,
                        data_type,
                        units,
                        target,
                    };
                    match self.registry.register(spec) {
                        Ok(handle) => {
                            emit!(router.logger, Interfaces, "{} registered {} {}", fed, kind, handle);
                            ActionMessage::InterfaceAck {
                                fed,
                                request,
                                handle,
                            }
                        }
                        Err(e) => ActionMessage::InterfaceRejected {
                            fed,
                            request,
                            code: ErrorCode::from_error(&e),
                            message: e.to_string(),
                        },
                    }
                };
                self.send_to(router, fed, reply);
            }
            ActionMessage::RegisterFilter {
                fed,
                request,
                name,
                target,
                mode,
                operation,
            } => {
                let reply = match self.register_filter(fed, name, target, mode, operation) {
                    Ok(handle) => {
                        emit!(router.logger, Interfaces, "{} registered filter {}", fed, handle);
                        ActionMessage::InterfaceAck {
                            fed,
                            request,
                            handle,
                        }
                    }
                    Err(e) => ActionMessage::InterfaceRejected {
                        fed,
                        request,
                        code: ErrorCode::from_error(&e),
                        message: e.to_string(),
                    },
                };
                self.send_to(router, fed, reply);
            }
            ActionMessage::ExecRequest { fed } => {
                if let Some(entry) = self.federates.get_mut(&fed) {
                    if entry.phase == Phase::Initializing {
                        entry.phase = Phase::ExecRequested;
                    }
                }
                self.try_exec(router, expected, min_brokers);
            }
            ActionMessage::TimeRequest { fed, time } => {
                if !self.exec_granted {
                    let err = Error::NotReady("time requested before exec grant".into());
                    self.reject(router, fed, &err);
                    return;
                }
                emit!(router.logger, Timing, "{} requests {}", fed, time);
                match self.coordinator.request_time(fed, time) {
                    Ok(grants) => self.send_grants(router, grants),
                    Err(e) => self.reject(router, fed, &e),
                }
            }
            ActionMessage::IterationRequest { fed } => {
                if !self.exec_granted {
                    let err = Error::NotReady("iteration requested before exec grant".into());
                    self.reject(router, fed, &err);
                    return;
                }
                emit!(router.logger, Timing, "{} requests an iteration", fed);
                match self.coordinator.request_iteration(fed) {
                    Ok(grants) => self.send_grants(router, grants),
                    Err(e) => self.reject(router, fed, &e),
                }
            }
            ActionMessage::TimingUpdate { fed, lookahead } => {
                let grants = self.coordinator.set_lookahead(fed, lookahead);
                self.send_grants(router, grants);
            }
            ActionMessage::Publish {
                fed,
                publication,
                time,
                format,
                value,
            } => {
                let check = match self.registry.get(publication) {
                    Some(e) if e.spec.owner != fed || e.spec.kind != InterfaceKind::Publication => {
                        Err(Error::NotFound(format!("publication {} of {}", publication, fed)))
                    }
                    Some(e) if !e.spec.data_type.accepts(value.data_type()) => Err(Error::TypeMismatch {
                        expected: e.spec.data_type,
                        actual: value.data_type(),
                    }),
                    Some(_) if format != VALUE_FORMAT_VERSION => Err(Error::TransportFailure(format!(
                        "unsupported value format {}",
                        format
                    ))),
                    Some(_) => Ok(()),
                    None => Err(Error::NotFound(format!("publication {}", publication))),
                };
                if let Err(e) = check {
                    self.reject(router, fed, &e);
                    return;
                }
                let targets: Vec<FederateId> = self
                    .subscribers
                    .get(&publication)
                    .map(|s| s.iter().copied().collect())
                    .unwrap_or_default();
                emit!(router.logger, Data, "{} {} -> {} subscribers", publication, value, targets.len());
                for sub in &targets {
                    self.send_to(
                        router,
                        *sub,
                        ActionMessage::Deliver {
                            fed: *sub,
                            publication,
                            time,
                            format,
                            value: value.clone(),
                        },
                    );
                }
                router.stats.delivered(targets.len() as u64);
            }
            ActionMessage::SendMessage {
                fed,
                source,
                destination,
                time,
                payload,
            } => {
                let source_name = self
                    .registry
                    .get(source)
                    .filter(|e| e.spec.owner == fed && e.spec.kind == InterfaceKind::Endpoint)
                    .and_then(|e| e.spec.name.clone());
                let Some(source_name) = source_name else {
                    let err = Error::NotFound(format!("endpoint {} of {}", source, fed));
                    self.reject(router, fed, &err);
                    return;
                };
                let message = Message {
                    source: source_name,
                    destination,
                    time,
                    payload,
                };
                let Some(message) = self.filters.route(message) else {
                    emit!(router.logger, Data, "message from {} dropped by filter", source);
                    router.stats.dropped();
                    return;
                };
                let target = self
                    .registry
                    .resolve(InterfaceKind::Endpoint, &message.destination)
                    .ok()
                    .and_then(|h| self.registry.get(h).map(|e| (h, e.spec.owner)));
                match target {
                    Some((endpoint, owner)) if self.is_live(owner) => self.send_to(
                        router,
                        owner,
                        ActionMessage::MessageDelivery {
                            fed: owner,
                            endpoint,
                            source: message.source,
                            time: message.time,
                            payload: message.payload,
                        },
                    ),
                    _ => {
                        emit!(
                            router.logger,
                            Warning,
                            "message to unknown endpoint '{}' dropped",
                            message.destination
                        );
                        router.stats.dropped();
                    }
                }
            }
            ActionMessage::Finalize { fed } => {
                self.finalize_federate(router, fed, expected, min_brokers);
            }
            other => {
                emit!(router.logger, Warning, "unexpected {} from {}", other.kind(), route);
                router.stats.dropped();
            }
        }
    }

    fn register_federate(&mut self, router: &mut Router, route: RouteId, name: String, lookahead: Time) {
        let rejection = if self.exec_granted {
            Some((ErrorCode::InvalidState, "federation is already executing".to_string()))
        } else if name.is_empty() {
            Some((ErrorCode::NotFound, "federate name cannot be empty".to_string()))
        } else if self.federates.values().any(|f| f.name == name) {
            Some((ErrorCode::NameCollision, format!("federate '{}'", name)))
        } else {
            None
        };
        if let Some((code, message)) = rejection {
            emit!(router.logger, Warning, "federate '{}' rejected: {}", name, message);
            router.send(route, ActionMessage::FederateRejected { name, code, message });
            return;
        }

        self.next_fed += 1;
        let fed = FederateId(self.next_fed);
        self.federates.insert(
            fed,
            FederateEntry {
                name: name.clone(),
                route,
                phase: Phase::Initializing,
            },
        );
        if let Some(r) = router.routes.get_mut(&route) {
            r.federates.insert(fed);
        }
        self.coordinator.add_federate(fed, lookahead);
        router.stats.joined();
        emit!(router.logger, Connections, "federate '{}' joined as {}", name, fed);
        router.send(route, ActionMessage::FederateAck { name, fed });
    }

    fn register_filter(
        &mut self,
        fed: FederateId,
        name: Option<String>,
        target: String,
        mode: FilterMode,
        operation: FilterOperation,
    ) -> Result<InterfaceHandle, Error> {
        if self.exec_granted {
            return Err(Error::invalid_state("register_filter", FederateState::Executing));
        }
        operation.validate()?;
        let handle = self
            .registry
            .register(InterfaceSpec::filter(fed, name, target.clone()))?;
        self.filters.insert(
            handle,
            FilterRule {
                owner: fed,
                target,
                mode,
                operation,
            },
        );
        Ok(handle)
    }

    /// Grant execution once the federation is complete and ready.
    fn try_exec(&mut self, router: &Router, expected: usize, min_brokers: usize) {
        if self.exec_granted || self.federates.len() < expected || self.sub_brokers.len() < min_brokers {
            return;
        }
        let live: Vec<FederateId> = self
            .federates
            .iter()
            .filter(|(_, f)| f.phase != Phase::Finalized)
            .map(|(id, _)| *id)
            .collect();
        if live.is_empty() {
            return;
        }
        let ready = live
            .iter()
            .all(|id| self.federates.get(id).is_some_and(|f| f.phase == Phase::ExecRequested));
        if !ready {
            return;
        }
        self.exec_granted = true;
        self.link_interfaces(router);

        for fed in &live {
            self.coordinator.enter_executing(*fed);
            if let Some(entry) = self.federates.get_mut(fed) {
                entry.phase = Phase::Executing;
            }
        }
        emit!(router.logger, Summary, "entering executing mode with {} federates", live.len());
        for fed in live {
            self.send_to(router, fed, ActionMessage::ExecGrant { fed });
        }
    }

    /// Resolve inputs and derive the coordination graph.
    fn link_interfaces(&mut self, router: &Router) {
        let inputs: Vec<(InterfaceHandle, FederateId, Option<String>)> = self
            .registry
            .iter_kind(InterfaceKind::Input)
            .map(|e| (e.handle, e.spec.owner, e.spec.target.clone()))
            .collect();

        for (input, owner, target) in inputs {
            let Some(target) = target else { continue };
            let resolved = self
                .registry
                .resolve(InterfaceKind::Publication, &target)
                .ok()
                .and_then(|h| self.registry.get(h).map(|e| (h, e.spec.owner, e.spec.data_type)));
            let Some((publication, publisher, data_type)) = resolved else {
                emit!(router.logger, Warning, "input {} targets unknown publication '{}'", input, target);
                continue;
            };
            self.registry.add_reference(publication);
            self.links.insert(input, Link { publication, owner });
            self.subscribers.entry(publication).or_default().insert(owner);
            self.coordinator.add_dependency(owner, publisher);
            self.send_to(
                router,
                owner,
                ActionMessage::InputLinked {
                    fed: owner,
                    input,
                    publication,
                    data_type,
                },
            );
        }

        let endpoint_owners: BTreeSet<FederateId> = self
            .registry
            .iter_kind(InterfaceKind::Endpoint)
            .map(|e| e.spec.owner)
            .collect();
        for a in &endpoint_owners {
            for b in &endpoint_owners {
                self.coordinator.add_dependency(*a, *b);
            }
        }
    }

    fn finalize_federate(&mut self, router: &mut Router, fed: FederateId, expected: usize, min_brokers: usize) {
        let Some(entry) = self.federates.get_mut(&fed) else {
            return;
        };
        if entry.phase == Phase::Finalized {
            return;
        }
        entry.phase = Phase::Finalized;
        let route = entry.route;
        emit!(router.logger, Connections, "federate '{}' ({}) finalized", entry.name, fed);
        if let Some(r) = router.routes.get_mut(&route) {
            r.federates.remove(&fed);
        }

        let owned_inputs: Vec<InterfaceHandle> = self
            .links
            .iter()
            .filter(|(_, l)| l.owner == fed)
            .map(|(h, _)| *h)
            .collect();
        for input in owned_inputs {
            if let Some(link) = self.links.remove(&input) {
                self.registry.drop_reference(link.publication);
            }
        }
        for released in self.registry.release_owner(fed) {
            self.subscribers.remove(&released);
        }
        self.filters.remove_owner(fed);
        for subs in self.subscribers.values_mut() {
            subs.remove(&fed);
        }

        let grants = self.coordinator.remove_federate(fed);
        self.send_grants(router, grants);
        router.stats.left();

        if !self.exec_granted {
            self.try_exec(router, expected, min_brokers);
        }
    }

    fn answer(&self, query: BrokerQuery, router: &Router) -> QueryResult {
        match query {
            BrokerQuery::Federates => QueryResult::Federates(
                self.federates.iter().map(|(id, f)| f.summary(*id)).collect(),
            ),
            BrokerQuery::Publications => QueryResult::Publications(
                self.registry
                    .iter_kind(InterfaceKind::Publication)
                    .map(|e| PublicationSummary {
                        handle: e.handle,
                        name: e.spec.name.clone().unwrap_or_default(),
                        owner: e.spec.owner,
                        data_type: e.spec.data_type,
                        units: e.spec.units.clone(),
                        subscribers: self
                            .subscribers
                            .get(&e.handle)
                            .map(|s| s.iter().copied().collect())
                            .unwrap_or_default(),
                    })
                    .collect(),
            ),
            BrokerQuery::Dependencies => QueryResult::Dependencies(
                self.federates
                    .keys()
                    .filter_map(|id| {
                        self.coordinator.record(*id).map(|r| DependencySummary {
                            federate: *id,
                            dependencies: r.dependencies.iter().copied().collect(),
                            dependents: r.dependents.iter().copied().collect(),
                        })
                    })
                    .collect(),
            ),
            BrokerQuery::TimeStatus => QueryResult::TimeStatus(self.coordinator.status()),
            BrokerQuery::StallRoots => QueryResult::StallRoots(self.coordinator.stall_roots()),
            BrokerQuery::Stats => QueryResult::Stats(router.stats.snapshot()),
        }
    }
}

impl Relay {
    fn forward_up(&self, router: &Router, msg: ActionMessage) {
        let kind = msg.kind();
        match self.parent.transmit(msg) {
            Ok(()) => router.stats.routed(),
            Err(e) => {
                router.stats.dropped();
                emit!(router.logger, Warning, "forwarding {} upward failed: {}", kind, e);
            }
        }
    }

    fn on_child_message(&mut self, router: &mut Router, route: RouteId, msg: ActionMessage) {
        if let Some(fed) = msg.federate() {
            let owned = self
                .federates
                .get(&fed)
                .is_some_and(|f| f.route == route && f.phase != Phase::Finalized);
            if !owned {
                emit!(router.logger, Warning, "{} from {} via {} ignored", msg.kind(), fed, route);
                router.stats.dropped();
                return;
            }
        }
        match &msg {
            ActionMessage::RegisterFederate { name, .. } => {
                self.pending_federates.entry(name.clone()).or_default().push_back(route);
            }
            ActionMessage::RegisterBroker { name } => {
                self.pending_brokers.entry(name.clone()).or_default().push_back(route);
            }
            ActionMessage::ExecRequest { fed } => {
                if let Some(entry) = self.federates.get_mut(fed) {
                    if entry.phase == Phase::Initializing {
                        entry.phase = Phase::ExecRequested;
                    }
                }
            }
            ActionMessage::Finalize { fed } => {
                self.mark_finalized(router, *fed);
            }
            _ => {}
        }
        self.forward_up(router, msg);
    }

    fn on_parent_message(&mut self, router: &mut Router, own_name: &str, msg: ActionMessage) {
        match msg {
            ActionMessage::FederateAck { ref name, fed } => {
                let Some(route) = pop_pending(&mut self.pending_federates, name) else {
                    router.stats.dropped();
                    return;
                };
                self.federates.insert(
                    fed,
                    FederateEntry {
                        name: name.clone(),
                        route,
                        phase: Phase::Initializing,
                    },
                );
                if let Some(r) = router.routes.get_mut(&route) {
                    r.federates.insert(fed);
                }
                router.stats.joined();
                emit!(router.logger, Connections, "federate '{}' joined as {}", name, fed);
                router.send(route, msg);
            }
            ActionMessage::FederateRejected { ref name, .. } => {
                if let Some(route) = pop_pending(&mut self.pending_federates, name) {
                    router.send(route, msg);
                }
            }
            ActionMessage::BrokerAck { ref name } | ActionMessage::BrokerRejected { ref name, .. } => {
                if name == own_name {
                    if let ActionMessage::BrokerRejected { message, .. } = &msg {
                        emit!(router.logger, Error, "parent rejected this broker: {}", message);
                    } else {
                        emit!(router.logger, Connections, "registered with parent broker");
                    }
                    return;
                }
                if let Some(route) = pop_pending(&mut self.pending_brokers, name) {
                    router.send(route, msg);
                }
            }
            msg => match msg.federate().and_then(|fed| self.federates.get_mut(&fed)) {
                Some(entry) => {
                    if matches!(msg, ActionMessage::ExecGrant { .. }) && entry.phase != Phase::Finalized {
                        entry.phase = Phase::Executing;
                    }
                    router.send(entry.route, msg)
                }
                None => {
                    emit!(router.logger, Data, "{} for unknown federate dropped", msg.kind());
                    router.stats.dropped();
                }
            },
        }
    }

    /// Move `fed` to `Finalized`; false when it already was.
    fn retire(&mut self, router: &Router, fed: FederateId) -> bool {
        match self.federates.get_mut(&fed) {
            Some(entry) if entry.phase != Phase::Finalized => {
                entry.phase = Phase::Finalized;
                router.stats.left();
                emit!(router.logger, Connections, "federate '{}' ({}) finalized", entry.name, fed);
                true
            }
            _ => false,
        }
    }

    fn mark_finalized(&mut self, router: &mut Router, fed: FederateId) {
        if self.retire(router, fed) {
            if let Some(route) = self.federates.get(&fed).map(|f| f.route) {
                if let Some(r) = router.routes.get_mut(&route) {
                    r.federates.remove(&fed);
                }
            }
        }
    }

    /// A child route vanished without finalizing `fed`.
    fn finalize_federate(&mut self, router: &Router, fed: FederateId) {
        if self.retire(router, fed) {
            self.forward_up(router, ActionMessage::Finalize { fed });
        }
    }

    fn answer(&self, query: BrokerQuery, router: &Router) -> QueryResult {
        match query {
            BrokerQuery::Federates => QueryResult::Federates(
                self.federates.iter().map(|(id, f)| f.summary(*id)).collect(),
            ),
            BrokerQuery::Stats => QueryResult::Stats(router.stats.snapshot()),
            BrokerQuery::Publications => QueryResult::Publications(Vec::new()),
            BrokerQuery::Dependencies => QueryResult::Dependencies(Vec::new()),
            BrokerQuery::TimeStatus => QueryResult::TimeStatus(Vec::new()),
            BrokerQuery::StallRoots => QueryResult::StallRoots(Vec::new()),
        }
    }
}

fn pop_pending(pending: &mut HashMap<String, VecDeque<RouteId>>, name: &str) -> Option<RouteId> {
    let queue = pending.get_mut(name)?;
    let route = queue.pop_front();
    if queue.is_empty() {
        pending.remove(name);
    }
    route
}
