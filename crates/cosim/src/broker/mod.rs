// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Federation broker.
//!
//! A [`Broker`] is a handle to a dedicated event-loop thread. Transports feed
//! [`BrokerEvent`]s into the loop; only the loop thread touches the
//! coordination graph.
//!
//! ```text
//!  InprocLink ─┐
//!  TcpAcceptor ├──> events ──> [broker thread: BrokerState::handle] ──> route sinks
//!  parent link ┘
//! ```

mod query;
mod state;
mod stats;

pub use query::{BrokerQuery, DependencySummary, FederateSummary, PublicationSummary, QueryResult};
pub use stats::{BrokerStats, StatsSnapshot};

use crate::comms::tcp::{self, TcpAcceptor, TcpConnection};
use crate::comms::{ChildBrokerSink, Comms, InprocLink, RetryConfig, RouteAllocator};
use crate::config::{BrokerArgs, CoreType};
use crate::error::{Error, Result};
use crate::ids::RouteId;
use crate::logging::{emit, Logger};
use crate::protocol::{ActionMessage, DEFAULT_MAX_FRAME_SIZE};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use state::BrokerState;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on waiting for a broker to answer a query.
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on waiting for the event loop to stop.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Input of a broker event loop.
pub(crate) enum BrokerEvent {
    RouteOpened {
        route: RouteId,
        sink: Box<dyn Comms>,
    },
    Message {
        route: RouteId,
        msg: ActionMessage,
    },
    RouteClosed {
        route: RouteId,
    },
    FromParent(ActionMessage),
    ParentLost,
    Query {
        query: BrokerQuery,
        reply: Sender<QueryResult>,
    },
    Shutdown,
}

impl fmt::Debug for BrokerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerEvent::RouteOpened { route, .. } => write!(f, "RouteOpened({})", route),
            BrokerEvent::Message { route, msg } => write!(f, "Message({}, {})", route, msg.kind()),
            BrokerEvent::RouteClosed { route } => write!(f, "RouteClosed({})", route),
            BrokerEvent::FromParent(msg) => write!(f, "FromParent({})", msg.kind()),
            BrokerEvent::ParentLost => f.write_str("ParentLost"),
            BrokerEvent::Query { query, .. } => write!(f, "Query({:?})", query),
            BrokerEvent::Shutdown => f.write_str("Shutdown"),
        }
    }
}

/// Where a new broker attaches.
pub(crate) enum Upstream {
    /// Root broker.
    None,
    /// Child of an in-process broker.
    Inproc(Broker),
    /// Child of a broker reachable over TCP.
    Tcp(String),
}

/// Connection status shared between the handle and the loop thread.
struct Lifeline {
    connected: AtomicBool,
    done: Mutex<bool>,
    cv: Condvar,
    acceptor: Mutex<Option<TcpAcceptor>>,
}

impl Lifeline {
    fn finish(&self) {
        self.connected.store(false, Ordering::Release);
        if let Some(mut acceptor) = self.acceptor.lock().take() {
            acceptor.stop();
        }
        let mut done = self.done.lock();
        *done = true;
        self.cv.notify_all();
    }
}

struct BrokerInner {
    name: String,
    core_type: CoreType,
    events: Sender<BrokerEvent>,
    routes: Arc<RouteAllocator>,
    stats: Arc<BrokerStats>,
    address: Option<SocketAddr>,
    lifeline: Arc<Lifeline>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BrokerInner {
    fn shutdown(&self) {
        let _ = self.events.send(BrokerEvent::Shutdown);
        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for BrokerInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to a running broker. Cheap to clone.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl fmt::Debug for Broker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broker")
            .field("name", &self.inner.name)
            .field("core_type", &self.inner.core_type)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Broker {
    /// Start a broker thread.
    pub(crate) fn spawn(
        name: String,
        core_type: CoreType,
        args: &BrokerArgs,
        upstream: Upstream,
    ) -> Result<Broker> {
        let transport = core_type.resolve()?;
        let (events_tx, events_rx) = channel::unbounded();
        let routes = Arc::new(RouteAllocator::new());
        let stats = Arc::new(BrokerStats::new());
        let logger = Logger::new(format!("broker {}", name), args.log_level);

        let acceptor = match transport {
            CoreType::Tcp => Some(TcpAcceptor::bind(
                &format!("{}:{}", args.interface, args.port),
                events_tx.clone(),
                routes.clone(),
                DEFAULT_MAX_FRAME_SIZE,
            )?),
            _ => None,
        };
        let address = acceptor.as_ref().map(TcpAcceptor::local_addr);

        let parent: Option<Box<dyn Comms>> = match upstream {
            Upstream::None => None,
            Upstream::Inproc(parent) => {
                let sink = ChildBrokerSink::new(events_tx.clone());
                Some(Box::new(parent.connect(Box::new(sink))?))
            }
            Upstream::Tcp(addr) => Some(Box::new(connect_parent_tcp(&name, &addr, &events_tx)?)),
        };

        let mut state = BrokerState::new(
            name.clone(),
            args.federates,
            args.min_brokers,
            parent,
            stats.clone(),
            logger.clone(),
        );
        state.announce();

        let lifeline = Arc::new(Lifeline {
            connected: AtomicBool::new(!state.is_terminated()),
            done: Mutex::new(false),
            cv: Condvar::new(),
            acceptor: Mutex::new(acceptor),
        });

        let loop_lifeline = lifeline.clone();
        let handle = thread::Builder::new()
            .name(format!("cosim-broker-{}", name))
            .spawn(move || run_loop(state, events_rx, loop_lifeline))
            .map_err(|e| Error::TransportFailure(format!("spawn broker thread: {}", e)))?;

        emit!(
            logger,
            Summary,
            "started ({}, expecting {} federates{})",
            transport,
            args.federates,
            address.map(|a| format!(", listening on {}", a)).unwrap_or_default()
        );

        Ok(Broker {
            inner: Arc::new(BrokerInner {
                name,
                core_type: transport,
                events: events_tx,
                routes,
                stats,
                address,
                lifeline,
                thread: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Transport this broker serves.
    pub fn core_type(&self) -> CoreType {
        self.inner.core_type
    }

    /// Listening address of a TCP broker.
    pub fn address(&self) -> Option<SocketAddr> {
        self.inner.address
    }

    /// False once the broker disconnected from the federation.
    pub fn is_connected(&self) -> bool {
        self.inner.lifeline.connected.load(Ordering::Acquire)
    }

    /// Block until the broker disconnects. Returns false on timeout.
    pub fn wait_for_disconnect(&self, timeout: Option<Duration>) -> bool {
        let lifeline = &self.inner.lifeline;
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut done = lifeline.done.lock();
        while !*done {
            match deadline {
                Some(deadline) => {
                    if lifeline.cv.wait_until(&mut done, deadline).timed_out() {
                        return *done;
                    }
                }
                None => lifeline.cv.wait(&mut done),
            }
        }
        true
    }

    /// Force the broker to disconnect every route and stop.
    pub fn disconnect(&self) {
        let _ = self.inner.events.send(BrokerEvent::Shutdown);
        self.wait_for_disconnect(Some(SHUTDOWN_TIMEOUT));
    }

    /// Run a diagnostic query on the broker thread.
    pub fn query(&self, query: BrokerQuery) -> Result<QueryResult> {
        if !self.is_connected() {
            if query == BrokerQuery::Stats {
                return Ok(QueryResult::Stats(self.stats()));
            }
            return Err(Error::TransportFailure(format!("broker '{}' is disconnected", self.name())));
        }
        let (tx, rx) = channel::bounded(1);
        self.inner
            .events
            .send(BrokerEvent::Query { query, reply: tx })
            .map_err(|_| Error::TransportFailure("broker event loop has stopped".into()))?;
        rx.recv_timeout(QUERY_TIMEOUT)
            .map_err(|_| Error::TransportFailure(format!("broker '{}' did not answer", self.name())))
    }

    /// Current counters; available after disconnect as well.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Open an in-process route whose downward traffic goes to `sink`.
    pub(crate) fn connect(&self, sink: Box<dyn Comms>) -> Result<InprocLink> {
        if !self.is_connected() {
            return Err(Error::TransportFailure(format!("broker '{}' is disconnected", self.name())));
        }
        let route = self.inner.routes.allocate();
        self.inner
            .events
            .send(BrokerEvent::RouteOpened { route, sink })
            .map_err(|_| Error::TransportFailure("broker event loop has stopped".into()))?;
        Ok(InprocLink::new(route, self.inner.events.clone()))
    }
}

fn connect_parent_tcp(name: &str, addr: &str, events: &Sender<BrokerEvent>) -> Result<TcpConnection> {
    let stream = tcp::connect(addr, &RetryConfig::default())?;
    let reader = stream
        .try_clone()
        .map_err(|e| Error::TransportFailure(format!("clone socket: {}", e)))?;
    let conn = TcpConnection::new(stream, DEFAULT_MAX_FRAME_SIZE)
        .map_err(|e| Error::TransportFailure(format!("socket setup: {}", e)))?;

    let msg_events = events.clone();
    let close_events = events.clone();
    tcp::spawn_reader(
        format!("cosim-broker-{}-parent", name),
        reader,
        DEFAULT_MAX_FRAME_SIZE,
        move |msg| msg_events.send(BrokerEvent::FromParent(msg)).is_ok(),
        move || {
            let _ = close_events.send(BrokerEvent::ParentLost);
        },
    )
    .map_err(|e| Error::TransportFailure(format!("spawn reader: {}", e)))?;
    Ok(conn)
}

fn run_loop(mut state: BrokerState, events: Receiver<BrokerEvent>, lifeline: Arc<Lifeline>) {
    while !state.is_terminated() {
        match events.recv() {
            Ok(event) => state.handle(event),
            Err(_) => break,
        }
    }
    lifeline.finish();
}

/// Start a broker named `name`, attaching it to the parent named in `args`.
///
/// `lookup` resolves in-process parent names.
pub(crate) fn create(
    core_type: CoreType,
    name: String,
    args: &BrokerArgs,
    lookup: impl Fn(&str) -> Option<Broker>,
) -> Result<Broker> {
    let upstream = match (&args.broker, &args.broker_address) {
        (Some(parent), _) if core_type.resolve()? == CoreType::Inproc => {
            let parent = lookup(parent)
                .ok_or_else(|| Error::NotFound(format!("parent broker '{}'", parent)))?;
            Upstream::Inproc(parent)
        }
        (_, Some(addr)) => Upstream::Tcp(addr.clone()),
        (Some(parent), None) => Upstream::Tcp(parent.clone()),
        (None, None) => Upstream::None,
    };
    Broker::spawn(name, core_type, args, upstream)
}
