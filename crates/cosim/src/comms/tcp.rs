// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport.
//!
//! One socket per route, carrying length-prefixed JSON frames (see
//! [`crate::protocol`]). Each socket gets a dedicated reader thread; writes
//! go through a mutex so frames from different threads never interleave.
//!
//! The broker side runs a [`TcpAcceptor`] whose thread turns each accepted
//! socket into a `RouteOpened` event followed by `Message` events and a final
//! `RouteClosed`.

use super::{Comms, RetryConfig, RouteAllocator};
use crate::broker::BrokerEvent;
use crate::error::{Error, Result};
use crate::protocol::{read_frame, write_frame, ActionMessage};
use crossbeam::channel::Sender;
use parking_lot::Mutex;
use std::io::{self, BufReader};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Accept loop poll interval while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// Per-attempt connect timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Writing half of a framed socket.
pub struct TcpConnection {
    stream: Mutex<TcpStream>,
    peer: SocketAddr,
    max_frame: usize,
    open: AtomicBool,
}

impl TcpConnection {
    pub fn new(stream: TcpStream, max_frame: usize) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream: Mutex::new(stream),
            peer,
            max_frame,
            open: AtomicBool::new(true),
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl Comms for TcpConnection {
    fn transmit(&self, msg: ActionMessage) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::TransportFailure(format!("connection to {} closed", self.peer)));
        }
        let mut stream = self.stream.lock();
        write_frame(&mut *stream, &msg, self.max_frame).map_err(|e| {
            if e.kind() != io::ErrorKind::InvalidData {
                self.open.store(false, Ordering::Release);
            }
            Error::TransportFailure(format!("send to {}: {}", self.peer, e))
        })
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.stream.lock().shutdown(Shutdown::Both);
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Spawn a thread reading frames from `stream`.
///
/// `on_message` returning false stops the reader. `on_close` runs exactly
/// once when the stream ends for any reason.
pub fn spawn_reader<M, C>(
    name: String,
    stream: TcpStream,
    max_frame: usize,
    mut on_message: M,
    on_close: C,
) -> io::Result<JoinHandle<()>>
where
    M: FnMut(ActionMessage) -> bool + Send + 'static,
    C: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        let mut reader = BufReader::new(stream);
        loop {
            match read_frame(&mut reader, max_frame) {
                Ok(Some(ActionMessage::Cancel)) => {
                    log::debug!("[tcp] dropping local-only cancel frame");
                }
                Ok(Some(msg)) => {
                    if !on_message(msg) {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    log::debug!("[tcp] reader stopped: {}", e);
                    break;
                }
            }
        }
        on_close();
    })
}

/// Connect to `addr`, retrying with backoff.
pub fn connect(addr: &str, retry: &RetryConfig) -> Result<TcpStream> {
    let result = retry.run(|attempt| {
        let targets: Vec<SocketAddr> = addr.to_socket_addrs()?.collect();
        let mut last = io::Error::new(io::ErrorKind::NotFound, "address resolved to nothing");
        for target in targets {
            match TcpStream::connect_timeout(&target, CONNECT_TIMEOUT) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    log::debug!("[tcp] connect {} attempt {} failed: {}", target, attempt, e);
                    last = e;
                }
            }
        }
        Err(last)
    });
    result.map_err(|(e, attempts)| {
        Error::TransportFailure(format!(
            "could not reach broker at {} after {} attempts: {}",
            addr, attempts, e
        ))
    })
}

/// Broker-side listener.
pub struct TcpAcceptor {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TcpAcceptor {
    /// Bind `addr` and start accepting routes into `events`.
    pub(crate) fn bind(
        addr: &str,
        events: Sender<BrokerEvent>,
        routes: Arc<RouteAllocator>,
        max_frame: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::TransportFailure(format!("bind {}: {}", addr, e)))?;
        listener
            .set_nonblocking(true)
            .map_err(|e| Error::TransportFailure(format!("listener setup: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| Error::TransportFailure(format!("listener address: {}", e)))?;

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name(format!("cosim-accept-{}", local_addr.port()))
            .spawn(move || accept_loop(listener, events, routes, max_frame, flag))
            .map_err(|e| Error::TransportFailure(format!("spawn accept thread: {}", e)))?;

        log::info!("[tcp] listening on {}", local_addr);
        Ok(Self {
            local_addr,
            running,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting new routes. Existing routes are unaffected.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TcpAcceptor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(
    listener: TcpListener,
    events: Sender<BrokerEvent>,
    routes: Arc<RouteAllocator>,
    max_frame: usize,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::Acquire) {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(e) = open_route(stream, &events, &routes, max_frame) {
                    log::warn!("[tcp] rejecting connection from {}: {}", peer, e);
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log::warn!("[tcp] accept error: {}", e);
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn open_route(
    stream: TcpStream,
    events: &Sender<BrokerEvent>,
    routes: &RouteAllocator,
    max_frame: usize,
) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    let reader = stream.try_clone()?;
    let sink = TcpConnection::new(stream, max_frame)?;
    let route = routes.allocate();
    log::debug!("[tcp] {} opened by {}", route, sink.peer_addr());

    if events
        .send(BrokerEvent::RouteOpened {
            route,
            sink: Box::new(sink),
        })
        .is_err()
    {
        return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broker stopped"));
    }

    let msg_events = events.clone();
    let close_events = events.clone();
    spawn_reader(
        format!("cosim-{}", route),
        reader,
        max_frame,
        move |msg| msg_events.send(BrokerEvent::Message { route, msg }).is_ok(),
        move || {
            let _ = close_events.send(BrokerEvent::RouteClosed { route });
        },
    )?;
    Ok(())
}
