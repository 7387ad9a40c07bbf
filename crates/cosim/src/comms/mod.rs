// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport adapters between federates and brokers.
//!
//! ```text
//!   Federate ──Comms::transmit──> Broker event loop ──Comms::transmit──> Federate inbox
//!              (InprocLink |                          (InboxSink |
//!               TcpConnection)                          TcpConnection)
//! ```
//!
//! Every adapter delivers messages in order and reports a closed channel
//! exactly once: the broker sees a `RouteClosed` event, a core sees a
//! `Disconnect` message in its inbox.

pub mod inproc;
mod retry;
pub mod tcp;

pub use inproc::{ChildBrokerSink, InboxSink, InprocLink};
pub use retry::RetryConfig;
pub use tcp::{TcpAcceptor, TcpConnection};

use crate::error::Result;
use crate::ids::RouteId;
use crate::protocol::ActionMessage;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordered, reliable message channel to one peer.
pub trait Comms: Send + Sync {
    /// Queue `msg` for the peer.
    fn transmit(&self, msg: ActionMessage) -> Result<()>;

    /// Close the channel. Idempotent.
    fn disconnect(&self);

    fn is_connected(&self) -> bool;
}

/// Allocates broker-local route ids.
#[derive(Debug, Default)]
pub struct RouteAllocator {
    next: AtomicU64,
}

impl RouteAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> RouteId {
        RouteId(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_ids_are_unique() {
        let routes = RouteAllocator::new();
        let a = routes.allocate();
        let b = routes.allocate();
        assert_ne!(a, b);
        assert_eq!(a, RouteId(1));
    }
}
