// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport built on crossbeam channels.

use super::Comms;
use crate::broker::BrokerEvent;
use crate::error::{Error, Result};
use crate::ids::RouteId;
use crate::protocol::ActionMessage;
use crossbeam::channel::Sender;
use std::sync::atomic::{AtomicBool, Ordering};

/// Upward link from a core (or child broker) into a broker's event loop.
pub struct InprocLink {
    route: RouteId,
    events: Sender<BrokerEvent>,
    open: AtomicBool,
}

impl InprocLink {
    pub(crate) fn new(route: RouteId, events: Sender<BrokerEvent>) -> Self {
        Self {
            route,
            events,
            open: AtomicBool::new(true),
        }
    }

    pub fn route(&self) -> RouteId {
        self.route
    }
}

impl Comms for InprocLink {
    fn transmit(&self, msg: ActionMessage) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::TransportFailure(format!("{} closed", self.route)));
        }
        self.events
            .send(BrokerEvent::Message {
                route: self.route,
                msg,
            })
            .map_err(|_| {
                self.open.store(false, Ordering::Release);
                Error::TransportFailure("broker event loop has stopped".into())
            })
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.events.send(BrokerEvent::RouteClosed { route: self.route });
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for InprocLink {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Downward sink from a broker into a core's inbox.
pub struct InboxSink {
    inbox: Sender<ActionMessage>,
    open: AtomicBool,
}

impl InboxSink {
    pub fn new(inbox: Sender<ActionMessage>) -> Self {
        Self {
            inbox,
            open: AtomicBool::new(true),
        }
    }
}

impl Comms for InboxSink {
    fn transmit(&self, msg: ActionMessage) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::TransportFailure("inbox closed".into()));
        }
        self.inbox
            .send(msg)
            .map_err(|_| Error::TransportFailure("federate inbox dropped".into()))
    }

    fn disconnect(&self) {
        self.open.store(false, Ordering::Release);
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

/// Downward sink from a parent broker into a child broker's event loop.
pub struct ChildBrokerSink {
    events: Sender<BrokerEvent>,
    open: AtomicBool,
}

impl ChildBrokerSink {
    pub(crate) fn new(events: Sender<BrokerEvent>) -> Self {
        Self {
            events,
            open: AtomicBool::new(true),
        }
    }
}

impl Comms for ChildBrokerSink {
    fn transmit(&self, msg: ActionMessage) -> Result<()> {
        if !self.open.load(Ordering::Acquire) {
            return Err(Error::TransportFailure("child broker link closed".into()));
        }
        self.events
            .send(BrokerEvent::FromParent(msg))
            .map_err(|_| Error::TransportFailure("child broker has stopped".into()))
    }

    fn disconnect(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.events.send(BrokerEvent::ParentLost);
        }
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
