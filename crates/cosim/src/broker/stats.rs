// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated by the broker thread.
#[derive(Debug, Default)]
pub struct BrokerStats {
    messages_routed: AtomicU64,
    values_delivered: AtomicU64,
    messages_dropped: AtomicU64,
    grants_issued: AtomicU64,
    federates_joined: AtomicU64,
    federates_left: AtomicU64,
}

/// Point-in-time copy of [`BrokerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub messages_routed: u64,
    pub values_delivered: u64,
    pub messages_dropped: u64,
    pub grants_issued: u64,
    pub federates_joined: u64,
    pub federates_left: u64,
}

impl BrokerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn routed(&self) {
        self.messages_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self, n: u64) {
        self.values_delivered.fetch_add(n, Ordering::Relaxed);
    }

    pub(crate) fn dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn granted(&self) {
        self.grants_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn joined(&self) {
        self.federates_joined.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn left(&self) {
        self.federates_left.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_routed: self.messages_routed.load(Ordering::Relaxed),
            values_delivered: self.values_delivered.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            grants_issued: self.grants_issued.load(Ordering::Relaxed),
            federates_joined: self.federates_joined.load(Ordering::Relaxed),
            federates_left: self.federates_left.load(Ordering::Relaxed),
        }
    }
}
