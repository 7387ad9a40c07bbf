// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscriber-side value storage.
//!
//! Values arrive from the broker tagged with their publication time and are
//! *staged* until the owning federate is granted a time covering them. A
//! commit moves every staged value with `time <= granted` into the visible
//! slot, so a subscriber never observes a value from its future.
//!
//! ```text
//! deliver ──> staged (sorted by time) ──commit(granted)──> current + history
//! ```

use crate::ids::InterfaceHandle;
use crate::time::Time;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Values kept per publication for [`ValueStore::history`].
pub const DEFAULT_HISTORY_DEPTH: usize = 32;

/// A value together with its publication time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedValue {
    pub time: Time,
    pub value: Value,
}

#[derive(Debug, Default)]
struct Slot {
    staged: VecDeque<TimedValue>,
    history: VecDeque<TimedValue>,
}

/// Per-publication current value and bounded history.
#[derive(Debug)]
pub struct ValueStore {
    slots: BTreeMap<InterfaceHandle, Slot>,
    depth: usize,
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_DEPTH)
    }
}

impl ValueStore {
    /// Create a store keeping up to `depth` committed values per publication.
    pub fn new(depth: usize) -> Self {
        Self {
            slots: BTreeMap::new(),
            depth: depth.max(1),
        }
    }

    /// Start accepting values for `publication`.
    pub fn track(&mut self, publication: InterfaceHandle) {
        self.slots.entry(publication).or_default();
    }

    pub fn is_tracked(&self, publication: InterfaceHandle) -> bool {
        self.slots.contains_key(&publication)
    }

    /// Stage a delivered value. Ignored for untracked publications.
    ///
    /// Staged values stay ordered by time; equal times keep arrival order.
    pub fn stage(&mut self, publication: InterfaceHandle, time: Time, value: Value) -> bool {
        let Some(slot) = self.slots.get_mut(&publication) else {
            return false;
        };
        let at = slot.staged.partition_point(|v| v.time <= time);
        slot.staged.insert(at, TimedValue { time, value });
        true
    }

    /// Make every staged value with `time <= granted` visible.
    ///
    /// Returns the publications whose current value changed.
    pub fn commit(&mut self, granted: Time) -> Vec<InterfaceHandle> {
        let mut changed = Vec::new();
        for (handle, slot) in &mut self.slots {
            let mut any = false;
            while slot.staged.front().is_some_and(|v| v.time <= granted) {
                if let Some(v) = slot.staged.pop_front() {
                    slot.history.push_back(v);
                    any = true;
                }
            }
            while slot.history.len() > self.depth {
                slot.history.pop_front();
            }
            if any {
                changed.push(*handle);
            }
        }
        changed
    }

    /// Most recent committed value.
    pub fn current(&self, publication: InterfaceHandle) -> Option<&TimedValue> {
        self.slots.get(&publication)?.history.back()
    }

    /// Committed values, oldest first.
    pub fn history(&self, publication: InterfaceHandle) -> Vec<TimedValue> {
        self.slots
            .get(&publication)
            .map(|s| s.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Time of the most recent committed value.
    pub fn last_update_time(&self, publication: InterfaceHandle) -> Option<Time> {
        self.current(publication).map(|v| v.time)
    }

    /// Values delivered but not yet visible.
    pub fn staged_len(&self) -> usize {
        self.slots.values().map(|s| s.staged.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const P: InterfaceHandle = InterfaceHandle(1);

    fn t(secs: f64) -> Time {
        Time::from_secs_f64(secs)
    }

    #[test]
    fn test_values_hidden_until_commit() {
        let mut store = ValueStore::default();
        store.track(P);
        store.stage(P, t(1.0), Value::from(2.0));
        assert!(store.current(P).is_none());

        assert!(store.commit(t(0.5)).is_empty());
        assert!(store.current(P).is_none());

        assert_eq!(store.commit(t(1.0)), vec![P]);
        assert_eq!(store.current(P).unwrap().value, Value::from(2.0));
    }

    #[test]
    fn test_future_values_stay_staged() {
        let mut store = ValueStore::default();
        store.track(P);
        store.stage(P, t(1.0), Value::from(1.0));
        store.stage(P, t(3.0), Value::from(3.0));
        store.commit(t(2.0));
        assert_eq!(store.current(P).unwrap().value, Value::from(1.0));
        assert_eq!(store.staged_len(), 1);
    }

    #[test]
    fn test_out_of_order_staging_sorted() {
        let mut store = ValueStore::default();
        store.track(P);
        store.stage(P, t(2.0), Value::from(2.0));
        store.stage(P, t(1.0), Value::from(1.0));
        store.stage(P, t(2.0), Value::from(2.5));
        store.commit(t(5.0));
        let values: Vec<Value> = store.history(P).into_iter().map(|v| v.value).collect();
        assert_eq!(
            values,
            vec![Value::from(1.0), Value::from(2.0), Value::from(2.5)]
        );
        assert_eq!(store.last_update_time(P), Some(t(2.0)));
    }

    #[test]
    fn test_history_bounded() {
        let mut store = ValueStore::new(3);
        store.track(P);
        for i in 0..10 {
            store.stage(P, Time::from_nanos(i), Value::from(i));
        }
        store.commit(Time::from_nanos(100));
        let history = store.history(P);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].value, Value::from(7i64));
    }

    #[test]
    fn test_untracked_ignored() {
        let mut store = ValueStore::default();
        assert!(!store.stage(P, Time::ZERO, Value::from(1.0)));
        assert!(store.history(P).is_empty());
    }
}
