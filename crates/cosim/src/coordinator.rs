// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Time coordination.
//!
//! The coordinator owns one [`TimeRecord`] per federate and decides when a
//! pending time request may be granted.
//!
//! # Grant rule
//!
//! Every federate has a *bound*: the earliest simulated time at which it can
//! still emit a value or message.
//!
//! ```text
//! bound(f) = (pending request of f, or last grant if none pending) + lookahead(f)
//! bound(finalized) = +inf
//! ```
//!
//! A pending request `r` of federate `s` is granted, exactly, once
//! `r <= bound(d)` for every dependency `d` of `s`. Requests are never granted
//! partially, so a pending federate is guaranteed to be granted precisely its
//! request; that is what makes `pending request + lookahead` a safe bound and
//! lets one recomputation pass settle every grant without a fixed-point search.
//!
//! A chain of pending federates blocking each other strictly decreases in
//! request time, so blocking chains cannot cycle: every stall bottoms out at a
//! federate that has not requested time at all (a *stall root*).
//!
//! Lowering a lookahead while executing never lowers a bound below what was
//! already advertised: dependents may hold grants up to the old bound, so the
//! record keeps an *output floor* that the federate's outputs respect too.
//!
//! # Iteration
//!
//! An iteration request asks to be granted the current time `g` again. The
//! iterating federates form a group; a member is granted once each of its
//! dependencies either can no longer emit at `g` (`bound > g`) or is itself a
//! member iterating at `g`. Members are granted together, so values they
//! published at `g` become visible on the next iteration.
//!
//! # Ordering
//!
//! Federates granted in the same recomputation are reported in registration
//! order (ascending [`FederateId`]).

use crate::error::{Error, Result};
use crate::ids::FederateId;
use crate::time::Time;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-federate timing properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeProperties {
    /// Minimum advance per request.
    pub time_delta: Time,
    /// Lag between a federate's grant and the time tag of its outputs.
    pub lookahead: Time,
    /// Grant grid spacing; zero disables the grid.
    pub period: Time,
    /// Grid origin when `period` is set.
    pub offset: Time,
}

impl Default for TimeProperties {
    fn default() -> Self {
        Self {
            time_delta: Time::EPSILON,
            lookahead: Time::ZERO,
            period: Time::ZERO,
            offset: Time::ZERO,
        }
    }
}

impl TimeProperties {
    /// Map a caller's request onto the time actually sent to the coordinator.
    ///
    /// Fails when `requested` regresses behind `granted`. Otherwise the request
    /// is raised to at least `granted + time_delta` and, with a period set,
    /// rounded up onto the `offset + k * period` grid.
    pub fn effective_request(&self, granted: Time, requested: Time) -> Result<Time> {
        if requested < granted {
            return Err(Error::InvalidTimeRequest { requested, granted });
        }
        if requested.is_max() {
            return Ok(Time::MAX);
        }
        let delta = if self.time_delta > Time::ZERO {
            self.time_delta
        } else {
            Time::EPSILON
        };
        let mut next = requested.max(granted + delta);

        if self.period > Time::ZERO {
            let period = self.period.as_nanos();
            let rel = (next - self.offset).as_nanos();
            let steps = if rel <= 0 {
                0
            } else {
                rel / period + i64::from(rel % period != 0)
            };
            next = self.offset + Time::from_nanos(steps.saturating_mul(period));
            while next <= granted {
                next = next + self.period;
            }
        }
        Ok(next)
    }
}

/// Coordination state of one federate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeRecord {
    pub granted: Time,
    pub requested: Option<Time>,
    pub lookahead: Time,
    pub executing: bool,
    /// Pending request is an iteration at `granted`.
    pub iterating: bool,
    /// Highest bound advertised before a lookahead decrease.
    pub output_floor: Time,
    /// Federates whose outputs this federate consumes.
    pub dependencies: BTreeSet<FederateId>,
    /// Federates consuming this federate's outputs.
    pub dependents: BTreeSet<FederateId>,
}

impl TimeRecord {
    fn bound(&self) -> Time {
        (self.requested.unwrap_or(self.granted) + self.lookahead).max(self.output_floor)
    }
}

/// A grant decided by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Grant {
    pub federate: FederateId,
    pub time: Time,
}

/// Diagnostic view of one federate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeStatus {
    pub federate: FederateId,
    pub granted: Time,
    pub requested: Option<Time>,
    pub lookahead: Time,
    /// Dependencies currently preventing the pending request.
    pub blocked_by: Vec<FederateId>,
}

/// Centralized time coordinator; one per root broker.
#[derive(Debug, Default)]
pub struct TimeCoordinator {
    records: BTreeMap<FederateId, TimeRecord>,
}

impl TimeCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a federate.
    pub fn add_federate(&mut self, id: FederateId, lookahead: Time) {
        self.records.entry(id).or_insert_with(|| TimeRecord {
            lookahead,
            ..TimeRecord::default()
        });
    }

    /// Stop tracking a federate; its dependents are no longer bounded by it.
    pub fn remove_federate(&mut self, id: FederateId) -> Vec<Grant> {
        if self.records.remove(&id).is_none() {
            return Vec::new();
        }
        for record in self.records.values_mut() {
            record.dependencies.remove(&id);
            record.dependents.remove(&id);
        }
        self.recompute()
    }

    /// `dependent` consumes outputs of `dependency`. Self edges are ignored.
    pub fn add_dependency(&mut self, dependent: FederateId, dependency: FederateId) {
        if dependent == dependency
            || !self.records.contains_key(&dependent)
            || !self.records.contains_key(&dependency)
        {
            return;
        }
        if let Some(r) = self.records.get_mut(&dependent) {
            r.dependencies.insert(dependency);
        }
        if let Some(r) = self.records.get_mut(&dependency) {
            r.dependents.insert(dependent);
        }
    }

    /// Mark a federate as executing at time zero.
    pub fn enter_executing(&mut self, id: FederateId) {
        if let Some(r) = self.records.get_mut(&id) {
            r.executing = true;
        }
    }

    /// Update a federate's lookahead and re-evaluate pending requests.
    pub fn set_lookahead(&mut self, id: FederateId, lookahead: Time) -> Vec<Grant> {
        match self.records.get_mut(&id) {
            Some(r) => {
                if r.executing {
                    r.output_floor = r.output_floor.max(r.bound());
                }
                r.lookahead = lookahead;
            }
            None => return Vec::new(),
        }
        self.recompute()
    }

    /// Record a time request and return every grant it unlocks.
    pub fn request_time(&mut self, id: FederateId, time: Time) -> Result<Vec<Grant>> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("federate {}", id)))?;
        if time < record.granted {
            return Err(Error::InvalidTimeRequest {
                requested: time,
                granted: record.granted,
            });
        }
        record.requested = Some(time);
        record.iterating = false;
        Ok(self.recompute())
    }

    /// Ask to be granted the current time again; see the module docs.
    pub fn request_iteration(&mut self, id: FederateId) -> Result<Vec<Grant>> {
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("federate {}", id)))?;
        record.requested = Some(record.granted);
        record.iterating = true;
        Ok(self.recompute())
    }

    /// Iterating federates whose dependencies have all settled at their time.
    fn iteration_group(&self) -> BTreeSet<FederateId> {
        let mut group: BTreeSet<FederateId> = self
            .records
            .iter()
            .filter(|(_, r)| r.iterating && r.requested.is_some())
            .map(|(id, _)| *id)
            .collect();
        loop {
            let dropped: Vec<FederateId> = group
                .iter()
                .copied()
                .filter(|id| {
                    self.records.get(id).map_or(true, |r| {
                        r.dependencies
                            .iter()
                            .any(|d| !self.settled_at(*d, r.granted, &group))
                    })
                })
                .collect();
            if dropped.is_empty() {
                return group;
            }
            for id in dropped {
                group.remove(&id);
            }
        }
    }

    /// `dependency` cannot emit at `time` any more, or iterates there with `group`.
    fn settled_at(&self, dependency: FederateId, time: Time, group: &BTreeSet<FederateId>) -> bool {
        self.bound(dependency) > time
            || (group.contains(&dependency)
                && self.records.get(&dependency).is_some_and(|r| r.granted == time))
    }

    /// Earliest time `id` may still emit output.
    pub fn bound(&self, id: FederateId) -> Time {
        self.records.get(&id).map_or(Time::MAX, TimeRecord::bound)
    }

    /// Dependencies currently blocking `id`'s pending request.
    pub fn blockers(&self, id: FederateId) -> Vec<FederateId> {
        let Some(record) = self.records.get(&id) else {
            return Vec::new();
        };
        let Some(requested) = record.requested else {
            return Vec::new();
        };
        if record.iterating {
            let group = self.iteration_group();
            return record
                .dependencies
                .iter()
                .copied()
                .filter(|d| !self.settled_at(*d, requested, &group))
                .collect();
        }
        record
            .dependencies
            .iter()
            .copied()
            .filter(|d| self.bound(*d) < requested)
            .collect()
    }

    /// Whether `id` has a request that may be granted now.
    pub fn is_grantable(&self, id: FederateId) -> bool {
        self.records
            .get(&id)
            .is_some_and(|r| r.requested.is_some() && self.blockers(id).is_empty())
    }

    /// Grant every grantable request, in registration order.
    pub fn recompute(&mut self) -> Vec<Grant> {
        let mut grants = Vec::new();
        loop {
            let ready: Vec<FederateId> = self
                .records
                .keys()
                .copied()
                .filter(|id| self.is_grantable(*id))
                .collect();
            if ready.is_empty() {
                break;
            }
            for id in ready {
                if let Some(record) = self.records.get_mut(&id) {
                    if let Some(time) = record.requested.take() {
                        record.iterating = false;
                        record.granted = time;
                        grants.push(Grant { federate: id, time });
                    }
                }
            }
        }
        grants
    }

    /// Non-pending federates at the bottom of some blocking chain.
    pub fn stall_roots(&self) -> Vec<FederateId> {
        let mut roots = BTreeSet::new();
        let mut visited = BTreeSet::new();
        let mut stack: Vec<FederateId> = self
            .records
            .iter()
            .filter(|(id, r)| r.requested.is_some() && !self.is_grantable(**id))
            .map(|(id, _)| *id)
            .collect();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            for blocker in self.blockers(id) {
                match self.records.get(&blocker) {
                    Some(r) if r.requested.is_none() => {
                        roots.insert(blocker);
                    }
                    Some(_) => stack.push(blocker),
                    None => {}
                }
            }
        }
        roots.into_iter().collect()
    }

    /// Snapshot of every record.
    pub fn status(&self) -> Vec<TimeStatus> {
        self.records
            .iter()
            .map(|(id, r)| TimeStatus {
                federate: *id,
                granted: r.granted,
                requested: r.requested,
                lookahead: r.lookahead,
                blocked_by: self.blockers(*id),
            })
            .collect()
    }

    pub fn record(&self, id: FederateId) -> Option<&TimeRecord> {
        self.records.get(&id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
