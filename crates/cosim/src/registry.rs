// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Interface registry.
//!
//! Maps global names to publication/input/endpoint handles. The root broker
//! holds the authoritative instance; each federate keeps a local mirror of the
//! interfaces it owns.
//!
//! # Name lifetime
//!
//! ```text
//! register ──> live ──(owner finalizes)──> released ──(last reference dropped)──> free
//!                                   └──(no references)──────────────────────────┘
//! ```
//!
//! A released name stays claimed while live inputs still reference it, so a
//! newcomer can never silently take over a channel somebody is reading.

use crate::error::{Error, Result};
use crate::ids::{FederateId, InterfaceHandle};
use crate::value::DataType;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Kind of interface; each kind has its own name namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    Publication,
    Input,
    Endpoint,
    Filter,
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InterfaceKind::Publication => f.write_str("publication"),
            InterfaceKind::Input => f.write_str("input"),
            InterfaceKind::Endpoint => f.write_str("endpoint"),
            InterfaceKind::Filter => f.write_str("filter"),
        }
    }
}

/// Description of an interface to register.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceSpec {
    pub kind: InterfaceKind,
    /// Global name (publications, endpoints). Inputs are anonymous.
    pub name: Option<String>,
    pub owner: FederateId,
    pub data_type: DataType,
    pub units: String,
    /// Target publication name (inputs) or endpoint name (filters).
    pub target: Option<String>,
}

impl InterfaceSpec {
    pub fn publication(
        owner: FederateId,
        name: impl Into<String>,
        data_type: DataType,
        units: impl Into<String>,
    ) -> Self {
        Self {
            kind: InterfaceKind::Publication,
            name: Some(name.into()),
            owner,
            data_type,
            units: units.into(),
            target: None,
        }
    }

    pub fn input(owner: FederateId, target: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            kind: InterfaceKind::Input,
            name: None,
            owner,
            data_type: DataType::Any,
            units: units.into(),
            target: Some(target.into()),
        }
    }

    /// Filter bound to the endpoint named `target`; the name is optional.
    pub fn filter(owner: FederateId, name: Option<String>, target: impl Into<String>) -> Self {
        Self {
            kind: InterfaceKind::Filter,
            name,
            owner,
            data_type: DataType::Raw,
            units: String::new(),
            target: Some(target.into()),
        }
    }

    pub fn endpoint(owner: FederateId, name: impl Into<String>) -> Self {
        Self {
            kind: InterfaceKind::Endpoint,
            name: Some(name.into()),
            owner,
            data_type: DataType::Raw,
            units: String::new(),
            target: None,
        }
    }
}

/// A registered interface.
#[derive(Debug, Clone)]
pub struct InterfaceEntry {
    pub handle: InterfaceHandle,
    pub spec: InterfaceSpec,
    /// Owner finalized; name kept only while referenced.
    pub released: bool,
    /// Live inputs resolved against this interface.
    pub references: usize,
}

/// Registry of interfaces and their global names.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    entries: BTreeMap<InterfaceHandle, InterfaceEntry>,
    names: HashMap<(InterfaceKind, String), InterfaceHandle>,
    next_handle: u64,
}

impl InterfaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with `NameCollision` if `name` is claimed in the `kind` namespace.
    pub fn check_available(&self, kind: InterfaceKind, name: &str) -> Result<()> {
        if self.names.contains_key(&(kind, name.to_string())) {
            return Err(Error::NameCollision(format!("{} '{}'", kind, name)));
        }
        Ok(())
    }

    /// Register a new interface and allocate its handle.
    pub fn register(&mut self, spec: InterfaceSpec) -> Result<InterfaceHandle> {
        let handle = InterfaceHandle(self.next_handle + 1);
        self.insert(handle, spec)?;
        self.next_handle += 1;
        Ok(handle)
    }

    /// Insert an interface under an externally assigned handle.
    pub fn insert(&mut self, handle: InterfaceHandle, spec: InterfaceSpec) -> Result<()> {
        if let Some(name) = &spec.name {
            self.check_available(spec.kind, name)?;
        }
        if self.entries.contains_key(&handle) {
            return Err(Error::NameCollision(format!("handle {}", handle)));
        }
        if let Some(name) = &spec.name {
            self.names.insert((spec.kind, name.clone()), handle);
        }
        self.entries.insert(
            handle,
            InterfaceEntry {
                handle,
                spec,
                released: false,
                references: 0,
            },
        );
        Ok(())
    }

    /// Resolve a live global name.
    pub fn resolve(&self, kind: InterfaceKind, name: &str) -> Result<InterfaceHandle> {
        match self.names.get(&(kind, name.to_string())) {
            Some(handle) if self.entries.get(handle).is_some_and(|e| !e.released) => Ok(*handle),
            _ => Err(Error::NotFound(format!("{} '{}'", kind, name))),
        }
    }

    /// Look up an interface by handle.
    pub fn get(&self, handle: InterfaceHandle) -> Option<&InterfaceEntry> {
        self.entries.get(&handle)
    }

    /// All live interfaces of a kind, in handle order.
    pub fn iter_kind(&self, kind: InterfaceKind) -> impl Iterator<Item = &InterfaceEntry> {
        self.entries
            .values()
            .filter(move |e| e.spec.kind == kind && !e.released)
    }

    /// All live interfaces owned by `owner`.
    pub fn owned_by(&self, owner: FederateId) -> impl Iterator<Item = &InterfaceEntry> {
        self.entries
            .values()
            .filter(move |e| e.spec.owner == owner && !e.released)
    }

    /// Record that an input resolved against `handle`.
    pub fn add_reference(&mut self, handle: InterfaceHandle) {
        if let Some(entry) = self.entries.get_mut(&handle) {
            entry.references += 1;
        }
    }

    /// Drop one reference; frees the name when released and unreferenced.
    pub fn drop_reference(&mut self, handle: InterfaceHandle) {
        let free = match self.entries.get_mut(&handle) {
            Some(entry) => {
                entry.references = entry.references.saturating_sub(1);
                entry.released && entry.references == 0
            }
            None => false,
        };
        if free {
            self.remove(handle);
        }
    }

    /// Release everything `owner` registered. Returns the released handles.
    pub fn release_owner(&mut self, owner: FederateId) -> Vec<InterfaceHandle> {
        let owned: Vec<InterfaceHandle> = self
            .entries
            .values()
            .filter(|e| e.spec.owner == owner && !e.released)
            .map(|e| e.handle)
            .collect();

        for handle in &owned {
            let free = match self.entries.get_mut(handle) {
                Some(entry) => {
                    entry.released = true;
                    entry.references == 0
                }
                None => false,
            };
            if free {
                self.remove(*handle);
            }
        }
        owned
    }

    /// Number of live interfaces.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|e| !e.released).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&mut self, handle: InterfaceHandle) {
        if let Some(entry) = self.entries.remove(&handle) {
            if let Some(name) = entry.spec.name {
                self.names.remove(&(entry.spec.kind, name));
            }
        }
    }
}
