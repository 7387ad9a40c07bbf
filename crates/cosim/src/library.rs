// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Library context.
//!
//! A [`Library`] replaces process-wide state: it owns the directory of
//! in-process brokers that federates resolve by name, and its open flag gates
//! every federate created through it.
//!
//! ```ignore
//! let lib = Library::open();
//! let broker = lib.create_broker(CoreType::Inproc, "main", "-f 1")?;
//! let fed = lib.create_federate("fed1", &FederateInfo::new("core1"))?;
//! ...
//! lib.close();
//! ```

use crate::broker::{self, Broker};
use crate::comms::RetryConfig;
use crate::config::{BrokerArgs, CoreArgs, CoreType, FederateInfo, DEFAULT_BROKER_PORT};
use crate::error::{Error, Result};
use crate::federate::{Attachment, Federate};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

struct LibraryInner {
    open: Arc<AtomicBool>,
    brokers: DashMap<String, Broker>,
    counter: AtomicU64,
}

/// Explicit library context. Clones share the same state.
#[derive(Clone)]
pub struct Library {
    inner: Arc<LibraryInner>,
}

impl Library {
    pub fn open() -> Library {
        log::debug!("[library] opened (cosim {})", crate::version());
        Library {
            inner: Arc::new(LibraryInner {
                open: Arc::new(AtomicBool::new(true)),
                brokers: DashMap::new(),
                counter: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Disconnect every broker and invalidate the context. Idempotent.
    pub fn close(&self) {
        if !self.inner.open.swap(false, Ordering::AcqRel) {
            return;
        }
        let brokers: Vec<Broker> = self.inner.brokers.iter().map(|b| b.value().clone()).collect();
        self.inner.brokers.clear();
        for broker in brokers {
            broker.disconnect();
        }
        log::debug!("[library] closed");
    }

    /// Start a broker.
    ///
    /// The name comes from `identifier`, then `--name` in `init`, then an
    /// automatic `brokerN`. Names of live brokers are unique per library.
    pub fn create_broker(&self, core_type: CoreType, identifier: &str, init: &str) -> Result<Broker> {
        self.check_open()?;
        let args = BrokerArgs::parse_init(init)?;
        let name = if identifier.is_empty() {
            let n = self.inner.counter.fetch_add(1, Ordering::Relaxed);
            args.resolved_name(&format!("broker{}", n))
        } else {
            identifier.to_string()
        };
        self.start_broker(core_type, name, &args)
    }

    /// Look up a broker created through this library.
    pub fn broker(&self, name: &str) -> Result<Broker> {
        self.check_open()?;
        self.inner
            .brokers
            .get(name)
            .map(|b| b.value().clone())
            .ok_or_else(|| Error::NotFound(format!("broker '{}'", name)))
    }

    /// Names of every broker created through this library.
    pub fn broker_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.brokers.iter().map(|b| b.key().clone()).collect();
        names.sort();
        names
    }

    /// Create a federate named `name` and join it to a broker chosen from
    /// `info.core_init_string`.
    pub fn create_federate(&self, name: &str, info: &FederateInfo) -> Result<Federate> {
        self.check_open()?;
        let args = info.validate()?;
        let attachment = match info.core_type.resolve()? {
            CoreType::Tcp => {
                let address = args
                    .broker_address
                    .clone()
                    .or_else(|| args.broker.clone())
                    .unwrap_or_else(|| format!("127.0.0.1:{}", DEFAULT_BROKER_PORT));
                let retry = match args.connect_timeout() {
                    Some(budget) => RetryConfig::default().within(budget),
                    None => RetryConfig::default(),
                };
                Attachment::Tcp { address, retry }
            }
            _ => Attachment::Inproc(self.inproc_broker(info, &args)?),
        };
        Federate::connect(name, info, &args, attachment, self.inner.open.clone())
    }

    /// Spawn first, then claim the name in one entry operation. The parent
    /// lookup must not run under the entry's shard lock.
    fn start_broker(&self, core_type: CoreType, name: String, args: &BrokerArgs) -> Result<Broker> {
        if self.live_broker(&name).is_some() {
            return Err(Error::NameCollision(format!("broker '{}'", name)));
        }
        let broker = broker::create(core_type, name.clone(), args, |parent| self.live_broker(parent))?;
        let claimed = match self.inner.brokers.entry(name.clone()) {
            Entry::Occupied(slot) if slot.get().is_connected() => false,
            Entry::Occupied(mut slot) => {
                slot.insert(broker.clone());
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(broker.clone());
                true
            }
        };
        if !claimed {
            broker.disconnect();
            return Err(Error::NameCollision(format!("broker '{}'", name)));
        }
        Ok(broker)
    }

    fn live_broker(&self, name: &str) -> Option<Broker> {
        self.inner
            .brokers
            .get(name)
            .map(|b| b.value().clone())
            .filter(Broker::is_connected)
    }

    /// Pick the in-process broker a federate joins.
    fn inproc_broker(&self, info: &FederateInfo, args: &CoreArgs) -> Result<Broker> {
        if let Some(name) = &args.broker {
            return match self.live_broker(name) {
                Some(broker) if broker.core_type() == CoreType::Inproc => Ok(broker),
                Some(_) => Err(Error::NotFound(format!("in-process broker '{}'", name))),
                None if args.autobroker => self.auto_broker(name.clone(), args),
                None => Err(Error::NotFound(format!("broker '{}'", name))),
            };
        }

        let mut live: Vec<Broker> = self
            .inner
            .brokers
            .iter()
            .map(|b| b.value().clone())
            .filter(|b| b.is_connected() && b.core_type() == CoreType::Inproc)
            .collect();
        match live.len() {
            1 => Ok(live.remove(0)),
            0 if args.autobroker => self.auto_broker(format!("{}_broker", info.core_name), args),
            0 => Err(Error::NotFound("no in-process broker available".into())),
            n => Err(Error::NotFound(format!(
                "{} in-process brokers available; select one with --broker",
                n
            ))),
        }
    }

    fn auto_broker(&self, name: String, args: &CoreArgs) -> Result<Broker> {
        let federates = args.federates.unwrap_or(1);
        log::debug!("[library] auto-creating broker '{}' for {} federates", name, federates);
        let broker_args = BrokerArgs::parse_init(&format!("--federates={}", federates))?;
        self.start_broker(CoreType::Inproc, name, &broker_args)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(Error::LibraryClosed)
        }
    }
}

impl Drop for LibraryInner {
    fn drop(&mut self) {
        self.open.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DataType;
    use std::time::Duration;

    #[test]
    fn test_double_close_is_noop() {
        let lib = Library::open();
        let broker = lib.create_broker(CoreType::Inproc, "b", "-f 1").unwrap();
        lib.close();
        lib.close();
        assert!(!lib.is_open());
        assert!(!broker.is_connected());
    }

    #[test]
    fn test_use_after_close() {
        let lib = Library::open();
        lib.create_broker(CoreType::Inproc, "b", "-f 1").unwrap();
        let fed = lib.create_federate("fed", &FederateInfo::new("core")).unwrap();
        lib.close();
        assert!(matches!(
            lib.create_broker(CoreType::Inproc, "c", ""),
            Err(Error::LibraryClosed)
        ));
        assert!(matches!(
            fed.register_global_publication("p", DataType::Double, ""),
            Err(Error::LibraryClosed)
        ));
    }

    #[test]
    fn test_broker_name_sources() {
        let lib = Library::open();
        assert_eq!(lib.create_broker(CoreType::Inproc, "", "--name=main").unwrap().name(), "main");
        assert_eq!(lib.create_broker(CoreType::Inproc, "explicit", "--name=x").unwrap().name(), "explicit");
        let auto = lib.create_broker(CoreType::Inproc, "", "").unwrap();
        assert!(auto.name().starts_with("broker"));
        assert_eq!(lib.broker_names().len(), 3);
        assert!(matches!(
            lib.create_broker(CoreType::Inproc, "main", ""),
            Err(Error::NameCollision(_))
        ));
    }

    #[test]
    fn test_concurrent_create_claims_name_once() {
        let lib = Library::open();
        let results: Vec<Result<Broker>> = std::thread::scope(|s| {
            let racers: Vec<_> = (0..8)
                .map(|_| s.spawn(|| lib.create_broker(CoreType::Inproc, "race", "-f 1")))
                .collect();
            racers.into_iter().map(|r| r.join().unwrap()).collect()
        });
        let winners: Vec<&Broker> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(Error::NameCollision(_))))
                .count(),
            7
        );
        assert!(winners[0].is_connected());
        assert!(lib.broker("race").unwrap().is_connected());
        assert_eq!(lib.broker_names(), vec!["race".to_string()]);
        lib.close();
    }

    #[test]
    fn test_federate_needs_a_broker() {
        let lib = Library::open();
        let err = lib.create_federate("fed", &FederateInfo::new("core")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let info = FederateInfo::new("core").with_core_init_string("--broker=missing");
        assert!(matches!(lib.create_federate("fed", &info), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_ambiguous_broker_requires_selection() {
        let lib = Library::open();
        lib.create_broker(CoreType::Inproc, "a", "").unwrap();
        lib.create_broker(CoreType::Inproc, "b", "").unwrap();
        assert!(lib.create_federate("fed", &FederateInfo::new("core")).is_err());

        let info = FederateInfo::new("core").with_core_init_string("--broker=b");
        let fed = lib.create_federate("fed", &info).unwrap();
        assert_eq!(fed.name(), "fed");
    }

    #[test]
    fn test_autobroker() {
        let lib = Library::open();
        let info = FederateInfo::new("core").with_core_init_string("--autobroker --broker=auto -f 1");
        let fed = lib.create_federate("fed", &info).unwrap();
        let broker = lib.broker("auto").unwrap();
        assert!(broker.is_connected());
        fed.enter_executing_mode().unwrap();
        fed.finalize().unwrap();
        assert!(broker.wait_for_disconnect(Some(Duration::from_secs(5))));
    }

    #[test]
    fn test_invalid_federate_info() {
        let lib = Library::open();
        let err = lib.create_federate("fed", &FederateInfo::new("")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        let zmq = FederateInfo::new("core").with_core_type(CoreType::Zmq);
        assert!(matches!(lib.create_federate("fed", &zmq), Err(Error::Config(_))));
    }
}
