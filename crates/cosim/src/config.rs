// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker and federate configuration.
//!
//! Brokers and cores are configured through command-line style init strings
//! (`"-f 2 --name=main --loglevel=5"`). The string is tokenized and handed to
//! a `clap` parser, so `-f 2`, `--federates 2` and `--federates=2` are all
//! accepted.

use crate::coordinator::TimeProperties;
use crate::logging::LogLevel;
use crate::time::Time;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default TCP port of a broker.
pub const DEFAULT_BROKER_PORT: u16 = 24160;

/// Configuration error types.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("invalid value: {0}")]
    Invalid(String),

    #[error("init string: {0}")]
    Parse(String),

    #[error("unknown core type '{0}'")]
    UnknownCoreType(String),

    #[error("core type {0} is not available in this build")]
    Unavailable(CoreType),
}

/// Transport used between federates and brokers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoreType {
    /// Resolves to [`CoreType::Inproc`].
    #[default]
    Default,
    /// In-process test core; behaves as [`CoreType::Inproc`].
    Test,
    Inproc,
    Tcp,
    Zmq,
    Udp,
    Mpi,
}

impl CoreType {
    pub fn as_str(self) -> &'static str {
        match self {
            CoreType::Default => "default",
            CoreType::Test => "test",
            CoreType::Inproc => "inproc",
            CoreType::Tcp => "tcp",
            CoreType::Zmq => "zmq",
            CoreType::Udp => "udp",
            CoreType::Mpi => "mpi",
        }
    }

    /// Concrete transport backing this core type.
    pub fn resolve(self) -> Result<CoreType, ConfigError> {
        match self {
            CoreType::Default | CoreType::Test | CoreType::Inproc => Ok(CoreType::Inproc),
            CoreType::Tcp => Ok(CoreType::Tcp),
            other => Err(ConfigError::Unavailable(other)),
        }
    }
}

impl fmt::Display for CoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CoreType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(CoreType::Default),
            "test" | "test1" => Ok(CoreType::Test),
            "inproc" | "interprocess" | "ipc" => Ok(CoreType::Inproc),
            "tcp" => Ok(CoreType::Tcp),
            "zmq" | "zmq_ss" => Ok(CoreType::Zmq),
            "udp" => Ok(CoreType::Udp),
            "mpi" => Ok(CoreType::Mpi),
            other => Err(ConfigError::UnknownCoreType(other.to_string())),
        }
    }
}

/// Split an init string into arguments, honoring single and double quotes.
pub fn tokenize(init: &str) -> Result<Vec<String>, ConfigError> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in init.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }
    if quote.is_some() {
        return Err(ConfigError::Parse(format!("unterminated quote in '{}'", init)));
    }
    if in_token {
        args.push(current);
    }
    Ok(args)
}

fn parse_init<P: Parser>(init: &str) -> Result<P, ConfigError> {
    P::try_parse_from(tokenize(init)?).map_err(|e| ConfigError::Parse(e.to_string().trim().to_string()))
}

/// Options accepted in a broker init string.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct BrokerArgs {
    /// Federates expected before the exec grant.
    #[arg(short = 'f', long = "federates", visible_alias = "minfed", default_value_t = 1)]
    pub federates: usize,

    /// Broker name.
    #[arg(short = 'n', long)]
    pub name: Option<String>,

    /// Alternate spelling of the name.
    #[arg(long)]
    pub identifier: Option<String>,

    #[arg(long = "loglevel", visible_alias = "log_level", default_value = "1")]
    pub log_level: LogLevel,

    /// Parent broker (in-process) for hierarchical federations.
    #[arg(long)]
    pub broker: Option<String>,

    /// Parent broker address (tcp) for hierarchical federations.
    #[arg(long = "broker_address", visible_alias = "brokeraddress")]
    pub broker_address: Option<String>,

    /// Interface to listen on (tcp).
    #[arg(long, default_value = "127.0.0.1")]
    pub interface: String,

    /// Port to listen on (tcp); 0 picks an ephemeral port.
    #[arg(long, default_value_t = DEFAULT_BROKER_PORT)]
    pub port: u16,

    /// Sub-brokers expected before the exec grant.
    #[arg(long = "minbrokers", visible_alias = "minbroker", default_value_t = 0)]
    pub min_brokers: usize,
}

impl BrokerArgs {
    pub fn parse_init(init: &str) -> Result<Self, ConfigError> {
        let args: Self = parse_init(init)?;
        if args.federates == 0 && args.min_brokers == 0 {
            return Err(ConfigError::Invalid(
                "a broker needs at least one federate or sub-broker".into(),
            ));
        }
        Ok(args)
    }

    /// Effective broker name: `--name`, then `--identifier`, then `fallback`.
    pub fn resolved_name(&self, fallback: &str) -> String {
        self.name
            .clone()
            .or_else(|| self.identifier.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| fallback.to_string())
    }
}

/// Options accepted in a core (federate side) init string.
#[derive(Debug, Clone, PartialEq, Parser)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct CoreArgs {
    /// Broker to join (in-process name).
    #[arg(long)]
    pub broker: Option<String>,

    /// Broker address (tcp).
    #[arg(long = "broker_address", visible_alias = "brokeraddress")]
    pub broker_address: Option<String>,

    /// Expected federates; sizes a broker created by `--autobroker`.
    #[arg(short = 'f', long = "federates", visible_alias = "minfed")]
    pub federates: Option<usize>,

    /// Create the named in-process broker if it does not exist.
    #[arg(long)]
    pub autobroker: bool,

    /// Connection timeout in milliseconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long = "loglevel", visible_alias = "log_level")]
    pub log_level: Option<LogLevel>,
}

impl CoreArgs {
    pub fn parse_init(init: &str) -> Result<Self, ConfigError> {
        parse_init(init)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_millis)
    }
}

/// Federate properties that may change after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "property", content = "value")]
pub enum Property {
    TimeDelta(Time),
    Lookahead(Time),
    Period(Time),
    Offset(Time),
    LogLevel(LogLevel),
    /// Iterations allowed at one time before the federate is forced onward.
    MaxIterations(u32),
}

/// Information needed to create a federate.
///
/// ```ignore
/// let info = FederateInfo::new("core1")
///     .with_core_type(CoreType::Inproc)
///     .with_core_init_string("--broker=main")
///     .with_lookahead(0.5);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederateInfo {
    pub core_name: String,
    #[serde(default)]
    pub core_type: CoreType,
    #[serde(default)]
    pub core_init_string: String,
    #[serde(default = "default_time_delta")]
    pub time_delta: Time,
    #[serde(default)]
    pub lookahead: Time,
    #[serde(default)]
    pub period: Time,
    #[serde(default)]
    pub offset: Time,
    #[serde(default)]
    pub log_level: LogLevel,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Upper bound on blocking waits for exec and time grants.
    #[serde(default)]
    pub grant_timeout: Option<Duration>,
}

fn default_time_delta() -> Time {
    Time::EPSILON
}

fn default_max_iterations() -> u32 {
    50
}

impl Default for FederateInfo {
    fn default() -> Self {
        Self::new("core")
    }
}

impl FederateInfo {
    pub fn new(core_name: impl Into<String>) -> Self {
        Self {
            core_name: core_name.into(),
            core_type: CoreType::Default,
            core_init_string: String::new(),
            time_delta: default_time_delta(),
            lookahead: Time::ZERO,
            period: Time::ZERO,
            offset: Time::ZERO,
            log_level: LogLevel::default(),
            max_iterations: default_max_iterations(),
            grant_timeout: None,
        }
    }

    pub fn with_core_type(mut self, core_type: CoreType) -> Self {
        self.core_type = core_type;
        self
    }

    pub fn with_core_init_string(mut self, init: impl Into<String>) -> Self {
        self.core_init_string = init.into();
        self
    }

    pub fn with_time_delta(mut self, delta: impl Into<Time>) -> Self {
        self.time_delta = delta.into();
        self
    }

    pub fn with_lookahead(mut self, lookahead: impl Into<Time>) -> Self {
        self.lookahead = lookahead.into();
        self
    }

    pub fn with_period(mut self, period: impl Into<Time>) -> Self {
        self.period = period.into();
        self
    }

    pub fn with_offset(mut self, offset: impl Into<Time>) -> Self {
        self.offset = offset.into();
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_grant_timeout(mut self, timeout: Duration) -> Self {
        self.grant_timeout = Some(timeout);
        self
    }

    /// Apply one property change.
    pub fn apply(&mut self, property: Property) -> Result<(), ConfigError> {
        match property {
            Property::TimeDelta(t) => self.time_delta = non_negative("time_delta", t)?,
            Property::Lookahead(t) => self.lookahead = non_negative("lookahead", t)?,
            Property::Period(t) => self.period = non_negative("period", t)?,
            Property::Offset(t) => self.offset = non_negative("offset", t)?,
            Property::LogLevel(l) => self.log_level = l,
            Property::MaxIterations(n) => self.max_iterations = n,
        }
        Ok(())
    }

    pub fn time_properties(&self) -> TimeProperties {
        TimeProperties {
            time_delta: self.time_delta,
            lookahead: self.lookahead,
            period: self.period,
            offset: self.offset,
        }
    }

    /// Validate and parse the core init string.
    pub fn validate(&self) -> Result<CoreArgs, ConfigError> {
        if self.core_name.trim().is_empty() {
            return Err(ConfigError::Invalid("core_name cannot be empty".into()));
        }
        self.core_type.resolve()?;
        non_negative("time_delta", self.time_delta)?;
        non_negative("lookahead", self.lookahead)?;
        non_negative("period", self.period)?;
        non_negative("offset", self.offset)?;
        if self.time_delta.is_max() || self.period.is_max() {
            return Err(ConfigError::Invalid("time_delta and period must be finite".into()));
        }
        CoreArgs::parse_init(&self.core_init_string)
    }
}

fn non_negative(what: &str, t: Time) -> Result<Time, ConfigError> {
    if t.is_negative() {
        return Err(ConfigError::Invalid(format!("{} cannot be negative", what)));
    }
    Ok(t)
}
