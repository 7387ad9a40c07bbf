// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Per-component log filtering.
//!
//! Every broker and federate carries its own numeric [`LogLevel`]. Records
//! that pass the component's level are forwarded to the `log` facade, so the
//! host application picks the sink (the broker binary installs a
//! `tracing-subscriber`).
//!
//! | Level | Meaning     | `log` level |
//! |-------|-------------|-------------|
//! | -1    | none        | -           |
//! | 0     | error       | Error       |
//! | 1     | warning     | Warn        |
//! | 2     | summary     | Info        |
//! | 3     | connections | Info        |
//! | 4     | interfaces  | Debug       |
//! | 5     | timing      | Debug       |
//! | 6     | data        | Trace       |
//! | 7     | trace       | Trace       |

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Numeric verbosity level.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "i8", into = "i8")]
#[repr(i8)]
pub enum LogLevel {
    None = -1,
    Error = 0,
    #[default]
    Warning = 1,
    Summary = 2,
    Connections = 3,
    Interfaces = 4,
    Timing = 5,
    Data = 6,
    Trace = 7,
}

impl LogLevel {
    const ALL: [LogLevel; 9] = [
        LogLevel::None,
        LogLevel::Error,
        LogLevel::Warning,
        LogLevel::Summary,
        LogLevel::Connections,
        LogLevel::Interfaces,
        LogLevel::Timing,
        LogLevel::Data,
        LogLevel::Trace,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::None => "none",
            LogLevel::Error => "error",
            LogLevel::Warning => "warning",
            LogLevel::Summary => "summary",
            LogLevel::Connections => "connections",
            LogLevel::Interfaces => "interfaces",
            LogLevel::Timing => "timing",
            LogLevel::Data => "data",
            LogLevel::Trace => "trace",
        }
    }

    /// Whether a record at `at` passes this filter.
    pub fn enabled(self, at: LogLevel) -> bool {
        at != LogLevel::None && at <= self
    }

    /// Matching `log` facade level.
    pub fn as_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::None => None,
            LogLevel::Error => Some(log::Level::Error),
            LogLevel::Warning => Some(log::Level::Warn),
            LogLevel::Summary | LogLevel::Connections => Some(log::Level::Info),
            LogLevel::Interfaces | LogLevel::Timing => Some(log::Level::Debug),
            LogLevel::Data | LogLevel::Trace => Some(log::Level::Trace),
        }
    }
}

impl TryFrom<i8> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: i8) -> Result<Self, ConfigError> {
        LogLevel::ALL
            .into_iter()
            .find(|l| *l as i8 == value)
            .ok_or_else(|| ConfigError::Invalid(format!("log level {} out of range -1..=7", value)))
    }
}

impl From<LogLevel> for i8 {
    fn from(level: LogLevel) -> i8 {
        level as i8
    }
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    /// Accepts the numeric level or its name.
    fn from_str(s: &str) -> Result<Self, ConfigError> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i8>() {
            return LogLevel::try_from(n);
        }
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "no_print" | "off" => return Ok(LogLevel::None),
            "warn" => return Ok(LogLevel::Warning),
            "debug" => return Ok(LogLevel::Timing),
            _ => {}
        }
        LogLevel::ALL
            .into_iter()
            .find(|l| l.as_str() == lower)
            .ok_or_else(|| ConfigError::Invalid(format!("unknown log level '{}'", s)))
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named log source with its own filter.
#[derive(Debug, Clone)]
pub struct Logger {
    name: String,
    level: LogLevel,
}

impl Logger {
    pub fn new(name: impl Into<String>, level: LogLevel) -> Self {
        Self {
            name: name.into(),
            level,
        }
    }

    pub fn level(&self) -> LogLevel {
        self.level
    }

    pub fn set_level(&mut self, level: LogLevel) {
        self.level = level;
    }

    pub fn enabled(&self, at: LogLevel) -> bool {
        self.level.enabled(at)
    }

    /// Forward one record to the `log` facade if `at` passes the filter.
    pub fn log(&self, at: LogLevel, args: fmt::Arguments<'_>) {
        if !self.enabled(at) {
            return;
        }
        if let Some(level) = at.as_log_level() {
            log::log!(target: "cosim", level, "[{}] {}", self.name, args);
        }
    }
}

/// `emit!(logger, Timing, "granted {}", t)`
macro_rules! emit {
    ($logger:expr, $level:ident, $($arg:tt)+) => {
        $logger.log($crate::logging::LogLevel::$level, format_args!($($arg)+))
    };
}
pub(crate) use emit;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_named_parse() {
        assert_eq!("5".parse::<LogLevel>().unwrap(), LogLevel::Timing);
        assert_eq!("-1".parse::<LogLevel>().unwrap(), LogLevel::None);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert!("8".parse::<LogLevel>().is_err());
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_filtering() {
        assert!(LogLevel::Timing.enabled(LogLevel::Error));
        assert!(LogLevel::Timing.enabled(LogLevel::Timing));
        assert!(!LogLevel::Timing.enabled(LogLevel::Data));
        assert!(!LogLevel::None.enabled(LogLevel::Error));
        assert!(!LogLevel::Trace.enabled(LogLevel::None));
    }

    #[test]
    fn test_log_facade_mapping() {
        assert_eq!(LogLevel::Summary.as_log_level(), Some(log::Level::Info));
        assert_eq!(LogLevel::Data.as_log_level(), Some(log::Level::Trace));
        assert_eq!(LogLevel::None.as_log_level(), None);
    }

    #[test]
    fn test_serde_as_number() {
        assert_eq!(serde_json::to_string(&LogLevel::Timing).unwrap(), "5");
        let level: LogLevel = serde_json::from_str("3").unwrap();
        assert_eq!(level, LogLevel::Connections);
        assert!(serde_json::from_str::<LogLevel>("12").is_err());
    }
}
