//! File logger for maestro sessions.
//!
//! Lines go to `~/.maestro/maestro.log`, truncated each time the binary
//! starts. The threshold is INFO, DEBUG with `--debug` or `MAESTRO_DEBUG=1`,
//! and `MAESTRO_LOG=<level>` overrides both.
//!
//! What lands where:
//! - ERROR: rejected worker reports, undelivered assignments
//! - WARN: dropped dependency edges, unresolved references, stalled runs
//! - INFO: graph builds, run start and finish
//! - DEBUG: lifecycle transitions and dispatches
//! - TRACE: how the parser classified each line
//!
//! Until [`init_with_debug`] succeeds every message is discarded, which is
//! what library users and unit tests get.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Config;
use crate::{Error, Result};

static LOGGER: OnceLock<Logger> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    const ALL: [LogLevel; 5] = [
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_repr(v: u8) -> Self {
        Self::ALL
            .get(usize::from(v))
            .copied()
            .unwrap_or(LogLevel::Trace)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Validation(format!("unknown log level '{}'", s)))
    }
}

/// Appends timestamped lines to one file, dropping anything less severe
/// than its threshold.
#[derive(Debug)]
pub struct Logger {
    path: PathBuf,
    level: AtomicU8,
}

impl Logger {
    /// Create (or truncate) the log file, along with missing parent
    /// directories.
    pub fn create(path: impl Into<PathBuf>, level: LogLevel) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        File::create(&path)?;
        Ok(Self {
            path,
            level: AtomicU8::new(level as u8),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_repr(self.level.load(Ordering::Relaxed))
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level()
    }

    /// Formatting is deferred until the level check passes.
    pub fn write(&self, level: LogLevel, args: fmt::Arguments<'_>) {
        if !self.enabled(level) {
            return;
        }
        if let Ok(mut file) = OpenOptions::new().append(true).open(&self.path) {
            let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
            let _ = writeln!(file, "{} {:<5} {}", stamp, level, args);
        }
    }
}

/// Resolve the threshold from the `--debug` flag and the raw values of
/// `MAESTRO_LOG` and `MAESTRO_DEBUG`.
fn threshold(debug: bool, log_var: Option<&str>, debug_var: Option<&str>) -> LogLevel {
    if let Some(level) = log_var.and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = debug_var.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Start logging to `~/.maestro/maestro.log`. Only the first call has an
/// effect.
pub fn init_with_debug(debug: bool) {
    let log_var = std::env::var("MAESTRO_LOG").ok();
    let debug_var = std::env::var("MAESTRO_DEBUG").ok();
    let level = threshold(debug, log_var.as_deref(), debug_var.as_deref());

    let Ok(dir) = Config::maestro_dir() else {
        return;
    };
    match Logger::create(dir.join("maestro.log"), level) {
        Ok(logger) => {
            let _ = LOGGER.set(logger);
        }
        Err(e) => eprintln!("warning: logging disabled: {}", e),
    }
}

/// Write through the process logger, if one was started.
pub fn write(level: LogLevel, args: fmt::Arguments<'_>) {
    if let Some(logger) = LOGGER.get() {
        logger.write(level, args);
    }
}

#[macro_export]
macro_rules! mlog {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! mlog_error {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! mlog_warn {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! mlog_debug {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! mlog_trace {
    ($($arg:tt)*) => {
        $crate::log::write($crate::log::LogLevel::Trace, format_args!($($arg)*))
    };
}
