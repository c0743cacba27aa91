//! Leveled debug printing for the pool engines
//!
//! Thread-safe stderr logging, configured once from the environment.
//! Pools log lifecycle events (spawn, resize, overflow, close) at debug
//! level so production builds stay silent by default.
//!
//! # Environment Variables
//!
//! - `TP_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn, 3=info, 4=debug
//! - `TP_LOG_FLUSH=1` - flush stderr after each line
//!
//! # Output Format
//!
//! `[LEVEL] [tidepool] message`
//!
//! # Usage
//!
//! ```ignore
//! use tidepool_core::{tp_debug, tp_warn};
//!
//! tp_debug!("worker {} retiring", idx);
//! tp_warn!("overflowed {} tasks", n);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use crate::env::env_get_bool;

/// Log levels, lowest to highest verbosity
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
        }
    }
}

static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize logging from environment variables.
///
/// Called automatically on first log; call explicitly for deterministic
/// initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    FLUSH_ENABLED.store(env_get_bool("TP_LOG_FLUSH", false), Ordering::Relaxed);

    if let Ok(val) = std::env::var("TP_LOG_LEVEL") {
        let level = match val.to_lowercase().as_str() {
            "off" | "0" => LogLevel::Off,
            "error" | "1" => LogLevel::Error,
            "warn" | "2" => LogLevel::Warn,
            "info" | "3" => LogLevel::Info,
            "debug" | "4" => LogLevel::Debug,
            _ => LogLevel::Warn,
        };
        LOG_LEVEL.store(level as u8, Ordering::Relaxed);
    }
}

/// Override the log level programmatically.
pub fn set_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// True if a message at `level` would be printed.
#[inline]
pub fn enabled(level: LogLevel) -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    level as u8 <= LOG_LEVEL.load(Ordering::Relaxed)
}

/// Write one formatted line to stderr. Use the macros instead.
#[doc(hidden)]
pub fn emit(level: LogLevel, args: core::fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let stderr = std::io::stderr();
    let mut out = stderr.lock();
    let _ = writeln!(out, "{} [tidepool] {}", level.prefix(), args);
    if FLUSH_ENABLED.load(Ordering::Relaxed) {
        let _ = out.flush();
    }
}

#[macro_export]
macro_rules! tp_error {
    ($($arg:tt)*) => {
        $crate::plog::emit($crate::plog::LogLevel::Error, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! tp_warn {
    ($($arg:tt)*) => {
        $crate::plog::emit($crate::plog::LogLevel::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! tp_info {
    ($($arg:tt)*) => {
        $crate::plog::emit($crate::plog::LogLevel::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! tp_debug {
    ($($arg:tt)*) => {
        $crate::plog::emit($crate::plog::LogLevel::Debug, format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Debug);
        assert!(LogLevel::Off < LogLevel::Error);
    }

    // Single test: the level is process-global and tests run concurrently.
    #[test]
    fn test_set_level_controls_enabled() {
        set_level(LogLevel::Warn);
        assert!(enabled(LogLevel::Error));
        assert!(enabled(LogLevel::Warn));
        assert!(!enabled(LogLevel::Debug));

        set_level(LogLevel::Debug);
        assert!(enabled(LogLevel::Debug));

        set_level(LogLevel::Off);
        assert!(!enabled(LogLevel::Error));
        tp_error!("error {}", 1);
        tp_warn!("warn");
        tp_info!("info");
        tp_debug!("debug");
    }
}
