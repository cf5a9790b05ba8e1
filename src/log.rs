//! Structured logging.
//!
//! Format: `[pid=X][subsys][LEVEL] message`. Levels: ERROR, WARN, INFO, DEBUG, TRACE.
//! The kernel is single-CPU, so unlike a SMP logger there is no `cpuN` field -
//! only the PID of whichever process is currently executing in kernel mode
//! (or `-` during early boot, before a scheduler exists).

use core::fmt;
use core::sync::atomic::{AtomicU8, Ordering};

/// Log levels for kernel logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    /// Critical errors that may cause system instability.
    Error = 0,
    /// Warning conditions that should be addressed.
    Warn = 1,
    /// Informational messages about important events.
    Info = 2,
    /// Detailed debugging information.
    Debug = 3,
    /// Very verbose tracing information.
    Trace = 4,
}

impl LogLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Global log level filter. Only messages at or below this level are logged.
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

pub fn set_log_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn get_log_level() -> LogLevel {
    match LOG_LEVEL.load(Ordering::Relaxed) {
        0 => LogLevel::Error,
        1 => LogLevel::Warn,
        2 => LogLevel::Info,
        3 => LogLevel::Debug,
        4 => LogLevel::Trace,
        _ => LogLevel::Info,
    }
}

#[inline]
pub fn should_log(level: LogLevel) -> bool {
    level <= get_log_level()
}

#[doc(hidden)]
pub fn _log(level: LogLevel, subsys: &str, args: fmt::Arguments) {
    if !should_log(level) {
        return;
    }

    let pid = crate::proc::scheduler::current_pid_for_log();

    use crate::serial_println;
    match pid {
        Some(pid) => serial_println!("[pid={}][{}][{}] {}", pid, subsys, level.as_str(), args),
        None => serial_println!("[pid=-][{}][{}] {}", subsys, level.as_str(), args),
    }
}

#[macro_export]
macro_rules! log_error {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log($crate::log::LogLevel::Error, $subsys, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log($crate::log::LogLevel::Warn, $subsys, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log($crate::log::LogLevel::Info, $subsys, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_debug {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log($crate::log::LogLevel::Debug, $subsys, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_trace {
    ($subsys:expr, $($arg:tt)*) => {
        $crate::log::_log($crate::log::LogLevel::Trace, $subsys, format_args!($($arg)*))
    };
}
