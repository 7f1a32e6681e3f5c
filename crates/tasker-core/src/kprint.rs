//! Kernel-style print macros for the tasker runtime
//!
//! Thread-safe, optionally-flushing diagnostic output in the manner of the
//! Linux kernel's printk. Leveled records are tagged with the
//! [`ThreadHandle`](crate::ThreadHandle) of the emitting thread.
//!
//! # Environment Variables
//!
//! - `TASKER_FLUSH_EPRINT=1` - Flush stderr after each print (useful for debugging crashes)
//! - `TASKER_LOG_LEVEL=<level>` - 0=off, 1=error, 2=warn (default), 3=info, 4=debug, 5=trace
//! - `TASKER_LOG_TIME=1` - Prefix leveled records with milliseconds since first log
//!
//! # Usage
//!
//! ```ignore
//! use tasker_core::{kdebug, kwarn, kerror};
//!
//! kdebug!("thread {} spawned", handle);
//! kwarn!("start() on thread in state {}", state);
//! kerror!("task body panicked: {}", reason);
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

use crate::env::{env_get_bool, env_get_str};
use crate::id::ThreadHandle;

/// Log levels (matches common conventions)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    pub fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Off,
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
    
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    /// Accepts a level name or its number, case-insensitively
    fn from_str(s: &str) -> Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "1" => Ok(LogLevel::Error),
            "warn" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(()),
        }
    }
}

// Global configuration (initialized once)
static FLUSH_ENABLED: AtomicBool = AtomicBool::new(false);
static TIME_ENABLED: AtomicBool = AtomicBool::new(false);
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Warn as u8);
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static START: OnceLock<Instant> = OnceLock::new();

/// Initialize logging from environment variables
///
/// Called automatically on first log, but can be called explicitly for
/// deterministic initialization.
pub fn init() {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }
    
    FLUSH_ENABLED.store(env_get_bool("TASKER_FLUSH_EPRINT", false), Ordering::Relaxed);
    TIME_ENABLED.store(env_get_bool("TASKER_LOG_TIME", false), Ordering::Relaxed);
    START.get_or_init(Instant::now);

    let level = env_get_str("TASKER_LOG_LEVEL", "warn").parse().unwrap_or(LogLevel::Warn);
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Check if flush is enabled
#[inline]
pub fn flush_enabled() -> bool {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    FLUSH_ENABLED.load(Ordering::Relaxed)
}

/// Get current log level
#[inline]
pub fn log_level() -> LogLevel {
    if !INITIALIZED.load(Ordering::Relaxed) {
        init();
    }
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Set log level programmatically
pub fn set_log_level(level: LogLevel) {
    init();
    LOG_LEVEL.store(level as u8, Ordering::Relaxed);
}

/// Set flush mode programmatically
pub fn set_flush_enabled(enabled: bool) {
    init();
    FLUSH_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Enable or disable the elapsed-time prefix
pub fn set_time_enabled(enabled: bool) {
    init();
    TIME_ENABLED.store(enabled, Ordering::Relaxed);
}

/// Check if a log level is enabled
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= log_level() as u8
}

/// Hold the stderr lock for one whole record so lines never interleave
fn emit(write: impl FnOnce(&mut std::io::StderrLock<'static>) -> std::io::Result<()>) {
    let mut out = std::io::stderr().lock();
    let _ = write(&mut out);
    if flush_enabled() {
        let _ = out.flush();
    }
}

#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>) {
    emit(|out| out.write_fmt(args));
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    emit(|out| writeln!(out, "{}", args));
}

/// Leveled record: `[elapsed ms] [LEVEL] [thread] message`
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }
    let thread = ThreadHandle::current();
    emit(|out| {
        if TIME_ENABLED.load(Ordering::Relaxed) {
            let ms = START.get_or_init(Instant::now).elapsed().as_millis();
            write!(out, "{:>8} ", ms)?;
        }
        writeln!(out, "{} [{}] {}", level.prefix(), thread, args)
    });
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr (no newline), with optional auto-flush
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {{
        $crate::kprint::_kprint_impl(format_args!($($arg)*));
    }};
}

/// Print a line to stderr, with optional auto-flush
#[macro_export]
macro_rules! kprintln {
    () => {{
        $crate::kprint::_kprintln_impl(format_args!(""));
    }};
    ($($arg:tt)*) => {{
        $crate::kprint::_kprintln_impl(format_args!($($arg)*));
    }};
}

/// Leveled record at an explicit level
#[macro_export]
macro_rules! klog {
    ($level:expr, $($arg:tt)*) => {{
        $crate::kprint::_klog_impl($level, format_args!($($arg)*));
    }};
}

/// Error level (shown unless logging is off)
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Error, $($arg)*) };
}

#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Debug, $($arg)*) };
}

/// Trace level (most verbose)
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::klog!($crate::kprint::LogLevel::Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_levels() {
        assert!(LogLevel::Off < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_from_u8() {
        assert_eq!(LogLevel::from_u8(0), LogLevel::Off);
        assert_eq!(LogLevel::from_u8(2), LogLevel::Warn);
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("TRACE".parse(), Ok(LogLevel::Trace));
        assert_eq!(" 1 ".parse(), Ok(LogLevel::Error));
        assert_eq!("loud".parse::<LogLevel>(), Err(()));
    }

    #[test]
    fn test_macros_compile() {
        set_log_level(LogLevel::Off);
        set_time_enabled(true);

        kprint!("");
        kerror!("error {}", "msg");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug {}", ThreadHandle::current());
        ktrace!("trace");
        klog!(LogLevel::Info, "explicit");
    }
}
