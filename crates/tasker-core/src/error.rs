//! Error types for the tasker runtime
//!
//! Every fallible operation reports a [`ThreadError`] carrying the error
//! kind, the operation that raised it and a human-readable description.
//! Timeouts are not errors; bounded waits return them as ordinary outcomes.

use core::fmt;

/// Result type for runtime operations
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Category of a runtime error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Operation illegal for the current thread/task state
    InvalidState,

    /// Construction-time invariant violated
    BadValue,

    /// Native primitive creation, use or destruction failed
    OsFailure,

    /// Synchronous self-post detected
    SelfDeadlock,
}

impl ErrorKind {
    /// Short upper-case name used in messages
    pub const fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidState => "INVALID_STATE",
            ErrorKind::BadValue => "BAD_VALUE",
            ErrorKind::OsFailure => "OS_FAILURE",
            ErrorKind::SelfDeadlock => "SELF_DEADLOCK",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error raised by a runtime operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadError {
    kind: ErrorKind,
    op: &'static str,
    message: String,
    os_error: Option<i32>,
}

impl ThreadError {
    /// Create an error of the given kind
    pub fn new(kind: ErrorKind, op: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind,
            op,
            message: message.into(),
            os_error: None,
        }
    }

    pub fn invalid_state(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidState, op, message)
    }

    pub fn bad_value(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadValue, op, message)
    }

    pub fn self_deadlock(op: &'static str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SelfDeadlock, op, message)
    }

    /// OS failure from a raw error code (pthread return value or errno)
    pub fn os(op: &'static str, message: impl Into<String>, code: i32) -> Self {
        Self {
            kind: ErrorKind::OsFailure,
            op,
            message: message.into(),
            os_error: Some(code),
        }
    }

    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Operation that raised the error, e.g. `"Thread::join"`
    #[inline]
    pub fn op(&self) -> &'static str {
        self.op
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[inline]
    pub fn os_error(&self) -> Option<i32> {
        self.os_error
    }
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.kind, self.message, self.op)?;
        if let Some(code) = self.os_error {
            write!(f, ": {}", std::io::Error::from_raw_os_error(code))?;
        }
        Ok(())
    }
}

impl std::error::Error for ThreadError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = ThreadError::invalid_state("Thread::join", "thread is detached");
        assert_eq!(format!("{}", e), "INVALID_STATE: thread is detached (Thread::join)");

        let e = ThreadError::bad_value("Semaphore::new", "initial count too large");
        assert_eq!(e.kind(), ErrorKind::BadValue);
        assert_eq!(e.op(), "Semaphore::new");
    }

    #[test]
    fn test_os_error_carries_code() {
        let e = ThreadError::os("Mutex::new", "pthread_mutex_init failed", 12);
        assert_eq!(e.kind(), ErrorKind::OsFailure);
        assert_eq!(e.os_error(), Some(12));
        let text = format!("{}", e);
        assert!(text.starts_with("OS_FAILURE: pthread_mutex_init failed (Mutex::new): "));
    }
}
