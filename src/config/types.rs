/// Core types and structures shared across the faultbox harness
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of lines a verification log can hold before overflowing.
pub const LOG_CAPACITY: usize = 64;

/// Maximum length, in bytes, of a single verification log line. Longer
/// lines are truncated at append time.
pub const LOG_LINE_MAX: usize = 256;

/// Longest path captured into mock state (mirrors PATH_MAX usage).
pub const PATH_CAPTURE_MAX: usize = 4096;

/// Compile-time default timeout for the execution envelope, in seconds.
///
/// Override at build time with the `FAULTBOX_TIMEOUT` environment
/// variable; `0` disables timeout enforcement. Fractional values are
/// honored at microsecond resolution.
pub fn default_timeout() -> f64 {
    match option_env!("FAULTBOX_TIMEOUT") {
        Some(raw) => raw.parse().unwrap_or(2.0),
        None => 2.0,
    }
}

/// Outcome policy for an intercepted primitive.
///
/// The first five variants are honored by every mock; the remaining
/// variants are primitive-specific extensions and each mock's
/// documentation states which of them it supports. Setting an
/// unsupported extension falls back to pass-through behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Capture arguments, invoke the real primitive, capture the result.
    #[default]
    Default,
    /// Report an error naming the primitive and abort the supervised
    /// block with [`TermReason::Blocked`].
    Block,
    /// Return the primitive's canonical success value without invoking it.
    Success,
    /// Return the primitive's canonical error value (setting errno)
    /// without invoking it.
    Error,
    /// Append a structured line to the data log, then behave as `Success`.
    Log,
    /// Extension: fail with ENOENT on the first call, succeed on the
    /// second, fail thereafter. Models resources that must be created
    /// before use (msgget, semget, shmget).
    Retry,
    /// Extension: succeed only when a creation flag was supplied
    /// (msgget, semget, shmget).
    CreateOnly,
    /// Extension: as `Default`, but refuse to signal the caller's own
    /// process, parent, process group or owner (kill).
    Protect,
    /// Extension: send/receive using arguments captured by a previous
    /// call instead of the current one (msgsnd, msgrcv).
    Inject,
    /// Extension: report an informational message before the non-local
    /// return (exit, abort).
    Warn,
}

/// Why a supervised block stopped executing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TermReason {
    /// The block ran to completion.
    #[default]
    Normal,
    /// The block called an exit-family primitive; the status was captured.
    Exit,
    /// The block called `abort()` (or panicked).
    Abort,
    /// The block called a primitive configured to `Action::Block`.
    Blocked,
    /// A fault or timeout signal was caught.
    Signal,
    /// A verification log filled up while the envelope was active.
    LogOverflow,
}

/// Classification result of the pointer validity prober.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PtrClass {
    /// A one-byte access at the address completed without a fault.
    Valid,
    /// The null pointer; rejected without probing.
    Null,
    /// The all-bits-one sentinel address; rejected without probing.
    Sentinel,
    /// Accessing the address raised SIGSEGV.
    Segv,
    /// Accessing the address raised SIGBUS.
    BusError,
    /// The probe caught a signal it did not install a handler for.
    Unexpected,
}

impl PtrClass {
    /// True when the address may be dereferenced.
    pub fn is_valid(self) -> bool {
        self == PtrClass::Valid
    }
}

/// Custom error types for faultbox
#[derive(Error, Debug)]
pub enum FaultboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stream redirection error: {0}")]
    Redirect(String),

    #[error("Lock file error: {0}")]
    LockFile(String),

    #[error("Report export error: {0}")]
    Report(String),
}

impl From<nix::errno::Errno> for FaultboxError {
    fn from(err: nix::errno::Errno) -> Self {
        FaultboxError::Redirect(err.to_string())
    }
}

/// Result type alias for faultbox operations
pub type Result<T> = std::result::Result<T, FaultboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_action_is_passthrough() {
        assert_eq!(Action::default(), Action::Default);
    }

    #[test]
    fn test_default_reason_is_normal() {
        assert_eq!(TermReason::default(), TermReason::Normal);
    }

    #[test]
    fn test_ptr_class_validity() {
        assert!(PtrClass::Valid.is_valid());
        assert!(!PtrClass::Null.is_valid());
        assert!(!PtrClass::Segv.is_valid());
    }

    #[test]
    fn test_default_timeout_non_negative() {
        assert!(default_timeout() >= 0.0);
    }
}
