//! faultbox: A fault-isolating harness for exercising untrusted code
//! in-process, converting crashes, hangs and termination calls into
//! inspectable results
//!
//! # Architecture
//!
//! This crate is organized by harness concern:
//!
//! ## Execution Envelope ([`envelope`])
//! - [`envelope::trampoline`]: Non-local return plumbing (`sigsetjmp`/`siglongjmp`)
//! - [`envelope::signals`]: Fault signal arming and the profiling timeout timer
//! - [`envelope::stdio`]: Stdin/stdout redirection to files for a supervised run
//! - [`envelope::fdmon`]: File descriptor watermark and leak sweep
//!
//! ## Call Interception ([`mock`])
//! - [`mock::process`]: exit family, abort, sleep, fork, wait, waitpid, execl
//! - [`mock::signals`]: kill, raise, signal, sigaction, pause, alarm
//! - [`mock::msg`] / [`mock::sem`] / [`mock::shm`]: System V IPC families
//! - [`mock::fifo`]: mkfifo and the S_ISFIFO mode test
//! - [`mock::fs`]: remove, unlink, atoi, fclose, fread, fwrite, fseek
//!
//! ## Verification ([`record`], [`probe`], [`report`])
//! - [`record::logbuf`]: Bounded success/error/data verification logs
//! - [`record::stats`]: Error/info counters and phase pass/fail summaries
//! - [`probe`]: Pointer validity classification by guarded access
//! - [`report`]: JSON phase summaries
//!
//! ## Policy & Fixtures ([`policy`], [`lockfile`])
//! - [`policy`]: Between-phases reset and the safe default policy
//! - [`lockfile`]: Zero-permission lock files for permission tests
//!
//! # Design Principles
//!
//! 1. **Contain, never terminate** - The tested code's exit, abort,
//!    fault or overrun ends the supervised block, not the test process
//! 2. **Handlers stay minimal** - Signal handlers store atomics and
//!    jump; diagnostics are formatted after control lands back
//! 3. **C surface for tested code, Rust surface for the harness** -
//!    Mocks return libc-shaped values; control APIs return `Result`
//! 4. **Evidence-backed verdicts** - Pass/fail comes from counters and
//!    consumable logs, never from guessing at side effects

// Execution envelope
pub mod envelope;

// Call interception
pub mod mock;

// Verification logs and counters
pub mod record;

// Pointer validity prober
pub mod probe;

// Structured phase reports
pub mod report;

// Reset and default policy
pub mod policy;

// Zero-permission lock-file fixtures
pub mod lockfile;

// Shared types and errors
pub mod config;

// Re-export commonly used types for convenience
pub use config::types::*;
pub use envelope::{in_envelope, run_catching, run_catching_io, set_timeout, Outcome};
pub use policy::reset;
pub use probe::{check_const_ptr, check_ptr};
