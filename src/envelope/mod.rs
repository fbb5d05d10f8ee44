/// Execution envelope: supervised invocation of untrusted code.
///
/// [`run_catching`] arms the fault signals (and the profiling timer
/// when a timeout is configured), runs the supplied block, and converts
/// crashes, captured terminations and overruns into a normal return
/// carrying an [`Outcome`]. [`run_catching_io`] additionally redirects
/// the standard streams to files for the duration of the block. Both
/// sweep leaked file descriptors at teardown.
pub mod fdmon;
pub mod signals;
pub mod stdio;
pub mod trampoline;

use crate::config::types::{Result, TermReason};
use crate::record::stats;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

pub use trampoline::{in_envelope, trigger, JumpCode};

/// Timeout applied to the next envelope, in seconds. `0` disables the
/// profiling timer.
static TIMEOUT: Mutex<Option<f64>> = Mutex::new(None);

/// Exit status captured by the exit-family mocks, `-1` when none.
static EXIT_STATUS: AtomicI32 = AtomicI32::new(-1);

/// Set the timeout for subsequent envelopes. Non-positive disables it.
pub fn set_timeout(seconds: f64) {
    let mut guard = TIMEOUT.lock().unwrap_or_else(|e| e.into_inner());
    *guard = Some(if seconds > 0.0 { seconds } else { 0.0 });
}

/// Restore the compile-time default timeout.
pub fn reset_timeout() {
    let mut guard = TIMEOUT.lock().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

/// The timeout the next envelope will arm with.
pub fn timeout() -> f64 {
    let guard = TIMEOUT.lock().unwrap_or_else(|e| e.into_inner());
    guard.unwrap_or_else(crate::config::types::default_timeout)
}

/// Record the status passed to a captured exit-family call.
pub(crate) fn record_exit_status(status: i32) {
    EXIT_STATUS.store(status, Ordering::SeqCst);
}

fn take_exit_status() -> Option<i32> {
    match EXIT_STATUS.swap(-1, Ordering::SeqCst) {
        -1 => None,
        status => Some(status),
    }
}

/// How a supervised block terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub reason: TermReason,
    /// Fault signal number, for [`TermReason::Signal`].
    pub signal: Option<i32>,
    /// Captured exit status, for [`TermReason::Exit`].
    pub exit_status: Option<i32>,
}

impl Outcome {
    fn normal() -> Self {
        Outcome {
            reason: TermReason::Normal,
            signal: None,
            exit_status: None,
        }
    }

    fn with_reason(reason: TermReason) -> Self {
        Outcome {
            reason,
            signal: None,
            exit_status: None,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.reason == TermReason::Normal
    }

    /// One-line human description of the termination.
    pub fn describe(&self) -> String {
        match self.reason {
            TermReason::Normal => "code returned normally".to_owned(),
            TermReason::Exit => match self.exit_status {
                Some(status) => format!("exit({status}) called"),
                None => "exit() called".to_owned(),
            },
            TermReason::Abort => "abort() called".to_owned(),
            TermReason::Blocked => "blocked function called".to_owned(),
            TermReason::Signal => match self.signal {
                Some(sig) => match nix::sys::signal::Signal::try_from(sig) {
                    Ok(name) => format!("signal {} caught", name.as_str()),
                    Err(_) => format!("signal {sig} caught"),
                },
                None => "signal caught".to_owned(),
            },
            TermReason::LogOverflow => "log buffer full".to_owned(),
        }
    }
}

fn outcome_from(code: Option<JumpCode>) -> Outcome {
    match code {
        None => {
            if trampoline::panicked() {
                // A panic is the Rust-side analogue of abort().
                stats::info("Supervised code panicked");
                Outcome::with_reason(TermReason::Abort)
            } else {
                Outcome::normal()
            }
        }
        Some(JumpCode::Exit) => Outcome {
            reason: TermReason::Exit,
            signal: None,
            exit_status: take_exit_status(),
        },
        Some(JumpCode::Abort) => Outcome::with_reason(TermReason::Abort),
        Some(JumpCode::Blocked) => Outcome::with_reason(TermReason::Blocked),
        Some(JumpCode::Signal) => {
            let sig = trampoline::caught_signal();
            if let Some(sig) = sig {
                // Diagnostics are formatted here, after the non-local
                // return lands, never inside the handler. A recovered
                // fault is not a counted defect; the outcome carries
                // it and the test author decides.
                stats::info(signals::describe_fault(sig));
            }
            Outcome {
                reason: TermReason::Signal,
                signal: sig,
                exit_status: None,
            }
        }
        Some(JumpCode::LogOverflow) => Outcome::with_reason(TermReason::LogOverflow),
    }
}

/// Run `f` under the envelope without stream redirection.
pub fn run_catching<F: FnOnce()>(f: F) -> Outcome {
    EXIT_STATUS.store(-1, Ordering::SeqCst);
    let watermark = fdmon::watermark();
    let saved = signals::arm(timeout());
    let code = trampoline::catch(f);
    signals::disarm(saved);
    let outcome = outcome_from(code);
    fdmon::sweep(watermark);
    outcome
}

/// Run `f` under the envelope with stdin and/or stdout redirected to
/// the named files. `stdout_file` is recreated fresh for the run.
pub fn run_catching_io<F: FnOnce()>(
    f: F,
    stdin_file: Option<&Path>,
    stdout_file: Option<&Path>,
) -> Result<Outcome> {
    EXIT_STATUS.store(-1, Ordering::SeqCst);
    let redirect = stdio::redirect(stdin_file, stdout_file)?;
    // Probed after redirection so the sweep spares the saved stream
    // descriptors.
    let watermark = fdmon::watermark();
    let saved = signals::arm(timeout());
    let code = trampoline::catch(f);
    signals::disarm(saved);
    // Teardown runs to completion even when the restore fails; the
    // failure is a reported defect, not an early return.
    if let Err(e) = redirect.restore() {
        stats::error(e.to_string());
    }
    let outcome = outcome_from(code);
    fdmon::sweep(watermark);
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_exit_with_status() {
        let outcome = Outcome {
            reason: TermReason::Exit,
            signal: None,
            exit_status: Some(100),
        };
        assert_eq!(outcome.describe(), "exit(100) called");
    }

    #[test]
    fn test_describe_signal_names_the_signal() {
        let outcome = Outcome {
            reason: TermReason::Signal,
            signal: Some(libc::SIGSEGV),
            exit_status: None,
        };
        assert_eq!(outcome.describe(), "signal SIGSEGV caught");
    }

    #[test]
    fn test_timeout_set_and_reset() {
        set_timeout(1.5);
        assert_eq!(timeout(), 1.5);
        set_timeout(-3.0);
        assert_eq!(timeout(), 0.0);
        reset_timeout();
        assert_eq!(timeout(), crate::config::types::default_timeout());
    }

    #[test]
    fn test_outcome_serializes() {
        let outcome = Outcome {
            reason: TermReason::Exit,
            signal: None,
            exit_status: Some(3),
        };
        let json = serde_json::to_string(&outcome).unwrap();
        assert!(json.contains("\"exit_status\":3"));
    }
}
