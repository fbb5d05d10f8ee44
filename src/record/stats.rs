/// Phase statistics and console reporting.
///
/// Two monotonically increasing counters decide whether a test phase
/// passed: every reported error bumps `errors`, every informational or
/// success message bumps `infos`. The counters are process-wide and
/// reset explicitly between phases.
use crate::record::logbuf::{ERROR, SUCCESS};
use std::sync::Mutex;

#[derive(Debug, Default, Clone, Copy)]
struct Stats {
    errors: u32,
    infos: u32,
}

static STATS: Mutex<Stats> = Mutex::new(Stats {
    errors: 0,
    infos: 0,
});

fn with_stats<R>(f: impl FnOnce(&mut Stats) -> R) -> R {
    let mut guard = STATS.lock().unwrap_or_else(|e| e.into_inner());
    f(&mut guard)
}

/// Report a test-defect error and bump the error counter.
/// Returns the updated error count.
pub fn error(msg: impl AsRef<str>) -> u32 {
    let msg = msg.as_ref();
    log::error!("{msg}");
    println!("\u{1b}[1;31m[\u{2717}]\u{1b}[0m {msg}");
    with_stats(|s| {
        s.errors += 1;
        s.errors
    })
}

/// Report an informational message and bump the info counter.
/// Returns the updated info count.
pub fn info(msg: impl AsRef<str>) -> u32 {
    let msg = msg.as_ref();
    log::info!("{msg}");
    println!("\u{1b}[1;34m[\u{2139}]\u{1b}[0m {msg}");
    with_stats(|s| {
        s.infos += 1;
        s.infos
    })
}

/// Report a success message and bump the info counter.
/// Returns the updated info count.
pub fn success(msg: impl AsRef<str>) -> u32 {
    let msg = msg.as_ref();
    log::info!("{msg}");
    println!("\u{1b}[1;32m[\u{2714}]\u{1b}[0m {msg}");
    with_stats(|s| {
        s.infos += 1;
        s.infos
    })
}

/// Errors reported since the last reset.
pub fn error_count() -> u32 {
    with_stats(|s| s.errors)
}

/// Informational/success events reported since the last reset.
pub fn info_count() -> u32 {
    with_stats(|s| s.infos)
}

/// Zero both counters.
pub fn reset() {
    with_stats(|s| *s = Stats::default());
}

/// Print a pass/fail summary for the named phase and return the number
/// of errors it accumulated.
pub fn phase_complete(msg: &str) -> u32 {
    let errors = error_count();
    if errors > 0 {
        println!("\u{1b}[1;31m[\u{2717}]\u{1b}[0m {msg} completed with {errors} error(s).");
    } else {
        println!("\u{1b}[1;32m[\u{2714}]\u{1b}[0m {msg} completed with no errors.");
    }
    println!();
    errors
}

/// Check that `expected` is at the head of the success log.
///
/// On a match the head line is consumed and a success is reported;
/// otherwise an error is reported and the log is left untouched.
pub fn check_success_head(expected: &str) -> bool {
    let head = SUCCESS.head();
    if SUCCESS.remove_head_if(expected) {
        success(format!("Success log ok: '{head}'"));
        true
    } else {
        error(format!(
            "Invalid success log message, expected '{expected}', got '{head}'"
        ));
        false
    }
}

/// Check that `expected` is at the head of the error log.
///
/// On a match the head line is consumed and a success is reported;
/// otherwise an error is reported and the log is left untouched.
pub fn check_error_head(expected: &str) -> bool {
    let head = ERROR.head();
    if ERROR.remove_head_if(expected) {
        success(format!("Error log ok: '{head}'"));
        true
    } else {
        error(format!(
            "Invalid error log message, expected '{expected}', got '{head}'"
        ));
        false
    }
}

/// Report any unconsumed success/error log lines for the named phase,
/// then clear all verification logs.
pub fn close_logs(msg: &str) {
    if !SUCCESS.is_empty() {
        info(format!("{msg} Remaining messages on success log"));
        SUCCESS.print_all();
    }
    if !ERROR.is_empty() {
        info(format!("{msg} Remaining messages on error log"));
        ERROR.print_all();
    }
    crate::record::logbuf::clear_logs();
}
