/// Fault-signal and timeout arming for the execution envelope.
///
/// Four fault signals (SIGSEGV, SIGBUS, SIGFPE, SIGILL) are pointed at
/// a common handler that records the signal number and performs a
/// non-local return into the envelope. When a positive timeout is
/// configured, SIGPROF joins them and an `ITIMER_PROF` interval timer
/// is started for the configured duration.
///
/// Failure to install or restore any disposition, or to manage the
/// timer, is a harness-fatal defect: subsequent fault isolation could
/// not be trusted, so the process terminates with status 1.
use crate::envelope::trampoline;
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::raw::c_int;
use std::ptr;

/// Signals the envelope claims while armed.
pub const FAULT_SIGNALS: [Signal; 4] = [
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGFPE,
    Signal::SIGILL,
];

/// Dispositions saved at arm time, restored at disarm time.
pub(crate) struct SavedDispositions {
    faults: [SigAction; 4],
    prof: Option<SigAction>,
}

pub(crate) fn fatal(what: &str, err: nix::errno::Errno) -> ! {
    log::error!("(*critical*) {what}: {err}");
    eprintln!("faultbox: (*critical*) {what}: {err}");
    std::process::exit(1);
}

/// Common handler: record which signal fired, then jump back into the
/// envelope. No allocation, no formatting, no locks.
extern "C" fn fault_handler(sig: c_int) {
    trampoline::record_signal(sig);
    unsafe { trampoline::trigger_from_handler() }
}

fn install(sig: Signal) -> SigAction {
    let act = SigAction::new(
        SigHandler::Handler(fault_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    match unsafe { signal::sigaction(sig, &act) } {
        Ok(old) => old,
        Err(e) => fatal("unable to set envelope signal handler", e),
    }
}

fn restore(sig: Signal, old: &SigAction) {
    if let Err(e) = unsafe { signal::sigaction(sig, old) } {
        fatal("unable to restore signal handler", e);
    }
}

fn set_prof_timer(seconds: f64) {
    let secs = seconds.floor();
    let value = libc::itimerval {
        it_value: libc::timeval {
            tv_sec: secs as libc::time_t,
            tv_usec: ((seconds - secs) * 1.0e6) as libc::suseconds_t,
        },
        it_interval: libc::timeval {
            tv_sec: 0,
            tv_usec: 0,
        },
    };
    // nix does not wrap setitimer; call it raw, as with other gaps.
    let rc = unsafe { libc::setitimer(libc::ITIMER_PROF, &value, ptr::null_mut()) };
    if rc < 0 {
        fatal(
            "unable to manage timeout itimer",
            nix::errno::Errno::last(),
        );
    }
}

/// Arm the fault signals and, for `timeout > 0`, the profiling timer.
pub(crate) fn arm(timeout: f64) -> SavedDispositions {
    let faults = [
        install(Signal::SIGSEGV),
        install(Signal::SIGBUS),
        install(Signal::SIGFPE),
        install(Signal::SIGILL),
    ];

    let prof = if timeout > 0.0 {
        let old = install(Signal::SIGPROF);
        set_prof_timer(timeout);
        Some(old)
    } else {
        None
    };

    trampoline::clear_caught_signal();
    SavedDispositions { faults, prof }
}

/// Disarm the timer (if armed) and restore every saved disposition.
/// Runs exactly once per envelope invocation, on every exit path.
pub(crate) fn disarm(saved: SavedDispositions) {
    if let Some(ref old_prof) = saved.prof {
        set_prof_timer(0.0);
        restore(Signal::SIGPROF, old_prof);
    }

    for (sig, old) in FAULT_SIGNALS.iter().zip(saved.faults.iter()) {
        restore(*sig, old);
    }
}

/// Human-readable description of a fault signal for envelope
/// diagnostics, emitted after the non-local return lands.
pub(crate) fn describe_fault(sig: i32) -> String {
    match Signal::try_from(sig) {
        Ok(Signal::SIGSEGV) => "Segmentation fault (SIGSEGV)".to_owned(),
        Ok(Signal::SIGBUS) => "Bus error (SIGBUS)".to_owned(),
        Ok(Signal::SIGFPE) => "Floating point exception / division by 0 (SIGFPE)".to_owned(),
        Ok(Signal::SIGILL) => "Illegal instruction (SIGILL)".to_owned(),
        Ok(Signal::SIGPROF) => "Timeout (SIGPROF)".to_owned(),
        Ok(other) => format!("Unexpected signal {} ({sig}) caught!", other.as_str()),
        Err(_) => format!("Unexpected signal {sig} caught!"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_fault_names() {
        assert!(describe_fault(libc::SIGSEGV).contains("SIGSEGV"));
        assert!(describe_fault(libc::SIGPROF).contains("Timeout"));
        assert!(describe_fault(libc::SIGUSR1).contains("Unexpected"));
    }
}
