/// Signal-management primitives: kill, raise, signal, sigaction,
/// pause, alarm.
///
/// The fault and timeout signals the envelope depends on (SIGPROF,
/// SIGSEGV, SIGBUS, SIGFPE, SIGILL) are reserved: signal() and
/// sigaction() refuse to change their dispositions with EINVAL no
/// matter which action is configured.
use crate::config::types::{Action, PtrClass};
use crate::mock::{blocked, set_errno, MockCell};
use crate::probe;
use crate::record::logbuf::datalog;
use crate::record::stats;
use std::os::raw::{c_int, c_void};

#[derive(Debug, Default, Clone)]
pub struct KillData {
    pub pid: libc::pid_t,
    pub sig: c_int,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct RaiseData {
    pub sig: c_int,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct SignalData {
    pub signum: c_int,
    pub handler: libc::sighandler_t,
    pub ret: libc::sighandler_t,
}

#[derive(Debug, Default, Clone)]
pub struct SigactionData {
    pub signum: c_int,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct PauseData {
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct AlarmData {
    /// Seconds requested by the most recent call.
    pub seconds: u32,
    pub ret: u32,
}

pub static KILL: MockCell<KillData> = MockCell::new(
    "kill",
    KillData {
        pid: 0,
        sig: 0,
        ret: 0,
    },
);
pub static RAISE: MockCell<RaiseData> = MockCell::new("raise", RaiseData { sig: 0, ret: 0 });
pub static SIGNAL: MockCell<SignalData> = MockCell::new(
    "signal",
    SignalData {
        signum: 0,
        handler: 0,
        ret: 0,
    },
);
pub static SIGACTION: MockCell<SigactionData> =
    MockCell::new("sigaction", SigactionData { signum: 0, ret: 0 });
pub static PAUSE: MockCell<PauseData> = MockCell::new("pause", PauseData { ret: 0 });
pub static ALARM: MockCell<AlarmData> = MockCell::new("alarm", AlarmData { seconds: 0, ret: 0 });

/// Signals whose dispositions belong to the envelope.
const RESERVED: [(c_int, &str); 5] = [
    (libc::SIGPROF, "SIGPROF"),
    (libc::SIGSEGV, "SIGSEGV"),
    (libc::SIGBUS, "SIGBUS"),
    (libc::SIGFPE, "SIGFPE"),
    (libc::SIGILL, "SIGILL"),
];

fn reserved(caller: &str, signum: c_int) -> bool {
    for (sig, name) in RESERVED {
        if sig == signum {
            stats::error(format!(
                "({caller}) Use of {name} signal is reserved for the harness"
            ));
            return true;
        }
    }
    false
}

/// `Action::Protect` refuses to signal the caller's own process, its
/// parent, the process group (pid 0) and the owner's processes
/// (pid -1); each refusal is reported and the call succeeds without
/// sending anything.
pub fn kill(pid: libc::pid_t, sig: c_int) -> c_int {
    let action = KILL.with(|s| {
        s.calls += 1;
        s.data.pid = pid;
        s.data.sig = sig;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("kill,{pid},{sig}"));
            }
            0
        }
        Action::Block => blocked("kill"),
        Action::Protect => {
            let mut refused = false;
            if pid == unsafe { libc::getpid() } {
                stats::error("(kill) prevented sending signal to self");
                refused = true;
            }
            if pid == unsafe { libc::getppid() } {
                stats::error("(kill) prevented sending signal to parent");
                refused = true;
            }
            if pid == 0 {
                stats::error("(kill) prevented sending signal to every process in the process group");
                refused = true;
            }
            if pid == -1 {
                stats::error(
                    "(kill) prevented sending signal to every process belonging to process owner",
                );
                refused = true;
            }
            if refused {
                0
            } else {
                unsafe { libc::kill(pid, sig) }
            }
        }
        _ => unsafe { libc::kill(pid, sig) },
    };
    KILL.with(|s| s.data.ret = ret);
    ret
}

pub fn raise(sig: c_int) -> c_int {
    let action = RAISE.with(|s| {
        s.calls += 1;
        s.data.sig = sig;
        s.action
    });
    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("raise,{sig}"));
            }
            0
        }
        Action::Block => blocked("raise"),
        _ => unsafe { libc::raise(sig) },
    };
    RAISE.with(|s| s.data.ret = ret);
    ret
}

/// Returns `SIG_DFL` on injected success, `SIG_ERR` on injected or
/// reserved-signal failure.
pub fn signal(signum: c_int, handler: libc::sighandler_t) -> libc::sighandler_t {
    let action = SIGNAL.with(|s| {
        s.calls += 1;
        s.data.signum = signum;
        s.data.handler = handler;
        s.action
    });

    let ret = if reserved("signal", signum) {
        set_errno(libc::EINVAL);
        libc::SIG_ERR
    } else {
        match action {
            Action::Error => libc::SIG_ERR,
            Action::Log | Action::Success => {
                if action == Action::Log {
                    datalog(format!("signal,{signum},{handler:#x}"));
                }
                libc::SIG_DFL
            }
            Action::Block => blocked("signal"),
            _ => unsafe { libc::signal(signum, handler) },
        }
    };
    SIGNAL.with(|s| s.data.ret = ret);
    ret
}

/// Logged as the equivalent `signal()` call unless the caller asked
/// for `SA_SIGINFO` dispatch.
pub fn sigaction(
    signum: c_int,
    act: *const libc::sigaction,
    oldact: *mut libc::sigaction,
) -> c_int {
    let mut ok = true;
    if !act.is_null() && probe::check_const_ptr(act as *const c_void) != PtrClass::Valid {
        stats::error("sigaction() called with invalid pointer (act)");
        ok = false;
    }
    if !oldact.is_null() && probe::check_ptr(oldact as *mut c_void) != PtrClass::Valid {
        stats::error("sigaction() called with invalid pointer (oldact)");
        ok = false;
    }

    let action = SIGACTION.with(|s| {
        s.calls += 1;
        s.data.signum = signum;
        s.action
    });

    let ret = if reserved("sigaction", signum) {
        set_errno(libc::EINVAL);
        -1
    } else {
        match action {
            Action::Error => -1,
            Action::Log | Action::Success => {
                if action == Action::Log && ok && !act.is_null() {
                    let act = unsafe { &*act };
                    if act.sa_flags & libc::SA_SIGINFO != 0 {
                        datalog(format!("sigaction,{signum},{:#x}", act.sa_sigaction));
                    } else {
                        datalog(format!("signal,{signum},{:#x}", act.sa_sigaction));
                    }
                }
                0
            }
            Action::Block => blocked("sigaction"),
            _ => {
                if ok {
                    unsafe { libc::sigaction(signum, act, oldact) }
                } else {
                    -1
                }
            }
        }
    };
    SIGACTION.with(|s| s.data.ret = ret);
    ret
}

/// The real `pause()` only ever returns -1; injected success does the
/// same without stalling.
pub fn pause() -> c_int {
    let action = PAUSE.with(|s| {
        s.calls += 1;
        s.action
    });
    let ret = match action {
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog("pause");
            }
            -1
        }
        Action::Block => blocked("pause"),
        _ => unsafe { libc::pause() },
    };
    PAUSE.with(|s| s.data.ret = ret);
    ret
}

/// Injected success reports no pending alarm (0); injected error
/// pretends a previous alarm had one second left.
pub fn alarm(seconds: u32) -> u32 {
    let action = ALARM.with(|s| {
        s.calls += 1;
        s.data.seconds = seconds;
        s.action
    });
    let ret = match action {
        Action::Error => 1,
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("alarm,{seconds}"));
            }
            0
        }
        Action::Block => blocked("alarm"),
        _ => unsafe { libc::alarm(seconds) },
    };
    ALARM.with(|s| s.data.ret = ret);
    ret
}
