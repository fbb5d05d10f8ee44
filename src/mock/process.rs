/// Process-lifetime primitives: exit family, abort, sleep, fork, wait,
/// waitpid, execl.
///
/// The exit family and abort never invoke the real primitive: the
/// status is captured and control returns to the envelope. wait,
/// waitpid and execl default to `Action::Block` under the safe policy
/// because the real calls would stall or replace the test process.
use crate::config::types::{Action, PtrClass, PATH_CAPTURE_MAX};
use crate::envelope::{self, trampoline};
use crate::mock::{blocked, capture_cstr, set_errno, MockCell};
use crate::probe;
use crate::record::logbuf::datalog;
use crate::record::stats;
use std::os::raw::{c_char, c_int, c_void};

#[derive(Debug, Default, Clone)]
pub struct ExitData {
    /// Status passed to the captured call.
    pub status: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct SleepData {
    pub seconds: u32,
    pub ret: u32,
}

#[derive(Debug, Default, Clone)]
pub struct ForkData {
    /// Injected return for `Action::Success`; negative values are
    /// normalized to 0 (child). Set to >= 1 to simulate the parent.
    pub ret: libc::pid_t,
}

#[derive(Debug, Default, Clone)]
pub struct WaitData {
    /// Status stored through `stat_loc` on injected success; 0 when unset.
    pub stat: Option<c_int>,
    pub ret: libc::pid_t,
}

#[derive(Debug, Default, Clone)]
pub struct WaitpidData {
    pub pid: libc::pid_t,
    pub options: c_int,
    /// Status stored through `stat_loc` on injected success; 0 when unset.
    pub stat: Option<c_int>,
    pub ret: libc::pid_t,
}

#[derive(Debug, Default, Clone)]
pub struct ExeclData {
    pub path: String,
    pub ret: c_int,
}

pub static EXIT: MockCell<ExitData> = MockCell::new("exit", ExitData { status: 0 });
pub static ABORT: MockCell<ExitData> = MockCell::new("abort", ExitData { status: 0 });
pub static SLEEP: MockCell<SleepData> = MockCell::new("sleep", SleepData { seconds: 0, ret: 0 });
pub static FORK: MockCell<ForkData> = MockCell::new("fork", ForkData { ret: 0 });
pub static WAIT: MockCell<WaitData> = MockCell::new("wait", WaitData { stat: None, ret: 0 });
pub static WAITPID: MockCell<WaitpidData> = MockCell::new(
    "waitpid",
    WaitpidData {
        pid: 0,
        options: 0,
        stat: None,
        ret: 0,
    },
);
pub static EXECL: MockCell<ExeclData> = MockCell::new(
    "execl",
    ExeclData {
        path: String::new(),
        ret: 0,
    },
);

/// Captured stand-in for `exit`/`_exit`/`_Exit`. Never returns to the
/// caller and never terminates the process.
pub fn exit(status: c_int) -> ! {
    let action = EXIT.with(|s| {
        s.calls += 1;
        s.data.status = status;
        s.action
    });
    envelope::record_exit_status(status);
    if action == Action::Warn {
        stats::info(format!("exit({status}) caught!"));
    }
    trampoline::trigger(trampoline::JumpCode::Exit)
}

/// Captured stand-in for `abort`.
pub fn abort() -> ! {
    let action = ABORT.with(|s| {
        s.calls += 1;
        s.data.status = 1;
        s.action
    });
    if action == Action::Warn {
        stats::info("abort() caught!");
    }
    trampoline::trigger(trampoline::JumpCode::Abort)
}

/// Error means "interrupted with one second left"; success means the
/// full interval elapsed.
pub fn sleep(seconds: u32) -> u32 {
    let action = SLEEP.with(|s| {
        s.calls += 1;
        s.data.seconds = seconds;
        s.action
    });
    let ret = match action {
        Action::Error => 1,
        Action::Log => {
            datalog(format!("sleep,{seconds}"));
            0
        }
        Action::Success => 0,
        Action::Block => blocked("sleep"),
        _ => unsafe { libc::sleep(seconds) },
    };
    SLEEP.with(|s| s.data.ret = ret);
    ret
}

pub fn fork() -> libc::pid_t {
    let (action, injected) = FORK.with(|s| {
        s.calls += 1;
        (s.action, s.data.ret)
    });
    let ret = match action {
        Action::Error => -1,
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog("fork");
            }
            if injected < 0 {
                0
            } else {
                injected
            }
        }
        Action::Block => blocked("fork"),
        _ => unsafe { libc::fork() },
    };
    FORK.with(|s| s.data.ret = ret);
    ret
}

fn check_stat_loc(name: &str, stat_loc: *mut c_int) -> bool {
    if stat_loc.is_null() {
        return true;
    }
    if probe::check_ptr(stat_loc as *mut c_void) != PtrClass::Valid {
        stats::error(format!("{name}() called with invalid pointer (stat_loc)"));
        return false;
    }
    true
}

pub fn wait(stat_loc: *mut c_int) -> libc::pid_t {
    let ok = check_stat_loc("wait", stat_loc);
    let (action, injected_ret, injected_stat) = WAIT.with(|s| {
        s.calls += 1;
        (s.action, s.data.ret, s.data.stat)
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("wait,{stat_loc:p}"));
            }
            if ok && !stat_loc.is_null() {
                unsafe { *stat_loc = injected_stat.unwrap_or(0) };
            }
            if injected_ret < 0 {
                0
            } else {
                injected_ret
            }
        }
        Action::Block => blocked("wait"),
        _ => {
            if ok {
                unsafe { libc::wait(stat_loc) }
            } else {
                -1
            }
        }
    };
    WAIT.with(|s| s.data.ret = ret);
    ret
}

/// Injected success echoes the requested pid when positive; for pid
/// <= 0 (group waits) the pid captured by the previous call is
/// returned instead.
pub fn waitpid(pid: libc::pid_t, stat_loc: *mut c_int, options: c_int) -> libc::pid_t {
    let ok = check_stat_loc("waitpid", stat_loc);
    let (action, prev_pid, injected_stat) = WAITPID.with(|s| {
        s.calls += 1;
        (s.action, s.data.pid, s.data.stat)
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("waitpid,{pid},{stat_loc:p},{options}"));
            }
            if ok && !stat_loc.is_null() {
                unsafe { *stat_loc = injected_stat.unwrap_or(0) };
            }
            if pid <= 0 {
                prev_pid
            } else {
                pid
            }
        }
        Action::Block => blocked("waitpid"),
        _ => {
            if ok {
                unsafe { libc::waitpid(pid, stat_loc, options) }
            } else {
                -1
            }
        }
    };

    WAITPID.with(|s| {
        s.data.pid = pid;
        s.data.options = options;
        s.data.ret = ret;
    });
    ret
}

/// `argv` must be NUL-terminated strings; the trailing null pointer for
/// the real `execv` call is appended here.
pub fn execl(path: *const c_char, argv: &[*const c_char]) -> c_int {
    let captured = capture_cstr(path, PATH_CAPTURE_MAX);
    let ok = captured.is_some();
    if !ok {
        stats::error("execl(path, ...) invalid path");
    }
    let captured = captured.unwrap_or_default();
    let action = EXECL.with(|s| {
        s.calls += 1;
        s.data.path = captured.clone();
        s.action
    });

    let ret = match action {
        Action::Log | Action::Error => {
            if action == Action::Log {
                datalog(format!("execl,{captured}"));
            }
            -1
        }
        Action::Block => blocked("execl"),
        _ => {
            if ok {
                let mut args: Vec<*const c_char> = argv.to_vec();
                args.push(std::ptr::null());
                // Only returns on failure.
                unsafe { libc::execv(path, args.as_ptr()) }
            } else {
                -1
            }
        }
    };
    EXECL.with(|s| s.data.ret = ret);
    ret
}
