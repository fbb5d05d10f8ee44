/// System V semaphore primitives: semget, semctl, semop.
///
/// semctl's variadic `union semun` argument is carried as a raw
/// machine word; it is captured for the commands that take one and
/// forwarded untouched on pass-through.
use crate::config::types::{Action, PtrClass};
use crate::mock::{blocked, set_errno, MockCell};
use crate::probe;
use crate::record::logbuf::datalog;
use crate::record::stats;
use std::os::raw::{c_int, c_void};

#[derive(Debug, Default, Clone)]
pub struct SemgetData {
    pub key: libc::key_t,
    pub nsems: c_int,
    pub semflg: c_int,
    /// Semaphore id returned on injected success.
    pub semid: c_int,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct SemctlData {
    pub semid: c_int,
    pub semnum: c_int,
    pub cmd: c_int,
    /// Raw `union semun` word, captured for commands that take one.
    pub arg: usize,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct SemopData {
    pub nsops: usize,
    pub ret: c_int,
}

pub static SEMGET: MockCell<SemgetData> = MockCell::new(
    "semget",
    SemgetData {
        key: 0,
        nsems: 0,
        semflg: 0,
        semid: 0,
        ret: 0,
    },
);
pub static SEMCTL: MockCell<SemctlData> = MockCell::new(
    "semctl",
    SemctlData {
        semid: 0,
        semnum: 0,
        cmd: 0,
        arg: 0,
        ret: 0,
    },
);
pub static SEMOP: MockCell<SemopData> = MockCell::new("semop", SemopData { nsops: 0, ret: 0 });

fn semctl_takes_arg(cmd: c_int) -> bool {
    matches!(
        cmd,
        libc::SETVAL | libc::IPC_STAT | libc::IPC_SET | libc::GETALL | libc::SETALL
    )
}

/// `Action::Retry` and `Action::CreateOnly` behave as for msgget, with
/// one extra rule: requesting zero semaphores together with `IPC_CREAT`
/// is refused with EINVAL on the create paths.
pub fn semget(key: libc::key_t, nsems: c_int, semflg: c_int) -> c_int {
    let (action, attempt, injected) = SEMGET.with(|s| {
        s.calls += 1;
        s.data.key = key;
        s.data.nsems = nsems;
        s.data.semflg = semflg;
        (s.action, s.calls, s.data.semid)
    });

    let ret = match action {
        Action::Retry => match attempt {
            1 => {
                set_errno(libc::ENOENT);
                -1
            }
            2 => {
                set_errno(0);
                injected
            }
            _ => {
                set_errno(libc::EINVAL);
                -1
            }
        },
        Action::CreateOnly => {
            if nsems == 0 && semflg & libc::IPC_CREAT != 0 {
                set_errno(libc::EINVAL);
                -1
            } else {
                injected
            }
        }
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("semget,{key:x},{nsems},{semflg:o}"));
            }
            injected
        }
        Action::Block => blocked("semget"),
        _ => unsafe { libc::semget(key, nsems, semflg) },
    };
    SEMGET.with(|s| s.data.ret = ret);
    ret
}

pub fn semctl(semid: c_int, semnum: c_int, cmd: c_int, arg: usize) -> c_int {
    let action = SEMCTL.with(|s| {
        s.calls += 1;
        s.data.semid = semid;
        s.data.semnum = semnum;
        s.data.cmd = cmd;
        if semctl_takes_arg(cmd) {
            s.data.arg = arg;
        }
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("semctl,{semid},{semnum},{cmd}"));
            }
            0
        }
        Action::Block => blocked("semctl"),
        _ => {
            if semctl_takes_arg(cmd) {
                unsafe { libc::semctl(semid, semnum, cmd, arg) }
            } else {
                unsafe { libc::semctl(semid, semnum, cmd) }
            }
        }
    };
    SEMCTL.with(|s| s.data.ret = ret);
    ret
}

/// `Action::Log` records one line per operation in the batch.
pub fn semop(semid: c_int, sops: *mut libc::sembuf, nsops: usize) -> c_int {
    let ok = if probe::check_ptr(sops as *mut c_void) != PtrClass::Valid {
        stats::error("semop() called with invalid pointer (sops)");
        false
    } else {
        true
    };

    let action = SEMOP.with(|s| {
        s.calls += 1;
        s.data.nsops = nsops;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log && ok {
                let ops = unsafe { std::slice::from_raw_parts(sops, nsops) };
                for op in ops {
                    datalog(format!(
                        "semop,{semid},{},{},{}",
                        op.sem_num, op.sem_op, op.sem_flg
                    ));
                }
            }
            0
        }
        Action::Block => blocked("semop"),
        _ => {
            if ok {
                unsafe { libc::semop(semid, sops, nsops) }
            } else {
                set_errno(libc::EINVAL);
                -1
            }
        }
    };
    SEMOP.with(|s| s.data.ret = ret);
    ret
}
