/// System V shared memory primitives: shmget, shmat, shmdt, shmctl.
use crate::config::types::Action;
use crate::mock::{blocked, set_errno, MockCell};
use crate::record::logbuf::datalog;
use std::os::raw::{c_int, c_void};

#[derive(Debug, Default, Clone)]
pub struct ShmgetData {
    pub key: libc::key_t,
    pub size: usize,
    pub shmflg: c_int,
    /// Segment id returned on injected success; also captures the real
    /// id on pass-through.
    pub shmid: c_int,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct ShmatData {
    pub shmid: c_int,
    /// Attach address as a raw word; doubles as the injected result.
    pub shmaddr: usize,
    pub shmflg: c_int,
    pub ret: usize,
}

#[derive(Debug, Default, Clone)]
pub struct ShmdtData {
    pub shmaddr: usize,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct ShmctlData {
    pub shmid: c_int,
    pub cmd: c_int,
    pub ret: c_int,
}

pub static SHMGET: MockCell<ShmgetData> = MockCell::new(
    "shmget",
    ShmgetData {
        key: 0,
        size: 0,
        shmflg: 0,
        shmid: 0,
        ret: 0,
    },
);
pub static SHMAT: MockCell<ShmatData> = MockCell::new(
    "shmat",
    ShmatData {
        shmid: 0,
        shmaddr: 0,
        shmflg: 0,
        ret: 0,
    },
);
pub static SHMDT: MockCell<ShmdtData> = MockCell::new("shmdt", ShmdtData { shmaddr: 0, ret: 0 });
pub static SHMCTL: MockCell<ShmctlData> = MockCell::new(
    "shmctl",
    ShmctlData {
        shmid: 0,
        cmd: 0,
        ret: 0,
    },
);

/// The retry and create paths refuse a zero-sized segment requested
/// with `IPC_CREAT`. Unlike its msgget/semget counterparts the retry
/// path fails without touching errno after the second attempt.
pub fn shmget(key: libc::key_t, size: usize, shmflg: c_int) -> c_int {
    let (action, attempt, injected) = SHMGET.with(|s| {
        s.calls += 1;
        s.data.key = key;
        s.data.size = size;
        s.data.shmflg = shmflg;
        (s.action, s.calls, s.data.shmid)
    });

    let ret = match action {
        Action::Retry => match attempt {
            1 => {
                set_errno(libc::ENOENT);
                -1
            }
            2 => {
                if size == 0 && shmflg & libc::IPC_CREAT != 0 {
                    -1
                } else {
                    injected
                }
            }
            _ => -1,
        },
        Action::CreateOnly => {
            if size == 0 && shmflg & libc::IPC_CREAT != 0 {
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
                datalog(format!("shmget,{key:x},{size},{shmflg}"));
            }
            injected
        }
        Action::Block => blocked("shmget"),
        _ => {
            let id = unsafe { libc::shmget(key, size, shmflg) };
            SHMGET.with(|s| s.data.shmid = id);
            id
        }
    };
    SHMGET.with(|s| s.data.ret = ret);
    ret
}

/// Injected success echoes the requested attach address back to the
/// caller without mapping anything.
pub fn shmat(shmid: c_int, shmaddr: *const c_void, shmflg: c_int) -> *mut c_void {
    let (action, injected) = SHMAT.with(|s| {
        s.calls += 1;
        s.data.shmid = shmid;
        s.data.shmaddr = shmaddr as usize;
        s.data.shmflg = shmflg;
        (s.action, s.data.shmaddr)
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            usize::MAX as *mut c_void
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("shmat,{shmid},{shmaddr:p},{shmflg}"));
            }
            injected as *mut c_void
        }
        Action::Block => blocked("shmat"),
        _ => unsafe { libc::shmat(shmid, shmaddr, shmflg) },
    };
    SHMAT.with(|s| s.data.ret = ret as usize);
    ret
}

pub fn shmdt(shmaddr: *const c_void) -> c_int {
    let action = SHMDT.with(|s| {
        s.calls += 1;
        s.data.shmaddr = shmaddr as usize;
        s.action
    });
    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("shmdt,{shmaddr:p}"));
            }
            0
        }
        Action::Block => blocked("shmdt"),
        _ => unsafe { libc::shmdt(shmaddr) },
    };
    SHMDT.with(|s| s.data.ret = ret);
    ret
}

pub fn shmctl(shmid: c_int, cmd: c_int, buf: *mut libc::shmid_ds) -> c_int {
    let action = SHMCTL.with(|s| {
        s.calls += 1;
        s.data.shmid = shmid;
        s.data.cmd = cmd;
        s.action
    });
    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("shmctl,{shmid},{cmd},{buf:p}"));
            }
            0
        }
        Action::Block => blocked("shmctl"),
        _ => unsafe { libc::shmctl(shmid, cmd, buf) },
    };
    SHMCTL.with(|s| s.data.ret = ret);
    ret
}
