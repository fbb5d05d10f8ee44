/// System V message queue primitives: msgget, msgsnd, msgrcv, msgctl.
///
/// msgsnd's injected-success path keeps an owned copy of the message
/// (`mtype` word plus `msgsz` body bytes) so a later msgrcv configured
/// with `Action::Inject` can deliver it without a real queue; see
/// [`inject_from_capture`].
use crate::config::types::{Action, PtrClass};
use crate::mock::{blocked, set_errno, MockCell};
use crate::probe;
use crate::record::logbuf::datalog;
use crate::record::stats;
use std::mem;
use std::os::raw::{c_int, c_long, c_void};

#[derive(Debug, Default, Clone)]
pub struct MsggetData {
    pub key: libc::key_t,
    pub msgflg: c_int,
    /// Queue id returned on injected success.
    pub msqid: c_int,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct MsgsndData {
    pub msqid: c_int,
    pub msgsz: usize,
    pub msgflg: c_int,
    /// Owned copy of the last captured message: `mtype` word plus body.
    pub payload: Option<Vec<u8>>,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct MsgrcvData {
    pub msqid: c_int,
    pub msgsz: usize,
    pub msgtyp: c_long,
    pub msgflg: c_int,
    /// Message delivered by `Action::Inject`: `mtype` word plus body.
    pub payload: Option<Vec<u8>>,
    pub ret: isize,
}

#[derive(Debug, Default, Clone)]
pub struct MsgctlData {
    pub msqid: c_int,
    pub cmd: c_int,
    pub ret: c_int,
}

pub static MSGGET: MockCell<MsggetData> = MockCell::new(
    "msgget",
    MsggetData {
        key: 0,
        msgflg: 0,
        msqid: 0,
        ret: 0,
    },
);
pub static MSGSND: MockCell<MsgsndData> = MockCell::new(
    "msgsnd",
    MsgsndData {
        msqid: 0,
        msgsz: 0,
        msgflg: 0,
        payload: None,
        ret: 0,
    },
);
pub static MSGRCV: MockCell<MsgrcvData> = MockCell::new(
    "msgrcv",
    MsgrcvData {
        msqid: 0,
        msgsz: 0,
        msgtyp: 0,
        msgflg: 0,
        payload: None,
        ret: 0,
    },
);
pub static MSGCTL: MockCell<MsgctlData> = MockCell::new(
    "msgctl",
    MsgctlData {
        msqid: 0,
        cmd: 0,
        ret: 0,
    },
);

/// Make the message captured by msgsnd available for delivery by a
/// msgrcv configured with `Action::Inject`.
pub fn inject_from_capture() {
    let (payload, msgsz) = MSGSND.with(|s| (s.data.payload.clone(), s.data.msgsz));
    MSGRCV.with(|s| {
        s.data.payload = payload;
        s.data.msgsz = msgsz;
    });
}

/// `Action::Retry` models a queue that must be created before use:
/// ENOENT on the first call, the injected id on the second, EINVAL
/// afterwards. `Action::CreateOnly` succeeds only with `IPC_CREAT`.
pub fn msgget(key: libc::key_t, msgflg: c_int) -> c_int {
    let (action, attempt, injected) = MSGGET.with(|s| {
        s.calls += 1;
        s.data.key = key;
        s.data.msgflg = msgflg;
        (s.action, s.calls, s.data.msqid)
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
            if msgflg & libc::IPC_CREAT == 0 {
                set_errno(libc::ENOENT);
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
                datalog(format!("msgget,{key:x},{msgflg}"));
            }
            injected
        }
        Action::Block => blocked("msgget"),
        _ => unsafe { libc::msgget(key, msgflg) },
    };
    MSGGET.with(|s| s.data.ret = ret);
    ret
}

pub fn msgsnd(msqid: c_int, msgp: *const c_void, msgsz: usize, msgflg: c_int) -> c_int {
    let ok = if probe::check_const_ptr(msgp) != PtrClass::Valid {
        stats::error("msgsnd() called with invalid pointer (msgp)");
        false
    } else {
        true
    };

    let action = MSGSND.with(|s| {
        s.calls += 1;
        s.action
    });

    let ret = match action {
        Action::Inject => {
            // Re-send the previously captured message.
            let (prev_id, prev_sz, prev_flg, payload) = MSGSND.with(|s| {
                (
                    s.data.msqid,
                    s.data.msgsz,
                    s.data.msgflg,
                    s.data.payload.clone(),
                )
            });
            match payload {
                Some(buf) => unsafe {
                    libc::msgsnd(prev_id, buf.as_ptr() as *const c_void, prev_sz, prev_flg)
                },
                None => -1,
            }
        }
        Action::Error => {
            MSGSND.with(|s| {
                s.data.msqid = msqid;
                s.data.msgsz = msgsz;
                s.data.msgflg = msgflg;
            });
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("msgsnd,{msqid},{msgp:p},{msgsz},{msgflg}"));
            }
            let payload = if ok {
                let bytes = mem::size_of::<c_long>() + msgsz;
                let mut buf = vec![0u8; bytes];
                unsafe {
                    std::ptr::copy_nonoverlapping(msgp as *const u8, buf.as_mut_ptr(), bytes);
                }
                Some(buf)
            } else {
                None
            };
            MSGSND.with(|s| {
                s.data.msqid = msqid;
                s.data.msgsz = msgsz;
                s.data.msgflg = msgflg;
                s.data.payload = payload;
            });
            0
        }
        Action::Block => blocked("msgsnd"),
        _ => {
            MSGSND.with(|s| {
                s.data.msqid = msqid;
                s.data.msgsz = msgsz;
                s.data.msgflg = msgflg;
            });
            if ok {
                unsafe { libc::msgsnd(msqid, msgp, msgsz, msgflg) }
            } else {
                -1
            }
        }
    };
    MSGSND.with(|s| s.data.ret = ret);
    ret
}

/// `Action::Inject` copies the configured payload into `*msgp`
/// (bounded by both the request and the stored size) and reports the
/// requested size as received.
pub fn msgrcv(
    msqid: c_int,
    msgp: *mut c_void,
    msgsz: usize,
    msgtyp: c_long,
    msgflg: c_int,
) -> isize {
    let ok = if probe::check_ptr(msgp) != PtrClass::Valid {
        stats::error("msgrcv() called with invalid pointer (msgp)");
        false
    } else {
        true
    };

    let action = MSGRCV.with(|s| {
        s.calls += 1;
        s.action
    });

    let ret = match action {
        Action::Inject => {
            let (stored_sz, payload) = MSGRCV.with(|s| {
                s.data.msqid = msqid;
                s.data.msgtyp = msgtyp;
                s.data.msgflg = msgflg;
                (s.data.msgsz, s.data.payload.clone())
            });
            if ok {
                if let Some(buf) = payload {
                    let bytes = mem::size_of::<c_long>() + msgsz.min(stored_sz);
                    let bytes = bytes.min(buf.len());
                    unsafe {
                        std::ptr::copy_nonoverlapping(buf.as_ptr(), msgp as *mut u8, bytes);
                    }
                }
            }
            MSGRCV.with(|s| s.data.msgsz = msgsz);
            msgsz as isize
        }
        Action::Error => {
            MSGRCV.with(|s| {
                s.data.msqid = msqid;
                s.data.msgsz = msgsz;
                s.data.msgtyp = msgtyp;
                s.data.msgflg = msgflg;
            });
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("msgrcv,{msqid},{msgp:p},{msgsz},{msgtyp},{msgflg}"));
            }
            MSGRCV.with(|s| {
                s.data.msqid = msqid;
                s.data.msgsz = msgsz;
                s.data.msgtyp = msgtyp;
                s.data.msgflg = msgflg;
            });
            msgsz as isize
        }
        Action::Block => blocked("msgrcv"),
        _ => {
            MSGRCV.with(|s| {
                s.data.msqid = msqid;
                s.data.msgsz = msgsz;
                s.data.msgtyp = msgtyp;
                s.data.msgflg = msgflg;
            });
            if ok {
                unsafe { libc::msgrcv(msqid, msgp, msgsz, msgtyp, msgflg) }
            } else {
                -1
            }
        }
    };
    MSGRCV.with(|s| s.data.ret = ret);
    ret
}

pub fn msgctl(msqid: c_int, cmd: c_int, buf: *mut libc::msqid_ds) -> c_int {
    let action = MSGCTL.with(|s| {
        s.calls += 1;
        s.data.msqid = msqid;
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
                datalog(format!("msgctl,{msqid},{cmd},{buf:p}"));
            }
            0
        }
        Action::Block => blocked("msgctl"),
        _ => unsafe { libc::msgctl(msqid, cmd, buf) },
    };
    MSGCTL.with(|s| s.data.ret = ret);
    ret
}
