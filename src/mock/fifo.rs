/// Named pipe primitives: mkfifo and the S_ISFIFO mode test.
use crate::config::types::{Action, PATH_CAPTURE_MAX};
use crate::mock::{blocked, capture_cstr, set_errno, MockCell};
use crate::record::logbuf::datalog;
use crate::record::stats;
use std::os::raw::{c_char, c_int};

#[derive(Debug, Default, Clone)]
pub struct MkfifoData {
    pub path: String,
    pub mode: libc::mode_t,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct IsfifoData {
    pub mode: libc::mode_t,
    pub ret: c_int,
}

pub static MKFIFO: MockCell<MkfifoData> = MockCell::new(
    "mkfifo",
    MkfifoData {
        path: String::new(),
        mode: 0,
        ret: 0,
    },
);
pub static ISFIFO: MockCell<IsfifoData> = MockCell::new("isfifo", IsfifoData { mode: 0, ret: 0 });

pub fn mkfifo(path: *const c_char, mode: libc::mode_t) -> c_int {
    let captured = capture_cstr(path, PATH_CAPTURE_MAX);
    let ok = captured.is_some();
    if !ok {
        stats::error("mkfifo(path,mode) invalid path");
    }
    let captured = captured.unwrap_or_default();
    let action = MKFIFO.with(|s| {
        s.calls += 1;
        s.data.path = captured.clone();
        s.data.mode = mode;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("mkfifo,{captured},{mode:o}"));
            }
            0
        }
        Action::Block => blocked("mkfifo"),
        _ => {
            if ok {
                unsafe { libc::mkfifo(path, mode) }
            } else {
                set_errno(libc::EINVAL);
                -1
            }
        }
    };
    MKFIFO.with(|s| s.data.ret = ret);
    ret
}

/// Stand-in for the `S_ISFIFO` mode test: injected error reports "not
/// a FIFO", injected success reports "is a FIFO".
pub fn isfifo(mode: libc::mode_t) -> bool {
    let action = ISFIFO.with(|s| {
        s.calls += 1;
        s.data.mode = mode;
        s.action
    });
    let ret = match action {
        Action::Error => false,
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("S_ISFIFO,{mode:o}"));
            }
            true
        }
        Action::Block => blocked("S_ISFIFO"),
        _ => mode & libc::S_IFMT == libc::S_IFIFO,
    };
    ISFIFO.with(|s| s.data.ret = ret as c_int);
    ret
}
