/// File and stdio primitives: remove, unlink, atoi, fclose, fread,
/// fwrite, fseek.
///
/// remove() logs under the name `unlink` on purpose, so a test can
/// accept either call for "delete this file".
use crate::config::types::{Action, PtrClass, PATH_CAPTURE_MAX};
use crate::mock::{blocked, capture_cstr, set_errno, MockCell};
use crate::probe;
use crate::record::logbuf::datalog;
use crate::record::stats;
use std::os::raw::{c_char, c_int, c_long, c_void};

/// atoi() is only fed bounded strings; the capture stops here.
const ATOI_CAPTURE_MAX: usize = 32;

#[derive(Debug, Default, Clone)]
pub struct PathData {
    pub path: String,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct AtoiData {
    pub nptr: String,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct FcloseData {
    pub stream: usize,
    pub ret: c_int,
}

#[derive(Debug, Default, Clone)]
pub struct FxferData {
    pub ptr: usize,
    pub size: usize,
    pub nmemb: usize,
    pub stream: usize,
    pub ret: usize,
}

#[derive(Debug, Default, Clone)]
pub struct FseekData {
    pub stream: usize,
    pub offset: c_long,
    pub whence: c_int,
    pub ret: c_int,
}

pub static REMOVE: MockCell<PathData> = MockCell::new(
    "remove",
    PathData {
        path: String::new(),
        ret: 0,
    },
);
pub static UNLINK: MockCell<PathData> = MockCell::new(
    "unlink",
    PathData {
        path: String::new(),
        ret: 0,
    },
);
pub static ATOI: MockCell<AtoiData> = MockCell::new(
    "atoi",
    AtoiData {
        nptr: String::new(),
        ret: 0,
    },
);
pub static FCLOSE: MockCell<FcloseData> = MockCell::new("fclose", FcloseData { stream: 0, ret: 0 });
pub static FREAD: MockCell<FxferData> = MockCell::new(
    "fread",
    FxferData {
        ptr: 0,
        size: 0,
        nmemb: 0,
        stream: 0,
        ret: 0,
    },
);
pub static FWRITE: MockCell<FxferData> = MockCell::new(
    "fwrite",
    FxferData {
        ptr: 0,
        size: 0,
        nmemb: 0,
        stream: 0,
        ret: 0,
    },
);
pub static FSEEK: MockCell<FseekData> = MockCell::new(
    "fseek",
    FseekData {
        stream: 0,
        offset: 0,
        whence: 0,
        ret: 0,
    },
);

fn path_call(
    cell: &MockCell<PathData>,
    name: &str,
    path: *const c_char,
    real: impl FnOnce() -> c_int,
    log_name: &str,
) -> c_int {
    let captured = capture_cstr(path, PATH_CAPTURE_MAX);
    let ok = captured.is_some();
    if !ok {
        stats::error(format!("{name}(path) invalid path"));
    }
    let captured = captured.unwrap_or_default();
    let action = cell.with(|s| {
        s.calls += 1;
        s.data.path = captured.clone();
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("{log_name},{captured}"));
            }
            0
        }
        Action::Block => blocked(name),
        _ => {
            if ok {
                real()
            } else {
                set_errno(libc::EINVAL);
                -1
            }
        }
    };
    cell.with(|s| s.data.ret = ret);
    ret
}

pub fn remove(path: *const c_char) -> c_int {
    path_call(
        &REMOVE,
        "remove",
        path,
        || unsafe { libc::remove(path) },
        "unlink",
    )
}

pub fn unlink(path: *const c_char) -> c_int {
    path_call(
        &UNLINK,
        "unlink",
        path,
        || unsafe { libc::unlink(path) },
        "unlink",
    )
}

/// Injected error returns `i32::MIN`; injected success returns
/// whatever value the cell currently holds.
pub fn atoi(nptr: *const c_char) -> c_int {
    let captured = capture_cstr(nptr, ATOI_CAPTURE_MAX);
    let ok = captured.is_some();
    if !ok {
        stats::error("atoi(nptr) called with invalid nptr");
    }
    let captured = captured.unwrap_or_default();
    let (action, stored) = ATOI.with(|s| {
        s.calls += 1;
        s.data.nptr = captured.clone();
        (s.action, s.data.ret)
    });

    let ret = match action {
        Action::Error => i32::MIN,
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("atoi,{captured}"));
            }
            stored
        }
        Action::Block => blocked("atoi"),
        _ => {
            if ok {
                unsafe { libc::atoi(nptr) }
            } else {
                -1
            }
        }
    };
    ATOI.with(|s| s.data.ret = ret);
    ret
}

pub fn fclose(stream: *mut libc::FILE) -> c_int {
    let ok = if probe::check_ptr(stream as *mut c_void) != PtrClass::Valid {
        stats::error("fclose(stream) called with invalid stream");
        false
    } else {
        true
    };
    let action = FCLOSE.with(|s| {
        s.calls += 1;
        s.data.stream = stream as usize;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            libc::EOF
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("fclose,{stream:p}"));
            }
            0
        }
        Action::Block => blocked("fclose"),
        _ => {
            if ok {
                unsafe { libc::fclose(stream) }
            } else {
                set_errno(libc::EINVAL);
                libc::EOF
            }
        }
    };
    FCLOSE.with(|s| s.data.ret = ret);
    ret
}

fn check_xfer(name: &str, ptr: *const c_void, size: usize, nmemb: usize, stream: *mut libc::FILE) -> bool {
    let mut ok = true;
    if ptr == stream as *const c_void {
        stats::error(format!(
            "{name}(ptr,size,nmemb,stream) ptr must not have the same value as stream"
        ));
        ok = false;
    } else {
        if probe::check_const_ptr(ptr) != PtrClass::Valid {
            stats::error(format!("{name}(ptr,size,nmemb,stream) invalid ptr ({ptr:p})"));
            ok = false;
        }
        if probe::check_ptr(stream as *mut c_void) != PtrClass::Valid {
            stats::error(format!(
                "{name}(ptr,size,nmemb,stream) invalid stream ({stream:p})"
            ));
            ok = false;
        }
    }
    if size.checked_mul(nmemb).unwrap_or(0) == 0 {
        stats::error(format!("{name}(ptr,size,nmemb,stream) invalid size or nmemb"));
        ok = false;
    }
    ok
}

pub fn fread(ptr: *mut c_void, size: usize, nmemb: usize, stream: *mut libc::FILE) -> usize {
    let ok = check_xfer("fread", ptr as *const c_void, size, nmemb, stream);
    let action = FREAD.with(|s| {
        s.calls += 1;
        s.data.ptr = ptr as usize;
        s.data.size = size;
        s.data.nmemb = nmemb;
        s.data.stream = stream as usize;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            0
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("fread,{ptr:p},{size},{nmemb},{stream:p}"));
            }
            nmemb
        }
        Action::Block => blocked("fread"),
        _ => {
            if ok {
                unsafe { libc::fread(ptr, size, nmemb, stream) }
            } else {
                set_errno(libc::EINVAL);
                0
            }
        }
    };
    FREAD.with(|s| s.data.ret = ret);
    ret
}

pub fn fwrite(ptr: *const c_void, size: usize, nmemb: usize, stream: *mut libc::FILE) -> usize {
    let ok = check_xfer("fwrite", ptr, size, nmemb, stream);
    let action = FWRITE.with(|s| {
        s.calls += 1;
        s.data.ptr = ptr as usize;
        s.data.size = size;
        s.data.nmemb = nmemb;
        s.data.stream = stream as usize;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            0
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("fwrite,{ptr:p},{size},{nmemb},{stream:p}"));
            }
            nmemb
        }
        Action::Block => blocked("fwrite"),
        _ => {
            if ok {
                unsafe { libc::fwrite(ptr, size, nmemb, stream) }
            } else {
                set_errno(libc::EINVAL);
                0
            }
        }
    };
    FWRITE.with(|s| s.data.ret = ret);
    ret
}

pub fn fseek(stream: *mut libc::FILE, offset: c_long, whence: c_int) -> c_int {
    let mut ok = true;
    if probe::check_ptr(stream as *mut c_void) != PtrClass::Valid {
        stats::error("fseek(stream, offset, whence) invalid stream");
        ok = false;
    }
    if !matches!(whence, libc::SEEK_SET | libc::SEEK_CUR | libc::SEEK_END) {
        stats::error("fseek(stream, offset, whence) invalid value for whence");
        ok = false;
    }

    let action = FSEEK.with(|s| {
        s.calls += 1;
        s.data.stream = stream as usize;
        s.data.offset = offset;
        s.data.whence = whence;
        s.action
    });

    let ret = match action {
        Action::Error => {
            set_errno(libc::EINVAL);
            -1
        }
        Action::Log | Action::Success => {
            if action == Action::Log {
                datalog(format!("fseek,{stream:p},{offset},{whence}"));
            }
            0
        }
        Action::Block => blocked("fseek"),
        _ => {
            if ok {
                unsafe { libc::fseek(stream, offset, whence) }
            } else {
                set_errno(libc::EINVAL);
                -1
            }
        }
    };
    FSEEK.with(|s| s.data.ret = ret);
    ret
}
