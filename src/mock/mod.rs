/// Call interception layer.
///
/// Each intercepted primitive owns a process-wide [`MockCell`] holding
/// its configured [`Action`], a call counter and captured arguments.
/// Tested code calls the wrapper (`mock::process::fork`,
/// `mock::msg::msgget`, ...) instead of the real primitive; the
/// wrapper consults the cell and either passes through, injects a
/// result, logs the call, or aborts the supervised block.
///
/// Wrappers keep the C calling convention of the primitives they stand
/// in for: libc-style return values, errno for failure detail, raw
/// pointers validated through the prober before dereference. Harness
/// control surfaces (set_action, snapshot, reset) are ordinary Rust.
///
/// Locking discipline: every wrapper releases the cell's guard before
/// logging, probing or jumping, so a non-local return can never leave
/// a mock mutex held.
pub mod fifo;
pub mod fs;
pub mod msg;
pub mod process;
pub mod sem;
pub mod shm;
pub mod signals;

use crate::config::types::Action;
use crate::envelope::trampoline::{trigger, JumpCode};
use crate::record::stats;
use std::os::raw::c_int;
use std::sync::Mutex;

/// Per-primitive interception state.
#[derive(Debug)]
pub struct MockState<T> {
    /// Behavior applied on the next call.
    pub action: Action,
    /// Calls intercepted since the last reset.
    pub calls: u32,
    /// Captured arguments and injectable results.
    pub data: T,
}

/// Process-wide interception cell for one primitive.
pub struct MockCell<T> {
    name: &'static str,
    state: Mutex<MockState<T>>,
}

impl<T> MockCell<T> {
    pub(crate) const fn new(name: &'static str, data: T) -> Self {
        MockCell {
            name,
            state: Mutex::new(MockState {
                action: Action::Default,
                calls: 0,
                data,
            }),
        }
    }

    /// Primitive name, as reported in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Run `f` with the state locked. Callers must not log, probe or
    /// jump inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&mut MockState<T>) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn set_action(&self, action: Action) {
        self.with(|s| s.action = action);
    }

    pub fn action(&self) -> Action {
        self.with(|s| s.action)
    }

    pub fn calls(&self) -> u32 {
        self.with(|s| s.calls)
    }

    /// Copy of the captured data.
    pub fn snapshot(&self) -> T
    where
        T: Clone,
    {
        self.with(|s| s.data.clone())
    }

    /// Back to pass-through with zeroed counters and captures.
    pub fn reset(&self)
    where
        T: Default,
    {
        self.with(|s| {
            s.action = Action::Default;
            s.calls = 0;
            s.data = T::default();
        });
    }
}

/// Report a blocked primitive and abort the supervised block.
pub(crate) fn blocked(name: &str) -> ! {
    stats::error(format!("{name}() called, aborting"));
    trigger(JumpCode::Blocked)
}

/// Inject an errno value for the caller to observe.
pub(crate) fn set_errno(err: c_int) {
    unsafe {
        *libc::__errno_location() = err;
    }
}

/// Bounded capture of a C string argument. `None` only when the prober
/// rejects the pointer; a valid empty string captures as `Some("")`.
pub(crate) fn capture_cstr(ptr: *const std::os::raw::c_char, max: usize) -> Option<String> {
    use crate::config::types::PtrClass;
    if crate::probe::check_const_ptr(ptr as *const std::os::raw::c_void) != PtrClass::Valid {
        return None;
    }
    let s = unsafe { std::ffi::CStr::from_ptr(ptr) };
    let mut owned = s.to_string_lossy().into_owned();
    if owned.len() > max {
        let mut cut = max;
        while !owned.is_char_boundary(cut) {
            cut -= 1;
        }
        owned.truncate(cut);
    }
    Some(owned)
}
