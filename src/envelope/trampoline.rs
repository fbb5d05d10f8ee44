/// Non-local control transfer out of supervised code.
///
/// The execution envelope saves a resumption point with `sigsetjmp`
/// before invoking the supervised block. Fault handlers and mocks that
/// must stop the block (exit/abort capture, blocked calls, log
/// overflow) transfer control back to that point with `siglongjmp`,
/// carrying a [`JumpCode`] that the envelope maps to a termination
/// reason.
///
/// Signal handlers restrict themselves to storing into the atomics
/// below and jumping; diagnostics are formatted after control lands
/// back in the envelope frame.
///
/// Caution: `siglongjmp` unwinds nothing. `Drop` implementations of
/// frames between the jump site and the resumption point do not run.
/// This is intentional: the harness exists to observe exactly this
/// failure mode in tested code.
use std::cell::UnsafeCell;
use std::os::raw::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};

/// Oversized, opaque stand-in for the platform `sigjmp_buf`.
///
/// glibc's x86_64 buffer is 200 bytes and aarch64's is a little over
/// 300; 512 bytes with 16-byte alignment covers every libc we target.
#[repr(C, align(16))]
pub struct JumpBuf(#[allow(dead_code)] [u64; 64]);

impl JumpBuf {
    pub(crate) const fn zeroed() -> Self {
        JumpBuf([0; 64])
    }
}

extern "C" {
    // glibc only exports the double-underscore spelling; musl and the
    // BSDs export `sigsetjmp` directly.
    #[cfg_attr(target_env = "gnu", link_name = "__sigsetjmp")]
    pub(crate) fn sigsetjmp(env: *mut JumpBuf, savemask: c_int) -> c_int;
    pub(crate) fn siglongjmp(env: *mut JumpBuf, val: c_int) -> !;
}

/// Value carried by a non-local return into the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum JumpCode {
    Exit = 1,
    Abort = 2,
    Blocked = 3,
    Signal = 4,
    LogOverflow = 5,
}

impl JumpCode {
    fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            1 => Some(JumpCode::Exit),
            2 => Some(JumpCode::Abort),
            3 => Some(JumpCode::Blocked),
            4 => Some(JumpCode::Signal),
            5 => Some(JumpCode::LogOverflow),
            _ => None,
        }
    }
}

struct JumpSlot(UnsafeCell<JumpBuf>);

// Single-threaded by contract: one envelope is armed at a time and the
// handlers that jump run on the same thread that armed it.
unsafe impl Sync for JumpSlot {}

static ENVELOPE_JMP: JumpSlot = JumpSlot(UnsafeCell::new(JumpBuf::zeroed()));

/// Whether an execution envelope is currently armed on this process.
static IN_ENVELOPE: AtomicBool = AtomicBool::new(false);

/// Raw number of the last fault signal caught by the envelope handler,
/// `-1` when none.
static CAUGHT_SIGNAL: AtomicI32 = AtomicI32::new(-1);

/// Set when the supervised block terminated via `panic!` rather than a
/// jump; mapped to an abort-style outcome by the envelope.
static PANICKED: AtomicBool = AtomicBool::new(false);

pub fn in_envelope() -> bool {
    IN_ENVELOPE.load(Ordering::SeqCst)
}

pub(crate) fn caught_signal() -> Option<i32> {
    match CAUGHT_SIGNAL.load(Ordering::SeqCst) {
        -1 => None,
        sig => Some(sig),
    }
}

pub(crate) fn clear_caught_signal() {
    CAUGHT_SIGNAL.store(-1, Ordering::SeqCst);
}

/// Record the fault signal that interrupted the supervised block.
/// Async-signal-safe: a single atomic store.
pub(crate) fn record_signal(sig: i32) {
    CAUGHT_SIGNAL.store(sig, Ordering::SeqCst);
}

pub(crate) fn panicked() -> bool {
    PANICKED.load(Ordering::SeqCst)
}

/// Transfer control back to the armed envelope with `code`.
///
/// Mocks call this for blocked primitives and captured terminations.
/// Outside an armed envelope there is no resumption point to jump to;
/// continuing would be undefined behavior, so the harness terminates.
pub fn trigger(code: JumpCode) -> ! {
    if !in_envelope() {
        log::error!("non-local return ({code:?}) requested outside an execution envelope");
        std::process::exit(1);
    }
    unsafe { siglongjmp(ENVELOPE_JMP.0.get(), code as c_int) }
}

/// Jump to the armed envelope from a signal handler.
///
/// # Safety
/// Must only be called from a handler installed by the envelope while
/// the envelope is armed.
pub(crate) unsafe fn trigger_from_handler() -> ! {
    siglongjmp(ENVELOPE_JMP.0.get(), JumpCode::Signal as c_int)
}

#[inline(never)]
fn do_catch(data: *mut c_void, call: extern "C" fn(*mut c_void)) -> c_int {
    // The locals of this frame are not inspected after the second
    // return from sigsetjmp; only the return code is.
    unsafe {
        let rc = sigsetjmp(ENVELOPE_JMP.0.get(), 1);
        if rc == 0 {
            IN_ENVELOPE.store(true, Ordering::SeqCst);
            call(data);
        }
        IN_ENVELOPE.store(false, Ordering::SeqCst);
        rc
    }
}

/// Run `f` under the envelope's resumption point.
///
/// Returns `None` on normal completion, or the [`JumpCode`] carried by
/// a non-local return. A panic inside `f` is caught and recorded (see
/// [`panicked`]); it does not unwind past this function.
pub(crate) fn catch<F: FnOnce()>(f: F) -> Option<JumpCode> {
    extern "C" fn invoke<F: FnOnce()>(data: *mut c_void) {
        // Safety: `data` points at the `Option<F>` slot below, which
        // outlives this call.
        let slot = unsafe { &mut *(data as *mut Option<F>) };
        if let Some(f) = slot.take() {
            if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
                PANICKED.store(true, Ordering::SeqCst);
            }
        }
    }

    PANICKED.store(false, Ordering::SeqCst);
    let mut slot = Some(f);
    let rc = do_catch(&mut slot as *mut Option<F> as *mut c_void, invoke::<F>);
    JumpCode::from_raw(rc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // The jump buffer and envelope flag are process-wide; these tests
    // must not overlap.
    static LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_normal_completion_returns_none() {
        let _g = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut ran = false;
        let rc = catch(|| ran = true);
        assert!(ran);
        assert_eq!(rc, None);
        assert!(!in_envelope());
    }

    #[test]
    fn test_trigger_lands_back_in_catch() {
        let _g = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let rc = catch(|| trigger(JumpCode::Blocked));
        assert_eq!(rc, Some(JumpCode::Blocked));
        assert!(!in_envelope());
    }

    #[test]
    fn test_code_after_trigger_never_runs() {
        let _g = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let mut after = false;
        let rc = catch(|| {
            trigger(JumpCode::Exit);
            #[allow(unreachable_code)]
            {
                after = true;
            }
        });
        assert_eq!(rc, Some(JumpCode::Exit));
        assert!(!after);
    }

    #[test]
    fn test_panic_is_contained() {
        let _g = LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let rc = catch(|| panic!("tested code exploded"));
        assert_eq!(rc, None);
        assert!(panicked());
        assert!(!in_envelope());
    }
}
