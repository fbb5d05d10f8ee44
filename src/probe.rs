/// Pointer validity prober.
///
/// Classifies an address by actually touching it: a one-byte volatile
/// read (plus a write-back of the same byte for the mutable variant)
/// under temporary SIGSEGV/SIGBUS handlers. Null and the all-bits-one
/// sentinel are rejected without probing. The prior signal dispositions
/// are restored on every exit path, so the probe composes with an
/// armed execution envelope.
///
/// The probe is a diagnostic, not a guarantee: an address classified
/// [`PtrClass::Valid`] was mapped at the instant of the probe, nothing
/// more.
use crate::config::types::PtrClass;
use crate::envelope::signals::fatal;
use crate::envelope::trampoline::{siglongjmp, sigsetjmp, JumpBuf};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::cell::UnsafeCell;
use std::os::raw::{c_int, c_void};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

struct ProbeSlot(UnsafeCell<JumpBuf>);

// Guarded by PROBE_LOCK: one probe runs at a time, and a fault signal
// raised by the probed access is delivered to the probing thread.
unsafe impl Sync for ProbeSlot {}

static PROBE_JMP: ProbeSlot = ProbeSlot(UnsafeCell::new(JumpBuf::zeroed()));
static PROBE_SIGNAL: AtomicI32 = AtomicI32::new(-1);
static PROBE_LOCK: Mutex<()> = Mutex::new(());

extern "C" fn probe_handler(sig: c_int) {
    PROBE_SIGNAL.store(sig, Ordering::SeqCst);
    unsafe { siglongjmp(PROBE_JMP.0.get(), 1) }
}

fn install(sig: Signal) -> SigAction {
    let act = SigAction::new(
        SigHandler::Handler(probe_handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    match unsafe { signal::sigaction(sig, &act) } {
        Ok(old) => old,
        Err(e) => fatal("unable to set pointer probe signal handler", e),
    }
}

fn restore(sig: Signal, old: &SigAction) {
    if let Err(e) = unsafe { signal::sigaction(sig, old) } {
        fatal("unable to restore signal handler after pointer probe", e);
    }
}

#[inline(never)]
extern "C" fn touch_read(ptr: *mut c_void) {
    unsafe {
        std::ptr::read_volatile(ptr as *const u8);
    }
}

#[inline(never)]
extern "C" fn touch_read_write(ptr: *mut c_void) {
    unsafe {
        let byte = std::ptr::read_volatile(ptr as *const u8);
        std::ptr::write_volatile(ptr as *mut u8, byte);
    }
}

/// Run `access(ptr)` under the probe's resumption point. Returns 0 when
/// the access completed, non-zero when a handler jumped back.
#[inline(never)]
fn guarded(access: extern "C" fn(*mut c_void), ptr: *mut c_void) -> c_int {
    unsafe {
        let rc = sigsetjmp(PROBE_JMP.0.get(), 1);
        if rc == 0 {
            access(ptr);
        }
        rc
    }
}

fn classify(ptr: *mut c_void, access: extern "C" fn(*mut c_void)) -> PtrClass {
    if ptr.is_null() {
        return PtrClass::Null;
    }
    if ptr as usize == usize::MAX {
        return PtrClass::Sentinel;
    }

    let _guard = PROBE_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    PROBE_SIGNAL.store(-1, Ordering::SeqCst);

    let old_segv = install(Signal::SIGSEGV);
    let old_bus = install(Signal::SIGBUS);
    let faulted = guarded(access, ptr) != 0;
    restore(Signal::SIGBUS, &old_bus);
    restore(Signal::SIGSEGV, &old_segv);

    if !faulted {
        return PtrClass::Valid;
    }
    match PROBE_SIGNAL.load(Ordering::SeqCst) {
        libc::SIGSEGV => PtrClass::Segv,
        libc::SIGBUS => PtrClass::BusError,
        _ => PtrClass::Unexpected,
    }
}

/// Classify a pointer destined for writes: probes with a one-byte read
/// followed by a write-back of the same byte.
pub fn check_ptr(ptr: *mut c_void) -> PtrClass {
    classify(ptr, touch_read_write)
}

/// Classify a read-only pointer with a one-byte volatile read.
pub fn check_const_ptr(ptr: *const c_void) -> PtrClass {
    classify(ptr as *mut c_void, touch_read)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_and_sentinel_short_circuit() {
        assert_eq!(check_ptr(std::ptr::null_mut()), PtrClass::Null);
        assert_eq!(check_const_ptr(usize::MAX as *const c_void), PtrClass::Sentinel);
    }

    #[test]
    fn test_stack_and_static_addresses_are_valid() {
        let mut local = 7u8;
        assert_eq!(check_ptr(&mut local as *mut u8 as *mut c_void), PtrClass::Valid);

        static BYTES: [u8; 4] = *b"data";
        assert_eq!(
            check_const_ptr(BYTES.as_ptr() as *const c_void),
            PtrClass::Valid
        );
    }

    #[test]
    fn test_unmapped_page_classified_segv() {
        let page = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                4096,
                libc::PROT_NONE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(page, libc::MAP_FAILED);
        assert_eq!(check_const_ptr(page as *const c_void), PtrClass::Segv);
        unsafe { libc::munmap(page, 4096) };
    }

    #[test]
    fn test_probe_does_not_mutate() {
        let mut value = 42u8;
        check_ptr(&mut value as *mut u8 as *mut c_void);
        assert_eq!(value, 42);
    }
}
