//! Integration tests for the execution envelope: fault capture,
//! termination capture, timeout, stream redirection and descriptor
//! leak detection.
//!
//! The envelope arms process-wide state (signal dispositions, the jump
//! buffer, the counters), so every test serializes on TEST_LOCK.

use faultbox::config::types::LOG_CAPACITY;
use faultbox::record::logbuf::{datalog, DATA};
use faultbox::record::stats;
use faultbox::{mock, policy, Action, TermReason};
use std::sync::Mutex;
use std::time::{Duration, Instant};

static TEST_LOCK: Mutex<()> = Mutex::new(());

fn setup() -> std::sync::MutexGuard<'static, ()> {
    let _ = env_logger::builder().is_test(true).try_init();
    let guard = TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    policy::reset();
    guard
}

#[test]
fn test_normal_block_returns_normally() {
    let _g = setup();
    let mut ran = false;
    let outcome = faultbox::run_catching(|| ran = true);
    assert!(ran);
    assert_eq!(outcome.reason, TermReason::Normal);
    assert!(outcome.is_normal());
    assert_eq!(stats::error_count(), 0);
}

#[test]
fn test_sentinel_dereference_is_caught_as_signal() {
    let _g = setup();
    let outcome = faultbox::run_catching(|| {
        let ptr = usize::MAX as *const u8;
        unsafe {
            std::ptr::read_volatile(ptr);
        }
    });
    assert_eq!(outcome.reason, TermReason::Signal);
    let sig = outcome.signal.expect("fault signal recorded");
    assert!(sig == libc::SIGSEGV || sig == libc::SIGBUS);
    // Recovered faults are reported but never counted as defects.
    assert_eq!(stats::error_count(), 0);
    assert_eq!(stats::info_count(), 1);
}

#[test]
fn test_unmapped_page_dereference_is_caught() {
    let _g = setup();
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
    let outcome = faultbox::run_catching(|| unsafe {
        std::ptr::read_volatile(page as *const u8);
    });
    unsafe { libc::munmap(page, 4096) };
    assert_eq!(outcome.reason, TermReason::Signal);
    assert_eq!(outcome.signal, Some(libc::SIGSEGV));
}

#[test]
fn test_exit_is_captured_with_status() {
    let _g = setup();
    let mut after = false;
    let outcome = faultbox::run_catching(|| {
        mock::process::exit(100);
        #[allow(unreachable_code)]
        {
            after = true;
        }
    });
    assert_eq!(outcome.reason, TermReason::Exit);
    assert_eq!(outcome.exit_status, Some(100));
    assert!(!after);
    assert_eq!(outcome.describe(), "exit(100) called");
}

#[test]
fn test_exit_warn_reports_info() {
    let _g = setup();
    mock::process::EXIT.set_action(Action::Warn);
    let outcome = faultbox::run_catching(|| mock::process::exit(3));
    assert_eq!(outcome.reason, TermReason::Exit);
    assert_eq!(outcome.exit_status, Some(3));
    assert_eq!(stats::info_count(), 1);
}

#[test]
fn test_abort_is_captured() {
    let _g = setup();
    let outcome = faultbox::run_catching(|| mock::process::abort());
    assert_eq!(outcome.reason, TermReason::Abort);
    assert_eq!(outcome.describe(), "abort() called");
}

#[test]
fn test_panic_is_contained_as_abort() {
    let _g = setup();
    let outcome = faultbox::run_catching(|| panic!("tested code exploded"));
    assert_eq!(outcome.reason, TermReason::Abort);
    assert_eq!(stats::error_count(), 0);
    assert_eq!(stats::info_count(), 1);
}

#[test]
fn test_blocked_primitive_stops_the_block() {
    let _g = setup();
    // The safe policy blocks pause().
    let mut after = false;
    let outcome = faultbox::run_catching(|| {
        mock::signals::pause();
        after = true;
    });
    assert_eq!(outcome.reason, TermReason::Blocked);
    assert!(!after);
    assert_eq!(stats::error_count(), 1);
    assert_eq!(outcome.describe(), "blocked function called");
}

#[test]
fn test_busy_loop_hits_profiling_timeout() {
    let _g = setup();
    faultbox::set_timeout(0.2);
    let started = Instant::now();
    let outcome = faultbox::run_catching(|| {
        let mut spin = 0u64;
        // Bounded fallback so a broken timer fails the assert instead
        // of hanging the suite.
        while started.elapsed() < Duration::from_secs(10) {
            spin = spin.wrapping_add(1);
            std::hint::black_box(spin);
        }
    });
    assert_eq!(outcome.reason, TermReason::Signal);
    assert_eq!(outcome.signal, Some(libc::SIGPROF));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_zero_timeout_disables_the_timer() {
    let _g = setup();
    faultbox::set_timeout(0.0);
    let outcome = faultbox::run_catching(|| {
        let mut spin = 0u64;
        for _ in 0..1_000_000 {
            spin = spin.wrapping_add(1);
            std::hint::black_box(spin);
        }
    });
    assert_eq!(outcome.reason, TermReason::Normal);
}

#[test]
fn test_leaked_descriptor_is_swept_and_reported() {
    let _g = setup();
    let mut leaked: libc::c_int = -1;
    let outcome = faultbox::run_catching(|| {
        leaked = unsafe { libc::open(b"/dev/null\0".as_ptr().cast(), libc::O_RDONLY) };
    });
    assert_eq!(outcome.reason, TermReason::Normal);
    assert!(leaked >= 0);
    // The stray descriptor was closed at teardown.
    assert_eq!(unsafe { libc::fcntl(leaked, libc::F_GETFD) }, -1);
    assert_eq!(stats::error_count(), 1);
}

#[test]
fn test_properly_closed_descriptor_is_not_reported() {
    let _g = setup();
    let outcome = faultbox::run_catching(|| {
        let fd = unsafe { libc::open(b"/dev/null\0".as_ptr().cast(), libc::O_RDONLY) };
        assert!(fd >= 0);
        unsafe { libc::close(fd) };
    });
    assert_eq!(outcome.reason, TermReason::Normal);
    assert_eq!(stats::error_count(), 0);
}

#[test]
fn test_log_overflow_ends_the_block() {
    let _g = setup();
    let outcome = faultbox::run_catching(|| {
        for i in 0..=LOG_CAPACITY {
            datalog(format!("line {i}"));
        }
    });
    assert_eq!(outcome.reason, TermReason::LogOverflow);
    assert_eq!(outcome.describe(), "log buffer full");
    // Overflow reports the log name and the last message it held.
    assert!(stats::error_count() >= 1);
    assert!(!DATA.is_empty());
}

#[test]
fn test_stdout_redirection_captures_writes() {
    let _g = setup();
    let dir = std::env::temp_dir();
    let stdout_file = dir.join(format!("faultbox-out-{}", std::process::id()));

    let outcome = faultbox::run_catching_io(
        || {
            let msg = b"hello from the envelope\n";
            unsafe { libc::write(libc::STDOUT_FILENO, msg.as_ptr().cast(), msg.len()) };
        },
        None,
        Some(stdout_file.as_path()),
    )
    .expect("redirection succeeds");

    assert_eq!(outcome.reason, TermReason::Normal);
    let captured = std::fs::read_to_string(&stdout_file).unwrap();
    assert_eq!(captured, "hello from the envelope\n");
    std::fs::remove_file(&stdout_file).unwrap();
}

#[test]
fn test_stdin_redirection_feeds_the_block() {
    let _g = setup();
    let dir = std::env::temp_dir();
    let stdin_file = dir.join(format!("faultbox-in-{}", std::process::id()));
    std::fs::write(&stdin_file, "42\n").unwrap();

    let mut buf = [0u8; 16];
    let mut n = 0isize;
    let outcome = faultbox::run_catching_io(
        || {
            n = unsafe { libc::read(libc::STDIN_FILENO, buf.as_mut_ptr().cast(), buf.len()) };
        },
        Some(stdin_file.as_path()),
        None,
    )
    .expect("redirection succeeds");

    assert_eq!(outcome.reason, TermReason::Normal);
    assert_eq!(&buf[..n as usize], b"42\n");
    std::fs::remove_file(&stdin_file).unwrap();
}

#[test]
fn test_missing_stdin_file_is_a_setup_error() {
    let _g = setup();
    let missing = std::path::Path::new("/nonexistent/faultbox-stdin");
    let result = faultbox::run_catching_io(|| {}, Some(missing), None);
    assert!(result.is_err());
}

#[test]
fn test_broken_restore_still_sweeps_descriptors() {
    let _g = setup();
    let dir = std::env::temp_dir();
    let stdout_file = dir.join(format!("faultbox-broken-out-{}", std::process::id()));

    let mut leaked: libc::c_int = -1;
    let outcome = faultbox::run_catching_io(
        || {
            leaked = unsafe { libc::open(b"/dev/null\0".as_ptr().cast(), libc::O_RDONLY) };
            // Sabotage the redirected stream; teardown must cope.
            unsafe { libc::close(libc::STDOUT_FILENO) };
        },
        None,
        Some(stdout_file.as_path()),
    )
    .expect("teardown failures are reported, not returned");

    assert_eq!(outcome.reason, TermReason::Normal);
    // The restore defect was reported and the sweep still ran.
    assert!(stats::error_count() >= 1);
    assert!(leaked >= 0);
    assert_eq!(unsafe { libc::fcntl(leaked, libc::F_GETFD) }, -1);
    std::fs::remove_file(&stdout_file).ok();
}

#[test]
fn test_fault_in_redirected_block_still_restores_streams() {
    let _g = setup();
    let dir = std::env::temp_dir();
    let stdout_file = dir.join(format!("faultbox-fault-out-{}", std::process::id()));

    let outcome = faultbox::run_catching_io(
        || {
            let msg = b"before the fault\n";
            unsafe { libc::write(libc::STDOUT_FILENO, msg.as_ptr().cast(), msg.len()) };
            unsafe { std::ptr::read_volatile(usize::MAX as *const u8) };
        },
        None,
        Some(stdout_file.as_path()),
    )
    .expect("redirection succeeds");

    assert_eq!(outcome.reason, TermReason::Signal);
    let captured = std::fs::read_to_string(&stdout_file).unwrap();
    assert_eq!(captured, "before the fault\n");
    std::fs::remove_file(&stdout_file).unwrap();
}
