/// Open-file-descriptor leak monitor.
///
/// At envelope entry the lowest unused descriptor number is recorded
/// as a watermark; every descriptor the supervised block opens will be
/// numbered at or above it. At teardown every number from the
/// watermark up to the process limit is closed. Descriptors that were
/// still open are a correctness defect of the tested code: they are
/// force-closed, counted, and reported through the error counter.
use crate::record::stats;
use nix::errno::Errno;
use nix::unistd::{close, dup};
use std::os::unix::io::RawFd;

/// Lowest descriptor number guaranteed unused at this instant.
pub(crate) fn watermark() -> RawFd {
    match dup(libc::STDIN_FILENO) {
        Ok(fd) => {
            let _ = close(fd);
            fd
        }
        Err(e) => {
            // Without a watermark the sweep would close harness fds.
            log::error!("(*critical*) unable to probe descriptor watermark: {e}");
            eprintln!("faultbox: (*critical*) unable to probe descriptor watermark: {e}");
            std::process::exit(1);
        }
    }
}

/// Close every descriptor from `watermark` to the process limit.
/// Returns the number of stray descriptors found, after reporting a
/// defect when it is non-zero.
pub(crate) fn sweep(watermark: RawFd) -> u32 {
    let max_fd = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
    let max_fd = if max_fd < 0 { 1024 } else { max_fd as RawFd };

    let mut strays = 0u32;
    for fd in watermark..max_fd {
        match close(fd) {
            Ok(()) => strays += 1,
            // EBADF means the slot was never open; anything else means
            // it was open and could not be closed.
            Err(Errno::EBADF) => {}
            Err(e) => {
                strays += 1;
                log::warn!("unable to close leaked descriptor {fd}: {e}");
            }
        }
    }

    if strays == 1 {
        stats::error("1 file was not closed");
    } else if strays > 1 {
        stats::error(format!("{strays} files were not closed"));
    }
    strays
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_is_above_stdio() {
        assert!(watermark() > libc::STDERR_FILENO);
    }

    #[test]
    fn test_watermark_stable_without_opens() {
        // Probing must not itself leak a descriptor.
        assert_eq!(watermark(), watermark());
    }
}
