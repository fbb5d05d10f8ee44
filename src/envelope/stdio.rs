/// Standard stream redirection for the I/O envelope variant.
///
/// The prior descriptor is duplicated before redirection and the pair
/// is flushed, closed and restored symmetrically afterwards, so a
/// supervised block can read a prepared stdin file and write a
/// captured stdout file without disturbing the harness's own streams.
use crate::config::types::{FaultboxError, Result};
use crate::record::stats;
use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::{close, dup, dup2, unlink};
use std::io::Write;
use std::os::unix::io::RawFd;
use std::path::Path;

const STDIN_FD: RawFd = libc::STDIN_FILENO;
const STDOUT_FD: RawFd = libc::STDOUT_FILENO;

/// Active redirection state; `restore` must be called before the
/// harness resumes writing to the console.
pub(crate) struct StdioRedirect {
    /// (saved original fd, redirected file fd) for stdin.
    stdin: Option<(RawFd, RawFd)>,
    /// (saved original fd, redirected file fd) for stdout.
    stdout: Option<(RawFd, RawFd)>,
}

fn redirect_err(msg: String) -> FaultboxError {
    stats::error(&msg);
    FaultboxError::Redirect(msg)
}

/// Redirect stdin and/or stdout to the named files. A `None` leaves
/// the corresponding stream untouched.
pub(crate) fn redirect(
    stdin_file: Option<&Path>,
    stdout_file: Option<&Path>,
) -> Result<StdioRedirect> {
    let mut state = StdioRedirect {
        stdin: None,
        stdout: None,
    };

    if let Some(path) = stdin_file {
        let saved =
            dup(STDIN_FD).map_err(|e| redirect_err(format!("Unable to duplicate stdin: {e}")))?;
        close(STDIN_FD).map_err(|e| redirect_err(format!("Unable to close stdin: {e}")))?;
        let file = open(path, OFlag::O_RDONLY, Mode::empty()).map_err(|e| {
            redirect_err(format!(
                "Unable to open file {} as read-only: {e}",
                path.display()
            ))
        })?;
        dup2(file, STDIN_FD).map_err(|e| {
            redirect_err(format!(
                "Unable to associate file {} with stdin: {e}",
                path.display()
            ))
        })?;
        state.stdin = Some((saved, file));
    }

    if let Some(path) = stdout_file {
        // Flush buffered harness output before fd 1 changes hands.
        let _ = std::io::stdout().flush();

        let saved =
            dup(STDOUT_FD).map_err(|e| redirect_err(format!("Unable to duplicate stdout: {e}")))?;
        close(STDOUT_FD).map_err(|e| redirect_err(format!("Unable to close stdout: {e}")))?;

        // Start from a fresh file each run.
        let _ = unlink(path);

        let file = open(
            path,
            OFlag::O_CREAT | OFlag::O_WRONLY,
            Mode::from_bits_truncate(0o644),
        )
        .map_err(|e| {
            redirect_err(format!(
                "Unable to open file {} as write-only: {e}",
                path.display()
            ))
        })?;
        dup2(file, STDOUT_FD).map_err(|e| {
            redirect_err(format!(
                "Unable to associate file {} with stdout: {e}",
                path.display()
            ))
        })?;
        state.stdout = Some((saved, file));
    }

    Ok(state)
}

impl StdioRedirect {
    /// Restore the original streams. Flushes redirected stdout first so
    /// buffered data lands in the capture file rather than the console.
    ///
    /// Every step is attempted even when an earlier one fails; a block
    /// that closed its redirected stream must not leave the console
    /// detached. The first failure is returned.
    pub(crate) fn restore(self) -> Result<()> {
        let mut first_err: Option<FaultboxError> = None;
        let note = |step: &str, e: nix::errno::Errno, first: &mut Option<FaultboxError>| {
            first.get_or_insert(FaultboxError::Redirect(format!("{step}: {e}")));
        };

        if let Some((saved, file)) = self.stdin {
            if let Err(e) = close(file) {
                note("Unable to close stdin file", e, &mut first_err);
            }
            if let Err(e) = dup2(saved, STDIN_FD) {
                note("Unable to reassociate stdin with console", e, &mut first_err);
            }
            if let Err(e) = close(saved) {
                note("Unable to close saved stdin descriptor", e, &mut first_err);
            }
        }

        if let Some((saved, file)) = self.stdout {
            let _ = std::io::stdout().flush();
            unsafe { libc::fflush(std::ptr::null_mut()) };

            if let Err(e) = close(file) {
                note("Unable to close stdout file", e, &mut first_err);
            }
            if let Err(e) = dup2(saved, STDOUT_FD) {
                note("Unable to reassociate stdout with console", e, &mut first_err);
            }
            if let Err(e) = close(saved) {
                note("Unable to close saved stdout descriptor", e, &mut first_err);
            }
        }

        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
