/// Reset and default-policy layer.
///
/// [`reset`] is the between-phases boundary: every interception cell
/// back to pass-through, counters and verification logs cleared, the
/// default timeout restored, and then the safe policy applied on top.
use crate::config::types::Action;
use crate::envelope;
use crate::mock::{fifo, fs, msg, process, sem, shm, signals};
use crate::record::{logbuf, stats};

/// Zero every interception cell and restore the default timeout.
pub fn reset_mocks() {
    envelope::reset_timeout();

    process::EXIT.reset();
    process::ABORT.reset();
    process::SLEEP.reset();
    process::FORK.reset();
    process::WAIT.reset();
    process::WAITPID.reset();
    process::EXECL.reset();

    signals::KILL.reset();
    signals::RAISE.reset();
    signals::SIGNAL.reset();
    signals::SIGACTION.reset();
    signals::PAUSE.reset();
    signals::ALARM.reset();

    msg::MSGGET.reset();
    msg::MSGSND.reset();
    msg::MSGRCV.reset();
    msg::MSGCTL.reset();

    sem::SEMGET.reset();
    sem::SEMCTL.reset();
    sem::SEMOP.reset();

    shm::SHMGET.reset();
    shm::SHMAT.reset();
    shm::SHMDT.reset();
    shm::SHMCTL.reset();

    fifo::MKFIFO.reset();
    fifo::ISFIFO.reset();

    fs::REMOVE.reset();
    fs::UNLINK.reset();
    fs::ATOI.reset();
    fs::FCLOSE.reset();
    fs::FREAD.reset();
    fs::FWRITE.reset();
    fs::FSEEK.reset();
}

/// Primitives that would stall or replace the test process abort the
/// supervised block instead; signals aimed at the harness are refused.
pub fn apply_safe_defaults() {
    process::WAIT.set_action(Action::Block);
    process::WAITPID.set_action(Action::Block);
    process::EXECL.set_action(Action::Block);
    signals::PAUSE.set_action(Action::Block);
    signals::RAISE.set_action(Action::Block);
    signals::KILL.set_action(Action::Protect);
}

/// Full between-phases reset: mocks, safe defaults, counters, logs.
pub fn reset() {
    reset_mocks();
    apply_safe_defaults();
    stats::reset();
    logbuf::clear_logs();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_applies_safe_policy() {
        reset();
        assert_eq!(signals::PAUSE.action(), Action::Block);
        assert_eq!(signals::KILL.action(), Action::Protect);
        assert_eq!(signals::RAISE.action(), Action::Block);
        assert_eq!(process::WAIT.action(), Action::Block);
        assert_eq!(process::WAITPID.action(), Action::Block);
        assert_eq!(process::EXECL.action(), Action::Block);
        // Everything else passes through.
        assert_eq!(process::SLEEP.action(), Action::Default);
        assert_eq!(msg::MSGGET.action(), Action::Default);
    }

    #[test]
    fn test_reset_clears_counters_and_captures() {
        process::SLEEP.with(|s| {
            s.calls = 3;
            s.data.seconds = 9;
        });
        reset_mocks();
        assert_eq!(process::SLEEP.calls(), 0);
        assert_eq!(process::SLEEP.snapshot().seconds, 0);
    }
}
