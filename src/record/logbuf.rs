/// Verification logs: fixed-capacity FIFO rings of text lines.
///
/// Three independent process-wide instances exist for the lifetime of
/// the process: [`SUCCESS`], [`ERROR`] and [`DATA`]. Tested code and
/// mocks append lines; test assertions consume them from the head or
/// search them in order. Consumed head slots are not reclaimed: like
/// the capacity contract they model, a log holds at most
/// `LOG_CAPACITY` appends between clears.
use crate::config::types::{LOG_CAPACITY, LOG_LINE_MAX};
use crate::envelope::trampoline::{self, JumpCode};
use std::sync::Mutex;

/// Bounded ordered sequence of text lines with a consumable head.
#[derive(Debug, Default)]
pub struct LogBuffer {
    lines: Vec<String>,
    /// Index of the oldest unconsumed line; `None` when empty.
    start: Option<usize>,
}

impl LogBuffer {
    pub fn new() -> Self {
        LogBuffer {
            lines: Vec::new(),
            start: None,
        }
    }

    /// Reset to empty, reclaiming all slots.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.start = None;
    }

    /// Number of appends since the last clear.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        match self.start {
            None => true,
            Some(start) => start >= self.lines.len(),
        }
    }

    /// Append a line at the tail. Returns `false` when the buffer is at
    /// capacity; the caller decides how to escalate the overflow.
    /// Lines longer than `LOG_LINE_MAX` bytes are truncated.
    fn push(&mut self, mut line: String) -> bool {
        if self.lines.len() >= LOG_CAPACITY {
            return false;
        }
        if line.len() > LOG_LINE_MAX {
            let mut cut = LOG_LINE_MAX;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        if self.start.is_none() {
            self.start = Some(0);
        }
        self.lines.push(line);
        true
    }

    /// The oldest unconsumed line, if any.
    pub fn head(&self) -> Option<&str> {
        let start = self.start?;
        self.lines.get(start).map(String::as_str)
    }

    /// If the head line contains `expected`, consume it and return
    /// `true`; otherwise leave the log untouched and return `false`.
    pub fn remove_head_if(&mut self, expected: &str) -> bool {
        let Some(start) = self.start else {
            return false;
        };
        match self.lines.get(start) {
            Some(line) if line.contains(expected) => {
                self.start = Some(start + 1);
                true
            }
            _ => false,
        }
    }

    /// Linear scan from the head for a line equal to `line` (compared
    /// up to `LOG_LINE_MAX` bytes). Returns the absolute position or
    /// `None`. Does not mutate.
    pub fn find(&self, line: &str) -> Option<usize> {
        let start = self.start?;
        let needle = &line[..line.len().min(LOG_LINE_MAX)];
        self.lines[start..]
            .iter()
            .position(|l| l == needle)
            .map(|off| start + off)
    }

    /// Iterate over the unconsumed lines in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let start = self.start.unwrap_or(self.lines.len());
        self.lines[start.min(self.lines.len())..]
            .iter()
            .map(String::as_str)
    }
}

/// A process-wide verification log. Lock scopes are kept short so that
/// a non-local return can never fire while the guard is held.
pub struct GlobalLog {
    name: &'static str,
    inner: Mutex<LogBuffer>,
}

impl GlobalLog {
    const fn new(name: &'static str) -> Self {
        GlobalLog {
            name,
            inner: Mutex::new(LogBuffer {
                lines: Vec::new(),
                start: None,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut LogBuffer) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Append a line.
    ///
    /// On overflow this is a `LogOverflow` condition: inside an active
    /// execution envelope it is delivered as a non-local return;
    /// outside one the harness cannot continue and the process
    /// terminates with status 1.
    pub fn append(&self, line: impl Into<String>) {
        let line = line.into();
        let (ok, last) = self.with(|buf| {
            let last = buf.lines.last().cloned();
            (buf.push(line), last)
        });
        if ok {
            return;
        }
        // Guard released above: safe to report and jump.
        crate::record::stats::error(format!("No more space in {} log, aborting", self.name));
        if let Some(last) = last {
            crate::record::stats::error(format!("Last message was: \"{last}\""));
        }
        if trampoline::in_envelope() {
            trampoline::trigger(JumpCode::LogOverflow);
        } else {
            log::error!("{} log overflow outside an execution envelope", self.name);
            std::process::exit(1);
        }
    }

    /// Oldest unconsumed line, or the literal `<empty>` marker.
    pub fn head(&self) -> String {
        self.with(|buf| buf.head().map(str::to_owned))
            .unwrap_or_else(|| "<empty>".to_owned())
    }

    /// Consume the head line if it contains `expected`.
    pub fn remove_head_if(&self, expected: &str) -> bool {
        self.with(|buf| buf.remove_head_if(expected))
    }

    /// Position of an exact line, scanning from the head.
    pub fn find(&self, line: &str) -> Option<usize> {
        self.with(|buf| buf.find(line))
    }

    pub fn is_empty(&self) -> bool {
        self.with(|buf| buf.is_empty())
    }

    /// Snapshot of the unconsumed lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.with(|buf| buf.iter().map(str::to_owned).collect())
    }

    pub fn clear(&self) {
        self.with(|buf| buf.clear());
    }

    /// Debug aid: print the unconsumed lines to stdout.
    pub fn print_all(&self) {
        let lines = self.lines();
        if lines.is_empty() {
            println!("<empty>");
        } else {
            for (i, line) in lines.iter().enumerate() {
                println!("{i:3} - {line}");
            }
        }
    }
}

/// Success-message verification log.
pub static SUCCESS: GlobalLog = GlobalLog::new("success");
/// Error-message verification log.
pub static ERROR: GlobalLog = GlobalLog::new("error");
/// Call-trace data log written by mocks in `Action::Log` mode.
pub static DATA: GlobalLog = GlobalLog::new("data");

/// Append a line to the call-trace data log.
pub fn datalog(line: impl Into<String>) {
    DATA.append(line);
}

/// Append a line to the error verification log.
pub fn errorlog(line: impl Into<String>) {
    ERROR.append(line);
}

/// Append a line to the success verification log.
pub fn successlog(line: impl Into<String>) {
    SUCCESS.append(line);
}

/// Clear all three verification logs.
pub fn clear_logs() {
    SUCCESS.clear();
    ERROR.clear();
    DATA.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_buffer_head() {
        let buf = LogBuffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.head(), None);
    }

    #[test]
    fn test_append_then_consume_in_order() {
        let mut buf = LogBuffer::new();
        assert!(buf.push("a".into()));
        assert!(buf.push("b".into()));
        assert!(buf.push("c".into()));

        assert!(buf.remove_head_if("a"));
        assert!(buf.remove_head_if("b"));
        assert_eq!(buf.head(), Some("c"));
        assert!(buf.remove_head_if("c"));
        assert!(buf.is_empty());
        // Fourth removal fails without mutating.
        assert!(!buf.remove_head_if("c"));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_remove_head_mismatch_does_not_mutate() {
        let mut buf = LogBuffer::new();
        buf.push("alpha".into());
        assert!(!buf.remove_head_if("beta"));
        assert_eq!(buf.head(), Some("alpha"));
    }

    #[test]
    fn test_head_matches_on_substring() {
        let mut buf = LogBuffer::new();
        buf.push("kill,123,9".into());
        assert!(buf.remove_head_if("kill,123"));
    }

    #[test]
    fn test_find_scans_from_head() {
        let mut buf = LogBuffer::new();
        buf.push("one".into());
        buf.push("two".into());
        buf.push("three".into());
        assert_eq!(buf.find("two"), Some(1));
        assert_eq!(buf.find("four"), None);

        // Consumed lines are no longer findable.
        assert!(buf.remove_head_if("one"));
        assert!(buf.remove_head_if("two"));
        assert_eq!(buf.find("two"), None);
        assert_eq!(buf.find("three"), Some(2));
    }

    #[test]
    fn test_capacity_is_not_reclaimed_by_consumption() {
        let mut buf = LogBuffer::new();
        for i in 0..LOG_CAPACITY {
            assert!(buf.push(format!("line {i}")));
        }
        assert!(!buf.push("overflow".into()));
        assert!(buf.remove_head_if("line 0"));
        // Consuming the head does not free an append slot.
        assert!(!buf.push("still full".into()));
        buf.clear();
        assert!(buf.push("fresh".into()));
    }

    #[test]
    fn test_long_lines_truncated() {
        let mut buf = LogBuffer::new();
        buf.push("x".repeat(LOG_LINE_MAX * 2));
        assert_eq!(buf.head().unwrap().len(), LOG_LINE_MAX);
    }
}
