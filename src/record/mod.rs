/// Verification logs and phase statistics
pub mod logbuf;
pub mod stats;

pub use logbuf::{clear_logs, datalog, errorlog, successlog, GlobalLog, LogBuffer};
pub use stats::{check_error_head, check_success_head, close_logs, phase_complete};
