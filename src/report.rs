/// Structured phase reports.
///
/// A [`PhaseSummary`] snapshots the counters (and optionally the last
/// envelope outcome) at the end of a test phase so results can be
/// exported as JSON and aggregated outside the harness.
use crate::config::types::{FaultboxError, Result};
use crate::envelope::Outcome;
use crate::record::stats;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSummary {
    pub name: String,
    pub errors: u32,
    pub infos: u32,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
}

impl PhaseSummary {
    /// Snapshot the current counters under the given phase name.
    pub fn capture(name: impl Into<String>, outcome: Option<Outcome>) -> Self {
        let errors = stats::error_count();
        PhaseSummary {
            name: name.into(),
            errors,
            infos: stats::info_count(),
            passed: errors == 0,
            outcome,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| FaultboxError::Report(e.to_string()))
    }

    /// Write the summary as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?).map_err(|e| {
            FaultboxError::Report(format!("Unable to write report {}: {e}", path.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::TermReason;

    #[test]
    fn test_summary_json_shape() {
        let summary = PhaseSummary {
            name: "phase 1".into(),
            errors: 0,
            infos: 2,
            passed: true,
            outcome: Some(Outcome {
                reason: TermReason::Normal,
                signal: None,
                exit_status: None,
            }),
        };
        let json = summary.to_json().unwrap();
        assert!(json.contains("\"name\": \"phase 1\""));
        assert!(json.contains("\"passed\": true"));

        let parsed: PhaseSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.infos, 2);
        assert_eq!(parsed.outcome.unwrap().reason, TermReason::Normal);
    }

    #[test]
    fn test_summary_without_outcome_omits_field() {
        let summary = PhaseSummary {
            name: "bare".into(),
            errors: 1,
            infos: 0,
            passed: false,
            outcome: None,
        };
        assert!(!summary.to_json().unwrap().contains("outcome"));
    }
}
