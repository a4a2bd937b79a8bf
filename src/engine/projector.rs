//! Projection of findings to the external response shape

use super::AnalysisReport;
use crate::finding::{Finding, Priority};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub const SUCCESS_MESSAGE: &str = "Code analyzed successfully";
pub const FAILURE_MESSAGE: &str = "Error analyzing code";
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request body";

/// One entry of the `results` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    pub description: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl ResultEntry {
    /// Entry carrying only a message, used for run-level errors
    pub fn message(description: impl Into<String>) -> Self {
        Self {
            line: None,
            description: description.into(),
            rule: None,
            priority: None,
        }
    }
}

/// Response envelope of `POST /api/analyze`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub results: Vec<ResultEntry>,
    pub message: String,
}

/// Maps findings to result entries
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultProjector {
    verbose: bool,
}

impl ResultProjector {
    /// `verbose` adds rule name and priority to every entry
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Map one finding to its external shape
    pub fn project(&self, finding: &Finding) -> ResultEntry {
        ResultEntry {
            line: finding.line,
            description: finding.description.clone(),
            rule: self.verbose.then(|| finding.rule_name.clone()),
            priority: self.verbose.then_some(finding.priority),
        }
    }

    pub fn project_all(&self, findings: &[Finding]) -> Vec<ResultEntry> {
        findings.iter().map(|f| self.project(f)).collect()
    }

    /// Envelope for a completed run
    pub fn success(&self, report: &AnalysisReport) -> AnalysisResponse {
        AnalysisResponse {
            results: self.project_all(&report.findings),
            message: SUCCESS_MESSAGE.to_string(),
        }
    }

    /// Envelope carrying a run-level error as its single entry
    pub fn failure(&self, error: &dyn Display) -> AnalysisResponse {
        AnalysisResponse {
            results: vec![ResultEntry::message(format!(
                "Error during analysis: {}",
                error
            ))],
            message: FAILURE_MESSAGE.to_string(),
        }
    }

    /// Envelope for a request body that could not be parsed
    pub fn invalid_request(&self, detail: &dyn Display) -> AnalysisResponse {
        AnalysisResponse {
            results: vec![ResultEntry::message(format!(
                "{}: {}",
                INVALID_REQUEST_MESSAGE, detail
            ))],
            message: INVALID_REQUEST_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::AnalysisError;
    use crate::rules::{RuleError, RuleExecutionError};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn findings() -> Vec<Finding> {
        vec![
            Finding::new("SystemPrintln", Priority::MediumHigh, 3, "Usage of System.out/err"),
            Finding::without_line("tool", Priority::Medium, "global problem"),
        ]
    }

    #[test]
    fn test_plain_projection() {
        let report = AnalysisReport {
            findings: findings(),
            ..Default::default()
        };
        let response = ResultProjector::default().success(&report);

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "results": [
                    {"line": 3, "description": "Usage of System.out/err"},
                    {"description": "global problem"}
                ],
                "message": "Code analyzed successfully"
            })
        );
    }

    #[test]
    fn test_verbose_projection() {
        let entries = ResultProjector::new(true).project_all(&findings());
        assert_eq!(
            serde_json::to_value(&entries[0]).unwrap(),
            json!({
                "line": 3,
                "description": "Usage of System.out/err",
                "rule": "SystemPrintln",
                "priority": "medium-high"
            })
        );
    }

    #[test]
    fn test_projection_preserves_order() {
        let findings: Vec<_> = (1..=5)
            .rev()
            .map(|line| Finding::new("r", Priority::High, line, "m"))
            .collect();
        let lines: Vec<_> = ResultProjector::default()
            .project_all(&findings)
            .into_iter()
            .map(|e| e.line)
            .collect();
        assert_eq!(lines, vec![Some(5), Some(4), Some(3), Some(2), Some(1)]);
    }

    #[test]
    fn test_failure_envelope() {
        let err = AnalysisError::AllRulesFailed {
            errors: vec![RuleError::new(
                "EmptyCatchBlock",
                RuleExecutionError::Internal("boom".to_string()),
            )],
        };
        let response = ResultProjector::default().failure(&err);

        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "results": [
                    {"description": "Error during analysis: All 1 rules failed: EmptyCatchBlock: boom"}
                ],
                "message": "Error analyzing code"
            })
        );
    }

    #[test]
    fn test_invalid_request_envelope() {
        let response = ResultProjector::default().invalid_request(&"missing field `code`");
        assert_eq!(response.message, "Invalid request body");
        assert_eq!(
            response.results[0].description,
            "Invalid request body: missing field `code`"
        );
    }
}
