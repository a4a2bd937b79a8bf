//! Analysis orchestration
//!
//! [`AnalysisEngine`] runs one snippet through every rule of a [`RuleSet`]
//! and returns an [`AnalysisReport`]. Failures of individual rules are
//! contained in the report; only staging failure, total failure and
//! cancellation end a run with an [`AnalysisError`].
//!
//! [`RuleSet`]: crate::rules::RuleSet

mod analyzer;
pub mod projector;

pub use analyzer::AnalysisEngine;
pub use projector::{AnalysisResponse, ResultEntry, ResultProjector};

use crate::finding::Finding;
use crate::rules::RuleError;
use crate::source::StagingError;
use std::time::Duration;
use thiserror::Error;

/// Per-rule timing of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTiming {
    /// Rule name
    pub rule_name: String,
    /// Wall time until the rule finished or was abandoned
    pub elapsed: Duration,
    /// Findings emitted before filtering
    pub finding_count: usize,
    /// Whether the rule ended with an error
    pub failed: bool,
}

/// Outcome of a run that did not fail as a whole
#[derive(Debug, Default)]
pub struct AnalysisReport {
    /// Filtered, normalized and deduplicated findings in rule order
    pub findings: Vec<Finding>,

    /// Contained rule failures, in rule order
    pub rule_errors: Vec<RuleError>,

    /// One entry per rule, in rule order
    pub timings: Vec<RuleTiming>,

    /// Total run time, staging included
    pub duration: Duration,

    /// Findings dropped by the priority threshold
    pub filtered_out: usize,
}

impl AnalysisReport {
    /// No findings and no rule errors
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty() && self.rule_errors.is_empty()
    }

    /// Timings sorted by elapsed time, slowest first
    pub fn sorted_timings(&self) -> Vec<&RuleTiming> {
        let mut timings: Vec<_> = self.timings.iter().collect();
        timings.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));
        timings
    }
}

fn summarize(errors: &[RuleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run-level failure
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Staging(#[from] StagingError),

    #[error("All {} rules failed: {}", .errors.len(), summarize(.errors))]
    AllRulesFailed { errors: Vec<RuleError> },

    #[error("Analysis was cancelled")]
    Cancelled,
}

/// Error while constructing an engine
#[derive(Debug, Error)]
pub enum EngineBuildError {
    #[error("Failed to build rule worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}
