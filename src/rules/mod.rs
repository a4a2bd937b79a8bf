//! Rule abstraction
//!
//! A rule is an opaque analysis pass over a [`SourceUnit`]. The engine only
//! knows the [`Rule`] trait; concrete rules live in the submodules and are
//! assembled into a [`RuleSet`] from a named bundle.

pub mod external;
pub mod pattern;
pub mod ruleset;
pub mod structure;

pub use external::ExternalToolRule;
pub use pattern::{PatternRule, Scope};
pub use ruleset::{RuleSet, RuleSetResolutionError, BUNDLES};
pub use structure::{
    ControlStatementBraces, EmptyCatchBlock, LongLine, SwitchStmtsShouldHaveDefault,
    UnnecessaryImport,
};

use crate::finding::{Finding, Priority};
use crate::source::{ScanError, SourceUnit};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Error raised by a single rule evaluation
#[derive(Debug, Error)]
pub enum RuleExecutionError {
    #[error("Malformed input: {0}")]
    Malformed(#[from] ScanError),

    #[error("Rule requires a staged file but the source unit was not staged")]
    NotStaged,

    #[error("Failed to run {program}: {source}")]
    ToolSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to collect output of {program}: {source}")]
    ToolOutput {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status} and produced no output")]
    ToolFailed { program: String, status: String },

    #[error("Rule panicked: {0}")]
    Panicked(String),

    #[error("Rule timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("{0}")]
    Internal(String),
}

impl RuleExecutionError {
    /// Whether the rule ran out of time
    pub fn is_timeout(&self) -> bool {
        matches!(self, RuleExecutionError::Timeout(_))
    }
}

/// A contained rule failure, attributed to the rule that raised it
#[derive(Debug, Error)]
#[error("{rule_name}: {cause}")]
pub struct RuleError {
    pub rule_name: String,
    #[source]
    pub cause: RuleExecutionError,
}

impl RuleError {
    pub fn new(rule_name: &str, cause: RuleExecutionError) -> Self {
        Self {
            rule_name: rule_name.to_string(),
            cause,
        }
    }
}

/// An analysis pass over a source unit
pub trait Rule: Send + Sync {
    /// Unique rule name (e.g., "EmptyCatchBlock")
    fn name(&self) -> &str;

    /// Priority assigned to this rule's findings
    fn priority(&self) -> Priority;

    /// Short human-readable description
    fn description(&self) -> &str {
        ""
    }

    /// Evaluate the rule, returning findings in emission order
    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError>;
}

/// Wraps a rule and reports its findings at a configured priority
pub struct PriorityOverride {
    inner: Arc<dyn Rule>,
    priority: Priority,
}

impl PriorityOverride {
    pub fn new(inner: Arc<dyn Rule>, priority: Priority) -> Self {
        Self { inner, priority }
    }
}

impl Rule for PriorityOverride {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let findings = self.inner.evaluate(unit)?;
        Ok(findings
            .into_iter()
            .map(|mut f| {
                f.priority = self.priority;
                f
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Language;

    struct Fixed;

    impl Rule for Fixed {
        fn name(&self) -> &str {
            "Fixed"
        }

        fn priority(&self) -> Priority {
            Priority::Low
        }

        fn evaluate(&self, _unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
            Ok(vec![Finding::new("Fixed", Priority::Low, 1, "always")])
        }
    }

    #[test]
    fn test_priority_override() {
        let rule = PriorityOverride::new(Arc::new(Fixed), Priority::High);
        let unit = SourceUnit::new("", Language::Java);

        assert_eq!(rule.name(), "Fixed");
        assert_eq!(rule.priority(), Priority::High);
        let findings = rule.evaluate(&unit).unwrap();
        assert_eq!(findings[0].priority, Priority::High);
    }

    #[test]
    fn test_rule_error_display() {
        let err = RuleError::new(
            "EmptyCatchBlock",
            RuleExecutionError::Malformed(ScanError::UnclosedBrace { line: 3 }),
        );
        assert_eq!(
            err.to_string(),
            "EmptyCatchBlock: Malformed input: Unclosed brace opened at line 3"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = RuleExecutionError::Timeout(Duration::from_millis(250));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "Rule timed out after 250ms");
    }
}
