//! Finding types for analysis results

use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule priority, strongest first: `High` is level 1, `Low` is level 5
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum Priority {
    /// Cosmetic issues
    Low,
    /// Minor style issues
    #[serde(alias = "medium_low")]
    MediumLow,
    /// Default level for most quality rules
    #[default]
    Medium,
    /// Likely bugs or bad practice
    #[serde(alias = "medium_high")]
    MediumHigh,
    /// Definite problems
    High,
}

impl Priority {
    /// All priorities from strongest to weakest
    pub const ALL: [Priority; 5] = [
        Priority::High,
        Priority::MediumHigh,
        Priority::Medium,
        Priority::MediumLow,
        Priority::Low,
    ];

    /// Numeric level (1 = high, 5 = low)
    pub fn level(&self) -> u8 {
        match self {
            Priority::High => 1,
            Priority::MediumHigh => 2,
            Priority::Medium => 3,
            Priority::MediumLow => 4,
            Priority::Low => 5,
        }
    }

    /// Priority from a numeric level
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Priority::High),
            2 => Some(Priority::MediumHigh),
            3 => Some(Priority::Medium),
            4 => Some(Priority::MediumLow),
            5 => Some(Priority::Low),
            _ => None,
        }
    }

    /// Whether a finding at this priority passes the given threshold
    pub fn meets(&self, minimum: Priority) -> bool {
        *self >= minimum
    }

    /// Config spelling of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::MediumHigh => "medium-high",
            Priority::Medium => "medium",
            Priority::MediumLow => "medium-low",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        if let Ok(level) = normalized.parse::<u8>() {
            return Priority::from_level(level)
                .ok_or_else(|| format!("Priority level out of range (1-5): {}", level));
        }
        match normalized.as_str() {
            "high" => Ok(Priority::High),
            "medium-high" | "mediumhigh" => Ok(Priority::MediumHigh),
            "medium" => Ok(Priority::Medium),
            "medium-low" | "mediumlow" => Ok(Priority::MediumLow),
            "low" => Ok(Priority::Low),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

/// A single issue reported by a rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Line number (1-based), `None` when the rule cannot tell
    pub line: Option<usize>,
    /// Human-readable description
    pub description: String,
    /// Name of the rule that produced this finding
    pub rule_name: String,
    /// Priority of the finding
    pub priority: Priority,
}

impl Finding {
    /// Create a new finding. Line 0 means unknown.
    pub fn new(rule_name: &str, priority: Priority, line: usize, description: &str) -> Self {
        Self {
            line: (line > 0).then_some(line),
            description: description.to_string(),
            rule_name: rule_name.to_string(),
            priority,
        }
    }

    /// Create a finding without a line
    pub fn without_line(rule_name: &str, priority: Priority, description: &str) -> Self {
        Self::new(rule_name, priority, 0, description)
    }

    /// Trim surrounding whitespace from the description
    pub(crate) fn normalized(mut self) -> Self {
        let trimmed = self.description.trim();
        if trimmed.len() != self.description.len() {
            self.description = trimmed.to_string();
        }
        self
    }
}
