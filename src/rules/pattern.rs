//! Declarative regex rules
//!
//! A pattern rule reports one finding per regex match. The message is a
//! template expanded against the match captures (`${1}`, `${name}`).

use super::{Rule, RuleExecutionError};
use crate::finding::{Finding, Priority};
use crate::source::SourceUnit;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Which text a pattern runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Raw submitted text, never fails on malformed input
    Raw,
    /// Code view with comments and literal bodies blanked
    #[default]
    Code,
}

/// Regex-driven rule
#[derive(Debug, Clone)]
pub struct PatternRule {
    name: String,
    priority: Priority,
    pattern: Regex,
    message: String,
    scope: Scope,
}

impl PatternRule {
    pub fn new(
        name: &str,
        priority: Priority,
        pattern: &str,
        message: &str,
        scope: Scope,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.to_string(),
            priority,
            pattern: Regex::new(pattern)?,
            message: message.to_string(),
            scope,
        })
    }

    /// Text the pattern is matched against
    pub fn scope(&self) -> Scope {
        self.scope
    }
}

impl Rule for PatternRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        &self.message
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let text = match self.scope {
            Scope::Raw => unit.content(),
            Scope::Code => unit.code_view()?.text(),
        };

        let mut findings = Vec::new();
        let mut line = 1;
        let mut counted = 0;

        for caps in self.pattern.captures_iter(text) {
            let Some(m) = caps.get(0) else { continue };

            // Matches come in offset order, so count newlines incrementally
            line += text[counted..m.start()].matches('\n').count();
            counted = m.start();

            let mut message = String::new();
            caps.expand(&self.message, &mut message);
            findings.push(Finding::new(&self.name, self.priority, line, &message));
        }

        Ok(findings)
    }
}
