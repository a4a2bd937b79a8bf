//! Rules backed by an external analyzer process
//!
//! The tool runs against the staged file. Its combined output is scanned for
//! diagnostics of the form `path:line:col: message`. A tool that outlives
//! its timeout is killed and reaped.

use super::{Rule, RuleExecutionError};
use crate::finding::{Finding, Priority};
use crate::source::SourceUnit;
use std::io::{Read, Seek, SeekFrom};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

/// Placeholder replaced by the staged file path in tool arguments
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Runs an external program and turns its diagnostics into findings
#[derive(Debug, Clone)]
pub struct ExternalToolRule {
    name: String,
    program: String,
    args: Vec<String>,
    priority: Priority,
    timeout: Option<Duration>,
}

impl ExternalToolRule {
    pub fn new(name: &str, program: &str, args: Vec<String>, priority: Priority) -> Self {
        Self {
            name: name.to_string(),
            program: program.to_string(),
            args,
            priority,
            timeout: None,
        }
    }

    /// Kill the tool if it runs longer than `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Executable run for each analysis
    pub fn program(&self) -> &str {
        &self.program
    }

    fn output_error(&self, source: std::io::Error) -> RuleExecutionError {
        RuleExecutionError::ToolOutput {
            program: self.program.clone(),
            source,
        }
    }

    /// Arguments with the placeholder substituted. If none of them mentions
    /// the placeholder the path is passed first.
    fn command_args(&self, path: &str) -> Vec<String> {
        if self.args.iter().any(|a| a.contains(FILE_PLACEHOLDER)) {
            self.args
                .iter()
                .map(|a| a.replace(FILE_PLACEHOLDER, path))
                .collect()
        } else {
            std::iter::once(path.to_string())
                .chain(self.args.iter().cloned())
                .collect()
        }
    }

    /// Extract findings from tool output
    pub fn parse_output(&self, output: &str) -> Vec<Finding> {
        output
            .lines()
            .filter(|line| line.contains("warning") || line.contains("error"))
            .filter_map(|line| {
                let parts: Vec<&str> = line.splitn(4, ':').collect();
                if parts.len() < 4 {
                    return None;
                }
                let line_no = parts[1].trim().parse::<usize>().unwrap_or(0);
                Some(Finding::new(&self.name, self.priority, line_no, parts[3].trim()))
            })
            .collect()
    }
}

impl Rule for ExternalToolRule {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        &self.program
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let path = unit.staged_path().ok_or(RuleExecutionError::NotStaged)?;
        let args = self.command_args(&path.to_string_lossy());

        tracing::trace!(program = %self.program, ?args, "running external tool");

        // stdout and stderr share one file so their lines stay interleaved
        let mut capture = tempfile::tempfile().map_err(|e| self.output_error(e))?;
        let stdout = capture.try_clone().map_err(|e| self.output_error(e))?;
        let stderr = capture.try_clone().map_err(|e| self.output_error(e))?;

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .spawn()
            .map_err(|source| RuleExecutionError::ToolSpawn {
                program: self.program.clone(),
                source,
            })?;

        let status = match self.timeout {
            Some(timeout) => match child.wait_timeout(timeout).map_err(|e| self.output_error(e))? {
                Some(status) => status,
                None => {
                    tracing::debug!(program = %self.program, "killing external tool after timeout");
                    if let Err(e) = child.kill() {
                        tracing::warn!(program = %self.program, error = %e, "failed to kill external tool");
                    }
                    child.wait().map_err(|e| self.output_error(e))?;
                    return Err(RuleExecutionError::Timeout(timeout));
                }
            },
            None => child.wait().map_err(|e| self.output_error(e))?,
        };

        let mut raw = Vec::new();
        capture
            .seek(SeekFrom::Start(0))
            .and_then(|_| capture.read_to_end(&mut raw))
            .map_err(|e| self.output_error(e))?;
        let combined = String::from_utf8_lossy(&raw);

        if !status.success() && combined.trim().is_empty() {
            return Err(RuleExecutionError::ToolFailed {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }

        Ok(self.parse_output(&combined))
    }
}
