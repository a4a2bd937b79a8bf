//! Core analysis engine

use super::{AnalysisError, AnalysisReport, EngineBuildError, RuleTiming};
use crate::config::EngineConfig;
use crate::finding::Finding;
use crate::rules::{Rule, RuleError, RuleExecutionError, RuleSet};
use crate::source::{SourceUnit, Stager};
use crossbeam_channel::{select, Receiver, TryRecvError};
use std::any::Any;
use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// What woke the collecting loop
enum Wake {
    Cancelled,
    Finished(Option<(usize, RuleOutcome)>),
}

/// Final state of one rule slot
struct RuleOutcome {
    result: Result<Vec<Finding>, RuleExecutionError>,
    elapsed: Duration,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn contain(rule: &dyn Rule, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
    panic::catch_unwind(AssertUnwindSafe(|| rule.evaluate(unit)))
        .unwrap_or_else(|payload| Err(RuleExecutionError::Panicked(panic_message(payload.as_ref()))))
}

/// Run `rule` on a thread of its own and wait at most `timeout` for it.
///
/// The pool worker calling this is released when the rule finishes, the
/// timeout passes or the run is abandoned. An overrunning rule keeps only
/// its own thread and its late result is dropped.
fn supervise(
    rule: Arc<dyn Rule>,
    unit: Arc<SourceUnit>,
    timeout: Duration,
    abandoned: &Receiver<()>,
) -> Result<Vec<Finding>, RuleExecutionError> {
    let (done_tx, done_rx) = crossbeam_channel::bounded(1);
    thread::Builder::new()
        .name("codecheck-rule".to_string())
        .spawn(move || {
            let _ = done_tx.send(contain(rule.as_ref(), &unit));
        })
        .map_err(|e| RuleExecutionError::Internal(format!("Failed to start rule thread: {e}")))?;

    select! {
        recv(done_rx) -> result => result.unwrap_or_else(|_| {
            Err(RuleExecutionError::Internal("Rule thread exited without reporting".to_string()))
        }),
        recv(abandoned) -> _ => Err(RuleExecutionError::Internal("Run abandoned".to_string())),
        default(timeout) => Err(RuleExecutionError::Timeout(timeout)),
    }
}

/// Runs a rule set against submitted snippets
pub struct AnalysisEngine {
    rules: Arc<RuleSet>,
    pool: rayon::ThreadPool,
    stager: Stager,
    rule_timeout: Option<Duration>,
}

impl AnalysisEngine {
    /// Create an engine for a resolved rule set
    pub fn new(rules: RuleSet, config: &EngineConfig) -> Result<Self, EngineBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_count())
            .thread_name(|i| format!("codecheck-worker-{}", i))
            .build()?;

        Ok(Self {
            rules: Arc::new(rules),
            pool,
            stager: Stager::new(config.temp_dir.clone()),
            rule_timeout: config.rule_timeout(),
        })
    }

    /// The rule set this engine runs
    pub fn rule_set(&self) -> &RuleSet {
        &self.rules
    }

    /// Analyze a snippet
    pub fn analyze(&self, text: &str) -> Result<AnalysisReport, AnalysisError> {
        self.analyze_with_cancel(text, &crossbeam_channel::never())
    }

    /// Analyze a snippet, giving up as soon as `cancel` receives a message
    /// or disconnects.
    ///
    /// The staged file is removed before this returns, on every path. Rules
    /// still running after a timeout or cancellation are abandoned: their
    /// worker finishes in the background and its result is discarded.
    pub fn analyze_with_cancel(
        &self,
        text: &str,
        cancel: &Receiver<()>,
    ) -> Result<AnalysisReport, AnalysisError> {
        let start = Instant::now();

        let (unit, staged) = self.stager.stage(text, self.rules.language())?;
        tracing::debug!(
            bundle = self.rules.name(),
            bytes = unit.len(),
            path = %staged.path().display(),
            "starting analysis"
        );

        let outcomes = self.evaluate(Arc::new(unit), cancel);

        if let Err(e) = staged.release() {
            tracing::warn!(error = %e, "failed to remove staged file");
        }

        let mut report = self.aggregate(outcomes?)?;
        report.duration = start.elapsed();

        tracing::debug!(
            findings = report.findings.len(),
            rule_errors = report.rule_errors.len(),
            filtered_out = report.filtered_out,
            duration_ms = report.duration.as_millis() as u64,
            "analysis finished"
        );

        Ok(report)
    }

    /// Evaluate every rule on the pool, one slot per rule in rule order
    fn evaluate(
        &self,
        unit: Arc<SourceUnit>,
        cancel: &Receiver<()>,
    ) -> Result<Vec<RuleOutcome>, AnalysisError> {
        let count = self.rules.len();
        let mut slots: Vec<Option<RuleOutcome>> = (0..count).map(|_| None).collect();
        let mut pending = count;

        // Disconnects when this function returns, so queued or waiting
        // workers of an abandoned run stop early
        let (_running, abandoned) = crossbeam_channel::bounded::<()>(0);
        let (tx, rx) = crossbeam_channel::unbounded();

        for (index, rule) in self.rules.rules().iter().enumerate() {
            let rule = Arc::clone(rule);
            let unit = Arc::clone(&unit);
            let tx = tx.clone();
            let abandoned = abandoned.clone();
            let timeout = self.rule_timeout;

            self.pool.spawn(move || {
                if matches!(abandoned.try_recv(), Err(TryRecvError::Disconnected)) {
                    return;
                }

                // The timeout runs from dispatch, not from fan-out
                let at = Instant::now();
                let result = match timeout {
                    Some(timeout) => supervise(rule, unit, timeout, &abandoned),
                    None => contain(rule.as_ref(), &unit),
                };

                // Sends fail only once the run has been abandoned
                let _ = tx.send((
                    index,
                    RuleOutcome {
                        result,
                        elapsed: at.elapsed(),
                    },
                ));
            });
        }
        drop(tx);

        while pending > 0 {
            let wake = select! {
                recv(cancel) -> _ => Wake::Cancelled,
                recv(rx) -> message => Wake::Finished(message.ok()),
            };

            match wake {
                Wake::Cancelled => {
                    tracing::debug!(pending, "analysis cancelled");
                    return Err(AnalysisError::Cancelled);
                }
                Wake::Finished(Some((index, outcome))) => {
                    slots[index] = Some(outcome);
                    pending -= 1;
                }
                Wake::Finished(None) => break,
            }
        }

        Ok(slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| RuleOutcome {
                    result: Err(RuleExecutionError::Internal(
                        "Rule worker exited without reporting".to_string(),
                    )),
                    elapsed: Duration::ZERO,
                })
            })
            .collect())
    }

    /// Concatenate slots, then filter, normalize and deduplicate
    fn aggregate(&self, outcomes: Vec<RuleOutcome>) -> Result<AnalysisReport, AnalysisError> {
        let mut report = AnalysisReport::default();
        let mut raw = Vec::new();

        for (rule, outcome) in self.rules.rules().iter().zip(outcomes) {
            let mut timing = RuleTiming {
                rule_name: rule.name().to_string(),
                elapsed: outcome.elapsed,
                finding_count: 0,
                failed: false,
            };

            match outcome.result {
                Ok(findings) => {
                    timing.finding_count = findings.len();
                    raw.extend(findings);
                }
                Err(cause) => {
                    tracing::warn!(rule = rule.name(), error = %cause, "rule failed");
                    timing.failed = true;
                    report.rule_errors.push(RuleError::new(rule.name(), cause));
                }
            }

            tracing::debug!(
                rule = rule.name(),
                elapsed_us = timing.elapsed.as_micros() as u64,
                findings = timing.finding_count,
                "rule evaluated"
            );
            report.timings.push(timing);
        }

        if !self.rules.is_empty() && report.rule_errors.len() == self.rules.len() {
            return Err(AnalysisError::AllRulesFailed {
                errors: report.rule_errors,
            });
        }

        let minimum = self.rules.minimum_priority();
        let before = raw.len();
        let kept: Vec<Finding> = raw
            .into_iter()
            .filter(|f| f.priority.meets(minimum))
            .collect();
        report.filtered_out = before - kept.len();

        let mut seen = HashSet::new();
        report.findings = kept
            .into_iter()
            .map(Finding::normalized)
            .filter(|f| seen.insert((f.line, f.description.clone(), f.rule_name.clone())))
            .collect();

        Ok(report)
    }
}
