//! codecheck - static analysis over HTTP
//!
//! Submits source snippets to a set of pluggable quality rules and returns
//! line-numbered findings.
//!
//! # Architecture
//!
//! ```text
//! POST /api/analyze -> AnalysisEngine -> RuleSet -> Rule -> SourceUnit
//!                            |
//!                            +-> ResultProjector -> {results, message}
//! ```
//!
//! The engine stages each snippet in a temporary file, runs every rule of
//! the configured bundle in parallel, contains per-rule failures, filters by
//! priority and deduplicates. Rules are trait objects, so new passes plug in
//! without touching the engine:
//!
//! ```yaml
//! engine:
//!   bundle: c-quickstart
//!   minimum_priority: medium-low
//! rules:
//!   external:
//!     - name: clang-tidy
//!       program: clang-tidy
//!       args: ["{file}", "--", "-std=c11"]
//! ```

pub mod config;
pub mod engine;
pub mod finding;
pub mod rules;
pub mod server;
pub mod source;

// Re-export main types
pub use config::{Config, ConfigError};
pub use engine::{
    AnalysisEngine, AnalysisError, AnalysisReport, AnalysisResponse, EngineBuildError,
    ResultEntry, ResultProjector, RuleTiming,
};
pub use finding::{Finding, Priority};
pub use rules::{Rule, RuleError, RuleExecutionError, RuleSet, RuleSetResolutionError};
pub use server::{router, AppState};
pub use source::{Language, SourceUnit, StagedFile, Stager, StagingError};
