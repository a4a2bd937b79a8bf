//! Configuration for the analysis service
//!
//! Reads configuration from (first match wins):
//! - the path given with `--config`
//! - `.codecheck.yaml` / `.codecheck.yml` / `.codecheck.json` / `codecheck.yaml`
//!   in the working directory
//!
//! Every section falls back to its defaults when absent.

use crate::finding::Priority;
use crate::rules::RuleSet;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File names probed by [`Config::load_default`], in order
pub const CONFIG_NAMES: [&str; 4] = [
    ".codecheck.yaml",
    ".codecheck.yml",
    ".codecheck.json",
    "codecheck.yaml",
];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,

    /// Include rule name and priority in every result entry
    pub verbose_results: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8082,
            log_level: "info".to_string(),
            verbose_results: false,
        }
    }
}

/// Analysis engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rule bundle to resolve at startup
    pub bundle: String,

    /// Findings weaker than this are dropped
    pub minimum_priority: Priority,

    /// Evaluate rules of one run in parallel
    pub parallel: bool,

    /// Number of worker threads (0 = auto-detect)
    pub jobs: usize,

    /// Per-rule timeout in milliseconds (0 = no timeout)
    pub rule_timeout_ms: u64,

    /// Directory for staged files (None = OS temp dir)
    pub temp_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bundle: "quickstart".to_string(),
            minimum_priority: Priority::Medium,
            parallel: true,
            jobs: 0,
            rule_timeout_ms: 5000,
            temp_dir: None,
        }
    }
}

impl EngineConfig {
    /// Per-rule timeout, `None` when disabled
    pub fn rule_timeout(&self) -> Option<Duration> {
        (self.rule_timeout_ms > 0).then(|| Duration::from_millis(self.rule_timeout_ms))
    }

    /// Effective number of worker threads
    pub fn worker_count(&self) -> usize {
        if !self.parallel {
            1
        } else if self.jobs == 0 {
            num_cpus::get()
        } else {
            self.jobs
        }
    }
}

fn default_true() -> bool {
    true
}

/// Declarative regex rule added on top of the bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomRuleConfig {
    pub name: String,

    /// Regular expression, one finding per match
    pub pattern: String,

    /// Message template, may reference captures as `${1}`
    pub message: String,

    #[serde(default)]
    pub priority: Priority,

    /// Match against the code view (comments and literals blanked)
    #[serde(default = "default_true")]
    pub syntax_sensitive: bool,
}

/// External analyzer run against the staged file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRuleConfig {
    pub name: String,

    /// Program to execute
    pub program: String,

    /// Arguments, `{file}` is replaced by the staged path
    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub priority: Priority,
}

/// Rule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules
    pub disabled: Vec<String>,

    /// Priority overrides (rule name -> priority)
    pub priority: HashMap<String, Priority>,

    /// Threshold for `LongLine`
    pub max_line_length: usize,

    /// Extra pattern rules
    pub custom: Vec<CustomRuleConfig>,

    /// External tool rules
    pub external: Vec<ExternalRuleConfig>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            disabled: Vec::new(),
            priority: HashMap::new(),
            max_line_length: 120,
            custom: Vec::new(),
            external: Vec::new(),
        }
    }
}

impl RulesConfig {
    /// Check if a rule is enabled
    pub fn is_rule_enabled(&self, name: &str) -> bool {
        !self.disabled.iter().any(|d| d == name)
    }

    /// Get priority override for a rule
    pub fn priority_override(&self, name: &str) -> Option<Priority> {
        self.priority.get(name).copied()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings
    pub server: ServerConfig,

    /// Engine settings
    pub engine: EngineConfig,

    /// Rule configuration
    pub rules: RulesConfig,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Load the first default config file found in `dir`, or defaults
    pub fn load_default(dir: &Path) -> Result<Self, ConfigError> {
        for name in &CONFIG_NAMES {
            let path = dir.join(name);
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                return Self::load(&path);
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(
        &mut self,
        bundle: Option<String>,
        minimum_priority: Option<Priority>,
        port: Option<u16>,
        verbose_results: Option<bool>,
    ) {
        if let Some(b) = bundle {
            self.engine.bundle = b;
        }
        if let Some(p) = minimum_priority {
            self.engine.minimum_priority = p;
        }
        if let Some(p) = port {
            self.server.port = p;
        }
        if let Some(v) = verbose_results {
            self.server.verbose_results = v;
        }
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.bundle.trim().is_empty() {
            return Err(ConfigError::Invalid("Bundle name cannot be empty".to_string()));
        }

        // An unknown bundle is reported when the rule set is resolved
        let builtin: Vec<String> = RuleSet::resolve(&self.engine.bundle, self.engine.minimum_priority)
            .map(|set| set.rule_names().into_iter().map(str::to_string).collect())
            .unwrap_or_default();

        let mut names = HashSet::new();
        let extra = self
            .rules
            .custom
            .iter()
            .map(|c| c.name.as_str())
            .chain(self.rules.external.iter().map(|e| e.name.as_str()));
        for name in extra {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid("Rule name cannot be empty".to_string()));
            }
            if builtin.iter().any(|b| b == name) {
                return Err(ConfigError::Invalid(format!(
                    "Rule name '{}' is already used by bundle '{}'",
                    name, self.engine.bundle
                )));
            }
            if !names.insert(name) {
                return Err(ConfigError::Invalid(format!("Duplicate rule name '{}'", name)));
            }
        }

        if self.rules.external.iter().any(|e| e.program.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "External rule program cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert_eq!(config.server.port, 8082);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.engine.bundle, "quickstart");
        assert_eq!(config.engine.minimum_priority, Priority::Medium);
        assert!(config.engine.parallel);
        assert_eq!(config.engine.rule_timeout_ms, 5000);
        assert_eq!(config.rules.max_line_length, 120);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_merge_cli() {
        let mut config = Config::new();
        config.merge_cli(
            Some("c-quickstart".to_string()),
            Some(Priority::Low),
            Some(9000),
            None,
        );

        assert_eq!(config.engine.bundle, "c-quickstart");
        assert_eq!(config.engine.minimum_priority, Priority::Low);
        assert_eq!(config.server.port, 9000);
        assert!(!config.server.verbose_results);
    }

    #[test]
    fn test_rule_enabled() {
        let mut config = Config::new();
        assert!(config.rules.is_rule_enabled("LongLine"));

        config.rules.disabled.push("LongLine".to_string());
        assert!(!config.rules.is_rule_enabled("LongLine"));
        assert!(config.rules.is_rule_enabled("SystemPrintln"));
    }

    #[test]
    fn test_priority_override() {
        let mut config = Config::new();
        config
            .rules
            .priority
            .insert("LongLine".to_string(), Priority::High);

        assert_eq!(config.rules.priority_override("LongLine"), Some(Priority::High));
        assert_eq!(config.rules.priority_override("SystemPrintln"), None);
    }

    #[test]
    fn test_yaml_deserialize() {
        let yaml = r#"
server:
  port: 9090
  verbose_results: true
engine:
  bundle: c-quickstart
  minimum_priority: medium-low
  parallel: false
  rule_timeout_ms: 0
rules:
  disabled:
    - GotoStatement
  priority:
    LongLine: high
  custom:
    - name: NoTodo
      pattern: TODO
      message: Resolve this TODO
      syntax_sensitive: false
  external:
    - name: clang-tidy
      program: clang-tidy
      args: ["{file}", "--", "-std=c11"]
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(config.server.verbose_results);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.engine.bundle, "c-quickstart");
        assert_eq!(config.engine.minimum_priority, Priority::MediumLow);
        assert_eq!(config.engine.worker_count(), 1);
        assert_eq!(config.engine.rule_timeout(), None);
        assert_eq!(config.rules.disabled, vec!["GotoStatement"]);
        assert_eq!(config.rules.priority_override("LongLine"), Some(Priority::High));
        assert_eq!(config.rules.custom[0].priority, Priority::Medium);
        assert!(!config.rules.custom[0].syntax_sensitive);
        assert_eq!(config.rules.external[0].args.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"engine": {"jobs": 3}}"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.engine.jobs, 3);
        assert_eq!(config.engine.worker_count(), 3);
    }

    #[test]
    fn test_load_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "").unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_default_probes_names_in_order() {
        let dir = TempDir::new().unwrap();
        assert_eq!(Config::load_default(dir.path()).unwrap().server.port, 8082);

        std::fs::write(dir.path().join("codecheck.yaml"), "server:\n  port: 1\n").unwrap();
        assert_eq!(Config::load_default(dir.path()).unwrap().server.port, 1);

        std::fs::write(dir.path().join(".codecheck.yml"), "server:\n  port: 2\n").unwrap();
        assert_eq!(Config::load_default(dir.path()).unwrap().server.port, 2);
    }

    #[test]
    fn test_validate_empty_bundle() {
        let mut config = Config::new();
        config.engine.bundle = " ".to_string();
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "Invalid configuration: Bundle name cannot be empty");
    }

    #[test]
    fn test_validate_duplicate_rule_names() {
        let mut config = Config::new();
        let rule = CustomRuleConfig {
            name: "Dup".to_string(),
            pattern: "x".to_string(),
            message: "x".to_string(),
            priority: Priority::Low,
            syntax_sensitive: true,
        };
        config.rules.custom = vec![rule.clone(), rule];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bundle_rule_names() {
        let mut config = Config::new();
        config.rules.custom = vec![CustomRuleConfig {
            name: "LongLine".to_string(),
            pattern: "x".to_string(),
            message: "x".to_string(),
            priority: Priority::Low,
            syntax_sensitive: false,
        }];
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: Rule name 'LongLine' is already used by bundle 'quickstart'"
        );

        config.rules.custom.clear();
        config.rules.external = vec![ExternalRuleConfig {
            name: "GotoStatement".to_string(),
            program: "tool".to_string(),
            args: vec![],
            priority: Priority::Low,
        }];
        assert!(config.validate().is_ok());

        config.engine.bundle = "c-quickstart".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".codecheck.yaml");
        std::fs::write(&path, "engine: [not, a, map]").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Yaml(_))));
    }
}
