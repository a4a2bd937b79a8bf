//! Rule bundles and rule set resolution

use super::{
    ControlStatementBraces, EmptyCatchBlock, ExternalToolRule, LongLine, PatternRule,
    PriorityOverride, Rule, Scope, SwitchStmtsShouldHaveDefault, UnnecessaryImport,
};
use crate::config::{EngineConfig, RulesConfig};
use crate::finding::Priority;
use crate::source::Language;
use std::sync::Arc;
use thiserror::Error;

/// Names of the built-in bundles
pub const BUNDLES: [&str; 2] = ["quickstart", "c-quickstart"];

/// Error while resolving a rule set at startup
#[derive(Debug, Error)]
pub enum RuleSetResolutionError {
    #[error("Unknown rule bundle '{name}' (available: {})", BUNDLES.join(", "))]
    UnknownBundle { name: String },

    #[error("Invalid pattern for rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },
}

fn pattern(
    name: &str,
    priority: Priority,
    regex: &str,
    message: &str,
) -> Result<Arc<dyn Rule>, RuleSetResolutionError> {
    PatternRule::new(name, priority, regex, message, Scope::Code)
        .map(|rule| Arc::new(rule) as Arc<dyn Rule>)
        .map_err(|source| RuleSetResolutionError::InvalidPattern {
            rule: name.to_string(),
            source,
        })
}

fn quickstart(max_line_length: usize) -> Result<Vec<Arc<dyn Rule>>, RuleSetResolutionError> {
    Ok(vec![
        pattern(
            "ClassNamingConventions",
            Priority::High,
            r"\b(class|interface|enum)\s+([a-z_$][\w$]*)",
            "The ${1} name '${2}' doesn't match '[A-Z][a-zA-Z0-9]*'",
        )?,
        pattern(
            "SystemPrintln",
            Priority::MediumHigh,
            r"\bSystem\s*\.\s*(?:out|err)\s*\.\s*print(?:ln|f)?\s*\(",
            "Usage of System.out/err",
        )?,
        Arc::new(EmptyCatchBlock::new(Priority::Medium)),
        Arc::new(ControlStatementBraces::new(Priority::Medium)),
        Arc::new(UnnecessaryImport::new(Priority::Medium)),
        pattern(
            "UseEqualsToCompareStrings",
            Priority::MediumHigh,
            r#"(?:==|!=)\s*"|"\s*(?:==|!=)"#,
            "Use equals() to compare strings instead of '==' or '!='",
        )?,
        pattern(
            "AvoidPrintStackTrace",
            Priority::Medium,
            r"\.\s*printStackTrace\s*\(\s*\)",
            "Avoid printStackTrace(); use a logger call instead",
        )?,
        Arc::new(SwitchStmtsShouldHaveDefault::new(Priority::Medium)),
        Arc::new(LongLine::new(Priority::Low, max_line_length)),
    ])
}

fn c_quickstart(max_line_length: usize) -> Result<Vec<Arc<dyn Rule>>, RuleSetResolutionError> {
    Ok(vec![
        pattern(
            "UnsafeBufferFunction",
            Priority::High,
            r"\b(gets|strcpy|strcat|sprintf|vsprintf)\s*\(",
            "Call to '${1}' is insecure; use a bounded alternative",
        )?,
        Arc::new(ControlStatementBraces::new(Priority::Medium)),
        Arc::new(SwitchStmtsShouldHaveDefault::new(Priority::Medium)),
        pattern(
            "GotoStatement",
            Priority::MediumLow,
            r"\bgoto\s+\w+",
            "Avoid goto statements",
        )?,
        Arc::new(LongLine::new(Priority::Low, max_line_length)),
    ])
}

/// Ordered rules plus the priority threshold of a run
#[derive(Clone)]
pub struct RuleSet {
    name: String,
    language: Language,
    rules: Vec<Arc<dyn Rule>>,
    minimum_priority: Priority,
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("name", &self.name)
            .field("language", &self.language)
            .field("rules", &self.rule_names())
            .field("minimum_priority", &self.minimum_priority)
            .finish()
    }
}

impl RuleSet {
    /// Build a rule set from explicit rules
    pub fn new(
        name: &str,
        language: Language,
        rules: Vec<Arc<dyn Rule>>,
        minimum_priority: Priority,
    ) -> Self {
        Self {
            name: name.to_string(),
            language,
            rules,
            minimum_priority,
        }
    }

    /// Resolve a built-in bundle with default rule settings
    pub fn resolve(bundle: &str, minimum_priority: Priority) -> Result<Self, RuleSetResolutionError> {
        Self::resolve_with(bundle, minimum_priority, LongLine::DEFAULT_MAX)
    }

    fn resolve_with(
        bundle: &str,
        minimum_priority: Priority,
        max_line_length: usize,
    ) -> Result<Self, RuleSetResolutionError> {
        let (language, rules) = match bundle {
            "quickstart" => (Language::Java, quickstart(max_line_length)?),
            "c-quickstart" => (Language::C, c_quickstart(max_line_length)?),
            _ => {
                return Err(RuleSetResolutionError::UnknownBundle {
                    name: bundle.to_string(),
                })
            }
        };

        Ok(Self::new(bundle, language, rules, minimum_priority))
    }

    /// Resolve the configured bundle and apply rule configuration.
    ///
    /// Custom rules are appended after the bundle, external rules last.
    /// Disabled rules are then removed and priority overrides applied to
    /// whatever remains.
    pub fn from_config(
        engine: &EngineConfig,
        rules: &RulesConfig,
    ) -> Result<Self, RuleSetResolutionError> {
        let mut set = Self::resolve_with(
            &engine.bundle,
            engine.minimum_priority,
            rules.max_line_length,
        )?;

        for custom in &rules.custom {
            let scope = if custom.syntax_sensitive {
                Scope::Code
            } else {
                Scope::Raw
            };
            let rule = PatternRule::new(
                &custom.name,
                custom.priority,
                &custom.pattern,
                &custom.message,
                scope,
            )
            .map_err(|source| RuleSetResolutionError::InvalidPattern {
                rule: custom.name.clone(),
                source,
            })?;
            set.rules.push(Arc::new(rule));
        }

        for external in &rules.external {
            let rule = ExternalToolRule::new(
                &external.name,
                &external.program,
                external.args.clone(),
                external.priority,
            )
            .with_timeout(engine.rule_timeout());
            set.rules.push(Arc::new(rule));
        }

        set.rules = set
            .rules
            .into_iter()
            .filter(|rule| rules.is_rule_enabled(rule.name()))
            .map(|rule| match rules.priority_override(rule.name()) {
                Some(priority) if priority != rule.priority() => {
                    Arc::new(PriorityOverride::new(rule, priority)) as Arc<dyn Rule>
                }
                _ => rule,
            })
            .collect();

        Ok(set)
    }

    /// Bundle name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Language the bundle targets, used for the staged file suffix
    pub fn language(&self) -> Language {
        self.language
    }

    /// Rules in evaluation order
    pub fn rules(&self) -> &[Arc<dyn Rule>] {
        &self.rules
    }

    /// Names of the rules, in order
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Findings below this priority are dropped
    pub fn minimum_priority(&self) -> Priority {
        self.minimum_priority
    }

    /// Number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the set has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomRuleConfig, ExternalRuleConfig};
    use crate::source::SourceUnit;

    #[test]
    fn test_resolve_quickstart() {
        let set = RuleSet::resolve("quickstart", Priority::Medium).unwrap();
        assert_eq!(set.name(), "quickstart");
        assert_eq!(set.language(), Language::Java);
        assert_eq!(
            set.rule_names(),
            vec![
                "ClassNamingConventions",
                "SystemPrintln",
                "EmptyCatchBlock",
                "ControlStatementBraces",
                "UnnecessaryImport",
                "UseEqualsToCompareStrings",
                "AvoidPrintStackTrace",
                "SwitchStmtsShouldHaveDefault",
                "LongLine",
            ]
        );
        assert_eq!(set.minimum_priority(), Priority::Medium);
    }

    #[test]
    fn test_resolve_c_quickstart() {
        let set = RuleSet::resolve("c-quickstart", Priority::Low).unwrap();
        assert_eq!(set.language(), Language::C);
        assert_eq!(set.len(), 5);
        assert_eq!(set.rules()[0].name(), "UnsafeBufferFunction");
    }

    #[test]
    fn test_every_bundle_resolves() {
        for bundle in BUNDLES {
            assert!(RuleSet::resolve(bundle, Priority::Medium).is_ok(), "{}", bundle);
        }
    }

    #[test]
    fn test_unknown_bundle() {
        let err = RuleSet::resolve("everything", Priority::Medium).unwrap_err();
        assert!(matches!(err, RuleSetResolutionError::UnknownBundle { .. }));
        assert_eq!(
            err.to_string(),
            "Unknown rule bundle 'everything' (available: quickstart, c-quickstart)"
        );
    }

    #[test]
    fn test_from_config_applies_rule_settings() {
        let engine = EngineConfig::default();
        let mut rules = RulesConfig {
            max_line_length: 20,
            ..RulesConfig::default()
        };
        rules.disabled.push("SystemPrintln".to_string());
        rules.priority.insert("LongLine".to_string(), Priority::High);
        rules.custom.push(CustomRuleConfig {
            name: "NoTodo".to_string(),
            pattern: "TODO".to_string(),
            message: "Resolve this TODO".to_string(),
            priority: Priority::Medium,
            syntax_sensitive: false,
        });
        rules.external.push(ExternalRuleConfig {
            name: "tool".to_string(),
            program: "tool".to_string(),
            args: vec![],
            priority: Priority::Low,
        });

        let set = RuleSet::from_config(&engine, &rules).unwrap();
        let names = set.rule_names();
        assert!(!names.contains(&"SystemPrintln"));
        assert_eq!(&names[names.len() - 2..], &["NoTodo", "tool"]);

        let long_line = set
            .rules()
            .iter()
            .find(|r| r.name() == "LongLine")
            .unwrap();
        assert_eq!(long_line.priority(), Priority::High);

        let unit = SourceUnit::new("class Abc { } // a comment past twenty", Language::Java);
        let findings = long_line.evaluate(&unit).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].priority, Priority::High);
    }

    #[test]
    fn test_from_config_invalid_custom_pattern() {
        let mut rules = RulesConfig::default();
        rules.custom.push(CustomRuleConfig {
            name: "Broken".to_string(),
            pattern: "(".to_string(),
            message: "never".to_string(),
            priority: Priority::Medium,
            syntax_sensitive: true,
        });

        let err = RuleSet::from_config(&EngineConfig::default(), &rules).unwrap_err();
        assert!(matches!(err, RuleSetResolutionError::InvalidPattern { ref rule, .. } if rule == "Broken"));
    }

    #[test]
    fn test_builtin_patterns() {
        let set = RuleSet::resolve("quickstart", Priority::Low).unwrap();
        let rule = |name: &str| {
            set.rules()
                .iter()
                .find(|r| r.name() == name)
                .cloned()
                .unwrap()
        };

        let unit = SourceUnit::new(
            "class foo {\n  void f(String s) {\n    if (s == \"x\") { System.out.println(s); }\n    try { g(); } catch (Exception e) { e.printStackTrace(); }\n  }\n}",
            Language::Java,
        );

        let naming = rule("ClassNamingConventions").evaluate(&unit).unwrap();
        assert_eq!(naming.len(), 1);
        assert_eq!(
            naming[0].description,
            "The class name 'foo' doesn't match '[A-Z][a-zA-Z0-9]*'"
        );

        assert_eq!(rule("UseEqualsToCompareStrings").evaluate(&unit).unwrap()[0].line, Some(3));
        assert_eq!(rule("SystemPrintln").evaluate(&unit).unwrap()[0].line, Some(3));
        assert_eq!(rule("AvoidPrintStackTrace").evaluate(&unit).unwrap()[0].line, Some(4));
    }

    #[test]
    fn test_unsafe_buffer_function() {
        let set = RuleSet::resolve("c-quickstart", Priority::Low).unwrap();
        let unit = SourceUnit::new(
            "int main(void) {\n  char b[8];\n  strcpy(b, \"gets(x)\");\n  goto out;\nout:\n  return 0;\n}",
            Language::C,
        );

        let unsafe_calls = set.rules()[0].evaluate(&unit).unwrap();
        assert_eq!(unsafe_calls.len(), 1);
        assert_eq!(
            unsafe_calls[0].description,
            "Call to 'strcpy' is insecure; use a bounded alternative"
        );

        let gotos = set.rules()[3].evaluate(&unit).unwrap();
        assert_eq!(gotos.len(), 1);
        assert_eq!(gotos[0].line, Some(4));
    }
}
