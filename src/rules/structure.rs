//! Built-in structural rules
//!
//! These rules need more than a single regex match: they look at brace
//! blocks, balanced parentheses or the set of imports of the whole unit.
//! All of them except [`LongLine`] work on the code view and therefore
//! reject malformed input.

use super::{Rule, RuleExecutionError};
use crate::finding::{Finding, Priority};
use crate::source::{CodeView, SourceUnit};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static CATCH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bcatch\s*\(").unwrap());

static SWITCH_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bswitch\s*\(").unwrap());

static DEFAULT_LABEL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bdefault\s*(?::|->)").unwrap());

static CONDITIONAL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(if|for|while)\s*\(").unwrap());

static ELSE_DO_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(else|do)\b").unwrap());

static IMPORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*import\s+(static\s+)?([A-Za-z_$][\w$]*(?:\s*\.\s*[A-Za-z_$*][\w$]*)*)\s*;")
        .unwrap()
});

/// Offset of the parenthesis closing the one at `open`
fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, b) in text.bytes().enumerate().skip(open) {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Offset of the first non-whitespace byte at or after `from`
fn skip_whitespace(text: &str, from: usize) -> Option<usize> {
    text.get(from..)?
        .find(|c: char| !c.is_whitespace())
        .map(|idx| from + idx)
}

/// Whether the keyword at `start` belongs to a preprocessor directive
/// (`#if`, `#else`)
fn is_directive(text: &str, start: usize) -> bool {
    text[..start].trim_end().ends_with('#')
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$'
}

/// Whole-word search (identifier boundaries)
fn contains_word(haystack: &str, word: &str) -> bool {
    let bytes = haystack.as_bytes();
    haystack.match_indices(word).any(|(start, _)| {
        let end = start + word.len();
        let before = start == 0 || !is_ident_byte(bytes[start - 1]);
        let after = end == bytes.len() || !is_ident_byte(bytes[end]);
        before && after
    })
}

/// Body of the block opened right after the parenthesised header at `paren`
fn block_after_header(view: &CodeView, paren: usize) -> Option<&str> {
    let text = view.text();
    let close = matching_paren(text, paren)?;
    let brace = skip_whitespace(text, close + 1)?;
    let block = view.block_at(brace)?;
    Some(view.block_body(block))
}

/// Catch blocks with nothing but whitespace or comments inside
#[derive(Debug, Clone)]
pub struct EmptyCatchBlock {
    priority: Priority,
}

impl EmptyCatchBlock {
    pub fn new(priority: Priority) -> Self {
        Self { priority }
    }
}

impl Default for EmptyCatchBlock {
    fn default() -> Self {
        Self::new(Priority::Medium)
    }
}

impl Rule for EmptyCatchBlock {
    fn name(&self) -> &str {
        "EmptyCatchBlock"
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        "Empty catch blocks hide exceptions"
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let view = unit.code_view()?;

        let findings = CATCH_REGEX
            .find_iter(view.text())
            .filter_map(|m| {
                let body = block_after_header(view, m.end() - 1)?;
                body.trim().is_empty().then(|| {
                    Finding::new(
                        self.name(),
                        self.priority,
                        view.line_of(m.start()),
                        "Avoid empty catch blocks",
                    )
                })
            })
            .collect();

        Ok(findings)
    }
}

/// Switch statements without a `default` label
#[derive(Debug, Clone)]
pub struct SwitchStmtsShouldHaveDefault {
    priority: Priority,
}

impl SwitchStmtsShouldHaveDefault {
    pub fn new(priority: Priority) -> Self {
        Self { priority }
    }
}

impl Default for SwitchStmtsShouldHaveDefault {
    fn default() -> Self {
        Self::new(Priority::Medium)
    }
}

/// Keep only the text at the outermost level of a block body
fn top_level(body: &str) -> String {
    let mut depth = 0usize;
    body.chars()
        .map(|c| match c {
            '{' => {
                depth += 1;
                ' '
            }
            '}' => {
                depth = depth.saturating_sub(1);
                ' '
            }
            c if depth == 0 => c,
            _ => ' ',
        })
        .collect()
}

impl Rule for SwitchStmtsShouldHaveDefault {
    fn name(&self) -> &str {
        "SwitchStmtsShouldHaveDefault"
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        "Switch statements should be exhaustive"
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let view = unit.code_view()?;

        let findings = SWITCH_REGEX
            .find_iter(view.text())
            .filter_map(|m| {
                let body = block_after_header(view, m.end() - 1)?;
                // Labels of nested switches must not count for this one
                (!DEFAULT_LABEL_REGEX.is_match(&top_level(body))).then(|| {
                    Finding::new(
                        self.name(),
                        self.priority,
                        view.line_of(m.start()),
                        "Switch statements should be exhaustive, add a default case",
                    )
                })
            })
            .collect();

        Ok(findings)
    }
}

/// Control statements whose body is not a block
#[derive(Debug, Clone)]
pub struct ControlStatementBraces {
    priority: Priority,
}

impl ControlStatementBraces {
    pub fn new(priority: Priority) -> Self {
        Self { priority }
    }

    fn finding(&self, view: &CodeView, offset: usize, keyword: &str) -> Finding {
        Finding::new(
            self.name(),
            self.priority,
            view.line_of(offset),
            &format!("This '{}' statement should have braces", keyword),
        )
    }
}

impl Default for ControlStatementBraces {
    fn default() -> Self {
        Self::new(Priority::Medium)
    }
}

impl Rule for ControlStatementBraces {
    fn name(&self) -> &str {
        "ControlStatementBraces"
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        "Control statement bodies should be blocks"
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let view = unit.code_view()?;
        let text = view.text();
        let bytes = text.as_bytes();
        let mut findings = Vec::new();

        for caps in CONDITIONAL_REGEX.captures_iter(text) {
            let (Some(m), Some(keyword)) = (caps.get(0), caps.get(1)) else {
                continue;
            };

            if is_directive(text, m.start()) {
                continue;
            }

            let Some(close) = matching_paren(text, m.end() - 1) else {
                continue;
            };
            let Some(next) = skip_whitespace(text, close + 1) else {
                continue;
            };

            match bytes[next] {
                b'{' => {}
                // do/while tail or an empty loop body
                b';' if keyword.as_str() != "if" => {}
                _ => findings.push(self.finding(view, m.start(), keyword.as_str())),
            }
        }

        for caps in ELSE_DO_REGEX.captures_iter(text) {
            let (Some(m), Some(keyword)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if is_directive(text, m.start()) {
                continue;
            }
            let Some(next) = skip_whitespace(text, m.end()) else {
                continue;
            };

            let rest = &text[next..];
            let braced = rest.starts_with('{');
            let else_if = keyword.as_str() == "else"
                && rest.starts_with("if")
                && !rest.as_bytes().get(2).copied().is_some_and(is_ident_byte);

            if !braced && !else_if {
                findings.push(self.finding(view, m.start(), keyword.as_str()));
            }
        }

        findings.sort_by_key(|f| f.line);
        Ok(findings)
    }
}

/// Duplicate, unused and implicit (`java.lang`) imports
#[derive(Debug, Clone)]
pub struct UnnecessaryImport {
    priority: Priority,
}

impl UnnecessaryImport {
    pub fn new(priority: Priority) -> Self {
        Self { priority }
    }
}

impl Default for UnnecessaryImport {
    fn default() -> Self {
        Self::new(Priority::Medium)
    }
}

impl Rule for UnnecessaryImport {
    fn name(&self) -> &str {
        "UnnecessaryImport"
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        "Imports that have no effect"
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        let view = unit.code_view()?;

        let mut imports = Vec::new();
        let mut body = String::with_capacity(view.text().len());
        for (line, text) in view.lines() {
            match IMPORT_REGEX.captures(text) {
                Some(caps) => {
                    let is_static = caps.get(1).is_some();
                    let path: String = caps
                        .get(2)
                        .map(|m| m.as_str().chars().filter(|c| !c.is_whitespace()).collect())
                        .unwrap_or_default();
                    imports.push((line, is_static, path));
                }
                None => {
                    body.push_str(text);
                    body.push('\n');
                }
            }
        }

        let mut seen = HashSet::new();
        let mut findings = Vec::new();

        for (line, is_static, path) in imports {
            let message = if !seen.insert((is_static, path.clone())) {
                format!("Duplicate import '{}'", path)
            } else if !is_static && is_java_lang(&path) {
                format!("Unnecessary import from the java.lang package: '{}'", path)
            } else {
                match path.rsplit('.').next() {
                    Some(name) if name != "*" && !contains_word(&body, name) => {
                        format!("Unused import '{}'", path)
                    }
                    _ => continue,
                }
            };
            findings.push(Finding::new(self.name(), self.priority, line, &message));
        }

        Ok(findings)
    }
}

/// `java.lang.X` or `java.lang.*`, but not subpackages like `java.lang.reflect.X`
fn is_java_lang(path: &str) -> bool {
    path.strip_prefix("java.lang.")
        .is_some_and(|rest| !rest.contains('.'))
}

/// Lines longer than a configured number of characters
#[derive(Debug, Clone)]
pub struct LongLine {
    priority: Priority,
    max: usize,
}

impl LongLine {
    pub const DEFAULT_MAX: usize = 120;

    pub fn new(priority: Priority, max: usize) -> Self {
        Self { priority, max }
    }
}

impl Default for LongLine {
    fn default() -> Self {
        Self::new(Priority::Low, Self::DEFAULT_MAX)
    }
}

impl Rule for LongLine {
    fn name(&self) -> &str {
        "LongLine"
    }

    fn priority(&self) -> Priority {
        self.priority
    }

    fn description(&self) -> &str {
        "Lines should stay readable without scrolling"
    }

    fn evaluate(&self, unit: &SourceUnit) -> Result<Vec<Finding>, RuleExecutionError> {
        Ok(unit
            .lines()
            .filter_map(|(line, text)| {
                let len = text.trim_end_matches('\r').chars().count();
                (len > self.max).then(|| {
                    Finding::new(
                        self.name(),
                        self.priority,
                        line,
                        &format!("Line is longer than {} characters ({})", self.max, len),
                    )
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Language;

    fn java(code: &str) -> SourceUnit {
        SourceUnit::new(code, Language::Java)
    }

    fn lines(findings: &[Finding]) -> Vec<Option<usize>> {
        findings.iter().map(|f| f.line).collect()
    }

    #[test]
    fn test_empty_catch_block() {
        let code = r#"class A {
    void f() {
        try { g(); } catch (Exception e) {
            // ignored
        }
        try { g(); } catch (RuntimeException e) { log(e); }
    }
}"#;
        let findings = EmptyCatchBlock::default().evaluate(&java(code)).unwrap();
        assert_eq!(lines(&findings), vec![Some(3)]);
        assert_eq!(findings[0].description, "Avoid empty catch blocks");
    }

    #[test]
    fn test_empty_catch_rejects_malformed_input() {
        let err = EmptyCatchBlock::default()
            .evaluate(&java("class A { void f() { try {} catch (E e) {"))
            .unwrap_err();
        assert!(matches!(err, RuleExecutionError::Malformed(_)));
    }

    #[test]
    fn test_switch_without_default() {
        let code = r#"class A {
    void f(int x) {
        switch (x) {
            case 1: g(); break;
        }
        switch (x) {
            case 1: g(); break;
            default: h();
        }
        switch (x) {
            case 1 -> g();
            default -> h();
        }
    }
}"#;
        let findings = SwitchStmtsShouldHaveDefault::default()
            .evaluate(&java(code))
            .unwrap();
        assert_eq!(lines(&findings), vec![Some(3)]);
    }

    #[test]
    fn test_nested_switch_default_does_not_count() {
        let code = "void f(int x) {\n  switch (x) {\n    case 1: {\n      switch (x) { default: break; }\n    }\n  }\n}";
        let findings = SwitchStmtsShouldHaveDefault::default()
            .evaluate(&SourceUnit::new(code, Language::C))
            .unwrap();
        assert_eq!(lines(&findings), vec![Some(2)]);
    }

    #[test]
    fn test_control_statement_braces() {
        let code = r#"class A {
    void f(int x) {
        if (x > 0)
            g();
        if (x > 1) {
            g();
        } else
            h();
        if (x > 2) { g(); } else if (x > 3) { h(); }
        for (int i = 0; i < x; i++) g();
        while (x-- > 0) { g(); }
        do { g(); } while (x < 0);
        if (check(x,
                  x + 1)) {
            g();
        }
    }
}"#;
        let findings = ControlStatementBraces::default().evaluate(&java(code)).unwrap();
        assert_eq!(lines(&findings), vec![Some(3), Some(7), Some(10)]);
        assert_eq!(findings[0].description, "This 'if' statement should have braces");
        assert_eq!(findings[1].description, "This 'else' statement should have braces");
        assert_eq!(findings[2].description, "This 'for' statement should have braces");
    }

    #[test]
    fn test_control_statement_braces_ignores_preprocessor() {
        let code = "#if (DEBUG)\nint x;\n#endif\nint main(void) { return 0; }";
        let findings = ControlStatementBraces::default()
            .evaluate(&SourceUnit::new(code, Language::C))
            .unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_control_statement_braces_ignores_preprocessor_else() {
        let code = "#ifdef X\nint a;\n#else\nint b;\n#endif\nvoid f(int x) {\n  if (x) g(); else\n    h();\n}\n";
        let findings = ControlStatementBraces::default()
            .evaluate(&SourceUnit::new(code, Language::C))
            .unwrap();
        assert_eq!(lines(&findings), vec![Some(7), Some(7)]);
        assert_eq!(findings[0].description, "This 'if' statement should have braces");
        assert_eq!(findings[1].description, "This 'else' statement should have braces");
    }

    #[test]
    fn test_control_statement_keywords_in_strings() {
        let code = "class A { String s = \"if (x) y\"; }";
        let findings = ControlStatementBraces::default().evaluate(&java(code)).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_unnecessary_import() {
        let code = r#"import java.util.List;
import java.util.Map;
import java.lang.String;
import java.lang.reflect.Method;
import java.util.List;
import java.io.*;

class A {
    List<Method> items;
}"#;
        let findings = UnnecessaryImport::default().evaluate(&java(code)).unwrap();
        let got: Vec<_> = findings
            .iter()
            .map(|f| (f.line, f.description.as_str()))
            .collect();
        assert_eq!(
            got,
            vec![
                (Some(2), "Unused import 'java.util.Map'"),
                (
                    Some(3),
                    "Unnecessary import from the java.lang package: 'java.lang.String'"
                ),
                (Some(5), "Duplicate import 'java.util.List'"),
            ]
        );
    }

    #[test]
    fn test_import_used_only_in_comment_is_unused() {
        let code = "import java.util.Map;\n// Map is mentioned here\nclass A {}";
        let findings = UnnecessaryImport::default().evaluate(&java(code)).unwrap();
        assert_eq!(lines(&findings), vec![Some(1)]);
    }

    #[test]
    fn test_is_java_lang() {
        assert!(is_java_lang("java.lang.String"));
        assert!(is_java_lang("java.lang.*"));
        assert!(!is_java_lang("java.lang.reflect.Method"));
        assert!(!is_java_lang("java.util.List"));
    }

    #[test]
    fn test_long_line() {
        let rule = LongLine::new(Priority::Low, 10);
        let findings = rule.evaluate(&java("short\nthis line is too long\r\n0123456789")).unwrap();
        assert_eq!(lines(&findings), vec![Some(2)]);
        assert_eq!(
            findings[0].description,
            "Line is longer than 10 characters (21)"
        );
    }

    #[test]
    fn test_long_line_accepts_malformed_input() {
        let rule = LongLine::new(Priority::Low, 3);
        let findings = rule.evaluate(&java("class A {")).unwrap();
        assert_eq!(findings.len(), 1);
    }

    #[test]
    fn test_matching_paren() {
        assert_eq!(matching_paren("f(a(b), c)", 1), Some(9));
        assert_eq!(matching_paren("f(a", 1), None);
    }

    #[test]
    fn test_contains_word() {
        assert!(contains_word("List<String> x", "List"));
        assert!(!contains_word("ArrayList<String> x", "List"));
        assert!(!contains_word("Lists x", "List"));
    }
}
