//! Best-effort classification of interpreter error text.
//!
//! First matching rule wins. Text that matches no rule is a generic runtime
//! error. Only [`FailureKind::Syntax`] counts as a hard failure.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingModule,
    ModuleSystem,
    Syntax,
    Runtime,
}

impl FailureKind {
    pub fn is_hard(&self) -> bool {
        matches!(self, Self::Syntax)
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::MissingModule => "missing package (needs install)",
            Self::ModuleSystem => "module system mismatch",
            Self::Syntax => "syntax error",
            Self::Runtime => "runtime error (needs env)",
        }
    }
}

/// A rule fires when the error text contains any of its needles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifierRule {
    pub kind: FailureKind,
    pub needles: Vec<String>,
}

impl ClassifierRule {
    pub fn new(kind: FailureKind, needles: &[&str]) -> Self {
        Self {
            kind,
            needles: needles.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn matches(&self, text: &str) -> bool {
        self.needles.iter().any(|n| text.contains(n.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorClassifier {
    rules: Vec<ClassifierRule>,
}

impl ErrorClassifier {
    pub fn new(rules: Vec<ClassifierRule>) -> Self {
        Self { rules }
    }

    /// Rule table for CPython, Node.js and bash diagnostics.
    pub fn standard() -> Self {
        Self::new(vec![
            ClassifierRule::new(
                FailureKind::MissingModule,
                &[
                    "ModuleNotFoundError",
                    "No module named",
                    "Cannot find module",
                    "ERR_MODULE_NOT_FOUND",
                    "ImportError",
                ],
            ),
            ClassifierRule::new(
                FailureKind::ModuleSystem,
                &[
                    "Cannot use import statement outside a module",
                    "ERR_REQUIRE_ESM",
                    "require is not defined in ES module scope",
                ],
            ),
            ClassifierRule::new(
                FailureKind::Syntax,
                &[
                    "SyntaxError",
                    "IndentationError",
                    "TabError",
                    "syntax error near unexpected token",
                ],
            ),
        ])
    }

    pub fn rules(&self) -> &[ClassifierRule] {
        &self.rules
    }

    pub fn classify(&self, text: &str) -> FailureKind {
        self.rules
            .iter()
            .find(|r| r.matches(text))
            .map(|r| r.kind)
            .unwrap_or(FailureKind::Runtime)
    }
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table() {
        let c = ErrorClassifier::standard();
        let cases = [
            ("ModuleNotFoundError: No module named 'stripe'", FailureKind::MissingModule),
            ("Error: Cannot find module 'express'", FailureKind::MissingModule),
            (
                "SyntaxError: Cannot use import statement outside a module",
                FailureKind::ModuleSystem,
            ),
            ("Error [ERR_REQUIRE_ESM]: require() of ES Module", FailureKind::ModuleSystem),
            ("  File \"t.py\", line 2\nSyntaxError: invalid syntax", FailureKind::Syntax),
            ("IndentationError: unexpected indent", FailureKind::Syntax),
            ("t.sh: line 3: syntax error near unexpected token `fi'", FailureKind::Syntax),
            ("KeyError: 'STRIPE_API_KEY'", FailureKind::Runtime),
            ("", FailureKind::Runtime),
        ];
        for (text, expected) in cases {
            assert_eq!(c.classify(text), expected, "text: {text}");
        }
    }

    #[test]
    fn test_only_syntax_is_hard() {
        assert!(FailureKind::Syntax.is_hard());
        assert!(!FailureKind::MissingModule.is_hard());
        assert!(!FailureKind::ModuleSystem.is_hard());
        assert!(!FailureKind::Runtime.is_hard());
    }

    #[test]
    fn test_custom_rules_first_match_wins() {
        let c = ErrorClassifier::new(vec![
            ClassifierRule::new(FailureKind::Runtime, &["SyntaxError"]),
            ClassifierRule::new(FailureKind::Syntax, &["SyntaxError"]),
        ]);
        assert_eq!(c.classify("SyntaxError: x"), FailureKind::Runtime);
    }
}
