use serde::Serialize;
use thiserror::Error;

/// Errors raised while assembling or compiling a grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("grammar rule '{0}' is defined more than once")]
    DuplicateRule(String),

    #[error("rule '{referenced_from}' references unknown rule '{name}'")]
    UnknownRule {
        name: String,
        referenced_from: String,
    },

    #[error("attribute '{attribute}' of <{element}> has an invalid pattern: {reason}")]
    InvalidPattern {
        element: String,
        attribute: String,
        reason: String,
    },
}

/// Why an attribute failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    Missing,
    NotInEnum { allowed: Vec<String> },
    PatternMismatch { pattern: String },
    Custom { validator: String },
}

/// A single attribute validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttrViolation {
    pub element: String,
    pub attribute: String,
    #[serde(flatten)]
    pub kind: ViolationKind,
    pub message: String,
}

impl AttrViolation {
    /// Machine-readable class of the violation.
    pub fn code(&self) -> &'static str {
        match self.kind {
            ViolationKind::Missing => "MISSING_ATTRIBUTE",
            _ => "INVALID_ATTRIBUTE",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self.kind, ViolationKind::Missing)
    }
}

impl std::fmt::Display for AttrViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}
