use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use idyll_core::{EngineError, ErrorCode};
use idyll_grammar::{AttrViolation, GrammarError};

/// Machine-readable parse failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParseErrorCode {
    EmptyInput,
    MalformedMarkup,
    UnknownRoot,
    MissingAttribute,
    InvalidAttribute,
    InvalidJson,
    NestedTool,
    DepthExceeded,
    UnknownElement,
    UnknownOperation,
    InvalidOperation,
    InvalidTimestamp,
    Grammar,
}

impl ParseErrorCode {
    pub const fn as_str(self) -> &'static str {
        self.engine_code().as_str()
    }

    pub const fn engine_code(self) -> ErrorCode {
        match self {
            ParseErrorCode::EmptyInput => ErrorCode::EmptyInput,
            ParseErrorCode::MalformedMarkup => ErrorCode::MalformedMarkup,
            ParseErrorCode::UnknownRoot => ErrorCode::UnknownRoot,
            ParseErrorCode::MissingAttribute => ErrorCode::MissingAttribute,
            ParseErrorCode::InvalidAttribute => ErrorCode::InvalidAttribute,
            ParseErrorCode::InvalidJson => ErrorCode::InvalidJson,
            ParseErrorCode::NestedTool => ErrorCode::NestedTool,
            ParseErrorCode::DepthExceeded => ErrorCode::DepthExceeded,
            ParseErrorCode::UnknownElement => ErrorCode::UnknownElement,
            ParseErrorCode::UnknownOperation => ErrorCode::UnknownOperation,
            ParseErrorCode::InvalidOperation => ErrorCode::InvalidOperation,
            ParseErrorCode::InvalidTimestamp => ErrorCode::InvalidTimestamp,
            ParseErrorCode::Grammar => ErrorCode::Grammar,
        }
    }
}

impl std::fmt::Display for ParseErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed failure to read markup into an AST.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[error("[{code}] {message}")]
pub struct ParseError {
    pub code: ParseErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ParseError {
    pub fn new(code: ParseErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// One error for a set of attribute violations: the first one is the
    /// message, all of them go into the details.
    pub fn from_violations(violations: &[AttrViolation]) -> Option<Self> {
        let first = violations.first()?;
        let code = if first.is_missing() {
            ParseErrorCode::MissingAttribute
        } else {
            ParseErrorCode::InvalidAttribute
        };
        let details = json!({
            "element": first.element,
            "violations": serde_json::to_value(violations).unwrap_or(Value::Null),
        });
        Some(Self::new(code, first.message.clone()).with_details(details))
    }
}

impl From<GrammarError> for ParseError {
    fn from(e: GrammarError) -> Self {
        ParseError::new(ParseErrorCode::Grammar, e.to_string())
    }
}

impl From<ParseError> for EngineError {
    fn from(e: ParseError) -> Self {
        EngineError {
            code: e.code.engine_code(),
            message: e.message,
            details: e.details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idyll_grammar::ViolationKind;

    #[test]
    fn first_violation_wins_but_all_are_kept() {
        let violations = vec![
            AttrViolation {
                element: "fncall".into(),
                attribute: "idyll-tool".into(),
                kind: ViolationKind::Missing,
                message: "missing required attribute 'idyll-tool' on <fncall>".into(),
            },
            AttrViolation {
                element: "fncall".into(),
                attribute: "id".into(),
                kind: ViolationKind::PatternMismatch {
                    pattern: r"^\S+$".into(),
                },
                message: "bad id".into(),
            },
        ];

        let err = ParseError::from_violations(&violations).unwrap();
        assert_eq!(err.code, ParseErrorCode::MissingAttribute);
        assert!(err.message.contains("idyll-tool"));
        let details = err.details.unwrap();
        assert_eq!(details["violations"].as_array().map(Vec::len), Some(2));
        assert_eq!(details["violations"][1]["kind"], "pattern_mismatch");
    }

    #[test]
    fn no_violations_no_error() {
        assert!(ParseError::from_violations(&[]).is_none());
    }

    #[test]
    fn converts_to_engine_error_with_the_same_code() {
        let err: EngineError = ParseError::new(ParseErrorCode::NestedTool, "x").into();
        assert_eq!(err.code, ErrorCode::NestedTool);
        assert_eq!(err.to_string(), "[NESTED_TOOL] x");
    }
}
