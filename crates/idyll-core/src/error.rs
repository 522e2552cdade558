use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Stable, machine-readable error codes shared by every engine component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
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
    Diff,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            ErrorCode::EmptyInput => "EMPTY_INPUT",
            ErrorCode::MalformedMarkup => "MALFORMED_MARKUP",
            ErrorCode::UnknownRoot => "UNKNOWN_ROOT",
            ErrorCode::MissingAttribute => "MISSING_ATTRIBUTE",
            ErrorCode::InvalidAttribute => "INVALID_ATTRIBUTE",
            ErrorCode::InvalidJson => "INVALID_JSON",
            ErrorCode::NestedTool => "NESTED_TOOL",
            ErrorCode::DepthExceeded => "DEPTH_EXCEEDED",
            ErrorCode::UnknownElement => "UNKNOWN_ELEMENT",
            ErrorCode::UnknownOperation => "UNKNOWN_OPERATION",
            ErrorCode::InvalidOperation => "INVALID_OPERATION",
            ErrorCode::InvalidTimestamp => "INVALID_TIMESTAMP",
            ErrorCode::Grammar => "GRAMMAR",
            ErrorCode::Diff => "DIFF",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generic engine error: a code for programs, a message for humans, and
/// optional structured details.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl EngineError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn codes_serialize_as_their_display_form() {
        for code in [ErrorCode::EmptyInput, ErrorCode::NestedTool, ErrorCode::Diff] {
            let v = serde_json::to_value(code).unwrap();
            assert_eq!(v, json!(code.as_str()));
        }
    }

    #[test]
    fn display_prefixes_the_code() {
        let e = EngineError::new(ErrorCode::InvalidJson, "bad payload")
            .with_details(json!({"element": "params"}));
        assert_eq!(e.to_string(), "[INVALID_JSON] bad payload");
        assert_eq!(e.details, Some(json!({"element": "params"})));
    }
}
