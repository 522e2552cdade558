use serde::{Deserialize, Serialize};
use thiserror::Error;

use idyll_core::{EngineError, ErrorCode};

/// Stable, machine-readable failure codes for diff application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffErrorCode {
    /// No block with the addressed id exists anywhere in the tree.
    BlockNotFound,
    /// An insert/move position sets zero or several of the four anchors.
    AmbiguousAnchor,
    /// The `after`/`before` anchor is not in the top-level block list.
    AnchorNotFound,
    /// `edit:content` addressed a block without a content slot.
    NoContentSlot,
    /// `edit:params` addressed a block that is not executable.
    NotExecutable,
    /// A move selection names a missing block or range endpoint.
    SelectionUnresolved,
    /// An edit would give two blocks the same id.
    DuplicateBlockId,
    /// `edit:id` with an empty new id.
    InvalidBlockId,
    /// An insert or replace would put a tool inside a tool definition.
    NestedTool,
}

impl DiffErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            DiffErrorCode::BlockNotFound => "block_not_found",
            DiffErrorCode::AmbiguousAnchor => "ambiguous_anchor",
            DiffErrorCode::AnchorNotFound => "anchor_not_found",
            DiffErrorCode::NoContentSlot => "no_content_slot",
            DiffErrorCode::NotExecutable => "not_executable",
            DiffErrorCode::SelectionUnresolved => "selection_unresolved",
            DiffErrorCode::DuplicateBlockId => "duplicate_block_id",
            DiffErrorCode::InvalidBlockId => "invalid_block_id",
            DiffErrorCode::NestedTool => "nested_tool",
        }
    }
}

/// Why a diff could not be applied.
///
/// Designed to be:
/// - stable enough for machine handling (via `code`, `op_index`)
/// - still useful to humans (via `message`)
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{}", self.display_message())]
pub struct DiffError {
    pub code: DiffErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub message: String,
}

impl DiffError {
    pub fn new(code: DiffErrorCode, block_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code,
            op_index: None,
            op: None,
            block_id: block_id.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn block_not_found(id: &str) -> Self {
        Self::new(
            DiffErrorCode::BlockNotFound,
            Some(id),
            format!("block '{id}' not found"),
        )
    }

    /// Attach the position of the failing operation.
    pub fn at(mut self, op_index: usize, op: &str) -> Self {
        self.op_index = Some(op_index);
        self.op = Some(op.to_string());
        self
    }

    fn display_message(&self) -> String {
        match (self.op_index, self.op.as_deref()) {
            (Some(i), Some(op)) => format!("ops[{i}] ({op}) {}", self.message),
            (Some(i), None) => format!("ops[{i}] {}", self.message),
            _ => self.message.clone(),
        }
    }
}

impl From<DiffError> for EngineError {
    fn from(e: DiffError) -> Self {
        let details = serde_json::to_value(&e).ok();
        EngineError {
            code: ErrorCode::Diff,
            message: e.to_string(),
            details,
        }
    }
}
