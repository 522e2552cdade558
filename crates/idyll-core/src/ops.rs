use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{Block, BlockId, RichContent};

/// Positional attributes of an `insert` or `move`, exactly as written.
///
/// Exactly one of the four must be set; [`InsertPosition::resolve`] enforces
/// that at apply time so a malformed position surfaces as a diff failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertPosition {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub at_start: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub at_end: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_block_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_block_id: Option<BlockId>,
}

/// A resolved, unambiguous insertion point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    AtStart,
    AtEnd,
    After(BlockId),
    Before(BlockId),
}

impl InsertPosition {
    pub fn at_start() -> Self {
        Self {
            at_start: true,
            ..Self::default()
        }
    }

    pub fn at_end() -> Self {
        Self {
            at_end: true,
            ..Self::default()
        }
    }

    pub fn after(id: impl Into<BlockId>) -> Self {
        Self {
            after_block_id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn before(id: impl Into<BlockId>) -> Self {
        Self {
            before_block_id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Number of positional attributes that are set.
    pub fn count_set(&self) -> usize {
        usize::from(self.at_start)
            + usize::from(self.at_end)
            + usize::from(self.after_block_id.is_some())
            + usize::from(self.before_block_id.is_some())
    }

    /// Returns `None` unless exactly one attribute is set.
    pub fn resolve(&self) -> Option<Anchor> {
        if self.count_set() != 1 {
            return None;
        }
        if self.at_start {
            Some(Anchor::AtStart)
        } else if self.at_end {
            Some(Anchor::AtEnd)
        } else if let Some(id) = &self.after_block_id {
            Some(Anchor::After(id.clone()))
        } else {
            self.before_block_id.clone().map(Anchor::Before)
        }
    }
}

/// Which blocks a `move` picks up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Block(BlockId),
    Blocks(Vec<BlockId>),
    /// Inclusive range of top-level siblings.
    Range { from: BlockId, to: BlockId },
}

/// A single edit of a block tree, addressed by block id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EditOperation {
    EditAttr {
        block_id: BlockId,
        name: String,
        value: String,
    },
    EditContent {
        block_id: BlockId,
        content: Vec<RichContent>,
    },
    EditParams {
        block_id: BlockId,
        params: Value,
    },
    EditId {
        block_id: BlockId,
        new_id: BlockId,
    },
    Insert {
        position: InsertPosition,
        blocks: Vec<Block>,
    },
    Delete {
        block_id: BlockId,
    },
    Replace {
        block_id: BlockId,
        blocks: Vec<Block>,
    },
    Move {
        selector: Selector,
        position: InsertPosition,
    },
}

impl EditOperation {
    /// Stable lowercase name, used in logs and telemetry.
    pub const fn name(&self) -> &'static str {
        match self {
            EditOperation::EditAttr { .. } => "edit_attr",
            EditOperation::EditContent { .. } => "edit_content",
            EditOperation::EditParams { .. } => "edit_params",
            EditOperation::EditId { .. } => "edit_id",
            EditOperation::Insert { .. } => "insert",
            EditOperation::Delete { .. } => "delete",
            EditOperation::Replace { .. } => "replace",
            EditOperation::Move { .. } => "move",
        }
    }

    /// Block ids this operation addresses (targets, anchors and selections).
    pub fn referenced_ids(&self) -> Vec<&str> {
        let mut out = Vec::new();
        match self {
            EditOperation::EditAttr { block_id, .. }
            | EditOperation::EditContent { block_id, .. }
            | EditOperation::EditParams { block_id, .. }
            | EditOperation::EditId { block_id, .. }
            | EditOperation::Delete { block_id }
            | EditOperation::Replace { block_id, .. } => out.push(block_id.as_str()),
            EditOperation::Insert { position, .. } => push_position_ids(position, &mut out),
            EditOperation::Move { selector, position } => {
                match selector {
                    Selector::Block(id) => out.push(id.as_str()),
                    Selector::Blocks(ids) => out.extend(ids.iter().map(String::as_str)),
                    Selector::Range { from, to } => {
                        out.push(from.as_str());
                        out.push(to.as_str());
                    }
                }
                push_position_ids(position, &mut out);
            }
        }
        out
    }
}

fn push_position_ids<'a>(position: &'a InsertPosition, out: &mut Vec<&'a str>) {
    if let Some(id) = &position.after_block_id {
        out.push(id.as_str());
    }
    if let Some(id) = &position.before_block_id {
        out.push(id.as_str());
    }
}
