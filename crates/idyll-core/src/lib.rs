#![doc = r#"
⚠️ INTERNAL CRATE – NOT A STABLE API

This crate is an internal implementation detail of the Idyll document engine.

Do NOT depend on this crate directly.
Use `idyll-io` instead.
"#]

pub mod error;
pub mod ids;
pub mod model;
pub mod ops;
pub mod traverse;

pub use error::{EngineError, ErrorCode};
pub use model::{
    AgentDocument, Block, BlockId, BlockType, ContentBlock, ContentType, DiffDocument, Document,
    ExecutableBlock, ExecutableType, MentionType, ParsedDocument, Props, RichContent, TextStyle,
    ToolBlock,
};
pub use ops::{Anchor, EditOperation, InsertPosition, Selector};
