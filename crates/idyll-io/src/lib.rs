//! `idyll-io` is the single supported public entrypoint for the Idyll document engine:
//! the AST types, the markup transcoder, and the diff engine, plus deterministic helpers
//! for exporting and fingerprinting documents.
//!
//! This crate intentionally contains **no** rendering, storage, or execution of tools.
//! Those belong in higher layers. `idyll-io` focuses on:
//! - stable types
//! - parse / serialize of the wire markup
//! - diff application
//! - canonical JSON and hashing

// -----------------------------------------------------------------------------
// Public API contract
// -----------------------------------------------------------------------------
//
// Consumers SHOULD import from `idyll_io::prelude::*`.
// Anything not re-exported via the prelude is considered internal and may change
// without notice.

use idyll_core::{DiffDocument, Document, ParsedDocument};
use idyll_diff::{DiffError, DiffTelemetry};
use idyll_grammar::CompiledGrammar;
use idyll_markup::{ParseError, ParseOptions, Parser, Serializer};

// Re-export the document model.
#[doc(hidden)]
pub mod core {
    pub use idyll_core::ids::{assign_missing_ids, fresh_block_id, fresh_document_id};
    pub use idyll_core::traverse::{
        MentionRef, VariableRef, duplicate_ids, executable_blocks, find_block, max_depth,
        mentions, variables, walk,
    };
    pub use idyll_core::{
        AgentDocument, Anchor, Block, BlockId, BlockType, ContentBlock, ContentType, DiffDocument,
        Document, EditOperation, EngineError, ErrorCode, ExecutableBlock, ExecutableType,
        InsertPosition, MentionType, ParsedDocument, Props, RichContent, Selector, TextStyle,
        ToolBlock,
    };
}

/// Deterministic JSON canonicalization helpers.
///
/// These utilities are used for fingerprints and golden files.
pub mod canonical_json;

/// Hash helpers for canonical JSON and block trees.
pub mod hashing;

/// Format version constants.
pub mod version;

// Re-export the grammar compiler.
#[doc(hidden)]
pub mod grammar {
    pub use idyll_grammar::{
        AttrViolation, CompiledGrammar, ContentKind, ElementSchema, GrammarError, Rule, RuleSet,
        ViolationKind, builtin_rules, compile,
    };
}

// Re-export the transcoder.
#[doc(hidden)]
pub mod markup {
    pub use idyll_markup::{
        ParseError, ParseErrorCode, ParseOptions, Parser, Serializer, XML_HEADER,
    };
}

// Re-export the diff engine.
#[doc(hidden)]
pub mod diff {
    pub use idyll_diff::{DiffError, DiffErrorCode, DiffTelemetry, apply, apply_with_telemetry};
}

/// Convenience prelude for consumers.
///
/// This is the **only supported** import surface for external users.
pub mod prelude {
    pub use crate::core::{
        AgentDocument, Block, BlockId, BlockType, ContentType, DiffDocument, Document,
        EditOperation, EngineError, ErrorCode, ExecutableType, InsertPosition, ParsedDocument,
        RichContent, Selector, TextStyle,
    };
    pub use crate::core::{duplicate_ids, find_block, walk};
    pub use crate::diff::{DiffError, DiffErrorCode, DiffTelemetry};
    pub use crate::markup::{ParseError, ParseErrorCode, ParseOptions};
    pub use crate::{apply_diff, apply_diff_with_telemetry, parse, parse_with, serialize};
    pub use crate::{canonical_json, hashing, version};
}

/// Parse markup with the shared built-in grammar and default (lenient) options.
pub fn parse(input: &str) -> Result<ParsedDocument, ParseError> {
    parse_with(input, ParseOptions::default())
}

/// Parse markup with the shared built-in grammar and the given options.
pub fn parse_with(input: &str, options: ParseOptions) -> Result<ParsedDocument, ParseError> {
    let grammar = CompiledGrammar::builtin()?;
    Parser::new(grammar, options).parse(input)
}

/// Serialize any root kind to canonical markup.
pub fn serialize(doc: &ParsedDocument) -> Result<String, ParseError> {
    let grammar = CompiledGrammar::builtin()?;
    Ok(Serializer::new(grammar).serialize(doc))
}

/// Apply a diff document to a content document.
///
/// The result keeps the document id. `doc` is left untouched, also on failure.
pub fn apply_diff(doc: &Document, diff: &DiffDocument) -> Result<Document, DiffError> {
    let blocks = idyll_diff::apply(&doc.blocks, &diff.operations)?;
    Ok(Document {
        id: doc.id.clone(),
        blocks,
    })
}

/// Same as [`apply_diff`], also returning the run's telemetry.
pub fn apply_diff_with_telemetry(
    doc: &Document,
    diff: &DiffDocument,
) -> (Result<Document, DiffError>, DiffTelemetry) {
    let (result, telemetry) = idyll_diff::apply_with_telemetry(&doc.blocks, &diff.operations);
    let result = result.map(|blocks| Document {
        id: doc.id.clone(),
        blocks,
    });
    (result, telemetry)
}
