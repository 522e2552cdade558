//! Idyll grammar: a small combinator DSL, the built-in document, agent and
//! diff grammars, and the compiler that turns them into lookup tables.
//!
//! Compile once and pass the [`CompiledGrammar`] by reference, or use
//! [`CompiledGrammar::builtin`] for the process-wide shared instance.

pub mod compiler;
pub mod definitions;
pub mod dsl;
pub mod error;

pub use compiler::{Attributes, CompiledGrammar, ElementSchema, ast_type_for_element, compile};
pub use definitions::builtin_rules;
pub use dsl::{AttrSpec, ContentKind, Rule, RuleSet};
pub use error::{AttrViolation, GrammarError, ViolationKind};
