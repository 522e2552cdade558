//! Grammar compiler.
//!
//! Walks a rule graph once and derives the lookup tables the transcoder
//! needs: element <-> AST type maps, per-element attribute schemas, the
//! block/inline split, and the two validity predicates.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::definitions::builtin_rules;
use crate::dsl::{AttrSpec, ContentKind, Rule, RuleSet, is_pseudo_element};
use crate::error::{AttrViolation, GrammarError, ViolationKind};

/// Attribute map as read from an element.
pub type Attributes = BTreeMap<String, String>;

/// Everything the grammar says about one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSchema {
    pub element: &'static str,
    pub ast_type: String,
    pub attributes: Vec<AttrSpec>,
    pub is_block: bool,
    pub content: ContentKind,
    /// Name of the rule the element was recorded under.
    pub rule: &'static str,
}

impl ElementSchema {
    pub fn attribute(&self, name: &str) -> Option<&AttrSpec> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// Immutable lookup structure derived from a [`RuleSet`].
#[derive(Debug, Clone)]
pub struct CompiledGrammar {
    element_to_type: BTreeMap<&'static str, String>,
    type_to_elements: BTreeMap<String, Vec<&'static str>>,
    element_schemas: BTreeMap<&'static str, ElementSchema>,
    block_types: BTreeSet<String>,
    inline_elements: BTreeSet<&'static str>,
    rules: RuleSet,
    patterns: HashMap<&'static str, Regex>,
}

// Compiled regexes are derived from the schemas, so comparing the pattern
// sources is enough.
impl PartialEq for CompiledGrammar {
    fn eq(&self, other: &Self) -> bool {
        self.element_to_type == other.element_to_type
            && self.type_to_elements == other.type_to_elements
            && self.element_schemas == other.element_schemas
            && self.block_types == other.block_types
            && self.inline_elements == other.inline_elements
            && self.rules == other.rules
            && self.patterns.keys().collect::<BTreeSet<_>>()
                == other.patterns.keys().collect::<BTreeSet<_>>()
    }
}

static BUILTIN: OnceCell<CompiledGrammar> = OnceCell::new();

/// Compile a rule set. Pure: the same input always yields an equal grammar.
pub fn compile(rules: &RuleSet) -> Result<CompiledGrammar, GrammarError> {
    let mut compiler = Compiler {
        rules,
        visited: HashSet::new(),
        grammar: CompiledGrammar {
            element_to_type: BTreeMap::new(),
            type_to_elements: BTreeMap::new(),
            element_schemas: BTreeMap::new(),
            block_types: BTreeSet::new(),
            inline_elements: BTreeSet::new(),
            rules: rules.clone(),
            patterns: HashMap::new(),
        },
    };

    for (name, rule) in rules.iter() {
        if compiler.visited.insert(name) {
            compiler.visit(name, rule)?;
        }
    }

    let grammar = compiler.grammar;
    tracing::debug!(
        elements = grammar.element_to_type.len(),
        types = grammar.type_to_elements.len(),
        block_types = grammar.block_types.len(),
        "compiled grammar"
    );
    Ok(grammar)
}

struct Compiler<'r> {
    rules: &'r RuleSet,
    visited: HashSet<&'static str>,
    grammar: CompiledGrammar,
}

impl Compiler<'_> {
    /// Depth-first walk. Each named rule is expanded once, which is what
    /// terminates the natural cycles (rich-content -> styled-text -> rich-content).
    fn visit(&mut self, enclosing: &'static str, rule: &Rule) -> Result<(), GrammarError> {
        match rule {
            Rule::Terminal {
                element,
                attributes,
                content,
            } => self.record(enclosing, *element, attributes, *content),
            Rule::Sequence(items) | Rule::Choice(items) => {
                for item in items {
                    self.visit(enclosing, item)?;
                }
                Ok(())
            }
            Rule::Repeat { rule, .. } | Rule::Optional(rule) => self.visit(enclosing, rule),
            Rule::Ref(name) => {
                let rules = self.rules;
                let target = rules.get(name).ok_or_else(|| GrammarError::UnknownRule {
                    name: name.to_string(),
                    referenced_from: enclosing.to_string(),
                })?;
                if self.visited.insert(*name) {
                    self.visit(*name, target)?;
                }
                Ok(())
            }
        }
    }

    fn record(
        &mut self,
        enclosing: &'static str,
        element: &'static str,
        attributes: &[AttrSpec],
        content: ContentKind,
    ) -> Result<(), GrammarError> {
        if is_pseudo_element(element) {
            return Ok(());
        }

        for attr in attributes {
            if let Some(pattern) = attr.pattern {
                if !self.grammar.patterns.contains_key(pattern) {
                    let re = Regex::new(pattern).map_err(|e| GrammarError::InvalidPattern {
                        element: element.to_string(),
                        attribute: attr.name.to_string(),
                        reason: e.to_string(),
                    })?;
                    self.grammar.patterns.insert(pattern, re);
                }
            }
        }

        let class = classify_rule(enclosing);
        let g = &mut self.grammar;
        if class == Placement::Inline {
            g.inline_elements.insert(element);
        }

        if let Some(existing) = g.element_schemas.get_mut(element) {
            // An element used both inline and as a block (`code`) is a block,
            // with the block's attribute schema.
            if class == Placement::Block && !existing.is_block {
                existing.is_block = true;
                existing.attributes = attributes.to_vec();
                existing.content = content;
                existing.rule = enclosing;
                g.block_types.insert(existing.ast_type.clone());
            }
            return Ok(());
        }

        let ast_type = ast_type_for_element(element);
        g.element_to_type.insert(element, ast_type.clone());
        g.type_to_elements
            .entry(ast_type.clone())
            .or_default()
            .push(element);
        if class == Placement::Block {
            g.block_types.insert(ast_type.clone());
        }
        g.element_schemas.insert(
            element,
            ElementSchema {
                element,
                ast_type,
                attributes: attributes.to_vec(),
                is_block: class == Placement::Block,
                content,
                rule: enclosing,
            },
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    Block,
    Inline,
    Other,
}

fn classify_rule(rule_name: &str) -> Placement {
    const BLOCK_RULES: &[&str] = &["paragraph", "heading", "code", "quote", "separator", "tool-block"];
    const INLINE_MARKERS: &[&str] = &["styled", "mention", "variable", "link", "text", "annotation", "ai-edit"];

    if rule_name.contains("block") || BLOCK_RULES.contains(&rule_name) {
        Placement::Block
    } else if INLINE_MARKERS.iter().any(|m| rule_name.contains(m)) {
        Placement::Inline
    } else {
        Placement::Other
    }
}

/// Element name -> AST type. Unlisted names fall back to replacing `:` and
/// `-` with `_`.
pub fn ast_type_for_element(element: &str) -> String {
    let known = match element {
        "p" | "paragraph" => "paragraph",
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "heading" => "heading",
        "bulletlistitem" => "bullet_list_item",
        "numberedlistitem" => "numbered_list_item",
        "checklistitem" => "checklist_item",
        "fncall" => "function_call",
        "strong" | "b" => "bold",
        "em" | "i" => "italic",
        "u" | "underline" => "underline",
        "s" | "strike" | "del" => "strikethrough",
        "code" | "tt" => "code",
        "a" => "link",
        "mention:user" | "mention:document" | "mention:agent" | "mention:custom" => "mention",
        "annotatedtext" => "annotation",
        "aieditresponse" => "ai_edit_response",
        "edit:attr" | "edit:prop" => "edit_attr",
        _ => return element.replace([':', '-'], "_"),
    };
    known.to_string()
}

/// AST type -> name of the rule that produces it.
fn production_rule(ast_type: &str) -> String {
    let known = match ast_type {
        "bullet_list_item" | "numbered_list_item" | "checklist_item" => "list-item-block",
        "data" => "data-block",
        "tool" => "tool-block",
        "function_call" => "fncall-block",
        "trigger" => "trigger-block",
        "bold" => "styled-bold",
        "italic" => "styled-italic",
        "underline" => "styled-underline",
        "strikethrough" => "styled-strike",
        "edit_attr" => "edit-attr",
        "insert" => "insert-op",
        "delete" => "delete-op",
        "replace" => "replace-op",
        "move" => "move-op",
        _ => return ast_type.replace('_', "-"),
    };
    known.to_string()
}

impl CompiledGrammar {
    /// The built-in grammar, compiled on first use and shared for the rest
    /// of the process.
    pub fn builtin() -> Result<&'static CompiledGrammar, GrammarError> {
        BUILTIN.get_or_try_init(|| compile(&builtin_rules()?))
    }

    pub fn element_type(&self, element: &str) -> Option<&str> {
        self.element_to_type.get(element).map(String::as_str)
    }

    /// All spellings of a type, preferred spelling first.
    pub fn elements_for_type(&self, ast_type: &str) -> &[&'static str] {
        self.type_to_elements
            .get(ast_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The canonical element a type is serialized as.
    pub fn preferred_element(&self, ast_type: &str) -> Option<&'static str> {
        self.elements_for_type(ast_type).first().copied()
    }

    pub fn schema(&self, element: &str) -> Option<&ElementSchema> {
        self.element_schemas.get(element)
    }

    pub fn elements(&self) -> impl Iterator<Item = &ElementSchema> {
        self.element_schemas.values()
    }

    pub fn block_types(&self) -> &BTreeSet<String> {
        &self.block_types
    }

    pub fn is_block_type(&self, ast_type: &str) -> bool {
        self.block_types.contains(ast_type)
    }

    pub fn is_inline_element(&self, element: &str) -> bool {
        self.inline_elements.contains(element)
    }

    pub fn is_valid_element(&self, element: &str) -> bool {
        self.element_to_type.contains_key(element)
    }

    /// Whether `child_element` may occur somewhere inside the rule that
    /// produces `parent_type`.
    pub fn is_valid_child(&self, parent_type: &str, child_element: &str) -> bool {
        let rule_name = production_rule(parent_type);
        let Some(rule) = self.rules.get(&rule_name) else {
            return false;
        };
        let mut seen = HashSet::new();
        self.rule_mentions(rule, child_element, &mut seen)
    }

    fn rule_mentions<'a>(&'a self, rule: &'a Rule, element: &str, seen: &mut HashSet<&'a str>) -> bool {
        match rule {
            Rule::Terminal { element: e, .. } => *e == element,
            Rule::Sequence(items) | Rule::Choice(items) => {
                items.iter().any(|r| self.rule_mentions(r, element, seen))
            }
            Rule::Repeat { rule, .. } | Rule::Optional(rule) => self.rule_mentions(rule, element, seen),
            Rule::Ref(name) => {
                if !seen.insert(*name) {
                    return false;
                }
                self.rules
                    .get(name)
                    .is_some_and(|r| self.rule_mentions(r, element, seen))
            }
        }
    }

    /// Check `attrs` against the element's schema.
    ///
    /// Every violation is collected: missing required attributes first, then
    /// enum, pattern and custom checks for each provided attribute. Elements
    /// without a schema produce no violations.
    pub fn validate_attributes(&self, element: &str, attrs: &Attributes) -> Vec<AttrViolation> {
        let Some(schema) = self.element_schemas.get(element) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let violation = |attribute: &str, kind: ViolationKind, message: String| AttrViolation {
            element: element.to_string(),
            attribute: attribute.to_string(),
            kind,
            message,
        };

        for spec in schema.attributes.iter().filter(|s| s.required) {
            if !attrs.contains_key(spec.name) {
                out.push(violation(
                    spec.name,
                    ViolationKind::Missing,
                    format!("<{element}> is missing required attribute '{}'", spec.name),
                ));
            }
        }

        for spec in &schema.attributes {
            let Some(value) = attrs.get(spec.name) else {
                continue;
            };

            if let Some(allowed) = spec.allowed {
                if !allowed.contains(&value.as_str()) {
                    out.push(violation(
                        spec.name,
                        ViolationKind::NotInEnum {
                            allowed: allowed.iter().map(|s| s.to_string()).collect(),
                        },
                        format!(
                            "<{element}> attribute '{}' must be one of [{}], got '{value}'",
                            spec.name,
                            allowed.join(", ")
                        ),
                    ));
                }
            }

            if let Some(pattern) = spec.pattern {
                let matched = self.patterns.get(pattern).is_some_and(|re| re.is_match(value));
                if !matched {
                    out.push(violation(
                        spec.name,
                        ViolationKind::PatternMismatch {
                            pattern: pattern.to_string(),
                        },
                        format!(
                            "<{element}> attribute '{}' value '{value}' does not match {pattern}",
                            spec.name
                        ),
                    ));
                }
            }

            if let Some(validator) = spec.validator {
                if let Err(reason) = (validator.check)(value) {
                    out.push(violation(
                        spec.name,
                        ViolationKind::Custom {
                            validator: validator.name.to_string(),
                        },
                        format!("<{element}> attribute '{}': {reason}", spec.name),
                    ));
                }
            }
        }

        out
    }
}
