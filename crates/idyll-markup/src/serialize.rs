//! AST -> markup text.
//!
//! Output is deterministic: every root starts with [`XML_HEADER`], top-level
//! blocks (and diff operations) go one per line indented by two spaces, and
//! everything inside a block is written compactly so that no layout
//! whitespace leaks into rich content. Attributes come out as `id`, then the
//! executable's tool attribute, then the rest in name order.

use chrono::SecondsFormat;
use serde_json::Value;

use idyll_core::{
    AgentDocument, Block, ContentBlock, ContentType, DiffDocument, Document, EditOperation,
    ExecutableBlock, ExecutableType, InsertPosition, ParsedDocument, Props, RichContent, Selector,
    TextStyle, ToolBlock,
};
use idyll_grammar::CompiledGrammar;

use crate::element::{cdata, escape_attr, escape_text};
use crate::error::ParseError;
use crate::parse::{AI_EDIT_RESPONSE, tool_attribute};

pub const XML_HEADER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

const INDENT: &str = "  ";

/// Serialize with the built-in grammar.
pub fn serialize(doc: &ParsedDocument) -> Result<String, ParseError> {
    let grammar = CompiledGrammar::builtin()?;
    Ok(Serializer::new(grammar).serialize(doc))
}

pub struct Serializer<'g> {
    grammar: &'g CompiledGrammar,
}

impl<'g> Serializer<'g> {
    pub fn new(grammar: &'g CompiledGrammar) -> Self {
        Self { grammar }
    }

    pub fn serialize(&self, doc: &ParsedDocument) -> String {
        match doc {
            ParsedDocument::Document(d) => self.document(d),
            ParsedDocument::Agent(a) => self.agent(a),
            ParsedDocument::Diff(d) => self.diff(d),
        }
    }

    pub fn document(&self, doc: &Document) -> String {
        let attrs = vec![("id", doc.id.as_str())];
        self.root("document", &attrs, &doc.blocks)
    }

    pub fn agent(&self, agent: &AgentDocument) -> String {
        let mut attrs = vec![("id", agent.id.as_str())];
        for (name, value) in [
            ("name", &agent.name),
            ("description", &agent.description),
            ("model", &agent.model),
        ] {
            if let Some(v) = value {
                attrs.push((name, v.as_str()));
            }
        }
        self.root("agent", &attrs, &agent.blocks)
    }

    pub fn diff(&self, diff: &DiffDocument) -> String {
        let timestamp = diff.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
        let mut attrs = Vec::new();
        if let Some(id) = &diff.id {
            attrs.push(("id", id.as_str()));
        }
        attrs.push(("timestamp", timestamp.as_str()));

        let mut out = header();
        if diff.operations.is_empty() {
            open_tag(&mut out, "diff", &attrs, true);
            out.push('\n');
            return out;
        }
        open_tag(&mut out, "diff", &attrs, false);
        out.push('\n');
        for op in &diff.operations {
            out.push_str(INDENT);
            self.operation(&mut out, op);
            out.push('\n');
        }
        out.push_str("</diff>\n");
        out
    }

    /// A single block, as it would appear inside a document.
    pub fn block_markup(&self, block: &Block) -> String {
        let mut out = String::new();
        self.block(&mut out, block);
        out
    }

    fn root(&self, name: &str, attrs: &[(&str, &str)], blocks: &[Block]) -> String {
        let mut out = header();
        if blocks.is_empty() {
            open_tag(&mut out, name, attrs, true);
            out.push('\n');
            return out;
        }
        open_tag(&mut out, name, attrs, false);
        out.push('\n');
        for block in blocks {
            out.push_str(INDENT);
            self.block(&mut out, block);
            out.push('\n');
        }
        out.push_str("</");
        out.push_str(name);
        out.push_str(">\n");
        out
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    fn block(&self, out: &mut String, block: &Block) {
        match block {
            Block::Content(b) => self.content_block(out, b),
            Block::Executable(b) => self.executable_block(out, b),
            Block::Tool(b) => self.tool_block(out, b),
        }
    }

    fn content_block(&self, out: &mut String, b: &ContentBlock) {
        let mut props: Vec<(&str, &str)> = b.props.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let name = match b.kind {
            ContentType::Heading => {
                let level = b
                    .props
                    .get("level")
                    .and_then(|l| l.parse::<u8>().ok())
                    .filter(|l| (1..=6).contains(l))
                    .unwrap_or(1);
                // The level is carried by the element name.
                props.retain(|(k, _)| *k != "level");
                heading_element(level)
            }
            kind => self.element_for(kind.as_str()),
        };

        let attrs = with_id(&b.id, None, props);
        let empty = b.content.is_empty() && b.children.is_empty();
        open_tag(out, name, &attrs, empty);
        if empty {
            return;
        }

        match b.kind {
            ContentType::Code | ContentType::Data => {
                out.push_str(&escape_text(&RichContent::plain_text(&b.content)));
            }
            _ => self.rich(out, &b.content),
        }
        for child in &b.children {
            self.block(out, child);
        }
        close_tag(out, name);
    }

    fn executable_block(&self, out: &mut String, b: &ExecutableBlock) {
        let name = self.element_for(b.kind.as_str());
        let tool_attr = tool_attribute(b.kind);
        let props: Vec<(&str, &str)> = b
            .metadata
            .iter()
            .filter(|(k, _)| k.as_str() != tool_attr)
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        let attrs = with_id(&b.id, Some((tool_attr, b.tool.as_str())), props);

        let has_params = !b.parameters.is_null();
        let has_result = b.kind == ExecutableType::FunctionCall && b.result.is_some();
        let empty = !has_params && b.instructions.is_empty() && !has_result;
        open_tag(out, name, &attrs, empty);
        if empty {
            return;
        }

        if has_params {
            payload(out, "params", &b.parameters);
        }
        if !b.instructions.is_empty() {
            out.push_str("<content>");
            self.rich(out, &b.instructions);
            out.push_str("</content>");
        }
        if has_result {
            if let Some(result) = &b.result {
                payload(out, "result", result);
            }
        }
        close_tag(out, name);
    }

    fn tool_block(&self, out: &mut String, b: &ToolBlock) {
        let name = self.element_for("tool");
        let attrs = with_id(&b.id, None, props_list(&b.props));
        let empty = b.content.is_empty() && b.description.is_empty() && b.definition.is_empty();
        open_tag(out, name, &attrs, empty);
        if empty {
            return;
        }

        self.rich(out, &b.content);
        if !b.description.is_empty() {
            out.push_str("<tool:description>");
            out.push_str(&escape_text(&b.description));
            out.push_str("</tool:description>");
        }
        if !b.definition.is_empty() {
            out.push_str("<tool:definition>");
            for block in &b.definition {
                self.block(out, block);
            }
            out.push_str("</tool:definition>");
        }
        close_tag(out, name);
    }

    // ---------------------------------------------------------------------
    // Rich content
    // ---------------------------------------------------------------------

    fn rich(&self, out: &mut String, items: &[RichContent]) {
        for item in items {
            self.inline(out, item);
        }
    }

    fn inline(&self, out: &mut String, item: &RichContent) {
        match item {
            RichContent::Text { text, styles } => {
                if text.is_empty() {
                    return;
                }
                // styles[0] is the innermost wrapper.
                for style in styles.iter().rev() {
                    open_tag(out, self.style_element(*style), &[], false);
                }
                out.push_str(&escape_text(text));
                for style in styles {
                    close_tag(out, self.style_element(*style));
                }
            }
            RichContent::Mention {
                mention_type,
                id,
                label,
            } => {
                let name = format!("mention:{}", mention_type.as_str());
                let attrs = [("id", id.as_str())];
                match label {
                    Some(label) if !label.is_empty() => {
                        open_tag(out, &name, &attrs, false);
                        out.push_str(&escape_text(label));
                        close_tag(out, &name);
                    }
                    _ => open_tag(out, &name, &attrs, true),
                }
            }
            RichContent::Variable {
                name,
                prompt,
                value,
                resolved_value,
            } => {
                let mut attrs = vec![("name", name.as_str())];
                for (attr, v) in [
                    ("prompt", prompt),
                    ("value", value),
                    ("resolved-value", resolved_value),
                ] {
                    if let Some(v) = v {
                        attrs.push((attr, v.as_str()));
                    }
                }
                open_tag(out, "variable", &attrs, true);
            }
            RichContent::Link { href, content } => {
                let name = self.element_for("link");
                open_tag(out, name, &[("href", href.as_str())], content.is_empty());
                if !content.is_empty() {
                    self.rich(out, content);
                    close_tag(out, name);
                }
            }
            RichContent::Annotation { content, metadata } => {
                let (name, attrs) = if metadata.get("kind").map(String::as_str) == Some(AI_EDIT_RESPONSE) {
                    let attrs: Vec<(&str, &str)> = metadata
                        .iter()
                        .filter(|(k, _)| k.as_str() != "kind")
                        .map(|(k, v)| (k.as_str(), v.as_str()))
                        .collect();
                    (self.element_for("ai_edit_response"), attrs)
                } else {
                    (self.element_for("annotation"), props_list(metadata))
                };
                open_tag(out, name, &attrs, content.is_empty());
                if !content.is_empty() {
                    self.rich(out, content);
                    close_tag(out, name);
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Diff operations
    // ---------------------------------------------------------------------

    fn operation(&self, out: &mut String, op: &EditOperation) {
        let name = self.element_for(op.name());
        match op {
            EditOperation::EditAttr {
                block_id,
                name: attr,
                value,
            } => open_tag(
                out,
                name,
                &[("block-id", block_id.as_str()), ("name", attr.as_str()), ("value", value.as_str())],
                true,
            ),
            EditOperation::EditContent { block_id, content } => {
                open_tag(out, name, &[("block-id", block_id.as_str())], content.is_empty());
                if !content.is_empty() {
                    self.rich(out, content);
                    close_tag(out, name);
                }
            }
            EditOperation::EditParams { block_id, params } => {
                open_tag(out, name, &[("block-id", block_id.as_str())], false);
                out.push_str(&cdata(&params.to_string()));
                close_tag(out, name);
            }
            EditOperation::EditId { block_id, new_id } => open_tag(
                out,
                name,
                &[("block-id", block_id.as_str()), ("new-id", new_id.as_str())],
                true,
            ),
            EditOperation::Insert { position, blocks } => {
                self.blocks_op(out, name, position_attrs(position), blocks);
            }
            EditOperation::Delete { block_id } => {
                open_tag(out, name, &[("block-id", block_id.as_str())], true);
            }
            EditOperation::Replace { block_id, blocks } => {
                self.blocks_op(out, name, vec![("block-id", block_id.clone())], blocks);
            }
            EditOperation::Move { selector, position } => {
                let mut attrs: Vec<(&str, String)> = match selector {
                    Selector::Block(id) => vec![("block-id", id.clone())],
                    Selector::Blocks(ids) => vec![("block-ids", ids.join(","))],
                    Selector::Range { from, to } => {
                        vec![("from-block-id", from.clone()), ("to-block-id", to.clone())]
                    }
                };
                attrs.extend(position_attrs(position));
                let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
                open_tag(out, name, &attrs, true);
            }
        }
    }

    fn blocks_op(&self, out: &mut String, name: &str, attrs: Vec<(&str, String)>, blocks: &[Block]) {
        let attrs: Vec<(&str, &str)> = attrs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        open_tag(out, name, &attrs, blocks.is_empty());
        if blocks.is_empty() {
            return;
        }
        for block in blocks {
            self.block(out, block);
        }
        close_tag(out, name);
    }

    // ---------------------------------------------------------------------
    // Element names
    // ---------------------------------------------------------------------

    /// The canonical element for an AST type: the first spelling the grammar
    /// declares, or the type name itself for types it does not know.
    fn element_for<'a>(&self, ast_type: &'a str) -> &'a str {
        match self.grammar.preferred_element(ast_type) {
            Some(element) => element,
            None => ast_type,
        }
    }

    /// First spelling of a style that is not also a block element (`code`
    /// is a block, so inline code is written `tt`).
    fn style_element(&self, style: TextStyle) -> &'g str {
        let grammar = self.grammar;
        grammar
            .elements_for_type(style.as_str())
            .iter()
            .copied()
            .find(|e| grammar.is_inline_element(e) && !grammar.schema(e).is_some_and(|s| s.is_block))
            .unwrap_or(style.as_str())
    }
}

fn header() -> String {
    let mut out = String::with_capacity(256);
    out.push_str(XML_HEADER);
    out.push('\n');
    out
}

fn heading_element(level: u8) -> &'static str {
    match level {
        2 => "h2",
        3 => "h3",
        4 => "h4",
        5 => "h5",
        6 => "h6",
        _ => "h1",
    }
}

fn props_list(props: &Props) -> Vec<(&str, &str)> {
    props.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
}

/// `id` first (when assigned), then the tool attribute, then `rest` in order.
fn with_id<'a>(id: &'a str, tool: Option<(&'a str, &'a str)>, rest: Vec<(&'a str, &'a str)>) -> Vec<(&'a str, &'a str)> {
    let mut attrs = Vec::with_capacity(rest.len() + 2);
    if !id.is_empty() {
        attrs.push(("id", id));
    }
    attrs.extend(tool);
    attrs.extend(rest.into_iter().filter(|(k, _)| *k != "id"));
    attrs
}

fn position_attrs(position: &InsertPosition) -> Vec<(&'static str, String)> {
    let mut attrs = Vec::new();
    if let Some(id) = &position.after_block_id {
        attrs.push(("after-block-id", id.clone()));
    }
    if let Some(id) = &position.before_block_id {
        attrs.push(("before-block-id", id.clone()));
    }
    if position.at_start {
        attrs.push(("at-start", "true".to_string()));
    }
    if position.at_end {
        attrs.push(("at-end", "true".to_string()));
    }
    attrs
}

fn open_tag(out: &mut String, name: &str, attrs: &[(&str, &str)], self_closing: bool) {
    out.push('<');
    out.push_str(name);
    for (k, v) in attrs {
        out.push(' ');
        out.push_str(k);
        out.push_str("=\"");
        out.push_str(&escape_attr(v));
        out.push('"');
    }
    out.push_str(if self_closing { "/>" } else { ">" });
}

fn close_tag(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// JSON payload element, as CDATA.
fn payload(out: &mut String, name: &str, value: &Value) {
    out.push('<');
    out.push_str(name);
    out.push('>');
    out.push_str(&cdata(&value.to_string()));
    close_tag(out, name);
}
