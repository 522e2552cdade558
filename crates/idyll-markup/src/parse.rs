//! Markup text -> AST.
//!
//! The parser is forgiving about vocabulary it does not know (unknown
//! elements and operations are skipped, unless [`ParseOptions::strict`]) and
//! strict about everything it does: attributes are validated against the
//! compiled grammar, JSON payloads must parse, and tools never nest.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use idyll_core::ids::{fresh_block_id, fresh_document_id};
use idyll_core::traverse::walk;
use idyll_core::{
    AgentDocument, Block, BlockType, ContentBlock, ContentType, DiffDocument, Document,
    EditOperation, ExecutableBlock, ExecutableType, InsertPosition, MentionType, ParsedDocument,
    Props, RichContent, Selector, TextStyle, ToolBlock,
};
use idyll_grammar::definitions::split_id_list;
use idyll_grammar::{CompiledGrammar, ContentKind};

use crate::element::{self, Element, Node};
use crate::error::{ParseError, ParseErrorCode};
use crate::options::ParseOptions;

pub const ROOT_ELEMENTS: [&str; 3] = ["document", "agent", "diff"];

const TOOL_DESCRIPTION: &str = "tool:description";
const TOOL_DEFINITION: &str = "tool:definition";

/// Parse with the built-in grammar and default options.
pub fn parse(input: &str) -> Result<ParsedDocument, ParseError> {
    let grammar = CompiledGrammar::builtin()?;
    Parser::new(grammar, ParseOptions::default()).parse(input)
}

/// Whether freshly parsed blocks without an `id` get one minted.
///
/// Blocks inside diff operations keep an empty id so that the diff engine
/// can decide (a one-for-one replacement inherits the id it replaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ids {
    Mint,
    Keep,
}

pub struct Parser<'g> {
    grammar: &'g CompiledGrammar,
    options: ParseOptions,
}

impl<'g> Parser<'g> {
    pub fn new(grammar: &'g CompiledGrammar, options: ParseOptions) -> Self {
        Self { grammar, options }
    }

    pub fn options(&self) -> ParseOptions {
        self.options
    }

    pub fn parse(&self, input: &str) -> Result<ParsedDocument, ParseError> {
        if input.trim().is_empty() {
            return Err(ParseError::new(ParseErrorCode::EmptyInput, "input is empty"));
        }

        let root = element::read(input, self.options.max_depth)?;
        match root.name.as_str() {
            "document" => self.document(&root).map(ParsedDocument::Document),
            "agent" => self.agent(&root).map(ParsedDocument::Agent),
            "diff" => self.diff(&root).map(ParsedDocument::Diff),
            other => Err(ParseError::new(
                ParseErrorCode::UnknownRoot,
                format!("unknown root element <{other}>; expected one of document, agent, diff"),
            )
            .with_details(json!({ "element": other, "expected": ROOT_ELEMENTS }))),
        }
    }

    /// Parse input that must be a `<document>`.
    pub fn parse_document(&self, input: &str) -> Result<Document, ParseError> {
        match self.parse(input)? {
            ParsedDocument::Document(doc) => Ok(doc),
            other => Err(wrong_root("document", other.root_element())),
        }
    }

    /// Parse input that must be an `<agent>`.
    pub fn parse_agent(&self, input: &str) -> Result<AgentDocument, ParseError> {
        match self.parse(input)? {
            ParsedDocument::Agent(agent) => Ok(agent),
            other => Err(wrong_root("agent", other.root_element())),
        }
    }

    /// Parse input that must be a `<diff>`.
    pub fn parse_diff(&self, input: &str) -> Result<DiffDocument, ParseError> {
        match self.parse(input)? {
            ParsedDocument::Diff(diff) => Ok(diff),
            other => Err(wrong_root("diff", other.root_element())),
        }
    }

    // ---------------------------------------------------------------------
    // Roots
    // ---------------------------------------------------------------------

    fn document(&self, root: &Element) -> Result<Document, ParseError> {
        self.validate(root)?;
        let id = root
            .attr("id")
            .map_or_else(fresh_document_id, str::to_string);

        let mut blocks = self.blocks(&root.children, Ids::Mint)?;
        if blocks.is_empty() {
            blocks.push(ContentBlock::new(fresh_block_id(), ContentType::Paragraph, Vec::new()).into());
        }
        Ok(Document { id, blocks })
    }

    fn agent(&self, root: &Element) -> Result<AgentDocument, ParseError> {
        self.validate(root)?;
        Ok(AgentDocument {
            id: root
                .attr("id")
                .map_or_else(fresh_document_id, str::to_string),
            name: root.attr("name").map(str::to_string),
            description: root.attr("description").map(str::to_string),
            model: root.attr("model").map(str::to_string),
            blocks: self.blocks(&root.children, Ids::Mint)?,
        })
    }

    fn diff(&self, root: &Element) -> Result<DiffDocument, ParseError> {
        self.validate(root)?;
        let timestamp = match root.attr("timestamp") {
            Some(raw) => parse_timestamp(raw)?,
            None => Utc::now(),
        };

        let mut operations = Vec::new();
        for el in root.child_elements() {
            if let Some(op) = self.operation(el)? {
                operations.push(op);
            }
        }

        Ok(DiffDocument {
            id: root.attr("id").map(str::to_string),
            timestamp,
            operations,
        })
    }

    // ---------------------------------------------------------------------
    // Blocks
    // ---------------------------------------------------------------------

    /// Every block-typed element among `nodes`. Text between blocks is layout.
    fn blocks(&self, nodes: &[Node], ids: Ids) -> Result<Vec<Block>, ParseError> {
        let mut out = Vec::new();
        for node in nodes {
            if let Node::Element(el) = node {
                if let Some(block) = self.block(el, ids)? {
                    out.push(block);
                }
            }
        }
        Ok(out)
    }

    fn block(&self, el: &Element, ids: Ids) -> Result<Option<Block>, ParseError> {
        let Some(block_type) = self.block_type(el) else {
            self.skip_unknown(el, "a block list")?;
            return Ok(None);
        };
        self.validate(el)?;

        let id = match el.attr("id") {
            Some(id) => id.to_string(),
            None if ids == Ids::Mint => fresh_block_id(),
            None => String::new(),
        };

        let block = match block_type {
            BlockType::Content(kind) => Block::Content(self.content_block(el, kind, id, ids)?),
            BlockType::Executable(kind) => Block::Executable(self.executable_block(el, kind, id)?),
            BlockType::Tool => Block::Tool(self.tool_block(el, id, ids)?),
        };
        Ok(Some(block))
    }

    fn block_type(&self, el: &Element) -> Option<BlockType> {
        let schema = self.grammar.schema(&el.name)?;
        if !schema.is_block {
            return None;
        }
        BlockType::from_ast_type(&schema.ast_type)
    }

    /// Inside rich content, an element that is both a block and an inline
    /// style (`code`) is the style unless it carries attributes; style
    /// wrappers take none.
    fn is_nested_block(&self, el: &Element) -> bool {
        self.block_type(el).is_some()
            && !(self.grammar.is_inline_element(&el.name) && el.attributes.is_empty())
    }

    fn content_block(
        &self,
        el: &Element,
        kind: ContentType,
        id: String,
        ids: Ids,
    ) -> Result<ContentBlock, ParseError> {
        let mut props = props_without(el, &["id"]);
        if kind == ContentType::Heading && !props.contains_key("level") {
            if let Some(level) = heading_level(&el.name) {
                props.insert("level".to_string(), level.to_string());
            }
        }

        let mut block = ContentBlock {
            id,
            kind,
            content: Vec::new(),
            children: Vec::new(),
            props,
        };

        match self.content_kind(el) {
            ContentKind::None => {}
            ContentKind::Text | ContentKind::Json => {
                let text = el.text();
                if !text.is_empty() {
                    block.content.push(RichContent::text(text));
                }
            }
            ContentKind::Rich => {
                // Inline content and nested blocks may interleave; each keeps
                // its own order.
                let mut inline: Vec<&Node> = Vec::new();
                for node in &el.children {
                    match node {
                        Node::Element(child) if self.is_nested_block(child) => {
                            if let Some(b) = self.block(child, ids)? {
                                block.children.push(b);
                            }
                        }
                        other => inline.push(other),
                    }
                }
                block.content = self.rich(inline)?;
            }
        }
        Ok(block)
    }

    fn executable_block(
        &self,
        el: &Element,
        kind: ExecutableType,
        id: String,
    ) -> Result<ExecutableBlock, ParseError> {
        let tool_attr = tool_attribute(kind);
        let tool = required_attr(el, tool_attr)?;
        let mut metadata = props_without(el, &["id", tool_attr]);
        if kind == ExecutableType::Trigger {
            metadata
                .entry("enabled".to_string())
                .or_insert_with(|| "true".to_string());
        }

        let mut parameters = Value::Object(Map::new());
        let mut instructions = Vec::new();
        let mut result = None;
        for child in el.child_elements() {
            match child.name.as_str() {
                "params" => parameters = json_payload(child, &id)?,
                "content" => {
                    self.validate(child)?;
                    instructions = self.rich(&child.children)?;
                }
                "result" if kind == ExecutableType::FunctionCall => {
                    let text = child.text();
                    let trimmed = text.trim();
                    if !trimmed.is_empty() {
                        // Tool output is not always JSON; keep it as text then.
                        result = Some(
                            serde_json::from_str(trimmed)
                                .unwrap_or_else(|_| Value::String(text.clone())),
                        );
                    }
                }
                _ => self.skip_unknown(child, &format!("<{}>", el.name))?,
            }
        }

        Ok(ExecutableBlock {
            id,
            kind,
            tool,
            parameters,
            instructions,
            result,
            metadata,
        })
    }

    fn tool_block(&self, el: &Element, id: String, ids: Ids) -> Result<ToolBlock, ParseError> {
        let mut description = String::new();
        let mut definition = Vec::new();
        let mut inline: Vec<&Node> = Vec::new();

        for node in &el.children {
            match node {
                Node::Element(child) if child.name == TOOL_DESCRIPTION => {
                    self.validate(child)?;
                    description = child.text();
                }
                Node::Element(child) if child.name == TOOL_DEFINITION => {
                    self.validate(child)?;
                    definition = self.blocks(&child.children, ids)?;
                }
                other => inline.push(other),
            }
        }

        if walk(&definition).any(|b| matches!(b, Block::Tool(_))) {
            return Err(ParseError::new(
                ParseErrorCode::NestedTool,
                "tools cannot contain other tools",
            )
            .with_details(json!({ "tool": id })));
        }

        Ok(ToolBlock {
            id,
            content: self.rich(inline)?,
            description,
            definition,
            props: props_without(el, &["id"]),
        })
    }

    // ---------------------------------------------------------------------
    // Rich content
    // ---------------------------------------------------------------------

    fn rich<'n>(&self, nodes: impl IntoIterator<Item = &'n Node>) -> Result<Vec<RichContent>, ParseError> {
        let mut out = Vec::new();
        for node in nodes {
            match node {
                Node::Text(text) => {
                    // Indentation between elements, not content.
                    if text.contains('\n') && text.trim().is_empty() {
                        continue;
                    }
                    out.push(RichContent::text(text.clone()));
                }
                Node::CData(text) => out.push(RichContent::text(text.clone())),
                Node::Element(el) => self.inline(el, &mut out)?,
            }
        }
        Ok(out)
    }

    fn inline(&self, el: &Element, out: &mut Vec<RichContent>) -> Result<(), ParseError> {
        let ast_type = match self.grammar.schema(&el.name) {
            Some(schema) if self.grammar.is_inline_element(&el.name) => schema.ast_type.as_str(),
            _ => return self.skip_unknown(el, "rich content"),
        };
        self.validate(el)?;

        if let Some(style) = text_style(ast_type) {
            for mut item in self.rich(&el.children)? {
                add_style(&mut item, style);
                out.push(item);
            }
            return Ok(());
        }

        let item = match ast_type {
            "mention" => {
                let mention_type = el
                    .name
                    .strip_prefix("mention:")
                    .and_then(MentionType::parse)
                    .unwrap_or(MentionType::Custom);
                let body = el.text();
                let label = if body.trim().is_empty() {
                    el.attr("label").map(str::to_string)
                } else {
                    Some(body)
                };
                RichContent::Mention {
                    mention_type,
                    id: required_attr(el, "id")?,
                    label,
                }
            }
            "variable" => RichContent::Variable {
                name: required_attr(el, "name")?,
                prompt: el.attr("prompt").map(str::to_string),
                value: el.attr("value").map(str::to_string),
                resolved_value: el.attr("resolved-value").map(str::to_string),
            },
            "link" => RichContent::Link {
                href: required_attr(el, "href")?,
                content: self.rich(&el.children)?,
            },
            "annotation" => RichContent::Annotation {
                content: self.rich(&el.children)?,
                metadata: el.attributes.clone(),
            },
            "ai_edit_response" => {
                let mut metadata = el.attributes.clone();
                metadata.insert("kind".to_string(), AI_EDIT_RESPONSE.to_string());
                RichContent::Annotation {
                    content: self.rich(&el.children)?,
                    metadata,
                }
            }
            _ => return self.skip_unknown(el, "rich content"),
        };
        out.push(item);
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Diff operations
    // ---------------------------------------------------------------------

    fn operation(&self, el: &Element) -> Result<Option<EditOperation>, ParseError> {
        let ast_type = self.grammar.element_type(&el.name).unwrap_or_default();
        let op = match ast_type {
            "edit_attr" => {
                self.validate(el)?;
                EditOperation::EditAttr {
                    block_id: required_attr(el, "block-id")?,
                    name: required_attr(el, "name")?,
                    value: required_attr(el, "value")?,
                }
            }
            "edit_content" => {
                self.validate(el)?;
                EditOperation::EditContent {
                    block_id: required_attr(el, "block-id")?,
                    content: self.rich(&el.children)?,
                }
            }
            "edit_params" => {
                self.validate(el)?;
                let block_id = required_attr(el, "block-id")?;
                EditOperation::EditParams {
                    params: json_payload(el, &block_id)?,
                    block_id,
                }
            }
            "edit_id" => {
                self.validate(el)?;
                EditOperation::EditId {
                    block_id: required_attr(el, "block-id")?,
                    new_id: required_attr(el, "new-id")?,
                }
            }
            "insert" => {
                self.validate(el)?;
                EditOperation::Insert {
                    position: position(el),
                    blocks: self.blocks(&el.children, Ids::Keep)?,
                }
            }
            "delete" => {
                self.validate(el)?;
                EditOperation::Delete {
                    block_id: required_attr(el, "block-id")?,
                }
            }
            "replace" => {
                self.validate(el)?;
                EditOperation::Replace {
                    block_id: required_attr(el, "block-id")?,
                    blocks: self.blocks(&el.children, Ids::Keep)?,
                }
            }
            "move" => {
                self.validate(el)?;
                EditOperation::Move {
                    selector: selector(el)?,
                    position: position(el),
                }
            }
            _ => {
                if self.options.strict {
                    return Err(ParseError::new(
                        ParseErrorCode::UnknownOperation,
                        format!("unknown diff operation <{}>", el.name),
                    )
                    .with_details(json!({ "element": el.name })));
                }
                warn!(element = %el.name, "skipping unknown diff operation");
                return Ok(None);
            }
        };
        Ok(Some(op))
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    fn validate(&self, el: &Element) -> Result<(), ParseError> {
        let violations = self.grammar.validate_attributes(&el.name, &el.attributes);
        match ParseError::from_violations(&violations) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn content_kind(&self, el: &Element) -> ContentKind {
        self.grammar
            .schema(&el.name)
            .map_or(ContentKind::Rich, |s| s.content)
    }

    fn skip_unknown(&self, el: &Element, context: &str) -> Result<(), ParseError> {
        if self.options.strict {
            return Err(ParseError::new(
                ParseErrorCode::UnknownElement,
                format!("element <{}> is not allowed in {context}", el.name),
            )
            .with_details(json!({ "element": el.name, "context": context })));
        }
        debug!(element = %el.name, context, "skipping unknown element");
        Ok(())
    }
}

/// Metadata marker for annotations read from the `aieditresponse` shorthand.
pub const AI_EDIT_RESPONSE: &str = "ai-edit-response";

fn wrong_root(expected: &str, found: &str) -> ParseError {
    ParseError::new(
        ParseErrorCode::UnknownRoot,
        format!("expected a <{expected}> root, found <{found}>"),
    )
    .with_details(json!({ "element": found, "expected": [expected] }))
}

pub(crate) fn tool_attribute(kind: ExecutableType) -> &'static str {
    match kind {
        ExecutableType::FunctionCall => "idyll-tool",
        ExecutableType::Trigger => "idyll-trigger",
    }
}

pub(crate) fn text_style(ast_type: &str) -> Option<TextStyle> {
    match ast_type {
        "bold" => Some(TextStyle::Bold),
        "italic" => Some(TextStyle::Italic),
        "underline" => Some(TextStyle::Underline),
        "strikethrough" => Some(TextStyle::Strikethrough),
        "code" => Some(TextStyle::Code),
        _ => None,
    }
}

/// Add `style` to every text item, descending into links and annotations.
/// Styles already present keep their (inner) position.
fn add_style(item: &mut RichContent, style: TextStyle) {
    match item {
        RichContent::Text { styles, .. } => {
            if !styles.contains(&style) {
                styles.push(style);
            }
        }
        RichContent::Link { content, .. } | RichContent::Annotation { content, .. } => {
            for inner in content {
                add_style(inner, style);
            }
        }
        RichContent::Mention { .. } | RichContent::Variable { .. } => {}
    }
}

fn heading_level(element: &str) -> Option<u8> {
    let level = element.strip_prefix('h')?.parse::<u8>().ok()?;
    (1..=6).contains(&level).then_some(level)
}

fn props_without(el: &Element, skip: &[&str]) -> Props {
    el.attributes
        .iter()
        .filter(|(k, _)| !skip.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn required_attr(el: &Element, name: &str) -> Result<String, ParseError> {
    el.attr(name).map(str::to_string).ok_or_else(|| {
        ParseError::new(
            ParseErrorCode::MissingAttribute,
            format!("missing required attribute '{name}' on <{}>", el.name),
        )
        .with_details(json!({ "element": el.name, "attribute": name }))
    })
}

/// JSON body of a `params`-like element. An empty body is an empty object.
fn json_payload(el: &Element, block_id: &str) -> Result<Value, ParseError> {
    let text = el.text();
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(trimmed).map_err(|e| {
        ParseError::new(
            ParseErrorCode::InvalidJson,
            format!("invalid JSON in <{}> of block '{block_id}': {e}", el.name),
        )
        .with_details(json!({
            "element": el.name,
            "block_id": block_id,
            "line": e.line(),
            "column": e.column(),
        }))
    })
}

/// Positional attributes exactly as written; exclusivity is checked when the
/// diff is applied.
fn position(el: &Element) -> InsertPosition {
    InsertPosition {
        at_start: el.attr("at-start") == Some("true"),
        at_end: el.attr("at-end") == Some("true"),
        after_block_id: el.attr("after-block-id").map(str::to_string),
        before_block_id: el.attr("before-block-id").map(str::to_string),
    }
}

fn selector(el: &Element) -> Result<Selector, ParseError> {
    let single = el.attr("block-id");
    let list = el.attr("block-ids");
    let from = el.attr("from-block-id");
    let to = el.attr("to-block-id");

    let invalid = |message: &str| {
        ParseError::new(ParseErrorCode::InvalidOperation, message.to_string())
            .with_details(json!({ "element": el.name }))
    };

    let range_given = from.is_some() || to.is_some();
    let given = usize::from(single.is_some()) + usize::from(list.is_some()) + usize::from(range_given);
    if given != 1 {
        return Err(invalid(
            "<move> needs exactly one of block-id, block-ids, or from-block-id with to-block-id",
        ));
    }

    match (single, list, from, to) {
        (Some(id), _, _, _) => Ok(Selector::Block(id.to_string())),
        (_, Some(ids), _, _) => Ok(Selector::Blocks(
            split_id_list(ids).map(str::to_string).collect(),
        )),
        (_, _, Some(from), Some(to)) => Ok(Selector::Range {
            from: from.to_string(),
            to: to.to_string(),
        }),
        _ => Err(invalid("<move> range needs both from-block-id and to-block-id")),
    }
}

/// RFC 3339, or integer milliseconds since the Unix epoch.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, ParseError> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| {
            ParseError::new(
                ParseErrorCode::InvalidTimestamp,
                format!("timestamp '{raw}' is neither RFC 3339 nor epoch milliseconds"),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grammar() -> &'static CompiledGrammar {
        CompiledGrammar::builtin().unwrap()
    }

    fn doc(input: &str) -> Document {
        Parser::new(grammar(), ParseOptions::default())
            .parse_document(input)
            .unwrap()
    }

    fn err(input: &str) -> ParseError {
        parse(input).unwrap_err()
    }

    #[test]
    fn paragraph_with_variable() {
        let d = doc(r#"<document><p>Search for <variable name="topic" prompt="what"/></p></document>"#);
        assert_eq!(d.blocks.len(), 1);
        let Block::Content(p) = &d.blocks[0] else {
            panic!("expected a content block");
        };
        assert_eq!(p.kind, ContentType::Paragraph);
        assert_eq!(
            p.content,
            vec![
                RichContent::text("Search for "),
                RichContent::Variable {
                    name: "topic".into(),
                    prompt: Some("what".into()),
                    value: None,
                    resolved_value: None,
                },
            ]
        );
    }

    #[test]
    fn nested_styles_compose_innermost_first() {
        let d = doc("<document><p id=\"p\"><strong>a<em>b</em></strong></p></document>");
        assert_eq!(
            d.blocks[0].content().unwrap(),
            &[
                RichContent::styled("a", vec![TextStyle::Bold]),
                RichContent::styled("b", vec![TextStyle::Italic, TextStyle::Bold]),
            ]
        );
    }

    #[test]
    fn headings_take_their_level_from_the_element() {
        let d = doc("<document><h3 id=\"h\">Title</h3></document>");
        assert_eq!(d.blocks[0].attributes().get("level").map(String::as_str), Some("3"));
    }

    #[test]
    fn missing_ids_are_minted() {
        let d = doc("<document><p>a</p><p>b</p></document>");
        assert!(d.id.starts_with("doc-"));
        assert!(d.blocks.iter().all(Block::has_id));
        assert_ne!(d.blocks[0].id(), d.blocks[1].id());
    }

    #[test]
    fn empty_document_gets_one_empty_paragraph() {
        let d = doc("<document id=\"d\"/>");
        assert_eq!(d.id, "d");
        assert_eq!(d.blocks.len(), 1);
        assert_eq!(d.blocks[0].content(), Some(&[][..]));
    }

    #[test]
    fn content_blocks_nest_blocks() {
        let d = doc(
            "<document><quote id=\"q\" author=\"x\">Said<p id=\"inner\">more</p></quote></document>",
        );
        let q = &d.blocks[0];
        assert_eq!(q.children().len(), 1);
        assert_eq!(q.children()[0].id(), "inner");
        assert_eq!(q.attributes().get("author").map(String::as_str), Some("x"));
    }

    #[test]
    fn code_is_a_block_and_keeps_raw_text() {
        let d = doc("<document><code id=\"c\" language=\"rust\">fn <b>main</b>() {}</code></document>");
        let Block::Content(c) = &d.blocks[0] else {
            panic!("expected content");
        };
        assert_eq!(c.kind, ContentType::Code);
        assert_eq!(RichContent::plain_text(&c.content), "fn main() {}");
        assert!(c.children.is_empty());
    }

    #[test]
    fn inline_code_inside_a_paragraph_is_a_style() {
        let d = doc(r#"<document><p id="a">Use <code>x</code> now</p></document>"#);
        let Block::Content(p) = &d.blocks[0] else {
            panic!("expected content");
        };
        assert!(p.children.is_empty());
        assert_eq!(
            p.content,
            vec![
                RichContent::text("Use "),
                RichContent::Text {
                    text: "x".to_string(),
                    styles: vec![TextStyle::Code],
                },
                RichContent::text(" now"),
            ]
        );
    }

    #[test]
    fn code_with_attributes_inside_a_quote_stays_a_nested_block() {
        let d = doc(
            r#"<document><quote id="q">Ship it<code id="c" language="sh">make</code></quote></document>"#,
        );
        let Block::Content(q) = &d.blocks[0] else {
            panic!("expected content");
        };
        assert_eq!(RichContent::plain_text(&q.content), "Ship it");
        assert_eq!(q.children.len(), 1);
        assert_eq!(q.children[0].id(), "c");
    }

    #[test]
    fn json_bodies_keep_text_of_nested_elements() {
        let d = doc(
            r#"<document><fncall id="f" idyll-tool="t"><params>{"q": <b>"rust"</b>}</params></fncall></document>"#,
        );
        let Block::Executable(f) = &d.blocks[0] else {
            panic!("expected executable");
        };
        assert_eq!(f.parameters, json!({"q": "rust"}));
    }

    #[test]
    fn function_call_reads_params_instructions_and_result() {
        let d = doc(
            r#"<document>
  <fncall id="f" idyll-tool="web:search" model-id="m1">
    <params><![CDATA[{"q": "rust"}]]></params>
    <content>Find <mention:user id="u1">Ann</mention:user></content>
    <result>not json</result>
  </fncall>
</document>"#,
        );
        let Block::Executable(f) = &d.blocks[0] else {
            panic!("expected executable");
        };
        assert_eq!(f.tool, "web:search");
        assert_eq!(f.parameters, json!({"q": "rust"}));
        assert_eq!(f.model_id(), Some("m1"));
        assert_eq!(f.result, Some(Value::String("not json".into())));
        assert!(matches!(
            &f.instructions[1],
            RichContent::Mention { mention_type: MentionType::User, id, label: Some(l) } if id == "u1" && l == "Ann"
        ));
    }

    #[test]
    fn triggers_default_to_enabled() {
        let d = doc(r#"<document><trigger id="t" idyll-trigger="on_save"/></document>"#);
        let Block::Executable(t) = &d.blocks[0] else {
            panic!("expected executable");
        };
        assert!(t.enabled());
        assert_eq!(t.metadata.get("enabled").map(String::as_str), Some("true"));
        assert_eq!(t.parameters, json!({}));
    }

    #[test]
    fn invalid_params_json_is_an_error() {
        let e = err(r#"<document><fncall id="f" idyll-tool="x"><params>{nope</params></fncall></document>"#);
        assert_eq!(e.code, ParseErrorCode::InvalidJson);
        assert!(e.message.contains("'f'"));
    }

    #[test]
    fn missing_required_attribute_is_reported() {
        let e = err("<document><fncall id=\"f\"/></document>");
        assert_eq!(e.code, ParseErrorCode::MissingAttribute);
    }

    #[test]
    fn pattern_mismatch_is_invalid_attribute() {
        let e = err(r#"<document><fncall id="f" idyll-tool="not a name"/></document>"#);
        assert_eq!(e.code, ParseErrorCode::InvalidAttribute);
    }

    #[test]
    fn tool_definition_cannot_hold_a_tool() {
        let e = err(
            "<document><tool id=\"t\"><tool:definition><tool id=\"inner\"/></tool:definition></tool></document>",
        );
        assert_eq!(e.code, ParseErrorCode::NestedTool);
        assert_eq!(e.message, "tools cannot contain other tools");
    }

    #[test]
    fn tool_reads_description_definition_and_content() {
        let d = doc(
            r#"<document><tool id="t" title="Search">Look things up<tool:description>Searches the web</tool:description><tool:definition><fncall id="f" idyll-tool="web:search"/></tool:definition></tool></document>"#,
        );
        let Block::Tool(t) = &d.blocks[0] else {
            panic!("expected tool");
        };
        assert_eq!(t.description, "Searches the web");
        assert_eq!(t.definition.len(), 1);
        assert_eq!(RichContent::plain_text(&t.content), "Look things up");
        assert_eq!(t.props.get("title").map(String::as_str), Some("Search"));
    }

    #[test]
    fn unknown_root_names_the_element() {
        let e = err("<html/>");
        assert_eq!(e.code, ParseErrorCode::UnknownRoot);
        assert!(e.message.contains("<html>"));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(err("   ").code, ParseErrorCode::EmptyInput);
    }

    #[test]
    fn unknown_elements_are_skipped_unless_strict() {
        let input = "<document><blink>x</blink><p id=\"a\">ok<marquee/></p></document>";
        let d = doc(input);
        assert_eq!(d.blocks.len(), 1);
        assert_eq!(RichContent::plain_text(d.blocks[0].content().unwrap()), "ok");

        let e = Parser::new(grammar(), ParseOptions::strict())
            .parse(input)
            .unwrap_err();
        assert_eq!(e.code, ParseErrorCode::UnknownElement);
    }

    #[test]
    fn diff_operations_parse() {
        let diff = Parser::new(grammar(), ParseOptions::default())
            .parse_diff(
                r#"<diff id="d1" timestamp="2024-05-01T12:00:00Z">
  <insert after-block-id="a"><p>new</p></insert>
  <edit:prop block-id="a" name="color" value="red"/>
  <move block-ids="a, b" at-end="true"/>
  <edit:params block-id="f"><![CDATA[{"k": 1}]]></edit:params>
  <frobnicate block-id="x"/>
</diff>"#,
            )
            .unwrap();

        assert_eq!(diff.id.as_deref(), Some("d1"));
        assert_eq!(diff.timestamp.to_rfc3339(), "2024-05-01T12:00:00+00:00");
        assert_eq!(diff.operations.len(), 4);

        match &diff.operations[0] {
            EditOperation::Insert { position, blocks } => {
                assert_eq!(position, &InsertPosition::after("a"));
                assert!(!blocks[0].has_id(), "ids inside diffs are left for apply");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(&diff.operations[1], EditOperation::EditAttr { value, .. } if value == "red"));
        assert!(matches!(
            &diff.operations[2],
            EditOperation::Move { selector: Selector::Blocks(ids), .. } if ids == &["a", "b"]
        ));
        assert!(matches!(&diff.operations[3], EditOperation::EditParams { params, .. } if params == &json!({"k": 1})));
    }

    #[test]
    fn unknown_operation_fails_in_strict_mode() {
        let e = Parser::new(grammar(), ParseOptions::strict())
            .parse("<diff><frobnicate/></diff>")
            .unwrap_err();
        assert_eq!(e.code, ParseErrorCode::UnknownOperation);
    }

    #[test]
    fn move_needs_exactly_one_selection() {
        let e = err(r#"<diff><move block-id="a" from-block-id="b" to-block-id="c" at-end="true"/></diff>"#);
        assert_eq!(e.code, ParseErrorCode::InvalidOperation);
        let e = err(r#"<diff><move from-block-id="b" at-end="true"/></diff>"#);
        assert_eq!(e.code, ParseErrorCode::InvalidOperation);
    }

    #[test]
    fn timestamps_accept_epoch_millis() {
        let diff = Parser::new(grammar(), ParseOptions::default())
            .parse_diff(r#"<diff timestamp="1700000000000"/>"#)
            .unwrap();
        assert_eq!(diff.timestamp.timestamp_millis(), 1_700_000_000_000);

        assert_eq!(err(r#"<diff timestamp="yesterday"/>"#).code, ParseErrorCode::InvalidTimestamp);
    }

    #[test]
    fn agent_root_keeps_its_attributes() {
        let agent = Parser::new(grammar(), ParseOptions::default())
            .parse_agent(r#"<agent id="a1" name="Helper" model="m"><p>Be brief.</p></agent>"#)
            .unwrap();
        assert_eq!(agent.name.as_deref(), Some("Helper"));
        assert_eq!(agent.model.as_deref(), Some("m"));
        assert_eq!(agent.blocks.len(), 1);
    }

    #[test]
    fn parse_document_rejects_other_roots() {
        let e = Parser::new(grammar(), ParseOptions::default())
            .parse_document("<diff/>")
            .unwrap_err();
        assert_eq!(e.code, ParseErrorCode::UnknownRoot);
    }
}
