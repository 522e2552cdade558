use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ops::EditOperation;

/// A stable identifier for a block.
///
/// An empty id means "not assigned yet"; the diff engine mints one on insert.
pub type BlockId = String;

/// Free-form element attributes carried by a block.
pub type Props = BTreeMap<String, String>;

/// Kinds of ordinary content blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Paragraph,
    Heading,
    BulletListItem,
    NumberedListItem,
    ChecklistItem,
    Code,
    Quote,
    Separator,
    Data,
}

/// Kinds of executable blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutableType {
    FunctionCall,
    Trigger,
}

/// The closed set of block types, as named by the compiled grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    Content(ContentType),
    Executable(ExecutableType),
    Tool,
}

impl ContentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ContentType::Paragraph => "paragraph",
            ContentType::Heading => "heading",
            ContentType::BulletListItem => "bullet_list_item",
            ContentType::NumberedListItem => "numbered_list_item",
            ContentType::ChecklistItem => "checklist_item",
            ContentType::Code => "code",
            ContentType::Quote => "quote",
            ContentType::Separator => "separator",
            ContentType::Data => "data",
        }
    }
}

impl ExecutableType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ExecutableType::FunctionCall => "function_call",
            ExecutableType::Trigger => "trigger",
        }
    }
}

impl BlockType {
    pub const ALL: [BlockType; 12] = [
        BlockType::Content(ContentType::Paragraph),
        BlockType::Content(ContentType::Heading),
        BlockType::Content(ContentType::BulletListItem),
        BlockType::Content(ContentType::NumberedListItem),
        BlockType::Content(ContentType::ChecklistItem),
        BlockType::Content(ContentType::Code),
        BlockType::Content(ContentType::Quote),
        BlockType::Content(ContentType::Separator),
        BlockType::Content(ContentType::Data),
        BlockType::Executable(ExecutableType::FunctionCall),
        BlockType::Executable(ExecutableType::Trigger),
        BlockType::Tool,
    ];

    /// The AST type name used by the compiled grammar.
    pub const fn as_str(self) -> &'static str {
        match self {
            BlockType::Content(c) => c.as_str(),
            BlockType::Executable(e) => e.as_str(),
            BlockType::Tool => "tool",
        }
    }

    /// Resolve an AST type name back into a block type.
    ///
    /// Returns `None` for inline, diff and root types.
    pub fn from_ast_type(ast_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == ast_type)
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A node of the document tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum Block {
    Content(ContentBlock),
    Executable(ExecutableBlock),
    Tool(ToolBlock),
}

/// Paragraphs, headings, list items, code, quotes, separators and data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub kind: ContentType,
    #[serde(default)]
    pub content: Vec<RichContent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Block>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: Props,
}

/// A function call or trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutableBlock {
    pub id: BlockId,
    #[serde(rename = "type")]
    pub kind: ExecutableType,
    /// `(module:)?name`
    pub tool: String,
    #[serde(default)]
    pub parameters: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub instructions: Vec<RichContent>,
    /// Only ever set on function calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Props,
}

/// A custom capability definition. Its definition body never holds another tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolBlock {
    pub id: BlockId,
    #[serde(default)]
    pub content: Vec<RichContent>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub definition: Vec<Block>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: Props,
}

impl ContentBlock {
    pub fn new(id: impl Into<BlockId>, kind: ContentType, content: Vec<RichContent>) -> Self {
        Self {
            id: id.into(),
            kind,
            content,
            children: Vec::new(),
            props: Props::new(),
        }
    }

    pub fn paragraph(id: impl Into<BlockId>, text: &str) -> Self {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![RichContent::text(text)]
        };
        Self::new(id, ContentType::Paragraph, content)
    }
}

impl ExecutableBlock {
    /// Triggers are enabled unless explicitly disabled.
    pub fn enabled(&self) -> bool {
        self.metadata.get("enabled").is_none_or(|v| v != "false")
    }

    pub fn model_id(&self) -> Option<&str> {
        self.metadata.get("model-id").map(String::as_str)
    }
}

impl Block {
    pub fn id(&self) -> &str {
        match self {
            Block::Content(b) => &b.id,
            Block::Executable(b) => &b.id,
            Block::Tool(b) => &b.id,
        }
    }

    pub fn set_id(&mut self, id: impl Into<BlockId>) {
        let id = id.into();
        match self {
            Block::Content(b) => b.id = id,
            Block::Executable(b) => b.id = id,
            Block::Tool(b) => b.id = id,
        }
    }

    pub fn has_id(&self) -> bool {
        !self.id().is_empty()
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Content(b) => BlockType::Content(b.kind),
            Block::Executable(b) => BlockType::Executable(b.kind),
            Block::Tool(_) => BlockType::Tool,
        }
    }

    /// Nested blocks: content children or a tool's definition body.
    pub fn children(&self) -> &[Block] {
        match self {
            Block::Content(b) => &b.children,
            Block::Tool(b) => &b.definition,
            Block::Executable(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Block>> {
        match self {
            Block::Content(b) => Some(&mut b.children),
            Block::Tool(b) => Some(&mut b.definition),
            Block::Executable(_) => None,
        }
    }

    /// The rich content slot, if this kind of block has one.
    pub fn content(&self) -> Option<&[RichContent]> {
        match self {
            Block::Content(b) => Some(&b.content),
            Block::Tool(b) => Some(&b.content),
            Block::Executable(_) => None,
        }
    }

    /// Attribute map: `props` for content and tool blocks, `metadata` for executables.
    pub fn attributes(&self) -> &Props {
        match self {
            Block::Content(b) => &b.props,
            Block::Executable(b) => &b.metadata,
            Block::Tool(b) => &b.props,
        }
    }

    pub fn attributes_mut(&mut self) -> &mut Props {
        match self {
            Block::Content(b) => &mut b.props,
            Block::Executable(b) => &mut b.metadata,
            Block::Tool(b) => &mut b.props,
        }
    }
}

impl From<ContentBlock> for Block {
    fn from(b: ContentBlock) -> Self {
        Block::Content(b)
    }
}

impl From<ExecutableBlock> for Block {
    fn from(b: ExecutableBlock) -> Self {
        Block::Executable(b)
    }
}

impl From<ToolBlock> for Block {
    fn from(b: ToolBlock) -> Self {
        Block::Tool(b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextStyle {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Code,
}

impl TextStyle {
    /// The AST type the grammar assigns to this style's wrapper elements.
    pub const fn as_str(self) -> &'static str {
        match self {
            TextStyle::Bold => "bold",
            TextStyle::Italic => "italic",
            TextStyle::Underline => "underline",
            TextStyle::Strikethrough => "strikethrough",
            TextStyle::Code => "code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionType {
    User,
    Document,
    Agent,
    Custom,
}

impl MentionType {
    pub const fn as_str(self) -> &'static str {
        match self {
            MentionType::User => "user",
            MentionType::Document => "document",
            MentionType::Agent => "agent",
            MentionType::Custom => "custom",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MentionType::User),
            "document" => Some(MentionType::Document),
            "agent" => Some(MentionType::Agent),
            "custom" => Some(MentionType::Custom),
            _ => None,
        }
    }
}

/// One inline item of rich content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichContent {
    Text {
        text: String,
        /// Innermost wrapper first.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        styles: Vec<TextStyle>,
    },
    Mention {
        mention_type: MentionType,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    Variable {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prompt: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resolved_value: Option<String>,
    },
    Link {
        href: String,
        content: Vec<RichContent>,
    },
    Annotation {
        content: Vec<RichContent>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        metadata: Props,
    },
}

impl RichContent {
    pub fn text(text: impl Into<String>) -> Self {
        RichContent::Text {
            text: text.into(),
            styles: Vec::new(),
        }
    }

    pub fn styled(text: impl Into<String>, styles: Vec<TextStyle>) -> Self {
        RichContent::Text {
            text: text.into(),
            styles,
        }
    }

    pub fn variable(name: impl Into<String>) -> Self {
        RichContent::Variable {
            name: name.into(),
            prompt: None,
            value: None,
            resolved_value: None,
        }
    }

    /// Concatenated visible text of a rich content sequence.
    ///
    /// Mentions contribute their label (or `@id`), variables their resolved
    /// value when known, otherwise `{name}`.
    pub fn plain_text(items: &[RichContent]) -> String {
        let mut out = String::new();
        push_plain_text(items, &mut out);
        out
    }
}

fn push_plain_text(items: &[RichContent], out: &mut String) {
    for item in items {
        match item {
            RichContent::Text { text, .. } => out.push_str(text),
            RichContent::Mention { id, label, .. } => match label {
                Some(l) => out.push_str(l),
                None => {
                    out.push('@');
                    out.push_str(id);
                }
            },
            RichContent::Variable {
                name,
                resolved_value,
                ..
            } => match resolved_value {
                Some(v) => out.push_str(v),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
            RichContent::Link { content, .. } | RichContent::Annotation { content, .. } => {
                push_plain_text(content, out)
            }
        }
    }
}

/// A content document (`<document>` root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub blocks: Vec<Block>,
}

/// An agent prompt document (`<agent>` root).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDocument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub blocks: Vec<Block>,
}

/// A transformation document (`<diff>` root): an ordered list of edits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub operations: Vec<EditOperation>,
}

/// Any of the three root document kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParsedDocument {
    Document(Document),
    Agent(AgentDocument),
    Diff(DiffDocument),
}

impl ParsedDocument {
    pub const fn root_element(&self) -> &'static str {
        match self {
            ParsedDocument::Document(_) => "document",
            ParsedDocument::Agent(_) => "agent",
            ParsedDocument::Diff(_) => "diff",
        }
    }

    /// Blocks of a document or agent; `None` for diffs.
    pub fn blocks(&self) -> Option<&[Block]> {
        match self {
            ParsedDocument::Document(d) => Some(&d.blocks),
            ParsedDocument::Agent(a) => Some(&a.blocks),
            ParsedDocument::Diff(_) => None,
        }
    }
}
