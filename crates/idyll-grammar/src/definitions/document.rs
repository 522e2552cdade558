use crate::definitions::{HREF_PATTERN, TOOL_NAME_PATTERN, check_heading_level, flag_attr, id_attr};
use crate::dsl::{AttrSpec, ContentKind, Rule, RuleSet, optional, repeat, terminal};
use crate::error::GrammarError;
use crate::{choice, seq};

const AI_EDIT_STATUS: &[&str] = &["pending", "accepted", "rejected"];

/// Content-document grammar, including the block and rich-content rules the
/// agent and diff grammars reference.
///
/// Where a type has several spellings the preferred one is declared first
/// (`p` before `paragraph`, `strong` before `b`); the serializer relies on it.
pub fn document_rules() -> Result<RuleSet, GrammarError> {
    let mut r = RuleSet::new();

    r.define(
        "document",
        seq![
            terminal(
                "document",
                vec![id_attr(), AttrSpec::optional("version")],
                ContentKind::None
            ),
            repeat("block", 0, None),
        ],
    )?;

    r.define("block", choice!["content-block", "executable-block", "tool-block"])?;
    r.define(
        "content-block",
        choice![
            "paragraph",
            "heading",
            "list-item-block",
            "code",
            "quote",
            "separator",
            "data-block",
        ],
    )?;
    // Content blocks may nest further blocks after (or between) their inline content.
    r.define("block-body", repeat(choice!["rich-inline", "block"], 0, None))?;

    r.define(
        "paragraph",
        seq![
            choice![
                terminal("p", vec![id_attr()], ContentKind::Rich),
                terminal("paragraph", vec![id_attr()], ContentKind::Rich),
            ],
            "block-body",
        ],
    )?;

    let mut headings: Vec<Rule> = ["h1", "h2", "h3", "h4", "h5", "h6"]
        .into_iter()
        .map(|h| terminal(h, heading_attrs(false), ContentKind::Rich))
        .collect();
    headings.push(terminal("heading", heading_attrs(true), ContentKind::Rich));
    r.define("heading", seq![Rule::Choice(headings), "block-body"])?;

    r.define(
        "list-item-block",
        choice![
            seq![
                terminal("bulletlistitem", vec![id_attr()], ContentKind::Rich),
                "block-body"
            ],
            seq![
                terminal("numberedlistitem", vec![id_attr()], ContentKind::Rich),
                "block-body"
            ],
            seq![
                terminal(
                    "checklistitem",
                    vec![id_attr(), flag_attr("checked")],
                    ContentKind::Rich
                ),
                "block-body"
            ],
        ],
    )?;

    r.define(
        "code",
        seq![
            terminal(
                "code",
                vec![
                    id_attr(),
                    AttrSpec::optional("language").matching(r"^[A-Za-z0-9_+#.-]+$"),
                ],
                ContentKind::Text
            ),
            "text",
        ],
    )?;
    r.define(
        "quote",
        seq![
            terminal(
                "quote",
                vec![
                    id_attr(),
                    AttrSpec::optional("author"),
                    AttrSpec::optional("source"),
                ],
                ContentKind::Rich
            ),
            "block-body",
        ],
    )?;
    r.define("separator", terminal("separator", vec![id_attr()], ContentKind::None))?;
    r.define(
        "data-block",
        seq![
            terminal(
                "data",
                vec![id_attr(), AttrSpec::optional("format")],
                ContentKind::Text
            ),
            "text",
        ],
    )?;

    r.define("executable-block", choice!["fncall-block", "trigger-block"])?;
    r.define(
        "fncall-block",
        seq![
            terminal(
                "fncall",
                vec![
                    id_attr(),
                    AttrSpec::required("idyll-tool").matching(TOOL_NAME_PATTERN),
                    AttrSpec::optional("model-id"),
                ],
                ContentKind::None
            ),
            optional("params"),
            optional("instructions"),
            optional("result"),
        ],
    )?;
    r.define(
        "trigger-block",
        seq![
            terminal(
                "trigger",
                vec![
                    id_attr(),
                    AttrSpec::required("idyll-trigger").matching(TOOL_NAME_PATTERN),
                    flag_attr("enabled"),
                    AttrSpec::optional("model-id"),
                ],
                ContentKind::None
            ),
            optional("params"),
            optional("instructions"),
        ],
    )?;
    r.define("params", seq![terminal("params", vec![], ContentKind::Json), "json"])?;
    r.define(
        "instructions",
        seq![terminal("content", vec![], ContentKind::Rich), "rich-content"],
    )?;
    r.define("result", seq![terminal("result", vec![], ContentKind::Json), "json"])?;

    r.define(
        "tool-block",
        seq![
            terminal(
                "tool",
                vec![
                    id_attr(),
                    AttrSpec::optional("title"),
                    AttrSpec::optional("icon"),
                ],
                ContentKind::Rich
            ),
            "rich-content",
            optional("tool-description"),
            optional("tool-definition"),
        ],
    )?;
    r.define(
        "tool-description",
        seq![terminal("tool:description", vec![], ContentKind::Text), "text"],
    )?;
    // Nested tools are rejected by the parser; a content block in the body
    // could still smuggle one in through its own children.
    r.define(
        "tool-definition",
        seq![
            terminal("tool:definition", vec![], ContentKind::None),
            repeat(choice!["content-block", "executable-block"], 0, None),
        ],
    )?;

    define_rich_content(&mut r)?;
    Ok(r)
}

fn heading_attrs(level_required: bool) -> Vec<AttrSpec> {
    let level = if level_required {
        AttrSpec::required("level")
    } else {
        AttrSpec::optional("level")
    };
    vec![id_attr(), level.checked_by("heading-level", check_heading_level)]
}

fn style(element_names: &[&'static str]) -> Rule {
    let heads = element_names
        .iter()
        .map(|&e| terminal(e, vec![], ContentKind::Rich))
        .collect();
    seq![Rule::Choice(heads), "rich-content"]
}

fn mention(element: &'static str) -> Rule {
    terminal(
        element,
        vec![
            AttrSpec::required("id").matching(r"^\S+$"),
            AttrSpec::optional("label"),
        ],
        ContentKind::Text,
    )
}

fn define_rich_content(r: &mut RuleSet) -> Result<(), GrammarError> {
    r.define("rich-content", repeat("rich-inline", 0, None))?;
    r.define(
        "rich-inline",
        choice![
            "text",
            "styled-text",
            "mention",
            "variable",
            "link",
            "annotation",
            "annotated-text",
            "ai-edit-response",
        ],
    )?;

    r.define("text", terminal("#text", vec![], ContentKind::Text))?;
    r.define("json", terminal("#json", vec![], ContentKind::Json))?;

    r.define(
        "styled-text",
        choice![
            "styled-bold",
            "styled-italic",
            "styled-underline",
            "styled-strike",
            "styled-code",
        ],
    )?;
    r.define("styled-bold", style(&["strong", "b"]))?;
    r.define("styled-italic", style(&["em", "i"]))?;
    r.define("styled-underline", style(&["u", "underline"]))?;
    r.define("styled-strike", style(&["s", "strike", "del"]))?;
    r.define("styled-code", style(&["code", "tt"]))?;

    r.define(
        "mention",
        seq![
            choice![
                mention("mention:user"),
                mention("mention:document"),
                mention("mention:agent"),
                mention("mention:custom"),
            ],
            optional("text"),
        ],
    )?;
    r.define(
        "variable",
        terminal(
            "variable",
            vec![
                AttrSpec::required("name").matching(r"^\S+$"),
                AttrSpec::optional("prompt"),
                AttrSpec::optional("value"),
                AttrSpec::optional("resolved-value"),
            ],
            ContentKind::None,
        ),
    )?;
    r.define(
        "link",
        seq![
            terminal(
                "a",
                vec![
                    AttrSpec::required("href").matching(HREF_PATTERN),
                    AttrSpec::optional("title"),
                ],
                ContentKind::Rich
            ),
            "rich-content",
        ],
    )?;
    r.define(
        "annotation",
        seq![terminal("annotation", vec![], ContentKind::Rich), "rich-content"],
    )?;
    // Legacy spellings, read but never written.
    r.define(
        "annotated-text",
        seq![terminal("annotatedtext", vec![], ContentKind::Rich), "rich-content"],
    )?;
    r.define(
        "ai-edit-response",
        seq![
            terminal(
                "aieditresponse",
                vec![AttrSpec::optional("status").one_of(AI_EDIT_STATUS)],
                ContentKind::Rich
            ),
            "rich-content",
        ],
    )?;
    Ok(())
}
