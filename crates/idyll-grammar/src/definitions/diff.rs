use crate::definitions::{block_id_attr, check_id_list, flag_attr, id_attr};
use crate::dsl::{AttrSpec, ContentKind, RuleSet, repeat, terminal};
use crate::error::GrammarError;
use crate::{choice, seq};

/// Diff grammar: a `<diff>` root holding ordered edit operations.
///
/// The attribute edit is spelled `edit:attr`; `edit:prop` is accepted as a
/// legacy alias and maps to the same AST type.
pub fn diff_rules() -> Result<RuleSet, GrammarError> {
    let mut r = RuleSet::new();
    r.define(
        "diff",
        seq![
            terminal(
                "diff",
                vec![id_attr(), AttrSpec::optional("timestamp")],
                ContentKind::None
            ),
            repeat("diff-operation", 0, None),
        ],
    )?;
    r.define(
        "diff-operation",
        choice![
            "edit-attr",
            "edit-content",
            "edit-params",
            "edit-id",
            "insert-op",
            "delete-op",
            "replace-op",
            "move-op",
        ],
    )?;

    r.define(
        "edit-attr",
        choice![
            terminal("edit:attr", edit_attr_attrs(), ContentKind::None),
            terminal("edit:prop", edit_attr_attrs(), ContentKind::None),
        ],
    )?;
    r.define(
        "edit-content",
        seq![
            terminal("edit:content", vec![block_id_attr("block-id")], ContentKind::Rich),
            "rich-content",
        ],
    )?;
    r.define(
        "edit-params",
        seq![
            terminal("edit:params", vec![block_id_attr("block-id")], ContentKind::Json),
            "json",
        ],
    )?;
    r.define(
        "edit-id",
        terminal(
            "edit:id",
            vec![block_id_attr("block-id"), block_id_attr("new-id")],
            ContentKind::None,
        ),
    )?;
    r.define(
        "insert-op",
        seq![
            terminal("insert", anchor_attrs(), ContentKind::None),
            repeat("block", 1, None),
        ],
    )?;
    r.define(
        "delete-op",
        terminal("delete", vec![block_id_attr("block-id")], ContentKind::None),
    )?;
    r.define(
        "replace-op",
        seq![
            terminal("replace", vec![block_id_attr("block-id")], ContentKind::None),
            repeat("block", 1, None),
        ],
    )?;

    let mut move_attrs = vec![
        AttrSpec::optional("block-id").matching(r"^\S+$"),
        AttrSpec::optional("block-ids").checked_by("id-list", check_id_list),
        AttrSpec::optional("from-block-id").matching(r"^\S+$"),
        AttrSpec::optional("to-block-id").matching(r"^\S+$"),
    ];
    move_attrs.extend(anchor_attrs());
    r.define("move-op", terminal("move", move_attrs, ContentKind::None))?;

    Ok(r)
}

fn edit_attr_attrs() -> Vec<AttrSpec> {
    vec![
        block_id_attr("block-id"),
        AttrSpec::required("name").matching(r"^[A-Za-z_][A-Za-z0-9_:.-]*$"),
        AttrSpec::required("value"),
    ]
}

fn anchor_attrs() -> Vec<AttrSpec> {
    vec![
        AttrSpec::optional("after-block-id").matching(r"^\S+$"),
        AttrSpec::optional("before-block-id").matching(r"^\S+$"),
        flag_attr("at-start"),
        flag_attr("at-end"),
    ]
}
