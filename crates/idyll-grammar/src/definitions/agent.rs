use crate::definitions::id_attr;
use crate::dsl::{AttrSpec, ContentKind, RuleSet, repeat, terminal};
use crate::error::GrammarError;
use crate::seq;

/// Agent-prompt grammar: an `<agent>` root holding ordinary blocks.
///
/// Shares `block` with the document grammar by reference.
pub fn agent_rules() -> Result<RuleSet, GrammarError> {
    let mut r = RuleSet::new();
    r.define(
        "agent",
        seq![
            terminal(
                "agent",
                vec![
                    id_attr(),
                    AttrSpec::optional("name"),
                    AttrSpec::optional("description"),
                    AttrSpec::optional("model"),
                ],
                ContentKind::None
            ),
            repeat("block", 0, None),
        ],
    )?;
    Ok(r)
}
