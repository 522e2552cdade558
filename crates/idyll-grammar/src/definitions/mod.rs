//! The built-in grammars: content documents, agent prompts and diffs.
//!
//! Each schema is its own rule set; [`builtin_rules`] unions them under a
//! single `root` rule. Rule names must be unique across the union.

mod agent;
mod diff;
mod document;

use crate::choice;
use crate::dsl::{AttrSpec, RuleSet};
use crate::error::GrammarError;

pub use agent::agent_rules;
pub use diff::diff_rules;
pub use document::document_rules;

/// `(module:)?name` with identifier-safe segments.
pub const TOOL_NAME_PATTERN: &str = r"^(?:[A-Za-z_][A-Za-z0-9_-]*:)?[A-Za-z_][A-Za-z0-9_-]*$";

/// `http://` or `https://` followed by at least one non-space character.
pub const HREF_PATTERN: &str = r"^https?://\S+$";

pub const BOOLEAN_VALUES: &[&str] = &["true", "false"];

/// The merged grammar: `root = choice(document, agent, diff)`.
pub fn builtin_rules() -> Result<RuleSet, GrammarError> {
    let mut rules = RuleSet::new();
    rules.define("root", choice!["document", "agent", "diff"])?;
    rules.merge(document_rules()?)?;
    rules.merge(agent_rules()?)?;
    rules.merge(diff_rules()?)?;
    Ok(rules)
}

/// Optional block `id`: any non-empty token without whitespace.
pub(crate) fn id_attr() -> AttrSpec {
    AttrSpec::optional("id").matching(r"^\S+$")
}

pub(crate) fn block_id_attr(name: &'static str) -> AttrSpec {
    AttrSpec::required(name).matching(r"^\S+$")
}

pub(crate) fn flag_attr(name: &'static str) -> AttrSpec {
    AttrSpec::optional(name).one_of(BOOLEAN_VALUES)
}

pub(crate) fn check_heading_level(value: &str) -> Result<(), String> {
    match value.parse::<u8>() {
        Ok(1..=6) => Ok(()),
        _ => Err(format!("heading level must be between 1 and 6, got '{value}'")),
    }
}

/// Comma and/or whitespace separated list of at least one id.
pub(crate) fn check_id_list(value: &str) -> Result<(), String> {
    if split_id_list(value).next().is_none() {
        return Err("expected at least one block id".to_string());
    }
    Ok(())
}

/// Split a `block-ids` attribute value into ids.
pub fn split_id_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_rules_assemble_without_collisions() {
        let rules = builtin_rules().expect("built-in grammar must assemble");
        for name in ["root", "document", "agent", "diff", "block", "rich-content"] {
            assert!(rules.contains(name), "missing rule {name}");
        }
    }

    #[test]
    fn schemas_do_not_share_rule_names() {
        let doc = document_rules().unwrap();
        let agent = agent_rules().unwrap();
        let diff = diff_rules().unwrap();
        for (name, _) in agent.iter().chain(diff.iter()) {
            assert!(!doc.contains(name), "rule {name} collides with the document grammar");
        }
        for (name, _) in diff.iter() {
            assert!(!agent.contains(name), "rule {name} collides with the agent grammar");
        }
    }

    #[test]
    fn id_lists_split_on_commas_and_spaces() {
        let ids: Vec<&str> = split_id_list("a, b  c,,d").collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert!(check_id_list(" , ").is_err());
    }

    #[test]
    fn heading_levels_are_bounded() {
        assert!(check_heading_level("1").is_ok());
        assert!(check_heading_level("6").is_ok());
        assert!(check_heading_level("7").is_err());
        assert!(check_heading_level("x").is_err());
    }
}
