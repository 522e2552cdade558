//! Grammar combinators.
//!
//! Pure data constructors: nothing here does anything beyond building the
//! rule graph. A rule for an element is written as a sequence whose head is
//! the element's [`terminal`] and whose tail describes what may appear inside.

use std::collections::HashMap;

use crate::error::GrammarError;

/// What a terminal's body may contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    None,
    Text,
    Json,
    Rich,
}

/// Signature of a custom attribute check.
pub type CustomCheck = fn(&str) -> Result<(), String>;

/// A named custom attribute check. Compared by name.
#[derive(Clone, Copy)]
pub struct Validator {
    pub name: &'static str,
    pub check: CustomCheck,
}

impl PartialEq for Validator {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Validator {}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validator({})", self.name)
    }
}

/// Schema entry for one attribute of an element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSpec {
    pub name: &'static str,
    pub required: bool,
    pub allowed: Option<&'static [&'static str]>,
    pub pattern: Option<&'static str>,
    pub validator: Option<Validator>,
}

impl AttrSpec {
    pub fn optional(name: &'static str) -> Self {
        Self {
            name,
            required: false,
            allowed: None,
            pattern: None,
            validator: None,
        }
    }

    pub fn required(name: &'static str) -> Self {
        Self {
            required: true,
            ..Self::optional(name)
        }
    }

    pub fn one_of(self, allowed: &'static [&'static str]) -> Self {
        Self {
            allowed: Some(allowed),
            ..self
        }
    }

    pub fn matching(self, pattern: &'static str) -> Self {
        Self {
            pattern: Some(pattern),
            ..self
        }
    }

    pub fn checked_by(self, name: &'static str, check: CustomCheck) -> Self {
        Self {
            validator: Some(Validator { name, check }),
            ..self
        }
    }
}

/// A node of the grammar rule graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Terminal {
        element: &'static str,
        attributes: Vec<AttrSpec>,
        content: ContentKind,
    },
    Sequence(Vec<Rule>),
    Choice(Vec<Rule>),
    Repeat {
        rule: Box<Rule>,
        min: usize,
        max: Option<usize>,
    },
    Optional(Box<Rule>),
    Ref(&'static str),
}

/// Bare rule names are references.
impl From<&'static str> for Rule {
    fn from(name: &'static str) -> Self {
        Rule::Ref(name)
    }
}

/// Elements whose name starts with this marker are raw text/JSON leaves.
pub const PSEUDO_ELEMENT_MARKER: char = '#';

pub fn is_pseudo_element(element: &str) -> bool {
    element.starts_with(PSEUDO_ELEMENT_MARKER)
}

pub fn terminal(element: &'static str, attributes: Vec<AttrSpec>, content: ContentKind) -> Rule {
    Rule::Terminal {
        element,
        attributes,
        content,
    }
}

pub fn reference(name: &'static str) -> Rule {
    Rule::Ref(name)
}

pub fn repeat(rule: impl Into<Rule>, min: usize, max: Option<usize>) -> Rule {
    Rule::Repeat {
        rule: Box::new(rule.into()),
        min,
        max,
    }
}

pub fn optional(rule: impl Into<Rule>) -> Rule {
    Rule::Optional(Box::new(rule.into()))
}

/// `seq![a, "name", c]`: a sequence; string literals become references.
#[macro_export]
macro_rules! seq {
    ($($rule:expr),* $(,)?) => {
        $crate::dsl::Rule::Sequence(vec![$($crate::dsl::Rule::from($rule)),*])
    };
}

/// `choice![a, "name", c]`: an alternative; string literals become references.
#[macro_export]
macro_rules! choice {
    ($($rule:expr),* $(,)?) => {
        $crate::dsl::Rule::Choice(vec![$($crate::dsl::Rule::from($rule)),*])
    };
}

/// Named rules, kept in definition order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<(&'static str, Rule)>,
    index: HashMap<&'static str, usize>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a named rule. Redefining a name is an error, never an overwrite.
    pub fn define(&mut self, name: &'static str, rule: Rule) -> Result<(), GrammarError> {
        if self.index.contains_key(name) {
            return Err(GrammarError::DuplicateRule(name.to_string()));
        }
        self.index.insert(name, self.rules.len());
        self.rules.push((name, rule));
        Ok(())
    }

    /// Union of two rule sets; any shared name is a collision.
    pub fn merge(&mut self, other: RuleSet) -> Result<(), GrammarError> {
        for (name, rule) in other.rules {
            self.define(name, rule)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Rule> {
        self.index.get(name).map(|&i| &self.rules[i].1)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Rule)> {
        self.rules.iter().map(|(n, r)| (*n, r))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_names_become_references() {
        let rule = seq![terminal("p", vec![], ContentKind::Rich), "rich-content"];
        match rule {
            Rule::Sequence(items) => {
                assert_eq!(items.len(), 2);
                assert_eq!(items[1], Rule::Ref("rich-content"));
            }
            other => panic!("expected sequence, got {other:?}"),
        }
    }

    #[test]
    fn redefining_a_rule_is_rejected() {
        let mut rules = RuleSet::new();
        rules.define("a", reference("b")).unwrap();
        let err = rules.define("a", reference("c")).unwrap_err();
        assert_eq!(err, GrammarError::DuplicateRule("a".to_string()));
        assert_eq!(rules.get("a"), Some(&Rule::Ref("b")));
    }

    #[test]
    fn merge_rejects_collisions_across_sets() {
        let mut left = RuleSet::new();
        left.define("shared", reference("x")).unwrap();
        let mut right = RuleSet::new();
        right.define("other", reference("y")).unwrap();
        right.define("shared", reference("z")).unwrap();

        assert!(left.merge(right).is_err());
    }

    #[test]
    fn pseudo_elements_use_the_marker() {
        assert!(is_pseudo_element("#text"));
        assert!(!is_pseudo_element("text"));
    }
}
