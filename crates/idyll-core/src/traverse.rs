//! Depth-first traversal helpers over block trees.
//!
//! Block executors and prompt builders only ever read the AST; these helpers
//! are the supported way to walk it.

use std::collections::HashMap;

use crate::model::{Block, BlockId, ExecutableBlock, MentionType, RichContent};

/// Lazy pre-order iterator over a block forest.
///
/// Visits content children and tool definition bodies. Calling [`walk`]
/// again restarts from the top.
pub struct Blocks<'a> {
    stack: Vec<std::slice::Iter<'a, Block>>,
}

impl<'a> Iterator for Blocks<'a> {
    type Item = &'a Block;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            match top.next() {
                Some(block) => {
                    let children = block.children();
                    if !children.is_empty() {
                        self.stack.push(children.iter());
                    }
                    return Some(block);
                }
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

pub fn walk(blocks: &[Block]) -> Blocks<'_> {
    Blocks {
        stack: vec![blocks.iter()],
    }
}

/// First block with the given id, in pre-order.
pub fn find_block<'a>(blocks: &'a [Block], id: &str) -> Option<&'a Block> {
    walk(blocks).find(|b| b.id() == id)
}

pub fn executable_blocks(blocks: &[Block]) -> impl Iterator<Item = &ExecutableBlock> {
    walk(blocks).filter_map(|b| match b {
        Block::Executable(e) => Some(e),
        _ => None,
    })
}

/// A mention found somewhere in a block tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MentionRef<'a> {
    pub block_id: &'a str,
    pub mention_type: MentionType,
    pub id: &'a str,
    pub label: Option<&'a str>,
}

/// A variable found somewhere in a block tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableRef<'a> {
    pub block_id: &'a str,
    pub name: &'a str,
    pub prompt: Option<&'a str>,
    pub value: Option<&'a str>,
}

/// Every rich content sequence owned by a block (content and instructions).
fn rich_slots(block: &Block) -> &[RichContent] {
    match block {
        Block::Content(b) => &b.content,
        Block::Tool(b) => &b.content,
        Block::Executable(b) => &b.instructions,
    }
}

fn walk_rich<'a>(items: &'a [RichContent], visit: &mut dyn FnMut(&'a RichContent)) {
    for item in items {
        visit(item);
        if let RichContent::Link { content, .. } | RichContent::Annotation { content, .. } = item {
            walk_rich(content, visit);
        }
    }
}

pub fn mentions(blocks: &[Block]) -> Vec<MentionRef<'_>> {
    let mut out = Vec::new();
    for block in walk(blocks) {
        let block_id = block.id();
        walk_rich(rich_slots(block), &mut |item| {
            if let RichContent::Mention {
                mention_type,
                id,
                label,
            } = item
            {
                out.push(MentionRef {
                    block_id,
                    mention_type: *mention_type,
                    id,
                    label: label.as_deref(),
                });
            }
        });
    }
    out
}

pub fn variables(blocks: &[Block]) -> Vec<VariableRef<'_>> {
    let mut out = Vec::new();
    for block in walk(blocks) {
        let block_id = block.id();
        walk_rich(rich_slots(block), &mut |item| {
            if let RichContent::Variable {
                name,
                prompt,
                value,
                ..
            } = item
            {
                out.push(VariableRef {
                    block_id,
                    name,
                    prompt: prompt.as_deref(),
                    value: value.as_deref(),
                });
            }
        });
    }
    out
}

/// Ids that occur more than once, in first-seen order. Empty ids are ignored.
pub fn duplicate_ids(blocks: &[Block]) -> Vec<BlockId> {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut dupes = Vec::new();
    for block in walk(blocks) {
        let id = block.id();
        if id.is_empty() {
            continue;
        }
        let count = seen.entry(id).or_insert(0);
        *count += 1;
        if *count == 2 {
            dupes.push(id.to_string());
        }
    }
    dupes
}

/// Maximum nesting depth of a block forest (a flat list has depth 1).
pub fn max_depth(blocks: &[Block]) -> usize {
    blocks
        .iter()
        .map(|b| 1 + max_depth(b.children()))
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContentBlock, ContentType, ExecutableType, ToolBlock};
    use serde_json::json;

    fn para(id: &str, text: &str) -> Block {
        ContentBlock::paragraph(id, text).into()
    }

    fn sample() -> Vec<Block> {
        let mut quote = ContentBlock::new(
            "q",
            ContentType::Quote,
            vec![RichContent::Link {
                href: "https://example.com".to_string(),
                content: vec![RichContent::Mention {
                    mention_type: MentionType::User,
                    id: "u1".to_string(),
                    label: Some("Ada".to_string()),
                }],
            }],
        );
        quote.children.push(para("q1", "inner"));

        let call = ExecutableBlock {
            id: "f".to_string(),
            kind: ExecutableType::FunctionCall,
            tool: "web:search".to_string(),
            parameters: json!({}),
            instructions: vec![RichContent::variable("topic")],
            result: None,
            metadata: Default::default(),
        };

        let tool = ToolBlock {
            id: "t".to_string(),
            content: Vec::new(),
            description: "d".to_string(),
            definition: vec![call.into()],
            props: Default::default(),
        };

        vec![para("a", "first"), quote.into(), tool.into()]
    }

    #[test]
    fn walk_is_preorder_and_restartable() {
        let blocks = sample();
        let ids: Vec<&str> = walk(&blocks).map(|b| b.id()).collect();
        assert_eq!(ids, vec!["a", "q", "q1", "t", "f"]);
        assert_eq!(walk(&blocks).count(), 5);
    }

    #[test]
    fn finds_nested_blocks_and_executables() {
        let blocks = sample();
        assert_eq!(find_block(&blocks, "q1").map(|b| b.id()), Some("q1"));
        assert!(find_block(&blocks, "missing").is_none());

        let tools: Vec<&str> = executable_blocks(&blocks).map(|e| e.tool.as_str()).collect();
        assert_eq!(tools, vec!["web:search"]);
    }

    #[test]
    fn extracts_mentions_inside_links_and_variables_in_instructions() {
        let blocks = sample();
        let m = mentions(&blocks);
        assert_eq!(m.len(), 1);
        assert_eq!(m[0].block_id, "q");
        assert_eq!(m[0].label, Some("Ada"));

        let v = variables(&blocks);
        assert_eq!(v.len(), 1);
        assert_eq!(v[0].block_id, "f");
        assert_eq!(v[0].name, "topic");
    }

    #[test]
    fn first_match_wins_for_duplicate_ids() {
        let blocks = vec![para("x", "one"), para("x", "two")];
        let found = find_block(&blocks, "x").expect("x exists");
        assert_eq!(found.content().map(RichContent::plain_text).as_deref(), Some("one"));
        assert_eq!(duplicate_ids(&blocks), vec!["x".to_string()]);
    }

    #[test]
    fn depth_counts_levels() {
        assert_eq!(max_depth(&[]), 0);
        assert_eq!(max_depth(&sample()), 2);
    }
}
