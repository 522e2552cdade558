use std::collections::HashSet;

use tracing::{debug, trace};

use idyll_core::ids::assign_missing_ids;
use idyll_core::traverse::{find_block, walk};
use idyll_core::{Anchor, Block, EditOperation, InsertPosition, RichContent, Selector};

use crate::diagnostics::{DiffError, DiffErrorCode};

/// Apply `operations` in order against `blocks` and return the new tree.
///
/// Deterministic semantics:
/// - each operation sees the result of the previous one
/// - block ids address the first match in pre-order (document order)
/// - `after`/`before` anchors resolve against the top-level list only
/// - inserted and replacement blocks without an id get a fresh one
/// - ids stay unique across the tree and no tool ends up inside a tool
///
/// The input is never modified. On failure nothing is returned but the
/// error, which names the index of the failing operation.
pub fn apply(blocks: &[Block], operations: &[EditOperation]) -> Result<Vec<Block>, DiffError> {
    let mut tree = blocks.to_vec();

    for (i, op) in operations.iter().enumerate() {
        if let Err(e) = apply_operation(&mut tree, op) {
            let e = e.at(i, op.name());
            debug!(op_index = i, op = op.name(), code = e.code.as_str(), "diff operation failed");
            return Err(e);
        }
        trace!(op_index = i, op = op.name(), blocks = tree.len(), "applied diff operation");
    }

    Ok(tree)
}

fn apply_operation(tree: &mut Vec<Block>, op: &EditOperation) -> Result<(), DiffError> {
    match op {
        EditOperation::EditAttr {
            block_id,
            name,
            value,
        } => {
            let block = block_mut(tree, block_id)?;
            block.attributes_mut().insert(name.clone(), value.clone());
        }

        EditOperation::EditContent { block_id, content } => {
            let block = block_mut(tree, block_id)?;
            set_content(block, content)?;
        }

        EditOperation::EditParams { block_id, params } => match block_mut(tree, block_id)? {
            Block::Executable(b) => b.parameters = params.clone(),
            _ => {
                return Err(DiffError::new(
                    DiffErrorCode::NotExecutable,
                    Some(block_id.as_str()),
                    format!("block '{block_id}' is not executable and has no parameters"),
                ));
            }
        },

        EditOperation::EditId { block_id, new_id } => {
            if new_id.trim().is_empty() {
                return Err(DiffError::new(
                    DiffErrorCode::InvalidBlockId,
                    Some(block_id.as_str()),
                    "new id must not be empty",
                ));
            }
            if new_id != block_id && find_block(tree, new_id).is_some() {
                return Err(DiffError::new(
                    DiffErrorCode::DuplicateBlockId,
                    Some(new_id.as_str()),
                    format!("block id '{new_id}' is already in use"),
                ));
            }
            block_mut(tree, block_id)?.set_id(new_id.clone());
        }

        EditOperation::Insert { position, blocks } => {
            let anchor = resolve_anchor(position)?;
            let mut new_blocks = blocks.clone();
            assign_missing_ids(&mut new_blocks);
            check_new_blocks(tree, &new_blocks, false)?;
            insert_at(tree, &anchor, new_blocks)?;
        }

        EditOperation::Delete { block_id } => {
            let path = locate(tree, block_id).ok_or_else(|| DiffError::block_not_found(block_id))?;
            remove_at(tree, &path);
        }

        EditOperation::Replace { block_id, blocks } => {
            let path = locate(tree, block_id).ok_or_else(|| DiffError::block_not_found(block_id))?;
            let mut replacement = blocks.clone();
            // A one-for-one replacement keeps the address stable.
            if let [only] = replacement.as_mut_slice() {
                if !only.has_id() {
                    only.set_id(block_id.clone());
                }
            }
            assign_missing_ids(&mut replacement);

            let (last, parent) = split_path(&path);
            let in_tool = inside_tool(tree, parent);
            // Ids of the replaced subtree are free again.
            remove_at(tree, &path);
            check_new_blocks(tree, &replacement, in_tool)?;
            if let Some(siblings) = siblings_mut(tree, parent) {
                siblings.splice(last..last, replacement);
            }
        }

        EditOperation::Move { selector, position } => {
            let anchor = resolve_anchor(position)?;
            let ids = resolve_selection(tree, selector)?;

            let mut moved = Vec::with_capacity(ids.len());
            for id in &ids {
                // Already gone if an earlier selected block contained it.
                if let Some(path) = locate(tree, id) {
                    if let Some(block) = remove_at(tree, &path) {
                        moved.push(block);
                    }
                }
            }
            insert_at(tree, &anchor, moved)?;
        }
    }
    Ok(())
}

/// New blocks must not reuse an id of `tree` or of each other, and must not
/// put a tool inside a tool definition.
fn check_new_blocks(tree: &[Block], blocks: &[Block], inside_tool: bool) -> Result<(), DiffError> {
    if let Some(tool) = nested_tool(blocks, inside_tool) {
        return Err(DiffError::new(
            DiffErrorCode::NestedTool,
            Some(tool),
            format!("tool '{tool}' cannot be placed inside a tool definition"),
        ));
    }

    let existing: HashSet<&str> = walk(tree).map(Block::id).collect();
    let mut seen = HashSet::new();
    for block in walk(blocks) {
        let id = block.id();
        if existing.contains(id) || !seen.insert(id) {
            return Err(DiffError::new(
                DiffErrorCode::DuplicateBlockId,
                Some(id),
                format!("block id '{id}' is already in use"),
            ));
        }
    }
    Ok(())
}

/// Id of the first tool that sits inside another tool's definition.
fn nested_tool(blocks: &[Block], inside_tool: bool) -> Option<&str> {
    blocks.iter().find_map(|block| {
        let is_tool = matches!(block, Block::Tool(_));
        if is_tool && inside_tool {
            return Some(block.id());
        }
        nested_tool(block.children(), inside_tool || is_tool)
    })
}

/// Whether the child list at `parent_path` lies inside a tool definition.
fn inside_tool(tree: &[Block], parent_path: &[usize]) -> bool {
    let mut siblings = tree;
    for &i in parent_path {
        let Some(block) = siblings.get(i) else {
            return false;
        };
        if matches!(block, Block::Tool(_)) {
            return true;
        }
        siblings = block.children();
    }
    false
}

fn set_content(block: &mut Block, content: &[RichContent]) -> Result<(), DiffError> {
    match block {
        Block::Content(b) => b.content = content.to_vec(),
        Block::Tool(b) => b.content = content.to_vec(),
        Block::Executable(b) => {
            return Err(DiffError::new(
                DiffErrorCode::NoContentSlot,
                Some(b.id.as_str()),
                format!("block '{}' is executable and has no content slot", b.id),
            ));
        }
    }
    Ok(())
}

fn resolve_anchor(position: &InsertPosition) -> Result<Anchor, DiffError> {
    position.resolve().ok_or_else(|| {
        DiffError::new(
            DiffErrorCode::AmbiguousAnchor,
            None,
            format!(
                "exactly one of at-start, at-end, after-block-id, before-block-id must be set (got {})",
                position.count_set()
            ),
        )
    })
}

fn insert_at(tree: &mut Vec<Block>, anchor: &Anchor, blocks: Vec<Block>) -> Result<(), DiffError> {
    let at = match anchor {
        Anchor::AtStart => 0,
        Anchor::AtEnd => tree.len(),
        Anchor::After(id) => top_level_index(tree, id)? + 1,
        Anchor::Before(id) => top_level_index(tree, id)?,
    };
    tree.splice(at..at, blocks);
    Ok(())
}

fn top_level_index(tree: &[Block], id: &str) -> Result<usize, DiffError> {
    tree.iter().position(|b| b.id() == id).ok_or_else(|| {
        DiffError::new(
            DiffErrorCode::AnchorNotFound,
            Some(id),
            format!("anchor block '{id}' not found at the top level"),
        )
    })
}

fn resolve_selection(tree: &[Block], selector: &Selector) -> Result<Vec<String>, DiffError> {
    let unresolved = |id: &str, what: &str| {
        DiffError::new(
            DiffErrorCode::SelectionUnresolved,
            Some(id),
            format!("{what} '{id}' not found"),
        )
    };

    match selector {
        Selector::Block(id) => {
            locate(tree, id).ok_or_else(|| unresolved(id, "selected block"))?;
            Ok(vec![id.clone()])
        }
        Selector::Blocks(ids) => {
            if ids.is_empty() {
                return Err(DiffError::new(
                    DiffErrorCode::SelectionUnresolved,
                    None,
                    "selection is empty",
                ));
            }
            for id in ids {
                locate(tree, id).ok_or_else(|| unresolved(id, "selected block"))?;
            }
            // Document order, whatever order the selection lists them in.
            let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let mut out: Vec<String> = Vec::with_capacity(wanted.len());
            for block in walk(tree) {
                let id = block.id();
                if wanted.contains(id) && !out.iter().any(|o| o == id) {
                    out.push(id.to_string());
                }
            }
            Ok(out)
        }
        Selector::Range { from, to } => {
            let start = tree
                .iter()
                .position(|b| b.id() == from)
                .ok_or_else(|| unresolved(from, "range start"))?;
            let end = tree
                .iter()
                .position(|b| b.id() == to)
                .ok_or_else(|| unresolved(to, "range end"))?;
            let (lo, hi) = if start <= end { (start, end) } else { (end, start) };
            Ok(tree[lo..=hi].iter().map(|b| b.id().to_string()).collect())
        }
    }
}

/// Index path to the first block with `id`, in pre-order.
fn locate(blocks: &[Block], id: &str) -> Option<Vec<usize>> {
    for (i, block) in blocks.iter().enumerate() {
        if block.id() == id {
            return Some(vec![i]);
        }
        if let Some(mut path) = locate(block.children(), id) {
            path.insert(0, i);
            return Some(path);
        }
    }
    None
}

/// Splits a non-empty path into (index within parent, path to parent).
fn split_path(path: &[usize]) -> (usize, &[usize]) {
    match path.split_last() {
        Some((&last, parent)) => (last, parent),
        None => (0, &[]),
    }
}

/// The child list reached by following `parent_path` from the root list.
fn siblings_mut<'a>(blocks: &'a mut Vec<Block>, parent_path: &[usize]) -> Option<&'a mut Vec<Block>> {
    match parent_path.split_first() {
        None => Some(blocks),
        Some((&i, rest)) => siblings_mut(blocks.get_mut(i)?.children_mut()?, rest),
    }
}

fn remove_at(tree: &mut Vec<Block>, path: &[usize]) -> Option<Block> {
    let (last, parent) = split_path(path);
    let siblings = siblings_mut(tree, parent)?;
    (last < siblings.len()).then(|| siblings.remove(last))
}

fn block_mut<'a>(tree: &'a mut Vec<Block>, id: &str) -> Result<&'a mut Block, DiffError> {
    let path = locate(tree, id).ok_or_else(|| DiffError::block_not_found(id))?;
    let (last, parent) = split_path(&path);
    siblings_mut(tree, parent)
        .and_then(|siblings| siblings.get_mut(last))
        .ok_or_else(|| DiffError::block_not_found(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use idyll_core::{ContentBlock, ExecutableBlock, ExecutableType, Props, ToolBlock};
    use serde_json::json;

    fn p(id: &str) -> Block {
        ContentBlock::paragraph(id, id).into()
    }

    fn ids(blocks: &[Block]) -> Vec<&str> {
        blocks.iter().map(Block::id).collect()
    }

    fn fncall(id: &str) -> Block {
        ExecutableBlock {
            id: id.to_string(),
            kind: ExecutableType::FunctionCall,
            tool: "search".to_string(),
            parameters: json!({"q": "x"}),
            instructions: vec![],
            result: None,
            metadata: Props::new(),
        }
        .into()
    }

    #[test]
    fn operations_see_the_result_of_earlier_ones() {
        let tree = vec![p("A"), p("B"), p("C")];
        let ops = vec![
            EditOperation::Insert {
                position: InsertPosition::after("A"),
                blocks: vec![p("X")],
            },
            EditOperation::EditAttr {
                block_id: "X".into(),
                name: "color".into(),
                value: "red".into(),
            },
        ];

        let out = apply(&tree, &ops).unwrap();
        assert_eq!(ids(&out), vec!["A", "X", "B", "C"]);
        assert_eq!(out[1].attributes().get("color").map(String::as_str), Some("red"));
    }

    #[test]
    fn move_to_end() {
        let tree = vec![p("A"), p("B"), p("C")];
        let ops = vec![EditOperation::Move {
            selector: Selector::Block("B".into()),
            position: InsertPosition::at_end(),
        }];
        assert_eq!(ids(&apply(&tree, &ops).unwrap()), vec!["A", "C", "B"]);
    }

    #[test]
    fn range_move_normalizes_order() {
        let tree = vec![p("A"), p("B"), p("C"), p("D")];
        let ops = vec![EditOperation::Move {
            selector: Selector::Range {
                from: "C".into(),
                to: "B".into(),
            },
            position: InsertPosition::at_start(),
        }];
        assert_eq!(ids(&apply(&tree, &ops).unwrap()), vec!["B", "C", "A", "D"]);
    }

    #[test]
    fn ambiguous_anchor_is_rejected() {
        let tree = vec![p("A")];
        let position = InsertPosition {
            at_start: true,
            at_end: true,
            ..InsertPosition::default()
        };
        let err = apply(
            &tree,
            &[EditOperation::Insert {
                position,
                blocks: vec![p("X")],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::AmbiguousAnchor);
        assert_eq!(err.op_index, Some(0));
    }

    #[test]
    fn anchors_are_top_level_only() {
        let mut parent = ContentBlock::paragraph("A", "a");
        parent.children.push(p("nested"));
        let tree: Vec<Block> = vec![parent.into()];
        let err = apply(
            &tree,
            &[EditOperation::Insert {
                position: InsertPosition::after("nested"),
                blocks: vec![p("X")],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::AnchorNotFound);
    }

    #[test]
    fn delete_removes_nested_blocks_and_only_the_first_match() {
        let mut parent = ContentBlock::paragraph("A", "a");
        parent.children.push(p("dup"));
        let tree: Vec<Block> = vec![parent.into(), p("dup")];

        let out = apply(&tree, &[EditOperation::Delete { block_id: "dup".into() }]).unwrap();
        assert!(out[0].children().is_empty());
        assert_eq!(ids(&out), vec!["A", "dup"]);
    }

    #[test]
    fn single_replacement_inherits_the_id() {
        let tree = vec![p("A"), p("B")];
        let out = apply(
            &tree,
            &[EditOperation::Replace {
                block_id: "B".into(),
                blocks: vec![p("")],
            }],
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["A", "B"]);
    }

    #[test]
    fn inserted_blocks_get_fresh_ids() {
        let out = apply(
            &[],
            &[EditOperation::Insert {
                position: InsertPosition::at_start(),
                blocks: vec![p(""), p("")],
            }],
        )
        .unwrap();
        assert!(out.iter().all(Block::has_id));
        assert_ne!(out[0].id(), out[1].id());
    }

    #[test]
    fn content_and_params_edits_respect_block_kind() {
        let tree = vec![p("A"), fncall("F")];

        let err = apply(
            &tree,
            &[EditOperation::EditContent {
                block_id: "F".into(),
                content: vec![RichContent::text("x")],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::NoContentSlot);

        let err = apply(
            &tree,
            &[EditOperation::EditParams {
                block_id: "A".into(),
                params: json!({}),
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::NotExecutable);

        let out = apply(
            &tree,
            &[EditOperation::EditParams {
                block_id: "F".into(),
                params: json!({"q": "y"}),
            }],
        )
        .unwrap();
        match &out[1] {
            Block::Executable(b) => assert_eq!(b.parameters, json!({"q": "y"})),
            other => panic!("expected executable, got {other:?}"),
        }
    }

    #[test]
    fn edit_id_refuses_collisions() {
        let tree = vec![p("A"), p("B")];
        let err = apply(
            &tree,
            &[EditOperation::EditId {
                block_id: "A".into(),
                new_id: "B".into(),
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::DuplicateBlockId);

        let out = apply(
            &tree,
            &[EditOperation::EditId {
                block_id: "A".into(),
                new_id: "Z".into(),
            }],
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["Z", "B"]);
    }

    fn tool(id: &str, definition: Vec<Block>) -> Block {
        ToolBlock {
            id: id.to_string(),
            content: vec![],
            description: String::new(),
            definition,
            props: Props::new(),
        }
        .into()
    }

    #[test]
    fn replace_inside_a_tool_definition_refuses_tools() {
        let tree = vec![tool("T", vec![p("step")])];
        let err = apply(
            &tree,
            &[EditOperation::Replace {
                block_id: "step".into(),
                blocks: vec![tool("inner", vec![])],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::NestedTool);
        assert_eq!(err.block_id.as_deref(), Some("inner"));

        let out = apply(
            &tree,
            &[EditOperation::Replace {
                block_id: "step".into(),
                blocks: vec![p("step2")],
            }],
        )
        .unwrap();
        assert_eq!(ids(out[0].children()), vec!["step2"]);
    }

    #[test]
    fn inserted_tools_cannot_nest_tools() {
        let err = apply(
            &[],
            &[EditOperation::Insert {
                position: InsertPosition::at_end(),
                blocks: vec![tool("outer", vec![tool("inner", vec![])])],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::NestedTool);
    }

    #[test]
    fn insert_and_replace_refuse_ids_already_in_use() {
        let mut parent = ContentBlock::paragraph("A", "a");
        parent.children.push(p("nested"));
        let tree: Vec<Block> = vec![parent.into(), p("B")];

        let err = apply(
            &tree,
            &[EditOperation::Insert {
                position: InsertPosition::at_end(),
                blocks: vec![p("nested")],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::DuplicateBlockId);

        let err = apply(
            &tree,
            &[EditOperation::Replace {
                block_id: "B".into(),
                blocks: vec![p("X"), p("A")],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::DuplicateBlockId);

        let err = apply(
            &tree,
            &[EditOperation::Insert {
                position: InsertPosition::at_start(),
                blocks: vec![p("X"), p("X")],
            }],
        )
        .unwrap_err();
        assert_eq!(err.code, DiffErrorCode::DuplicateBlockId);
    }

    #[test]
    fn replace_may_reuse_ids_from_the_replaced_subtree() {
        let mut parent = ContentBlock::paragraph("A", "a");
        parent.children.push(p("nested"));
        let tree: Vec<Block> = vec![parent.into(), p("B")];
        let out = apply(
            &tree,
            &[EditOperation::Replace {
                block_id: "A".into(),
                blocks: vec![p("A"), p("nested")],
            }],
        )
        .unwrap();
        assert_eq!(ids(&out), vec!["A", "nested", "B"]);
    }

    #[test]
    fn listed_selection_moves_in_document_order() {
        let tree = vec![p("A"), p("B"), p("C"), p("D")];
        let ops = vec![EditOperation::Move {
            selector: Selector::Blocks(vec!["C".into(), "A".into(), "C".into()]),
            position: InsertPosition::at_end(),
        }];
        assert_eq!(ids(&apply(&tree, &ops).unwrap()), vec!["B", "D", "A", "C"]);
    }

    #[test]
    fn failure_reports_the_operation_index() {
        let tree = vec![p("A")];
        let ops = vec![
            EditOperation::Delete { block_id: "A".into() },
            EditOperation::Delete { block_id: "A".into() },
        ];
        let err = apply(&tree, &ops).unwrap_err();
        assert_eq!(err.code, DiffErrorCode::BlockNotFound);
        assert_eq!(err.op_index, Some(1));
        assert_eq!(err.op.as_deref(), Some("delete"));
    }
}
