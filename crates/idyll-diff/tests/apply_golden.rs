//! ⚠️ GOLDEN TESTS – DIFF CONTRACT ⚠️
//!
//! These tests define the frozen, externally visible semantics of `apply`.
//!
//! Any change here MUST be intentional and reviewed as a format change.
//! If a test fails, fix the implementation – do not update expectations
//! unless the diff format itself is evolving.

use serde_json::json;

use idyll_core::{Block, EditOperation};
use idyll_diff::{DiffErrorCode, apply};

fn baseline() -> Vec<Block> {
    serde_json::from_value(json!([
        {"class": "content", "id": "intro", "type": "heading", "content": [{"type": "text", "text": "Intro"}], "props": {"level": "1"}},
        {"class": "content", "id": "body", "type": "paragraph", "content": [{"type": "text", "text": "Body"}],
         "children": [
            {"class": "content", "id": "note", "type": "quote", "content": [{"type": "text", "text": "Note"}]}
         ]},
        {"class": "executable", "id": "call", "type": "function_call", "tool": "web:search", "parameters": {"q": "rust"}},
        {"class": "content", "id": "outro", "type": "paragraph", "content": [{"type": "text", "text": "Bye"}]}
    ]))
    .unwrap()
}

fn ops(value: serde_json::Value) -> Vec<EditOperation> {
    serde_json::from_value(value).unwrap()
}

fn top_ids(blocks: &[Block]) -> Vec<&str> {
    blocks.iter().map(Block::id).collect()
}

#[test]
fn golden_insert_then_edit_new_block() {
    let out = apply(
        &baseline(),
        &ops(json!([
            {"op": "insert", "position": {"after_block_id": "intro"},
             "blocks": [{"class": "content", "id": "x", "type": "paragraph", "content": []}]},
            {"op": "edit_attr", "block_id": "x", "name": "align", "value": "center"}
        ])),
    )
    .unwrap();

    assert_eq!(top_ids(&out), vec!["intro", "x", "body", "call", "outro"]);
    assert_eq!(out[1].attributes().get("align").map(String::as_str), Some("center"));
}

#[test]
fn golden_nested_blocks_are_addressable() {
    let out = apply(
        &baseline(),
        &ops(json!([
            {"op": "edit_content", "block_id": "note", "content": [{"type": "text", "text": "Edited"}]}
        ])),
    )
    .unwrap();

    let note = &out[1].children()[0];
    assert_eq!(note.id(), "note");
    assert_eq!(
        note.content().map(idyll_core::RichContent::plain_text).as_deref(),
        Some("Edited")
    );
}

#[test]
fn golden_move_selection_keeps_selection_order() {
    let out = apply(
        &baseline(),
        &ops(json!([
            {"op": "move", "selector": {"blocks": ["outro", "intro"]}, "position": {"before_block_id": "body"}}
        ])),
    )
    .unwrap();

    assert_eq!(top_ids(&out), vec!["outro", "intro", "body", "call"]);
}

#[test]
fn golden_move_nested_block_to_top_level() {
    let out = apply(
        &baseline(),
        &ops(json!([
            {"op": "move", "selector": {"block": "note"}, "position": {"at_start": true}}
        ])),
    )
    .unwrap();

    assert_eq!(top_ids(&out), vec!["note", "intro", "body", "call", "outro"]);
    assert!(out[2].children().is_empty());
}

#[test]
fn golden_replace_with_several_blocks() {
    let out = apply(
        &baseline(),
        &ops(json!([
            {"op": "replace", "block_id": "call", "blocks": [
                {"class": "content", "id": "r1", "type": "separator", "content": []},
                {"class": "content", "type": "paragraph", "content": []}
            ]}
        ])),
    )
    .unwrap();

    assert_eq!(out.len(), 5);
    assert_eq!(out[2].id(), "r1");
    assert!(out[3].has_id());
    assert_ne!(out[3].id(), "call");
}

#[test]
fn golden_failure_leaves_input_untouched() {
    let input = baseline();
    let err = apply(
        &input,
        &ops(json!([
            {"op": "delete", "block_id": "intro"},
            {"op": "edit_params", "block_id": "outro", "params": {}}
        ])),
    )
    .unwrap_err();

    assert_eq!(err.code, DiffErrorCode::NotExecutable);
    assert_eq!(err.op_index, Some(1));
    assert_eq!(input, baseline());
}

#[test]
fn golden_move_anchor_inside_selection_fails() {
    let err = apply(
        &baseline(),
        &ops(json!([
            {"op": "move", "selector": {"range": {"from": "intro", "to": "call"}}, "position": {"after_block_id": "body"}}
        ])),
    )
    .unwrap_err();

    assert_eq!(err.code, DiffErrorCode::AnchorNotFound);
}
