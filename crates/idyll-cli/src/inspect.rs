use std::io::Write;

use tabwriter::TabWriter;

use idyll_io::prelude::*;

/// Longest preview, in characters, ellipsis included.
pub const PREVIEW_MAX_CHARS: usize = 60;

pub struct Row {
    pub id: String,
    pub kind: &'static str,
    pub depth: usize,
    pub preview: String,
}

/// One row per block, pre-order, with nesting depth starting at 0.
pub fn rows(blocks: &[Block]) -> Vec<Row> {
    let mut out = Vec::new();
    push_rows(blocks, 0, &mut out);
    out
}

fn push_rows(blocks: &[Block], depth: usize, out: &mut Vec<Row>) {
    for block in blocks {
        out.push(Row {
            id: block.id().to_string(),
            kind: block.block_type().as_str(),
            depth,
            preview: preview(&block_text(block)),
        });
        push_rows(block.children(), depth + 1, out);
    }
}

fn block_text(block: &Block) -> String {
    match block {
        Block::Content(c) => RichContent::plain_text(&c.content),
        Block::Executable(e) => {
            let instructions = RichContent::plain_text(&e.instructions);
            if instructions.is_empty() {
                e.tool.clone()
            } else {
                format!("{}: {instructions}", e.tool)
            }
        }
        Block::Tool(t) => {
            let text = RichContent::plain_text(&t.content);
            if text.is_empty() { t.description.clone() } else { text }
        }
    }
}

/// Single-line, bounded preview. Control characters (tabs, newlines) become
/// spaces so they cannot break the table.
pub fn preview(text: &str) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let flat = flat.trim();
    if flat.chars().count() <= PREVIEW_MAX_CHARS {
        return flat.to_string();
    }
    let mut cut: String = flat.chars().take(PREVIEW_MAX_CHARS - 1).collect();
    cut.push('…');
    cut
}

pub fn write_table<W: Write>(out: W, rows: &[Row]) -> std::io::Result<()> {
    let mut tw = TabWriter::new(out).padding(2);
    writeln!(tw, "id\ttype\tdepth\tpreview")?;
    for row in rows {
        writeln!(tw, "{}\t{}\t{}\t{}", row.id, row.kind, row.depth, row.preview)?;
    }
    tw.flush()
}
