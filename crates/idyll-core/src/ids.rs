//! Fresh identifier minting.

use uuid::Uuid;

use crate::model::{Block, BlockId};

/// Mint a new, globally unique block id.
pub fn fresh_block_id() -> BlockId {
    Uuid::new_v4().simple().to_string()
}

/// Mint a new document id.
pub fn fresh_document_id() -> String {
    format!("doc-{}", Uuid::new_v4().simple())
}

/// Give every block in the forest that has no id a fresh one.
pub fn assign_missing_ids(blocks: &mut [Block]) {
    for block in blocks {
        if !block.has_id() {
            block.set_id(fresh_block_id());
        }
        if let Some(children) = block.children_mut() {
            assign_missing_ids(children);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ContentBlock;

    #[test]
    fn fills_only_missing_ids() {
        let mut parent = ContentBlock::paragraph("", "p");
        parent.children.push(ContentBlock::paragraph("keep", "c").into());
        parent.children.push(ContentBlock::paragraph("", "c").into());
        let mut blocks: Vec<Block> = vec![parent.into()];

        assign_missing_ids(&mut blocks);

        assert!(blocks[0].has_id());
        assert_eq!(blocks[0].children()[0].id(), "keep");
        assert!(blocks[0].children()[1].has_id());
        assert_ne!(blocks[0].id(), blocks[0].children()[1].id());
    }
}
