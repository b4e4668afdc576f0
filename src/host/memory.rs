//! In-memory editor host.
//!
//! Holds blocks, heights, a caret and page containers in plain collections.
//! Useful for paginating a document without a rendering surface, and for
//! exercising the engine in tests and benches.

use crate::document::{BlockExtent, BlockKey, NodeBox};
use crate::editing::{DocPosition, Selection};
use crate::host::{EditorHost, HostError};
use crate::sync::{PageId, PagePatch, PageTransaction};
use rustc_hash::FxHashMap;
use std::cell::Cell;

#[derive(Debug, Clone)]
struct StoredBlock {
    node: NodeBox,
    extent: BlockExtent,
}

/// Editor host backed by in-memory collections
#[derive(Debug, Default)]
pub struct MemoryHost {
    order: Vec<BlockKey>,
    blocks: FxHashMap<BlockKey, StoredBlock>,
    selection: Option<Selection>,
    pages: Vec<(PageId, Vec<BlockKey>)>,
    transactions_applied: usize,
    caret_resets: usize,
    selection_writes: usize,
    rejections_left: usize,
    detached_batches: Cell<usize>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a host of plain paragraphs with the given heights, keyed 0..n
    pub fn with_heights(heights: &[f32]) -> Self {
        let mut host = Self::new();
        for (i, height) in heights.iter().enumerate() {
            host.push_block(
                BlockKey(i as u64),
                NodeBox::new(*height, crate::document::BlockKind::Paragraph),
                1,
            );
        }
        host
    }

    /// Append a plain-text block of `len` characters
    pub fn push_block(&mut self, key: BlockKey, node: NodeBox, len: usize) {
        self.insert_block(self.order.last().copied(), key, node, len, true);
    }

    /// Append a block whose content is not plain text (tables, embeds)
    pub fn push_rich_block(&mut self, key: BlockKey, node: NodeBox, len: usize) {
        self.insert_block(self.order.last().copied(), key, node, len, false);
    }

    /// Insert a plain-text block after `after`, or at the start when `None`.
    ///
    /// The new block joins the page container of its predecessor, the way an
    /// editing framework splits a node in place.
    pub fn insert_block_after(&mut self, after: Option<BlockKey>, key: BlockKey, node: NodeBox, len: usize) {
        self.insert_block(after, key, node, len, true);
    }

    fn insert_block(&mut self, after: Option<BlockKey>, key: BlockKey, node: NodeBox, len: usize, plain_text: bool) {
        let position = after
            .and_then(|a| self.order.iter().position(|k| *k == a))
            .map(|p| p + 1)
            .unwrap_or(0);
        self.order.insert(position, key);
        self.blocks.insert(
            key,
            StoredBlock {
                node,
                extent: BlockExtent { len, plain_text },
            },
        );

        let target = after.and_then(|a| {
            self.pages
                .iter()
                .position(|(_, blocks)| blocks.contains(&a))
                .map(|page| (page, a))
        });
        match target {
            Some((page, a)) => {
                let blocks = &mut self.pages[page].1;
                let at = blocks.iter().position(|k| *k == a).map(|p| p + 1).unwrap_or(blocks.len());
                blocks.insert(at, key);
            }
            None => {
                if let Some((_, blocks)) = self.pages.first_mut() {
                    blocks.insert(0, key);
                }
            }
        }
    }

    /// Delete a block from the document and from its page container
    pub fn remove_block(&mut self, key: BlockKey) {
        self.order.retain(|k| *k != key);
        self.blocks.remove(&key);
        for (_, blocks) in &mut self.pages {
            blocks.retain(|k| *k != key);
        }
    }

    /// Change the rendered height of a block (e.g. after typing)
    pub fn set_height(&mut self, key: BlockKey, height: f32) {
        if let Some(block) = self.blocks.get_mut(&key) {
            block.node.height = height;
        }
    }

    /// Change the text length of a block
    pub fn set_len(&mut self, key: BlockKey, len: usize) {
        if let Some(block) = self.blocks.get_mut(&key) {
            block.extent.len = len;
            block.node.empty = len == 0;
        }
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Blocks of each page container, as applied by transactions
    pub fn pages(&self) -> Vec<Vec<BlockKey>> {
        self.pages.iter().map(|(_, blocks)| blocks.clone()).collect()
    }

    pub fn page_ids(&self) -> Vec<PageId> {
        self.pages.iter().map(|(id, _)| *id).collect()
    }

    pub fn transactions_applied(&self) -> usize {
        self.transactions_applied
    }

    /// Times a transaction moved the caret's block and the caret fell back
    /// to the start of the document
    pub fn caret_resets(&self) -> usize {
        self.caret_resets
    }

    /// Calls to `set_selection`, including the caller's own
    pub fn selection_writes(&self) -> usize {
        self.selection_writes
    }

    /// Number of batched off-screen measurements requested
    pub fn detached_batches(&self) -> usize {
        self.detached_batches.get()
    }

    /// Make the next `run_transaction` fail
    pub fn reject_next_transaction(&mut self) {
        self.reject_transactions(1);
    }

    /// Make the next `count` calls to `run_transaction` fail
    pub fn reject_transactions(&mut self, count: usize) {
        self.rejections_left = count;
    }

    fn apply_patch(pages: &mut Vec<(PageId, Vec<BlockKey>)>, patch: &PagePatch) -> Result<(), HostError> {
        match patch {
            PagePatch::UpdatePage {
                page_index,
                page_id,
                blocks,
            } => {
                if *page_index == 0 && pages.is_empty() {
                    pages.push((*page_id, blocks.clone()));
                    return Ok(());
                }
                let page = pages
                    .get_mut(*page_index)
                    .ok_or_else(|| HostError::new(format!("no page at index {}", page_index)))?;
                page.0 = *page_id;
                page.1 = blocks.clone();
            }
            PagePatch::InsertPage {
                page_index,
                page_id,
                blocks,
            } => {
                if *page_index > pages.len() {
                    return Err(HostError::new(format!("cannot insert page at {}", page_index)));
                }
                pages.insert(*page_index, (*page_id, blocks.clone()));
            }
            PagePatch::RemovePage { page_index, page_id } => {
                match pages.get(*page_index) {
                    Some((id, _)) if id == page_id => {
                        pages.remove(*page_index);
                    }
                    _ => {
                        return Err(HostError::new(format!(
                            "page {:?} not found at index {}",
                            page_id, page_index
                        )))
                    }
                }
            }
        }
        Ok(())
    }
}

impl EditorHost for MemoryHost {
    fn block_order(&self) -> Vec<BlockKey> {
        self.order.clone()
    }

    fn node_box(&self, key: BlockKey) -> Option<NodeBox> {
        self.blocks.get(&key).map(|b| b.node.clone())
    }

    fn measure_detached(&self, keys: &[BlockKey]) -> Vec<Option<NodeBox>> {
        self.detached_batches.set(self.detached_batches.get() + 1);
        keys.iter().map(|key| self.node_box(*key)).collect()
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn set_selection(&mut self, selection: Selection) {
        self.selection = Some(selection);
        self.selection_writes += 1;
    }

    fn block_extent(&self, key: BlockKey) -> Option<BlockExtent> {
        self.blocks.get(&key).map(|b| b.extent)
    }

    fn run_transaction(&mut self, transaction: &PageTransaction) -> Result<(), HostError> {
        if self.rejections_left > 0 {
            self.rejections_left -= 1;
            return Err(HostError::new("transaction rejected"));
        }

        // Work on a copy so a failing patch leaves the tree untouched
        let mut pages = self.pages.clone();
        for patch in &transaction.patches {
            Self::apply_patch(&mut pages, patch)?;
        }

        // Re-parenting a node drops the caret, as a DOM-backed editor would
        let caret_page = |pages: &[(PageId, Vec<BlockKey>)], key: BlockKey| {
            pages.iter().position(|(_, blocks)| blocks.contains(&key))
        };
        if let Some(selection) = self.selection {
            let before = caret_page(&self.pages, selection.anchor.block);
            if before.is_some() && before != caret_page(&pages, selection.anchor.block) {
                self.selection = self
                    .order
                    .first()
                    .map(|first| Selection::collapsed(DocPosition::new(*first, 0)));
                self.caret_resets += 1;
            }
        }

        self.pages = pages;
        self.transactions_applied += 1;
        Ok(())
    }
}
