//! Page containers: the presentation-only grouping of blocks into pages

use crate::document::BlockKey;
use crate::error::{PaginationError, Result};
use crate::sync::{PagePatch, PageTransaction};
use rustc_hash::{FxHashMap, FxHashSet};

/// Stable identifier for a page container
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, serde::Serialize)]
pub struct PageId(pub u64);

/// A contiguous run of blocks shown as one page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContainer {
    pub id: PageId,
    pub blocks: Vec<BlockKey>,
}

impl PageContainer {
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            blocks: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

/// A transaction prepared against a tree, applied only once the host accepts it
#[derive(Debug, Clone)]
pub struct StagedPages {
    pub transaction: PageTransaction,
    pages: Vec<PageContainer>,
    next_page_id: u64,
}

/// Mirror of the page containers currently in the host tree.
///
/// Always holds at least one page. Pages are derived from the flat block
/// order and never persisted.
#[derive(Debug, Clone)]
pub struct PageTree {
    pages: Vec<PageContainer>,
    next_page_id: u64,
    version: u64,
    /// Host containers may differ from the mirror; the next transaction
    /// rewrites every page
    stale: bool,
}

impl Default for PageTree {
    fn default() -> Self {
        Self::new()
    }
}

impl PageTree {
    /// A tree with one empty page
    pub fn new() -> Self {
        Self {
            pages: vec![PageContainer::new(PageId(0))],
            next_page_id: 1,
            version: 0,
            stale: true,
        }
    }

    pub fn pages(&self) -> &[PageContainer] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Number of committed transactions
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Blocks of each page, in page order
    pub fn assignment(&self) -> Vec<Vec<BlockKey>> {
        self.pages.iter().map(|p| p.blocks.clone()).collect()
    }

    /// The flat block order the pages were built from
    pub fn flatten(&self) -> Vec<BlockKey> {
        self.pages.iter().flat_map(|p| p.blocks.iter().copied()).collect()
    }

    /// Index of the page holding a block
    pub fn page_of(&self, key: BlockKey) -> Option<usize> {
        self.pages.iter().position(|p| p.blocks.contains(&key))
    }

    /// Check that the pages partition `order` exactly: same blocks, same
    /// order, nothing missing or duplicated, and no empty page unless it is
    /// the only one.
    pub fn validate(&self, order: &[BlockKey]) -> Result<()> {
        validate_assignment(&self.assignment(), order)
    }

    /// Fold block insertions and deletions made by the host into the current
    /// assignment.
    ///
    /// Deleted blocks drop out of their page, a new block joins the page of
    /// the block before it, and pages left empty are removed. Returns `None`
    /// when the surviving blocks changed relative order, which needs a full
    /// recalculation instead.
    pub fn reconcile(&self, order: &[BlockKey]) -> Option<Vec<Vec<BlockKey>>> {
        let mut result = self.place(order)?;
        result.retain(|page| !page.is_empty());
        if result.is_empty() {
            result.push(Vec::new());
        }
        Some(result)
    }

    /// Bring the mirror in line with edits the host already made to its
    /// containers, the same way [`reconcile`](Self::reconcile) places blocks
    /// but keeping emptied containers.
    ///
    /// Returns false when the order changed in a way that cannot be placed;
    /// the mirror is then marked stale and the next transaction rewrites
    /// every page.
    pub fn absorb(&mut self, order: &[BlockKey]) -> bool {
        match self.place(order) {
            Some(placed) => {
                for (page, blocks) in self.pages.iter_mut().zip(placed) {
                    page.blocks = blocks;
                }
                true
            }
            None => {
                tracing::debug!("block order changed non-locally, page mirror marked stale");
                self.stale = true;
                false
            }
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Blocks of `order` grouped by the page they belong to now, one entry
    /// per existing page
    fn place(&self, order: &[BlockKey]) -> Option<Vec<Vec<BlockKey>>> {
        let live: FxHashSet<BlockKey> = order.iter().copied().collect();
        if live.len() != order.len() {
            return None;
        }

        let mut page_of: FxHashMap<BlockKey, usize> = FxHashMap::default();
        let mut surviving = Vec::new();
        for (index, page) in self.pages.iter().enumerate() {
            for key in &page.blocks {
                if live.contains(key) {
                    page_of.insert(*key, index);
                    surviving.push(*key);
                }
            }
        }

        let known_in_order = order.iter().filter(|key| page_of.contains_key(key));
        if !known_in_order.eq(surviving.iter()) {
            return None;
        }

        let mut result: Vec<Vec<BlockKey>> = vec![Vec::new(); self.pages.len().max(1)];
        let mut current = 0;
        for key in order {
            if let Some(&index) = page_of.get(key) {
                current = index;
            }
            result[current].push(*key);
        }
        Some(result)
    }

    /// Prepare the transaction that turns this tree into `assignment`.
    ///
    /// Pages keep their id by position; extra pages get fresh ids. Unchanged
    /// pages produce no patch.
    pub fn stage(&self, assignment: &[Vec<BlockKey>]) -> StagedPages {
        let mut next_page_id = self.next_page_id;
        let mut transaction = PageTransaction::new(self.version + 1);
        let mut pages = Vec::with_capacity(assignment.len().max(1));

        for (page_index, blocks) in assignment.iter().enumerate() {
            match self.pages.get(page_index) {
                Some(old) => {
                    if self.stale || old.blocks != *blocks {
                        transaction.add_patch(PagePatch::UpdatePage {
                            page_index,
                            page_id: old.id,
                            blocks: blocks.clone(),
                        });
                    }
                    pages.push(PageContainer {
                        id: old.id,
                        blocks: blocks.clone(),
                    });
                }
                None => {
                    let id = PageId(next_page_id);
                    next_page_id += 1;
                    transaction.add_patch(PagePatch::InsertPage {
                        page_index,
                        page_id: id,
                        blocks: blocks.clone(),
                    });
                    pages.push(PageContainer {
                        id,
                        blocks: blocks.clone(),
                    });
                }
            }
        }

        if pages.is_empty() {
            // Sole remaining page stays, emptied
            let first = &self.pages[0];
            if self.stale || !first.blocks.is_empty() {
                transaction.add_patch(PagePatch::UpdatePage {
                    page_index: 0,
                    page_id: first.id,
                    blocks: Vec::new(),
                });
            }
            pages.push(PageContainer::new(first.id));
        }

        // Highest index first so earlier indices stay valid while applying
        let keep = assignment.len().max(1);
        for page_index in (keep..self.pages.len()).rev() {
            transaction.add_patch(PagePatch::RemovePage {
                page_index,
                page_id: self.pages[page_index].id,
            });
        }

        transaction.page_count = pages.len();
        StagedPages {
            transaction,
            pages,
            next_page_id,
        }
    }

    /// Adopt a staged transaction after the host applied it
    pub fn commit(&mut self, staged: StagedPages) {
        self.pages = staged.pages;
        self.next_page_id = staged.next_page_id;
        self.version = staged.transaction.version;
        self.stale = false;
    }
}

/// Partition check on a raw assignment
pub fn validate_assignment(assignment: &[Vec<BlockKey>], order: &[BlockKey]) -> Result<()> {
    if assignment.is_empty() {
        return Err(PaginationError::PartitionViolation("no page containers".into()));
    }
    if assignment.len() > 1 {
        if let Some(index) = assignment.iter().position(|p| p.is_empty()) {
            return Err(PaginationError::PartitionViolation(format!(
                "page {} is empty",
                index
            )));
        }
    }

    let flat: Vec<BlockKey> = assignment.iter().flatten().copied().collect();
    if flat != order {
        let mut seen = FxHashSet::default();
        if let Some(dup) = flat.iter().find(|key| !seen.insert(**key)) {
            return Err(PaginationError::PartitionViolation(format!(
                "block {:?} appears on more than one page",
                dup
            )));
        }
        return Err(PaginationError::PartitionViolation(format!(
            "pages hold {} blocks, document has {}, or order differs",
            flat.len(),
            order.len()
        )));
    }
    Ok(())
}
