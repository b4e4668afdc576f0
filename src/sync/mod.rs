//! Page container sync: applies a page assignment to the host tree
//!
//! Every change reaches the host as one [`PageTransaction`], and listeners
//! hear about it once per committed transaction rather than once per moved
//! block.

mod diff;
mod tree;

pub use diff::{PagePatch, PageTransaction};
pub use tree::{validate_assignment, PageContainer, PageId, PageTree, StagedPages};

use crate::document::{BlockKey, BlockMeasurer};
use crate::error::{PaginationError, Result};
use crate::host::EditorHost;
use serde::Serialize;

/// Per-page summary handed to page count listeners
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSummary {
    pub index: usize,
    pub content: Vec<BlockKey>,
    /// Sum of the measured heights of the page's blocks
    pub height: f32,
}

/// Callback invoked once per committed page transaction
pub type PageCountListener = Box<dyn FnMut(&[PageSummary])>;

/// Applies assignments to the host and notifies listeners
#[derive(Default)]
pub struct PageSync {
    listeners: Vec<PageCountListener>,
    committed: u64,
}

impl std::fmt::Debug for PageSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSync")
            .field("listeners", &self.listeners.len())
            .field("committed", &self.committed)
            .finish()
    }
}

impl PageSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a page count listener
    pub fn subscribe(&mut self, listener: PageCountListener) {
        self.listeners.push(listener);
    }

    /// Number of transactions committed so far
    pub fn committed(&self) -> u64 {
        self.committed
    }

    /// Run `assignment` through the host as a single transaction.
    ///
    /// Returns false when nothing changed. On host rejection the tree is left
    /// as it was and the error is returned.
    pub fn commit<H: EditorHost + ?Sized>(
        &mut self,
        host: &mut H,
        tree: &mut PageTree,
        assignment: &[Vec<BlockKey>],
        measurer: &BlockMeasurer,
    ) -> Result<bool> {
        let staged = tree.stage(assignment);
        if staged.transaction.is_empty() {
            return Ok(false);
        }

        host.run_transaction(&staged.transaction)
            .map_err(|e| PaginationError::HostRejected(e.to_string()))?;

        tracing::debug!(
            version = staged.transaction.version,
            patches = staged.transaction.patch_count(),
            pages = staged.transaction.page_count,
            "page transaction committed"
        );
        tree.commit(staged);
        self.committed += 1;

        let summaries = summarize(tree, measurer);
        for listener in &mut self.listeners {
            listener(&summaries);
        }
        Ok(true)
    }
}

/// Build listener summaries from the committed tree
pub fn summarize(tree: &PageTree, measurer: &BlockMeasurer) -> Vec<PageSummary> {
    tree.pages()
        .iter()
        .enumerate()
        .map(|(index, page)| PageSummary {
            index,
            content: page.blocks.clone(),
            height: page
                .blocks
                .iter()
                .filter_map(|key| measurer.height(*key))
                .sum(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{BlockKind, NodeBox};
    use crate::host::MemoryHost;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn host_with(heights: &[f32]) -> MemoryHost {
        let mut host = MemoryHost::new();
        for (i, h) in heights.iter().enumerate() {
            host.push_block(BlockKey(i as u64), NodeBox::new(*h, BlockKind::Paragraph), 1);
        }
        host
    }

    #[test]
    fn test_commit_emits_once_per_transaction() {
        let mut host = host_with(&[100.0, 200.0, 300.0]);
        let mut measurer = BlockMeasurer::new();
        measurer.measure_all(&host, &host.block_order()).unwrap();

        let events: Rc<RefCell<Vec<Vec<PageSummary>>>> = Rc::default();
        let sink = events.clone();
        let mut sync = PageSync::new();
        sync.subscribe(Box::new(move |pages| sink.borrow_mut().push(pages.to_vec())));

        let mut tree = PageTree::new();
        let assignment = vec![vec![BlockKey(0), BlockKey(1)], vec![BlockKey(2)]];
        assert!(sync.commit(&mut host, &mut tree, &assignment, &measurer).unwrap());

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].len(), 2);
        assert_eq!(events[0][0].height, 300.0);
        assert_eq!(events[0][1].content, vec![BlockKey(2)]);
        assert_eq!(host.transactions_applied(), 1);
        assert_eq!(host.pages(), assignment);
    }

    #[test]
    fn test_commit_unchanged_is_silent() {
        let mut host = host_with(&[100.0]);
        let measurer = BlockMeasurer::new();
        let mut sync = PageSync::new();
        let mut tree = PageTree::new();
        let assignment = vec![vec![BlockKey(0)]];

        assert!(sync.commit(&mut host, &mut tree, &assignment, &measurer).unwrap());
        assert!(!sync.commit(&mut host, &mut tree, &assignment, &measurer).unwrap());
        assert_eq!(sync.committed(), 1);
        assert_eq!(host.transactions_applied(), 1);
    }

    #[test]
    fn test_host_rejection_leaves_tree() {
        let mut host = host_with(&[100.0, 100.0]);
        host.reject_next_transaction();
        let measurer = BlockMeasurer::new();
        let mut sync = PageSync::new();
        let mut tree = PageTree::new();

        let assignment = vec![vec![BlockKey(0)], vec![BlockKey(1)]];
        let err = sync.commit(&mut host, &mut tree, &assignment, &measurer).unwrap_err();
        assert!(matches!(err, PaginationError::HostRejected(_)));
        assert_eq!(tree.page_count(), 1);
        assert_eq!(tree.version(), 0);
    }
}
