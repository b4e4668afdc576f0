//! Page transaction protocol for the host tree

use crate::document::BlockKey;
use crate::sync::PageId;
use serde::Serialize;

/// A single patch operation on the host's page containers
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PagePatch {
    /// Replace the blocks owned by an existing page
    #[serde(rename_all = "camelCase")]
    UpdatePage {
        page_index: usize,
        page_id: PageId,
        blocks: Vec<BlockKey>,
    },
    /// Insert a new page container
    #[serde(rename_all = "camelCase")]
    InsertPage {
        page_index: usize,
        page_id: PageId,
        blocks: Vec<BlockKey>,
    },
    /// Remove a page container (already emptied by earlier patches)
    #[serde(rename_all = "camelCase")]
    RemovePage { page_index: usize, page_id: PageId },
}

impl PagePatch {
    pub fn page_id(&self) -> PageId {
        match self {
            PagePatch::UpdatePage { page_id, .. }
            | PagePatch::InsertPage { page_id, .. }
            | PagePatch::RemovePage { page_id, .. } => *page_id,
        }
    }
}

/// Complete set of patches the host applies in one update cycle.
///
/// Patches are ordered: updates and inserts by ascending page index, then
/// removals by descending index.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTransaction {
    pub version: u64,
    pub patches: Vec<PagePatch>,
    /// Page count once every patch is applied
    pub page_count: usize,
}

impl PageTransaction {
    /// Create empty transaction
    pub fn new(version: u64) -> Self {
        Self {
            version,
            patches: Vec::new(),
            page_count: 0,
        }
    }

    /// Add a patch
    pub fn add_patch(&mut self, patch: PagePatch) {
        self.patches.push(patch);
    }

    /// Check if there are any patches
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Get patch count
    pub fn patch_count(&self) -> usize {
        self.patches.len()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
