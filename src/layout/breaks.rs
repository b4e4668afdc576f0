//! Single-pass page break calculation
//!
//! Walks the measured blocks once, accumulating height, and closes a page
//! whenever the next block would not fit. Output depends only on the input
//! heights and capacity, which makes it safe to re-run after any edit.

use crate::document::BlockKey;
use crate::layout::CapacityModel;
use serde::Serialize;
use std::ops::RangeInclusive;

/// Calculator input: one block with its measured height
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeasuredBlock {
    pub key: BlockKey,
    pub height: f32,
    /// Must never be split across pages
    pub atomic: bool,
    /// Prefer to stay on the same page as the following block (headings)
    pub keep_with_next: bool,
}

impl MeasuredBlock {
    pub fn new(key: BlockKey, height: f32, atomic: bool) -> Self {
        Self {
            key,
            height,
            atomic,
            keep_with_next: false,
        }
    }

    pub fn keep_with_next(mut self, keep: bool) -> Self {
        self.keep_with_next = keep;
        self
    }
}

/// One page of the calculated layout
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBreak {
    /// Page index (0-based)
    pub page_index: usize,
    /// First block on the page
    pub start_block_index: usize,
    /// Last block on the page (inclusive)
    pub end_block_index: usize,
    /// Sum of block heights on the page
    pub height: f32,
}

impl PageBreak {
    /// Block indices covered by this page
    pub fn block_range(&self) -> RangeInclusive<usize> {
        self.start_block_index..=self.end_block_index
    }

    /// Number of blocks on this page
    pub fn block_count(&self) -> usize {
        self.end_block_index - self.start_block_index + 1
    }

    /// Check if this page contains a given block index
    pub fn contains_block(&self, index: usize) -> bool {
        self.block_range().contains(&index)
    }
}

/// Pagination rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BreakRules {
    /// Carry a page-final heading over to the next page with the block it introduces
    pub keep_heading_with_next: bool,
}

/// Calculate page breaks with the default rules
pub fn calculate_breaks(blocks: &[MeasuredBlock], capacity: &CapacityModel) -> Vec<PageBreak> {
    calculate_breaks_with(blocks, capacity, &BreakRules::default())
}

/// Calculate page breaks.
///
/// A block that alone exceeds the usable height gets a page of its own and
/// overflows it. An empty input yields no breaks.
pub fn calculate_breaks_with(
    blocks: &[MeasuredBlock],
    capacity: &CapacityModel,
    rules: &BreakRules,
) -> Vec<PageBreak> {
    let usable = capacity.usable_height();
    let mut breaks = Vec::new();
    if blocks.is_empty() {
        return breaks;
    }

    let mut start = 0;
    let mut height: f32 = 0.0;

    for (index, block) in blocks.iter().enumerate() {
        // Exact fit stays on the current page
        if index > start && height + block.height > usable {
            let mut end = index - 1;
            let mut page_height = height;

            let carried = &blocks[end];
            if rules.keep_heading_with_next
                && carried.keep_with_next
                && end > start
                && carried.height + block.height <= usable
            {
                page_height -= carried.height;
                end -= 1;
            }

            breaks.push(PageBreak {
                page_index: breaks.len(),
                start_block_index: start,
                end_block_index: end,
                height: page_height,
            });

            start = end + 1;
            height = blocks[start..index].iter().map(|b| b.height).sum();
        }

        if block.height > usable {
            if block.atomic {
                tracing::warn!(
                    key = ?block.key,
                    height = block.height,
                    usable,
                    "atomic block exceeds page capacity, placing it on its own page"
                );
            } else {
                tracing::debug!(
                    key = ?block.key,
                    height = block.height,
                    usable,
                    "block exceeds page capacity and cannot be split"
                );
            }
        }

        height += block.height;
    }

    breaks.push(PageBreak {
        page_index: breaks.len(),
        start_block_index: start,
        end_block_index: blocks.len() - 1,
        height,
    });

    breaks
}

/// Group block keys by page according to `breaks`
pub fn assign_blocks(blocks: &[MeasuredBlock], breaks: &[PageBreak]) -> Vec<Vec<BlockKey>> {
    breaks
        .iter()
        .map(|b| blocks[b.block_range()].iter().map(|m| m.key).collect())
        .collect()
}
