//! Caret capture and restore around page mutations

use crate::document::{BlockExtent, BlockKey};
use crate::host::EditorHost;

/// Position in document as (block, offset within block)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DocPosition {
    /// The block containing this position
    pub block: BlockKey,
    /// Caret offset within the block
    pub offset: usize,
}

impl DocPosition {
    /// Create a new document position
    pub fn new(block: BlockKey, offset: usize) -> Self {
        Self { block, offset }
    }
}

/// Text selection (anchor + active point)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Selection {
    /// The anchor point (fixed during extension)
    pub anchor: DocPosition,
    /// The active point (moves during extension)
    pub active: DocPosition,
}

impl Selection {
    /// Create a new selection
    pub fn new(anchor: DocPosition, active: DocPosition) -> Self {
        Self { anchor, active }
    }

    /// Create a collapsed selection (cursor)
    pub fn collapsed(position: DocPosition) -> Self {
        Self {
            anchor: position,
            active: position,
        }
    }

    /// Check if selection is collapsed (no text selected)
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.active
    }
}

/// Caret location recorded before a page mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorSnapshot {
    pub key: BlockKey,
    pub offset: usize,
    /// Active end of a non-collapsed selection
    pub active: Option<DocPosition>,
}

/// Counters for telemetry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorStats {
    pub captured: u64,
    pub restored: u64,
    /// Restores skipped because the block was gone
    pub lost: u64,
    /// Restores skipped because the host still had the caret in place
    pub unchanged: u64,
}

/// Keeps the caret attached to its block while pages are rebuilt
#[derive(Debug, Default)]
pub struct CursorTracker {
    stats: CursorStats,
}

impl CursorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the anchor block and offset of the current selection
    pub fn capture<H: EditorHost + ?Sized>(&mut self, host: &H) -> Option<CursorSnapshot> {
        let selection = host.selection()?;
        self.stats.captured += 1;
        Some(CursorSnapshot {
            key: selection.anchor.block,
            offset: selection.anchor.offset,
            active: (!selection.is_collapsed()).then_some(selection.active),
        })
    }

    /// Put the caret back into the snapshot's block.
    ///
    /// Returns true when the selection had to be re-applied. Nothing is
    /// written when the host still holds the same selection, or when the
    /// block no longer exists (the host then keeps its own placement).
    pub fn restore<H: EditorHost + ?Sized>(&mut self, host: &mut H, snapshot: CursorSnapshot) -> bool {
        let Some(extent) = host.block_extent(snapshot.key) else {
            tracing::debug!(key = ?snapshot.key, "caret block vanished during pagination");
            self.stats.lost += 1;
            return false;
        };

        let anchor = DocPosition::new(snapshot.key, resolve_offset(snapshot.offset, extent));
        let active = snapshot
            .active
            .and_then(|pos| {
                host.block_extent(pos.block)
                    .map(|e| DocPosition::new(pos.block, resolve_offset(pos.offset, e)))
            })
            .unwrap_or(anchor);

        let selection = Selection::new(anchor, active);
        if host.selection() == Some(selection) {
            self.stats.unchanged += 1;
            return false;
        }

        host.set_selection(selection);
        self.stats.restored += 1;
        true
    }

    pub fn stats(&self) -> CursorStats {
        self.stats
    }
}

/// Start of block stays at start; plain text keeps its exact offset; anything
/// else (inline widgets, nested nodes) lands at the end of the block.
fn resolve_offset(offset: usize, extent: BlockExtent) -> usize {
    if offset == 0 {
        0
    } else if extent.plain_text {
        offset.min(extent.len)
    } else {
        extent.len
    }
}
