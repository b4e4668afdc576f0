//! Boundary to the rich-text editing framework.
//!
//! The engine never touches a rendering tree directly. Everything it needs
//! from the editor goes through [`EditorHost`]:
//!
//! - `block_order`: the flat sequence of content blocks
//! - `node_box` / `measure_detached`: rendered heights
//! - `selection` / `set_selection` / `block_extent`: the caret
//! - `run_transaction`: the update entry point that moves blocks between pages
//!
//! Change notifications flow the other way, as calls into
//! [`crate::Paginator`].
//!
//! - `MemoryHost`: in-memory host for headless pagination and tests

mod memory;

pub use memory::MemoryHost;

use crate::document::{BlockExtent, BlockKey, NodeBox};
use crate::editing::Selection;
use crate::sync::PageTransaction;
use thiserror::Error;

/// The host refused or failed to apply a page transaction
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Narrow view of the editing framework used by the pagination engine
pub trait EditorHost {
    /// All content blocks in document order
    fn block_order(&self) -> Vec<BlockKey>;

    /// Rendered box of a block, or `None` if it has not been rendered
    fn node_box(&self, key: BlockKey) -> Option<NodeBox>;

    /// Measure blocks in an off-screen container so the visible surface is
    /// not disturbed. Hosts without one measure in place.
    fn measure_detached(&self, keys: &[BlockKey]) -> Vec<Option<NodeBox>> {
        keys.iter().map(|key| self.node_box(*key)).collect()
    }

    /// Current selection, if the editing surface has focus
    fn selection(&self) -> Option<Selection>;

    /// Move the caret / selection
    fn set_selection(&mut self, selection: Selection);

    /// Content length of a block, or `None` if the block no longer exists
    fn block_extent(&self, key: BlockKey) -> Option<BlockExtent>;

    /// Apply all patches inside one update cycle of the editing framework
    fn run_transaction(&mut self, transaction: &PageTransaction) -> Result<(), HostError>;
}
