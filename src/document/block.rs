//! Block-level element metadata

use serde::{Deserialize, Serialize};

/// Stable identity of a content block, supplied by the host editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BlockKey(pub u64);

/// The kind of block element
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BlockKind {
    /// Regular paragraph
    #[default]
    Paragraph,
    /// Heading with level (1-6)
    Heading { level: u8 },
    /// List item
    #[serde(rename_all = "camelCase")]
    ListItem { indent_level: u8 },
    /// Embedded image
    Image,
    /// Table
    Table,
    /// Horizontal rule
    HorizontalRule,
}

impl BlockKind {
    /// Create a heading, clamping the level to 1-6
    pub fn heading(level: u8) -> Self {
        BlockKind::Heading {
            level: level.clamp(1, 6),
        }
    }

    /// Whether this block must never be split across two pages.
    ///
    /// Paragraphs are the only kind a renderer could in principle flow
    /// across a page edge. The engine itself only ever moves whole blocks.
    pub fn is_atomic(&self) -> bool {
        !matches!(self, BlockKind::Paragraph)
    }

    /// Check if this is a heading
    pub fn is_heading(&self) -> bool {
        matches!(self, BlockKind::Heading { .. })
    }

    /// Check if this is a list item
    pub fn is_list_item(&self) -> bool {
        matches!(self, BlockKind::ListItem { .. })
    }
}

/// Rendered box of a content node as reported by the host
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeBox {
    /// Rendered pixel height, including the block's own vertical margins
    pub height: f32,
    pub kind: BlockKind,
    /// True for a block with no content (e.g. an empty paragraph)
    pub empty: bool,
}

impl NodeBox {
    pub fn new(height: f32, kind: BlockKind) -> Self {
        Self {
            height,
            kind,
            empty: false,
        }
    }

    /// An empty paragraph of the given line height
    pub fn empty_paragraph(height: f32) -> Self {
        Self {
            height,
            kind: BlockKind::Paragraph,
            empty: true,
        }
    }
}

/// Text extent of a block, used to re-place the caret
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockExtent {
    /// Length of the block's content in caret offsets
    pub len: usize,
    /// True when the block holds only plain text, so offsets map 1:1
    pub plain_text: bool,
}
