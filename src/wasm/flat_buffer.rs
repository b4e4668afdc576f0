//! Flat buffer protocol for zero-copy WASM bridge
//!
//! Binary format for the committed page layout, so a page overview can read
//! it straight out of linear memory:
//!
//! ## u32 Buffer Layout:
//! ```text
//! Header:
//! [0]     MAGIC (0x464F4C50 = "FOLP" for validation)
//! [1]     SCHEMA_VERSION (protocol version, currently 1)
//! [2]     version_lo (page tree version)
//! [3]     version_hi (page tree version)
//! [4]     page_count
//! [5]     block_count
//! [6]     u32_keys_offset (index where the block key table starts)
//! [7]     f32_blocks_offset (index in f32_data where block heights start)
//! [8..]   page data...
//!
//! Per-page: [page_index, page_id_lo, page_id_hi, first_block, block_count]
//!   first_block: index into the key table
//!
//! At u32_keys_offset:
//!   Per-block: [key_lo, key_hi]
//! ```
//!
//! ## f32 Buffer Layout:
//! ```text
//! Per-page: [content_height, fill_ratio]
//! At f32_blocks_offset: per-block height
//! ```

use crate::document::BlockKey;
use crate::sync::PageId;

/// Magic number for format validation: "FOLP" (FOLio Pages)
pub const MAGIC: u32 = 0x464F4C50;

/// Schema version for protocol compatibility checking
pub const SCHEMA_VERSION: u32 = 1;

/// Header size in u32 elements
pub const HEADER_SIZE: usize = 8;

/// Number of u32 values per page
pub const U32_PER_PAGE: usize = 5;

/// Number of u32 values per block key
pub const U32_PER_BLOCK: usize = 2;

/// Number of f32 values per page
pub const F32_PER_PAGE: usize = 2;

/// Block keys queued until finalize()
struct PendingBlock {
    key: BlockKey,
    height: f32,
}

/// Page buffer for zero-copy WASM transfer
pub struct PageBuffer {
    /// Integer data (header, page table, key table)
    pub u32_data: Vec<u32>,
    /// Float data (page heights, block heights)
    pub f32_data: Vec<f32>,

    // Keys are written after all pages so the page table stays contiguous
    pending_blocks: Vec<PendingBlock>,
    page_count: u32,
}

impl Default for PageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn split_u64(value: u64) -> (u32, u32) {
    ((value & 0xFFFFFFFF) as u32, (value >> 32) as u32)
}

fn join_u64(lo: u32, hi: u32) -> u64 {
    (lo as u64) | ((hi as u64) << 32)
}

impl PageBuffer {
    pub fn new() -> Self {
        Self {
            u32_data: Vec::with_capacity(256),
            f32_data: Vec::with_capacity(256),
            pending_blocks: Vec::new(),
            page_count: 0,
        }
    }

    pub fn clear(&mut self) {
        self.u32_data.clear();
        self.f32_data.clear();
        self.pending_blocks.clear();
        self.page_count = 0;
    }

    /// Pre-allocate buffers so JS-held pointers survive the next write.
    ///
    /// Buffers are reused when their capacity is sufficient.
    pub fn prepare(&mut self, pages: usize, blocks: usize) {
        let u32_target = HEADER_SIZE + pages * U32_PER_PAGE + blocks * U32_PER_BLOCK + 32;
        let f32_target = pages * F32_PER_PAGE + blocks + 32;

        if self.u32_data.capacity() < u32_target {
            self.u32_data = Vec::with_capacity(u32_target);
        } else {
            self.u32_data.clear();
        }

        if self.f32_data.capacity() < f32_target {
            self.f32_data = Vec::with_capacity(f32_target);
        } else {
            self.f32_data.clear();
        }

        self.pending_blocks.clear();
        self.page_count = 0;
    }

    /// Write header with placeholders for the offset table
    pub fn write_header(&mut self, version: u64) {
        let (lo, hi) = split_u64(version);
        self.u32_data.push(MAGIC); // [0] magic number
        self.u32_data.push(SCHEMA_VERSION); // [1] schema version
        self.u32_data.push(lo); // [2] version_lo
        self.u32_data.push(hi); // [3] version_hi
        self.u32_data.push(0); // [4] page_count (placeholder)
        self.u32_data.push(0); // [5] block_count (placeholder)
        self.u32_data.push(0); // [6] u32_keys_offset (placeholder)
        self.u32_data.push(0); // [7] f32_blocks_offset (placeholder)
    }

    /// Append one page and queue its blocks
    pub fn write_page(&mut self, page_index: usize, page_id: PageId, blocks: &[(BlockKey, f32)], capacity: f32) {
        let (id_lo, id_hi) = split_u64(page_id.0);
        let height: f32 = blocks.iter().map(|(_, h)| *h).sum();

        self.u32_data.push(page_index as u32);
        self.u32_data.push(id_lo);
        self.u32_data.push(id_hi);
        self.u32_data.push(self.pending_blocks.len() as u32);
        self.u32_data.push(blocks.len() as u32);

        self.f32_data.push(height);
        self.f32_data.push(if capacity > 0.0 { height / capacity } else { 0.0 });

        self.pending_blocks
            .extend(blocks.iter().map(|(key, height)| PendingBlock { key: *key, height: *height }));
        self.page_count += 1;
    }

    /// Write the key table and synchronize the header counts
    pub fn finalize(&mut self) {
        if self.u32_data.len() < HEADER_SIZE {
            return;
        }

        self.u32_data[6] = self.u32_data.len() as u32;
        self.u32_data[7] = self.f32_data.len() as u32;

        for block in &self.pending_blocks {
            let (lo, hi) = split_u64(block.key.0);
            self.u32_data.push(lo);
            self.u32_data.push(hi);
            self.f32_data.push(block.height);
        }

        self.u32_data[4] = self.page_count;
        self.u32_data[5] = self.pending_blocks.len() as u32;
        self.pending_blocks.clear();
    }

    /// Read the page table back, in page order. Returns `None` for a buffer
    /// that was not finalized or has a foreign header.
    pub fn decode(&self) -> Option<Vec<DecodedPage>> {
        if self.u32_data.len() < HEADER_SIZE || self.u32_data[0] != MAGIC || self.u32_data[1] != SCHEMA_VERSION {
            return None;
        }
        let page_count = self.u32_data[4] as usize;
        let keys_offset = self.u32_data[6] as usize;
        let heights_offset = self.u32_data[7] as usize;

        let mut pages = Vec::with_capacity(page_count);
        for page in 0..page_count {
            let base = HEADER_SIZE + page * U32_PER_PAGE;
            let row = self.u32_data.get(base..base + U32_PER_PAGE)?;
            let first = row[3] as usize;
            let count = row[4] as usize;

            let mut blocks = Vec::with_capacity(count);
            for block in first..first + count {
                let at = keys_offset + block * U32_PER_BLOCK;
                let key = join_u64(*self.u32_data.get(at)?, *self.u32_data.get(at + 1)?);
                blocks.push(BlockKey(key));
            }

            pages.push(DecodedPage {
                page_index: row[0] as usize,
                page_id: PageId(join_u64(row[1], row[2])),
                blocks,
                height: *self.f32_data.get(page * F32_PER_PAGE)?,
                block_heights: self.f32_data.get(heights_offset + first..heights_offset + first + count)?.to_vec(),
            });
        }
        Some(pages)
    }
}

/// One page read back from a [`PageBuffer`]
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    pub page_index: usize,
    pub page_id: PageId,
    pub blocks: Vec<BlockKey>,
    pub height: f32,
    pub block_heights: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_buffer_basic() {
        let mut buf = PageBuffer::new();
        buf.write_header(42);
        buf.write_page(0, PageId(7), &[(BlockKey(1), 300.0), (BlockKey(2), 200.0)], 1000.0);
        buf.finalize();

        assert_eq!(buf.u32_data[0], MAGIC);
        assert_eq!(buf.u32_data[1], SCHEMA_VERSION);
        assert_eq!(buf.u32_data[2], 42);
        assert_eq!(buf.u32_data[4], 1); // page_count
        assert_eq!(buf.u32_data[5], 2); // block_count
        assert_eq!(buf.f32_data[0], 500.0);
        assert_eq!(buf.f32_data[1], 0.5);
    }

    #[test]
    fn test_key_table_follows_pages() {
        let mut buf = PageBuffer::new();
        buf.write_header(1);
        buf.write_page(0, PageId(0), &[(BlockKey(10), 1.0)], 100.0);
        buf.write_page(1, PageId(1), &[(BlockKey(11), 2.0), (BlockKey(12), 3.0)], 100.0);
        buf.finalize();

        let keys_offset = buf.u32_data[6] as usize;
        assert_eq!(keys_offset, HEADER_SIZE + 2 * U32_PER_PAGE);
        assert_eq!(buf.u32_data[keys_offset], 10);
        assert_eq!(buf.u32_data[keys_offset + 2], 11);

        let heights_offset = buf.u32_data[7] as usize;
        assert_eq!(heights_offset, 2 * F32_PER_PAGE);
        assert_eq!(&buf.f32_data[heights_offset..], &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_decode_wide_keys() {
        let big = (1u64 << 40) + 5;
        let mut buf = PageBuffer::new();
        buf.write_header(u64::MAX);
        buf.write_page(0, PageId(big), &[(BlockKey(big), 12.5)], 100.0);
        buf.write_page(1, PageId(3), &[], 100.0);
        buf.finalize();

        let pages = buf.decode().unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].page_id, PageId(big));
        assert_eq!(pages[0].blocks, vec![BlockKey(big)]);
        assert_eq!(pages[0].block_heights, vec![12.5]);
        assert!(pages[1].blocks.is_empty());
        assert_eq!(buf.u32_data[3], u32::MAX);
    }

    #[test]
    fn test_prepare_prevents_reallocation() {
        let mut buf = PageBuffer::new();
        buf.prepare(10, 100);
        let u32_ptr = buf.u32_data.as_ptr();
        let f32_ptr = buf.f32_data.as_ptr();

        buf.write_header(1);
        for page in 0..10 {
            let blocks: Vec<(BlockKey, f32)> = (0..10).map(|b| (BlockKey(page * 10 + b), 10.0)).collect();
            buf.write_page(page as usize, PageId(page), &blocks, 1000.0);
        }
        buf.finalize();

        assert_eq!(buf.u32_data.as_ptr(), u32_ptr);
        assert_eq!(buf.f32_data.as_ptr(), f32_ptr);
    }

    #[test]
    fn test_decode_rejects_unfinished_buffer() {
        let buf = PageBuffer::new();
        assert!(buf.decode().is_none());

        let mut buf = PageBuffer::new();
        buf.write_header(1);
        buf.u32_data[0] = 0;
        assert!(buf.decode().is_none());
    }
}
