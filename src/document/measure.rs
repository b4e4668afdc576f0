//! Block measurement service with a per-block height cache

use crate::document::{BlockKey, NodeBox};
use crate::error::{PaginationError, Result};
use crate::host::EditorHost;
use crate::layout::MeasuredBlock;
use rustc_hash::{FxHashMap, FxHashSet};

/// Validated measurement of one block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub key: BlockKey,
    pub height: f32,
    pub atomic: bool,
    pub empty: bool,
    /// Headings prefer to share a page with the block they introduce
    pub keep_with_next: bool,
}

impl Measurement {
    fn from_box(key: BlockKey, node: &NodeBox) -> Result<Self> {
        if !node.height.is_finite() || node.height < 0.0 {
            return Err(PaginationError::InvalidHeight {
                key,
                height: node.height,
            });
        }
        Ok(Self {
            key,
            height: node.height,
            atomic: node.kind.is_atomic(),
            empty: node.empty,
            keep_with_next: node.kind.is_heading(),
        })
    }

    /// Stand-in for a node the host has not rendered yet
    fn unmeasured(key: BlockKey) -> Self {
        Self {
            key,
            height: 0.0,
            atomic: false,
            empty: true,
            keep_with_next: false,
        }
    }

    pub fn as_measured_block(&self) -> MeasuredBlock {
        MeasuredBlock::new(self.key, self.height, self.atomic).keep_with_next(self.keep_with_next)
    }
}

/// Caches block heights between passes.
///
/// Entries are dropped when the block's content changes and all at once when
/// the page capacity changes, since rendered heights depend on content width.
#[derive(Debug, Default)]
pub struct BlockMeasurer {
    cache: FxHashMap<BlockKey, Measurement>,
}

impl BlockMeasurer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Measure a single block, reading through the cache
    pub fn measure<H: EditorHost + ?Sized>(&mut self, host: &H, key: BlockKey) -> Result<Measurement> {
        if let Some(m) = self.cache.get(&key) {
            return Ok(*m);
        }
        let measurement = match host.node_box(key) {
            Some(node) => Measurement::from_box(key, &node)?,
            None => {
                tracing::debug!(?key, "block has no rendered box yet, measuring as empty");
                Measurement::unmeasured(key)
            }
        };
        self.cache.insert(key, measurement);
        Ok(measurement)
    }

    /// Measure every block in document order.
    ///
    /// Uncached blocks go through the host's detached measuring entry point in
    /// one batch so the visible surface is left alone during the calculation.
    pub fn measure_all<H: EditorHost + ?Sized>(
        &mut self,
        host: &H,
        order: &[BlockKey],
    ) -> Result<Vec<Measurement>> {
        let missing: Vec<BlockKey> = order
            .iter()
            .filter(|key| !self.cache.contains_key(key))
            .copied()
            .collect();

        if !missing.is_empty() {
            let boxes = host.measure_detached(&missing);
            for (i, key) in missing.iter().enumerate() {
                let measurement = match boxes.get(i).and_then(|b| b.as_ref()) {
                    Some(node) => Measurement::from_box(*key, node)?,
                    None => {
                        tracing::debug!(?key, "detached measurement missing, measuring as empty");
                        Measurement::unmeasured(*key)
                    }
                };
                self.cache.insert(*key, measurement);
            }
        }

        order.iter().map(|key| self.measure(host, *key)).collect()
    }

    /// Cached height of a block, if measured
    pub fn height(&self, key: BlockKey) -> Option<f32> {
        self.cache.get(&key).map(|m| m.height)
    }

    /// Cached measurement of a block, if any
    pub fn get(&self, key: BlockKey) -> Option<&Measurement> {
        self.cache.get(&key)
    }

    /// Drop a block's cached height after its content changed
    pub fn invalidate(&mut self, key: BlockKey) {
        self.cache.remove(&key);
    }

    /// Drop every cached height
    pub fn invalidate_all(&mut self) {
        self.cache.clear();
    }

    /// Forget blocks that are no longer part of the document
    pub fn retain(&mut self, live: &[BlockKey]) {
        let live: FxHashSet<BlockKey> = live.iter().copied().collect();
        self.cache.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}
