//! Move history carried from one balancing pass to the next

use crate::balance::BalancerConfig;
use crate::document::BlockKey;
use rustc_hash::FxHashMap;

/// Direction a block travelled across a page boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveDirection {
    /// Pushed to the next page
    Forward,
    /// Pulled back to the previous page
    Backward,
}

impl MoveDirection {
    pub fn reverse(self) -> Self {
        match self {
            MoveDirection::Forward => MoveDirection::Backward,
            MoveDirection::Backward => MoveDirection::Forward,
        }
    }
}

/// Last accepted move of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRecord {
    pub key: BlockKey,
    pub direction: MoveDirection,
    pub at_ms: u64,
    pub pass: u64,
}

/// Balancer tracking state, passed into each pass and handed back out.
#[derive(Debug, Clone, Default)]
pub struct BalancerState {
    records: FxHashMap<BlockKey, MoveRecord>,
    passes: u64,
    total_moves: u64,
    refused_moves: u64,
}

impl BalancerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Passes run so far
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Moves accepted over all passes
    pub fn total_moves(&self) -> u64 {
        self.total_moves
    }

    /// Moves refused by the ping-pong guard over all passes
    pub fn refused_moves(&self) -> u64 {
        self.refused_moves
    }

    pub fn last_move(&self, key: BlockKey) -> Option<&MoveRecord> {
        self.records.get(&key)
    }

    /// Start a new pass and drop records whose cooldown has fully expired.
    /// Returns the pass number.
    pub(crate) fn begin_pass(&mut self, now_ms: u64, config: &BalancerConfig) -> u64 {
        self.passes += 1;
        let pass = self.passes;
        self.records.retain(|_, record| {
            now_ms.saturating_sub(record.at_ms) < config.cooldown_ms
                || pass.saturating_sub(record.pass) < config.cooldown_passes
        });
        pass
    }

    /// Whether moving `key` in `direction` is allowed.
    ///
    /// A move that reverses the block's previous move is refused while
    /// either cooldown window is still open.
    pub fn allows(
        &self,
        key: BlockKey,
        direction: MoveDirection,
        now_ms: u64,
        pass: u64,
        config: &BalancerConfig,
    ) -> bool {
        match self.records.get(&key) {
            Some(record) if record.direction == direction.reverse() => {
                let in_time = now_ms.saturating_sub(record.at_ms) < config.cooldown_ms;
                let in_passes = pass.saturating_sub(record.pass) < config.cooldown_passes;
                !(in_time || in_passes)
            }
            _ => true,
        }
    }

    /// Earliest time a refused reversal of `key` may be tried again. Once
    /// the time window has passed only the pass window can still block it,
    /// and every pass narrows that, so `now_ms` is returned.
    pub fn retry_at(&self, key: BlockKey, now_ms: u64, config: &BalancerConfig) -> u64 {
        self.records
            .get(&key)
            .map_or(now_ms, |record| record.at_ms.saturating_add(config.cooldown_ms).max(now_ms))
    }

    pub(crate) fn record(&mut self, key: BlockKey, direction: MoveDirection, now_ms: u64, pass: u64) {
        self.records.insert(
            key,
            MoveRecord {
                key,
                direction,
                at_ms: now_ms,
                pass,
            },
        );
        self.total_moves += 1;
    }

    pub(crate) fn note_refused(&mut self) {
        self.refused_moves += 1;
    }

    /// Forget all move history, e.g. after a full recalculation
    pub fn clear_history(&mut self) {
        self.records.clear();
    }
}
