//! Incremental page balancer
//!
//! Corrects a page assignment after a small, local edit by moving blocks
//! one at a time across page boundaries instead of recalculating every
//! break. A pass is a pure function of the current assignment, the block
//! heights and a [`BalancerState`]; the updated state is returned with the
//! result.
//!
//! Per page, in order:
//! - overflow: push the smallest trailing run that clears the excess to the
//!   front of the next page
//! - underflow: pull the first block of the next page back while it fits.
//!   With [`BalancerConfig::fill_underflow`] off, at most one block is pulled
//!   per page and pass; the default keeps pulling until the page is filled,
//!   which the move cap bounds.
//!
//! A pass stops after `max_iterations` moves and reports
//! [`BalanceOutcome::Capped`]; the assignment is still a valid partition and
//! the next scheduled pass continues from there. An overflow the ping-pong
//! guard refused to fix is reported as [`BalanceOutcome::Deferred`] with the
//! time the cooldown lifts.

mod config;
mod state;

pub use config::BalancerConfig;
pub use state::{BalancerState, MoveDirection, MoveRecord};

use crate::document::{BlockKey, BlockMeasurer, Measurement};
use crate::layout::CapacityModel;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

/// Height lookup used by the balancer
pub trait BlockHeights {
    fn block_height(&self, key: BlockKey) -> f32;
    fn is_atomic(&self, key: BlockKey) -> bool;
    /// Block without content, such as an empty paragraph
    fn is_empty_block(&self, key: BlockKey) -> bool;
}

impl BlockHeights for BlockMeasurer {
    fn block_height(&self, key: BlockKey) -> f32 {
        self.height(key).unwrap_or(0.0)
    }

    fn is_atomic(&self, key: BlockKey) -> bool {
        self.get(key).map(|m| m.atomic).unwrap_or(false)
    }

    fn is_empty_block(&self, key: BlockKey) -> bool {
        self.get(key).map(|m| m.empty).unwrap_or(false)
    }
}

impl BlockHeights for FxHashMap<BlockKey, Measurement> {
    fn block_height(&self, key: BlockKey) -> f32 {
        self.get(&key).map(|m| m.height).unwrap_or(0.0)
    }

    fn is_atomic(&self, key: BlockKey) -> bool {
        self.get(&key).map(|m| m.atomic).unwrap_or(false)
    }

    fn is_empty_block(&self, key: BlockKey) -> bool {
        self.get(&key).map(|m| m.empty).unwrap_or(false)
    }
}

/// One accepted block move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockMove {
    pub key: BlockKey,
    pub from_page: usize,
    pub to_page: usize,
    pub direction: MoveDirection,
}

/// How a pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceOutcome {
    /// Every page was checked
    Settled,
    /// The move budget ran out before every page was checked
    Capped,
    /// A page was left overflowing because its move was refused during
    /// cooldown; it can be retried from `retry_at_ms`
    Deferred { retry_at_ms: u64 },
}

/// Result of one balancing pass
#[derive(Debug, Clone)]
pub struct BalanceResult {
    pub pages: Vec<Vec<BlockKey>>,
    pub state: BalancerState,
    pub moves: Vec<BlockMove>,
    pub outcome: BalanceOutcome,
    /// Moves the ping-pong guard refused in this pass
    pub refused: usize,
}

impl BalanceResult {
    /// True when a follow-up pass is needed
    pub fn is_dirty(&self) -> bool {
        self.outcome != BalanceOutcome::Settled
    }
}

/// What to do with an overflowing page
enum OverflowPlan {
    /// Move this many trailing blocks
    Shed(usize),
    /// Nothing can be moved safely
    Pinned,
}

/// Incremental balancer
#[derive(Debug, Clone, Default)]
pub struct Balancer {
    config: BalancerConfig,
}

impl Balancer {
    pub fn new(config: BalancerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Run one balancing pass over `pages`.
    ///
    /// Never panics and always terminates: every loop step either moves a
    /// block (bounded by `max_iterations`) or advances to the next page.
    pub fn run<M: BlockHeights + ?Sized>(
        &self,
        pages: Vec<Vec<BlockKey>>,
        heights: &M,
        capacity: &CapacityModel,
        mut state: BalancerState,
        now_ms: u64,
    ) -> BalanceResult {
        let config = &self.config;
        let pass = state.begin_pass(now_ms, config);
        let cap = capacity.usable_height();

        let mut pages = pages;
        pages.retain(|page| !page.is_empty());
        if pages.is_empty() {
            pages.push(Vec::new());
        }

        let mut moves: Vec<BlockMove> = Vec::new();
        let mut outcome = BalanceOutcome::Settled;
        let mut refused = 0;
        let mut retry_at: Option<u64> = None;
        let mut index = 0;

        'pages: while index < pages.len() {
            let content = page_height(&pages[index], heights);

            if content > cap + config.overflow_buffer {
                match self.plan_overflow(&pages[index], content - cap, heights, cap) {
                    OverflowPlan::Pinned => {}
                    OverflowPlan::Shed(count) => {
                        let start = pages[index].len() - count;
                        let blocked = pages[index][start..]
                            .iter()
                            .find(|key| !state.allows(**key, MoveDirection::Forward, now_ms, pass, config))
                            .copied();

                        if let Some(key) = blocked {
                            tracing::debug!(?key, page = index, "forward move refused during cooldown");
                            state.note_refused();
                            refused += 1;
                            let at = state.retry_at(key, now_ms, config);
                            retry_at = Some(retry_at.map_or(at, |current| current.min(at)));
                        } else {
                            for _ in 0..count {
                                if moves.len() >= config.max_iterations {
                                    outcome = BalanceOutcome::Capped;
                                    break 'pages;
                                }
                                if index + 1 == pages.len() {
                                    pages.push(Vec::new());
                                }
                                let Some(key) = pages[index].pop() else {
                                    break;
                                };
                                pages[index + 1].insert(0, key);
                                state.record(key, MoveDirection::Forward, now_ms, pass);
                                moves.push(BlockMove {
                                    key,
                                    from_page: index,
                                    to_page: index + 1,
                                    direction: MoveDirection::Forward,
                                });
                            }
                        }
                    }
                }
                index += 1;
                continue;
            }

            if content < cap * config.underflow_ratio && index + 1 < pages.len() {
                let Some(&candidate) = pages[index + 1].first() else {
                    pages.remove(index + 1);
                    continue;
                };

                if content + heights.block_height(candidate) <= cap {
                    if !state.allows(candidate, MoveDirection::Backward, now_ms, pass, config) {
                        tracing::debug!(key = ?candidate, page = index, "backward move refused during cooldown");
                        state.note_refused();
                        refused += 1;
                    } else {
                        if moves.len() >= config.max_iterations {
                            outcome = BalanceOutcome::Capped;
                            break 'pages;
                        }
                        pages[index + 1].remove(0);
                        pages[index].push(candidate);
                        state.record(candidate, MoveDirection::Backward, now_ms, pass);
                        moves.push(BlockMove {
                            key: candidate,
                            from_page: index + 1,
                            to_page: index,
                            direction: MoveDirection::Backward,
                        });
                        if pages[index + 1].is_empty() {
                            pages.remove(index + 1);
                        }
                        if config.fill_underflow {
                            // Same page may still be underflowing
                            continue;
                        }
                    }
                }
            }

            index += 1;
        }

        if outcome == BalanceOutcome::Capped {
            tracing::warn!(
                moves = moves.len(),
                max_iterations = config.max_iterations,
                "balancing pass hit its move cap, deferring to next pass"
            );
        } else if let Some(retry_at_ms) = retry_at {
            tracing::debug!(retry_at_ms, refused, "overflow left in place until cooldown ends");
            outcome = BalanceOutcome::Deferred { retry_at_ms };
        }

        self.remove_empty_pages(&mut pages, heights, cap);

        BalanceResult {
            pages,
            state,
            moves,
            outcome,
            refused,
        }
    }

    /// Pick the smallest trailing run whose height covers `excess`, keeping
    /// at least one block on the page
    fn plan_overflow<M: BlockHeights + ?Sized>(
        &self,
        page: &[BlockKey],
        excess: f32,
        heights: &M,
        cap: f32,
    ) -> OverflowPlan {
        if page.len() <= 1 {
            if let Some(key) = page.first() {
                tracing::warn!(
                    ?key,
                    height = heights.block_height(*key),
                    cap,
                    "single block overflows its page, leaving it in place"
                );
            }
            return OverflowPlan::Pinned;
        }

        let mut run: SmallVec<[BlockKey; 4]> = SmallVec::new();
        let mut shed = 0.0;
        for key in page[1..].iter().rev() {
            run.push(*key);
            shed += heights.block_height(*key);
            if shed >= excess {
                break;
            }
        }

        let tallest = run.iter().copied().max_by(|a, b| {
            heights
                .block_height(*a)
                .total_cmp(&heights.block_height(*b))
        });
        if let Some(key) = tallest {
            let height = heights.block_height(key);
            if heights.is_atomic(key) && height > self.config.max_child_ratio * cap {
                tracing::warn!(?key, height, cap, "oversized atomic block cannot be relocated");
                return OverflowPlan::Pinned;
            }
        }

        OverflowPlan::Shed(run.len())
    }

    /// Drop empty pages and fold a page holding only one empty block into a
    /// neighbour that has room for it. The sole page is always kept.
    fn remove_empty_pages<M: BlockHeights + ?Sized>(&self, pages: &mut Vec<Vec<BlockKey>>, heights: &M, cap: f32) {
        pages.retain(|page| !page.is_empty());
        if pages.is_empty() {
            pages.push(Vec::new());
            return;
        }

        let mut index = 0;
        while index < pages.len() && pages.len() > 1 {
            let lone_empty = pages[index].len() == 1 && heights.is_empty_block(pages[index][0]);
            if !lone_empty {
                index += 1;
                continue;
            }

            let key = pages[index][0];
            let height = heights.block_height(key);
            let limit = cap + self.config.overflow_buffer;

            if index > 0 && page_height(&pages[index - 1], heights) + height <= limit {
                pages[index - 1].push(key);
                pages.remove(index);
            } else if index + 1 < pages.len() && page_height(&pages[index + 1], heights) + height <= limit {
                pages[index + 1].insert(0, key);
                pages.remove(index);
            } else {
                index += 1;
            }
        }
    }
}

/// Sum of block heights on a page
pub fn page_height<M: BlockHeights + ?Sized>(page: &[BlockKey], heights: &M) -> f32 {
    page.iter().map(|key| heights.block_height(*key)).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::validate_assignment;

    fn measurements(rows: &[(u64, f32, bool)]) -> FxHashMap<BlockKey, Measurement> {
        rows.iter()
            .map(|(key, height, atomic)| {
                (
                    BlockKey(*key),
                    Measurement {
                        key: BlockKey(*key),
                        height: *height,
                        atomic: *atomic,
                        empty: false,
                        keep_with_next: false,
                    },
                )
            })
            .collect()
    }

    fn paragraphs(heights: &[f32]) -> FxHashMap<BlockKey, Measurement> {
        let rows: Vec<(u64, f32, bool)> = heights
            .iter()
            .enumerate()
            .map(|(i, h)| (i as u64, *h, false))
            .collect();
        measurements(&rows)
    }

    fn keys(ids: &[u64]) -> Vec<BlockKey> {
        ids.iter().map(|i| BlockKey(*i)).collect()
    }

    fn capacity() -> CapacityModel {
        CapacityModel::with_usable_height(1000.0).unwrap()
    }

    #[test]
    fn test_overflow_pushes_trailing_block() {
        let heights = paragraphs(&[400.0, 400.0, 300.0, 100.0]);
        let balancer = Balancer::default();
        let result = balancer.run(
            vec![keys(&[0, 1, 2]), keys(&[3])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );

        assert_eq!(result.pages, vec![keys(&[0, 1]), keys(&[2, 3])]);
        assert_eq!(result.moves.len(), 1);
        assert_eq!(result.moves[0].direction, MoveDirection::Forward);
        assert_eq!(result.outcome, BalanceOutcome::Settled);
    }

    #[test]
    fn test_overflow_creates_new_page() {
        let heights = paragraphs(&[600.0, 300.0, 300.0]);
        let result = Balancer::default().run(
            vec![keys(&[0, 1, 2])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(result.pages, vec![keys(&[0, 1]), keys(&[2])]);
    }

    #[test]
    fn test_overflow_within_buffer_is_ignored() {
        let heights = paragraphs(&[500.0, 502.0]);
        let result = Balancer::default().run(
            vec![keys(&[0, 1])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert!(result.moves.is_empty());
        assert_eq!(result.pages.len(), 1);
    }

    #[test]
    fn test_underflow_pulls_fitting_block() {
        let heights = paragraphs(&[300.0, 200.0, 400.0, 500.0]);
        let result = Balancer::default().run(
            vec![keys(&[0, 1]), keys(&[2, 3])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        // 500 + 400 fits, 900 + 500 does not
        assert_eq!(result.pages, vec![keys(&[0, 1, 2]), keys(&[3])]);
        assert_eq!(result.moves[0].direction, MoveDirection::Backward);
    }

    #[test]
    fn test_underflow_empties_and_removes_next_page() {
        let heights = paragraphs(&[300.0, 200.0]);
        let result = Balancer::default().run(
            vec![keys(&[0]), keys(&[1])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(result.pages, vec![keys(&[0, 1])]);
    }

    #[test]
    fn test_underflow_skips_block_that_does_not_fit() {
        let heights = paragraphs(&[500.0, 600.0]);
        let result = Balancer::default().run(
            vec![keys(&[0]), keys(&[1])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert!(result.moves.is_empty());
    }

    #[test]
    fn test_single_oversized_block_left_alone() {
        let heights = measurements(&[(0, 1400.0, true)]);
        let result = Balancer::default().run(
            vec![keys(&[0])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(result.pages, vec![keys(&[0])]);
        assert!(result.moves.is_empty());
        assert_eq!(result.outcome, BalanceOutcome::Settled);
    }

    #[test]
    fn test_oversized_atomic_in_run_pins_page() {
        let heights = measurements(&[(0, 200.0, false), (1, 1100.0, true)]);
        let result = Balancer::default().run(
            vec![keys(&[0, 1])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(result.pages, vec![keys(&[0, 1])]);
        assert!(result.moves.is_empty());
    }

    #[test]
    fn test_ping_pong_guard_blocks_reverse() {
        let heights = paragraphs(&[400.0, 400.0, 300.0]);
        let balancer = Balancer::default();

        let first = balancer.run(vec![keys(&[0, 1, 2])], &heights, &capacity(), BalancerState::new(), 0);
        assert_eq!(first.pages, vec![keys(&[0, 1]), keys(&[2])]);

        // Block 1 shrinks, page 0 now has room for block 2 again
        let mut heights = heights;
        heights.get_mut(&BlockKey(1)).unwrap().height = 200.0;
        let second = balancer.run(first.pages.clone(), &heights, &capacity(), first.state, 100);
        assert_eq!(second.pages, first.pages);
        assert_eq!(second.refused, 1);

        // After the cooldown the pull is allowed
        let third = balancer.run(second.pages, &heights, &capacity(), second.state, 5_000);
        assert_eq!(third.pages, vec![keys(&[0, 1, 2])]);
        assert_eq!(third.state.refused_moves(), 1);
    }

    #[test]
    fn test_refused_overflow_is_deferred() {
        let mut heights = paragraphs(&[500.0, 400.0, 700.0]);
        let balancer = Balancer::default();

        let pulled = balancer.run(
            vec![keys(&[0]), keys(&[1]), keys(&[2])],
            &heights,
            &capacity(),
            BalancerState::new(),
            1_000,
        );
        assert_eq!(pulled.pages, vec![keys(&[0, 1]), keys(&[2])]);
        assert_eq!(pulled.outcome, BalanceOutcome::Settled);

        // Block 0 grows before block 1 may travel forward again
        heights.get_mut(&BlockKey(0)).unwrap().height = 700.0;
        let refused = balancer.run(pulled.pages, &heights, &capacity(), pulled.state, 1_250);
        assert_eq!(refused.pages, vec![keys(&[0, 1]), keys(&[2])]);
        assert_eq!(refused.outcome, BalanceOutcome::Deferred { retry_at_ms: 1_600 });
        assert!(refused.is_dirty());

        let retried = balancer.run(refused.pages, &heights, &capacity(), refused.state, 1_600);
        // 400 + 700 still overflows, so block 2 moves on as well
        assert_eq!(retried.pages, vec![keys(&[0]), keys(&[1]), keys(&[2])]);
        assert_eq!(retried.outcome, BalanceOutcome::Settled);
    }

    #[test]
    fn test_refused_underflow_is_not_deferred() {
        let heights = paragraphs(&[400.0, 400.0, 300.0]);
        let balancer = Balancer::default();
        let first = balancer.run(vec![keys(&[0, 1, 2])], &heights, &capacity(), BalancerState::new(), 0);

        let mut heights = heights;
        heights.get_mut(&BlockKey(1)).unwrap().height = 200.0;
        let second = balancer.run(first.pages, &heights, &capacity(), first.state, 100);
        assert_eq!(second.refused, 1);
        assert_eq!(second.outcome, BalanceOutcome::Settled);
    }

    #[test]
    fn test_single_pull_per_page() {
        let heights = paragraphs(&[100.0, 100.0, 100.0, 100.0]);
        let config = BalancerConfig {
            fill_underflow: false,
            ..BalancerConfig::default()
        };
        let result = Balancer::new(config).run(
            vec![keys(&[0]), keys(&[1, 2, 3])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(result.pages, vec![keys(&[0, 1]), keys(&[2, 3])]);
        assert_eq!(result.moves.len(), 1);

        let filled = Balancer::default().run(
            vec![keys(&[0]), keys(&[1, 2, 3])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(filled.pages, vec![keys(&[0, 1, 2, 3])]);
    }

    #[test]
    fn test_iteration_cap() {
        let heights = paragraphs(&[10.0; 200]);
        let all: Vec<u64> = (0..200).collect();
        let config = BalancerConfig {
            max_iterations: 50,
            ..BalancerConfig::default()
        };
        let cap = CapacityModel::with_usable_height(100.0).unwrap();
        let result = Balancer::new(config).run(vec![keys(&all)], &heights, &cap, BalancerState::new(), 0);

        assert_eq!(result.outcome, BalanceOutcome::Capped);
        assert_eq!(result.moves.len(), 50);
        assert!(result.is_dirty());
        assert!(validate_assignment(&result.pages, &keys(&all)).is_ok());
    }

    #[test]
    fn test_repeated_passes_converge() {
        let heights = paragraphs(&[250.0, 250.0, 250.0, 250.5, 250.0, 249.5, 250.0, 250.0]);
        let all: Vec<u64> = (0..8).collect();
        let balancer = Balancer::default();

        let mut pages = vec![keys(&all)];
        let mut state = BalancerState::new();
        let mut settled_at = None;
        for pass in 0..6u64 {
            let result = balancer.run(pages, &heights, &capacity(), state, pass * 1_000);
            assert!(validate_assignment(&result.pages, &keys(&all)).is_ok());
            if result.moves.is_empty() && settled_at.is_none() {
                settled_at = Some(pass);
            }
            if settled_at.is_some() {
                assert!(result.moves.is_empty(), "assignment changed after settling");
            }
            pages = result.pages;
            state = result.state;
        }
        assert!(settled_at.unwrap() <= 3);
    }

    #[test]
    fn test_lone_empty_block_folded_into_previous_page() {
        let mut heights = paragraphs(&[500.0, 20.0, 990.0]);
        heights.get_mut(&BlockKey(1)).unwrap().empty = true;
        // Page 0 is above the underflow threshold so no pull happens
        heights.get_mut(&BlockKey(0)).unwrap().height = 900.0;

        let result = Balancer::default().run(
            vec![keys(&[0]), keys(&[1]), keys(&[2])],
            &heights,
            &capacity(),
            BalancerState::new(),
            0,
        );
        assert_eq!(result.pages, vec![keys(&[0, 1]), keys(&[2])]);
    }

    #[test]
    fn test_sole_empty_page_kept() {
        let heights = paragraphs(&[]);
        let result = Balancer::default().run(vec![vec![]], &heights, &capacity(), BalancerState::new(), 0);
        assert_eq!(result.pages, vec![Vec::<BlockKey>::new()]);
    }
}
