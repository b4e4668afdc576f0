//! Folio: page layout for a continuous rich-text document
//!
//! This crate keeps a flat sequence of content blocks distributed across
//! fixed-size pages while the document is being edited:
//! - Break calculation: a pure, single-pass page break calculator for
//!   initial load and large structural edits
//! - Incremental balancing: moves a few blocks across page boundaries after
//!   small edits, with hysteresis and a ping-pong guard
//! - Caret preservation while blocks change pages
//! - Debounced, frame-aligned scheduling of pagination passes
//! - One host transaction and one page count event per pass
//!
//! The editing framework is reached only through [`host::EditorHost`].

pub mod balance;
pub mod config;
pub mod document;
pub mod editing;
pub mod error;
pub mod host;
pub mod layout;
pub mod schedule;
pub mod sync;
pub mod wasm;

// Re-export WASM types for direct use
pub use wasm::WasmPaginator;

// Re-export primary types
pub use balance::{BalanceOutcome, BalanceResult, Balancer, BalancerConfig, BalancerState, BlockMove};
pub use config::EngineConfig;
pub use document::{BlockKey, BlockKind, BlockMeasurer, Measurement, NodeBox};
pub use editing::{CursorSnapshot, CursorTracker, DocPosition, Selection};
pub use error::{PaginationError, Result};
pub use host::{EditorHost, MemoryHost};
pub use layout::{calculate_breaks, BreakRules, CapacityModel, MeasuredBlock, PageBreak, PageConfig};
pub use schedule::{ChangeKind, ChangeScheduler, PassReason, PassTicket, SchedulerConfig};
pub use sync::{PageSummary, PageSync, PageTree};

use rustc_hash::FxHashSet;

/// How a pass computed the new assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStrategy {
    /// Break calculation over the whole document
    Full,
    /// Balancer over the current assignment
    Incremental,
}

/// Details of a pass that ran to completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub strategy: PassStrategy,
    pub page_count: usize,
    /// Block moves made by the balancer
    pub moves: usize,
    /// Whether a host transaction was applied
    pub committed: bool,
    /// The balancer hit its move cap
    pub capped: bool,
    /// Time of the follow-up pass the balancer asked for, after hitting its
    /// move cap or leaving an overflow in place during cooldown
    pub retry_at_ms: Option<u64>,
    /// The caret had to be put back after the transaction
    pub cursor_restored: bool,
}

/// Result of driving the engine for one frame
#[derive(Debug, Clone, PartialEq)]
pub enum PassReport {
    /// Nothing was due this frame
    Idle,
    /// A newer change arrived between scheduling and running the pass
    Superseded,
    /// The pass was abandoned; pages are unchanged
    Skipped(PaginationError),
    Completed(PassOutcome),
}

impl PassReport {
    pub fn outcome(&self) -> Option<&PassOutcome> {
        match self {
            PassReport::Completed(outcome) => Some(outcome),
            _ => None,
        }
    }
}

/// The pagination engine bound to one editor host
pub struct Paginator<H: EditorHost> {
    host: H,
    config: EngineConfig,
    measurer: BlockMeasurer,
    balancer: Balancer,
    balancer_state: BalancerState,
    scheduler: ChangeScheduler,
    scheduled: Option<PassTicket>,
    cursor: CursorTracker,
    tree: PageTree,
    sync: PageSync,
    dirty: FxHashSet<BlockKey>,
    needs_full: bool,
    passes: u64,
}

impl<H: EditorHost> Paginator<H> {
    /// Create an engine. Nothing is paginated until the first pass.
    pub fn new(host: H, config: EngineConfig) -> Self {
        Self {
            host,
            measurer: BlockMeasurer::new(),
            balancer: Balancer::new(config.balancer),
            balancer_state: BalancerState::new(),
            scheduler: ChangeScheduler::new(config.scheduler),
            scheduled: None,
            cursor: CursorTracker::new(),
            tree: PageTree::new(),
            sync: PageSync::new(),
            dirty: FxHashSet::default(),
            needs_full: true,
            passes: 0,
            config,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Mutable host access. Edits made through it must be reported with
    /// [`on_content_changed`](Self::on_content_changed) or
    /// [`on_structural_key`](Self::on_structural_key).
    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn into_host(self) -> H {
        self.host
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Committed page containers
    pub fn pages(&self) -> &PageTree {
        &self.tree
    }

    pub fn page_count(&self) -> usize {
        self.tree.page_count()
    }

    /// Summaries of the committed pages
    pub fn summaries(&self) -> Vec<PageSummary> {
        sync::summarize(&self.tree, &self.measurer)
    }

    /// Cached height of a block, 0 when it has not been measured
    pub fn block_height(&self, key: BlockKey) -> f32 {
        self.measurer.height(key).unwrap_or(0.0)
    }

    pub fn balancer_state(&self) -> &BalancerState {
        &self.balancer_state
    }

    pub fn scheduler(&self) -> &ChangeScheduler {
        &self.scheduler
    }

    pub fn cursor_stats(&self) -> editing::CursorStats {
        self.cursor.stats()
    }

    /// Completed passes
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Change the page geometry. Every cached height is dropped, since
    /// rendered heights depend on the content width, and the next frame runs
    /// a full pass.
    pub fn set_page_config(&mut self, page: PageConfig, now_ms: u64) {
        self.config.page = page;
        self.measurer.invalidate_all();
        self.needs_full = true;
        self.scheduler.notify(ChangeKind::Structural, now_ms);
    }

    /// Register a callback invoked once per committed page transaction
    pub fn on_page_count_change<F>(&mut self, listener: F)
    where
        F: FnMut(&[PageSummary]) + 'static,
    {
        self.sync.subscribe(Box::new(listener));
    }

    /// Blocks changed content (typing, formatting, insertion)
    pub fn on_content_changed(&mut self, keys: &[BlockKey], now_ms: u64) {
        for key in keys {
            self.measurer.invalidate(*key);
            self.dirty.insert(*key);
        }
        self.scheduler.notify(ChangeKind::Content, now_ms);
    }

    /// A structural key (such as Enter) was pressed. The next frame runs a
    /// full pass without waiting for the debounce window.
    pub fn on_structural_key(&mut self, now_ms: u64) {
        self.needs_full = true;
        self.scheduler.notify(ChangeKind::Structural, now_ms);
    }

    /// Drive the engine from the host's animation frame callback
    pub fn on_frame(&mut self, now_ms: u64) -> PassReport {
        self.schedule(now_ms);
        self.run_scheduled(now_ms)
    }

    /// Take a due ticket from the scheduler and hold it for
    /// [`run_scheduled`](Self::run_scheduled). For hosts that fire a debounce
    /// timer and then wait for the next animation frame. Returns whether a
    /// pass is waiting.
    pub fn schedule(&mut self, now_ms: u64) -> bool {
        if self.scheduled.is_none() {
            self.scheduled = self.scheduler.on_frame(now_ms);
        }
        self.scheduled.is_some()
    }

    /// Run the held ticket. A ticket overtaken by a newer change exits
    /// without touching the pages; the change gets a ticket of its own.
    pub fn run_scheduled(&mut self, now_ms: u64) -> PassReport {
        let Some(ticket) = self.scheduled.take() else {
            return PassReport::Idle;
        };
        if !self.scheduler.begin(&ticket) {
            tracing::debug!(generation = ticket.generation(), "pass superseded before start");
            return PassReport::Superseded;
        }

        let report = self.run_pass(now_ms);
        self.after_pass(Some(&ticket), &report, now_ms);
        report
    }

    /// Run a pass immediately, outside the scheduler (e.g. on document load)
    pub fn paginate_now(&mut self, now_ms: u64) -> PassReport {
        let report = self.run_pass(now_ms);
        self.after_pass(None, &report, now_ms);
        report
    }

    /// Hand leftover work back to the scheduler
    fn after_pass(&mut self, ticket: Option<&PassTicket>, report: &PassReport, now_ms: u64) {
        let retry_at = report.outcome().and_then(|o| o.retry_at_ms);
        match (report, ticket) {
            // The host may accept the same transaction on a later frame
            (PassReport::Skipped(PaginationError::HostRejected(_)), _) => {
                self.scheduler.fail(now_ms);
            }
            (_, Some(ticket)) => self.scheduler.complete(ticket, retry_at),
            (_, None) => {
                if let Some(at) = retry_at {
                    self.scheduler.request_followup_at(at);
                }
            }
        }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn run_pass(&mut self, now_ms: u64) -> PassReport {
        match self.try_pass(now_ms) {
            Ok(outcome) => {
                tracing::debug!(
                    strategy = ?outcome.strategy,
                    pages = outcome.page_count,
                    moves = outcome.moves,
                    committed = outcome.committed,
                    "pagination pass finished"
                );
                PassReport::Completed(outcome)
            }
            Err(e) => {
                tracing::error!(error = %e, "pagination pass skipped");
                PassReport::Skipped(e)
            }
        }
    }

    fn try_pass(&mut self, now_ms: u64) -> Result<PassOutcome> {
        // Zero or negative capacity never reaches the calculator or balancer
        let capacity = CapacityModel::new(self.config.page)?;
        self.config.balancer.validate()?;

        let order = self.host.block_order();
        self.measurer.retain(&order);

        // The host already placed inserted blocks inside its containers
        let in_place = self.tree.absorb(&order);
        let reconciled = if self.needs_full || !in_place {
            None
        } else {
            self.tree.reconcile(&order)
        };
        let incremental = reconciled.filter(|_| self.dirty.len() <= self.config.incremental_block_limit);

        let measurements = self.measurer.measure_all(&self.host, &order)?;

        let (strategy, assignment, moves, next_state, balance) = match incremental {
            Some(pages) => {
                let result = self
                    .balancer
                    .run(pages, &self.measurer, &capacity, self.balancer_state.clone(), now_ms);
                let moves = result.moves.len();
                (PassStrategy::Incremental, result.pages, moves, Some(result.state), result.outcome)
            }
            None => {
                let blocks: Vec<MeasuredBlock> = measurements.iter().map(|m| m.as_measured_block()).collect();
                let breaks = layout::calculate_breaks_with(&blocks, &capacity, &self.config.rules);
                let mut assignment = layout::assign_blocks(&blocks, &breaks);
                if assignment.is_empty() {
                    assignment.push(Vec::new());
                }
                (PassStrategy::Full, assignment, 0, None, BalanceOutcome::Settled)
            }
        };

        sync::validate_assignment(&assignment, &order)?;

        let snapshot = self.cursor.capture(&self.host);
        let committed = self
            .sync
            .commit(&mut self.host, &mut self.tree, &assignment, &self.measurer)?;
        let cursor_restored = match snapshot {
            Some(snapshot) if committed => self.cursor.restore(&mut self.host, snapshot),
            _ => false,
        };

        // Move history only counts once the host has accepted the moves
        match next_state {
            Some(state) => self.balancer_state = state,
            None => self.balancer_state.clear_history(),
        }
        self.dirty.clear();
        self.needs_full = false;
        self.passes += 1;

        let retry_at_ms = match balance {
            BalanceOutcome::Settled => None,
            BalanceOutcome::Capped => Some(now_ms),
            BalanceOutcome::Deferred { retry_at_ms } => Some(retry_at_ms),
        };

        Ok(PassOutcome {
            strategy,
            page_count: self.tree.page_count(),
            moves,
            committed,
            capped: balance == BalanceOutcome::Capped,
            retry_at_ms,
            cursor_restored,
        })
    }
}

impl<H: EditorHost + std::fmt::Debug> std::fmt::Debug for Paginator<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Paginator")
            .field("host", &self.host)
            .field("config", &self.config)
            .field("pages", &self.tree.page_count())
            .field("passes", &self.passes)
            .finish()
    }
}
