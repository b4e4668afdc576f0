//! Debounced, frame-aligned pass scheduler

use serde::{Deserialize, Serialize};

/// Kind of change reported by the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    /// Ordinary edit such as typing; waits for the debounce window
    Content,
    /// Large structural edit such as a line-break key; runs on the next frame
    Structural,
}

/// Why a ticket was issued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassReason {
    /// Structural change bypassed the debounce
    Immediate,
    /// Quiet period elapsed
    Debounced,
    /// Changes kept arriving for longer than `max_wait_ms`
    MaxWait,
    /// Previous pass stopped early and asked to continue
    FollowUp,
    /// Previous pass failed and is being retried after a backoff
    Retry,
}

/// Permission to run one pagination pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassTicket {
    generation: u64,
    pub reason: PassReason,
    pub issued_at_ms: u64,
}

impl PassTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerConfig {
    /// Quiet period after the last notification before a pass runs
    pub debounce_ms: u64,
    /// Upper bound on how long a pending change may wait during continuous
    /// editing. `None` waits for quiet.
    pub max_wait_ms: Option<u64>,
    /// Consecutive failed passes retried without a new change
    pub retry_limit: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            max_wait_ms: None,
            retry_limit: 3,
        }
    }
}

/// Counters for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub notifications: u64,
    pub tickets: u64,
    pub superseded: u64,
    pub followups: u64,
    pub retries: u64,
}

/// Coalesces change notifications into pass tickets.
///
/// Single-threaded: the owner calls [`notify`](Self::notify) from change
/// handlers and [`on_frame`](Self::on_frame) once per animation frame.
#[derive(Debug, Clone, Default)]
pub struct ChangeScheduler {
    config: SchedulerConfig,
    generation: u64,
    pending: bool,
    immediate: bool,
    /// Earliest frame time for a follow-up pass
    followup_at: Option<u64>,
    followup_reason: Option<PassReason>,
    failures: u32,
    last_notify_ms: u64,
    first_pending_ms: Option<u64>,
    last_frame_ms: Option<u64>,
    stats: SchedulerStats,
}

impl ChangeScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// True while a notification is waiting for a pass
    pub fn has_pending(&self) -> bool {
        self.pending || self.followup_at.is_some()
    }

    /// Record a change. Any ticket issued before this call is superseded.
    pub fn notify(&mut self, kind: ChangeKind, now_ms: u64) {
        self.generation += 1;
        self.stats.notifications += 1;
        if self.pending {
            self.stats.superseded += 1;
        }
        self.pending = true;
        self.failures = 0;
        self.last_notify_ms = now_ms;
        self.first_pending_ms.get_or_insert(now_ms);
        if kind == ChangeKind::Structural {
            self.immediate = true;
        }
    }

    /// Called once per animation frame. Yields at most one ticket per frame.
    pub fn on_frame(&mut self, now_ms: u64) -> Option<PassTicket> {
        if self.last_frame_ms == Some(now_ms) {
            return None;
        }

        let reason = self.due(now_ms)?;
        self.last_frame_ms = Some(now_ms);
        self.pending = false;
        self.immediate = false;
        self.followup_at = None;
        self.followup_reason = None;
        self.first_pending_ms = None;
        self.stats.tickets += 1;

        tracing::trace!(generation = self.generation, ?reason, "pass ticket issued");
        Some(PassTicket {
            generation: self.generation,
            reason,
            issued_at_ms: now_ms,
        })
    }

    fn due(&self, now_ms: u64) -> Option<PassReason> {
        if self.pending {
            if self.immediate {
                return Some(PassReason::Immediate);
            }
            if now_ms.saturating_sub(self.last_notify_ms) >= self.config.debounce_ms {
                return Some(PassReason::Debounced);
            }
            if let (Some(max_wait), Some(first)) = (self.config.max_wait_ms, self.first_pending_ms) {
                if now_ms.saturating_sub(first) >= max_wait {
                    return Some(PassReason::MaxWait);
                }
            }
            return None;
        }
        match self.followup_at {
            Some(at) if now_ms >= at => self.followup_reason,
            _ => None,
        }
    }

    /// Entry check for a pass. Returns false when a newer notification
    /// arrived after the ticket was issued; the pass must then exit early.
    pub fn begin(&self, ticket: &PassTicket) -> bool {
        ticket.generation == self.generation
    }

    /// Report a finished pass. `retry_at_ms` asks for a follow-up pass on
    /// the first frame at or after that time.
    pub fn complete(&mut self, ticket: &PassTicket, retry_at_ms: Option<u64>) {
        self.failures = 0;
        if let Some(at) = retry_at_ms {
            self.request_followup_at(at);
        }
        tracing::trace!(generation = ticket.generation, ?retry_at_ms, "pass completed");
    }

    /// Report a pass that failed for a possibly transient reason. A retry is
    /// scheduled with exponential backoff until `retry_limit` consecutive
    /// failures; after that the next change starts over. Returns whether a
    /// retry was scheduled.
    pub fn fail(&mut self, now_ms: u64) -> bool {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.config.retry_limit {
            tracing::warn!(failures = self.failures, "giving up on failed pass until the next change");
            return false;
        }
        let backoff = self.config.debounce_ms.max(1) << (self.failures - 1).min(16);
        self.schedule_followup(now_ms.saturating_add(backoff), PassReason::Retry);
        self.stats.retries += 1;
        true
    }

    /// Ask for another pass, without a new change, on the first frame at or
    /// after `at_ms`
    pub fn request_followup_at(&mut self, at_ms: u64) {
        self.schedule_followup(at_ms, PassReason::FollowUp);
        self.stats.followups += 1;
    }

    fn schedule_followup(&mut self, at_ms: u64, reason: PassReason) {
        let at = self.followup_at.map_or(at_ms, |current| current.min(at_ms));
        self.followup_at = Some(at);
        if at == at_ms {
            self.followup_reason = Some(reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_yields_nothing() {
        let mut scheduler = ChangeScheduler::default();
        assert!(scheduler.on_frame(0).is_none());
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_debounce_waits_for_quiet() {
        let mut scheduler = ChangeScheduler::new(SchedulerConfig::default());
        scheduler.notify(ChangeKind::Content, 0);
        assert!(scheduler.on_frame(16).is_none());

        // Another keystroke pushes the deadline out
        scheduler.notify(ChangeKind::Content, 100);
        assert!(scheduler.on_frame(160).is_none());

        let ticket = scheduler.on_frame(250).unwrap();
        assert_eq!(ticket.reason, PassReason::Debounced);
        assert!(scheduler.begin(&ticket));
        assert_eq!(scheduler.stats().superseded, 1);

        // Nothing left
        assert!(scheduler.on_frame(500).is_none());
    }

    #[test]
    fn test_structural_bypasses_debounce() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Content, 0);
        scheduler.notify(ChangeKind::Structural, 5);
        let ticket = scheduler.on_frame(16).unwrap();
        assert_eq!(ticket.reason, PassReason::Immediate);
    }

    #[test]
    fn test_one_ticket_per_frame() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        assert!(scheduler.on_frame(16).is_some());
        scheduler.notify(ChangeKind::Structural, 16);
        assert!(scheduler.on_frame(16).is_none());
        assert!(scheduler.on_frame(32).is_some());
    }

    #[test]
    fn test_newer_notification_supersedes_ticket() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        let ticket = scheduler.on_frame(16).unwrap();
        scheduler.notify(ChangeKind::Content, 17);
        assert!(!scheduler.begin(&ticket));
        assert!(scheduler.has_pending());
    }

    #[test]
    fn test_max_wait_forces_pass() {
        let mut scheduler = ChangeScheduler::new(SchedulerConfig {
            debounce_ms: 150,
            max_wait_ms: Some(400),
            ..SchedulerConfig::default()
        });
        let mut issued = None;
        for step in 0..40u64 {
            let now = step * 16;
            scheduler.notify(ChangeKind::Content, now);
            if let Some(ticket) = scheduler.on_frame(now + 1) {
                issued = Some(ticket);
                break;
            }
        }
        let ticket = issued.unwrap();
        assert_eq!(ticket.reason, PassReason::MaxWait);
        assert!(ticket.issued_at_ms >= 400);
    }

    #[test]
    fn test_followup_after_capped_pass() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        let ticket = scheduler.on_frame(16).unwrap();
        scheduler.complete(&ticket, Some(16));

        let next = scheduler.on_frame(32).unwrap();
        assert_eq!(next.reason, PassReason::FollowUp);
        assert!(scheduler.begin(&next));
        scheduler.complete(&next, None);
        assert!(scheduler.on_frame(48).is_none());
        assert_eq!(scheduler.stats().followups, 1);
    }

    #[test]
    fn test_followup_waits_for_retry_time() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        let ticket = scheduler.on_frame(16).unwrap();
        scheduler.complete(&ticket, Some(600));

        assert!(scheduler.has_pending());
        assert!(scheduler.on_frame(32).is_none());
        assert!(scheduler.on_frame(584).is_none());
        let next = scheduler.on_frame(600).unwrap();
        assert_eq!(next.reason, PassReason::FollowUp);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn test_earliest_followup_wins() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.request_followup_at(900);
        scheduler.request_followup_at(300);
        scheduler.request_followup_at(700);
        assert!(scheduler.on_frame(299).is_none());
        assert!(scheduler.on_frame(300).is_some());
        assert!(scheduler.on_frame(1_000).is_none());
    }

    #[test]
    fn test_failed_pass_retried_with_backoff() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        scheduler.on_frame(16).unwrap();

        assert!(scheduler.fail(16));
        assert!(scheduler.on_frame(100).is_none());
        let retry = scheduler.on_frame(166).unwrap();
        assert_eq!(retry.reason, PassReason::Retry);

        // Second failure doubles the wait
        assert!(scheduler.fail(166));
        assert!(scheduler.on_frame(400).is_none());
        assert!(scheduler.on_frame(466).is_some());
        assert_eq!(scheduler.stats().retries, 2);
    }

    #[test]
    fn test_retry_budget_is_bounded() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        let mut attempts = 0;
        let mut now = 0;
        for _ in 0..500 {
            now += 16;
            if scheduler.on_frame(now).is_some() {
                attempts += 1;
                scheduler.fail(now);
            }
        }
        // First attempt plus three retries
        assert_eq!(attempts, 4);
        assert!(!scheduler.has_pending());

        // A new change resets the budget
        scheduler.notify(ChangeKind::Structural, now + 1);
        assert!(scheduler.on_frame(now + 16).is_some());
        assert!(scheduler.fail(now + 16));
    }

    #[test]
    fn test_success_resets_failures() {
        let mut scheduler = ChangeScheduler::default();
        scheduler.notify(ChangeKind::Structural, 0);
        let ticket = scheduler.on_frame(16).unwrap();
        scheduler.fail(16);
        scheduler.fail(16);
        scheduler.complete(&ticket, None);
        assert_eq!(scheduler.failures, 0);
    }
}
