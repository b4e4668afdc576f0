//! Balancer thresholds

use crate::error::{PaginationError, Result};
use serde::{Deserialize, Serialize};

/// Tuning for the incremental balancer.
///
/// The values are empirical. Overflow and underflow use different
/// thresholds (hysteresis), and the cooldown keeps a block that was just
/// moved from being moved straight back.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BalancerConfig {
    /// Pixels a page may exceed its capacity before blocks are pushed out
    pub overflow_buffer: f32,
    /// Fraction of capacity below which a page pulls from the next one
    pub underflow_ratio: f32,
    /// An atomic block taller than this fraction of capacity is never relocated
    pub max_child_ratio: f32,
    /// Wall-time window in which a move may not be reversed
    pub cooldown_ms: u64,
    /// Number of passes in which a move may not be reversed
    pub cooldown_passes: u64,
    /// Block moves allowed in a single pass
    pub max_iterations: usize,
    /// Keep pulling blocks into an underfull page until it is filled.
    /// When false a page pulls at most one block per pass.
    pub fill_underflow: bool,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            overflow_buffer: 4.0,
            underflow_ratio: 0.85,
            max_child_ratio: 1.0,
            cooldown_ms: 600,
            cooldown_passes: 2,
            max_iterations: 50,
            fill_underflow: true,
        }
    }
}

impl BalancerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.overflow_buffer.is_finite() || self.overflow_buffer < 0.0 {
            return Err(PaginationError::InvalidConfig(format!(
                "overflow buffer must be a non-negative number, got {}",
                self.overflow_buffer
            )));
        }
        if !(self.underflow_ratio > 0.0 && self.underflow_ratio <= 1.0) {
            return Err(PaginationError::InvalidConfig(format!(
                "underflow ratio must be in (0, 1], got {}",
                self.underflow_ratio
            )));
        }
        if !(self.max_child_ratio.is_finite() && self.max_child_ratio > 0.0) {
            return Err(PaginationError::InvalidConfig(format!(
                "max child ratio must be positive, got {}",
                self.max_child_ratio
            )));
        }
        if self.max_iterations == 0 {
            return Err(PaginationError::InvalidConfig(
                "max iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
