//! Error types for the pagination engine
//!
//! Only the fatal class lives here. Recoverable conditions (oversized
//! atomic blocks, a vanished caret target, an empty intermediate page) are
//! logged and the pass carries on; a runaway balancer is reported through
//! [`crate::balance::BalanceOutcome::Capped`].

use crate::document::BlockKey;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PaginationError {
    #[error("invalid page capacity: height {page_height} with padding {padding_top}/{padding_bottom}")]
    InvalidCapacity {
        page_height: f32,
        padding_top: f32,
        padding_bottom: f32,
    },

    #[error("block {key:?} measured with invalid height {height}")]
    InvalidHeight { key: BlockKey, height: f32 },

    #[error("page partition violated: {0}")]
    PartitionViolation(String),

    #[error("host rejected page transaction: {0}")]
    HostRejected(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for PaginationError {
    fn from(e: serde_json::Error) -> Self {
        PaginationError::InvalidConfig(e.to_string())
    }
}

pub type Result<T, E = PaginationError> = std::result::Result<T, E>;
