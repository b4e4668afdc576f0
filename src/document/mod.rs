//! Content block model and measurement.
//!
//! The host editor owns the blocks. This crate only reads their identity,
//! kind and rendered height, and decides which page holds each of them.

mod block;
mod measure;

pub use block::{BlockExtent, BlockKey, BlockKind, NodeBox};
pub use measure::{BlockMeasurer, Measurement};
