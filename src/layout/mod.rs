//! Page capacity and break calculation

mod breaks;
mod capacity;

pub use breaks::{
    assign_blocks, calculate_breaks, calculate_breaks_with, BreakRules, MeasuredBlock, PageBreak,
};
pub use capacity::{CapacityModel, PageConfig};
