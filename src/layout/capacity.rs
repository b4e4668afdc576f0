//! Page size configuration and the derived usable capacity

use crate::error::{PaginationError, Result};
use serde::{Deserialize, Serialize};

/// Page geometry as configured by the host application
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageConfig {
    pub page_height: f32,
    pub page_width: f32,
    pub padding_top: f32,
    pub padding_bottom: f32,
    /// Horizontal padding, applied on both sides
    pub padding_x: f32,
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            page_height: 1056.0, // 11" at 96 DPI
            page_width: 816.0,   // 8.5" at 96 DPI
            padding_top: 96.0,   // 1" margins
            padding_bottom: 96.0,
            padding_x: 96.0,
        }
    }
}

impl PageConfig {
    /// US Letter at 96 DPI with one inch padding
    pub fn letter() -> Self {
        Self::default()
    }

    /// A4 at 96 DPI with 2.5cm padding
    pub fn a4() -> Self {
        Self {
            page_height: 1123.0,
            page_width: 794.0,
            padding_top: 94.5,
            padding_bottom: 94.5,
            padding_x: 94.5,
        }
    }

    /// Get usable content height per page
    pub fn content_height(&self) -> f32 {
        self.page_height - self.padding_top - self.padding_bottom
    }

    /// Get usable content width
    pub fn content_width(&self) -> f32 {
        self.page_width - 2.0 * self.padding_x
    }
}

/// Validated page capacity.
///
/// Only constructible from a config whose usable height is a positive finite
/// number, so a zero or negative capacity never reaches the calculator or
/// the balancer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapacityModel {
    config: PageConfig,
    usable_height: f32,
}

impl CapacityModel {
    pub fn new(config: PageConfig) -> Result<Self> {
        let finite = [
            config.page_height,
            config.page_width,
            config.padding_top,
            config.padding_bottom,
            config.padding_x,
        ]
        .iter()
        .all(|v| v.is_finite());

        let usable_height = config.content_height();
        if !finite
            || config.padding_top < 0.0
            || config.padding_bottom < 0.0
            || usable_height <= 0.0
        {
            return Err(PaginationError::InvalidCapacity {
                page_height: config.page_height,
                padding_top: config.padding_top,
                padding_bottom: config.padding_bottom,
            });
        }

        Ok(Self {
            config,
            usable_height,
        })
    }

    /// Capacity with only a usable height, for callers that have no page geometry
    pub fn with_usable_height(usable_height: f32) -> Result<Self> {
        Self::new(PageConfig {
            page_height: usable_height,
            page_width: 0.0,
            padding_top: 0.0,
            padding_bottom: 0.0,
            padding_x: 0.0,
        })
    }

    pub fn usable_height(&self) -> f32 {
        self.usable_height
    }

    pub fn content_width(&self) -> f32 {
        self.config.content_width()
    }

    pub fn config(&self) -> &PageConfig {
        &self.config
    }
}
