//! Engine configuration
//!
//! Everything tunable in one serde-friendly struct. Hosts usually pass it
//! as JSON; missing fields fall back to their defaults.

use crate::balance::BalancerConfig;
use crate::error::{PaginationError, Result};
use crate::layout::{BreakRules, CapacityModel, PageConfig};
use crate::schedule::SchedulerConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub page: PageConfig,
    pub balancer: BalancerConfig,
    pub scheduler: SchedulerConfig,
    pub rules: BreakRules,
    /// More dirty blocks than this in one pass triggers a full recalculation
    /// instead of incremental balancing
    pub incremental_block_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page: PageConfig::default(),
            balancer: BalancerConfig::default(),
            scheduler: SchedulerConfig::default(),
            rules: BreakRules::default(),
            incremental_block_limit: 8,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Check every section. Page geometry is validated by building the
    /// capacity model.
    pub fn validate(&self) -> Result<()> {
        CapacityModel::new(self.page)?;
        self.balancer.validate()?;
        if self.incremental_block_limit == 0 {
            return Err(PaginationError::InvalidConfig(
                "incremental block limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_letter() {
        let config = EngineConfig::default();
        assert_eq!(config.page.page_height, 1056.0);
        assert_eq!(config.page.content_height(), 864.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(
            r#"{"page":{"pageHeight":1200,"paddingTop":100,"paddingBottom":100},"balancer":{"maxIterations":10}}"#,
        )
        .unwrap();
        assert_eq!(config.page.content_height(), 1000.0);
        assert_eq!(config.page.page_width, 816.0);
        assert_eq!(config.balancer.max_iterations, 10);
        assert_eq!(config.balancer.underflow_ratio, 0.85);
        assert_eq!(config.scheduler.debounce_ms, 150);
    }

    #[test]
    fn test_from_json_rejects_bad_page() {
        let err = EngineConfig::from_json(r#"{"page":{"pageHeight":100,"paddingTop":60,"paddingBottom":60}}"#)
            .unwrap_err();
        assert!(matches!(err, PaginationError::InvalidCapacity { .. }));

        let err = EngineConfig::from_json("not json").unwrap_err();
        assert!(matches!(err, PaginationError::InvalidConfig(_)));
    }

    #[test]
    fn test_json_roundtrip() {
        let config = EngineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(EngineConfig::from_json(&json).unwrap(), config);
    }
}
