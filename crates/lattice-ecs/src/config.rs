//! Coordinator sizing.
//!
//! ```
//! use lattice_ecs::config::EcsConfig;
//!
//! let config = EcsConfig::from_json_str(r#"{ "max_entities": 128 }"#).unwrap();
//! assert_eq!(config.max_entities, 128);
//! assert_eq!(config.table_buckets, EcsConfig::default().table_buckets);
//! ```

use serde::{Deserialize, Serialize};

use crate::EcsError;

// ---------------------------------------------------------------------------
// EcsConfig
// ---------------------------------------------------------------------------

/// Capacities and hash table sizing for a [`Coordinator`](crate::coordinator::Coordinator).
///
/// Missing fields in a JSON document take their default values; unknown
/// fields are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EcsConfig {
    /// Size of the entity pool. Also the per-type component limit.
    pub max_entities: usize,
    /// Bucket count of every index table the coordinator creates.
    pub table_buckets: usize,
}

impl Default for EcsConfig {
    /// 5000 entities, 256 buckets.
    fn default() -> Self {
        Self {
            max_entities: 5000,
            table_buckets: 256,
        }
    }
}

impl EcsConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, EcsError> {
        let config: EcsConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot be built with.
    pub fn validate(&self) -> Result<(), EcsError> {
        if self.max_entities == 0 {
            return Err(EcsError::InvalidConfig(
                "max_entities must be at least 1".into(),
            ));
        }
        if self.max_entities > u32::MAX as usize {
            return Err(EcsError::InvalidConfig(format!(
                "max_entities must fit in 32 bits, got {}",
                self.max_entities
            )));
        }
        if self.table_buckets == 0 {
            return Err(EcsError::InvalidConfig(
                "table_buckets must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
