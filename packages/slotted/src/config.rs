//! Tunables for the registry, pools and octree.
//!
//! Each section has sensible defaults, so a config file only needs to name the
//! values it overrides:
//!
//! ```toml
//! [registry]
//! erase_queue_capacity = 256
//!
//! [octree]
//! initial_root_size = 64.0
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default capacity of the bounded primary erase queue.
pub const DEFAULT_ERASE_QUEUE_CAPACITY: usize = 128;

/// Default time a producer will wait on the fallback erase queue.
pub const DEFAULT_FALLBACK_TIMEOUT_MS: u64 = 8;

/// Default capacity growth factor used when a pool outgrows its buffer.
pub const DEFAULT_GROWTH_FACTOR: f32 = 1.3;

/// Default edge length of a fresh octree root.
pub const DEFAULT_ROOT_SIZE: f32 = 16.0;

/// Default edge length at or below which octree nodes stop subdividing.
pub const DEFAULT_MIN_LEAF_SIZE: f32 = 1.0 / (1 << 4) as f32;

/// All configuration for the core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub registry: RegistryConfig,
    pub pool: PoolConfig,
    pub octree: OcTreeConfig,
}

impl CoreConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> Result<CoreConfig> {
        let config: CoreConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section for values the core cannot run with.
    pub fn validate(&self) -> Result<()> {
        self.registry.validate()?;
        self.pool.validate()?;
        self.octree.validate()
    }
}

/// Entity registry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Capacity of the lock-free primary erase queue.
    pub erase_queue_capacity: usize,
    /// How long a producer may wait for the fallback queue, in milliseconds.
    pub fallback_timeout_ms: u64,
    /// Upper bound on the fallback queue. `None` leaves it unbounded.
    pub fallback_capacity: Option<usize>,
}

impl RegistryConfig {
    /// The fallback wait as a `Duration`.
    pub fn fallback_timeout(&self) -> Duration {
        Duration::from_millis(self.fallback_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.erase_queue_capacity == 0 {
            return Err(Error::InvalidConfig(
                "registry.erase_queue_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            erase_queue_capacity: DEFAULT_ERASE_QUEUE_CAPACITY,
            fallback_timeout_ms: DEFAULT_FALLBACK_TIMEOUT_MS,
            fallback_capacity: None,
        }
    }
}

/// Dense synced pool settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of records the sink buffer is sized for before the first bind.
    pub initial_capacity: usize,
    /// Capacity multiplier applied on growth.
    pub growth_factor: f32,
}

impl PoolConfig {
    fn validate(&self) -> Result<()> {
        if !(self.growth_factor > 1.0) {
            return Err(Error::InvalidConfig(
                format!("pool.growth_factor must be greater than 1, got {}", self.growth_factor)));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            initial_capacity: 0,
            growth_factor: DEFAULT_GROWTH_FACTOR,
        }
    }
}

/// Octree settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcTreeConfig {
    /// Edge length of the root cube, centred on the origin.
    pub initial_root_size: f32,
    /// Nodes at or below this edge length store everything they receive.
    pub min_leaf_size: f32,
}

impl OcTreeConfig {
    fn validate(&self) -> Result<()> {
        if !(self.initial_root_size > 0.0) || !(self.min_leaf_size > 0.0) {
            return Err(Error::InvalidConfig(
                "octree sizes must be positive".into()));
        }
        Ok(())
    }
}

impl Default for OcTreeConfig {
    fn default() -> Self {
        OcTreeConfig {
            initial_root_size: DEFAULT_ROOT_SIZE,
            min_leaf_size: DEFAULT_MIN_LEAF_SIZE,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::from_toml_str("").unwrap();
        assert_eq!(config, CoreConfig::default());
        assert_eq!(config.registry.erase_queue_capacity, 128);
        assert_eq!(config.registry.fallback_timeout(), Duration::from_millis(8));
        assert_eq!(config.registry.fallback_capacity, None);
        assert_eq!(config.octree.min_leaf_size, 0.0625);
    }

    #[test]
    fn test_partial_override() {
        let config = CoreConfig::from_toml_str(r#"
            [registry]
            erase_queue_capacity = 4
            fallback_capacity = 16

            [pool]
            growth_factor = 2.0
        "#).unwrap();

        assert_eq!(config.registry.erase_queue_capacity, 4);
        assert_eq!(config.registry.fallback_timeout_ms, 8);
        assert_eq!(config.registry.fallback_capacity, Some(16));
        assert_eq!(config.pool.growth_factor, 2.0);
        assert_eq!(config.pool.initial_capacity, 0);
        assert_eq!(config.octree, OcTreeConfig::default());
    }

    #[test]
    fn test_rejects_invalid() {
        let err = CoreConfig::from_toml_str("[pool]\ngrowth_factor = 1.0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = CoreConfig::from_toml_str("[registry]\nerase_queue_capacity = 0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = CoreConfig::from_toml_str("[octree]\ninitial_root_size = -1.0").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = CoreConfig::from_toml_str("registry = 3").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
