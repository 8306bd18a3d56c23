//! # Admiral Core Configuration System
//!
//! Typed, layered configuration for the provisioning orchestration engine.
//!
//! ## Architecture
//!
//! - **Defaults first**: every field has a serde default matching the tunables
//!   in [`crate::constants::defaults`]
//! - **Environment Awareness**: `config/admiral.toml` is overlaid by
//!   `config/admiral.<env>.toml` and then by `ADMIRAL__SECTION__KEY` variables
//! - **Explicit Validation**: nonsensical intervals are rejected at load time
//! - **Runtime properties**: tunables that operators change without a restart
//!   live in the document store and are read through [`ConfigurationStore`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use admiral_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let ttl = manager.config().session_cache.ttl();
//! let retries = manager.config().retry.operation.max_retries;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;
pub mod properties;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;
pub use properties::{get_or_default, ConfigurationStore, StaticConfigurationStore, StoreConfigurationStore};

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmiralConfig {
    pub task: TaskConfig,
    pub retry: RetryConfig,
    pub session_cache: SessionCacheConfig,
    pub seeding: SeedingConfig,
    pub pks: PksConfig,
    pub maintenance: MaintenanceConfig,
    pub composite: CompositeConfig,
}

/// Task document lifetime and outbound operation expirations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    pub expiration_seconds: u64,
    pub default_operation_timeout_seconds: u64,
    pub long_operation_timeout_seconds: u64,
}

impl TaskConfig {
    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_seconds)
    }

    pub fn default_operation_timeout(&self) -> Duration {
        Duration::from_secs(self.default_operation_timeout_seconds)
    }

    pub fn long_operation_timeout(&self) -> Duration {
        Duration::from_secs(self.long_operation_timeout_seconds)
    }
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            expiration_seconds: defaults::TASK_EXPIRATION_SECONDS,
            default_operation_timeout_seconds: defaults::DEFAULT_OPERATION_TIMEOUT_SECONDS,
            long_operation_timeout_seconds: defaults::LONG_OPERATION_TIMEOUT_SECONDS,
        }
    }
}

/// Fixed-delay retry budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay_seconds: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay_seconds: u64) -> Self {
        Self {
            max_retries,
            delay_seconds,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Remote adapter operations
    pub operation: RetryPolicy,
    /// Session acquisition against an external endpoint
    pub login: RetryPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            operation: RetryPolicy::new(
                defaults::OPERATION_MAX_RETRIES,
                defaults::OPERATION_RETRY_DELAY_SECONDS,
            ),
            login: RetryPolicy::new(
                defaults::LOGIN_MAX_RETRIES,
                defaults::LOGIN_RETRY_DELAY_SECONDS,
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionCacheConfig {
    pub ttl_seconds: u64,
    /// Sweep margin as a multiple of the maintenance interval
    pub sweep_margin_multiplier: u32,
}

impl SessionCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_margin(&self, maintenance: &MaintenanceConfig) -> Duration {
        maintenance.interval() * self.sweep_margin_multiplier
    }
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: defaults::SESSION_TTL_SECONDS,
            sweep_margin_multiplier: defaults::SWEEP_MARGIN_MULTIPLIER,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedingConfig {
    /// Fallback when the runtime property is absent
    pub max_build_retries: u32,
    pub build_poll_interval_seconds: u64,
    pub base_image_poll_interval_seconds: u64,
    /// A build still in progress after this many polls counts as a failed attempt
    pub max_polls_per_attempt: u32,
}

impl SeedingConfig {
    pub fn build_poll_interval(&self) -> Duration {
        Duration::from_secs(self.build_poll_interval_seconds)
    }

    pub fn base_image_poll_interval(&self) -> Duration {
        Duration::from_secs(self.base_image_poll_interval_seconds)
    }
}

impl Default for SeedingConfig {
    fn default() -> Self {
        Self {
            max_build_retries: defaults::MAX_BUILD_RETRIES,
            build_poll_interval_seconds: defaults::BUILD_POLL_INTERVAL_SECONDS,
            base_image_poll_interval_seconds: defaults::BASE_IMAGE_POLL_INTERVAL_SECONDS,
            max_polls_per_attempt: defaults::MAX_POLLS_PER_BUILD_ATTEMPT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PksConfig {
    pub poll_interval_seconds: u64,
    pub max_poll_failures: u32,
}

impl PksConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }
}

impl Default for PksConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: defaults::PKS_POLL_INTERVAL_SECONDS,
            max_poll_failures: defaults::PKS_MAX_POLL_FAILURES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    pub interval_seconds: u64,
    pub expiration_check_interval_seconds: u64,
}

impl MaintenanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn expiration_check_interval(&self) -> Duration {
        Duration::from_secs(self.expiration_check_interval_seconds)
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval_seconds: defaults::MAINTENANCE_INTERVAL_SECONDS,
            expiration_check_interval_seconds: defaults::EXPIRATION_CHECK_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeConfig {
    pub enabled: bool,
    pub channel_capacity: usize,
}

impl Default for CompositeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channel_capacity: defaults::EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl AdmiralConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let positive = [
            ("task.expiration_seconds", self.task.expiration_seconds),
            (
                "task.default_operation_timeout_seconds",
                self.task.default_operation_timeout_seconds,
            ),
            (
                "task.long_operation_timeout_seconds",
                self.task.long_operation_timeout_seconds,
            ),
            ("session_cache.ttl_seconds", self.session_cache.ttl_seconds),
            ("maintenance.interval_seconds", self.maintenance.interval_seconds),
            (
                "maintenance.expiration_check_interval_seconds",
                self.maintenance.expiration_check_interval_seconds,
            ),
            (
                "seeding.build_poll_interval_seconds",
                self.seeding.build_poll_interval_seconds,
            ),
            ("pks.poll_interval_seconds", self.pks.poll_interval_seconds),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::invalid_value(
                    field,
                    "0",
                    "must be greater than 0",
                ));
            }
        }

        if self.seeding.max_polls_per_attempt == 0 {
            return Err(ConfigurationError::invalid_value(
                "seeding.max_polls_per_attempt",
                "0",
                "a build attempt needs at least one poll",
            ));
        }

        if self.composite.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "composite.channel_capacity",
                "0",
                "must be greater than 0",
            ));
        }

        let margin = self.session_cache.sweep_margin(&self.maintenance);
        if margin >= self.session_cache.ttl() {
            return Err(ConfigurationError::invalid_value(
                "session_cache.sweep_margin_multiplier",
                self.session_cache.sweep_margin_multiplier.to_string(),
                format!(
                    "sweep margin of {}s would evict sessions as soon as they are written (ttl {}s)",
                    margin.as_secs(),
                    self.session_cache.ttl_seconds
                ),
            ));
        }

        if self.task.long_operation_timeout_seconds < self.task.default_operation_timeout_seconds {
            return Err(ConfigurationError::invalid_value(
                "task.long_operation_timeout_seconds",
                self.task.long_operation_timeout_seconds.to_string(),
                "long-running operations must not expire before default operations",
            ));
        }

        Ok(())
    }
}
