//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::SwarmConfig;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid max_agents: {0}. Must be between 1 and 100")]
    InvalidMaxAgents(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid observer update interval: {0}ms. Must be at least 100")]
    InvalidUpdateInterval(u64),

    #[error("Invalid scan radius: {0}. Must be positive")]
    InvalidScanRadius(f64),

    #[error("Invalid max_plan_length: {0}. Cannot be 0")]
    InvalidPlanLength(usize),

    #[error("Invalid requests_per_minute: {0}. Cannot be 0")]
    InvalidRateLimit(u32),

    #[error("Invalid task_timeout_ms: {0}. Cannot be 0")]
    InvalidTaskTimeout(u64),

    #[error("Invalid experience capacity: {0}. Cannot be 0")]
    InvalidExperienceCapacity(usize),

    #[error("Invalid world bounds: min must be below max")]
    InvalidWorldBounds,
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .hivemind/config.yaml (project config, created by init)
    /// 3. .hivemind/local.yaml (project local overrides, optional)
    /// 4. Environment variables (HIVEMIND_* prefix, highest priority)
    pub fn load() -> Result<SwarmConfig> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(".hivemind/config.yaml"))
            .merge(Yaml::file(".hivemind/local.yaml"))
            .merge(Env::prefixed("HIVEMIND_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<SwarmConfig> {
        let config: SwarmConfig = Figment::new()
            .merge(Serialized::defaults(SwarmConfig::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &SwarmConfig) -> Result<(), ConfigError> {
        if config.max_agents.0 == 0 || config.max_agents.0 > 100 {
            return Err(ConfigError::InvalidMaxAgents(config.max_agents.0));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.observer.update_interval_ms < 100 {
            return Err(ConfigError::InvalidUpdateInterval(
                config.observer.update_interval_ms,
            ));
        }
        if config.observer.scan_radius <= 0.0 {
            return Err(ConfigError::InvalidScanRadius(config.observer.scan_radius));
        }
        if config.planner.max_plan_length == 0 {
            return Err(ConfigError::InvalidPlanLength(config.planner.max_plan_length));
        }
        if config.policy.requests_per_minute == 0 {
            return Err(ConfigError::InvalidRateLimit(config.policy.requests_per_minute));
        }
        if config.router.task_timeout_ms == 0 {
            return Err(ConfigError::InvalidTaskTimeout(config.router.task_timeout_ms));
        }
        if config.experience.capacity == 0 {
            return Err(ConfigError::InvalidExperienceCapacity(
                config.experience.capacity,
            ));
        }
        if config.world.xz_min >= config.world.xz_max || config.world.y_min >= config.world.y_max {
            return Err(ConfigError::InvalidWorldBounds);
        }

        Ok(())
    }
}
