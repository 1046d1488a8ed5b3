//! Main application configuration
//!
//! This module defines the primary configuration structures for the paceline
//! race orchestrator, including environment variable loading, optional TOML
//! file loading, and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub race: RaceSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for the health check endpoint
    pub health_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Race lifecycle tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceSettings {
    /// Minimum players needed to start the pre-race countdown
    pub quorum: usize,
    /// Maximum players per room
    pub roster_cap: usize,
    /// Pre-race countdown length in seconds
    pub countdown_seconds: u32,
    /// How long a disconnected racer's slot is held, in seconds
    pub grace_period_seconds: u64,
    /// Delay between race end and room disposal, in seconds
    pub disposal_delay_seconds: u64,
    /// Matchmaking aggregation window in milliseconds
    pub matchmaking_buffer_ms: u64,
    /// Hard cap on race duration in seconds
    pub race_timeout_seconds: u64,
    /// Interval of the stale-room sweep in seconds
    pub sweep_interval_seconds: u64,
    /// Interval of the periodic stats broadcast in seconds
    pub stats_interval_seconds: u64,
    /// How long a lone remaining racer waits before winning by default,
    /// in milliseconds
    pub survivor_grace_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            race: RaceSettings::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "paceline".to_string(),
            log_level: "info".to_string(),
            health_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for RaceSettings {
    fn default() -> Self {
        Self {
            quorum: 2,
            roster_cap: 4,
            countdown_seconds: 10,
            grace_period_seconds: 10,
            disposal_delay_seconds: 5,
            matchmaking_buffer_ms: 500,
            race_timeout_seconds: 300, // 5 minutes
            sweep_interval_seconds: 30,
            stats_interval_seconds: 15,
            survivor_grace_ms: 2000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("HEALTH_PORT") {
            config.service.health_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid HEALTH_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Race settings
        if let Ok(quorum) = env::var("RACE_QUORUM") {
            config.race.quorum = quorum
                .parse()
                .map_err(|_| anyhow!("Invalid RACE_QUORUM value: {}", quorum))?;
        }
        if let Ok(cap) = env::var("RACE_ROSTER_CAP") {
            config.race.roster_cap = cap
                .parse()
                .map_err(|_| anyhow!("Invalid RACE_ROSTER_CAP value: {}", cap))?;
        }
        if let Ok(countdown) = env::var("RACE_COUNTDOWN_SECONDS") {
            config.race.countdown_seconds = countdown
                .parse()
                .map_err(|_| anyhow!("Invalid RACE_COUNTDOWN_SECONDS value: {}", countdown))?;
        }
        if let Ok(grace) = env::var("RACE_GRACE_PERIOD_SECONDS") {
            config.race.grace_period_seconds = grace
                .parse()
                .map_err(|_| anyhow!("Invalid RACE_GRACE_PERIOD_SECONDS value: {}", grace))?;
        }
        if let Ok(disposal) = env::var("RACE_DISPOSAL_DELAY_SECONDS") {
            config.race.disposal_delay_seconds = disposal
                .parse()
                .map_err(|_| anyhow!("Invalid RACE_DISPOSAL_DELAY_SECONDS value: {}", disposal))?;
        }
        if let Ok(buffer) = env::var("MATCHMAKING_BUFFER_MS") {
            config.race.matchmaking_buffer_ms = buffer
                .parse()
                .map_err(|_| anyhow!("Invalid MATCHMAKING_BUFFER_MS value: {}", buffer))?;
        }
        if let Ok(timeout) = env::var("RACE_TIMEOUT_SECONDS") {
            config.race.race_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid RACE_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(sweep) = env::var("SWEEP_INTERVAL_SECONDS") {
            config.race.sweep_interval_seconds = sweep
                .parse()
                .map_err(|_| anyhow!("Invalid SWEEP_INTERVAL_SECONDS value: {}", sweep))?;
        }
        if let Ok(stats) = env::var("STATS_INTERVAL_SECONDS") {
            config.race.stats_interval_seconds = stats
                .parse()
                .map_err(|_| anyhow!("Invalid STATS_INTERVAL_SECONDS value: {}", stats))?;
        }
        if let Ok(survivor) = env::var("SURVIVOR_GRACE_MS") {
            config.race.survivor_grace_ms = survivor
                .parse()
                .map_err(|_| anyhow!("Invalid SURVIVOR_GRACE_MS value: {}", survivor))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file, then validate
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the reconnection grace period as Duration
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.race.grace_period_seconds)
    }

    /// Get the disposal delay as Duration
    pub fn disposal_delay(&self) -> Duration {
        Duration::from_secs(self.race.disposal_delay_seconds)
    }

    /// Get the matchmaking aggregation window as Duration
    pub fn matchmaking_buffer(&self) -> Duration {
        Duration::from_millis(self.race.matchmaking_buffer_ms)
    }

    /// Get the race duration cap as Duration
    pub fn race_timeout(&self) -> Duration {
        Duration::from_secs(self.race.race_timeout_seconds)
    }

    /// Get the sweep interval as Duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.race.sweep_interval_seconds)
    }

    /// Get the stats broadcast interval as Duration
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.race.stats_interval_seconds)
    }

    /// Get the single-survivor window as Duration
    pub fn survivor_grace(&self) -> Duration {
        Duration::from_millis(self.race.survivor_grace_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.health_port == 0 {
        return Err(anyhow!("Health port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.race.race_timeout_seconds == 0 {
        return Err(anyhow!("Race timeout must be greater than 0"));
    }
    if config.race.sweep_interval_seconds == 0 {
        return Err(anyhow!("Sweep interval must be greater than 0"));
    }
    if config.race.stats_interval_seconds == 0 {
        return Err(anyhow!("Stats interval must be greater than 0"));
    }

    // Validate room sizing
    if config.race.quorum < 2 {
        return Err(anyhow!("Race quorum must be at least 2"));
    }
    if config.race.roster_cap < config.race.quorum {
        return Err(anyhow!(
            "Roster cap ({}) cannot be below quorum ({})",
            config.race.roster_cap,
            config.race.quorum
        ));
    }
    if config.race.countdown_seconds == 0 {
        return Err(anyhow!("Countdown must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.race.quorum, 2);
        assert_eq!(config.race.roster_cap, 4);
        assert_eq!(config.race.countdown_seconds, 10);
    }

    #[test]
    fn test_duration_accessors() {
        let config = AppConfig::default();
        assert_eq!(config.grace_period(), Duration::from_secs(10));
        assert_eq!(config.matchmaking_buffer(), Duration::from_millis(500));
        assert_eq!(config.survivor_grace(), Duration::from_millis(2000));
    }

    #[test]
    fn test_validation_rejects_cap_below_quorum() {
        let mut config = AppConfig::default();
        config.race.quorum = 3;
        config.race.roster_cap = 2;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_quorum_of_one() {
        let mut config = AppConfig::default();
        config.race.quorum = 1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [race]
            roster_cap = 6
            "#,
        )
        .unwrap();
        assert_eq!(config.race.roster_cap, 6);
        assert_eq!(config.race.quorum, 2);
        assert_eq!(config.service.health_port, 8080);
    }
}
