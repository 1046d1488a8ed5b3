//! Configuration management for the paceline service
//!
//! This module handles configuration loading from environment variables or a
//! TOML file, validation, and default values for the race orchestrator.

pub mod app;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, RaceSettings, ServiceSettings};
