//! Paceline - Race session orchestrator for real-time typing races
//!
//! This crate provides matchmaking, per-room race lifecycle management,
//! progress aggregation, and disconnect/reconnect handling for multiplayer
//! typing races.

pub mod config;
pub mod error;
pub mod external;
pub mod metrics;
pub mod orchestrator;
pub mod queue;
pub mod race;
pub mod registry;
pub mod service;
pub mod transport;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{OrchestratorError, Result};
pub use types::*;

// Re-export key components
pub use external::{GuestIdentityProvider, IdentityProvider, LoggingResultStore, ResultStore};
pub use orchestrator::{OrchestratorStats, RaceOrchestrator};
pub use transport::{ClientConnection, ClientEvent, Connection, ServerEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
