//! Orchestration core: session registry, matchmaking, room lifecycle,
//! progress aggregation, and the disconnect grace machinery

pub mod disconnect;
pub mod manager;
pub mod progress;

pub use manager::{OrchestratorStats, RaceOrchestrator};
