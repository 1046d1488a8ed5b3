//! Error types for the race orchestrator
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific orchestrator scenarios
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Room not found: {room_id}")]
    RoomNotFound { room_id: String },

    #[error("Room is full: {room_id}")]
    RoomFull { room_id: String },

    #[error("Invalid room state: {message}")]
    InvalidRoomState { message: String },

    #[error("Identity resolution failed: {reason}")]
    IdentityResolutionFailed { reason: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}
