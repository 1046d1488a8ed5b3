//! Common types used throughout the race orchestrator

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for participants (stable across connections)
pub type ParticipantId = String;

/// Unique identifier for race rooms
pub type RoomId = Uuid;

/// Unique identifier for live transport connections
pub type ConnectionId = Uuid;

/// Status of a registered session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Online,
    Waiting,
    Racing,
}

/// Lifecycle status of a room; transitions are strictly forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomStatus {
    Buffering,
    Racing,
    Finished,
}

impl std::fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RoomStatus::Buffering => write!(f, "buffering"),
            RoomStatus::Racing => write!(f, "racing"),
            RoomStatus::Finished => write!(f, "finished"),
        }
    }
}

/// Why a race reached the finished state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionCause {
    Completed,
    Timeout,
    OpponentLeft,
    AllPlayersDisconnected,
}

impl CompletionCause {
    /// Stable label used for logging and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionCause::Completed => "completed",
            CompletionCause::Timeout => "timeout",
            CompletionCause::OpponentLeft => "opponent_left",
            CompletionCause::AllPlayersDisconnected => "all_players_disconnected",
        }
    }
}

/// Credentials presented by a connecting client, resolved by an
/// [`IdentityProvider`](crate::external::IdentityProvider)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityCredentials {
    /// Opaque token issued by the external identity service
    pub token: Option<String>,
    /// Display name requested by the client (guests)
    pub display_name: Option<String>,
}

/// Resolved participant identity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub guest: bool,
}

/// Point-in-time view of a room-scoped player, safe to put on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub progress: u8,
    pub wpm: f64,
    pub accuracy: f64,
    pub finished: bool,
    pub finish_position: u32,
    pub connected: bool,
}

/// Final standing of one player in a finished race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaceResult {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub position: u32,
    pub wpm: f64,
    pub accuracy: f64,
    pub finished: bool,
}

/// Aggregate counts broadcast to all connected clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub online: usize,
    pub racing: usize,
    pub waiting: usize,
}

/// Everything the external result store needs about one finished race
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishedRace {
    pub room_id: RoomId,
    pub text: String,
    pub results: Vec<RaceResult>,
    pub cause: CompletionCause,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: DateTime<Utc>,
}

/// Finish position reported for players that never finished
pub const UNFINISHED_POSITION: u32 = 999;
