//! Wire-level event definitions and serialization
//!
//! Events cross the transport boundary as tagged JSON objects. The
//! orchestrator consumes [`ClientEvent`]s and emits [`ServerEvent`]s; the
//! actual transport (WebSocket or otherwise) lives outside this crate.

use crate::types::{
    CompletionCause, IdentityCredentials, PlayerSnapshot, RaceResult, RoomId, RoomStatus,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Events sent by a participant to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    RegisterIdentity {
        credentials: IdentityCredentials,
    },
    RequestStats,
    JoinQueue {
        display_name: String,
    },
    LeaveQueue,
    Reconnect {
        room_id: RoomId,
    },
    LeaveRoom {
        room_id: RoomId,
    },
    ReportProgress {
        room_id: RoomId,
        progress: u8,
        wpm: f64,
        accuracy: f64,
    },
    ReportFinished {
        room_id: RoomId,
        wpm: f64,
        accuracy: f64,
        completion_ms: u64,
    },
}

/// Events emitted by the orchestrator to participants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    StatsSnapshot {
        online: usize,
        racing: usize,
        waiting: usize,
    },
    Queued {
        position: usize,
    },
    AlreadyInRace {
        room_id: RoomId,
    },
    AlreadyWaiting,
    RoomReady {
        room_id: RoomId,
        roster: Vec<PlayerSnapshot>,
        text: String,
    },
    PlayerJoinedDuringBuffer {
        roster: Vec<PlayerSnapshot>,
    },
    Countdown {
        seconds_remaining: u32,
    },
    CountdownCancelled {
        reason: String,
    },
    RaceStarted,
    ProgressSnapshot {
        roster: Vec<PlayerSnapshot>,
    },
    PlayerFinished {
        display_name: String,
        position: u32,
        wpm: f64,
        accuracy: f64,
    },
    RaceFinished {
        results: Vec<RaceResult>,
        cause: CompletionCause,
    },
    PlayerDisconnected {
        display_name: String,
        grace_seconds: u64,
    },
    PlayerReconnected {
        display_name: String,
    },
    PlayerRemoved {
        display_name: String,
        reason: String,
    },
    ReconnectSucceeded {
        room_id: RoomId,
        roster: Vec<PlayerSnapshot>,
        text: String,
        status: RoomStatus,
        start_time: Option<DateTime<Utc>>,
    },
    ReconnectFailed {
        reason: String,
    },
    SessionInvalidated {
        reason: String,
    },
}

impl ServerEvent {
    /// Wire name of the event, used for logging and test assertions
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::StatsSnapshot { .. } => "statsSnapshot",
            ServerEvent::Queued { .. } => "queued",
            ServerEvent::AlreadyInRace { .. } => "alreadyInRace",
            ServerEvent::AlreadyWaiting => "alreadyWaiting",
            ServerEvent::RoomReady { .. } => "roomReady",
            ServerEvent::PlayerJoinedDuringBuffer { .. } => "playerJoinedDuringBuffer",
            ServerEvent::Countdown { .. } => "countdown",
            ServerEvent::CountdownCancelled { .. } => "countdownCancelled",
            ServerEvent::RaceStarted => "raceStarted",
            ServerEvent::ProgressSnapshot { .. } => "progressSnapshot",
            ServerEvent::PlayerFinished { .. } => "playerFinished",
            ServerEvent::RaceFinished { .. } => "raceFinished",
            ServerEvent::PlayerDisconnected { .. } => "playerDisconnected",
            ServerEvent::PlayerReconnected { .. } => "playerReconnected",
            ServerEvent::PlayerRemoved { .. } => "playerRemoved",
            ServerEvent::ReconnectSucceeded { .. } => "reconnectSucceeded",
            ServerEvent::ReconnectFailed { .. } => "reconnectFailed",
            ServerEvent::SessionInvalidated { .. } => "sessionInvalidated",
        }
    }
}
