//! Room state machine and room-scoped player state
//!
//! A [`RoomInstance`] owns one race's roster, text, forward-only lifecycle
//! and its scheduled tasks. It performs no I/O: broadcasting, matchmaking
//! and timer scheduling are the orchestrator's job.

use crate::error::{OrchestratorError, Result};
use crate::transport::{ClientConnection, Connection};
use crate::types::{
    ConnectionId, ParticipantId, PlayerSnapshot, RaceResult, RoomId, RoomStatus,
    UNFINISHED_POSITION,
};
use crate::utils::{current_timestamp, generate_room_id};
use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

/// One participant's slot in a room
pub struct Player {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub conn: Connection,
    pub progress: u8,
    pub wpm: f64,
    pub accuracy: f64,
    pub finished: bool,
    pub finish_time: Option<DateTime<Utc>>,
    /// 1-based rank in server receipt order; 0 until assigned, then sticky
    pub finish_position: u32,
    pub connected: bool,
    /// Client-reported completion time, when it used the explicit finish path
    pub completion_ms: Option<u64>,
}

impl Player {
    pub fn new(participant_id: ParticipantId, display_name: String, conn: Connection) -> Self {
        Self {
            participant_id,
            display_name,
            conn,
            progress: 0,
            wpm: 0.0,
            accuracy: 100.0,
            finished: false,
            finish_time: None,
            finish_position: 0,
            connected: true,
            completion_ms: None,
        }
    }

    /// Connected flag re-validated against transport liveness
    pub fn is_connected(&self) -> bool {
        self.connected && self.conn.is_live()
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            participant_id: self.participant_id.clone(),
            display_name: self.display_name.clone(),
            progress: self.progress,
            wpm: self.wpm,
            accuracy: self.accuracy,
            finished: self.finished,
            finish_position: self.finish_position,
            connected: self.is_connected(),
        }
    }
}

/// One race room: roster, text, status and owned timers
pub struct RoomInstance {
    id: RoomId,
    roster: Vec<Player>,
    text: String,
    status: RoomStatus,
    start_time: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    countdown_remaining: u32,
    next_finish_position: u32,
    countdown_task: Option<JoinHandle<()>>,
    disposal_task: Option<JoinHandle<()>>,
    survivor_task: Option<JoinHandle<()>>,
}

impl RoomInstance {
    pub fn new(text: String, countdown_seconds: u32) -> Self {
        Self {
            id: generate_room_id(),
            roster: Vec::new(),
            text,
            status: RoomStatus::Buffering,
            start_time: None,
            created_at: current_timestamp(),
            countdown_remaining: countdown_seconds,
            next_finish_position: 1,
            countdown_task: None,
            disposal_task: None,
            survivor_task: None,
        }
    }

    pub fn id(&self) -> RoomId {
        self.id
    }

    pub fn status(&self) -> RoomStatus {
        self.status
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn roster(&self) -> &[Player] {
        &self.roster
    }

    pub fn is_empty(&self) -> bool {
        self.roster.is_empty()
    }

    pub fn is_full(&self, cap: usize) -> bool {
        self.roster.len() >= cap
    }

    /// Add a player to a buffering room
    pub fn add_player(&mut self, player: Player, cap: usize) -> Result<()> {
        if self.status != RoomStatus::Buffering {
            return Err(OrchestratorError::InvalidRoomState {
                message: format!("room {} is {} and not joinable", self.id, self.status),
            }
            .into());
        }
        if self.is_full(cap) {
            return Err(OrchestratorError::RoomFull {
                room_id: self.id.to_string(),
            }
            .into());
        }
        if self.has_participant(&player.participant_id) {
            return Err(OrchestratorError::InvalidRoomState {
                message: format!(
                    "participant {} already in room {}",
                    player.participant_id, self.id
                ),
            }
            .into());
        }

        self.roster.push(player);
        Ok(())
    }

    pub fn remove_player(&mut self, participant_id: &str) -> Option<Player> {
        let index = self
            .roster
            .iter()
            .position(|p| p.participant_id == participant_id)?;
        Some(self.roster.remove(index))
    }

    pub fn has_participant(&self, participant_id: &str) -> bool {
        self.roster
            .iter()
            .any(|p| p.participant_id == participant_id)
    }

    pub fn player(&self, participant_id: &str) -> Option<&Player> {
        self.roster
            .iter()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn player_mut(&mut self, participant_id: &str) -> Option<&mut Player> {
        self.roster
            .iter_mut()
            .find(|p| p.participant_id == participant_id)
    }

    pub fn player_by_connection(&self, connection_id: ConnectionId) -> Option<&Player> {
        self.roster.iter().find(|p| p.conn.id() == connection_id)
    }

    pub fn player_by_connection_mut(&mut self, connection_id: ConnectionId) -> Option<&mut Player> {
        self.roster
            .iter_mut()
            .find(|p| p.conn.id() == connection_id)
    }

    pub fn connected_players(&self) -> impl Iterator<Item = &Player> {
        self.roster.iter().filter(|p| p.is_connected())
    }

    pub fn connected_count(&self) -> usize {
        self.connected_players().count()
    }

    /// Transition buffering → racing, stamping the start time
    pub fn begin_racing(&mut self) -> Result<()> {
        if self.status != RoomStatus::Buffering {
            return Err(OrchestratorError::InvalidRoomState {
                message: format!("room {} cannot start racing from {}", self.id, self.status),
            }
            .into());
        }
        self.status = RoomStatus::Racing;
        self.start_time = Some(current_timestamp());
        Ok(())
    }

    /// Transition to finished (terminal). Idempotent for an already
    /// finished room.
    pub fn finish(&mut self) {
        self.status = RoomStatus::Finished;
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn decrement_countdown(&mut self) {
        self.countdown_remaining = self.countdown_remaining.saturating_sub(1);
    }

    /// Apply a progress report while racing. Progress is clamped so it
    /// never decreases for a player within one race. Returns false when the
    /// room status does not permit updates.
    pub fn record_progress(
        &mut self,
        participant_id: &str,
        progress: u8,
        wpm: f64,
        accuracy: f64,
    ) -> bool {
        if self.status != RoomStatus::Racing {
            return false;
        }
        let Some(player) = self.player_mut(participant_id) else {
            return false;
        };
        player.progress = progress.min(100).max(player.progress);
        player.wpm = wpm;
        player.accuracy = accuracy;
        true
    }

    /// Mark a player finished, assigning the next finish position in strict
    /// receipt order. Returns the assigned position, or None if the player
    /// is unknown or already finished (positions are never reassigned).
    pub fn record_finish(
        &mut self,
        participant_id: &str,
        wpm: f64,
        accuracy: f64,
        completion_ms: Option<u64>,
    ) -> Option<u32> {
        if self.status != RoomStatus::Racing {
            return None;
        }
        let next_position = self.next_finish_position;
        let player = self.player_mut(participant_id)?;
        if player.finished {
            return None;
        }

        player.finished = true;
        player.progress = 100;
        player.wpm = wpm;
        player.accuracy = accuracy;
        player.finish_time = Some(current_timestamp());
        player.finish_position = next_position;
        player.completion_ms = completion_ms;
        self.next_finish_position += 1;
        Some(next_position)
    }

    /// True when at least one player is connected and every connected
    /// player has finished
    pub fn all_connected_finished(&self) -> bool {
        let mut any = false;
        for player in self.connected_players() {
            any = true;
            if !player.finished {
                return false;
            }
        }
        any
    }

    pub fn racing_longer_than(&self, max: Duration) -> bool {
        match (self.status, self.start_time) {
            (RoomStatus::Racing, Some(start)) => current_timestamp() - start > max,
            _ => false,
        }
    }

    pub fn snapshots(&self) -> Vec<PlayerSnapshot> {
        self.roster.iter().map(Player::snapshot).collect()
    }

    /// Final standings: finished players first by position, then players
    /// that never finished (position 999) in roster order
    pub fn results(&self) -> Vec<RaceResult> {
        let mut results: Vec<RaceResult> = self
            .roster
            .iter()
            .map(|p| RaceResult {
                participant_id: p.participant_id.clone(),
                display_name: p.display_name.clone(),
                position: if p.finished {
                    p.finish_position
                } else {
                    UNFINISHED_POSITION
                },
                wpm: p.wpm,
                accuracy: p.accuracy,
                finished: p.finished,
            })
            .collect();

        results.sort_by(|a, b| {
            b.finished
                .cmp(&a.finished)
                .then(a.position.cmp(&b.position))
        });
        results
    }

    pub fn attach_countdown(&mut self, task: JoinHandle<()>) {
        self.cancel_countdown();
        self.countdown_task = Some(task);
    }

    pub fn cancel_countdown(&mut self) {
        if let Some(task) = self.countdown_task.take() {
            task.abort();
        }
    }

    pub fn attach_disposal(&mut self, task: JoinHandle<()>) {
        if let Some(task) = self.disposal_task.take() {
            task.abort();
        }
        self.disposal_task = Some(task);
    }

    pub fn attach_survivor_window(&mut self, task: JoinHandle<()>) {
        self.cancel_survivor_window();
        self.survivor_task = Some(task);
    }

    pub fn cancel_survivor_window(&mut self) {
        if let Some(task) = self.survivor_task.take() {
            task.abort();
        }
    }

    fn cancel_timers(&mut self) {
        self.cancel_countdown();
        self.cancel_survivor_window();
        if let Some(task) = self.disposal_task.take() {
            task.abort();
        }
    }
}

impl Drop for RoomInstance {
    // Disposing the room cancels its own timers by construction
    fn drop(&mut self) {
        self.cancel_timers();
    }
}
