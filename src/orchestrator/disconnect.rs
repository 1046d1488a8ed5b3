//! Disconnect grace periods, reconnection, and voluntary leaves
//!
//! A player who drops from a racing or buffering room keeps their roster
//! slot for a grace period, tracked by a [`DisconnectedRecord`] whose expiry
//! task removes them for good if they never return. Connections that were
//! displaced by a newer sign-in are already unregistered and skip the grace
//! machinery.

use crate::error::Result;
use crate::orchestrator::manager::{OrchestratorState, RaceOrchestrator};
use crate::transport::{ClientConnection, Connection, ServerEvent};
use crate::types::{
    CompletionCause, ConnectionId, ParticipantId, RoomId, RoomStatus, SessionStatus,
};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A held roster slot for a disconnected racer
pub(crate) struct DisconnectedRecord {
    pub participant_id: ParticipantId,
    pub room_id: RoomId,
    pub disconnected_at: DateTime<Utc>,
    expiry_task: Option<JoinHandle<()>>,
}

impl DisconnectedRecord {
    fn new(participant_id: ParticipantId, room_id: RoomId) -> Self {
        Self {
            participant_id,
            room_id,
            disconnected_at: current_timestamp(),
            expiry_task: None,
        }
    }

    fn attach_expiry(&mut self, task: JoinHandle<()>) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
        self.expiry_task = Some(task);
    }
}

impl Drop for DisconnectedRecord {
    // Removing the record cancels its pending expiry
    fn drop(&mut self) {
        if let Some(task) = self.expiry_task.take() {
            task.abort();
        }
    }
}

impl RaceOrchestrator {
    /// Handle a transport-level disconnect.
    ///
    /// Waiting players leave the queue. A member of a racing or buffering
    /// room keeps their slot for the grace period; a buffering room
    /// re-checks its quorum on the next countdown tick.
    pub fn handle_disconnect(&self, connection_id: ConnectionId) -> Result<()> {
        let mut state = self.lock_state()?;

        if let Some(entry) = state.queue.remove_by_connection(connection_id) {
            debug!(
                participant_id = %entry.participant_id,
                "Waiting player disconnected, removed from queue"
            );
            Self::cancel_matchmaking_if_idle_locked(&mut state);
        }

        let Some(session) = state.registry.unregister(connection_id) else {
            self.broadcast_stats_locked(&state);
            return Ok(());
        };
        let participant_id = session.participant_id.clone();

        // The slot belongs to this connection, not merely this participant;
        // a takeover by a newer connection must not be undone here
        let owning_room = state
            .rooms
            .values()
            .find(|room| {
                room.player_by_connection(connection_id)
                    .is_some_and(|p| p.participant_id == participant_id)
            })
            .map(|room| (room.id(), room.status()));

        match owning_room {
            Some((room_id, status @ (RoomStatus::Buffering | RoomStatus::Racing))) => {
                let grace = self.settings.grace_period();
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    let display_name = room
                        .player_mut(&participant_id)
                        .map(|player| {
                            player.connected = false;
                            player.display_name.clone()
                        })
                        .unwrap_or_default();

                    info!(
                        room_id = %room_id,
                        participant_id = %participant_id,
                        grace_seconds = grace.as_secs(),
                        "Player disconnected, holding slot"
                    );
                    Self::broadcast_room(
                        room,
                        &ServerEvent::PlayerDisconnected {
                            display_name,
                            grace_seconds: grace.as_secs(),
                        },
                    );
                }

                let mut record = DisconnectedRecord::new(participant_id.clone(), room_id);
                let orchestrator = self.clone();
                let expired_participant = participant_id.clone();
                record.attach_expiry(tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    if let Err(error) = orchestrator.grace_expired(&expired_participant) {
                        error!(
                            participant_id = %expired_participant,
                            error = %error,
                            "Grace expiry handling failed"
                        );
                    }
                }));
                state.disconnected.insert(participant_id.clone(), record);
                state.stats.disconnects += 1;
                self.metrics.record_disconnect();

                if status == RoomStatus::Racing {
                    let nobody_left = state
                        .rooms
                        .get(&room_id)
                        .is_some_and(|room| room.connected_count() == 0);
                    if nobody_left {
                        warn!(room_id = %room_id, "All racers disconnected, ending race");
                        self.finish_room_locked(
                            &mut state,
                            room_id,
                            CompletionCause::AllPlayersDisconnected,
                        )?;
                    }
                }
            }
            Some((room_id, RoomStatus::Finished)) => {
                if let Some(room) = state.rooms.get_mut(&room_id) {
                    if let Some(player) = room.player_mut(&participant_id) {
                        player.connected = false;
                    }
                }
            }
            None => {}
        }

        self.broadcast_stats_locked(&state);
        self.update_gauges_locked(&state);
        Ok(())
    }

    /// The grace period ran out: remove the racer for good and re-check the
    /// room's viability.
    pub(crate) fn grace_expired(&self, participant_id: &str) -> Result<()> {
        let mut state = self.lock_state()?;

        let Some(record) = state.disconnected.remove(participant_id) else {
            return Ok(());
        };
        let room_id = record.room_id;
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };

        // A reconnect that raced the expiry wins
        if room.player(participant_id).is_some_and(|p| p.is_connected()) {
            return Ok(());
        }

        match room.status() {
            RoomStatus::Racing => {
                if let Some(removed) = room.remove_player(participant_id) {
                    info!(
                        room_id = %room_id,
                        participant_id = %participant_id,
                        "Grace period expired, removing racer"
                    );
                    Self::broadcast_room(
                        room,
                        &ServerEvent::PlayerRemoved {
                            display_name: removed.display_name,
                            reason: "timeout".to_string(),
                        },
                    );
                    Self::broadcast_room(
                        room,
                        &ServerEvent::ProgressSnapshot {
                            roster: room.snapshots(),
                        },
                    );
                }
                self.evaluate_racing_room_locked(&mut state, room_id)?;
            }
            RoomStatus::Finished => {
                let last_record = !state
                    .disconnected
                    .values()
                    .any(|other| other.room_id == room_id);
                if last_record {
                    drop(state);
                    self.dispose_room(room_id)?;
                    return Ok(());
                }
            }
            RoomStatus::Buffering => {
                if let Some(removed) = room.remove_player(participant_id) {
                    info!(
                        room_id = %room_id,
                        participant_id = %participant_id,
                        "Grace period expired before the race started, removing player"
                    );
                    Self::broadcast_room(
                        room,
                        &ServerEvent::PlayerRemoved {
                            display_name: removed.display_name,
                            reason: "timeout".to_string(),
                        },
                    );
                }
                // The countdown tick re-checks the quorum; an emptied room
                // only needs removing here
                let now_empty = room.is_empty();
                if now_empty {
                    state.rooms.remove(&room_id);
                }
            }
        }

        self.update_gauges_locked(&state);
        Ok(())
    }

    /// Handle a reconnection attempt against a specific room
    pub(crate) fn handle_reconnect(&self, conn: Connection, room_id: RoomId) -> Result<()> {
        let mut state = self.lock_state()?;

        let Some(session) = state.registry.lookup(conn.id()) else {
            conn.send(&ServerEvent::ReconnectFailed {
                reason: "not registered".to_string(),
            });
            self.metrics.record_reconnect("failed");
            return Ok(());
        };
        let participant_id = session.participant_id.clone();

        let Some(room) = state.rooms.get_mut(&room_id) else {
            conn.send(&ServerEvent::ReconnectFailed {
                reason: "room no longer exists".to_string(),
            });
            self.metrics.record_reconnect("failed");
            return Ok(());
        };
        if room.status() == RoomStatus::Finished {
            conn.send(&ServerEvent::ReconnectFailed {
                reason: "race already finished".to_string(),
            });
            self.metrics.record_reconnect("failed");
            return Ok(());
        }
        let Some(player) = room.player_mut(&participant_id) else {
            conn.send(&ServerEvent::ReconnectFailed {
                reason: "not a member of this race".to_string(),
            });
            self.metrics.record_reconnect("failed");
            return Ok(());
        };

        // Idempotence: an already-live slot is not reclaimable, except by
        // the very connection that owns it
        if player.is_connected() && player.conn.id() != conn.id() {
            conn.send(&ServerEvent::ReconnectFailed {
                reason: "not disconnected".to_string(),
            });
            self.metrics.record_reconnect("failed");
            return Ok(());
        }

        player.connected = true;
        player.conn = conn.clone();
        let display_name = player.display_name.clone();

        let status = room.status();
        let start_time = room.start_time();
        let roster = room.snapshots();
        let text = room.text().to_string();
        if room.connected_count() > 1 {
            room.cancel_survivor_window();
        }
        Self::broadcast_room(
            room,
            &ServerEvent::PlayerReconnected {
                display_name: display_name.clone(),
            },
        );

        state.disconnected.remove(&participant_id);
        state
            .registry
            .set_status(&participant_id, SessionStatus::Racing);
        state.stats.reconnects += 1;
        self.metrics.record_reconnect("success");

        info!(
            room_id = %room_id,
            participant_id = %participant_id,
            "Racer reconnected"
        );
        conn.send(&ServerEvent::ReconnectSucceeded {
            room_id,
            roster,
            text,
            status,
            start_time,
        });

        self.broadcast_stats_locked(&state);
        Ok(())
    }

    /// Handle a voluntary leave from a room
    pub(crate) fn handle_leave_room(&self, conn: Connection, room_id: RoomId) -> Result<()> {
        let mut state = self.lock_state()?;

        let Some(session) = state.registry.lookup(conn.id()) else {
            return Ok(());
        };
        let participant_id = session.participant_id.clone();

        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };
        let status = room.status();
        let Some(removed) = room.remove_player(&participant_id) else {
            return Ok(());
        };

        info!(
            room_id = %room_id,
            participant_id = %participant_id,
            "Player left room"
        );
        match status {
            RoomStatus::Buffering | RoomStatus::Racing => {
                Self::broadcast_room(
                    room,
                    &ServerEvent::PlayerRemoved {
                        display_name: removed.display_name,
                        reason: "left".to_string(),
                    },
                );
                if status == RoomStatus::Racing {
                    Self::broadcast_room(
                        room,
                        &ServerEvent::ProgressSnapshot {
                            roster: room.snapshots(),
                        },
                    );
                }
            }
            RoomStatus::Finished => {}
        }

        let now_empty = room.is_empty();
        if status == RoomStatus::Buffering && now_empty {
            state.rooms.remove(&room_id);
        }

        let held_record = state.disconnected.remove(&participant_id).is_some();
        state
            .registry
            .set_status(&participant_id, SessionStatus::Online);

        if status == RoomStatus::Racing {
            self.evaluate_racing_room_locked(&mut state, room_id)?;
        }

        // Releasing the last held slot of a finished room is what its
        // deferred disposal was waiting for
        if status == RoomStatus::Finished && held_record {
            let last_record = !state
                .disconnected
                .values()
                .any(|record| record.room_id == room_id);
            if last_record {
                drop(state);
                self.dispose_room(room_id)?;
                return Ok(());
            }
        }

        self.broadcast_stats_locked(&state);
        self.update_gauges_locked(&state);
        Ok(())
    }
}
