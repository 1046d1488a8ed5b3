//! Progress aggregation, finish handling, and room teardown
//!
//! Reports that do not match a racing room, or arrive over a connection
//! that does not own a roster slot, are dropped without a reply. Clients
//! resynchronize from the next progress snapshot.

use crate::error::Result;
use crate::orchestrator::manager::{OrchestratorState, RaceOrchestrator};
use crate::transport::{ClientConnection, Connection, ServerEvent};
use crate::types::{CompletionCause, FinishedRace, ParticipantId, RoomId, RoomStatus, SessionStatus};
use crate::utils::current_timestamp;
use tracing::{debug, error, info, warn};

impl RaceOrchestrator {
    /// Apply one progress report and broadcast the updated snapshot.
    ///
    /// A report of 100 percent is treated as an implicit finish.
    pub(crate) fn update_progress(
        &self,
        conn: Connection,
        room_id: RoomId,
        progress: u8,
        wpm: f64,
        accuracy: f64,
    ) -> Result<()> {
        let mut state = self.lock_state()?;
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };
        if room.status() != RoomStatus::Racing {
            return Ok(());
        }
        let Some(player) = room.player_by_connection(conn.id()) else {
            return Ok(());
        };
        let participant_id = player.participant_id.clone();

        room.record_progress(&participant_id, progress, wpm, accuracy);

        if progress >= 100 {
            if let Some(position) = room.record_finish(&participant_id, wpm, accuracy, None) {
                let display_name = room
                    .player(&participant_id)
                    .map(|p| p.display_name.clone())
                    .unwrap_or_default();
                Self::broadcast_room(
                    room,
                    &ServerEvent::PlayerFinished {
                        display_name,
                        position,
                        wpm,
                        accuracy,
                    },
                );
            }
        }

        Self::broadcast_room(
            room,
            &ServerEvent::ProgressSnapshot {
                roster: room.snapshots(),
            },
        );

        if room.all_connected_finished() {
            self.finish_room_locked(&mut state, room_id, CompletionCause::Completed)?;
        }
        Ok(())
    }

    /// Handle an explicit finish report from a client
    pub(crate) fn report_finished(
        &self,
        conn: Connection,
        room_id: RoomId,
        wpm: f64,
        accuracy: f64,
        completion_ms: u64,
    ) -> Result<()> {
        let mut state = self.lock_state()?;
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };
        if room.status() != RoomStatus::Racing {
            return Ok(());
        }
        let Some(player) = room.player_by_connection(conn.id()) else {
            return Ok(());
        };
        let participant_id = player.participant_id.clone();

        if let Some(position) = room.record_finish(&participant_id, wpm, accuracy, Some(completion_ms))
        {
            let display_name = room
                .player(&participant_id)
                .map(|p| p.display_name.clone())
                .unwrap_or_default();
            debug!(
                room_id = %room_id,
                participant_id = %participant_id,
                position,
                "Player finished"
            );
            Self::broadcast_room(
                room,
                &ServerEvent::PlayerFinished {
                    display_name,
                    position,
                    wpm,
                    accuracy,
                },
            );
            Self::broadcast_room(
                room,
                &ServerEvent::ProgressSnapshot {
                    roster: room.snapshots(),
                },
            );
        }

        if room.all_connected_finished() {
            self.finish_room_locked(&mut state, room_id, CompletionCause::Completed)?;
        }
        Ok(())
    }

    /// Move a room to finished, broadcast the final standings exactly once,
    /// hand the record to the result store, and schedule disposal.
    ///
    /// Disposal is deferred while any grace record still points at the room
    /// so late reconnectors get a reply instead of silence.
    pub(crate) fn finish_room_locked(
        &self,
        state: &mut OrchestratorState,
        room_id: RoomId,
        cause: CompletionCause,
    ) -> Result<()> {
        let pending_records = state
            .disconnected
            .values()
            .any(|record| record.room_id == room_id);
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };
        if room.status() == RoomStatus::Finished {
            return Ok(());
        }

        room.cancel_countdown();
        room.cancel_survivor_window();
        room.finish();

        let results = room.results();
        let race = FinishedRace {
            room_id,
            text: room.text().to_string(),
            results: results.clone(),
            cause,
            started_at: room.start_time(),
            ended_at: current_timestamp(),
        };
        Self::broadcast_room(room, &ServerEvent::RaceFinished { results, cause });

        let participants: Vec<ParticipantId> = room
            .roster()
            .iter()
            .map(|p| p.participant_id.clone())
            .collect();

        if !pending_records {
            let orchestrator = self.clone();
            let delay = self.settings.disposal_delay();
            room.attach_disposal(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(error) = orchestrator.dispose_room(room_id) {
                    error!(room_id = %room_id, error = %error, "Room disposal failed");
                }
            }));
        }

        for participant_id in participants {
            state
                .registry
                .set_status(&participant_id, SessionStatus::Online);
        }
        state.stats.races_finished += 1;
        self.metrics.record_race_finished(cause.as_str());

        info!(
            room_id = %room_id,
            cause = cause.as_str(),
            "Race finished"
        );

        let store = self.results.clone();
        tokio::spawn(async move {
            if let Err(error) = store.save(&race).await {
                warn!(room_id = %race.room_id, error = %error, "Failed to persist race result");
            }
        });

        self.broadcast_stats_locked(state);
        self.update_gauges_locked(state);
        Ok(())
    }

    /// Re-check viability of a racing room after a permanent removal or a
    /// grace expiry.
    ///
    /// Nobody left and nobody coming back ends the race immediately. One
    /// racer left with nobody coming back arms the survivor window; they win
    /// by default when it elapses without company.
    pub(crate) fn evaluate_racing_room_locked(
        &self,
        state: &mut OrchestratorState,
        room_id: RoomId,
    ) -> Result<()> {
        let pending_records = state
            .disconnected
            .values()
            .any(|record| record.room_id == room_id);
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };
        if room.status() != RoomStatus::Racing {
            return Ok(());
        }

        let connected = room.connected_count();
        if connected > 1 {
            room.cancel_survivor_window();
            return Ok(());
        }
        if pending_records {
            // Someone may still come back; hold the room as is
            return Ok(());
        }
        if connected == 0 {
            return self.finish_room_locked(state, room_id, CompletionCause::AllPlayersDisconnected);
        }

        let orchestrator = self.clone();
        let window = self.settings.survivor_grace();
        room.attach_survivor_window(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Err(error) = orchestrator.survivor_window_elapsed(room_id) {
                error!(room_id = %room_id, error = %error, "Survivor window handling failed");
            }
        }));
        Ok(())
    }

    /// The lone survivor's window elapsed with nobody returning: they win
    /// by default.
    pub(crate) fn survivor_window_elapsed(&self, room_id: RoomId) -> Result<()> {
        let mut state = self.lock_state()?;

        let pending_records = state
            .disconnected
            .values()
            .any(|record| record.room_id == room_id);
        if pending_records {
            return Ok(());
        }
        let Some(room) = state.rooms.get_mut(&room_id) else {
            return Ok(());
        };
        if room.status() != RoomStatus::Racing || room.connected_count() != 1 {
            return Ok(());
        }

        let survivor = room
            .connected_players()
            .next()
            .map(|p| (p.participant_id.clone(), p.wpm, p.accuracy, p.finished));
        if let Some((participant_id, wpm, accuracy, finished)) = survivor {
            if !finished {
                if let Some(position) = room.record_finish(&participant_id, wpm, accuracy, None) {
                    let display_name = room
                        .player(&participant_id)
                        .map(|p| p.display_name.clone())
                        .unwrap_or_default();
                    Self::broadcast_room(
                        room,
                        &ServerEvent::PlayerFinished {
                            display_name,
                            position,
                            wpm,
                            accuracy,
                        },
                    );
                }
            }
        }

        self.finish_room_locked(&mut state, room_id, CompletionCause::OpponentLeft)
    }

    /// Remove a finished room and any records that still point at it
    pub(crate) fn dispose_room(&self, room_id: RoomId) -> Result<()> {
        let mut state = self.lock_state()?;

        let finished = state
            .rooms
            .get(&room_id)
            .map(|room| room.status() == RoomStatus::Finished)
            .unwrap_or(false);
        if !finished {
            return Ok(());
        }

        debug!(room_id = %room_id, "Disposing room");
        state.rooms.remove(&room_id);
        state.disconnected.retain(|_, record| record.room_id != room_id);
        self.update_gauges_locked(&state);
        Ok(())
    }
}
