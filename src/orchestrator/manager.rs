//! Race orchestrator: sessions, matchmaking, and room lifecycle
//!
//! This module provides the core RaceOrchestrator that owns all mutable
//! service state behind one lock and drives matchmaking, the pre-race
//! countdown, periodic stats broadcasts, and the stale-room sweep. Progress
//! aggregation and the disconnect machinery live in sibling modules but
//! operate on the same state.

use crate::config::AppConfig;
use crate::error::{OrchestratorError, Result};
use crate::external::{IdentityProvider, ResultStore};
use crate::metrics::MetricsCollector;
use crate::queue::MatchmakingQueue;
use crate::race::instance::{Player, RoomInstance};
use crate::race::random_passage;
use crate::registry::ConnectionRegistry;
use crate::transport::{ClientConnection, ClientEvent, Connection, ServerEvent};
use crate::types::{IdentityCredentials, ParticipantId, RoomId, RoomStatus, SessionStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::disconnect::DisconnectedRecord;

/// Statistics about orchestrator operations
#[derive(Debug, Clone, Default)]
pub struct OrchestratorStats {
    /// Total number of rooms created
    pub rooms_created: u64,
    /// Total number of races that reached the racing state
    pub races_started: u64,
    /// Total number of races finished (any cause)
    pub races_finished: u64,
    /// Total number of players enqueued
    pub players_queued: u64,
    /// Total mid-race disconnects observed
    pub disconnects: u64,
    /// Total successful reconnections
    pub reconnects: u64,
    /// Current number of live rooms
    pub active_rooms: usize,
    /// Current number of players waiting in the queue
    pub players_waiting: usize,
}

/// All mutable orchestrator state, guarded by a single lock.
///
/// Handlers never await while holding the lock; timers fire on spawned
/// tasks that re-acquire it and re-validate what they find.
pub(crate) struct OrchestratorState {
    pub registry: ConnectionRegistry,
    pub queue: MatchmakingQueue,
    pub rooms: HashMap<RoomId, RoomInstance>,
    pub disconnected: HashMap<ParticipantId, DisconnectedRecord>,
    pub buffer_task: Option<JoinHandle<()>>,
    pub stats: OrchestratorStats,
}

impl OrchestratorState {
    fn new() -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            queue: MatchmakingQueue::new(),
            rooms: HashMap::new(),
            disconnected: HashMap::new(),
            buffer_task: None,
            stats: OrchestratorStats::default(),
        }
    }
}

/// The main race orchestrator
#[derive(Clone)]
pub struct RaceOrchestrator {
    /// All mutable state behind one lock
    pub(crate) state: Arc<Mutex<OrchestratorState>>,
    /// Service configuration
    pub(crate) settings: Arc<AppConfig>,
    /// External identity resolution
    pub(crate) identity: Arc<dyn IdentityProvider>,
    /// External result persistence
    pub(crate) results: Arc<dyn ResultStore>,
    /// Metrics collector for recording performance data
    pub(crate) metrics: Arc<MetricsCollector>,
}

impl RaceOrchestrator {
    /// Create a new orchestrator with a default metrics collector
    pub fn new(
        settings: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        results: Arc<dyn ResultStore>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));

        Self::with_metrics(settings, identity, results, metrics)
    }

    /// Create a new orchestrator with a shared metrics collector
    pub fn with_metrics(
        settings: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        results: Arc<dyn ResultStore>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(OrchestratorState::new())),
            settings: Arc::new(settings),
            identity,
            results,
            metrics,
        }
    }

    pub(crate) fn lock_state(&self) -> Result<MutexGuard<'_, OrchestratorState>> {
        self.state
            .lock()
            .map_err(|_| {
                OrchestratorError::InternalError {
                    message: "Orchestrator state lock poisoned".to_string(),
                }
                .into()
            })
    }

    /// Dispatch one client event. Identity resolution is the only async
    /// path; everything else takes the state lock synchronously.
    pub async fn handle_event(&self, conn: Connection, event: ClientEvent) -> Result<()> {
        match event {
            ClientEvent::RegisterIdentity { credentials } => {
                self.register(conn, credentials).await
            }
            ClientEvent::RequestStats => self.request_stats(conn),
            ClientEvent::JoinQueue { display_name } => self.join_queue(conn, &display_name),
            ClientEvent::LeaveQueue => self.leave_queue(conn),
            ClientEvent::Reconnect { room_id } => self.handle_reconnect(conn, room_id),
            ClientEvent::LeaveRoom { room_id } => self.handle_leave_room(conn, room_id),
            ClientEvent::ReportProgress {
                room_id,
                progress,
                wpm,
                accuracy,
            } => self.update_progress(conn, room_id, progress, wpm, accuracy),
            ClientEvent::ReportFinished {
                room_id,
                wpm,
                accuracy,
                completion_ms,
            } => self.report_finished(conn, room_id, wpm, accuracy, completion_ms),
        }
    }

    /// Bind a connection to a participant identity.
    ///
    /// Resolves credentials before taking the lock. An older live session
    /// for the same participant is invalidated and closed; the newcomer
    /// then gets a stats snapshot and, if they have a race to return to,
    /// an alreadyInRace notice.
    pub async fn register(&self, conn: Connection, credentials: IdentityCredentials) -> Result<()> {
        let identity = match self.identity.resolve(&credentials).await {
            Ok(identity) => identity,
            Err(error) => {
                warn!(error = %error, "Identity resolution failed");
                conn.send(&ServerEvent::SessionInvalidated {
                    reason: "identity resolution failed".to_string(),
                });
                conn.close();
                return Err(OrchestratorError::IdentityResolutionFailed {
                    reason: error.to_string(),
                }
                .into());
            }
        };

        let mut state = self.lock_state()?;

        info!(
            participant_id = %identity.participant_id,
            display_name = %identity.display_name,
            guest = identity.guest,
            "Registering session"
        );

        let participant_id = identity.participant_id.clone();
        if let Some(displaced) = state.registry.register(conn.clone(), identity) {
            debug!(
                participant_id = %participant_id,
                "Displacing older session for participant"
            );
            state.queue.remove_by_connection(displaced.conn.id());
            displaced.conn.send(&ServerEvent::SessionInvalidated {
                reason: "signed in from another connection".to_string(),
            });
            displaced.conn.close();
        }

        // Point the newcomer back at an interrupted race, if any
        let pending_room = state
            .disconnected
            .get(&participant_id)
            .map(|record| record.room_id)
            .or_else(|| {
                state
                    .rooms
                    .values()
                    .find(|room| {
                        room.status() != RoomStatus::Finished
                            && room.has_participant(&participant_id)
                    })
                    .map(|room| room.id())
            });
        if let Some(room_id) = pending_room {
            conn.send(&ServerEvent::AlreadyInRace { room_id });
        }

        // Every session sees the new arrival, the newcomer included
        self.broadcast_stats_locked(&state);
        self.update_gauges_locked(&state);
        Ok(())
    }

    /// Send the current aggregate counts to one connection
    pub fn request_stats(&self, conn: Connection) -> Result<()> {
        let state = self.lock_state()?;
        let snapshot = state.registry.stats(state.queue.len());
        conn.send(&ServerEvent::StatsSnapshot {
            online: snapshot.online,
            racing: snapshot.racing,
            waiting: snapshot.waiting,
        });
        Ok(())
    }

    /// Handle a queue request from a registered session
    pub fn join_queue(&self, conn: Connection, display_name: &str) -> Result<()> {
        let mut state = self.lock_state()?;

        let Some(session) = state.registry.lookup(conn.id()) else {
            conn.send(&ServerEvent::SessionInvalidated {
                reason: "not registered".to_string(),
            });
            return Ok(());
        };
        let participant_id = session.participant_id.clone();
        let name = if display_name.trim().is_empty() {
            session.display_name.clone()
        } else {
            display_name.trim().to_string()
        };

        // A participant with a held slot belongs back in their race
        if let Some(record) = state.disconnected.get(&participant_id) {
            conn.send(&ServerEvent::AlreadyInRace {
                room_id: record.room_id,
            });
            return Ok(());
        }
        if let Some(room) = state.rooms.values().find(|room| {
            room.status() != RoomStatus::Finished && room.has_participant(&participant_id)
        }) {
            conn.send(&ServerEvent::AlreadyInRace { room_id: room.id() });
            return Ok(());
        }
        if state.queue.contains(&participant_id) {
            conn.send(&ServerEvent::AlreadyWaiting);
            return Ok(());
        }

        // Late joiner slots into a still-buffering room before founding
        // a new one
        let cap = self.settings.race.roster_cap;
        let open_room = state
            .rooms
            .values()
            .filter(|room| room.status() == RoomStatus::Buffering && !room.is_full(cap))
            .map(|room| room.id())
            .next();
        if let Some(room_id) = open_room {
            debug!(
                participant_id = %participant_id,
                room_id = %room_id,
                "Joining buffering room directly"
            );
            let player = Player::new(participant_id.clone(), name, conn.clone());
            let room = state
                .rooms
                .get_mut(&room_id)
                .ok_or_else(|| OrchestratorError::RoomNotFound {
                    room_id: room_id.to_string(),
                })?;
            room.add_player(player, cap)?;

            conn.send(&ServerEvent::RoomReady {
                room_id,
                roster: room.snapshots(),
                text: room.text().to_string(),
            });
            let joined = ServerEvent::PlayerJoinedDuringBuffer {
                roster: room.snapshots(),
            };
            Self::broadcast_room(room, &joined);

            state.registry.set_status(&participant_id, SessionStatus::Racing);
            self.broadcast_stats_locked(&state);
            return Ok(());
        }

        let position = state.queue.push(participant_id.clone(), name, conn.clone());
        state.registry.set_status(&participant_id, SessionStatus::Waiting);
        state.stats.players_queued += 1;
        self.metrics.record_player_queued();

        info!(
            participant_id = %participant_id,
            position,
            "Player enqueued"
        );
        conn.send(&ServerEvent::Queued { position });

        self.schedule_matchmaking_locked(&mut state);
        self.broadcast_stats_locked(&state);
        Ok(())
    }

    /// Remove a waiting session from the queue
    pub fn leave_queue(&self, conn: Connection) -> Result<()> {
        let mut state = self.lock_state()?;
        if let Some(entry) = state.queue.remove_by_connection(conn.id()) {
            debug!(participant_id = %entry.participant_id, "Player left queue");
            state
                .registry
                .set_status(&entry.participant_id, SessionStatus::Online);
            Self::cancel_matchmaking_if_idle_locked(&mut state);
            self.broadcast_stats_locked(&state);
        }
        Ok(())
    }

    /// Drop the pending matchmaking window once the queue has emptied
    pub(crate) fn cancel_matchmaking_if_idle_locked(state: &mut OrchestratorState) {
        if state.queue.is_empty() {
            if let Some(task) = state.buffer_task.take() {
                task.abort();
            }
        }
    }

    /// Arm the matchmaking aggregation window unless one is already pending.
    ///
    /// The window lets near-simultaneous joiners land in one room instead of
    /// founding a room per arrival.
    pub(crate) fn schedule_matchmaking_locked(&self, state: &mut OrchestratorState) {
        let pending = state
            .buffer_task
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        if pending {
            return;
        }

        let orchestrator = self.clone();
        let buffer = self.settings.matchmaking_buffer();
        state.buffer_task = Some(tokio::spawn(async move {
            tokio::time::sleep(buffer).await;
            if let Err(error) = orchestrator.run_matchmaking() {
                error!(error = %error, "Matchmaking pass failed");
            }
        }));
    }

    /// One matchmaking pass: fill open buffering rooms, then found new rooms
    /// while a quorum of live waiters remains.
    pub(crate) fn run_matchmaking(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        let quorum = self.settings.race.quorum;
        let cap = self.settings.race.roster_cap;

        // Fill rooms that are still buffering and have space
        let open_rooms: Vec<RoomId> = state
            .rooms
            .values()
            .filter(|room| room.status() == RoomStatus::Buffering && !room.is_full(cap))
            .map(|room| room.id())
            .collect();
        for room_id in open_rooms {
            loop {
                let state_ref = &mut *state;
                let Some(room) = state_ref.rooms.get_mut(&room_id) else {
                    break;
                };
                if room.is_full(cap) || room.status() != RoomStatus::Buffering {
                    break;
                }
                let Some(entry) = state_ref.queue.pop_front_candidates(1).pop() else {
                    break;
                };
                if !entry.conn.is_live() {
                    state_ref
                        .registry
                        .set_status(&entry.participant_id, SessionStatus::Online);
                    continue;
                }

                let player = Player::new(
                    entry.participant_id.clone(),
                    entry.display_name.clone(),
                    entry.conn.clone(),
                );
                if room.add_player(player, cap).is_err() {
                    state_ref.queue.requeue_front(vec![entry]);
                    break;
                }
                entry.conn.send(&ServerEvent::RoomReady {
                    room_id,
                    roster: room.snapshots(),
                    text: room.text().to_string(),
                });
                let joined = ServerEvent::PlayerJoinedDuringBuffer {
                    roster: room.snapshots(),
                };
                Self::broadcast_room(room, &joined);
                state_ref
                    .registry
                    .set_status(&entry.participant_id, SessionStatus::Racing);
            }
        }

        // Found new rooms while a live quorum remains
        loop {
            if state.queue.len() < quorum {
                break;
            }

            let candidates = state.queue.pop_front_candidates(cap);
            let (live, dead): (Vec<_>, Vec<_>) = candidates
                .into_iter()
                .partition(|entry| entry.conn.is_live());
            for entry in dead {
                debug!(
                    participant_id = %entry.participant_id,
                    "Dropping dead connection from queue"
                );
                state
                    .registry
                    .set_status(&entry.participant_id, SessionStatus::Online);
            }
            if live.len() < quorum {
                state.queue.requeue_front(live);
                break;
            }

            let mut room = RoomInstance::new(
                random_passage().to_string(),
                self.settings.race.countdown_seconds,
            );
            let room_id = room.id();
            for entry in &live {
                room.add_player(
                    Player::new(
                        entry.participant_id.clone(),
                        entry.display_name.clone(),
                        entry.conn.clone(),
                    ),
                    cap,
                )?;
            }

            info!(
                room_id = %room_id,
                players = live.len(),
                "Room founded, countdown starting"
            );

            let ready = ServerEvent::RoomReady {
                room_id,
                roster: room.snapshots(),
                text: room.text().to_string(),
            };
            Self::broadcast_room(&room, &ready);
            for entry in &live {
                state
                    .registry
                    .set_status(&entry.participant_id, SessionStatus::Racing);
            }

            self.start_countdown(&mut room);
            state.rooms.insert(room_id, room);
            state.stats.rooms_created += 1;
            self.metrics.record_room_created();
        }

        self.broadcast_stats_locked(&state);
        self.update_gauges_locked(&state);
        Ok(())
    }

    /// Attach the 1 Hz countdown task to a freshly founded room
    fn start_countdown(&self, room: &mut RoomInstance) {
        let orchestrator = self.clone();
        let room_id = room.id();
        let task = tokio::spawn(async move {
            let mut ticker = interval(tokio::time::Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match orchestrator.countdown_tick(room_id) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(error) => {
                        error!(room_id = %room_id, error = %error, "Countdown tick failed");
                        break;
                    }
                }
            }
        });
        room.attach_countdown(task);
    }

    /// One countdown tick. Returns true while the countdown should keep
    /// running.
    ///
    /// Re-validates the room on every tick: a disposed room or one that
    /// dropped below quorum ends the countdown.
    pub(crate) fn countdown_tick(&self, room_id: RoomId) -> Result<bool> {
        let mut state = self.lock_state()?;

        let Some(room) = state.rooms.get(&room_id) else {
            return Ok(false);
        };
        if room.status() != RoomStatus::Buffering {
            return Ok(false);
        }

        if room.connected_count() < self.settings.race.quorum {
            self.cancel_countdown_locked(&mut state, room_id);
            return Ok(false);
        }

        let room = state
            .rooms
            .get_mut(&room_id)
            .ok_or_else(|| OrchestratorError::RoomNotFound {
                room_id: room_id.to_string(),
            })?;
        let remaining = room.countdown_remaining();
        Self::broadcast_room(
            room,
            &ServerEvent::Countdown {
                seconds_remaining: remaining,
            },
        );

        if remaining == 0 {
            room.begin_racing()?;
            Self::broadcast_room(room, &ServerEvent::RaceStarted);
            info!(room_id = %room_id, "Race started");
            state.stats.races_started += 1;
            self.metrics.record_race_started();
            return Ok(false);
        }

        room.decrement_countdown();
        Ok(true)
    }

    /// Abort a buffering room that lost its quorum: connected survivors go
    /// back to the front of the queue, the room is disposed.
    fn cancel_countdown_locked(&self, state: &mut OrchestratorState, room_id: RoomId) {
        let Some(mut room) = state.rooms.remove(&room_id) else {
            return;
        };
        room.cancel_countdown();
        // Held slots die with the room; nothing remains to reconnect to
        state
            .disconnected
            .retain(|_, record| record.room_id != room_id);

        info!(room_id = %room_id, "Countdown cancelled, below quorum");
        Self::broadcast_room(
            &room,
            &ServerEvent::CountdownCancelled {
                reason: "not enough players".to_string(),
            },
        );

        for player in room.roster() {
            if player.is_connected() {
                let position = state.queue.push(
                    player.participant_id.clone(),
                    player.display_name.clone(),
                    player.conn.clone(),
                );
                state
                    .registry
                    .set_status(&player.participant_id, SessionStatus::Waiting);
                player.conn.send(&ServerEvent::Queued { position });
            } else {
                state
                    .registry
                    .set_status(&player.participant_id, SessionStatus::Online);
            }
        }

        if state.queue.len() >= self.settings.race.quorum {
            self.schedule_matchmaking_locked(state);
        }
        self.broadcast_stats_locked(state);
    }

    /// Send an event to every connected member of a room
    pub(crate) fn broadcast_room(room: &RoomInstance, event: &ServerEvent) {
        for player in room.roster() {
            if player.is_connected() {
                player.conn.send(event);
            }
        }
    }

    /// Push the current aggregate counts to every live session
    pub(crate) fn broadcast_stats_locked(&self, state: &OrchestratorState) {
        let snapshot = state.registry.stats(state.queue.len());
        let event = ServerEvent::StatsSnapshot {
            online: snapshot.online,
            racing: snapshot.racing,
            waiting: snapshot.waiting,
        };
        for session in state.registry.sessions() {
            session.conn.send(&event);
        }
    }

    pub(crate) fn update_gauges_locked(&self, state: &OrchestratorState) {
        self.metrics.set_sessions_online(state.registry.len());
        self.metrics.set_active_rooms(
            state
                .rooms
                .values()
                .filter(|room| room.status() != RoomStatus::Finished)
                .count(),
        );
        self.metrics.set_players_waiting(state.queue.len());
    }

    /// Start the periodic background loops (stale-room sweep and stats
    /// broadcast). Returns their handles so the caller can abort them on
    /// shutdown.
    pub fn start_background_tasks(&self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::new();

        let sweeper = self.clone();
        let sweep_interval = self.settings.sweep_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(sweep_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = sweeper.sweep_stale_rooms() {
                    error!(error = %error, "Stale-room sweep failed");
                }
            }
        }));

        let broadcaster = self.clone();
        let stats_interval = self.settings.stats_interval();
        tasks.push(tokio::spawn(async move {
            let mut ticker = interval(stats_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(error) = broadcaster.broadcast_stats() {
                    error!(error = %error, "Stats broadcast failed");
                }
            }
        }));

        tasks
    }

    /// One sweep pass: force-finish races past the duration cap and dispose
    /// finished rooms that no longer have anyone to wait for.
    pub fn sweep_stale_rooms(&self) -> Result<()> {
        let mut state = self.lock_state()?;
        let timeout = chrono::Duration::from_std(self.settings.race_timeout())
            .map_err(|_| OrchestratorError::ConfigurationError {
                message: "Race timeout out of range".to_string(),
            })?;

        let timed_out: Vec<RoomId> = state
            .rooms
            .values()
            .filter(|room| room.racing_longer_than(timeout))
            .map(|room| room.id())
            .collect();
        for room_id in timed_out {
            warn!(room_id = %room_id, "Race exceeded duration cap, force finishing");
            self.finish_room_locked(&mut state, room_id, crate::types::CompletionCause::Timeout)?;
        }

        // Nobody connected and nobody coming back: dispose regardless of
        // status
        let disposable: Vec<RoomId> = state
            .rooms
            .values()
            .filter(|room| {
                room.connected_count() == 0
                    && !state
                        .disconnected
                        .values()
                        .any(|record| record.room_id == room.id())
            })
            .map(|room| room.id())
            .collect();
        for room_id in disposable {
            debug!(room_id = %room_id, "Sweeping abandoned room");
            state.rooms.remove(&room_id);
        }

        self.update_gauges_locked(&state);
        Ok(())
    }

    /// Broadcast aggregate counts to all sessions (periodic task body)
    pub fn broadcast_stats(&self) -> Result<()> {
        let state = self.lock_state()?;
        self.broadcast_stats_locked(&state);
        Ok(())
    }

    /// Current operation statistics with live gauges filled in
    pub fn get_stats(&self) -> Result<OrchestratorStats> {
        let state = self.lock_state()?;
        let mut stats = state.stats.clone();
        stats.active_rooms = state
            .rooms
            .values()
            .filter(|room| room.status() != RoomStatus::Finished)
            .count();
        stats.players_waiting = state.queue.len();
        Ok(stats)
    }

    /// Number of live rooms (for health reporting)
    pub fn active_room_count(&self) -> Result<usize> {
        let state = self.lock_state()?;
        Ok(state
            .rooms
            .values()
            .filter(|room| room.status() != RoomStatus::Finished)
            .count())
    }

    /// Tear everything down: notify and close every session, drop all rooms
    /// (aborting their timers) and pending grace records.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.lock_state()?;

        info!(
            sessions = state.registry.len(),
            rooms = state.rooms.len(),
            "Shutting down orchestrator"
        );

        if let Some(task) = state.buffer_task.take() {
            task.abort();
        }
        let notice = ServerEvent::SessionInvalidated {
            reason: "server shutting down".to_string(),
        };
        for session in state.registry.sessions() {
            session.conn.send(&notice);
            session.conn.close();
        }

        state.rooms.clear();
        state.disconnected.clear();
        state.queue = MatchmakingQueue::new();
        state.registry = ConnectionRegistry::new();
        self.update_gauges_locked(&state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{GuestIdentityProvider, RecordingResultStore};
    use crate::transport::RecordingConnection;
    use crate::types::IdentityCredentials;

    fn orchestrator() -> RaceOrchestrator {
        RaceOrchestrator::new(
            AppConfig::default(),
            Arc::new(GuestIdentityProvider::new()),
            Arc::new(RecordingResultStore::new()),
        )
    }

    async fn register(orchestrator: &RaceOrchestrator) -> Arc<RecordingConnection> {
        let conn = RecordingConnection::new();
        orchestrator
            .register(
                conn.clone(),
                IdentityCredentials {
                    token: Some("u1".to_string()),
                    display_name: Some("Alice".to_string()),
                },
            )
            .await
            .unwrap();
        conn
    }

    fn window_pending(orchestrator: &RaceOrchestrator) -> bool {
        orchestrator.lock_state().unwrap().buffer_task.is_some()
    }

    #[tokio::test(start_paused = true)]
    async fn test_leave_queue_cancels_matchmaking_window_when_empty() {
        let orchestrator = orchestrator();
        let conn = register(&orchestrator).await;

        orchestrator.join_queue(conn.clone(), "Alice").unwrap();
        assert!(window_pending(&orchestrator));

        orchestrator.leave_queue(conn.clone()).unwrap();
        assert!(!window_pending(&orchestrator));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_of_last_waiter_cancels_matchmaking_window() {
        let orchestrator = orchestrator();
        let conn = register(&orchestrator).await;

        orchestrator.join_queue(conn.clone(), "Alice").unwrap();
        assert!(window_pending(&orchestrator));

        conn.drop_link();
        orchestrator.handle_disconnect(conn.id()).unwrap();
        assert!(!window_pending(&orchestrator));
    }
}
