//! Connection registry: maps live connections to participant sessions
//!
//! The registry owns one [`Session`] per live connection and enforces the
//! single-live-connection-per-participant rule. It is a plain data structure;
//! the orchestrator performs the side effects (invalidation notices, stats
//! broadcasts) that follow from registry changes.

use crate::transport::{ClientConnection, Connection};
use crate::types::{ConnectionId, Identity, ParticipantId, SessionStatus, StatsSnapshot};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// One live connection bound to a participant identity
#[derive(Clone)]
pub struct Session {
    pub conn: Connection,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub guest: bool,
    pub status: SessionStatus,
    pub connected_at: DateTime<Utc>,
}

/// Registry of all live sessions, keyed by connection id
#[derive(Default)]
pub struct ConnectionRegistry {
    sessions: HashMap<ConnectionId, Session>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection to a resolved identity.
    ///
    /// If the participant already has a live session on another connection,
    /// that session is removed and returned so the caller can notify and
    /// close it. At most one live connection per participant id.
    pub fn register(&mut self, conn: Connection, identity: Identity) -> Option<Session> {
        let displaced_id = self
            .sessions
            .iter()
            .find(|(id, session)| {
                session.participant_id == identity.participant_id && **id != conn.id()
            })
            .map(|(id, _)| *id);

        let displaced = displaced_id.and_then(|id| self.sessions.remove(&id));

        self.sessions.insert(
            conn.id(),
            Session {
                conn,
                participant_id: identity.participant_id,
                display_name: identity.display_name,
                guest: identity.guest,
                status: SessionStatus::Online,
                connected_at: current_timestamp(),
            },
        );

        displaced
    }

    pub fn lookup(&self, connection_id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&connection_id)
    }

    pub fn lookup_participant(&self, participant_id: &str) -> Option<&Session> {
        self.sessions
            .values()
            .find(|session| session.participant_id == participant_id)
    }

    /// Update the status of every session owned by a participant
    pub fn set_status(&mut self, participant_id: &str, status: SessionStatus) {
        for session in self.sessions.values_mut() {
            if session.participant_id == participant_id {
                session.status = status;
            }
        }
    }

    /// Remove the session for a connection, returning it if present.
    ///
    /// Does not by itself end any race; disconnect consequences belong to
    /// the reconnection machinery.
    pub fn unregister(&mut self, connection_id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&connection_id)
    }

    /// Aggregate counts for the stats snapshot. Guests are excluded from the
    /// online count, which only reflects signed-in players.
    pub fn stats(&self, waiting: usize) -> StatsSnapshot {
        StatsSnapshot {
            online: self.sessions.values().filter(|s| !s.guest).count(),
            racing: self
                .sessions
                .values()
                .filter(|s| s.status == SessionStatus::Racing)
                .count(),
            waiting,
        }
    }

    /// Iterate over all live sessions (for broadcasts)
    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
