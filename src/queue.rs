//! Matchmaking queue: ordered waiting entries
//!
//! Pure ordering logic only. Quorum checks, liveness re-validation, and room
//! founding live in the orchestrator, which is the only writer.

use crate::transport::{ClientConnection, Connection};
use crate::types::{ConnectionId, ParticipantId};
use crate::utils::current_timestamp;
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// One participant waiting to be matched
#[derive(Clone)]
pub struct WaitingEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub conn: Connection,
    pub enqueued_at: DateTime<Utc>,
}

/// FIFO queue of waiting participants
#[derive(Default)]
pub struct MatchmakingQueue {
    entries: VecDeque<WaitingEntry>,
}

impl MatchmakingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, returning its 1-based queue position
    pub fn push(&mut self, participant_id: ParticipantId, display_name: String, conn: Connection) -> usize {
        self.entries.push_back(WaitingEntry {
            participant_id,
            display_name,
            conn,
            enqueued_at: current_timestamp(),
        });
        self.entries.len()
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.participant_id == participant_id)
    }

    pub fn remove_by_connection(&mut self, connection_id: ConnectionId) -> Option<WaitingEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.conn.id() == connection_id)?;
        self.entries.remove(index)
    }

    pub fn remove_by_participant(&mut self, participant_id: &str) -> Option<WaitingEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.participant_id == participant_id)?;
        self.entries.remove(index)
    }

    /// Pop up to `max` entries from the front for room founding
    pub fn pop_front_candidates(&mut self, max: usize) -> Vec<WaitingEntry> {
        let take = max.min(self.entries.len());
        self.entries.drain(..take).collect()
    }

    /// Put entries back at the front, preserving their relative arrival order
    pub fn requeue_front(&mut self, entries: Vec<WaitingEntry>) {
        for entry in entries.into_iter().rev() {
            if !self.contains(&entry.participant_id) {
                self.entries.push_front(entry);
            }
        }
    }

    pub fn front(&self) -> Option<&WaitingEntry> {
        self.entries.front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::RecordingConnection;

    fn push(queue: &mut MatchmakingQueue, id: &str) -> usize {
        queue.push(id.to_string(), id.to_uppercase(), RecordingConnection::new())
    }

    #[test]
    fn test_push_reports_position() {
        let mut queue = MatchmakingQueue::new();
        assert_eq!(push(&mut queue, "a"), 1);
        assert_eq!(push(&mut queue, "b"), 2);
        assert!(queue.contains("a"));
        assert!(!queue.contains("c"));
    }

    #[test]
    fn test_pop_front_candidates_preserves_order() {
        let mut queue = MatchmakingQueue::new();
        push(&mut queue, "a");
        push(&mut queue, "b");
        push(&mut queue, "c");

        let popped = queue.pop_front_candidates(2);
        assert_eq!(popped.len(), 2);
        assert_eq!(popped[0].participant_id, "a");
        assert_eq!(popped[1].participant_id, "b");
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.front().unwrap().participant_id, "c");
    }

    #[test]
    fn test_requeue_front_restores_arrival_order() {
        let mut queue = MatchmakingQueue::new();
        push(&mut queue, "c");

        let conn_a = RecordingConnection::new();
        let conn_b = RecordingConnection::new();
        let survivors = vec![
            WaitingEntry {
                participant_id: "a".to_string(),
                display_name: "A".to_string(),
                conn: conn_a,
                enqueued_at: current_timestamp(),
            },
            WaitingEntry {
                participant_id: "b".to_string(),
                display_name: "B".to_string(),
                conn: conn_b,
                enqueued_at: current_timestamp(),
            },
        ];
        queue.requeue_front(survivors);

        let order: Vec<_> = queue
            .pop_front_candidates(3)
            .into_iter()
            .map(|e| e.participant_id)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_requeue_front_skips_duplicates() {
        let mut queue = MatchmakingQueue::new();
        push(&mut queue, "a");

        queue.requeue_front(vec![WaitingEntry {
            participant_id: "a".to_string(),
            display_name: "A".to_string(),
            conn: RecordingConnection::new(),
            enqueued_at: current_timestamp(),
        }]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_remove_by_connection() {
        let mut queue = MatchmakingQueue::new();
        let conn = RecordingConnection::new();
        queue.push("a".to_string(), "A".to_string(), conn.clone());
        push(&mut queue, "b");

        let removed = queue.remove_by_connection(conn.id()).unwrap();
        assert_eq!(removed.participant_id, "a");
        assert!(queue.remove_by_connection(conn.id()).is_none());
        assert_eq!(queue.len(), 1);
    }
}
