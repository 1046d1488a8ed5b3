//! Connection capability interface
//!
//! The orchestrator never depends on a concrete transport. Anything that can
//! identify itself, deliver a [`ServerEvent`] without blocking, report
//! liveness, and be closed can carry a participant.

use crate::transport::events::ServerEvent;
use crate::types::ConnectionId;
use crate::utils::generate_connection_id;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Minimal capability surface a transport connection must provide.
///
/// `send` must not block: implementations are expected to enqueue onto an
/// outbound channel and report delivery failure via the return value.
pub trait ClientConnection: Send + Sync {
    /// Stable identifier for this connection's lifetime
    fn id(&self) -> ConnectionId;

    /// Enqueue an event for delivery; returns false if the connection is gone
    fn send(&self, event: &ServerEvent) -> bool;

    /// Whether the underlying transport is still usable
    fn is_live(&self) -> bool;

    /// Force-close the connection
    fn close(&self);
}

/// Shared handle to a transport connection
pub type Connection = Arc<dyn ClientConnection>;

/// In-memory connection that records every event it is sent.
///
/// Used by the test suites and by any embedding that wants a loopback
/// transport.
#[derive(Debug)]
pub struct RecordingConnection {
    id: ConnectionId,
    live: AtomicBool,
    sent: Mutex<Vec<ServerEvent>>,
}

impl RecordingConnection {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: generate_connection_id(),
            live: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// All events delivered so far, in order
    pub fn sent_events(&self) -> Vec<ServerEvent> {
        self.sent.lock().map(|events| events.clone()).unwrap_or_default()
    }

    /// Number of delivered events with the given wire name
    pub fn count_events_named(&self, name: &str) -> usize {
        self.sent_events()
            .iter()
            .filter(|event| event.name() == name)
            .count()
    }

    /// Most recent event with the given wire name, if any
    pub fn last_event_named(&self, name: &str) -> Option<ServerEvent> {
        self.sent_events()
            .into_iter()
            .rev()
            .find(|event| event.name() == name)
    }

    /// Drop all recorded events
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.sent.lock() {
            events.clear();
        }
    }

    /// Simulate the transport dropping without a close handshake
    pub fn drop_link(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

impl ClientConnection for RecordingConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn send(&self, event: &ServerEvent) -> bool {
        if !self.is_live() {
            return false;
        }
        if let Ok(mut events) = self.sent.lock() {
            events.push(event.clone());
            true
        } else {
            false
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.live.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_connection_records_in_order() {
        let conn = RecordingConnection::new();
        assert!(conn.is_live());

        assert!(conn.send(&ServerEvent::RaceStarted));
        assert!(conn.send(&ServerEvent::Countdown {
            seconds_remaining: 3
        }));

        let events = conn.sent_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ServerEvent::RaceStarted);
        assert_eq!(conn.count_events_named("countdown"), 1);
    }

    #[test]
    fn test_closed_connection_rejects_sends() {
        let conn = RecordingConnection::new();
        conn.close();

        assert!(!conn.is_live());
        assert!(!conn.send(&ServerEvent::RaceStarted));
        assert!(conn.sent_events().is_empty());
    }

    #[test]
    fn test_dropped_link_reports_not_live() {
        let conn = RecordingConnection::new();
        conn.drop_link();
        assert!(!conn.is_live());
    }

    #[test]
    fn test_connections_have_unique_ids() {
        let a = RecordingConnection::new();
        let b = RecordingConnection::new();
        assert_ne!(a.id(), b.id());
    }
}
