//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the paceline race
//! orchestrator using Prometheus metrics.

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the race orchestrator
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Session-related metrics
    session_metrics: SessionMetrics,

    /// Race-related metrics
    race_metrics: RaceMetrics,
}

/// Session-related metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Current number of registered sessions
    pub sessions_online: IntGauge,

    /// Players currently waiting in the matchmaking queue
    pub players_waiting: IntGauge,

    /// Total players enqueued
    pub players_queued_total: IntCounter,

    /// Mid-race disconnects observed
    pub disconnects_total: IntCounter,

    /// Reconnection attempts by outcome
    pub reconnects_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Race-related metrics
#[derive(Clone)]
pub struct RaceMetrics {
    /// Current number of live rooms
    pub active_rooms: IntGauge,

    /// Total rooms created
    pub rooms_created_total: IntCounter,

    /// Total races that reached the racing state
    pub races_started_total: IntCounter,

    /// Total races finished, by completion cause
    pub races_finished_total: IntCounterVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let session_metrics = SessionMetrics::new(&registry)?;
        let race_metrics = RaceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            session_metrics,
            race_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get session metrics
    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    /// Get race metrics
    pub fn race(&self) -> &RaceMetrics {
        &self.race_metrics
    }

    /// Record a player being enqueued
    pub fn record_player_queued(&self) {
        self.session_metrics.players_queued_total.inc();
    }

    /// Record a room being founded
    pub fn record_room_created(&self) {
        self.race_metrics.rooms_created_total.inc();
    }

    /// Record a race reaching the racing state
    pub fn record_race_started(&self) {
        self.race_metrics.races_started_total.inc();
    }

    /// Record a race finishing with the given completion cause
    pub fn record_race_finished(&self, cause: &str) {
        self.race_metrics
            .races_finished_total
            .with_label_values(&[cause])
            .inc();
    }

    /// Record a mid-race disconnect
    pub fn record_disconnect(&self) {
        self.session_metrics.disconnects_total.inc();
    }

    /// Record a reconnection attempt outcome ("success" or "failed")
    pub fn record_reconnect(&self, outcome: &str) {
        self.session_metrics
            .reconnects_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn set_sessions_online(&self, count: usize) {
        self.session_metrics.sessions_online.set(count as i64);
    }

    pub fn set_active_rooms(&self, count: usize) {
        self.race_metrics.active_rooms.set(count as i64);
    }

    pub fn set_players_waiting(&self, count: usize) {
        self.session_metrics.players_waiting.set(count as i64);
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.session_metrics.health_status.set(status as i64);
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector with fresh registry")
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let sessions_online = IntGauge::new(
            "paceline_sessions_online",
            "Current number of registered sessions",
        )?;
        registry.register(Box::new(sessions_online.clone()))?;

        let players_waiting = IntGauge::new(
            "paceline_players_waiting",
            "Players waiting in the matchmaking queue",
        )?;
        registry.register(Box::new(players_waiting.clone()))?;

        let players_queued_total =
            IntCounter::new("paceline_players_queued_total", "Total players enqueued")?;
        registry.register(Box::new(players_queued_total.clone()))?;

        let disconnects_total = IntCounter::new(
            "paceline_disconnects_total",
            "Mid-race disconnects observed",
        )?;
        registry.register(Box::new(disconnects_total.clone()))?;

        let reconnects_total = IntCounterVec::new(
            Opts::new(
                "paceline_reconnects_total",
                "Reconnection attempts by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let health_status = IntGauge::new(
            "paceline_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            sessions_online,
            players_waiting,
            players_queued_total,
            disconnects_total,
            reconnects_total,
            health_status,
        })
    }
}

impl RaceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_rooms =
            IntGauge::new("paceline_active_rooms", "Current number of live rooms")?;
        registry.register(Box::new(active_rooms.clone()))?;

        let rooms_created_total =
            IntCounter::new("paceline_rooms_created_total", "Total rooms created")?;
        registry.register(Box::new(rooms_created_total.clone()))?;

        let races_started_total = IntCounter::new(
            "paceline_races_started_total",
            "Total races that reached the racing state",
        )?;
        registry.register(Box::new(races_started_total.clone()))?;

        let races_finished_total = IntCounterVec::new(
            Opts::new(
                "paceline_races_finished_total",
                "Total races finished by completion cause",
            ),
            &["cause"],
        )?;
        registry.register(Box::new(races_finished_total.clone()))?;

        Ok(Self {
            active_rooms,
            rooms_created_total,
            races_started_total,
            races_finished_total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_creation() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_player_queued();
        collector.record_room_created();
        collector.record_race_finished("completed");
        collector.record_reconnect("success");
        collector.set_active_rooms(2);

        assert_eq!(collector.race().rooms_created_total.get(), 1);
        assert_eq!(collector.race().active_rooms.get(), 2);
        assert_eq!(collector.session().players_queued_total.get(), 1);
    }

    #[test]
    fn test_registry_gathers_metrics() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_race_started();

        let families = collector.registry().gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "paceline_races_started_total"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let registry = Arc::new(Registry::new());
        assert!(MetricsCollector::with_registry(registry.clone()).is_ok());
        assert!(MetricsCollector::with_registry(registry).is_err());
    }
}
