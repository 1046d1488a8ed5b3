//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the orchestrator
//! to its external seams, starts the health endpoints, and manages
//! background tasks.

use crate::config::AppConfig;
use crate::external::{GuestIdentityProvider, IdentityProvider, LoggingResultStore, ResultStore};
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::orchestrator::RaceOrchestrator;
use anyhow::Result;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Core race orchestration
    orchestrator: RaceOrchestrator,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// Service status
    is_running: Arc<RwLock<bool>>,
}

impl AppState {
    /// Initialize the application with default external providers
    pub fn new(config: AppConfig) -> Result<Self, ServiceError> {
        Self::with_providers(
            config,
            Arc::new(GuestIdentityProvider::new()),
            Arc::new(LoggingResultStore::new()),
        )
    }

    /// Initialize the application with explicit external providers
    pub fn with_providers(
        config: AppConfig,
        identity: Arc<dyn IdentityProvider>,
        results: Arc<dyn ResultStore>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing paceline race orchestrator service");
        info!(
            "Configuration: service={}, health_port={}, quorum={}, roster_cap={}",
            config.service.name,
            config.service.health_port,
            config.race.quorum,
            config.race.roster_cap
        );

        let metrics_service = Self::initialize_metrics(&config)?;
        let orchestrator = RaceOrchestrator::with_metrics(
            config.clone(),
            identity,
            results,
            metrics_service.collector(),
        );

        Ok(Self {
            config,
            orchestrator,
            metrics_service,
            background_tasks: Vec::new(),
            is_running: Arc::new(RwLock::new(false)),
        })
    }

    /// Start the health endpoints and the orchestrator's background loops
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting paceline service");

        *self.is_running.write().await = true;

        self.start_metrics_service().await?;

        let mut orchestrator_tasks = self.orchestrator.start_background_tasks();
        let task_count = orchestrator_tasks.len();
        self.background_tasks.append(&mut orchestrator_tasks);
        info!("{} orchestrator background tasks started", task_count);

        self.metrics_service.collector().update_health_status(2);
        info!("Paceline service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of paceline service");

        *self.is_running.write().await = false;
        self.metrics_service.collector().update_health_status(0);

        self.stop_background_tasks().await;

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        }

        if let Err(e) = self.orchestrator.shutdown() {
            warn!("Orchestrator shutdown reported an error: {}", e);
        }

        match self.orchestrator.get_stats() {
            Ok(final_stats) => info!("Final service statistics: {:?}", final_stats),
            Err(e) => warn!("Failed to get final stats: {}", e),
        }

        info!("Paceline service shutdown completed");
        Ok(())
    }

    /// Get service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Check if service is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get the orchestrator for request handling
    pub fn orchestrator(&self) -> RaceOrchestrator {
        self.orchestrator.clone()
    }

    /// Get metrics service
    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Initialize metrics service
    fn initialize_metrics(config: &AppConfig) -> Result<Arc<MetricsService>, ServiceError> {
        info!(
            "Initializing metrics service on port {}",
            config.service.health_port
        );

        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let health_config = HealthServerConfig {
            port: config.service.health_port,
            host: "0.0.0.0".to_string(),
        };

        let health_server = Arc::new(HealthServer::new(health_config, metrics_collector.clone()));
        Ok(Arc::new(MetricsService::new(
            metrics_collector,
            health_server,
        )))
    }

    /// Start the health endpoints as a background task
    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.health_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.start().await {
                error!("Metrics service failed: {}", e);
            }
        });
        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        info!("Metrics service started on port {}", port);
        Ok(())
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            return;
        }

        info!("Stopping {} background tasks...", task_count);
        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        info!("All {} background tasks stopped", task_count);
    }
}
