//! Component health for liveness and readiness probes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::cache::OrderCache;
use crate::ingest::{PipelineMonitor, PipelineState, PipelineStats};
use crate::persistence::OrderStore;

/// Health status for a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    fn worst(self, other: HealthStatus) -> HealthStatus {
        use HealthStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }
}

/// Component health check result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CacheSummary {
    pub size: usize,
    pub capacity: usize,
}

/// Overall service health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
    pub cache: CacheSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineStats>,
}

/// Shared state behind `/health`
pub struct HealthState {
    pub started_at: DateTime<Utc>,
    store: Arc<dyn OrderStore>,
    cache: Arc<OrderCache>,
    pipeline: Option<PipelineMonitor>,
}

impl HealthState {
    pub fn new(store: Arc<dyn OrderStore>, cache: Arc<OrderCache>) -> Self {
        Self {
            started_at: Utc::now(),
            store,
            cache,
            pipeline: None,
        }
    }

    pub fn with_pipeline(mut self, monitor: PipelineMonitor) -> Self {
        self.pipeline = Some(monitor);
        self
    }

    /// Ping the store
    pub async fn check_db(&self) -> bool {
        match self.store.ping().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Database health check failed: {}", e);
                false
            }
        }
    }

    /// Get overall health status
    ///
    /// A store that cannot be reached makes the service unhealthy. A stopped
    /// pipeline only degrades it since cached and stored orders are still
    /// served.
    pub async fn get_health(&self) -> HealthResponse {
        let mut components = Vec::new();

        let db_ok = self.check_db().await;
        let db_status = if db_ok {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };
        components.push(ComponentHealth {
            name: "database".to_string(),
            status: db_status,
            message: (!db_ok).then(|| "Unreachable".to_string()),
            last_check: Some(Utc::now()),
        });

        let (pipeline_status, pipeline_message, stats) = match &self.pipeline {
            Some(monitor) => match monitor.state() {
                PipelineState::Running => (HealthStatus::Healthy, None, Some(monitor.stats())),
                PipelineState::Stopped => (
                    HealthStatus::Degraded,
                    Some("Stopped".to_string()),
                    Some(monitor.stats()),
                ),
            },
            None => (
                HealthStatus::Degraded,
                Some("Not started".to_string()),
                None,
            ),
        };
        components.push(ComponentHealth {
            name: "ingestion".to_string(),
            status: pipeline_status,
            message: pipeline_message,
            last_check: Some(Utc::now()),
        });

        let cache = CacheSummary {
            size: self.cache.size().await,
            capacity: self.cache.capacity(),
        };
        components.push(ComponentHealth {
            name: "cache".to_string(),
            status: HealthStatus::Healthy,
            message: Some(format!("{}/{} entries", cache.size, cache.capacity)),
            last_check: Some(Utc::now()),
        });

        let status = components
            .iter()
            .fold(HealthStatus::Healthy, |acc, c| acc.worst(c.status));

        HealthResponse {
            status,
            timestamp: Utc::now(),
            uptime_seconds: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
            components,
            cache,
            pipeline: stats,
        }
    }
}
