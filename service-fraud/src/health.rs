// =====================================================================================
// File: service-fraud/src/health.rs
// Description: Component health checks for the fraud detection service
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use core_fraud::ModelScorer;

use crate::cache::ProfileCache;

/// Service status levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ServiceStatus,
    pub message: Option<String>,
    pub response_time_ms: u64,
}

/// Overall health of the fraud detection service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
    pub model: ComponentHealth,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

/// Health check service over the engine's collaborators
pub struct HealthService {
    pool: PgPool,
    cache: Arc<ProfileCache>,
    scorer: Arc<ModelScorer>,
}

impl HealthService {
    pub fn new(pool: PgPool, cache: Arc<ProfileCache>, scorer: Arc<ModelScorer>) -> Self {
        Self {
            pool,
            cache,
            scorer,
        }
    }

    /// Perform a full health check
    pub async fn check(&self) -> HealthStatus {
        debug!("running fraud service health check");
        let database = self.check_database().await;
        let cache = self.check_cache().await;
        let model = self.check_model().await;

        let status = overall_status(&[&database, &cache, &model]);

        HealthStatus {
            status,
            database,
            cache,
            model,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Whether the service can assess transactions: the database is the
    /// only hard dependency, the cache and model degrade gracefully
    pub async fn readiness(&self) -> bool {
        self.check_database().await.status != ServiceStatus::Unhealthy
    }

    async fn check_database(&self) -> ComponentHealth {
        let started = Instant::now();
        match sqlx::query("SELECT 1 as health_check")
            .fetch_one(&self.pool)
            .await
        {
            Ok(_) => ComponentHealth {
                status: ServiceStatus::Healthy,
                message: None,
                response_time_ms: started.elapsed().as_millis() as u64,
            },
            Err(db_error) => ComponentHealth {
                status: ServiceStatus::Unhealthy,
                message: Some(db_error.to_string()),
                response_time_ms: started.elapsed().as_millis() as u64,
            },
        }
    }

    async fn check_cache(&self) -> ComponentHealth {
        let started = Instant::now();
        if self.cache.ping().await {
            ComponentHealth {
                status: ServiceStatus::Healthy,
                message: None,
                response_time_ms: started.elapsed().as_millis() as u64,
            }
        } else {
            // Profile reads fall back to the store when the cache is down
            ComponentHealth {
                status: ServiceStatus::Degraded,
                message: Some("cache unreachable, profile reads degrade to the store".to_string()),
                response_time_ms: started.elapsed().as_millis() as u64,
            }
        }
    }

    async fn check_model(&self) -> ComponentHealth {
        let started = Instant::now();
        let status = self.scorer.status().await;
        if status.fitted {
            ComponentHealth {
                status: ServiceStatus::Healthy,
                message: Some(format!("{} from {}", status.kind, status.source)),
                response_time_ms: started.elapsed().as_millis() as u64,
            }
        } else {
            // Assessments proceed on rule scores alone
            ComponentHealth {
                status: ServiceStatus::Degraded,
                message: Some("model not fitted, scoring on rules only".to_string()),
                response_time_ms: started.elapsed().as_millis() as u64,
            }
        }
    }
}

fn overall_status(components: &[&ComponentHealth]) -> ServiceStatus {
    if components
        .iter()
        .any(|component| component.status == ServiceStatus::Unhealthy)
    {
        ServiceStatus::Unhealthy
    } else if components
        .iter()
        .any(|component| component.status == ServiceStatus::Degraded)
    {
        ServiceStatus::Degraded
    } else {
        ServiceStatus::Healthy
    }
}
