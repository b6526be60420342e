// =====================================================================================
// File: service-fraud/src/lib.rs
// Description: Fraud detection service library
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

//! # Fraud Detection Service
//!
//! Storage-backed half of the transaction fraud assessment pipeline: the
//! cache-through profile store, the Postgres history aggregator, assessment
//! persistence, alert sinks, and the coordinator that runs the `core-fraud`
//! rule engine and model scorer against one transaction per request.
//!
//! The transport layer lives outside this crate; embedders build a
//! [`FraudServiceContext`] and drive [`FraudDetectionServiceTrait::assess`]
//! directly.

pub mod alerts;
pub mod cache;
pub mod config;
pub mod error;
pub mod health;
pub mod history;
pub mod metrics;
pub mod profile;
pub mod service;
pub mod store;

use std::path::Path;
use std::sync::Arc;
use tracing::info;

use core_fraud::{standard_registry, ModelScorer, RuleEngine, TransactionHistory};

use crate::alerts::{AlertSink, TracingAlertSink, WebhookAlertSink};
use crate::cache::ProfileCache;
use crate::history::PgTransactionHistory;
use crate::profile::ProfileStore;
use crate::store::PgAssessmentStore;

pub use config::FraudServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use health::{HealthService, HealthStatus, ServiceStatus};
pub use metrics::FraudMetrics;
pub use service::{
    assessment_confidence, assessment_reason, fuse, resolve_action, FraudDetectionService,
    FraudDetectionServiceTrait,
};

/// Wired service components shared with the embedding process
pub struct FraudServiceContext {
    pub service: Arc<FraudDetectionService>,
    pub health: Arc<HealthService>,
    pub metrics: Arc<FraudMetrics>,
}

impl FraudServiceContext {
    /// Connect the stores and assemble the assessment pipeline
    pub async fn initialize(config: FraudServiceConfig) -> ServiceResult<Self> {
        config.validate()?;

        let pool = config.database.connect().await?;
        let cache = Arc::new(ProfileCache::connect(&config.redis).await?);
        let metrics = Arc::new(FraudMetrics::new().map_err(|metrics_error| {
            ServiceError::Internal(metrics_error.to_string())
        })?);

        let history: Arc<dyn TransactionHistory> =
            Arc::new(PgTransactionHistory::new(pool.clone()));
        let engine = RuleEngine::new(standard_registry(Arc::clone(&history), &config.rules));
        let scorer = Arc::new(ModelScorer::load(Path::new(&config.model.artifact_path)).await);

        let profiles = Arc::new(ProfileStore::new(
            pool.clone(),
            Arc::clone(&cache),
            config.assessment.profile_cache_ttl_seconds,
        ));
        let store = Arc::new(PgAssessmentStore::new(pool.clone()));
        let alerts: Arc<dyn AlertSink> = match &config.alerts.webhook_url {
            Some(url) => Arc::new(WebhookAlertSink::new(&config.alerts, url.clone())?),
            None => Arc::new(TracingAlertSink),
        };

        let health = Arc::new(HealthService::new(
            pool,
            Arc::clone(&cache),
            Arc::clone(&scorer),
        ));
        let service = Arc::new(FraudDetectionService::new(
            config.assessment.clone(),
            profiles,
            history,
            engine,
            scorer,
            store,
            alerts,
            Arc::clone(&metrics),
        ));

        info!("fraud detection service initialized");
        Ok(Self {
            service,
            health,
            metrics,
        })
    }
}

/// Install the structured logging subscriber for the embedding process
pub fn init_telemetry() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}
