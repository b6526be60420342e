// =====================================================================================
// File: service-fraud/src/config.rs
// Description: Fraud detection service configuration
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::env;
use std::time::Duration;

use core_fraud::RuleCatalogConfig;

use crate::error::{ServiceError, ServiceResult};

/// Fraud detection service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudServiceConfig {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub model: ModelConfig,
    pub rules: RuleCatalogConfig,
    pub assessment: AssessmentConfig,
    pub alerts: AlertConfig,
    pub monitoring: MonitoringConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
    pub idle_timeout: u64,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub connection_timeout: u64,
    pub command_timeout: u64,
    pub retry_attempts: u32,
}

/// Model artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base path of the artifact set; the scaler and feature-name
    /// companions are derived from it
    pub artifact_path: String,
}

/// Assessment pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentConfig {
    /// Hard per-assessment deadline
    pub deadline_ms: u64,
    /// Weight of the rule sum in score fusion
    pub rule_weight: f64,
    /// Weight of the model score in score fusion
    pub ml_weight: f64,
    /// Weighted rule score above which a triggered rule forces manual
    /// review in the medium band
    pub manual_review_rule_score: f64,
    /// Profile cache TTL in seconds
    pub profile_cache_ttl_seconds: u64,
}

/// Alert sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Webhook endpoint; the tracing sink is used when unset
    pub webhook_url: Option<String>,
    pub timeout_seconds: u64,
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub metrics_enabled: bool,
    pub health_check_interval: u64,
}

impl Default for FraudServiceConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            model: ModelConfig::default(),
            rules: RuleCatalogConfig::default(),
            assessment: AssessmentConfig::default(),
            alerts: AlertConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost:5432/fraud_service".to_string(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
            idle_timeout: 600,
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            connection_timeout: 5,
            command_timeout: 5,
            retry_attempts: 3,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: "models/fraud_model.json".to_string(),
        }
    }
}

impl Default for AssessmentConfig {
    fn default() -> Self {
        Self {
            deadline_ms: 500,
            rule_weight: 0.6,
            ml_weight: 0.4,
            manual_review_rule_score: 0.5,
            profile_cache_ttl_seconds: 300,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: 5,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            health_check_interval: 30,
        }
    }
}

impl FraudServiceConfig {
    /// Defaults overridden by environment variables
    pub fn from_env() -> ServiceResult<Self> {
        let mut config = Self::default();

        if let Ok(url) = env::var("DATABASE_URL") {
            config.database.url = url;
        }
        if let Ok(url) = env::var("REDIS_URL") {
            config.redis.url = url;
        }
        if let Ok(path) = env::var("FRAUD_MODEL_PATH") {
            config.model.artifact_path = path;
        }
        if let Ok(deadline) = env::var("FRAUD_ASSESSMENT_DEADLINE_MS") {
            config.assessment.deadline_ms = deadline.parse().map_err(|_| {
                ServiceError::configuration(format!(
                    "FRAUD_ASSESSMENT_DEADLINE_MS must be an integer, got '{deadline}'"
                ))
            })?;
        }
        if let Ok(url) = env::var("FRAUD_ALERT_WEBHOOK_URL") {
            config.alerts.webhook_url = Some(url);
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the pipeline cannot run with
    pub fn validate(&self) -> ServiceResult<()> {
        if self.assessment.deadline_ms == 0 {
            return Err(ServiceError::configuration("deadline_ms must be positive"));
        }
        if self.assessment.rule_weight < 0.0 || self.assessment.ml_weight < 0.0 {
            return Err(ServiceError::configuration(
                "fusion weights must be non-negative",
            ));
        }
        if self.rules.velocity_windows.is_empty() {
            return Err(ServiceError::configuration(
                "at least one velocity window is required",
            ));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    /// Open the Postgres connection pool
    pub async fn connect(&self) -> ServiceResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(Duration::from_secs(self.connect_timeout))
            .idle_timeout(Duration::from_secs(self.idle_timeout))
            .connect(&self.url)
            .await?;
        Ok(pool)
    }
}
