// =====================================================================================
// File: service-fraud/src/alerts.rs
// Description: Best-effort alert emission for high-severity assessments
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use core_fraud::{FraudAlert, FraudAssessment};

use crate::config::AlertConfig;
use crate::error::{ServiceError, ServiceResult};

/// Fire-and-forget alert delivery. Emission failures are reported to the
/// caller but never fail the owning assessment.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn emit(&self, alert: &FraudAlert) -> ServiceResult<()>;
}

/// Build the alert envelope for a high-severity assessment
pub fn build_alert(assessment: &FraudAssessment) -> FraudAlert {
    let mut metadata = HashMap::new();
    metadata.insert("score".to_string(), json!(assessment.score));

    FraudAlert {
        id: Uuid::new_v4(),
        assessment_id: assessment.id,
        user_id: assessment.user_id.clone(),
        alert_type: "HIGH_RISK_TRANSACTION".to_string(),
        severity: assessment.risk_level,
        title: format!("{} risk transaction", assessment.risk_level.as_str()),
        description: assessment.reason.clone(),
        metadata,
        created_at: Utc::now(),
    }
}

/// Alert sink that records alerts on the structured log
pub struct TracingAlertSink;

#[async_trait]
impl AlertSink for TracingAlertSink {
    async fn emit(&self, alert: &FraudAlert) -> ServiceResult<()> {
        warn!(
            assessment_id = %alert.assessment_id,
            user_id = %alert.user_id,
            risk_level = alert.severity.as_str(),
            "high-risk fraud alert"
        );
        Ok(())
    }
}

/// Alert sink that posts the structured payload to a webhook endpoint
pub struct WebhookAlertSink {
    client: reqwest::Client,
    endpoint: String,
}

impl WebhookAlertSink {
    pub fn new(config: &AlertConfig, endpoint: String) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|build_error| ServiceError::alert_delivery(build_error.to_string()))?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn emit(&self, alert: &FraudAlert) -> ServiceResult<()> {
        let payload = json!({
            "assessment_id": alert.assessment_id,
            "user_id": alert.user_id,
            "score": alert.metadata.get("score"),
            "risk_level": alert.severity.as_str(),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|send_error| ServiceError::alert_delivery(send_error.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::alert_delivery(format!(
                "webhook returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}
