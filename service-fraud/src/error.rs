// =====================================================================================
// File: service-fraud/src/error.rs
// Description: Error types for the fraud detection service
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use core_fraud::FraudError;
use thiserror::Error;

/// Fraud detection service error types
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Domain(#[from] FraudError),

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Alert delivery failed: {message}")]
    AlertDelivery { message: String },

    #[error("Assessment timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn invalid_request<S: Into<String>>(reason: S) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn alert_delivery<S: Into<String>>(message: S) -> Self {
        Self::AlertDelivery {
            message: message.into(),
        }
    }

    /// Whether the failure leaves the assessment unusable. Rule, model, and
    /// alert problems degrade an assessment instead of failing it; only
    /// request, store, and timeout problems are fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AlertDelivery { .. })
    }
}

/// Fraud detection service result type
pub type ServiceResult<T> = Result<T, ServiceError>;
