// =====================================================================================
// File: core-fraud/src/error.rs
// Description: Error types for the fraud scoring engine
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for fraud engine operations
pub type FraudResult<T> = Result<T, FraudError>;

/// Fraud engine error types
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum FraudError {
    /// Data validation errors
    #[error("Validation error in field '{field}': {message}")]
    ValidationError { field: String, message: String },

    /// Rule evaluation errors
    #[error("Rule '{rule}' failed: {message}")]
    RuleError { rule: String, message: String },

    /// Feature extraction errors
    #[error("Feature extraction error: {message}")]
    FeatureError { message: String },

    /// Model prediction errors
    #[error("Model error: {message}")]
    ModelError { message: String },

    /// Model artifact loading errors
    #[error("Artifact error for '{path}': {message}")]
    ArtifactError { path: String, message: String },

    /// Transaction history lookup errors
    #[error("History query error: {message}")]
    HistoryError { message: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl FraudError {
    /// Create a validation error
    pub fn validation<S: Into<String>>(field: S, message: S) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a rule error
    pub fn rule<S: Into<String>>(rule: S, message: S) -> Self {
        Self::RuleError {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create a feature error
    pub fn feature<S: Into<String>>(message: S) -> Self {
        Self::FeatureError {
            message: message.into(),
        }
    }

    /// Create a model error
    pub fn model<S: Into<String>>(message: S) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    /// Create an artifact error
    pub fn artifact<S: Into<String>>(path: S, message: S) -> Self {
        Self::ArtifactError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a history error
    pub fn history<S: Into<String>>(message: S) -> Self {
        Self::HistoryError {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::InternalError {
            message: message.into(),
        }
    }

    /// Get error code for categorization
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ValidationError { .. } => "VALIDATION_ERROR",
            Self::RuleError { .. } => "RULE_ERROR",
            Self::FeatureError { .. } => "FEATURE_ERROR",
            Self::ModelError { .. } => "MODEL_ERROR",
            Self::ArtifactError { .. } => "ARTIFACT_ERROR",
            Self::HistoryError { .. } => "HISTORY_ERROR",
            Self::InternalError { .. } => "INTERNAL_ERROR",
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::HistoryError { .. })
    }
}
