// =====================================================================================
// File: core-fraud/src/types.rs
// Description: Domain types for transaction fraud assessment
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use crate::error::{FraudError, FraudResult};

/// Discrete risk band of a fraud score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Resolve the risk band containing a score. Bands are half-open with
    /// inclusive lower bounds: [0, 0.3) LOW, [0.3, 0.6) MEDIUM,
    /// [0.6, 0.8) HIGH, [0.8, 1] CRITICAL.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Critical
        } else if score >= 0.6 {
            Self::High
        } else if score >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Whether the level warrants an operator alert
    pub fn is_alertable(&self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }
}

/// Dispositive action for an assessed transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FraudAction {
    Approve,
    Hold,
    Reject,
    ManualReview,
}

impl FraudAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Hold => "HOLD",
            Self::Reject => "REJECT",
            Self::ManualReview => "MANUAL_REVIEW",
        }
    }
}

/// Transaction kinds accepted by the assessment pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Payment,
    Withdrawal,
    Deposit,
    Refund,
}

/// User identity verification tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationLevel {
    None,
    Basic,
    Enhanced,
    Premium,
}

impl VerificationLevel {
    /// Parse a stored verification level. Returns `None` for values the
    /// platform does not recognize; callers decide the penalty for those.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "NONE" => Some(Self::None),
            "BASIC" => Some(Self::Basic),
            "ENHANCED" => Some(Self::Enhanced),
            "PREMIUM" => Some(Self::Premium),
            _ => None,
        }
    }

    /// Contribution of the verification tier to the base risk score
    pub fn risk_delta(&self) -> f64 {
        match self {
            Self::None => 0.3,
            Self::Basic => 0.1,
            Self::Enhanced => -0.1,
            Self::Premium => -0.2,
        }
    }
}

/// Monetary value in the transaction's declared currency. No FX conversion
/// is performed anywhere in the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Money {
    pub amount: f64,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[validate(range(max = 8))]
    pub precision: u32,
}

impl Money {
    pub fn new(amount: f64, currency: &str, precision: u32) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
            precision,
        }
    }

    /// USD amount with cent precision
    pub fn usd(amount: f64) -> Self {
        Self::new(amount, "USD", 2)
    }

    /// Zero value, used by synthesized profiles
    pub fn zero(currency: &str) -> Self {
        Self {
            amount: 0.0,
            currency: currency.to_string(),
            precision: 2,
        }
    }
}

/// Geographic coordinates attached to a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct GeoLocation {
    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,
    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
    #[validate(length(min = 1))]
    pub country: String,
    pub city: Option<String>,
    pub region: Option<String>,
}

/// Device identity observed at transaction time. Two fingerprints are the
/// same device iff the `fingerprint` strings are equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceFingerprint {
    pub fingerprint: String,
    pub user_agent: String,
    pub ip_address: String,
    pub screen_resolution: Option<String>,
    pub timezone: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
}

/// Candidate transaction submitted for assessment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub amount: Money,
    pub timestamp: DateTime<Utc>,
    pub device_fingerprint: DeviceFingerprint,
    pub geolocation: GeoLocation,
    pub recipient_id: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Transaction {
    /// Validate field constraints before the transaction enters the pipeline
    pub fn validate(&self) -> FraudResult<()> {
        if self.id.is_empty() {
            return Err(FraudError::validation("id", "must not be empty"));
        }
        if self.user_id.is_empty() {
            return Err(FraudError::validation("user_id", "must not be empty"));
        }
        if self.amount.amount <= 0.0 {
            return Err(FraudError::validation("amount", "must be positive"));
        }
        map_validation(self.amount.validate(), "amount")?;
        map_validation(self.geolocation.validate(), "geolocation")?;
        if self.device_fingerprint.fingerprint.is_empty() {
            return Err(FraudError::validation(
                "device_fingerprint",
                "fingerprint must not be empty",
            ));
        }
        Ok(())
    }
}

fn map_validation(
    result: Result<(), validator::ValidationErrors>,
    field: &str,
) -> FraudResult<()> {
    result.map_err(|errors| FraudError::validation(field.to_string(), errors.to_string()))
}

/// Cached risk snapshot of a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRiskProfile {
    pub user_id: String,
    pub base_score: f64,
    pub transaction_history_score: f64,
    pub age_score: f64,
    pub verification_level: VerificationLevel,
    pub dispute_rate: f64,
    pub velocity_score: f64,
    pub last_updated: DateTime<Utc>,
    pub total_transactions: i64,
    pub total_amount: Money,
    pub average_transaction_amount: Money,
    pub account_age_days: i64,
    pub failed_attempts_24h: i64,
    pub risk_level: RiskLevel,
}

/// Outcome of a single rule evaluation. `score` is the raw rule score
/// already multiplied by the rule's catalog weight, so it is bounded by
/// that weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudRuleResult {
    pub rule_name: String,
    pub triggered: bool,
    pub score: f64,
    pub details: HashMap<String, serde_json::Value>,
    pub execution_time_ms: f64,
}

/// Immutable scored record produced for one transaction. Only the review
/// fields may change after persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAssessment {
    pub id: Uuid,
    pub user_id: String,
    pub transaction_id: Option<String>,
    pub withdrawal_id: Option<String>,
    pub score: f64,
    pub risk_level: RiskLevel,
    pub rules: Vec<FraudRuleResult>,
    pub ml_score: Option<f64>,
    pub action: FraudAction,
    pub reason: String,
    pub confidence: f64,
    pub assessment_time_ms: f64,
    pub created_at: DateTime<Utc>,
    pub requires_manual_review: bool,
    pub reviewed_by: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
}

/// One velocity window: a transaction-count limit and optional amount limit
/// over a trailing duration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityCheck {
    pub window_minutes: i64,
    pub max_transactions: i64,
    pub max_amount: Option<Money>,
    pub cooldown_minutes: Option<i64>,
}

/// Named velocity window as it appears in the rule catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VelocityWindow {
    pub label: String,
    pub check: VelocityCheck,
}

/// Default velocity windows: hourly, daily, weekly
pub fn default_velocity_windows() -> Vec<VelocityWindow> {
    vec![
        VelocityWindow {
            label: "hourly".to_string(),
            check: VelocityCheck {
                window_minutes: 60,
                max_transactions: 10,
                max_amount: None,
                cooldown_minutes: None,
            },
        },
        VelocityWindow {
            label: "daily".to_string(),
            check: VelocityCheck {
                window_minutes: 1440,
                max_transactions: 50,
                max_amount: Some(Money::usd(10_000.0)),
                cooldown_minutes: None,
            },
        },
        VelocityWindow {
            label: "weekly".to_string(),
            check: VelocityCheck {
                window_minutes: 10_080,
                max_transactions: 200,
                max_amount: Some(Money::usd(50_000.0)),
                cooldown_minutes: None,
            },
        },
    ]
}

/// Assessment request as received from the transport layer. Only the
/// transactional path is served; `withdrawal_request` is reserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudDetectionRequest {
    pub user_id: String,
    pub transaction: Option<Transaction>,
    pub withdrawal_request: Option<serde_json::Value>,
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub force_assessment: bool,
}

/// Assessment response returned to the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudDetectionResponse {
    pub success: bool,
    pub assessment: Option<FraudAssessment>,
    pub error: Option<String>,
    pub processing_time_ms: f64,
    pub correlation_id: String,
}

/// Structured alert emitted for high-severity assessments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudAlert {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub user_id: String,
    pub alert_type: String,
    pub severity: RiskLevel,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate assessment counts over a reporting period
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudStatistics {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_assessments: i64,
    pub approved_count: i64,
    pub held_count: i64,
    pub rejected_count: i64,
    pub manual_review_count: i64,
    pub average_score: f64,
    pub high_risk_count: i64,
}
