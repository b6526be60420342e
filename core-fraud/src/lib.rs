// =====================================================================================
// File: core-fraud/src/lib.rs
// Description: Transaction fraud scoring engine for the payment platform
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

//! # Core Fraud Module
//!
//! Domain layer of the transaction fraud assessment pipeline: the data
//! model, geospatial and temporal feature utilities, the concurrent rule
//! engine with its registry, and the model scorer that wraps classifier or
//! anomaly-scorer artifacts behind one probability contract.
//!
//! Storage-backed collaborators (profile store, history aggregator,
//! assessment persistence) live in `service-fraud`; this crate only defines
//! the `TransactionHistory` contract they implement.

pub mod error;
pub mod features;
pub mod history;
pub mod model;
pub mod rules;
pub mod types;

// Re-export main types and traits
pub use error::{FraudError, FraudResult};
pub use features::{
    day_of_week, distance_km, extract_feature_vector, hour_of_day, relative_deviation,
    FEATURE_NAMES,
};
pub use history::{LocationFrequency, TransactionHistory};
pub use model::{
    FeatureScaler, IsolationForest, LogisticClassifier, ModelArtifact, ModelScorer, ModelStatus,
    FALLBACK_CONTAMINATION, FALLBACK_TREE_COUNT,
};
pub use rules::{
    standard_registry, FraudRule, RuleCatalogConfig, RuleDefinition, RuleEngine, RuleEvaluation,
    RuleOutcome, RuleRegistry, RuleWeights,
};
pub use types::{
    default_velocity_windows, DeviceFingerprint, FraudAction, FraudAlert, FraudAssessment,
    FraudDetectionRequest, FraudDetectionResponse, FraudRuleResult, FraudStatistics, GeoLocation,
    Money, RiskLevel, Transaction, TransactionType, UserRiskProfile, VelocityCheck,
    VelocityWindow, VerificationLevel,
};
