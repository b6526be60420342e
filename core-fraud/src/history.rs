// =====================================================================================
// File: core-fraud/src/history.rs
// Description: Historical transaction aggregate contract consumed by rules and features
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::error::FraudResult;

/// A recurring transaction coordinate with its observation count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationFrequency {
    pub latitude: f64,
    pub longitude: f64,
    pub frequency: i64,
}

/// Read-only aggregate queries over a user's transaction stream.
///
/// Implementations are pure lookups: they never mutate state and may be
/// called concurrently from every rule evaluator of a single assessment.
#[async_trait]
pub trait TransactionHistory: Send + Sync {
    /// Number of transactions in `[now - window, now]`
    async fn count_in_window(
        &self,
        user_id: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> FraudResult<i64>;

    /// Sum of transaction amounts in `[now - window, now]`
    async fn amount_sum_in_window(
        &self,
        user_id: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> FraudResult<f64>;

    /// Top 10 transaction coordinates by frequency over the last 30 days
    async fn typical_locations(&self, user_id: &str) -> FraudResult<Vec<LocationFrequency>>;

    /// Transaction counts per UTC hour of day over the last 30 days
    async fn typical_hours(&self, user_id: &str) -> FraudResult<HashMap<u32, i64>>;

    /// Device fingerprints observed historically for the user
    async fn known_devices(&self, user_id: &str) -> FraudResult<HashSet<String>>;

    /// Whether a fingerprint appears on the active device blacklist
    async fn is_device_blacklisted(&self, fingerprint: &str) -> FraudResult<bool>;
}
