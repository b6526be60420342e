// =====================================================================================
// File: core-fraud/src/features.rs
// Description: Geospatial and temporal feature utilities for fraud scoring
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::error::FraudResult;
use crate::history::TransactionHistory;
use crate::types::{Transaction, UserRiskProfile};

/// Mean Earth radius in kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Distance in kilometers beyond the nearest typical location at which a
/// coordinate counts as new for the model feature vector
const NEW_LOCATION_KM: f64 = 100.0;

/// Feature names in the exact order produced by `extract_feature_vector`
pub const FEATURE_NAMES: [&str; 10] = [
    "amount",
    "hour_of_day",
    "day_of_week",
    "user_age_days",
    "transaction_count_24h",
    "avg_amount_24h",
    "failed_attempts_24h",
    "geolocation_change",
    "device_change",
    "amount_deviation",
];

/// Great-circle distance between two coordinates via the Haversine formula
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// UTC hour of day in `[0, 23]`
pub fn hour_of_day(timestamp: DateTime<Utc>) -> u32 {
    timestamp.hour()
}

/// ISO weekday index in `[0, 6]` with Monday = 0
pub fn day_of_week(timestamp: DateTime<Utc>) -> u32 {
    timestamp.weekday().num_days_from_monday()
}

/// Normalized deviation of an amount from a historical mean, `|x - mean| / mean`.
/// The mean must be positive; callers guard that.
pub fn relative_deviation(amount: f64, mean: f64) -> f64 {
    (amount - mean).abs() / mean
}

/// Model feature vector for one transaction, in `FEATURE_NAMES` order.
///
/// Both aggregate lookups resolve before the vector is assembled, so the
/// caller can scale and predict without further suspension points.
pub async fn extract_feature_vector(
    transaction: &Transaction,
    profile: &UserRiskProfile,
    history: &dyn TransactionHistory,
) -> FraudResult<Vec<f64>> {
    let (locations, devices) = tokio::try_join!(
        history.typical_locations(&transaction.user_id),
        history.known_devices(&transaction.user_id),
    )?;

    let new_location = if locations.is_empty() {
        true
    } else {
        locations
            .iter()
            .map(|location| {
                distance_km(
                    transaction.geolocation.latitude,
                    transaction.geolocation.longitude,
                    location.latitude,
                    location.longitude,
                )
            })
            .fold(f64::INFINITY, f64::min)
            > NEW_LOCATION_KM
    };
    let new_device = !devices.contains(&transaction.device_fingerprint.fingerprint);

    let amount = transaction.amount.amount;
    let average = profile.average_transaction_amount.amount;

    Ok(vec![
        amount,
        f64::from(hour_of_day(transaction.timestamp)),
        f64::from(day_of_week(transaction.timestamp)),
        profile.account_age_days as f64,
        profile.total_transactions as f64,
        average,
        profile.failed_attempts_24h as f64,
        if new_location { 1.0 } else { 0.0 },
        if new_device { 1.0 } else { 0.0 },
        (amount - average).abs() / average.max(1.0),
    ])
}
