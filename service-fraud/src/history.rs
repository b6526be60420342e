// =====================================================================================
// File: service-fraud/src/history.rs
// Description: Postgres-backed historical transaction aggregates
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row};
use std::collections::{HashMap, HashSet};

use core_fraud::{FraudError, FraudResult, LocationFrequency, TransactionHistory};

/// Days of history considered when deriving typical locations and hours
const TYPICAL_WINDOW_DAYS: i64 = 30;
/// Maximum number of typical locations returned
const TYPICAL_LOCATION_LIMIT: i64 = 10;

/// Aggregate queries over the `transactions`, `geolocations`, and
/// `device_blacklist` tables
pub struct PgTransactionHistory {
    pool: PgPool,
}

impl PgTransactionHistory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_error(error: sqlx::Error) -> FraudError {
    FraudError::history(error.to_string())
}

#[async_trait]
impl TransactionHistory for PgTransactionHistory {
    async fn count_in_window(
        &self,
        user_id: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> FraudResult<i64> {
        let window_start = now - Duration::minutes(window_minutes);
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count
            FROM transactions
            WHERE user_id = $1
            AND timestamp >= $2
            AND timestamp <= $3
            "#,
        )
        .bind(user_id)
        .bind(window_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.get("count"))
    }

    async fn amount_sum_in_window(
        &self,
        user_id: &str,
        window_minutes: i64,
        now: DateTime<Utc>,
    ) -> FraudResult<f64> {
        let window_start = now - Duration::minutes(window_minutes);
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0)::DOUBLE PRECISION as total
            FROM transactions
            WHERE user_id = $1
            AND timestamp >= $2
            AND timestamp <= $3
            "#,
        )
        .bind(user_id)
        .bind(window_start)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.get("total"))
    }

    async fn typical_locations(&self, user_id: &str) -> FraudResult<Vec<LocationFrequency>> {
        let cutoff = Utc::now() - Duration::days(TYPICAL_WINDOW_DAYS);
        let rows = sqlx::query(
            r#"
            SELECT g.latitude, g.longitude, COUNT(*) as frequency
            FROM transactions t
            JOIN geolocations g ON t.geolocation_id = g.id
            WHERE t.user_id = $1
            AND t.timestamp >= $2
            GROUP BY g.latitude, g.longitude
            ORDER BY frequency DESC
            LIMIT $3
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .bind(TYPICAL_LOCATION_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|row| LocationFrequency {
                latitude: row.get("latitude"),
                longitude: row.get("longitude"),
                frequency: row.get("frequency"),
            })
            .collect())
    }

    async fn typical_hours(&self, user_id: &str) -> FraudResult<HashMap<u32, i64>> {
        let cutoff = Utc::now() - Duration::days(TYPICAL_WINDOW_DAYS);
        let rows = sqlx::query(
            r#"
            SELECT EXTRACT(HOUR FROM timestamp)::INT as hour, COUNT(*) as frequency
            FROM transactions
            WHERE user_id = $1
            AND timestamp >= $2
            GROUP BY hour
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let hour: i32 = row.get("hour");
                let frequency: i64 = row.get("frequency");
                (hour as u32, frequency)
            })
            .collect())
    }

    async fn known_devices(&self, user_id: &str) -> FraudResult<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT device_fingerprint
            FROM transactions
            WHERE user_id = $1
            AND device_fingerprint IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(rows
            .into_iter()
            .map(|row| row.get("device_fingerprint"))
            .collect())
    }

    async fn is_device_blacklisted(&self, fingerprint: &str) -> FraudResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM device_blacklist
                WHERE fingerprint = $1 AND active
            ) as blacklisted
            "#,
        )
        .bind(fingerprint)
        .fetch_one(&self.pool)
        .await
        .map_err(query_error)?;

        Ok(row.get("blacklisted"))
    }
}
