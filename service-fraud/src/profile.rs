// =====================================================================================
// File: service-fraud/src/profile.rs
// Description: Cache-through user risk profile store with derived scoring
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, warn};

use core_fraud::{Money, RiskLevel, UserRiskProfile, VerificationLevel};

use crate::cache::ProfileCache;
use crate::error::ServiceResult;

/// Origin of a profile snapshot. Both variants carry the same profile
/// shape; downstream scoring is ignorant of the origin, tests are not.
#[derive(Debug, Clone)]
pub enum ProfileSource {
    /// Read from the cache or the authoritative store
    Loaded(UserRiskProfile),
    /// Synthesized for a user the store has never seen
    Synthesized(UserRiskProfile),
}

impl ProfileSource {
    pub fn profile(&self) -> &UserRiskProfile {
        match self {
            Self::Loaded(profile) | Self::Synthesized(profile) => profile,
        }
    }

    pub fn into_profile(self) -> UserRiskProfile {
        match self {
            Self::Loaded(profile) | Self::Synthesized(profile) => profile,
        }
    }

    pub fn is_synthesized(&self) -> bool {
        matches!(self, Self::Synthesized(_))
    }
}

/// Read and invalidate user risk profiles
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn get(&self, user_id: &str) -> ServiceResult<ProfileSource>;

    async fn invalidate(&self, user_id: &str) -> ServiceResult<()>;
}

/// Cache-through profile store over Redis and the `users` /
/// `user_transaction_stats` tables
pub struct ProfileStore {
    pool: PgPool,
    cache: Arc<ProfileCache>,
    cache_ttl_seconds: u64,
}

impl ProfileStore {
    pub fn new(pool: PgPool, cache: Arc<ProfileCache>, cache_ttl_seconds: u64) -> Self {
        Self {
            pool,
            cache,
            cache_ttl_seconds,
        }
    }

    async fn load_from_store(&self, user_id: &str) -> ServiceResult<Option<UserRiskProfile>> {
        let row = sqlx::query(
            r#"
            SELECT
                u.created_at,
                u.verification_level,
                COALESCE(stats.total_transactions, 0)::BIGINT as total_transactions,
                COALESCE(stats.total_amount, 0)::DOUBLE PRECISION as total_amount,
                COALESCE(stats.avg_amount, 0)::DOUBLE PRECISION as avg_amount,
                COALESCE(stats.failed_attempts_24h, 0)::BIGINT as failed_attempts_24h
            FROM users u
            LEFT JOIN user_transaction_stats stats ON u.id = stats.user_id
            WHERE u.id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_at: DateTime<Utc> = row.get("created_at");
        let verification_raw: String = row.get("verification_level");
        let total_transactions: i64 = row.get("total_transactions");
        let total_amount: f64 = row.get("total_amount");
        let avg_amount: f64 = row.get("avg_amount");
        let failed_attempts_24h: i64 = row.get("failed_attempts_24h");

        let account_age_days = (Utc::now() - created_at).num_days().max(0);
        let verification = VerificationLevel::parse(&verification_raw);
        let base_score = base_risk_score(account_age_days, verification, total_transactions);

        Ok(Some(UserRiskProfile {
            user_id: user_id.to_string(),
            base_score,
            transaction_history_score: transaction_history_score(total_transactions),
            age_score: age_score(account_age_days),
            verification_level: verification.unwrap_or(VerificationLevel::None),
            dispute_rate: 0.0,
            velocity_score: 0.0,
            last_updated: Utc::now(),
            total_transactions,
            total_amount: Money::new(total_amount, "USD", 2),
            average_transaction_amount: Money::new(avg_amount, "USD", 2),
            account_age_days,
            failed_attempts_24h,
            risk_level: RiskLevel::from_score(base_score),
        }))
    }
}

#[async_trait]
impl ProfileProvider for ProfileStore {
    async fn get(&self, user_id: &str) -> ServiceResult<ProfileSource> {
        // Stale reads within the TTL are accepted; cache trouble degrades
        // to a store read
        match self.cache.get(user_id).await {
            Ok(Some(profile)) => return Ok(ProfileSource::Loaded(profile)),
            Ok(None) => {}
            Err(cache_error) => {
                warn!(user_id, %cache_error, "profile cache read failed");
            }
        }

        let Some(profile) = self.load_from_store(user_id).await? else {
            debug!(user_id, "unknown user, synthesizing default profile");
            return Ok(ProfileSource::Synthesized(default_profile(user_id)));
        };

        if let Err(cache_error) = self.cache.put(&profile, self.cache_ttl_seconds).await {
            warn!(user_id, %cache_error, "profile cache write failed");
        }

        Ok(ProfileSource::Loaded(profile))
    }

    async fn invalidate(&self, user_id: &str) -> ServiceResult<()> {
        self.cache.invalidate(user_id).await?;
        Ok(())
    }
}

/// Default high-risk profile for users the store has never seen
pub fn default_profile(user_id: &str) -> UserRiskProfile {
    UserRiskProfile {
        user_id: user_id.to_string(),
        base_score: 0.7,
        transaction_history_score: 0.0,
        age_score: 0.8,
        verification_level: VerificationLevel::None,
        dispute_rate: 0.0,
        velocity_score: 0.0,
        last_updated: Utc::now(),
        total_transactions: 0,
        total_amount: Money::zero("USD"),
        average_transaction_amount: Money::zero("USD"),
        account_age_days: 0,
        failed_attempts_24h: 0,
        risk_level: RiskLevel::Medium,
    }
}

/// Base risk score from account age, verification tier, and history depth,
/// clipped to [0, 1]. Unrecognized verification tiers carry a mild penalty.
pub fn base_risk_score(
    account_age_days: i64,
    verification: Option<VerificationLevel>,
    total_transactions: i64,
) -> f64 {
    let mut score = 0.5;

    score += if account_age_days < 7 {
        0.3
    } else if account_age_days < 30 {
        0.2
    } else if account_age_days < 90 {
        0.1
    } else {
        0.0
    };

    score += verification.map_or(0.1, |level| level.risk_delta());

    score += if total_transactions == 0 {
        0.2
    } else if total_transactions < 10 {
        0.1
    } else if total_transactions > 100 {
        -0.1
    } else {
        0.0
    };

    score.clamp(0.0, 1.0)
}

/// Risk contribution of the user's transaction history depth
pub fn transaction_history_score(total_transactions: i64) -> f64 {
    if total_transactions == 0 {
        0.8
    } else if total_transactions < 10 {
        0.6
    } else if total_transactions < 50 {
        0.3
    } else {
        0.1
    }
}

/// Risk contribution of the account age
pub fn age_score(account_age_days: i64) -> f64 {
    if account_age_days < 7 {
        0.9
    } else if account_age_days < 30 {
        0.7
    } else if account_age_days < 90 {
        0.4
    } else if account_age_days < 365 {
        0.2
    } else {
        0.1
    }
}
