// =====================================================================================
// File: service-fraud/src/cache.rs
// Description: Redis-backed cache of user risk profile snapshots
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use redis::{AsyncCommands, Client};
use tracing::{debug, error};

use core_fraud::UserRiskProfile;

use crate::config::RedisConfig;
use crate::error::ServiceResult;

/// User risk profile cache using Redis
pub struct ProfileCache {
    connection: redis::aio::ConnectionManager,
}

/// Cache key for a user's profile snapshot
pub fn profile_cache_key(user_id: &str) -> String {
    format!("user_risk_profile:{user_id}")
}

impl ProfileCache {
    /// Connect to Redis
    pub async fn connect(config: &RedisConfig) -> ServiceResult<Self> {
        let client = Client::open(config.url.as_str())?;
        let connection = client.get_connection_manager().await?;
        debug!("Connected to Redis at {}", config.url);
        Ok(Self { connection })
    }

    /// Get a cached profile snapshot
    pub async fn get(&self, user_id: &str) -> ServiceResult<Option<UserRiskProfile>> {
        let mut conn = self.connection.clone();
        let cached: Option<String> = conn.get(profile_cache_key(user_id)).await?;

        match cached {
            Some(raw) => {
                let profile: UserRiskProfile = serde_json::from_str(&raw)?;
                debug!(user_id, "profile cache hit");
                Ok(Some(profile))
            }
            None => {
                debug!(user_id, "profile cache miss");
                Ok(None)
            }
        }
    }

    /// Cache a profile snapshot with a TTL
    pub async fn put(
        &self,
        profile: &UserRiskProfile,
        ttl_seconds: u64,
    ) -> ServiceResult<()> {
        let mut conn = self.connection.clone();
        let serialized = serde_json::to_string(profile)?;
        conn.set_ex::<_, _, ()>(profile_cache_key(&profile.user_id), serialized, ttl_seconds)
            .await?;
        debug!(user_id = %profile.user_id, ttl_seconds, "profile cached");
        Ok(())
    }

    /// Remove a cached profile snapshot. Returns whether an entry existed.
    pub async fn invalidate(&self, user_id: &str) -> ServiceResult<bool> {
        let mut conn = self.connection.clone();
        let deleted: i32 = conn.del(profile_cache_key(user_id)).await?;
        debug!(user_id, deleted, "profile cache invalidated");
        Ok(deleted > 0)
    }

    /// Check cache connectivity
    pub async fn ping(&self) -> bool {
        let mut conn = self.connection.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => true,
            Err(ping_error) => {
                error!(%ping_error, "Redis health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use core_fraud::{Money, RiskLevel, VerificationLevel};

    fn sample_profile() -> UserRiskProfile {
        UserRiskProfile {
            user_id: "user-42".to_string(),
            base_score: 0.5,
            transaction_history_score: 0.3,
            age_score: 0.2,
            verification_level: VerificationLevel::Enhanced,
            dispute_rate: 0.0,
            velocity_score: 0.0,
            last_updated: Utc::now(),
            total_transactions: 120,
            total_amount: Money::usd(6000.0),
            average_transaction_amount: Money::usd(50.0),
            account_age_days: 800,
            failed_attempts_24h: 0,
            risk_level: RiskLevel::Low,
        }
    }

    #[test]
    fn test_cache_key_format() {
        assert_eq!(profile_cache_key("user-42"), "user_risk_profile:user-42");
    }

    #[test]
    fn test_profile_serialization_round_trip() {
        let profile = sample_profile();
        let serialized = serde_json::to_string(&profile).unwrap();
        let decoded: UserRiskProfile = serde_json::from_str(&serialized).unwrap();
        assert_eq!(decoded.user_id, profile.user_id);
        assert_eq!(decoded.total_transactions, profile.total_transactions);
        assert_eq!(decoded.risk_level, profile.risk_level);
    }

    // Integration tests require a running Redis instance
    #[tokio::test]
    #[ignore]
    async fn test_cache_round_trip() {
        let cache = ProfileCache::connect(&RedisConfig::default())
            .await
            .unwrap();
        let profile = sample_profile();

        cache.put(&profile, 60).await.unwrap();
        let cached = cache.get(&profile.user_id).await.unwrap();
        assert!(cached.is_some());
        assert_eq!(cached.unwrap().user_id, profile.user_id);

        assert!(cache.invalidate(&profile.user_id).await.unwrap());
        assert!(cache.get(&profile.user_id).await.unwrap().is_none());
    }
}
