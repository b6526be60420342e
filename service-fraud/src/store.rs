// =====================================================================================
// File: service-fraud/src/store.rs
// Description: Insert-only persistence of fraud assessments
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use core_fraud::{FraudAssessment, FraudStatistics};

use crate::error::ServiceResult;

/// Persistence of completed assessments. Assessments are write-once; the
/// store never updates scoring fields after insert.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert(&self, assessment: &FraudAssessment) -> ServiceResult<()>;

    /// Aggregate assessment counts over a reporting period
    async fn statistics(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> ServiceResult<FraudStatistics>;
}

/// Assessment store over the `fraud_assessments` table
pub struct PgAssessmentStore {
    pool: PgPool,
}

impl PgAssessmentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentStore for PgAssessmentStore {
    async fn insert(&self, assessment: &FraudAssessment) -> ServiceResult<()> {
        let rules = serde_json::to_value(&assessment.rules)?;

        sqlx::query(
            r#"
            INSERT INTO fraud_assessments (
                id, user_id, transaction_id, score, risk_level,
                rules, ml_score, action, reason, confidence,
                assessment_time_ms, requires_manual_review, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(assessment.id)
        .bind(&assessment.user_id)
        .bind(&assessment.transaction_id)
        .bind(assessment.score)
        .bind(assessment.risk_level.as_str())
        .bind(rules)
        .bind(assessment.ml_score)
        .bind(assessment.action.as_str())
        .bind(&assessment.reason)
        .bind(assessment.confidence)
        .bind(assessment.assessment_time_ms)
        .bind(assessment.requires_manual_review)
        .bind(assessment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn statistics(
        &self,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
    ) -> ServiceResult<FraudStatistics> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) as total_assessments,
                COUNT(*) FILTER (WHERE action = 'APPROVE') as approved_count,
                COUNT(*) FILTER (WHERE action = 'HOLD') as held_count,
                COUNT(*) FILTER (WHERE action = 'REJECT') as rejected_count,
                COUNT(*) FILTER (WHERE action = 'MANUAL_REVIEW') as manual_review_count,
                COALESCE(AVG(score), 0)::DOUBLE PRECISION as average_score,
                COUNT(*) FILTER (WHERE risk_level IN ('HIGH', 'CRITICAL')) as high_risk_count
            FROM fraud_assessments
            WHERE created_at >= $1 AND created_at <= $2
            "#,
        )
        .bind(period_start)
        .bind(period_end)
        .fetch_one(&self.pool)
        .await?;

        Ok(FraudStatistics {
            period_start,
            period_end,
            total_assessments: row.get("total_assessments"),
            approved_count: row.get("approved_count"),
            held_count: row.get("held_count"),
            rejected_count: row.get("rejected_count"),
            manual_review_count: row.get("manual_review_count"),
            average_score: row.get("average_score"),
            high_risk_count: row.get("high_risk_count"),
        })
    }
}
