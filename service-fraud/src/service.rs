// =====================================================================================
// File: service-fraud/src/service.rs
// Description: Assessment coordinator: pipeline orchestration, fusion, and disposition
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info, warn};
use uuid::Uuid;

use core_fraud::{
    FraudAction, FraudAssessment, FraudDetectionRequest, FraudDetectionResponse, FraudRuleResult,
    ModelScorer, RiskLevel, RuleEngine, Transaction, TransactionHistory, UserRiskProfile,
};

use crate::alerts::{build_alert, AlertSink};
use crate::config::AssessmentConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::metrics::FraudMetrics;
use crate::profile::{default_profile, ProfileProvider};
use crate::store::AssessmentStore;

/// Fraud detection service trait
#[async_trait]
pub trait FraudDetectionServiceTrait: Send + Sync {
    /// Assess one transaction for fraud risk
    async fn assess(&self, request: FraudDetectionRequest) -> FraudDetectionResponse;
}

/// Assessment coordinator. Reentrant: holds no per-request mutable state,
/// every collaborator is shared by reference.
pub struct FraudDetectionService {
    config: AssessmentConfig,
    profiles: Arc<dyn ProfileProvider>,
    history: Arc<dyn TransactionHistory>,
    engine: RuleEngine,
    scorer: Arc<ModelScorer>,
    store: Arc<dyn AssessmentStore>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<FraudMetrics>,
}

impl FraudDetectionService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: AssessmentConfig,
        profiles: Arc<dyn ProfileProvider>,
        history: Arc<dyn TransactionHistory>,
        engine: RuleEngine,
        scorer: Arc<ModelScorer>,
        store: Arc<dyn AssessmentStore>,
        alerts: Arc<dyn AlertSink>,
        metrics: Arc<FraudMetrics>,
    ) -> Self {
        Self {
            config,
            profiles,
            history,
            engine,
            scorer,
            store,
            alerts,
            metrics,
        }
    }

    async fn run_pipeline(
        &self,
        transaction: &Transaction,
        correlation_id: &str,
        started: Instant,
    ) -> ServiceResult<FraudAssessment> {
        // Store trouble degrades to the default profile; the assessment
        // proceeds and the reason records the degradation
        let (profile, profile_degraded) = match self.profiles.get(&transaction.user_id).await {
            Ok(source) => (source.into_profile(), false),
            Err(profile_error) => {
                warn!(
                    user_id = %transaction.user_id,
                    %profile_error,
                    correlation_id,
                    "profile lookup failed, using default profile"
                );
                (default_profile(&transaction.user_id), true)
            }
        };

        let deadline = Duration::from_millis(self.config.deadline_ms);
        let (evaluation, model_score) = tokio::join!(
            self.engine.evaluate(transaction, &profile, deadline),
            self.score_model(transaction, &profile, deadline),
        );

        if evaluation.timed_out && evaluation.results.is_empty() {
            return Err(ServiceError::Timeout {
                timeout_ms: self.config.deadline_ms,
            });
        }
        // A partial rule set never fuses with a model score
        let ml_score = if evaluation.timed_out {
            None
        } else {
            model_score
        };

        let rule_results = evaluation.results;
        let rule_sum: f64 = rule_results.iter().map(|result| result.score).sum();
        let final_score = fuse(
            rule_sum,
            ml_score,
            self.config.rule_weight,
            self.config.ml_weight,
        );
        let risk_level = RiskLevel::from_score(final_score);
        let action = resolve_action(
            final_score,
            &rule_results,
            self.config.manual_review_rule_score,
        );

        let assessment = FraudAssessment {
            id: Uuid::new_v4(),
            user_id: transaction.user_id.clone(),
            transaction_id: Some(transaction.id.clone()),
            withdrawal_id: None,
            score: final_score,
            risk_level,
            ml_score,
            action,
            reason: assessment_reason(&rule_results, ml_score, final_score, profile_degraded),
            confidence: assessment_confidence(&rule_results, ml_score),
            rules: rule_results,
            assessment_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            created_at: Utc::now(),
            requires_manual_review: action == FraudAction::ManualReview,
            reviewed_by: None,
            reviewed_at: None,
            review_notes: None,
        };

        // Persistence is fatal; an unpersisted assessment is never returned
        // and never alerted on
        self.store.insert(&assessment).await?;

        if let Err(invalidate_error) = self.profiles.invalidate(&transaction.user_id).await {
            warn!(
                user_id = %transaction.user_id,
                %invalidate_error,
                correlation_id,
                "profile cache invalidation failed"
            );
        }

        if risk_level.is_alertable() {
            let alert = build_alert(&assessment);
            match self.alerts.emit(&alert).await {
                Ok(()) => {
                    self.metrics.alerts_total.with_label_values(&["delivered"]).inc();
                }
                Err(alert_error) => {
                    warn!(
                        assessment_id = %assessment.id,
                        %alert_error,
                        correlation_id,
                        "fraud alert emission failed"
                    );
                    self.metrics.alerts_total.with_label_values(&["failed"]).inc();
                }
            }
        }

        Ok(assessment)
    }

    async fn score_model(
        &self,
        transaction: &Transaction,
        profile: &UserRiskProfile,
        deadline: Duration,
    ) -> Option<f64> {
        match timeout(
            deadline,
            self.scorer.score(transaction, profile, self.history.as_ref()),
        )
        .await
        {
            Ok(Ok(score)) => score,
            Ok(Err(score_error)) => {
                warn!(%score_error, "model scoring failed");
                None
            }
            Err(_) => {
                warn!("model scoring exceeded the assessment deadline");
                None
            }
        }
    }
}

#[async_trait]
impl FraudDetectionServiceTrait for FraudDetectionService {
    async fn assess(&self, request: FraudDetectionRequest) -> FraudDetectionResponse {
        let started = Instant::now();
        let correlation_id = format!("fraud_{}", Utc::now().timestamp());

        let Some(transaction) = request.transaction else {
            return failure_response(
                "No transaction provided".to_string(),
                started,
                correlation_id,
            );
        };

        if let Err(validation_error) = transaction.validate() {
            let invalid = ServiceError::invalid_request(validation_error.to_string());
            return failure_response(invalid.to_string(), started, correlation_id);
        }

        match self.run_pipeline(&transaction, &correlation_id, started).await {
            Ok(assessment) => {
                info!(
                    user_id = %transaction.user_id,
                    transaction_id = %transaction.id,
                    score = assessment.score,
                    risk_level = assessment.risk_level.as_str(),
                    action = assessment.action.as_str(),
                    correlation_id,
                    "fraud assessment completed"
                );
                self.metrics.record_assessment(&assessment);

                FraudDetectionResponse {
                    success: true,
                    assessment: Some(assessment),
                    error: None,
                    processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
                    correlation_id,
                }
            }
            Err(assessment_error) => {
                error!(
                    user_id = %transaction.user_id,
                    %assessment_error,
                    correlation_id,
                    "fraud assessment failed"
                );
                self.metrics.assessment_failures_total.inc();
                failure_response(assessment_error.to_string(), started, correlation_id)
            }
        }
    }
}

fn failure_response(
    error: String,
    started: Instant,
    correlation_id: String,
) -> FraudDetectionResponse {
    FraudDetectionResponse {
        success: false,
        assessment: None,
        error: Some(error),
        processing_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        correlation_id,
    }
}

/// Affine fusion of the weighted rule sum and the model score, clipped to
/// [0, 1]. Without a model score the rule sum stands alone.
pub fn fuse(rule_sum: f64, ml_score: Option<f64>, rule_weight: f64, ml_weight: f64) -> f64 {
    let combined = match ml_score {
        Some(ml) => rule_sum * rule_weight + ml * ml_weight,
        None => rule_sum,
    };
    combined.clamp(0.0, 1.0)
}

/// Resolve the dispositive action from the final score and the rule set
pub fn resolve_action(
    final_score: f64,
    rule_results: &[FraudRuleResult],
    manual_review_rule_score: f64,
) -> FraudAction {
    if final_score >= 0.8 {
        FraudAction::Reject
    } else if final_score >= 0.6 {
        FraudAction::Hold
    } else if final_score >= 0.3 {
        let high_weight_triggered = rule_results
            .iter()
            .any(|result| result.triggered && result.score > manual_review_rule_score);
        if high_weight_triggered {
            FraudAction::ManualReview
        } else {
            FraudAction::Approve
        }
    } else {
        FraudAction::Approve
    }
}

/// Deterministic human-readable reason string
pub fn assessment_reason(
    rule_results: &[FraudRuleResult],
    ml_score: Option<f64>,
    final_score: f64,
    profile_degraded: bool,
) -> String {
    let mut parts = Vec::new();

    let triggered: Vec<&str> = rule_results
        .iter()
        .filter(|result| result.triggered)
        .map(|result| result.rule_name.as_str())
        .collect();
    if !triggered.is_empty() {
        parts.push(format!("Rules triggered: {}", triggered.join(", ")));
    }

    if let Some(ml) = ml_score {
        parts.push(format!("ML score: {ml:.3}"));
    }

    parts.push(format!("Final score: {final_score:.3}"));

    if profile_degraded {
        parts.push("profile_unavailable".to_string());
    }

    parts.join("; ")
}

/// Confidence from the agreement of the available indicators: the
/// triggered-rule score mass and the model score
pub fn assessment_confidence(rule_results: &[FraudRuleResult], ml_score: Option<f64>) -> f64 {
    let mut indicators = Vec::new();

    let triggered_sum: f64 = rule_results
        .iter()
        .filter(|result| result.triggered)
        .map(|result| result.score)
        .sum();
    if triggered_sum > 0.0 {
        indicators.push(triggered_sum);
    }
    if let Some(ml) = ml_score {
        indicators.push(ml);
    }

    match indicators.len() {
        0 => 0.5,
        1 => indicators[0],
        _ => {
            let max = indicators.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let min = indicators.iter().cloned().fold(f64::INFINITY, f64::min);
            let agreement = 1.0 - (max - min);
            let mean = indicators.iter().sum::<f64>() / indicators.len() as f64;
            (mean * agreement).clamp(0.0, 1.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn rule_result(name: &str, triggered: bool, score: f64) -> FraudRuleResult {
        FraudRuleResult {
            rule_name: name.to_string(),
            triggered,
            score,
            details: HashMap::new(),
            execution_time_ms: 1.0,
        }
    }

    #[test]
    fn test_fuse_without_model_score() {
        assert_eq!(fuse(0.34, None, 0.6, 0.4), 0.34);
        assert_eq!(fuse(0.0, None, 0.6, 0.4), 0.0);
    }

    #[test]
    fn test_fuse_with_model_score() {
        // 0.6 * 0.30 + 0.4 * 0.95 = 0.56
        let fused = fuse(0.30, Some(0.95), 0.6, 0.4);
        assert!((fused - 0.56).abs() < 1e-9);
    }

    #[test]
    fn test_fuse_clips_to_unit_interval() {
        assert_eq!(fuse(1.8, None, 0.6, 0.4), 1.0);
        assert_eq!(fuse(1.5, Some(1.0), 1.0, 1.0), 1.0);
        assert_eq!(fuse(-0.2, None, 0.6, 0.4), 0.0);
    }

    #[test]
    fn test_fuse_monotone_in_model_score() {
        let mut previous = 0.0;
        for step in 0..=20 {
            let ml = step as f64 / 20.0;
            let fused = fuse(0.25, Some(ml), 0.6, 0.4);
            assert!(fused >= previous);
            previous = fused;
        }
    }

    #[test]
    fn test_action_bands() {
        assert_eq!(resolve_action(0.85, &[], 0.5), FraudAction::Reject);
        assert_eq!(resolve_action(0.8, &[], 0.5), FraudAction::Reject);
        assert_eq!(resolve_action(0.7, &[], 0.5), FraudAction::Hold);
        assert_eq!(resolve_action(0.6, &[], 0.5), FraudAction::Hold);
        assert_eq!(resolve_action(0.1, &[], 0.5), FraudAction::Approve);
    }

    #[test]
    fn test_medium_band_manual_review_requires_heavy_rule() {
        let light = [rule_result("AMOUNT_ANOMALY", true, 0.2)];
        assert_eq!(resolve_action(0.45, &light, 0.5), FraudAction::Approve);

        let heavy = [rule_result("DEVICE_FINGERPRINT", true, 0.6)];
        assert_eq!(resolve_action(0.45, &heavy, 0.5), FraudAction::ManualReview);

        // A heavy score that never triggered does not force review
        let untriggered = [rule_result("VELOCITY_CHECK", false, 0.6)];
        assert_eq!(resolve_action(0.45, &untriggered, 0.5), FraudAction::Approve);
    }

    #[test]
    fn test_reason_composition() {
        let results = [
            rule_result("VELOCITY_CHECK", true, 0.24),
            rule_result("AMOUNT_ANOMALY", false, 0.0),
            rule_result("DEVICE_FINGERPRINT", true, 0.075),
        ];
        assert_eq!(
            assessment_reason(&results, Some(0.95), 0.56, false),
            "Rules triggered: VELOCITY_CHECK, DEVICE_FINGERPRINT; ML score: 0.950; Final score: 0.560"
        );
        assert_eq!(
            assessment_reason(&[], None, 0.0, false),
            "Final score: 0.000"
        );
        assert_eq!(
            assessment_reason(&[], None, 0.12, true),
            "Final score: 0.120; profile_unavailable"
        );
    }

    #[test]
    fn test_confidence_with_no_indicators() {
        assert_eq!(assessment_confidence(&[], None), 0.5);
        let untriggered = [rule_result("TIME_PATTERN", false, 0.0)];
        assert_eq!(assessment_confidence(&untriggered, None), 0.5);
    }

    #[test]
    fn test_confidence_single_indicator() {
        let results = [rule_result("DEVICE_FINGERPRINT", true, 0.075)];
        assert!((assessment_confidence(&results, None) - 0.075).abs() < 1e-9);
        assert!((assessment_confidence(&[], Some(0.9)) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_agreement_scaling() {
        // Indicators 0.6 and 0.6 agree perfectly: mean 0.6, agreement 1
        let results = [rule_result("VELOCITY_CHECK", true, 0.6)];
        assert!((assessment_confidence(&results, Some(0.6)) - 0.6).abs() < 1e-9);

        // Indicators 0.1 and 0.9 disagree: mean 0.5, agreement 0.2
        let results = [rule_result("VELOCITY_CHECK", true, 0.1)];
        assert!((assessment_confidence(&results, Some(0.9)) - 0.1).abs() < 1e-9);
    }
}
