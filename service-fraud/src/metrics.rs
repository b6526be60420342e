// =====================================================================================
// File: service-fraud/src/metrics.rs
// Description: Prometheus metrics for the fraud detection service
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use prometheus::{Encoder, Histogram, IntCounter, IntCounterVec, Registry, TextEncoder};

use core_fraud::FraudAssessment;

/// Fraud service metrics collector
pub struct FraudMetrics {
    registry: Registry,

    // Assessment metrics
    pub assessments_total: IntCounterVec,
    pub assessment_failures_total: IntCounter,
    pub assessment_duration: Histogram,

    // Rule metrics
    pub rule_failures_total: IntCounterVec,

    // Model metrics
    pub ml_scores_total: IntCounterVec,

    // Alert metrics
    pub alerts_total: IntCounterVec,
}

impl FraudMetrics {
    /// Create a new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let assessments_total = IntCounterVec::new(
            prometheus::Opts::new("fraud_assessments_total", "Total completed assessments")
                .namespace("payment")
                .subsystem("fraud"),
            &["risk_level", "action"],
        )?;

        let assessment_failures_total = IntCounter::new(
            "fraud_assessment_failures_total",
            "Total failed assessments",
        )?;

        let assessment_duration = Histogram::with_opts(
            prometheus::HistogramOpts::new(
                "fraud_assessment_duration_seconds",
                "Assessment duration in seconds",
            )
            .namespace("payment")
            .subsystem("fraud")
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
        )?;

        let rule_failures_total = IntCounterVec::new(
            prometheus::Opts::new("fraud_rule_failures_total", "Total failed rule evaluations")
                .namespace("payment")
                .subsystem("fraud"),
            &["rule"],
        )?;

        let ml_scores_total = IntCounterVec::new(
            prometheus::Opts::new("fraud_ml_scores_total", "Model score outcomes")
                .namespace("payment")
                .subsystem("fraud"),
            &["outcome"],
        )?;

        let alerts_total = IntCounterVec::new(
            prometheus::Opts::new("fraud_alerts_total", "Alert emission outcomes")
                .namespace("payment")
                .subsystem("fraud"),
            &["status"],
        )?;

        registry.register(Box::new(assessments_total.clone()))?;
        registry.register(Box::new(assessment_failures_total.clone()))?;
        registry.register(Box::new(assessment_duration.clone()))?;
        registry.register(Box::new(rule_failures_total.clone()))?;
        registry.register(Box::new(ml_scores_total.clone()))?;
        registry.register(Box::new(alerts_total.clone()))?;

        Ok(Self {
            registry,
            assessments_total,
            assessment_failures_total,
            assessment_duration,
            rule_failures_total,
            ml_scores_total,
            alerts_total,
        })
    }

    /// Record a completed assessment
    pub fn record_assessment(&self, assessment: &FraudAssessment) {
        self.assessments_total
            .with_label_values(&[
                assessment.risk_level.as_str(),
                assessment.action.as_str(),
            ])
            .inc();
        self.assessment_duration
            .observe(assessment.assessment_time_ms / 1000.0);

        for rule in &assessment.rules {
            if rule.details.contains_key("error") {
                self.rule_failures_total
                    .with_label_values(&[&rule.rule_name])
                    .inc();
            }
        }

        let outcome = if assessment.ml_score.is_some() {
            "scored"
        } else {
            "unavailable"
        };
        self.ml_scores_total.with_label_values(&[outcome]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|encode_error| prometheus::Error::Msg(encode_error.to_string()))
    }
}
