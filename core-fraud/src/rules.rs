// =====================================================================================
// File: core-fraud/src/rules.rs
// Description: Fraud rule catalog, registry, and concurrent rule engine
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::FraudResult;
use crate::features::{distance_km, hour_of_day, relative_deviation};
use crate::history::TransactionHistory;
use crate::types::{
    default_velocity_windows, FraudAction, FraudRuleResult, Transaction, UserRiskProfile,
    VelocityWindow,
};

const VELOCITY_COUNT_SCORE: f64 = 0.8;
const VELOCITY_AMOUNT_SCORE: f64 = 0.9;
const AMOUNT_SCORE_CAP: f64 = 0.8;
const AMOUNT_SCORE_DIVISOR: f64 = 5.0;
const GEO_SCORE_CAP: f64 = 0.7;
const GEO_SCORE_DIVISOR_KM: f64 = 5000.0;
const NEW_DEVICE_SCORE: f64 = 0.5;
const BLACKLISTED_DEVICE_SCORE: f64 = 1.0;
const UNUSUAL_HOUR_SCORE: f64 = 0.4;

/// Catalog entry describing one rule: identity, weight, and the action it
/// suggests when triggered
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub enabled: bool,
    pub action_hint: FraudAction,
}

impl RuleDefinition {
    pub fn velocity_check(weight: f64) -> Self {
        Self {
            name: "VELOCITY_CHECK".to_string(),
            description: "Check transaction velocity limits".to_string(),
            weight,
            enabled: true,
            action_hint: FraudAction::Hold,
        }
    }

    pub fn amount_anomaly(weight: f64) -> Self {
        Self {
            name: "AMOUNT_ANOMALY".to_string(),
            description: "Detect unusual transaction amounts".to_string(),
            weight,
            enabled: true,
            action_hint: FraudAction::ManualReview,
        }
    }

    pub fn geolocation_anomaly(weight: f64) -> Self {
        Self {
            name: "GEOLOCATION_ANOMALY".to_string(),
            description: "Detect unusual geographic locations".to_string(),
            weight,
            enabled: true,
            action_hint: FraudAction::Hold,
        }
    }

    pub fn device_fingerprint(weight: f64) -> Self {
        Self {
            name: "DEVICE_FINGERPRINT".to_string(),
            description: "Check for new or suspicious devices".to_string(),
            weight,
            enabled: true,
            action_hint: FraudAction::ManualReview,
        }
    }

    pub fn time_pattern(weight: f64) -> Self {
        Self {
            name: "TIME_PATTERN".to_string(),
            description: "Detect unusual transaction timing".to_string(),
            weight,
            enabled: true,
            action_hint: FraudAction::ManualReview,
        }
    }
}

/// Raw outcome of one evaluator, before the catalog weight is applied
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub triggered: bool,
    pub raw_score: f64,
    pub details: HashMap<String, serde_json::Value>,
}

impl RuleOutcome {
    /// A non-triggered outcome carrying only diagnostics
    pub fn clear(details: HashMap<String, serde_json::Value>) -> Self {
        Self {
            triggered: false,
            raw_score: 0.0,
            details,
        }
    }
}

/// A named deterministic fraud classifier
#[async_trait]
pub trait FraudRule: Send + Sync {
    fn definition(&self) -> &RuleDefinition;

    async fn evaluate(
        &self,
        transaction: &Transaction,
        profile: &UserRiskProfile,
    ) -> FraudResult<RuleOutcome>;
}

/// Per-rule catalog weights. The defaults sum to 1.0, which bounds the
/// weighted rule sum by 1.0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleWeights {
    pub velocity_check: f64,
    pub amount_anomaly: f64,
    pub geolocation_anomaly: f64,
    pub device_fingerprint: f64,
    pub time_pattern: f64,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            velocity_check: 0.30,
            amount_anomaly: 0.25,
            geolocation_anomaly: 0.20,
            device_fingerprint: 0.15,
            time_pattern: 0.10,
        }
    }
}

/// Configuration of the standard rule catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCatalogConfig {
    pub weights: RuleWeights,
    pub velocity_windows: Vec<VelocityWindow>,
    /// Normalized amount deviation above which the amount rule triggers
    pub amount_deviation_threshold: f64,
    /// Kilometers from the nearest typical location above which the
    /// geolocation rule triggers
    pub geo_distance_threshold_km: f64,
    /// Hour-of-day probability below which the time rule triggers
    pub unusual_hour_probability: f64,
}

impl Default for RuleCatalogConfig {
    fn default() -> Self {
        Self {
            weights: RuleWeights::default(),
            velocity_windows: default_velocity_windows(),
            amount_deviation_threshold: 3.0,
            geo_distance_threshold_km: 1000.0,
            unusual_hour_probability: 0.05,
        }
    }
}

/// Registration-ordered collection of rules. The engine iterates the
/// registry; adding a rule is a registry insertion, not an engine change.
#[derive(Default)]
pub struct RuleRegistry {
    rules: Vec<Arc<dyn FraudRule>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn register(&mut self, rule: Arc<dyn FraudRule>) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Arc<dyn FraudRule>] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Sum of weights of enabled rules
    pub fn total_weight(&self) -> f64 {
        self.rules
            .iter()
            .filter(|rule| rule.definition().enabled)
            .map(|rule| rule.definition().weight)
            .sum()
    }
}

/// Build the standard five-rule catalog in its canonical order
pub fn standard_registry(
    history: Arc<dyn TransactionHistory>,
    config: &RuleCatalogConfig,
) -> RuleRegistry {
    let mut registry = RuleRegistry::new();
    registry.register(Arc::new(VelocityCheckRule {
        definition: RuleDefinition::velocity_check(config.weights.velocity_check),
        history: Arc::clone(&history),
        windows: config.velocity_windows.clone(),
    }));
    registry.register(Arc::new(AmountAnomalyRule {
        definition: RuleDefinition::amount_anomaly(config.weights.amount_anomaly),
        deviation_threshold: config.amount_deviation_threshold,
    }));
    registry.register(Arc::new(GeolocationAnomalyRule {
        definition: RuleDefinition::geolocation_anomaly(config.weights.geolocation_anomaly),
        history: Arc::clone(&history),
        distance_threshold_km: config.geo_distance_threshold_km,
    }));
    registry.register(Arc::new(DeviceFingerprintRule {
        definition: RuleDefinition::device_fingerprint(config.weights.device_fingerprint),
        history: Arc::clone(&history),
    }));
    registry.register(Arc::new(TimePatternRule {
        definition: RuleDefinition::time_pattern(config.weights.time_pattern),
        history,
        probability_threshold: config.unusual_hour_probability,
    }));
    registry
}

/// Transaction velocity against the configured count and amount windows
pub struct VelocityCheckRule {
    definition: RuleDefinition,
    history: Arc<dyn TransactionHistory>,
    windows: Vec<VelocityWindow>,
}

#[async_trait]
impl FraudRule for VelocityCheckRule {
    fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    async fn evaluate(
        &self,
        transaction: &Transaction,
        _profile: &UserRiskProfile,
    ) -> FraudResult<RuleOutcome> {
        let mut triggered = false;
        let mut raw_score: f64 = 0.0;
        let mut details = HashMap::new();

        for window in &self.windows {
            let count = self
                .history
                .count_in_window(
                    &transaction.user_id,
                    window.check.window_minutes,
                    transaction.timestamp,
                )
                .await?;
            let count_exceeded = count > window.check.max_transactions;
            if count_exceeded {
                triggered = true;
                raw_score = raw_score.max(VELOCITY_COUNT_SCORE);
            }
            details.insert(
                window.label.clone(),
                json!({
                    "count": count,
                    "limit": window.check.max_transactions,
                    "exceeded": count_exceeded,
                }),
            );

            if let Some(max_amount) = &window.check.max_amount {
                let total = self
                    .history
                    .amount_sum_in_window(
                        &transaction.user_id,
                        window.check.window_minutes,
                        transaction.timestamp,
                    )
                    .await?;
                let amount_exceeded = total > max_amount.amount;
                if amount_exceeded {
                    triggered = true;
                    raw_score = raw_score.max(VELOCITY_AMOUNT_SCORE);
                }
                details.insert(
                    format!("{}_amount", window.label),
                    json!({
                        "total": total,
                        "limit": max_amount.amount,
                        "exceeded": amount_exceeded,
                    }),
                );
            }
        }

        Ok(RuleOutcome {
            triggered,
            raw_score,
            details,
        })
    }
}

/// Deviation of the amount from the user's historical average
pub struct AmountAnomalyRule {
    definition: RuleDefinition,
    deviation_threshold: f64,
}

#[async_trait]
impl FraudRule for AmountAnomalyRule {
    fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    async fn evaluate(
        &self,
        transaction: &Transaction,
        profile: &UserRiskProfile,
    ) -> FraudResult<RuleOutcome> {
        if profile.total_transactions > 0 {
            let average = profile.average_transaction_amount.amount;
            if average > 0.0 {
                let deviation = relative_deviation(transaction.amount.amount, average);
                let triggered = deviation > self.deviation_threshold;
                let raw_score = if triggered {
                    (deviation / AMOUNT_SCORE_DIVISOR).min(AMOUNT_SCORE_CAP)
                } else {
                    0.0
                };
                let mut details = HashMap::new();
                details.insert("current_amount".to_string(), json!(transaction.amount.amount));
                details.insert("average_amount".to_string(), json!(average));
                details.insert("deviation".to_string(), json!(deviation));
                details.insert("threshold".to_string(), json!(self.deviation_threshold));
                return Ok(RuleOutcome {
                    triggered,
                    raw_score,
                    details,
                });
            }
        }

        Ok(RuleOutcome::clear(HashMap::new()))
    }
}

/// Distance from the user's typical transaction locations
pub struct GeolocationAnomalyRule {
    definition: RuleDefinition,
    history: Arc<dyn TransactionHistory>,
    distance_threshold_km: f64,
}

#[async_trait]
impl FraudRule for GeolocationAnomalyRule {
    fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    async fn evaluate(
        &self,
        transaction: &Transaction,
        _profile: &UserRiskProfile,
    ) -> FraudResult<RuleOutcome> {
        let locations = self.history.typical_locations(&transaction.user_id).await?;

        if locations.is_empty() {
            let mut details = HashMap::new();
            details.insert("status".to_string(), json!("no_location_history"));
            return Ok(RuleOutcome::clear(details));
        }

        let min_distance = locations
            .iter()
            .map(|location| {
                distance_km(
                    transaction.geolocation.latitude,
                    transaction.geolocation.longitude,
                    location.latitude,
                    location.longitude,
                )
            })
            .fold(f64::INFINITY, f64::min);

        let triggered = min_distance > self.distance_threshold_km;
        let raw_score = if triggered {
            (min_distance / GEO_SCORE_DIVISOR_KM).min(GEO_SCORE_CAP)
        } else {
            0.0
        };

        let mut details = HashMap::new();
        details.insert(
            "current_location".to_string(),
            json!({
                "lat": transaction.geolocation.latitude,
                "lon": transaction.geolocation.longitude,
                "country": transaction.geolocation.country,
            }),
        );
        details.insert("min_distance_km".to_string(), json!(min_distance));
        details.insert("threshold_km".to_string(), json!(self.distance_threshold_km));

        Ok(RuleOutcome {
            triggered,
            raw_score,
            details,
        })
    }
}

/// Novelty and blacklist standing of the transaction device
pub struct DeviceFingerprintRule {
    definition: RuleDefinition,
    history: Arc<dyn TransactionHistory>,
}

#[async_trait]
impl FraudRule for DeviceFingerprintRule {
    fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    async fn evaluate(
        &self,
        transaction: &Transaction,
        _profile: &UserRiskProfile,
    ) -> FraudResult<RuleOutcome> {
        let fingerprint = &transaction.device_fingerprint.fingerprint;
        let (devices, blacklisted) = tokio::try_join!(
            self.history.known_devices(&transaction.user_id),
            self.history.is_device_blacklisted(fingerprint),
        )?;

        let known = devices.contains(fingerprint);
        let (triggered, raw_score) = if known {
            (false, 0.0)
        } else if blacklisted {
            (true, BLACKLISTED_DEVICE_SCORE)
        } else {
            (true, NEW_DEVICE_SCORE)
        };

        let mut details = HashMap::new();
        details.insert("device_fingerprint".to_string(), json!(fingerprint));
        details.insert("is_known_device".to_string(), json!(known));
        details.insert("known_devices_count".to_string(), json!(devices.len()));
        details.insert("is_blacklisted".to_string(), json!(blacklisted));

        Ok(RuleOutcome {
            triggered,
            raw_score,
            details,
        })
    }
}

/// Hour-of-day likelihood against the user's typical transaction hours
pub struct TimePatternRule {
    definition: RuleDefinition,
    history: Arc<dyn TransactionHistory>,
    probability_threshold: f64,
}

#[async_trait]
impl FraudRule for TimePatternRule {
    fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    async fn evaluate(
        &self,
        transaction: &Transaction,
        _profile: &UserRiskProfile,
    ) -> FraudResult<RuleOutcome> {
        let hours = self.history.typical_hours(&transaction.user_id).await?;
        let total: i64 = hours.values().sum();

        if hours.is_empty() || total == 0 {
            let mut details = HashMap::new();
            details.insert("status".to_string(), json!("no_transaction_history"));
            return Ok(RuleOutcome::clear(details));
        }

        let current_hour = hour_of_day(transaction.timestamp);
        let frequency = hours.get(&current_hour).copied().unwrap_or(0);
        let probability = frequency as f64 / total as f64;
        let triggered = probability < self.probability_threshold;
        let raw_score = if triggered { UNUSUAL_HOUR_SCORE } else { 0.0 };

        let mut details = HashMap::new();
        details.insert("current_hour".to_string(), json!(current_hour));
        details.insert("hour_frequency".to_string(), json!(frequency));
        details.insert("total_frequency".to_string(), json!(total));
        details.insert("hour_probability".to_string(), json!(probability));
        details.insert("threshold".to_string(), json!(self.probability_threshold));

        Ok(RuleOutcome {
            triggered,
            raw_score,
            details,
        })
    }
}

/// Result set of one engine pass. `results` holds completed rules in
/// registration order; `timed_out` marks a pass cut short by the deadline.
#[derive(Debug, Clone)]
pub struct RuleEvaluation {
    pub results: Vec<FraudRuleResult>,
    pub timed_out: bool,
}

impl RuleEvaluation {
    /// Sum of weighted rule scores
    pub fn weighted_sum(&self) -> f64 {
        self.results.iter().map(|result| result.score).sum()
    }
}

/// Dispatches enabled rules concurrently and collates their results
pub struct RuleEngine {
    registry: Arc<RuleRegistry>,
}

impl RuleEngine {
    pub fn new(registry: RuleRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &RuleRegistry {
        &self.registry
    }

    /// Evaluate all enabled rules against one transaction.
    ///
    /// Evaluators run concurrently; results come back in registration order
    /// regardless of completion order. A failing evaluator yields a
    /// non-triggered result with the error in its details. When the deadline
    /// expires, outstanding evaluators are aborted and the completed subset
    /// is returned with `timed_out` set.
    pub async fn evaluate(
        &self,
        transaction: &Transaction,
        profile: &UserRiskProfile,
        deadline: Duration,
    ) -> RuleEvaluation {
        let mut tasks = JoinSet::new();
        let mut spawned = 0usize;

        for (index, rule) in self.registry.rules().iter().enumerate() {
            if !rule.definition().enabled {
                continue;
            }
            spawned += 1;
            let rule = Arc::clone(rule);
            let transaction = transaction.clone();
            let profile = profile.clone();
            tasks.spawn(async move { (index, execute_rule(rule, transaction, profile).await) });
        }

        let timeout = tokio::time::sleep(deadline);
        tokio::pin!(timeout);

        let mut completed: Vec<(usize, FraudRuleResult)> = Vec::with_capacity(spawned);
        let mut timed_out = false;
        let mut remaining = spawned;

        while remaining > 0 {
            tokio::select! {
                _ = &mut timeout => {
                    timed_out = true;
                    tasks.abort_all();
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(entry)) => {
                        completed.push(entry);
                        remaining -= 1;
                    }
                    Some(Err(join_error)) => {
                        warn!(%join_error, "rule task failed to join");
                        remaining -= 1;
                    }
                    None => break,
                },
            }
        }

        completed.sort_by_key(|(index, _)| *index);
        RuleEvaluation {
            results: completed.into_iter().map(|(_, result)| result).collect(),
            timed_out,
        }
    }
}

async fn execute_rule(
    rule: Arc<dyn FraudRule>,
    transaction: Transaction,
    profile: UserRiskProfile,
) -> FraudRuleResult {
    let definition = rule.definition().clone();
    let started = Instant::now();

    match rule.evaluate(&transaction, &profile).await {
        Ok(outcome) => FraudRuleResult {
            rule_name: definition.name,
            triggered: outcome.triggered,
            score: outcome.raw_score * definition.weight,
            details: outcome.details,
            execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
        },
        Err(error) => {
            warn!(rule = %definition.name, %error, "rule evaluation failed");
            let mut details = HashMap::new();
            details.insert("error".to_string(), json!(error.to_string()));
            FraudRuleResult {
                rule_name: definition.name,
                triggered: false,
                score: 0.0,
                details,
                execution_time_ms: started.elapsed().as_secs_f64() * 1000.0,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FraudError;
    use crate::history::LocationFrequency;
    use crate::types::{
        DeviceFingerprint, GeoLocation, Money, RiskLevel, TransactionType, VerificationLevel,
    };
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashSet;

    #[derive(Default)]
    struct StubHistory {
        hourly_count: i64,
        daily_count: i64,
        weekly_count: i64,
        daily_amount: f64,
        weekly_amount: f64,
        locations: Vec<LocationFrequency>,
        hours: HashMap<u32, i64>,
        devices: HashSet<String>,
        blacklist: HashSet<String>,
        fail_counts: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl TransactionHistory for StubHistory {
        async fn count_in_window(
            &self,
            _user_id: &str,
            window_minutes: i64,
            _now: DateTime<Utc>,
        ) -> FraudResult<i64> {
            if self.fail_counts {
                return Err(FraudError::history("window query failed"));
            }
            Ok(match window_minutes {
                60 => self.hourly_count,
                1440 => self.daily_count,
                _ => self.weekly_count,
            })
        }

        async fn amount_sum_in_window(
            &self,
            _user_id: &str,
            window_minutes: i64,
            _now: DateTime<Utc>,
        ) -> FraudResult<f64> {
            Ok(match window_minutes {
                1440 => self.daily_amount,
                _ => self.weekly_amount,
            })
        }

        async fn typical_locations(&self, _user_id: &str) -> FraudResult<Vec<LocationFrequency>> {
            Ok(self.locations.clone())
        }

        async fn typical_hours(&self, _user_id: &str) -> FraudResult<HashMap<u32, i64>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.hours.clone())
        }

        async fn known_devices(&self, _user_id: &str) -> FraudResult<HashSet<String>> {
            Ok(self.devices.clone())
        }

        async fn is_device_blacklisted(&self, fingerprint: &str) -> FraudResult<bool> {
            Ok(self.blacklist.contains(fingerprint))
        }
    }

    fn transaction(amount: f64) -> Transaction {
        Transaction {
            id: "txn-1".to_string(),
            user_id: "user-1".to_string(),
            transaction_type: TransactionType::Payment,
            amount: Money::usd(amount),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 6, 14, 0, 0).unwrap(),
            device_fingerprint: DeviceFingerprint {
                fingerprint: "fp-1".to_string(),
                user_agent: "test".to_string(),
                ip_address: "198.51.100.7".to_string(),
                screen_resolution: None,
                timezone: None,
                language: None,
                platform: None,
            },
            geolocation: GeoLocation {
                latitude: 40.7128,
                longitude: -74.006,
                country: "US".to_string(),
                city: None,
                region: None,
            },
            recipient_id: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    fn profile(total_transactions: i64, average_amount: f64) -> UserRiskProfile {
        UserRiskProfile {
            user_id: "user-1".to_string(),
            base_score: 0.4,
            transaction_history_score: 0.3,
            age_score: 0.2,
            verification_level: VerificationLevel::Basic,
            dispute_rate: 0.0,
            velocity_score: 0.0,
            last_updated: Utc::now(),
            total_transactions,
            total_amount: Money::usd(average_amount * total_transactions as f64),
            average_transaction_amount: Money::usd(average_amount),
            account_age_days: 400,
            failed_attempts_24h: 0,
            risk_level: RiskLevel::Low,
        }
    }

    fn engine(history: StubHistory) -> RuleEngine {
        let registry = standard_registry(Arc::new(history), &RuleCatalogConfig::default());
        RuleEngine::new(registry)
    }

    #[test]
    fn test_default_weights_sum_to_one() {
        let registry = standard_registry(
            Arc::new(StubHistory::default()),
            &RuleCatalogConfig::default(),
        );
        assert!((registry.total_weight() - 1.0).abs() < 1e-9);
        assert_eq!(registry.len(), 5);
    }

    #[tokio::test]
    async fn test_results_in_registration_order() {
        let engine = engine(StubHistory::default());
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;

        assert!(!evaluation.timed_out);
        let names: Vec<&str> = evaluation
            .results
            .iter()
            .map(|result| result.rule_name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "VELOCITY_CHECK",
                "AMOUNT_ANOMALY",
                "GEOLOCATION_ANOMALY",
                "DEVICE_FINGERPRINT",
                "TIME_PATTERN",
            ]
        );
    }

    #[tokio::test]
    async fn test_rule_scores_bounded_by_weight() {
        let history = StubHistory {
            hourly_count: 50,
            daily_count: 100,
            daily_amount: 50_000.0,
            weekly_amount: 100_000.0,
            locations: vec![LocationFrequency {
                latitude: -33.8688,
                longitude: 151.2093,
                frequency: 5,
            }],
            hours: HashMap::from([(3, 100)]),
            blacklist: HashSet::from(["fp-1".to_string()]),
            ..StubHistory::default()
        };
        let engine = engine(history);
        let evaluation = engine
            .evaluate(
                &transaction(5000.0),
                &profile(100, 50.0),
                Duration::from_secs(5),
            )
            .await;

        let weights = RuleWeights::default();
        let expected = [
            weights.velocity_check,
            weights.amount_anomaly,
            weights.geolocation_anomaly,
            weights.device_fingerprint,
            weights.time_pattern,
        ];
        for (result, weight) in evaluation.results.iter().zip(expected) {
            assert!(result.triggered, "{} should trigger", result.rule_name);
            assert!(
                result.score <= weight + 1e-12,
                "{} score {} exceeds weight {}",
                result.rule_name,
                result.score,
                weight
            );
        }
    }

    #[tokio::test]
    async fn test_velocity_count_and_amount_limits() {
        let history = StubHistory {
            hourly_count: 15,
            daily_count: 20,
            daily_amount: 12_000.0,
            ..StubHistory::default()
        };
        let engine = engine(history);
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;

        let velocity = &evaluation.results[0];
        assert!(velocity.triggered);
        // Amount limit dominates the count limit
        assert!((velocity.score - 0.9 * 0.30).abs() < 1e-9);
        assert_eq!(velocity.details["hourly"]["exceeded"], true);
        assert_eq!(velocity.details["daily"]["exceeded"], false);
        assert_eq!(velocity.details["daily_amount"]["exceeded"], true);
        assert_eq!(velocity.details["weekly_amount"]["exceeded"], false);
    }

    #[tokio::test]
    async fn test_amount_anomaly_deviation() {
        let engine = engine(StubHistory::default());
        let evaluation = engine
            .evaluate(
                &transaction(2000.0),
                &profile(30, 50.0),
                Duration::from_secs(5),
            )
            .await;

        let amount = &evaluation.results[1];
        assert!(amount.triggered);
        // deviation = 39, capped raw score 0.8 scaled by weight 0.25
        assert!((amount.score - 0.8 * 0.25).abs() < 1e-9);
        assert!((amount.details["deviation"].as_f64().unwrap() - 39.0).abs() < 1e-9);
        assert_eq!(amount.details["threshold"], 3.0);
    }

    #[tokio::test]
    async fn test_amount_anomaly_requires_history() {
        let engine = engine(StubHistory::default());
        let evaluation = engine
            .evaluate(
                &transaction(2000.0),
                &profile(0, 0.0),
                Duration::from_secs(5),
            )
            .await;

        let amount = &evaluation.results[1];
        assert!(!amount.triggered);
        assert_eq!(amount.score, 0.0);
        assert!(amount.details.is_empty());
    }

    #[tokio::test]
    async fn test_geolocation_distance_scaling() {
        // Sydney is far beyond 1000 km from New York
        let history = StubHistory {
            locations: vec![LocationFrequency {
                latitude: -33.8688,
                longitude: 151.2093,
                frequency: 8,
            }],
            ..StubHistory::default()
        };
        let engine = engine(history);
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(10, 20.0), Duration::from_secs(5))
            .await;

        let geo = &evaluation.results[2];
        assert!(geo.triggered);
        assert!((geo.score - 0.7 * 0.20).abs() < 1e-9);
        assert!(geo.details["min_distance_km"].as_f64().unwrap() > 1000.0);
    }

    #[tokio::test]
    async fn test_geolocation_without_history() {
        let engine = engine(StubHistory::default());
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;

        let geo = &evaluation.results[2];
        assert!(!geo.triggered);
        assert_eq!(geo.details["status"], "no_location_history");
    }

    #[tokio::test]
    async fn test_device_rule_new_known_and_blacklisted() {
        // New device
        let engine_new = engine(StubHistory::default());
        let evaluation = engine_new
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;
        let device = &evaluation.results[3];
        assert!(device.triggered);
        assert!((device.score - 0.5 * 0.15).abs() < 1e-9);
        assert_eq!(device.details["is_known_device"], false);
        assert_eq!(device.details["is_blacklisted"], false);

        // Known device never triggers
        let engine_known = engine(StubHistory {
            devices: HashSet::from(["fp-1".to_string()]),
            ..StubHistory::default()
        });
        let evaluation = engine_known
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;
        let device = &evaluation.results[3];
        assert!(!device.triggered);
        assert_eq!(device.score, 0.0);
        assert_eq!(device.details["is_known_device"], true);

        // Blacklisted new device scores the full weight
        let engine_blacklisted = engine(StubHistory {
            blacklist: HashSet::from(["fp-1".to_string()]),
            ..StubHistory::default()
        });
        let evaluation = engine_blacklisted
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;
        let device = &evaluation.results[3];
        assert!(device.triggered);
        assert!((device.score - 1.0 * 0.15).abs() < 1e-9);
        assert_eq!(device.details["is_blacklisted"], true);
    }

    #[tokio::test]
    async fn test_time_pattern_rare_hour() {
        // 14:00 is rare: 1 of 101 observations
        let history = StubHistory {
            hours: HashMap::from([(14, 1), (9, 100)]),
            ..StubHistory::default()
        };
        let engine = engine(history);
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(50, 25.0), Duration::from_secs(5))
            .await;

        let time = &evaluation.results[4];
        assert!(time.triggered);
        assert!((time.score - 0.4 * 0.10).abs() < 1e-9);
        assert_eq!(time.details["current_hour"], 14);
        assert_eq!(time.details["total_frequency"], 101);
    }

    #[tokio::test]
    async fn test_rule_failure_is_isolated() {
        let history = StubHistory {
            fail_counts: true,
            ..StubHistory::default()
        };
        let engine = engine(history);
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;

        assert_eq!(evaluation.results.len(), 5);
        let velocity = &evaluation.results[0];
        assert!(!velocity.triggered);
        assert_eq!(velocity.score, 0.0);
        assert!(velocity.details.contains_key("error"));
        // Other rules are unaffected by the velocity failure
        assert!(evaluation.results[3].triggered);
    }

    #[tokio::test]
    async fn test_deadline_returns_partial_results() {
        let history = StubHistory {
            delay: Some(Duration::from_secs(30)),
            ..StubHistory::default()
        };
        let engine = engine(history);
        let evaluation = engine
            .evaluate(
                &transaction(10.0),
                &profile(0, 0.0),
                Duration::from_millis(200),
            )
            .await;

        assert!(evaluation.timed_out);
        // Every rule except the delayed TIME_PATTERN completed
        assert_eq!(evaluation.results.len(), 4);
        assert!(evaluation
            .results
            .iter()
            .all(|result| result.rule_name != "TIME_PATTERN"));
    }

    struct DisabledRule {
        definition: RuleDefinition,
    }

    #[async_trait]
    impl FraudRule for DisabledRule {
        fn definition(&self) -> &RuleDefinition {
            &self.definition
        }

        async fn evaluate(
            &self,
            _transaction: &Transaction,
            _profile: &UserRiskProfile,
        ) -> FraudResult<RuleOutcome> {
            panic!("disabled rules must never run");
        }
    }

    #[tokio::test]
    async fn test_disabled_rule_is_skipped() {
        let mut registry = standard_registry(
            Arc::new(StubHistory::default()),
            &RuleCatalogConfig::default(),
        );
        registry.register(Arc::new(DisabledRule {
            definition: RuleDefinition {
                name: "DISABLED_RULE".to_string(),
                description: "Never dispatched".to_string(),
                weight: 0.5,
                enabled: false,
                action_hint: FraudAction::Hold,
            },
        }));
        assert!((registry.total_weight() - 1.0).abs() < 1e-9);

        let engine = RuleEngine::new(registry);
        let evaluation = engine
            .evaluate(&transaction(10.0), &profile(0, 0.0), Duration::from_secs(5))
            .await;

        assert!(!evaluation.timed_out);
        assert_eq!(evaluation.results.len(), 5);
        assert!(evaluation
            .results
            .iter()
            .all(|result| result.rule_name != "DISABLED_RULE"));
    }

    #[tokio::test]
    async fn test_identical_runs_yield_identical_results() {
        let build = || StubHistory {
            hourly_count: 3,
            locations: vec![LocationFrequency {
                latitude: 40.7128,
                longitude: -74.006,
                frequency: 4,
            }],
            hours: HashMap::from([(14, 40), (15, 60)]),
            devices: HashSet::from(["fp-1".to_string()]),
            ..StubHistory::default()
        };
        let transaction = transaction(60.0);
        let profile = profile(20, 50.0);

        let first = engine(build())
            .evaluate(&transaction, &profile, Duration::from_secs(5))
            .await;
        let second = engine(build())
            .evaluate(&transaction, &profile, Duration::from_secs(5))
            .await;

        assert_eq!(first.results.len(), second.results.len());
        for (a, b) in first.results.iter().zip(second.results.iter()) {
            assert_eq!(a.rule_name, b.rule_name);
            assert_eq!(a.triggered, b.triggered);
            assert_eq!(a.score, b.score);
            assert_eq!(a.details, b.details);
        }
    }
}
