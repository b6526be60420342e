// =====================================================================================
// File: core-fraud/src/model.rs
// Description: Model scorer over classifier or anomaly-scorer artifacts with fallback
// Author: arkSong (arksong2018@gmail.com)
// =====================================================================================

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::error::{FraudError, FraudResult};
use crate::features::{extract_feature_vector, FEATURE_NAMES};
use crate::history::TransactionHistory;
use crate::types::{Transaction, UserRiskProfile};

/// Expected share of outliers assumed by the fallback forest
pub const FALLBACK_CONTAMINATION: f64 = 0.1;
/// Tree count of the fallback forest
pub const FALLBACK_TREE_COUNT: usize = 100;
/// Deterministic seed used when fitting the fallback forest
pub const FALLBACK_SEED: u64 = 42;

const FOREST_SAMPLE_SIZE: usize = 256;
const ANOMALY_OFFSET: f64 = 0.5;
const EULER_MASCHERONI: f64 = 0.577_215_664_901_532_9;

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Per-feature standardization, `(x - mean) / std`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl FeatureScaler {
    /// Pass-through scaler for the given dimensionality
    pub fn identity(dimensions: usize) -> Self {
        Self {
            mean: vec![0.0; dimensions],
            std: vec![1.0; dimensions],
        }
    }

    /// Fit mean and standard deviation per column
    pub fn fit(samples: &[Vec<f64>]) -> FraudResult<Self> {
        let count = samples.len();
        if count == 0 {
            return Err(FraudError::feature("cannot fit scaler on empty batch"));
        }
        let dimensions = samples[0].len();
        if samples.iter().any(|sample| sample.len() != dimensions) {
            return Err(FraudError::feature("inconsistent sample dimensions"));
        }

        let mut mean = vec![0.0; dimensions];
        for sample in samples {
            for (accumulator, value) in mean.iter_mut().zip(sample) {
                *accumulator += value;
            }
        }
        for value in &mut mean {
            *value /= count as f64;
        }

        let mut variance = vec![0.0; dimensions];
        for sample in samples {
            for ((accumulator, value), center) in variance.iter_mut().zip(sample).zip(&mean) {
                *accumulator += (value - center).powi(2);
            }
        }
        let std = variance
            .into_iter()
            .map(|sum| (sum / count as f64).sqrt())
            .collect();

        Ok(Self { mean, std })
    }

    /// Scale one feature vector. Zero-variance columns pass through centered.
    pub fn transform(&self, features: &[f64]) -> FraudResult<Vec<f64>> {
        if features.len() != self.mean.len() {
            return Err(FraudError::feature(format!(
                "feature vector has {} dimensions, scaler expects {}",
                features.len(),
                self.mean.len()
            )));
        }
        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.std))
            .map(|(value, (mean, std))| {
                let divisor = if *std > 0.0 { *std } else { 1.0 };
                (value - mean) / divisor
            })
            .collect())
    }
}

/// Node of one isolation tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IsolationNode {
    Split {
        feature: usize,
        threshold: f64,
        left: Box<IsolationNode>,
        right: Box<IsolationNode>,
    },
    Leaf {
        size: usize,
    },
}

/// Isolation forest over scaled feature vectors. An unfitted forest has no
/// trees and produces no score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsolationForest {
    pub trees: Vec<IsolationNode>,
    pub sample_size: usize,
    pub contamination: f64,
}

impl IsolationForest {
    pub fn unfitted(contamination: f64) -> Self {
        Self {
            trees: Vec::new(),
            sample_size: 0,
            contamination,
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Fit a forest of random isolation trees over the batch
    pub fn fit(
        samples: &[Vec<f64>],
        tree_count: usize,
        contamination: f64,
        seed: u64,
    ) -> FraudResult<Self> {
        if samples.is_empty() {
            return Err(FraudError::model("cannot fit forest on empty batch"));
        }
        let sample_size = samples.len().min(FOREST_SAMPLE_SIZE);
        let max_depth = (sample_size as f64).log2().ceil().max(1.0) as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..tree_count)
            .map(|_| {
                let subsample: Vec<&Vec<f64>> = samples
                    .choose_multiple(&mut rng, sample_size)
                    .collect();
                build_tree(&subsample, 0, max_depth, &mut rng)
            })
            .collect();

        Ok(Self {
            trees,
            sample_size,
            contamination,
        })
    }

    /// Anomaly score in (0, 1); values near 1 are isolated quickly and
    /// therefore anomalous
    pub fn anomaly_score(&self, features: &[f64]) -> f64 {
        let mean_path: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, features, 0.0))
            .sum::<f64>()
            / self.trees.len() as f64;
        let normalization = average_path_length(self.sample_size);
        2.0_f64.powf(-mean_path / normalization)
    }

    /// Real-valued decision score; positive for anomalous points
    pub fn decision_function(&self, features: &[f64]) -> f64 {
        self.anomaly_score(features) - ANOMALY_OFFSET
    }
}

fn build_tree(
    rows: &[&Vec<f64>],
    depth: usize,
    max_depth: usize,
    rng: &mut StdRng,
) -> IsolationNode {
    if depth >= max_depth || rows.len() <= 1 {
        return IsolationNode::Leaf { size: rows.len() };
    }

    let dimensions = rows[0].len();
    // Candidate features must vary within this partition
    let splittable: Vec<usize> = (0..dimensions)
        .filter(|&feature| {
            let first = rows[0][feature];
            rows.iter().any(|row| row[feature] != first)
        })
        .collect();
    if splittable.is_empty() {
        return IsolationNode::Leaf { size: rows.len() };
    }

    let feature = splittable[rng.gen_range(0..splittable.len())];
    let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), row| {
        (lo.min(row[feature]), hi.max(row[feature]))
    });
    let threshold = rng.gen_range(min..max);

    let (left, right): (Vec<&Vec<f64>>, Vec<&Vec<f64>>) =
        rows.iter().copied().partition(|row| row[feature] < threshold);

    IsolationNode::Split {
        feature,
        threshold,
        left: Box::new(build_tree(&left, depth + 1, max_depth, rng)),
        right: Box::new(build_tree(&right, depth + 1, max_depth, rng)),
    }
}

fn path_length(node: &IsolationNode, features: &[f64], depth: f64) -> f64 {
    match node {
        IsolationNode::Leaf { size } => depth + average_path_length(*size),
        IsolationNode::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            let branch = if features.get(*feature).copied().unwrap_or(0.0) < *threshold {
                left
            } else {
                right
            };
            path_length(branch, features, depth + 1.0)
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    if n <= 1 {
        return 0.0;
    }
    let n = n as f64;
    2.0 * ((n - 1.0).ln() + EULER_MASCHERONI) - 2.0 * (n - 1.0) / n
}

/// Linear classifier exposing per-class probabilities
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticClassifier {
    pub weights: Vec<f64>,
    pub intercept: f64,
}

impl LogisticClassifier {
    /// Probabilities of the negative and positive class, in that order
    pub fn class_probabilities(&self, features: &[f64]) -> FraudResult<[f64; 2]> {
        if features.len() != self.weights.len() {
            return Err(FraudError::model(format!(
                "feature vector has {} dimensions, classifier expects {}",
                features.len(),
                self.weights.len()
            )));
        }
        let activation: f64 = self
            .weights
            .iter()
            .zip(features)
            .map(|(weight, value)| weight * value)
            .sum::<f64>()
            + self.intercept;
        let positive = logistic(activation);
        Ok([1.0 - positive, positive])
    }
}

/// Persisted model artifact. The two kinds resolve to a fraud probability
/// through one contract: classifiers report the positive-class probability,
/// anomaly scorers map their decision score through the logistic function.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelArtifact {
    Classifier(LogisticClassifier),
    AnomalyScorer(IsolationForest),
}

impl ModelArtifact {
    pub fn is_fitted(&self) -> bool {
        match self {
            Self::Classifier(_) => true,
            Self::AnomalyScorer(forest) => forest.is_fitted(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Classifier(_) => "classifier",
            Self::AnomalyScorer(_) => "anomaly_scorer",
        }
    }

    /// Fraud probability in [0, 1] for a scaled feature vector
    pub fn fraud_probability(&self, features: &[f64]) -> FraudResult<f64> {
        match self {
            Self::Classifier(classifier) => {
                Ok(classifier.class_probabilities(features)?[1])
            }
            Self::AnomalyScorer(forest) => {
                if !forest.is_fitted() {
                    return Err(FraudError::model("anomaly scorer is not fitted"));
                }
                Ok(logistic(forest.decision_function(features)))
            }
        }
    }
}

/// Observable scorer state for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub kind: String,
    pub fitted: bool,
    pub source: String,
}

struct ScorerState {
    artifact: ModelArtifact,
    scaler: FeatureScaler,
    feature_names: Vec<String>,
    source: String,
}

/// Uniform scorer over a loaded artifact set, with an unfitted
/// isolation-forest fallback when loading fails.
///
/// The (model, scaler, feature names) triple swaps atomically on reload:
/// in-flight scorers keep the state they captured, later scorers see the
/// new one.
pub struct ModelScorer {
    state: RwLock<Arc<ScorerState>>,
}

/// Derive a companion artifact path: `model.pkl` -> `model_scaler.pkl`
fn companion_path(base: &Path, suffix: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}_{suffix}");
    if let Some(extension) = base.extension() {
        name.push('.');
        name.push_str(&extension.to_string_lossy());
    }
    base.with_file_name(name)
}

impl ModelScorer {
    /// Scorer with the unfitted fallback forest. Produces no score until
    /// seeded with at least one batch.
    pub fn fallback() -> Self {
        info!(
            contamination = FALLBACK_CONTAMINATION,
            trees = FALLBACK_TREE_COUNT,
            "using fallback fraud model"
        );
        Self {
            state: RwLock::new(Arc::new(ScorerState {
                artifact: ModelArtifact::AnomalyScorer(IsolationForest::unfitted(
                    FALLBACK_CONTAMINATION,
                )),
                scaler: FeatureScaler::identity(FEATURE_NAMES.len()),
                feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
                source: "fallback".to_string(),
            })),
        }
    }

    /// Scorer over explicit parts, used by tests and embedders
    pub fn from_parts(
        artifact: ModelArtifact,
        scaler: FeatureScaler,
        feature_names: Vec<String>,
    ) -> Self {
        Self {
            state: RwLock::new(Arc::new(ScorerState {
                artifact,
                scaler,
                feature_names,
                source: "in-memory".to_string(),
            })),
        }
    }

    /// Load the artifact triple from `path`; fall back on any failure
    pub async fn load(path: &Path) -> Self {
        match Self::load_state(path).await {
            Ok(state) => {
                info!(path = %path.display(), kind = state.artifact.kind(), "fraud model loaded");
                Self {
                    state: RwLock::new(Arc::new(state)),
                }
            }
            Err(load_error) => {
                warn!(path = %path.display(), %load_error, "failed to load fraud model");
                Self::fallback()
            }
        }
    }

    async fn load_state(path: &Path) -> FraudResult<ScorerState> {
        let scaler_path = companion_path(path, "scaler");
        let features_path = companion_path(path, "features");

        let artifact: ModelArtifact = read_artifact(path).await?;
        let scaler: FeatureScaler = read_artifact(&scaler_path).await?;
        let feature_names: Vec<String> = read_artifact(&features_path).await?;

        if scaler.mean.len() != feature_names.len() {
            return Err(FraudError::artifact(
                path.display().to_string(),
                format!(
                    "scaler covers {} features, feature list has {}",
                    scaler.mean.len(),
                    feature_names.len()
                ),
            ));
        }
        if let ModelArtifact::Classifier(classifier) = &artifact {
            if classifier.weights.len() != feature_names.len() {
                return Err(FraudError::artifact(
                    path.display().to_string(),
                    format!(
                        "classifier covers {} features, feature list has {}",
                        classifier.weights.len(),
                        feature_names.len()
                    ),
                ));
            }
        }

        Ok(ScorerState {
            artifact,
            scaler,
            feature_names,
            source: path.display().to_string(),
        })
    }

    /// Replace the artifact triple atomically
    pub async fn reload(&self, path: &Path) -> FraudResult<()> {
        let state = Self::load_state(path).await?;
        info!(path = %path.display(), kind = state.artifact.kind(), "fraud model reloaded");
        *self.state.write().await = Arc::new(state);
        Ok(())
    }

    /// Fit the fallback scaler and forest on a seed batch of raw feature
    /// vectors, then swap them in
    pub async fn seed_fallback(&self, samples: &[Vec<f64>]) -> FraudResult<()> {
        let scaler = FeatureScaler::fit(samples)?;
        let scaled: Vec<Vec<f64>> = samples
            .iter()
            .map(|sample| scaler.transform(sample))
            .collect::<FraudResult<_>>()?;
        let forest = IsolationForest::fit(
            &scaled,
            FALLBACK_TREE_COUNT,
            FALLBACK_CONTAMINATION,
            FALLBACK_SEED,
        )?;
        info!(batch = samples.len(), "fallback fraud model seeded");

        *self.state.write().await = Arc::new(ScorerState {
            artifact: ModelArtifact::AnomalyScorer(forest),
            scaler,
            feature_names: FEATURE_NAMES.iter().map(|name| name.to_string()).collect(),
            source: "fallback".to_string(),
        });
        Ok(())
    }

    pub async fn status(&self) -> ModelStatus {
        let state = self.snapshot().await;
        ModelStatus {
            kind: state.artifact.kind().to_string(),
            fitted: state.artifact.is_fitted(),
            source: state.source.clone(),
        }
    }

    pub async fn feature_names(&self) -> Vec<String> {
        self.snapshot().await.feature_names.clone()
    }

    /// Score a transaction. Returns `None` when no fitted model is
    /// available or when feature extraction or prediction fails; scoring
    /// problems degrade the assessment, they never abort it.
    pub async fn score(
        &self,
        transaction: &Transaction,
        profile: &UserRiskProfile,
        history: &dyn TransactionHistory,
    ) -> FraudResult<Option<f64>> {
        let state = self.snapshot().await;
        if !state.artifact.is_fitted() {
            return Ok(None);
        }

        let features = match extract_feature_vector(transaction, profile, history).await {
            Ok(features) => features,
            Err(extract_error) => {
                warn!(%extract_error, "feature extraction failed, skipping model score");
                return Ok(None);
            }
        };
        let scaled = match state.scaler.transform(&features) {
            Ok(scaled) => scaled,
            Err(scale_error) => {
                warn!(%scale_error, "feature scaling failed, skipping model score");
                return Ok(None);
            }
        };

        match state.artifact.fraud_probability(&scaled) {
            Ok(probability) => Ok(Some(probability.clamp(0.0, 1.0))),
            Err(prediction_error) => {
                error!(%prediction_error, "model prediction failed");
                Ok(None)
            }
        }
    }

    async fn snapshot(&self) -> Arc<ScorerState> {
        let guard = self.state.read().await;
        Arc::clone(&guard)
    }
}

async fn read_artifact<T: serde::de::DeserializeOwned>(path: &Path) -> FraudResult<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|io_error| {
            FraudError::artifact(path.display().to_string(), io_error.to_string())
        })?;
    serde_json::from_str(&raw).map_err(|parse_error| {
        FraudError::artifact(path.display().to_string(), parse_error.to_string())
    })
}
