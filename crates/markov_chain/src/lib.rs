use std::collections::HashMap;

use chrono::{DateTime, Utc};
use core_types::{CoreError, CoreResult, ModelVersion, OutcomeBucket, TrainReport};
use serde::{Deserialize, Serialize};

pub mod gaps;
pub mod predictor;
pub mod state;
pub mod trainer;

pub use gaps::{find_untested_gaps, GapConfig, PatternStrength, UntestedGap};
pub use predictor::success_probability;
pub use state::{default_backoff_order, Attribute, BackoffChain, StateKey};
pub use trainer::MarkovTrainer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MarkovConfig {
    /// Additive (Laplace) pseudo-count added to every outcome bucket.
    pub smoothing_constant: f64,
    /// Records a state needs before it gets its own distribution.
    pub min_state_count: u64,
    /// Records the whole corpus needs before training is attempted.
    pub min_corpus_size: usize,
    /// Attributes in the order they are dropped, least informative first.
    pub backoff_order: Vec<Attribute>,
    /// Final-CVR quantiles separating fail | neutral | success.
    pub bucket_quantiles: [f64; 2],
    pub gaps: GapConfig,
}

impl Default for MarkovConfig {
    fn default() -> Self {
        Self {
            smoothing_constant: 1.0,
            min_state_count: 5,
            min_corpus_size: 20,
            backoff_order: default_backoff_order(),
            bucket_quantiles: [1.0 / 3.0, 2.0 / 3.0],
            gaps: GapConfig::default(),
        }
    }
}

impl MarkovConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !self.smoothing_constant.is_finite() || self.smoothing_constant <= 0.0 {
            return Err(CoreError::Config(format!(
                "smoothing_constant must be finite and > 0, got {}",
                self.smoothing_constant
            )));
        }
        if self.min_state_count == 0 {
            return Err(CoreError::Config("min_state_count must be >= 1".to_string()));
        }
        if self.min_corpus_size == 0 {
            return Err(CoreError::Config("min_corpus_size must be >= 1".to_string()));
        }
        let [low, high] = self.bucket_quantiles;
        if !(low > 0.0 && low < high && high < 1.0) {
            return Err(CoreError::Config(format!(
                "bucket_quantiles must satisfy 0 < low < high < 1, got [{low}, {high}]"
            )));
        }
        self.gaps.validate()?;
        BackoffChain::new(self.backoff_order.clone()).map(|_| ())
    }
}

/// Smoothed outcome distribution of one state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDistribution {
    pub counts: [u64; OutcomeBucket::COUNT],
    pub probabilities: [f64; OutcomeBucket::COUNT],
    /// Back-off level the key lives at; 0 is the full attribute tuple.
    pub level: usize,
}

impl StateDistribution {
    pub(crate) fn smoothed(counts: [u64; OutcomeBucket::COUNT], alpha: f64, level: usize) -> Self {
        let total = counts.iter().sum::<u64>() as f64;
        let denom = total + alpha * OutcomeBucket::COUNT as f64;
        let mut probabilities = [0.0; OutcomeBucket::COUNT];
        for (p, n) in probabilities.iter_mut().zip(counts.iter()) {
            *p = (*n as f64 + alpha) / denom;
        }
        Self {
            counts,
            probabilities,
            level,
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn probability(&self, bucket: OutcomeBucket) -> f64 {
        self.probabilities[bucket.index()]
    }
}

/// One trained transition table. Never mutated after the trainer returns it;
/// a retrain produces a new value.
#[derive(Debug, Clone)]
pub struct MarkovModel {
    version: ModelVersion,
    trained_at: DateTime<Utc>,
    cut_points: (f64, f64),
    sample_count: usize,
    folded_record_count: usize,
    backoff: BackoffChain,
    states: HashMap<StateKey, StateDistribution>,
    global: StateDistribution,
}

impl MarkovModel {
    pub fn version(&self) -> ModelVersion {
        self.version
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    pub fn cut_points(&self) -> (f64, f64) {
        self.cut_points
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    pub fn backoff(&self) -> &BackoffChain {
        &self.backoff
    }

    pub fn global_prior(&self) -> &StateDistribution {
        &self.global
    }

    pub fn state(&self, key: &StateKey) -> Option<&StateDistribution> {
        if key.is_global() {
            return Some(&self.global);
        }
        self.states.get(key)
    }

    pub fn states(&self) -> impl Iterator<Item = (&StateKey, &StateDistribution)> {
        self.states.iter()
    }

    /// States keyed by the full attribute tuple.
    pub fn trained_state_count(&self) -> usize {
        self.states.values().filter(|d| d.level == 0).count()
    }

    /// Aggregate states produced by back-off, global prior excluded.
    pub fn fallback_state_count(&self) -> usize {
        self.states.values().filter(|d| d.level > 0).count()
    }

    pub fn report(&self) -> TrainReport {
        TrainReport {
            model_version: self.version,
            trained_at: self.trained_at,
            trained_state_count: self.trained_state_count(),
            fallback_state_count: self.fallback_state_count(),
            sample_count: self.sample_count,
            folded_record_count: self.folded_record_count,
            cut_points: self.cut_points,
        }
    }
}
