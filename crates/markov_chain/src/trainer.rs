use std::collections::HashMap;

use chrono::Utc;
use core_types::{CoreError, CoreResult, ModelVersion, OutcomeBucket, TrainingCorpus};

use crate::{BackoffChain, MarkovConfig, MarkovModel, StateDistribution, StateKey};

#[derive(Debug, Clone)]
pub struct MarkovTrainer {
    cfg: MarkovConfig,
    backoff: BackoffChain,
}

impl MarkovTrainer {
    pub fn new(cfg: MarkovConfig) -> CoreResult<Self> {
        cfg.validate()?;
        let backoff = BackoffChain::new(cfg.backoff_order.clone())?;
        Ok(Self { cfg, backoff })
    }

    pub fn cfg(&self) -> &MarkovConfig {
        &self.cfg
    }

    /// Builds a fresh model from `corpus`. Nothing is shared with earlier models.
    pub fn train(&self, corpus: &TrainingCorpus) -> CoreResult<MarkovModel> {
        if corpus.is_empty() {
            return Err(CoreError::InsufficientData(
                "training corpus is empty".to_string(),
            ));
        }
        if corpus.len() < self.cfg.min_corpus_size {
            return Err(CoreError::InsufficientData(format!(
                "training corpus has {} records, need at least {}",
                corpus.len(),
                self.cfg.min_corpus_size
            )));
        }
        for (idx, record) in corpus.records.iter().enumerate() {
            let cvr = record.final_cvr;
            if !cvr.is_finite() || !(0.0..=1.0).contains(&cvr) {
                return Err(CoreError::validation(
                    "final_cvr",
                    format!("record {idx}: expected a rate in [0,1], got {cvr}"),
                ));
            }
        }

        let mut sorted = corpus
            .records
            .iter()
            .map(|r| r.final_cvr)
            .collect::<Vec<_>>();
        sorted.sort_by(f64::total_cmp);
        let [q_low, q_high] = self.cfg.bucket_quantiles;
        let cut_points = (quantile(&sorted, q_low), quantile(&sorted, q_high));

        let global_level = self.backoff.levels() - 1;
        let mut counts: HashMap<StateKey, (usize, [u64; OutcomeBucket::COUNT])> = HashMap::new();
        let mut global_counts = [0_u64; OutcomeBucket::COUNT];
        for record in &corpus.records {
            let bucket = bucket_for(record.final_cvr, cut_points).index();
            global_counts[bucket] += 1;
            let full = StateKey::full(&record.attributes);
            for level in 0..global_level {
                let key = self.backoff.coarsen(&full, level);
                counts.entry(key).or_insert((level, [0; OutcomeBucket::COUNT])).1[bucket] += 1;
            }
        }

        let min_count = self.cfg.min_state_count;
        let alpha = self.cfg.smoothing_constant;
        let folded_record_count = corpus
            .records
            .iter()
            .filter(|r| {
                counts
                    .get(&StateKey::full(&r.attributes))
                    .map_or(true, |(_, c)| c.iter().sum::<u64>() < min_count)
            })
            .count();

        let states = counts
            .into_iter()
            .filter(|(_, (_, c))| c.iter().sum::<u64>() >= min_count)
            .map(|(key, (level, c))| (key, StateDistribution::smoothed(c, alpha, level)))
            .collect::<HashMap<_, _>>();

        let model = MarkovModel {
            version: ModelVersion::generate(),
            trained_at: Utc::now(),
            cut_points,
            sample_count: corpus.len(),
            folded_record_count,
            backoff: self.backoff.clone(),
            states,
            global: StateDistribution::smoothed(global_counts, alpha, global_level),
        };
        tracing::info!(
            model_version = %model.version,
            trained_at = %model.trained_at,
            samples = model.sample_count,
            trained_states = model.trained_state_count(),
            fallback_states = model.fallback_state_count(),
            folded_records = folded_record_count,
            cut_low = cut_points.0,
            cut_high = cut_points.1,
            "markov model trained"
        );
        Ok(model)
    }
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return 0.0;
    };
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    let a = sorted.get(lo).copied().unwrap_or(0.0);
    let b = sorted.get(hi).copied().unwrap_or(a);
    a + (b - a) * frac
}

/// Ties at the low cut fail, so a corpus heavy with zero-CVR creatives still
/// has a populated fail bucket.
pub(crate) fn bucket_for(cvr: f64, (low, high): (f64, f64)) -> OutcomeBucket {
    if cvr <= low {
        OutcomeBucket::Fail
    } else if cvr > high {
        OutcomeBucket::Success
    } else {
        OutcomeBucket::Neutral
    }
}
