use std::sync::Arc;

use arc_swap::ArcSwapOption;
use core_types::{
    AttributePredictor, CoreError, CoreResult, Creative, EarlySignalSample, MarkovPrediction,
    ModelVersion, ProductCategory, Recommendation, SignalClassification, TrainReport,
    TrainingCorpus,
};
use markov_chain::{MarkovModel, MarkovTrainer, UntestedGap};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use signal_scorer::{BenchmarkComparison, SignalScorer, TriageItem, TriageReport};

pub mod config;

pub use config::{BlendConfig, EngineConfig, RetrainConfig, RetrainPolicy};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    EarlySignal,
    MarkovPrior,
    /// alpha sat exactly on the precedence point and the two sides disagreed.
    Tie,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlendedPrediction {
    pub creative_id: String,
    /// Weight of the early signal; the Markov prior gets `1 - alpha`.
    pub alpha: f64,
    pub blended_cvr: f64,
    pub recommendation: Recommendation,
    pub source: RecommendationSource,
    pub early_signal: Option<SignalClassification>,
    pub markov: Option<MarkovPrediction>,
    pub model_unavailable: bool,
}

/// Owns the scorer, the trainer and the currently published model.
///
/// Readers load the model through one atomic reference and keep the snapshot
/// they loaded for the whole request. Retrains are serialized by `retrain_lock`.
pub struct PredictionService {
    scorer: SignalScorer,
    trainer: MarkovTrainer,
    blend: BlendConfig,
    retrain_policy: RetrainPolicy,
    model: ArcSwapOption<MarkovModel>,
    retrain_lock: Mutex<()>,
}

impl PredictionService {
    pub fn new(cfg: EngineConfig) -> CoreResult<Self> {
        cfg.validate()?;
        Ok(Self {
            scorer: SignalScorer::new(cfg.scorer)?,
            trainer: MarkovTrainer::new(cfg.markov)?,
            blend: cfg.blend,
            retrain_policy: cfg.retrain.policy,
            model: ArcSwapOption::empty(),
            retrain_lock: Mutex::new(()),
        })
    }

    pub fn scorer(&self) -> &SignalScorer {
        &self.scorer
    }

    pub fn blend_cfg(&self) -> &BlendConfig {
        &self.blend
    }

    pub fn current_model(&self) -> Option<Arc<MarkovModel>> {
        self.model.load_full()
    }

    pub fn current_version(&self) -> Option<ModelVersion> {
        self.model.load().as_ref().map(|m| m.version())
    }

    /// Installs an externally trained snapshot. Waits for any running retrain.
    pub fn publish(&self, model: MarkovModel) -> ModelVersion {
        let _guard = self.retrain_lock.lock();
        self.install(model)
    }

    pub fn analyze_early_signals(
        &self,
        sample: &EarlySignalSample,
        creative: &Creative,
    ) -> CoreResult<SignalClassification> {
        self.scorer.analyze(sample, creative)
    }

    pub fn triage(&self, items: &[TriageItem]) -> CoreResult<TriageReport> {
        signal_scorer::triage(&self.scorer, items)
    }

    pub fn compare_to_benchmark(
        &self,
        category: ProductCategory,
        cvr: f64,
        ctr: Option<f64>,
    ) -> CoreResult<BenchmarkComparison> {
        signal_scorer::compare_to_benchmark(&self.scorer.cfg().benchmarks, category, cvr, ctr)
    }

    /// Untested hook x emotion x pacing combinations, bucketed with the active
    /// model's cut-points.
    pub fn find_untested_gaps(
        &self,
        corpus: &TrainingCorpus,
        category: Option<ProductCategory>,
    ) -> CoreResult<Vec<UntestedGap>> {
        let model = self.model.load_full().ok_or(CoreError::ModelUnavailable)?;
        Ok(markov_chain::find_untested_gaps(
            corpus,
            &model,
            category,
            &self.trainer.cfg().gaps,
        ))
    }

    pub fn train_markov_chain(&self, corpus: &TrainingCorpus) -> CoreResult<TrainReport> {
        self.retrain(corpus)
    }

    /// Trains a new model and publishes it. On failure the active model is
    /// left untouched and the error is returned.
    pub fn retrain(&self, corpus: &TrainingCorpus) -> CoreResult<TrainReport> {
        let _guard = match self.retrain_policy {
            RetrainPolicy::Reject => self.retrain_lock.try_lock().ok_or_else(|| {
                tracing::warn!("retrain rejected, another retrain is running");
                CoreError::RetrainInProgress
            })?,
            RetrainPolicy::Queue => self.retrain_lock.lock(),
        };

        let model = match self.trainer.train(corpus) {
            Ok(model) => model,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    active_version = ?self.current_version().map(|v| v.to_string()),
                    "retrain failed, keeping active model"
                );
                return Err(err);
            }
        };
        let report = model.report();
        self.install(model);
        Ok(report)
    }

    /// Blends the early-signal forecast with the Markov prior for `creative`.
    pub fn predict(
        &self,
        sample: Option<&EarlySignalSample>,
        creative: &Creative,
    ) -> CoreResult<BlendedPrediction> {
        if let Some(sample) = sample {
            if sample.creative_id != creative.id {
                return Err(CoreError::validation(
                    "creative_id",
                    format!(
                        "sample is for {:?} but creative is {:?}",
                        sample.creative_id, creative.id
                    ),
                ));
            }
        }

        let early_signal = sample
            .map(|s| self.scorer.analyze(s, creative))
            .transpose()?;
        let snapshot = self.model.load_full();
        let markov = snapshot.as_ref().map(|m| m.predict(&creative.attributes()));

        let prediction = match (early_signal, markov) {
            (None, None) => return Err(CoreError::ModelUnavailable),
            (Some(early), None) => BlendedPrediction {
                creative_id: creative.id.clone(),
                alpha: 1.0,
                blended_cvr: early.predicted_final_cvr,
                recommendation: early.recommendation,
                source: RecommendationSource::EarlySignal,
                early_signal: Some(early),
                markov: None,
                model_unavailable: true,
            },
            (None, Some(prior)) => BlendedPrediction {
                creative_id: creative.id.clone(),
                alpha: 0.0,
                blended_cvr: prior.success_probability,
                recommendation: self.prior_recommendation(prior.success_probability),
                source: RecommendationSource::MarkovPrior,
                early_signal: None,
                markov: Some(prior),
                model_unavailable: false,
            },
            (Some(early), Some(prior)) => {
                let impressions = sample.map_or(0, |s| s.impressions.max(0) as u64);
                let alpha = self.alpha(impressions);
                let blended_cvr = (alpha * early.predicted_final_cvr
                    + (1.0 - alpha) * prior.success_probability)
                    .clamp(0.0, 1.0);
                let (recommendation, source) = self.precedence(
                    alpha,
                    early.recommendation,
                    self.prior_recommendation(prior.success_probability),
                );
                BlendedPrediction {
                    creative_id: creative.id.clone(),
                    alpha,
                    blended_cvr,
                    recommendation,
                    source,
                    early_signal: Some(early),
                    markov: Some(prior),
                    model_unavailable: false,
                }
            }
        };

        tracing::debug!(
            creative_id = %prediction.creative_id,
            alpha = prediction.alpha,
            blended_cvr = prediction.blended_cvr,
            recommendation = %prediction.recommendation,
            model_unavailable = prediction.model_unavailable,
            "blended prediction"
        );
        Ok(prediction)
    }

    fn install(&self, model: MarkovModel) -> ModelVersion {
        let version = model.version();
        let previous = self.current_version();
        self.model.store(Some(Arc::new(model)));
        tracing::info!(
            model_version = %version,
            previous_version = ?previous.map(|v| v.to_string()),
            "markov model published"
        );
        version
    }

    fn alpha(&self, impressions: u64) -> f64 {
        let full = self.blend.full_confidence_sample_size;
        if full == 0 {
            return 1.0;
        }
        (impressions as f64 / full as f64).min(1.0)
    }

    fn prior_recommendation(&self, success_probability: f64) -> Recommendation {
        if success_probability >= self.blend.prior_scale_threshold {
            Recommendation::Scale
        } else if success_probability <= self.blend.prior_kill_threshold {
            Recommendation::Kill
        } else {
            Recommendation::Wait
        }
    }

    fn precedence(
        &self,
        alpha: f64,
        early: Recommendation,
        prior: Recommendation,
    ) -> (Recommendation, RecommendationSource) {
        let pivot = self.blend.precedence_alpha;
        if alpha > pivot {
            (early, RecommendationSource::EarlySignal)
        } else if alpha < pivot {
            (prior, RecommendationSource::MarkovPrior)
        } else if early == prior {
            (early, RecommendationSource::EarlySignal)
        } else {
            (Recommendation::Wait, RecommendationSource::Tie)
        }
    }
}
