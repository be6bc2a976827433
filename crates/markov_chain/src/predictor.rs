use core_types::{AttributePredictor, CreativeAttributes, MarkovPrediction, OutcomeBucket};

use crate::{MarkovModel, StateDistribution, StateKey};

impl AttributePredictor for MarkovModel {
    /// Walks the model's own back-off chain from the full key towards the
    /// global prior and answers from the first stored state.
    fn predict(&self, attributes: &CreativeAttributes) -> MarkovPrediction {
        let full = StateKey::full(attributes);
        for (depth, key) in self.backoff().keys(&full).enumerate() {
            if key.is_global() {
                break;
            }
            if let Some(dist) = self.state(&key) {
                return prediction(self, dist, &key, depth, false);
            }
        }
        let depth = self.backoff().levels() - 1;
        prediction(self, self.global_prior(), &StateKey::global(), depth, true)
    }
}

pub fn success_probability(model: &MarkovModel, attributes: &CreativeAttributes) -> f64 {
    model.predict(attributes).success_probability
}

fn prediction(
    model: &MarkovModel,
    dist: &StateDistribution,
    key: &StateKey,
    depth: usize,
    used_global_prior: bool,
) -> MarkovPrediction {
    MarkovPrediction {
        success_probability: dist.probability(OutcomeBucket::Success).clamp(0.0, 1.0),
        distribution: dist.probabilities,
        resolved_state: key.to_string(),
        backoff_depth: depth,
        used_global_prior,
        model_version: model.version(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MarkovConfig, MarkovTrainer};
    use core_types::{CorpusRecord, ProductCategory, TestPhase, TrainingCorpus};

    fn attrs(hook: &str, emotion: &str, pacing: &str, phase: TestPhase) -> CreativeAttributes {
        CreativeAttributes {
            hook_type: hook.into(),
            emotion: emotion.into(),
            pacing: pacing.into(),
            creative_type: "video".into(),
            product_category: ProductCategory::LanguageLearning,
            test_phase: phase,
        }
    }

    fn model() -> MarkovModel {
        let mut records = Vec::new();
        for i in 0..10 {
            records.push(CorpusRecord {
                attributes: attrs("before_after", "achievement", "medium", TestPhase::MicroTest),
                final_cvr: 0.12 + i as f64 * 0.01,
            });
        }
        for i in 0..10 {
            records.push(CorpusRecord {
                attributes: attrs("question", "curiosity", "fast", TestPhase::MicroTest),
                final_cvr: 0.01 + i as f64 * 0.001,
            });
        }
        records.push(CorpusRecord {
            attributes: attrs("viral_dance", "fun", "fast", TestPhase::ScaleTest),
            final_cvr: 0.30,
        });
        MarkovTrainer::new(MarkovConfig::default())
            .expect("trainer")
            .train(&TrainingCorpus::new(records))
            .expect("train")
    }

    #[test]
    fn exact_state_resolves_without_backoff() {
        let m = model();
        let p = m.predict(&attrs("before_after", "achievement", "medium", TestPhase::MicroTest));
        assert_eq!(p.backoff_depth, 0);
        assert!(!p.used_global_prior);
        assert_eq!(p.model_version, m.version());
        assert!((p.distribution.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn unseen_phase_backs_off_to_aggregate() {
        let m = model();
        let p = m.predict(&attrs("before_after", "achievement", "medium", TestPhase::ScaleTest));
        assert_eq!(p.backoff_depth, 1);
        assert!(p.resolved_state.contains("test_phase=*"));
        let exact = m.predict(&attrs("before_after", "achievement", "medium", TestPhase::MicroTest));
        assert!((p.success_probability - exact.success_probability).abs() < 1e-12);
    }

    #[test]
    fn unknown_combination_falls_back_to_global_prior() {
        let m = model();
        let unseen = CreativeAttributes {
            hook_type: "testimonial".into(),
            emotion: "fear".into(),
            pacing: "slow".into(),
            creative_type: "carousel".into(),
            product_category: ProductCategory::Finance,
            test_phase: TestPhase::ScaleTest,
        };
        let p = m.predict(&unseen);
        assert!(p.used_global_prior);
        assert_eq!(p.resolved_state, "*");
        let expected = m.global_prior().probability(OutcomeBucket::Success);
        assert!((p.success_probability - expected).abs() < 1e-12);
        assert!((success_probability(&m, &unseen) - expected).abs() < 1e-12);
    }

    #[test]
    fn lone_corpus_combination_is_not_trusted_on_its_own() {
        let m = model();
        let p = m.predict(&attrs("viral_dance", "fun", "fast", TestPhase::ScaleTest));
        assert!(p.used_global_prior);
    }

    #[test]
    fn lookups_are_safe_across_threads() {
        let m = std::sync::Arc::new(model());
        let query = attrs("question", "curiosity", "fast", TestPhase::MicroTest);
        let expected = m.predict(&query).success_probability;
        std::thread::scope(|s| {
            for _ in 0..4 {
                let m = m.clone();
                let query = query.clone();
                s.spawn(move || {
                    for _ in 0..100 {
                        assert_eq!(m.predict(&query).success_probability, expected);
                    }
                });
            }
        });
    }
}
