use core_types::{CoreError, CoreResult};
use markov_chain::MarkovConfig;
use serde::{Deserialize, Serialize};
use signal_scorer::ScorerConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetrainPolicy {
    /// A retrain that arrives while another runs fails with `RetrainInProgress`.
    #[default]
    Reject,
    /// A retrain that arrives while another runs waits for it, then trains.
    Queue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BlendConfig {
    /// Impressions at which the early signal fully replaces the Markov prior.
    pub full_confidence_sample_size: u64,
    /// Above this alpha the early-signal recommendation wins, below it the prior's.
    pub precedence_alpha: f64,
    pub prior_scale_threshold: f64,
    pub prior_kill_threshold: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            full_confidence_sample_size: 1_000,
            precedence_alpha: 0.5,
            prior_scale_threshold: 0.50,
            prior_kill_threshold: 0.15,
        }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&self.precedence_alpha) {
            return Err(CoreError::Config(
                "blend.precedence_alpha must lie in [0,1]".to_string(),
            ));
        }
        let (kill, scale) = (self.prior_kill_threshold, self.prior_scale_threshold);
        if !(0.0 <= kill && kill < scale && scale <= 1.0) {
            return Err(CoreError::Config(format!(
                "blend: need 0 <= prior_kill_threshold < prior_scale_threshold <= 1, got {kill} / {scale}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RetrainConfig {
    pub policy: RetrainPolicy,
    /// Advisory only; the caller owns the schedule.
    pub interval_hours: f64,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            policy: RetrainPolicy::Reject,
            interval_hours: 24.0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub scorer: ScorerConfig,
    pub markov: MarkovConfig,
    pub blend: BlendConfig,
    pub retrain: RetrainConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document. Missing sections keep their
    /// defaults; unknown categories, phases, rules or attributes are errors.
    pub fn from_toml_str(raw: &str) -> CoreResult<Self> {
        let cfg = toml::from_str::<EngineConfig>(raw)
            .map_err(|err| CoreError::Config(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.scorer.validate()?;
        self.markov.validate()?;
        self.blend.validate()?;
        if !self.retrain.interval_hours.is_finite() || self.retrain.interval_hours <= 0.0 {
            return Err(CoreError::Config(
                "retrain.interval_hours must be finite and > 0".to_string(),
            ));
        }
        Ok(())
    }
}
