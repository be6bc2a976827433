use std::collections::BTreeMap;

use core_types::{
    CoreError, CoreResult, Creative, DerivedRates, EarlySignalSample, MetricRule, ProductCategory,
    Recommendation, RuleOutcome, Signal, SignalClassification, TestPhase,
};
use serde::{Deserialize, Serialize};

pub mod benchmark;
pub mod triage;
pub mod validate;

pub use benchmark::{
    compare_to_benchmark, BenchmarkComparison, BenchmarkConfig, BenchmarkVerdict, CategoryBenchmark,
};
pub use triage::{triage, TriageEntry, TriageItem, TriageReport, TriageSummary};
pub use validate::derive_rates;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RuleThreshold {
    /// Value the metric must reach (or stay under, for bounce rate) to score +1.
    pub positive: f64,
    /// Value at which the metric scores -1.
    pub negative: f64,
}

pub type ThresholdTable = BTreeMap<MetricRule, RuleThreshold>;

pub fn default_threshold_table() -> ThresholdTable {
    BTreeMap::from([
        (
            MetricRule::Ctr,
            RuleThreshold {
                positive: 0.03,
                negative: 0.01,
            },
        ),
        (
            MetricRule::BounceRate,
            RuleThreshold {
                positive: 0.40,
                negative: 0.70,
            },
        ),
        (
            MetricRule::TimeOnPage,
            RuleThreshold {
                positive: 5.0,
                negative: 2.0,
            },
        ),
        (
            MetricRule::Cvr,
            RuleThreshold {
                positive: 0.15,
                negative: 0.03,
            },
        ),
    ])
}

/// Per-category rule thresholds. A category table overrides the default
/// table rule by rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ThresholdConfig {
    pub default: Option<ThresholdTable>,
    pub categories: BTreeMap<ProductCategory, ThresholdTable>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            default: Some(default_threshold_table()),
            categories: BTreeMap::new(),
        }
    }
}

impl ThresholdConfig {
    pub fn resolve(&self, category: ProductCategory) -> CoreResult<ThresholdTable> {
        match (self.categories.get(&category), &self.default) {
            (Some(specific), Some(default)) => {
                let mut merged = default.clone();
                merged.extend(specific.iter().map(|(rule, t)| (*rule, *t)));
                Ok(merged)
            }
            (Some(specific), None) => Ok(specific.clone()),
            (None, Some(default)) => Ok(default.clone()),
            (None, None) => Err(CoreError::Config(format!(
                "no thresholds for product category {category} and no default table"
            ))),
        }
    }

    fn validate(&self) -> CoreResult<()> {
        let tables = self
            .default
            .iter()
            .map(|t| ("default".to_string(), t))
            .chain(self.categories.iter().map(|(c, t)| (c.to_string(), t)));
        for (name, table) in tables {
            for (rule, t) in table {
                if !t.positive.is_finite() || !t.negative.is_finite() {
                    return Err(CoreError::Config(format!(
                        "thresholds.{name}.{rule} must be finite"
                    )));
                }
                let ordered = if rule.higher_is_better() {
                    t.positive > t.negative
                } else {
                    t.positive < t.negative
                };
                if !ordered {
                    return Err(CoreError::Config(format!(
                        "thresholds.{name}.{rule}: positive {} and negative {} are on the wrong sides",
                        t.positive, t.negative
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Ratio of final to early CVR for one test phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default, deny_unknown_fields)]
pub struct PhaseMultipliers {
    pub default: Option<f64>,
    pub categories: BTreeMap<ProductCategory, f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SignalBands {
    pub strong_positive_at: i32,
    pub positive_at: i32,
    pub negative_at: i32,
    pub strong_negative_at: i32,
}

impl Default for SignalBands {
    fn default() -> Self {
        Self {
            strong_positive_at: 3,
            positive_at: 1,
            negative_at: -1,
            strong_negative_at: -3,
        }
    }
}

impl SignalBands {
    /// Monotonic in `score`. A shared boundary resolves to the milder bucket.
    pub fn signal_for(&self, score: i32) -> Signal {
        if score >= self.positive_at {
            if score >= self.strong_positive_at && self.strong_positive_at > self.positive_at {
                Signal::StrongPositive
            } else {
                Signal::Positive
            }
        } else if score <= self.negative_at {
            if score <= self.strong_negative_at && self.strong_negative_at < self.negative_at {
                Signal::StrongNegative
            } else {
                Signal::Negative
            }
        } else {
            Signal::Neutral
        }
    }
}

/// Confidence ceiling per signal, reached only with a full sample.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfidenceCeilings {
    pub strong_positive: f64,
    pub positive: f64,
    pub neutral: f64,
    pub negative: f64,
    pub strong_negative: f64,
}

impl Default for ConfidenceCeilings {
    fn default() -> Self {
        Self {
            strong_positive: 0.75,
            positive: 0.65,
            neutral: 0.50,
            negative: 0.70,
            strong_negative: 0.80,
        }
    }
}

impl ConfidenceCeilings {
    pub fn for_signal(&self, signal: Signal) -> f64 {
        match signal {
            Signal::StrongPositive => self.strong_positive,
            Signal::Positive => self.positive,
            Signal::Neutral => self.neutral,
            Signal::Negative => self.negative,
            Signal::StrongNegative => self.strong_negative,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScorerConfig {
    /// Impressions needed before confidence reaches its ceiling.
    pub min_sample_size: u64,
    /// Hours of traffic needed before a sample is treated as mature.
    pub min_window_hours: f64,
    pub scale_confidence: f64,
    pub kill_confidence: f64,
    /// Budget not spent on each creative killed early, used by triage summaries.
    pub budget_saved_per_kill: f64,
    pub bands: SignalBands,
    pub ceilings: ConfidenceCeilings,
    pub thresholds: ThresholdConfig,
    pub extrapolation: BTreeMap<TestPhase, PhaseMultipliers>,
    /// Industry reference rates per category.
    pub benchmarks: BenchmarkConfig,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            min_sample_size: 100,
            min_window_hours: 6.0,
            scale_confidence: 0.60,
            kill_confidence: 0.60,
            budget_saved_per_kill: 40.0,
            bands: SignalBands::default(),
            ceilings: ConfidenceCeilings::default(),
            thresholds: ThresholdConfig::default(),
            extrapolation: BTreeMap::from([
                (
                    TestPhase::MicroTest,
                    PhaseMultipliers {
                        default: Some(1.08),
                        categories: BTreeMap::new(),
                    },
                ),
                (
                    TestPhase::ScaleTest,
                    PhaseMultipliers {
                        default: Some(1.0),
                        categories: BTreeMap::new(),
                    },
                ),
            ]),
            benchmarks: BenchmarkConfig::default(),
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> CoreResult<()> {
        let b = &self.bands;
        if b.positive_at < 1 || b.negative_at > -1 {
            return Err(CoreError::Config(
                "bands: positive_at must be >= 1 and negative_at <= -1".to_string(),
            ));
        }
        if b.strong_positive_at < b.positive_at || b.strong_negative_at > b.negative_at {
            return Err(CoreError::Config(
                "bands: strong bands must lie beyond their mild bands".to_string(),
            ));
        }

        let c = &self.ceilings;
        let ceilings = [
            c.strong_positive,
            c.positive,
            c.neutral,
            c.negative,
            c.strong_negative,
        ];
        if ceilings.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(CoreError::Config("ceilings must lie in [0,1]".to_string()));
        }
        for (name, v) in [
            ("scale_confidence", self.scale_confidence),
            ("kill_confidence", self.kill_confidence),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(CoreError::Config(format!("{name} must lie in [0,1]")));
            }
        }
        if !self.min_window_hours.is_finite() || self.min_window_hours < 0.0 {
            return Err(CoreError::Config(
                "min_window_hours must be finite and >= 0".to_string(),
            ));
        }
        if !self.budget_saved_per_kill.is_finite() || self.budget_saved_per_kill < 0.0 {
            return Err(CoreError::Config(
                "budget_saved_per_kill must be finite and >= 0".to_string(),
            ));
        }

        for (phase, table) in &self.extrapolation {
            let values = table.default.iter().chain(table.categories.values());
            for m in values {
                if !m.is_finite() || *m <= 0.0 {
                    return Err(CoreError::Config(format!(
                        "extrapolation.{phase}: multiplier {m} must be finite and > 0"
                    )));
                }
            }
        }

        self.benchmarks.validate()?;
        self.thresholds.validate()
    }

    /// Falls back to the phase default, then to 1.0 (no extrapolation).
    pub fn extrapolation_multiplier(&self, phase: TestPhase, category: ProductCategory) -> f64 {
        self.extrapolation
            .get(&phase)
            .and_then(|p| p.categories.get(&category).copied().or(p.default))
            .unwrap_or(1.0)
    }
}

/// Everything the scorer reads from one sample, already validated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreInput {
    pub rates: DerivedRates,
    pub avg_time_on_page: f64,
    pub impressions: u64,
    pub landing_views: u64,
    pub window_hours: Option<f64>,
    pub product_category: ProductCategory,
    pub test_phase: TestPhase,
}

impl ScoreInput {
    pub fn from_sample(
        sample: &EarlySignalSample,
        rates: DerivedRates,
        creative: &Creative,
    ) -> Self {
        Self {
            rates,
            avg_time_on_page: sample.avg_time_on_page,
            impressions: sample.impressions.max(0) as u64,
            landing_views: sample.landing_views.max(0) as u64,
            window_hours: sample.window_hours,
            product_category: creative.product_category,
            test_phase: creative.test_phase,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignalScorer {
    cfg: ScorerConfig,
}

impl SignalScorer {
    pub fn new(cfg: ScorerConfig) -> CoreResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    pub fn cfg(&self) -> &ScorerConfig {
        &self.cfg
    }

    /// Validates the raw sample and classifies it for `creative`.
    pub fn analyze(
        &self,
        sample: &EarlySignalSample,
        creative: &Creative,
    ) -> CoreResult<SignalClassification> {
        let rates = derive_rates(sample)?;
        let input = ScoreInput::from_sample(sample, rates, creative);
        let classification = self.classify(&input)?;
        tracing::debug!(
            creative_id = %sample.creative_id,
            signal = %classification.signal,
            score = classification.score,
            confidence = classification.confidence,
            recommendation = %classification.recommendation,
            "early signal classified"
        );
        Ok(classification)
    }

    /// Compares the sample's observed CVR and CTR with its category benchmark.
    pub fn benchmark(
        &self,
        sample: &EarlySignalSample,
        creative: &Creative,
    ) -> CoreResult<BenchmarkComparison> {
        let rates = derive_rates(sample)?;
        let cvr = rates.cvr.ok_or_else(|| {
            CoreError::InsufficientData(format!(
                "{} has no landing views, cvr is undefined",
                sample.creative_id
            ))
        })?;
        compare_to_benchmark(&self.cfg.benchmarks, creative.product_category, cvr, rates.ctr)
    }

    pub fn classify(&self, input: &ScoreInput) -> CoreResult<SignalClassification> {
        let table = self.cfg.thresholds.resolve(input.product_category)?;

        let mut rules = Vec::with_capacity(table.len());
        let mut positives = 0;
        let mut negatives = 0;
        for (rule, threshold) in &table {
            let outcome = match self.metric_value(*rule, input) {
                Some(value) => evaluate_rule(*rule, value, threshold),
                None => RuleOutcome {
                    rule: *rule,
                    value: None,
                    contribution: 0,
                    detail: format!("{rule} undefined ({}), skipped", skip_reason(*rule)),
                },
            };
            if outcome.contribution > 0 {
                positives += outcome.contribution;
            } else {
                negatives -= outcome.contribution;
            }
            rules.push(outcome);
        }
        let score = positives - negatives;
        let signal = self.cfg.bands.signal_for(score);

        let confidence = self.confidence(signal, input);
        let multiplier = self
            .cfg
            .extrapolation_multiplier(input.test_phase, input.product_category);
        let predicted_final_cvr = (input.rates.cvr_or_zero() * multiplier).clamp(0.0, 1.0);
        let recommendation = self.recommend(signal, confidence);

        let mut reasoning = format!("score {score} ({positives} positive, {negatives} negative)");
        if input.rates.insufficient_data {
            reasoning.push_str(", insufficient data");
        }
        reasoning.push_str(": ");
        let details = rules
            .iter()
            .map(|r| r.detail.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        reasoning.push_str(&details);

        Ok(SignalClassification {
            signal,
            confidence,
            recommendation,
            predicted_final_cvr,
            reasoning,
            next_action: next_action(recommendation, predicted_final_cvr),
            score,
            rules,
            rates: input.rates,
        })
    }

    fn metric_value(&self, rule: MetricRule, input: &ScoreInput) -> Option<f64> {
        match rule {
            MetricRule::Ctr => input.rates.ctr,
            MetricRule::BounceRate => input.rates.bounce_rate,
            MetricRule::TimeOnPage => (input.landing_views > 0).then_some(input.avg_time_on_page),
            MetricRule::Cvr => input.rates.cvr,
        }
    }

    fn confidence(&self, signal: Signal, input: &ScoreInput) -> f64 {
        let coverage = if self.cfg.min_sample_size == 0 {
            1.0
        } else {
            (input.impressions as f64 / self.cfg.min_sample_size as f64).min(1.0)
        };
        let maturity = match input.window_hours {
            Some(hours) if self.cfg.min_window_hours > 0.0 => {
                (hours / self.cfg.min_window_hours).clamp(0.0, 1.0)
            }
            _ => 1.0,
        };
        (coverage * maturity * self.cfg.ceilings.for_signal(signal)).clamp(0.0, 1.0)
    }

    fn recommend(&self, signal: Signal, confidence: f64) -> Recommendation {
        match signal {
            Signal::StrongPositive => Recommendation::Scale,
            Signal::Positive if confidence > self.cfg.scale_confidence => Recommendation::Scale,
            Signal::StrongNegative => Recommendation::Kill,
            Signal::Negative if confidence > self.cfg.kill_confidence => Recommendation::Kill,
            _ => Recommendation::Wait,
        }
    }
}

fn evaluate_rule(rule: MetricRule, value: f64, t: &RuleThreshold) -> RuleOutcome {
    let (good, bad, good_op, bad_op) = if rule.higher_is_better() {
        (value >= t.positive, value <= t.negative, ">=", "<=")
    } else {
        (value <= t.positive, value >= t.negative, "<=", ">=")
    };
    let shown = fmt_metric(rule, value);
    let (contribution, detail) = if good {
        (
            1,
            format!("{rule} {shown} {good_op} {} (+1)", fmt_metric(rule, t.positive)),
        )
    } else if bad {
        (
            -1,
            format!("{rule} {shown} {bad_op} {} (-1)", fmt_metric(rule, t.negative)),
        )
    } else {
        (0, format!("{rule} {shown} between thresholds (0)"))
    };
    RuleOutcome {
        rule,
        value: Some(value),
        contribution,
        detail,
    }
}

fn fmt_metric(rule: MetricRule, value: f64) -> String {
    match rule {
        MetricRule::TimeOnPage => format!("{value:.1}s"),
        _ => format!("{:.2}%", value * 100.0),
    }
}

fn skip_reason(rule: MetricRule) -> &'static str {
    match rule {
        MetricRule::Ctr => "no impressions",
        _ => "no landing views",
    }
}

fn next_action(recommendation: Recommendation, predicted_final_cvr: f64) -> String {
    let pct = predicted_final_cvr * 100.0;
    match recommendation {
        Recommendation::Scale => {
            format!("Raise the budget and promote to scale test. Predicted final CVR {pct:.1}%")
        }
        Recommendation::Wait => {
            format!("Keep testing at the current budget until the sample grows. Predicted final CVR {pct:.1}%")
        }
        Recommendation::Kill => {
            format!("Stop the campaign and reallocate its budget. Predicted final CVR {pct:.1}%")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creative(category: ProductCategory, phase: TestPhase) -> Creative {
        Creative {
            id: "c1".to_string(),
            creative_type: "video".into(),
            product_category: category,
            production_cost: 50.0,
            hook_type: "question".into(),
            emotion: "curiosity".into(),
            pacing: "fast".into(),
            test_phase: phase,
            final_cvr: None,
        }
    }

    fn sample(
        impressions: i64,
        clicks: i64,
        landing_views: i64,
        landing_bounces: i64,
        avg_time_on_page: f64,
        conversions: i64,
    ) -> EarlySignalSample {
        EarlySignalSample {
            creative_id: "c1".to_string(),
            impressions,
            clicks,
            landing_views,
            landing_bounces,
            conversions,
            avg_time_on_page,
            window_hours: None,
            observed_at: None,
        }
    }

    fn scorer() -> SignalScorer {
        SignalScorer::new(ScorerConfig::default()).expect("default config is valid")
    }

    fn input_with_ctr(ctr: f64) -> ScoreInput {
        ScoreInput {
            rates: DerivedRates {
                ctr: Some(ctr),
                bounce_rate: Some(0.55),
                cvr: Some(0.05),
                insufficient_data: false,
            },
            avg_time_on_page: 3.0,
            impressions: 1_000,
            landing_views: 40,
            window_hours: None,
            product_category: ProductCategory::Generic,
            test_phase: TestPhase::MicroTest,
        }
    }

    #[test]
    fn strong_creative_matches_reference_scenario() {
        let out = scorer()
            .analyze(
                &sample(500, 20, 18, 6, 6.5, 2),
                &creative(ProductCategory::Generic, TestPhase::MicroTest),
            )
            .expect("classify");
        assert_eq!(out.signal, Signal::StrongPositive);
        assert_eq!(out.score, 3);
        assert!((out.confidence - 0.75).abs() < 1e-9);
        assert!((out.predicted_final_cvr - 0.12).abs() < 1e-9);
        assert_eq!(out.recommendation, Recommendation::Scale);
        assert!(out.reasoning.starts_with("score 3 (3 positive, 0 negative)"));
        assert!(out.reasoning.contains("ctr 4.00% >= 3.00% (+1)"));
        assert!(out.next_action.contains("12.0%"));
    }

    #[test]
    fn weak_creative_is_killed() {
        let out = scorer()
            .analyze(
                &sample(800, 5, 4, 3, 1.2, 0),
                &creative(ProductCategory::Generic, TestPhase::MicroTest),
            )
            .expect("classify");
        assert_eq!(out.signal, Signal::StrongNegative);
        assert_eq!(out.score, -4);
        assert_eq!(out.recommendation, Recommendation::Kill);
        assert!((out.confidence - 0.80).abs() < 1e-9);
        assert_eq!(out.predicted_final_cvr, 0.0);
    }

    #[test]
    fn empty_sample_is_low_confidence_neutral() {
        let out = scorer()
            .analyze(
                &sample(0, 0, 0, 0, 9.0, 0),
                &creative(ProductCategory::Generic, TestPhase::MicroTest),
            )
            .expect("classify");
        assert!(out.rates.ctr.is_none());
        assert!(out.rates.insufficient_data);
        assert_eq!(out.signal, Signal::Neutral);
        assert_eq!(out.confidence, 0.0);
        assert_eq!(out.recommendation, Recommendation::Wait);
        assert!(out.rules.iter().all(|r| r.value.is_none()));
    }

    #[test]
    fn small_sample_caps_confidence() {
        let out = scorer()
            .analyze(
                &sample(50, 2, 2, 0, 6.0, 0),
                &creative(ProductCategory::Generic, TestPhase::MicroTest),
            )
            .expect("classify");
        let ceiling = ScorerConfig::default().ceilings.for_signal(out.signal);
        assert!((out.confidence - 0.5 * ceiling).abs() < 1e-9);
    }

    #[test]
    fn short_window_scales_confidence() {
        let mut s = sample(500, 20, 18, 6, 6.5, 2);
        s.window_hours = Some(3.0);
        let out = scorer()
            .analyze(&s, &creative(ProductCategory::Generic, TestPhase::MicroTest))
            .expect("classify");
        assert!((out.confidence - 0.375).abs() < 1e-9);
    }

    #[test]
    fn positive_needs_confidence_to_scale() {
        let s = scorer();
        assert_eq!(s.recommend(Signal::Positive, 0.65), Recommendation::Scale);
        assert_eq!(s.recommend(Signal::Positive, 0.30), Recommendation::Wait);
        assert_eq!(s.recommend(Signal::Negative, 0.70), Recommendation::Kill);
        assert_eq!(s.recommend(Signal::Negative, 0.10), Recommendation::Wait);
        assert_eq!(s.recommend(Signal::Neutral, 1.0), Recommendation::Wait);
    }

    #[test]
    fn sample_is_placed_against_category_benchmark() {
        let out = scorer()
            .benchmark(
                &sample(500, 20, 18, 6, 6.5, 2),
                &creative(ProductCategory::LanguageLearning, TestPhase::MicroTest),
            )
            .expect("benchmark");
        assert!((out.cvr - 2.0 / 18.0).abs() < 1e-12);
        assert_eq!(out.verdict, BenchmarkVerdict::Average);
        assert_eq!(out.ctr, Some(0.04));

        let err = scorer()
            .benchmark(
                &sample(400, 3, 0, 0, 0.0, 0),
                &creative(ProductCategory::Fitness, TestPhase::MicroTest),
            )
            .expect_err("no landing views");
        assert!(matches!(err, CoreError::InsufficientData(_)));
    }

    #[test]
    fn confidence_must_exceed_gate() {
        let s = scorer();
        let gate = s.cfg().scale_confidence;
        assert_eq!(s.recommend(Signal::Positive, gate), Recommendation::Wait);
        assert_eq!(
            s.recommend(Signal::Positive, gate + 1e-9),
            Recommendation::Scale
        );
        let gate = s.cfg().kill_confidence;
        assert_eq!(s.recommend(Signal::Negative, gate), Recommendation::Wait);
        assert_eq!(
            s.recommend(Signal::Negative, gate + 1e-9),
            Recommendation::Kill
        );
    }

    #[test]
    fn bands_map_scores_monotonically() {
        let bands = SignalBands::default();
        assert_eq!(bands.signal_for(4), Signal::StrongPositive);
        assert_eq!(bands.signal_for(3), Signal::StrongPositive);
        assert_eq!(bands.signal_for(2), Signal::Positive);
        assert_eq!(bands.signal_for(1), Signal::Positive);
        assert_eq!(bands.signal_for(0), Signal::Neutral);
        assert_eq!(bands.signal_for(-2), Signal::Negative);
        assert_eq!(bands.signal_for(-3), Signal::StrongNegative);

        let mut prev = bands.signal_for(-10);
        for score in -9..=10 {
            let next = bands.signal_for(score);
            assert!(next >= prev);
            prev = next;
        }
    }

    #[test]
    fn shared_band_boundary_picks_milder_signal() {
        let bands = SignalBands {
            strong_positive_at: 2,
            positive_at: 2,
            negative_at: -1,
            strong_negative_at: -1,
        };
        assert_eq!(bands.signal_for(2), Signal::Positive);
        assert_eq!(bands.signal_for(5), Signal::Positive);
        assert_eq!(bands.signal_for(-1), Signal::Negative);
    }

    #[test]
    fn higher_ctr_never_lowers_score() {
        let s = scorer();
        let mut prev: Option<SignalClassification> = None;
        for step in 0..=100 {
            let ctr = step as f64 / 1_000.0;
            let out = s.classify(&input_with_ctr(ctr)).expect("classify");
            if let Some(p) = &prev {
                assert!(out.score >= p.score, "ctr {ctr} lowered score");
                assert!(out.signal >= p.signal, "ctr {ctr} lowered signal");
            }
            prev = Some(out);
        }
    }

    #[test]
    fn classification_is_byte_identical_across_calls() {
        let s = scorer();
        let c = creative(ProductCategory::Fitness, TestPhase::ScaleTest);
        let smp = sample(1_200, 30, 25, 12, 3.4, 1);
        let a = serde_json::to_string(&s.analyze(&smp, &c).expect("a")).expect("json a");
        let b = serde_json::to_string(&s.analyze(&smp, &c).expect("b")).expect("json b");
        assert_eq!(a, b);
    }

    #[test]
    fn outputs_stay_in_unit_interval() {
        let s = scorer();
        let c = creative(ProductCategory::Generic, TestPhase::MicroTest);
        for impressions in [0_i64, 1, 10, 99, 100, 5_000] {
            for clicks in [0_i64, 1, 10] {
                let clicks = clicks.min(impressions);
                let views = clicks;
                let out = s
                    .analyze(&sample(impressions, clicks, views, 0, 4.0, views), &c)
                    .expect("classify");
                assert!((0.0..=1.0).contains(&out.confidence));
                assert!((0.0..=1.0).contains(&out.predicted_final_cvr));
            }
        }
    }

    #[test]
    fn category_table_overrides_default_rule_by_rule() {
        let mut cfg = ScorerConfig::default();
        cfg.thresholds.categories.insert(
            ProductCategory::Finance,
            BTreeMap::from([(
                MetricRule::Ctr,
                RuleThreshold {
                    positive: 0.05,
                    negative: 0.02,
                },
            )]),
        );
        let table = cfg
            .thresholds
            .resolve(ProductCategory::Finance)
            .expect("resolve");
        assert_eq!(table.len(), 4);
        assert_eq!(table[&MetricRule::Ctr].positive, 0.05);
        assert_eq!(table[&MetricRule::BounceRate].positive, 0.40);
    }

    #[test]
    fn missing_category_without_default_is_config_error() {
        let mut cfg = ScorerConfig::default();
        cfg.thresholds.default = None;
        cfg.thresholds
            .categories
            .insert(ProductCategory::Fitness, default_threshold_table());
        let s = SignalScorer::new(cfg).expect("valid");
        let err = s
            .analyze(
                &sample(500, 20, 18, 6, 6.5, 2),
                &creative(ProductCategory::Finance, TestPhase::MicroTest),
            )
            .expect_err("no thresholds for finance");
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let mut cfg = ScorerConfig::default();
        if let Some(table) = cfg.thresholds.default.as_mut() {
            table.insert(
                MetricRule::BounceRate,
                RuleThreshold {
                    positive: 0.8,
                    negative: 0.3,
                },
            );
        }
        assert!(matches!(SignalScorer::new(cfg), Err(CoreError::Config(_))));
    }

    #[test]
    fn multiplier_falls_back_to_phase_default_then_identity() {
        let mut cfg = ScorerConfig::default();
        if let Some(phase) = cfg.extrapolation.get_mut(&TestPhase::MicroTest) {
            phase.categories.insert(ProductCategory::Fitness, 1.25);
        }
        cfg.extrapolation.remove(&TestPhase::ScaleTest);
        assert_eq!(
            cfg.extrapolation_multiplier(TestPhase::MicroTest, ProductCategory::Fitness),
            1.25
        );
        assert_eq!(
            cfg.extrapolation_multiplier(TestPhase::MicroTest, ProductCategory::Finance),
            1.08
        );
        assert_eq!(
            cfg.extrapolation_multiplier(TestPhase::ScaleTest, ProductCategory::Finance),
            1.0
        );
    }

    #[test]
    fn extreme_multiplier_is_clipped() {
        let mut cfg = ScorerConfig::default();
        cfg.extrapolation.insert(
            TestPhase::MicroTest,
            PhaseMultipliers {
                default: Some(50.0),
                categories: BTreeMap::new(),
            },
        );
        let s = SignalScorer::new(cfg).expect("valid");
        let out = s
            .analyze(
                &sample(500, 20, 18, 6, 6.5, 2),
                &creative(ProductCategory::Generic, TestPhase::MicroTest),
            )
            .expect("classify");
        assert_eq!(out.predicted_final_cvr, 1.0);
    }
}
