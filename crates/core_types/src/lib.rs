use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ProductCategory {
    LanguageLearning,
    Fitness,
    Finance,
    Education,
    Generic,
}

impl ProductCategory {
    pub const ALL: [ProductCategory; 5] = [
        ProductCategory::LanguageLearning,
        ProductCategory::Fitness,
        ProductCategory::Finance,
        ProductCategory::Education,
        ProductCategory::Generic,
    ];
}

impl FromStr for ProductCategory {
    type Err = CoreError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.to_string() == raw.trim())
            .ok_or_else(|| {
                CoreError::validation("product_category", format!("unknown category {raw:?}"))
            })
    }
}

impl fmt::Display for ProductCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::LanguageLearning => "language_learning",
            Self::Fitness => "fitness",
            Self::Finance => "finance",
            Self::Education => "education",
            Self::Generic => "generic",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum TestPhase {
    MicroTest,
    ScaleTest,
}

impl fmt::Display for TestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::MicroTest => "micro_test",
            Self::ScaleTest => "scale_test",
        };
        f.write_str(value)
    }
}

/// Categorical design attributes of a creative. These form the Markov state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CreativeAttributes {
    pub hook_type: SmolStr,
    pub emotion: SmolStr,
    pub pacing: SmolStr,
    pub creative_type: SmolStr,
    pub product_category: ProductCategory,
    pub test_phase: TestPhase,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Creative {
    pub id: String,
    pub creative_type: SmolStr,
    pub product_category: ProductCategory,
    #[serde(default)]
    pub production_cost: f64,
    pub hook_type: SmolStr,
    pub emotion: SmolStr,
    pub pacing: SmolStr,
    pub test_phase: TestPhase,
    /// Final CVR label, set by the owner of the creative once its test concluded.
    #[serde(default)]
    pub final_cvr: Option<f64>,
}

impl Creative {
    pub fn attributes(&self) -> CreativeAttributes {
        CreativeAttributes {
            hook_type: self.hook_type.clone(),
            emotion: self.emotion.clone(),
            pacing: self.pacing.clone(),
            creative_type: self.creative_type.clone(),
            product_category: self.product_category,
            test_phase: self.test_phase,
        }
    }
}

/// Raw aggregate counters for one creative inside a test window.
///
/// Counters are signed so that malformed upstream payloads can be rejected
/// with a named field instead of wrapping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EarlySignalSample {
    pub creative_id: String,
    pub impressions: i64,
    pub clicks: i64,
    pub landing_views: i64,
    pub landing_bounces: i64,
    #[serde(default)]
    pub conversions: i64,
    /// Seconds.
    pub avg_time_on_page: f64,
    /// Hours of traffic covered by this sample, if the caller tracks it.
    #[serde(default)]
    pub window_hours: Option<f64>,
    #[serde(default)]
    pub observed_at: Option<DateTime<Utc>>,
}

/// Rates derived from one sample. `None` means the denominator was zero.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DerivedRates {
    pub ctr: Option<f64>,
    pub bounce_rate: Option<f64>,
    pub cvr: Option<f64>,
    pub insufficient_data: bool,
}

impl DerivedRates {
    pub fn cvr_or_zero(&self) -> f64 {
        self.cvr.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    StrongNegative,
    Negative,
    Neutral,
    Positive,
    StrongPositive,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::StrongNegative => "strong_negative",
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
            Self::StrongPositive => "strong_positive",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Scale,
    Wait,
    Kill,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Scale => "scale",
            Self::Wait => "wait",
            Self::Kill => "kill",
        };
        f.write_str(value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum MetricRule {
    Ctr,
    BounceRate,
    TimeOnPage,
    Cvr,
}

impl MetricRule {
    pub const ALL: [MetricRule; 4] = [
        MetricRule::Ctr,
        MetricRule::BounceRate,
        MetricRule::TimeOnPage,
        MetricRule::Cvr,
    ];

    /// Bounce rate is the only metric where a lower value is the good side.
    pub fn higher_is_better(self) -> bool {
        !matches!(self, MetricRule::BounceRate)
    }
}

impl fmt::Display for MetricRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Ctr => "ctr",
            Self::BounceRate => "bounce_rate",
            Self::TimeOnPage => "time_on_page",
            Self::Cvr => "cvr",
        };
        f.write_str(value)
    }
}

/// One evaluated rule. `value` is `None` when the rule was skipped.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleOutcome {
    pub rule: MetricRule,
    pub value: Option<f64>,
    pub contribution: i32,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SignalClassification {
    pub signal: Signal,
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub predicted_final_cvr: f64,
    pub reasoning: String,
    pub next_action: String,
    pub score: i32,
    pub rules: Vec<RuleOutcome>,
    pub rates: DerivedRates,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeBucket {
    Fail,
    Neutral,
    Success,
}

impl OutcomeBucket {
    pub const COUNT: usize = 3;
    pub const ALL: [OutcomeBucket; OutcomeBucket::COUNT] =
        [OutcomeBucket::Fail, OutcomeBucket::Neutral, OutcomeBucket::Success];

    pub fn index(self) -> usize {
        match self {
            Self::Fail => 0,
            Self::Neutral => 1,
            Self::Success => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct ModelVersion(Uuid);

impl ModelVersion {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ModelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusRecord {
    #[serde(flatten)]
    pub attributes: CreativeAttributes,
    pub final_cvr: f64,
}

/// Historical creatives with a concluded test, handed to the trainer in one piece.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TrainingCorpus {
    pub records: Vec<CorpusRecord>,
}

impl TrainingCorpus {
    pub fn new(records: Vec<CorpusRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<CorpusRecord> for TrainingCorpus {
    fn from_iter<I: IntoIterator<Item = CorpusRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarkovPrediction {
    pub success_probability: f64,
    pub distribution: [f64; OutcomeBucket::COUNT],
    /// Key of the state that resolved the lookup, `*` marks dropped attributes.
    pub resolved_state: String,
    pub backoff_depth: usize,
    pub used_global_prior: bool,
    pub model_version: ModelVersion,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainReport {
    pub model_version: ModelVersion,
    pub trained_at: DateTime<Utc>,
    pub trained_state_count: usize,
    pub fallback_state_count: usize,
    pub sample_count: usize,
    pub folded_record_count: usize,
    pub cut_points: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
    #[error("insufficient data: {0}")]
    InsufficientData(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("no trained markov model is available")]
    ModelUnavailable,
    #[error("a retrain is already in flight")]
    RetrainInProgress,
}

impl CoreError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

pub trait AttributePredictor: Send + Sync {
    fn predict(&self, attributes: &CreativeAttributes) -> MarkovPrediction;
}
