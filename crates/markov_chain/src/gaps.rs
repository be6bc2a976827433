use std::collections::{BTreeMap, HashSet};

use core_types::{CoreError, CoreResult, OutcomeBucket, ProductCategory, TrainingCorpus};
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::trainer::bucket_for;
use crate::{Attribute, MarkovModel};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GapConfig {
    /// Records a single hook, emotion or pacing value needs to count as proven.
    pub min_pattern_support: usize,
    /// Share of its records a value must place in the success bucket.
    pub min_success_rate: f64,
    pub max_results: usize,
}

impl Default for GapConfig {
    fn default() -> Self {
        Self {
            min_pattern_support: 3,
            min_success_rate: 1.0 / 3.0,
            max_results: 20,
        }
    }
}

impl GapConfig {
    pub fn validate(&self) -> CoreResult<()> {
        if self.min_pattern_support == 0 || self.max_results == 0 {
            return Err(CoreError::Config(
                "gaps.min_pattern_support and gaps.max_results must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(CoreError::Config(
                "gaps.min_success_rate must lie in [0,1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// How one attribute value performs on its own across the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatternStrength {
    pub attribute: Attribute,
    pub value: SmolStr,
    pub support: usize,
    /// Share of the corpus carrying this value.
    pub frequency: f64,
    pub success_rate: f64,
}

/// A hook x emotion x pacing combination built only from proven values that
/// no record in the corpus has tried.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UntestedGap {
    pub hook_type: SmolStr,
    pub emotion: SmolStr,
    pub pacing: SmolStr,
    /// Mean success rate of the three values.
    pub gap_score: f64,
    pub support: usize,
    pub reasoning: String,
}

/// Ranks untested combinations of individually strong values, best first.
///
/// Outcomes are bucketed with `model`'s cut-points so the ranking matches the
/// model that is serving predictions. `category` narrows the corpus first.
pub fn find_untested_gaps(
    corpus: &TrainingCorpus,
    model: &MarkovModel,
    category: Option<ProductCategory>,
    cfg: &GapConfig,
) -> Vec<UntestedGap> {
    let records = corpus
        .records
        .iter()
        .filter(|r| category.map_or(true, |c| r.attributes.product_category == c))
        .collect::<Vec<_>>();
    if records.is_empty() {
        return Vec::new();
    }

    let cut_points = model.cut_points();
    let mut tallies: BTreeMap<(Attribute, SmolStr), (usize, usize)> = BTreeMap::new();
    let mut tested = HashSet::new();
    for r in &records {
        let a = &r.attributes;
        let success = bucket_for(r.final_cvr, cut_points) == OutcomeBucket::Success;
        for key in [
            (Attribute::HookType, a.hook_type.clone()),
            (Attribute::Emotion, a.emotion.clone()),
            (Attribute::Pacing, a.pacing.clone()),
        ] {
            let t = tallies.entry(key).or_insert((0, 0));
            t.0 += 1;
            t.1 += usize::from(success);
        }
        tested.insert((a.hook_type.clone(), a.emotion.clone(), a.pacing.clone()));
    }

    let total = records.len() as f64;
    let proven = |attr: Attribute| {
        tallies
            .iter()
            .filter(|((a, _), _)| *a == attr)
            .map(|((attribute, value), (support, wins))| PatternStrength {
                attribute: *attribute,
                value: value.clone(),
                support: *support,
                frequency: *support as f64 / total,
                success_rate: *wins as f64 / *support as f64,
            })
            .filter(|p| {
                p.support >= cfg.min_pattern_support && p.success_rate >= cfg.min_success_rate
            })
            .collect::<Vec<_>>()
    };
    let hooks = proven(Attribute::HookType);
    let emotions = proven(Attribute::Emotion);
    let pacings = proven(Attribute::Pacing);

    let mut gaps = Vec::new();
    for h in &hooks {
        for e in &emotions {
            for p in &pacings {
                let combo = (h.value.clone(), e.value.clone(), p.value.clone());
                if tested.contains(&combo) {
                    continue;
                }
                gaps.push(UntestedGap {
                    gap_score: (h.success_rate + e.success_rate + p.success_rate) / 3.0,
                    support: h.support + e.support + p.support,
                    reasoning: format!(
                        "{} succeeds {:.0}% alone ({} records) but is untested with {} / {}",
                        h.value,
                        h.success_rate * 100.0,
                        h.support,
                        e.value,
                        p.value
                    ),
                    hook_type: combo.0,
                    emotion: combo.1,
                    pacing: combo.2,
                });
            }
        }
    }

    gaps.sort_by(|a, b| {
        b.gap_score
            .total_cmp(&a.gap_score)
            .then(b.support.cmp(&a.support))
            .then_with(|| {
                (&a.hook_type, &a.emotion, &a.pacing).cmp(&(&b.hook_type, &b.emotion, &b.pacing))
            })
    });
    gaps.truncate(cfg.max_results);
    tracing::debug!(
        candidates = gaps.len(),
        proven_hooks = hooks.len(),
        proven_emotions = emotions.len(),
        proven_pacings = pacings.len(),
        "untested gaps ranked"
    );
    gaps
}
