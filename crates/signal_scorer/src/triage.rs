use core_types::{CoreResult, Creative, EarlySignalSample, Recommendation, SignalClassification};
use serde::{Deserialize, Serialize};

use crate::SignalScorer;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageItem {
    pub sample: EarlySignalSample,
    pub creative: Creative,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageEntry {
    pub creative_id: String,
    pub classification: SignalClassification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageSummary {
    pub total: usize,
    pub winners_count: usize,
    pub potential_count: usize,
    pub losers_count: usize,
    pub kill_rate: f64,
    pub estimated_savings: f64,
    pub next_step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriageReport {
    pub winners: Vec<TriageEntry>,
    pub potential: Vec<TriageEntry>,
    pub losers: Vec<TriageEntry>,
    pub summary: TriageSummary,
}

/// Scores a batch of creatives and splits them by recommendation.
///
/// The first invalid item aborts the batch; partial reports are never returned.
pub fn triage(scorer: &SignalScorer, items: &[TriageItem]) -> CoreResult<TriageReport> {
    let mut winners = Vec::new();
    let mut potential = Vec::new();
    let mut losers = Vec::new();

    for item in items {
        let classification = scorer.analyze(&item.sample, &item.creative)?;
        let entry = TriageEntry {
            creative_id: item.creative.id.clone(),
            classification,
        };
        match entry.classification.recommendation {
            Recommendation::Scale => winners.push(entry),
            Recommendation::Wait => potential.push(entry),
            Recommendation::Kill => losers.push(entry),
        }
    }

    let total = items.len();
    let kill_rate = if total == 0 {
        0.0
    } else {
        losers.len() as f64 / total as f64
    };
    let summary = TriageSummary {
        total,
        winners_count: winners.len(),
        potential_count: potential.len(),
        losers_count: losers.len(),
        kill_rate,
        estimated_savings: losers.len() as f64 * scorer.cfg().budget_saved_per_kill,
        next_step: format!(
            "kill {} losers, keep testing {} potential, scale {} winners",
            losers.len(),
            potential.len(),
            winners.len()
        ),
    };
    tracing::info!(
        total,
        winners = summary.winners_count,
        potential = summary.potential_count,
        losers = summary.losers_count,
        "triage complete"
    );

    Ok(TriageReport {
        winners,
        potential,
        losers,
        summary,
    })
}
