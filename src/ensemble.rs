// Ensemble score fusion and agreement detection.
//
// In ensemble mode every enabled provider classifies the same text and their
// calibrated scores are combined per category:
//
//   average  arithmetic mean
//   median   middle value (mean of the two middle values for even counts)
//   max      the most alarmed provider wins
//
// Independently of the fused value, each category gets an agreement score
// from the spread between the highest and lowest provider:
//
//   agreement = clamp(1 - spread / threshold, 0, 1)
//
// and is flagged as a disagreement when spread > threshold. Governance logic
// uses the flag to escalate cases where providers meaningfully differ.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::categories::{Category, CategoryScores};
use crate::orchestrator::ClassificationResult;

/// How to combine per-provider values for one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FusionStrategy {
    #[default]
    Average,
    Median,
    Max,
}

impl FusionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FusionStrategy::Average => "average",
            FusionStrategy::Median => "median",
            FusionStrategy::Max => "max",
        }
    }
}

impl fmt::Display for FusionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FusionStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "average" | "mean" => Ok(FusionStrategy::Average),
            "median" => Ok(FusionStrategy::Median),
            "max" => Ok(FusionStrategy::Max),
            other => {
                anyhow::bail!("unknown fusion strategy: {other} (expected average, median, or max)")
            }
        }
    }
}

/// Ensemble mode settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    pub enabled: bool,
    /// Fewer successful providers than this fails the request
    pub min_providers: usize,
    /// Spread above which a category counts as a disagreement
    pub agreement_threshold: f64,
    pub strategy: FusionStrategy,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            min_providers: 2,
            agreement_threshold: 0.3,
            strategy: FusionStrategy::Average,
        }
    }
}

/// A provider that didn't contribute to the ensemble, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub error: String,
}

/// Combined output of one ensemble classification.
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleResult {
    pub combined_scores: CategoryScores,
    /// Successful per-provider results, in provider priority order
    pub results: Vec<ClassificationResult>,
    pub failures: Vec<ProviderFailure>,
    pub agreement: BTreeMap<Category, f64>,
    pub disagreement: bool,
    /// Sorted by category name
    pub disagreed_categories: Vec<Category>,
    pub strategy: FusionStrategy,
}

/// Combine values with `strategy`. An empty slice fuses to 0.0.
pub fn fuse(values: &[f64], strategy: FusionStrategy) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    match strategy {
        FusionStrategy::Average => values.iter().sum::<f64>() / values.len() as f64,
        FusionStrategy::Median => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let mid = sorted.len() / 2;
            if sorted.len() % 2 == 0 {
                (sorted[mid - 1] + sorted[mid]) / 2.0
            } else {
                sorted[mid]
            }
        }
        FusionStrategy::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
    }
}

/// Agreement score and disagreement flag for one category's values.
pub fn agreement(values: &[f64], threshold: f64) -> (f64, bool) {
    if values.len() < 2 {
        return (1.0, false);
    }
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let spread = max - min;

    let score = if threshold > 0.0 {
        (1.0 - spread / threshold).clamp(0.0, 1.0)
    } else if spread == 0.0 {
        1.0
    } else {
        0.0
    };
    (score, spread > threshold)
}

/// Fuse successful per-provider results into an [`EnsembleResult`].
pub fn combine(
    results: Vec<ClassificationResult>,
    failures: Vec<ProviderFailure>,
    config: &EnsembleConfig,
) -> EnsembleResult {
    let mut combined_scores = CategoryScores::default();
    let mut agreement_scores = BTreeMap::new();
    let mut disagreed_categories = Vec::new();

    for category in Category::ALL {
        let values: Vec<f64> = results.iter().map(|r| r.scores.get(category)).collect();
        combined_scores.set(category, fuse(&values, config.strategy));

        let (score, disagrees) = agreement(&values, config.agreement_threshold);
        agreement_scores.insert(category, score);
        if disagrees {
            disagreed_categories.push(category);
        }
    }
    disagreed_categories.sort_by_key(|c| c.as_str());

    EnsembleResult {
        combined_scores,
        results,
        failures,
        agreement: agreement_scores,
        disagreement: !disagreed_categories.is_empty(),
        disagreed_categories,
        strategy: config.strategy,
    }
}
