// Data models: Rust structs for reviewer feedback.
//
// These are separate from the queries so the calibration code can use them
// without depending on rusqlite directly.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::categories::Category;

/// What a human reviewer concluded about a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    /// The reviewer upheld the provider's scores
    Agree,
    /// The reviewer overruled the provider's scores
    Disagree,
}

impl ReviewOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewOutcome::Agree => "agree",
            ReviewOutcome::Disagree => "disagree",
        }
    }
}

impl fmt::Display for ReviewOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewOutcome {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agree" => Ok(ReviewOutcome::Agree),
            "disagree" => Ok(ReviewOutcome::Disagree),
            other => anyhow::bail!("unknown review outcome: {other}"),
        }
    }
}

/// Aggregated feedback for one (provider, outcome) pair over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackGroup {
    pub provider: String,
    pub outcome: ReviewOutcome,
    pub sample_count: u32,
    /// Mean raw score per category across the group
    pub average_scores: BTreeMap<Category, f64>,
}
