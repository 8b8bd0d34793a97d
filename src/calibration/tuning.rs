// Feedback-driven calibration auto-tuning.
//
// Human reviewers record whether they agreed with a classification. When a
// provider keeps getting overruled, its raw scores are systematically off
// in one direction, and we shift its offset to compensate:
//
//   avg > 0.5  → over-flagging  → offset = -(avg - 0.5) * 0.5
//   avg < 0.3  → under-flagging → offset =  (0.3 - avg) * 0.5
//
// Only "disagree" groups with at least MIN_SAMPLES rows are considered, and
// offsets of magnitude ≤ 0.01 are dropped as noise. The breakpoints are a
// simple linear heuristic, not a fitted model. Scale is always reset to 1.0
// on the entries this touches.
//
// Tuning is pull-based: something outside the orchestrator (a cron job, the
// `tune` CLI command) decides when to run it.

use serde::Serialize;
use tracing::info;

use super::{CalibrationParams, Calibrator};
use crate::categories::Category;
use crate::db::models::{FeedbackGroup, ReviewOutcome};

/// Minimum reviewed samples before a group can move calibration.
pub const MIN_SAMPLES: u32 = 10;

const OVER_FLAG_ABOVE: f64 = 0.5;
const UNDER_FLAG_BELOW: f64 = 0.3;
const STEP: f64 = 0.5;
const NOISE_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Drift {
    OverFlagging,
    UnderFlagging,
}

/// One offset change derived from reviewer feedback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationAdjustment {
    pub provider: String,
    pub category: Category,
    pub drift: Drift,
    pub average_score: f64,
    pub samples: u32,
    pub offset: f64,
}

/// Derive offset adjustments from aggregated feedback.
pub fn compute_adjustments(groups: &[FeedbackGroup]) -> Vec<CalibrationAdjustment> {
    let mut adjustments = Vec::new();

    for group in groups {
        if group.outcome != ReviewOutcome::Disagree || group.sample_count < MIN_SAMPLES {
            continue;
        }

        for (&category, &avg) in &group.average_scores {
            let (drift, offset) = if avg > OVER_FLAG_ABOVE {
                (Drift::OverFlagging, -(avg - OVER_FLAG_ABOVE) * STEP)
            } else if avg < UNDER_FLAG_BELOW {
                (Drift::UnderFlagging, (UNDER_FLAG_BELOW - avg) * STEP)
            } else {
                continue;
            };

            if offset.abs() <= NOISE_FLOOR {
                continue;
            }

            adjustments.push(CalibrationAdjustment {
                provider: group.provider.clone(),
                category,
                drift,
                average_score: avg,
                samples: group.sample_count,
                offset,
            });
        }
    }

    adjustments
}

/// Write adjustments into a calibrator, replacing each touched entry.
pub fn apply_adjustments(calibrator: &mut Calibrator, adjustments: &[CalibrationAdjustment]) {
    for adj in adjustments {
        calibrator.set(
            &adj.provider,
            adj.category,
            CalibrationParams {
                offset: adj.offset,
                scale: 1.0,
            },
        );
        info!(
            provider = %adj.provider,
            category = %adj.category,
            drift = ?adj.drift,
            average_score = adj.average_score,
            samples = adj.samples,
            offset = adj.offset,
            "Calibration offset updated from feedback"
        );
    }
}

impl Calibrator {
    /// Compute and apply auto-tuning adjustments in one step.
    pub fn apply_feedback(&mut self, groups: &[FeedbackGroup]) -> Vec<CalibrationAdjustment> {
        let adjustments = compute_adjustments(groups);
        apply_adjustments(self, &adjustments);
        adjustments
    }
}
