// Feedback auto-tuning end to end: feedback source, orchestrator
// calibrator, and the effect on later classifications.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use common::{register_all, toxicity, ScriptedProvider};
use tribunal::calibration::tuning::Drift;
use tribunal::calibration::CalibrationParams;
use tribunal::db::models::{FeedbackGroup, ReviewOutcome};
use tribunal::db::FeedbackSource;
use tribunal::{Category, CategoryScores, Orchestrator};

/// Hands back canned groups, filtered by `min_samples` like a real store.
struct StubFeedback(Vec<FeedbackGroup>);

#[async_trait]
impl FeedbackSource for StubFeedback {
    async fn feedback_aggregates(
        &self,
        _window: Duration,
        min_samples: u32,
    ) -> Result<Vec<FeedbackGroup>> {
        Ok(self
            .0
            .iter()
            .filter(|g| g.sample_count >= min_samples)
            .cloned()
            .collect())
    }
}

struct FailingFeedback;

#[async_trait]
impl FeedbackSource for FailingFeedback {
    async fn feedback_aggregates(&self, _: Duration, _: u32) -> Result<Vec<FeedbackGroup>> {
        anyhow::bail!("feedback store unavailable")
    }
}

fn group(provider: &str, outcome: ReviewOutcome, samples: u32, avg: f64) -> FeedbackGroup {
    FeedbackGroup {
        provider: provider.to_string(),
        outcome,
        sample_count: samples,
        average_scores: BTreeMap::from([(Category::Toxicity, avg)]),
    }
}

const THIRTY_DAYS: Duration = Duration::from_secs(30 * 24 * 60 * 60);

#[tokio::test]
async fn over_flagging_provider_gets_negative_offset() {
    let orch = Orchestrator::default();
    let source = StubFeedback(vec![group("p1", ReviewOutcome::Disagree, 12, 0.8)]);

    let adjustments = orch.auto_tune(&source, THIRTY_DAYS).await.unwrap();
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].drift, Drift::OverFlagging);

    let params = orch.calibrator().await.get("p1", Category::Toxicity).unwrap();
    assert!((params.offset + 0.15).abs() < 1e-9);
    assert_eq!(params.scale, 1.0);
}

#[tokio::test]
async fn under_flagging_provider_gets_positive_offset() {
    let orch = Orchestrator::default();
    let source = StubFeedback(vec![group("p1", ReviewOutcome::Disagree, 10, 0.1)]);

    orch.auto_tune(&source, THIRTY_DAYS).await.unwrap();
    let params = orch.calibrator().await.get("p1", Category::Toxicity).unwrap();
    assert!((params.offset - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn neutral_band_and_agreeing_reviews_leave_calibration_alone() {
    let orch = Orchestrator::default();
    let source = StubFeedback(vec![
        group("p1", ReviewOutcome::Disagree, 50, 0.5),
        group("p2", ReviewOutcome::Agree, 50, 0.95),
        group("p3", ReviewOutcome::Disagree, 9, 0.95),
    ]);

    let adjustments = orch.auto_tune(&source, THIRTY_DAYS).await.unwrap();
    assert!(adjustments.is_empty());
    assert!(orch.calibrator().await.is_empty());
}

#[tokio::test]
async fn tuning_replaces_previous_scale() {
    let orch = Orchestrator::default();
    let mut calibrator = orch.calibrator().await;
    calibrator.set(
        "p1",
        Category::Toxicity,
        CalibrationParams {
            offset: 0.0,
            scale: 2.0,
        },
    );
    orch.set_calibrator(calibrator).await;

    let source = StubFeedback(vec![group("p1", ReviewOutcome::Disagree, 12, 0.8)]);
    orch.auto_tune(&source, THIRTY_DAYS).await.unwrap();

    let params = orch.calibrator().await.get("p1", Category::Toxicity).unwrap();
    assert_eq!(params.scale, 1.0);
}

#[tokio::test]
async fn tuned_offset_applies_to_later_classifications() {
    let orch = Orchestrator::default();
    register_all(&orch, vec![ScriptedProvider::ok("p1", toxicity(0.8))]).await;

    let source = StubFeedback(vec![group("p1", ReviewOutcome::Disagree, 12, 0.8)]);
    orch.auto_tune(&source, THIRTY_DAYS).await.unwrap();

    let result = orch.classify("x").await.unwrap();
    assert!((result.scores.toxicity - 0.65).abs() < 1e-9);
}

#[tokio::test]
async fn source_error_propagates_and_keeps_calibration() {
    let orch = Orchestrator::default();
    assert!(orch.auto_tune(&FailingFeedback, THIRTY_DAYS).await.is_err());
    assert!(orch.calibrator().await.is_empty());
}

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_feedback_drives_tuning() {
    use rusqlite::Connection;
    use tribunal::db::schema::create_tables;
    use tribunal::db::sqlite::SqliteFeedbackStore;

    let conn = Connection::open_in_memory().unwrap();
    create_tables(&conn).unwrap();
    let store = SqliteFeedbackStore::new(conn);

    // Every other category sits in the neutral band so only toxicity moves.
    let raw = CategoryScores::from_fn(|c| if c == Category::Toxicity { 0.8 } else { 0.4 });
    for _ in 0..12 {
        store
            .record_feedback("p1", ReviewOutcome::Disagree, &raw, Some("1.0"))
            .await
            .unwrap();
    }
    // Too few to count
    for _ in 0..3 {
        store
            .record_feedback("p2", ReviewOutcome::Disagree, &toxicity(0.9), None)
            .await
            .unwrap();
    }

    let orch = Orchestrator::default();
    let adjustments = orch.auto_tune(&store, THIRTY_DAYS).await.unwrap();

    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].provider, "p1");
    assert_eq!(adjustments[0].samples, 12);
    let params = orch.calibrator().await.get("p1", Category::Toxicity).unwrap();
    assert!((params.offset + 0.15).abs() < 1e-9);
}
