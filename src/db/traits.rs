// Feedback source trait: backend-agnostic read access to reviewer feedback.
//
// Calibration auto-tuning only needs one aggregate query, so that's all the
// trait asks for. The SQLite store implements it; a deployment backed by a
// warehouse just needs another implementation.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::models::FeedbackGroup;

#[async_trait]
pub trait FeedbackSource: Send + Sync {
    /// Per (provider, outcome) groups with at least `min_samples` rows
    /// recorded within the last `window`, with average raw scores.
    async fn feedback_aggregates(
        &self,
        window: Duration,
        min_samples: u32,
    ) -> Result<Vec<FeedbackGroup>>;
}
