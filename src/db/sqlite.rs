// SqliteFeedbackStore: rusqlite backend implementing FeedbackSource.
//
// The Connection is wrapped in tokio::sync::Mutex because Connection is !Sync.
// Trait methods lock the mutex, do synchronous rusqlite work, and return.
// The lock is never held across .await points.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use tokio::sync::Mutex;

use super::models::{FeedbackGroup, ReviewOutcome};
use super::traits::FeedbackSource;
use crate::categories::CategoryScores;

pub struct SqliteFeedbackStore {
    conn: Mutex<Connection>,
}

impl SqliteFeedbackStore {
    /// Wrap an already-opened rusqlite Connection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    pub async fn record_feedback(
        &self,
        provider: &str,
        outcome: ReviewOutcome,
        raw: &CategoryScores,
        model_version: Option<&str>,
    ) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::insert_feedback(&conn, provider, outcome, raw, model_version)
    }

    pub async fn feedback_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::queries::feedback_count(&conn)
    }

    pub async fn table_count(&self) -> Result<i64> {
        let conn = self.conn.lock().await;
        super::schema::table_count(&conn)
    }
}

/// Format the start of the window in SQLite's `datetime('now')` layout.
fn window_cutoff(window: Duration) -> String {
    let window = chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX);
    let cutoff = Utc::now()
        .checked_sub_signed(window)
        .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
    cutoff.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[async_trait]
impl FeedbackSource for SqliteFeedbackStore {
    async fn feedback_aggregates(
        &self,
        window: Duration,
        min_samples: u32,
    ) -> Result<Vec<FeedbackGroup>> {
        let cutoff = window_cutoff(window);
        let conn = self.conn.lock().await;
        super::queries::feedback_aggregates(&conn, &cutoff, min_samples)
    }
}
