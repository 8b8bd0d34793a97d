// Database schema: table creation and migrations.
//
// We use a simple version-based migration approach: a `schema_version` table
// tracks which migrations have run, and each migration is a function that
// executes SQL statements.

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Create all tables if they don't exist yet.
///
/// This is idempotent, safe to call on every startup.
pub fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        -- Tracks schema version for future migrations
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Reviewer verdicts on individual classifications.
        -- Scores are the provider's raw output, before calibration, so
        -- auto-tuning measures the provider and not our own correction.
        CREATE TABLE IF NOT EXISTS classification_feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider TEXT NOT NULL,
            outcome TEXT NOT NULL,             -- 'agree' or 'disagree'
            toxicity REAL NOT NULL DEFAULT 0,
            hate REAL NOT NULL DEFAULT 0,
            harassment REAL NOT NULL DEFAULT 0,
            sexual_content REAL NOT NULL DEFAULT 0,
            violence REAL NOT NULL DEFAULT 0,
            profanity REAL NOT NULL DEFAULT 0,
            self_harm REAL NOT NULL DEFAULT 0,
            spam REAL NOT NULL DEFAULT 0,
            pii REAL NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- The aggregate query filters on time and groups on provider/outcome
        CREATE INDEX IF NOT EXISTS idx_feedback_window
            ON classification_feedback(created_at, provider, outcome);
        ",
    )
    .context("Failed to create database tables")?;

    // Record initial schema version if not already set
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [1],
    )?;

    // Migration v2: remember which model version produced the scores, so a
    // model upgrade can be told apart from calibration drift.
    run_migration(conn, 2, |c| {
        c.execute_batch("ALTER TABLE classification_feedback ADD COLUMN model_version TEXT;")
    })?;

    Ok(())
}

/// Run a migration if it hasn't been applied yet.
/// The migration function receives the connection and should execute its SQL.
fn run_migration<F>(conn: &Connection, version: i64, migrate: F) -> Result<()>
where
    F: FnOnce(&Connection) -> rusqlite::Result<()>,
{
    let already_applied: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM schema_version WHERE version = ?1",
        [version],
        |row| row.get(0),
    )?;

    if !already_applied {
        migrate(conn).with_context(|| format!("Migration v{version} failed"))?;
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [version],
        )?;
    }

    Ok(())
}

/// Count the number of tables in the database (useful for init confirmation).
pub fn table_count(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}
