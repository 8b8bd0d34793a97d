// Database queries: all SQL for the feedback store lives here.
//
// Every database interaction goes through this module. This keeps SQL
// contained in one place and gives the rest of the app clean Rust interfaces.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::{params, Connection};

use super::models::{FeedbackGroup, ReviewOutcome};
use crate::categories::{Category, CategoryScores};

/// Record one reviewer verdict. Returns the new row id.
pub fn insert_feedback(
    conn: &Connection,
    provider: &str,
    outcome: ReviewOutcome,
    raw: &CategoryScores,
    model_version: Option<&str>,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO classification_feedback
            (provider, outcome, toxicity, hate, harassment, sexual_content,
             violence, profanity, self_harm, spam, pii, model_version)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            provider,
            outcome.as_str(),
            raw.toxicity,
            raw.hate,
            raw.harassment,
            raw.sexual_content,
            raw.violence,
            raw.profanity,
            raw.self_harm,
            raw.spam,
            raw.pii,
            model_version,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Aggregate feedback since `cutoff` into (provider, outcome) groups with at
/// least `min_samples` rows.
pub fn feedback_aggregates(
    conn: &Connection,
    cutoff: &str,
    min_samples: u32,
) -> Result<Vec<FeedbackGroup>> {
    let mut stmt = conn.prepare(
        "SELECT provider, outcome, COUNT(*),
                AVG(toxicity), AVG(hate), AVG(harassment), AVG(sexual_content),
                AVG(violence), AVG(profanity), AVG(self_harm), AVG(spam), AVG(pii)
         FROM classification_feedback
         WHERE created_at >= ?1
         GROUP BY provider, outcome
         HAVING COUNT(*) >= ?2
         ORDER BY provider, outcome",
    )?;

    let rows = stmt.query_map(params![cutoff, min_samples], |row| {
        let provider: String = row.get(0)?;
        let outcome: String = row.get(1)?;
        let count: u32 = row.get(2)?;
        let mut averages = BTreeMap::new();
        for (i, category) in Category::ALL.iter().enumerate() {
            let avg: f64 = row.get(3 + i)?;
            averages.insert(*category, avg);
        }
        Ok((provider, outcome, count, averages))
    })?;

    let mut groups = Vec::new();
    for row in rows {
        let (provider, outcome, sample_count, average_scores) = row?;
        // Rows with an unrecognized outcome label can't inform tuning.
        let Ok(outcome) = outcome.parse::<ReviewOutcome>() else {
            continue;
        };
        groups.push(FeedbackGroup {
            provider,
            outcome,
            sample_count,
            average_scores,
        });
    }
    Ok(groups)
}

/// Total number of feedback rows (for status output).
pub fn feedback_count(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM classification_feedback", [], |row| {
        row.get(0)
    })?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::create_tables;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        create_tables(&conn).unwrap();
        conn
    }

    /// Insert a row, then backdate it.
    fn insert_feedback_at(
        conn: &Connection,
        provider: &str,
        outcome: ReviewOutcome,
        raw: &CategoryScores,
        created_at: &str,
    ) -> Result<i64> {
        let id = insert_feedback(conn, provider, outcome, raw, None)?;
        conn.execute(
            "UPDATE classification_feedback SET created_at = ?1 WHERE id = ?2",
            params![created_at, id],
        )?;
        Ok(id)
    }

    fn tox(value: f64) -> CategoryScores {
        CategoryScores {
            toxicity: value,
            ..Default::default()
        }
    }

    #[test]
    fn groups_below_min_samples_are_excluded() {
        let conn = setup();
        for _ in 0..9 {
            insert_feedback(&conn, "p1", ReviewOutcome::Disagree, &tox(0.8), None).unwrap();
        }
        assert!(feedback_aggregates(&conn, "1970-01-01 00:00:00", 10)
            .unwrap()
            .is_empty());

        insert_feedback(&conn, "p1", ReviewOutcome::Disagree, &tox(0.8), None).unwrap();
        let groups = feedback_aggregates(&conn, "1970-01-01 00:00:00", 10).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].sample_count, 10);
    }

    #[test]
    fn averages_are_per_provider_and_outcome() {
        let conn = setup();
        for i in 0..12 {
            let v = if i % 2 == 0 { 0.7 } else { 0.9 };
            insert_feedback(&conn, "p1", ReviewOutcome::Disagree, &tox(v), None).unwrap();
            insert_feedback(&conn, "p1", ReviewOutcome::Agree, &tox(0.2), None).unwrap();
        }
        let groups = feedback_aggregates(&conn, "1970-01-01 00:00:00", 10).unwrap();
        assert_eq!(groups.len(), 2);

        let disagree = groups
            .iter()
            .find(|g| g.outcome == ReviewOutcome::Disagree)
            .unwrap();
        assert!((disagree.average_scores[&Category::Toxicity] - 0.8).abs() < 1e-9);
        assert!((disagree.average_scores[&Category::Hate]).abs() < 1e-9);
    }

    #[test]
    fn rows_before_cutoff_are_ignored() {
        let conn = setup();
        for _ in 0..10 {
            let old = "2020-01-01 00:00:00";
            insert_feedback_at(&conn, "p1", ReviewOutcome::Disagree, &tox(0.8), old).unwrap();
        }
        assert!(feedback_aggregates(&conn, "2024-01-01 00:00:00", 10)
            .unwrap()
            .is_empty());
        assert_eq!(feedback_count(&conn).unwrap(), 10);
    }
}
