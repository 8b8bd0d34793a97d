// Colored terminal output for classification results.
//
// This module handles all terminal-specific formatting: colors, tables,
// score bars. The main.rs command handlers delegate here.

use std::collections::BTreeMap;

use colored::Colorize;

use crate::breaker::BreakerState;
use crate::calibration::tuning::{CalibrationAdjustment, Drift};
use crate::categories::{Category, CategoryScores};
use crate::ensemble::EnsembleResult;
use crate::orchestrator::ClassificationResult;

/// Display a single-provider classification result.
pub fn display_result(text: &str, result: &ClassificationResult) {
    println!(
        "\n{}",
        format!("=== Classification by {} ===", result.provider_name).bold()
    );
    println!("  Text: {}", super::truncate_chars(text, 100).dimmed());
    println!(
        "  Model: {} v{}  ({} ms)",
        result.model_name, result.model_version, result.latency_ms
    );
    if let Some(lang) = &result.detected_language {
        println!("  Language: {lang}");
    }
    println!();
    display_scores(&result.scores);
}

/// Display a fused ensemble result with per-category agreement.
pub fn display_ensemble(text: &str, result: &EnsembleResult) {
    let providers: Vec<&str> = result
        .results
        .iter()
        .map(|r| r.provider_name.as_str())
        .collect();

    println!(
        "\n{}",
        format!(
            "=== Ensemble ({}, {} providers) ===",
            result.strategy,
            providers.len()
        )
        .bold()
    );
    println!("  Text: {}", super::truncate_chars(text, 100).dimmed());
    println!("  Providers: {}", providers.join(", "));
    println!();

    println!(
        "  {:<16} {:>6}  {:>9}  {}",
        "Category".dimmed(),
        "Score".dimmed(),
        "Agreement".dimmed(),
        "Per provider".dimmed(),
    );
    println!("  {}", "-".repeat(70).dimmed());

    for category in Category::ALL {
        let score = result.combined_scores.get(category);
        let agreement = result.agreement.get(&category).copied().unwrap_or(1.0);
        let per_provider: Vec<String> = result
            .results
            .iter()
            .map(|r| format!("{:.2}", r.scores.get(category)))
            .collect();
        let marker = if result.disagreed_categories.contains(&category) {
            " !".red().bold().to_string()
        } else {
            String::new()
        };
        println!(
            "  {:<16} {}  {:>9.2}  {}{}",
            category.as_str(),
            colorize_score(score),
            agreement,
            per_provider.join(" / ").dimmed(),
            marker,
        );
    }

    println!();
    if result.disagreement {
        let names: Vec<&str> = result
            .disagreed_categories
            .iter()
            .map(|c| c.as_str())
            .collect();
        println!(
            "  {} providers disagree on: {}",
            "!!".red().bold(),
            names.join(", ")
        );
    } else {
        println!("  {} providers agree", "ok".green());
    }

    for failure in &result.failures {
        println!(
            "  {} {} failed: {}",
            "~".yellow(),
            failure.provider,
            failure.error.dimmed()
        );
    }
}

/// Display the category score table.
pub fn display_scores(scores: &CategoryScores) {
    for (category, score) in scores.iter() {
        println!(
            "  {:<16} {}  {}",
            category.as_str(),
            colorize_score(score),
            score_bar(score)
        );
    }

    let (top, value) = scores.max_category();
    println!("\n  Highest risk: {} ({:.2})", top.as_str().bold(), value);
}

/// Display provider health alongside breaker state.
pub fn display_health(
    health: &BTreeMap<String, anyhow::Result<()>>,
    breakers: &[(String, BreakerState)],
) {
    println!("\n{}", "=== Provider Health ===".bold());
    if health.is_empty() {
        println!("  No providers registered. Check TRIBUNAL_PROVIDERS in your .env file.");
        return;
    }

    for (name, outcome) in health {
        let breaker = breakers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| colorize_breaker(*s))
            .unwrap_or_else(|| "?".dimmed());
        match outcome {
            Ok(()) => println!("  {:<20} {}  breaker: {}", name, "healthy".green(), breaker),
            Err(err) => println!(
                "  {:<20} {}  breaker: {}\n    {}",
                name,
                "unhealthy".red().bold(),
                breaker,
                format!("{err:#}").dimmed()
            ),
        }
    }
}

/// Display calibration changes made by auto-tuning.
pub fn display_adjustments(adjustments: &[CalibrationAdjustment]) {
    if adjustments.is_empty() {
        println!("No calibration changes: no provider is drifting beyond the noise floor.");
        return;
    }

    println!(
        "\n{}",
        format!("=== Calibration Adjustments ({}) ===", adjustments.len()).bold()
    );
    for adj in adjustments {
        let drift = match adj.drift {
            Drift::OverFlagging => "over-flagging".yellow(),
            Drift::UnderFlagging => "under-flagging".cyan(),
        };
        println!(
            "  {:<20} {:<16} {:<15} avg {:.2} over {:>4} samples → offset {:+.3}",
            adj.provider,
            adj.category.as_str(),
            drift,
            adj.average_score,
            adj.samples,
            adj.offset
        );
    }
}

fn score_bar(score: f64) -> String {
    let filled = (score.clamp(0.0, 1.0) * 20.0).round() as usize;
    format!("{}{}", "#".repeat(filled), ".".repeat(20 - filled))
        .dimmed()
        .to_string()
}

/// Colorize a score by severity band.
fn colorize_score(score: f64) -> colored::ColoredString {
    let text = format!("{score:>6.2}");
    match score {
        s if s >= 0.8 => text.red().bold(),
        s if s >= 0.5 => text.bright_red(),
        s if s >= 0.3 => text.yellow(),
        _ => text.green(),
    }
}

fn colorize_breaker(state: BreakerState) -> colored::ColoredString {
    match state {
        BreakerState::Closed => state.as_str().green(),
        BreakerState::HalfOpen => state.as_str().yellow(),
        BreakerState::Open => state.as_str().red().bold(),
    }
}
