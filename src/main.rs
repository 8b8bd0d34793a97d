use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{info, warn};

use tribunal::calibration;
use tribunal::config::{days, Config};
use tribunal::orchestrator::Orchestrator;
use tribunal::output::terminal;
use tribunal::provider::model_server::{ModelServerConfig, ModelServerProvider};
use tribunal::provider::perspective::PerspectiveProvider;
use tribunal::provider::Provider;

/// Tribunal: multi-provider content classification for moderation.
///
/// Routes text to one or more ML classification services, fails over
/// between them, and normalizes their scores onto a common scale.
#[derive(Parser)]
#[command(name = "tribunal", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the feedback database
    Init,

    /// Classify text through the failover chain
    Classify {
        /// Text to classify ("-" reads from stdin)
        text: String,

        /// Use only this provider (no failover, no circuit breaker)
        #[arg(long)]
        provider: Option<String>,

        /// Language hint (ISO 639-1, e.g. fr)
        #[arg(long)]
        lang: Option<String>,
    },

    /// Classify text with every provider and fuse the results
    Ensemble {
        /// Text to classify ("-" reads from stdin)
        text: String,
    },

    /// Probe every configured provider
    Health,

    /// Re-tune calibration offsets from reviewer feedback
    Tune {
        /// Feedback window in days (default: TRIBUNAL_FEEDBACK_WINDOW_DAYS or 30)
        #[arg(long)]
        window_days: Option<u64>,

        /// Show the adjustments without writing the calibration file
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("tribunal=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Init => init(&config).await?,

        Commands::Classify {
            text,
            provider,
            lang,
        } => {
            let text = read_text(text)?;
            let orchestrator = build_orchestrator(&config).await?;

            let result = match (provider, lang) {
                (Some(name), _) => orchestrator.classify_with_provider(&text, &name).await?,
                (None, Some(lang)) => orchestrator.classify_with_language(&text, &lang).await?,
                (None, None) => orchestrator.classify(&text).await?,
            };
            terminal::display_result(&text, &result);
        }

        Commands::Ensemble { text } => {
            let text = read_text(text)?;
            let orchestrator = build_orchestrator(&config).await?;
            if !orchestrator.is_ensemble_enabled().await {
                println!(
                    "{}",
                    "Ensemble mode is off. Set TRIBUNAL_ENSEMBLE=true to enable it.".yellow()
                );
                return Ok(());
            }
            let result = orchestrator.classify_ensemble(&text).await?;
            terminal::display_ensemble(&text, &result);
        }

        Commands::Health => {
            let orchestrator = build_orchestrator(&config).await?;
            let health = orchestrator.health_check().await;
            let breakers = orchestrator.breaker_states().await;
            terminal::display_health(&health, &breakers);
        }

        Commands::Tune {
            window_days,
            dry_run,
        } => {
            let window = window_days.map(days).unwrap_or(config.feedback_window);
            tune(&config, window, dry_run).await?;
        }
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn init(config: &Config) -> Result<()> {
    info!("Initializing Tribunal feedback database...");
    let store = tribunal::db::initialize(&config.db_path)?;
    let table_count = store.table_count().await?;
    println!("Database initialized at: {}", config.db_path);
    println!("Tables created: {table_count}");
    println!("\nNext step: set up your .env file with provider credentials,");
    println!("then run: tribunal health");
    Ok(())
}

/// Pull reviewer feedback from the database and fold it into the
/// calibration file.
#[cfg(feature = "sqlite")]
async fn tune(config: &Config, window: Duration, dry_run: bool) -> Result<()> {
    use tribunal::db::FeedbackSource;

    let store = tribunal::db::open(&config.db_path)?;
    let orchestrator = Orchestrator::default();
    orchestrator
        .set_calibrator(calibration::load_file(&config.calibration_path)?)
        .await;

    println!(
        "Tuning calibration from {} feedback rows (last {} days)...",
        store.feedback_count().await?,
        window.as_secs() / 86_400
    );

    if dry_run {
        let groups = store
            .feedback_aggregates(window, calibration::tuning::MIN_SAMPLES)
            .await?;
        let adjustments = calibration::tuning::compute_adjustments(&groups);
        terminal::display_adjustments(&adjustments);
        println!("\n{}", "Dry run: calibration file not written.".dimmed());
        return Ok(());
    }

    let adjustments = orchestrator.auto_tune(&store, window).await?;
    terminal::display_adjustments(&adjustments);
    if !adjustments.is_empty() {
        calibration::save_file(&config.calibration_path, &orchestrator.calibrator().await)?;
        println!(
            "\n{} {}",
            "Calibration written to".bold(),
            config.calibration_path.display()
        );
    }
    Ok(())
}

#[cfg(not(feature = "sqlite"))]
async fn init(_config: &Config) -> Result<()> {
    anyhow::bail!("This build has no feedback database (rebuild with --features sqlite)")
}

#[cfg(not(feature = "sqlite"))]
async fn tune(_config: &Config, _window: Duration, _dry_run: bool) -> Result<()> {
    anyhow::bail!("Auto-tuning needs the feedback database (rebuild with --features sqlite)")
}

/// Build an orchestrator with every enabled provider from the config,
/// plus calibration and ensemble settings.
async fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let orchestrator = Orchestrator::new(config.providers.clone(), config.orchestrator_settings());

    for provider_config in config.providers.iter().filter(|p| p.enabled) {
        match create_provider(config, &provider_config.name) {
            Ok(Some(provider)) => orchestrator.register_provider(provider).await,
            Ok(None) => warn!(
                provider = %provider_config.name,
                "No built-in backend with this name; skipping"
            ),
            Err(err) => warn!(
                provider = %provider_config.name,
                error = %err,
                "Provider not configured; skipping"
            ),
        }
    }

    let calibrator = calibration::load_file(&config.calibration_path)?;
    if !calibrator.is_empty() {
        info!(
            path = %config.calibration_path.display(),
            providers = calibrator.providers().count(),
            "Loaded calibration"
        );
    }
    orchestrator.set_calibrator(calibrator).await;
    orchestrator.set_ensemble_config(config.ensemble.clone()).await;

    Ok(orchestrator)
}

/// Create a built-in provider by name. Unknown names return `Ok(None)`.
fn create_provider(config: &Config, name: &str) -> Result<Option<Arc<dyn Provider>>> {
    match name {
        PerspectiveProvider::NAME => {
            config.require_perspective()?;
            info!(qps = config.perspective_qps, "Using Perspective API provider");
            let provider = PerspectiveProvider::new(config.perspective_api_key.clone())
                .with_rate_limit(config.perspective_qps);
            Ok(Some(Arc::new(provider)))
        }
        ModelServerProvider::DEFAULT_NAME => {
            let base_url = config.require_model_server()?;
            info!(url = base_url, "Using model server provider");
            let provider = ModelServerProvider::new(ModelServerConfig {
                base_url: base_url.to_string(),
                model_name: config.model_server_model.clone(),
                model_version: config.model_server_version.clone(),
                languages: config.model_server_languages.clone(),
                ..Default::default()
            })?;
            Ok(Some(Arc::new(provider)))
        }
        _ => Ok(None),
    }
}

/// Resolve the text argument, reading stdin for "-".
fn read_text(arg: String) -> Result<String> {
    if arg != "-" {
        return Ok(arg);
    }
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("Failed to read text from stdin")?;
    let text = buf.trim().to_string();
    if text.is_empty() {
        anyhow::bail!("No text on stdin");
    }
    Ok(text)
}
