use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::ensemble::{EnsembleConfig, FusionStrategy};
use crate::orchestrator::{OrchestratorSettings, ProviderConfig};
use crate::provider::model_server::ModelServerProvider;
use crate::provider::perspective::PerspectiveProvider;

/// Central configuration loaded from environment variables.
///
/// All secrets come from env vars (never hardcoded). The .env file
/// is loaded automatically at startup via dotenvy.
pub struct Config {
    /// Routing for each provider, from TRIBUNAL_PROVIDERS
    pub providers: Vec<ProviderConfig>,
    pub fallback_enabled: bool,
    pub provider_timeout: Option<Duration>,
    pub ensemble: EnsembleConfig,
    pub perspective_api_key: String,
    /// Client-side request rate for Perspective (free tier is 1 QPS)
    pub perspective_qps: f64,
    /// Base URL of the self-hosted model server (optional backend)
    pub model_server_url: Option<String>,
    pub model_server_model: String,
    pub model_server_version: String,
    pub model_server_languages: Vec<String>,
    /// JSON calibration blob (provider → category → {offset, scale})
    pub calibration_path: PathBuf,
    pub db_path: String,
    /// How far back auto-tuning looks for reviewer feedback
    pub feedback_window: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Everything has a default, so `init` and `health` work on a bare
    /// checkout; provider credentials are checked when a provider is built.
    pub fn load() -> Result<Self> {
        let providers = match env::var("TRIBUNAL_PROVIDERS") {
            Ok(list) => parse_provider_list(&list)?,
            Err(_) => default_providers(),
        };

        let provider_timeout = match env::var("TRIBUNAL_PROVIDER_TIMEOUT_MS") {
            Ok(ms) => Some(Duration::from_millis(ms.parse().with_context(|| {
                format!("TRIBUNAL_PROVIDER_TIMEOUT_MS is not a number: {ms}")
            })?)),
            Err(_) => None,
        };

        let ensemble = EnsembleConfig {
            enabled: env_bool("TRIBUNAL_ENSEMBLE", false),
            min_providers: env_parse("TRIBUNAL_ENSEMBLE_MIN_PROVIDERS", 2)?,
            agreement_threshold: env_parse("TRIBUNAL_ENSEMBLE_THRESHOLD", 0.3)?,
            strategy: match env::var("TRIBUNAL_ENSEMBLE_STRATEGY") {
                Ok(s) => s.parse()?,
                Err(_) => FusionStrategy::Average,
            },
        };

        let window_days: u64 = env_parse("TRIBUNAL_FEEDBACK_WINDOW_DAYS", 30)?;

        Ok(Self {
            providers,
            fallback_enabled: env_bool("TRIBUNAL_FALLBACK", true),
            provider_timeout,
            ensemble,
            perspective_api_key: env::var("PERSPECTIVE_API_KEY").unwrap_or_default(),
            perspective_qps: env_parse("PERSPECTIVE_QPS", 1.0)?,
            model_server_url: env::var("TRIBUNAL_MODEL_SERVER_URL")
                .ok()
                .filter(|u| !u.is_empty()),
            model_server_model: env::var("TRIBUNAL_MODEL_SERVER_MODEL")
                .unwrap_or_else(|_| "moderation".to_string()),
            model_server_version: env::var("TRIBUNAL_MODEL_SERVER_VERSION")
                .unwrap_or_else(|_| "1".to_string()),
            model_server_languages: env::var("TRIBUNAL_MODEL_SERVER_LANGUAGES")
                .map(|s| split_list(&s))
                .unwrap_or_else(|_| vec!["en".to_string()]),
            calibration_path: env::var("TRIBUNAL_CALIBRATION_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./calibration.json")),
            db_path: env::var("TRIBUNAL_DB_PATH").unwrap_or_else(|_| "./tribunal.db".to_string()),
            feedback_window: days(window_days),
        })
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            fallback_enabled: self.fallback_enabled,
            provider_timeout: self.provider_timeout,
            ..Default::default()
        }
    }

    /// Check that the Perspective API key is configured.
    /// Call this before building the Perspective provider.
    pub fn require_perspective(&self) -> Result<()> {
        if self.perspective_api_key.is_empty() {
            anyhow::bail!(
                "PERSPECTIVE_API_KEY not set. Add it to your .env file,\n\
                 or remove `perspective` from TRIBUNAL_PROVIDERS."
            );
        }
        Ok(())
    }

    /// Check that the model server URL is configured.
    pub fn require_model_server(&self) -> Result<&str> {
        self.model_server_url.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "TRIBUNAL_MODEL_SERVER_URL not set. Add it to your .env file,\n\
                 or remove `{}` from TRIBUNAL_PROVIDERS.",
                ModelServerProvider::DEFAULT_NAME
            )
        })
    }
}

/// A window of `n` days. Absurd values saturate instead of overflowing;
/// the feedback query clamps the cutoff to the earliest timestamp anyway.
pub fn days(n: u64) -> Duration {
    Duration::from_secs(n.saturating_mul(24 * 60 * 60))
}

fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig::new(PerspectiveProvider::NAME, 1),
        ProviderConfig::new(ModelServerProvider::DEFAULT_NAME, 2),
    ]
}

/// Parse `name[:priority[:weight]]` entries separated by commas.
/// A leading `!` marks the provider disabled. Entries without an explicit
/// priority get their position in the list.
pub fn parse_provider_list(list: &str) -> Result<Vec<ProviderConfig>> {
    let mut configs = Vec::new();
    for (position, entry) in list.split(',').map(str::trim).filter(|e| !e.is_empty()).enumerate() {
        let (enabled, entry) = match entry.strip_prefix('!') {
            Some(rest) => (false, rest),
            None => (true, entry),
        };
        let mut parts = entry.split(':').map(str::trim);
        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            anyhow::bail!("TRIBUNAL_PROVIDERS entry has no name: {entry:?}");
        }
        let priority = match parts.next() {
            Some(p) => p
                .parse()
                .with_context(|| format!("Invalid priority for provider {name}: {p}"))?,
            None => position as i32,
        };
        let weight = match parts.next() {
            Some(w) => w
                .parse()
                .with_context(|| format!("Invalid weight for provider {name}: {w}"))?,
            None => 1,
        };
        configs.push(ProviderConfig {
            name: name.to_string(),
            priority,
            weight,
            enabled,
        });
    }
    Ok(configs)
}

fn split_list(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_bool(key: &str, default: bool) -> bool {
    match env::var(key).as_deref() {
        Ok("1" | "true" | "yes" | "on") => true,
        Ok("0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key} has invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_list_parses_priority_weight_and_disable() {
        let configs = parse_provider_list("perspective:1:3, !model-server:2 ,backup").unwrap();
        assert_eq!(configs.len(), 3);
        assert_eq!(
            configs[0],
            ProviderConfig {
                name: "perspective".into(),
                priority: 1,
                weight: 3,
                enabled: true
            }
        );
        assert!(!configs[1].enabled);
        assert_eq!(configs[1].priority, 2);
        assert_eq!(configs[2].priority, 2); // positional default
        assert_eq!(configs[2].weight, 1);
    }

    #[test]
    fn provider_list_rejects_garbage_priority() {
        assert!(parse_provider_list("perspective:first").is_err());
        assert!(parse_provider_list(":1").is_err());
    }

    #[test]
    fn empty_provider_list_is_empty() {
        assert!(parse_provider_list(" , ").unwrap().is_empty());
    }

    #[test]
    fn day_windows_saturate_instead_of_overflowing() {
        assert_eq!(days(30), Duration::from_secs(30 * 86_400));
        assert_eq!(days(300_000_000_000_000), Duration::from_secs(u64::MAX));
        assert_eq!(days(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn split_list_trims_and_drops_blanks() {
        assert_eq!(split_list("en, fr,,de "), vec!["en", "fr", "de"]);
    }
}
