// Classification orchestrator: routes text to providers and normalizes
// their answers.
//
// The orchestrator owns every piece of shared mutable state: the provider
// registry, one circuit breaker per provider, the calibrator, provider
// routing config, and the ensemble config. All of it sits behind a single
// tokio RwLock. Classification takes the read side (and holds it across the
// provider calls), so requests never block each other; registration and the
// setters take the write side and wait for in-flight requests to drain.
//
// Three ways to classify:
//   classify                failover chain in priority order, through breakers
//   classify_ensemble       every provider at once, fused (breakers bypassed)
//   classify_with_provider  one named provider, no breaker, no failover
//
// Cancellation is drop-based: dropping the future returned by any of these
// drops the in-flight provider calls with it. Nothing is spawned, so
// nothing outlives the request.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::calibration::tuning::{self, CalibrationAdjustment};
use crate::calibration::Calibrator;
use crate::categories::CategoryScores;
use crate::db::FeedbackSource;
use crate::ensemble::{self, EnsembleConfig, EnsembleResult, ProviderFailure};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::provider::Provider;

/// Routing configuration for one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    /// Lower is tried first
    pub priority: i32,
    /// Reserved for weighted selection among equal priorities; not used
    /// for ordering today
    pub weight: u32,
    pub enabled: bool,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, priority: i32) -> Self {
        Self {
            name: name.into(),
            priority,
            weight: 1,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Orchestrator-wide behavior switches.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSettings {
    /// Try the next provider when one fails (default true)
    pub fallback_enabled: bool,
    /// Per-provider call deadline; a timeout counts as a provider failure
    pub provider_timeout: Option<Duration>,
    /// Thresholds for breakers created at registration
    pub breaker: BreakerConfig,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            fallback_enabled: true,
            provider_timeout: None,
            breaker: BreakerConfig::default(),
        }
    }
}

/// The outcome of one successful classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    /// Calibrated scores
    pub scores: CategoryScores,
    pub provider_name: String,
    pub model_name: String,
    pub model_version: String,
    /// The language hint the request was routed with, if any
    pub detected_language: Option<String>,
    pub latency_ms: u64,
}

/// A registered provider paired with its breaker.
#[derive(Clone)]
struct Entry {
    provider: Arc<dyn Provider>,
    breaker: Arc<CircuitBreaker>,
}

struct Registry {
    /// Registration order
    providers: Vec<Entry>,
    configs: Vec<ProviderConfig>,
    calibrator: Calibrator,
    ensemble: Option<EnsembleConfig>,
    settings: OrchestratorSettings,
}

pub struct Orchestrator {
    state: RwLock<Registry>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(Vec::new(), OrchestratorSettings::default())
    }
}

impl Orchestrator {
    pub fn new(configs: Vec<ProviderConfig>, settings: OrchestratorSettings) -> Self {
        Self {
            state: RwLock::new(Registry {
                providers: Vec::new(),
                configs,
                calibrator: Calibrator::new(),
                ensemble: None,
                settings,
            }),
        }
    }

    // --- Registration and configuration (exclusive lock) ---

    /// Add a provider with a fresh circuit breaker. Re-registering a name
    /// replaces the old provider and resets its breaker.
    pub async fn register_provider(&self, provider: Arc<dyn Provider>) {
        let mut reg = self.state.write().await;
        let name = provider.name().to_string();
        let model = provider.model_info();
        let language_aware = provider.as_language_aware().is_some();
        let breaker = Arc::new(CircuitBreaker::new(&name, reg.settings.breaker));
        let entry = Entry { provider, breaker };

        match reg.providers.iter().position(|e| e.provider.name() == name) {
            Some(i) => reg.providers[i] = entry,
            None => reg.providers.push(entry),
        }

        info!(
            provider = %name,
            model = %model.name,
            version = %model.version,
            language_aware,
            "Registered classification provider"
        );
    }

    pub async fn set_calibrator(&self, calibrator: Calibrator) {
        self.state.write().await.calibrator = calibrator;
    }

    pub async fn set_ensemble_config(&self, config: EnsembleConfig) {
        self.state.write().await.ensemble = Some(config);
    }

    /// Replace the routing configuration wholesale.
    pub async fn set_provider_configs(&self, configs: Vec<ProviderConfig>) {
        self.state.write().await.configs = configs;
    }

    pub async fn set_fallback_enabled(&self, enabled: bool) {
        self.state.write().await.settings.fallback_enabled = enabled;
    }

    /// Pull aggregated reviewer feedback and fold it into the calibrator.
    ///
    /// The feedback query runs before the write lock is taken, so a slow
    /// store never stalls classification.
    pub async fn auto_tune(
        &self,
        source: &dyn FeedbackSource,
        window: Duration,
    ) -> anyhow::Result<Vec<CalibrationAdjustment>> {
        let groups = source
            .feedback_aggregates(window, tuning::MIN_SAMPLES)
            .await?;
        let adjustments = tuning::compute_adjustments(&groups);
        if adjustments.is_empty() {
            debug!(groups = groups.len(), "Auto-tuning found nothing to adjust");
            return Ok(adjustments);
        }

        let mut reg = self.state.write().await;
        tuning::apply_adjustments(&mut reg.calibrator, &adjustments);
        Ok(adjustments)
    }

    // --- Introspection (shared lock) ---

    pub async fn is_ensemble_enabled(&self) -> bool {
        self.state
            .read()
            .await
            .ensemble
            .as_ref()
            .is_some_and(|c| c.enabled)
    }

    /// Snapshot of the current calibration parameters.
    pub async fn calibrator(&self) -> Calibrator {
        self.state.read().await.calibrator.clone()
    }

    /// Provider names in the order `classify` would try them.
    pub async fn ordered_providers(&self) -> Vec<String> {
        self.state
            .read()
            .await
            .ordered()
            .iter()
            .map(|e| e.provider.name().to_string())
            .collect()
    }

    /// Breaker state for every registered provider, in registration order.
    pub async fn breaker_states(&self) -> Vec<(String, BreakerState)> {
        self.state
            .read()
            .await
            .providers
            .iter()
            .map(|e| (e.provider.name().to_string(), e.breaker.state()))
            .collect()
    }

    // --- Classification (shared lock) ---

    /// Classify through the failover chain.
    pub async fn classify(&self, text: &str) -> OrchestratorResult<ClassificationResult> {
        let reg = self.state.read().await;
        reg.failover(text, None).await
    }

    /// Classify with one named provider, bypassing failover and its breaker.
    pub async fn classify_with_provider(
        &self,
        text: &str,
        name: &str,
    ) -> OrchestratorResult<ClassificationResult> {
        let reg = self.state.read().await;
        let entry = reg
            .providers
            .iter()
            .find(|e| e.provider.name() == name)
            .ok_or_else(|| OrchestratorError::ProviderNotRegistered(name.to_string()))?;

        reg.attempt(entry, text, None, false).await
    }

    /// Classify with a language hint.
    ///
    /// English (or no hint) is the plain failover chain. Otherwise only
    /// language-aware providers that list `language` are tried, in priority
    /// order; if none of them succeeds the standard chain runs instead.
    /// Either way the result is tagged with the requested language.
    pub async fn classify_with_language(
        &self,
        text: &str,
        language: &str,
    ) -> OrchestratorResult<ClassificationResult> {
        let language = language.trim();
        if language.is_empty() || language.eq_ignore_ascii_case("en") {
            return self.classify(text).await;
        }

        let reg = self.state.read().await;
        for entry in reg.ordered() {
            let supports = entry
                .provider
                .as_language_aware()
                .is_some_and(|aware| aware.supports_language(language));
            if !supports {
                continue;
            }
            match reg.attempt(&entry, text, Some(language), true).await {
                Ok(result) => return Ok(result),
                Err(err) => warn!(
                    provider = %entry.provider.name(),
                    language,
                    error = %err,
                    "Language-aware provider failed"
                ),
            }
        }

        debug!(language, "No language-aware provider succeeded, using standard chain");
        let mut result = reg.failover(text, None).await?;
        result.detected_language = Some(language.to_string());
        Ok(result)
    }

    /// Classify with every ordered provider concurrently and fuse the results.
    ///
    /// Breakers are bypassed so each provider's live opinion is sampled.
    /// All calls are awaited before fusion, even once enough have succeeded.
    pub async fn classify_ensemble(&self, text: &str) -> OrchestratorResult<EnsembleResult> {
        let reg = self.state.read().await;
        let config = reg
            .ensemble
            .as_ref()
            .ok_or(OrchestratorError::EnsembleNotConfigured)?;
        if !config.enabled {
            return Err(OrchestratorError::EnsembleDisabled);
        }

        // A zero minimum would let an all-failed ensemble through.
        let required = config.min_providers.max(1);
        let ordered = reg.ordered();
        if ordered.len() < required {
            return Err(OrchestratorError::NotEnoughEnsembleProviders {
                required,
                available: ordered.len(),
            });
        }

        let calls = ordered.iter().map(|entry| {
            let reg = &*reg;
            async move { (entry, reg.attempt(entry, text, None, false).await) }
        });
        let outcomes = join_all(calls).await;

        let mut results = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (entry, outcome) in outcomes {
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!(
                        provider = %entry.provider.name(),
                        error = %err,
                        "Ensemble provider failed"
                    );
                    failures.push(ProviderFailure {
                        provider: entry.provider.name().to_string(),
                        error: err.to_string(),
                    });
                }
            }
        }

        if results.len() < required {
            return Err(OrchestratorError::InsufficientProviders {
                required,
                succeeded: results.len(),
            });
        }

        let fused = ensemble::combine(results, failures, config);
        if fused.disagreement {
            info!(
                categories = ?fused.disagreed_categories,
                providers = fused.results.len(),
                "Ensemble providers disagree"
            );
        }
        Ok(fused)
    }

    /// Probe every provider's health. Breakers are bypassed; a health
    /// check has to reach the real endpoint to mean anything.
    pub async fn health_check(&self) -> BTreeMap<String, anyhow::Result<()>> {
        let reg = self.state.read().await;
        let probes = reg.providers.iter().map(|entry| {
            let reg = &*reg;
            async move {
                let name = entry.provider.name().to_string();
                let outcome = reg.with_timeout(entry.provider.health()).await;
                (name, outcome)
            }
        });
        join_all(probes).await.into_iter().collect()
    }
}

impl Registry {
    /// Enabled providers in try order: configured ones by ascending
    /// priority (ties keep config order), then registered providers with no
    /// config at all, in registration order.
    fn ordered(&self) -> Vec<Entry> {
        let by_name: HashMap<&str, &Entry> = self
            .providers
            .iter()
            .map(|e| (e.provider.name(), e))
            .collect();

        let mut configured: Vec<&ProviderConfig> = self
            .configs
            .iter()
            .filter(|c| c.enabled && by_name.contains_key(c.name.as_str()))
            .collect();
        // Stable, so equal priorities stay in config order
        configured.sort_by_key(|c| c.priority);

        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        for config in configured {
            if seen.insert(config.name.as_str()) {
                ordered.push(Entry::clone(by_name[config.name.as_str()]));
            }
        }

        let mentioned: HashSet<&str> = self.configs.iter().map(|c| c.name.as_str()).collect();
        for entry in &self.providers {
            if !mentioned.contains(entry.provider.name()) {
                ordered.push(entry.clone());
            }
        }

        ordered
    }

    /// Try providers in order until one succeeds.
    async fn failover(
        &self,
        text: &str,
        language: Option<&str>,
    ) -> OrchestratorResult<ClassificationResult> {
        let ordered = self.ordered();
        if ordered.is_empty() {
            return Err(OrchestratorError::NoProviders);
        }

        let mut last_error = None;
        for entry in &ordered {
            match self.attempt(entry, text, language, true).await {
                Ok(result) => return Ok(result),
                Err(err) => {
                    warn!(
                        provider = %entry.provider.name(),
                        error = %err,
                        fallback = self.settings.fallback_enabled,
                        "Provider classification failed"
                    );
                    if !self.settings.fallback_enabled {
                        return Err(err);
                    }
                    last_error = Some(err);
                }
            }
        }

        Err(match last_error {
            Some(last) => OrchestratorError::AllProvidersExhausted {
                last: Box::new(last),
            },
            None => OrchestratorError::NoProviders,
        })
    }

    /// One provider call: optionally through its breaker, bounded by the
    /// provider timeout, calibrated on success.
    async fn attempt(
        &self,
        entry: &Entry,
        text: &str,
        language: Option<&str>,
        use_breaker: bool,
    ) -> OrchestratorResult<ClassificationResult> {
        let provider = entry.provider.as_ref();
        let name = provider.name();
        let started = Instant::now();

        let call = || self.with_timeout(invoke(provider, text, language));
        let outcome = if use_breaker {
            entry.breaker.call(call).await
        } else {
            call().await
        };
        let raw = outcome.map_err(|err| OrchestratorError::provider_failed(name, err))?;

        let model = provider.model_info();
        Ok(ClassificationResult {
            scores: self.calibrator.calibrate(name, &raw),
            provider_name: name.to_string(),
            model_name: model.name,
            model_version: model.version,
            detected_language: language.map(str::to_string),
            latency_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn with_timeout<T>(
        &self,
        call: impl std::future::Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        match self.settings.provider_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| anyhow!("timed out after {}ms", limit.as_millis()))?,
            None => call.await,
        }
    }
}

async fn invoke(
    provider: &dyn Provider,
    text: &str,
    language: Option<&str>,
) -> anyhow::Result<CategoryScores> {
    match (language, provider.as_language_aware()) {
        (Some(lang), Some(aware)) => aware.classify_with_language(text, lang).await,
        _ => provider.classify(text).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ModelInfo;
    use async_trait::async_trait;

    struct Fixed(&'static str, f64);

    #[async_trait]
    impl Provider for Fixed {
        fn name(&self) -> &str {
            self.0
        }
        fn model_info(&self) -> ModelInfo {
            ModelInfo::new("fixed", "1")
        }
        async fn classify(&self, _text: &str) -> anyhow::Result<CategoryScores> {
            Ok(CategoryScores {
                toxicity: self.1,
                ..Default::default()
            })
        }
        async fn health(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    async fn orchestrator_with(
        configs: Vec<ProviderConfig>,
        names: &[&'static str],
    ) -> Orchestrator {
        let orch = Orchestrator::new(configs, OrchestratorSettings::default());
        for name in names {
            orch.register_provider(Arc::new(Fixed(*name, 0.5))).await;
        }
        orch
    }

    #[tokio::test]
    async fn ordering_sorts_by_priority_then_config_order() {
        let orch = orchestrator_with(
            vec![
                ProviderConfig::new("c", 2),
                ProviderConfig::new("a", 1),
                ProviderConfig::new("b", 2),
            ],
            &["a", "b", "c"],
        )
        .await;
        assert_eq!(orch.ordered_providers().await, vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn disabled_and_unregistered_configs_are_skipped() {
        let orch = orchestrator_with(
            vec![
                ProviderConfig::new("a", 1).disabled(),
                ProviderConfig::new("ghost", 0),
                ProviderConfig::new("b", 5),
            ],
            &["a", "b"],
        )
        .await;
        assert_eq!(orch.ordered_providers().await, vec!["b"]);
    }

    #[tokio::test]
    async fn unconfigured_providers_go_last_in_registration_order() {
        let orch = orchestrator_with(vec![ProviderConfig::new("b", 9)], &["z", "b", "y"]).await;
        assert_eq!(orch.ordered_providers().await, vec!["b", "z", "y"]);
    }

    #[tokio::test]
    async fn reregistering_replaces_without_duplicating() {
        let orch = orchestrator_with(vec![], &["a", "a"]).await;
        assert_eq!(orch.ordered_providers().await, vec!["a"]);
        assert_eq!(orch.breaker_states().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_registry_reports_no_providers() {
        let orch = Orchestrator::default();
        let err = orch.classify("hi").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::NoProviders));
    }

    #[tokio::test]
    async fn ensemble_enabled_flag_follows_config() {
        let orch = Orchestrator::default();
        assert!(!orch.is_ensemble_enabled().await);
        orch.set_ensemble_config(EnsembleConfig {
            enabled: true,
            ..Default::default()
        })
        .await;
        assert!(orch.is_ensemble_enabled().await);
    }
}
