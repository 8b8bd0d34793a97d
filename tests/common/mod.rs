// Shared test doubles for the integration tests.
//
// ScriptedProvider returns fixed scores (or a fixed error), counts every
// call, and can be switched between healthy and failing mid-test. Calls
// whose future is dropped before finishing are counted as cancelled.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use tribunal::provider::{LanguageAwareProvider, ModelInfo, Provider};
use tribunal::CategoryScores;

pub struct ScriptedProvider {
    name: String,
    scores: CategoryScores,
    failing: AtomicBool,
    delay: Option<Duration>,
    languages: Option<Vec<String>>,
    calls: AtomicUsize,
    language_calls: AtomicUsize,
    health_calls: AtomicUsize,
    cancelled: AtomicUsize,
}

/// Counts a call as cancelled unless it ran to completion.
struct InFlight<'a> {
    cancelled: &'a AtomicUsize,
    finished: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl ScriptedProvider {
    pub fn ok(name: &str, scores: CategoryScores) -> Self {
        Self {
            name: name.to_string(),
            scores,
            failing: AtomicBool::new(false),
            delay: None,
            languages: None,
            calls: AtomicUsize::new(0),
            language_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        let provider = Self::ok(name, CategoryScores::default());
        provider.set_failing(true);
        provider
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_languages(mut self, languages: &[&str]) -> Self {
        self.languages = Some(languages.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Plain `classify` calls.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn language_calls(&self) -> usize {
        self.language_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.health_calls.load(Ordering::SeqCst)
    }

    /// Calls dropped mid-flight by the caller.
    pub fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.calls() + self.language_calls()
    }

    async fn respond(&self) -> Result<CategoryScores> {
        let mut in_flight = InFlight {
            cancelled: &self.cancelled,
            finished: false,
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        in_flight.finished = true;
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("{} is down", self.name);
        }
        Ok(self.scores)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new(format!("{}-model", self.name), "1.0")
    }

    async fn classify(&self, _text: &str) -> Result<CategoryScores> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await
    }

    async fn health(&self) -> Result<()> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("{} health endpoint unreachable", self.name);
        }
        Ok(())
    }

    fn as_language_aware(&self) -> Option<&dyn LanguageAwareProvider> {
        if self.languages.is_some() {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl LanguageAwareProvider for ScriptedProvider {
    async fn classify_with_language(&self, _text: &str, _language: &str) -> Result<CategoryScores> {
        self.language_calls.fetch_add(1, Ordering::SeqCst);
        self.respond().await
    }

    fn supported_languages(&self) -> Vec<String> {
        self.languages.clone().unwrap_or_default()
    }
}

pub fn toxicity(value: f64) -> CategoryScores {
    CategoryScores {
        toxicity: value,
        ..Default::default()
    }
}

/// Register providers in order; returns them for call-count assertions.
pub async fn register_all(
    orchestrator: &tribunal::Orchestrator,
    providers: Vec<ScriptedProvider>,
) -> Vec<Arc<ScriptedProvider>> {
    let mut handles = Vec::new();
    for provider in providers {
        let provider = Arc::new(provider);
        orchestrator.register_provider(provider.clone()).await;
        handles.push(provider);
    }
    handles
}
