// Provider trait: the swap-ready abstraction over one classification backend.
//
// Every ML vendor (Perspective, a self-hosted model server, ...) is wrapped
// behind this trait. The orchestrator only ever sees `Arc<dyn Provider>`.
//
// Language-aware classification is an optional capability. Rather than force
// every provider to implement it, a provider opts in by overriding
// `as_language_aware` to return itself. The orchestrator probes that at
// runtime.

use anyhow::Result;
use async_trait::async_trait;

use crate::categories::CategoryScores;

/// Model identity reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
}

impl ModelInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

/// Trait for a text classification backend. Implementations must be async
/// because most providers require HTTP API calls, and must tolerate
/// concurrent invocation from multiple requests.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier, used as the key for configuration and calibration.
    fn name(&self) -> &str;

    /// Which model (and version) produced the scores.
    fn model_info(&self) -> ModelInfo;

    /// Score a single text across all risk categories.
    async fn classify(&self, text: &str) -> Result<CategoryScores>;

    /// Probe the real endpoint. `Ok(())` means healthy.
    async fn health(&self) -> Result<()>;

    /// Capability probe for language-hinted classification.
    /// Providers that support it return `Some(self)`.
    fn as_language_aware(&self) -> Option<&dyn LanguageAwareProvider> {
        None
    }
}

/// Optional extension for providers that accept a language hint.
#[async_trait]
pub trait LanguageAwareProvider: Provider {
    /// Score a text with an explicit language hint (ISO 639-1 code).
    async fn classify_with_language(&self, text: &str, language: &str) -> Result<CategoryScores>;

    /// Language codes this provider accepts.
    fn supported_languages(&self) -> Vec<String>;

    fn supports_language(&self, language: &str) -> bool {
        self.supported_languages()
            .iter()
            .any(|l| l.eq_ignore_ascii_case(language))
    }
}
