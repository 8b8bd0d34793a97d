// Self-hosted classifier provider.
//
// Talks to an in-house model server over a small JSON protocol:
//   POST {base}/classify  {"text": "...", "language": "fr"?}  -> category scores
//   GET  {base}/health                                        -> 2xx when ready
//
// The response body is a flat object keyed by category name
// (`{"toxicity": 0.12, "hate": 0.01, ...}`); missing categories read as 0.0.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use super::traits::{LanguageAwareProvider, ModelInfo, Provider};
use crate::categories::CategoryScores;

/// Connection settings for a model server.
#[derive(Debug, Clone)]
pub struct ModelServerConfig {
    /// Registry name (default "model-server")
    pub name: String,
    pub base_url: String,
    pub model_name: String,
    pub model_version: String,
    /// Languages the deployed model was trained on
    pub languages: Vec<String>,
    /// HTTP-level timeout for each request
    pub timeout: Duration,
}

impl Default for ModelServerConfig {
    fn default() -> Self {
        Self {
            name: ModelServerProvider::DEFAULT_NAME.to_string(),
            base_url: "http://localhost:8080".to_string(),
            model_name: "unknown".to_string(),
            model_version: "0".to_string(),
            languages: vec!["en".to_string()],
            timeout: Duration::from_secs(10),
        }
    }
}

/// Classification provider backed by a self-hosted model server.
pub struct ModelServerProvider {
    client: Client,
    config: ModelServerConfig,
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    language: Option<&'a str>,
}

impl ModelServerProvider {
    pub const DEFAULT_NAME: &'static str = "model-server";

    pub fn new(mut config: ModelServerConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client for model server")?;
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        Ok(Self { client, config })
    }

    async fn post_classify(&self, text: &str, language: Option<&str>) -> Result<CategoryScores> {
        let url = format!("{}/classify", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .json(&ClassifyRequest { text, language })
            .send()
            .await
            .with_context(|| format!("Failed to call model server at {url}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Model server returned {}: {}", status, body);
        }

        let scores: CategoryScores = response
            .json()
            .await
            .context("Failed to parse model server response")?;

        debug!(
            provider = %self.config.name,
            toxicity = scores.toxicity,
            language = ?language,
            "Model server scored text"
        );

        Ok(clamp_scores(scores))
    }
}

/// Servers occasionally return logits-turned-probabilities slightly out of range.
fn clamp_scores(scores: CategoryScores) -> CategoryScores {
    CategoryScores::from_fn(|c| scores.get(c).clamp(0.0, 1.0))
}

#[async_trait]
impl Provider for ModelServerProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new(&self.config.model_name, &self.config.model_version)
    }

    async fn classify(&self, text: &str) -> Result<CategoryScores> {
        self.post_classify(text, None).await
    }

    async fn health(&self) -> Result<()> {
        let url = format!("{}/health", self.config.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Model server health probe failed at {url}"))?;
        if !response.status().is_success() {
            anyhow::bail!("Model server health returned {}", response.status());
        }
        Ok(())
    }

    fn as_language_aware(&self) -> Option<&dyn LanguageAwareProvider> {
        Some(self)
    }
}

#[async_trait]
impl LanguageAwareProvider for ModelServerProvider {
    async fn classify_with_language(&self, text: &str, language: &str) -> Result<CategoryScores> {
        self.post_classify(text, Some(language)).await
    }

    fn supported_languages(&self) -> Vec<String> {
        self.config.languages.clone()
    }
}
