// Google Perspective API provider.
//
// Perspective analyzes text for toxicity, identity attacks, insults, etc.
// It's free to use but rate-limited to ~1 QPS. The API is being sunset
// Dec 31, 2026; it sits behind the Provider trait like every other vendor,
// so retiring it means unregistering it, nothing more.
//
// Perspective attributes are mapped onto our categories. Categories it has
// no attribute for (self_harm, spam, pii) are reported as 0.0.
//
// API docs: https://developers.perspectiveapi.com/s/about-the-api-methods

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::rate_limiter::RateLimiter;
use super::traits::{LanguageAwareProvider, ModelInfo, Provider};
use crate::categories::{Category, CategoryScores};

const ANALYZE_URL: &str = "https://commentanalyzer.googleapis.com/v1alpha1/comments:analyze";

/// Perspective attribute name for each category we can get from it.
const ATTRIBUTE_MAP: [(&str, Category); 6] = [
    ("TOXICITY", Category::Toxicity),
    ("IDENTITY_ATTACK", Category::Hate),
    ("INSULT", Category::Harassment),
    ("SEXUALLY_EXPLICIT", Category::SexualContent),
    ("THREAT", Category::Violence),
    ("PROFANITY", Category::Profanity),
];

/// Languages Perspective accepts for the production attributes.
const SUPPORTED_LANGUAGES: [&str; 17] = [
    "en", "es", "fr", "de", "it", "pt", "ru", "ar", "zh", "ja", "ko", "nl", "pl", "sv", "hi",
    "id", "cs",
];

/// Perspective API classification provider.
pub struct PerspectiveProvider {
    client: Client,
    api_key: String,
    rate_limiter: RateLimiter,
}

impl PerspectiveProvider {
    pub const NAME: &'static str = "perspective";

    /// Create a new Perspective provider with the given API key.
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            // Perspective free tier: 1 query per second
            rate_limiter: RateLimiter::per_second(1.0),
        }
    }

    /// Override the request rate (for keys with a raised quota).
    pub fn with_rate_limit(mut self, requests_per_second: f64) -> Self {
        self.rate_limiter = RateLimiter::per_second(requests_per_second);
        self
    }

    async fn analyze(&self, text: &str, languages: Vec<String>) -> Result<CategoryScores> {
        // Respect rate limits before making the call
        self.rate_limiter.acquire().await;

        let request = PerspectiveRequest {
            comment: Comment {
                text: text.to_string(),
            },
            requested_attributes: ATTRIBUTE_MAP
                .iter()
                .map(|(attr, _)| (attr.to_string(), AttributeConfig {}))
                .collect(),
            languages,
        };

        let response = self
            .client
            .post(ANALYZE_URL)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await
            .context("Failed to call Perspective API")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Perspective API returned {}: {}", status, body);
        }

        let result: PerspectiveResponse = response
            .json()
            .await
            .context("Failed to parse Perspective API response")?;

        let scores = scores_from_response(&result);

        debug!(
            toxicity = scores.toxicity,
            hate = scores.hate,
            harassment = scores.harassment,
            text_preview = %crate::output::truncate_chars(text, 50),
            "Perspective scored text"
        );

        Ok(scores)
    }
}

#[async_trait]
impl Provider for PerspectiveProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo::new("perspective", "v1alpha1")
    }

    async fn classify(&self, text: &str) -> Result<CategoryScores> {
        self.analyze(text, vec!["en".to_string()]).await
    }

    async fn health(&self) -> Result<()> {
        self.analyze("health check", vec!["en".to_string()])
            .await
            .map(|_| ())
            .context("Perspective health probe failed")
    }

    fn as_language_aware(&self) -> Option<&dyn LanguageAwareProvider> {
        Some(self)
    }
}

#[async_trait]
impl LanguageAwareProvider for PerspectiveProvider {
    async fn classify_with_language(&self, text: &str, language: &str) -> Result<CategoryScores> {
        self.analyze(text, vec![language.to_lowercase()]).await
    }

    fn supported_languages(&self) -> Vec<String> {
        SUPPORTED_LANGUAGES.iter().map(|l| l.to_string()).collect()
    }
}

/// Map Perspective's attribute summary scores onto our category vector.
fn scores_from_response(response: &PerspectiveResponse) -> CategoryScores {
    let mut scores = CategoryScores::default();
    for (attribute, category) in ATTRIBUTE_MAP {
        if let Some(score) = response.attribute_scores.get(attribute) {
            scores.set(category, score.summary_score.value.clamp(0.0, 1.0));
        }
    }
    scores
}

// --- Perspective API request/response types ---

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PerspectiveRequest {
    comment: Comment,
    requested_attributes: HashMap<String, AttributeConfig>,
    languages: Vec<String>,
}

#[derive(Serialize)]
struct Comment {
    text: String,
}

#[derive(Serialize)]
struct AttributeConfig {}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PerspectiveResponse {
    attribute_scores: HashMap<String, AttributeScore>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeScore {
    summary_score: SummaryScore,
}

#[derive(Deserialize)]
struct SummaryScore {
    value: f64,
}
