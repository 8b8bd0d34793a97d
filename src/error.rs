// Typed errors surfaced by the orchestrator.
//
// Every failure is scoped to a single classification request. Provider
// implementations return anyhow errors; the orchestrator wraps them with
// the originating provider's name so callers can tell who failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("no providers registered")]
    NoProviders,

    #[error("provider not registered: {0}")]
    ProviderNotRegistered(String),

    #[error("provider {provider} classification failed: {source:#}")]
    ProviderFailed {
        provider: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("all providers exhausted; last error: {last}")]
    AllProvidersExhausted {
        #[source]
        last: Box<OrchestratorError>,
    },

    #[error("ensemble needs {required} successful providers, only {succeeded} succeeded")]
    InsufficientProviders { required: usize, succeeded: usize },

    #[error("ensemble needs {required} enabled providers, only {available} are available")]
    NotEnoughEnsembleProviders { required: usize, available: usize },

    #[error("ensemble not configured")]
    EnsembleNotConfigured,

    #[error("ensemble is configured but disabled")]
    EnsembleDisabled,
}

impl OrchestratorError {
    pub(crate) fn provider_failed(provider: &str, source: anyhow::Error) -> Self {
        OrchestratorError::ProviderFailed {
            provider: provider.to_string(),
            source,
        }
    }

    /// The provider a failure is attributed to, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            OrchestratorError::ProviderFailed { provider, .. } => Some(provider),
            OrchestratorError::ProviderNotRegistered(name) => Some(name),
            OrchestratorError::AllProvidersExhausted { last } => last.provider(),
            _ => None,
        }
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
