// Tribunal: multi-provider content classification for moderation
//
// This is the library root. Each module corresponds to a major subsystem
// of the classification orchestration layer.

pub mod breaker;
pub mod calibration;
pub mod categories;
pub mod config;
pub mod db;
pub mod ensemble;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod provider;

pub use categories::{Category, CategoryScores};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{ClassificationResult, Orchestrator, ProviderConfig};
