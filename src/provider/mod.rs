// Classification providers: trait-based abstraction for swappable backends.
//
// The Provider trait defines the interface. Each ML vendor gets one
// implementation; the orchestrator routes between whichever are registered
// without knowing anything vendor-specific.

pub mod model_server;
pub mod perspective;
pub mod rate_limiter;
pub mod traits;

pub use traits::{LanguageAwareProvider, ModelInfo, Provider};
