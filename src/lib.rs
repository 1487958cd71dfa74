pub mod clock;
pub mod config;
pub mod detail_cache; // Invalidate-on-mutation conversation detail cache
pub mod engine; // Facade the UI layer talks to
pub mod error;
pub mod merge; // Two-stream timeline merge
pub mod models;
pub mod remote; // REST backend seam
pub mod scheduler; // Periodic background refresh
pub mod store; // Equality-gated review list
pub mod workflow; // Workflow / response state transitions

pub use engine::{ConversationDetail, ReviewEngine};
pub use error::{EngineError, FetchError};
pub use scheduler::RefreshScheduler;

use tracing_subscriber::EnvFilter;

/// Initialize tracing from `RUST_LOG`, falling back to the built-in filter.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
}
