pub mod cache;
pub mod config;
pub mod pipeline;
pub mod report;

pub use cache::{CacheKey, CacheStore};
pub use config::AppConfig;
pub use pipeline::enhancement::{EnhancementOrchestrator, ReportBundle};
pub use report::{AnalysisRequest, InputReport, ReportSource};

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_filter` (usually
/// `AppConfig::log_level`) applies. Later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} v{} logging initialised", config::APP_NAME, config::APP_VERSION);
    }
}
