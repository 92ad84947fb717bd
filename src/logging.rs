//! Console logging initialisation.
//!
//! Batches run unattended for hours, so every stage emits structured events
//! through `tracing`. The filter honours `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Installs the console subscriber. A second call keeps the first
/// subscriber, so tests may call this freely.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    drop(tracing::subscriber::set_global_default(subscriber));
}
