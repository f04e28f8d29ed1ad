//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Default filter used when `RUST_LOG` is not set.
const DEFAULT_FILTER: &str = "info,vkframe=debug,vkframe_rhi=info,vkframe_render=debug";

/// Initialize the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG` when present. Thread ids are included
/// because command recording may happen on worker threads.
///
/// # Example
/// ```
/// vkframe_core::init_logging();
/// tracing::info!("Framework initialized");
/// ```
pub fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    // try_init so that tests and embedders that already installed a subscriber keep theirs
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();
}
