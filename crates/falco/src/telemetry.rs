//! Tracing subscriber setup for the daemon binary.

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `directives` (`RUST_LOG` syntax).
pub fn init(directives: &str) -> Result<()> {
    let filter = EnvFilter::try_new(directives)
        .with_context(|| format!("invalid log filter '{}'", directives))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {}", e))
}
