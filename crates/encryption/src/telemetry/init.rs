use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Install a JSON [`tracing_subscriber`] for the embedding process.
///
/// # Errors
///
/// Returns an error if a global subscriber has already been set.
pub fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise tracing subscriber: {e}"))
}
