// Tracing setup
use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// `RUST_LOG` takes precedence over the CLI level when set.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging init: {}", e))?;
    Ok(())
}
