use anyhow::Result;
use tracing_subscriber::{fmt, EnvFilter};

/// Install a stdout subscriber. `RUST_LOG` controls the level, default `info`.
///
/// Returns `Ok` when a global subscriber is already installed.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))?;

    let init_result = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(false)
        .compact()
        .try_init();

    if let Err(e) = init_result {
        if e.to_string().contains("already been set") {
            return Ok(());
        }
        return Err(anyhow::anyhow!("failed to install log subscriber: {e}"));
    }
    Ok(())
}
