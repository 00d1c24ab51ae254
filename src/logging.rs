use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber. Logs go to stderr so command output stays clean.
pub fn init(verbose: u8) -> Result<()> {
    // RUST_LOG wins; otherwise -v / -vv raise the level.
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {e}"))
}
