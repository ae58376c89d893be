//! Log setup for the binary. Logs go to stderr, away from the plug list.

use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins; otherwise each `-v` raises the level by one step
pub fn init(verbosity: u64) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("qasaplug={}", level)));

    if let Err(err) = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
    {
        eprintln!("Could not set up logging: {}", err);
    }
}
