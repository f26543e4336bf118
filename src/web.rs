#![cfg(not(tarpaulin_include))]

use anyhow::Context;
use portfolio::{Config, app};

/// Main entry point for the portfolio backend
///
/// Reads the configuration from the environment and serves the API until
/// Ctrl+C or SIGTERM.
///
/// # Environment
/// * `RUST_LOG` - Log filter, `info` when unset
/// * See [`Config::from_lookup`] for the application variables
///
/// # Returns
/// * `anyhow::Result<()>` - Success or the startup error
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("failed to load configuration")?;
    log::info!(
        "Starting portfolio backend v{} on {}:{}",
        env!("CARGO_PKG_VERSION"),
        config.host,
        config.port
    );

    app::run(config).await.context("server error")?;
    Ok(())
}
