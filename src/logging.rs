//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` wins when set; otherwise the `[log] level` from the config
//! applies. HTTP client internals are capped at `warn`. Logs go to stderr
//! so stdout carries only command output.

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const QUIET_DEPENDENCIES: &str = "hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn";

pub fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", level, QUIET_DEPENDENCIES)))
}

pub fn init(level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter(level))
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
