//! Tracing subscriber setup for applications embedding the compiler.
//!
//! The library itself only emits events. Binaries and test harnesses that want
//! to see them call [`init_tracing`] once at startup.

use anyhow::{anyhow, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "cfnsmith=info";

/// Install a global `tracing` subscriber writing formatted events to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`. Records emitted through
/// the `log` crate by dependencies are forwarded into the same subscriber.
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_filter)
            .map_err(|e| anyhow!("Invalid log filter '{}': {}", default_filter, e))?,
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true),
    );

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow!("Failed to set tracing subscriber: {}", e))?;

    tracing_log::LogTracer::builder()
        .with_max_level(log::LevelFilter::Info)
        .init()
        .map_err(|e| anyhow!("Failed to initialize log-to-tracing bridge: {}", e))?;

    tracing::debug!("Logging initialized with default filter '{}'", default_filter);
    Ok(())
}
