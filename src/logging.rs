//! Tracing setup. Logs go to stderr so stdout carries only the answer.
//!
//! `RUST_LOG` wins over the configured level; `--verbose` forces `debug`.

use anyhow::{Result, anyhow};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Noisy dependencies are capped at `warn`
const QUIET_DEPS: &str = "hyper_util=warn,reqwest=warn,fjall=warn,lsm_tree=warn";

fn filter_directives(level: &str, verbose: bool) -> String {
    let level = if verbose { "debug" } else { level };
    format!("{level},{QUIET_DEPS}")
}

pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new(filter_directives(&config.level, true))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(filter_directives(&config.level, false)))
    };

    let layer = if config.format == "json" {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to initialize logging: {e}"))
}
