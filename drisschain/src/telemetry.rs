// Copyright (c) 2024 The Drisschain Developers

//! Tracing subscriber setup for the node binary.
//!
//! Console output goes through `tracing_subscriber::fmt`. The level comes
//! from the CLI verbosity flag unless `RUST_LOG` is set, in which case that
//! filter wins. Contract `log` output uses the `drisscript` target.

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Target used for events emitted by contract `log` instructions.
pub const CONTRACT_LOG_TARGET: &str = "drisscript";

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "debug"
    } else {
        "info"
    }
}

/// Build the filter for the given verbosity, honouring `RUST_LOG`.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(verbose: bool) -> Result<()> {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(env_filter(verbose));

    tracing_subscriber::registry()
        .with(fmt_layer)
        .try_init()
        .context("Failed to install tracing subscriber")
}
