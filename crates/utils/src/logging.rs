//! provides logging helpers

use std::io::IsTerminal;

use tracing_subscriber::filter::{self};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry;

/// initiate the global tracing subscriber
///
/// Events go to stderr so that stdout stays reserved for the primary output
/// of a binary (a rendered manifest, for instance). `RUST_LOG` overrides the
/// default `INFO` level.
pub fn init() {
    init_with_level(filter::LevelFilter::INFO);
}

/// Same as [`init`], with a caller-chosen default level.
///
/// Calling this more than once is harmless; only the first subscriber wins.
pub fn init_with_level(default_level: filter::LevelFilter) {
    let env_filter = filter::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let fmt_layer = layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_filter(env_filter);

    if registry().with(fmt_layer).try_init().is_err() {
        tracing::debug!("global tracing subscriber already installed");
    }
}
