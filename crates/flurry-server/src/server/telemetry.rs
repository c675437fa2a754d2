//! Console logging for the daemon.
//!
//! Events are filtered through `RUST_LOG` (default `info`) and printed by a
//! `tracing_subscriber::fmt` layer with thread ids, source locations and local
//! RFC 3339 timestamps. Set `RUST_LOG=debug` to also see per-connection
//! open/close events.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_telemetry() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
                .with_file(true)
                .pretty(),
        )
        .try_init()
        .context("failed to install tracing subscriber")
}
