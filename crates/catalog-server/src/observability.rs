//! Log subscriber setup.
//!
//! `RUST_LOG` always wins. Otherwise the level starts at `info` and is
//! switched to `logging.level` once the config is loaded.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER: OnceLock<FilterHandle> = OnceLock::new();

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}

pub fn init_tracing() {
    let filter = if rust_log_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    } else {
        EnvFilter::new("info")
    };

    let (filter, handle) = reload::Layer::new(filter);
    if FILTER.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}

/// Switch to the configured level. No-op under `RUST_LOG`.
pub fn apply_logging_level(level: &str) {
    if rust_log_set() {
        return;
    }
    if let Some(handle) = FILTER.get()
        && let Err(e) = handle.modify(|f| *f = EnvFilter::new(level))
    {
        tracing::warn!(error = %e, level, "could not change log level");
    }
}

pub fn shutdown_tracing() {
    tracing::info!("catalog server stopped");
}
