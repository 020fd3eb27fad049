//! Tracing initialization for the Eventide engine.
//!
//! Builds a layered subscriber: an `EnvFilter`-driven stdout layer, plus an
//! optional daily-rolling JSON appender that captures error-level events to
//! `errors.jsonl` in the given directory.

use std::path::Path;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub fn init_tracing(log_dir: Option<&Path>) -> Result<()> {
    let stdout_layer = tracing_subscriber::fmt::layer().with_filter(EnvFilter::from_default_env());

    let registry = tracing_subscriber::registry().with(stdout_layer);

    if let Some(dir) = log_dir {
        std::fs::create_dir_all(dir)?;
        let errors_appender = tracing_appender::rolling::daily(dir, "errors.jsonl");
        let errors_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(errors_appender)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                *metadata.level() == tracing::Level::ERROR
            }));
        registry.with(errors_layer).try_init().ok();
    } else {
        registry.try_init().ok();
    }

    Ok(())
}
