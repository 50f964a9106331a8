//! Run-scoped logging: console at INFO, a durable per-month file at DEBUG.
//!
//! The returned guard owns the file writer's background thread; hold it for
//! the life of the run and drop it to flush.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::dates::Month;
use crate::errors::PipelineError;
use crate::events::{EventBus, EventBusLayer};

/// Initialize the subscriber for one month-run.
///
/// `bus` mirrors every event into a panel queue when a presentation layer is
/// attached. Reinitializing in the same process is an error; one run, one
/// subscriber.
pub fn init(
    month: Month,
    log_dir: &Path,
    bus: Option<EventBus>,
) -> Result<WorkerGuard, PipelineError> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, format!("run_{month}.log"));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        );
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_writer)
        .with_ansi(false)
        .with_filter(LevelFilter::DEBUG);
    let bus_layer = bus.map(EventBusLayer::new);

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .with(bus_layer)
        .try_init()
        .map_err(|e| {
            PipelineError::Io(std::io::Error::other(format!(
                "logging already initialized: {e}"
            )))
        })?;

    tracing::info!("logging initialized - file: run_{month}.log");
    Ok(guard)
}
