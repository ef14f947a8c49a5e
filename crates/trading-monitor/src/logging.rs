//! Logging setup.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Where the optional log file goes.
#[derive(Debug, Clone, Copy)]
pub struct LogFile<'a> {
    pub directory: &'a Path,
    pub prefix: &'a str,
}

/// Setup logging with the given level. `RUST_LOG` wins over `level` when set.
///
/// With a [`LogFile`] a JSON copy of every event is written to a daily
/// rolling file; keep the returned guard alive until exit so it is flushed.
pub fn setup_logging(level: &str, json: bool, file: Option<LogFile<'_>>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match file {
        Some(file) => {
            let appender = tracing_appender::rolling::daily(file.directory, file.prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
    guard
}
