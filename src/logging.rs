// ABOUTME: tracing-subscriber setup for the puppet-gitter binary.
// ABOUTME: Console output (plain or JSON) filtered by RUST_LOG, plus an optional daily rolling JSON file.

use anyhow::Context;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "puppet-gitter.log";

/// Keeps the file writer alive; dropping it flushes pending lines
pub struct LoggingGuard {
    _guard: Option<WorkerGuard>,
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(log_json: bool, log_dir: Option<&Path>) -> anyhow::Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let json_console = log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let plain_console =
        (!log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(json_console)
        .with(plain_console)
        .init();

    Ok(LoggingGuard { _guard: guard })
}
