use std::path::Path;
use std::sync::OnceLock;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

#[derive(Debug, Clone)]
pub struct LogOptions<'a> {
    pub base_level: &'a str,
    pub directory: &'a Path,
    pub file_prefix: &'a str,
    pub max_files: usize,
}

impl Default for LogOptions<'_> {
    fn default() -> Self {
        Self {
            base_level: "info",
            directory: Path::new("logs"),
            file_prefix: "paint",
            max_files: 5,
        }
    }
}

pub fn setup_logging(base_level: &str) {
    setup_logging_with(&LogOptions {
        base_level,
        ..LogOptions::default()
    });
}

/// Installs console and rolling-file layers. `RUST_LOG` overrides `base_level`.
pub fn setup_logging_with(options: &LogOptions<'_>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(options.base_level))
        .unwrap_or_else(|e| panic!("Invalid log filter: {}", e));

    std::fs::create_dir_all(options.directory)
        .unwrap_or_else(|e| panic!("Failed to create logs directory: {}", e));

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(options.file_prefix)
        .filename_suffix("log")
        .max_log_files(options.max_files)
        .build(options.directory)
        .unwrap_or_else(|e| panic!("Failed to create log file appender: {}", e));

    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    if LOG_GUARD.set(guard).is_err() {
        // a second call keeps the first subscriber
        return;
    }

    let console_writer = std::io::stdout.and(std::io::stderr.with_min_level(Level::WARN));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true)
        .with_writer(console_writer);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .unwrap_or_else(|e| panic!("Logger initialization failed: {}", e));
}

/// Test-friendly subscriber: console only, ignores repeated initialization.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_file_is_created_once() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let options = LogOptions {
            base_level: "debug",
            directory: dir.path(),
            file_prefix: "paint-test",
            max_files: 1,
        };

        setup_logging_with(&options);
        setup_logging_with(&options);
        tracing::info!("logging initialized");

        let files: Vec<_> = std::fs::read_dir(dir.path())?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("paint-test"))
            .collect();
        assert_eq!(files.len(), 1);
        Ok(())
    }
}
