use std::fs;
use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Initializes console logging, plus daily-rolling JSON file logs when the
/// config names a directory that exists or can be created.
pub fn init_logging(config: &LoggingConfig) {
    // Respect RUST_LOG if set; otherwise fall back to the configured filter
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let file_layer = config.directory.as_deref().and_then(usable_log_dir).map(|dir| {
        let file_appender = tracing_appender::rolling::daily(dir, "event_pull.log");
        let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
        // Keep the guard alive for the life of the process so logs are flushed
        std::mem::forget(guard);
        fmt::layer().json().with_writer(non_blocking_writer)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();
}

/// Creates the log directory. The subscriber is not up yet, so a failure goes
/// to stderr and file logging is skipped.
fn usable_log_dir(dir: &Path) -> Option<&Path> {
    match fs::create_dir_all(dir) {
        Ok(()) => Some(dir),
        Err(e) => {
            eprintln!(
                "Failed to create log directory '{}', logging to console only: {}",
                dir.display(),
                e
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_is_created() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("logs").join("daily");

        assert_eq!(usable_log_dir(&dir), Some(dir.as_path()));
        assert!(dir.is_dir());
    }

    #[test]
    fn test_log_dir_under_a_file_is_skipped() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let dir = file.path().join("logs");

        assert_eq!(usable_log_dir(&dir), None);
    }
}
