//! `tracing` subscriber setup for binaries embedding the pipeline

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Prefix of the daily rolling log files
pub const LOG_FILE_PREFIX: &str = "message-pipeline.log";

/// Build the filter; `RUST_LOG` overrides the configured directives
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter))
}

/// Install the global subscriber
///
/// With `log_dir` set, logs are also written to a daily rolling file. Keep
/// the returned guard alive for the lifetime of the process or buffered lines
/// are lost on exit.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let registry = tracing_subscriber::registry()
        .with(env_filter(config))
        .with(fmt::layer());

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}
