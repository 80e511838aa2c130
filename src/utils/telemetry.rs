// src/utils/telemetry.rs

use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Installs the global tracing subscriber: stdout plus a daily rolling file
/// under `logs/`.
///
/// Runs once per process. Later calls return `None` and change nothing.
/// Keep the returned guard alive for as long as file logging is wanted.
pub fn init(config: &Config) -> Option<WorkerGuard> {
    let mut guard = None;
    INITIALIZED.get_or_init(|| {
        let file_appender = tracing_appender::rolling::daily("logs", "app.log");
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file_appender);
        let env_filter = EnvFilter::new(&config.rust_log);
        let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
        let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(stdout_layer)
            .with(file_layer)
            .try_init();

        if installed.is_ok() {
            guard = Some(worker_guard);
        }
    });
    guard
}
