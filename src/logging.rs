//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Resolve the filter directive from the configured level and CLI verbosity.
///
/// `-v` raises the configured level to `debug`, `-vv` to `trace`; `quiet`
/// wins over both.
pub fn filter_directive(config: &LoggingConfig, verbose: u8, quiet: bool) -> String {
    let level = if quiet {
        "error".to_string()
    } else {
        match verbose {
            0 => config.level.to_lowercase(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    format!("consul_mcp={level},consul_mcp_server={level},{level}")
}

/// Install the global subscriber.
///
/// Returns the file writer guard when a log file is configured; it must be
/// kept alive for buffered lines to be flushed.
pub fn init(config: &LoggingConfig, verbose: u8, quiet: bool) -> Option<WorkerGuard> {
    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(filter_directive(config, verbose, quiet)));

    let (file_layer, guard) = match config.file.as_deref().filter(|_| config.enable_file) {
        Some(file) => {
            let path = Path::new(file);
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "consul-mcp-server.log".into());

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}
