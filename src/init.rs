// Logging setup for the CLI
//
// Logs always go to stderr so command output on stdout stays parseable.

use glueform_config::{LogConfig, LogFormat};
use tracing::Subscriber;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter precedence: `--log-level`, then `RUST_LOG`, then `fallback`.
fn select_filter(
    level_override: Option<&str>,
    rust_log: Option<&str>,
    fallback: &str,
) -> EnvFilter {
    level_override
        .or(rust_log)
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(fallback).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn rust_log() -> Option<String> {
    std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
}

/// Text subscriber for the window before configuration is loaded, so
/// warnings raised while validating the config are not dropped.
pub fn bootstrap_subscriber(level_override: Option<&str>) -> impl Subscriber + Send + Sync {
    let env_filter = select_filter(level_override, rust_log().as_deref(), "info");
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
}

/// Initialise the global tracing subscriber.
///
/// `level_override` (the `--log-level` flag) wins over `RUST_LOG`, which
/// wins over `[log] level`. Calling this twice keeps the first subscriber.
pub fn init_tracing(config: &LogConfig, level_override: Option<&str>) {
    let env_filter = select_filter(level_override, rust_log().as_deref(), &config.level);

    let registry = tracing_subscriber::registry().with(env_filter);

    let _ = match config.format {
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().json().with_writer(std::io::stderr)),
        ),
        LogFormat::Text => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_writer(std::io::stderr)),
        ),
    };
}
