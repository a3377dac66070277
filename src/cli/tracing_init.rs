//! Tracing/logging initialization for the CLI.
//!
//! All log output goes to stderr: on the stdio transport, stdout is the
//! protocol channel and must stay clean.

use tracing_subscriber::EnvFilter;

/// Initialize tracing-subscriber with the configured level and format.
///
/// The level comes from `MFP_LOG_LEVEL` (via config); `MFP_LOG_FORMAT`
/// selects `json` or `text` output (default text).
pub fn init_tracing(log_level: &str) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = EnvFilter::try_new(log_level.to_lowercase())
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let log_format = std::env::var("MFP_LOG_FORMAT")
        .map_or_else(|_| "text".to_string(), |s| s.to_lowercase());

    if log_format == "json" {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .init();
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}
