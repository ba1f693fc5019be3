//! Structured logging setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialise the global tracing subscriber. `json` selects the JSON
/// formatter; otherwise a human-readable formatter is used.
pub fn init(log_format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    if log_format.eq_ignore_ascii_case("json") {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
