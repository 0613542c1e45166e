//! Logging setup for the agent process.
//!
//! Installs a `tracing` subscriber with an `EnvFilter` and a formatting layer that
//! stamps records with the local timezone.

use chrono::Local;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "fleet_agent=info,fleet_api=info";

/// Custom timer that uses the local timezone via chrono.
#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = Local::now();
        write!(w, "{}", now.format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Build the filter for `directive`, falling back to [`DEFAULT_LOG_FILTER`] when empty.
pub fn build_filter(directive: &str) -> crate::Result<EnvFilter> {
    let directive = if directive.trim().is_empty() {
        DEFAULT_LOG_FILTER
    } else {
        directive
    };

    EnvFilter::try_new(directive)
        .map_err(|e| crate::Error::Other(format!("Invalid filter directive: {}", e)))
}

/// Install the global subscriber.
///
/// Fails if the directive is invalid or a global subscriber is already set.
pub fn init_logging(directive: &str) -> crate::Result<()> {
    let filter = build_filter(directive)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_timer(LocalTimer).with_target(true))
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to install subscriber: {}", e)))
}
