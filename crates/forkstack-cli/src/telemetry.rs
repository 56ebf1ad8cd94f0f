//! Logging initialization.
//!
//! Controlled by two environment variables:
//! - `FORKSTACK_LOG`: an `EnvFilter` directive (default `warn`)
//! - `FORKSTACK_LOG_FORMAT`: `json` for JSON spans/events, anything else for
//!   compact human-readable lines
//!
//! Both formats write to stderr so stdout stays reserved for command output.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Filter directive variable.
pub const LOG_ENV: &str = "FORKSTACK_LOG";

/// Format selector variable.
pub const LOG_FORMAT_ENV: &str = "FORKSTACK_LOG_FORMAT";

/// Install the global subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };
    if let Err(e) = result {
        eprintln!("warning: failed to initialize logging: {e}");
    }
}
