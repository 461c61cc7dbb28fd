//! Logging initialization for the `pagelight` binary.
//!
//! Library code only emits `tracing` events; installing a subscriber is left
//! to the binary. `PAGELIGHT_LOG` overrides the verbosity flags.

use tracing_subscriber::EnvFilter;

/// Environment variable holding an `EnvFilter` directive.
pub const LOG_ENV: &str = "PAGELIGHT_LOG";

/// Maps a `-v` count to a tracing directive: 0 → warn, 1 → info, 2 → debug,
/// 3+ → trace.
#[must_use]
pub const fn verbosity_to_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber, writing to stderr.
///
/// Uses `try_init`, so repeated calls are harmless.
pub fn init_logging(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(verbosity_to_directive(verbosity)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .try_init();
}
