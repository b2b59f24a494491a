#![forbid(unsafe_code)]

//! Logging setup helpers.
//!
//! The framework only emits `tracing` events; installing a subscriber is up
//! to the embedding application. These helpers cover the common cases.
//!
//! | Target                      | Level   |
//! |-----------------------------|---------|
//! | dispatch rounds             | `debug` |
//! | notify / register / deliver | `trace` |
//! | observer failures, drops    | `warn`  |
//! | undo/redo failures          | `warn`  |

use tracing_subscriber::EnvFilter;

/// Environment variable consulted for the filter directive.
pub const LOG_ENV: &str = "TASKFRAME_LOG";

/// Install a global fmt subscriber.
///
/// `TASKFRAME_LOG` takes precedence over `default_filter`. Returns `false`
/// when a global subscriber was already installed.
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    #[cfg(feature = "tracing-json")]
    let builder = builder.json();
    builder.try_init().is_ok()
}

/// Install a subscriber that writes through the test harness capture.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .try_init();
}
