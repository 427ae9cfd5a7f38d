//! Tracing subscriber setup.
//!
//! Luminal crates only emit through the `tracing` macros. Binaries and tests
//! that want to see the output call [`init_tracing`] once.

use tracing_subscriber::EnvFilter;

/// Default directive used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "info,luminal_kernel=info,luminal_plugins=info";

/// Install a global fmt subscriber.
///
/// `RUST_LOG` takes precedence over `directive`. Returns `false` when a
/// global subscriber was already installed, which makes repeated calls
/// from tests harmless.
pub fn init_tracing(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}

/// Same as [`init_tracing`] but emits newline-delimited JSON records.
pub fn init_json_tracing(directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .try_init()
        .is_ok()
}
