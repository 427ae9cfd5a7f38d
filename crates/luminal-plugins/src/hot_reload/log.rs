//! Lifecycle messages gated by the loader's logging switches.

use std::fmt::Display;
use tracing::{debug, error, info, warn};

const TARGET: &str = "luminal::lifecycle";

/// Emits lifecycle messages only when logging is enabled.
///
/// `suppress_errors` silences the error level and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LifecycleLog {
    enabled: bool,
    suppress_errors: bool,
}

impl LifecycleLog {
    pub fn new(enabled: bool, suppress_errors: bool) -> Self {
        Self {
            enabled,
            suppress_errors,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn info(&self, message: impl Display) {
        if self.enabled {
            info!(target: TARGET, "{message}");
        }
    }

    pub fn note(&self, message: impl Display) {
        if self.enabled {
            info!(target: TARGET, kind = "note", "{message}");
        }
    }

    pub fn success(&self, message: impl Display) {
        if self.enabled {
            info!(target: TARGET, kind = "success", "{message}");
        }
    }

    pub fn warning(&self, message: impl Display) {
        if self.enabled {
            warn!(target: TARGET, "{message}");
        }
    }

    pub fn error(&self, message: impl Display) {
        if self.enabled && !self.suppress_errors {
            error!(target: TARGET, "{message}");
        }
    }

    pub fn debug(&self, message: impl Display) {
        if self.enabled {
            debug!(target: TARGET, "{message}");
        }
    }
}
