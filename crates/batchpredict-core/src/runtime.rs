//! Numeric runtime mode switch.
//!
//! Prediction wants the numeric runtime in eager mode. Enabling it is
//! best-effort: the mode may already be active, so a failure is logged and
//! the run continues.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::obs::emit_eager_mode_suppressed;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct RuntimeModeError(pub String);

/// Handle on the process's numeric runtime.
pub trait NumericRuntime: Send + Sync {
    fn enable_eager_execution(&self) -> Result<(), RuntimeModeError>;
}

/// Runtime that is always in eager mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct EagerRuntime;

impl NumericRuntime for EagerRuntime {
    fn enable_eager_execution(&self) -> Result<(), RuntimeModeError> {
        Ok(())
    }
}

/// Latches the first successful enable so later runs skip the call.
#[derive(Debug, Default)]
pub struct EagerModeGuard {
    enabled: AtomicBool,
}

static GLOBAL_GUARD: OnceLock<Arc<EagerModeGuard>> = OnceLock::new();

impl EagerModeGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide guard.
    pub fn global() -> Arc<EagerModeGuard> {
        GLOBAL_GUARD
            .get_or_init(|| Arc::new(EagerModeGuard::new()))
            .clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Try to enable eager mode. Returns whether it is known to be on.
    pub fn ensure(&self, runtime: &dyn NumericRuntime) -> bool {
        if self.is_enabled() {
            return true;
        }
        match runtime.enable_eager_execution() {
            Ok(()) => {
                self.enabled.store(true, Ordering::Release);
                true
            }
            Err(e) => {
                emit_eager_mode_suppressed(&e);
                false
            }
        }
    }
}
