//! Caller-supplied deadline and cancellation signal

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{RegistryError, Result};

/// Deadline plus a shared cancel flag. Cloning shares the flag.
///
/// Also carries the acting principal, if known, for audit events.
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
    actor: Option<String>,
}

/// Handle that cancels every clone of the [`Context`] it came from
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }
}

impl Context {
    /// No deadline, never cancelled unless a handle says so
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(timeout),
            ..Self::default()
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            ..Self::default()
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn actor(&self) -> Option<&str> {
        self.actor.as_deref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: self.cancelled.clone(),
        }
    }

    pub fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed) || self.deadline.map_or(false, |d| Instant::now() >= d)
    }

    /// Fail with [`RegistryError::Cancelled`] if the context is done
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_done() {
            Err(RegistryError::Cancelled(operation))
        } else {
            Ok(())
        }
    }
}
