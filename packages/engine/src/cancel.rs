//! Request cancellation.

use std::time::{Duration, Instant};

use tokio_util::sync::{CancellationToken, DropGuard};

use crate::EngineError;

/// Cancellation flag plus an optional deadline, shared between the caller
/// and one engine invocation.
///
/// Clones share the flag, so cancelling any clone cancels them all.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: CancellationToken,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// A token that never expires on its own.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that expires at `deadline`.
    #[must_use]
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: CancellationToken::new(),
            deadline: Some(deadline),
        }
    }

    /// A token that expires `timeout` from now.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Instant::now()
            .checked_add(timeout)
            .map_or_else(Self::new, Self::with_deadline)
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// Whether [`Self::cancel`] has been called on any clone.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_cancelled()
    }

    /// A guard that cancels the token when dropped, unless disarmed.
    #[must_use]
    pub fn drop_guard(&self) -> DropGuard {
        self.cancelled.clone().drop_guard()
    }

    /// The deadline, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails once the token is cancelled or past its deadline.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Cancelled`] or
    /// [`EngineError::DeadlineExceeded`].
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}
