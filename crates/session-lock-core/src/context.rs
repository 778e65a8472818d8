//! Caller-supplied cancellation and deadline signal.
//!
//! A [`Context`] is passed to every lock session operation. It answers two
//! questions: has the caller given up (`err`), and when will it give up
//! (`done`). It is cheap to clone and can be shared between tasks.

use std::future::{pending, Future};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

/// Why a context is done.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextError {
    /// The owning [`Canceller`] fired.
    #[error("context canceled")]
    Cancelled,
    /// The context's deadline passed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Cancellation signal and optional deadline for a lock operation.
///
/// # Example
///
/// ```rust,ignore
/// let (ctx, cancel) = Context::cancellable();
/// let ctx = ctx.with_timeout(Duration::from_secs(30));
///
/// tokio::spawn(async move {
///     shutdown_signal().await;
///     cancel.cancel();
/// });
///
/// session.acquire_lock(&ctx, "nightly-report", WaitBudget::INDEFINITE).await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Option<watch::Receiver<bool>>,
}

/// Fires the cancellation signal of the contexts created alongside it.
///
/// Dropping a canceller does not cancel.
#[derive(Debug, Clone)]
pub struct Canceller {
    sender: Arc<watch::Sender<bool>>,
}

impl Canceller {
    /// Cancels every context derived from this canceller. Idempotent.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Context {
    /// A context that is never done.
    pub fn background() -> Self {
        Self::default()
    }

    /// A context that is done once the returned [`Canceller`] fires.
    pub fn cancellable() -> (Self, Canceller) {
        let (sender, receiver) = watch::channel(false);
        let ctx = Self {
            deadline: None,
            cancelled: Some(receiver),
        };
        (
            ctx,
            Canceller {
                sender: Arc::new(sender),
            },
        )
    }

    /// Returns a copy that is also done after `timeout` from now.
    ///
    /// A timeout too large to represent as an instant adds no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Returns a copy that is also done at `deadline`.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) if current <= deadline => current,
            _ => deadline,
        });
        self
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns why the context is done, or `None` while it is live.
    ///
    /// Cancellation is reported ahead of an expired deadline.
    pub fn err(&self) -> Option<ContextError> {
        if let Some(receiver) = &self.cancelled {
            if *receiver.borrow() {
                return Some(ContextError::Cancelled);
            }
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is done. Never resolves for a background context.
    pub async fn done(&self) -> ContextError {
        let cancelled = async {
            match &self.cancelled {
                Some(receiver) => {
                    let mut receiver = receiver.clone();
                    let closed = receiver.wait_for(|cancelled| *cancelled).await.is_err();
                    if closed {
                        // Canceller dropped without firing.
                        pending::<()>().await;
                    }
                }
                None => pending::<()>().await,
            }
        };
        let expired = async {
            match self.deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => ContextError::Cancelled,
            _ = expired => ContextError::DeadlineExceeded,
        }
    }

    /// Drives `future` until it completes or the context is done.
    ///
    /// A context that is already done does not poll `future` at all. If both
    /// become ready together the context wins.
    pub async fn run<F: Future>(&self, future: F) -> Result<F::Output, ContextError> {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            output = future => Ok(output),
        }
    }
}
