//! Bounded waiting on top of a non-blocking acquisition probe.
//!
//! Backends whose native primitive cannot wait with a timeout expose a
//! "try once" probe instead. [`poll_until`] turns that probe into a wait that
//! honours both the caller's [`WaitBudget`] and their [`Context`].

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::trace;

use crate::budget::WaitBudget;
use crate::context::{Context, ContextError};

/// Default delay between probes.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Why [`poll_until`] gave up.
#[derive(Debug, PartialEq, Eq)]
pub enum WaitError<E> {
    /// The wait budget ran out while the context was still live.
    Timeout,
    /// The caller's context fired.
    Context(ContextError),
    /// The probe itself failed.
    Probe(E),
}

/// Calls `probe` until it reports `true`, the budget runs out, or `ctx` is done.
///
/// - A zero budget probes exactly once.
/// - An indefinite budget never times out; only `ctx` can end the wait.
/// - When the context and the budget expire on the same tick the context
///   error is returned.
/// - Probe errors are returned immediately, without retrying.
///
/// The final sleep is clamped so one last probe runs at the budget deadline.
pub async fn poll_until<F, Fut, E>(
    ctx: &Context,
    budget: WaitBudget,
    interval: Duration,
    mut probe: F,
) -> Result<(), WaitError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool, E>>,
{
    let start = Instant::now();
    let limit = budget.as_duration();
    let mut attempts = 0u32;

    loop {
        if let Some(err) = ctx.err() {
            return Err(WaitError::Context(err));
        }

        attempts += 1;
        if probe().await.map_err(WaitError::Probe)? {
            trace!(attempts, "probe succeeded");
            return Ok(());
        }

        let pause = match limit {
            None => interval,
            Some(limit) => {
                let elapsed = start.elapsed();
                if elapsed >= limit {
                    if let Some(err) = ctx.err() {
                        return Err(WaitError::Context(err));
                    }
                    trace!(attempts, ?elapsed, "wait budget exhausted");
                    return Err(WaitError::Timeout);
                }
                interval.min(limit - elapsed)
            }
        };

        tokio::select! {
            biased;
            err = ctx.done() => return Err(WaitError::Context(err)),
            _ = sleep(pause) => {}
        }
    }
}
