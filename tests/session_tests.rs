//! Contract tests for code written against `LockSession`.
//!
//! Runs on an in-memory session and paused tokio time, so the wait and
//! cancellation rules can be checked to the millisecond.

use session_lock_core::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

mod common;
use common::mock_session::{MockDatabase, MockLockSession};

/// Exercises the full lifecycle through the trait only.
async fn test_session_abstraction<S>(session: &S, key: &S::Key)
where
    S: LockSession,
{
    let ctx = Context::background().with_timeout(Duration::from_secs(30));

    session
        .acquire_lock(&ctx, key, WaitBudget::from_secs(1))
        .await
        .unwrap();
    assert!(session.is_lock_acquired(&ctx, key).await.unwrap());
    assert!(!session.is_lock_free(&ctx, key).await.unwrap());

    session.release_lock(&ctx, key).await.unwrap();
    assert!(session.is_lock_free(&ctx, key).await.unwrap());
    assert!(!session.is_lock_acquired(&ctx, key).await.unwrap());

    assert_eq!(session.release_all_locks(&ctx).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_basic_lifecycle() {
    let db = MockDatabase::new();
    let session = db.session("test-lock-1");
    test_session_abstraction(&session, "orders").await;
    assert_eq!(session.name(), "test-lock-1");
    assert!(Operation::ALL.iter().all(|op| session.supports(*op)));
}

#[tokio::test(start_paused = true)]
async fn test_two_sessions_sequential() {
    let db = MockDatabase::new();
    let first = db.session("test-lock-1");
    let second = db.session("test-lock-2");
    let ctx = Context::background();

    first
        .acquire_lock(&ctx, "orders", WaitBudget::ZERO)
        .await
        .unwrap();

    let start = Instant::now();
    let err = second
        .acquire_lock(&ctx, "orders", WaitBudget::from_secs(1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::Timeout);
    assert_eq!(start.elapsed(), Duration::from_secs(1));

    let err = second.release_lock(&ctx, "orders").await.unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::NotOwned);
    assert_eq!(err.session(), "test-lock-2");

    first.release_lock(&ctx, "orders").await.unwrap();

    second
        .acquire_lock(&ctx, "orders", WaitBudget::ZERO)
        .await
        .unwrap();
    second.release_lock(&ctx, "orders").await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_release_never_acquired() {
    let db = MockDatabase::new();
    let session = db.session("test-lock-1");
    let err = session
        .release_lock(&Context::background(), "never-taken")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::DoesNotExist);
}

#[tokio::test(start_paused = true)]
async fn test_zero_budget_does_not_wait() {
    let db = MockDatabase::new();
    let holder = db.session("holder");
    let contender = db.session("contender");
    let ctx = Context::background();

    holder.acquire_lock(&ctx, "k", WaitBudget::ZERO).await.unwrap();

    let start = Instant::now();
    let err = contender
        .acquire_lock(&ctx, "k", WaitBudget::ZERO)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::Timeout);
    assert_eq!(start.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_beats_indefinite_wait() {
    let db = MockDatabase::new();
    let holder = db.session("test-lock-1");
    let waiter = db.session("test-lock-2");

    holder
        .acquire_lock(&Context::background(), "k", WaitBudget::ZERO)
        .await
        .unwrap();

    let (ctx, cancel) = Context::cancellable();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
    });

    let start = Instant::now();
    let err = waiter
        .acquire_lock(&ctx, "k", WaitBudget::INDEFINITE)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::Cancelled);
    assert!(err.is_cancellation());
    assert_eq!(start.elapsed(), Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn test_deadline_beats_indefinite_wait() {
    let db = MockDatabase::new();
    let holder = db.session("test-lock-1");
    let waiter = db.session("test-lock-2");

    holder
        .acquire_lock(&Context::background(), "k", WaitBudget::ZERO)
        .await
        .unwrap();

    let ctx = Context::background().with_timeout(Duration::from_secs(2));
    let err = waiter
        .acquire_lock(&ctx, "k", WaitBudget::from_secs(-1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::DeadlineExceeded);
}

#[tokio::test(start_paused = true)]
async fn test_waiter_acquires_after_release() {
    let db = MockDatabase::new();
    let holder = db.session("holder");
    let waiter = db.session("waiter");
    let ctx = Context::background();

    holder.acquire_lock(&ctx, "k", WaitBudget::ZERO).await.unwrap();

    let release = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        holder.release_lock(&ctx, "k").await.unwrap();
    };
    let acquire = waiter.acquire_lock(&ctx, "k", WaitBudget::from_secs(5));

    let ((), acquired) = tokio::join!(release, acquire);
    acquired.unwrap();
    assert!(!holder.is_lock_free(&ctx, "k").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_two_sessions_parallel() {
    let db = MockDatabase::new();
    let sessions: Vec<Arc<MockLockSession>> = vec![
        Arc::new(db.session("test-lock-1")),
        Arc::new(db.session("test-lock-2")),
    ];
    let processed = Arc::new(AtomicU32::new(0));

    let mut tasks = Vec::new();
    for session in &sessions {
        let session = Arc::clone(session);
        let processed = Arc::clone(&processed);
        tasks.push(tokio::spawn(async move {
            let ctx = Context::background().with_timeout(Duration::from_secs(30));
            if session
                .acquire_lock(&ctx, "shared", WaitBudget::from_secs(1))
                .await
                .is_ok()
            {
                // simulate processing time
                tokio::time::sleep(Duration::from_secs(3)).await;
                processed.fetch_add(1, Ordering::SeqCst);
                session.release_lock(&ctx, "shared").await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(processed.load(Ordering::SeqCst), 1);
    for session in &sessions {
        let released = session
            .release_all_locks(&Context::background())
            .await
            .unwrap();
        assert_eq!(released, 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_release_all_counts_only_own_locks() {
    let db = MockDatabase::new();
    let first = db.session("first");
    let second = db.session("second");
    let ctx = Context::background();

    for key in ["a", "b", "c"] {
        first.acquire_lock(&ctx, key, WaitBudget::ZERO).await.unwrap();
    }
    second.acquire_lock(&ctx, "d", WaitBudget::ZERO).await.unwrap();

    assert_eq!(first.release_all_locks(&ctx).await.unwrap(), 3);
    assert!(first.is_lock_free(&ctx, "a").await.unwrap());
    assert!(!first.is_lock_free(&ctx, "d").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_with_lock_releases_after_context_expires() {
    let db = MockDatabase::new();
    let session = db.session("worker");
    let ctx = Context::background().with_timeout(Duration::from_secs(1));

    let output = session
        .with_lock(&ctx, "report", WaitBudget::ZERO, || async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "done"
        })
        .await
        .unwrap();

    assert_eq!(output, "done");
    assert!(ctx.err().is_some());
    assert!(session
        .is_lock_free(&Context::background(), "report")
        .await
        .unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_with_lock_skips_critical_section_on_timeout() {
    let db = MockDatabase::new();
    let holder = db.session("holder");
    let worker = db.session("worker");
    let ctx = Context::background();

    holder.acquire_lock(&ctx, "report", WaitBudget::ZERO).await.unwrap();

    let ran = AtomicBool::new(false);
    let flag = &ran;
    let err = worker
        .with_lock(&ctx, "report", WaitBudget::from_millis(100), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), LockErrorKind::Timeout);
    assert!(!ran.load(Ordering::SeqCst));
}
