//! In-memory lock session for testing code written against the contract.

use session_lock_core::budget::WaitBudget;
use session_lock_core::context::Context;
use session_lock_core::error::{LockError, LockErrorKind, LockResult, Operation};
use session_lock_core::traits::LockSession;
use session_lock_core::wait::{poll_until, WaitError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const BACKEND: &str = "mock";

/// Shared lock table standing in for the database.
#[derive(Clone, Default)]
pub struct MockDatabase {
    holders: Arc<Mutex<HashMap<String, u64>>>,
    next_session: Arc<AtomicU64>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session with its own identity, like a new connection.
    pub fn session(&self, name: &str) -> MockLockSession {
        MockLockSession {
            id: self.next_session.fetch_add(1, Ordering::SeqCst),
            name: name.to_string(),
            holders: Arc::clone(&self.holders),
        }
    }
}

/// Mock session with MySQL-like release semantics and polled waiting.
pub struct MockLockSession {
    id: u64,
    name: String,
    holders: Arc<Mutex<HashMap<String, u64>>>,
}

impl MockLockSession {
    fn try_lock(&self, key: &str) -> bool {
        let mut holders = self.holders.lock().unwrap();
        match holders.get(key) {
            Some(holder) => *holder == self.id,
            None => {
                holders.insert(key.to_string(), self.id);
                true
            }
        }
    }

    fn error(&self, operation: Operation, kind: LockErrorKind) -> LockError {
        LockError::new(BACKEND, operation, self.name.as_str(), kind, kind.to_string())
    }
}

impl LockSession for MockLockSession {
    type Key = str;

    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn acquire_lock(&self, ctx: &Context, key: &str, wait: WaitBudget) -> LockResult<()> {
        let probe = move || std::future::ready(Ok::<bool, LockError>(self.try_lock(key)));
        match poll_until(ctx, wait, Duration::from_millis(25), probe).await {
            Ok(()) => Ok(()),
            Err(WaitError::Timeout) => Err(self.error(Operation::AcquireLock, LockErrorKind::Timeout)),
            Err(WaitError::Context(err)) => Err(self.error(Operation::AcquireLock, err.into())),
            Err(WaitError::Probe(err)) => Err(err),
        }
    }

    async fn release_lock(&self, _ctx: &Context, key: &str) -> LockResult<()> {
        let mut holders = self.holders.lock().unwrap();
        match holders.get(key) {
            None => Err(self.error(Operation::ReleaseLock, LockErrorKind::DoesNotExist)),
            Some(holder) if *holder != self.id => {
                Err(self.error(Operation::ReleaseLock, LockErrorKind::NotOwned))
            }
            Some(_) => {
                holders.remove(key);
                Ok(())
            }
        }
    }

    async fn is_lock_acquired(&self, _ctx: &Context, key: &str) -> LockResult<bool> {
        Ok(self.holders.lock().unwrap().contains_key(key))
    }

    async fn is_lock_free(&self, _ctx: &Context, key: &str) -> LockResult<bool> {
        Ok(!self.holders.lock().unwrap().contains_key(key))
    }

    async fn release_all_locks(&self, _ctx: &Context) -> LockResult<u64> {
        let mut holders = self.holders.lock().unwrap();
        let before = holders.len();
        holders.retain(|_, holder| *holder != self.id);
        Ok((before - holders.len()) as u64)
    }
}
