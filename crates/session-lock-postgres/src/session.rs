//! PostgreSQL lock session using session-level advisory locks.
//!
//! See <https://www.postgresql.org/docs/current/functions-admin.html#FUNCTIONS-ADVISORY-LOCKS>.

use std::time::Duration;

use session_lock_core::budget::WaitBudget;
use session_lock_core::context::{Context, ContextError};
use session_lock_core::error::{LockError, LockErrorKind, LockResult, Operation};
use session_lock_core::traits::LockSession;
use session_lock_core::wait::{poll_until, WaitError, DEFAULT_POLL_INTERVAL};

use sqlx::postgres::PgArguments;
use sqlx::query::{Query, QueryScalar};
use sqlx::{Connection, PgConnection, PgPool, Postgres};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, field, instrument, warn, Span};

use crate::connection::PostgresConnectionSource;

/// Backend identifier used in errors and spans.
pub const BACKEND: &str = "postgres";

const ADVISORY_LOCK: &str = "SELECT pg_advisory_lock($1)";
const TRY_ADVISORY_LOCK: &str = "SELECT pg_try_advisory_lock($1)";
const ADVISORY_UNLOCK: &str = "SELECT pg_advisory_unlock($1)";
const ADVISORY_UNLOCK_ALL: &str = "SELECT pg_advisory_unlock_all()";

type FlagQuery<'q> = QueryScalar<'q, Postgres, Option<bool>, PgArguments>;
type VoidQuery<'q> = Query<'q, Postgres, PgArguments>;

/// Builder for [`PostgresLockSession`].
pub struct PostgresLockSessionBuilder {
    name: String,
    source: Option<PostgresConnectionSource>,
    poll_interval: Duration,
}

impl PostgresLockSessionBuilder {
    /// Creates a builder for a session labelled `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Opens a new connection from a PostgreSQL connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.source = Some(PostgresConnectionSource::ConnectionString(conn_str.into()));
        self
    }

    /// Takes one dedicated connection out of `pool`.
    pub fn pool(mut self, pool: PgPool) -> Self {
        self.source = Some(PostgresConnectionSource::Pool(pool));
        self
    }

    /// Uses an already open connection.
    pub fn connection(mut self, connection: PgConnection) -> Self {
        self.source = Some(PostgresConnectionSource::Connection(connection));
        self
    }

    /// Sets the delay between `pg_try_advisory_lock` probes while waiting
    /// with a bounded budget.
    ///
    /// Shorter intervals acquire sooner after a release at the cost of more
    /// round trips. Defaults to [`DEFAULT_POLL_INTERVAL`].
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Opens the connection and builds the session.
    pub async fn build(self) -> Result<PostgresLockSession, sqlx::Error> {
        let source = self
            .source
            .ok_or_else(|| sqlx::Error::Configuration("connection not specified".into()))?;
        let connection = source.open().await?;
        Ok(PostgresLockSession::new(self.name, connection).with_poll_interval(self.poll_interval))
    }
}

/// A lock session over one PostgreSQL connection.
///
/// Keys are `bigint` advisory lock keys (see [`advisory_key`](crate::key::advisory_key)
/// for deriving one from a name). Advisory locks are reentrant: a session
/// that acquires a key twice must release it twice.
///
/// PostgreSQL has no "wait up to N" primitive. An indefinite wait budget maps
/// to the blocking `pg_advisory_lock`; any other budget polls
/// `pg_try_advisory_lock` until the budget or the caller's context runs out.
/// Waiters are therefore not served in any particular order.
///
/// Holder introspection (`is_lock_acquired`, `is_lock_free`) is not
/// available and fails with [`LockErrorKind::NotImplemented`].
///
/// If the caller's context fires while a statement is in flight, the
/// connection is discarded so that a pending `pg_advisory_lock` can never be
/// granted behind the caller's back. Later calls fail with
/// [`LockErrorKind::SessionClosed`].
pub struct PostgresLockSession {
    name: String,
    connection: Mutex<Option<PgConnection>>,
    poll_interval: Duration,
}

impl PostgresLockSession {
    /// Returns a new builder for a session labelled `name`.
    pub fn builder(name: impl Into<String>) -> PostgresLockSessionBuilder {
        PostgresLockSessionBuilder::new(name)
    }

    /// Creates a session over an open connection.
    pub fn new(name: impl Into<String>, connection: PgConnection) -> Self {
        Self {
            name: name.into(),
            connection: Mutex::new(Some(connection)),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Creates a session over a new connection to `connection_string`.
    pub async fn connect(
        name: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Result<Self, sqlx::Error> {
        Self::builder(name)
            .connection_string(connection_string)
            .build()
            .await
    }

    /// Sets the delay between probes; see [`PostgresLockSessionBuilder::poll_interval`].
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Closes the connection, which releases every lock this session holds.
    pub async fn close(self) -> Result<(), sqlx::Error> {
        match self.connection.into_inner() {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }

    fn error(&self, operation: Operation, kind: LockErrorKind, message: impl Into<String>) -> LockError {
        LockError::new(BACKEND, operation, self.name.as_str(), kind, message)
    }

    fn context_error(&self, operation: Operation, err: ContextError, stage: &str) -> LockError {
        LockError::from_context(BACKEND, operation, self.name.as_str(), err, stage)
    }

    fn transport_error(&self, ctx: &Context, operation: Operation, err: sqlx::Error) -> LockError {
        driver_error(operation, &self.name, ctx.err(), err)
    }

    async fn lock_connection(
        &self,
        ctx: &Context,
        operation: Operation,
    ) -> LockResult<MutexGuard<'_, Option<PgConnection>>> {
        ctx.run(self.connection.lock())
            .await
            .map_err(|err| self.context_error(operation, err, "waiting for the session connection"))
    }

    fn closed_error(&self, operation: Operation) -> LockError {
        self.error(
            operation,
            LockErrorKind::SessionClosed,
            "session connection was discarded",
        )
    }

    /// Settles a statement raced against `ctx`, discarding the connection when
    /// the statement was abandoned mid-flight.
    fn settle<T>(
        &self,
        ctx: &Context,
        operation: Operation,
        guard: &mut MutexGuard<'_, Option<PgConnection>>,
        result: Result<Result<T, sqlx::Error>, ContextError>,
    ) -> LockResult<T> {
        match result {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(self.transport_error(ctx, operation, err)),
            Err(err) => {
                guard.take();
                warn!(
                    backend = BACKEND,
                    session = %self.name,
                    %operation,
                    "statement abandoned, connection discarded"
                );
                Err(self.context_error(operation, err, "querying row"))
            }
        }
    }

    async fn fetch_flag(
        &self,
        ctx: &Context,
        operation: Operation,
        query: FlagQuery<'_>,
    ) -> LockResult<Option<bool>> {
        let mut guard = self.lock_connection(ctx, operation).await?;
        let Some(connection) = guard.as_mut() else {
            return Err(self.closed_error(operation));
        };
        let result = ctx.run(query.fetch_one(connection)).await;
        self.settle(ctx, operation, &mut guard, result)
    }

    async fn execute(&self, ctx: &Context, operation: Operation, query: VoidQuery<'_>) -> LockResult<()> {
        let mut guard = self.lock_connection(ctx, operation).await?;
        let Some(connection) = guard.as_mut() else {
            return Err(self.closed_error(operation));
        };
        let result = ctx.run(query.execute(connection)).await;
        self.settle(ctx, operation, &mut guard, result).map(|_| ())
    }

    /// One non-blocking attempt; `Ok(false)` while another session holds `key`.
    async fn try_lock(&self, ctx: &Context, key: i64) -> LockResult<bool> {
        let operation = Operation::AcquireLock;
        let result = self
            .fetch_flag(ctx, operation, sqlx::query_scalar(TRY_ADVISORY_LOCK).bind(key))
            .await?;
        debug!(?result, key, "pg_try_advisory_lock answered");
        try_lock_outcome(result).map_err(|kind| {
            self.error(
                operation,
                kind,
                format!("pg_try_advisory_lock returned NULL for {}", key),
            )
        })
    }
}

/// Driver errors observed after the caller gave up are reported as the
/// caller's cancellation, whichever stage of the statement raised them.
fn driver_error(
    operation: Operation,
    session: &str,
    ctx_err: Option<ContextError>,
    err: sqlx::Error,
) -> LockError {
    match ctx_err {
        Some(ctx_err) => LockError::from_context(BACKEND, operation, session, ctx_err, "querying row"),
        None => LockError::new(BACKEND, operation, session, LockErrorKind::Transport, "query failed")
            .with_source(err),
    }
}

fn try_lock_outcome(result: Option<bool>) -> Result<bool, LockErrorKind> {
    result.ok_or(LockErrorKind::Unknown)
}

fn unlock_outcome(result: Option<bool>) -> Result<(), LockErrorKind> {
    match result {
        // The server also logs a warning for this.
        Some(false) => Err(LockErrorKind::NotOwned),
        Some(true) | None => Ok(()),
    }
}

impl LockSession for PostgresLockSession {
    type Key = i64;

    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn supports(&self, operation: Operation) -> bool {
        !matches!(operation, Operation::IsLockAcquired | Operation::IsLockFree)
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name, outcome = field::Empty))]
    async fn acquire_lock(&self, ctx: &Context, key: &i64, wait: WaitBudget) -> LockResult<()> {
        let operation = Operation::AcquireLock;
        let key = *key;

        if wait.is_indefinite() {
            self.execute(ctx, operation, sqlx::query(ADVISORY_LOCK).bind(key))
                .await?;
            Span::current().record("outcome", "acquired");
            return Ok(());
        }

        let result = poll_until(ctx, wait, self.poll_interval, move || self.try_lock(ctx, key)).await;
        match result {
            Ok(()) => {
                Span::current().record("outcome", "acquired");
                Ok(())
            }
            Err(WaitError::Timeout) => {
                Span::current().record("outcome", field::display(LockErrorKind::Timeout));
                Err(self.error(
                    operation,
                    LockErrorKind::Timeout,
                    format!("timed out after {} waiting for advisory lock {}", wait, key),
                ))
            }
            Err(WaitError::Context(err)) => {
                Span::current().record("outcome", field::display(err));
                Err(self.context_error(operation, err, "waiting for the lock"))
            }
            Err(WaitError::Probe(err)) => {
                Span::current().record("outcome", field::display(err.kind()));
                Err(err)
            }
        }
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name, outcome = field::Empty))]
    async fn release_lock(&self, ctx: &Context, key: &i64) -> LockResult<()> {
        let operation = Operation::ReleaseLock;
        let result = self
            .fetch_flag(ctx, operation, sqlx::query_scalar(ADVISORY_UNLOCK).bind(*key))
            .await?;
        debug!(?result, "pg_advisory_unlock answered");

        match unlock_outcome(result) {
            Ok(()) => {
                Span::current().record("outcome", "released");
                Ok(())
            }
            Err(kind) => {
                Span::current().record("outcome", field::display(kind));
                Err(self.error(
                    operation,
                    kind,
                    format!("advisory lock {} not held by this session", key),
                ))
            }
        }
    }

    async fn is_lock_acquired(&self, _ctx: &Context, key: &i64) -> LockResult<bool> {
        Err(self.error(
            Operation::IsLockAcquired,
            LockErrorKind::NotImplemented,
            format!("advisory locks expose no holder query (key {})", key),
        ))
    }

    async fn is_lock_free(&self, _ctx: &Context, key: &i64) -> LockResult<bool> {
        Err(self.error(
            Operation::IsLockFree,
            LockErrorKind::NotImplemented,
            format!("advisory locks expose no holder query (key {})", key),
        ))
    }

    /// Always reports zero: `pg_advisory_unlock_all` does not say how many
    /// locks it released.
    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name))]
    async fn release_all_locks(&self, ctx: &Context) -> LockResult<u64> {
        self.execute(ctx, Operation::ReleaseAllLocks, sqlx::query(ADVISORY_UNLOCK_ALL))
            .await?;
        Ok(0)
    }
}
