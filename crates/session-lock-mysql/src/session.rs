//! MySQL lock session using GET_LOCK / RELEASE_LOCK.
//!
//! See <https://dev.mysql.com/doc/refman/8.0/en/locking-functions.html>.

use session_lock_core::budget::WaitBudget;
use session_lock_core::context::{Context, ContextError};
use session_lock_core::error::{LockError, LockErrorKind, LockResult, Operation};
use session_lock_core::traits::LockSession;

use sqlx::mysql::MySqlArguments;
use sqlx::query::QueryScalar;
use sqlx::{Connection, MySql, MySqlConnection, MySqlPool};
use tokio::sync::Mutex;
use tracing::{debug, field, instrument, warn, Span};

use crate::connection::MySqlConnectionSource;
use crate::name::fit_lock_name;

/// Backend identifier used in errors and spans.
pub const BACKEND: &str = "mysql";

// Every function result is cast to SIGNED so it decodes as i64 regardless of
// the integer width the server reports.
const GET_LOCK: &str = "SELECT CAST(GET_LOCK(?, ?) AS SIGNED)";
const RELEASE_LOCK: &str = "SELECT CAST(RELEASE_LOCK(?) AS SIGNED)";
const IS_USED_LOCK: &str = "SELECT CAST(IS_USED_LOCK(?) AS SIGNED)";
const IS_FREE_LOCK: &str = "SELECT CAST(IS_FREE_LOCK(?) AS SIGNED)";
const RELEASE_ALL_LOCKS: &str = "SELECT CAST(RELEASE_ALL_LOCKS() AS SIGNED)";

type ScalarQuery<'q> = QueryScalar<'q, MySql, Option<i64>, MySqlArguments>;

/// Builder for [`MySqlLockSession`].
pub struct MySqlLockSessionBuilder {
    name: String,
    source: Option<MySqlConnectionSource>,
}

impl MySqlLockSessionBuilder {
    /// Creates a builder for a session labelled `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
        }
    }

    /// Opens a new connection from a MySQL connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.source = Some(MySqlConnectionSource::ConnectionString(conn_str.into()));
        self
    }

    /// Takes one dedicated connection out of `pool`.
    pub fn pool(mut self, pool: MySqlPool) -> Self {
        self.source = Some(MySqlConnectionSource::Pool(pool));
        self
    }

    /// Uses an already open connection.
    pub fn connection(mut self, connection: MySqlConnection) -> Self {
        self.source = Some(MySqlConnectionSource::Connection(connection));
        self
    }

    /// Opens the connection and builds the session.
    pub async fn build(self) -> Result<MySqlLockSession, sqlx::Error> {
        let source = self
            .source
            .ok_or_else(|| sqlx::Error::Configuration("connection not specified".into()))?;
        let connection = source.open().await?;
        Ok(MySqlLockSession::new(self.name, connection))
    }
}

/// A lock session over one MySQL connection.
///
/// Named locks are owned by the connection. They are released by
/// [`release_lock`](LockSession::release_lock),
/// [`release_all_locks`](LockSession::release_all_locks), or when the
/// connection ends, including when the session is dropped.
///
/// If the caller's context fires while a statement is in flight, the
/// connection is discarded: the server may still grant a pending `GET_LOCK`,
/// and closing the connection is the only way to guarantee it does not stay
/// held. Later calls fail with [`LockErrorKind::SessionClosed`].
pub struct MySqlLockSession {
    name: String,
    connection: Mutex<Option<MySqlConnection>>,
}

impl MySqlLockSession {
    /// Returns a new builder for a session labelled `name`.
    pub fn builder(name: impl Into<String>) -> MySqlLockSessionBuilder {
        MySqlLockSessionBuilder::new(name)
    }

    /// Creates a session over an open connection.
    pub fn new(name: impl Into<String>, connection: MySqlConnection) -> Self {
        Self {
            name: name.into(),
            connection: Mutex::new(Some(connection)),
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

    async fn fetch(
        &self,
        ctx: &Context,
        operation: Operation,
        query: ScalarQuery<'_>,
    ) -> LockResult<Option<i64>> {
        let mut guard = ctx
            .run(self.connection.lock())
            .await
            .map_err(|err| self.context_error(operation, err, "waiting for the session connection"))?;
        let connection = guard.as_mut().ok_or_else(|| {
            self.error(
                operation,
                LockErrorKind::SessionClosed,
                "session connection was discarded",
            )
        })?;

        match ctx.run(query.fetch_one(connection)).await {
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

fn get_lock_outcome(result: Option<i64>) -> Result<(), LockErrorKind> {
    match result {
        // Out of memory, or the waiting thread was killed.
        None => Err(LockErrorKind::AcquisitionFailed),
        Some(0) => Err(LockErrorKind::Timeout),
        Some(1) => Ok(()),
        Some(_) => Err(LockErrorKind::Unknown),
    }
}

fn release_lock_outcome(result: Option<i64>) -> Result<(), LockErrorKind> {
    match result {
        None => Err(LockErrorKind::DoesNotExist),
        // Held, but by another connection; not released.
        Some(0) => Err(LockErrorKind::NotOwned),
        Some(1) => Ok(()),
        Some(_) => Err(LockErrorKind::Unknown),
    }
}

/// `IS_USED_LOCK` answers with the holder's connection id.
fn is_used_outcome(result: Option<i64>) -> bool {
    result.is_some()
}

fn is_free_outcome(result: Option<i64>) -> Result<bool, LockErrorKind> {
    match result {
        // Incorrect argument or server anomaly.
        None => Err(LockErrorKind::Unknown),
        Some(0) => Ok(false),
        Some(1) => Ok(true),
        Some(_) => Err(LockErrorKind::Unknown),
    }
}

fn release_all_outcome(result: Option<i64>) -> Result<u64, LockErrorKind> {
    result
        .and_then(|count| u64::try_from(count).ok())
        .ok_or(LockErrorKind::Unknown)
}

impl LockSession for MySqlLockSession {
    type Key = str;

    fn name(&self) -> &str {
        &self.name
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name, outcome = field::Empty))]
    async fn acquire_lock(&self, ctx: &Context, key: &str, wait: WaitBudget) -> LockResult<()> {
        let operation = Operation::AcquireLock;
        let lock_name = fit_lock_name(key);
        let seconds = wait.as_whole_secs();

        let result = self
            .fetch(
                ctx,
                operation,
                sqlx::query_scalar(GET_LOCK)
                    .bind(lock_name.as_ref())
                    .bind(seconds),
            )
            .await?;
        debug!(?result, seconds, "GET_LOCK answered");

        match get_lock_outcome(result) {
            Ok(()) => {
                Span::current().record("outcome", "acquired");
                Ok(())
            }
            Err(kind) => {
                Span::current().record("outcome", field::display(kind));
                if kind == LockErrorKind::Timeout {
                    if let Some(err) = ctx.err() {
                        return Err(self.context_error(operation, err, "waiting for the lock"));
                    }
                }
                let message = match kind {
                    LockErrorKind::AcquisitionFailed => {
                        format!("failed to acquire lock on `{}` within {}", key, wait)
                    }
                    LockErrorKind::Timeout => format!("timed out after {} waiting for `{}`", wait, key),
                    _ => format!("unexpected GET_LOCK result {:?} for `{}`", result, key),
                };
                Err(self.error(operation, kind, message))
            }
        }
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name, outcome = field::Empty))]
    async fn release_lock(&self, ctx: &Context, key: &str) -> LockResult<()> {
        let operation = Operation::ReleaseLock;
        let lock_name = fit_lock_name(key);

        let result = self
            .fetch(
                ctx,
                operation,
                sqlx::query_scalar(RELEASE_LOCK).bind(lock_name.as_ref()),
            )
            .await?;
        debug!(?result, "RELEASE_LOCK answered");

        match release_lock_outcome(result) {
            Ok(()) => {
                Span::current().record("outcome", "released");
                Ok(())
            }
            Err(kind) => {
                Span::current().record("outcome", field::display(kind));
                let message = match kind {
                    LockErrorKind::DoesNotExist => format!("lock on `{}` does not exist", key),
                    LockErrorKind::NotOwned => format!("lock on `{}` not owned by this session", key),
                    _ => format!("unexpected RELEASE_LOCK result {:?} for `{}`", result, key),
                };
                Err(self.error(operation, kind, message))
            }
        }
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name))]
    async fn is_lock_acquired(&self, ctx: &Context, key: &str) -> LockResult<bool> {
        let lock_name = fit_lock_name(key);
        let holder = self
            .fetch(
                ctx,
                Operation::IsLockAcquired,
                sqlx::query_scalar(IS_USED_LOCK).bind(lock_name.as_ref()),
            )
            .await?;
        debug!(?holder, "IS_USED_LOCK answered");
        Ok(is_used_outcome(holder))
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name))]
    async fn is_lock_free(&self, ctx: &Context, key: &str) -> LockResult<bool> {
        let operation = Operation::IsLockFree;
        let lock_name = fit_lock_name(key);
        let result = self
            .fetch(
                ctx,
                operation,
                sqlx::query_scalar(IS_FREE_LOCK).bind(lock_name.as_ref()),
            )
            .await?;
        debug!(?result, "IS_FREE_LOCK answered");

        is_free_outcome(result).map_err(|kind| {
            self.error(
                operation,
                kind,
                format!(
                    "unknown IS_FREE_LOCK result {:?} for `{}` (possibly an incorrect argument)",
                    result, key
                ),
            )
        })
    }

    #[instrument(skip(self, ctx), fields(backend = BACKEND, session = %self.name))]
    async fn release_all_locks(&self, ctx: &Context) -> LockResult<u64> {
        let operation = Operation::ReleaseAllLocks;
        let result = self
            .fetch(ctx, operation, sqlx::query_scalar(RELEASE_ALL_LOCKS))
            .await?;
        debug!(?result, "RELEASE_ALL_LOCKS answered");

        release_all_outcome(result).map_err(|kind| {
            self.error(
                operation,
                kind,
                format!("unexpected RELEASE_ALL_LOCKS result {:?}", result),
            )
        })
    }
}
