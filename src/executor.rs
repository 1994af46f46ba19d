//! Operation executor
//!
//! Wraps one asynchronous database call with a timeout, a bounded blind-retry
//! loop, and result-shape validation. The executor is agnostic to what the
//! thunk does; it only classifies the outcome into the closed [`DbError`]
//! taxonomy.
//!
//! Retries re-run the thunk in full with no backoff, so wrapped operations
//! must be idempotent or acceptable to re-apply. A timed-out attempt is
//! abandoned from the caller's perspective; the server-side statement is not
//! guaranteed to be interrupted.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{DbError, OperationKind};

/// Per-invocation timeout/retry policy. Immutable for the duration of one
/// operation.
#[derive(Debug, Clone, Copy)]
pub struct OperationOptions {
    /// Window each individual attempt must complete within.
    pub timeout: Duration,
    /// Retries after the first attempt; total attempts = `max_retries + 1`.
    pub max_retries: u32,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(10_000),
            max_retries: 3,
        }
    }
}

/// Run a single-row query. A missing row after a successful attempt is
/// promoted to [`DbError::EmptyResultSet`].
pub async fn query_single<T, F, Fut>(run: F, opts: OperationOptions) -> Result<T, DbError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Option<T>, sqlx::Error>>,
{
    let row = run_with_retries(OperationKind::Query, run, opts).await?;
    row.ok_or(DbError::EmptyResultSet)
}

/// Run a multi-row query. An empty collection after a successful attempt is
/// promoted to [`DbError::EmptyResultSet`].
pub async fn query_many<T, F, Fut>(run: F, opts: OperationOptions) -> Result<Vec<T>, DbError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<Vec<T>, sqlx::Error>>,
{
    let rows = run_with_retries(OperationKind::Query, run, opts).await?;
    if rows.is_empty() {
        return Err(DbError::EmptyResultSet);
    }
    Ok(rows)
}

/// Run a mutation. Any successfully returned value is success; there is no
/// emptiness validation.
pub async fn mutation<T, F, Fut>(run: F, opts: OperationOptions) -> Result<T, DbError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>>,
{
    run_with_retries(OperationKind::Mutation, run, opts).await
}

/// The invoke-or-timeout unit, retried as a whole. Attempts are strictly
/// sequential; the last error observed is surfaced once retries exhaust.
async fn run_with_retries<R, F, Fut>(
    kind: OperationKind,
    run: F,
    opts: OperationOptions,
) -> Result<R, DbError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<R, sqlx::Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        attempt += 1;
        debug!(%kind, attempt, "executing database operation");

        let error = match timeout(opts.timeout, run()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(source)) => classify(kind, source),
            Err(_elapsed) => DbError::Timeout {
                timeout: opts.timeout,
            },
        };

        if attempt > opts.max_retries {
            return Err(error);
        }
        warn!(
            %kind,
            attempt,
            max_retries = opts.max_retries,
            %error,
            "database operation failed, retrying"
        );
    }
}

/// Map a thunk failure onto the taxonomy: transport/pool failures become
/// `Connection`, everything else is a `Query` failure tagged with the
/// operation kind.
fn classify(kind: OperationKind, source: sqlx::Error) -> DbError {
    match source {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => DbError::Connection { source },
        _ => DbError::Query {
            operation: kind,
            source,
        },
    }
}
