//! Generic table repository
//!
//! Composes the filter compiler and the operation executor into find-by-id /
//! find-many semantics over one registered table. Rows map into the domain
//! shape through `sqlx::FromRow`.
//!
//! Both operations are read-only, so they are safe under the executor's
//! blind-retry policy.

use std::marker::PhantomData;
use std::sync::Arc;

use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;

use crate::error::DbError;
use crate::executor::{self, OperationOptions};
use crate::filter::{FilterCompiler, FilterExpression, SqlPredicate};
use crate::registry::ColumnRegistry;

/// Repository over one table, producing rows of type `E`.
pub struct Repository<E> {
    pool: PgPool,
    table: String,
    registry: Arc<ColumnRegistry>,
    opts: OperationOptions,
    _row: PhantomData<fn() -> E>,
}

impl<E> Repository<E>
where
    E: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    pub fn new(pool: PgPool, table: impl Into<String>, registry: Arc<ColumnRegistry>) -> Self {
        Self {
            pool,
            table: table.into(),
            registry,
            opts: OperationOptions::default(),
            _row: PhantomData,
        }
    }

    /// Override the default timeout/retry policy for this repository.
    pub fn with_options(mut self, opts: OperationOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Fetch the single row matching `filter`. Zero rows surface
    /// [`DbError::EmptyResultSet`]; the caller decides whether that means
    /// "not found".
    pub async fn find_by_id(&self, filter: &FilterExpression) -> Result<E, DbError> {
        let compiler = FilterCompiler::new(&self.table, &self.registry);
        let predicate = compiler.compile(Some(filter))?;
        let select_list = self.select_list()?;

        debug!(table = %self.table, "find_by_id");
        executor::query_single(
            || async {
                let mut builder =
                    build_select(&self.table, &select_list, predicate.as_ref(), Some(1));
                builder
                    .build_query_as::<E>()
                    .fetch_optional(&self.pool)
                    .await
            },
            self.opts,
        )
        .await
    }

    /// Fetch all rows matching `filter`. With `prevent_full_scan` and no
    /// filter, fails with [`DbError::FullScanRejected`] before any I/O.
    /// Zero matching rows surface [`DbError::EmptyResultSet`].
    pub async fn find(
        &self,
        filter: Option<&FilterExpression>,
        prevent_full_scan: bool,
    ) -> Result<Vec<E>, DbError> {
        if filter.is_none() && prevent_full_scan {
            return Err(DbError::FullScanRejected {
                table: self.table.clone(),
            });
        }

        let compiler = FilterCompiler::new(&self.table, &self.registry);
        let predicate = compiler.compile(filter)?;
        let select_list = self.select_list()?;

        debug!(table = %self.table, filtered = predicate.is_some(), "find");
        executor::query_many(
            || async {
                let mut builder = build_select(&self.table, &select_list, predicate.as_ref(), None);
                builder.build_query_as::<E>().fetch_all(&self.pool).await
            },
            self.opts,
        )
        .await
    }

    /// Explicit select list from the registry, in deterministic order.
    fn select_list(&self) -> Result<String, DbError> {
        let columns = self.registry.columns(&self.table)?;
        let mut names: Vec<&str> = columns.values().map(|c| c.name()).collect();
        names.sort_unstable();
        Ok(names.join(", "))
    }
}

/// Assemble `SELECT <list> FROM <table> [WHERE <predicate>] [LIMIT n]`.
/// Built fresh per attempt because a query builder is consumed on execution.
fn build_select<'q>(
    table: &str,
    select_list: &str,
    predicate: Option<&SqlPredicate>,
    limit: Option<i64>,
) -> QueryBuilder<'q, Postgres> {
    let mut builder = QueryBuilder::new(format!("SELECT {select_list} FROM {table}"));
    if let Some(predicate) = predicate {
        builder.push(" WHERE ");
        predicate.apply(&mut builder);
    }
    if let Some(limit) = limit {
        builder.push(" LIMIT ");
        builder.push_bind(limit);
    }
    builder
}
