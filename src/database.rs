//! Database handle
//!
//! Owns the connection pool for one connection string. The pool is created
//! lazily: no connection is established until the first operation runs, and
//! the same pool is reused for the process lifetime. The executor and
//! repositories treat it as an opaque handle.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::error::DbError;
use crate::registry::ColumnRegistry;
use crate::repository::Repository;

/// Connection configuration, typically sourced from the environment.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 10,
        }
    }

    /// Read `DATABASE_URL` from the environment.
    pub fn from_env() -> Result<Self, DbError> {
        let database_url = std::env::var("DATABASE_URL").map_err(|_| DbError::Connection {
            source: sqlx::Error::Configuration("DATABASE_URL is not set".into()),
        })?;
        Ok(Self::new(database_url))
    }
}

/// One database instance per configured connection string.
#[derive(Debug, Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Build the pool without connecting; the first query establishes the
    /// physical connection.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.database_url)
            .map_err(|source| DbError::Connection { source })?;
        info!(max_connections = config.max_connections, "database pool configured");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Repository over one registered table.
    pub fn repository<E>(&self, table: &str, registry: Arc<ColumnRegistry>) -> Repository<E>
    where
        E: for<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> + Send + Unpin,
    {
        Repository::new(self.pool.clone(), table, registry)
    }
}
