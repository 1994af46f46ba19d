//! Database error taxonomy
//!
//! Every failed data operation surfaces exactly one variant of [`DbError`].
//! The set is closed: nothing downstream of the executor introduces new kinds
//! or rethrows a kind as a less specific one, so the boundary adapter can map
//! each variant to a transport status without runtime type inspection.

use std::fmt;
use std::time::Duration;

/// Whether a wrapped operation reads or writes. Carried inside
/// [`DbError::Query`] so failures are diagnosable without the SQL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// One failure kind per failed operation, mutually exclusive.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// The underlying transport/pool failed before the operation could run.
    #[error("database connection error")]
    Connection {
        #[source]
        source: sqlx::Error,
    },

    /// The operation itself failed. `operation` distinguishes reads from writes.
    #[error("database {operation} error")]
    Query {
        operation: OperationKind,
        #[source]
        source: sqlx::Error,
    },

    /// The attempt did not complete within the configured window.
    #[error("database operation timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The operation succeeded but returned zero rows where at least one was
    /// required. Callers needing not-found semantics translate this variant.
    #[error("empty result set")]
    EmptyResultSet,

    /// An unfiltered multi-row read was attempted while full-scan protection
    /// is enabled. Produced before any I/O happens.
    #[error("full scan of table '{table}' is not supported")]
    FullScanRejected { table: String },

    /// The filter expression failed validation before execution. Never
    /// retried: a malformed expression cannot succeed on a second attempt.
    #[error("invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),
}

/// Input-validation failures raised while compiling a filter expression.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilterError {
    #[error("table '{table}' is not registered")]
    UnknownTable { table: String },

    #[error("column '{field}' is not registered for table '{table}'")]
    UnknownField { table: String, field: String },

    #[error("empty {connective} group in filter expression")]
    EmptyGroup { connective: &'static str },

    #[error("operator '{operator}' on field '{field}' requires a value")]
    MissingValue { field: String, operator: String },

    #[error("'in' filter on field '{field}' requires a sequence value")]
    NotASequence { field: String },

    #[error("'in' filter on field '{field}' requires a non-empty sequence")]
    EmptySequence { field: String },

    #[error("value for field '{field}' is not a valid {expected}")]
    ValueType {
        field: String,
        expected: &'static str,
    },
}

/// Coarse classification used by boundary adapters when turning a [`DbError`]
/// into a transport-level status. The actual status/message table lives with
/// the adapter, not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotFound,
    PreconditionFailed,
    BadRequest,
    Internal,
}

impl DbError {
    /// Boundary classification for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DbError::EmptyResultSet => ErrorCode::NotFound,
            DbError::FullScanRejected { .. } => ErrorCode::PreconditionFailed,
            DbError::InvalidFilter(_) => ErrorCode::BadRequest,
            DbError::Connection { .. } | DbError::Query { .. } | DbError::Timeout { .. } => {
                ErrorCode::Internal
            }
        }
    }
}
