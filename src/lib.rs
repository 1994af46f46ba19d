//! formdb — typed data-access core
//!
//! A small layer over Postgres that gives every data operation a uniform
//! timeout, bounded retry, and a closed error taxonomy, plus a declarative
//! filter-expression compiler that turns a serializable condition tree into
//! a bound SQL predicate.
//!
//! Flow: a caller builds a [`FilterExpression`]; the [`Repository`] compiles
//! it through the [`ColumnRegistry`] into a [`SqlPredicate`], then runs the
//! actual I/O through the executor, which applies the timeout/retry policy
//! and result-shape validation. Exactly one [`DbError`] kind comes back per
//! failed call.

pub mod database;
pub mod error;
pub mod executor;
pub mod filter;
pub mod registry;
pub mod repository;

pub use database::{Database, DatabaseConfig};
pub use error::{DbError, ErrorCode, FilterError, OperationKind};
pub use executor::{mutation, query_many, query_single, OperationOptions};
pub use filter::{BindValue, FilterCompiler, FilterCondition, FilterExpression, FilterOperator, SqlPredicate};
pub use registry::{ColumnDef, ColumnRegistry, ColumnType};
pub use repository::Repository;
