//! Column registry
//!
//! Maps table name → field name → column definition. Populated once at
//! startup before any query is compiled, then shared immutably (typically
//! behind an `Arc`). Filter fields resolve through the registry, so only
//! registered identifiers ever reach the SQL text; filter values are always
//! bound, never interpolated.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::FilterError;
use crate::filter::BindValue;

/// SQL type of a registered column, used to coerce JSON filter values into
/// typed binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Boolean,
    Integer,
    Float,
    Text,
    Uuid,
    Timestamp,
    Json,
}

/// A registered column: the SQL identifier plus its type.
#[derive(Debug, Clone)]
pub struct ColumnDef {
    name: String,
    ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// SQL identifier of this column.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.ty
    }

    /// Coerce a JSON filter value into a typed bind for this column.
    pub fn bind_value(&self, field: &str, value: &JsonValue) -> Result<BindValue, FilterError> {
        let mismatch = |expected: &'static str| FilterError::ValueType {
            field: field.to_string(),
            expected,
        };

        match self.ty {
            ColumnType::Boolean => value
                .as_bool()
                .map(BindValue::Bool)
                .ok_or_else(|| mismatch("boolean")),
            ColumnType::Integer => value
                .as_i64()
                .map(BindValue::Int)
                .ok_or_else(|| mismatch("integer")),
            ColumnType::Float => value
                .as_f64()
                .map(BindValue::Float)
                .ok_or_else(|| mismatch("number")),
            ColumnType::Text => value
                .as_str()
                .map(|s| BindValue::Text(s.to_string()))
                .ok_or_else(|| mismatch("string")),
            ColumnType::Uuid => value
                .as_str()
                .and_then(|s| Uuid::parse_str(s).ok())
                .map(BindValue::Uuid)
                .ok_or_else(|| mismatch("uuid")),
            ColumnType::Timestamp => value
                .as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| BindValue::Timestamp(dt.with_timezone(&Utc)))
                .ok_or_else(|| mismatch("rfc3339 timestamp")),
            ColumnType::Json => Ok(BindValue::Json(value.clone())),
        }
    }
}

/// Table → column metadata for the process lifetime.
///
/// Built during initialization with [`ColumnRegistry::register`], read-only
/// afterwards. Tests swap in a registry with fake tables.
#[derive(Debug, Default)]
pub struct ColumnRegistry {
    tables: HashMap<String, HashMap<String, ColumnDef>>,
}

impl ColumnRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table and its columns. Called once per table at startup;
    /// registering the same table again replaces its column set.
    pub fn register<I>(&mut self, table: impl Into<String>, columns: I)
    where
        I: IntoIterator<Item = (&'static str, ColumnDef)>,
    {
        let columns = columns
            .into_iter()
            .map(|(field, def)| (field.to_string(), def))
            .collect();
        self.tables.insert(table.into(), columns);
    }

    /// All columns of a registered table.
    pub fn columns(&self, table: &str) -> Result<&HashMap<String, ColumnDef>, FilterError> {
        self.tables.get(table).ok_or_else(|| FilterError::UnknownTable {
            table: table.to_string(),
        })
    }

    /// Resolve a single field of a registered table.
    pub fn column(&self, table: &str, field: &str) -> Result<&ColumnDef, FilterError> {
        self.columns(table)?
            .get(field)
            .ok_or_else(|| FilterError::UnknownField {
                table: table.to_string(),
                field: field.to_string(),
            })
    }
}
