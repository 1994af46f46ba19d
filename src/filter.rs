//! Filter expression compiler
//!
//! Turns a serializable boolean condition tree into a Postgres predicate:
//! SQL text fragments interleaved with typed bind values. Field names resolve
//! through the [`ColumnRegistry`](crate::registry::ColumnRegistry); values are
//! always bound, never spliced into the SQL text.
//!
//! The JSON grammar matches what clients send over the wire:
//!
//! ```json
//! {"and": [
//!   {"field": "id", "operator": "eq", "value": "8d9e…"},
//!   {"field": "email", "operator": "isNotNull"}
//! ]}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::error::FilterError;
use crate::registry::ColumnRegistry;

// ============================================================================
// Expression types
// ============================================================================

/// Comparison/membership/null-check operator of a leaf condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    In,
    IsNull,
    IsNotNull,
}

impl FilterOperator {
    fn as_str(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "eq",
            FilterOperator::Ne => "ne",
            FilterOperator::Gt => "gt",
            FilterOperator::Gte => "gte",
            FilterOperator::Lt => "lt",
            FilterOperator::Lte => "lte",
            FilterOperator::Like => "like",
            FilterOperator::In => "in",
            FilterOperator::IsNull => "isNull",
            FilterOperator::IsNotNull => "isNotNull",
        }
    }

}

/// A single field comparison. `value` is required for every operator except
/// the null checks; for `in` it must be a non-empty sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
}

/// Recursive boolean condition tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpression {
    And { and: Vec<FilterExpression> },
    Or { or: Vec<FilterExpression> },
    Not { not: Box<FilterExpression> },
    Condition(FilterCondition),
}

// ============================================================================
// Compiled predicate
// ============================================================================

/// A typed bind value ready to hand to sqlx.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
    Json(JsonValue),
}

#[derive(Debug, Clone, PartialEq)]
enum PredicatePart {
    Sql(String),
    Bind(BindValue),
}

/// A compiled predicate: SQL fragments interleaved with bind values, in the
/// order they are pushed into a query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SqlPredicate {
    parts: Vec<PredicatePart>,
}

impl SqlPredicate {
    fn push_sql(&mut self, sql: impl Into<String>) {
        self.parts.push(PredicatePart::Sql(sql.into()));
    }

    fn push_bind(&mut self, value: BindValue) {
        self.parts.push(PredicatePart::Bind(value));
    }

    fn extend(&mut self, other: SqlPredicate) {
        self.parts.extend(other.parts);
    }

    /// Bind values in placeholder order.
    pub fn binds(&self) -> Vec<&BindValue> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                PredicatePart::Bind(v) => Some(v),
                PredicatePart::Sql(_) => None,
            })
            .collect()
    }

    /// Render the predicate with `$n` placeholders, for logging and tests.
    pub fn to_sql_string(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let mut n = 0;
        for part in &self.parts {
            match part {
                PredicatePart::Sql(s) => out.push_str(s),
                PredicatePart::Bind(_) => {
                    n += 1;
                    let _ = write!(out, "${n}");
                }
            }
        }
        out
    }

    /// Push this predicate into a query builder, binding values in order.
    pub fn apply(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        for part in &self.parts {
            match part {
                PredicatePart::Sql(s) => {
                    builder.push(s);
                }
                PredicatePart::Bind(value) => match value {
                    BindValue::Bool(v) => {
                        builder.push_bind(*v);
                    }
                    BindValue::Int(v) => {
                        builder.push_bind(*v);
                    }
                    BindValue::Float(v) => {
                        builder.push_bind(*v);
                    }
                    BindValue::Text(v) => {
                        builder.push_bind(v.clone());
                    }
                    BindValue::Uuid(v) => {
                        builder.push_bind(*v);
                    }
                    BindValue::Timestamp(v) => {
                        builder.push_bind(*v);
                    }
                    BindValue::Json(v) => {
                        builder.push_bind(v.clone());
                    }
                },
            }
        }
    }
}

// ============================================================================
// Compiler
// ============================================================================

/// Compiles [`FilterExpression`] trees against one table's registered columns.
pub struct FilterCompiler<'a> {
    table: &'a str,
    registry: &'a ColumnRegistry,
}

impl<'a> FilterCompiler<'a> {
    pub fn new(table: &'a str, registry: &'a ColumnRegistry) -> Self {
        Self { table, registry }
    }

    /// Compile an optional expression. `None` means "no filter"; whether that
    /// is allowed is the caller's decision (see full-scan protection in the
    /// repository layer).
    pub fn compile(
        &self,
        expression: Option<&FilterExpression>,
    ) -> Result<Option<SqlPredicate>, FilterError> {
        match expression {
            None => Ok(None),
            Some(expr) => self.compile_expression(expr).map(Some),
        }
    }

    fn compile_expression(&self, expression: &FilterExpression) -> Result<SqlPredicate, FilterError> {
        match expression {
            FilterExpression::And { and } => self.compile_group(and, "AND"),
            FilterExpression::Or { or } => self.compile_group(or, "OR"),
            FilterExpression::Not { not } => {
                let mut predicate = SqlPredicate::default();
                predicate.push_sql("NOT (");
                predicate.extend(self.compile_expression(not)?);
                predicate.push_sql(")");
                Ok(predicate)
            }
            FilterExpression::Condition(condition) => self.compile_condition(condition),
        }
    }

    /// Left-to-right fold over `and`/`or` children; the first child seeds the
    /// fold. An empty child list is rejected rather than folded into a
    /// vacuous predicate.
    fn compile_group(
        &self,
        children: &[FilterExpression],
        connective: &'static str,
    ) -> Result<SqlPredicate, FilterError> {
        let (first, rest) = children
            .split_first()
            .ok_or(FilterError::EmptyGroup { connective })?;

        let mut predicate = SqlPredicate::default();
        predicate.push_sql("(");
        predicate.extend(self.compile_expression(first)?);
        for child in rest {
            predicate.push_sql(format!(" {connective} "));
            predicate.extend(self.compile_expression(child)?);
        }
        predicate.push_sql(")");
        Ok(predicate)
    }

    fn compile_condition(&self, condition: &FilterCondition) -> Result<SqlPredicate, FilterError> {
        let column = self.registry.column(self.table, &condition.field)?;
        let mut predicate = SqlPredicate::default();

        match condition.operator {
            FilterOperator::IsNull => {
                predicate.push_sql(format!("{} IS NULL", column.name()));
            }
            FilterOperator::IsNotNull => {
                predicate.push_sql(format!("{} IS NOT NULL", column.name()));
            }
            FilterOperator::In => {
                let value = self.required_value(condition)?;
                let elements = value.as_array().ok_or_else(|| FilterError::NotASequence {
                    field: condition.field.clone(),
                })?;
                if elements.is_empty() {
                    return Err(FilterError::EmptySequence {
                        field: condition.field.clone(),
                    });
                }

                predicate.push_sql(format!("{} IN (", column.name()));
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        predicate.push_sql(", ");
                    }
                    predicate.push_bind(column.bind_value(&condition.field, element)?);
                }
                predicate.push_sql(")");
            }
            FilterOperator::Like => {
                let value = self.required_value(condition)?;
                // LIKE patterns are text regardless of the column's type.
                let pattern = value.as_str().ok_or_else(|| FilterError::ValueType {
                    field: condition.field.clone(),
                    expected: "string",
                })?;
                predicate.push_sql(format!("{} LIKE ", column.name()));
                predicate.push_bind(BindValue::Text(pattern.to_string()));
            }
            FilterOperator::Eq
            | FilterOperator::Ne
            | FilterOperator::Gt
            | FilterOperator::Gte
            | FilterOperator::Lt
            | FilterOperator::Lte => {
                let value = self.required_value(condition)?;
                let token = match condition.operator {
                    FilterOperator::Eq => "=",
                    FilterOperator::Ne => "<>",
                    FilterOperator::Gt => ">",
                    FilterOperator::Gte => ">=",
                    FilterOperator::Lt => "<",
                    FilterOperator::Lte => "<=",
                    _ => unreachable!("handled above"),
                };
                predicate.push_sql(format!("{} {} ", column.name(), token));
                predicate.push_bind(column.bind_value(&condition.field, value)?);
            }
        }

        Ok(predicate)
    }

    fn required_value<'c>(
        &self,
        condition: &'c FilterCondition,
    ) -> Result<&'c JsonValue, FilterError> {
        condition.value.as_ref().ok_or_else(|| FilterError::MissingValue {
            field: condition.field.clone(),
            operator: condition.operator.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{ColumnDef, ColumnType};
    use serde_json::json;

    fn registry() -> ColumnRegistry {
        let mut registry = ColumnRegistry::new();
        registry.register(
            "users",
            [
                ("id", ColumnDef::new("id", ColumnType::Uuid)),
                ("email", ColumnDef::new("email", ColumnType::Text)),
                ("name", ColumnDef::new("name", ColumnType::Text)),
                ("age", ColumnDef::new("age", ColumnType::Integer)),
                ("createdAt", ColumnDef::new("created_at", ColumnType::Timestamp)),
            ],
        );
        registry
    }

    fn compile(expr: &FilterExpression) -> Result<SqlPredicate, FilterError> {
        let registry = registry();
        let compiler = FilterCompiler::new("users", &registry);
        compiler.compile(Some(expr)).map(|p| p.expect("predicate"))
    }

    fn parse(json: serde_json::Value) -> FilterExpression {
        serde_json::from_value(json).expect("valid filter json")
    }

    #[test]
    fn none_compiles_to_none() {
        let registry = registry();
        let compiler = FilterCompiler::new("users", &registry);
        assert!(compiler.compile(None).unwrap().is_none());
    }

    #[test]
    fn simple_equality() {
        let expr = parse(json!({"field": "age", "operator": "eq", "value": 30}));
        let predicate = compile(&expr).unwrap();
        assert_eq!(predicate.to_sql_string(), "age = $1");
        assert_eq!(predicate.binds(), vec![&BindValue::Int(30)]);
    }

    #[test]
    fn end_to_end_and_group() {
        let expr = parse(json!({"and": [
            {"field": "id", "operator": "eq", "value": "8d9e0a5c-3f64-4aab-9d11-111111111111"},
            {"field": "email", "operator": "isNotNull"}
        ]}));
        let predicate = compile(&expr).unwrap();
        assert_eq!(predicate.to_sql_string(), "(id = $1 AND email IS NOT NULL)");
        assert_eq!(predicate.binds().len(), 1);
        assert!(matches!(predicate.binds()[0], BindValue::Uuid(_)));
    }

    #[test]
    fn nested_or_not() {
        let expr = parse(json!({"or": [
            {"not": {"field": "age", "operator": "lt", "value": 18}},
            {"and": [
                {"field": "name", "operator": "like", "value": "A%"},
                {"field": "age", "operator": "gte", "value": 21}
            ]}
        ]}));
        let predicate = compile(&expr).unwrap();
        assert_eq!(
            predicate.to_sql_string(),
            "(NOT (age < $1) OR (name LIKE $2 AND age >= $3))"
        );
    }

    #[test]
    fn in_binds_each_element() {
        let expr = parse(json!({"field": "age", "operator": "in", "value": [18, 21, 65]}));
        let predicate = compile(&expr).unwrap();
        assert_eq!(predicate.to_sql_string(), "age IN ($1, $2, $3)");
        assert_eq!(
            predicate.binds(),
            vec![&BindValue::Int(18), &BindValue::Int(21), &BindValue::Int(65)]
        );
    }

    #[test]
    fn in_rejects_non_sequence() {
        let expr = parse(json!({"field": "age", "operator": "in", "value": 18}));
        assert_eq!(
            compile(&expr).unwrap_err(),
            FilterError::NotASequence {
                field: "age".into()
            }
        );
    }

    #[test]
    fn in_rejects_empty_sequence() {
        let expr = parse(json!({"field": "age", "operator": "in", "value": []}));
        assert_eq!(
            compile(&expr).unwrap_err(),
            FilterError::EmptySequence {
                field: "age".into()
            }
        );
    }

    #[test]
    fn empty_groups_are_rejected() {
        let expr = parse(json!({"and": []}));
        assert_eq!(
            compile(&expr).unwrap_err(),
            FilterError::EmptyGroup { connective: "AND" }
        );

        let expr = parse(json!({"or": []}));
        assert_eq!(
            compile(&expr).unwrap_err(),
            FilterError::EmptyGroup { connective: "OR" }
        );
    }

    #[test]
    fn missing_value_is_rejected() {
        let expr = parse(json!({"field": "email", "operator": "eq"}));
        assert_eq!(
            compile(&expr).unwrap_err(),
            FilterError::MissingValue {
                field: "email".into(),
                operator: "eq".into()
            }
        );
    }

    #[test]
    fn unknown_field_fails_compilation() {
        let expr = parse(json!({"field": "nickname", "operator": "eq", "value": "x"}));
        assert_eq!(
            compile(&expr).unwrap_err(),
            FilterError::UnknownField {
                table: "users".into(),
                field: "nickname".into()
            }
        );
    }

    #[test]
    fn unknown_table_fails_compilation() {
        let registry = registry();
        let compiler = FilterCompiler::new("ghosts", &registry);
        let expr = parse(json!({"field": "id", "operator": "isNull"}));
        assert_eq!(
            compiler.compile(Some(&expr)).unwrap_err(),
            FilterError::UnknownTable {
                table: "ghosts".into()
            }
        );
    }

    #[test]
    fn registry_maps_field_to_sql_identifier() {
        let expr = parse(json!({"field": "createdAt", "operator": "gte", "value": "2024-01-01T00:00:00Z"}));
        let predicate = compile(&expr).unwrap();
        assert_eq!(predicate.to_sql_string(), "created_at >= $1");
        assert!(matches!(predicate.binds()[0], BindValue::Timestamp(_)));
    }

    #[test]
    fn compilation_is_deterministic() {
        let expr = parse(json!({"and": [
            {"field": "email", "operator": "like", "value": "%@example.com"},
            {"or": [
                {"field": "age", "operator": "gt", "value": 18},
                {"field": "age", "operator": "isNull"}
            ]}
        ]}));
        let first = compile(&expr).unwrap();
        let second = compile(&expr).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_sql_string(), second.to_sql_string());
    }

    #[test]
    fn condition_round_trips_through_serde() {
        let expr = parse(json!({"field": "email", "operator": "isNotNull"}));
        let FilterExpression::Condition(condition) = &expr else {
            panic!("expected a leaf condition");
        };
        assert_eq!(condition.operator, FilterOperator::IsNotNull);
        assert!(condition.value.is_none());

        let serialized = serde_json::to_value(&expr).unwrap();
        assert_eq!(serialized, json!({"field": "email", "operator": "isNotNull"}));
    }
}
