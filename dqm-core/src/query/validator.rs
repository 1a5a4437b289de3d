//! Allow-list identifier validation.

use super::{
    BoundValue, Ident, Predicate, SchemaDescriptor, SqlDialect, Statement,
    statement::{count_rows, select_rows},
};
use crate::{DqmError, Result};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Validates table and column names against a schema snapshot and builds
/// parameterized statements from them.
///
/// Membership in the snapshot is the only gate: names are never pattern
/// matched or sanitized, and only names found here become [`Ident`]s.
#[derive(Debug, Clone)]
pub struct QueryValidator {
    schema: Arc<SchemaDescriptor>,
    dialect: SqlDialect,
}

impl QueryValidator {
    /// Creates a validator over a schema snapshot.
    pub fn new(schema: Arc<SchemaDescriptor>, dialect: SqlDialect) -> Self {
        Self { schema, dialect }
    }

    /// The snapshot this validator checks against.
    pub fn schema(&self) -> &SchemaDescriptor {
        &self.schema
    }

    /// Dialect used for rendering statements.
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Returns the table name unchanged if it exists in the snapshot.
    ///
    /// # Errors
    /// `DqmError::Security` when the table is unknown.
    pub fn validate_table(&self, name: &str) -> Result<Ident> {
        if self.schema.contains_table(name) {
            Ok(Ident::from_catalog(name))
        } else {
            tracing::warn!(table = %name, "Rejected table outside schema allow-list");
            Err(DqmError::security(format!(
                "table '{}' is not present in the connection schema",
                name
            )))
        }
    }

    /// Validates one column of an already validated table.
    ///
    /// # Errors
    /// `DqmError::Security` when the column is unknown.
    pub fn validate_column(&self, table: &Ident, column: &str) -> Result<Ident> {
        match self.schema.column(table.as_str(), column) {
            Some(info) => Ok(Ident::from_catalog(&info.name)),
            None => {
                tracing::warn!(
                    table = %table,
                    column = %column,
                    "Rejected column outside schema allow-list"
                );
                Err(DqmError::security(format!(
                    "column '{}' is not present in table '{}'",
                    column, table
                )))
            }
        }
    }

    /// Validates every column of `table`, failing on the first unknown one.
    ///
    /// # Errors
    /// `DqmError::Security` for an unknown table or the first unknown column.
    pub fn validate_columns<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
    ) -> Result<Vec<Ident>> {
        let table = self.validate_table(table)?;
        columns
            .iter()
            .map(|column| self.validate_column(&table, column.as_ref()))
            .collect()
    }

    /// Every column of a validated table, in declaration order.
    pub fn all_columns(&self, table: &Ident) -> Vec<Ident> {
        self.schema
            .columns(table.as_str())
            .unwrap_or_default()
            .iter()
            .map(|c| Ident::from_catalog(&c.name))
            .collect()
    }

    /// Builds the equality predicate for a filter map.
    ///
    /// Keys are validated as columns; values become bound parameters.
    ///
    /// # Errors
    /// `DqmError::Security` for unknown keys, `DqmError::Configuration` for
    /// non-scalar values.
    pub fn filter_predicate(
        &self,
        table: &Ident,
        filters: &BTreeMap<String, JsonValue>,
    ) -> Result<Predicate> {
        let mut pairs = Vec::with_capacity(filters.len());
        for (key, value) in filters {
            let column = self.validate_column(table, key)?;
            pairs.push((column, BoundValue::try_from(value)?));
        }
        Ok(Predicate::Equals(pairs))
    }

    /// Builds `SELECT columns FROM table WHERE key = value AND ...`.
    ///
    /// An empty `columns` slice selects every schema column explicitly.
    /// Filter values are always bound parameters.
    ///
    /// # Errors
    /// `DqmError::Security` for any identifier outside the snapshot.
    pub fn build_parameterized_statement<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        filters: &BTreeMap<String, JsonValue>,
    ) -> Result<Statement> {
        self.build_query_statement(table, columns, filters, None)
    }

    /// [`build_parameterized_statement`](Self::build_parameterized_statement)
    /// with an optional bound row limit.
    ///
    /// # Errors
    /// `DqmError::Security` for any identifier outside the snapshot.
    pub fn build_query_statement<S: AsRef<str>>(
        &self,
        table: &str,
        columns: &[S],
        filters: &BTreeMap<String, JsonValue>,
        limit: Option<u32>,
    ) -> Result<Statement> {
        let table_ident = self.validate_table(table)?;
        let columns = if columns.is_empty() {
            self.all_columns(&table_ident)
        } else {
            self.validate_columns(table, columns)?
        };
        let predicate = if filters.is_empty() {
            None
        } else {
            Some(self.filter_predicate(&table_ident, filters)?)
        };
        Ok(select_rows(
            self.dialect,
            &table_ident,
            &columns,
            predicate.as_ref(),
            limit,
        ))
    }

    /// Builds `SELECT COUNT(*)` for a filter map, with the same validation as
    /// [`build_parameterized_statement`](Self::build_parameterized_statement).
    ///
    /// # Errors
    /// `DqmError::Security` for any identifier outside the snapshot.
    pub fn build_count_statement(
        &self,
        table: &str,
        filters: &BTreeMap<String, JsonValue>,
    ) -> Result<Statement> {
        let table_ident = self.validate_table(table)?;
        let predicate = if filters.is_empty() {
            None
        } else {
            Some(self.filter_predicate(&table_ident, filters)?)
        };
        Ok(count_rows(self.dialect, &table_ident, predicate.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ColumnInfo;
    use serde_json::json;

    fn validator(dialect: SqlDialect) -> QueryValidator {
        let schema = SchemaDescriptor::new()
            .with_table(
                "customers",
                vec![
                    ColumnInfo::new("id", "INTEGER"),
                    ColumnInfo::new("email", "TEXT"),
                    ColumnInfo::new("status", "TEXT"),
                ],
            )
            .with_table("orders", vec![ColumnInfo::new("id", "INTEGER")]);
        QueryValidator::new(Arc::new(schema), dialect)
    }

    #[test]
    fn test_validate_table_known_returns_name_unchanged() {
        let v = validator(SqlDialect::Postgres);
        let ident = v.validate_table("customers");
        assert_eq!(ident.ok().map(|i| i.as_str().to_string()), Some("customers".to_string()));
    }

    #[test]
    fn test_validate_table_unknown_is_security_error() {
        let v = validator(SqlDialect::Postgres);
        for name in ["users", "customers; DROP TABLE orders", "CUSTOMERS", "", "\"customers\""] {
            assert!(
                matches!(v.validate_table(name), Err(DqmError::Security { .. })),
                "expected rejection for {:?}",
                name
            );
        }
    }

    #[test]
    fn test_validate_columns_fails_on_first_missing() {
        let v = validator(SqlDialect::Sqlite);
        let err = v.validate_columns("customers", &["email", "phone", "fax"]);
        match err {
            Err(DqmError::Security { message }) => {
                assert!(message.contains("phone"));
                assert!(!message.contains("fax"));
            }
            other => panic!("expected security error, got {:?}", other),
        }
    }

    #[test]
    fn test_column_of_other_table_is_rejected() {
        let v = validator(SqlDialect::Sqlite);
        assert!(v.validate_columns("orders", &["email"]).is_err());
    }

    #[test]
    fn test_build_statement_binds_filter_values() {
        let v = validator(SqlDialect::Postgres);
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("active'; DELETE FROM customers; --"));
        filters.insert("id".to_string(), json!(7));

        let stmt = v
            .build_parameterized_statement("customers", &["email"], &filters)
            .unwrap_or_else(|e| panic!("unexpected error: {}", e));

        assert_eq!(
            stmt.sql,
            "SELECT t.\"email\" FROM \"customers\" t WHERE t.\"id\" = $1 AND CAST(t.\"status\" AS TEXT) = $2"
        );
        assert!(!stmt.sql.contains("DELETE"));
        assert_eq!(
            stmt.params,
            vec![
                BoundValue::Int(7),
                BoundValue::Text("active'; DELETE FROM customers; --".into())
            ]
        );
    }

    #[test]
    fn test_query_statement_binds_limit_after_filters() {
        let v = validator(SqlDialect::Postgres);
        let mut filters = BTreeMap::new();
        filters.insert("status".to_string(), json!("active"));

        let stmt = v
            .build_query_statement("customers", &["id", "email"], &filters, Some(25))
            .unwrap_or_else(|e| panic!("unexpected error: {}", e));

        assert_eq!(
            stmt.sql,
            "SELECT t.\"id\", t.\"email\" FROM \"customers\" t WHERE CAST(t.\"status\" AS TEXT) = $1 LIMIT $2"
        );
        assert_eq!(
            stmt.params,
            vec![BoundValue::Text("active".into()), BoundValue::Int(25)]
        );
    }

    #[test]
    fn test_build_statement_rejects_unknown_filter_key() {
        let v = validator(SqlDialect::Postgres);
        let mut filters = BTreeMap::new();
        filters.insert("1=1 OR id".to_string(), json!(1));
        let result = v.build_parameterized_statement::<&str>("customers", &[], &filters);
        assert!(matches!(result, Err(DqmError::Security { .. })));
    }

    #[test]
    fn test_empty_columns_selects_schema_columns() {
        let v = validator(SqlDialect::Sqlite);
        let stmt = v
            .build_parameterized_statement::<&str>("customers", &[], &BTreeMap::new())
            .unwrap_or_else(|e| panic!("unexpected error: {}", e));
        assert_eq!(
            stmt.sql,
            "SELECT t.\"id\", t.\"email\", t.\"status\" FROM \"customers\" t"
        );
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn test_count_statement() {
        let v = validator(SqlDialect::Sqlite);
        let mut filters = BTreeMap::new();
        filters.insert("email".to_string(), json!(null));
        let stmt = v
            .build_count_statement("customers", &filters)
            .unwrap_or_else(|e| panic!("unexpected error: {}", e));
        assert_eq!(
            stmt.sql,
            "SELECT COUNT(*) FROM \"customers\" t WHERE t.\"email\" IS NULL"
        );
    }
}
