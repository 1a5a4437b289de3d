//! Schema snapshot used as the identifier allow-list.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column name and declared type as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name exactly as stored in the catalog
    pub name: String,
    /// Declared type (engine specific spelling)
    pub data_type: String,
}

/// Declared type names whose values can be aggregated numerically.
const NUMERIC_TYPES: &[&str] = &[
    "smallint",
    "integer",
    "int",
    "int2",
    "int4",
    "int8",
    "bigint",
    "tinyint",
    "mediumint",
    "serial",
    "smallserial",
    "bigserial",
    "real",
    "float",
    "float4",
    "float8",
    "double",
    "double precision",
    "numeric",
    "decimal",
    "number",
];

impl ColumnInfo {
    /// Creates a column descriptor.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Whether min/max/mean/stddev make sense for this column.
    ///
    /// Precision and modifiers are ignored, so `NUMERIC(10,2)` and
    /// `INTEGER UNSIGNED` both count as numeric.
    pub fn is_numeric(&self) -> bool {
        let lowered = self.data_type.to_lowercase();
        let base = lowered
            .split('(')
            .next()
            .unwrap_or_default()
            .trim()
            .trim_end_matches(" unsigned")
            .trim();
        NUMERIC_TYPES.contains(&base)
    }
}

/// Mapping of table name to its ordered columns for one connection.
///
/// Snapshots are never mutated after they are shared; a refresh replaces the
/// whole descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    tables: BTreeMap<String, Vec<ColumnInfo>>,
}

impl SchemaDescriptor {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to add a table with its columns in declaration order.
    pub fn with_table(mut self, table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        self.insert_table(table, columns);
        self
    }

    /// Adds or replaces a table.
    pub fn insert_table(&mut self, table: impl Into<String>, columns: Vec<ColumnInfo>) {
        self.tables.insert(table.into(), columns);
    }

    /// Columns of `table`, if present.
    pub fn columns(&self, table: &str) -> Option<&[ColumnInfo]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Looks up one column of one table.
    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnInfo> {
        self.columns(table)?.iter().find(|c| c.name == column)
    }

    /// Whether the table is part of the snapshot.
    pub fn contains_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Table names in sorted order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables in the snapshot.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Whether the snapshot has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SchemaDescriptor {
        SchemaDescriptor::new()
            .with_table(
                "customers",
                vec![
                    ColumnInfo::new("id", "INTEGER"),
                    ColumnInfo::new("email", "TEXT"),
                ],
            )
            .with_table("orders", vec![ColumnInfo::new("total", "NUMERIC(10,2)")])
    }

    #[test]
    fn test_lookup() {
        let schema = sample();
        assert!(schema.contains_table("customers"));
        assert!(!schema.contains_table("Customers"));
        assert_eq!(schema.column("customers", "email").map(|c| c.data_type.as_str()), Some("TEXT"));
        assert!(schema.column("customers", "missing").is_none());
        assert_eq!(schema.table_count(), 2);
        assert_eq!(schema.table_names().collect::<Vec<_>>(), vec!["customers", "orders"]);
    }

    #[test]
    fn test_columns_keep_declaration_order() {
        let schema = sample();
        let names: Vec<_> = schema
            .columns("customers")
            .unwrap_or_default()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["id", "email"]);
    }

    #[test]
    fn test_is_numeric() {
        assert!(ColumnInfo::new("a", "INTEGER").is_numeric());
        assert!(ColumnInfo::new("a", "numeric(10,2)").is_numeric());
        assert!(ColumnInfo::new("a", "double precision").is_numeric());
        assert!(ColumnInfo::new("a", "INT UNSIGNED").is_numeric());
        assert!(!ColumnInfo::new("a", "text").is_numeric());
        assert!(!ColumnInfo::new("a", "interval").is_numeric());
        assert!(!ColumnInfo::new("a", "point").is_numeric());
        assert!(!ColumnInfo::new("a", "").is_numeric());
    }
}
