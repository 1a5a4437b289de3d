//! Property tests for statement construction.
//!
//! This test suite covers:
//! - Caller-supplied values never appear in statement text
//! - Identifiers outside the schema are always rejected
//! - Placeholder counts always match bound parameter counts

#![allow(clippy::unwrap_used)]

use dqm_core::{
    DqmError, QueryValidator, SchemaDescriptor, SqlDialect,
    query::{BoundValue, ColumnInfo},
};
use proptest::prelude::*;
use serde_json::{Value as JsonValue, json};
use std::collections::BTreeMap;
use std::sync::Arc;

const COLUMNS: &[&str] = &["id", "email", "status", "age"];

fn validator(dialect: SqlDialect) -> QueryValidator {
    let schema = SchemaDescriptor::new().with_table(
        "customers",
        vec![
            ColumnInfo::new("id", "INTEGER"),
            ColumnInfo::new("email", "TEXT"),
            ColumnInfo::new("status", "TEXT"),
            ColumnInfo::new("age", "INTEGER"),
        ],
    );
    QueryValidator::new(Arc::new(schema), dialect)
}

fn dialect() -> impl Strategy<Value = SqlDialect> {
    prop_oneof![Just(SqlDialect::Postgres), Just(SqlDialect::Sqlite)]
}

fn placeholder_count(sql: &str, dialect: SqlDialect) -> usize {
    match dialect {
        SqlDialect::Sqlite => sql.matches('?').count(),
        SqlDialect::Postgres => sql.matches('$').count(),
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_filter_values_are_bound(
        dialect in dialect(),
        column in prop::sample::select(COLUMNS),
        value in "[ -~]{1,40}",
    ) {
        // Markers keep the check meaningful for values that happen to be
        // SQL keywords or identifiers.
        let hostile = format!("\u{1F4A5}{value}\u{1F4A5}");
        let filters: BTreeMap<String, JsonValue> =
            BTreeMap::from([(column.to_string(), json!(hostile))]);

        let statement = validator(dialect)
            .build_parameterized_statement("customers", &[] as &[&str], &filters)
            .unwrap();

        prop_assert!(!statement.sql.contains(&hostile));
        prop_assert_eq!(statement.params, vec![BoundValue::Text(hostile)]);
    }

    #[test]
    fn prop_unknown_identifiers_rejected(
        dialect in dialect(),
        name in "[ -~]{1,40}",
    ) {
        prop_assume!(!COLUMNS.contains(&name.as_str()) && name != "customers");
        let validator = validator(dialect);

        let table = validator.validate_table(&name);
        prop_assert!(matches!(table, Err(DqmError::Security { .. })), "table {:?} accepted", name);

        let filters = BTreeMap::from([(name.clone(), json!(1))]);
        let statement = validator.build_count_statement("customers", &filters);
        prop_assert!(
            matches!(statement, Err(DqmError::Security { .. })),
            "column {:?} accepted",
            name
        );
    }

    #[test]
    fn prop_placeholders_match_params(
        dialect in dialect(),
        filters in prop::collection::btree_map(
            prop::sample::select(COLUMNS).prop_map(str::to_string),
            prop_oneof![
                any::<i64>().prop_map(|v| json!(v)),
                any::<bool>().prop_map(|v| json!(v)),
                "[a-z]{0,12}".prop_map(|v| json!(v)),
            ],
            0..=COLUMNS.len(),
        ),
    ) {
        let statement = validator(dialect)
            .build_count_statement("customers", &filters)
            .unwrap();
        prop_assert_eq!(statement.params.len(), filters.len());
        prop_assert_eq!(placeholder_count(&statement.sql, dialect), filters.len());
    }
}
