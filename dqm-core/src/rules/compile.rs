//! Turns a rule's kind and parameters into validated statements.
//!
//! Compilation happens at create, at update, and again at every execution
//! against the connection's current schema snapshot, so a rule whose table
//! or column disappeared fails with a security error instead of running.

use super::models::RuleKind;
use crate::query::statement::{count_rows, select_page, select_rows};
use crate::query::{BoundValue, Ident, Predicate, QueryValidator, SqlDialect, Statement};
use crate::{DqmError, Result};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// How failing rows are identified.
#[derive(Debug, Clone)]
pub(crate) enum Check {
    /// A predicate the database evaluates
    Sql(Predicate),
    /// Regex evaluated over fetched rows, for engines without a regex operator
    ClientPattern { column: Ident, regex: Regex },
}

/// A rule ready to run on one connection.
#[derive(Debug, Clone)]
pub(crate) struct CompiledRule {
    pub(crate) table: Ident,
    pub(crate) columns: Vec<Ident>,
    pub(crate) check: Check,
    dialect: SqlDialect,
}

impl CompiledRule {
    /// `SELECT COUNT(*) FROM table`
    pub(crate) fn total_statement(&self) -> Statement {
        count_rows(self.dialect, &self.table, None)
    }

    /// `SELECT COUNT(*) FROM table WHERE predicate`
    pub(crate) fn count_statement(&self, predicate: &Predicate) -> Statement {
        count_rows(self.dialect, &self.table, Some(predicate))
    }

    /// Counts violating rows, for checks the database evaluates.
    pub(crate) fn failing_count_statement(&self) -> Option<Statement> {
        match &self.check {
            Check::Sql(predicate) => Some(self.count_statement(predicate)),
            Check::ClientPattern { .. } => None,
        }
    }

    /// Selects violating rows (SQL checks) or candidate rows (client checks).
    pub(crate) fn rows_statement(&self, limit: Option<u32>) -> Statement {
        match &self.check {
            Check::Sql(predicate) => select_rows(
                self.dialect,
                &self.table,
                &self.columns,
                Some(predicate),
                limit,
            ),
            Check::ClientPattern { column, .. } => select_rows(
                self.dialect,
                &self.table,
                &self.columns,
                Some(&Predicate::IsNotNull(column.clone())),
                None,
            ),
        }
    }

    /// One page of candidate rows for a client-side check on `column`.
    pub(crate) fn candidate_page(&self, column: &Ident, limit: u32, offset: u64) -> Statement {
        select_page(
            self.dialect,
            &self.table,
            &self.columns,
            Some(&Predicate::IsNotNull(column.clone())),
            limit,
            offset,
        )
    }

    /// Statement text stored on the rule for display.
    pub(crate) fn definition(&self) -> String {
        match &self.check {
            Check::Sql(_) => self
                .failing_count_statement()
                .map(|statement| statement.sql)
                .unwrap_or_default(),
            Check::ClientPattern { regex, .. } => format!(
                "{} /* rows not matching {} */",
                self.rows_statement(None).sql,
                regex.as_str()
            ),
        }
    }
}

/// Validates identifiers and parameters of a rule against `validator`.
///
/// # Errors
/// - `DqmError::Security` for identifiers outside the schema snapshot
/// - `DqmError::Configuration` for missing or malformed parameters
pub(crate) fn compile(
    validator: &QueryValidator,
    table: &str,
    column: Option<&str>,
    kind: &RuleKind,
    parameters: &BTreeMap<String, JsonValue>,
) -> Result<CompiledRule> {
    let table = validator.validate_table(table)?;
    let column = column
        .map(|name| validator.validate_column(&table, name))
        .transpose()?;

    let required_column = || {
        column.clone().ok_or_else(|| {
            DqmError::configuration(format!("{} rules require a target column", kind))
        })
    };

    let check = match kind {
        RuleKind::NullCheck => Check::Sql(Predicate::IsNull(required_column()?)),
        RuleKind::UniquenessCheck => Check::Sql(Predicate::Duplicated {
            table: table.clone(),
            column: required_column()?,
        }),
        RuleKind::RangeCheck => {
            let min = numeric_parameter(parameters, "min")?;
            let max = numeric_parameter(parameters, "max")?;
            if min.is_none() && max.is_none() {
                return Err(DqmError::configuration(
                    "range_check rules require 'min' and/or 'max'",
                ));
            }
            Check::Sql(Predicate::OutOfRange {
                column: required_column()?,
                min,
                max,
            })
        }
        RuleKind::PatternCheck => {
            let column = required_column()?;
            let pattern = string_parameter(parameters, "pattern")?;
            let regex = Regex::new(pattern).map_err(|e| {
                DqmError::configuration(format!("invalid pattern '{}': {}", pattern, e))
            })?;
            if validator.dialect().supports_regex() {
                Check::Sql(Predicate::NotMatching {
                    column,
                    pattern: pattern.to_string(),
                })
            } else {
                Check::ClientPattern { column, regex }
            }
        }
        RuleKind::ForeignKeyCheck => {
            let reference_table =
                validator.validate_table(string_parameter(parameters, "reference_table")?)?;
            let reference_column = validator.validate_column(
                &reference_table,
                string_parameter(parameters, "reference_column")?,
            )?;
            Check::Sql(Predicate::Orphaned {
                column: required_column()?,
                reference_table,
                reference_column,
            })
        }
        RuleKind::Custom(_) => {
            let filters = match parameters.get("filters") {
                Some(JsonValue::Object(map)) if !map.is_empty() => map
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect::<BTreeMap<_, _>>(),
                _ => {
                    return Err(DqmError::configuration(format!(
                        "{} rules require a non-empty 'filters' object",
                        kind
                    )));
                }
            };
            Check::Sql(validator.filter_predicate(&table, &filters)?)
        }
    };

    let columns = validator.all_columns(&table);
    Ok(CompiledRule {
        table,
        columns,
        check,
        dialect: validator.dialect(),
    })
}

fn string_parameter<'a>(parameters: &'a BTreeMap<String, JsonValue>, key: &str) -> Result<&'a str> {
    parameters
        .get(key)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| DqmError::configuration(format!("parameter '{}' must be a string", key)))
}

fn numeric_parameter(
    parameters: &BTreeMap<String, JsonValue>,
    key: &str,
) -> Result<Option<BoundValue>> {
    match parameters.get(key) {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value @ JsonValue::Number(_)) => BoundValue::try_from(value).map(Some),
        Some(_) => Err(DqmError::configuration(format!(
            "parameter '{}' must be a number",
            key
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{ColumnInfo, SchemaDescriptor};
    use serde_json::json;
    use std::sync::Arc;

    fn validator(dialect: SqlDialect) -> QueryValidator {
        let schema = SchemaDescriptor::new()
            .with_table(
                "customers",
                vec![
                    ColumnInfo::new("id", "integer"),
                    ColumnInfo::new("email", "text"),
                    ColumnInfo::new("age", "integer"),
                ],
            )
            .with_table(
                "orders",
                vec![
                    ColumnInfo::new("id", "integer"),
                    ColumnInfo::new("customer_id", "integer"),
                ],
            );
        QueryValidator::new(Arc::new(schema), dialect)
    }

    fn params(value: JsonValue) -> BTreeMap<String, JsonValue> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_null_check_definition() {
        let compiled = compile(
            &validator(SqlDialect::Postgres),
            "customers",
            Some("email"),
            &RuleKind::NullCheck,
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(
            compiled.definition(),
            r#"SELECT COUNT(*) FROM "customers" t WHERE t."email" IS NULL"#
        );
    }

    #[test]
    fn test_missing_column_is_configuration_error() {
        let err = compile(
            &validator(SqlDialect::Postgres),
            "customers",
            None,
            &RuleKind::NullCheck,
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, DqmError::Configuration { .. }));
    }

    #[test]
    fn test_unknown_identifiers_are_security_errors() {
        let v = validator(SqlDialect::Postgres);
        assert!(matches!(
            compile(&v, "users", Some("email"), &RuleKind::NullCheck, &BTreeMap::new()),
            Err(DqmError::Security { .. })
        ));
        assert!(matches!(
            compile(
                &v,
                "orders",
                Some("customer_id"),
                &RuleKind::ForeignKeyCheck,
                &params(json!({"reference_table": "customers", "reference_column": "uuid"})),
            ),
            Err(DqmError::Security { .. })
        ));
        assert!(matches!(
            compile(
                &v,
                "customers",
                None,
                &RuleKind::from("business_rule"),
                &params(json!({"filters": {"status; DROP TABLE x": "a"}})),
            ),
            Err(DqmError::Security { .. })
        ));
    }

    #[test]
    fn test_range_check_binds_bounds() {
        let compiled = compile(
            &validator(SqlDialect::Sqlite),
            "customers",
            Some("age"),
            &RuleKind::RangeCheck,
            &params(json!({"min": 0, "max": 120})),
        )
        .unwrap();
        let statement = compiled.failing_count_statement().unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT COUNT(*) FROM "customers" t WHERE t."age" IS NOT NULL AND (t."age" < ? OR t."age" > ?)"#
        );
        assert_eq!(statement.params, vec![BoundValue::Int(0), BoundValue::Int(120)]);
    }

    #[test]
    fn test_range_check_requires_a_bound() {
        let v = validator(SqlDialect::Sqlite);
        assert!(
            compile(
                &v,
                "customers",
                Some("age"),
                &RuleKind::RangeCheck,
                &BTreeMap::new()
            )
            .is_err()
        );
        assert!(
            compile(
                &v,
                "customers",
                Some("age"),
                &RuleKind::RangeCheck,
                &params(json!({"min": "zero"})),
            )
            .is_err()
        );
    }

    #[test]
    fn test_pattern_check_per_dialect() {
        let parameters = params(json!({"pattern": "^[^@]+@[^@]+$"}));
        let pg = compile(
            &validator(SqlDialect::Postgres),
            "customers",
            Some("email"),
            &RuleKind::PatternCheck,
            &parameters,
        )
        .unwrap();
        let statement = pg.failing_count_statement().unwrap();
        assert!(statement.sql.contains("~ $1"));
        assert!(!statement.sql.contains("[^@]"));

        let sqlite = compile(
            &validator(SqlDialect::Sqlite),
            "customers",
            Some("email"),
            &RuleKind::PatternCheck,
            &parameters,
        )
        .unwrap();
        assert!(sqlite.failing_count_statement().is_none());
        assert!(matches!(sqlite.check, Check::ClientPattern { .. }));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = compile(
            &validator(SqlDialect::Sqlite),
            "customers",
            Some("email"),
            &RuleKind::PatternCheck,
            &params(json!({"pattern": "("})),
        )
        .unwrap_err();
        assert!(matches!(err, DqmError::Configuration { .. }));
    }

    #[test]
    fn test_custom_filters_are_bound() {
        let compiled = compile(
            &validator(SqlDialect::Sqlite),
            "customers",
            None,
            &RuleKind::from("business_rule"),
            &params(json!({"filters": {"email": "x' OR '1'='1"}})),
        )
        .unwrap();
        let statement = compiled.failing_count_statement().unwrap();
        assert_eq!(
            statement.sql,
            r#"SELECT COUNT(*) FROM "customers" t WHERE t."email" = ?"#
        );
        assert!(!statement.sql.contains("OR '1'"));
    }

    #[test]
    fn test_custom_requires_filters() {
        assert!(matches!(
            compile(
                &validator(SqlDialect::Sqlite),
                "customers",
                None,
                &RuleKind::from("business_rule"),
                &BTreeMap::new(),
            ),
            Err(DqmError::Configuration { .. })
        ));
    }
}
