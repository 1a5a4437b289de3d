//! Statement rendering from validated identifiers and bound values.
//!
//! Every function here takes [`Ident`] values, which only the
//! [`QueryValidator`](super::QueryValidator) can produce. Caller-supplied
//! values are pushed as parameters, never as text.

use super::{BoundValue, Ident, SqlDialect};
use serde::{Deserialize, Serialize};

/// SQL text plus the ordered values bound to its placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement text with dialect placeholders
    pub sql: String,
    /// Values for the placeholders, in order
    pub params: Vec<BoundValue>,
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql)
    }
}

/// Incremental statement writer that numbers placeholders.
#[derive(Debug)]
pub(crate) struct SqlWriter {
    dialect: SqlDialect,
    sql: String,
    params: Vec<BoundValue>,
}

impl SqlWriter {
    pub(crate) fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, fragment: &str) -> &mut Self {
        self.sql.push_str(fragment);
        self
    }

    pub(crate) fn push_ident(&mut self, ident: &Ident) -> &mut Self {
        let quoted = self.dialect.quote(ident);
        self.sql.push_str(&quoted);
        self
    }

    /// Pushes `alias."column"`.
    pub(crate) fn push_qualified(&mut self, alias: &str, ident: &Ident) -> &mut Self {
        self.sql.push_str(alias);
        self.sql.push('.');
        self.push_ident(ident)
    }

    pub(crate) fn push_param(&mut self, value: BoundValue) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.sql.push_str(&placeholder);
        self
    }

    /// Pushes `LIMIT n OFFSET m` with both values bound.
    pub(crate) fn push_page(&mut self, limit: u32, offset: u64) -> &mut Self {
        self.push(" LIMIT ");
        self.push_param(BoundValue::Int(i64::from(limit)));
        self.push(" OFFSET ");
        self.push_param(BoundValue::Int(i64::try_from(offset).unwrap_or(i64::MAX)))
    }

    pub(crate) fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Row predicate over a table aliased as `t`.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Column is NULL
    IsNull(Ident),
    /// Column is NOT NULL
    IsNotNull(Ident),
    /// Non-null value that occurs more than once in the table
    Duplicated {
        /// Table the predicate is evaluated against
        table: Ident,
        /// Column checked for repeated values
        column: Ident,
    },
    /// Non-null value below `min` or above `max`
    OutOfRange {
        /// Column compared against the bounds
        column: Ident,
        /// Inclusive lower bound
        min: Option<BoundValue>,
        /// Inclusive upper bound
        max: Option<BoundValue>,
    },
    /// Non-null value whose text form does not match `pattern` (server-side regex)
    NotMatching {
        /// Column compared against the pattern
        column: Ident,
        /// Regular expression, bound as a parameter
        pattern: String,
    },
    /// Text form matches `pattern` (server-side regex)
    Matching {
        /// Column compared against the pattern
        column: Ident,
        /// Regular expression, bound as a parameter
        pattern: String,
    },
    /// Non-null value with no counterpart in the referenced table
    Orphaned {
        /// Referencing column
        column: Ident,
        /// Referenced table
        reference_table: Ident,
        /// Referenced column
        reference_column: Ident,
    },
    /// Every column equals its value; NULL values compare with `IS NULL`
    Equals(Vec<(Ident, BoundValue)>),
}

impl Predicate {
    pub(crate) fn render(&self, w: &mut SqlWriter) {
        match self {
            Self::IsNull(column) => {
                w.push_qualified("t", column).push(" IS NULL");
            }
            Self::IsNotNull(column) => {
                w.push_qualified("t", column).push(" IS NOT NULL");
            }
            Self::Duplicated { table, column } => {
                w.push_qualified("t", column).push(" IN (SELECT ");
                w.push_qualified("d", column).push(" FROM ");
                w.push_ident(table).push(" d WHERE ");
                w.push_qualified("d", column).push(" IS NOT NULL GROUP BY ");
                w.push_qualified("d", column).push(" HAVING COUNT(*) > 1)");
            }
            Self::OutOfRange { column, min, max } => {
                w.push_qualified("t", column).push(" IS NOT NULL AND (");
                let mut first = true;
                if let Some(min) = min {
                    w.push_qualified("t", column).push(" < ");
                    w.push_param(min.clone());
                    first = false;
                }
                if let Some(max) = max {
                    if !first {
                        w.push(" OR ");
                    }
                    w.push_qualified("t", column).push(" > ");
                    w.push_param(max.clone());
                    first = false;
                }
                if first {
                    w.push("1 = 0");
                }
                w.push(")");
            }
            Self::NotMatching { column, pattern } => {
                w.push_qualified("t", column).push(" IS NOT NULL AND NOT (CAST(");
                w.push_qualified("t", column).push(" AS TEXT) ~ ");
                w.push_param(BoundValue::Text(pattern.clone()));
                w.push(")");
            }
            Self::Matching { column, pattern } => {
                w.push("CAST(");
                w.push_qualified("t", column).push(" AS TEXT) ~ ");
                w.push_param(BoundValue::Text(pattern.clone()));
            }
            Self::Orphaned {
                column,
                reference_table,
                reference_column,
            } => {
                w.push_qualified("t", column)
                    .push(" IS NOT NULL AND NOT EXISTS (SELECT 1 FROM ");
                w.push_ident(reference_table).push(" r WHERE ");
                w.push_qualified("r", reference_column).push(" = ");
                w.push_qualified("t", column).push(")");
            }
            Self::Equals(pairs) => {
                if pairs.is_empty() {
                    w.push("1 = 1");
                }
                for (i, (column, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        w.push(" AND ");
                    }
                    render_equality(w, column, value);
                }
            }
        }
    }
}

fn render_equality(w: &mut SqlWriter, column: &Ident, value: &BoundValue) {
    if value.is_null() {
        w.push_qualified("t", column).push(" IS NULL");
        return;
    }
    // Postgres will not compare e.g. a date column with a text parameter.
    if value.is_text() && w.dialect() == SqlDialect::Postgres {
        w.push("CAST(");
        w.push_qualified("t", column).push(" AS TEXT) = ");
    } else {
        w.push_qualified("t", column).push(" = ");
    }
    w.push_param(value.clone());
}

fn push_where(w: &mut SqlWriter, predicate: Option<&Predicate>) {
    if let Some(predicate) = predicate {
        w.push(" WHERE ");
        predicate.render(w);
    }
}

/// `SELECT COUNT(*) FROM table t [WHERE predicate]`
pub fn count_rows(dialect: SqlDialect, table: &Ident, predicate: Option<&Predicate>) -> Statement {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT COUNT(*) FROM ").push_ident(table).push(" t");
    push_where(&mut w, predicate);
    w.finish()
}

fn select_writer(
    dialect: SqlDialect,
    table: &Ident,
    columns: &[Ident],
    predicate: Option<&Predicate>,
) -> SqlWriter {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT ");
    for (i, column) in columns.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        w.push_qualified("t", column);
    }
    w.push(" FROM ").push_ident(table).push(" t");
    push_where(&mut w, predicate);
    w
}

/// `SELECT columns FROM table t [WHERE predicate] [LIMIT n]`
pub fn select_rows(
    dialect: SqlDialect,
    table: &Ident,
    columns: &[Ident],
    predicate: Option<&Predicate>,
    limit: Option<u32>,
) -> Statement {
    let mut w = select_writer(dialect, table, columns, predicate);
    if let Some(limit) = limit {
        w.push(" LIMIT ");
        w.push_param(BoundValue::Int(i64::from(limit)));
    }
    w.finish()
}

/// `SELECT columns FROM table t [WHERE predicate] LIMIT n OFFSET m`
pub fn select_page(
    dialect: SqlDialect,
    table: &Ident,
    columns: &[Ident],
    predicate: Option<&Predicate>,
    limit: u32,
    offset: u64,
) -> Statement {
    let mut w = select_writer(dialect, table, columns, predicate);
    w.push_page(limit, offset);
    w.finish()
}

/// Number of distinct non-null values that occur more than once.
pub fn count_duplicate_groups(dialect: SqlDialect, table: &Ident, column: &Ident) -> Statement {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT COUNT(*) FROM (SELECT ");
    w.push_qualified("t", column).push(" FROM ").push_ident(table).push(" t WHERE ");
    w.push_qualified("t", column).push(" IS NOT NULL GROUP BY ");
    w.push_qualified("t", column).push(" HAVING COUNT(*) > 1) dup");
    w.finish()
}

/// Value/frequency pairs, most frequent first, capped at `limit` rows.
///
/// Rows are named `value` and `frequency`.
pub fn value_distribution(
    dialect: SqlDialect,
    table: &Ident,
    column: &Ident,
    limit: u32,
) -> Statement {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT ");
    w.push_qualified("t", column)
        .push(" AS value, COUNT(*) AS frequency FROM ")
        .push_ident(table)
        .push(" t GROUP BY ");
    w.push_qualified("t", column).push(" ORDER BY frequency DESC, value LIMIT ");
    w.push_param(BoundValue::Int(i64::from(limit)));
    w.finish()
}

/// One page of the text form of non-null values, for client-side regex
/// evaluation.
///
/// Rows are named `value`.
pub fn non_null_text_values(
    dialect: SqlDialect,
    table: &Ident,
    column: &Ident,
    limit: u32,
    offset: u64,
) -> Statement {
    let mut w = SqlWriter::new(dialect);
    w.push("SELECT CAST(");
    w.push_qualified("t", column).push(" AS TEXT) AS value FROM ");
    w.push_ident(table).push(" t WHERE ");
    w.push_qualified("t", column).push(" IS NOT NULL");
    w.push_page(limit, offset);
    w.finish()
}

/// Aggregates for min/max/mean/stddev of a numeric column.
///
/// Rows are named `min_value`, `max_value`, `mean_value`, `value_count`,
/// `sum_value` and `sum_squares`. Standard deviation is derived from the last
/// three so both engines can share one statement.
pub fn numeric_summary(dialect: SqlDialect, table: &Ident, column: &Ident) -> Statement {
    let mut w = SqlWriter::new(dialect);
    let mut cast = SqlWriter::new(dialect);
    cast.push("CAST(").push_qualified("t", column).push(" AS DOUBLE PRECISION)");
    let cast = cast.finish().sql;

    w.push("SELECT MIN(")
        .push(&cast)
        .push(") AS min_value, MAX(")
        .push(&cast)
        .push(") AS max_value, AVG(")
        .push(&cast)
        .push(") AS mean_value, COUNT(")
        .push(&cast)
        .push(") AS value_count, SUM(")
        .push(&cast)
        .push(") AS sum_value, SUM(")
        .push(&cast)
        .push(" * ")
        .push(&cast)
        .push(") AS sum_squares FROM ")
        .push_ident(table)
        .push(" t");
    w.finish()
}
