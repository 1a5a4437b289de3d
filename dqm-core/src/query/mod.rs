//! Injection-safe query construction.
//!
//! Identifiers (table and column names) are checked for membership in a
//! [`SchemaDescriptor`] taken from the target connection and wrapped in
//! [`Ident`]. Values are carried separately as [`BoundValue`]s and sent as
//! placeholders. Nothing else is ever rendered into statement text.
//!
//! # Module Structure
//! - `schema`: the per-connection allow-list snapshot
//! - `dialect`: placeholder and quoting conventions
//! - `value`: bound parameter values
//! - `statement`: predicates and statement builders over validated identifiers
//! - `validator`: the allow-list validator

mod dialect;
mod schema;
pub mod statement;
mod validator;
mod value;

pub(crate) use dialect::quote_identifier;
pub use dialect::SqlDialect;
pub use schema::{ColumnInfo, SchemaDescriptor};
pub use statement::{Predicate, Statement};
pub use validator::QueryValidator;
pub use value::BoundValue;

/// A table or column name that was found in a schema snapshot.
///
/// There is no public constructor: values of this type come from
/// [`QueryValidator`], which is what makes them safe to render.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ident(String);

impl Ident {
    /// Wraps a name read from a schema snapshot or the database catalog.
    pub(crate) fn from_catalog(name: &str) -> Self {
        Self(name.to_string())
    }

    /// The identifier as it appears in the catalog (unquoted).
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ident {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
