//! SQL dialect differences that matter for statement rendering.

use super::Ident;
use serde::{Deserialize, Serialize};

/// Placeholder and quoting conventions of a target engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// `$1, $2, ...` placeholders and the `~` regex operator
    Postgres,
    /// `?` placeholders, no regex operator
    Sqlite,
}

impl SqlDialect {
    /// Quotes a validated identifier, doubling any embedded quote.
    pub fn quote(self, ident: &Ident) -> String {
        quote_identifier(ident.as_str())
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${}", index),
            Self::Sqlite => "?".to_string(),
        }
    }

    /// Whether the engine evaluates regular expressions server side.
    pub fn supports_regex(self) -> bool {
        matches!(self, Self::Postgres)
    }
}

impl std::fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Double-quote quoting shared by both supported engines.
///
/// Only used on names that came out of the catalog.
pub(crate) fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(SqlDialect::Postgres.placeholder(1), "$1");
        assert_eq!(SqlDialect::Postgres.placeholder(12), "$12");
        assert_eq!(SqlDialect::Sqlite.placeholder(3), "?");
    }

    #[test]
    fn test_quote_identifier_escapes_quotes() {
        assert_eq!(quote_identifier("email"), "\"email\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_regex_support() {
        assert!(SqlDialect::Postgres.supports_regex());
        assert!(!SqlDialect::Sqlite.supports_regex());
    }
}
