//! DAMA data quality dimensions and the rule-kind mapping.

use serde::{Deserialize, Serialize};

/// A DAMA data quality dimension.
///
/// Declaration order is the lookup order of
/// [`map_rule_kind_to_dimension`] and the order of every score map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    /// Required values are present
    Completeness,
    /// No unintended duplicates
    Uniqueness,
    /// Values conform to format, type and range
    Validity,
    /// Values agree with a reference
    Accuracy,
    /// Relationships between tables hold
    Integrity,
    /// Values agree with each other
    Consistency,
    /// Data is fresh enough
    Timeliness,
    /// Values carry the expected precision
    Precision,
    /// Data applies to its context
    Relevance,
}

impl Dimension {
    /// Every dimension, in lookup order.
    pub const ALL: [Self; 9] = [
        Self::Completeness,
        Self::Uniqueness,
        Self::Validity,
        Self::Accuracy,
        Self::Integrity,
        Self::Consistency,
        Self::Timeliness,
        Self::Precision,
        Self::Relevance,
    ];

    /// Lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Completeness => "completeness",
            Self::Uniqueness => "uniqueness",
            Self::Validity => "validity",
            Self::Accuracy => "accuracy",
            Self::Integrity => "integrity",
            Self::Consistency => "consistency",
            Self::Timeliness => "timeliness",
            Self::Precision => "precision",
            Self::Relevance => "relevance",
        }
    }

    /// Rule-kind keywords that map to this dimension.
    pub const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Completeness => &["null_check", "required_field", "not_null"],
            Self::Uniqueness => &["unique", "duplicate_check", "primary_key"],
            Self::Validity => &["format", "regex", "pattern", "enum", "range"],
            Self::Accuracy => &["reference", "lookup", "cross_reference"],
            Self::Integrity => &["foreign_key", "referential", "constraint"],
            Self::Consistency => &["cross_field", "business_rule", "derived"],
            Self::Timeliness => &["freshness", "age", "staleness"],
            Self::Precision => &["decimal_places", "significant_digits", "rounding"],
            Self::Relevance => &["applicability", "context", "scope"],
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Dimension {
    type Err = crate::DqmError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let lowered = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|d| d.name() == lowered)
            .ok_or_else(|| crate::DqmError::configuration(format!("unknown dimension '{}'", s)))
    }
}

/// Dimension for a rule kind: the first dimension (in [`Dimension::ALL`]
/// order) with a keyword contained in the lowercased kind.
///
/// Kinds matching no keyword return `None` and are left out of every score.
pub fn map_rule_kind_to_dimension(kind: &str) -> Option<Dimension> {
    let kind = kind.to_ascii_lowercase();
    Dimension::ALL.into_iter().find(|dimension| {
        dimension
            .keywords()
            .iter()
            .any(|keyword| kind.contains(keyword))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds_map() {
        assert_eq!(
            map_rule_kind_to_dimension("null_check"),
            Some(Dimension::Completeness)
        );
        assert_eq!(
            map_rule_kind_to_dimension("uniqueness_check"),
            Some(Dimension::Uniqueness)
        );
        assert_eq!(
            map_rule_kind_to_dimension("range_check"),
            Some(Dimension::Validity)
        );
        assert_eq!(
            map_rule_kind_to_dimension("pattern_check"),
            Some(Dimension::Validity)
        );
        assert_eq!(
            map_rule_kind_to_dimension("foreign_key_check"),
            Some(Dimension::Integrity)
        );
    }

    #[test]
    fn test_mapping_is_case_insensitive_substring() {
        assert_eq!(
            map_rule_kind_to_dimension("Email_FORMAT_check"),
            Some(Dimension::Validity)
        );
        assert_eq!(
            map_rule_kind_to_dimension("order_business_rule"),
            Some(Dimension::Consistency)
        );
        assert_eq!(map_rule_kind_to_dimension("volume_check"), None);
    }

    #[test]
    fn test_first_dimension_wins() {
        // "not_null" (completeness) and "constraint" (integrity) both match
        assert_eq!(
            map_rule_kind_to_dimension("not_null_constraint"),
            Some(Dimension::Completeness)
        );
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("Validity".parse::<Dimension>().ok(), Some(Dimension::Validity));
        assert!("volume".parse::<Dimension>().is_err());
        assert_eq!(Dimension::Timeliness.to_string(), "timeliness");
        assert_eq!(
            serde_json::to_string(&Dimension::Integrity).unwrap(),
            "\"integrity\""
        );
    }
}
