//! Ordering specs.
//!
//! Fields are named the way they are looked up on the collection; a leading
//! `-` sorts descending, e.g. `["-number", "name"]`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderField {
    pub field: String,
    pub descending: bool,
}

impl OrderField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    /// Parse `name` or `-name`. Blank input and a bare `-` yield `None`.
    #[must_use]
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        let (field, descending) = spec
            .strip_prefix('-')
            .map_or((spec, false), |rest| (rest.trim(), true));
        if field.is_empty() {
            return None;
        }
        Some(Self {
            field: field.to_string(),
            descending,
        })
    }
}

impl std::fmt::Display for OrderField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.descending {
            write!(f, "-{}", self.field)
        } else {
            f.write_str(&self.field)
        }
    }
}

/// Parse a list of ordering specs, dropping blank entries.
pub fn parse_ordering<I, S>(specs: I) -> Vec<OrderField>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs
        .into_iter()
        .filter_map(|spec| OrderField::parse(spec.as_ref()))
        .collect()
}

/// Parse the comma-separated `ordering` query parameter.
#[must_use]
pub fn parse_ordering_param(param: &str) -> Vec<OrderField> {
    parse_ordering(param.split(','))
}

/// Append the primary key as a final ascending tiebreaker unless it is
/// already part of the ordering.
#[must_use]
pub fn with_tiebreaker(mut fields: Vec<OrderField>, primary_key: &str) -> Vec<OrderField> {
    if !fields.iter().any(|f| f.field == primary_key) {
        fields.push(OrderField::asc(primary_key));
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ascending_and_descending() {
        assert_eq!(OrderField::parse("name"), Some(OrderField::asc("name")));
        assert_eq!(OrderField::parse("-number"), Some(OrderField::desc("number")));
        assert_eq!(OrderField::parse(" - number "), Some(OrderField::desc("number")));
    }

    #[test]
    fn test_parse_blank_specs() {
        assert_eq!(OrderField::parse(""), None);
        assert_eq!(OrderField::parse("   "), None);
        assert_eq!(OrderField::parse("-"), None);
    }

    #[test]
    fn test_parse_ordering_param() {
        assert_eq!(
            parse_ordering_param("-year, name,,"),
            vec![OrderField::desc("year"), OrderField::asc("name")]
        );
        assert!(parse_ordering_param("").is_empty());
    }

    #[test]
    fn test_display_roundtrips_spec() {
        assert_eq!(OrderField::desc("year").to_string(), "-year");
        assert_eq!(OrderField::asc("name").to_string(), "name");
    }

    #[test]
    fn test_tiebreaker_added_once() {
        let fields = with_tiebreaker(vec![OrderField::asc("name")], "id");
        assert_eq!(fields, vec![OrderField::asc("name"), OrderField::asc("id")]);

        let fields = with_tiebreaker(vec![OrderField::desc("id")], "id");
        assert_eq!(fields, vec![OrderField::desc("id")]);
    }
}
