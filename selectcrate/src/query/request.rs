use serde::Deserialize;
use utoipa::IntoParams;

use super::ordering::{OrderField, parse_ordering_param};
use crate::settings::{DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE};

// Bound on the search term, longer input is truncated
const MAX_SEARCH_TERM_LENGTH: usize = 1_000;

/// Raw autocomplete query parameters.
///
/// Every value is kept as a string so that malformed numbers never fail
/// extraction; [`QueryRequest::from_params`] normalizes them.
///
/// # Filtering by a dependent field
///
/// `f` and `e` carry `dependentField__lookupPath=value`. The part before the
/// first `__` names the dependent form field, the rest is the lookup path on
/// the searched collection:
///
/// ```text
/// GET /autocomplete/editions?q=spring&f=magazine__magazine_id=5
/// ```
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AutocompleteParams {
    /// Free-text search term.
    #[param(example = "spring")]
    pub q: Option<String>,
    /// Page number (1-based).
    #[param(example = "1")]
    pub p: Option<String>,
    /// Number of results per page.
    #[param(example = "20")]
    pub page_size: Option<String>,
    /// Filter spec, `dependentField__lookupPath=value`.
    #[param(example = "magazine__magazine_id=5")]
    pub f: Option<String>,
    /// Exclude spec, same shape as `f`.
    #[param(example = "magazine__magazine_id=7")]
    pub e: Option<String>,
    /// Comma-separated ordering override, `-` prefix for descending.
    #[param(example = "-year,name")]
    pub ordering: Option<String>,
}

/// A parsed `dependentField__lookupPath=value` spec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSpec {
    pub dependent_field: String,
    pub lookup_path: String,
    pub value: String,
}

/// Outcome of parsing a filter or exclude parameter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DependentFilter {
    /// Nothing submitted; the collection is left untouched.
    #[default]
    Absent,
    /// Something was submitted but could not be parsed; the result is empty.
    Malformed(String),
    Spec(FilterSpec),
}

impl FilterSpec {
    /// Parse a raw spec.
    ///
    /// Splits on the first `=`, then the left side on the first `__`. Both
    /// halves and the value must be non-empty.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the spec is malformed.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let (left, value) = raw
            .split_once('=')
            .ok_or_else(|| format!("missing '=' in filter spec {raw:?}"))?;
        let (dependent_field, lookup_path) = left
            .split_once("__")
            .ok_or_else(|| format!("missing '__' in filter spec {raw:?}"))?;

        if dependent_field.is_empty() || lookup_path.is_empty() || value.is_empty() {
            return Err(format!("empty component in filter spec {raw:?}"));
        }

        Ok(Self {
            dependent_field: dependent_field.to_string(),
            lookup_path: lookup_path.to_string(),
            value: value.to_string(),
        })
    }
}

impl DependentFilter {
    /// Classify an optional raw parameter.
    #[must_use]
    pub fn from_param(raw: Option<&str>) -> Self {
        match raw {
            None => Self::Absent,
            Some(raw) if raw.trim().is_empty() => Self::Absent,
            Some(raw) => match FilterSpec::parse(raw) {
                Ok(spec) => Self::Spec(spec),
                Err(reason) => Self::Malformed(reason),
            },
        }
    }
}

/// Normalized per-request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub search_term: String,
    pub page: u64,
    pub page_size: u64,
    pub filter: DependentFilter,
    pub exclude: DependentFilter,
    pub ordering: Option<Vec<OrderField>>,
}

impl Default for QueryRequest {
    fn default() -> Self {
        Self {
            search_term: String::new(),
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            filter: DependentFilter::Absent,
            exclude: DependentFilter::Absent,
            ordering: None,
        }
    }
}

impl QueryRequest {
    /// Normalize raw parameters.
    ///
    /// Page numbers that are not positive integers become 1. Page sizes that
    /// are not positive integers fall back to `default_page_size`, and are
    /// capped at `max_page_size`.
    #[must_use]
    pub fn from_params(params: &AutocompleteParams, default_page_size: u64, max_page_size: u64) -> Self {
        let default_page_size = if default_page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            default_page_size
        };
        let max_page_size = if max_page_size == 0 {
            DEFAULT_MAX_PAGE_SIZE
        } else {
            max_page_size
        };

        let ordering = params
            .ordering
            .as_deref()
            .map(parse_ordering_param)
            .filter(|fields| !fields.is_empty());

        Self {
            search_term: normalize_search_term(params.q.as_deref()),
            page: parse_positive(params.p.as_deref()).unwrap_or(1),
            page_size: parse_positive(params.page_size.as_deref())
                .unwrap_or(default_page_size)
                .min(max_page_size.max(default_page_size)),
            filter: DependentFilter::from_param(params.f.as_deref()),
            exclude: DependentFilter::from_param(params.e.as_deref()),
            ordering,
        }
    }

    #[must_use]
    pub fn with_search(mut self, term: &str) -> Self {
        self.search_term = normalize_search_term(Some(term));
        self
    }

    /// Sets the page; non-positive values are ignored.
    #[must_use]
    pub fn with_page(mut self, page: u64) -> Self {
        if page > 0 {
            self.page = page;
        }
        self
    }

    /// Sets the page size; zero is ignored.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        if page_size > 0 {
            self.page_size = page_size;
        }
        self
    }

    #[must_use]
    pub fn with_filter(mut self, raw: &str) -> Self {
        self.filter = DependentFilter::from_param(Some(raw));
        self
    }

    #[must_use]
    pub fn with_exclude(mut self, raw: &str) -> Self {
        self.exclude = DependentFilter::from_param(Some(raw));
        self
    }

    #[must_use]
    pub fn with_ordering(mut self, ordering: Vec<OrderField>) -> Self {
        self.ordering = Some(ordering).filter(|fields| !fields.is_empty());
        self
    }
}

fn normalize_search_term(raw: Option<&str>) -> String {
    let term = raw.unwrap_or_default().trim();
    if term == "undefined" {
        return String::new();
    }
    term.chars().take(MAX_SEARCH_TERM_LENGTH).collect()
}

fn parse_positive(raw: Option<&str>) -> Option<u64> {
    raw?.trim().parse::<i64>().ok().filter(|n| *n > 0).and_then(|n| u64::try_from(n).ok())
}
