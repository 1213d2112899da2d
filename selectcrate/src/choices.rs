//! # Static Choices
//!
//! Autocomplete over a fixed, in-memory list of choices. There is no
//! database, no authorization and no dependent filtering: the source is
//! normalized to `{value, label}` pairs, searched and paginated.
//!
//! Unlike the collection-backed pipeline, a page past the end is not reset:
//! the requested page number comes back with no results.
//!
//! ```rust,ignore
//! #[derive(Clone, Copy)]
//! enum Status { Draft, Published }
//!
//! impl ChoiceEnum for Status {
//!     fn variants() -> Vec<Self> { vec![Self::Draft, Self::Published] }
//!     fn value(&self) -> Value { json!(match self { Self::Draft => "draft", Self::Published => "published" }) }
//!     fn label(&self) -> String { match self { Self::Draft => "Draft", Self::Published => "Published" }.into() }
//! }
//!
//! let page = ChoiceSource::from_enum::<Status>().resolve(&QueryRequest::default().with_search("pub"));
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::pipeline::Page;
use crate::pipeline::page::total_pages;
use crate::query::{AutocompleteParams, QueryRequest};
use crate::sanitize::escape_html;
use crate::settings::Settings;

/// A selectable value with its display label.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Choice {
    #[schema(value_type = Object)]
    pub value: Value,
    pub label: String,
}

impl Choice {
    pub fn new(value: impl Into<Value>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Rust enums usable as a choice source.
pub trait ChoiceEnum: Sized {
    /// Every variant, in display order.
    fn variants() -> Vec<Self>;

    /// Stored value of the variant.
    fn value(&self) -> Value;

    /// Human-readable label of the variant.
    fn label(&self) -> String;
}

/// The shapes a static choice list can take.
#[derive(Debug, Clone, PartialEq)]
pub enum ChoiceSource {
    /// Value/label pairs, e.g. from a [`ChoiceEnum`].
    Labeled(Vec<Choice>),
    /// Object of `value -> label`, in insertion order.
    Mapping(Map<String, Value>),
    /// `(value, label)` pairs.
    Pairs(Vec<(Value, Value)>),
    /// Plain values, each its own label.
    Scalars(Vec<Value>),
}

impl ChoiceSource {
    #[must_use]
    pub fn from_enum<E: ChoiceEnum>() -> Self {
        Self::from(E::variants())
    }

    /// Uniform `{value, label}` list with raw, unescaped labels.
    #[must_use]
    pub fn normalize(&self) -> Vec<Choice> {
        match self {
            Self::Labeled(choices) => choices.clone(),
            Self::Mapping(map) => map
                .iter()
                .map(|(value, label)| Choice::new(value.clone(), display_text(label)))
                .collect(),
            Self::Pairs(pairs) => pairs
                .iter()
                .map(|(value, label)| Choice::new(value.clone(), display_text(label)))
                .collect(),
            Self::Scalars(values) => values
                .iter()
                .map(|value| {
                    let text = display_text(value);
                    Choice::new(text.clone(), text)
                })
                .collect(),
        }
    }

    /// Resolve raw query parameters with the host's page size settings.
    #[must_use]
    pub fn resolve_params(&self, params: &AutocompleteParams, settings: &Settings) -> Page<Choice> {
        let request =
            QueryRequest::from_params(params, settings.default_page_size, settings.max_page_size);
        self.resolve(&request)
    }

    /// Search and paginate the choices.
    ///
    /// Matches the term case-insensitively against value or label. Labels and
    /// string values in the returned page are HTML-escaped.
    #[must_use]
    pub fn resolve(&self, request: &QueryRequest) -> Page<Choice> {
        let term = request.search_term.to_lowercase();
        let matching: Vec<Choice> = self
            .normalize()
            .into_iter()
            .filter(|choice| {
                term.is_empty()
                    || display_text(&choice.value).to_lowercase().contains(&term)
                    || choice.label.to_lowercase().contains(&term)
            })
            .collect();

        let page_number = request.page.max(1);
        let page_size = request.page_size.max(1);
        let count = u64::try_from(matching.len()).unwrap_or(u64::MAX);
        let total_pages = total_pages(count, page_size);

        // Out-of-range pages echo the requested number with no results
        let offset = usize::try_from((page_number - 1).saturating_mul(page_size)).unwrap_or(usize::MAX);
        let limit = usize::try_from(page_size).unwrap_or(usize::MAX);
        let results = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|choice| Choice {
                value: match choice.value {
                    Value::String(value) => Value::String(escape_html(&value)),
                    other => other,
                },
                label: escape_html(&choice.label),
            })
            .collect();

        Page::new(results, page_number, total_pages)
    }
}

impl<E: ChoiceEnum> From<Vec<E>> for ChoiceSource {
    fn from(variants: Vec<E>) -> Self {
        Self::Labeled(
            variants
                .iter()
                .map(|variant| Choice::new(variant.value(), variant.label()))
                .collect(),
        )
    }
}

fn display_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
