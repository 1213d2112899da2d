use std::borrow::Cow;

use axum::{
    Json,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::Value;
use utoipa::openapi::schema::{AdditionalProperties, ObjectBuilder, Schema, Type};
use utoipa::openapi::RefOr;
use utoipa::{PartialSchema, ToSchema};

use crate::collection::Record;

/// Keys owned by [`ResultItem`] itself. Record fields with these names are
/// dropped so the flattened output never carries duplicate keys.
pub(crate) const RESERVED_KEYS: [&str; 7] = [
    "id",
    "can_view",
    "can_update",
    "can_delete",
    "detail_url",
    "update_url",
    "delete_url",
];

/// One autocomplete result.
///
/// Serializes flat: the identifier, the projected fields, the permission
/// flags and whichever action URLs apply.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultItem {
    pub id: Value,
    #[serde(flatten)]
    pub fields: Record,
    pub can_view: bool,
    pub can_update: bool,
    pub can_delete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_url: Option<String>,
}

impl ResultItem {
    /// Item for `id` carrying `fields`, without permissions or links.
    #[must_use]
    pub fn new(id: Value, mut fields: Record) -> Self {
        fields.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Self {
            id,
            fields,
            can_view: false,
            can_update: false,
            can_delete: false,
            detail_url: None,
            update_url: None,
            delete_url: None,
        }
    }
}

// Field set depends on the configured display fields, so the schema is an
// open object with the fixed keys spelled out.
impl ToSchema for ResultItem {
    fn name() -> Cow<'static, str> {
        Cow::Borrowed("ResultItem")
    }
}

impl PartialSchema for ResultItem {
    fn schema() -> RefOr<Schema> {
        let flag = || ObjectBuilder::new().schema_type(Type::Boolean);
        let url = || ObjectBuilder::new().schema_type(Type::String);

        ObjectBuilder::new()
            .property("id", ObjectBuilder::new())
            .required("id")
            .property("can_view", flag())
            .required("can_view")
            .property("can_update", flag())
            .required("can_update")
            .property("can_delete", flag())
            .required("can_delete")
            .property("detail_url", url())
            .property("update_url", url())
            .property("delete_url", url())
            .additional_properties(Some(AdditionalProperties::FreeForm(true)))
            .into()
    }
}

/// One page of autocomplete results.
///
/// `has_more` is always `page < total_pages`, and `next_page` is set exactly
/// when `has_more` is true. Collection-backed autocompletes return
/// [`ResultItem`]s, static choices return [`Choice`](crate::Choice)s.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Page<T = ResultItem> {
    pub results: Vec<T>,
    pub page: u64,
    pub has_more: bool,
    pub next_page: Option<u64>,
    pub total_pages: u64,
    /// Collection-backed pipeline only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_create_option: Option<bool>,
    /// Diagnostic, only in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Page<T> {
    /// Build a page, deriving `has_more` and `next_page`.
    #[must_use]
    pub fn new(results: Vec<T>, page: u64, total_pages: u64) -> Self {
        let total_pages = total_pages.max(1);
        let has_more = page < total_pages;
        Self {
            results,
            page,
            has_more,
            next_page: has_more.then(|| page + 1),
            total_pages,
            show_create_option: None,
            error: None,
        }
    }

    /// A single empty page.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), 1, 1)
    }

    /// The page returned when resolution failed.
    #[must_use]
    pub fn degraded(error: Option<String>) -> Self {
        Self {
            error,
            ..Self::empty()
        }
    }

    #[must_use]
    pub fn with_create_option(mut self, show: bool) -> Self {
        self.show_create_option = Some(show);
        self
    }
}

/// Number of pages needed for `count` items, at least one.
pub(crate) fn total_pages(count: u64, page_size: u64) -> u64 {
    count.div_ceil(page_size.max(1)).max(1)
}

impl<T: Serialize> IntoResponse for Page<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
