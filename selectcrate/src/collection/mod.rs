//! # Collection Sources
//!
//! The pipeline never talks to a database directly. It composes a
//! [`Collection`]: `filter`, `exclude`, `order_by` and `project` only describe
//! the query, `count` and `slice` run it. A chain like
//! filter → search → order therefore executes as one query.
//!
//! Two implementations ship with the crate:
//!
//! - [`EntityCollection`]: any Sea-ORM entity (SQLite, PostgreSQL, MySQL)
//! - [`MemoryCollection`]: a list of JSON records, for fixtures and small
//!   static data sets
//!
//! ## Lookup paths
//!
//! Fields are addressed with `__`-separated lookup paths (`publisher__name`).
//! An unknown path never raises: filtering on it yields an empty collection.

pub mod entity;
pub mod memory;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use entity::EntityCollection;
pub use memory::MemoryCollection;

use crate::errors::CollectionError;
use crate::query::OrderField;

/// A projected record.
pub type Record = Map<String, Value>;

/// Separator between segments of a lookup path.
pub const LOOKUP_SEPARATOR: &str = "__";

/// Row predicate understood by every collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Field equals the value (compared in the field's own type).
    Exact { path: String, value: String },
    /// Field contains the value as a case-insensitive substring.
    IContains { path: String, value: String },
    /// At least one predicate holds. An empty list matches nothing.
    Any(Vec<Predicate>),
    /// Matches no row.
    Nothing,
}

impl Predicate {
    pub fn exact(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Exact {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn icontains(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::IContains {
            path: path.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive substring match of `term` on any of `fields`.
    pub fn search<S: AsRef<str>>(fields: &[S], term: &str) -> Self {
        Self::Any(
            fields
                .iter()
                .map(|field| Self::icontains(field.as_ref(), term))
                .collect(),
        )
    }
}

/// Lazily composed, queryable collection of records.
#[async_trait]
pub trait Collection: Clone + Send + Sync {
    /// Name of the resource type, used for permission names. `None` is a
    /// configuration error.
    fn resource_type(&self) -> Option<&str>;

    /// Name of the primary identifier field.
    fn primary_key(&self) -> &str;

    /// Natural ordering of the collection, if it has one.
    fn default_ordering(&self) -> Vec<OrderField> {
        Vec::new()
    }

    /// Whether `path` names a field this collection can filter on.
    fn has_lookup(&self, path: &str) -> bool;

    /// The full, unfiltered collection.
    #[must_use]
    fn all(&self) -> Self;

    #[must_use]
    fn filter(self, predicate: Predicate) -> Self;

    #[must_use]
    fn exclude(self, predicate: Predicate) -> Self;

    /// Replace the ordering. Unknown fields are ignored.
    #[must_use]
    fn order_by(self, fields: &[OrderField]) -> Self;

    /// Restrict returned records to `fields`. Empty means every field.
    #[must_use]
    fn project(self, fields: &[String]) -> Self;

    /// The empty collection.
    #[must_use]
    fn none(self) -> Self {
        self.filter(Predicate::Nothing)
    }

    async fn count(&self) -> Result<u64, CollectionError>;

    async fn slice(&self, offset: u64, limit: u64) -> Result<Vec<Record>, CollectionError>;
}
