//! # Pipeline Hooks
//!
//! [`AutocompleteHooks`] lets callers customize an autocomplete without
//! touching the pipeline itself. Every method has a default, so implementors
//! only override what they need:
//!
//! - [`prepare_collection`](AutocompleteHooks::prepare_collection): narrow or
//!   annotate the collection before dependent filters are applied
//! - [`search`](AutocompleteHooks::search): replace the default
//!   case-insensitive substring search
//! - [`post_process`](AutocompleteHooks::post_process): fill virtual fields
//!   or reshape items after sanitization
//!
//! Hooks transform data. They cannot reorder pipeline stages, and the result
//! order produced by the ordering stage survives `post_process`.
//!
//! ```rust,ignore
//! struct PublishedOnly;
//!
//! #[async_trait]
//! impl AutocompleteHooks<EntityCollection<edition::Entity>> for PublishedOnly {
//!     async fn prepare_collection(
//!         &self,
//!         collection: EntityCollection<edition::Entity>,
//!         _request: &QueryRequest,
//!     ) -> Result<EntityCollection<edition::Entity>, AutocompleteError> {
//!         Ok(collection.filter(Predicate::exact("published", "true")))
//!     }
//!
//!     async fn post_process(
//!         &self,
//!         results: &mut Vec<ResultItem>,
//!         _request: &QueryRequest,
//!     ) -> Result<(), AutocompleteError> {
//!         for item in results.iter_mut() {
//!             let label = format!("#{}", item.id);
//!             item.fields.insert("label".into(), label.into());
//!         }
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use super::page::ResultItem;
use crate::collection::{Collection, Predicate};
use crate::errors::AutocompleteError;
use crate::query::QueryRequest;

/// Extension points of the collection-backed pipeline.
#[async_trait]
pub trait AutocompleteHooks<C: Collection + 'static>: Send + Sync {
    /// Called on the full collection before dependent filtering.
    ///
    /// # Errors
    /// An error degrades the request to an empty page.
    async fn prepare_collection(
        &self,
        collection: C,
        _request: &QueryRequest,
    ) -> Result<C, AutocompleteError> {
        Ok(collection) // Default: passthrough
    }

    /// Narrow `collection` to records matching a non-empty `term`.
    ///
    /// The default ORs a case-insensitive substring match over `fields`. With
    /// no fields configured the collection is returned unchanged.
    fn search(&self, collection: C, fields: &[String], term: &str) -> C {
        if fields.is_empty() {
            tracing::debug!(term, "No search fields configured, search is a no-op");
            return collection;
        }
        collection.filter(Predicate::search(fields, term))
    }

    /// Called with the sanitized page of results.
    ///
    /// Items may be modified, added or removed. Reordering is undone.
    ///
    /// # Errors
    /// An error degrades the request to an empty page.
    async fn post_process(
        &self,
        _results: &mut Vec<ResultItem>,
        _request: &QueryRequest,
    ) -> Result<(), AutocompleteError> {
        Ok(())
    }
}

/// Hooks that change nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHooks;

impl<C: Collection + 'static> AutocompleteHooks<C> for DefaultHooks {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use serde_json::json;

    fn collection() -> MemoryCollection {
        MemoryCollection::new(vec![
            json!({"id": 1, "name": "Spring", "code": "SPR"}),
            json!({"id": 2, "name": "Summer", "code": "SUM"}),
        ])
    }

    #[tokio::test]
    async fn test_default_search_ors_fields() {
        let fields = vec!["name".to_string(), "code".to_string()];
        let found = DefaultHooks.search(collection(), &fields, "sum");
        assert_eq!(found.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_default_search_without_fields_is_noop() {
        let found = DefaultHooks.search(collection(), &[], "nothing matches this");
        assert_eq!(found.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_default_prepare_is_passthrough() {
        let prepared = DefaultHooks
            .prepare_collection(collection(), &QueryRequest::default())
            .await
            .unwrap();
        assert_eq!(prepared.count().await.unwrap(), 2);
    }
}
