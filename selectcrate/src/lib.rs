//! # selectcrate
//!
//! Server-side autocomplete for searchable select widgets.
//!
//! Given a free-text query, optional dependent-field filters and a page number,
//! selectcrate resolves a stable, paginated, permission-filtered and
//! XSS-sanitized slice of records from any [`Collection`]: a Sea-ORM entity, an
//! in-memory record list, or a static [`ChoiceSource`].
//!
//! ## Feature map
//!
//! - **[`pipeline`]**: the collection-backed resolution pipeline
//!   (filter → search → order → paginate → project → authorize → sanitize → post-process)
//! - **[`choices`]**: the enumeration pipeline for static choices
//! - **[`permissions`]**: versioned permission cache in front of a [`PermissionOracle`]
//! - **[`sanitize`]**: HTML escaping and URL allow/deny filtering
//! - **[`query`]**: request parameter parsing and normalization
//!
//! ## Usage
//!
//! ```rust,ignore
//! use selectcrate::{Autocomplete, AutocompleteConfig, AutocompleteParams, Principal};
//!
//! async fn editions(
//!     axum::extract::State(state): axum::extract::State<AppState>,
//!     axum::extract::Query(params): axum::extract::Query<AutocompleteParams>,
//! ) -> Result<selectcrate::Page, selectcrate::AutocompleteError> {
//!     state.editions.resolve(&params, &Principal::user("42")).await
//! }
//! ```

pub mod choices;
pub mod collection;
pub mod errors;
pub mod permissions;
pub mod pipeline;
pub mod query;
pub mod sanitize;
pub mod settings;

pub use choices::{Choice, ChoiceEnum, ChoiceSource};
pub use collection::{Collection, EntityCollection, MemoryCollection, Predicate, Record};
pub use errors::{AutocompleteError, CacheError, CollectionError, OracleError};
pub use permissions::{
    Action, CacheBackend, MemoryBackend, PermissionCache, PermissionOracle, Principal,
};
pub use pipeline::{
    Autocomplete, AutocompleteConfig, AutocompleteHooks, DefaultHooks, Page, ResultItem,
};
pub use query::{AutocompleteParams, FilterSpec, OrderField, QueryRequest};
pub use settings::Settings;
