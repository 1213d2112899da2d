//! # Collection-backed Autocomplete
//!
//! [`Autocomplete`] resolves one request against a [`Collection`] in a fixed
//! sequence of stages:
//!
//! 1. **Base retrieval**: the full collection. A collection without a resource
//!    type is a setup mistake and the only error that propagates.
//! 2. **Prepare hook**: [`AutocompleteHooks::prepare_collection`].
//! 3. **Dependent filters**: `f` then `e`. Absent specs are ignored, malformed
//!    specs and unknown lookup paths empty the collection.
//! 4. **Search**: [`AutocompleteHooks::search`] for a non-empty term.
//! 5. **Ordering**: request override, configured ordering, the collection's
//!    own ordering, then the primary key. The primary key always ends the
//!    ordering so pages never overlap.
//! 6. **Authorization-gated pagination**: a principal without `view` gets an
//!    empty page. Out-of-range pages fall back to page 1.
//! 7. **Projection**: display fields plus the primary key, minus virtual fields.
//! 8. **Permission annotation**: `can_*` flags and action URLs.
//! 9. **Sanitization**: every string is escaped, URL fields are filtered.
//! 10. **Post-process hook**: [`AutocompleteHooks::post_process`].
//!
//! Any failure after stage 1 degrades to an empty page. The error text is only
//! included in debug mode.
//!
//! ```rust,ignore
//! let editions = Autocomplete::new(
//!     EntityCollection::<edition::Entity>::new(db, edition::Column::Id)
//!         .with_columns([edition::Column::Name, edition::Column::MagazineId]),
//!     AutocompleteConfig::default()
//!         .with_search_fields(["name"])
//!         .with_display_fields(["name"])
//!         .with_ordering(["name"])
//!         .with_detail_url("/editions/{pk}/"),
//!     Arc::new(MyOracle),
//!     Settings::from_env(),
//! );
//! let page = editions.resolve(&params, &principal).await?;
//! ```

pub mod hooks;
pub mod page;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

pub use hooks::{AutocompleteHooks, DefaultHooks};
pub use page::{Page, ResultItem};

use crate::collection::memory::lookup;
use crate::collection::{Collection, Predicate, Record};
use crate::errors::AutocompleteError;
use crate::permissions::{AccessPolicy, Action, PermissionCache, PermissionOracle, Principal};
use crate::query::{
    AutocompleteParams, DependentFilter, OrderField, QueryRequest, parse_ordering, with_tiebreaker,
};
use crate::sanitize::{DEFAULT_MAX_DEPTH, escape_html, sanitize_record, sanitize_url};
use crate::settings::Settings;

/// Per-autocomplete configuration.
///
/// Built once with the `with_*` methods and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutocompleteConfig {
    /// Fields searched with a case-insensitive substring match.
    pub search_fields: Vec<String>,
    /// Fields returned for every result. Empty returns every field.
    pub display_fields: Vec<String>,
    /// Display fields filled by the post-process hook, never projected.
    pub virtual_fields: Vec<String>,
    pub ordering: Vec<OrderField>,
    /// Overrides [`Settings::default_page_size`].
    pub page_size: Option<u64>,
    pub detail_url: Option<String>,
    pub update_url: Option<String>,
    pub delete_url: Option<String>,
    pub create_url: Option<String>,
    pub skip_authorization: bool,
    pub allow_anonymous: bool,
    pub query_timeout: Option<Duration>,
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl AutocompleteConfig {
    #[must_use]
    pub fn with_search_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search_fields = strings(fields);
        self
    }

    #[must_use]
    pub fn with_display_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.display_fields = strings(fields);
        self
    }

    #[must_use]
    pub fn with_virtual_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.virtual_fields = strings(fields);
        self
    }

    /// Default ordering as specs like `["-year", "name"]`.
    #[must_use]
    pub fn with_ordering<I, S>(mut self, specs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.ordering = parse_ordering(specs);
        self
    }

    /// Sets the page size. Zero is ignored.
    #[must_use]
    pub fn with_page_size(mut self, page_size: u64) -> Self {
        if page_size > 0 {
            self.page_size = Some(page_size);
        }
        self
    }

    /// URL template for the detail link, e.g. `/editions/{pk}/`.
    #[must_use]
    pub fn with_detail_url(mut self, template: impl Into<String>) -> Self {
        self.detail_url = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_update_url(mut self, template: impl Into<String>) -> Self {
        self.update_url = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_delete_url(mut self, template: impl Into<String>) -> Self {
        self.delete_url = Some(template.into());
        self
    }

    #[must_use]
    pub fn with_create_url(mut self, url: impl Into<String>) -> Self {
        self.create_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_skip_authorization(mut self, skip: bool) -> Self {
        self.skip_authorization = skip;
        self
    }

    #[must_use]
    pub fn with_allow_anonymous(mut self, allow: bool) -> Self {
        self.allow_anonymous = allow;
        self
    }

    #[must_use]
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn policy(&self) -> AccessPolicy {
        AccessPolicy {
            skip_authorization: self.skip_authorization,
            allow_anonymous: self.allow_anonymous,
        }
    }

    /// Fields handed to the collection's projection. Empty means all.
    fn projected_fields(&self, primary_key: &str) -> Vec<String> {
        let mut fields: Vec<String> = self
            .display_fields
            .iter()
            .filter(|field| !self.virtual_fields.contains(field))
            .cloned()
            .collect();
        if !self.display_fields.is_empty() && !fields.iter().any(|f| f == primary_key) {
            fields.insert(0, primary_key.to_string());
        }
        fields
    }
}

/// Permission flags for one request. Decisions are per resource type, so
/// they hold for every item of the page.
#[derive(Debug, Clone, Copy)]
struct Grants {
    update: bool,
    delete: bool,
}

/// A configured autocomplete over one collection.
#[derive(Clone)]
pub struct Autocomplete<C, H = DefaultHooks> {
    collection: C,
    config: AutocompleteConfig,
    hooks: H,
    permissions: PermissionCache,
    oracle: Arc<dyn PermissionOracle>,
    settings: Settings,
}

impl<C: std::fmt::Debug, H> std::fmt::Debug for Autocomplete<C, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Autocomplete")
            .field("collection", &self.collection)
            .field("config", &self.config)
            .field("permissions", &self.permissions)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<C: Collection + 'static> Autocomplete<C, DefaultHooks> {
    /// Autocomplete with default hooks and an in-memory permission cache.
    pub fn new(
        collection: C,
        config: AutocompleteConfig,
        oracle: Arc<dyn PermissionOracle>,
        settings: Settings,
    ) -> Self {
        Self {
            collection,
            config,
            hooks: DefaultHooks,
            permissions: PermissionCache::in_memory(&settings),
            oracle,
            settings,
        }
    }
}

impl<C, H> Autocomplete<C, H>
where
    C: Collection + 'static,
    H: AutocompleteHooks<C>,
{
    /// Replace the hooks.
    pub fn with_hooks<H2: AutocompleteHooks<C>>(self, hooks: H2) -> Autocomplete<C, H2> {
        Autocomplete {
            collection: self.collection,
            config: self.config,
            hooks,
            permissions: self.permissions,
            oracle: self.oracle,
            settings: self.settings,
        }
    }

    /// Share a permission cache, e.g. one backed by an external store.
    #[must_use]
    pub fn with_permission_cache(mut self, permissions: PermissionCache) -> Self {
        self.permissions = permissions;
        self
    }

    pub const fn config(&self) -> &AutocompleteConfig {
        &self.config
    }

    pub const fn permissions(&self) -> &PermissionCache {
        &self.permissions
    }

    fn page_size(&self) -> u64 {
        self.config
            .page_size
            .unwrap_or(self.settings.default_page_size)
    }

    /// Resolve raw query parameters for `principal`.
    ///
    /// # Errors
    /// Only [`AutocompleteError::MissingResourceType`]. Every other failure
    /// yields an empty [`Page`].
    pub async fn resolve(
        &self,
        params: &AutocompleteParams,
        principal: &Principal,
    ) -> Result<Page, AutocompleteError> {
        let request =
            QueryRequest::from_params(params, self.page_size(), self.settings.max_page_size);
        self.resolve_request(&request, principal).await
    }

    /// Resolve an already normalized request.
    ///
    /// # Errors
    /// Same as [`resolve`](Self::resolve).
    pub async fn resolve_request(
        &self,
        request: &QueryRequest,
        principal: &Principal,
    ) -> Result<Page, AutocompleteError> {
        let resource_type = self
            .collection
            .resource_type()
            .filter(|name| !name.is_empty())
            .ok_or(AutocompleteError::MissingResourceType)?;

        let outcome = match self.config.query_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(request, principal, resource_type))
                .await
                .unwrap_or(Err(AutocompleteError::Timeout(limit))),
            None => self.run(request, principal, resource_type).await,
        };

        match outcome {
            Ok(page) => Ok(page),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                tracing::error!(error = %err, resource_type, "Autocomplete degraded to an empty page");
                let diagnostic = self.settings.debug.then(|| err.to_string());
                Ok(Page::degraded(diagnostic).with_create_option(false))
            }
        }
    }

    async fn run(
        &self,
        request: &QueryRequest,
        principal: &Principal,
        resource_type: &str,
    ) -> Result<Page, AutocompleteError> {
        let primary_key = self.collection.primary_key().to_string();

        let collection = self.collection.all();
        let collection = self.hooks.prepare_collection(collection, request).await?;

        let collection = apply_dependent(collection, &request.filter, false);
        let collection = apply_dependent(collection, &request.exclude, true);

        let collection = if request.search_term.is_empty() {
            collection
        } else {
            self.hooks
                .search(collection, &self.config.search_fields, &request.search_term)
        };

        let ordering = self.ordering(request, &collection, &primary_key);
        let collection = collection.order_by(&ordering);

        let show_create_option = self.config.create_url.is_some()
            && self.allowed(principal, resource_type, Action::Add).await;

        if !self.allowed(principal, resource_type, Action::View).await {
            tracing::debug!(resource_type, "Principal may not view resource, returning empty page");
            return Ok(Page::empty().with_create_option(show_create_option));
        }

        let count = collection.count().await?;
        let total_pages = page::total_pages(count, request.page_size);
        let page_number = if request.page > total_pages || request.page == 0 {
            tracing::debug!(
                requested = request.page,
                total_pages,
                "Page out of range, falling back to page 1"
            );
            1
        } else {
            request.page
        };

        let collection = collection.project(&self.config.projected_fields(&primary_key));
        let offset = (page_number - 1).saturating_mul(request.page_size);
        let records = collection.slice(offset, request.page_size).await?;

        let grants = Grants {
            update: self.allowed(principal, resource_type, Action::Change).await,
            delete: self.allowed(principal, resource_type, Action::Delete).await,
        };
        let mut results: Vec<ResultItem> = records
            .into_iter()
            .map(|record| self.annotate(record, &primary_key, grants))
            .map(sanitize_item)
            .collect();

        let original: Vec<Value> = results.iter().map(|item| item.id.clone()).collect();
        self.hooks.post_process(&mut results, request).await?;
        preserve_order(&mut results, &original);

        Ok(Page::new(results, page_number, total_pages).with_create_option(show_create_option))
    }

    fn ordering(&self, request: &QueryRequest, collection: &C, primary_key: &str) -> Vec<OrderField> {
        let base = request
            .ordering
            .clone()
            .or_else(|| Some(self.config.ordering.clone()).filter(|o| !o.is_empty()))
            .unwrap_or_else(|| collection.default_ordering());
        with_tiebreaker(base, primary_key)
    }

    async fn allowed(&self, principal: &Principal, resource_type: &str, action: Action) -> bool {
        self.permissions
            .authorize(
                self.oracle.as_ref(),
                principal,
                resource_type,
                action,
                self.config.policy(),
            )
            .await
    }

    fn annotate(&self, record: Record, primary_key: &str, grants: Grants) -> ResultItem {
        let id = lookup(&record, primary_key).cloned().unwrap_or(Value::Null);
        let link = |template: &Option<String>, allowed: bool| {
            let template = template.as_deref().filter(|_| allowed)?;
            let url = resolve_template(template, &record, &id);
            if url.is_none() {
                tracing::warn!(template, id = %id, "Could not resolve action URL template");
            }
            url
        };

        let detail_url = link(&self.config.detail_url, true);
        let update_url = link(&self.config.update_url, grants.update);
        let delete_url = link(&self.config.delete_url, grants.delete);

        let mut item = ResultItem::new(id.clone(), record);
        item.can_view = true;
        item.can_update = grants.update;
        item.can_delete = grants.delete;
        item.detail_url = detail_url;
        item.update_url = update_url;
        item.delete_url = delete_url;
        item
    }
}

fn apply_dependent<C: Collection>(collection: C, filter: &DependentFilter, exclude: bool) -> C {
    match filter {
        DependentFilter::Absent => collection,
        DependentFilter::Malformed(reason) => {
            tracing::debug!(reason, exclude, "Malformed dependent filter, returning no results");
            collection.none()
        }
        DependentFilter::Spec(spec) if !collection.has_lookup(&spec.lookup_path) => {
            tracing::debug!(
                lookup_path = %spec.lookup_path,
                exclude,
                "Unknown lookup path in dependent filter, returning no results"
            );
            collection.none()
        }
        DependentFilter::Spec(spec) => {
            let predicate = Predicate::exact(&spec.lookup_path, &spec.value);
            if exclude {
                collection.exclude(predicate)
            } else {
                collection.filter(predicate)
            }
        }
    }
}

/// Substitute `{field}` placeholders from `record`. `{pk}` is the identifier.
///
/// Returns `None` when a placeholder is unterminated or has no scalar value.
fn resolve_template(template: &str, record: &Record, id: &Value) -> Option<String> {
    let mut resolved = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        resolved.push_str(&rest[..start]);
        let end = rest[start..].find('}')? + start;
        let name = rest[start + 1..end].trim();
        let value = if name == "pk" {
            Some(id)
        } else {
            record.get(name).or_else(|| lookup(record, name))
        };
        match value? {
            Value::String(s) => resolved.push_str(s),
            Value::Number(n) => resolved.push_str(&n.to_string()),
            Value::Bool(b) => resolved.push_str(&b.to_string()),
            _ => return None,
        }
        rest = &rest[end + 1..];
    }
    resolved.push_str(rest);
    Some(resolved)
}

fn sanitize_item(mut item: ResultItem) -> ResultItem {
    item.fields = sanitize_record(&item.fields, DEFAULT_MAX_DEPTH);
    if let Value::String(id) = &item.id {
        item.id = Value::String(escape_html(id));
    }
    for url in [&mut item.detail_url, &mut item.update_url, &mut item.delete_url] {
        *url = sanitize_url(url.as_deref());
    }
    item
}

/// Restore the order of `original` ids after a hook ran. Items the hook added
/// keep their relative order at the end.
fn preserve_order(results: &mut [ResultItem], original: &[Value]) {
    let position = |item: &ResultItem| {
        original
            .iter()
            .position(|id| *id == item.id)
            .unwrap_or(original.len())
    };

    let in_order = results
        .windows(2)
        .all(|pair| position(&pair[0]) <= position(&pair[1]));
    if !in_order {
        tracing::warn!("Post-process hook reordered results, restoring original order");
        results.sort_by_key(position);
    }
}
