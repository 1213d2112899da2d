//! # Permission Caching
//!
//! selectcrate does not decide who may see what. That is the job of a
//! [`PermissionOracle`] supplied by the host application. This module memoizes
//! the oracle's answers per `(user, resource type, action)`.
//!
//! ## Versioned keys
//!
//! Cache keys embed two version counters: a global one and one per user.
//! [`PermissionCache::invalidate_user`] bumps the user's counter and
//! [`PermissionCache::invalidate_all`] bumps the global one. Old entries stay
//! in the backend but can no longer be addressed, and expire through their
//! TTL. No backend ever has to enumerate keys.
//!
//! Backends with atomic increments are used as such. For the others the
//! counter is read, incremented and written back; two concurrent invalidations
//! may then collapse into one bump. Both still move the version away from the
//! value readers last saw.
//!
//! ## Failure model
//!
//! Every backend error is logged and treated as a miss (or a no-op for
//! writes). The oracle is then asked directly, so caching can slow
//! authorization down but never change its outcome.

pub mod backend;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

pub use backend::{CacheBackend, CacheValue, MemoryBackend};

use crate::errors::OracleError;
use crate::settings::Settings;

const KEY_PREFIX: &str = "selectcrate:perm";
const GLOBAL_VERSION_KEY: &str = "selectcrate:perm:version:global";

/// Who is asking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User { id: String },
}

impl Principal {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User { id: id.into() }
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User { id } => Some(id.as_str()),
        }
    }

    #[must_use]
    pub const fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

/// Actions checked against a resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    View,
    Add,
    Change,
    Delete,
}

impl Action {
    #[must_use]
    pub const fn codename(self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Add => "add",
            Self::Change => "change",
            Self::Delete => "delete",
        }
    }

    /// Permission name handed to the oracle, e.g. `view_magazine`.
    #[must_use]
    pub fn permission_name(self, resource_type: &str) -> String {
        format!("{}_{resource_type}", self.codename())
    }
}

/// External source of truth for authorization decisions.
#[async_trait]
pub trait PermissionOracle: Send + Sync {
    /// Whether `user_id` holds every permission in `permissions`.
    async fn has_permissions(&self, user_id: &str, permissions: &[String]) -> Result<bool, OracleError>;
}

/// Per-autocomplete switches that short-circuit authorization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    /// Grant every action without consulting the oracle.
    pub skip_authorization: bool,
    /// Let anonymous principals view results.
    pub allow_anonymous: bool,
}

/// Versioned, TTL-bounded cache of permission decisions.
#[derive(Clone)]
pub struct PermissionCache {
    backend: Arc<dyn CacheBackend>,
    ttl: Duration,
    bypass: bool,
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache")
            .field("ttl", &self.ttl)
            .field("bypass", &self.bypass)
            .field("atomic_increment", &self.backend.supports_atomic_increment())
            .finish_non_exhaustive()
    }
}

impl PermissionCache {
    /// Create a cache over `backend`. In debug mode every lookup is bypassed.
    pub fn new(backend: Arc<dyn CacheBackend>, settings: &Settings) -> Self {
        Self {
            backend,
            ttl: settings.permission_cache_ttl,
            bypass: settings.debug,
        }
    }

    /// In-process cache with the given settings.
    #[must_use]
    pub fn in_memory(settings: &Settings) -> Self {
        Self::new(Arc::new(MemoryBackend::default()), settings)
    }

    /// Whether lookups skip the backend entirely.
    #[must_use]
    pub const fn is_bypassed(&self) -> bool {
        self.bypass
    }

    /// Cached decision, or `None` on a miss or backend failure.
    pub async fn get(&self, user_id: &str, resource_type: &str, action: Action) -> Option<bool> {
        let key = self.entry_key(user_id, resource_type, action).await?;
        match self.backend.get(&key).await {
            Ok(Some(CacheValue::Decision(allowed))) => Some(allowed),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, user_id, resource_type, "Permission cache read failed");
                None
            }
        }
    }

    /// Store a decision. Backend failures are logged and ignored.
    pub async fn set(&self, user_id: &str, resource_type: &str, action: Action, allowed: bool) {
        let Some(key) = self.entry_key(user_id, resource_type, action).await else {
            return;
        };
        if let Err(err) = self
            .backend
            .set(&key, CacheValue::Decision(allowed), Some(self.ttl))
            .await
        {
            tracing::warn!(error = %err, user_id, resource_type, "Permission cache write failed");
        }
    }

    /// Make every cached decision of one user unreachable.
    pub async fn invalidate_user(&self, user_id: &str) {
        self.bump(&user_version_key(user_id)).await;
    }

    /// Make every cached decision unreachable.
    pub async fn invalidate_all(&self) {
        self.bump(GLOBAL_VERSION_KEY).await;
    }

    /// Look a decision up, computing and storing it on a miss.
    ///
    /// Failed computations are denied and not stored.
    pub async fn cached<F, Fut>(&self, user_id: &str, resource_type: &str, action: Action, compute: F) -> bool
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<bool, OracleError>> + Send,
    {
        if self.bypass {
            return resolve_decision(compute().await, user_id, resource_type, action);
        }

        if let Some(allowed) = self.get(user_id, resource_type, action).await {
            return allowed;
        }

        match compute().await {
            Ok(allowed) => {
                self.set(user_id, resource_type, action, allowed).await;
                allowed
            }
            err @ Err(_) => resolve_decision(err, user_id, resource_type, action),
        }
    }

    /// Decide whether `principal` may perform `action` on `resource_type`.
    ///
    /// Skipped authorization and anonymous access never touch the cache.
    pub async fn authorize(
        &self,
        oracle: &dyn PermissionOracle,
        principal: &Principal,
        resource_type: &str,
        action: Action,
        policy: AccessPolicy,
    ) -> bool {
        if policy.skip_authorization {
            return true;
        }

        match principal {
            Principal::Anonymous => policy.allow_anonymous && action == Action::View,
            Principal::User { id } => {
                let permissions = vec![action.permission_name(resource_type)];
                self.cached(id, resource_type, action, || async move {
                    oracle.has_permissions(id, &permissions).await
                })
                .await
            }
        }
    }

    async fn entry_key(&self, user_id: &str, resource_type: &str, action: Action) -> Option<String> {
        let global = self.version(GLOBAL_VERSION_KEY).await?;
        let user = self.version(&user_version_key(user_id)).await?;

        let mut hasher = blake3::Hasher::new();
        for part in [user_id, resource_type, action.codename()] {
            hasher.update(part.as_bytes());
            hasher.update(b"\x1f");
        }
        hasher.update(format!("{global}:{user}").as_bytes());
        Some(format!("{KEY_PREFIX}:{}", hasher.finalize().to_hex()))
    }

    /// Current counter value; `None` when the backend cannot be read.
    async fn version(&self, key: &str) -> Option<u64> {
        match self.backend.get(key).await {
            Ok(Some(CacheValue::Version(n))) => Some(n),
            Ok(_) => Some(0),
            Err(err) => {
                tracing::warn!(error = %err, key, "Permission cache version read failed");
                None
            }
        }
    }

    async fn bump(&self, key: &str) {
        let result = if self.backend.supports_atomic_increment() {
            self.backend.incr(key).await.map(|_| ())
        } else {
            // Non-atomic: concurrent bumps may collapse into one.
            match self.backend.get(key).await {
                Ok(current) => {
                    let next = match current {
                        Some(CacheValue::Version(n)) => n.saturating_add(1),
                        _ => 1,
                    };
                    self.backend.set(key, CacheValue::Version(next), None).await
                }
                Err(err) => Err(err),
            }
        };

        if let Err(err) = result {
            tracing::warn!(error = %err, key, "Permission cache invalidation failed");
        }
    }
}

fn user_version_key(user_id: &str) -> String {
    format!("{KEY_PREFIX}:version:user:{user_id}")
}

fn resolve_decision(
    result: Result<bool, OracleError>,
    user_id: &str,
    resource_type: &str,
    action: Action,
) -> bool {
    result.unwrap_or_else(|err| {
        tracing::warn!(
            error = %err,
            user_id,
            resource_type,
            action = action.codename(),
            "Permission oracle failed, denying"
        );
        false
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CacheError;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Backend without atomic increments.
    #[derive(Default)]
    struct MapBackend {
        entries: Mutex<HashMap<String, CacheValue>>,
    }

    #[async_trait]
    impl CacheBackend for MapBackend {
        async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
            Ok(self.entries.lock().unwrap().get(key).copied())
        }

        async fn set(&self, key: &str, value: CacheValue, _ttl: Option<Duration>) -> Result<(), CacheError> {
            self.entries.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }
    }

    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        async fn get(&self, _key: &str) -> Result<Option<CacheValue>, CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }

        async fn set(&self, _key: &str, _value: CacheValue, _ttl: Option<Duration>) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".to_string()))
        }
    }

    struct CountingOracle {
        allow: bool,
        calls: AtomicUsize,
    }

    impl CountingOracle {
        fn new(allow: bool) -> Self {
            Self { allow, calls: AtomicUsize::new(0) }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PermissionOracle for CountingOracle {
        async fn has_permissions(&self, _user_id: &str, _permissions: &[String]) -> Result<bool, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.allow)
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl PermissionOracle for FailingOracle {
        async fn has_permissions(&self, _user_id: &str, _permissions: &[String]) -> Result<bool, OracleError> {
            Err(OracleError("directory unavailable".to_string()))
        }
    }

    fn caches() -> Vec<PermissionCache> {
        let settings = Settings::default();
        vec![
            PermissionCache::in_memory(&settings),
            PermissionCache::new(Arc::new(MapBackend::default()), &settings),
        ]
    }

    #[test]
    fn test_permission_names() {
        assert_eq!(Action::View.permission_name("magazine"), "view_magazine");
        assert_eq!(Action::Change.permission_name("edition"), "change_edition");
    }

    #[tokio::test]
    async fn test_get_after_set() {
        for cache in caches() {
            assert_eq!(cache.get("u1", "magazine", Action::View).await, None);
            cache.set("u1", "magazine", Action::View, true).await;
            assert_eq!(cache.get("u1", "magazine", Action::View).await, Some(true));
            assert_eq!(cache.get("u1", "magazine", Action::Delete).await, None);
            assert_eq!(cache.get("u2", "magazine", Action::View).await, None);
        }
    }

    #[tokio::test]
    async fn test_invalidate_user_only_affects_that_user() {
        for cache in caches() {
            cache.set("u1", "magazine", Action::View, true).await;
            cache.set("u2", "magazine", Action::View, false).await;

            cache.invalidate_user("u1").await;

            assert_eq!(cache.get("u1", "magazine", Action::View).await, None);
            assert_eq!(cache.get("u2", "magazine", Action::View).await, Some(false));
        }
    }

    #[tokio::test]
    async fn test_invalidate_all_misses_every_user() {
        for cache in caches() {
            cache.set("u1", "magazine", Action::View, true).await;
            cache.set("u2", "edition", Action::Change, true).await;

            cache.invalidate_all().await;

            assert_eq!(cache.get("u1", "magazine", Action::View).await, None);
            assert_eq!(cache.get("u2", "edition", Action::Change).await, None);

            // New decisions are cached under the new version
            cache.set("u1", "magazine", Action::View, false).await;
            assert_eq!(cache.get("u1", "magazine", Action::View).await, Some(false));
        }
    }

    #[tokio::test]
    async fn test_cached_memoizes_oracle_answers() {
        let cache = PermissionCache::in_memory(&Settings::default());
        let oracle = CountingOracle::new(true);
        let principal = Principal::user("u1");

        for _ in 0..3 {
            assert!(
                cache
                    .authorize(&oracle, &principal, "magazine", Action::View, AccessPolicy::default())
                    .await
            );
        }
        assert_eq!(oracle.calls(), 1);

        cache.invalidate_user("u1").await;
        assert!(
            cache
                .authorize(&oracle, &principal, "magazine", Action::View, AccessPolicy::default())
                .await
        );
        assert_eq!(oracle.calls(), 2);
    }

    #[tokio::test]
    async fn test_debug_mode_bypasses_cache() {
        let cache = PermissionCache::in_memory(&Settings::default().with_debug(true));
        let oracle = CountingOracle::new(true);
        let principal = Principal::user("u1");

        assert!(cache.is_bypassed());
        for _ in 0..3 {
            cache
                .authorize(&oracle, &principal, "magazine", Action::View, AccessPolicy::default())
                .await;
        }
        assert_eq!(oracle.calls(), 3);
    }

    #[tokio::test]
    async fn test_backend_failure_falls_through_to_oracle() {
        let cache = PermissionCache::new(Arc::new(BrokenBackend), &Settings::default());
        let allow = CountingOracle::new(true);
        let deny = CountingOracle::new(false);
        let principal = Principal::user("u1");

        assert!(
            cache
                .authorize(&allow, &principal, "magazine", Action::View, AccessPolicy::default())
                .await
        );
        assert!(
            !cache
                .authorize(&deny, &principal, "magazine", Action::View, AccessPolicy::default())
                .await
        );
        assert_eq!(allow.calls(), 1);
        assert_eq!(deny.calls(), 1);

        // Invalidation on a broken backend is a no-op, not a panic
        cache.invalidate_user("u1").await;
        cache.invalidate_all().await;
    }

    #[tokio::test]
    async fn test_oracle_failure_denies_without_caching() {
        let cache = PermissionCache::in_memory(&Settings::default());
        let principal = Principal::user("u1");

        assert!(
            !cache
                .authorize(&FailingOracle, &principal, "magazine", Action::View, AccessPolicy::default())
                .await
        );
        assert_eq!(cache.get("u1", "magazine", Action::View).await, None);
    }

    #[tokio::test]
    async fn test_policy_short_circuits() {
        let cache = PermissionCache::in_memory(&Settings::default());
        let oracle = CountingOracle::new(false);

        let skip = AccessPolicy { skip_authorization: true, allow_anonymous: false };
        assert!(cache.authorize(&oracle, &Principal::user("u1"), "magazine", Action::Delete, skip).await);

        let anonymous = AccessPolicy { skip_authorization: false, allow_anonymous: true };
        assert!(cache.authorize(&oracle, &Principal::Anonymous, "magazine", Action::View, anonymous).await);
        assert!(!cache.authorize(&oracle, &Principal::Anonymous, "magazine", Action::Change, anonymous).await);
        assert!(
            !cache
                .authorize(&oracle, &Principal::Anonymous, "magazine", Action::View, AccessPolicy::default())
                .await
        );

        assert_eq!(oracle.calls(), 0);
    }
}
