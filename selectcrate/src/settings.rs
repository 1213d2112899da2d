//! Host environment settings.
//!
//! These describe the environment selectcrate runs in rather than any single
//! autocomplete: whether debug diagnostics may be exposed, the fallback page
//! size, and how long permission decisions stay cached.

use std::time::Duration;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const DEFAULT_MAX_PAGE_SIZE: u64 = 100;
pub const DEFAULT_PERMISSION_CACHE_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Debug mode exposes pipeline errors in responses and bypasses the
    /// permission cache.
    pub debug: bool,
    /// Page size used when a request does not carry a valid one.
    pub default_page_size: u64,
    /// Upper bound applied to requested page sizes.
    pub max_page_size: u64,
    /// Time-to-live of cached permission decisions.
    pub permission_cache_ttl: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: false,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            permission_cache_ttl: DEFAULT_PERMISSION_CACHE_TTL,
        }
    }
}

impl Settings {
    /// Load settings from `SELECTCRATE_*` environment variables.
    ///
    /// Missing or unparseable values keep their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let debug = lookup("SELECTCRATE_DEBUG")
            .map_or(defaults.debug, |value| parse_flag(&value));
        let default_page_size = lookup("SELECTCRATE_PAGE_SIZE")
            .and_then(|value| parse_positive(&value))
            .unwrap_or(defaults.default_page_size);
        let max_page_size = lookup("SELECTCRATE_MAX_PAGE_SIZE")
            .and_then(|value| parse_positive(&value))
            .unwrap_or(defaults.max_page_size);
        let permission_cache_ttl = lookup("SELECTCRATE_PERMISSION_CACHE_TTL")
            .and_then(|value| parse_positive(&value))
            .map_or(defaults.permission_cache_ttl, Duration::from_secs);

        Self {
            debug,
            default_page_size,
            max_page_size,
            permission_cache_ttl,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the fallback page size. Zero is ignored.
    #[must_use]
    pub fn with_default_page_size(mut self, page_size: u64) -> Self {
        if page_size > 0 {
            self.default_page_size = page_size;
        }
        self
    }

    /// Sets the page size ceiling. Zero is ignored.
    #[must_use]
    pub fn with_max_page_size(mut self, max_page_size: u64) -> Self {
        if max_page_size > 0 {
            self.max_page_size = max_page_size;
        }
        self
    }

    #[must_use]
    pub fn with_permission_cache_ttl(mut self, ttl: Duration) -> Self {
        self.permission_cache_ttl = ttl;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_positive(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok().filter(|n| *n > 0)
}
