//! Cache strategies for cache-backed fetches.
//!
//! | Strategy | Cache Hit | Cache Miss | Use Case |
//! |----------|-----------|-----------|----------|
//! | **Refresh** | Return | Fetch + store | Default; prefer cache |
//! | **Bypass** | Ignore | Fetch + store | Forced refetch, user pressed "reload" |
//! | **Invalidate** | Delete | Fetch + store | After a mutation (registration, edit) |
//! | **Fresh** | Return | `Error::CacheMiss` | Offline view, cache-only |

/// Strategy enum controlling how a fetch consults the cache.
///
/// ```
/// use fetch_kit::strategy::CacheStrategy;
///
/// assert_eq!(CacheStrategy::default(), CacheStrategy::Refresh);
/// assert_eq!(CacheStrategy::from_force(true), CacheStrategy::Bypass);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CacheStrategy {
    /// Try cache first, fetch and store on miss.
    #[default]
    Refresh,

    /// Skip the cache read, fetch, then write the fresh result back.
    Bypass,

    /// Delete the cache entry, then fetch and store.
    Invalidate,

    /// Cache only; a miss is an error and the source is never called.
    Fresh,
}

impl CacheStrategy {
    /// Map a `refetch(force)` flag onto a strategy.
    pub fn from_force(force: bool) -> Self {
        if force {
            CacheStrategy::Bypass
        } else {
            CacheStrategy::Refresh
        }
    }

    /// Whether this strategy reads the cache before fetching.
    pub fn reads_cache(self) -> bool {
        matches!(self, CacheStrategy::Refresh | CacheStrategy::Fresh)
    }
}

impl std::fmt::Display for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStrategy::Refresh => write!(f, "Refresh"),
            CacheStrategy::Bypass => write!(f, "Bypass"),
            CacheStrategy::Invalidate => write!(f, "Invalidate"),
            CacheStrategy::Fresh => write!(f, "Fresh"),
        }
    }
}
