//! # fetch-kit
//!
//! Client-side data caching and loading building blocks for async Rust
//! applications: a TTL cache with LRU eviction, cache-backed resources,
//! visibility-aware refresh and priority-ordered staged loading.
//!
//! ## Features
//!
//! - **TTL + LRU cache:** sliding expiration, bounded size, best-effort snapshot persistence
//! - **Cache-backed resources:** `{ data, loading, error }` state around any async data source
//! - **Visibility-aware refresh:** refetch after the application was hidden long enough
//! - **Staged loading:** load critical data first, report progress, retry per stage
//! - **Batch operations:** bounded-concurrency bulk actions with progress reporting
//!
//! ## Quick Start
//!
//! ```
//! use fetch_kit::{CacheConfig, CachedResource, FetchOptions, TtlCache};
//! use std::time::Duration;
//!
//! # async fn demo() -> fetch_kit::Result<()> {
//! // One cache shared by every resource in the application
//! let cache = TtlCache::new(CacheConfig::default().with_max_size(50))?;
//!
//! let workshops = CachedResource::new(
//!     "workshops",
//!     cache.clone(),
//!     || async { Ok::<_, fetch_kit::Error>(vec!["Rust 101".to_string()]) },
//!     FetchOptions::default().with_ttl(Duration::from_secs(60)),
//! );
//!
//! workshops.load().await?;
//! assert!(cache.has("workshops"));
//! # Ok(())
//! # }
//! ```
//!
//! Time is measured with [`tokio::time::Instant`], so expiry and refresh
//! thresholds can be tested with a paused runtime clock.

#[macro_use]
extern crate log;

pub mod batch;
pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod observability;
pub mod resource;
pub mod source;
pub mod staged;
pub mod storage;
pub mod strategy;
pub mod visibility;
pub mod visibility_fetch;

// Re-exports for convenience
pub use batch::{BatchProgress, BatchReport, BatchRunner};
pub use cache::{CacheStats, TtlCache};
pub use config::{BatchOptions, CacheConfig, FetchOptions, VisibilityConfig, VisibilityFetchOptions};
pub use error::{Error, Result};
pub use key::CacheKeyBuilder;
pub use resource::{CachedResource, ResourceState};
pub use source::DataSource;
pub use staged::{LoadProgress, Stage, StagedLoadOptions, StagedLoader};
pub use storage::SnapshotStore;
pub use strategy::CacheStrategy;
pub use visibility::VisibilityCoordinator;
pub use visibility_fetch::VisibilityAwareFetch;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
