//! guestdir - local cache and typeahead search for a remote guest directory.
//!
//! The crate keeps a persistent, periodically re-hydrated mirror of the
//! directory and answers typeahead queries from it (or from the directory's
//! own search endpoint, falling back to the mirror when that fails).
//!
//! Entry point is [`CacheService`]:
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use guestdir::{ApiClient, CacheService, Config};
//!
//! let config = Config::load()?;
//! let client = Arc::new(ApiClient::new(config.api_base_url.clone())?);
//! let service = CacheService::open(&config, &config.cache_dir()?, client);
//! service.init().await?;
//! service.hydrate(false).await?;
//! let outcome = service.submit_query("lek").await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod search;
pub mod service;
pub mod utils;

pub use api::{ApiClient, ApiError, GuestDirectory};
pub use cache::{FileStore, FreshnessMarker, Hydrator, KeyValueStore, MemoryStore, Record, Snapshot};
pub use config::Config;
pub use error::CacheError;
pub use models::{GuestSummary, RemoteGuest};
pub use search::{SearchMode, SearchOrchestrator, SearchOutcome, SearchPhase};
pub use service::{CacheService, CacheStatus};
