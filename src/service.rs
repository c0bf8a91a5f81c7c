//! The guest cache as one explicit object.
//!
//! `CacheService` owns the store, the freshness marker, the hydrator and the
//! search orchestrator. Build it once at start-up and share it (`Arc`) with
//! whatever needs typeahead.

use std::path::Path;
use std::sync::Arc;

use chrono::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::api::GuestDirectory;
use crate::cache::{FileStore, FreshnessMarker, Hydrator, KeyValueStore, MemoryStore};
use crate::config::Config;
use crate::error::Result;
use crate::models::{GuestSummary, RemoteGuest};
use crate::search::{SearchMode, SearchOrchestrator, SearchOutcome, SearchStrategy};

/// Store file name in the cache directory
const STORE_FILE: &str = "guests.json";

/// Freshness marker file name in the cache directory
const MARKER_FILE: &str = "freshness.json";

/// Snapshot of cache health for status displays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStatus {
    pub records: usize,
    pub last_hydrated: String,
    pub is_stale: bool,
    pub search_mode: SearchMode,
}

pub struct CacheService {
    store: Arc<dyn KeyValueStore<GuestSummary>>,
    marker: Arc<FreshnessMarker>,
    hydrator: Hydrator,
    orchestrator: SearchOrchestrator,
    ttl: Duration,
}

impl CacheService {
    /// File-backed service rooted at `cache_dir`.
    pub fn open(config: &Config, cache_dir: &Path, directory: Arc<dyn GuestDirectory>) -> Self {
        let store: Arc<dyn KeyValueStore<GuestSummary>> =
            Arc::new(FileStore::new(cache_dir.join(STORE_FILE)));
        let marker = Arc::new(FreshnessMarker::new(cache_dir.join(MARKER_FILE)));
        Self::with_parts(config, store, marker, directory)
    }

    /// Memory-backed service; nothing touches the filesystem.
    pub fn in_memory(config: &Config, directory: Arc<dyn GuestDirectory>) -> Self {
        let store: Arc<dyn KeyValueStore<GuestSummary>> = Arc::new(MemoryStore::new());
        Self::with_parts(config, store, Arc::new(FreshnessMarker::in_memory()), directory)
    }

    pub fn with_parts(
        config: &Config,
        store: Arc<dyn KeyValueStore<GuestSummary>>,
        marker: Arc<FreshnessMarker>,
        directory: Arc<dyn GuestDirectory>,
    ) -> Self {
        let settings = config.hydration_settings();
        let hydrator = Hydrator::new(directory.clone(), store.clone(), marker.clone(), settings);
        let strategy = SearchStrategy::for_mode(
            config.search_mode,
            store.clone(),
            directory,
            config.result_limit.max(1),
        );
        let orchestrator = SearchOrchestrator::new(strategy, config.debounce());

        Self {
            store,
            marker,
            hydrator,
            orchestrator,
            ttl: settings.ttl,
        }
    }

    /// Open the store and load the freshness marker. A store that cannot be
    /// opened is returned as `StoreUnavailable`; search is unusable until
    /// this succeeds.
    pub async fn init(&self) -> Result<()> {
        self.store.init().await?;
        self.marker.load().await?;
        info!(mode = %self.orchestrator.mode(), "Guest cache ready");
        Ok(())
    }

    /// See [`Hydrator::hydrate`].
    pub async fn hydrate(&self, force: bool) -> Result<usize> {
        self.hydrator.hydrate(force).await
    }

    /// Hydrate on a background task. Transient failures are logged and
    /// reported through the handle; the previous snapshot keeps serving.
    pub fn refresh_in_background(self: &Arc<Self>, force: bool) -> JoinHandle<Option<usize>> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            match service.hydrate(force).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(error = %e, transient = e.is_transient(), "Background guest refresh failed");
                    None
                }
            }
        })
    }

    /// Undebounced search through the configured strategy.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<GuestSummary>>> {
        self.orchestrator.search(query, cancel).await
    }

    /// Debounced, last-query-wins search for keystroke input.
    pub async fn submit_query(&self, query: &str) -> Result<SearchOutcome> {
        self.orchestrator.submit(query).await
    }

    pub fn orchestrator(&self) -> &SearchOrchestrator {
        &self.orchestrator
    }

    /// Write path for guest create/edit screens: keeps the mirror in step
    /// with a change the server has already accepted.
    pub async fn upsert_guest(&self, guest: RemoteGuest) -> Result<GuestSummary> {
        let summary = guest.into_summary();
        self.store.put_batch(vec![summary.clone()]).await?;
        Ok(summary)
    }

    pub async fn status(&self) -> Result<CacheStatus> {
        let records = self.store.len().await?;
        Ok(CacheStatus {
            records,
            last_hydrated: self.marker.age_display().await,
            is_stale: records == 0 || !self.marker.is_fresh(self.ttl).await,
            search_mode: self.orchestrator.mode(),
        })
    }

    /// Cancel anything in flight. The service stays usable.
    pub async fn dispose(&self) {
        self.orchestrator.cancel_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{generated, remote, MockDirectory};
    use crate::error::CacheError;
    use tempfile::TempDir;

    fn config(mode: SearchMode) -> Config {
        Config {
            page_size: 3,
            search_mode: mode,
            ..Config::default()
        }
    }

    fn three_pages() -> Vec<Vec<RemoteGuest>> {
        vec![generated("a", 3), generated("b", 3), generated("c", 1)]
    }

    #[tokio::test]
    async fn test_first_hydrate_then_ttl_gate() {
        let directory = Arc::new(MockDirectory::new().with_pages(three_pages()));
        let service = CacheService::in_memory(&config(SearchMode::Local), directory.clone());
        service.init().await.expect("init");

        assert_eq!(service.hydrate(false).await.expect("hydrate"), 7);
        let calls = directory.page_calls();
        assert_eq!(service.hydrate(false).await.expect("hydrate again"), 0);
        assert_eq!(directory.page_calls(), calls);

        let status = service.status().await.expect("status");
        assert_eq!(status.records, 7);
        assert_eq!(status.last_hydrated, "just now");
        assert!(!status.is_stale);
    }

    #[tokio::test]
    async fn test_status_before_hydration_is_stale() {
        let service = CacheService::in_memory(&config(SearchMode::Remote), Arc::new(MockDirectory::new()));
        service.init().await.expect("init");

        let status = service.status().await.expect("status");
        assert_eq!(status.records, 0);
        assert_eq!(status.last_hydrated, "never");
        assert!(status.is_stale);
        assert_eq!(status.search_mode, SearchMode::Remote);
    }

    #[tokio::test]
    async fn test_upsert_is_searchable() {
        let service = CacheService::in_memory(&config(SearchMode::Local), Arc::new(MockDirectory::new()));
        service.init().await.expect("init");

        service
            .upsert_guest(remote("10", "Lekana", Some("+1 555-1234")))
            .await
            .expect("upsert");

        let results = service
            .search("5551234", &CancellationToken::new())
            .await
            .expect("search")
            .expect("delivered");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id(), "10");
    }

    #[tokio::test]
    async fn test_search_before_init_fails() {
        let service = CacheService::in_memory(&config(SearchMode::Local), Arc::new(MockDirectory::new()));
        let err = service
            .search("lek", &CancellationToken::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, CacheError::NotInitialized));
    }

    #[tokio::test]
    async fn test_file_backed_service_reuses_snapshot_across_restarts() {
        let dir = TempDir::new().expect("tempdir");
        let directory = Arc::new(MockDirectory::new().with_pages(three_pages()));

        let first = CacheService::open(&config(SearchMode::Local), dir.path(), directory.clone());
        first.init().await.expect("init");
        assert_eq!(first.hydrate(false).await.expect("hydrate"), 7);
        drop(first);

        let second = CacheService::open(&config(SearchMode::Local), dir.path(), directory.clone());
        second.init().await.expect("reinit");
        assert_eq!(second.hydrate(false).await.expect("hydrate"), 0);
        assert_eq!(directory.page_calls(), 3);
        assert_eq!(second.status().await.expect("status").records, 7);
    }

    #[tokio::test]
    async fn test_unopenable_cache_dir_is_store_unavailable() {
        let dir = TempDir::new().expect("tempdir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").expect("write");

        let service = CacheService::open(&config(SearchMode::Local), &blocker, Arc::new(MockDirectory::new()));
        assert!(matches!(service.init().await, Err(CacheError::StoreUnavailable(_))));
    }

    #[tokio::test]
    async fn test_background_refresh_absorbs_failure() {
        let directory = Arc::new(MockDirectory::new().with_pages(three_pages()));
        directory.set_fail_on_page(1);
        let service = Arc::new(CacheService::in_memory(&config(SearchMode::Local), directory.clone()));
        service.init().await.expect("init");

        let outcome = service.refresh_in_background(false).await.expect("join");
        assert_eq!(outcome, None);

        directory.set_fail_on_page(0);
        let outcome = service.refresh_in_background(false).await.expect("join");
        assert_eq!(outcome, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_while_hydrating_sees_whole_snapshot() {
        let directory = Arc::new(MockDirectory::new().with_pages(three_pages()));
        let service = Arc::new(CacheService::in_memory(&config(SearchMode::Local), directory));
        service.init().await.expect("init");
        service
            .upsert_guest(remote("old", "Guest old", None))
            .await
            .expect("seed");

        let (hydrated, outcome) = tokio::join!(service.hydrate(true), service.submit_query("guest"));

        assert_eq!(hydrated.expect("hydrate"), 7);
        match outcome.expect("submit") {
            // Either the seeded snapshot or the hydrated one, never a mix.
            SearchOutcome::Delivered(results) => {
                let has_old = results.iter().any(|g| g.id() == "old");
                assert!(if has_old { results.len() == 1 } else { results.len() == 7 });
            }
            SearchOutcome::Superseded => panic!("nothing superseded this query"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_cancels_pending_query() {
        let service = CacheService::in_memory(&config(SearchMode::Local), Arc::new(MockDirectory::new()));
        service.init().await.expect("init");

        let (outcome, _) = tokio::join!(service.submit_query("lek"), service.dispose());
        assert_eq!(outcome.expect("submit"), SearchOutcome::Superseded);
    }
}
