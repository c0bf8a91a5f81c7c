use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::query::{search_local, search_remote, SearchMode};
use crate::api::GuestDirectory;
use crate::cache::KeyValueStore;
use crate::error::{CacheError, Result};
use crate::models::GuestSummary;

/// Substring search over whatever snapshot the store currently holds.
pub struct LocalSearch {
    store: Arc<dyn KeyValueStore<GuestSummary>>,
    limit: usize,
}

impl LocalSearch {
    pub fn new(store: Arc<dyn KeyValueStore<GuestSummary>>, limit: usize) -> Self {
        Self { store, limit }
    }

    pub async fn search(&self, query: &str) -> Result<Vec<GuestSummary>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.store.snapshot().await?;
        Ok(search_local(query, snapshot.iter(), self.limit))
    }
}

/// Directory search, falling back to the local snapshot when the request
/// fails for any reason other than cancellation.
pub struct RemoteSearch {
    directory: Arc<dyn GuestDirectory>,
    fallback: LocalSearch,
}

impl RemoteSearch {
    pub fn new(directory: Arc<dyn GuestDirectory>, fallback: LocalSearch) -> Self {
        Self { directory, fallback }
    }

    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<GuestSummary>>> {
        let error = match search_remote(self.directory.as_ref(), query, cancel, self.fallback.limit).await {
            Ok(results) => return Ok(results),
            Err(e) => e,
        };

        if cancel.is_cancelled() {
            debug!(query, "Remote search failed after cancellation, dropping");
            return Ok(None);
        }

        // Store errors surface as-is; only an empty snapshot maps to RemoteSearchFailed.
        let snapshot = self.fallback.store.snapshot().await.map_err(|store_error| {
            warn!(query, error = %error, store_error = %store_error, "Remote search failed and local cache is unavailable");
            store_error
        })?;
        if snapshot.is_empty() {
            warn!(query, error = %error, "Remote search failed and local cache is empty");
            return Err(CacheError::RemoteSearchFailed(error));
        }

        warn!(query, error = %error, "Remote search failed, answering from local cache");
        Ok(Some(search_local(query, snapshot.iter(), self.fallback.limit)))
    }
}

/// The query strategy chosen once per session.
pub enum SearchStrategy {
    Local(LocalSearch),
    Remote(RemoteSearch),
}

impl SearchStrategy {
    pub fn for_mode(
        mode: SearchMode,
        store: Arc<dyn KeyValueStore<GuestSummary>>,
        directory: Arc<dyn GuestDirectory>,
        limit: usize,
    ) -> Self {
        let local = LocalSearch::new(store, limit);
        match mode {
            SearchMode::Local => SearchStrategy::Local(local),
            SearchMode::Remote => SearchStrategy::Remote(RemoteSearch::new(directory, local)),
        }
    }

    pub fn mode(&self) -> SearchMode {
        match self {
            SearchStrategy::Local(_) => SearchMode::Local,
            SearchStrategy::Remote(_) => SearchMode::Remote,
        }
    }

    /// Run `query` through the active strategy. `Ok(None)` means cancelled.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<GuestSummary>>> {
        match self {
            SearchStrategy::Local(local) => {
                let results = local.search(query).await?;
                if cancel.is_cancelled() {
                    return Ok(None);
                }
                Ok(Some(results))
            }
            SearchStrategy::Remote(remote) => remote.search(query, cancel).await,
        }
    }
}
