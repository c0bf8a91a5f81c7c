use std::sync::Arc;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{FreshnessMarker, KeyValueStore};
use crate::api::GuestDirectory;
use crate::error::{CacheError, Result};
use crate::models::GuestSummary;

/// Tuning for a hydration run.
#[derive(Debug, Clone, Copy)]
pub struct HydrationSettings {
    pub page_size: u32,
    pub ttl: Duration,
    /// Ceiling on full pages fetched in one run.
    pub max_pages: u32,
}

/// Full-syncs the remote directory into the local store.
pub struct Hydrator {
    directory: Arc<dyn GuestDirectory>,
    store: Arc<dyn KeyValueStore<GuestSummary>>,
    marker: Arc<FreshnessMarker>,
    settings: HydrationSettings,
    // Held for the whole run; hydration never overlaps itself.
    running: Mutex<()>,
}

impl Hydrator {
    pub fn new(
        directory: Arc<dyn GuestDirectory>,
        store: Arc<dyn KeyValueStore<GuestSummary>>,
        marker: Arc<FreshnessMarker>,
        settings: HydrationSettings,
    ) -> Self {
        Self {
            directory,
            store,
            marker,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Refresh the store from the directory.
    ///
    /// Returns `0` without any network traffic when `force` is false, the
    /// store is non-empty and the last hydration is younger than the TTL.
    /// Otherwise fetches every page, replaces the store contents in one
    /// write, stamps the freshness marker and returns the record count.
    ///
    /// On a failed page the store and marker are left untouched.
    pub async fn hydrate(&self, force: bool) -> Result<usize> {
        let _running = self.running.lock().await;

        if !force && !self.store.is_empty().await? && self.marker.is_fresh(self.settings.ttl).await {
            debug!("Guest cache is fresh, skipping hydration");
            return Ok(0);
        }

        info!(force, page_size = self.settings.page_size, "Hydrating guest cache");
        let guests = self.fetch_all().await?;

        self.store.replace_all(guests).await?;
        self.marker.mark_now().await?;

        let count = self.store.len().await?;
        info!(count, "Guest cache hydrated");
        Ok(count)
    }

    async fn fetch_all(&self) -> Result<Vec<GuestSummary>> {
        let page_size = self.settings.page_size;
        let mut guests = Vec::new();
        let mut page = 1;

        loop {
            if page > self.settings.max_pages {
                warn!(max_pages = self.settings.max_pages, "Directory never returned a short page");
                return Err(CacheError::PageLimitExceeded(self.settings.max_pages));
            }

            let response = self
                .directory
                .fetch_page(page, page_size)
                .await
                .map_err(|source| {
                    warn!(page, error = %source, "Guest page fetch failed, keeping previous snapshot");
                    CacheError::HydrationFailed { page, source }
                })?;

            let received = response.items.len();
            debug!(page, received, total = ?response.total, "Guest page received");
            guests.extend(response.items.into_iter().map(|g| g.into_summary()));

            if received < page_size as usize {
                break;
            }
            page += 1;
        }

        Ok(guests)
    }
}
