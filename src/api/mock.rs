//! Scripted [`GuestDirectory`] double shared by the crate's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiError, GuestDirectory};
use crate::models::{GuestPage, RemoteGuest};

#[derive(Default)]
pub(crate) struct MockDirectory {
    pages: Vec<Vec<RemoteGuest>>,
    fail_on_page: AtomicU32,
    search_results: HashMap<String, Vec<RemoteGuest>>,
    search_delays: HashMap<String, Duration>,
    search_fails: AtomicBool,
    page_calls: AtomicUsize,
    search_queries: Mutex<Vec<String>>,
}

impl MockDirectory {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_pages(mut self, pages: Vec<Vec<RemoteGuest>>) -> Self {
        self.pages = pages;
        self
    }

    pub(crate) fn with_search(mut self, query: &str, results: Vec<RemoteGuest>) -> Self {
        self.search_results.insert(query.to_string(), results);
        self
    }

    pub(crate) fn with_search_delay(mut self, query: &str, delay: Duration) -> Self {
        self.search_delays.insert(query.to_string(), delay);
        self
    }

    pub(crate) fn failing_search(self) -> Self {
        self.search_fails.store(true, Ordering::SeqCst);
        self
    }

    /// Make every fetch of `page` fail; 0 clears the failure.
    pub(crate) fn set_fail_on_page(&self, page: u32) {
        self.fail_on_page.store(page, Ordering::SeqCst);
    }

    pub(crate) fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn search_queries(&self) -> Vec<String> {
        self.search_queries.lock().expect("mock lock").clone()
    }
}

#[async_trait]
impl GuestDirectory for MockDirectory {
    async fn fetch_page(&self, page: u32, _page_size: u32) -> Result<GuestPage, ApiError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_page.load(Ordering::SeqCst) == page {
            return Err(ApiError::ServerError(format!("page {} unavailable", page)));
        }
        let items = self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default();
        Ok(GuestPage {
            items,
            total: Some(self.pages.iter().map(Vec::len).sum::<usize>() as u64),
        })
    }

    async fn search(&self, query: &str) -> Result<Vec<RemoteGuest>, ApiError> {
        self.search_queries
            .lock()
            .expect("mock lock")
            .push(query.to_string());
        if let Some(delay) = self.search_delays.get(query) {
            tokio::time::sleep(*delay).await;
        }
        if self.search_fails.load(Ordering::SeqCst) {
            return Err(ApiError::ServerError("search backend down".to_string()));
        }
        Ok(self.search_results.get(query).cloned().unwrap_or_default())
    }
}

pub(crate) fn remote(id: &str, name: &str, phone: Option<&str>) -> RemoteGuest {
    RemoteGuest {
        id: id.to_string(),
        name: Some(name.to_string()),
        phone: phone.map(str::to_string),
        email: None,
    }
}

/// `count` generated guests with ids `{prefix}-{n}`.
pub(crate) fn generated(prefix: &str, count: usize) -> Vec<RemoteGuest> {
    (0..count)
        .map(|n| remote(&format!("{}-{:04}", prefix, n), &format!("Guest {} {}", prefix, n), None))
        .collect()
}
