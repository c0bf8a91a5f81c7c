use async_trait::async_trait;

use super::ApiError;
use crate::models::{GuestPage, RemoteGuest};

/// The remote guest directory's list/search contract.
#[async_trait]
pub trait GuestDirectory: Send + Sync {
    /// Fetch one page of the full directory. `page` is 1-based.
    async fn fetch_page(&self, page: u32, page_size: u32) -> Result<GuestPage, ApiError>;

    /// Free-text search. Unpaginated.
    async fn search(&self, query: &str) -> Result<Vec<RemoteGuest>, ApiError>;
}
