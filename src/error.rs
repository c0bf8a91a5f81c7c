use thiserror::Error;

use crate::api::ApiError;

/// Errors surfaced by the guest cache and search layer.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The persistent store could not be opened. Fatal to cache features.
    #[error("Guest store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Guest store used before init()")]
    NotInitialized,

    /// A durable write failed; the previous snapshot is still in place.
    #[error("Guest store write failed: {0}")]
    StoreWrite(String),

    /// A page fetch failed mid-sync. Retryable.
    #[error("Hydration failed on page {page}: {source}")]
    HydrationFailed {
        page: u32,
        #[source]
        source: ApiError,
    },

    #[error("Hydration stopped after {0} full pages without reaching end of data")]
    PageLimitExceeded(u32),

    /// Remote search failed and no local snapshot was available to fall back on.
    #[error("Remote search failed: {0}")]
    RemoteSearchFailed(#[source] ApiError),
}

impl CacheError {
    /// Whether the caller may simply try again later.
    pub fn is_transient(&self) -> bool {
        match self {
            CacheError::HydrationFailed { .. } | CacheError::StoreWrite(_) => true,
            CacheError::RemoteSearchFailed(e) => e.is_transient(),
            CacheError::StoreUnavailable(_)
            | CacheError::NotInitialized
            | CacheError::PageLimitExceeded(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
