//! REST client module for the remote guest directory.
//!
//! The directory is consumed only through two endpoints: a paginated list
//! used by hydration, and a free-text search used by the remote query
//! strategy. Both sit behind the [`GuestDirectory`] trait so the cache layer
//! never depends on HTTP directly.

pub mod client;
pub mod directory;
pub mod error;
#[cfg(test)]
pub(crate) mod mock;

pub use client::ApiClient;
pub use directory::GuestDirectory;
pub use error::ApiError;
