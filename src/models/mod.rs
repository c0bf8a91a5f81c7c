//! Data models for guest-directory entities.
//!
//! - `RemoteGuest`, `GuestPage`: wire shapes of the remote directory
//! - `GuestSummary`: the cached entity with its derived search key

pub mod guest;

pub use guest::{normalize_key, GuestPage, GuestSummary, RemoteGuest};
