//! Local caching module for the guest directory.
//!
//! This module provides the persistent guest store, the freshness marker
//! that gates re-hydration, and the `Hydrator` that full-syncs the remote
//! directory into the store. The store is a read-mostly mirror; the server
//! stays canonical.

pub mod file_store;
pub mod freshness;
pub mod hydrator;
pub mod store;

pub use file_store::{FileStore, SCHEMA_VERSION};
pub use freshness::FreshnessMarker;
pub use hydrator::{HydrationSettings, Hydrator};
pub use store::{KeyValueStore, MemoryStore, Record, Snapshot};
