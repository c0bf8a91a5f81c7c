//! Query layer for guest typeahead.
//!
//! - `query`: the two raw strategies (`search_local`, `search_remote`)
//! - `strategy`: `SearchStrategy`, the variant picked once per session
//! - `orchestrator`: debouncing, cancellation and last-query-wins delivery

pub mod orchestrator;
pub mod query;
pub mod strategy;

pub use orchestrator::{SearchOrchestrator, SearchOutcome, SearchPhase, DEFAULT_DEBOUNCE};
pub use query::{search_local, search_remote, SearchMode, DEFAULT_RESULT_LIMIT};
pub use strategy::{LocalSearch, RemoteSearch, SearchStrategy};
