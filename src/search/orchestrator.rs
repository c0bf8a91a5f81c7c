use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::query::SearchMode;
use super::strategy::SearchStrategy;
use crate::error::Result;
use crate::models::GuestSummary;

/// Default quiet period before a keystroke turns into a query.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Where the most recent query session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Debouncing,
    InFlight(SearchMode),
    Delivered(usize),
    Cancelled,
    Failed,
}

/// Result of one keystroke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    Delivered(Vec<GuestSummary>),
    /// A newer keystroke (or `cancel_all`) replaced this one.
    Superseded,
}

/// Sits between raw input and the query strategy.
///
/// Every `submit` starts a new generation and cancels the previous one's
/// token. Only the latest generation may deliver; anything older resolves
/// to `Superseded`, whatever order the responses arrive in.
pub struct SearchOrchestrator {
    strategy: SearchStrategy,
    debounce: Duration,
    generation: AtomicU64,
    in_flight: Mutex<CancellationToken>,
    phase: watch::Sender<SearchPhase>,
}

impl SearchOrchestrator {
    pub fn new(strategy: SearchStrategy, debounce: Duration) -> Self {
        let (phase, _) = watch::channel(SearchPhase::Idle);
        Self {
            strategy,
            debounce,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(CancellationToken::new()),
            phase,
        }
    }

    pub fn mode(&self) -> SearchMode {
        self.strategy.mode()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Watch the phase of the current session.
    pub fn subscribe(&self) -> watch::Receiver<SearchPhase> {
        self.phase.subscribe()
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase.borrow().clone()
    }

    /// Undebounced search through the active strategy, with remote-to-local
    /// fallback. `Ok(None)` means `cancel` fired first.
    pub async fn search(
        &self,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<GuestSummary>>> {
        self.strategy.search(query, cancel).await
    }

    /// Feed one input change. Resolves once this keystroke is either
    /// answered or superseded.
    pub async fn submit(&self, query: &str) -> Result<SearchOutcome> {
        let (generation, token) = self.begin().await;
        self.set_phase(generation, SearchPhase::Debouncing);

        tokio::select! {
            _ = token.cancelled() => {
                debug!(generation, "Keystroke superseded while debouncing");
                return Ok(SearchOutcome::Superseded);
            }
            _ = tokio::time::sleep(self.debounce) => {}
        }

        self.set_phase(generation, SearchPhase::InFlight(self.mode()));
        let result = self.strategy.search(query, &token).await;

        if !self.is_current(generation) {
            debug!(generation, query, "Dropping stale search result");
            return Ok(SearchOutcome::Superseded);
        }

        match result {
            Ok(Some(results)) => {
                self.set_phase(generation, SearchPhase::Delivered(results.len()));
                Ok(SearchOutcome::Delivered(results))
            }
            Ok(None) => Ok(SearchOutcome::Superseded),
            Err(e) => {
                self.set_phase(generation, SearchPhase::Failed);
                Err(e)
            }
        }
    }

    /// Abandon whatever is pending. Nothing submitted before this call will
    /// deliver.
    pub async fn cancel_all(&self) {
        let (generation, token) = self.begin().await;
        token.cancel();
        self.set_phase(generation, SearchPhase::Cancelled);
    }

    async fn begin(&self) -> (u64, CancellationToken) {
        let mut in_flight = self.in_flight.lock().await;
        in_flight.cancel();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *in_flight = CancellationToken::new();
        (generation, in_flight.clone())
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn set_phase(&self, generation: u64, phase: SearchPhase) {
        if self.is_current(generation) {
            self.phase.send_replace(phase);
        }
    }
}
