use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::file_store::write_atomic;
use crate::error::{CacheError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarkerFile {
    hydrated_at: DateTime<Utc>,
}

/// Timestamp of the last successful hydration.
///
/// Absent means "never hydrated", which every freshness check treats as
/// infinitely stale. The file-backed variant survives restarts; the
/// in-memory one is for tests.
pub struct FreshnessMarker {
    path: Option<PathBuf>,
    hydrated_at: RwLock<Option<DateTime<Utc>>>,
}

impl FreshnessMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            hydrated_at: RwLock::new(None),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            hydrated_at: RwLock::new(None),
        }
    }

    /// Read the persisted timestamp, if any. An unreadable marker is
    /// treated as absent, which only costs one extra hydration.
    pub async fn load(&self) -> Result<()> {
        let Some(ref path) = self.path else {
            return Ok(());
        };
        if !fs::try_exists(path).await.unwrap_or(false) {
            return Ok(());
        }
        let loaded = match fs::read_to_string(path).await {
            Ok(contents) => match serde_json::from_str::<MarkerFile>(&contents) {
                Ok(marker) => Some(marker.hydrated_at),
                Err(e) => {
                    warn!(path = ?path, error = %e, "Failed to parse freshness marker");
                    None
                }
            },
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to read freshness marker");
                None
            }
        };
        debug!(hydrated_at = ?loaded, "Freshness marker loaded");
        *self.hydrated_at.write().await = loaded;
        Ok(())
    }

    pub async fn get(&self) -> Option<DateTime<Utc>> {
        *self.hydrated_at.read().await
    }

    pub async fn set(&self, at: DateTime<Utc>) -> Result<()> {
        if let Some(ref path) = self.path {
            let contents = serde_json::to_vec_pretty(&MarkerFile { hydrated_at: at })
                .map_err(|e| CacheError::StoreWrite(e.to_string()))?;
            write_atomic(path, &path.with_extension("json.tmp"), &contents)
                .await
                .map_err(|e| CacheError::StoreWrite(format!("{}: {}", path.display(), e)))?;
        }
        *self.hydrated_at.write().await = Some(at);
        Ok(())
    }

    pub async fn mark_now(&self) -> Result<()> {
        self.set(Utc::now()).await
    }

    pub async fn age_minutes(&self) -> Option<i64> {
        self.get().await.map(|at| (Utc::now() - at).num_minutes())
    }

    /// Fresh iff a timestamp exists and is younger than `ttl`.
    pub async fn is_fresh(&self, ttl: Duration) -> bool {
        match self.get().await {
            Some(at) => Utc::now() - at < ttl,
            None => false,
        }
    }

    /// "just now", "5m ago", "2h ago", "3d ago", or "never".
    pub async fn age_display(&self) -> String {
        match self.age_minutes().await {
            Some(minutes) => format_age(minutes),
            None => "never".to_string(),
        }
    }
}

/// Human-readable age with half-unit rounding.
pub fn format_age(minutes: i64) -> String {
    if minutes < 1 {
        // Negative ages are clock skew
        "just now".to_string()
    } else if minutes < 60 {
        format!("{}m ago", minutes)
    } else if minutes < 1440 {
        let hours = minutes / 60;
        let remaining_mins = minutes % 60;
        if remaining_mins >= 30 {
            format!("{}h ago", hours + 1)
        } else {
            format!("{}h ago", hours)
        }
    } else {
        let days = minutes / 1440;
        let remaining_hours = (minutes % 1440) / 60;
        if remaining_hours >= 12 {
            format!("{}d ago", days + 1)
        } else {
            format!("{}d ago", days)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
