//! Finished-session history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storage::{KeyValueStore, StorageError};
use uuid::Uuid;

use crate::stats::SessionStats;

/// Storage key of the history list
pub const HISTORY_KEY: &str = "visiondist_history";

/// Summaries kept, oldest dropped first
pub const MAX_HISTORY: usize = 50;

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionOutcome {
    /// Explicit stop
    Stopped,
    /// Absence timeout
    AutoTerminated,
    /// Detector stream ended
    SourceEnded,
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionOutcome::Stopped => "stopped",
            SessionOutcome::AutoTerminated => "auto-terminated",
            SessionOutcome::SourceEnded => "source-ended",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: SessionOutcome,
    pub stats: SessionStats,
    pub points_earned: u64,
}

impl SessionSummary {
    pub fn duration_secs(&self) -> i64 {
        (self.ended_at - self.started_at).num_seconds()
    }
}

/// Append a summary, returning the resulting history length
pub fn append_summary(
    store: &dyn KeyValueStore,
    summary: &SessionSummary,
) -> Result<usize, StorageError> {
    let item = serde_json::to_value(summary)?;
    store.append(HISTORY_KEY, item, Some(MAX_HISTORY))
}

/// Oldest first
pub fn load_history(store: &dyn KeyValueStore) -> Result<Vec<SessionSummary>, StorageError> {
    Ok(storage::load_document(store, HISTORY_KEY)?.unwrap_or_default())
}
