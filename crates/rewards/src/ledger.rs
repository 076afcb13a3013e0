//! Reward ledger record

use serde::{Deserialize, Serialize};

/// Storage key of the ledger document
pub const LEDGER_KEY: &str = "visiondist_rewards";

/// Cumulative rewards, persisted across sessions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RewardLedger {
    /// Never decreases
    pub total_points: u64,

    /// Seconds spent at ideal distance, never decreases
    #[serde(alias = "totalIdealTime")]
    pub total_ideal_seconds: u64,

    /// Seconds at ideal distance since the last violation
    #[serde(alias = "currentStreak")]
    pub current_streak_seconds: u64,
}

impl RewardLedger {
    pub fn streak_minutes(&self) -> u64 {
        self.current_streak_seconds / 60
    }
}
