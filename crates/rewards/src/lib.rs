//! Rewards
//!
//! The persisted ledger (points, ideal-distance time, current streak) and
//! the engine that credits it from clean frames.

mod engine;
mod ledger;

pub use engine::{RewardEngine, RewardOutcome, RewardRules};
pub use ledger::{RewardLedger, LEDGER_KEY};

use storage::StorageError;
use thiserror::Error;

/// Reward error types
#[derive(Error, Debug)]
pub enum RewardError {
    #[error("Failed to persist reward ledger: {0}")]
    Persistence(#[from] StorageError),
}
