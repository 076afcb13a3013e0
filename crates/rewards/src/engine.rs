//! Reward Accrual Engine

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storage::KeyValueStore;
use tracing::{debug, info, warn};

use crate::{RewardError, RewardLedger, LEDGER_KEY};

/// Milestones and point values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardRules {
    /// Celebrate every time the streak reaches a multiple of this
    pub celebration_every_secs: u64,
    /// Award a bonus every time total ideal time reaches a multiple of this
    pub bonus_every_secs: u64,
    pub bonus_points: u32,
}

impl Default for RewardRules {
    fn default() -> Self {
        Self {
            celebration_every_secs: 60,
            bonus_every_secs: 1800,
            bonus_points: 10,
        }
    }
}

/// What one frame did to the ledger
#[derive(Debug, Default)]
pub struct RewardOutcome {
    pub streak_broken: bool,
    /// Whole seconds credited by this frame
    pub credited_secs: u64,
    /// Streak minutes reached, when a celebration milestone was crossed
    pub celebration_minutes: Option<u64>,
    /// Points awarded for a total-time milestone
    pub bonus_points: Option<u32>,
    /// In-memory state is kept even when saving fails
    pub save_error: Option<RewardError>,
}

impl RewardOutcome {
    pub fn mutated(&self) -> bool {
        self.streak_broken || self.credited_secs > 0
    }
}

/// Credits ideal-distance time and hands out milestone rewards.
///
/// Time arrives as per-frame credit; only whole seconds reach the ledger,
/// the remainder carries over to the next frame.
pub struct RewardEngine {
    ledger: RewardLedger,
    rules: RewardRules,
    store: Option<Arc<dyn KeyValueStore>>,
    pending: Duration,
}

impl RewardEngine {
    /// Load the ledger from `store`; unreadable documents start from zero.
    pub fn load(store: Arc<dyn KeyValueStore>, rules: RewardRules) -> Self {
        let ledger = match storage::load_document::<RewardLedger>(store.as_ref(), LEDGER_KEY) {
            Ok(Some(ledger)) => {
                info!(?ledger, "loaded reward ledger");
                ledger
            }
            Ok(None) => RewardLedger::default(),
            Err(e) => {
                warn!("Failed to load reward ledger, starting fresh: {}", e);
                RewardLedger::default()
            }
        };
        Self {
            ledger,
            rules,
            store: Some(store),
            pending: Duration::ZERO,
        }
    }

    /// Engine without persistence
    pub fn in_memory(ledger: RewardLedger, rules: RewardRules) -> Self {
        Self {
            ledger,
            rules,
            store: None,
            pending: Duration::ZERO,
        }
    }

    /// Feed one frame. A violation resets the streak and wins over any
    /// ideal-distance credit in the same frame. Any frame that earns no
    /// credit drops the carried fraction.
    pub fn on_frame(
        &mut self,
        at_ideal: bool,
        is_violating: bool,
        enabled: bool,
        elapsed: Duration,
    ) -> RewardOutcome {
        let mut outcome = RewardOutcome::default();

        if is_violating {
            self.pending = Duration::ZERO;
            if self.ledger.current_streak_seconds > 0 {
                debug!(streak = self.ledger.current_streak_seconds, "streak broken");
                self.ledger.current_streak_seconds = 0;
                outcome.streak_broken = true;
            }
        } else if at_ideal && enabled {
            self.pending += elapsed;
            let whole = self.pending.as_secs();
            self.pending -= Duration::from_secs(whole);

            for _ in 0..whole {
                self.ledger.total_ideal_seconds += 1;
                self.ledger.current_streak_seconds += 1;
                outcome.credited_secs += 1;

                let streak = self.ledger.current_streak_seconds;
                if streak % self.rules.celebration_every_secs == 0 {
                    info!(minutes = streak / 60, "streak milestone");
                    outcome.celebration_minutes = Some(streak / 60);
                }

                let total = self.ledger.total_ideal_seconds;
                if total % self.rules.bonus_every_secs == 0 {
                    self.ledger.total_points += u64::from(self.rules.bonus_points);
                    info!(total_ideal_secs = total, points = self.rules.bonus_points, "ideal time bonus");
                    *outcome.bonus_points.get_or_insert(0) += self.rules.bonus_points;
                }
            }
        } else {
            // Fractions only carry across consecutive ideal frames
            self.pending = Duration::ZERO;
        }

        if outcome.mutated() {
            outcome.save_error = self.persist().err();
        }
        outcome
    }

    /// Add points outside of time accrual (recovery praise).
    pub fn award(&mut self, points: u32) -> Result<(), RewardError> {
        self.ledger.total_points += u64::from(points);
        debug!(points, total = self.ledger.total_points, "points awarded");
        self.persist()
    }

    /// Drop carried-over fractions (new session)
    pub fn reset_pending(&mut self) {
        self.pending = Duration::ZERO;
    }

    pub fn ledger(&self) -> &RewardLedger {
        &self.ledger
    }

    pub fn rules(&self) -> &RewardRules {
        &self.rules
    }

    fn persist(&self) -> Result<(), RewardError> {
        if let Some(store) = &self.store {
            storage::save_document(store.as_ref(), LEDGER_KEY, &self.ledger).map_err(|e| {
                warn!("Failed to save reward ledger: {}", e);
                RewardError::from(e)
            })?;
        }
        Ok(())
    }
}
