//! Frame cadence
//!
//! Converts frame arrival times into credited time. Each frame is worth the
//! time since the previous frame, capped at one nominal tick, so a 30 Hz
//! detector credits the same wall-clock seconds as a 1 Hz one and a stalled
//! or resumed stream never credits the gap.
//!
//! A frame with no predecessor (session start, face returning after an
//! absence) is worth one frame period: the last gap observed, or the
//! period the cadence was restarted with.

use std::time::{Duration, Instant};

/// Nominal detection tick; also the per-frame credit cap
pub const NOMINAL_TICK: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct FrameCadence {
    last_frame_at: Option<Instant>,
    /// Credit for a frame with no predecessor
    period: Duration,
    max_credit: Duration,
}

impl FrameCadence {
    pub fn new(max_credit: Duration) -> Self {
        Self {
            last_frame_at: None,
            period: max_credit,
            max_credit,
        }
    }

    /// Record a frame at `now` and return how much time it is worth
    pub fn advance(&mut self, now: Instant) -> Duration {
        let credit = match self.last_frame_at {
            Some(previous) => {
                let gap = now.saturating_duration_since(previous).min(self.max_credit);
                if !gap.is_zero() {
                    self.period = gap;
                }
                gap
            }
            None => self.period,
        };
        self.last_frame_at = Some(now);
        credit
    }

    /// Break the frame sequence. The learned period is kept.
    pub fn reset(&mut self) {
        self.last_frame_at = None;
    }

    /// Start over with `period` as the expected frame spacing
    pub fn restart(&mut self, period: Duration) {
        self.last_frame_at = None;
        self.period = period.min(self.max_credit);
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for FrameCadence {
    fn default() -> Self {
        Self::new(NOMINAL_TICK)
    }
}
