//! Presence state machine

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Continuous absence before the session ends itself
    pub away_timeout: Duration,
    /// Period of the away-duration tick
    pub tick_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            away_timeout: Duration::from_secs(5 * 60),
            tick_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceState {
    Present,
    AbsentTiming { face_left_at: Instant },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Absence deadline reached
    Deadline,
    /// Away-duration display tick
    Tick,
}

/// Message sent by a timer task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub epoch: u64,
    pub kind: TimerKind,
}

/// Result of observing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceChange {
    Unchanged,
    /// Face just left; absence timers started
    Left { timeout: Duration },
    /// Face came back before the deadline
    Returned { away: Duration },
}

/// Result of a timer event that is still current
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceSignal {
    Tick { away: Duration, remaining: Duration },
    /// Absence lasted the full timeout; the tracker has already reset
    TimedOut { away: Duration },
}

/// Presence tracker owning the absence timers
pub struct PresenceTracker {
    config: PresenceConfig,
    state: PresenceState,
    epoch: u64,
    events: mpsc::UnboundedSender<TimerEvent>,
    timers: Vec<JoinHandle<()>>,
}

impl PresenceTracker {
    /// Timer events are delivered on `events`; whoever owns the receiver
    /// feeds them back through [`PresenceTracker::handle`].
    pub fn new(config: PresenceConfig, events: mpsc::UnboundedSender<TimerEvent>) -> Self {
        Self {
            config,
            state: PresenceState::Present,
            epoch: 0,
            events,
            timers: Vec::new(),
        }
    }

    /// Observe one frame's presence. Must run inside a Tokio runtime.
    pub fn observe(&mut self, present: bool, now: Instant) -> PresenceChange {
        match (self.state, present) {
            (PresenceState::Present, true) => PresenceChange::Unchanged,
            // Already timing: never schedule a second set of timers
            (PresenceState::AbsentTiming { .. }, false) => PresenceChange::Unchanged,
            (PresenceState::Present, false) => {
                self.clear_timers();
                self.state = PresenceState::AbsentTiming { face_left_at: now };
                self.schedule(now);
                info!(
                    timeout_secs = self.config.away_timeout.as_secs(),
                    "face left frame, absence timer started"
                );
                PresenceChange::Left {
                    timeout: self.config.away_timeout,
                }
            }
            (PresenceState::AbsentTiming { face_left_at }, true) => {
                self.clear_timers();
                self.state = PresenceState::Present;
                let away = now.saturating_duration_since(face_left_at);
                info!(away_secs = away.as_secs(), "face returned");
                PresenceChange::Returned { away }
            }
        }
    }

    /// Interpret a timer event. Stale events (older epoch, or arriving
    /// after the face returned) yield `None`.
    pub fn handle(&mut self, event: TimerEvent, now: Instant) -> Option<PresenceSignal> {
        if event.epoch != self.epoch {
            debug!(event_epoch = event.epoch, epoch = self.epoch, "stale timer event");
            return None;
        }
        let PresenceState::AbsentTiming { face_left_at } = self.state else {
            return None;
        };
        let away = now.saturating_duration_since(face_left_at);

        match event.kind {
            TimerKind::Tick => Some(PresenceSignal::Tick {
                away,
                remaining: self.config.away_timeout.saturating_sub(away),
            }),
            TimerKind::Deadline => {
                warn!(away_secs = away.as_secs(), "absence timeout reached");
                self.reset();
                Some(PresenceSignal::TimedOut { away })
            }
        }
    }

    fn schedule(&mut self, now: Instant) {
        let epoch = self.epoch;

        let deadline = now + self.config.away_timeout;
        let tx = self.events.clone();
        self.timers.push(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = tx.send(TimerEvent {
                epoch,
                kind: TimerKind::Deadline,
            });
        }));

        let period = self.config.tick_interval;
        let tx = self.events.clone();
        self.timers.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(now + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if tx
                    .send(TimerEvent {
                        epoch,
                        kind: TimerKind::Tick,
                    })
                    .is_err()
                {
                    break;
                }
            }
        }));
    }

    /// Cancel every timer and invalidate events already in flight.
    pub fn clear_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
        self.epoch += 1;
    }

    /// Cancel timers and forget any absence
    pub fn reset(&mut self) {
        self.clear_timers();
        self.state = PresenceState::Present;
    }

    pub fn set_away_timeout(&mut self, timeout: Duration) {
        self.config.away_timeout = timeout;
    }

    pub fn config(&self) -> &PresenceConfig {
        &self.config
    }

    pub fn state(&self) -> PresenceState {
        self.state
    }

    pub fn face_left_at(&self) -> Option<Instant> {
        match self.state {
            PresenceState::AbsentTiming { face_left_at } => Some(face_left_at),
            PresenceState::Present => None,
        }
    }

    /// When the running absence will end the session
    pub fn deadline(&self) -> Option<Instant> {
        self.face_left_at().map(|t| t + self.config.away_timeout)
    }

    pub fn is_paused_for_absence(&self) -> bool {
        matches!(self.state, PresenceState::AbsentTiming { .. })
    }

    /// Timers scheduled and not yet finished
    pub fn live_timers(&self) -> usize {
        self.timers.iter().filter(|t| !t.is_finished()).count()
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}
