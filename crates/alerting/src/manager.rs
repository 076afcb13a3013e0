//! Escalation Engine Implementation

use posture::ViolationKind;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::severity::{warning_message, SeverityTier, VoiceProfile, RECOVERY_MESSAGE};

/// Escalation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationConfig {
    /// Violation seconds after which warnings become firm (exclusive)
    pub tier1_after_secs: u64,
    /// Violation seconds after which warnings become stern (exclusive)
    pub tier2_after_secs: u64,
    /// Minimum spacing between any two spoken utterances (milliseconds)
    pub speech_floor_ms: u64,
    /// Violation seconds that must be exceeded for a recovery reward
    pub recovery_min_secs: u64,
    /// Points awarded for a recovery
    pub recovery_bonus_points: u32,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            tier1_after_secs: 5,
            tier2_after_secs: 15,
            speech_floor_ms: 2000,
            recovery_min_secs: 5,
            recovery_bonus_points: 1,
        }
    }
}

/// Contiguous-violation bookkeeping
#[derive(Debug, Clone, Default)]
pub struct ViolationState {
    pub is_violating: bool,
    pub violation_started_at: Option<Instant>,
    /// Credited time since the violation started
    pub duration: Duration,
    pub last_warning_at: Option<Instant>,
}

impl ViolationState {
    pub fn duration_secs(&self) -> u64 {
        self.duration.as_secs()
    }
}

/// A warning that passed the rate limiter
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub kind: ViolationKind,
    pub tier: SeverityTier,
    pub message: &'static str,
    pub voice: VoiceProfile,
}

/// The user fixed a violation that lasted long enough to deserve praise
#[derive(Debug, Clone, PartialEq)]
pub struct Recovery {
    pub bonus_points: u32,
    pub prior_duration_secs: u64,
    pub message: &'static str,
    /// `None` when the speech floor suppressed the spoken praise
    pub voice: Option<VoiceProfile>,
}

/// Result of feeding one frame to the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EscalationOutcome {
    /// Current tier while violating
    pub tier: Option<SeverityTier>,
    pub warning: Option<Warning>,
    pub recovery: Option<Recovery>,
}

/// Escalation engine for violation warnings
pub struct EscalationEngine {
    config: EscalationConfig,
    state: ViolationState,
    last_speech_at: Option<Instant>,
    message_cursor: usize,
    warnings_issued: u64,
}

impl EscalationEngine {
    pub fn new(config: EscalationConfig) -> Self {
        debug!("Creating escalation engine with config: {:?}", config);
        Self {
            config,
            state: ViolationState::default(),
            last_speech_at: None,
            message_cursor: 0,
            warnings_issued: 0,
        }
    }

    /// Feed one frame.
    ///
    /// `violation` is the frame's primary violation, `elapsed` the time the
    /// frame is credited with and `now` the frame time used for rate limits.
    pub fn observe(
        &mut self,
        violation: Option<ViolationKind>,
        elapsed: Duration,
        now: Instant,
        warning_interval: Duration,
        rewards_enabled: bool,
    ) -> EscalationOutcome {
        match violation {
            Some(kind) => self.on_violation(kind, elapsed, now, warning_interval),
            None => EscalationOutcome {
                recovery: self.on_clean(now, rewards_enabled),
                ..Default::default()
            },
        }
    }

    fn on_violation(
        &mut self,
        kind: ViolationKind,
        elapsed: Duration,
        now: Instant,
        warning_interval: Duration,
    ) -> EscalationOutcome {
        if !self.state.is_violating {
            self.state.is_violating = true;
            self.state.violation_started_at = Some(now);
            self.state.duration = Duration::ZERO;
        }
        self.state.duration += elapsed;

        let tier = self.tier();
        let warning = if self.may_warn(now, warning_interval) {
            self.state.last_warning_at = Some(now);
            self.last_speech_at = Some(now);
            self.warnings_issued += 1;

            let message = warning_message(kind, tier, self.message_cursor);
            self.message_cursor = self.message_cursor.wrapping_add(1);
            info!(
                kind = kind.as_str(),
                tier = tier.as_u8(),
                duration_secs = self.state.duration_secs(),
                "violation warning"
            );
            Some(Warning {
                kind,
                tier,
                message,
                voice: tier.voice(),
            })
        } else {
            None
        };

        EscalationOutcome {
            tier: Some(tier),
            warning,
            recovery: None,
        }
    }

    fn on_clean(&mut self, now: Instant, rewards_enabled: bool) -> Option<Recovery> {
        if !self.state.is_violating {
            return None;
        }
        let prior = self.state.duration_secs();
        self.clear();

        if prior <= self.config.recovery_min_secs || !rewards_enabled {
            debug!(prior_secs = prior, "violation ended");
            return None;
        }

        let voice = if self.speech_allowed(now) {
            self.last_speech_at = Some(now);
            Some(VoiceProfile::CHEERFUL)
        } else {
            None
        };
        info!(prior_secs = prior, "recovered from violation");
        Some(Recovery {
            bonus_points: self.config.recovery_bonus_points,
            prior_duration_secs: prior,
            message: RECOVERY_MESSAGE,
            voice,
        })
    }

    fn speech_allowed(&self, now: Instant) -> bool {
        let floor = Duration::from_millis(self.config.speech_floor_ms);
        self.last_speech_at
            .map_or(true, |last| now.saturating_duration_since(last) >= floor)
    }

    fn may_warn(&self, now: Instant, warning_interval: Duration) -> bool {
        let interval_ok = self
            .state
            .last_warning_at
            .map_or(true, |last| now.saturating_duration_since(last) >= warning_interval);
        if !interval_ok {
            debug!("Warning suppressed: inside warning interval");
            return false;
        }
        if !self.speech_allowed(now) {
            debug!("Warning suppressed: speech floor");
            return false;
        }
        true
    }

    /// Current tier, meaningful while violating
    pub fn tier(&self) -> SeverityTier {
        SeverityTier::from_duration_secs(
            self.state.duration_secs(),
            self.config.tier1_after_secs,
            self.config.tier2_after_secs,
        )
    }

    /// Forget the running violation without a recovery (face lost).
    /// Rate limiter timestamps survive.
    pub fn clear(&mut self) {
        self.state.is_violating = false;
        self.state.violation_started_at = None;
        self.state.duration = Duration::ZERO;
    }

    /// Back to a blank slate (new session)
    pub fn reset(&mut self) {
        self.state = ViolationState::default();
        self.last_speech_at = None;
        self.message_cursor = 0;
        self.warnings_issued = 0;
    }

    pub fn state(&self) -> &ViolationState {
        &self.state
    }

    pub fn warnings_issued(&self) -> u64 {
        self.warnings_issued
    }
}

impl Default for EscalationEngine {
    fn default() -> Self {
        Self::new(EscalationConfig::default())
    }
}
