//! Warning Escalation
//!
//! Tracks how long the user has been violating, maps that duration to a
//! severity tier, rate-limits spoken warnings and detects recoveries worth
//! a reward.

mod manager;
mod severity;

pub use manager::{
    EscalationConfig, EscalationEngine, EscalationOutcome, Recovery, ViolationState, Warning,
};
pub use severity::{warning_message, SeverityTier, VoiceProfile, RECOVERY_MESSAGE};
