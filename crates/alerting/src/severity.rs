//! Severity tiers, voice parameters and message pools

use posture::ViolationKind;
use serde::{Deserialize, Serialize};

/// Escalation level derived from contiguous violation time.
/// Serialized as its number (0, 1, 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum SeverityTier {
    /// Friendly nudge
    Playful = 0,
    /// Plain request
    Firm = 1,
    /// Insistent
    Stern = 2,
}

impl SeverityTier {
    /// Tier for a violation that has lasted `secs` seconds
    pub fn from_duration_secs(secs: u64, tier1_after_secs: u64, tier2_after_secs: u64) -> Self {
        if secs > tier2_after_secs {
            SeverityTier::Stern
        } else if secs > tier1_after_secs {
            SeverityTier::Firm
        } else {
            SeverityTier::Playful
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Speech parameters; pitch and rate fall as severity rises
    pub fn voice(self) -> VoiceProfile {
        match self {
            SeverityTier::Playful => VoiceProfile { pitch: 1.4, rate: 1.1 },
            SeverityTier::Firm => VoiceProfile { pitch: 1.0, rate: 1.0 },
            SeverityTier::Stern => VoiceProfile { pitch: 0.8, rate: 0.9 },
        }
    }
}

impl From<SeverityTier> for u8 {
    fn from(tier: SeverityTier) -> Self {
        tier as u8
    }
}

impl TryFrom<u8> for SeverityTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SeverityTier::Playful),
            1 => Ok(SeverityTier::Firm),
            2 => Ok(SeverityTier::Stern),
            other => Err(format!("invalid severity tier {other}")),
        }
    }
}

/// Speech synthesis parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub pitch: f32,
    pub rate: f32,
}

impl VoiceProfile {
    /// Upbeat voice used for praise
    pub const CHEERFUL: VoiceProfile = VoiceProfile { pitch: 1.4, rate: 1.2 };
}

pub const RECOVERY_MESSAGE: &str = "Great job, you fixed it! +1 point!";

const TOO_CLOSE: [[&str; 2]; 3] = [
    ["Hey there, you're a bit too close!", "Whoa, that screen is right in your face!"],
    ["Please move back a little and keep your distance.", "Sit back a bit, your eyes will thank you."],
    ["Move back from the screen now!", "You are far too close. Adjust your distance immediately!"],
];

const BAD_POSTURE: [[&str; 2]; 3] = [
    ["Oops, your head is tilting!", "Looks like someone's leaning sideways!"],
    ["Please sit up straight and level your head.", "Straighten up a little, please."],
    ["Attention! Straighten your head right now!", "Your posture needs fixing immediately!"],
];

/// Pick a message from the pool for `kind` at `tier`. `cursor` rotates
/// through the pool.
pub fn warning_message(kind: ViolationKind, tier: SeverityTier, cursor: usize) -> &'static str {
    let pool = match kind {
        ViolationKind::Distance => &TOO_CLOSE[tier as usize],
        ViolationKind::Posture => &BAD_POSTURE[tier as usize],
    };
    pool[cursor % pool.len()]
}
