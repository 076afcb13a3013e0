//! Notification events and sinks
//!
//! Sinks are called synchronously from the session and must not block.
//! A failing sink is logged and otherwise ignored.

use alerting::{SeverityTier, VoiceProfile};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Event published by the session, tagged by `kind`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    DistanceWarning {
        severity_tier: SeverityTier,
        message: String,
        voice: VoiceProfile,
    },
    #[serde(rename_all = "camelCase")]
    PostureWarning {
        severity_tier: SeverityTier,
        message: String,
        voice: VoiceProfile,
    },
    #[serde(rename_all = "camelCase")]
    ViolationRecovered {
        bonus_points: u32,
        message: String,
        voice: Option<VoiceProfile>,
    },
    StreakCelebration { minutes: u64 },
    StreakBonus { points: u32 },
    SessionAutoTerminated {},
    #[serde(rename_all = "camelCase")]
    AbsenceStarted { timeout_secs: u64 },
    #[serde(rename_all = "camelCase")]
    AbsenceTick { away_secs: u64, remaining_secs: u64 },
    #[serde(rename_all = "camelCase")]
    PresenceRestored { away_secs: u64 },
}

impl Notification {
    /// Stable kind tag
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::DistanceWarning { .. } => "distance-warning",
            Notification::PostureWarning { .. } => "posture-warning",
            Notification::ViolationRecovered { .. } => "violation-recovered",
            Notification::StreakCelebration { .. } => "streak-celebration",
            Notification::StreakBonus { .. } => "streak-bonus",
            Notification::SessionAutoTerminated {} => "session-auto-terminated",
            Notification::AbsenceStarted { .. } => "absence-started",
            Notification::AbsenceTick { .. } => "absence-tick",
            Notification::PresenceRestored { .. } => "presence-restored",
        }
    }
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("notification receiver is gone")]
    Disconnected,

    #[error("sink failure: {0}")]
    Sink(String),
}

/// Receiver of session notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Logs every notification
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(kind = notification.kind(), "notification: {:?}", notification);
        Ok(())
    }
}

/// Forwards notifications to an async consumer
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.tx
            .send(notification.clone())
            .map_err(|_| NotifyError::Disconnected)
    }
}

/// A notification with its publication time
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggedNotification {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub notification: Notification,
}

/// Bounded in-memory log of recent notifications
pub struct NotificationLog {
    entries: Mutex<VecDeque<LoggedNotification>>,
    capacity: usize,
}

impl NotificationLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Newest first, at most `limit`
    pub fn recent(&self, limit: usize) -> Vec<LoggedNotification> {
        self.entries
            .lock()
            .map(|entries| entries.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl NotificationSink for NotificationLog {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| NotifyError::Sink("notification log lock poisoned".into()))?;
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LoggedNotification {
            at: Utc::now(),
            notification: notification.clone(),
        });
        Ok(())
    }
}

/// Delivers to every inner sink; one failure does not stop the rest
pub struct Fanout {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl Fanout {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for Fanout {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let mut last_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.notify(notification) {
                warn!(kind = notification.kind(), "Notification sink failed: {}", e);
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}
