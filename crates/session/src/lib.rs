//! Monitoring Session
//!
//! Owns one monitoring session at a time. Each detection result runs
//! through the classifier and then the presence tracker, the escalation
//! engine and the reward engine; their outcomes become notifications,
//! session statistics and violation records.
//!
//! [`SessionController`] is the synchronous core. [`SessionRunner`] drives
//! it from the detector stream, the presence timers and a command queue;
//! [`SessionHandle`] is the cloneable front used by everything else.

pub mod controller;
pub mod device;
pub mod history;
pub mod notification;
pub mod runner;
pub mod snapshot;
pub mod stats;

pub use controller::{
    Collaborators, FrameOutcome, SessionConfig, SessionController, SessionSnapshot, SessionState,
    SessionStatus, StartOutcome,
};
pub use device::{CameraDevice, ChannelDevice, DeviceError, ReplayDevice};
pub use history::{SessionOutcome, SessionSummary, HISTORY_KEY, MAX_HISTORY};
pub use notification::{
    ChannelSink, Fanout, LoggedNotification, Notification, NotificationLog, NotificationSink,
    NotifyError, TracingSink,
};
pub use runner::{SessionHandle, SessionRunner, Started};
pub use snapshot::{
    encode_jpeg, LatestFrame, NoSnapshots, SnapshotError, SnapshotProvider, SNAPSHOT_JPEG_QUALITY,
};
pub use stats::{SessionStats, ViolationRecord, RECORD_CAPACITY};

use posture::MeasurementError;
use rewards::RewardError;
use settings::SettingsError;
use thiserror::Error;

/// Session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(#[from] DeviceError),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Invalid measurement: {0}")]
    InvalidMeasurement(#[from] MeasurementError),

    #[error("No session is running")]
    NotRunning,

    #[error("Calibration failed: {0}")]
    Calibration(String),

    #[error("Session runner has shut down")]
    Closed,
}

impl From<SettingsError> for SessionError {
    fn from(err: SettingsError) -> Self {
        match err {
            SettingsError::Persistence(e) => SessionError::PersistenceFailure(e.to_string()),
            SettingsError::Calibration(msg) => SessionError::Calibration(msg),
        }
    }
}

impl From<RewardError> for SessionError {
    fn from(err: RewardError) -> Self {
        SessionError::PersistenceFailure(err.to_string())
    }
}

impl From<storage::StorageError> for SessionError {
    fn from(err: storage::StorageError) -> Self {
        SessionError::PersistenceFailure(err.to_string())
    }
}
