//! Detector devices
//!
//! A device hands the session a single-pass stream of detection results
//! when acquired and stops producing when released.

use posture::DetectionResult;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Buffered detections between producer and session
pub const DETECTION_QUEUE_DEPTH: usize = 64;

/// Device errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("device not available: {0}")]
    Unavailable(String),

    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },

    #[error("device is not acquired")]
    NotAcquired,

    #[error("detection queue full, frame dropped")]
    QueueFull,
}

/// Camera plus detection model, seen from the session
pub trait CameraDevice: Send + Sync {
    /// Start producing detections. Must be called inside a Tokio runtime.
    fn acquire(&self) -> Result<mpsc::Receiver<DetectionResult>, DeviceError>;

    /// Stop producing. Safe to call when not acquired.
    fn release(&self);

    /// Expected spacing between detections, when the device knows it
    fn nominal_period(&self) -> Option<Duration> {
        None
    }
}

/// Push-driven device: detections are fed in from outside (HTTP, tests)
#[derive(Default)]
pub struct ChannelDevice {
    sender: Mutex<Option<mpsc::Sender<DetectionResult>>>,
}

impl ChannelDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forward one detection to the running session
    pub fn push(&self, detection: DetectionResult) -> Result<(), DeviceError> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| DeviceError::Unavailable("device lock poisoned".into()))?;
        let sender = guard.as_ref().ok_or(DeviceError::NotAcquired)?;
        sender.try_send(detection).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeviceError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeviceError::NotAcquired,
        })
    }

    pub fn is_acquired(&self) -> bool {
        self.sender
            .lock()
            .map(|guard| guard.as_ref().is_some_and(|tx| !tx.is_closed()))
            .unwrap_or(false)
    }
}

impl CameraDevice for ChannelDevice {
    fn acquire(&self) -> Result<mpsc::Receiver<DetectionResult>, DeviceError> {
        let (tx, rx) = mpsc::channel(DETECTION_QUEUE_DEPTH);
        let mut guard = self
            .sender
            .lock()
            .map_err(|_| DeviceError::Unavailable("device lock poisoned".into()))?;
        *guard = Some(tx);
        debug!("Channel device acquired");
        Ok(rx)
    }

    fn release(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            if guard.take().is_some() {
                debug!("Channel device released");
            }
        }
    }
}

/// Plays back recorded detections from a JSON Lines file
pub struct ReplayDevice {
    path: PathBuf,
    interval: Duration,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayDevice {
    /// `rate_hz` is clamped to at least 0.1 Hz
    pub fn new(path: impl Into<PathBuf>, rate_hz: f64) -> Self {
        let rate_hz = if rate_hz.is_finite() { rate_hz.max(0.1) } else { 1.0 };
        Self {
            path: path.into(),
            interval: Duration::from_secs_f64(1.0 / rate_hz),
            task: Mutex::new(None),
        }
    }

    /// Parse a recording. Lines that do not parse are skipped.
    pub fn parse(contents: &str) -> Vec<DetectionResult> {
        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .filter_map(|(n, line)| match serde_json::from_str(line) {
                Ok(detection) => Some(detection),
                Err(e) => {
                    warn!("Skipping replay line {}: {}", n + 1, e);
                    None
                }
            })
            .collect()
    }
}

impl CameraDevice for ReplayDevice {
    fn acquire(&self) -> Result<mpsc::Receiver<DetectionResult>, DeviceError> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| DeviceError::Io {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        let detections = Self::parse(&contents);
        if detections.is_empty() {
            return Err(DeviceError::Unavailable(format!(
                "{} holds no detections",
                self.path.display()
            )));
        }
        info!(
            path = %self.path.display(),
            frames = detections.len(),
            "Replaying recorded detections"
        );

        let (tx, rx) = mpsc::channel(DETECTION_QUEUE_DEPTH);
        let interval = self.interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            for detection in detections {
                ticker.tick().await;
                if tx.send(detection).await.is_err() {
                    break;
                }
            }
            debug!("Replay finished");
        });

        let mut guard = self
            .task
            .lock()
            .map_err(|_| DeviceError::Unavailable("device lock poisoned".into()))?;
        if let Some(previous) = guard.replace(task) {
            previous.abort();
        }
        Ok(rx)
    }

    fn nominal_period(&self) -> Option<Duration> {
        Some(self.interval)
    }

    fn release(&self) {
        if let Ok(mut guard) = self.task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_device_forwards() {
        let device = ChannelDevice::new();
        assert_eq!(device.push(DetectionResult::absent()), Err(DeviceError::NotAcquired));

        let mut rx = device.acquire().unwrap();
        assert!(device.is_acquired());
        device.push(DetectionResult::present(40.0, 2.0)).unwrap();
        assert_eq!(rx.recv().await, Some(DetectionResult::present(40.0, 2.0)));

        device.release();
        assert!(!device.is_acquired());
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_replay_parse_skips_garbage() {
        let contents = r#"{"presence": true, "distanceCm": 60, "tiltDeg": 0}
not json

{"presence": false}
"#;
        let parsed = ReplayDevice::parse(contents);
        assert_eq!(parsed, vec![DetectionResult::present(60.0, 0.0), DetectionResult::absent()]);
    }

    #[test]
    fn test_nominal_period() {
        let replay = ReplayDevice::new("/nonexistent/visiondist/replay.jsonl", 4.0);
        assert_eq!(replay.nominal_period(), Some(Duration::from_millis(250)));
        assert_eq!(ChannelDevice::new().nominal_period(), None);
    }

    #[tokio::test]
    async fn test_replay_missing_file_unavailable() {
        let device = ReplayDevice::new("/nonexistent/visiondist/replay.jsonl", 1.0);
        assert!(matches!(device.acquire(), Err(DeviceError::Io { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_plays_in_order() {
        let path = std::env::temp_dir().join(format!("visiondist-replay-{}.jsonl", std::process::id()));
        std::fs::write(
            &path,
            "{\"presence\": true, \"distanceCm\": 60, \"tiltDeg\": 0}\n{\"presence\": false}\n",
        )
        .unwrap();

        let device = ReplayDevice::new(&path, 10.0);
        let mut rx = device.acquire().unwrap();
        assert_eq!(rx.recv().await, Some(DetectionResult::present(60.0, 0.0)));
        assert_eq!(rx.recv().await, Some(DetectionResult::absent()));
        assert_eq!(rx.recv().await, None);

        device.release();
        let _ = std::fs::remove_file(&path);
    }
}
