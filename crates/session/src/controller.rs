//! Session Controller
//!
//! Synchronous core of a monitoring session. The caller supplies the
//! current time with every frame and timer event, so the controller never
//! reads a clock for its decisions.

use alerting::{EscalationConfig, EscalationEngine, SeverityTier};
use chrono::Utc;
use metrics::{counter, gauge};
use posture::{
    classify, Classification, DetectionResult, FaceGeometry, FrameCadence, FrameMeasurement,
    IndicatorStatus, MeasurementError, RenderHints, ViolationKind, NOMINAL_TICK,
};
use presence::{PresenceChange, PresenceConfig, PresenceSignal, PresenceTracker, TimerEvent};
use rewards::{RewardEngine, RewardLedger, RewardRules};
use ring_buffer::RingBuffer;
use serde::Serialize;
use settings::{Settings, SettingsPatch, SettingsStore};
use std::sync::Arc;
use std::time::Duration;
use storage::KeyValueStore;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::device::CameraDevice;
use crate::history::{self, SessionOutcome, SessionSummary};
use crate::notification::{Notification, NotificationSink};
use crate::snapshot::{encode_jpeg, SnapshotError, SnapshotProvider, SNAPSHOT_JPEG_QUALITY};
use crate::stats::{SessionStats, ViolationRecord, RECORD_CAPACITY};
use crate::SessionError;

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub escalation: EscalationConfig,
    pub rewards: RewardRules,
    /// Period of the absence display tick
    pub absence_tick: Duration,
    /// Violation records kept
    pub record_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            escalation: EscalationConfig::default(),
            rewards: RewardRules::default(),
            absence_tick: Duration::from_secs(1),
            record_capacity: RECORD_CAPACITY,
        }
    }
}

/// External collaborators of a session
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn KeyValueStore>,
    pub device: Arc<dyn CameraDevice>,
    pub snapshots: Arc<dyn SnapshotProvider>,
    pub sink: Arc<dyn NotificationSink>,
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Running,
    Stopped,
    Terminated,
}

/// Indicator state for the UI, refreshed on every frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub face_present: bool,
    pub distance: IndicatorStatus,
    pub posture: IndicatorStatus,
    /// Calibrated distance of the last valid frame with a face
    pub distance_cm: Option<f64>,
    pub tilt_deg: Option<f64>,
    pub render: Option<RenderHints>,
    /// Set while the face is away
    pub away_secs: Option<u64>,
    pub remaining_secs: Option<u64>,
}

/// Everything the UI may query about the session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub status: SessionStatus,
    pub severity_tier: Option<SeverityTier>,
    pub violation_secs: u64,
    pub stats: SessionStats,
    /// Newest first
    pub records: Vec<ViolationRecord>,
    pub ledger: RewardLedger,
    pub settings: Settings,
}

/// What a frame did
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No session running
    Ignored,
    /// Malformed frame, dropped
    Invalid(MeasurementError),
    /// No face in frame
    Absent,
    Processed {
        classification: Classification,
        tier: Option<SeverityTier>,
    },
}

#[derive(Debug)]
pub enum StartOutcome {
    Started {
        session_id: Uuid,
        detections: mpsc::Receiver<DetectionResult>,
    },
    AlreadyRunning,
}

/// Monitoring session controller
pub struct SessionController {
    state: SessionState,
    session_id: Option<Uuid>,
    settings: Settings,
    settings_store: SettingsStore,
    store: Arc<dyn KeyValueStore>,
    device: Arc<dyn CameraDevice>,
    snapshots: Arc<dyn SnapshotProvider>,
    sink: Arc<dyn NotificationSink>,
    cadence: FrameCadence,
    escalation: EscalationEngine,
    rewards: RewardEngine,
    presence: PresenceTracker,
    stats: SessionStats,
    records: RingBuffer<ViolationRecord>,
    last_capture_at: Option<std::time::Instant>,
    last_raw_distance_cm: Option<f64>,
    status: SessionStatus,
    points_at_start: u64,
}

impl SessionController {
    /// Load settings and the reward ledger from the store. Presence timer
    /// events are delivered on `timer_events` and must be fed back through
    /// [`SessionController::handle_timer`].
    pub fn new(
        config: SessionConfig,
        collaborators: Collaborators,
        timer_events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        let Collaborators {
            store,
            device,
            snapshots,
            sink,
        } = collaborators;

        let settings_store = SettingsStore::new(store.clone());
        let settings = settings_store.load();
        let rewards = RewardEngine::load(store.clone(), config.rewards.clone());
        let presence = PresenceTracker::new(
            PresenceConfig {
                away_timeout: settings.away_timeout(),
                tick_interval: config.absence_tick,
            },
            timer_events,
        );

        Self {
            state: SessionState::Idle,
            session_id: None,
            settings,
            settings_store,
            store,
            device,
            snapshots,
            sink,
            cadence: FrameCadence::default(),
            escalation: EscalationEngine::new(config.escalation),
            rewards,
            presence,
            stats: SessionStats::default(),
            records: RingBuffer::new(config.record_capacity),
            last_capture_at: None,
            last_raw_distance_cm: None,
            status: SessionStatus::default(),
            points_at_start: 0,
        }
    }

    /// Acquire the device and begin a fresh session. Starting while running
    /// does nothing.
    pub fn start(&mut self) -> Result<StartOutcome, SessionError> {
        if self.state == SessionState::Running {
            debug!("Start ignored, session already running");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let detections = self.device.acquire().map_err(|e| {
            warn!("Cannot start session: {}", e);
            SessionError::DeviceUnavailable(e)
        })?;

        let session_id = Uuid::new_v4();
        self.escalation.reset();
        self.presence.reset();
        self.presence.set_away_timeout(self.settings.away_timeout());
        self.cadence
            .restart(self.device.nominal_period().unwrap_or(NOMINAL_TICK));
        self.rewards.reset_pending();
        self.stats = SessionStats::started(Utc::now());
        self.records.clear();
        self.last_capture_at = None;
        self.last_raw_distance_cm = None;
        self.status = SessionStatus::default();
        self.points_at_start = self.rewards.ledger().total_points;
        self.session_id = Some(session_id);
        self.state = SessionState::Running;

        info!(%session_id, "Monitoring session started");
        Ok(StartOutcome::Started {
            session_id,
            detections,
        })
    }

    /// Process one detection result
    pub fn on_frame_result(&mut self, detection: &DetectionResult, now: Instant) -> FrameOutcome {
        if self.state != SessionState::Running {
            return FrameOutcome::Ignored;
        }
        self.stats.frames_processed += 1;
        counter!("visiondist_frames_total").increment(1);

        let measurement =
            match FrameMeasurement::from_detection(detection, self.settings.calibration_factor) {
                Ok(measurement) => measurement,
                Err(e) => {
                    warn!("Dropping invalid frame: {}", e);
                    self.stats.invalid_frames += 1;
                    counter!("visiondist_invalid_frames_total").increment(1);
                    self.clear_face_status();
                    return FrameOutcome::Invalid(e);
                }
            };
        if measurement.presence {
            self.last_raw_distance_cm = detection.distance_cm;
        }

        match self.presence.observe(measurement.presence, now) {
            PresenceChange::Left { timeout } => self.emit(Notification::AbsenceStarted {
                timeout_secs: timeout.as_secs(),
            }),
            PresenceChange::Returned { away } => self.emit(Notification::PresenceRestored {
                away_secs: away.as_secs(),
            }),
            PresenceChange::Unchanged => {}
        }

        if !measurement.presence {
            self.escalation.clear();
            self.cadence.reset();
            self.rewards.reset_pending();
            self.clear_face_status();
            return FrameOutcome::Absent;
        }

        let now = now.into_std();
        let elapsed = self.cadence.advance(now);
        let classification = classify(&measurement, &self.settings);
        self.update_status(&measurement, &classification, detection.geometry.as_ref());

        let tier = self.escalate(&classification, elapsed, now);
        self.accrue(&classification, elapsed);
        self.record_violations(&measurement, &classification, now);

        FrameOutcome::Processed {
            classification,
            tier,
        }
    }

    /// Feed back a presence timer event. Returns the signal when the event
    /// was current.
    pub fn handle_timer(&mut self, event: TimerEvent, now: Instant) -> Option<PresenceSignal> {
        if self.state != SessionState::Running {
            return None;
        }
        let signal = self.presence.handle(event, now)?;
        match signal {
            PresenceSignal::Tick { away, remaining } => {
                self.status.away_secs = Some(away.as_secs());
                self.status.remaining_secs = Some(remaining.as_secs());
                self.emit(Notification::AbsenceTick {
                    away_secs: away.as_secs(),
                    remaining_secs: remaining.as_secs(),
                });
            }
            PresenceSignal::TimedOut { away } => {
                info!(away_secs = away.as_secs(), "Face away too long, ending session");
                self.end(SessionOutcome::AutoTerminated);
                self.emit(Notification::SessionAutoTerminated {});
            }
        }
        Some(signal)
    }

    /// Stop the running session. Safe to call at any time.
    pub fn stop(&mut self) -> Option<SessionSummary> {
        self.end(SessionOutcome::Stopped)
    }

    /// End the running session with `outcome`: cancel presence timers,
    /// release the device and record the session in the history.
    pub fn end(&mut self, outcome: SessionOutcome) -> Option<SessionSummary> {
        if self.state != SessionState::Running {
            debug!(outcome = outcome.as_str(), "No session running");
            return None;
        }

        self.presence.reset();
        self.device.release();
        self.escalation.clear();
        self.cadence.reset();
        self.status = SessionStatus::default();
        self.state = match outcome {
            SessionOutcome::AutoTerminated => SessionState::Terminated,
            SessionOutcome::Stopped | SessionOutcome::SourceEnded => SessionState::Stopped,
        };
        counter!("visiondist_sessions_total", "outcome" => outcome.as_str()).increment(1);

        let ended_at = Utc::now();
        let summary = SessionSummary {
            id: self.session_id.unwrap_or_default(),
            started_at: self.stats.started_at.unwrap_or(ended_at),
            ended_at,
            outcome,
            stats: self.stats.clone(),
            points_earned: self
                .rewards
                .ledger()
                .total_points
                .saturating_sub(self.points_at_start),
        };
        if let Err(e) = history::append_summary(self.store.as_ref(), &summary) {
            warn!("Failed to record session history: {}", e);
        }

        info!(
            session_id = %summary.id,
            outcome = outcome.as_str(),
            violations = summary.stats.total_violations(),
            "Monitoring session ended"
        );
        Some(summary)
    }

    /// Merge a settings patch. Invalid fields are ignored and returned by
    /// name. A failed save leaves the new settings in effect.
    pub fn update_settings(
        &mut self,
        patch: &SettingsPatch,
    ) -> Result<Vec<&'static str>, SessionError> {
        let rejected = self.settings.apply(patch);
        if !rejected.is_empty() {
            warn!(?rejected, "Ignoring invalid settings fields");
        }
        // Takes effect from the next absence
        self.presence.set_away_timeout(self.settings.away_timeout());
        self.settings_store.save(&self.settings)?;
        Ok(rejected)
    }

    /// Calibrate against the last raw distance estimate
    pub fn calibrate(&mut self, actual_distance_cm: f64) -> Result<f64, SessionError> {
        let raw = self.last_raw_distance_cm.unwrap_or(0.0);
        let factor = self.settings.calibrate(actual_distance_cm, raw)?;
        info!(factor, raw_cm = raw, actual_cm = actual_distance_cm, "Distance calibrated");
        self.settings_store.save(&self.settings)?;
        Ok(factor)
    }

    pub fn reset_calibration(&mut self) -> Result<(), SessionError> {
        self.settings.reset_calibration();
        info!("Calibration reset");
        self.settings_store.save(&self.settings)?;
        Ok(())
    }

    /// Clear statistics and violation records
    pub fn reset_stats(&mut self) {
        self.stats = SessionStats {
            started_at: self.stats.started_at,
            ..Default::default()
        };
        self.records.clear();
        self.last_capture_at = None;
        debug!("Session stats reset");
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let violating = self.escalation.state().is_violating;
        SessionSnapshot {
            state: self.state,
            session_id: self.session_id,
            status: self.status.clone(),
            severity_tier: violating.then(|| self.escalation.tier()),
            violation_secs: self.escalation.state().duration_secs(),
            stats: self.stats.clone(),
            records: self.records.iter().cloned().collect(),
            ledger: self.rewards.ledger().clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.session_id
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn records(&self) -> &RingBuffer<ViolationRecord> {
        &self.records
    }

    pub fn ledger(&self) -> &RewardLedger {
        self.rewards.ledger()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    pub fn escalation(&self) -> &EscalationEngine {
        &self.escalation
    }

    fn escalate(
        &mut self,
        classification: &Classification,
        elapsed: Duration,
        now: std::time::Instant,
    ) -> Option<SeverityTier> {
        let outcome = self.escalation.observe(
            classification.primary_violation(),
            elapsed,
            now,
            self.settings.warning_interval(),
            self.settings.enable_positive_reward,
        );

        if let Some(warning) = outcome.warning {
            counter!("visiondist_warnings_total", "tier" => warning.tier.as_u8().to_string())
                .increment(1);
            let message = warning.message.to_string();
            self.emit(match warning.kind {
                ViolationKind::Distance => Notification::DistanceWarning {
                    severity_tier: warning.tier,
                    message,
                    voice: warning.voice,
                },
                ViolationKind::Posture => Notification::PostureWarning {
                    severity_tier: warning.tier,
                    message,
                    voice: warning.voice,
                },
            });
        }

        if let Some(recovery) = outcome.recovery {
            if let Err(e) = self.rewards.award(recovery.bonus_points) {
                warn!("Recovery points not saved: {}", e);
            }
            self.emit(Notification::ViolationRecovered {
                bonus_points: recovery.bonus_points,
                message: recovery.message.to_string(),
                voice: recovery.voice,
            });
        }

        outcome.tier
    }

    fn accrue(&mut self, classification: &Classification, elapsed: Duration) {
        let outcome = self.rewards.on_frame(
            classification.at_ideal,
            classification.is_violating(),
            self.settings.enable_positive_reward,
            elapsed,
        );
        if let Some(minutes) = outcome.celebration_minutes {
            self.emit(Notification::StreakCelebration { minutes });
        }
        if let Some(points) = outcome.bonus_points {
            self.emit(Notification::StreakBonus { points });
        }
        gauge!("visiondist_streak_seconds").set(self.rewards.ledger().current_streak_seconds as f64);
    }

    fn record_violations(
        &mut self,
        measurement: &FrameMeasurement,
        classification: &Classification,
        now: std::time::Instant,
    ) {
        if !classification.is_violating() {
            return;
        }
        for kind in classification.violations() {
            counter!("visiondist_violations_total", "kind" => kind.as_str()).increment(1);
            self.stats
                .observe(kind, measurement.distance_cm, measurement.tilt_deg);
        }

        let interval = self.settings.warning_interval();
        let eligible = self
            .last_capture_at
            .map_or(true, |last| now.saturating_duration_since(last) >= interval);
        if !eligible {
            return;
        }
        self.last_capture_at = Some(now);

        let snapshot = self.capture_snapshot();
        let timestamp = Utc::now();
        for kind in classification.violations() {
            self.stats.count(kind);
            let value = match kind {
                ViolationKind::Distance => measurement.distance_cm,
                ViolationKind::Posture => measurement.tilt_deg.abs(),
            };
            debug!(kind = kind.as_str(), value, "Violation recorded");
            self.records
                .push(ViolationRecord::new(kind, value, timestamp, snapshot.clone()));
        }
    }

    fn capture_snapshot(&self) -> Option<Vec<u8>> {
        let result = self
            .snapshots
            .capture_frame()
            .and_then(|frame| encode_jpeg(&frame, SNAPSHOT_JPEG_QUALITY));
        match result {
            Ok(jpeg) => Some(jpeg),
            Err(SnapshotError::NoSource) => None,
            Err(e) => {
                warn!("Snapshot capture failed: {}", e);
                None
            }
        }
    }

    fn update_status(
        &mut self,
        measurement: &FrameMeasurement,
        classification: &Classification,
        geometry: Option<&FaceGeometry>,
    ) {
        self.status = SessionStatus {
            face_present: true,
            distance: classification.distance_status(),
            posture: classification.posture_status(),
            distance_cm: Some(measurement.distance_cm),
            tilt_deg: Some(measurement.tilt_deg),
            render: geometry.map(|g| RenderHints::new(g, classification)),
            away_secs: None,
            remaining_secs: None,
        };
    }

    fn clear_face_status(&mut self) {
        self.status = SessionStatus {
            away_secs: self.status.away_secs,
            remaining_secs: self.status.remaining_secs,
            ..Default::default()
        };
    }

    fn emit(&self, notification: Notification) {
        if let Err(e) = self.sink.notify(&notification) {
            warn!(kind = notification.kind(), "Notification delivery failed: {}", e);
        }
    }
}
