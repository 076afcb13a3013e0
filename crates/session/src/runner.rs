//! Session Runner
//!
//! Drives a [`SessionController`] from three sources on one task: the
//! command queue fed by [`SessionHandle`]s, the presence timer events and
//! the detection stream of the running session. Everything the controller
//! does happens on this task, one event at a time.

use posture::DetectionResult;
use presence::TimerEvent;
use serde::Serialize;
use settings::SettingsPatch;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::controller::{
    Collaborators, SessionConfig, SessionController, SessionSnapshot, StartOutcome,
};
use crate::history::{SessionOutcome, SessionSummary};
use crate::SessionError;

/// Reply to a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Started {
    pub session_id: Uuid,
    /// The session was already running; nothing changed
    pub already_running: bool,
}

enum Command {
    Start(oneshot::Sender<Result<Started, SessionError>>),
    Stop(Option<oneshot::Sender<Option<SessionSummary>>>),
    UpdateSettings(
        SettingsPatch,
        oneshot::Sender<Result<Vec<&'static str>, SessionError>>,
    ),
    Calibrate(f64, oneshot::Sender<Result<f64, SessionError>>),
    ResetCalibration(oneshot::Sender<Result<(), SessionError>>),
    ResetStats(oneshot::Sender<()>),
}

/// Event loop owning the session controller
pub struct SessionRunner {
    controller: SessionController,
    commands: mpsc::UnboundedReceiver<Command>,
    timer_events: mpsc::UnboundedReceiver<TimerEvent>,
    detections: Option<mpsc::Receiver<DetectionResult>>,
    snapshots: watch::Sender<SessionSnapshot>,
}

impl SessionRunner {
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> (Self, SessionHandle) {
        let (timer_tx, timer_events) = mpsc::unbounded_channel();
        let controller = SessionController::new(config, collaborators, timer_tx);
        let (command_tx, commands) = mpsc::unbounded_channel();
        let (snapshots, snapshot_rx) = watch::channel(controller.snapshot());

        let runner = Self {
            controller,
            commands,
            timer_events,
            detections: None,
            snapshots,
        };
        let handle = SessionHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
        };
        (runner, handle)
    }

    /// Build a runner and spawn it on the current runtime
    pub fn spawn(
        config: SessionConfig,
        collaborators: Collaborators,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (runner, handle) = Self::new(config, collaborators);
        (handle, tokio::spawn(runner.run()))
    }

    /// Run until every handle is dropped. A running session is stopped on
    /// the way out.
    pub async fn run(mut self) {
        info!("Session runner started");
        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command),
                    None => break,
                },
                Some(event) = self.timer_events.recv() => {
                    self.controller.handle_timer(event, Instant::now());
                }
                detection = next_detection(&mut self.detections), if self.detections.is_some() => {
                    match detection {
                        Some(detection) => {
                            self.controller.on_frame_result(&detection, Instant::now());
                        }
                        None => {
                            info!("Detector stream ended");
                            self.controller.end(SessionOutcome::SourceEnded);
                        }
                    }
                }
            }

            if !self.controller.is_running() {
                self.detections = None;
            }
            self.publish();
        }

        self.controller.stop();
        self.publish();
        info!("Session runner stopped");
    }

    /// Replies go out after the new snapshot is published, so a caller
    /// that awaited a command always observes its effect.
    fn execute(&mut self, command: Command) {
        match command {
            Command::Start(reply) => {
                let result = match self.controller.start() {
                    Ok(StartOutcome::Started {
                        session_id,
                        detections,
                    }) => {
                        self.detections = Some(detections);
                        Ok(Started {
                            session_id,
                            already_running: false,
                        })
                    }
                    Ok(StartOutcome::AlreadyRunning) => Ok(Started {
                        session_id: self.controller.session_id().unwrap_or_default(),
                        already_running: true,
                    }),
                    Err(e) => Err(e),
                };
                self.publish();
                let _ = reply.send(result);
            }
            Command::Stop(reply) => {
                let summary = self.controller.stop();
                self.detections = None;
                self.publish();
                if let Some(reply) = reply {
                    let _ = reply.send(summary);
                }
            }
            Command::UpdateSettings(patch, reply) => {
                let result = self.controller.update_settings(&patch);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Calibrate(actual_cm, reply) => {
                let result = self.controller.calibrate(actual_cm);
                self.publish();
                let _ = reply.send(result);
            }
            Command::ResetCalibration(reply) => {
                let result = self.controller.reset_calibration();
                self.publish();
                let _ = reply.send(result);
            }
            Command::ResetStats(reply) => {
                self.controller.reset_stats();
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.controller.snapshot());
    }
}

async fn next_detection(
    detections: &mut Option<mpsc::Receiver<DetectionResult>>,
) -> Option<DetectionResult> {
    match detections {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable front of a session runner
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub async fn start(&self) -> Result<Started, SessionError> {
        self.request(Command::Start).await?
    }

    /// Queue a stop without waiting. Never blocks, so it may be called
    /// from inside a notification sink.
    pub fn stop(&self) -> Result<(), SessionError> {
        debug!("Stop requested");
        self.commands
            .send(Command::Stop(None))
            .map_err(|_| SessionError::Closed)
    }

    /// Stop and wait for the summary of the session that ended, if any
    pub async fn stop_and_wait(&self) -> Result<Option<SessionSummary>, SessionError> {
        self.request(|reply| Command::Stop(Some(reply))).await
    }

    pub async fn update_settings(
        &self,
        patch: SettingsPatch,
    ) -> Result<Vec<&'static str>, SessionError> {
        self.request(|reply| Command::UpdateSettings(patch, reply))
            .await?
    }

    pub async fn calibrate(&self, actual_distance_cm: f64) -> Result<f64, SessionError> {
        self.request(|reply| Command::Calibrate(actual_distance_cm, reply))
            .await?
    }

    pub async fn reset_calibration(&self) -> Result<(), SessionError> {
        self.request(Command::ResetCalibration).await?
    }

    pub async fn reset_stats(&self) -> Result<(), SessionError> {
        self.request(Command::ResetStats).await
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}
