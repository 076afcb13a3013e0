//! VisionDist API Server
//!
//! HTTP surface over a single monitoring session: lifecycle control,
//! detection intake, settings, statistics, notifications and metrics.

use anyhow::Context;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use session::{
    CameraDevice, ChannelDevice, Collaborators, Fanout, LatestFrame, NotificationLog,
    NotificationSink, ReplayDevice, SessionConfig, SessionHandle, SessionRunner, SessionState,
    TracingSink,
};
use std::sync::Arc;
use std::time::Instant;
use storage::{JsonFileStore, KeyValueStore, MemoryStore};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub mod config;
pub mod error;
mod routes;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    /// Push-driven detection intake; `None` when replaying from a file
    pub frames: Option<Arc<ChannelDevice>>,
    /// Latest camera frame, captured into violation records
    pub camera: Arc<LatestFrame>,
    pub notifications: Arc<NotificationLog>,
    pub metrics: PrometheusHandle,
    pub version: &'static str,
    pub start_time: Instant,
}

impl AppState {
    /// Wire storage, devices and sinks, and spawn the session runner
    pub fn build(
        config: &AppConfig,
        metrics: PrometheusHandle,
    ) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let store: Arc<dyn KeyValueStore> = if config.persist {
            Arc::new(JsonFileStore::open(config.data_dir.clone()).with_context(|| {
                format!("Failed to open data directory {}", config.data_dir.display())
            })?)
        } else {
            Arc::new(MemoryStore::new())
        };

        let (device, frames): (Arc<dyn CameraDevice>, Option<Arc<ChannelDevice>>) =
            match &config.replay_path {
                Some(path) => {
                    info!(path = %path.display(), hz = config.replay_hz, "Detections from replay file");
                    (Arc::new(ReplayDevice::new(path, config.replay_hz)), None)
                }
                None => {
                    let device = Arc::new(ChannelDevice::new());
                    (device.clone(), Some(device))
                }
            };

        let camera = Arc::new(LatestFrame::new());
        let notifications = Arc::new(NotificationLog::new(config.notification_log_capacity));
        let sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(TracingSink), notifications.clone()];

        let (session, runner) = SessionRunner::spawn(
            SessionConfig::default(),
            Collaborators {
                store,
                device,
                snapshots: camera.clone(),
                sink: Arc::new(Fanout::new(sinks)),
            },
        );

        let state = Self {
            session,
            frames,
            camera,
            notifications,
            metrics,
            version: env!("CARGO_PKG_VERSION"),
            start_time: Instant::now(),
        };
        Ok((state, runner))
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: i64,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub session: SessionState,
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_handler))
        .route("/api/v1/session", get(routes::session::get_session))
        .route("/api/v1/session/start", post(routes::session::start_session))
        .route("/api/v1/session/stop", post(routes::session::stop_session))
        .route("/api/v1/frames", post(routes::frames::post_frame))
        .route("/api/v1/camera/frame", put(routes::frames::put_camera_frame))
        .route(
            "/api/v1/settings",
            get(routes::settings::get_settings).put(routes::settings::put_settings),
        )
        .route("/api/v1/settings/calibrate", post(routes::settings::calibrate))
        .route(
            "/api/v1/settings/calibration/reset",
            post(routes::settings::reset_calibration),
        )
        .route("/api/v1/stats/reset", post(routes::session::reset_stats))
        .route(
            "/api/v1/notifications",
            get(routes::notifications::get_notifications),
        )
        .route(
            "/api/v1/records/:index/snapshot",
            get(routes::session::get_record_snapshot),
        )
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().timestamp(),
        version: state.version,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        session: state.session.snapshot().state,
    })
}

async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

/// Initialize logging. `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level {level:?}"))?;
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    let result = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.context("Failed to set tracing subscriber")
}

/// Run the server until Ctrl-C
pub async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install metrics recorder")?;
    let (state, runner) = AppState::build(&config, metrics)?;
    let session = state.session.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Starting API server on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Ok(Some(summary)) = session.stop_and_wait().await {
        info!(session_id = %summary.id, "Stopped running session on shutdown");
    }
    drop(session);
    runner.await.context("Session runner panicked")?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig {
            persist: false,
            ..Default::default()
        }
    }

    fn test_app(config: &AppConfig) -> (Router, AppState) {
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        let (state, _runner) = AppState::build(config, metrics).unwrap();
        (create_router(state.clone()), state)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn wait_for_frames(state: &AppState, frames: u64) {
        let mut rx = state.session.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| s.stats.frames_processed >= frames),
        )
        .await
        .unwrap()
        .unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = test_app(&test_config());
        let (status, body) = call(&app, Method::GET, "/api/v1/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["session"], "idle");
    }

    #[tokio::test]
    async fn test_frames_rejected_without_session() {
        let (app, _) = test_app(&test_config());
        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/frames",
            Some(json!({"presence": true, "distanceCm": 40, "tiltDeg": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "NOT_RUNNING");
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let (app, state) = test_app(&test_config());
        let (status, body) = call(&app, Method::POST, "/api/v1/session/start", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["alreadyRunning"], false);

        for _ in 0..3 {
            let (status, _) = call(
                &app,
                Method::POST,
                "/api/v1/frames",
                Some(json!({"presence": true, "distanceCm": 20, "tiltDeg": 0})),
            )
            .await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }
        wait_for_frames(&state, 3).await;

        let (status, body) = call(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "running");
        assert_eq!(body["status"]["distance"], "warning");
        assert_eq!(body["records"][0]["kind"], "distance");
        assert_eq!(body["stats"]["distanceViolationCount"], 1);

        let (status, _) = call(&app, Method::GET, "/api/v1/records/0/snapshot", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, body) = call(&app, Method::GET, "/api/v1/notifications?limit=10", None).await;
        let kinds: Vec<&str> = body["data"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|n| n["kind"].as_str())
            .collect();
        assert!(kinds.contains(&"distance-warning"));

        let (status, body) = call(&app, Method::POST, "/api/v1/stats/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["distanceViolationCount"], 0);

        let (status, body) = call(&app, Method::POST, "/api/v1/session/stop", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["stopped"], true);
        assert_eq!(body["summary"]["outcome"], "stopped");

        let (_, body) = call(&app, Method::POST, "/api/v1/session/stop", None).await;
        assert_eq!(body["stopped"], false);
    }

    #[tokio::test]
    async fn test_landmark_payload_validated() {
        let (app, _) = test_app(&test_config());
        call(&app, Method::POST, "/api/v1/session/start", None).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/frames",
            Some(json!({"landmarks": [{"x": 0.5, "y": 0.5, "z": 0.0}]})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "INVALID_MEASUREMENT");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/frames",
            Some(json!({"landmarks": []})),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_settings_routes() {
        let (app, _) = test_app(&test_config());
        let (status, body) = call(
            &app,
            Method::PUT,
            "/api/v1/settings",
            Some(json!({"minDistanceCm": 30, "maxTiltDeg": -1, "maxAngle": "steep"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rejected"], json!(["maxTiltDeg"]));
        assert_eq!(body["settings"]["minDistanceCm"], 30.0);

        let (_, body) = call(&app, Method::GET, "/api/v1/settings", None).await;
        assert_eq!(body["minDistanceCm"], 30.0);
        assert_eq!(body["maxTiltDeg"], 15.0);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/settings/calibrate",
            Some(json!({"actualDistanceCm": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "CALIBRATION_FAILED");

        let (status, body) =
            call(&app, Method::POST, "/api/v1/settings/calibration/reset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calibrationFactor"], 1.0);
    }

    #[tokio::test]
    async fn test_calibrate_after_frame() {
        let (app, state) = test_app(&test_config());
        call(&app, Method::POST, "/api/v1/session/start", None).await;
        call(
            &app,
            Method::POST,
            "/api/v1/frames",
            Some(json!({"presence": true, "distanceCm": 40, "tiltDeg": 0})),
        )
        .await;
        wait_for_frames(&state, 1).await;

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/v1/settings/calibrate",
            Some(json!({"actualDistanceCm": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["calibrationFactor"], 1.25);
        assert_eq!(body["settings"]["isCalibrated"], true);
    }

    #[tokio::test]
    async fn test_replay_missing_file_is_unavailable() {
        let config = AppConfig {
            replay_path: Some("/nonexistent/visiondist/replay.jsonl".into()),
            ..test_config()
        };
        let (app, _) = test_app(&config);
        let (status, body) = call(&app, Method::POST, "/api/v1/session/start", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "DEVICE_UNAVAILABLE");

        let (_, body) = call(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(body["state"], "idle");

        let (status, _) = call(
            &app,
            Method::POST,
            "/api/v1/frames",
            Some(json!({"presence": false})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_violation_snapshot_served_as_jpeg() {
        let (app, state) = test_app(&test_config());
        let frame = image::RgbImage::from_pixel(64, 48, image::Rgb([90, 140, 200]));
        let jpeg = session::encode_jpeg(&frame, 90).unwrap();
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/v1/camera/frame")
                    .header(header::CONTENT_TYPE, "image/jpeg")
                    .body(Body::from(jpeg))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        call(&app, Method::POST, "/api/v1/session/start", None).await;
        call(
            &app,
            Method::POST,
            "/api/v1/frames",
            Some(json!({"presence": true, "distanceCm": 20, "tiltDeg": 0})),
        )
        .await;
        wait_for_frames(&state, 1).await;

        let (_, body) = call(&app, Method::GET, "/api/v1/session", None).await;
        assert_eq!(body["records"][0]["hasSnapshot"], true);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/records/0/snapshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[tokio::test]
    async fn test_camera_frame_rejects_garbage() {
        let (app, state) = test_app(&test_config());
        let response = app
            .oneshot(
                Request::builder()
                    .method(Method::PUT)
                    .uri("/api/v1/camera/frame")
                    .body(Body::from("not an image"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(!state.camera.has_frame());
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (app, _) = test_app(&test_config());
        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
