//! Notification Routes

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use session::LoggedNotification;

use crate::AppState;

/// Query parameters for the notifications endpoint
#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    /// Maximum number of notifications to return
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub data: Vec<LoggedNotification>,
    pub meta: NotificationMeta,
}

#[derive(Debug, Serialize)]
pub struct NotificationMeta {
    pub count: usize,
    pub limit: usize,
}

/// Recent notifications, newest first
pub async fn get_notifications(
    State(state): State<AppState>,
    Query(params): Query<NotificationQuery>,
) -> Json<NotificationResponse> {
    let limit = params.limit.min(1000);
    let data = state.notifications.recent(limit);
    Json(NotificationResponse {
        meta: NotificationMeta {
            count: data.len(),
            limit,
        },
        data,
    })
}
