//! Link and poll loop status.

use axum::{extract::State, Json};
use printsort_core::{device::SessionInfo, PollStatus};
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct LinkStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub link: LinkStatus,
    /// Whether the poll loop was configured at all.
    pub orchestrator_enabled: bool,
    pub poll: PollStatus,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let session = state.link().session_info();
    let link = LinkStatus {
        connected: session.is_some(),
        session,
    };

    let (orchestrator_enabled, poll) = match state.poll_loop() {
        Some(poll_loop) => (true, poll_loop.status().await),
        None => (false, PollStatus::default()),
    };

    Json(StatusResponse {
        link,
        orchestrator_enabled,
        poll,
    })
}
