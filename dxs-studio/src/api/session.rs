//! Session control handlers
//!
//! GET /session, POST /session/file, POST /session/midi, POST /session/reset

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::models::{AudioBlob, Session};
use crate::AppState;

/// Header carrying the original file name of an upload
pub const FILE_NAME_HEADER: &str = "x-file-name";

/// Session snapshot as presented to clients
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub generation: u64,
    #[serde(flatten)]
    pub session: Session,
    /// Uppercase phase label for status displays
    pub status_label: &'static str,
    /// True while a remote stage runs
    pub is_processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id_short: Option<String>,
}

impl SessionView {
    pub fn new(generation: u64, session: Session) -> Self {
        let task_id_short = session
            .result
            .task_id
            .as_ref()
            .map(|t| t.short().to_string());

        Self {
            generation,
            status_label: session.phase.label(),
            is_processing: session.phase.is_processing(),
            task_id_short,
            session,
        }
    }
}

/// POST /session/midi request
///
/// Without `sensitivity` the configured default is used; without
/// `noise_floor` it is derived from the sensitivity with the configured ratio.
#[derive(Debug, Default, Deserialize)]
pub struct MidiRequest {
    pub sensitivity: Option<f64>,
    pub noise_floor: Option<f64>,
}

pub(crate) fn current_view(state: &AppState) -> SessionView {
    let (generation, session) = state.machine.versioned_snapshot();
    SessionView::new(generation, session)
}

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(current_view(&state))
}

/// POST /session/file
///
/// Raw audio body. Returns 202 Accepted; progress follows on the event stream.
pub async fn upload_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let mut audio = AudioBlob::new(body.to_vec());

    if let Some(value) = headers.get(FILE_NAME_HEADER) {
        let file_name = value
            .to_str()
            .map_err(|_| ApiError::BadRequest("X-File-Name header is not valid text".to_string()))?;
        audio = audio.with_file_name(file_name);
    }
    if let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    {
        audio = audio.with_content_type(content_type);
    }

    info!(bytes = audio.len(), file_name = ?audio.file_name(), "File upload received");
    state.machine.process_file(audio)?;

    Ok((StatusCode::ACCEPTED, Json(current_view(&state))))
}

/// POST /session/midi
pub async fn start_midi(
    State(state): State<AppState>,
    Json(request): Json<MidiRequest>,
) -> ApiResult<(StatusCode, Json<SessionView>)> {
    let sensitivity = request
        .sensitivity
        .unwrap_or(state.transcription.default_sensitivity);
    let noise_floor = request
        .noise_floor
        .unwrap_or(sensitivity * state.transcription.noise_floor_ratio);

    state.machine.start_midi_extraction(sensitivity, noise_floor)?;

    Ok((StatusCode::ACCEPTED, Json(current_view(&state))))
}

/// POST /session/reset
pub async fn reset_session(State(state): State<AppState>) -> Json<SessionView> {
    state.machine.reset();
    Json(current_view(&state))
}

/// Build session routes
pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/file", post(upload_file))
        .route("/session/midi", post(start_midi))
        .route("/session/reset", post(reset_session))
}
