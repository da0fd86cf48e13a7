//! dxs-studio library interface
//!
//! Exposes the session machine, engine gateway and HTTP API for the binary and
//! for integration testing.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::{extract::DefaultBodyLimit, Router};
use chrono::{DateTime, Utc};
use dxs_common::events::EventBus;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::{StudioConfig, TranscriptionSection};
use crate::services::SessionMachine;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// The single live session
    pub machine: SessionMachine,
    /// Event bus for SSE broadcasting
    pub event_bus: EventBus,
    /// Defaults for MIDI requests that omit parameters
    pub transcription: TranscriptionSection,
    /// Largest accepted upload
    pub max_upload_bytes: usize,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(machine: SessionMachine, config: &StudioConfig) -> Self {
        Self {
            event_bus: machine.event_bus().clone(),
            machine,
            transcription: config.transcription.clone(),
            max_upload_bytes: config.max_upload_bytes,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    let max_upload_bytes = state.max_upload_bytes;

    Router::new()
        .merge(api::session_routes())
        .route("/session/events", get(api::session_event_stream))
        .merge(api::health_routes())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
