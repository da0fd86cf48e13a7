//! Server-Sent Events for session changes
//!
//! Each client first receives a `session` event with the current snapshot,
//! then a `session` event for every published change and one event per
//! `StudioEvent` (named by its `event_type()`).

use crate::api::session::current_view;
use crate::AppState;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Event name for full snapshots
pub const SNAPSHOT_EVENT: &str = "session";

fn snapshot_event(state: &AppState) -> Option<Event> {
    match serde_json::to_string(&current_view(state)) {
        Ok(json) => Some(Event::default().event(SNAPSHOT_EVENT).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize session snapshot: {}", e);
            None
        }
    }
}

/// GET /session/events
pub async fn session_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected to session events");

    let mut changes = state.machine.subscribe();
    let mut events = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        drop(changes.borrow_and_update());
        if let Some(event) = snapshot_event(&state) {
            yield Ok(event);
        }

        loop {
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        debug!("SSE: Session machine gone, closing stream");
                        break;
                    }
                    if let Some(event) = snapshot_event(&state) {
                        yield Ok(event);
                    }
                }

                received = events.recv() => match received {
                    Ok(event) => {
                        let event_type = event.event_type();
                        match serde_json::to_string(&event) {
                            Ok(event_json) => {
                                debug!("SSE: Broadcasting session event: {}", event_type);
                                yield Ok(Event::default().event(event_type).data(event_json));
                            }
                            Err(e) => {
                                warn!("SSE: Failed to serialize event {}: {}", event_type, e);
                            }
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("SSE: Client lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
