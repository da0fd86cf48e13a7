//! HTTP API handlers for dxs-studio
//!
//! REST control surface for the session plus an SSE stream of its changes.

pub mod health;
pub mod session;
pub mod sse;

pub use health::health_routes;
pub use session::session_routes;
pub use sse::session_event_stream;
