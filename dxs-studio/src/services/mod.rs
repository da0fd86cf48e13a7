//! Services for the studio session

pub mod engine_gateway;
pub mod http_engine;
pub mod job_tracker;
pub mod session_machine;

pub use engine_gateway::{EngineGateway, GatewayError, JobHandle, JobPayload, RemoteJobStatus};
pub use http_engine::HttpEngineGateway;
pub use job_tracker::{FailureReason, JobEvent, JobObserver, JobTracker, Subscription, TrackerConfig};
pub use session_machine::SessionMachine;
