//! Remote engine gateway interface
//!
//! The separation and transcription engines are opaque job-accepting services.
//! Submissions return a [`JobHandle`] immediately; the job tracker follows the
//! job through [`EngineGateway::job_status`]. The gateway never retries.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{AudioBlob, DrumStem, SensitivityConfig, Stage, TaskId};

/// Gateway errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown job: {0}")]
    UnknownJob(String),
}

impl GatewayError {
    /// True when the job itself is gone, so querying again cannot succeed
    pub fn is_terminal(&self) -> bool {
        matches!(self, GatewayError::UnknownJob(_))
    }
}

/// Opaque reference to one remote job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    job_id: String,
    stage: Stage,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, stage: Stage) -> Self {
        Self {
            job_id: job_id.into(),
            stage,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }
}

/// Artifacts reported by a successful job
///
/// Separation fills `drum_audio_url`; transcription fills `midi_url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub task_id: TaskId,
    pub drum_audio_url: Option<String>,
    pub midi_url: Option<String>,
}

/// Raw job status as reported by the engine
///
/// `percent` is whatever the engine sent; the tracker normalizes it.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteJobStatus {
    /// Accepted, not started
    Pending,
    /// Running
    Running { percent: f64, message: String },
    /// Finished with artifacts
    Succeeded(JobPayload),
    /// Finished with an engine-side error
    Failed { reason: String },
    /// Revoked on the engine side
    Cancelled,
}

/// Remote engine operations consumed by the session state machine
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// Engine identifier for diagnostics
    fn engine_name(&self) -> &str;

    /// Submit a mix for drum separation
    async fn submit_for_separation(&self, audio: AudioBlob) -> Result<JobHandle, GatewayError>;

    /// Submit separated drum audio for MIDI transcription
    async fn submit_for_transcription(
        &self,
        stem: &DrumStem,
        config: SensitivityConfig,
    ) -> Result<JobHandle, GatewayError>;

    /// Query the current status of a job
    async fn job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, GatewayError>;

    /// Ask the engine to stop a job (best-effort)
    async fn cancel(&self, handle: &JobHandle) -> Result<(), GatewayError>;
}
