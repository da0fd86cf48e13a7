//! HTTP engine client
//!
//! Talks to a separation/transcription engine exposing a task-queue style API:
//!
//! - `POST /separate` raw audio body → `{"job_id": ...}`
//! - `POST /transcribe` JSON body → `{"job_id": ...}`
//! - `GET /status/{job_id}` → `{"state", "percent", "message", "result", "error"}`
//! - `POST /cancel/{job_id}`
//!
//! Artifact URLs in results may be relative; they are resolved against the base URL.

use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::engine_gateway::{EngineGateway, GatewayError, JobHandle, JobPayload, RemoteJobStatus};
use crate::models::{AudioBlob, DrumStem, SensitivityConfig, Stage, TaskId};

const USER_AGENT: &str = concat!("DrumExtractStudio/", env!("CARGO_PKG_VERSION"));
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(alias = "task_id", alias = "taskId")]
    job_id: String,
}

#[derive(Debug, Serialize)]
struct TranscribeRequest<'a> {
    task_id: &'a str,
    drum_url: &'a str,
    sensitivity: f64,
    noise_floor: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum EngineState {
    Pending,
    #[serde(alias = "STARTED")]
    Progress,
    Success,
    Failure,
    Revoked,
}

#[derive(Debug, Default, Deserialize)]
struct EngineResult {
    #[serde(default, alias = "taskId")]
    task_id: Option<String>,
    #[serde(default, alias = "drumUrl")]
    drum_url: Option<String>,
    #[serde(default, alias = "midiUrl")]
    midi_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    state: EngineState,
    #[serde(default)]
    percent: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<EngineResult>,
    #[serde(default)]
    error: Option<String>,
}

/// Engine gateway over HTTP
pub struct HttpEngineGateway {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpEngineGateway {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self, GatewayError> {
        // Trailing slash so `join` appends instead of replacing the last segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| GatewayError::Parse(format!("invalid engine URL {}: {}", base_url, e)))?;

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(request_timeout)
            .build()
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.base_url
            .join(path)
            .map_err(|e| GatewayError::Parse(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Resolve an artifact URL that may be relative to the engine
    fn resolve_artifact(&self, raw: &str) -> String {
        match Url::parse(raw) {
            Ok(url) => url.to_string(),
            Err(_) => self
                .base_url
                .join(raw.trim_start_matches('/'))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| raw.to_string()),
        }
    }

    async fn read_submit(response: reqwest::Response) -> Result<String, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(status.as_u16(), error_text));
        }

        let submitted: SubmitResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;
        Ok(submitted.job_id)
    }

    fn to_status(&self, handle: &JobHandle, body: StatusResponse) -> RemoteJobStatus {
        match body.state {
            EngineState::Pending => RemoteJobStatus::Pending,
            EngineState::Progress => RemoteJobStatus::Running {
                percent: body.percent.unwrap_or(0.0),
                message: body.message.unwrap_or_default(),
            },
            EngineState::Success => {
                let Some(result) = body.result else {
                    return RemoteJobStatus::Failed {
                        reason: format!("job {} succeeded without a result", handle.job_id()),
                    };
                };
                RemoteJobStatus::Succeeded(JobPayload {
                    task_id: TaskId::new(result.task_id.unwrap_or_else(|| handle.job_id().to_string())),
                    drum_audio_url: result.drum_url.as_deref().map(|u| self.resolve_artifact(u)),
                    midi_url: result.midi_url.as_deref().map(|u| self.resolve_artifact(u)),
                })
            }
            EngineState::Failure => RemoteJobStatus::Failed {
                reason: body
                    .error
                    .or(body.message)
                    .unwrap_or_else(|| "engine reported failure".to_string()),
            },
            EngineState::Revoked => RemoteJobStatus::Cancelled,
        }
    }
}

#[async_trait]
impl EngineGateway for HttpEngineGateway {
    fn engine_name(&self) -> &str {
        self.base_url.as_str()
    }

    async fn submit_for_separation(&self, audio: AudioBlob) -> Result<JobHandle, GatewayError> {
        let url = self.endpoint("separate")?;
        let content_type = audio
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let file_name = audio.file_name().map(str::to_string);

        tracing::debug!(
            bytes = audio.len(),
            file_name = ?file_name,
            "Submitting audio for separation"
        );

        let mut request = self
            .http_client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type);
        if let Some(name) = file_name {
            request = request.header("X-File-Name", name);
        }

        let response = request
            .body(audio.into_data())
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let job_id = Self::read_submit(response).await?;
        tracing::info!(job_id = %job_id, "Separation job accepted");
        Ok(JobHandle::new(job_id, Stage::Separation))
    }

    async fn submit_for_transcription(
        &self,
        stem: &DrumStem,
        config: SensitivityConfig,
    ) -> Result<JobHandle, GatewayError> {
        let url = self.endpoint("transcribe")?;
        let body = TranscribeRequest {
            task_id: stem.task_id.as_str(),
            drum_url: &stem.drum_audio_url,
            sensitivity: config.sensitivity(),
            noise_floor: config.noise_floor(),
        };

        tracing::debug!(
            task_id = %stem.task_id.short(),
            sensitivity = config.sensitivity(),
            noise_floor = config.noise_floor(),
            "Submitting drum stem for transcription"
        );

        let response = self
            .http_client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let job_id = Self::read_submit(response).await?;
        tracing::info!(job_id = %job_id, "Transcription job accepted");
        Ok(JobHandle::new(job_id, Stage::Transcription))
    }

    async fn job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, GatewayError> {
        let url = self.endpoint(&format!("status/{}", handle.job_id()))?;

        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(GatewayError::UnknownJob(handle.job_id().to_string()));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(status.as_u16(), error_text));
        }

        let body: StatusResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Parse(e.to_string()))?;

        Ok(self.to_status(handle, body))
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), GatewayError> {
        let url = self.endpoint(&format!("cancel/{}", handle.job_id()))?;

        let response = self
            .http_client
            .post(url)
            .send()
            .await
            .map_err(|e| GatewayError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GatewayError::Api(status.as_u16(), error_text));
        }

        tracing::info!(job_id = %handle.job_id(), "Engine job cancelled");
        Ok(())
    }
}
