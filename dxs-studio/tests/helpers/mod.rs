//! Test Helper Utilities
//!
//! Scripted in-memory engine gateway shared by the dxs-studio integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dxs_common::events::EventBus;
use dxs_studio::models::{AudioBlob, DrumStem, SensitivityConfig, Stage, TaskId};
use dxs_studio::services::{
    EngineGateway, GatewayError, JobHandle, JobPayload, RemoteJobStatus, SessionMachine,
    TrackerConfig,
};

/// One scripted answer to a status query
#[derive(Debug, Clone)]
pub enum Step {
    Status(RemoteJobStatus),
    Error(GatewayError),
}

pub fn progress(percent: f64, message: &str) -> Step {
    Step::Status(RemoteJobStatus::Running {
        percent,
        message: message.to_string(),
    })
}

pub fn separated(drum_audio_url: &str, task_id: &str) -> Step {
    Step::Status(RemoteJobStatus::Succeeded(JobPayload {
        task_id: TaskId::new(task_id),
        drum_audio_url: Some(drum_audio_url.to_string()),
        midi_url: None,
    }))
}

pub fn transcribed(midi_url: &str, task_id: &str) -> Step {
    Step::Status(RemoteJobStatus::Succeeded(JobPayload {
        task_id: TaskId::new(task_id),
        drum_audio_url: None,
        midi_url: Some(midi_url.to_string()),
    }))
}

pub fn failed(reason: &str) -> Step {
    Step::Status(RemoteJobStatus::Failed {
        reason: reason.to_string(),
    })
}

pub fn network_error() -> Step {
    Step::Error(GatewayError::Network("connection refused".to_string()))
}

#[derive(Default)]
struct Script {
    separation: VecDeque<Step>,
    transcription: VecDeque<Step>,
    reject_submissions: Option<GatewayError>,
    separation_submissions: Vec<usize>,
    transcription_submissions: Vec<(DrumStem, SensitivityConfig)>,
    cancelled: Vec<String>,
    next_job: usize,
}

/// Engine fake answering status queries from per-stage scripts
///
/// An exhausted script answers `Pending`.
#[derive(Clone, Default)]
pub struct ScriptedGateway {
    script: Arc<Mutex<Script>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_separation(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.push_separation(steps);
        self
    }

    pub fn with_transcription(self, steps: impl IntoIterator<Item = Step>) -> Self {
        self.push_transcription(steps);
        self
    }

    pub fn push_separation(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().unwrap().separation.extend(steps);
    }

    pub fn push_transcription(&self, steps: impl IntoIterator<Item = Step>) {
        self.script.lock().unwrap().transcription.extend(steps);
    }

    pub fn reject_submissions(&self, error: GatewayError) {
        self.script.lock().unwrap().reject_submissions = Some(error);
    }

    pub fn accept_submissions(&self) {
        self.script.lock().unwrap().reject_submissions = None;
    }

    /// Byte length of every separation submission
    pub fn separation_submissions(&self) -> Vec<usize> {
        self.script.lock().unwrap().separation_submissions.clone()
    }

    pub fn transcription_submissions(&self) -> Vec<(DrumStem, SensitivityConfig)> {
        self.script.lock().unwrap().transcription_submissions.clone()
    }

    /// Job ids the engine was asked to cancel
    pub fn cancelled(&self) -> Vec<String> {
        self.script.lock().unwrap().cancelled.clone()
    }

    fn next_handle(script: &mut Script, stage: Stage) -> JobHandle {
        script.next_job += 1;
        JobHandle::new(format!("{}-{}", stage, script.next_job), stage)
    }
}

#[async_trait]
impl EngineGateway for ScriptedGateway {
    fn engine_name(&self) -> &str {
        "scripted"
    }

    async fn submit_for_separation(&self, audio: AudioBlob) -> Result<JobHandle, GatewayError> {
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.reject_submissions.clone() {
            return Err(error);
        }
        script.separation_submissions.push(audio.len());
        Ok(Self::next_handle(&mut script, Stage::Separation))
    }

    async fn submit_for_transcription(
        &self,
        stem: &DrumStem,
        config: SensitivityConfig,
    ) -> Result<JobHandle, GatewayError> {
        let mut script = self.script.lock().unwrap();
        if let Some(error) = script.reject_submissions.clone() {
            return Err(error);
        }
        script.transcription_submissions.push((stem.clone(), config));
        Ok(Self::next_handle(&mut script, Stage::Transcription))
    }

    async fn job_status(&self, handle: &JobHandle) -> Result<RemoteJobStatus, GatewayError> {
        let mut script = self.script.lock().unwrap();
        let queue = match handle.stage() {
            Stage::Separation => &mut script.separation,
            Stage::Transcription => &mut script.transcription,
        };
        match queue.pop_front() {
            Some(Step::Status(status)) => Ok(status),
            Some(Step::Error(error)) => Err(error),
            None => Ok(RemoteJobStatus::Pending),
        }
    }

    async fn cancel(&self, handle: &JobHandle) -> Result<(), GatewayError> {
        self.script
            .lock()
            .unwrap()
            .cancelled
            .push(handle.job_id().to_string());
        Ok(())
    }
}

/// Fast tracker timing for paused-clock tests
pub fn test_tracker_config() -> TrackerConfig {
    TrackerConfig {
        poll_interval: Duration::from_millis(100),
        signal_timeout: Duration::from_secs(2),
    }
}

pub fn test_machine(gateway: &ScriptedGateway) -> SessionMachine {
    SessionMachine::new(
        Arc::new(gateway.clone()),
        test_tracker_config(),
        EventBus::new(256),
    )
}

pub fn audio() -> AudioBlob {
    AudioBlob::new(vec![0u8; 1024]).with_file_name("groove.wav")
}

/// Let spawned tasks and the paused clock advance
pub async fn advance(duration: Duration) {
    let step = Duration::from_millis(10);
    let mut elapsed = Duration::ZERO;
    while elapsed < duration {
        tokio::time::sleep(step).await;
        elapsed += step;
    }
}
