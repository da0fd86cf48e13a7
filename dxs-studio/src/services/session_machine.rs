//! Session state machine
//!
//! Single source of truth for the pipeline phase of the one live session.
//!
//! | From | Event | To |
//! |---|---|---|
//! | IDLE, FAILED | `process_file` | SEPARATING |
//! | SEPARATING | separation success | AWAITING_TRANSCRIPTION_CONFIG |
//! | SEPARATING | separation failure | FAILED |
//! | AWAITING_TRANSCRIPTION_CONFIG | `start_midi_extraction` | TRANSCRIBING |
//! | TRANSCRIBING | transcription success | COMPLETE |
//! | TRANSCRIBING | transcription failure | FAILED |
//! | any | `reset` | IDLE |
//!
//! Every control call that starts or discards work bumps the generation
//! counter. Job events carry the generation they were started under and are
//! dropped when it no longer matches, so a superseded job can never write into
//! a newer session.
//!
//! All mutations happen under one lock and are published (watch channel plus
//! event bus) before the lock is released, so readers never observe a
//! half-applied update.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use dxs_common::events::{EventBus, StudioEvent};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::engine_gateway::{EngineGateway, GatewayError, JobHandle, JobPayload};
use super::job_tracker::{FailureReason, JobObserver, JobTracker, Subscription, TrackerConfig};
use crate::error::{ControlError, Operation};
use crate::models::{
    AudioBlob, Phase, ProgressSnapshot, SensitivityConfig, Session, SessionError, Stage,
};

/// Remote job owned by the current generation
struct ActiveJob {
    generation: u64,
    stage: Stage,
    cancel: CancellationToken,
    handle: Option<JobHandle>,
    subscription: Option<Subscription>,
}

struct MachineState {
    session: Session,
    generation: u64,
    job: Option<ActiveJob>,
}

struct Inner {
    state: Mutex<MachineState>,
    gateway: Arc<dyn EngineGateway>,
    tracker: JobTracker,
    event_bus: EventBus,
    snapshot_tx: watch::Sender<Session>,
}

/// Handle to the session state machine
///
/// Cloning yields another handle to the same session. Control methods return
/// immediately and must be called from within a Tokio runtime; remote work
/// runs on spawned tasks.
#[derive(Clone)]
pub struct SessionMachine {
    inner: Arc<Inner>,
}

impl SessionMachine {
    pub fn new(
        gateway: Arc<dyn EngineGateway>,
        tracker_config: TrackerConfig,
        event_bus: EventBus,
    ) -> Self {
        let tracker = JobTracker::new(Arc::clone(&gateway), tracker_config);
        let (snapshot_tx, _) = watch::channel(Session::new());

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(MachineState {
                    session: Session::new(),
                    generation: 0,
                    job: None,
                }),
                gateway,
                tracker,
                event_bus,
                snapshot_tx,
            }),
        }
    }

    /// Copy of the current session
    pub fn snapshot(&self) -> Session {
        self.inner.lock().session.clone()
    }

    /// Current generation counter
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Generation and session read under the same lock
    pub fn versioned_snapshot(&self) -> (u64, Session) {
        let state = self.inner.lock();
        (state.generation, state.session.clone())
    }

    /// Change notification carrying the latest session
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.inner.event_bus
    }

    pub fn engine_name(&self) -> &str {
        self.inner.gateway.engine_name()
    }

    /// Submit an audio file for drum separation
    ///
    /// Legal from IDLE and FAILED. A retry from FAILED starts from scratch.
    pub fn process_file(&self, audio: AudioBlob) -> Result<(), ControlError> {
        let mut state = self.inner.lock();

        let phase = state.session.phase;
        if !matches!(phase, Phase::Idle | Phase::Failed) {
            return Err(ControlError::InvalidTransition {
                operation: Operation::ProcessFile,
                phase,
            });
        }
        if audio.is_empty() {
            return Err(ControlError::Validation("audio file is empty".to_string()));
        }

        let generation = self.inner.begin_generation(&mut state);
        let mut session = Session::new();
        session.progress = ProgressSnapshot::starting();
        session.phase = phase;
        state.session = session;
        self.inner.transition(&mut state, Phase::Separating);

        let cancel = CancellationToken::new();
        state.job = Some(ActiveJob {
            generation,
            stage: Stage::Separation,
            cancel: cancel.clone(),
            handle: None,
            subscription: None,
        });
        drop(state);

        info!(
            generation,
            bytes = audio.len(),
            file_name = ?audio.file_name(),
            "Submitting file for separation"
        );

        let gateway = Arc::clone(&self.inner.gateway);
        self.spawn_job(generation, Stage::Separation, cancel, async move {
            gateway.submit_for_separation(audio).await
        });
        Ok(())
    }

    /// Submit the separated drums for MIDI transcription
    ///
    /// Legal from AWAITING_TRANSCRIPTION_CONFIG with
    /// `0 < noise_floor < sensitivity < 1`.
    pub fn start_midi_extraction(
        &self,
        sensitivity: f64,
        noise_floor: f64,
    ) -> Result<(), ControlError> {
        let mut state = self.inner.lock();

        let phase = state.session.phase;
        if phase != Phase::AwaitingTranscriptionConfig {
            return Err(ControlError::InvalidTransition {
                operation: Operation::StartMidiExtraction,
                phase,
            });
        }
        let config = SensitivityConfig::new(sensitivity, noise_floor)?;
        let stem = state
            .session
            .result
            .drum_stem()
            .ok_or(ControlError::InvalidTransition {
                operation: Operation::StartMidiExtraction,
                phase,
            })?;

        let generation = self.inner.begin_generation(&mut state);
        state.session.progress = ProgressSnapshot::starting();
        self.inner.transition(&mut state, Phase::Transcribing);

        let cancel = CancellationToken::new();
        state.job = Some(ActiveJob {
            generation,
            stage: Stage::Transcription,
            cancel: cancel.clone(),
            handle: None,
            subscription: None,
        });
        drop(state);

        info!(
            generation,
            task_id = %stem.task_id.short(),
            sensitivity = config.sensitivity(),
            noise_floor = config.noise_floor(),
            "Submitting drums for transcription"
        );

        let gateway = Arc::clone(&self.inner.gateway);
        self.spawn_job(generation, Stage::Transcription, cancel, async move {
            gateway.submit_for_transcription(&stem, config).await
        });
        Ok(())
    }

    /// Discard the session and start over in IDLE
    ///
    /// Legal from any phase. Cancels in-flight work. Idempotent.
    pub fn reset(&self) {
        drop(self.reset_session());
    }

    /// Reset, then wait (bounded) for the engine to acknowledge cancellation
    pub async fn shutdown(&self, grace: Duration) {
        let Some(pending) = self.reset_session() else {
            return;
        };
        if tokio::time::timeout(grace, pending).await.is_err() {
            warn!(grace_ms = grace.as_millis() as u64, "Engine job cancellation still pending at shutdown");
        }
    }

    fn reset_session(&self) -> Option<JoinHandle<()>> {
        let mut state = self.inner.lock();
        let job = state.job.take();
        let generation = self.inner.begin_generation(&mut state);
        let pending = job.and_then(|job| self.inner.cancel_job(job));
        let old_phase = state.session.phase;

        state.session = Session::new();
        self.inner.publish(&state);
        if old_phase != Phase::Idle {
            self.inner.emit_phase_change(generation, old_phase, Phase::Idle);
        }
        self.inner.event_bus.emit_lossy(StudioEvent::SessionReset {
            generation,
            timestamp: Utc::now(),
        });

        info!(generation, from = %old_phase, "Session reset");
        pending
    }

    /// Submit on a background task, then attach the tracker
    fn spawn_job<F>(&self, generation: u64, stage: Stage, cancel: CancellationToken, submit: F)
    where
        F: Future<Output = Result<JobHandle, GatewayError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);

        tokio::spawn(async move {
            let submitted = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(generation, %stage, "Job cancelled before submission finished");
                    return;
                }
                submitted = submit => submitted,
            };

            match submitted {
                Ok(handle) => inner.attach(generation, handle),
                Err(e) => {
                    warn!(generation, %stage, error = %e, "Job submission failed");
                    inner.apply_failure(generation, stage, format!("{} submission failed: {}", stage, e));
                }
            }
        });
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, MachineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bump generation and cancel whatever job the old generation owned
    fn begin_generation(&self, state: &mut MachineState) -> u64 {
        state.generation += 1;
        if let Some(job) = state.job.take() {
            drop(self.cancel_job(job));
        }
        state.generation
    }

    /// Stop tracking a job and ask the engine to drop it
    ///
    /// Returns the remote cancellation task when one was started.
    fn cancel_job(&self, job: ActiveJob) -> Option<JoinHandle<()>> {
        job.cancel.cancel();
        if let Some(subscription) = &job.subscription {
            subscription.cancel();
        }

        let handle = job.handle?;
        debug!(
            generation = job.generation,
            stage = %job.stage,
            job_id = %handle.job_id(),
            "Cancelling superseded engine job"
        );
        self.cancel_remote(handle)
    }

    fn cancel_remote(&self, handle: JobHandle) -> Option<JoinHandle<()>> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(job_id = %handle.job_id(), "No runtime available to cancel engine job");
            return None;
        };
        let gateway = Arc::clone(&self.gateway);
        Some(runtime.spawn(async move {
            if let Err(e) = gateway.cancel(&handle).await {
                warn!(job_id = %handle.job_id(), error = %e, "Engine job cancellation failed");
            }
        }))
    }

    fn transition(&self, state: &mut MachineState, new_phase: Phase) {
        let transition = state.session.transition_to(new_phase);
        self.publish(state);
        if transition.old_phase != transition.new_phase {
            self.emit_phase_change(state.generation, transition.old_phase, transition.new_phase);
        }
        info!(
            generation = state.generation,
            from = %transition.old_phase,
            to = %transition.new_phase,
            "Session phase changed"
        );
    }

    fn emit_phase_change(&self, generation: u64, old_phase: Phase, new_phase: Phase) {
        self.event_bus.emit_lossy(StudioEvent::PhaseChanged {
            generation,
            old_phase,
            new_phase,
            timestamp: Utc::now(),
        });
    }

    fn publish(&self, state: &MachineState) {
        if let Err(violation) = state.session.check_invariants() {
            error!(generation = state.generation, violation = %violation, "Session invariant violated");
            debug_assert!(false, "session invariant violated: {}", violation);
        }
        self.snapshot_tx.send_replace(state.session.clone());
    }

    /// True when an event for `generation`/`stage` may still touch the session
    fn is_current(state: &MachineState, generation: u64, stage: Stage) -> bool {
        state.generation == generation && state.session.phase.active_stage() == Some(stage)
    }

    fn attach(self: &Arc<Self>, generation: u64, handle: JobHandle) {
        let stage = handle.stage();
        let mut state = self.lock();

        if !Self::is_current(&state, generation, stage) {
            drop(state);
            debug!(generation, job_id = %handle.job_id(), "Job superseded during submission");
            drop(self.cancel_remote(handle));
            return;
        }

        let observer = Arc::new(StageObserver {
            machine: Arc::downgrade(self),
            generation,
            stage,
        });
        let subscription = self.tracker.subscribe(handle.clone(), observer);

        info!(generation, %stage, job_id = %handle.job_id(), "Tracking engine job");
        if let Some(job) = state.job.as_mut().filter(|j| j.generation == generation) {
            job.handle = Some(handle);
            job.subscription = Some(subscription);
        }
    }

    fn apply_progress(&self, generation: u64, stage: Stage, progress: ProgressSnapshot) {
        let mut state = self.lock();
        if !Self::is_current(&state, generation, stage) {
            debug!(generation, %stage, "Discarding stale progress event");
            return;
        }

        debug!(generation, %stage, percent = progress.percent, message = %progress.message, "Progress");
        state.session.progress = progress.clone();
        self.publish(&state);
        self.event_bus.emit_lossy(StudioEvent::ProgressUpdated {
            generation,
            stage,
            percent: progress.percent,
            message: progress.message,
            timestamp: Utc::now(),
        });
    }

    fn apply_success(&self, generation: u64, stage: Stage, payload: JobPayload) {
        let mut state = self.lock();
        if !Self::is_current(&state, generation, stage) {
            debug!(generation, %stage, "Discarding stale success event");
            return;
        }

        match stage {
            Stage::Separation => {
                let Some(drum_audio_url) = payload.drum_audio_url else {
                    drop(state);
                    self.apply_failure(
                        generation,
                        stage,
                        "engine reported success without a drum audio URL".to_string(),
                    );
                    return;
                };
                info!(generation, task_id = %payload.task_id.short(), "Drums separated");
                state.session.result.drum_audio_url = Some(drum_audio_url);
                state.session.result.task_id = Some(payload.task_id);
                state.job = None;
                self.transition(&mut state, Phase::AwaitingTranscriptionConfig);
            }
            Stage::Transcription => {
                let Some(midi_url) = payload.midi_url else {
                    drop(state);
                    self.apply_failure(
                        generation,
                        stage,
                        "engine reported success without a MIDI URL".to_string(),
                    );
                    return;
                };
                info!(generation, task_id = %payload.task_id.short(), "MIDI ready");
                state.session.result.midi_url = Some(midi_url);
                state.job = None;
                self.transition(&mut state, Phase::Complete);
            }
        }
    }

    fn apply_failure(&self, generation: u64, stage: Stage, message: String) {
        let mut state = self.lock();
        if !Self::is_current(&state, generation, stage) {
            debug!(generation, %stage, "Discarding stale failure event");
            return;
        }

        warn!(generation, %stage, error = %message, "Stage failed");
        state.session.error = Some(SessionError {
            message: message.clone(),
            stage,
        });
        state.job = None;
        self.transition(&mut state, Phase::Failed);
        self.event_bus.emit_lossy(StudioEvent::StageFailed {
            generation,
            stage,
            message,
            timestamp: Utc::now(),
        });
    }
}

/// Routes one job's tracker events into the machine, tagged with its generation
struct StageObserver {
    machine: Weak<Inner>,
    generation: u64,
    stage: Stage,
}

impl JobObserver for StageObserver {
    fn on_progress(&self, progress: ProgressSnapshot) {
        if let Some(inner) = self.machine.upgrade() {
            inner.apply_progress(self.generation, self.stage, progress);
        }
    }

    fn on_success(&self, payload: JobPayload) {
        if let Some(inner) = self.machine.upgrade() {
            inner.apply_success(self.generation, self.stage, payload);
        }
    }

    fn on_failure(&self, reason: FailureReason) {
        if let Some(inner) = self.machine.upgrade() {
            inner.apply_failure(self.generation, self.stage, reason.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DrumStem, TaskId};
    use crate::services::engine_gateway::RemoteJobStatus;
    use async_trait::async_trait;

    /// Gateway that accepts submissions and never finishes a job
    struct StalledGateway;

    #[async_trait]
    impl EngineGateway for StalledGateway {
        fn engine_name(&self) -> &str {
            "stalled"
        }

        async fn submit_for_separation(&self, _audio: AudioBlob) -> Result<JobHandle, GatewayError> {
            Ok(JobHandle::new("sep-1", Stage::Separation))
        }

        async fn submit_for_transcription(
            &self,
            _stem: &DrumStem,
            _config: SensitivityConfig,
        ) -> Result<JobHandle, GatewayError> {
            Ok(JobHandle::new("tr-1", Stage::Transcription))
        }

        async fn job_status(&self, _handle: &JobHandle) -> Result<RemoteJobStatus, GatewayError> {
            Ok(RemoteJobStatus::Pending)
        }

        async fn cancel(&self, _handle: &JobHandle) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    fn machine() -> SessionMachine {
        SessionMachine::new(
            Arc::new(StalledGateway),
            TrackerConfig::default(),
            EventBus::new(64),
        )
    }

    fn observer(machine: &SessionMachine, generation: u64, stage: Stage) -> StageObserver {
        StageObserver {
            machine: Arc::downgrade(&machine.inner),
            generation,
            stage,
        }
    }

    fn separation_payload() -> JobPayload {
        JobPayload {
            task_id: TaskId::new("t1"),
            drum_audio_url: Some("a".to_string()),
            midi_url: None,
        }
    }

    #[tokio::test]
    async fn test_stale_success_after_reset_is_ignored() {
        let machine = machine();
        machine.process_file(AudioBlob::new(vec![1, 2, 3])).unwrap();
        let stale = observer(&machine, machine.generation(), Stage::Separation);

        machine.reset();
        stale.on_success(separation_payload());

        assert_eq!(machine.snapshot(), Session::new());
    }

    #[tokio::test]
    async fn test_current_observer_applies_success() {
        let machine = machine();
        machine.process_file(AudioBlob::new(vec![1, 2, 3])).unwrap();
        let current = observer(&machine, machine.generation(), Stage::Separation);

        current.on_progress(ProgressSnapshot::new(70, "splitting"));
        assert_eq!(machine.snapshot().progress.percent, 70);

        current.on_success(separation_payload());
        let session = machine.snapshot();
        assert_eq!(session.phase, Phase::AwaitingTranscriptionConfig);
        assert_eq!(session.result.drum_audio_url.as_deref(), Some("a"));
        assert_eq!(session.result.task_id, Some(TaskId::new("t1")));
    }

    #[tokio::test]
    async fn test_wrong_stage_event_is_ignored() {
        let machine = machine();
        machine.process_file(AudioBlob::new(vec![1])).unwrap();
        let mismatched = observer(&machine, machine.generation(), Stage::Transcription);

        mismatched.on_failure(FailureReason::Revoked);
        assert_eq!(machine.snapshot().phase, Phase::Separating);
    }

    #[tokio::test]
    async fn test_success_without_drum_url_fails_separation() {
        let machine = machine();
        machine.process_file(AudioBlob::new(vec![1])).unwrap();
        let current = observer(&machine, machine.generation(), Stage::Separation);

        current.on_success(JobPayload {
            task_id: TaskId::new("t1"),
            drum_audio_url: None,
            midi_url: None,
        });

        let session = machine.snapshot();
        assert_eq!(session.phase, Phase::Failed);
        assert_eq!(session.error.map(|e| e.stage), Some(Stage::Separation));
        assert!(session.result.drum_audio_url.is_none());
    }

    #[tokio::test]
    async fn test_generation_bumps_on_every_control_call() {
        let machine = machine();
        assert_eq!(machine.generation(), 0);

        machine.process_file(AudioBlob::new(vec![1])).unwrap();
        assert_eq!(machine.generation(), 1);

        observer(&machine, 1, Stage::Separation).on_success(separation_payload());
        assert_eq!(machine.generation(), 1);

        machine.start_midi_extraction(0.5, 0.3).unwrap();
        assert_eq!(machine.generation(), 2);

        machine.reset();
        machine.reset();
        assert_eq!(machine.generation(), 4);
    }

    #[tokio::test]
    async fn test_versioned_snapshot_pairs_generation_with_session() {
        let machine = machine();
        assert_eq!(machine.versioned_snapshot(), (0, Session::new()));

        machine.process_file(AudioBlob::new(vec![1])).unwrap();
        let (generation, session) = machine.versioned_snapshot();
        assert_eq!(generation, 1);
        assert_eq!(session.phase, Phase::Separating);

        machine.reset();
        assert_eq!(machine.versioned_snapshot(), (2, Session::new()));
    }

    #[tokio::test]
    async fn test_rejected_calls_do_not_bump_generation() {
        let machine = machine();
        assert!(machine.start_midi_extraction(0.5, 0.3).is_err());
        assert!(machine.process_file(AudioBlob::new(Vec::new())).is_err());
        assert_eq!(machine.generation(), 0);
        assert_eq!(machine.snapshot(), Session::new());
    }
}
