//! Session aggregate
//!
//! The session moves through the pipeline phases:
//! IDLE → SEPARATING → AWAITING_TRANSCRIPTION_CONFIG → TRANSCRIBING → COMPLETE,
//! with FAILED reachable from either remote stage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DrumStem, Phase, Stage, TaskId};

/// Latest progress of the running remote job
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Percentage complete (0-100)
    pub percent: u8,

    /// Current operation description
    pub message: String,
}

impl ProgressSnapshot {
    /// Create a snapshot, clamping percent to 100
    pub fn new(percent: u8, message: impl Into<String>) -> Self {
        Self {
            percent: percent.min(100),
            message: message.into(),
        }
    }

    /// Progress at the start of every job submission
    pub fn starting() -> Self {
        Self::new(0, "starting")
    }
}

/// Artifacts produced so far
///
/// `drum_audio_url` and `task_id` arrive together when separation completes;
/// `midi_url` when transcription completes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionResult {
    pub drum_audio_url: Option<String>,
    pub midi_url: Option<String>,
    pub task_id: Option<TaskId>,
}

impl SessionResult {
    /// Drum stem to hand to the transcription stage
    pub fn drum_stem(&self) -> Option<DrumStem> {
        match (&self.task_id, &self.drum_audio_url) {
            (Some(task_id), Some(url)) => Some(DrumStem {
                task_id: task_id.clone(),
                drum_audio_url: url.clone(),
            }),
            _ => None,
        }
    }
}

/// Remote stage failure recorded on the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pub message: String,
    pub stage: Stage,
}

/// Phase change record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub old_phase: Phase,
    pub new_phase: Phase,
    pub transitioned_at: DateTime<Utc>,
}

/// The single live session owned by the state machine
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Session {
    /// Current pipeline phase
    pub phase: Phase,

    /// Progress of the running job (stale outside SEPARATING/TRANSCRIBING)
    pub progress: ProgressSnapshot,

    /// Artifacts produced so far
    pub result: SessionResult,

    /// Present only in FAILED
    pub error: Option<SessionError>,
}

impl Session {
    /// Fresh idle session
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to new phase
    pub fn transition_to(&mut self, new_phase: Phase) -> PhaseTransition {
        let transition = PhaseTransition {
            old_phase: self.phase,
            new_phase,
            transitioned_at: Utc::now(),
        };
        self.phase = new_phase;
        transition
    }

    /// Check the cross-field invariants tying result/error to phase
    ///
    /// Returns a description of the first violated invariant.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.error.is_some() != (self.phase == Phase::Failed) {
            return Err(format!(
                "error presence ({}) does not match phase {}",
                self.error.is_some(),
                self.phase
            ));
        }

        if self.result.midi_url.is_some() != (self.phase == Phase::Complete) {
            return Err(format!(
                "midi_url presence ({}) does not match phase {}",
                self.result.midi_url.is_some(),
                self.phase
            ));
        }

        if self.result.drum_audio_url.is_some() != self.result.task_id.is_some() {
            return Err("drum_audio_url and task_id must be populated together".to_string());
        }

        let drum_expected = match self.phase {
            Phase::Idle | Phase::Separating => false,
            Phase::AwaitingTranscriptionConfig | Phase::Transcribing | Phase::Complete => true,
            Phase::Failed => matches!(
                self.error,
                Some(SessionError {
                    stage: Stage::Transcription,
                    ..
                })
            ),
        };
        if self.result.drum_audio_url.is_some() != drum_expected {
            return Err(format!(
                "drum_audio_url presence ({}) does not match phase {}",
                self.result.drum_audio_url.is_some(),
                self.phase
            ));
        }

        if self.progress.percent > 100 {
            return Err(format!("progress {} exceeds 100", self.progress.percent));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separated() -> Session {
        Session {
            phase: Phase::AwaitingTranscriptionConfig,
            progress: ProgressSnapshot::new(100, "done"),
            result: SessionResult {
                drum_audio_url: Some("http://engine/drums.wav".to_string()),
                midi_url: None,
                task_id: Some(TaskId::new("t1")),
            },
            error: None,
        }
    }

    #[test]
    fn test_new_session_is_idle_and_consistent() {
        let session = Session::new();
        assert_eq!(session.phase, Phase::Idle);
        assert_eq!(session.progress.percent, 0);
        assert!(session.check_invariants().is_ok());
    }

    #[test]
    fn test_transition_records_old_and_new() {
        let mut session = Session::new();
        let transition = session.transition_to(Phase::Separating);
        assert_eq!(transition.old_phase, Phase::Idle);
        assert_eq!(transition.new_phase, Phase::Separating);
        assert_eq!(session.phase, Phase::Separating);
    }

    #[test]
    fn test_progress_clamped() {
        assert_eq!(ProgressSnapshot::new(250, "x").percent, 100);
        assert_eq!(ProgressSnapshot::starting().message, "starting");
    }

    #[test]
    fn test_failed_without_error_violates() {
        let mut session = Session::new();
        session.phase = Phase::Failed;
        assert!(session.check_invariants().is_err());
    }

    #[test]
    fn test_transcription_failure_keeps_drum_url() {
        let mut session = separated();
        session.phase = Phase::Failed;
        session.error = Some(SessionError {
            message: "boom".to_string(),
            stage: Stage::Transcription,
        });
        assert!(session.check_invariants().is_ok());

        session.error = Some(SessionError {
            message: "boom".to_string(),
            stage: Stage::Separation,
        });
        assert!(session.check_invariants().is_err());
    }

    #[test]
    fn test_midi_only_in_complete() {
        let mut session = separated();
        session.result.midi_url = Some("http://engine/drums.mid".to_string());
        assert!(session.check_invariants().is_err());

        session.phase = Phase::Complete;
        assert!(session.check_invariants().is_ok());
    }

    #[test]
    fn test_drum_stem_requires_both_fields() {
        let session = separated();
        let stem = session.result.drum_stem().unwrap();
        assert_eq!(stem.task_id.as_str(), "t1");

        assert!(SessionResult::default().drum_stem().is_none());
    }
}
