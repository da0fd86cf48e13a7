//! Session pipeline type definitions
//!
//! Supporting types shared by the session state machine and event consumers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline phase of a session
///
/// Exactly one phase is active at a time. `Idle` is initial; `Complete` and
/// `Failed` are resting states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Waiting for an audio file
    #[default]
    Idle,
    /// Remote drum separation running
    Separating,
    /// Drum stem ready, waiting for transcription parameters
    AwaitingTranscriptionConfig,
    /// Remote drum-to-MIDI transcription running
    Transcribing,
    /// MIDI ready for download
    Complete,
    /// A remote stage failed
    Failed,
}

impl Phase {
    /// Uppercase status label for display
    pub fn label(self) -> &'static str {
        match self {
            Phase::Idle => "IDLE",
            Phase::Separating => "SEPARATING",
            Phase::AwaitingTranscriptionConfig => "AWAITING_TRANSCRIPTION_CONFIG",
            Phase::Transcribing => "TRANSCRIBING",
            Phase::Complete => "COMPLETE",
            Phase::Failed => "FAILED",
        }
    }

    /// True while a remote job is in flight
    pub fn is_processing(self) -> bool {
        matches!(self, Phase::Separating | Phase::Transcribing)
    }

    /// Remote stage running in this phase, if any
    pub fn active_stage(self) -> Option<Stage> {
        match self {
            Phase::Separating => Some(Stage::Separation),
            Phase::Transcribing => Some(Stage::Transcription),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Remote pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    /// Drum content isolated from the mix
    Separation,
    /// Drum audio converted to MIDI
    Transcription,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Separation => f.write_str("separation"),
            Stage::Transcription => f.write_str("transcription"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_remote_phases_are_processing() {
        assert!(Phase::Separating.is_processing());
        assert!(Phase::Transcribing.is_processing());
        assert!(!Phase::Idle.is_processing());
        assert!(!Phase::AwaitingTranscriptionConfig.is_processing());
        assert!(!Phase::Complete.is_processing());
        assert!(!Phase::Failed.is_processing());
    }

    #[test]
    fn test_active_stage_matches_phase() {
        assert_eq!(Phase::Separating.active_stage(), Some(Stage::Separation));
        assert_eq!(Phase::Transcribing.active_stage(), Some(Stage::Transcription));
        assert_eq!(Phase::Complete.active_stage(), None);
    }

    #[test]
    fn test_phase_serializes_as_label() {
        let json = serde_json::to_string(&Phase::AwaitingTranscriptionConfig).unwrap();
        assert_eq!(json, "\"AWAITING_TRANSCRIPTION_CONFIG\"");
        assert_eq!(Phase::default(), Phase::Idle);
        assert_eq!(Phase::Failed.to_string(), "FAILED");
    }
}
