//! Data models for the studio session

pub mod audio;
pub mod parameters;
pub mod session;

pub use audio::{AudioBlob, DrumStem, TaskId};
pub use dxs_common::events::{Phase, Stage};
pub use parameters::SensitivityConfig;
pub use session::{PhaseTransition, ProgressSnapshot, Session, SessionError, SessionResult};
