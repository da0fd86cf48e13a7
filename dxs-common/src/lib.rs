//! # DrumExtract Studio Common Library
//!
//! Shared code for the DrumExtract Studio crates including:
//! - Error types
//! - Event types (StudioEvent enum) and the EventBus
//! - Pipeline phase and stage enums shared by producers and consumers of events
//! - TOML configuration file helpers

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
