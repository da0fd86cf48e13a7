//! Configuration for dxs-studio
//!
//! Resolution priority: CLI argument → environment variable → TOML file →
//! built-in defaults. Every section of the TOML file is optional.
//!
//! ```toml
//! port = 5730
//! bind_address = "127.0.0.1"
//!
//! [engine]
//! base_url = "http://127.0.0.1:8000"
//! request_timeout_ms = 30000
//!
//! [tracker]
//! poll_interval_ms = 1000
//! signal_timeout_ms = 60000
//!
//! [transcription]
//! default_sensitivity = 0.5
//! noise_floor_ratio = 0.6
//!
//! [logging]
//! level = "info"
//! ```

use dxs_common::config::{load_toml_config, resolve_config_path};
use dxs_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::models::parameters::{DEFAULT_NOISE_FLOOR_RATIO, DEFAULT_SENSITIVITY};
use crate::services::TrackerConfig;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "DXS_CONFIG";

/// Config file name under the platform config directory
pub const CONFIG_FILE_NAME: &str = "dxs-studio.toml";

pub const DEFAULT_PORT: u16 = 5730;

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

/// Remote engine connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    pub base_url: String,
    pub request_timeout_ms: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Job tracker timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerSection {
    pub poll_interval_ms: u64,
    pub signal_timeout_ms: u64,
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            signal_timeout_ms: 60_000,
        }
    }
}

/// Defaults used when a caller supplies only a sensitivity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSection {
    pub default_sensitivity: f64,
    pub noise_floor_ratio: f64,
}

impl Default for TranscriptionSection {
    fn default() -> Self {
        Self {
            default_sensitivity: DEFAULT_SENSITIVITY,
            noise_floor_ratio: DEFAULT_NOISE_FLOOR_RATIO,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "dxs_studio=debug,tower_http=debug".to_string(),
        }
    }
}

/// Complete studio configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub port: u16,
    pub bind_address: String,
    pub max_upload_bytes: usize,
    pub engine: EngineSection,
    pub tracker: TrackerSection,
    pub transcription: TranscriptionSection,
    pub logging: LoggingSection,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "127.0.0.1".to_string(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            engine: EngineSection::default(),
            tracker: TrackerSection::default(),
            transcription: TranscriptionSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

/// Values given on the command line or through their environment variables
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub port: Option<u16>,
    pub bind_address: Option<String>,
    pub engine_url: Option<String>,
}

impl StudioConfig {
    /// Resolve, load and validate the config file
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(cli_path, CONFIG_ENV_VAR, CONFIG_FILE_NAME);
        if let Some(path) = &path {
            info!("Config file: {}", path.display());
        }
        let config: Self = load_toml_config(path.as_deref())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply higher-priority values, then re-validate
    pub fn apply_overrides(mut self, overrides: ConfigOverrides) -> Result<Self> {
        if let Some(port) = overrides.port {
            self.port = port;
        }
        if let Some(bind_address) = overrides.bind_address {
            self.bind_address = bind_address;
        }
        if let Some(engine_url) = overrides.engine_url {
            self.engine.base_url = engine_url;
        }
        self.validate()?;
        Ok(self)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(Error::Config(format!(
                "bind_address is not an IP address: {}",
                self.bind_address
            )));
        }
        if self.engine.base_url.trim().is_empty() {
            return Err(Error::Config("engine.base_url must not be empty".to_string()));
        }
        if self.engine.request_timeout_ms == 0 {
            return Err(Error::Config("engine.request_timeout_ms must be greater than 0".to_string()));
        }
        if self.tracker.poll_interval_ms == 0 {
            return Err(Error::Config("tracker.poll_interval_ms must be greater than 0".to_string()));
        }
        if self.tracker.signal_timeout_ms == 0 {
            return Err(Error::Config("tracker.signal_timeout_ms must be greater than 0".to_string()));
        }

        let ratio = self.transcription.noise_floor_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(Error::Config(format!(
                "transcription.noise_floor_ratio must be between 0 and 1 exclusive (got {})",
                ratio
            )));
        }
        let sensitivity = self.transcription.default_sensitivity;
        if !(sensitivity > 0.0 && sensitivity < 1.0) {
            return Err(Error::Config(format!(
                "transcription.default_sensitivity must be between 0 and 1 exclusive (got {})",
                sensitivity
            )));
        }
        if self.max_upload_bytes == 0 {
            return Err(Error::Config("max_upload_bytes must be greater than 0".to_string()));
        }

        Ok(())
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(self.tracker.poll_interval_ms),
            signal_timeout: Duration::from_millis(self.tracker.signal_timeout_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.request_timeout_ms)
    }

    /// Listen address
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind_address {}: {}", self.bind_address, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
