//! Configuration file resolution and TOML helpers
//!
//! Config file location follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. OS-dependent user config directory (`<config_dir>/dxs/<file_name>`)
//!
//! A missing config file is not an error: callers fall back to built-in defaults.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Directory name under the platform config directory
pub const CONFIG_DIR_NAME: &str = "dxs";

/// Resolve the config file path.
///
/// Returns `None` when no source names a file and the default location does not exist.
pub fn resolve_config_path(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    file_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: OS-dependent default location
    default_config_path(file_name).filter(|p| p.exists())
}

/// Get the default config file path for the platform
///
/// - Linux: `~/.config/dxs/<file_name>`
/// - macOS: `~/Library/Application Support/dxs/<file_name>`
/// - Windows: `%APPDATA%\dxs\<file_name>`
pub fn default_config_path(file_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(file_name))
}

/// Load a TOML config file, or built-in defaults when there is no file.
///
/// An explicitly named file that cannot be read or parsed is an error; a missing
/// default-location file only produces a warning.
pub fn load_toml_config<T>(path: Option<&Path>) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = path else {
        info!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        warn!(
            "Config file {} does not exist, using built-in defaults",
            path.display()
        );
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed ({}): {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed ({}): {}", path.display(), e)))?;

    debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config<T: Serialize>(config: &T, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let tmp_path = path.with_extension("toml.tmp");
    std::fs::write(&tmp_path, content)?;
    std::fs::rename(&tmp_path, path)?;

    info!("Config written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serial_test::serial;

    #[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Sample {
        #[serde(default)]
        name: String,
        #[serde(default)]
        port: u16,
    }

    #[test]
    #[serial]
    fn test_cli_arg_wins_over_env() {
        std::env::set_var("DXS_TEST_CONFIG", "/from/env.toml");
        let path = resolve_config_path(
            Some(Path::new("/from/cli.toml")),
            "DXS_TEST_CONFIG",
            "sample.toml",
        );
        std::env::remove_var("DXS_TEST_CONFIG");

        assert_eq!(path, Some(PathBuf::from("/from/cli.toml")));
    }

    #[test]
    #[serial]
    fn test_env_used_without_cli_arg() {
        std::env::set_var("DXS_TEST_CONFIG", "/from/env.toml");
        let path = resolve_config_path(None, "DXS_TEST_CONFIG", "sample.toml");
        std::env::remove_var("DXS_TEST_CONFIG");

        assert_eq!(path, Some(PathBuf::from("/from/env.toml")));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded: Sample = load_toml_config(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(loaded, Sample::default());

        let loaded: Sample = load_toml_config(None).unwrap();
        assert_eq!(loaded, Sample::default());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.toml");
        let sample = Sample {
            name: "studio".to_string(),
            port: 5730,
        };

        write_toml_config(&sample, &path).unwrap();
        let loaded: Sample = load_toml_config(Some(&path)).unwrap();

        assert_eq!(loaded, sample);
        assert!(!path.with_extension("toml.tmp").exists());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let result: Result<Sample> = load_toml_config(Some(&path));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
