// src/config/loader.rs
//! Layered configuration loader
//!
//! Built-in defaults are overlaid with each existing configuration file in order,
//! then with `MSS_<SECTION>_<KEY>` environment variables, and the result is
//! validated before it is handed out.

use crate::config::{constants::paths, RecorderConfig};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Configuration loading errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),
    #[error("configuration parse error: {0}")]
    Parse(String),
    #[error("configuration validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::Io(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Loads [`RecorderConfig`] from defaults, files and the environment
pub struct ConfigLoader {
    config_paths: Vec<PathBuf>,
    explicit_path: Option<PathBuf>,
    env_prefix: String,
}

impl ConfigLoader {
    /// Loader over the standard system and working-directory locations
    pub fn new() -> Self {
        Self::with_paths(Self::discover_config_paths())
    }

    /// Loader over custom optional paths, later paths taking precedence
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        Self {
            config_paths: paths,
            explicit_path: None,
            env_prefix: paths::ENV_PREFIX.to_string(),
        }
    }

    /// Add a file that must exist; it takes precedence over every other file
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }

    /// Load, merge and validate
    pub fn load(&self) -> Result<RecorderConfig, ConfigError> {
        let mut merged = toml::Value::try_from(RecorderConfig::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        for path in &self.config_paths {
            if !path.exists() {
                continue;
            }
            debug!(path = %path.display(), "merging configuration file");
            merge_toml_values(&mut merged, load_config_file(path)?);
        }

        if let Some(path) = &self.explicit_path {
            info!(path = %path.display(), "loading configuration file");
            merge_toml_values(&mut merged, load_config_file(path)?);
        }

        self.apply_environment_overrides(&mut merged);

        let config: RecorderConfig = merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse(format!("failed to deserialize config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a single file layered over the defaults
    pub fn validate_config_file<P: AsRef<Path>>(&self, path: P) -> Result<RecorderConfig, ConfigError> {
        ConfigLoader::with_paths(Vec::new()).with_file(path.as_ref()).load()
    }

    /// Write a configuration as TOML
    pub fn export_config<P: AsRef<Path>>(config: &RecorderConfig, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_environment_overrides(&self, config: &mut toml::Value) {
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix(&self.env_prefix) else {
                continue;
            };
            let rest = rest.to_lowercase();
            // Section names carry no underscore, keys may
            let Some((section, field)) = rest.split_once('_') else {
                continue;
            };

            let Some(toml::Value::Table(table)) = config.get_mut(section) else {
                debug!(variable = %key, "ignoring override for unknown section");
                continue;
            };
            debug!(variable = %key, "applying environment override");
            // Keep string fields as strings, e.g. location "00"
            let parsed = match table.get(field) {
                Some(toml::Value::String(_)) => toml::Value::String(value),
                _ => parse_env_value(&value),
            };
            table.insert(field.to_string(), parsed);
        }
    }

    fn discover_config_paths() -> Vec<PathBuf> {
        vec![
            PathBuf::from(paths::SYSTEM_CONFIG_PATH),
            PathBuf::from(paths::LOCAL_CONFIG_FILE),
        ]
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn load_config_file(path: &Path) -> Result<toml::Value, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Tables merge key by key; everything else, arrays included, is replaced
fn merge_toml_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                if let Some(base_value) = base_table.get_mut(&key) {
                    merge_toml_values(base_value, value);
                } else {
                    base_table.insert(key, value);
                }
            }
        }
        (base_value, overlay_value) => {
            *base_value = overlay_value;
        }
    }
}

fn parse_env_value(value: &str) -> toml::Value {
    if let Ok(int_val) = value.parse::<i64>() {
        toml::Value::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        toml::Value::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        toml::Value::Boolean(bool_val)
    } else {
        toml::Value::String(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_config_loader_creation() {
        let loader = ConfigLoader::new();
        assert_eq!(loader.config_paths().len(), 2);
    }

    #[test]
    #[serial]
    fn test_load_default_config() {
        let config = ConfigLoader::with_paths(Vec::new()).load().unwrap();
        assert_eq!(config, RecorderConfig::default());
    }

    #[test]
    #[serial]
    fn test_later_files_take_precedence() {
        let system = write_config(
            r#"
[station]
network = "AM"
station = "R1234"

[acquisition]
flush_interval_s = 30
"#,
        );
        let local = write_config(
            r#"
[acquisition]
flush_interval_s = 60
"#,
        );

        let config = ConfigLoader::with_paths(vec![system.path().to_path_buf(), local.path().to_path_buf()])
            .load()
            .unwrap();

        assert_eq!(config.station.network, "AM");
        assert_eq!(config.station.station, "R1234");
        assert_eq!(config.station.location, "00");
        assert_eq!(config.acquisition.flush_interval_s, 60);
        assert_eq!(config.acquisition.output_rate_hz, 100);
    }

    #[test]
    #[serial]
    fn test_channel_array_replaces_defaults() {
        let file = write_config(
            r#"
[[channels]]
name = "EHZ"
i2c_address = 0x4b
ready_pin = 5
"#,
        );

        let config = ConfigLoader::with_paths(Vec::new()).with_file(file.path()).load().unwrap();
        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].name, "EHZ");
    }

    #[test]
    fn test_missing_explicit_file() {
        let result = ConfigLoader::with_paths(Vec::new())
            .with_file("/nonexistent/mss_record.toml")
            .load();
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    #[serial]
    fn test_invalid_config_validation() {
        let file = write_config(
            r#"
[storage]
record_length = 100
"#,
        );

        let loader = ConfigLoader::with_paths(Vec::new());
        assert!(matches!(
            loader.validate_config_file(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    #[serial]
    fn test_parse_error() {
        let file = write_config("[acquisition\noutput_rate_hz = ");
        let loader = ConfigLoader::with_paths(Vec::new());
        assert!(matches!(loader.validate_config_file(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        unsafe {
            std::env::set_var("MSS_ACQUISITION_OUTPUT_RATE_HZ", "50");
            std::env::set_var("MSS_STATION_STATION", "TEST1");
        }

        let config = ConfigLoader::with_paths(Vec::new()).load().unwrap();

        unsafe {
            std::env::remove_var("MSS_ACQUISITION_OUTPUT_RATE_HZ");
            std::env::remove_var("MSS_STATION_STATION");
        }

        assert_eq!(config.acquisition.output_rate_hz, 50);
        assert_eq!(config.station.station, "TEST1");
    }

    #[test]
    #[serial]
    fn test_config_export() {
        let temp_file = NamedTempFile::new().unwrap();
        let mut config = RecorderConfig::default();
        config.station.station = "EXPRT".to_string();

        ConfigLoader::export_config(&config, temp_file.path()).unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.contains("[station]"));

        let reloaded = ConfigLoader::with_paths(Vec::new()).with_file(temp_file.path()).load().unwrap();
        assert_eq!(reloaded, config);
    }
}
