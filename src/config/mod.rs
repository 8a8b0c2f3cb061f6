// src/config/mod.rs
//! Recorder configuration

pub mod constants;
pub mod loader;

pub use constants::*;
pub use loader::{ConfigError, ConfigLoader};

use crate::hal::{data_rate_bits, DeviceVariant, Gain};
use crate::storage::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Complete recorder configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RecorderConfig {
    #[serde(default)]
    pub station: StationSettings,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default = "defaults::channels")]
    pub channels: Vec<ChannelConfig>,
}

/// Station identification written into every output file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StationSettings {
    #[serde(default = "defaults::network")]
    pub network: String,

    #[serde(default = "defaults::station")]
    pub station: String,

    #[serde(default = "defaults::location")]
    pub location: String,
}

/// Cadence and window acceptance policy
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionSettings {
    /// Global output rate every channel is resampled to
    #[serde(default = "defaults::output_rate_hz")]
    pub output_rate_hz: u32,

    /// Accepted cycles between flushes
    #[serde(default = "defaults::flush_interval_s")]
    pub flush_interval_s: u32,

    /// Accepted deviation of a window's sample count from the channel rate
    #[serde(default = "defaults::count_tolerance")]
    pub count_tolerance: usize,

    /// Hand-off queue capacity, in seconds of samples
    #[serde(default = "defaults::queue_seconds")]
    pub queue_seconds: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageSettings {
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "defaults::record_length")]
    pub record_length: usize,

    #[serde(default = "defaults::encoding")]
    pub encoding: Encoding,

    /// Cap on pending seconds per channel while writes keep failing
    #[serde(default = "defaults::max_retained_seconds")]
    pub max_retained_seconds: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct HealthSettings {
    #[serde(default = "defaults::health_enabled")]
    pub enabled: bool,

    #[serde(default = "defaults::check_interval_s")]
    pub check_interval_s: u64,

    #[serde(default = "defaults::ntpq_command")]
    pub ntpq_command: String,
}

/// One converter channel
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ChannelConfig {
    /// SEED channel code, also used as the channel's display name
    pub name: String,

    pub i2c_address: u8,

    /// Host pin wired to the converter's ALERT/RDY output
    pub ready_pin: u8,

    #[serde(default = "defaults::gain")]
    pub gain: Gain,

    #[serde(default = "defaults::data_rate_sps")]
    pub data_rate_sps: u32,

    #[serde(default = "defaults::variant")]
    pub variant: DeviceVariant,

    #[serde(default = "defaults::enabled")]
    pub enabled: bool,
}

/// Default value providers using constants
mod defaults {
    use super::ChannelConfig;
    use crate::config::constants::*;
    use crate::hal::{DeviceVariant, Gain};
    use crate::storage::Encoding;
    use std::path::PathBuf;

    pub fn network() -> String { station::DEFAULT_NETWORK.to_string() }
    pub fn station() -> String { station::DEFAULT_STATION.to_string() }
    pub fn location() -> String { station::DEFAULT_LOCATION.to_string() }

    pub fn output_rate_hz() -> u32 { acquisition::DEFAULT_OUTPUT_RATE_HZ }
    pub fn flush_interval_s() -> u32 { acquisition::DEFAULT_FLUSH_INTERVAL_S }
    pub fn count_tolerance() -> usize { acquisition::DEFAULT_COUNT_TOLERANCE }
    pub fn queue_seconds() -> u32 { acquisition::DEFAULT_QUEUE_SECONDS }

    pub fn output_dir() -> PathBuf { PathBuf::from(storage::DEFAULT_OUTPUT_DIR) }
    pub fn record_length() -> usize { storage::DEFAULT_RECORD_LENGTH }
    pub fn encoding() -> Encoding { Encoding::Steim1 }
    pub fn max_retained_seconds() -> usize { storage::DEFAULT_MAX_RETAINED_SECONDS }

    pub fn health_enabled() -> bool { true }
    pub fn check_interval_s() -> u64 { health::DEFAULT_CHECK_INTERVAL_S }
    pub fn ntpq_command() -> String { health::NTPQ_COMMAND.to_string() }

    pub fn gain() -> Gain { Gain::One }
    pub fn data_rate_sps() -> u32 { hardware::DEFAULT_DATA_RATE_SPS }
    pub fn variant() -> DeviceVariant { DeviceVariant::Ads1114 }
    pub fn enabled() -> bool { true }

    pub fn channels() -> Vec<ChannelConfig> {
        [("001", 0x4a, 22), ("002", 0x49, 27), ("003", 0x48, 17)]
            .into_iter()
            .map(|(name, i2c_address, ready_pin)| ChannelConfig {
                name: name.to_string(),
                i2c_address,
                ready_pin,
                gain: gain(),
                data_rate_sps: data_rate_sps(),
                variant: variant(),
                enabled: enabled(),
            })
            .collect()
    }
}

impl Default for StationSettings {
    fn default() -> Self {
        Self {
            network: defaults::network(),
            station: defaults::station(),
            location: defaults::location(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            output_rate_hz: defaults::output_rate_hz(),
            flush_interval_s: defaults::flush_interval_s(),
            count_tolerance: defaults::count_tolerance(),
            queue_seconds: defaults::queue_seconds(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: defaults::output_dir(),
            record_length: defaults::record_length(),
            encoding: defaults::encoding(),
            max_retained_seconds: defaults::max_retained_seconds(),
        }
    }
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            enabled: defaults::health_enabled(),
            check_interval_s: defaults::check_interval_s(),
            ntpq_command: defaults::ntpq_command(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            station: StationSettings::default(),
            acquisition: AcquisitionSettings::default(),
            storage: StorageSettings::default(),
            health: HealthSettings::default(),
            channels: defaults::channels(),
        }
    }
}

impl ChannelConfig {
    pub fn new(name: &str, i2c_address: u8, ready_pin: u8) -> Self {
        Self {
            name: name.to_string(),
            i2c_address,
            ready_pin,
            gain: defaults::gain(),
            data_rate_sps: defaults::data_rate_sps(),
            variant: defaults::variant(),
            enabled: defaults::enabled(),
        }
    }
}

impl RecorderConfig {
    /// Channels that take part in acquisition
    pub fn enabled_channels(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter().filter(|channel| channel.enabled)
    }

    /// Check field ranges and cross-field consistency
    ///
    /// The converter and pin budget is enforced separately by the supervisor,
    /// which reports it as resource exhaustion.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        let codes = [
            ("network", &self.station.network, station::MAX_NETWORK_LEN),
            ("station", &self.station.station, station::MAX_STATION_LEN),
            ("location", &self.station.location, station::MAX_LOCATION_LEN),
        ];
        for (field, value, max_len) in codes {
            if value.len() > max_len || !value.is_ascii() {
                errors.push(format!("station.{} '{}' must be at most {} ASCII characters", field, value, max_len));
            }
        }

        let output_rate = self.acquisition.output_rate_hz;
        if output_rate == 0 || output_rate > acquisition::MAX_OUTPUT_RATE_HZ {
            errors.push(format!(
                "acquisition.output_rate_hz {} must be in 1..={}",
                output_rate,
                acquisition::MAX_OUTPUT_RATE_HZ
            ));
        }
        if self.acquisition.flush_interval_s == 0 {
            errors.push("acquisition.flush_interval_s must be greater than 0".to_string());
        }
        if self.acquisition.queue_seconds == 0 {
            errors.push("acquisition.queue_seconds must be greater than 0".to_string());
        }

        let record_length = self.storage.record_length;
        if !record_length.is_power_of_two()
            || !(storage::MIN_RECORD_LENGTH..=storage::MAX_RECORD_LENGTH).contains(&record_length)
        {
            errors.push(format!(
                "storage.record_length {} must be a power of two in {}..={}",
                record_length,
                storage::MIN_RECORD_LENGTH,
                storage::MAX_RECORD_LENGTH
            ));
        }
        if self.health.check_interval_s == 0 {
            errors.push("health.check_interval_s must be greater than 0".to_string());
        }

        let mut names = HashSet::new();
        for channel in &self.channels {
            if channel.name.is_empty() || channel.name.len() > station::MAX_CHANNEL_LEN || !channel.name.is_ascii() {
                errors.push(format!(
                    "channel name '{}' must be 1..={} ASCII characters",
                    channel.name,
                    station::MAX_CHANNEL_LEN
                ));
            }
            if !names.insert(channel.name.as_str()) {
                errors.push(format!("channel name '{}' is used more than once", channel.name));
            }
            if !(hardware::MIN_I2C_ADDRESS..=hardware::MAX_I2C_ADDRESS).contains(&channel.i2c_address) {
                errors.push(format!(
                    "channel {} address 0x{:02x} outside 0x{:02x}..=0x{:02x}",
                    channel.name,
                    channel.i2c_address,
                    hardware::MIN_I2C_ADDRESS,
                    hardware::MAX_I2C_ADDRESS
                ));
            }
            if data_rate_bits(channel.variant, channel.data_rate_sps).is_none() {
                errors.push(format!(
                    "channel {} rate {} SPS is not supported by {:?}",
                    channel.name, channel.data_rate_sps, channel.variant
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Get configuration summary
    pub fn summary(&self) -> ConfigSummary {
        ConfigSummary {
            stream_prefix: format!(
                "{}.{}.{}",
                self.station.network, self.station.station, self.station.location
            ),
            enabled_channels: self.enabled_channels().map(|c| c.name.clone()).collect(),
            output_rate_hz: self.acquisition.output_rate_hz,
            flush_interval_s: self.acquisition.flush_interval_s,
            output_dir: self.storage.output_dir.clone(),
        }
    }
}

/// Configuration summary for display/logging
#[derive(Debug, Clone, Serialize)]
pub struct ConfigSummary {
    pub stream_prefix: String,
    pub enabled_channels: Vec<String>,
    pub output_rate_hz: u32,
    pub flush_interval_s: u32,
    pub output_dir: PathBuf,
}
