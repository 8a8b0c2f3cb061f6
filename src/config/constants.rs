// src/config/constants.rs
//! System-wide configuration constants

/// ADS111x register map and config word fields
pub mod ads111x {
    pub const POINTER_CONVERSION: u8 = 0x00;
    pub const POINTER_CONFIG: u8 = 0x01;
    pub const POINTER_LOW_THRESHOLD: u8 = 0x02;
    pub const POINTER_HIGH_THRESHOLD: u8 = 0x03;

    pub const CONFIG_OS_SINGLE: u16 = 0x8000;
    pub const CONFIG_MUX_OFFSET: u16 = 12;
    /// Reset value written to stop conversions
    pub const CONFIG_DEFAULT: u16 = 0x0583;
    /// Reset value as read back from an idle device
    pub const CONFIG_DEFAULT_IDLE: u16 = CONFIG_DEFAULT | CONFIG_OS_SINGLE;

    pub const CONFIG_MODE_CONTINUOUS: u16 = 0x0000;
    pub const CONFIG_MODE_SINGLE: u16 = 0x0100;
    pub const CONFIG_COMP_QUE_DISABLE: u16 = 0x0003;

    pub const CONFIG_GAIN_MASK: u16 = 0x0E00;
    pub const CONFIG_RATE_MASK: u16 = 0x00E0;
    pub const CONFIG_COMP_QUE_MASK: u16 = 0x0003;
    /// Bits compared when verifying the ready-pin configuration
    pub const CONFIG_READBACK_MASK: u16 = 0x7FFF;

    /// Threshold values that turn the ALERT pin into a conversion-ready signal
    pub const READY_HIGH_THRESHOLD: u16 = 0x8000;
    pub const READY_LOW_THRESHOLD: u16 = 0x0000;
}

/// Channel and bus budget
pub mod hardware {
    /// ADS111x address pin allows 0x48..=0x4B
    pub const MAX_CONVERTERS: usize = 4;
    pub const MIN_I2C_ADDRESS: u8 = 0x48;
    pub const MAX_I2C_ADDRESS: u8 = 0x4B;
    pub const DEFAULT_DATA_RATE_SPS: u32 = 128;
}

/// Station identification defaults
pub mod station {
    pub const DEFAULT_NETWORK: &str = "XX";
    pub const DEFAULT_STATION: &str = "MSSNN";
    pub const DEFAULT_LOCATION: &str = "00";
    pub const MAX_NETWORK_LEN: usize = 2;
    pub const MAX_STATION_LEN: usize = 5;
    pub const MAX_LOCATION_LEN: usize = 2;
    pub const MAX_CHANNEL_LEN: usize = 3;
}

/// Acquisition cadence and window policy
pub mod acquisition {
    pub const DEFAULT_OUTPUT_RATE_HZ: u32 = 100;
    /// Highest rate the record header sample-rate factor can carry
    pub const MAX_OUTPUT_RATE_HZ: u32 = i16::MAX as u32;
    pub const DEFAULT_FLUSH_INTERVAL_S: u32 = 10;
    pub const DEFAULT_COUNT_TOLERANCE: usize = 10;
    /// Hand-off queue capacity in seconds of samples at the channel rate
    pub const DEFAULT_QUEUE_SECONDS: u32 = 4;
    /// Continuity anchor is only reused if it lies within this many sample periods
    pub const ANCHOR_LOOKBACK_PERIODS: u64 = 2;
    /// Wake-ups this far past the boundary are reported as late
    pub const LATE_THRESHOLD_NS: u64 = 250_000_000;
    /// Longest a window pull waits for edge handlers that stamped but have not queued yet
    pub const HANDLER_SETTLE_TIMEOUT_MS: u64 = 100;
}

/// Storage defaults
pub mod storage {
    pub const DEFAULT_OUTPUT_DIR: &str = "/home/mss/mseed";
    pub const DEFAULT_RECORD_LENGTH: usize = 512;
    pub const MIN_RECORD_LENGTH: usize = 256;
    pub const MAX_RECORD_LENGTH: usize = 4096;
    pub const DEFAULT_MAX_RETAINED_SECONDS: usize = 600;
    pub const FILE_EXTENSION: &str = "msd";
}

/// Health monitor defaults
pub mod health {
    pub const DEFAULT_CHECK_INTERVAL_S: u64 = 10;
    pub const NTPQ_COMMAND: &str = "ntpq";
}

/// Configuration file locations
pub mod paths {
    pub const SYSTEM_CONFIG_PATH: &str = "/etc/mss_record/config.toml";
    pub const LOCAL_CONFIG_FILE: &str = "mss_record.toml";
    pub const ENV_PREFIX: &str = "MSS_";
}
