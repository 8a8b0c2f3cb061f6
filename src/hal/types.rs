// src/hal/types.rs
//! Core types for converter abstraction
//!
//! Variant-specific behaviour (rate table and conversion decoding) is selected by
//! [`DeviceVariant`] through pure functions instead of per-device types.

use crate::config::constants::ads111x::*;
use serde::{Deserialize, Serialize};

/// Converter family member wired to a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceVariant {
    /// 12-bit, 128..3300 SPS
    Ads1015,
    /// 16-bit single channel, 8..860 SPS
    Ads1114,
    /// 16-bit four channel, 8..860 SPS
    Ads1115,
}

/// Programmable gain amplifier setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gain {
    #[serde(rename = "2/3")]
    TwoThirds,
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "16")]
    Sixteen,
}

/// Conversion mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionMode {
    SingleShot,
    Continuous,
}

/// Data rate validated against a device variant's rate table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataRate {
    sps: u32,
    bits: u16,
}

impl Gain {
    /// Config register bits for this gain
    pub fn config_bits(self) -> u16 {
        match self {
            Gain::TwoThirds => 0x0000,
            Gain::One => 0x0200,
            Gain::Two => 0x0400,
            Gain::Four => 0x0600,
            Gain::Eight => 0x0800,
            Gain::Sixteen => 0x0A00,
        }
    }

    /// Full-scale input range in volts (±)
    pub fn full_scale_volts(self) -> f64 {
        match self {
            Gain::TwoThirds => 6.144,
            Gain::One => 4.096,
            Gain::Two => 2.048,
            Gain::Four => 1.024,
            Gain::Eight => 0.512,
            Gain::Sixteen => 0.256,
        }
    }
}

impl ConversionMode {
    pub fn config_bits(self) -> u16 {
        match self {
            ConversionMode::SingleShot => CONFIG_MODE_SINGLE,
            ConversionMode::Continuous => CONFIG_MODE_CONTINUOUS,
        }
    }
}

impl DataRate {
    /// Validate `sps` for `variant`
    pub fn new(variant: DeviceVariant, sps: u32) -> Option<Self> {
        data_rate_bits(variant, sps).map(|bits| Self { sps, bits })
    }

    pub fn sps(self) -> u32 {
        self.sps
    }

    pub fn config_bits(self) -> u16 {
        self.bits
    }
}

const ADS111X_RATES: [(u32, u16); 8] = [
    (8, 0x0000),
    (16, 0x0020),
    (32, 0x0040),
    (64, 0x0060),
    (128, 0x0080),
    (250, 0x00A0),
    (475, 0x00C0),
    (860, 0x00E0),
];

const ADS1015_RATES: [(u32, u16); 7] = [
    (128, 0x0000),
    (250, 0x0020),
    (490, 0x0040),
    (920, 0x0060),
    (1600, 0x0080),
    (2400, 0x00A0),
    (3300, 0x00C0),
];

fn rate_table(variant: DeviceVariant) -> &'static [(u32, u16)] {
    match variant {
        DeviceVariant::Ads1015 => &ADS1015_RATES,
        DeviceVariant::Ads1114 | DeviceVariant::Ads1115 => &ADS111X_RATES,
    }
}

/// Config register bits for `sps`, or `None` if the variant does not support it
pub fn data_rate_bits(variant: DeviceVariant, sps: u32) -> Option<u16> {
    rate_table(variant)
        .iter()
        .find(|(rate, _)| *rate == sps)
        .map(|(_, bits)| *bits)
}

/// Supported sample rates for a variant, ascending
pub fn supported_rates(variant: DeviceVariant) -> Vec<u32> {
    rate_table(variant).iter().map(|(rate, _)| *rate).collect()
}

/// Decode a big-endian conversion register into a signed sample
pub fn decode_conversion(variant: DeviceVariant, raw: [u8; 2]) -> i32 {
    let value = u16::from_be_bytes(raw);
    match variant {
        // 12-bit result, left justified
        DeviceVariant::Ads1015 => {
            let value = (value >> 4) as i32;
            if value & 0x800 != 0 {
                value - (1 << 12)
            } else {
                value
            }
        }
        DeviceVariant::Ads1114 | DeviceVariant::Ads1115 => value as i16 as i32,
    }
}

/// Assemble a config register word
pub fn config_word(gain: Gain, rate: DataRate, mode: ConversionMode) -> u16 {
    // mux 0: AIN0/AIN1 differential, the only input on single-channel parts
    let mux = 0u16 << CONFIG_MUX_OFFSET;
    mux | gain.config_bits() | mode.config_bits() | rate.config_bits() | CONFIG_COMP_QUE_DISABLE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_lookup_per_variant() {
        assert_eq!(data_rate_bits(DeviceVariant::Ads1114, 128), Some(0x0080));
        assert_eq!(data_rate_bits(DeviceVariant::Ads1115, 860), Some(0x00E0));
        assert_eq!(data_rate_bits(DeviceVariant::Ads1015, 128), Some(0x0000));
        assert_eq!(data_rate_bits(DeviceVariant::Ads1015, 3300), Some(0x00C0));
        assert_eq!(data_rate_bits(DeviceVariant::Ads1015, 8), None);
        assert_eq!(data_rate_bits(DeviceVariant::Ads1114, 100), None);
    }

    #[test]
    fn test_decode_sixteen_bit() {
        assert_eq!(decode_conversion(DeviceVariant::Ads1114, [0x7F, 0xFF]), 32767);
        assert_eq!(decode_conversion(DeviceVariant::Ads1114, [0x80, 0x00]), -32768);
        assert_eq!(decode_conversion(DeviceVariant::Ads1115, [0xFF, 0xFF]), -1);
    }

    #[test]
    fn test_decode_twelve_bit() {
        assert_eq!(decode_conversion(DeviceVariant::Ads1015, [0x7F, 0xF0]), 2047);
        assert_eq!(decode_conversion(DeviceVariant::Ads1015, [0x80, 0x00]), -2048);
        assert_eq!(decode_conversion(DeviceVariant::Ads1015, [0xFF, 0xF0]), -1);
    }

    #[test]
    fn test_config_word() {
        let rate = DataRate::new(DeviceVariant::Ads1114, 128).unwrap();
        let word = config_word(Gain::One, rate, ConversionMode::Continuous);
        assert_eq!(word, 0x0283);

        let word = config_word(Gain::Eight, rate, ConversionMode::SingleShot);
        assert_eq!(word & CONFIG_GAIN_MASK, 0x0800);
        assert_eq!(word & CONFIG_MODE_SINGLE, CONFIG_MODE_SINGLE);
    }
}
