// src/hal/ads111x.rs
//! ADS1x15-family converter driver over a register bus

use crate::config::constants::ads111x::*;
use crate::hal::traits::{BusError, Converter, RegisterBus};
use crate::hal::types::{config_word, decode_conversion, ConversionMode, DataRate, DeviceVariant, Gain};

/// One converter at a fixed bus address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ads111x {
    address: u8,
    variant: DeviceVariant,
}

impl Ads111x {
    pub fn new(address: u8, variant: DeviceVariant) -> Self {
        Self { address, variant }
    }
}

impl Converter for Ads111x {
    fn address(&self) -> u8 {
        self.address
    }

    fn variant(&self) -> DeviceVariant {
        self.variant
    }

    fn configure(
        &self,
        bus: &mut dyn RegisterBus,
        gain: Gain,
        rate: DataRate,
        mode: ConversionMode,
    ) -> Result<u16, BusError> {
        let config = config_word(gain, rate, mode);
        bus.write_register(self.address, POINTER_CONFIG, config)?;
        Ok(config)
    }

    fn read_config(&self, bus: &mut dyn RegisterBus) -> Result<u16, BusError> {
        bus.read_register(self.address, POINTER_CONFIG)
            .map(u16::from_be_bytes)
    }

    fn start(&self, bus: &mut dyn RegisterBus) -> Result<bool, BusError> {
        bus.write_register(self.address, POINTER_HIGH_THRESHOLD, READY_HIGH_THRESHOLD)?;
        bus.write_register(self.address, POINTER_LOW_THRESHOLD, READY_LOW_THRESHOLD)?;

        // Comparator queue 00 asserts ALERT/RDY after every conversion
        let config = self.read_config(bus)? & !CONFIG_COMP_QUE_MASK;
        bus.write_register(self.address, POINTER_CONFIG, config)?;

        let readback = self.read_config(bus)?;
        Ok(readback & CONFIG_READBACK_MASK == config & CONFIG_READBACK_MASK)
    }

    fn stop(&self, bus: &mut dyn RegisterBus) -> Result<(), BusError> {
        bus.write_register(self.address, POINTER_CONFIG, CONFIG_DEFAULT)
    }

    fn read_last_sample(&self, bus: &mut dyn RegisterBus) -> Result<i32, BusError> {
        let raw = bus.read_register(self.address, POINTER_CONVERSION)?;
        Ok(decode_conversion(self.variant, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Register file that echoes writes and sets the OS bit on config reads
    #[derive(Default)]
    struct EchoBus {
        registers: HashMap<(u8, u8), u16>,
        writes: Vec<(u8, u8, u16)>,
    }

    impl RegisterBus for EchoBus {
        fn write_register(&mut self, address: u8, pointer: u8, value: u16) -> Result<(), BusError> {
            self.writes.push((address, pointer, value));
            self.registers.insert((address, pointer), value);
            Ok(())
        }

        fn read_register(&mut self, address: u8, pointer: u8) -> Result<[u8; 2], BusError> {
            let mut value = *self.registers.get(&(address, pointer)).unwrap_or(&0);
            if pointer == POINTER_CONFIG {
                value |= CONFIG_OS_SINGLE;
            }
            Ok(value.to_be_bytes())
        }
    }

    #[test]
    fn test_presence_fingerprint() {
        let mut bus = EchoBus::default();
        let adc = Ads111x::new(0x4a, DeviceVariant::Ads1114);

        assert!(adc.check_presence(&mut bus).unwrap());
        assert_eq!(bus.writes, vec![(0x4a, POINTER_CONFIG, CONFIG_DEFAULT)]);
    }

    #[test]
    fn test_configure_then_start_clears_comparator_queue() {
        let mut bus = EchoBus::default();
        let adc = Ads111x::new(0x48, DeviceVariant::Ads1114);
        let rate = DataRate::new(DeviceVariant::Ads1114, 128).unwrap();

        let written = adc.configure(&mut bus, Gain::Eight, rate, ConversionMode::Continuous).unwrap();
        assert_eq!(written & CONFIG_RATE_MASK, 0x0080);
        assert_eq!(written & CONFIG_GAIN_MASK, 0x0800);

        assert!(adc.start(&mut bus).unwrap());
        let config = adc.read_config(&mut bus).unwrap();
        assert_eq!(config & CONFIG_COMP_QUE_MASK, 0);
        assert_eq!(bus.registers[&(0x48, POINTER_HIGH_THRESHOLD)], READY_HIGH_THRESHOLD);
    }

    #[test]
    fn test_read_last_sample_decodes_variant() {
        let mut bus = EchoBus::default();
        bus.registers.insert((0x49, POINTER_CONVERSION), 0xFFF0);

        let ads1114 = Ads111x::new(0x49, DeviceVariant::Ads1114);
        assert_eq!(ads1114.read_last_sample(&mut bus).unwrap(), -16);

        let ads1015 = Ads111x::new(0x49, DeviceVariant::Ads1015);
        assert_eq!(ads1015.read_last_sample(&mut bus).unwrap(), -1);
    }
}
