// src/hal/simulator.rs
//! Simulated converter bus and board
//!
//! [`SimulatedBus`] models the ADS1x15 register file at each configured address.
//! [`SimulatedBoard`] plays the role of the converters' conversion clocks: for
//! every device streaming in continuous mode with its ready pin enabled, it
//! updates the conversion register and fires the mapped data-ready edge.

use crate::config::constants::ads111x::*;
use crate::hal::edge::SoftwareEdges;
use crate::hal::traits::{BusError, RegisterBus};
use crate::hal::types::{data_rate_bits, supported_rates, DeviceVariant};
use crate::utils::cancel::CancellationToken;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Register state of one simulated converter
#[derive(Debug, Clone)]
struct SimulatedAdc {
    variant: DeviceVariant,
    config: u16,
    low_threshold: u16,
    high_threshold: u16,
    conversion: u16,
}

impl SimulatedAdc {
    fn new(variant: DeviceVariant) -> Self {
        Self {
            variant,
            config: CONFIG_DEFAULT,
            low_threshold: 0x8000,
            high_threshold: 0x7FFF,
            conversion: 0,
        }
    }

    fn streaming_rate(&self) -> Option<u32> {
        let continuous = self.config & CONFIG_MODE_SINGLE == 0;
        let ready_pin = self.config & CONFIG_COMP_QUE_MASK == 0
            && self.high_threshold & 0x8000 != 0
            && self.low_threshold & 0x8000 == 0;
        if !(continuous && ready_pin) {
            return None;
        }
        let bits = self.config & CONFIG_RATE_MASK;
        supported_rates(self.variant)
            .into_iter()
            .find(|rate| data_rate_bits(self.variant, *rate) == Some(bits))
    }

    fn encode(&self, value: i32) -> u16 {
        match self.variant {
            DeviceVariant::Ads1015 => ((value.clamp(-2048, 2047) as i16 as u16) << 4) & 0xFFF0,
            DeviceVariant::Ads1114 | DeviceVariant::Ads1115 => {
                value.clamp(i16::MIN as i32, i16::MAX as i32) as i16 as u16
            }
        }
    }
}

/// Shared simulated bus; clones address the same devices
#[derive(Clone, Default)]
pub struct SimulatedBus {
    devices: Arc<Mutex<HashMap<u8, SimulatedAdc>>>,
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, address: u8, variant: DeviceVariant) -> Self {
        self.add_device(address, variant);
        self
    }

    pub fn add_device(&self, address: u8, variant: DeviceVariant) {
        self.devices.lock().insert(address, SimulatedAdc::new(variant));
    }

    /// Detach a device; subsequent transfers to it fail
    pub fn remove_device(&self, address: u8) {
        self.devices.lock().remove(&address);
    }

    /// Latch a new conversion result
    pub fn set_conversion(&self, address: u8, value: i32) {
        if let Some(adc) = self.devices.lock().get_mut(&address) {
            adc.conversion = adc.encode(value);
        }
    }

    /// Data rate if the device is converting continuously with ready pin enabled
    pub fn streaming_rate(&self, address: u8) -> Option<u32> {
        self.devices.lock().get(&address).and_then(SimulatedAdc::streaming_rate)
    }
}

impl RegisterBus for SimulatedBus {
    fn write_register(&mut self, address: u8, pointer: u8, value: u16) -> Result<(), BusError> {
        let mut devices = self.devices.lock();
        let adc = devices.get_mut(&address).ok_or(BusError::Nack { address })?;
        match pointer {
            POINTER_CONFIG => adc.config = value & !CONFIG_OS_SINGLE,
            POINTER_LOW_THRESHOLD => adc.low_threshold = value,
            POINTER_HIGH_THRESHOLD => adc.high_threshold = value,
            POINTER_CONVERSION => {}
            other => {
                return Err(BusError::Transfer {
                    address,
                    reason: format!("invalid register pointer {}", other),
                })
            }
        }
        Ok(())
    }

    fn read_register(&mut self, address: u8, pointer: u8) -> Result<[u8; 2], BusError> {
        let devices = self.devices.lock();
        let adc = devices.get(&address).ok_or(BusError::Nack { address })?;
        let value = match pointer {
            // OS bit reads 1 while no single-shot conversion is pending
            POINTER_CONFIG => adc.config | CONFIG_OS_SINGLE,
            POINTER_LOW_THRESHOLD => adc.low_threshold,
            POINTER_HIGH_THRESHOLD => adc.high_threshold,
            POINTER_CONVERSION => adc.conversion,
            other => {
                return Err(BusError::Transfer {
                    address,
                    reason: format!("invalid register pointer {}", other),
                })
            }
        };
        Ok(value.to_be_bytes())
    }
}

/// Waveform produced by the simulated sensors
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignalConfig {
    /// Peak amplitude in counts
    pub amplitude: f64,
    pub frequency_hz: f64,
    /// Uniform noise amplitude in counts
    pub noise: f64,
    /// Conversion period jitter as a fraction of the period
    pub jitter_fraction: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            amplitude: 2000.0,
            frequency_hz: 1.0,
            noise: 20.0,
            jitter_fraction: 0.02,
        }
    }
}

/// Converter address and the pin its ready signal is wired to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardChannel {
    pub address: u8,
    pub ready_pin: u8,
}

/// Conversion clocks for every simulated converter
pub struct SimulatedBoard {
    bus: SimulatedBus,
    edges: SoftwareEdges,
    channels: Vec<BoardChannel>,
    signal: SignalConfig,
}

impl SimulatedBoard {
    pub fn new(bus: SimulatedBus, edges: SoftwareEdges, channels: Vec<BoardChannel>) -> Self {
        Self {
            bus,
            edges,
            channels,
            signal: SignalConfig::default(),
        }
    }

    pub fn with_signal(mut self, signal: SignalConfig) -> Self {
        self.signal = signal;
        self
    }

    /// Run the board on its own thread until `cancel` fires
    pub fn spawn(self, cancel: CancellationToken) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("simulated-board".to_string())
            .spawn(move || self.run(&cancel))
    }

    fn run(&self, cancel: &CancellationToken) {
        info!(channels = self.channels.len(), "simulated board running");
        let origin = Instant::now();
        let mut rng = rand::thread_rng();
        let mut next_due: Vec<Option<Instant>> = vec![None; self.channels.len()];

        while !cancel.is_cancelled() {
            let now = Instant::now();
            let mut wake_at = now + Duration::from_millis(5);

            for (channel, due) in self.channels.iter().zip(next_due.iter_mut()) {
                let Some(rate) = self.bus.streaming_rate(channel.address) else {
                    *due = None;
                    continue;
                };
                let period = Duration::from_secs_f64(1.0 / rate as f64);
                let scheduled = due.get_or_insert(now + period);

                if now >= *scheduled {
                    let t = now.duration_since(origin).as_secs_f64();
                    let value = self.signal.amplitude * (2.0 * PI * self.signal.frequency_hz * t).sin()
                        + rng.gen_range(-1.0..=1.0) * self.signal.noise;
                    self.bus.set_conversion(channel.address, value.round() as i32);
                    self.edges.fire(channel.ready_pin);

                    let jitter = rng.gen_range(-1.0..=1.0) * self.signal.jitter_fraction;
                    *scheduled += period.mul_f64(1.0 + jitter);
                    // Fell behind: resynchronize instead of bursting
                    if *scheduled + period * 4 < now {
                        debug!(address = channel.address, "simulated conversion clock resynchronized");
                        *scheduled = now + period;
                    }
                }
                wake_at = wake_at.min(*scheduled);
            }

            let now = Instant::now();
            if wake_at > now {
                thread::sleep(wake_at - now);
            }
        }
        info!("simulated board stopped");
    }
}
