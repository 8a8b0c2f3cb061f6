// src/hal/traits.rs
//! Core HAL traits for converter and edge abstraction

use crate::config::constants::ads111x::CONFIG_DEFAULT_IDLE;
use crate::hal::types::{ConversionMode, DataRate, DeviceVariant, Gain};
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Bus I/O failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no acknowledge from device at 0x{address:02x}")]
    Nack { address: u8 },
    #[error("bus transfer to 0x{address:02x} failed: {reason}")]
    Transfer { address: u8, reason: String },
}

impl BusError {
    /// Address of the device the transfer was aimed at
    pub fn address(&self) -> u8 {
        match self {
            BusError::Nack { address } | BusError::Transfer { address, .. } => *address,
        }
    }
}

/// Edge subscription failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EdgeError {
    #[error("pin {0} is not available for edge detection")]
    PinUnavailable(u8),
}

/// Register-level access to a shared serial bus
pub trait RegisterBus: Send {
    /// Write a 16-bit register, most significant byte first
    fn write_register(&mut self, address: u8, pointer: u8, value: u16) -> Result<(), BusError>;

    /// Read a 16-bit register as it appears on the wire
    fn read_register(&mut self, address: u8, pointer: u8) -> Result<[u8; 2], BusError>;
}

/// The converter bus shared by all channels
///
/// Every operation that performs bus I/O runs inside [`SharedBus::transaction`],
/// which serializes access across channels.
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Mutex<Box<dyn RegisterBus>>>,
}

impl SharedBus {
    pub fn new(bus: impl RegisterBus + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Box::new(bus))),
        }
    }

    /// Run `f` with exclusive access to the bus
    pub fn transaction<R>(&self, f: impl FnOnce(&mut dyn RegisterBus) -> R) -> R {
        let mut bus = self.inner.lock();
        f(bus.as_mut())
    }
}

/// Converter capability contract consumed by a sample source
pub trait Converter: Send + Sync {
    fn address(&self) -> u8;

    fn variant(&self) -> DeviceVariant;

    /// Write the configuration register. Returns the word written.
    fn configure(
        &self,
        bus: &mut dyn RegisterBus,
        gain: Gain,
        rate: DataRate,
        mode: ConversionMode,
    ) -> Result<u16, BusError>;

    /// Read the configuration register
    fn read_config(&self, bus: &mut dyn RegisterBus) -> Result<u16, BusError>;

    /// Enable the data-ready signal. Returns whether the readback verified.
    fn start(&self, bus: &mut dyn RegisterBus) -> Result<bool, BusError>;

    /// Stop conversions by restoring the reset configuration
    fn stop(&self, bus: &mut dyn RegisterBus) -> Result<(), BusError>;

    /// Read the most recent conversion result
    fn read_last_sample(&self, bus: &mut dyn RegisterBus) -> Result<i32, BusError>;

    /// Stop, read back, and compare against the idle reset fingerprint
    fn check_presence(&self, bus: &mut dyn RegisterBus) -> Result<bool, BusError> {
        self.stop(bus)?;
        Ok(self.read_config(bus)? == CONFIG_DEFAULT_IDLE)
    }
}

/// Callback fired on a rising data-ready edge
pub type EdgeHandler = Arc<dyn Fn() + Send + Sync>;

/// Host edge-detection subsystem
pub trait EdgeSource: Send + Sync {
    /// Register `handler` for rising edges on `pin`, replacing any previous one
    fn subscribe(&self, pin: u8, handler: EdgeHandler) -> Result<(), EdgeError>;

    /// Remove the handler for `pin`. No handler invocation starts after return.
    fn unsubscribe(&self, pin: u8);
}
