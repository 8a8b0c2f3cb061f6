// src/hal/tests.rs
//! Unit tests for HAL components

use crate::hal::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_gain_serialization() {
    let json = serde_json::to_string(&Gain::TwoThirds).expect("Failed to serialize");
    assert_eq!(json, "\"2/3\"");

    let gain: Gain = serde_json::from_str("\"16\"").expect("Failed to deserialize");
    assert_eq!(gain, Gain::Sixteen);
}

#[test]
fn test_device_variant_serialization() {
    let variant = DeviceVariant::Ads1115;
    let json = serde_json::to_string(&variant).expect("Failed to serialize");
    assert_eq!(json, "\"ads1115\"");

    let deserialized: DeviceVariant = serde_json::from_str(&json).expect("Failed to deserialize");
    assert_eq!(variant, deserialized);
}

#[test]
fn test_conversion_mode_serialization() {
    let mode: ConversionMode = serde_json::from_str("\"single_shot\"").expect("Failed to deserialize");
    assert_eq!(mode, ConversionMode::SingleShot);
}

#[test]
fn test_shared_bus_serializes_transactions() {
    #[derive(Default)]
    struct CountingBus {
        writes: usize,
    }

    impl RegisterBus for CountingBus {
        fn write_register(&mut self, _address: u8, _pointer: u8, _value: u16) -> Result<(), BusError> {
            self.writes += 1;
            Ok(())
        }

        fn read_register(&mut self, _address: u8, _pointer: u8) -> Result<[u8; 2], BusError> {
            Ok([0, 0])
        }
    }

    let bus = SharedBus::new(CountingBus::default());
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let bus = bus.clone();
            let in_flight = in_flight.clone();
            let overlaps = overlaps.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    bus.transaction(|bus| {
                        if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlaps.fetch_add(1, Ordering::SeqCst);
                        }
                        let _ = bus.write_register(0x48, 1, 0);
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_converter_as_trait_object() {
    let converter: Arc<dyn Converter> = Arc::new(Ads111x::new(0x4b, DeviceVariant::Ads1015));
    assert_eq!(converter.address(), 0x4b);
    assert_eq!(converter.variant(), DeviceVariant::Ads1015);
}
