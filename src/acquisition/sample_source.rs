// src/acquisition/sample_source.rs
//! Interrupt-driven capture for one converter channel
//!
//! The edge handler installed by [`SampleSource::start`] timestamps first, reads
//! the conversion register under the shared bus lock, and pushes the sample into
//! the hand-off queue. It never logs and never blocks on anything but the bus.
//! [`SampleSource::get_window`] waits for handlers that are between their
//! timestamp and their push, then drains the queue into the channel's own buffer
//! under the channel lock and cuts one window out of it.

use crate::acquisition::handoff::{handoff, HandoffConsumer, HandoffProducer};
use crate::acquisition::sample::{ChannelBuffer, Sample, SampleWindow};
use crate::config::constants::acquisition::{ANCHOR_LOOKBACK_PERIODS, HANDLER_SETTLE_TIMEOUT_MS};
use crate::config::constants::ads111x::{
    CONFIG_COMP_QUE_MASK, CONFIG_DEFAULT_IDLE, CONFIG_GAIN_MASK, CONFIG_RATE_MASK, CONFIG_READBACK_MASK,
};
use crate::error::{AcqResult, AcquisitionError, ConfigField};
use crate::error_context;
use crate::hal::{BusError, ConversionMode, Converter, DataRate, EdgeSource, Gain, SharedBus};
use crate::utils::time::{sample_period_nanos, TimeProvider};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Collaborators shared by every channel
#[derive(Clone)]
pub struct SharedResources {
    pub bus: SharedBus,
    pub edges: Arc<dyn EdgeSource>,
    pub clock: Arc<dyn TimeProvider>,
}

/// Capture counters updated from the edge handler
#[derive(Debug, Default)]
struct CaptureCounters {
    captured: AtomicU64,
    read_errors: AtomicU64,
    overflow_drops: AtomicU64,
    /// Handlers that have taken a timestamp but not yet pushed or failed
    in_flight: AtomicUsize,
}

/// Point-in-time copy of a source's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub read_errors: u64,
    pub overflow_drops: u64,
}

struct ConsumerState {
    consumer: HandoffConsumer<Sample>,
    buffer: ChannelBuffer,
    reported_read_errors: u64,
}

/// One channel's converter, edge subscription and sample buffer
pub struct SampleSource {
    name: String,
    converter: Arc<dyn Converter>,
    ready_pin: u8,
    resources: SharedResources,
    rate: Option<DataRate>,
    producer: HandoffProducer<Sample>,
    state: Mutex<ConsumerState>,
    counters: Arc<CaptureCounters>,
    running: AtomicBool,
}

impl SampleSource {
    pub fn new(
        name: &str,
        converter: Arc<dyn Converter>,
        ready_pin: u8,
        queue_capacity: usize,
        resources: SharedResources,
    ) -> Self {
        let (producer, consumer) = handoff(queue_capacity);
        Self {
            name: name.to_string(),
            converter,
            ready_pin,
            resources,
            rate: None,
            producer,
            state: Mutex::new(ConsumerState {
                consumer,
                buffer: ChannelBuffer::new(),
                reported_read_errors: 0,
            }),
            counters: Arc::new(CaptureCounters::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u8 {
        self.converter.address()
    }

    pub fn ready_pin(&self) -> u8 {
        self.ready_pin
    }

    /// Configured rate in samples per second, once configured
    pub fn rate_sps(&self) -> Option<u32> {
        self.rate.map(DataRate::sps)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop the converter and compare its idle configuration with the reset fingerprint
    pub fn verify_presence(&self) -> AcqResult<()> {
        let converter = &self.converter;
        let result = self.resources.bus.transaction(|bus| {
            if converter.check_presence(bus)? {
                Ok(None)
            } else {
                converter.read_config(bus).map(Some)
            }
        });

        match result {
            Ok(None) => Ok(()),
            Ok(Some(actual)) => Err(AcquisitionError::ConfigMismatch {
                channel: self.name.clone(),
                field: ConfigField::Presence,
                expected: CONFIG_DEFAULT_IDLE,
                actual,
                context: error_context!("sample_source", "check_presence"),
            }),
            Err(e) => Err(AcquisitionError::hardware(
                &self.name,
                self.address(),
                e,
                error_context!("sample_source", "check_presence"),
            )),
        }
    }

    /// Presence check that logs the reason for a negative answer
    pub fn check_presence(&self) -> bool {
        match self.verify_presence() {
            Ok(()) => true,
            Err(e) => {
                warn!(channel = %self.name, error = %e, "converter presence check failed");
                false
            }
        }
    }

    /// Write the configuration, verify the readback and enable the data-ready signal
    ///
    /// On failure the source is left unconfigured and [`SampleSource::start`] refuses to run.
    pub fn configure_and_start(&mut self, gain: Gain, rate_sps: u32, mode: ConversionMode) -> AcqResult<()> {
        self.rate = None;
        let variant = self.converter.variant();
        let rate = DataRate::new(variant, rate_sps).ok_or_else(|| {
            AcquisitionError::configuration(
                "sample_source",
                format!("{} SPS is not supported by {:?} on channel {}", rate_sps, variant, self.name),
            )
        })?;

        let converter = &self.converter;
        let name = &self.name;
        let address = converter.address();
        let hardware = |e: BusError| AcquisitionError::hardware(name, address, e, error_context!("sample_source", "configure"));
        let mismatch = |field: ConfigField, expected: u16, actual: u16| AcquisitionError::ConfigMismatch {
            channel: name.clone(),
            field,
            expected,
            actual,
            context: error_context!("sample_source", "configure"),
        };

        self.resources.bus.transaction(|bus| {
            let written = converter.configure(bus, gain, rate, mode).map_err(hardware)?;
            let readback = converter.read_config(bus).map_err(hardware)?;

            if readback & CONFIG_RATE_MASK != written & CONFIG_RATE_MASK {
                return Err(mismatch(ConfigField::DataRate, written & CONFIG_RATE_MASK, readback & CONFIG_RATE_MASK));
            }
            if readback & CONFIG_GAIN_MASK != written & CONFIG_GAIN_MASK {
                return Err(mismatch(ConfigField::Gain, written & CONFIG_GAIN_MASK, readback & CONFIG_GAIN_MASK));
            }

            if !converter.start(bus).map_err(hardware)? {
                let actual = converter.read_config(bus).map_err(hardware)?;
                let expected = readback & !CONFIG_COMP_QUE_MASK;
                return Err(mismatch(
                    ConfigField::ReadyPin,
                    expected & CONFIG_READBACK_MASK,
                    actual & CONFIG_READBACK_MASK,
                ));
            }
            Ok(())
        })?;

        self.rate = Some(rate);
        info!(channel = %self.name, address = address, rate_sps, gain = ?gain, mode = ?mode, "converter configured");
        Ok(())
    }

    /// Subscribe the capture handler to the data-ready edge; re-subscribes if running
    pub fn start(&self) -> AcqResult<()> {
        if self.rate.is_none() {
            return Err(AcquisitionError::configuration(
                "sample_source",
                format!("channel {} must be configured before it is started", self.name),
            ));
        }

        let converter = self.converter.clone();
        let bus = self.resources.bus.clone();
        let clock = self.resources.clock.clone();
        let producer = self.producer.clone();
        let counters = self.counters.clone();

        let handler = Arc::new(move || {
            counters.in_flight.fetch_add(1, Ordering::SeqCst);
            let timestamp_ns = clock.now_nanos();
            match bus.transaction(|bus| converter.read_last_sample(bus)) {
                Ok(value) => {
                    if !producer.push(Sample::new(timestamp_ns, value)) {
                        counters.overflow_drops.fetch_add(1, Ordering::Relaxed);
                    }
                    counters.captured.fetch_add(1, Ordering::Relaxed);
                }
                Err(_) => {
                    counters.read_errors.fetch_add(1, Ordering::Relaxed);
                }
            }
            counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.resources
            .edges
            .subscribe(self.ready_pin, handler)
            .map_err(|e| AcquisitionError::configuration("sample_source", format!("channel {}: {}", self.name, e)))?;
        self.running.store(true, Ordering::Release);
        debug!(channel = %self.name, pin = self.ready_pin, "edge handler subscribed");
        Ok(())
    }

    /// Unsubscribe from the data-ready edge. No sample is produced after this returns.
    pub fn stop(&self) {
        self.resources.edges.unsubscribe(self.ready_pin);
        if self.running.swap(false, Ordering::AcqRel) {
            debug!(channel = %self.name, "edge handler unsubscribed");
        }
    }

    /// Stop capturing and return the converter to its idle configuration
    pub fn shutdown(&self) {
        self.stop();
        let converter = &self.converter;
        if let Err(e) = self.resources.bus.transaction(|bus| converter.stop(bus)) {
            warn!(channel = %self.name, error = %e, "failed to stop converter");
        }
    }

    /// Drain pending samples and return those inside `[start_ns, end_ns)`
    pub fn get_window(&self, start_ns: u64, end_ns: u64) -> SampleWindow {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        self.settle_in_flight();

        let drained = state.consumer.drain_into(&mut state.buffer);

        let overflow = state.consumer.take_overflow();
        if overflow > 0 {
            warn!(channel = %self.name, dropped = overflow, "hand-off queue overflowed, oldest samples dropped");
        }
        let read_errors = self.counters.read_errors.load(Ordering::Relaxed);
        if read_errors > state.reported_read_errors {
            warn!(
                channel = %self.name,
                errors = read_errors - state.reported_read_errors,
                "conversion reads failed"
            );
            state.reported_read_errors = read_errors;
        }

        let max_anchor_gap_ns = self
            .rate
            .map(|rate| sample_period_nanos(rate.sps() as f64) * ANCHOR_LOOKBACK_PERIODS)
            .unwrap_or(0);
        let window = state.buffer.take_window(start_ns, end_ns, max_anchor_gap_ns);
        debug!(channel = %self.name, drained, count = window.len(), "window pulled");
        window
    }

    /// Wait, bounded, until no handler holds a timestamp it has not pushed
    ///
    /// A handler entering after this returns stamps after the pull started, so
    /// its sample belongs to the next window.
    fn settle_in_flight(&self) {
        let deadline = Instant::now() + Duration::from_millis(HANDLER_SETTLE_TIMEOUT_MS);
        while self.counters.in_flight.load(Ordering::SeqCst) > 0 {
            if Instant::now() >= deadline {
                warn!(channel = %self.name, "edge handler still in flight at window pull");
                return;
            }
            std::thread::yield_now();
        }
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            captured: self.counters.captured.load(Ordering::Relaxed),
            read_errors: self.counters.read_errors.load(Ordering::Relaxed),
            overflow_drops: self.counters.overflow_drops.load(Ordering::Relaxed),
        }
    }
}

impl Drop for SampleSource {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::ads111x::*;
    use crate::hal::{Ads111x, DeviceVariant, RegisterBus, SoftwareEdges};
    use crate::utils::time::MockTimeProvider;
    use crate::utils::NANOS_PER_SECOND;
    use crossbeam::channel::{unbounded, Receiver, Sender};
    use std::collections::HashMap;

    /// Register file that optionally corrupts one config field on readback
    #[derive(Default)]
    struct FakeBus {
        registers: HashMap<(u8, u8), u16>,
        corrupt_readback: u16,
        fail: bool,
    }

    impl RegisterBus for FakeBus {
        fn write_register(&mut self, address: u8, pointer: u8, value: u16) -> Result<(), BusError> {
            if self.fail {
                return Err(BusError::Nack { address });
            }
            self.registers.insert((address, pointer), value);
            Ok(())
        }

        fn read_register(&mut self, address: u8, pointer: u8) -> Result<[u8; 2], BusError> {
            if self.fail {
                return Err(BusError::Nack { address });
            }
            let mut value = *self.registers.get(&(address, pointer)).unwrap_or(&0);
            if pointer == POINTER_CONFIG {
                value = (value | CONFIG_OS_SINGLE) ^ self.corrupt_readback;
            }
            Ok(value.to_be_bytes())
        }
    }

    fn source_on(bus: FakeBus, edges: SoftwareEdges, clock: Arc<MockTimeProvider>) -> SampleSource {
        let resources = SharedResources {
            bus: SharedBus::new(bus),
            edges: Arc::new(edges),
            clock,
        };
        SampleSource::new("001", Arc::new(Ads111x::new(0x4a, DeviceVariant::Ads1114)), 22, 512, resources)
    }

    #[test]
    fn test_presence_and_configuration() {
        let clock = Arc::new(MockTimeProvider::new(0));
        let mut source = source_on(FakeBus::default(), SoftwareEdges::new(), clock);

        assert!(source.check_presence());
        source
            .configure_and_start(Gain::One, 128, ConversionMode::Continuous)
            .unwrap();
        assert_eq!(source.rate_sps(), Some(128));
    }

    #[test]
    fn test_bus_failure_is_hardware_unavailable() {
        let clock = Arc::new(MockTimeProvider::new(0));
        let bus = FakeBus { fail: true, ..FakeBus::default() };
        let mut source = source_on(bus, SoftwareEdges::new(), clock);

        assert!(!source.check_presence());
        let err = source
            .configure_and_start(Gain::One, 128, ConversionMode::Continuous)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::HardwareUnavailable);
        assert!(source.start().is_err());
    }

    #[test]
    fn test_rate_readback_mismatch() {
        let clock = Arc::new(MockTimeProvider::new(0));
        let bus = FakeBus { corrupt_readback: 0x0020, ..FakeBus::default() };
        let mut source = source_on(bus, SoftwareEdges::new(), clock);

        match source.configure_and_start(Gain::One, 128, ConversionMode::Continuous) {
            Err(AcquisitionError::ConfigMismatch { field, .. }) => assert_eq!(field, ConfigField::DataRate),
            other => panic!("expected rate mismatch, got {:?}", other),
        }
        assert_eq!(source.rate_sps(), None);
    }

    #[test]
    fn test_unsupported_rate_is_configuration_error() {
        let clock = Arc::new(MockTimeProvider::new(0));
        let mut source = source_on(FakeBus::default(), SoftwareEdges::new(), clock);
        let err = source
            .configure_and_start(Gain::One, 100, ConversionMode::Continuous)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_edges_feed_windows() {
        let clock = Arc::new(MockTimeProvider::new(10 * NANOS_PER_SECOND));
        let edges = SoftwareEdges::new();
        let mut source = source_on(FakeBus::default(), edges.clone(), clock.clone());
        source
            .configure_and_start(Gain::One, 128, ConversionMode::Continuous)
            .unwrap();
        source.start().unwrap();

        for _ in 0..128 {
            assert!(edges.fire(22));
            clock.advance_by(NANOS_PER_SECOND / 128);
        }
        source.stop();
        assert!(!edges.fire(22));

        let window = source.get_window(10 * NANOS_PER_SECOND, 11 * NANOS_PER_SECOND);
        assert_eq!(window.len(), 128);
        assert_eq!(source.stats().captured, 128);
    }

    /// Bus whose conversion reads block until the test lets them through
    struct GatedBus {
        inner: FakeBus,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl RegisterBus for GatedBus {
        fn write_register(&mut self, address: u8, pointer: u8, value: u16) -> Result<(), BusError> {
            self.inner.write_register(address, pointer, value)
        }

        fn read_register(&mut self, address: u8, pointer: u8) -> Result<[u8; 2], BusError> {
            if pointer == POINTER_CONVERSION {
                let _ = self.entered.send(());
                let _ = self.release.recv();
                return Ok(4242u16.to_be_bytes());
            }
            self.inner.read_register(address, pointer)
        }
    }

    #[test]
    fn test_sample_stamped_before_boundary_lands_in_its_window() {
        const NOON: u64 = 1_714_564_800 * NANOS_PER_SECOND;
        let (entered_tx, entered_rx) = unbounded();
        let (release_tx, release_rx) = unbounded();
        let clock = Arc::new(MockTimeProvider::new(NOON + 999_000_000));
        let edges = SoftwareEdges::new();
        let resources = SharedResources {
            bus: SharedBus::new(GatedBus {
                inner: FakeBus::default(),
                entered: entered_tx,
                release: release_rx,
            }),
            edges: Arc::new(edges.clone()),
            clock: clock.clone(),
        };
        let mut source =
            SampleSource::new("001", Arc::new(Ads111x::new(0x4a, DeviceVariant::Ads1114)), 22, 512, resources);
        source
            .configure_and_start(Gain::One, 128, ConversionMode::Continuous)
            .unwrap();
        source.start().unwrap();

        let firing = std::thread::spawn(move || edges.fire(22));
        // The handler has its timestamp and is stalled on the conversion read
        entered_rx.recv().unwrap();
        clock.set_time(NOON + NANOS_PER_SECOND);

        let releasing = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            release_tx.send(()).unwrap();
        });
        let first = source.get_window(NOON, NOON + NANOS_PER_SECOND);
        assert!(firing.join().unwrap());
        releasing.join().unwrap();
        let second = source.get_window(NOON + NANOS_PER_SECOND, NOON + 2 * NANOS_PER_SECOND);

        assert_eq!(first.samples, vec![Sample::new(NOON + 999_000_000, 4242)]);
        assert!(second.samples.is_empty());
        assert_eq!(source.stats().captured, 1);
    }
}
