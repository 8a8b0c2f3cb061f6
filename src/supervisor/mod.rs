// src/supervisor/mod.rs
//! Acquisition supervisor: the one-second cadence and everything it drives
//!
//! Once per second the supervisor pulls the previous window from every active
//! [`SampleSource`], checks the sample count, regrids and resamples it, and
//! assembles the results into a [`Frame`]. Each channel's share is appended to
//! its [`OutputSegment`], and every `flush_interval_s` cycles the segments are
//! written through a [`WaveformWriter`]. A failure in one channel is logged
//! and never affects another.

pub mod cadence;
pub mod segment;

pub use cadence::{Cadence, Tick};
pub use segment::{Frame, OutputSegment, Run};

use crate::acquisition::{CaptureStats, SampleSource, SharedResources};
use crate::config::constants::hardware::MAX_CONVERTERS;
use crate::config::{ChannelConfig, RecorderConfig};
use crate::error::{AcqResult, AcquisitionError, ResourceType};
use crate::error_context;
use crate::hal::{Ads111x, ConversionMode};
use crate::health::{ChannelStatus, ChannelStatusBoard};
use crate::processing::{regrid_window, Resampler};
use crate::storage::{StreamId, WaveformWriter};
use crate::utils::cancel::CancellationToken;
use crate::utils::time::NANOS_PER_SECOND;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of one supervisor run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Aligning,
    Running,
    Stopping,
    Stopped,
}

/// Per-channel counters kept by the supervisor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub windows_accepted: u64,
    pub windows_dropped: u64,
    pub files_written: u64,
    pub write_failures: u64,
    pub seconds_discarded: u64,
    pub capture: CaptureStats,
}

/// What one cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub window_start_ns: u64,
    pub accepted: Vec<String>,
    pub dropped: Vec<String>,
    /// Files written if this cycle triggered a flush
    pub written: Vec<PathBuf>,
}

struct ActiveChannel {
    source: SampleSource,
    stream: StreamId,
    rate: u32,
    resampler: Resampler,
    segment: OutputSegment,
    stats: ChannelStats,
    /// Reason the most recent write failed; cleared by the next successful write
    write_error: Option<String>,
}

pub struct AcquisitionSupervisor {
    config: RecorderConfig,
    resources: SharedResources,
    writer: Box<dyn WaveformWriter>,
    status: ChannelStatusBoard,
    channels: Vec<ActiveChannel>,
    cycles_since_flush: u32,
    state: SupervisorState,
}

impl AcquisitionSupervisor {
    /// Validate the configuration and the converter budget
    ///
    /// Errors here abort startup entirely; nothing touches the bus yet.
    pub fn new(
        config: RecorderConfig,
        resources: SharedResources,
        writer: Box<dyn WaveformWriter>,
        status: ChannelStatusBoard,
    ) -> AcqResult<Self> {
        config.validate()?;
        check_budget(&config)?;

        Ok(Self {
            config,
            resources,
            writer,
            status,
            channels: Vec::new(),
            cycles_since_flush: 0,
            state: SupervisorState::Idle,
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Names of the channels that passed startup
    pub fn active_channels(&self) -> Vec<&str> {
        self.channels.iter().map(|channel| channel.source.name()).collect()
    }

    /// Bring up every enabled channel and start capturing
    ///
    /// A channel that fails its presence check, configuration or subscription is
    /// excluded and reported on the status board. Returns the number started.
    pub fn initialize(&mut self) -> usize {
        let queue_seconds = self.config.acquisition.queue_seconds as usize;
        let enabled: Vec<ChannelConfig> = self.config.enabled_channels().cloned().collect();

        for channel_config in &enabled {
            match self.start_channel(channel_config, queue_seconds) {
                Ok(channel) => {
                    self.status.set(&channel_config.name, ChannelStatus::Healthy);
                    self.channels.push(channel);
                }
                Err(e) => {
                    warn!(channel = %channel_config.name, error = %e, "channel excluded");
                    self.status
                        .set(&channel_config.name, ChannelStatus::Excluded(e.to_string()));
                }
            }
        }

        if self.channels.is_empty() {
            warn!("no channel passed startup, recording nothing");
        } else {
            info!(
                active = self.channels.len(),
                configured = enabled.len(),
                "acquisition initialized"
            );
        }
        self.channels.len()
    }

    fn start_channel(&self, config: &ChannelConfig, queue_seconds: usize) -> AcqResult<ActiveChannel> {
        let converter = Arc::new(Ads111x::new(config.i2c_address, config.variant));
        let capacity = (config.data_rate_sps as usize * queue_seconds).max(1);
        let mut source = SampleSource::new(
            &config.name,
            converter,
            config.ready_pin,
            capacity,
            self.resources.clone(),
        );

        source.verify_presence()?;
        source.configure_and_start(config.gain, config.data_rate_sps, ConversionMode::Continuous)?;
        source.start()?;

        let station = &self.config.station;
        let output_rate = self.config.acquisition.output_rate_hz;
        Ok(ActiveChannel {
            source,
            stream: StreamId::new(&station.network, &station.station, &station.location, &config.name),
            rate: config.data_rate_sps,
            resampler: Resampler::new(),
            segment: OutputSegment::new(output_rate as usize, self.config.storage.max_retained_seconds),
            stats: ChannelStats::default(),
            write_error: None,
        })
    }

    /// Collect, regrid and assemble the window ending at `boundary_ns`
    pub fn run_cycle(&mut self, boundary_ns: u64) -> CycleReport {
        let (start_ns, end_ns) = (boundary_ns.saturating_sub(NANOS_PER_SECOND), boundary_ns);
        let tolerance = self.config.acquisition.count_tolerance;
        let output_rate = self.config.acquisition.output_rate_hz as usize;

        let mut frame = Frame::new(start_ns);
        let mut report = CycleReport {
            window_start_ns: start_ns,
            ..CycleReport::default()
        };

        for channel in &mut self.channels {
            let name = channel.source.name().to_string();
            match collect_channel(channel, start_ns, end_ns, tolerance, output_rate) {
                Ok(series) => {
                    channel.stats.windows_accepted += 1;
                    let status = match &channel.write_error {
                        Some(reason) => ChannelStatus::Degraded(reason.clone()),
                        None => ChannelStatus::Healthy,
                    };
                    self.status.set(&name, status);
                    frame.insert(&name, series);
                    report.accepted.push(name);
                }
                Err(e) => {
                    channel.stats.windows_dropped += 1;
                    warn!(channel = %name, error = %e, "window dropped");
                    self.status.set(&name, ChannelStatus::Degraded(e.to_string()));
                    report.dropped.push(name);
                }
            }
        }

        self.assemble(&frame);
        self.cycles_since_flush += 1;
        if self.cycles_since_flush >= self.config.acquisition.flush_interval_s {
            report.written = self.flush();
        }
        report
    }

    fn assemble(&mut self, frame: &Frame) {
        for channel in &mut self.channels {
            let Some(series) = frame.get(channel.source.name()) else {
                continue;
            };
            let dropped = channel.segment.push(frame.start_ns, series);
            if dropped > 0 {
                channel.stats.seconds_discarded += dropped as u64;
                warn!(
                    channel = %channel.source.name(),
                    dropped_seconds = dropped,
                    "retention cap reached, oldest unwritten data discarded"
                );
            }
        }
        debug!(start_ns = frame.start_ns, channels = frame.channels.len(), "frame assembled");
    }

    /// Write every non-empty segment. Failed runs stay buffered for the next flush.
    pub fn flush(&mut self) -> Vec<PathBuf> {
        self.cycles_since_flush = 0;
        let output_rate = self.config.acquisition.output_rate_hz;
        let mut written = Vec::new();

        for channel in &mut self.channels {
            if channel.segment.is_empty() {
                continue;
            }
            let ActiveChannel {
                source,
                stream,
                segment,
                stats,
                write_error,
                ..
            } = channel;
            let writer = &mut self.writer;
            let status = &self.status;

            segment.flush_with(|run| match writer.write(stream, run.start_ns, output_rate, &run.counts()) {
                Ok(path) => {
                    info!(channel = %source.name(), seconds = run.seconds, path = %path.display(), "segment written");
                    stats.files_written += 1;
                    *write_error = None;
                    written.push(path);
                    true
                }
                Err(e) => {
                    let err = AcquisitionError::write_failure(source.name(), e);
                    error!(channel = %source.name(), seconds = run.seconds, error = %err, "segment kept for next flush");
                    stats.write_failures += 1;
                    status.set(source.name(), ChannelStatus::Degraded(err.to_string()));
                    *write_error = Some(err.to_string());
                    false
                }
            });
        }
        written
    }

    /// Drive the cadence until `cancel` fires, then stop capture and flush
    pub fn run(&mut self, cancel: &CancellationToken) {
        self.state = SupervisorState::Aligning;
        let mut cadence = Cadence::new(self.resources.clock.clone());

        while let Some(tick) = cadence.wait_next(cancel) {
            self.state = SupervisorState::Running;
            if let Some(late) = tick.late_error() {
                warn!(error = %late, "cycle late, skipped seconds are not recovered");
            }
            let report = self.run_cycle(tick.boundary_ns);
            debug!(
                accepted = report.accepted.len(),
                dropped = report.dropped.len(),
                "cycle complete"
            );
        }

        self.shutdown();
    }

    /// Unsubscribe every channel, write what is buffered and idle the converters
    pub fn shutdown(&mut self) {
        if self.state == SupervisorState::Stopped {
            return;
        }
        self.state = SupervisorState::Stopping;
        for channel in &self.channels {
            channel.source.stop();
        }
        let written = self.flush();
        for channel in &self.channels {
            channel.source.shutdown();
        }
        self.state = SupervisorState::Stopped;
        info!(files = written.len(), "acquisition stopped");
    }

    pub fn stats(&self) -> Vec<(String, ChannelStats)> {
        self.channels
            .iter()
            .map(|channel| {
                let stats = ChannelStats {
                    capture: channel.source.stats(),
                    ..channel.stats
                };
                (channel.source.name().to_string(), stats)
            })
            .collect()
    }

    /// Run on a dedicated thread
    pub fn spawn(mut self, cancel: CancellationToken) -> std::io::Result<SupervisorHandle> {
        let worker_cancel = cancel.clone();
        let thread = std::thread::Builder::new()
            .name("acquisition-supervisor".to_string())
            .spawn(move || {
                self.run(&worker_cancel);
                self.stats()
            })?;

        Ok(SupervisorHandle {
            cancel,
            thread: Some(thread),
        })
    }
}

fn collect_channel(
    channel: &mut ActiveChannel,
    start_ns: u64,
    end_ns: u64,
    tolerance: usize,
    output_rate: usize,
) -> AcqResult<Vec<f64>> {
    let window = channel.source.get_window(start_ns, end_ns);
    let expected = channel.rate as usize;
    if window.len().abs_diff(expected) > tolerance {
        return Err(AcquisitionError::SampleCountMismatch {
            channel: channel.source.name().to_string(),
            expected,
            actual: window.len(),
            tolerance,
            context: error_context!("supervisor", "collect"),
        });
    }
    regrid_window(&mut channel.resampler, &window, expected, output_rate)
}

/// Converter count, bus addresses and ready pins must fit the hardware
fn check_budget(config: &RecorderConfig) -> AcqResult<()> {
    let enabled: Vec<&ChannelConfig> = config.enabled_channels().collect();
    let requested = enabled.len();

    if requested > MAX_CONVERTERS {
        return Err(AcquisitionError::ResourceExhausted {
            resource_type: ResourceType::Converters,
            limit: MAX_CONVERTERS,
            requested,
            context: error_context!("supervisor", "initialize"),
        });
    }

    let addresses: HashSet<u8> = enabled.iter().map(|channel| channel.i2c_address).collect();
    if addresses.len() < requested {
        return Err(AcquisitionError::ResourceExhausted {
            resource_type: ResourceType::BusAddresses,
            limit: addresses.len(),
            requested,
            context: error_context!("supervisor", "initialize"),
        });
    }

    let pins: HashSet<u8> = enabled.iter().map(|channel| channel.ready_pin).collect();
    if pins.len() < requested {
        return Err(AcquisitionError::ResourceExhausted {
            resource_type: ResourceType::ReadyPins,
            limit: pins.len(),
            requested,
            context: error_context!("supervisor", "initialize"),
        });
    }
    Ok(())
}

/// Owner of a supervisor running on its own thread
pub struct SupervisorHandle {
    cancel: CancellationToken,
    thread: Option<JoinHandle<Vec<(String, ChannelStats)>>>,
}

impl SupervisorHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel, wait for the final flush and return the channel counters
    pub fn shutdown(mut self) -> Vec<(String, ChannelStats)> {
        self.stop()
    }

    fn stop(&mut self) -> Vec<(String, ChannelStats)> {
        self.cancel.cancel();
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(stats)) => stats,
            Some(Err(_)) => {
                error!("acquisition supervisor thread panicked");
                Vec::new()
            }
            None => Vec::new(),
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

#[cfg(all(test, feature = "simulation"))]
mod tests {
    use super::*;
    use crate::hal::simulator::SimulatedBus;
    use crate::hal::{DeviceVariant, SharedBus, SoftwareEdges};
    use crate::storage::StorageError;
    use crate::utils::time::MockTimeProvider;

    struct NullWriter;

    impl WaveformWriter for NullWriter {
        fn write(&mut self, _: &StreamId, _: u64, _: u32, _: &[i32]) -> Result<PathBuf, StorageError> {
            Ok(PathBuf::from("/dev/null"))
        }
    }

    fn resources(bus: SimulatedBus) -> SharedResources {
        SharedResources {
            bus: SharedBus::new(bus),
            edges: Arc::new(SoftwareEdges::new()),
            clock: Arc::new(MockTimeProvider::new(0)),
        }
    }

    #[test]
    fn test_too_many_converters_is_resource_exhaustion() {
        let mut config = RecorderConfig::default();
        config.channels = (0..5u8)
            .map(|k| ChannelConfig::new(&format!("00{}", k), 0x48 + k % 4, 5 + k))
            .collect();

        let result = AcquisitionSupervisor::new(
            config,
            resources(SimulatedBus::new()),
            Box::new(NullWriter),
            ChannelStatusBoard::new(),
        );
        match result {
            Err(AcquisitionError::ResourceExhausted { resource_type, limit, requested, .. }) => {
                assert_eq!(resource_type, ResourceType::Converters);
                assert_eq!((limit, requested), (4, 5));
            }
            other => panic!("expected resource exhaustion, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_shared_ready_pin_is_rejected() {
        let mut config = RecorderConfig::default();
        config.channels = vec![ChannelConfig::new("001", 0x48, 17), ChannelConfig::new("002", 0x49, 17)];

        let err = AcquisitionSupervisor::new(
            config,
            resources(SimulatedBus::new()),
            Box::new(NullWriter),
            ChannelStatusBoard::new(),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            AcquisitionError::ResourceExhausted { resource_type: ResourceType::ReadyPins, .. }
        ));
    }

    #[test]
    fn test_absent_converter_is_excluded() {
        let bus = SimulatedBus::new()
            .with_device(0x4a, DeviceVariant::Ads1114)
            .with_device(0x48, DeviceVariant::Ads1114);
        let status = ChannelStatusBoard::new();
        let mut supervisor = AcquisitionSupervisor::new(
            RecorderConfig::default(),
            resources(bus),
            Box::new(NullWriter),
            status.clone(),
        )
        .unwrap();

        assert_eq!(supervisor.initialize(), 2);
        assert_eq!(supervisor.active_channels(), vec!["001", "003"]);
        assert_eq!(status.get("001"), Some(ChannelStatus::Healthy));
        assert!(matches!(status.get("002"), Some(ChannelStatus::Excluded(_))));
    }

    #[test]
    fn test_shutdown_is_terminal() {
        let mut supervisor = AcquisitionSupervisor::new(
            RecorderConfig::default(),
            resources(SimulatedBus::new()),
            Box::new(NullWriter),
            ChannelStatusBoard::new(),
        )
        .unwrap();
        assert_eq!(supervisor.state(), SupervisorState::Idle);
        assert_eq!(supervisor.initialize(), 0);
        supervisor.shutdown();
        assert_eq!(supervisor.state(), SupervisorState::Stopped);
    }

    #[test]
    fn test_cycle_at_clock_origin_starts_window_at_zero() {
        let mut supervisor = AcquisitionSupervisor::new(
            RecorderConfig::default(),
            resources(SimulatedBus::new()),
            Box::new(NullWriter),
            ChannelStatusBoard::new(),
        )
        .unwrap();
        supervisor.initialize();

        let report = supervisor.run_cycle(400_000_000);
        assert_eq!(report.window_start_ns, 0);
        assert!(report.accepted.is_empty());
    }
}
