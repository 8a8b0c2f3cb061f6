// src/error.rs
//! Unified error handling for the acquisition core
//!
//! Every component reports failures through [`AcquisitionError`], which carries an
//! [`ErrorContext`] describing where the failure happened. The variants mirror the
//! failure policy of the recorder: some exclude a channel at startup, some drop a
//! single window, some are only logged.

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

/// Unified error type for the acquisition core
#[derive(Debug, Clone)]
pub enum AcquisitionError {
    /// Bus I/O failure while talking to a converter
    HardwareUnavailable {
        channel: Option<String>,
        address: Option<u8>,
        error: Arc<dyn Error + Send + Sync>,
        context: ErrorContext,
    },

    /// Register readback does not match what was written
    ConfigMismatch {
        channel: String,
        field: ConfigField,
        expected: u16,
        actual: u16,
        context: ErrorContext,
    },

    /// Captured sample count outside the accepted tolerance
    SampleCountMismatch {
        channel: String,
        expected: usize,
        actual: usize,
        tolerance: usize,
        context: ErrorContext,
    },

    /// Persisting a segment failed
    WriteFailure {
        channel: String,
        error: Arc<dyn Error + Send + Sync>,
        context: ErrorContext,
    },

    /// Cadence invoked behind schedule
    TimingLate {
        expected_ns: u64,
        actual_ns: u64,
        context: ErrorContext,
    },

    /// Invalid or inconsistent configuration
    Configuration {
        component: String,
        reason: String,
        context: ErrorContext,
    },

    /// More resources requested than the bus or pin budget allows
    ResourceExhausted {
        resource_type: ResourceType,
        limit: usize,
        requested: usize,
        context: ErrorContext,
    },

    /// Regridding or resampling could not run on the given input
    Processing {
        stage: ProcessingStage,
        reason: String,
        context: ErrorContext,
    },
}

/// Plain discriminant of [`AcquisitionError`] for policy decisions and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    HardwareUnavailable,
    ConfigMismatch,
    SampleCountMismatch,
    WriteFailure,
    TimingLate,
    Configuration,
    ResourceExhausted,
    Processing,
}

/// Configuration register field checked on readback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigField {
    DataRate,
    Gain,
    ReadyPin,
    Presence,
}

/// Resource types for exhaustion tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Converters,
    BusAddresses,
    ReadyPins,
}

/// Processing stages for error tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    Regrid,
    Resample,
    Assembly,
}

/// Error context for debugging and analysis
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    pub thread_name: Option<String>,
    pub component: String,
    pub operation: String,
    pub file: Option<&'static str>,
    pub line: Option<u32>,
    pub additional_info: Vec<(String, String)>,
}

impl ErrorContext {
    /// Create a new error context
    pub fn new(component: &str, operation: &str) -> Self {
        Self {
            timestamp: SystemTime::now(),
            thread_name: std::thread::current().name().map(|s| s.to_string()),
            component: component.to_string(),
            operation: operation.to_string(),
            file: None,
            line: None,
            additional_info: Vec::new(),
        }
    }

    /// Create error context with file and line information
    pub fn with_location(component: &str, operation: &str, file: &'static str, line: u32) -> Self {
        let mut context = Self::new(component, operation);
        context.file = Some(file);
        context.line = Some(line);
        context
    }

    /// Add additional information to the context
    pub fn add_info<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.additional_info.push((key.into(), value.into()));
        self
    }
}

/// Macro for creating error context with file and line info
#[macro_export]
macro_rules! error_context {
    ($component:expr, $operation:expr) => {
        $crate::error::ErrorContext::with_location($component, $operation, file!(), line!())
    };
}

impl AcquisitionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AcquisitionError::HardwareUnavailable { .. } => ErrorKind::HardwareUnavailable,
            AcquisitionError::ConfigMismatch { .. } => ErrorKind::ConfigMismatch,
            AcquisitionError::SampleCountMismatch { .. } => ErrorKind::SampleCountMismatch,
            AcquisitionError::WriteFailure { .. } => ErrorKind::WriteFailure,
            AcquisitionError::TimingLate { .. } => ErrorKind::TimingLate,
            AcquisitionError::Configuration { .. } => ErrorKind::Configuration,
            AcquisitionError::ResourceExhausted { .. } => ErrorKind::ResourceExhausted,
            AcquisitionError::Processing { .. } => ErrorKind::Processing,
        }
    }

    pub fn context(&self) -> &ErrorContext {
        match self {
            AcquisitionError::HardwareUnavailable { context, .. }
            | AcquisitionError::ConfigMismatch { context, .. }
            | AcquisitionError::SampleCountMismatch { context, .. }
            | AcquisitionError::WriteFailure { context, .. }
            | AcquisitionError::TimingLate { context, .. }
            | AcquisitionError::Configuration { context, .. }
            | AcquisitionError::ResourceExhausted { context, .. }
            | AcquisitionError::Processing { context, .. } => context,
        }
    }

    /// Wrap a bus error for a named channel
    pub fn hardware(
        channel: &str,
        address: u8,
        error: crate::hal::BusError,
        context: ErrorContext,
    ) -> Self {
        AcquisitionError::HardwareUnavailable {
            channel: Some(channel.to_string()),
            address: Some(address),
            error: Arc::new(error),
            context,
        }
    }

    pub fn configuration(component: &str, reason: impl Into<String>) -> Self {
        AcquisitionError::Configuration {
            component: component.to_string(),
            reason: reason.into(),
            context: ErrorContext::new(component, "validate"),
        }
    }

    /// Wrap a storage error for a named channel
    pub fn write_failure(channel: &str, error: crate::storage::StorageError) -> Self {
        AcquisitionError::WriteFailure {
            channel: channel.to_string(),
            error: Arc::new(error),
            context: error_context!("supervisor", "flush"),
        }
    }

    pub fn processing(stage: ProcessingStage, reason: impl Into<String>) -> Self {
        AcquisitionError::Processing {
            stage,
            reason: reason.into(),
            context: ErrorContext::new("processing", "process_window"),
        }
    }
}

impl fmt::Display for AcquisitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcquisitionError::HardwareUnavailable { channel, address, error, context } => {
                write!(f, "[HARDWARE] Bus I/O failure")?;
                if let Some(channel) = channel {
                    write!(f, " on channel {}", channel)?;
                }
                if let Some(address) = address {
                    write!(f, " (address 0x{:02x})", address)?;
                }
                write!(f, ": {} ({})", error, context.operation)
            }
            AcquisitionError::ConfigMismatch { channel, field, expected, actual, context } => {
                write!(f, "[CONFIG] {:?} readback mismatch on channel {}: expected 0x{:04x}, got 0x{:04x} ({})",
                       field, channel, expected, actual, context.operation)
            }
            AcquisitionError::SampleCountMismatch { channel, expected, actual, tolerance, context } => {
                write!(f, "[WINDOW] Channel {} captured {} samples, expected {} ± {} ({})",
                       channel, actual, expected, tolerance, context.operation)
            }
            AcquisitionError::WriteFailure { channel, error, context } => {
                write!(f, "[STORAGE] Write failed for channel {}: {} ({})", channel, error, context.operation)
            }
            AcquisitionError::TimingLate { expected_ns, actual_ns, context } => {
                write!(f, "[TIMING] Cycle late by {}ns (expected {}, actual {}) ({})",
                       actual_ns.saturating_sub(*expected_ns), expected_ns, actual_ns, context.operation)
            }
            AcquisitionError::Configuration { component, reason, context } => {
                write!(f, "[CONFIG] Configuration error in {}: {} ({})", component, reason, context.operation)
            }
            AcquisitionError::ResourceExhausted { resource_type, limit, requested, context } => {
                write!(f, "[RESOURCE] {:?} exhausted: requested {}, limit {} ({})",
                       resource_type, requested, limit, context.operation)
            }
            AcquisitionError::Processing { stage, reason, context } => {
                write!(f, "[PROCESSING] {:?} stage error: {} ({})", stage, reason, context.operation)
            }
        }
    }
}

impl Error for AcquisitionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AcquisitionError::HardwareUnavailable { error, .. } => Some(error.as_ref()),
            AcquisitionError::WriteFailure { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

impl From<crate::hal::BusError> for AcquisitionError {
    fn from(err: crate::hal::BusError) -> Self {
        AcquisitionError::HardwareUnavailable {
            channel: None,
            address: Some(err.address()),
            error: Arc::new(err),
            context: error_context!("bus", "transfer"),
        }
    }
}

impl From<crate::config::ConfigError> for AcquisitionError {
    fn from(err: crate::config::ConfigError) -> Self {
        AcquisitionError::Configuration {
            component: "config_loader".to_string(),
            reason: err.to_string(),
            context: error_context!("config_loader", "load"),
        }
    }
}

/// Result type alias for acquisition operations
pub type AcqResult<T> = Result<T, AcquisitionError>;
