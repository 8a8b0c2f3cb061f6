// src/storage/mod.rs
//! Waveform persistence
//!
//! The supervisor hands each flushed run to a [`WaveformWriter`]. File names are
//! derived from the stream identifier and the run's start time only, so the same
//! run always lands in the same file.

pub mod miniseed;

pub use miniseed::{MiniSeedWriter, RecordHeader};

use crate::config::constants::{station, storage::FILE_EXTENSION};
use crate::utils::time::format_compact_iso;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Data encoding of output records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Uncompressed big-endian 32-bit integers
    Int32,
    /// Steim-1 difference compression
    Steim1,
}

impl Encoding {
    /// SEED data encoding format code
    pub fn code(self) -> u8 {
        match self {
            Encoding::Int32 => 3,
            Encoding::Steim1 => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            3 => Some(Encoding::Int32),
            10 => Some(Encoding::Steim1),
            _ => None,
        }
    }
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid stream identifier {0}")]
    InvalidStream(String),
    #[error("sample rate {0} Hz cannot be represented in a record header")]
    UnsupportedRate(u32),
    #[error("record length {0} must be a power of two between 256 and 4096")]
    InvalidRecordLength(usize),
    #[error("no samples to write")]
    Empty,
    #[error("malformed record: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Network, station, location and channel codes of one stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId {
    pub network: String,
    pub station: String,
    pub location: String,
    pub channel: String,
}

impl StreamId {
    pub fn new(network: &str, station: &str, location: &str, channel: &str) -> Self {
        Self {
            network: network.to_string(),
            station: station.to_string(),
            location: location.to_string(),
            channel: channel.to_string(),
        }
    }

    /// Check that every code fits its fixed-width header field
    pub fn validate(&self) -> Result<(), StorageError> {
        let fields = [
            (&self.network, station::MAX_NETWORK_LEN),
            (&self.station, station::MAX_STATION_LEN),
            (&self.location, station::MAX_LOCATION_LEN),
            (&self.channel, station::MAX_CHANNEL_LEN),
        ];
        if fields
            .iter()
            .any(|(code, max_len)| code.len() > *max_len || !code.is_ascii())
        {
            return Err(StorageError::InvalidStream(self.to_string()));
        }
        Ok(())
    }

    /// `{net}.{sta}.{loc}.{cha}.{YYYY-MM-DDTHHMMSS.ffffff}.msd`
    pub fn file_name(&self, start_ns: u64) -> String {
        format!("{}.{}.{}", self, format_compact_iso(start_ns), FILE_EXTENSION)
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.network, self.station, self.location, self.channel)
    }
}

/// Persists one contiguous run of samples
pub trait WaveformWriter: Send {
    /// Write `samples` starting at `start_ns` at `rate` Hz. Returns the file written.
    fn write(&mut self, stream: &StreamId, start_ns: u64, rate: u32, samples: &[i32]) -> Result<PathBuf, StorageError>;
}
