// src/storage/miniseed.rs
//! Fixed-length miniSEED 2.4 records
//!
//! Each record carries the 48-byte fixed header, one blockette 1000 at offset 48
//! and data from offset 64 to the end of the record. Data is encoded either as
//! big-endian 32-bit integers or as Steim-1 frames. Every record restarts its
//! difference chain, so records decode independently.

use crate::config::constants::acquisition::MAX_OUTPUT_RATE_HZ;
use crate::config::constants::storage::{MAX_RECORD_LENGTH, MIN_RECORD_LENGTH};
use crate::storage::{Encoding, StorageError, StreamId, WaveformWriter};
use crate::utils::time::{to_datetime, NANOS_PER_SECOND};
use chrono::{Datelike, NaiveDate, Timelike};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

const BLOCKETTE_1000_OFFSET: usize = 48;
const DATA_OFFSET: usize = 64;
const STEIM_FRAME_LEN: usize = 64;
const WORDS_PER_FRAME: usize = 16;
const BIG_ENDIAN: u8 = 1;
const MAX_SEQUENCE: u32 = 999_999;

/// Decoded fixed header and blockette 1000 of one record
#[derive(Debug, Clone, PartialEq)]
pub struct RecordHeader {
    pub sequence: u32,
    pub stream: StreamId,
    pub start_ns: u64,
    pub sample_count: usize,
    pub sample_rate: u32,
    pub encoding: Encoding,
    pub record_length: usize,
}

/// Writes one miniSEED file per run into a directory
#[derive(Debug, Clone)]
pub struct MiniSeedWriter {
    output_dir: PathBuf,
    record_length: usize,
    encoding: Encoding,
}

impl MiniSeedWriter {
    pub fn new(output_dir: impl Into<PathBuf>, record_length: usize, encoding: Encoding) -> Result<Self, StorageError> {
        if !record_length.is_power_of_two() || !(MIN_RECORD_LENGTH..=MAX_RECORD_LENGTH).contains(&record_length) {
            return Err(StorageError::InvalidRecordLength(record_length));
        }
        Ok(Self {
            output_dir: output_dir.into(),
            record_length,
            encoding,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Encode a run into consecutive records without touching the filesystem
    pub fn encode(&self, stream: &StreamId, start_ns: u64, rate: u32, samples: &[i32]) -> Result<Vec<u8>, StorageError> {
        stream.validate()?;
        if samples.is_empty() {
            return Err(StorageError::Empty);
        }
        if rate == 0 || rate > MAX_OUTPUT_RATE_HZ {
            return Err(StorageError::UnsupportedRate(rate));
        }

        let mut out = Vec::new();
        let mut offset = 0;
        let mut sequence = 1;

        while offset < samples.len() {
            let mut record = vec![0u8; self.record_length];
            let data = &mut record[DATA_OFFSET..];
            let packed = match self.encoding {
                Encoding::Int32 => pack_int32(&samples[offset..], data),
                Encoding::Steim1 => pack_steim1(&samples[offset..], data),
            };

            let record_start = start_ns + (offset as u128 * NANOS_PER_SECOND as u128 / rate as u128) as u64;
            let header = RecordHeader {
                sequence,
                stream: stream.clone(),
                start_ns: record_start,
                sample_count: packed,
                sample_rate: rate,
                encoding: self.encoding,
                record_length: self.record_length,
            };
            write_header(&mut record, &header);
            out.extend_from_slice(&record);

            offset += packed;
            sequence = if sequence == MAX_SEQUENCE { 1 } else { sequence + 1 };
        }

        Ok(out)
    }
}

impl WaveformWriter for MiniSeedWriter {
    fn write(&mut self, stream: &StreamId, start_ns: u64, rate: u32, samples: &[i32]) -> Result<PathBuf, StorageError> {
        let bytes = self.encode(stream, start_ns, rate, samples)?;

        std::fs::create_dir_all(&self.output_dir).map_err(|e| StorageError::io(&self.output_dir, e))?;
        let path = self.output_dir.join(stream.file_name(start_ns));

        // Write beside the target and rename so readers never see a partial file
        let mut file = NamedTempFile::new_in(&self.output_dir).map_err(|e| StorageError::io(&self.output_dir, e))?;
        file.write_all(&bytes).map_err(|e| StorageError::io(file.path(), e))?;
        file.persist(&path).map_err(|e| StorageError::io(&path, e.error))?;

        debug!(
            stream = %stream,
            path = %path.display(),
            samples = samples.len(),
            records = bytes.len() / self.record_length,
            "waveform file written"
        );
        Ok(path)
    }
}

fn put_code(field: &mut [u8], code: &str) {
    field.fill(b' ');
    field[..code.len()].copy_from_slice(code.as_bytes());
}

fn write_header(record: &mut [u8], header: &RecordHeader) {
    record[0..6].copy_from_slice(format!("{:06}", header.sequence).as_bytes());
    record[6] = b'D';
    record[7] = b' ';
    put_code(&mut record[8..13], &header.stream.station);
    put_code(&mut record[13..15], &header.stream.location);
    put_code(&mut record[15..18], &header.stream.channel);
    put_code(&mut record[18..20], &header.stream.network);

    let start = to_datetime(header.start_ns);
    record[20..22].copy_from_slice(&(start.year() as u16).to_be_bytes());
    record[22..24].copy_from_slice(&(start.ordinal() as u16).to_be_bytes());
    record[24] = start.hour() as u8;
    record[25] = start.minute() as u8;
    record[26] = start.second() as u8;
    record[27] = 0;
    record[28..30].copy_from_slice(&((start.nanosecond() / 100_000) as u16).to_be_bytes());

    record[30..32].copy_from_slice(&(header.sample_count as u16).to_be_bytes());
    record[32..34].copy_from_slice(&(header.sample_rate as i16).to_be_bytes());
    record[34..36].copy_from_slice(&1i16.to_be_bytes());
    // activity, I/O and quality flags stay zero; one blockette follows
    record[39] = 1;
    record[40..44].copy_from_slice(&0i32.to_be_bytes());
    record[44..46].copy_from_slice(&(DATA_OFFSET as u16).to_be_bytes());
    record[46..48].copy_from_slice(&(BLOCKETTE_1000_OFFSET as u16).to_be_bytes());

    let b = BLOCKETTE_1000_OFFSET;
    record[b..b + 2].copy_from_slice(&1000u16.to_be_bytes());
    record[b + 2..b + 4].copy_from_slice(&0u16.to_be_bytes());
    record[b + 4] = header.encoding.code();
    record[b + 5] = BIG_ENDIAN;
    record[b + 6] = header.record_length.trailing_zeros() as u8;
    record[b + 7] = 0;
}

fn pack_int32(samples: &[i32], data: &mut [u8]) -> usize {
    let count = samples.len().min(data.len() / 4);
    for (chunk, value) in data.chunks_exact_mut(4).zip(&samples[..count]) {
        chunk.copy_from_slice(&value.to_be_bytes());
    }
    count
}

fn fits_i8(d: i32) -> bool {
    (i8::MIN as i32..=i8::MAX as i32).contains(&d)
}

fn fits_i16(d: i32) -> bool {
    (i16::MIN as i32..=i16::MAX as i32).contains(&d)
}

/// Pack as many samples as fit; returns the number packed
fn pack_steim1(samples: &[i32], data: &mut [u8]) -> usize {
    let diff = |i: usize| if i == 0 { 0 } else { samples[i].wrapping_sub(samples[i - 1]) };
    let frames = data.len() / STEIM_FRAME_LEN;
    let mut index = 0;

    for frame in 0..frames {
        if index >= samples.len() {
            break;
        }
        let base = frame * STEIM_FRAME_LEN;
        let mut control = 0u32;
        // Frame 0 reserves words 1 and 2 for the integration constants
        let first_word = if frame == 0 { 3 } else { 1 };

        for word in first_word..WORDS_PER_FRAME {
            if index >= samples.len() {
                break;
            }
            let remaining = samples.len() - index;
            let (nibble, value, count) = if remaining >= 4 && (0..4).all(|k| fits_i8(diff(index + k))) {
                let bytes = [0, 1, 2, 3].map(|k| diff(index + k) as i8 as u8);
                (0b01, u32::from_be_bytes(bytes), 4)
            } else if remaining >= 2 && (0..2).all(|k| fits_i16(diff(index + k))) {
                let high = diff(index) as i16 as u16 as u32;
                let low = diff(index + 1) as i16 as u16 as u32;
                (0b10, high << 16 | low, 2)
            } else {
                (0b11, diff(index) as u32, 1)
            };

            control |= nibble << (30 - 2 * word);
            let offset = base + word * 4;
            data[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
            index += count;
        }

        data[base..base + 4].copy_from_slice(&control.to_be_bytes());
    }

    if index > 0 {
        data[4..8].copy_from_slice(&samples[0].to_be_bytes());
        data[8..12].copy_from_slice(&samples[index - 1].to_be_bytes());
    }
    index
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([bytes[offset], bytes[offset + 1]])
}

fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_be_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

fn read_code(field: &[u8]) -> Result<String, StorageError> {
    std::str::from_utf8(field)
        .map(|code| code.trim_end().to_string())
        .map_err(|_| StorageError::Corrupt("non-ASCII stream code".to_string()))
}

/// Decode one record into its header and samples
pub fn parse_record(record: &[u8]) -> Result<(RecordHeader, Vec<i32>), StorageError> {
    if record.len() < DATA_OFFSET {
        return Err(StorageError::Corrupt(format!("record of {} bytes is too short", record.len())));
    }

    let sequence = std::str::from_utf8(&record[0..6])
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
        .ok_or_else(|| StorageError::Corrupt("invalid sequence number".to_string()))?;

    let stream = StreamId {
        station: read_code(&record[8..13])?,
        location: read_code(&record[13..15])?,
        channel: read_code(&record[15..18])?,
        network: read_code(&record[18..20])?,
    };

    let year = read_u16(record, 20) as i32;
    let ordinal = read_u16(record, 22) as u32;
    let start = NaiveDate::from_yo_opt(year, ordinal)
        .and_then(|date| date.and_hms_opt(record[24] as u32, record[25] as u32, record[26] as u32))
        .ok_or_else(|| StorageError::Corrupt("invalid start time".to_string()))?;
    let start_ns = start.and_utc().timestamp() as u64 * NANOS_PER_SECOND + read_u16(record, 28) as u64 * 100_000;

    let sample_count = read_u16(record, 30) as usize;
    let factor = read_u16(record, 32) as i16;
    let multiplier = read_u16(record, 34) as i16;
    if factor <= 0 || multiplier != 1 {
        return Err(StorageError::Corrupt(format!("unsupported rate factor {} x {}", factor, multiplier)));
    }

    let data_offset = read_u16(record, 44) as usize;
    let blockette = read_u16(record, 46) as usize;
    if blockette + 8 > record.len() || read_u16(record, blockette) != 1000 {
        return Err(StorageError::Corrupt("missing blockette 1000".to_string()));
    }
    let encoding = Encoding::from_code(record[blockette + 4])
        .ok_or_else(|| StorageError::Corrupt(format!("unsupported encoding {}", record[blockette + 4])))?;
    if record[blockette + 5] != BIG_ENDIAN {
        return Err(StorageError::Corrupt("little-endian records are not supported".to_string()));
    }
    let record_length = 1usize << record[blockette + 6];
    if record_length != record.len() || data_offset >= record_length {
        return Err(StorageError::Corrupt(format!(
            "record length {} does not match {} bytes",
            record_length,
            record.len()
        )));
    }

    let data = &record[data_offset..];
    let samples = match encoding {
        Encoding::Int32 => {
            if sample_count * 4 > data.len() {
                return Err(StorageError::Corrupt("sample count exceeds record".to_string()));
            }
            (0..sample_count).map(|i| read_i32(data, i * 4)).collect()
        }
        Encoding::Steim1 => unpack_steim1(data, sample_count)?,
    };

    let header = RecordHeader {
        sequence,
        stream,
        start_ns,
        sample_count,
        sample_rate: factor as u32,
        encoding,
        record_length,
    };
    Ok((header, samples))
}

fn unpack_steim1(data: &[u8], count: usize) -> Result<Vec<i32>, StorageError> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if data.len() < STEIM_FRAME_LEN {
        return Err(StorageError::Corrupt("no Steim frames".to_string()));
    }

    let first = read_i32(data, 4);
    let last = read_i32(data, 8);
    let mut diffs = Vec::with_capacity(count);

    'frames: for frame in data.chunks_exact(STEIM_FRAME_LEN) {
        let control = read_i32(frame, 0) as u32;
        for word in 1..WORDS_PER_FRAME {
            if diffs.len() >= count {
                break 'frames;
            }
            let offset = word * 4;
            match (control >> (30 - 2 * word)) & 0b11 {
                0b01 => diffs.extend(frame[offset..offset + 4].iter().map(|b| *b as i8 as i32)),
                0b10 => {
                    diffs.push(read_u16(frame, offset) as i16 as i32);
                    diffs.push(read_u16(frame, offset + 2) as i16 as i32);
                }
                0b11 => diffs.push(read_i32(frame, offset)),
                _ => {}
            }
        }
    }

    if diffs.len() < count {
        return Err(StorageError::Corrupt(format!(
            "expected {} differences, found {}",
            count,
            diffs.len()
        )));
    }

    let mut samples = Vec::with_capacity(count);
    samples.push(first);
    for d in &diffs[1..count] {
        let previous = samples[samples.len() - 1];
        samples.push(i32::wrapping_add(previous, *d));
    }

    if samples[count - 1] != last {
        return Err(StorageError::Corrupt(format!(
            "reverse integration constant {} does not match last sample {}",
            last,
            samples[count - 1]
        )));
    }
    Ok(samples)
}

/// Read every record of a file written with a single record length
pub fn read_file(path: &Path) -> Result<Vec<(RecordHeader, Vec<i32>)>, StorageError> {
    let bytes = std::fs::read(path).map_err(|e| StorageError::io(path, e))?;
    if bytes.len() < DATA_OFFSET {
        return Err(StorageError::Corrupt(format!("{} is too short", path.display())));
    }

    let blockette = read_u16(&bytes, 46) as usize;
    if blockette + 8 > bytes.len() {
        return Err(StorageError::Corrupt("missing blockette 1000".to_string()));
    }
    let record_length = 1usize << bytes[blockette + 6];
    if record_length < DATA_OFFSET || bytes.len() % record_length != 0 {
        return Err(StorageError::Corrupt(format!(
            "file size {} is not a multiple of record length {}",
            bytes.len(),
            record_length
        )));
    }

    bytes.chunks_exact(record_length).map(parse_record).collect()
}
