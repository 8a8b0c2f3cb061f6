// tests/storage_integration.rs
//! Integration tests for miniSEED output through the writer contract

use mss_record::storage::miniseed::read_file;
use mss_record::storage::{Encoding, MiniSeedWriter, StorageError, StreamId, WaveformWriter};
use mss_record::utils::time::NANOS_PER_SECOND;

// 2024-05-01T12:00:00Z
const NOON: u64 = 1_714_564_800 * NANOS_PER_SECOND;

fn seismogram(len: usize) -> Vec<i32> {
    (0..len)
        .map(|k| {
            let t = k as f64 / 100.0;
            (8000.0 * (2.0 * std::f64::consts::PI * 1.3 * t).sin() * (-0.05 * t).exp()) as i32
        })
        .collect()
}

#[test]
fn test_both_encodings_round_trip_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let samples = seismogram(1000);

    for (encoding, record_length) in [(Encoding::Steim1, 512), (Encoding::Int32, 4096)] {
        let sub_dir = dir.path().join(format!("{:?}", encoding));
        std::fs::create_dir(&sub_dir).unwrap();
        let mut writer: Box<dyn WaveformWriter> =
            Box::new(MiniSeedWriter::new(&sub_dir, record_length, encoding).unwrap());

        let stream = StreamId::new("XX", "MSS01", "00", "002");
        let path = writer.write(&stream, NOON, 100, &samples).unwrap();

        let records = read_file(&path).unwrap();
        assert!(records.iter().all(|(header, _)| header.encoding == encoding));
        assert!(records.iter().all(|(header, _)| header.record_length == record_length));
        assert!(records.iter().all(|(header, _)| header.sample_rate == 100));
        assert_eq!(records[0].0.start_ns, NOON);

        let decoded: Vec<i32> = records.into_iter().flat_map(|(_, data)| data).collect();
        assert_eq!(decoded, samples);
    }
}

#[test]
fn test_sub_second_start_is_encoded_in_name_and_header() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MiniSeedWriter::new(dir.path(), 512, Encoding::Steim1).unwrap();
    let start = NOON + 3 * NANOS_PER_SECOND + 250_000_000;

    let stream = StreamId::new("XX", "MSSNN", "00", "001");
    let path = writer.write(&stream, start, 100, &[1, 2, 3, 4]).unwrap();

    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        "XX.MSSNN.00.001.2024-05-01T120003.250000.msd"
    );
    let records = read_file(&path).unwrap();
    assert_eq!(records[0].0.start_ns, start);
}

#[test]
fn test_successive_runs_write_separate_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut writer = MiniSeedWriter::new(dir.path(), 512, Encoding::Steim1).unwrap();
    let stream = StreamId::new("XX", "MSSNN", "00", "003");

    for k in 0..3u64 {
        writer
            .write(&stream, NOON + k * 10 * NANOS_PER_SECOND, 100, &seismogram(1000))
            .unwrap();
    }
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 3);
}

#[test]
fn test_unusable_output_dir_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let mut writer = MiniSeedWriter::new(blocker.join("mseed"), 512, Encoding::Steim1).unwrap();
    let stream = StreamId::new("XX", "MSSNN", "00", "001");

    match writer.write(&stream, NOON, 100, &[1, 2, 3]) {
        Err(StorageError::Io { path, .. }) => assert!(path.starts_with(dir.path())),
        other => panic!("expected I/O error, got {:?}", other),
    }
}
