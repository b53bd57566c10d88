use std::collections::BTreeMap;
use std::io::Write;

use brc_chunked::output::write_csv;
use brc_chunked::{aggregate, aggregate_with, Config, Error, FinalResult, ReadMode};
use tempfile::NamedTempFile;

fn input(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn csv(result: &FinalResult) -> String {
    let mut out = Vec::new();
    write_csv(result, &mut out).unwrap();
    String::from_utf8(out).unwrap()
}

/// Same keys, same extremes, averages equal up to summation order.
fn assert_same(actual: &FinalResult, expected: &FinalResult, context: &str) {
    assert_eq!(actual.len(), expected.len(), "{context}");
    for (key, want) in expected.iter() {
        let got = actual
            .get(key)
            .unwrap_or_else(|| panic!("{context}: missing {}", String::from_utf8_lossy(key)));
        assert_eq!((got.min, got.max), (want.min, want.max), "{context}");
        assert!((got.avg - want.avg).abs() < 1e-9, "{context}");
    }
}

/// A deterministic input with a handful of keys and uneven values.
fn measurements(lines: usize) -> Vec<u8> {
    let stations = ["Hamburg", "Bulawayo", "Palembang", "St. John's", "Cracow", "Abha", "Z"];
    let mut out = Vec::new();
    let mut seed: u64 = 42;
    for _ in 0..lines {
        seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let station = stations[(seed >> 33) as usize % stations.len()];
        let tenths = ((seed >> 11) % 1999) as i64 - 999;
        writeln!(out, "{station};{:.1}", tenths as f64 / 10.0).unwrap();
    }
    out
}

/// Reference: naive single-threaded aggregation of the same text.
fn reference(content: &[u8]) -> BTreeMap<String, (u64, f64, f64, f64)> {
    let mut map: BTreeMap<String, (u64, f64, f64, f64)> = BTreeMap::new();
    for line in std::str::from_utf8(content).unwrap().lines() {
        let Some((key, value)) = line.split_once(';') else {
            continue;
        };
        let Ok(v) = value.parse::<f64>() else {
            continue;
        };
        let e = map.entry(key.to_string()).or_insert((0, 0.0, v, v));
        e.0 += 1;
        e.1 += v;
        e.2 = e.2.min(v);
        e.3 = e.3.max(v);
    }
    map
}

#[test]
fn two_keys_end_to_end() {
    let file = input(b"A;1.0\nB;2.0\nA;3.0\n");
    let summary = aggregate_with(file.path(), &Config::default().with_chunk_size(7).with_workers(2))
        .unwrap();
    assert_eq!(summary.chunks, 3);
    assert_eq!(summary.bytes, 18);
    assert_eq!(
        csv(&summary.result),
        "location,min,max,avg\nA,1.0,3.0,2.0\nB,2.0,2.0,2.0\n"
    );
}

#[test]
fn chunking_does_not_change_the_result() {
    let content = measurements(500);
    let file = input(&content);
    let whole = aggregate_with(file.path(), &Config::default().with_workers(1)).unwrap();
    assert_eq!(whole.chunks, 1);

    let longest = content.split(|&b| b == b'\n').map(<[u8]>::len).max().unwrap() + 1;
    for chunk_size in [longest, longest + 1, 31, 64, 257, 1000] {
        for workers in [1, 3, 8] {
            for mode in [ReadMode::Positional, ReadMode::Mapped] {
                let config = Config::default()
                    .with_chunk_size(chunk_size)
                    .with_workers(workers)
                    .with_read_mode(mode);
                let summary = aggregate_with(file.path(), &config).unwrap();
                let context = format!("chunk {chunk_size}, workers {workers}, {mode:?}");
                assert_same(&summary.result, &whole.result, &context);
                assert!(summary.diagnostics.is_clean());
                assert_eq!(summary.bytes, content.len() as u64);
            }
        }
    }
}

#[test]
fn statistics_match_a_sequential_scan() {
    let content = measurements(2000);
    let file = input(&content);
    let summary = aggregate_with(file.path(), &Config::default().with_chunk_size(128).with_workers(4))
        .unwrap();
    let expected = reference(&content);

    assert_eq!(summary.result.len(), expected.len());
    for (key, (count, sum, min, max)) in expected {
        let stats = summary.result[key.as_bytes()];
        assert_eq!(stats.min, min, "{key}");
        assert_eq!(stats.max, max, "{key}");
        assert!((stats.avg - sum / count as f64).abs() < 1e-9, "{key}");
        assert!(stats.min <= stats.avg && stats.avg <= stats.max, "{key}");
    }
}

#[test]
fn empty_and_single_record_files() {
    let empty = input(b"");
    let summary = aggregate(empty.path()).unwrap();
    assert!(summary.result.is_empty());
    assert_eq!(summary.chunks, 0);
    assert_eq!(csv(&summary.result), "location,min,max,avg\n");

    for content in [&b"Oslo;-4.2\n"[..], &b"Oslo;-4.2"[..]] {
        let single = input(content);
        let summary = aggregate_with(single.path(), &Config::default().with_chunk_size(4).with_long_records(true))
            .unwrap();
        assert_eq!(csv(&summary.result), "location,min,max,avg\nOslo,-4.2,-4.2,-4.2\n");
    }
}

#[test]
fn last_record_without_terminator() {
    let file = input(b"A;1.0\nB;2.0\nA;3.0");
    for chunk_size in 6..=20 {
        let config = Config::default().with_chunk_size(chunk_size).with_workers(3);
        let summary = aggregate_with(file.path(), &config).unwrap();
        assert_eq!(
            csv(&summary.result),
            "location,min,max,avg\nA,1.0,3.0,2.0\nB,2.0,2.0,2.0\n",
            "chunk {chunk_size}"
        );
    }
}

#[test]
fn malformed_line_is_skipped_and_counted() {
    let clean = input(b"A;1.0\nB;2.0\nA;3.0\n");
    let dirty = input(b"A;1.0\nB;2.0\nno separator here\nA;3.0\n");
    let config = Config::default().with_chunk_size(19).with_workers(2);

    let expected = aggregate_with(clean.path(), &config).unwrap();
    let summary = aggregate_with(dirty.path(), &config).unwrap();

    assert_eq!(summary.diagnostics.malformed, 1);
    assert_eq!(summary.diagnostics.samples.len(), 1);
    assert_eq!(summary.diagnostics.samples[0].offset, 12);
    assert_eq!(summary.diagnostics.samples[0].line, "no separator here");
    assert_eq!(csv(&summary.result), csv(&expected.result));
}

#[test]
fn records_longer_than_a_chunk_fail_the_run() {
    let file = input(b"A;1.0\nAVeryLongStationName;12.5\nB;2.0\n");
    let config = Config::default().with_chunk_size(8).with_workers(4);
    match aggregate_with(file.path(), &config) {
        Err(Error::ChunkTooSmall { chunk_size, .. }) => assert_eq!(chunk_size, 8),
        other => panic!("expected ChunkTooSmall, got {:?}", other.map(|s| s.result)),
    }

    let summary = aggregate_with(file.path(), &config.with_long_records(true)).unwrap();
    assert_eq!(
        csv(&summary.result),
        "location,min,max,avg\nA,1.0,1.0,1.0\nAVeryLongStationName,12.5,12.5,12.5\nB,2.0,2.0,2.0\n"
    );
}

#[test]
fn long_record_is_rejected_wherever_it_sits() {
    let config = Config::default().with_chunk_size(8).with_workers(2);
    for content in [&b"A;1\nABCDEFG;1.5\n"[..], &b"ABCDEFG;1.5\nA;1\n"[..]] {
        let file = input(content);
        assert!(
            matches!(
                aggregate_with(file.path(), &config),
                Err(Error::ChunkTooSmall { chunk_size: 8, .. })
            ),
            "{}",
            String::from_utf8_lossy(content)
        );

        let summary = aggregate_with(file.path(), &config.clone().with_long_records(true)).unwrap();
        assert_eq!(
            csv(&summary.result),
            "location,min,max,avg\nA,1.0,1.0,1.0\nABCDEFG,1.5,1.5,1.5\n"
        );
    }
}

#[test]
fn average_never_leaves_the_observed_range() {
    let file = input(b"X;0.1\nX;0.1\nX;0.1\nY;0.7\nY;0.7\nY;0.1\nY;0.7\n");
    for chunk_size in [6, 7, 64] {
        let config = Config::default().with_chunk_size(chunk_size).with_workers(2);
        let summary = aggregate_with(file.path(), &config).unwrap();
        for stats in summary.result.values() {
            assert!(stats.min <= stats.avg && stats.avg <= stats.max, "chunk {chunk_size}");
        }
        assert_eq!(summary.result[&b"X"[..]].avg, 0.1);
    }
}

#[test]
fn unreadable_input_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("measurements.txt");
    assert!(matches!(
        aggregate(&missing),
        Err(Error::InputUnreadable { .. })
    ));
}

#[test]
fn invalid_config_is_rejected_before_reading() {
    let file = input(b"A;1.0\n");
    assert!(matches!(
        aggregate_with(file.path(), &Config::default().with_workers(0)),
        Err(Error::InvalidConfig(_))
    ));
}

#[test]
fn traces_cover_every_chunk() {
    let content = measurements(300);
    let file = input(&content);
    let summary = aggregate_with(file.path(), &Config::default().with_chunk_size(100).with_workers(3))
        .unwrap();
    assert_eq!(summary.traces.len() as u64, summary.chunks);
    for (i, trace) in summary.traces.iter().enumerate() {
        assert_eq!(trace.ordinal, i as u64);
        assert_eq!(trace.offset, i as u64 * 100);
        assert!(trace.worker < 3);
    }
    let total: usize = summary.traces.iter().map(|t| t.len).sum();
    assert_eq!(total, content.len());
}
