//! End-to-end tests for the values file writer
//!
//! Covers:
//! 1. Per-producer ordering across a long run
//! 2. No loss when the ring buffer is far smaller than the run
//! 3. Everything published before stop is on disk when stop returns
//! 4. Rehydrating a serialized writer appends to the same file
//! 5. Fan-out through the listener multiplexer

#![cfg(not(feature = "loom"))]

use std::fs;
use std::sync::Arc;

use loadrec_core::{
    read_values_file, ChannelConfig, CoreError, CoreResult, EventKind, ListenerMux,
    SummaryListener, ValueListener, Values, WaitStrategyKind,
};
use loadrec_storage::{ValuesFileWriter, WriteReport, WriterState};
use parking_lot::Mutex;
use tempfile::TempDir;

fn values(ts: u64, path: &str, time: u64) -> Values {
    Values::new(ts, "GET", path, time, 200, 512)
}

fn small_channel(capacity: usize, wait_strategy: WaitStrategyKind) -> ChannelConfig {
    ChannelConfig {
        capacity,
        wait_strategy,
        ..Default::default()
    }
}

#[test]
fn test_three_events_written_in_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");
    let mut writer = ValuesFileWriter::new(&path).unwrap();

    writer
        .on_response_time_value(&Values::new(1_700_000_000_000, "GET", "/a", 1_500_000, 200, 512))
        .unwrap();
    writer
        .on_response_time_value(&Values::new(1_700_000_000_010, "POST", "/b", 2_000_000, 201, 0))
        .unwrap();
    writer
        .on_latency_time_value(&Values::new(1_700_000_000_020, "GET", "/c", 300_000, 404, 12))
        .unwrap();
    let report = writer.stop().unwrap();

    assert_eq!(report, WriteReport { written: 3, failures: 0 });
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "1700000000000|GET|/a|1500000|200|512\n\
         1700000000010|POST|/b|2000000|201|0\n\
         1700000000020|GET|/c|300000|404|12\n"
    );
}

#[test]
fn test_order_preserved_over_long_run() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");
    let mut writer =
        ValuesFileWriter::with_channel(&path, small_channel(64, WaitStrategyKind::Yielding))
            .unwrap();

    const N: u64 = 50_000;
    for i in 0..N {
        writer
            .on_response_time_value(&values(i, "/ordered", i * 10))
            .unwrap();
    }
    writer.stop().unwrap();

    let records = read_values_file(&path).unwrap();
    assert_eq!(records.len() as u64, N);
    for (i, record) in records.iter().enumerate() {
        assert_eq!(record.event_timestamp(), i as u64);
        assert_eq!(record.time(), i as u64 * 10);
    }
}

#[test]
fn test_no_loss_under_backpressure() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");
    let mut writer =
        ValuesFileWriter::with_channel(&path, small_channel(4, WaitStrategyKind::Parking))
            .unwrap();

    const N: u64 = 20_000;
    for i in 0..N {
        let kind = if i % 2 == 0 {
            EventKind::ResponseTime
        } else {
            EventKind::LatencyTime
        };
        writer.publish(kind, &values(i, "/pressure", 1)).unwrap();
    }
    let report = writer.stop().unwrap();

    assert_eq!(report.written, N);
    assert_eq!(report.failures, 0);
    assert_eq!(read_values_file(&path).unwrap().len() as u64, N);
}

#[test]
fn test_stop_drains_everything_published() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");
    let mut writer =
        ValuesFileWriter::with_channel(&path, small_channel(1024, WaitStrategyKind::BusySpin))
            .unwrap();

    // Publish a full buffer's worth and stop right away.
    for i in 0..1024 {
        writer.on_response_time_value(&values(i, "/drain", 7)).unwrap();
    }
    writer.stop().unwrap();

    let contents = fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), 1024);
    assert!(contents.ends_with('\n'));
}

#[test]
fn test_values_after_stop_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");
    let mut writer = ValuesFileWriter::new(&path).unwrap();

    writer.on_response_time_value(&values(1, "/before", 1)).unwrap();
    writer.stop().unwrap();
    assert_eq!(writer.state(), WriterState::Stopped);

    let err = writer
        .on_response_time_value(&values(2, "/after", 1))
        .unwrap_err();
    assert!(matches!(err, CoreError::InvalidState { .. }));

    let records = read_values_file(&path).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].path(), "/before");
}

#[test]
fn test_rehydrated_writer_appends() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");

    let mut first = ValuesFileWriter::new(&path).unwrap();
    first.on_response_time_value(&values(1, "/first", 1)).unwrap();
    let json = serde_json::to_string(&first).unwrap();
    first.stop().unwrap();

    let mut second: ValuesFileWriter = serde_json::from_str(&json).unwrap();
    assert_eq!(second.state(), WriterState::Uninitialized);
    assert_eq!(second.file_path(), first.file_path());

    second.activate().unwrap();
    second.on_response_time_value(&values(2, "/second", 1)).unwrap();
    second.stop().unwrap();

    let paths: Vec<_> = read_values_file(&path)
        .unwrap()
        .iter()
        .map(|r| r.path().to_string())
        .collect();
    assert_eq!(paths, vec!["/first", "/second"]);
}

#[test]
fn test_deserialized_writer_without_channel_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let json = serde_json::json!({ "file_path": dir.path().join("v.txt") });

    let writer: ValuesFileWriter = serde_json::from_value(json).unwrap();
    assert_eq!(writer.channel_config(), &ChannelConfig::default());
    assert_eq!(writer.state(), WriterState::Uninitialized);
}

#[test]
fn test_setup_failure_leaves_writer_uninitialized() {
    let dir = TempDir::new().unwrap();
    let mut writer = ValuesFileWriter::configure(
        dir.path().join("no-such-dir").join("values.txt"),
        ChannelConfig::default(),
    )
    .unwrap();

    let err = writer.activate().unwrap_err();
    assert!(matches!(err, CoreError::Setup { .. }));
    assert!(err.to_string().contains("no-such-dir"));
    assert_eq!(writer.state(), WriterState::Uninitialized);
}

/// Lets the test read a listener after handing it to the multiplexer.
struct Shared<L>(Arc<Mutex<L>>);

impl<L: ValueListener> ValueListener for Shared<L> {
    fn on_value(&mut self, kind: EventKind, values: &Values) -> CoreResult<()> {
        self.0.lock().on_value(kind, values)
    }

    fn on_stop(&mut self) -> CoreResult<()> {
        self.0.lock().on_stop()
    }
}

#[test]
fn test_mux_feeds_file_and_summary() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("values.txt");

    let writer = ValuesFileWriter::new(&path).unwrap();
    let summary = Arc::new(Mutex::new(SummaryListener::new().unwrap()));

    let mut mux = ListenerMux::new()
        .with(&EventKind::ALL, writer)
        .with(&[EventKind::ResponseTime], Shared(Arc::clone(&summary)));

    mux.on_response_time_value(&values(1, "/a", 1_000)).unwrap();
    mux.on_response_time_value(&values(2, "/a", 3_000)).unwrap();
    mux.on_latency_time_value(&values(3, "/a", 500)).unwrap();
    mux.on_stop().unwrap();

    assert_eq!(read_values_file(&path).unwrap().len(), 3);

    let summary = summary.lock();
    assert_eq!(summary.response_count("/a"), 2);
    let report = summary.report();
    let a = &report.per_path["/a"];
    assert_eq!(a.min_value, 1_000);
    assert_eq!(a.end_timestamp, 2);
}
