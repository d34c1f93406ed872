//! Prometheus metrics for the recording pipeline.
//!
//! Metrics are registered lazily on first access using once_cell::Lazy.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, register_int_gauge};
use prometheus::{IntCounter, IntCounterVec, IntGauge};

/// Events accepted by the recorder, by event kind
pub static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "loadrec_events_published_total",
        "Total number of events published into the recording channel",
        &["kind"]
    )
    .expect("Failed to register events published counter")
});

/// Lines successfully written by sink writers
pub static RECORDS_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "loadrec_records_written_total",
        "Total number of records written to values files"
    )
    .expect("Failed to register records written counter")
});

/// Records whose line could not be written
pub static SINK_WRITE_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "loadrec_sink_write_failures_total",
        "Total number of records that failed to be written"
    )
    .expect("Failed to register sink write failures counter")
});

/// Times a producer found the channel full and had to wait
pub static CHANNEL_BACKPRESSURE_WAITS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "loadrec_channel_backpressure_waits_total",
        "Total number of publishes that waited for a free slot"
    )
    .expect("Failed to register backpressure counter")
});

/// Records published but not yet consumed, sampled by the consumer
pub static CHANNEL_DEPTH: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "loadrec_channel_depth",
        "Number of records waiting in the recording channel"
    )
    .expect("Failed to register channel depth gauge")
});
