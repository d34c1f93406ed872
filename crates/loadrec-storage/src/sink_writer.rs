//! Consumer side of the recording pipeline.
//!
//! A [`SinkWriter`] owns the output stream and turns every [`EventRecord`]
//! into one values-file line. [`spawn_sink_writer`] drains a ring buffer
//! consumer on a dedicated thread; that thread is the only writer of the
//! stream.

use std::io::{self, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use loadrec_core::metrics::{CHANNEL_DEPTH, RECORDS_WRITTEN, SINK_WRITE_FAILURES};
use loadrec_core::{format_line, EventRecord};
use serde::{Deserialize, Serialize};

use crate::ring_buffer::Consumer;

// Depth gauge sampling period, in records.
const DEPTH_SAMPLE_EVERY: u64 = 256;

/// Live counters of a sink writer, readable from any thread.
#[derive(Debug, Default)]
pub struct WriterStats {
    written: AtomicU64,
    failures: AtomicU64,
}

impl WriterStats {
    /// Records written successfully.
    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    /// Records whose line could not be written.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> WriteReport {
        WriteReport {
            written: self.written(),
            failures: self.failures(),
        }
    }
}

/// Point-in-time copy of [`WriterStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReport {
    pub written: u64,
    pub failures: u64,
}

/// Formats records as values-file lines and writes them to `W`.
///
/// `SinkWriter` does no buffering of its own; wrap files in a `BufWriter`.
pub struct SinkWriter<W: Write> {
    out: W,
    line: String,
    stats: Arc<WriterStats>,
}

impl<W: Write> SinkWriter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            line: String::with_capacity(128),
            stats: Arc::new(WriterStats::default()),
        }
    }

    /// Shared handle on this writer's counters.
    pub fn stats(&self) -> Arc<WriterStats> {
        Arc::clone(&self.stats)
    }

    /// Writes one terminated line for `record` with a single `write_all`.
    pub fn write_record(&mut self, record: &EventRecord) -> io::Result<()> {
        self.line.clear();
        format_line(record, &mut self.line);
        self.line.push('\n');
        self.out.write_all(self.line.as_bytes())
    }

    /// Writes `record`, containing any failure to this record.
    ///
    /// Failures are logged and counted; they never stop the writer.
    pub fn record(&mut self, record: &EventRecord) {
        match self.write_record(record) {
            Ok(()) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
                RECORDS_WRITTEN.inc();
            }
            Err(e) => {
                let failures = self.stats.failures.fetch_add(1, Ordering::Relaxed) + 1;
                SINK_WRITE_FAILURES.inc();
                tracing::warn!(
                    error = %e,
                    path = record.path(),
                    event_timestamp = record.event_timestamp(),
                    failures,
                    "Failed to write values record"
                );
            }
        }
    }

    /// Drains `consumer` until it is closed and empty, then flushes.
    pub fn run(mut self, consumer: &mut Consumer<EventRecord>) -> io::Result<W> {
        let mut seen: u64 = 0;
        while consumer.consume_with(|record| self.record(record)).is_some() {
            seen += 1;
            if seen % DEPTH_SAMPLE_EVERY == 0 {
                CHANNEL_DEPTH.set(consumer.len() as i64);
            }
        }
        CHANNEL_DEPTH.set(0);
        self.finish()
    }

    /// Flushes the stream and hands it back.
    pub fn finish(mut self) -> io::Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Handle on a running sink writer thread.
pub struct SinkWriterHandle<W> {
    join: JoinHandle<io::Result<W>>,
    stats: Arc<WriterStats>,
}

impl<W> SinkWriterHandle<W> {
    pub fn stats(&self) -> &Arc<WriterStats> {
        &self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the thread to drain the channel and flush.
    ///
    /// The channel's producer must be closed first or this never returns.
    pub fn join(self) -> io::Result<W> {
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(io::Error::other("sink writer thread panicked")),
        }
    }
}

/// Spawns a named thread draining `consumer` into `writer`.
pub fn spawn_sink_writer<W>(
    mut consumer: Consumer<EventRecord>,
    writer: SinkWriter<W>,
    thread_name: &str,
) -> io::Result<SinkWriterHandle<W>>
where
    W: Write + Send + 'static,
{
    let stats = writer.stats();
    let join = thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || writer.run(&mut consumer))?;

    Ok(SinkWriterHandle { join, stats })
}
