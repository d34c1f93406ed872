//! Values file writer: the listener that records every response-time and
//! latency-time value of a run into a flat values file.
//!
//! # Lifecycle
//! - `configure` stores the persistent part (file path, channel config);
//!   the writer is `Uninitialized`.
//! - `activate` opens the file in append mode, builds the ring buffer and
//!   spawns the sink writer thread; the writer is `Running`.
//! - `stop` closes the ring buffer, waits for the sink writer to drain it,
//!   flushes, syncs and closes the file; the writer is `Stopped` for good.
//!
//! Only the persistent part is serialized. A deserialized writer is
//! `Uninitialized` and must be activated again, which reopens the same file
//! in append mode.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use loadrec_core::config::{ChannelConfig, RecorderConfig};
use loadrec_core::metrics::{CHANNEL_BACKPRESSURE_WAITS, EVENTS_PUBLISHED};
use loadrec_core::{CoreError, CoreResult, EventKind, EventRecord, ValueListener, Values};
use prometheus::IntCounter;
use serde::{Deserialize, Serialize};

use crate::ring_buffer::{channel, Producer, WaitStrategy};
use crate::sink_writer::{spawn_sink_writer, SinkWriter, SinkWriterHandle, WriteReport};

const WRITER_THREAD_NAME: &str = "values-file-writer";

/// Lifecycle state of a [`ValuesFileWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Uninitialized,
    Running,
    Stopped,
}

struct Runtime {
    producer: Producer<EventRecord>,
    writer: SinkWriterHandle<BufWriter<File>>,
    // Label lookups stay off the publish path.
    response_time_published: IntCounter,
    latency_time_published: IntCounter,
}

impl Runtime {
    fn published_counter(&self, kind: EventKind) -> &IntCounter {
        match kind {
            EventKind::ResponseTime => &self.response_time_published,
            EventKind::LatencyTime => &self.latency_time_published,
        }
    }
}

/// Records timing values into a values file without blocking on disk I/O.
#[derive(Serialize, Deserialize)]
pub struct ValuesFileWriter {
    file_path: PathBuf,

    #[serde(default)]
    channel: ChannelConfig,

    #[serde(skip)]
    runtime: Option<Runtime>,

    #[serde(skip)]
    stopped: bool,
}

impl ValuesFileWriter {
    /// Configures and activates a writer for `path` with the default channel.
    ///
    /// # Errors
    /// Returns [`CoreError::Setup`] if the file cannot be opened or the
    /// writer thread cannot be started.
    pub fn new(path: impl AsRef<Path>) -> CoreResult<Self> {
        Self::with_channel(path, ChannelConfig::default())
    }

    /// Configures and activates a writer with an explicit channel config.
    pub fn with_channel(path: impl AsRef<Path>, channel: ChannelConfig) -> CoreResult<Self> {
        let mut writer = Self::configure(path, channel)?;
        writer.activate()?;
        Ok(writer)
    }

    /// Configures and activates a writer from the `recorder` config section.
    pub fn from_config(config: &RecorderConfig) -> CoreResult<Self> {
        let path = config.file_path.as_ref().ok_or_else(|| {
            CoreError::ValidationError("recorder.file_path is not set".to_string())
        })?;
        Self::with_channel(path, config.channel.clone())
    }

    /// Stores the persistent configuration without starting anything.
    ///
    /// Relative paths are resolved against the current directory so that a
    /// rehydrated writer reopens the same file.
    pub fn configure(path: impl AsRef<Path>, channel: ChannelConfig) -> CoreResult<Self> {
        let path = path.as_ref();
        let file_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|e| CoreError::setup_io(path, e))?
                .join(path)
        };

        Ok(Self {
            file_path,
            channel,
            runtime: None,
            stopped: false,
        })
    }

    /// Builds the runtime state from the stored configuration.
    ///
    /// # Errors
    /// - [`CoreError::InvalidState`] if the writer is running or stopped
    /// - [`CoreError::Setup`] if the channel config is invalid, the file
    ///   cannot be opened or the thread cannot be spawned; nothing is left
    ///   running in that case
    pub fn activate(&mut self) -> CoreResult<()> {
        match self.state() {
            WriterState::Running => {
                return Err(CoreError::invalid_state("values file writer is already running"))
            }
            WriterState::Stopped => {
                return Err(CoreError::invalid_state(
                    "values file writer was stopped and cannot be reactivated",
                ))
            }
            WriterState::Uninitialized => {}
        }

        self.channel
            .validate()
            .map_err(|msg| CoreError::setup(&self.file_path, msg))?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| CoreError::setup_io(&self.file_path, e))?;

        let (producer, consumer) = channel(self.channel.capacity, WaitStrategy::from(&self.channel))
            .map_err(|e| CoreError::setup(&self.file_path, e.to_string()))?;

        let writer = spawn_sink_writer(
            consumer,
            SinkWriter::new(BufWriter::new(file)),
            WRITER_THREAD_NAME,
        )
        .map_err(|e| CoreError::setup_io(&self.file_path, e))?;

        self.runtime = Some(Runtime {
            producer,
            writer,
            response_time_published: EVENTS_PUBLISHED
                .with_label_values(&[EventKind::ResponseTime.as_str()]),
            latency_time_published: EVENTS_PUBLISHED
                .with_label_values(&[EventKind::LatencyTime.as_str()]),
        });

        tracing::info!(
            file_path = %self.file_path.display(),
            capacity = self.channel.capacity,
            wait_strategy = ?self.channel.wait_strategy,
            "Values file writer activated"
        );
        Ok(())
    }

    pub fn state(&self) -> WriterState {
        if self.runtime.is_some() {
            WriterState::Running
        } else if self.stopped {
            WriterState::Stopped
        } else {
            WriterState::Uninitialized
        }
    }

    /// Absolute path of the values file.
    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn channel_config(&self) -> &ChannelConfig {
        &self.channel
    }

    /// Live counters while running.
    pub fn stats(&self) -> Option<WriteReport> {
        self.runtime
            .as_ref()
            .map(|rt| rt.writer.stats().snapshot())
    }

    /// Number of times a publish had to wait for a free slot.
    pub fn backpressure_waits(&self) -> u64 {
        self.runtime
            .as_ref()
            .map_or(0, |rt| rt.producer.backpressure_waits())
    }

    pub fn on_response_time_value(&mut self, values: &Values) -> CoreResult<()> {
        self.publish(EventKind::ResponseTime, values)
    }

    pub fn on_latency_time_value(&mut self, values: &Values) -> CoreResult<()> {
        self.publish(EventKind::LatencyTime, values)
    }

    /// Validates `values` and publishes one record.
    ///
    /// Waits only while the ring buffer is full. Write failures on the sink
    /// side are never reported here.
    pub fn publish(&mut self, kind: EventKind, values: &Values) -> CoreResult<()> {
        let runtime = self.runtime.as_mut().ok_or_else(|| {
            CoreError::invalid_state(format!(
                "values file writer for `{}` is not running",
                self.file_path.display()
            ))
        })?;

        let record = EventRecord::try_from(values)?;

        let waits_before = runtime.producer.backpressure_waits();
        runtime.producer.publish(record).map_err(|e| {
            CoreError::internal(format!("cannot publish {kind} value: {e}"))
        })?;
        if runtime.producer.backpressure_waits() != waits_before {
            CHANNEL_BACKPRESSURE_WAITS.inc();
        }

        runtime.published_counter(kind).inc();
        Ok(())
    }

    /// Drains every published record, then flushes and closes the file.
    ///
    /// # Errors
    /// - [`CoreError::InvalidState`] if the writer is not running
    /// - [`CoreError::Shutdown`] if flushing, syncing or closing fails or the
    ///   writer thread died
    pub fn stop(&mut self) -> CoreResult<WriteReport> {
        let runtime = self.runtime.take().ok_or_else(|| {
            CoreError::invalid_state(format!(
                "values file writer for `{}` is not running",
                self.file_path.display()
            ))
        })?;
        self.stopped = true;

        let report = shutdown(&self.file_path, runtime)?;
        tracing::info!(
            file_path = %self.file_path.display(),
            written = report.written,
            failures = report.failures,
            "Values file writer stopped"
        );
        Ok(report)
    }
}

fn shutdown(file_path: &Path, runtime: Runtime) -> CoreResult<WriteReport> {
    let Runtime {
        producer, writer, ..
    } = runtime;
    producer.close();

    let stats = writer.stats().clone();
    let buffered = writer
        .join()
        .map_err(|e| CoreError::shutdown_io(file_path, e))?;
    let file = buffered
        .into_inner()
        .map_err(|e| CoreError::shutdown_io(file_path, e.into_error()))?;
    file.sync_all()
        .map_err(|e| CoreError::shutdown_io(file_path, e))?;
    drop(file);

    Ok(stats.snapshot())
}

impl Drop for ValuesFileWriter {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            if let Err(e) = shutdown(&self.file_path, runtime) {
                tracing::error!(
                    file_path = %self.file_path.display(),
                    error = %e,
                    "Values file writer dropped while running and failed to close"
                );
            }
        }
    }
}

impl fmt::Debug for ValuesFileWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValuesFileWriter")
            .field("file_path", &self.file_path)
            .field("channel", &self.channel)
            .field("state", &self.state())
            .finish()
    }
}

impl ValueListener for ValuesFileWriter {
    fn on_value(&mut self, kind: EventKind, values: &Values) -> CoreResult<()> {
        self.publish(kind, values)
    }

    fn on_stop(&mut self) -> CoreResult<()> {
        self.stop().map(|_| ())
    }
}
