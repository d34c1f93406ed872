//! Core domain types for recording load generator response times.
//!
//! This crate owns the event model, the flat line format used by values
//! files, the listener capability trait with its multiplexer, per-path
//! summaries, configuration and metrics. The lock-free recording pipeline
//! itself lives in `loadrec-storage`.

pub mod config;
pub mod error;
pub mod event;
pub mod line;
pub mod listener;
pub mod metrics;
pub mod summary;

pub use config::{ChannelConfig, LoadrecConfig, LoggingConfig, RecorderConfig, WaitStrategyKind};
pub use error::{CoreError, CoreResult};
pub use event::{EventKind, EventRecord, Values};
pub use line::{format_line, parse_line, read_values_file, ValuesFileReader, DELIMITER};
pub use listener::{ListenerMux, ValueListener};
pub use summary::{CollectorInformation, SummaryListener, SummaryReport};
