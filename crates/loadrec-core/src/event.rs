use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::line::DELIMITER;

/// Kind of timing event emitted by the load generator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Request sent to response received.
    ResponseTime,
    /// Connection establishment and queueing before the request is sent.
    LatencyTime,
}

impl EventKind {
    /// All kinds, in declaration order.
    pub const ALL: [EventKind; 2] = [EventKind::ResponseTime, EventKind::LatencyTime];

    /// Stable label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ResponseTime => "response_time",
            Self::LatencyTime => "latency_time",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw values handed over by the load generator for one completed exchange.
///
/// Nothing is validated here; conversion into an [`EventRecord`] does that.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Values {
    /// Epoch milliseconds at which the event occurred.
    pub event_timestamp: u64,
    /// HTTP method, e.g. `GET`.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Elapsed time in nanoseconds.
    pub time: u64,
    /// HTTP status code.
    pub status: u16,
    /// Response body size in bytes.
    pub size: u64,
}

impl Values {
    /// Convenience constructor mirroring the field order of the values file.
    #[must_use]
    pub fn new(
        event_timestamp: u64,
        method: impl Into<String>,
        path: impl Into<String>,
        time: u64,
        status: u16,
        size: u64,
    ) -> Self {
        Self {
            event_timestamp,
            method: method.into(),
            path: path.into(),
            time,
            status,
            size,
        }
    }
}

/// One captured request/response measurement.
///
/// Records are immutable once built. The textual fields never contain the
/// values-file delimiter or a line terminator, so every record maps to
/// exactly one line.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Values", into = "Values")]
pub struct EventRecord {
    event_timestamp: u64,
    method: String,
    path: String,
    time: u64,
    status: u16,
    size: u64,
}

impl EventRecord {
    /// Builds a record, validating the textual fields.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValidationError`] when `method` is empty or when
    /// `method`/`path` contain the delimiter or a line terminator.
    pub fn new(
        event_timestamp: u64,
        method: impl Into<String>,
        path: impl Into<String>,
        time: u64,
        status: u16,
        size: u64,
    ) -> CoreResult<Self> {
        let method = method.into();
        let path = path.into();

        if method.is_empty() {
            return Err(CoreError::ValidationError(
                "event method must not be empty".to_string(),
            ));
        }
        check_field("method", &method)?;
        check_field("path", &path)?;

        Ok(Self {
            event_timestamp,
            method,
            path,
            time,
            status,
            size,
        })
    }

    #[must_use]
    pub fn event_timestamp(&self) -> u64 {
        self.event_timestamp
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Elapsed time in nanoseconds.
    #[must_use]
    pub fn time(&self) -> u64 {
        self.time
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Response body size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }
}

fn check_field(name: &str, value: &str) -> CoreResult<()> {
    if let Some(bad) = value
        .chars()
        .find(|c| *c == DELIMITER || *c == '\n' || *c == '\r')
    {
        return Err(CoreError::ValidationError(format!(
            "event {name} `{}` contains forbidden character {bad:?}",
            value.escape_debug()
        )));
    }
    Ok(())
}

impl TryFrom<Values> for EventRecord {
    type Error = CoreError;

    fn try_from(values: Values) -> CoreResult<Self> {
        Self::new(
            values.event_timestamp,
            values.method,
            values.path,
            values.time,
            values.status,
            values.size,
        )
    }
}

impl TryFrom<&Values> for EventRecord {
    type Error = CoreError;

    fn try_from(values: &Values) -> CoreResult<Self> {
        Self::new(
            values.event_timestamp,
            values.method.as_str(),
            values.path.as_str(),
            values.time,
            values.status,
            values.size,
        )
    }
}

impl From<EventRecord> for Values {
    fn from(record: EventRecord) -> Self {
        Self {
            event_timestamp: record.event_timestamp,
            method: record.method,
            path: record.path,
            time: record.time,
            status: record.status,
            size: record.size,
        }
    }
}
