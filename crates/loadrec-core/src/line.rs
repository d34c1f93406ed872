//! Flat line format of values files.
//!
//! One record per line, six fields joined by [`DELIMITER`], no header and no
//! escaping:
//!
//! ```text
//! <eventTimestampMillis>|<method>|<path>|<elapsedNanos>|<statusCode>|<bodySizeBytes>
//! ```

use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

use crate::error::{CoreError, CoreResult};
use crate::event::EventRecord;

/// Field separator of values files.
pub const DELIMITER: char = '|';

const FIELD_COUNT: usize = 6;

/// Appends the line for `record` to `out`, without a line terminator.
pub fn format_line(record: &EventRecord, out: &mut String) {
    // Writing into a String cannot fail.
    let _ = write!(
        out,
        "{ts}{d}{method}{d}{path}{d}{time}{d}{status}{d}{size}",
        ts = record.event_timestamp(),
        method = record.method(),
        path = record.path(),
        time = record.time(),
        status = record.status(),
        size = record.size(),
        d = DELIMITER,
    );
}

impl EventRecord {
    /// Returns the values-file line for this record, without terminator.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(64);
        format_line(self, &mut line);
        line
    }
}

/// Parses one values-file line (a trailing `\n` or `\r\n` is tolerated).
///
/// # Errors
///
/// Returns [`CoreError::DeserializationError`] when the line does not hold
/// exactly six fields or a numeric field does not parse, and
/// [`CoreError::ValidationError`] when the textual fields are invalid.
pub fn parse_line(line: &str) -> CoreResult<EventRecord> {
    let line = line.trim_end_matches(['\n', '\r']);
    let fields: Vec<&str> = line.split(DELIMITER).collect();
    if fields.len() != FIELD_COUNT {
        return Err(CoreError::DeserializationError(format!(
            "expected {FIELD_COUNT} fields, found {} in `{line}`",
            fields.len()
        )));
    }

    EventRecord::new(
        parse_number(fields[0], "timestamp")?,
        fields[1],
        fields[2],
        parse_number(fields[3], "time")?,
        parse_number(fields[4], "status")?,
        parse_number(fields[5], "size")?,
    )
}

fn parse_number<T>(raw: &str, field: &str) -> CoreResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>().map_err(|e| {
        CoreError::DeserializationError(format!("invalid {field} `{raw}`: {e}"))
    })
}

/// Lazy reader over the records of a values file.
///
/// Blank lines are skipped. Parse errors carry the 1-based line number.
pub struct ValuesFileReader<R> {
    lines: std::io::Lines<R>,
    line_no: usize,
}

impl ValuesFileReader<BufReader<File>> {
    /// Opens a values file for reading.
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let file = File::open(path.as_ref())?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> ValuesFileReader<R> {
    /// Wraps any buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
        }
    }
}

impl<R: BufRead> Iterator for ValuesFileReader<R> {
    type Item = CoreResult<EventRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let line_no = self.line_no;
            return Some(parse_line(&line).map_err(|e| match e {
                CoreError::DeserializationError(msg) => {
                    CoreError::DeserializationError(format!("line {line_no}: {msg}"))
                }
                CoreError::ValidationError(msg) => {
                    CoreError::ValidationError(format!("line {line_no}: {msg}"))
                }
                other => other,
            }));
        }
    }
}

/// Reads every record of a values file into memory.
pub fn read_values_file(path: impl AsRef<Path>) -> CoreResult<Vec<EventRecord>> {
    ValuesFileReader::open(path)?.collect()
}
