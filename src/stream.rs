//! Streaming tailed records to a writer, one line per record.
//!
//! This is the consumer side of a [`Tailer`]: it drains `out()` while
//! watching a caller stop signal, renders each record as text or JSON, and
//! reports the tailer's terminal error if the tail ends underneath it.

use crate::error::StreamError;
use crate::record::ChangeRecord;
use crate::tailer::Tailer;
use crossbeam_channel::{select, Receiver};
use serde::Serialize;
use serde_json::Value;
use std::io::Write;
use tracing::{debug, warn};

/// Output line format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StreamFormat {
    /// `"<ns> <secs>:<inc> <op> <id>"`
    #[default]
    Text,
    /// One JSON object per line, payloads decoded.
    Json,
}

/// Streaming parameters.
#[derive(Clone, Debug, Default)]
pub struct StreamParams {
    pub format: StreamFormat,

    /// Return after this many records (None or `Some(0)` = until stopped).
    pub max_lines: Option<usize>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    ns: &'a str,
    ts: String,
    op: &'a str,
    id: i64,
    v: i32,
    #[serde(skip_serializing_if = "Value::is_null")]
    o: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    o2: Value,
}

/// Write records from `tailer` to `writer` until `stop` fires, `max_lines`
/// records have been written, or the tailer ends.
///
/// Returns the number of records written. If the tailer ends after a clean
/// stop the stream ends successfully too; if it ends because the store
/// failed the result is [`StreamError::TailerStopped`] carrying that error.
pub fn stream_records<W: Write>(
    tailer: &Tailer,
    writer: &mut W,
    params: &StreamParams,
    stop: &Receiver<()>,
) -> Result<usize, StreamError> {
    let max_lines = params.max_lines.filter(|&max| max > 0);
    let mut lines = 0usize;

    loop {
        if max_lines.is_some_and(|max| lines >= max) {
            return Ok(lines);
        }

        select! {
            recv(stop) -> _ => {
                debug!(lines, "log stream stopped by caller");
                return Ok(lines);
            }
            recv(tailer.out()) -> msg => {
                let Ok(record) = msg else {
                    return match tailer.err() {
                        Some(err) => Err(StreamError::TailerStopped(Some(err))),
                        None => {
                            debug!(lines, "log stream ended with tailer");
                            Ok(lines)
                        }
                    };
                };
                write_record(writer, &record, params.format)?;
                lines += 1;
            }
        }
    }
}

/// Render one record in the given format, newline terminated.
pub fn write_record<W: Write>(
    writer: &mut W,
    record: &ChangeRecord,
    format: StreamFormat,
) -> Result<(), StreamError> {
    match format {
        StreamFormat::Text => {
            writeln!(
                writer,
                "{} {} {} {}",
                record.namespace, record.timestamp, record.kind, record.operation_id
            )?;
        }
        StreamFormat::Json => {
            let line = JsonLine {
                ns: &record.namespace,
                ts: record.timestamp.to_string(),
                op: record.kind.as_code(),
                id: record.operation_id,
                v: record.schema_version,
                o: decoded(record, ChangeRecord::decode_object::<Value>),
                o2: decoded(record, ChangeRecord::decode_update::<Value>),
            };
            serde_json::to_writer(&mut *writer, &line)?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn decoded(
    record: &ChangeRecord,
    decode: fn(&ChangeRecord, &mut Value) -> Result<(), crate::error::DecodeError>,
) -> Value {
    let mut value = Value::Null;
    if let Err(err) = decode(record, &mut value) {
        warn!(id = record.operation_id, error = %err, "payload not decodable, omitted");
        return Value::Null;
    }
    value
}
