//! JSON-lines record input.
//!
//! Each non-blank line is one record in one of three shapes:
//!
//! - `{"tag": "...", "time": ..., "record": {...}}`
//! - `["tag", time, {...}]`
//! - `{...}`: a bare record, tagged with the default tag and stamped now
//!
//! `time` is epoch seconds (integer or float), an RFC 3339 string, or
//! absent/`null` for "now". Invalid lines are logged, counted and skipped.

use chrono::DateTime;
use serde_json::{Map, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::IngestError;
use crate::record::{KeyInjector, Record};

/// Counters returned when the input ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// Parse one input line into a record.
///
/// # Errors
///
/// - [`IngestError::InvalidJson`] if the line is not JSON
/// - [`IngestError::InvalidRecord`] if the JSON has none of the accepted shapes
pub fn parse_line(line: &str, default_tag: &str, now: i64) -> Result<Record, IngestError> {
    let value: Value =
        serde_json::from_str(line).map_err(|e| IngestError::InvalidJson(e.to_string()))?;

    match value {
        Value::Object(mut obj) if matches!(obj.get("record"), Some(Value::Object(_))) => {
            let tag = match obj.remove("tag") {
                Some(Value::String(tag)) => tag,
                None | Some(Value::Null) => default_tag.to_string(),
                Some(other) => {
                    return Err(IngestError::InvalidRecord(format!(
                        "tag must be a string, got {}",
                        other
                    )));
                }
            };
            let time = parse_time(obj.remove("time"), now)?;
            let fields = match obj.remove("record") {
                Some(Value::Object(fields)) => fields,
                _ => Map::new(),
            };
            Ok(Record::new(tag, time, fields))
        }
        Value::Object(fields) => Ok(Record::new(default_tag, now, fields)),
        Value::Array(items) => {
            let [tag, time, fields]: [Value; 3] = items.try_into().map_err(|items: Vec<Value>| {
                IngestError::InvalidRecord(format!(
                    "expected [tag, time, record], got an array of {} element(s)",
                    items.len()
                ))
            })?;
            let Value::String(tag) = tag else {
                return Err(IngestError::InvalidRecord(format!(
                    "tag must be a string, got {}",
                    tag
                )));
            };
            let Value::Object(fields) = fields else {
                return Err(IngestError::InvalidRecord(
                    "record must be a JSON object".to_string(),
                ));
            };
            Ok(Record::new(tag, parse_time(Some(time), now)?, fields))
        }
        other => Err(IngestError::InvalidRecord(format!(
            "expected an object or array, got {}",
            json_type(&other)
        ))),
    }
}

fn parse_time(value: Option<Value>, now: i64) -> Result<i64, IngestError> {
    match value {
        None | Some(Value::Null) => Ok(now),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| IngestError::InvalidRecord(format!("invalid time {}", n))),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.timestamp())
            .map_err(|e| IngestError::InvalidRecord(format!("invalid time '{}': {}", s, e))),
        Some(other) => Err(IngestError::InvalidRecord(format!(
            "time must be a number or string, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Count and log a rejected line.
pub fn record_ingest_error(line_number: u64, error: &IngestError) {
    let error_type = match error {
        IngestError::InvalidJson(_) => "invalid_json",
        IngestError::InvalidRecord(_) => "invalid_record",
        IngestError::Io(_) => "io",
    };
    tracing::warn!(line = line_number, error = %error, "Skipping input line");
    metrics::counter!("slackout_ingest_errors_total", "error_type" => error_type).increment(1);
}

/// Read records from `reader` until EOF or cancellation, inject tag/time
/// keys and send them to the buffer.
///
/// Stops early if the buffer side has gone away.
///
/// # Errors
///
/// Returns [`IngestError::Io`] if reading the input fails.
pub async fn read_records<R>(
    reader: R,
    injector: &KeyInjector,
    default_tag: &str,
    tx: mpsc::Sender<Record>,
    cancel: CancellationToken,
) -> Result<IngestStats, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = IngestStats::default();
    let mut line_number = 0u64;

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = cancel.cancelled() => {
                tracing::debug!("Input reader cancelled");
                break;
            }
        };
        let Some(line) = line else {
            tracing::debug!(accepted = stats.accepted, "End of input");
            break;
        };
        line_number += 1;

        if line.trim().is_empty() {
            continue;
        }

        let now = chrono::Utc::now().timestamp();
        match parse_line(&line, default_tag, now) {
            Ok(mut record) => {
                injector.inject(&mut record);
                metrics::counter!("slackout_records_received_total").increment(1);
                if tx.send(record).await.is_err() {
                    tracing::warn!("Buffer closed, stopping input");
                    break;
                }
                stats.accepted += 1;
            }
            Err(e) => {
                record_ingest_error(line_number, &e);
                stats.rejected += 1;
            }
        }
    }

    Ok(stats)
}
