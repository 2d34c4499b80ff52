//! Buffered log records.
//!
//! A [`Record`] is the `(tag, time, fields)` triple handed to a flush. Field
//! values keep their JSON type and are coerced to strings only when a
//! template asks for them.

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};
use std::fmt::Write;

/// One buffered log record. Immutable once it has been buffered.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub tag: String,
    /// Epoch seconds.
    pub time: i64,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(tag: impl Into<String>, time: i64, fields: Map<String, Value>) -> Self {
        Self {
            tag: tag.into(),
            time,
            fields,
        }
    }

    /// Look up a field and coerce it to a string.
    ///
    /// Returns `None` only when the key is absent; a JSON `null` is `""`.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(value_to_string)
    }
}

/// String coercion used for template substitution.
///
/// Strings are taken verbatim, `null` becomes empty, everything else uses
/// its compact JSON form.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Zone used when rendering the injected time key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimeZoneSetting {
    Local,
    Utc,
    Named(Tz),
}

/// Writes the record's tag and formatted time into its fields before
/// buffering, so templates can reference them like any other key.
#[derive(Debug, Clone)]
pub struct KeyInjector {
    tag_key: Option<String>,
    time_key: Option<String>,
    time_format: String,
    zone: TimeZoneSetting,
}

impl KeyInjector {
    pub fn new(
        tag_key: Option<String>,
        time_key: Option<String>,
        time_format: impl Into<String>,
        zone: TimeZoneSetting,
    ) -> Self {
        Self {
            tag_key,
            time_key,
            time_format: time_format.into(),
            zone,
        }
    }

    /// Injector that leaves records untouched.
    pub fn disabled() -> Self {
        Self::new(None, None, "%H:%M:%S", TimeZoneSetting::Utc)
    }

    /// Overwrites `tag_key` and `time_key` in the record's fields.
    pub fn inject(&self, record: &mut Record) {
        if let Some(key) = &self.tag_key {
            record
                .fields
                .insert(key.clone(), Value::String(record.tag.clone()));
        }
        if let Some(key) = &self.time_key {
            let formatted = self.format_time(record.time);
            record.fields.insert(key.clone(), Value::String(formatted));
        }
    }

    /// Format epoch seconds with the configured strftime pattern and zone.
    ///
    /// Falls back to the raw epoch value if the timestamp is out of range or
    /// the pattern cannot be rendered.
    pub fn format_time(&self, epoch: i64) -> String {
        let Some(utc) = DateTime::<Utc>::from_timestamp(epoch, 0) else {
            tracing::warn!(time = epoch, "Timestamp out of range, using raw value");
            return epoch.to_string();
        };

        let mut out = String::new();
        let written = match self.zone {
            TimeZoneSetting::Utc => write!(out, "{}", utc.format(&self.time_format)),
            TimeZoneSetting::Local => write!(
                out,
                "{}",
                utc.with_timezone(&Local).format(&self.time_format)
            ),
            TimeZoneSetting::Named(tz) => {
                write!(out, "{}", utc.with_timezone(&tz).format(&self.time_format))
            }
        };

        match written {
            Ok(()) => out,
            Err(_) => {
                tracing::warn!(time_format = %self.time_format, "Failed to format time, using raw value");
                epoch.to_string()
            }
        }
    }
}
