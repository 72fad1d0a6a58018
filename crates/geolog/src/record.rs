//! Location records.
//!
//! A record is whatever JSON object the client reported, extended by the
//! server with the originating address and the time it was accepted for
//! writing. Client fields are kept as-is and in their original order.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Field holding the client address.
pub const IP_FIELD: &str = "ip";

/// Field holding the acceptance timestamp.
pub const SAVED_AT_FIELD: &str = "savedAt";

/// One location report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Parse a request body into a record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the body is not JSON and
    /// [`Error::InvalidRecord`] if it is JSON but not an object.
    pub fn from_json(body: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(body)?;
        Self::from_value(value)
    }

    /// Wrap an already-parsed JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] unless `value` is an object.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::invalid_record(format!(
                "expected a JSON object, found {}",
                value_kind(&other)
            ))),
        }
    }

    /// Set the originating client address, replacing any client-supplied value.
    pub fn set_ip(&mut self, ip: impl Into<String>) {
        self.0.insert(IP_FIELD.to_string(), Value::String(ip.into()));
    }

    /// Stamp the acceptance time, replacing any client-supplied value.
    pub fn stamp_saved_at(&mut self, at: DateTime<Utc>) {
        self.0
            .insert(SAVED_AT_FIELD.to_string(), Value::String(format_timestamp(at)));
    }

    /// The recorded client address, if set.
    #[must_use]
    pub fn ip(&self) -> Option<&str> {
        self.0.get(IP_FIELD).and_then(Value::as_str)
    }

    /// The recorded acceptance timestamp, if set.
    #[must_use]
    pub fn saved_at(&self) -> Option<&str> {
        self.0.get(SAVED_AT_FIELD).and_then(Value::as_str)
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// All fields, in insertion order.
    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

/// Format a timestamp as ISO-8601 UTC with millisecond precision.
#[must_use]
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
