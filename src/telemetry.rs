//! Telemetry records decoded from the device's line protocol.
//!
//! Each newline-terminated line is either JSON (kept verbatim as a
//! `serde_json::Value`) or opaque text, which is wrapped as `{"raw_data": line}`.
//! Decoding never fails: malformed input degrades to the raw form.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// One decoded unit of data received from the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TelemetryRecord {
    /// A line that parsed as JSON
    Json(JsonValue),
    /// A line that did not parse as JSON
    Raw {
        /// The trimmed line text
        raw_data: String,
    },
}

impl TelemetryRecord {
    /// Decode one line of device output.
    ///
    /// Surrounding whitespace (including `\r`) is trimmed first.
    pub fn from_line(line: &str) -> Self {
        let line = line.trim();
        match serde_json::from_str::<JsonValue>(line) {
            Ok(value) => TelemetryRecord::Json(value),
            Err(_) => TelemetryRecord::Raw {
                raw_data: line.to_string(),
            },
        }
    }

    /// The record as the JSON value served to clients.
    pub fn to_json(&self) -> JsonValue {
        match self {
            TelemetryRecord::Json(value) => value.clone(),
            TelemetryRecord::Raw { raw_data } => {
                let mut map = Map::new();
                map.insert("raw_data".to_string(), JsonValue::String(raw_data.clone()));
                JsonValue::Object(map)
            }
        }
    }

    /// Whether this record came from a non-JSON line.
    pub fn is_raw(&self) -> bool {
        matches!(self, TelemetryRecord::Raw { .. })
    }
}

impl Default for TelemetryRecord {
    /// Nothing received yet: an empty JSON object.
    fn default() -> Self {
        TelemetryRecord::Json(JsonValue::Object(Map::new()))
    }
}
