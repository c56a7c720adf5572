//! Record validator
//!
//! Reads a saved dump as JSON lines: one object per non-empty line, blank
//! lines skipped. Produces the records in file order plus a small health
//! summary of the sensor node's log.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// One log line
pub type Record = Map<String, Value>;

/// Validation error types
#[derive(Error, Debug)]
pub enum ValidationError {
    /// File could not be read
    #[error("Cannot read {}: {source}", path.display())]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Line is not UTF-8
    #[error("Line {line} is not valid UTF-8")]
    InvalidUtf8 {
        /// 1-based line number
        line: usize,
    },

    /// Line is not valid JSON
    #[error("Invalid JSON on line {line}: {source}")]
    InvalidJson {
        /// 1-based line number
        line: usize,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// Line is JSON but not an object
    #[error("Line {line} is not a JSON object")]
    NotAnObject {
        /// 1-based line number
        line: usize,
    },
}

impl ValidationError {
    /// Offending line, if the error is about file content
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Io { .. } => None,
            Self::InvalidUtf8 { line }
            | Self::InvalidJson { line, .. }
            | Self::NotAnObject { line } => Some(*line),
        }
    }
}

/// Read and parse the file at `path`
pub fn validate(path: &Path) -> Result<Vec<Record>, ValidationError> {
    let data = std::fs::read(path).map_err(|source| ValidationError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_records(&data)
}

/// Parse JSON-lines content
pub fn parse_records(data: &[u8]) -> Result<Vec<Record>, ValidationError> {
    let mut records = Vec::new();

    for (index, raw) in data.split(|&b| b == b'\n').enumerate() {
        let line = index + 1;
        let text = std::str::from_utf8(raw).map_err(|_| ValidationError::InvalidUtf8 { line })?;
        let text = text.trim();
        if text.is_empty() {
            continue;
        }

        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(record)) => records.push(record),
            Ok(_) => return Err(ValidationError::NotAnObject { line }),
            Err(source) => return Err(ValidationError::InvalidJson { line, source }),
        }
    }

    Ok(records)
}

/// Aggregate view of a log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    /// Number of records
    pub count: usize,
    /// `timestamp` of the first record that has one
    pub first_timestamp: Option<String>,
    /// `timestamp` of the last record that has one
    pub last_timestamp: Option<String>,
    /// Seconds between first and last timestamp, when both are RFC 3339
    pub span_seconds: Option<i64>,
    /// Records with WiFi connected
    pub wifi_ok: usize,
    /// Records with MQTT connected
    pub mqtt_ok: usize,
    /// Records with a good DHT reading
    pub dht_ok: usize,
    /// Records with a good PM2.5 reading
    pub pm_ok: usize,
}

impl Summary {
    /// Summarize records in file order
    pub fn from_records(records: &[Record]) -> Self {
        let mut summary = Self {
            count: records.len(),
            ..Self::default()
        };

        let mut timestamps = records
            .iter()
            .filter_map(|r| r.get("timestamp"))
            .filter(|v| truthy(v))
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        summary.first_timestamp = timestamps.next();
        summary.last_timestamp = timestamps.last().or_else(|| summary.first_timestamp.clone());

        if let (Some(first), Some(last)) = (&summary.first_timestamp, &summary.last_timestamp) {
            summary.span_seconds = match (parse_rfc3339(first), parse_rfc3339(last)) {
                (Some(a), Some(b)) => Some((b - a).num_seconds()),
                _ => None,
            };
        }

        for record in records {
            let flag = |key: &str| record.get(key).is_some_and(truthy);
            summary.wifi_ok += usize::from(flag("wifi_ok"));
            summary.mqtt_ok += usize::from(flag("mqtt_ok"));
            summary.dht_ok += usize::from(flag("dht_ok"));
            summary.pm_ok += usize::from(flag("pm_ok"));
        }

        summary
    }

    /// Human readable multi-line rendering
    pub fn to_text(&self) -> String {
        if self.count == 0 {
            return "No records".to_string();
        }

        let mut out = String::new();
        out.push_str(&format!("count:           {}\n", self.count));
        out.push_str(&format!(
            "first_timestamp: {}\n",
            self.first_timestamp.as_deref().unwrap_or("N/A")
        ));
        out.push_str(&format!(
            "last_timestamp:  {}\n",
            self.last_timestamp.as_deref().unwrap_or("N/A")
        ));
        if let Some(span) = self.span_seconds {
            out.push_str(&format!("span_seconds:    {}\n", span));
        }
        out.push_str(&format!("wifi_ok:         {}\n", self.wifi_ok));
        out.push_str(&format!("mqtt_ok:         {}\n", self.mqtt_ok));
        out.push_str(&format!("dht_ok:          {}\n", self.dht_ok));
        out.push_str(&format!("pm_ok:           {}", self.pm_ok));
        out
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn parse_rfc3339(text: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOG: &[u8] = b"{\"timestamp\":\"2025-09-27T12:00:00Z\",\
        \"wifi_ok\":true,\"mqtt_ok\":false,\"dht_ok\":true,\"pm_ok\":true}\r\n\
        \r\n\
        {\"timestamp\":\"2025-09-27T12:05:00Z\",\
        \"wifi_ok\":true,\"mqtt_ok\":true,\"dht_ok\":false,\"pm_ok\":true}\r\n";

    #[test]
    fn test_parse_skips_blank_lines() {
        let records = parse_records(LOG).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1]["mqtt_ok"], Value::Bool(true));
    }

    #[test]
    fn test_invalid_json_reports_line() {
        let err = parse_records(b"{\"a\":1}\n\n{\"b\":\n").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidJson { line: 3, .. }));
        assert_eq!(err.line(), Some(3));
    }

    #[test]
    fn test_non_object_rejected() {
        let err = parse_records(b"{\"a\":1}\n[1,2]\n").unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject { line: 2 }));
    }

    #[test]
    fn test_device_error_text_is_invalid() {
        let err = parse_records(b"ERROR: /logs.jsonl not found\r\n").unwrap_err();
        assert_eq!(err.line(), Some(1));
    }

    #[test]
    fn test_summary_counts_flags_and_span() {
        let records = parse_records(LOG).unwrap();
        let summary = Summary::from_records(&records);

        assert_eq!(summary.count, 2);
        assert_eq!(summary.first_timestamp.as_deref(), Some("2025-09-27T12:00:00Z"));
        assert_eq!(summary.last_timestamp.as_deref(), Some("2025-09-27T12:05:00Z"));
        assert_eq!(summary.span_seconds, Some(300));
        assert_eq!(summary.wifi_ok, 2);
        assert_eq!(summary.mqtt_ok, 1);
        assert_eq!(summary.dht_ok, 1);
        assert_eq!(summary.pm_ok, 2);
    }

    #[test]
    fn test_summary_uptime_timestamps_have_no_span() {
        let records =
            parse_records(b"{\"timestamp\":\"uptime-12\"}\n{\"timestamp\":\"uptime-72\"}\n")
                .unwrap();
        let summary = Summary::from_records(&records);

        assert_eq!(summary.last_timestamp.as_deref(), Some("uptime-72"));
        assert_eq!(summary.span_seconds, None);
    }

    #[test]
    fn test_empty_summary() {
        let summary = Summary::from_records(&[]);
        assert_eq!(summary.count, 0);
        assert_eq!(summary.first_timestamp, None);
        assert_eq!(summary.to_text(), "No records");
    }
}
