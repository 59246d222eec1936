//! Plugin audit records
//!
//! Plugins write structured JSON lines to dated files under the log
//! directory, one file per plugin stream, instance and day:
//! `<logs>/<name>.<instance>.<YYYY-MM-DD>`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// One audit line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Timestamp (Unix epoch seconds)
    pub timestamp: i64,
    /// ISO 8601 formatted timestamp
    pub timestamp_iso: String,
    /// Plugin that produced the record
    pub plugin: String,
    /// What happened, e.g. "passed" or "preauth"
    pub event: String,
    /// Event details
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl AuditEntry {
    pub fn new(plugin: impl Into<String>, event: impl Into<String>) -> Self {
        Self::at(Utc::now(), plugin, event)
    }

    pub fn at(now: DateTime<Utc>, plugin: impl Into<String>, event: impl Into<String>) -> Self {
        AuditEntry {
            timestamp: now.timestamp(),
            timestamp_iso: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            plugin: plugin.into(),
            event: event.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Day part of the timestamp, as used in file names
    fn day(&self) -> String {
        DateTime::from_timestamp(self.timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }
}

/// Append-only dated JSON-lines log
#[derive(Debug, Clone)]
pub struct DatedLog {
    dir: PathBuf,
    name: String,
    instance: String,
}

impl DatedLog {
    pub fn new(dir: impl Into<PathBuf>, name: impl Into<String>, instance: impl Into<String>) -> Self {
        DatedLog {
            dir: dir.into(),
            name: name.into(),
            instance: instance.into(),
        }
    }

    /// File an entry of the given day goes to
    pub fn path_for(&self, day: &str) -> PathBuf {
        self.dir.join(format!("{}.{}.{}", self.name, self.instance, day))
    }

    /// Append one entry, creating the directory and file as needed
    ///
    /// Blocking; plugins call this from background jobs.
    pub fn append(&self, entry: &AuditEntry) -> std::io::Result<()> {
        let json = serde_json::to_string(entry)?;
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(&entry.day()))?;
        writeln!(file, "{}", json)
    }
}
