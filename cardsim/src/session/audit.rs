//! Session audit log
//!
//! Append-only record of everything sent to and received from the card.
//! Entries are session data, separate from diagnostic `log` output.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Kind of audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogKind {
    Info,
    ApduSend,
    ApduResponse,
    Error,
    System,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogKind::Info => "INFO",
            LogKind::ApduSend => "APDU_SEND",
            LogKind::ApduResponse => "APDU_RESPONSE",
            LogKind::Error => "ERROR",
            LogKind::System => "SYSTEM",
        };
        f.write_str(label)
    }
}

/// Single audit log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub kind: LogKind,
    pub message: String,
    /// Structured details (apdu, sw, data, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, String>,
}

impl LogEntry {
    /// Create a new entry stamped with the current time
    pub fn new(kind: LogKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Local::now(),
            kind,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Attach a structured field
    pub fn with_field(mut self, key: &str, value: impl Into<String>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn field(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind,
            self.message
        )?;
        for (key, value) in &self.fields {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Ordered, append-only list of entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<LogEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&LogEntry> {
        self.entries.last()
    }

    /// Entries of one kind, in order
    pub fn of_kind(&self, kind: LogKind) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter().filter(move |e| e.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_fields() {
        let entry = LogEntry::new(LogKind::ApduSend, "PRESENT PSC")
            .with_field("apdu", "FF 20 00 00 03 FF FF FF");
        assert_eq!(entry.field("apdu"), Some("FF 20 00 00 03 FF FF FF"));
        assert_eq!(entry.field("sw"), None);
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&LogKind::ApduResponse).unwrap();
        assert_eq!(json, "\"APDU_RESPONSE\"");
        assert_eq!(LogKind::System.to_string(), "SYSTEM");
    }

    #[test]
    fn test_log_order_and_filter() {
        let mut log = AuditLog::new();
        log.push(LogEntry::new(LogKind::Info, "created"));
        log.push(LogEntry::new(LogKind::ApduSend, "SELECT CARD"));
        log.push(LogEntry::new(LogKind::ApduResponse, "Success"));
        assert_eq!(log.len(), 3);
        assert_eq!(log.of_kind(LogKind::ApduSend).count(), 1);
        assert_eq!(log.last().unwrap().message, "Success");
    }

    #[test]
    fn test_entry_json_roundtrip() {
        let entry = LogEntry::new(LogKind::Error, "PSC must be verified before this operation")
            .with_field("command", "WRITE MEMORY");
        let json = serde_json::to_string(&entry).unwrap();
        let back: LogEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, entry);
    }

    #[test]
    fn test_display() {
        let entry = LogEntry::new(LogKind::ApduResponse, "Success").with_field("sw", "90 00");
        let text = entry.to_string();
        assert!(text.contains("APDU_RESPONSE: Success sw=90 00"));
    }
}
