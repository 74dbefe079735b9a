//! Core types for the log sink.

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Log type assigned when a payload carries none.
pub const DEFAULT_LOG_TYPE: &str = "Info";

/// Unique identifier for a log record (assigned by the store).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// The following id, or `None` once the id space is used up.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(RecordId)
    }
}

impl fmt::Debug for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecordId({})", self.0)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        Timestamp(Utc::now().timestamp_micros())
    }

    pub fn from_datetime<Tz: chrono::TimeZone>(dt: &DateTime<Tz>) -> Self {
        Timestamp(dt.timestamp_micros())
    }

    /// Local wall-clock view of this instant.
    ///
    /// Returns `None` only for instants outside chrono's representable range.
    pub fn to_local(self) -> Option<DateTime<Local>> {
        DateTime::<Utc>::from_timestamp_micros(self.0).map(|dt| dt.with_timezone(&Local))
    }

    /// Parse a device-supplied date.
    ///
    /// Accepts RFC 3339 with an offset, or a naive ISO 8601 date-time that is
    /// taken to be server-local (`2024-07-26T14:54:28`, optional fraction,
    /// `T` or space separator).
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_rfc3339(s) {
            return Some(Self::from_datetime(&dt));
        }

        const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
        NAIVE_FORMATS.iter().find_map(|fmt| {
            let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
            let local = naive.and_local_timezone(Local).earliest()?;
            Some(Self::from_datetime(&local))
        })
    }

    /// `yyyy-MM-dd HH:mm:ss` in server-local time, empty when unrepresentable.
    pub fn display_local(self) -> String {
        self.to_local()
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// A single stored log record.
///
/// Records are immutable once inserted; the only way to remove one is
/// [`LogTable::delete_all`](crate::LogTable::delete_all).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    /// Unique identifier (assigned by store).
    pub id: RecordId,

    /// Decoded message text, possibly empty.
    pub message: String,

    /// When the device logged it, or when the server received it.
    pub log_date: Timestamp,

    /// Network origin of the submitting request.
    pub source_address: String,

    /// Logical origin label.
    pub sender: Option<String>,

    /// Category label, never empty.
    pub log_type: String,
}

impl LogRecord {
    /// Build the stored form of a normalized record.
    pub(crate) fn from_new(id: RecordId, new: NewLogRecord) -> Self {
        Self {
            id,
            message: new.message,
            log_date: new.log_date,
            source_address: new.source_address,
            sender: new.sender,
            log_type: new.log_type,
        }
    }

    /// Log date as `yyyy-MM-dd HH:mm:ss` local time.
    pub fn log_date_display(&self) -> String {
        self.log_date.display_local()
    }
}

/// A normalized record waiting for an id.
///
/// Only the normalizer builds these, so every value that reaches the store
/// already has a date, a non-empty type and a server-derived source address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLogRecord {
    pub(crate) message: String,
    pub(crate) log_date: Timestamp,
    pub(crate) source_address: String,
    pub(crate) sender: Option<String>,
    pub(crate) log_type: String,
}

impl NewLogRecord {
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn log_date(&self) -> Timestamp {
        self.log_date
    }

    pub fn source_address(&self) -> &str {
        &self.source_address
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    pub fn log_type(&self) -> &str {
        &self.log_type
    }
}
