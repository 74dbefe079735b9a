//! Device-facing ingestion.
//!
//! Whatever transport hosts these calls, the contract is the same: a device
//! always gets an acknowledgement back, and storage problems never reach it.

use crate::error::{Result, StoreError};
use crate::hub::NotificationHub;
use crate::normalize::{normalize, LogPayload, Origin, RawInput};
use crate::store::LogTable;
use crate::types::{NewLogRecord, Timestamp};
use chrono::{Local, SecondsFormat};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info};

/// Ingestion settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Sender recorded by the fixed-sender path.
    pub fixed_sender: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            fixed_sender: "ExampleApp".to_string(),
        }
    }
}

/// Acknowledgement returned for every submission, stored or not.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ack {
    pub received_at: Timestamp,
    /// The submitted text, as received.
    pub echo: String,
}

impl fmt::Display for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} : {}", self.received_at.display_local(), self.echo)
    }
}

/// Accepts log submissions, stores them and wakes viewers.
pub struct IngestService {
    table: Arc<dyn LogTable>,
    hub: Arc<NotificationHub>,
    config: IngestConfig,
}

impl IngestService {
    pub fn new(table: Arc<dyn LogTable>, hub: Arc<NotificationHub>, config: IngestConfig) -> Self {
        Self { table, hub, config }
    }

    /// Single-value submission: a URL segment or a form body.
    pub fn submit_text(&self, raw: &str, origin: &Origin) -> Ack {
        let record = normalize(RawInput::text(raw), None, origin);
        self.store(record);
        self.ack(raw, origin)
    }

    /// Like [`submit_text`](Self::submit_text), recording the configured
    /// fixed sender instead of whatever the payload names.
    pub fn submit_text_fixed_sender(&self, raw: &str, origin: &Origin) -> Ack {
        let record = normalize(
            RawInput::text(raw),
            Some(&self.config.fixed_sender),
            origin,
        );
        self.store(record);
        self.ack(raw, origin)
    }

    /// Structured submission, already decoded by the transport.
    pub fn submit_structured(&self, payload: LogPayload, origin: &Origin) -> Ack {
        let echo = payload.message.clone().unwrap_or_default();
        let record = normalize(RawInput::Structured(payload), None, origin);
        self.store(record);
        self.ack(&echo, origin)
    }

    /// Number of stored records. Doubles as a liveness check, so errors
    /// propagate.
    pub fn count(&self) -> Result<u64> {
        self.table.count()
    }

    /// Human-readable record count.
    pub fn count_message(&self) -> Result<String> {
        Ok(format!("Database LogEntries Count: {}", self.count()?))
    }

    /// Return the input unchanged.
    pub fn echo(&self, text: &str) -> String {
        text.to_string()
    }

    /// Current local time in round-trip form, e.g.
    /// `2024-03-01T12:30:05.123456+01:00`.
    pub fn server_time(&self) -> String {
        Local::now().to_rfc3339_opts(SecondsFormat::Micros, false)
    }

    /// Remove every record and tell viewers to refresh.
    pub fn delete_all(&self) -> Result<()> {
        self.table.delete_all().map_err(|e| match e {
            StoreError::BulkDeleteFailure(_) => e,
            other => StoreError::BulkDeleteFailure(other.to_string()),
        })?;

        info!("deleted all log records");
        self.hub.broadcast();
        Ok(())
    }

    /// Insert and broadcast. Failures are logged and dropped.
    fn store(&self, record: NewLogRecord) {
        let source = record.source_address().to_string();
        match self.table.insert(record) {
            Ok(_) => {
                self.hub.broadcast();
            }
            Err(e) => error!(error = %e, source = %source, "failed to store log record"),
        }
    }

    fn ack(&self, echo: &str, origin: &Origin) -> Ack {
        Ack {
            received_at: origin.received_at,
            echo: echo.to_string(),
        }
    }
}
