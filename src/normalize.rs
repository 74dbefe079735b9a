//! Entry normalization.
//!
//! Devices submit either a single opaque text value or a structured payload.
//! Both end up as a [`NewLogRecord`] with every default filled in. Nothing
//! here fails: a payload that cannot be decoded is kept verbatim as the
//! message, because the devices on the other end cannot do anything useful
//! with an error response.

use crate::types::{NewLogRecord, Timestamp, DEFAULT_LOG_TYPE};
use percent_encoding::percent_decode_str;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::net::IpAddr;
use tracing::debug;

/// An inbound payload before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawInput {
    /// Legacy single-value path: URL segment or form body.
    Text(String),
    /// Modern path: an already-parsed structured payload.
    Structured(LogPayload),
}

impl RawInput {
    pub fn text(raw: impl Into<String>) -> Self {
        RawInput::Text(raw.into())
    }
}

/// Structured log payload. Every field is optional.
///
/// `source_address` is carried only so callers can see what a device sent;
/// the normalizer never copies it into a record.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogPayload {
    pub message: Option<String>,
    pub log_date: Option<Timestamp>,
    pub source_address: Option<String>,
    pub sender: Option<String>,
    pub log_type: Option<String>,
}

/// Why a text payload could not be read as a structured one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecodeFailure(String);

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "payload decode failed: {}", self.0)
    }
}

impl std::error::Error for DecodeFailure {}

impl LogPayload {
    /// Parse a JSON object, matching field names case-insensitively.
    pub fn from_json_str(s: &str) -> Result<Self, DecodeFailure> {
        match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Self::from_map(map),
            Ok(other) => Err(DecodeFailure(format!(
                "expected a JSON object, found {}",
                json_kind(&other)
            ))),
            Err(e) => Err(DecodeFailure(e.to_string())),
        }
    }

    fn from_map(map: Map<String, Value>) -> Result<Self, DecodeFailure> {
        let mut payload = LogPayload::default();

        for (key, value) in map {
            match key.to_ascii_lowercase().as_str() {
                "message" => payload.message = string_field(&key, value)?,
                "sender" => payload.sender = string_field(&key, value)?,
                "logtype" => payload.log_type = string_field(&key, value)?,
                // `ipAdress` is what older firmware sends.
                "sourceaddress" | "ipadress" => payload.source_address = string_field(&key, value)?,
                "logdate" => {
                    payload.log_date = match string_field(&key, value)? {
                        Some(raw) => Some(Timestamp::parse(&raw).ok_or_else(|| {
                            DecodeFailure(format!("unreadable logDate {raw:?}"))
                        })?),
                        None => None,
                    };
                }
                _ => {}
            }
        }

        Ok(payload)
    }

    /// Percent-decode the free-text fields devices are known to URL-encode.
    fn url_decoded(mut self) -> Self {
        self.message = self.message.map(|m| url_decode(&m));
        self.sender = self.sender.map(|s| url_decode(&s));
        self
    }
}

impl<'de> Deserialize<'de> for LogPayload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        LogPayload::from_map(map).map_err(de::Error::custom)
    }
}

fn string_field(key: &str, value: Value) -> Result<Option<String>, DecodeFailure> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        other => Err(DecodeFailure(format!(
            "field {key:?} must be a string, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Form-style URL decoding: `+` is a space, `%XX` escapes are UTF-8.
///
/// Malformed escapes are left as they are and invalid UTF-8 is replaced, so
/// this always returns something.
pub fn url_decode(s: &str) -> String {
    let spaced = s.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Where and when a submission arrived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Origin {
    /// Peer address as reported by the transport, empty if unknown.
    pub address: String,
    pub received_at: Timestamp,
}

impl Origin {
    /// Origin for a request arriving now.
    pub fn new(peer: Option<IpAddr>) -> Self {
        Self::at(peer, Timestamp::now())
    }

    pub fn at(peer: Option<IpAddr>, received_at: Timestamp) -> Self {
        Self {
            address: peer.map(|ip| ip.to_string()).unwrap_or_default(),
            received_at,
        }
    }
}

/// Decode a raw payload into its structured form.
///
/// Text is first read as JSON and then URL-decoded field by field. Text that
/// is not a usable JSON object becomes a payload whose message is the raw
/// text, untouched.
pub fn decode(raw: RawInput) -> LogPayload {
    match raw {
        RawInput::Structured(payload) => payload,
        RawInput::Text(text) => match LogPayload::from_json_str(&text) {
            Ok(payload) => payload.url_decoded(),
            Err(failure) => {
                debug!(%failure, "treating payload as plain text");
                LogPayload {
                    message: Some(text),
                    ..Default::default()
                }
            }
        },
    }
}

/// Turn a raw payload into a record ready for insertion.
///
/// A non-empty `default_sender` replaces whatever sender the payload named.
pub fn normalize(raw: RawInput, default_sender: Option<&str>, origin: &Origin) -> NewLogRecord {
    let payload = decode(raw);

    let sender = match default_sender {
        Some(fixed) if !fixed.is_empty() => Some(fixed.to_string()),
        _ => payload.sender,
    };

    let log_type = payload
        .log_type
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_LOG_TYPE.to_string());

    NewLogRecord {
        message: payload.message.unwrap_or_default(),
        log_date: payload.log_date.unwrap_or(origin.received_at),
        source_address: origin.address.clone(),
        sender,
        log_type,
    }
}
