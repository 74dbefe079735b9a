//! # logsink
//!
//! Best-effort log ingestion for small networked devices, with live viewers.
//!
//! ## Core Concepts
//!
//! - **Normalizer**: turns whatever a device sends (plain text, JSON, URL
//!   encoded JSON) into a complete record. Never rejects input.
//! - **Store**: durable, append-only log table with filtered, sorted, paged
//!   queries and a "latest per device" view.
//! - **Hub**: payload-free "data changed" signal to connected viewers.
//! - **Subscriber**: keeps a viewer connected, refreshing it on every signal
//!   and retrying a bounded number of times when the connection drops.
//!
//! ## Example
//!
//! ```ignore
//! use logsink::{IngestConfig, IngestService, LogStore, NotificationHub, Origin, StoreConfig};
//!
//! let store = Arc::new(LogStore::open_or_create(StoreConfig {
//!     path: "./logdata".into(),
//!     ..Default::default()
//! })?);
//! let hub = NotificationHub::new();
//! let ingest = IngestService::new(store.clone(), hub.clone(), IngestConfig::default());
//!
//! ingest.submit_text(r#"{"message":"boiler%20on","sender":"pico-1"}"#, &Origin::new(peer));
//!
//! let page = build_view(store.as_ref(), &ViewQuery::new().distinct(true))?;
//! ```

pub mod config;
pub mod error;
pub mod hub;
pub mod ingest;
pub mod normalize;
pub mod query;
pub mod records;
pub mod store;
pub mod subscriber;
pub mod types;

// Re-exports
pub use config::Config;
pub use error::{ChannelError, Result, StoreError};
pub use hub::{CloseReason, Connection, HubEvent, NotificationHub, SubscriptionId};
pub use ingest::{Ack, IngestConfig, IngestService};
pub use normalize::{decode, normalize, url_decode, DecodeFailure, LogPayload, Origin, RawInput};
pub use query::{
    build_view, evaluate, filter_title, LogPage, Predicate, SortColumn, SortDirection, SortSpec,
    ViewQuery, DEFAULT_PAGE_SIZE,
};
pub use records::RecordLog;
pub use store::{LogStore, LogTable, StoreConfig};
pub use subscriber::{
    LocalTransport, LogViewer, NotificationTransport, ReconnectPolicy, ReconnectingSubscriber,
    Refresh, SubscriberState,
};
pub use types::*;
