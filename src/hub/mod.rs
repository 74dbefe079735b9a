//! Notification hub for live viewers.
//!
//! The hub carries no data. A broadcast only tells each connected viewer
//! that the store may have changed; the viewer then re-runs its own query.
//! This keeps a broadcast the same size no matter how much was written.
//!
//! # Example
//!
//! ```ignore
//! let hub = NotificationHub::new();
//! let conn = hub.subscribe()?;
//!
//! hub.broadcast();
//! assert_eq!(conn.recv()?, HubEvent::DataChanged);
//! ```

mod manager;
mod types;

pub use manager::NotificationHub;
pub use types::{CloseReason, Connection, HubEvent, SubscriptionId};
