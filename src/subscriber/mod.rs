//! Keeping a viewer current.
//!
//! A [`ReconnectingSubscriber`] holds a notification connection open for a
//! [`LogViewer`] (or anything else implementing [`Refresh`]) and calls it
//! whenever the store may have changed. When the connection drops it retries
//! a bounded number of times and then stays disconnected.

mod reconnect;
mod transport;
mod viewer;

pub use reconnect::{ReconnectPolicy, ReconnectingSubscriber, SubscriberState};
pub use transport::{LocalTransport, NotificationTransport};
pub use viewer::{LogViewer, Refresh};
