//! Types shared between the hub and its subscribers.

use super::manager::NotificationHub;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use serde::{Deserialize, Serialize};
use std::sync::Weak;
use std::time::Duration;

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Signals delivered on a [`Connection`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    /// New data may exist; re-read whatever you display.
    DataChanged,
    /// The hub closed this connection.
    Closed { reason: CloseReason },
}

/// Why the hub closed a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The hub is shutting down or dropped every connection.
    Shutdown,
}

/// A live connection to a [`NotificationHub`].
///
/// Dropping the connection unsubscribes it.
#[derive(Debug)]
pub struct Connection {
    pub(crate) id: SubscriptionId,
    pub(crate) receiver: Receiver<HubEvent>,
    pub(crate) hub: Weak<NotificationHub>,
}

impl Connection {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Channel the hub signals on. Disconnected once the hub lets go of this
    /// connection.
    pub fn receiver(&self) -> &Receiver<HubEvent> {
        &self.receiver
    }

    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<HubEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<HubEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<HubEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(self.id);
        }
    }
}
