//! How a subscriber reaches the notification hub.

use crate::error::ChannelError;
use crate::hub::{Connection, NotificationHub};
use std::sync::Arc;

/// Something that can open a notification [`Connection`].
pub trait NotificationTransport: Send + Sync {
    fn connect(&self) -> Result<Connection, ChannelError>;
}

/// Connects straight to an in-process hub.
#[derive(Clone)]
pub struct LocalTransport {
    hub: Arc<NotificationHub>,
}

impl LocalTransport {
    pub fn new(hub: Arc<NotificationHub>) -> Self {
        Self { hub }
    }
}

impl NotificationTransport for LocalTransport {
    fn connect(&self) -> Result<Connection, ChannelError> {
        self.hub.subscribe()
    }
}
