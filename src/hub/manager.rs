//! Notification hub broadcasting "data changed" to connected viewers.

use crate::error::ChannelError;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::types::{CloseReason, Connection, HubEvent, SubscriptionId};

/// Pending signals per subscriber. One is enough: a viewer with a refresh
/// already queued gains nothing from a second.
const SUBSCRIPTION_BUFFER: usize = 1;

/// Internal subscription state.
struct Subscription {
    sender: Sender<HubEvent>,
}

/// Fans a payload-free "new data" signal out to every connected viewer.
///
/// Delivery is at most once per subscriber per broadcast. Nothing is queued
/// for viewers that are not connected; they catch up by refreshing when they
/// reconnect.
pub struct NotificationHub {
    /// Active subscriptions by ID.
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    /// Counter for generating subscription IDs.
    next_id: AtomicU64,
    /// Whether new connections are admitted.
    accepting: AtomicBool,
}

impl NotificationHub {
    /// Create a new hub, ready to share.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
        })
    }

    /// Open a new connection.
    pub fn subscribe(self: &Arc<Self>) -> Result<Connection, ChannelError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(ChannelError::Refused);
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(SUBSCRIPTION_BUFFER);

        self.subscriptions.write().insert(id, Subscription { sender });
        debug!(subscription = id.0, "viewer subscribed");

        Ok(Connection {
            id,
            receiver,
            hub: Arc::downgrade(self),
        })
    }

    /// Unsubscribe and clean up.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subs = self.subscriptions.write();
        if let Some(sub) = subs.remove(&id) {
            // Best effort; the receiver may be gone already.
            let _ = sub.sender.try_send(HubEvent::Closed {
                reason: CloseReason::Unsubscribed,
            });
            debug!(subscription = id.0, "viewer unsubscribed");
        }
    }

    /// Get subscription count.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    /// Signal every connected subscriber that new data may exist.
    ///
    /// Returns how many subscribers now have a signal pending. Subscribers
    /// whose receiving side is gone are pruned.
    pub fn broadcast(&self) -> usize {
        // Send outside the lock so subscribe/unsubscribe never wait on delivery.
        let targets: Vec<(SubscriptionId, Sender<HubEvent>)> = self
            .subscriptions
            .read()
            .iter()
            .map(|(id, sub)| (*id, sub.sender.clone()))
            .collect();

        let mut signalled = 0;
        let mut to_remove = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(HubEvent::DataChanged) {
                // A full slot already holds an undelivered DataChanged.
                Ok(()) | Err(TrySendError::Full(_)) => signalled += 1,
                Err(TrySendError::Disconnected(_)) => to_remove.push(id),
            }
        }

        if !to_remove.is_empty() {
            let mut subs = self.subscriptions.write();
            for id in to_remove {
                subs.remove(&id);
            }
        }

        signalled
    }

    /// Close every open connection.
    pub fn disconnect_all(&self) {
        let dropped: Vec<Subscription> = self
            .subscriptions
            .write()
            .drain()
            .map(|(_, sub)| sub)
            .collect();

        if dropped.is_empty() {
            return;
        }

        info!(connections = dropped.len(), "closing all notification connections");
        for sub in dropped {
            let _ = sub.sender.try_send(HubEvent::Closed {
                reason: CloseReason::Shutdown,
            });
        }
    }

    /// Admit or refuse new connections. Existing connections are unaffected.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_subscribe_unsubscribe() {
        let hub = NotificationHub::new();

        let conn = hub.subscribe().unwrap();
        assert_eq!(hub.subscriber_count(), 1);

        hub.unsubscribe(conn.id());
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_drop_connection_unsubscribes() {
        let hub = NotificationHub::new();
        {
            let _conn = hub.subscribe().unwrap();
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_broadcast_reaches_everyone() {
        let hub = NotificationHub::new();
        let a = hub.subscribe().unwrap();
        let b = hub.subscribe().unwrap();

        assert_eq!(hub.broadcast(), 2);

        assert_eq!(a.recv_timeout(Duration::from_millis(100)), Ok(HubEvent::DataChanged));
        assert_eq!(b.recv_timeout(Duration::from_millis(100)), Ok(HubEvent::DataChanged));
    }

    #[test]
    fn test_broadcasts_coalesce() {
        let hub = NotificationHub::new();
        let conn = hub.subscribe().unwrap();

        for _ in 0..5 {
            hub.broadcast();
        }

        assert_eq!(conn.try_recv(), Ok(HubEvent::DataChanged));
        assert!(conn.try_recv().is_err());
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_no_replay_for_late_subscribers() {
        let hub = NotificationHub::new();
        hub.broadcast();

        let conn = hub.subscribe().unwrap();
        assert!(conn.try_recv().is_err());
    }

    #[test]
    fn test_disconnect_all_closes_connections() {
        let hub = NotificationHub::new();
        let conn = hub.subscribe().unwrap();

        hub.disconnect_all();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(
            conn.recv_timeout(Duration::from_millis(100)),
            Ok(HubEvent::Closed {
                reason: CloseReason::Shutdown
            })
        );
        assert!(conn.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_refuses_when_not_accepting() {
        let hub = NotificationHub::new();
        hub.set_accepting(false);
        assert_eq!(hub.subscribe().unwrap_err(), ChannelError::Refused);

        hub.set_accepting(true);
        assert!(hub.subscribe().is_ok());
    }

    #[test]
    fn test_concurrent_subscribe_and_broadcast() {
        let hub = NotificationHub::new();

        let churn: Vec<_> = (0..4)
            .map(|_| {
                let hub = Arc::clone(&hub);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let conn = hub.subscribe().unwrap();
                        drop(conn);
                    }
                })
            })
            .collect();

        let broadcaster = {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                for _ in 0..500 {
                    hub.broadcast();
                }
            })
        };

        for handle in churn {
            handle.join().unwrap();
        }
        broadcaster.join().unwrap();

        assert_eq!(hub.subscriber_count(), 0);
    }
}
