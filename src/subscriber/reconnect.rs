//! Viewer-side connection manager with bounded reconnects.
//!
//! ```text
//! Disconnected -> Connecting -> Connected <-> Refreshing
//!                     |             |
//!                     |        (closed)
//!                     v             v
//!              (startup delay) -> Reconnecting{1..=max} -> GaveUp
//! ```
//!
//! The viewer is refreshed after every successful connect, when a
//! notification arrives, when the connection drops, and after every failed
//! reconnect attempt. Refreshing reads the store directly, so a viewer stays
//! reasonably current even while notifications are unavailable.

use super::transport::NotificationTransport;
use super::viewer::Refresh;
use crate::config::serde_millis;
use crate::hub::{Connection, HubEvent};
use crossbeam_channel::{after, never, select, Receiver, Sender};
use parking_lot::RwLock;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Timing of connects and reconnects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Wait after a failed first connect before entering the reconnect loop.
    #[serde(rename = "startup_retry_delay_ms", with = "serde_millis")]
    pub startup_retry_delay: Duration,

    /// Reconnect attempts before giving up for good.
    pub max_attempts: u32,

    /// Pause between failed reconnect attempts.
    #[serde(rename = "attempt_delay_ms", with = "serde_millis")]
    pub attempt_delay: Duration,

    /// Refresh this often while connected even without a notification.
    #[serde(rename = "poll_interval_ms", with = "serde_millis::option")]
    pub poll_interval: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            startup_retry_delay: Duration::from_secs(10),
            max_attempts: 15,
            attempt_delay: Duration::from_secs(5),
            poll_interval: Some(Duration::from_secs(30)),
        }
    }
}

/// Where the subscriber is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubscriberState {
    Disconnected,
    Connecting,
    Connected,
    Refreshing,
    /// Reconnect loop, on the given 1-based attempt.
    Reconnecting { attempt: u32 },
    /// Every reconnect attempt failed. Terminal: nothing runs any more.
    GaveUp,
}

struct Shared {
    state: RwLock<SubscriberState>,
    connect_attempts: AtomicU32,
}

/// Keeps a viewer connected to the notification hub.
///
/// Runs on its own thread. Dropping the handle (or calling
/// [`shutdown`](Self::shutdown)) stops the thread and releases the
/// connection, whatever state it was in.
pub struct ReconnectingSubscriber {
    shared: Arc<Shared>,
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl ReconnectingSubscriber {
    /// Start connecting in the background.
    pub fn start(
        transport: Arc<dyn NotificationTransport>,
        refresh: Arc<dyn Refresh>,
        policy: ReconnectPolicy,
    ) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: RwLock::new(SubscriberState::Disconnected),
            connect_attempts: AtomicU32::new(0),
        });
        // Never sent on; dropping the sender is the cancel signal.
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);

        let worker = Worker {
            transport,
            refresh,
            policy,
            shared: Arc::clone(&shared),
            cancel: cancel_rx,
        };

        let thread = thread::Builder::new()
            .name("logsink-subscriber".into())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            cancel: Some(cancel_tx),
            thread: Some(thread),
        })
    }

    pub fn state(&self) -> SubscriberState {
        *self.shared.state.read()
    }

    /// Whether a notification connection is currently open.
    pub fn is_connected(&self) -> bool {
        matches!(
            self.state(),
            SubscriberState::Connected | SubscriberState::Refreshing
        )
    }

    /// Connect attempts made so far, including the first one.
    pub fn connect_attempts(&self) -> u32 {
        self.shared.connect_attempts.load(Ordering::SeqCst)
    }

    /// Stop the background thread and wait for it.
    pub fn shutdown(&mut self) {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("subscriber thread panicked");
            }
        }
    }
}

impl Drop for ReconnectingSubscriber {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Whether the worker should keep going.
enum Flow {
    Continue,
    Cancelled,
}

enum Reconnect {
    Connected(Connection),
    GaveUp,
    Cancelled,
}

struct Worker {
    transport: Arc<dyn NotificationTransport>,
    refresh: Arc<dyn Refresh>,
    policy: ReconnectPolicy,
    shared: Arc<Shared>,
    cancel: Receiver<()>,
}

impl Worker {
    fn run(self) {
        self.set_state(SubscriberState::Connecting);
        match self.connect() {
            Ok(conn) => {
                info!("notification channel connected");
                self.set_state(SubscriberState::Connected);
                self.refresh.refresh();
                if let Flow::Cancelled = self.serve(conn) {
                    return;
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in = ?self.policy.startup_retry_delay,
                    "could not connect to notification channel"
                );
                self.set_state(SubscriberState::Disconnected);
                if let Flow::Cancelled = self.sleep(self.policy.startup_retry_delay) {
                    return;
                }
            }
        }

        loop {
            match self.reconnect() {
                Reconnect::Connected(conn) => {
                    if let Flow::Cancelled = self.serve(conn) {
                        return;
                    }
                }
                Reconnect::GaveUp => {
                    warn!(
                        attempts = self.policy.max_attempts,
                        "giving up on notification channel"
                    );
                    self.set_state(SubscriberState::GaveUp);
                    return;
                }
                Reconnect::Cancelled => return,
            }
        }
    }

    /// Refresh on notifications until the connection closes.
    fn serve(&self, conn: Connection) -> Flow {
        loop {
            let poll = match self.policy.poll_interval {
                Some(interval) => after(interval),
                None => never(),
            };

            let event = select! {
                recv(conn.receiver()) -> event => Some(event),
                recv(self.cancel) -> _ => return Flow::Cancelled,
                recv(poll) -> _ => None,
            };

            match event {
                Some(Ok(HubEvent::DataChanged)) => {
                    self.set_state(SubscriberState::Refreshing);
                    self.refresh.refresh();
                    self.set_state(SubscriberState::Connected);
                }
                Some(Ok(HubEvent::Closed { reason })) => {
                    info!(?reason, "notification channel closed");
                    break;
                }
                Some(Err(_)) => {
                    info!("notification channel dropped");
                    break;
                }
                None => {
                    debug!("periodic refresh");
                    self.refresh.refresh();
                }
            }
        }

        drop(conn);
        self.set_state(SubscriberState::Disconnected);
        Flow::Continue
    }

    /// The bounded reconnect loop.
    fn reconnect(&self) -> Reconnect {
        self.refresh.refresh();

        let max = self.policy.max_attempts;
        for attempt in 1..=max {
            self.set_state(SubscriberState::Reconnecting { attempt });

            match self.connect() {
                Ok(conn) => {
                    info!(attempt, "notification channel reconnected");
                    self.set_state(SubscriberState::Connected);
                    self.refresh.refresh();
                    return Reconnect::Connected(conn);
                }
                Err(e) => {
                    warn!(attempt, max, error = %e, "reconnect attempt failed");
                    self.refresh.refresh();
                    if attempt < max {
                        if let Flow::Cancelled = self.sleep(self.policy.attempt_delay) {
                            return Reconnect::Cancelled;
                        }
                    }
                }
            }
        }

        Reconnect::GaveUp
    }

    fn connect(&self) -> Result<Connection, crate::error::ChannelError> {
        self.shared.connect_attempts.fetch_add(1, Ordering::SeqCst);
        self.transport.connect()
    }

    /// Sleep unless cancelled first.
    fn sleep(&self, duration: Duration) -> Flow {
        select! {
            recv(self.cancel) -> _ => Flow::Cancelled,
            recv(after(duration)) -> _ => Flow::Continue,
        }
    }

    fn set_state(&self, state: SubscriberState) {
        *self.shared.state.write() = state;
    }
}
