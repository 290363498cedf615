//! Sync coordinator: composes the server connection, the local relay and a
//! subscriber registry behind one start/stop surface.
//!
//! Inbound messages from both sources funnel through a single dispatch task,
//! so subscribers see one serialized stream. Messages received from the
//! server are additionally forwarded onto the relay, which lets one
//! connected context keep its local siblings fresh. Outbound notifications
//! dual-write: the connection when open (for other devices) and the relay
//! unconditionally (for sibling contexts), fire-and-forget on both paths.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::connection::{ConnectionConfig, SyncConnection, Visibility};
use super::message::{ItemAction, OwnerType, SyncMessage};
use super::relay::{RelayChannel, RelayHub, items_channel_name};
use super::transport::TransportConnector;
use crate::session::SessionContext;

/// Registry of sync subscribers, dispatched in registration order.
#[derive(Default)]
struct SubscriberRegistry {
    entries: Mutex<Vec<(u64, mpsc::UnboundedSender<SyncMessage>)>>,
    next_id: AtomicU64,
}

impl SubscriberRegistry {
    fn add(&self) -> (u64, mpsc::UnboundedReceiver<SyncMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((id, tx));
        }
        (id, rx)
    }

    fn remove(&self, id: u64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(entry_id, _)| *entry_id != id);
        }
    }

    /// Deliver to every live subscriber in registration order, pruning
    /// entries whose receiving side is gone.
    fn dispatch(&self, message: &SyncMessage) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.retain(|(_, tx)| tx.send(message.clone()).is_ok());
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
    }
}

/// A registered sync subscriber.
///
/// Dropping the subscription unregisters it lazily on the next dispatch;
/// [`unsubscribe`](SyncSubscription::unsubscribe) removes it immediately.
pub struct SyncSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SyncMessage>,
    registry: Arc<SubscriberRegistry>,
}

impl SyncSubscription {
    /// Next sync message.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        self.rx.recv().await
    }

    /// Remove this subscriber from the registry.
    pub fn unsubscribe(self) {
        self.registry.remove(self.id);
    }
}

enum Inbound {
    /// Received over the server connection: dispatch, then forward to the
    /// relay so sibling contexts hear about it too.
    Server(SyncMessage),
    /// Received from a sibling context: dispatch only.
    Relay(SyncMessage),
}

struct PumpTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Coordinates item sync for one client context.
///
/// Collaborators are injected: the transport connector (real or scripted),
/// the session holding credentials, the platform visibility signal, and the
/// optional relay capability.
pub struct SyncCoordinator {
    session: Arc<SessionContext>,
    connection: SyncConnection,
    relay_hub: Option<Arc<RelayHub>>,
    relay: Arc<Mutex<Option<RelayChannel>>>,
    subscribers: Arc<SubscriberRegistry>,
    events_tx: mpsc::UnboundedSender<Inbound>,
    pump: Mutex<Option<PumpTask>>,
}

impl SyncCoordinator {
    /// Build a coordinator. Must be called from a Tokio runtime; the
    /// dispatch task starts immediately, the connection does not.
    pub fn new(
        config: ConnectionConfig,
        connector: Arc<dyn TransportConnector>,
        session: Arc<SessionContext>,
        visibility: watch::Receiver<Visibility>,
        relay_hub: Option<Arc<RelayHub>>,
    ) -> Self {
        let subscribers = Arc::new(SubscriberRegistry::default());
        let relay = Arc::new(Mutex::new(None));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (conn_tx, conn_rx) = mpsc::unbounded_channel();

        let connection = SyncConnection::new(
            config,
            connector,
            Arc::clone(&session),
            visibility,
            conn_tx,
        );

        tokio::spawn(forward_server_messages(conn_rx, events_tx.clone()));
        tokio::spawn(run_dispatch(
            events_rx,
            Arc::clone(&subscribers),
            Arc::clone(&relay),
        ));

        Self {
            session,
            connection,
            relay_hub,
            relay,
            subscribers,
            events_tx,
            pump: Mutex::new(None),
        }
    }

    /// Start syncing: bind the relay channel for the current organization
    /// and open the server connection. Idempotent.
    pub fn start(&self) {
        self.bind_relay();
        self.connection.connect();
    }

    /// Stop syncing: close the connection, detach from the relay. Idempotent
    /// and safe when `start()` was never called.
    pub async fn stop(&self) {
        self.connection.stop().await;
        let pump = {
            match self.pump.lock() {
                Ok(mut slot) => slot.take(),
                Err(_) => None,
            }
        };
        if let Some(pump) = pump {
            let _ = pump.shutdown.send(true);
            let _ = pump.handle.await;
        }
        if let Ok(mut relay) = self.relay.lock() {
            *relay = None;
        }
    }

    /// Register a subscriber for inbound sync messages.
    ///
    /// Subscribers registered earlier are always notified earlier.
    pub fn subscribe(&self) -> SyncSubscription {
        let (id, rx) = self.subscribers.add();
        SyncSubscription {
            id,
            rx,
            registry: Arc::clone(&self.subscribers),
        }
    }

    /// Announce a local mutation to peers.
    ///
    /// The message carries no user id: it says "this scope changed", and
    /// each receiver applies its own identity when deciding whether to act.
    /// Sent over the connection only while open; posted to the relay
    /// regardless of connection state. Fire-and-forget on both paths, and
    /// never delivered back to this context's own subscribers.
    pub fn notify_change(
        &self,
        action: ItemAction,
        parent_id: impl Into<String>,
        owner_type: OwnerType,
    ) {
        let message = SyncMessage::items_changed(action, parent_id, owner_type);
        self.connection.send(message.clone());
        if let Ok(relay) = self.relay.lock() {
            if let Some(channel) = relay.as_ref() {
                channel.post(message);
            }
        }
    }

    /// The local user's identity from the session credential; `None` when
    /// the credential is missing or not JWT-shaped.
    pub fn user_id(&self) -> Option<String> {
        self.session.user_id()
    }

    /// Observable connection state of the server connection.
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connection.connected()
    }

    /// Whether the server connection is currently open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    fn bind_relay(&self) {
        let Some(hub) = self.relay_hub.as_ref() else {
            log::debug!("[Coordinator] No relay capability, skipping cross-tab sync");
            return;
        };
        let Some(org_id) = self.session.org_id() else {
            log::debug!("[Coordinator] No organization in session, relay not bound");
            return;
        };
        let Ok(mut pump_slot) = self.pump.lock() else {
            return;
        };
        if pump_slot.is_some() {
            return;
        }
        let channel = hub.channel(&items_channel_name(&org_id));
        let subscription = channel.subscribe();
        if let Ok(mut relay) = self.relay.lock() {
            *relay = Some(channel);
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_relay_pump(
            subscription,
            self.events_tx.clone(),
            shutdown_rx,
        ));
        *pump_slot = Some(PumpTask {
            shutdown: shutdown_tx,
            handle,
        });
    }
}

async fn forward_server_messages(
    mut conn_rx: mpsc::UnboundedReceiver<SyncMessage>,
    events_tx: mpsc::UnboundedSender<Inbound>,
) {
    while let Some(message) = conn_rx.recv().await {
        if events_tx.send(Inbound::Server(message)).is_err() {
            break;
        }
    }
}

async fn run_relay_pump(
    mut subscription: super::relay::RelaySubscription,
    events_tx: mpsc::UnboundedSender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            message = subscription.recv() => {
                match message {
                    Some(message) => {
                        if events_tx.send(Inbound::Relay(message)).is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

async fn run_dispatch(
    mut events_rx: mpsc::UnboundedReceiver<Inbound>,
    subscribers: Arc<SubscriberRegistry>,
    relay: Arc<Mutex<Option<RelayChannel>>>,
) {
    while let Some(event) = events_rx.recv().await {
        match event {
            Inbound::Server(message) => {
                if !dispatchable(&message) {
                    continue;
                }
                subscribers.dispatch(&message);
                if let Ok(relay) = relay.lock() {
                    if let Some(channel) = relay.as_ref() {
                        channel.post(message);
                    }
                }
            }
            Inbound::Relay(message) => {
                if !dispatchable(&message) {
                    continue;
                }
                subscribers.dispatch(&message);
            }
        }
    }
}

fn dispatchable(message: &SyncMessage) -> bool {
    match message {
        SyncMessage::ItemsChanged { .. } => true,
        SyncMessage::Other => {
            log::debug!("[Coordinator] Dropping unrecognized sync message");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change() -> SyncMessage {
        SyncMessage::items_changed(ItemAction::Update, "f1", OwnerType::Org)
    }

    #[tokio::test]
    async fn test_dispatch_reaches_all_subscribers() {
        let registry = SubscriberRegistry::default();
        let (_id_a, mut rx_a) = registry.add();
        let (_id_b, mut rx_b) = registry.add();

        registry.dispatch(&change());
        assert_eq!(rx_a.recv().await.unwrap(), change());
        assert_eq!(rx_b.recv().await.unwrap(), change());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned_on_dispatch() {
        let registry = SubscriberRegistry::default();
        let (_id_a, rx_a) = registry.add();
        let (_id_b, mut rx_b) = registry.add();
        drop(rx_a);

        registry.dispatch(&change());
        assert_eq!(registry.len(), 1);
        assert_eq!(rx_b.recv().await.unwrap(), change());
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let registry = Arc::new(SubscriberRegistry::default());
        let (id, rx) = registry.add();
        let subscription = SyncSubscription {
            id,
            rx,
            registry: Arc::clone(&registry),
        };
        subscription.unsubscribe();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_unknown_messages_are_not_dispatchable() {
        assert!(!dispatchable(&SyncMessage::Other));
        assert!(dispatchable(&change()));
    }
}
