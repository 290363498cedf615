//! Same-process broadcast relay: the cross-tab message bus.
//!
//! Each embedding context ("tab") opens a [`RelayChannel`] on an org-scoped
//! channel name of a shared [`RelayHub`]. Posting fans the message out to
//! every other context on the same name; a context never receives its own
//! posts. No network is involved, so relay delivery keeps working while the
//! server connection is down.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::broadcast;

use super::message::SyncMessage;

/// Broadcast channel name for an organization's item changes.
pub fn items_channel_name(org_id: &str) -> String {
    format!("items-sync-{}", org_id)
}

#[derive(Debug, Clone)]
struct Envelope {
    origin: u64,
    message: SyncMessage,
}

/// Registry of named broadcast channels shared by every context in a
/// process.
///
/// The hub is the injected relay capability: embedders that cannot provide
/// one (no shared process, no bus) simply pass `None` to the coordinator and
/// cross-tab delivery degrades to a no-op.
pub struct RelayHub {
    channels: Mutex<HashMap<String, broadcast::Sender<Envelope>>>,
    next_origin: AtomicU64,
}

impl RelayHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            next_origin: AtomicU64::new(1),
        }
    }

    /// Open a channel handle on `name`, creating the channel on first use.
    ///
    /// Every handle gets a distinct origin id, which is what filters a
    /// context's own posts out of its subscriptions.
    pub fn channel(&self, name: &str) -> RelayChannel {
        let origin = self.next_origin.fetch_add(1, Ordering::Relaxed);
        let tx = {
            let mut channels = match self.channels.lock() {
                Ok(channels) => channels,
                Err(poisoned) => poisoned.into_inner(),
            };
            channels
                .entry(name.to_string())
                .or_insert_with(|| broadcast::channel(256).0)
                .clone()
        };
        RelayChannel { origin, tx }
    }
}

impl Default for RelayHub {
    fn default() -> Self {
        Self::new()
    }
}

/// One context's handle on a relay channel.
pub struct RelayChannel {
    origin: u64,
    tx: broadcast::Sender<Envelope>,
}

impl RelayChannel {
    /// Post a message to every other context on this channel.
    ///
    /// Having no listeners is not an error; the post is simply dropped.
    pub fn post(&self, message: SyncMessage) {
        let _ = self.tx.send(Envelope {
            origin: self.origin,
            message,
        });
    }

    /// Subscribe to messages posted by other contexts on this channel.
    pub fn subscribe(&self) -> RelaySubscription {
        RelaySubscription {
            origin: self.origin,
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of a relay channel, filtered to other contexts' posts.
pub struct RelaySubscription {
    origin: u64,
    rx: broadcast::Receiver<Envelope>,
}

impl RelaySubscription {
    /// Next message from a sibling context; `None` once the channel is gone.
    ///
    /// A lagged receiver skips ahead: a missed change signal costs at most
    /// one refetch, which the next signal triggers anyway.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) if envelope.origin == self.origin => continue,
                Ok(envelope) => return Some(envelope.message),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("[Relay] Receiver lagged, skipped {} messages", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::message::{ItemAction, OwnerType};
    use std::time::Duration;

    fn created_in(parent_id: &str) -> SyncMessage {
        SyncMessage::items_changed(ItemAction::Create, parent_id, OwnerType::Org)
    }

    #[tokio::test]
    async fn test_post_reaches_sibling_context() {
        let hub = RelayHub::new();
        let a = hub.channel("items-sync-org1");
        let b = hub.channel("items-sync-org1");
        let mut sub_b = b.subscribe();

        a.post(created_in("f1"));
        let received = sub_b.recv().await.unwrap();
        assert_eq!(received, created_in("f1"));
    }

    #[tokio::test]
    async fn test_own_posts_are_filtered_out() {
        let hub = RelayHub::new();
        let a = hub.channel("items-sync-org1");
        let b = hub.channel("items-sync-org1");
        let mut sub_a = a.subscribe();

        a.post(created_in("mine"));
        b.post(created_in("theirs"));
        // The first message sub_a sees must be b's, not a's own post.
        let received = sub_a.recv().await.unwrap();
        assert_eq!(received, created_in("theirs"));
    }

    #[tokio::test]
    async fn test_channels_are_isolated_by_name() {
        let hub = RelayHub::new();
        let org1 = hub.channel(&items_channel_name("org1"));
        let org2 = hub.channel(&items_channel_name("org2"));
        let mut sub2 = org2.subscribe();

        org1.post(created_in("f1"));
        let result = tokio::time::timeout(Duration::from_millis(20), sub2.recv()).await;
        assert!(result.is_err(), "message crossed organization channels");
    }

    #[tokio::test]
    async fn test_post_without_listeners_is_harmless() {
        let hub = RelayHub::new();
        let solo = hub.channel("items-sync-org1");
        solo.post(created_in("f1"));
    }

    #[tokio::test]
    async fn test_messages_arrive_in_post_order() {
        let hub = RelayHub::new();
        let a = hub.channel("items-sync-org1");
        let b = hub.channel("items-sync-org1");
        let mut sub_b = b.subscribe();

        for i in 0..5 {
            a.post(created_in(&format!("f{}", i)));
        }
        for i in 0..5 {
            assert_eq!(sub_b.recv().await.unwrap(), created_in(&format!("f{}", i)));
        }
    }

    #[test]
    fn test_channel_name_derivation() {
        assert_eq!(items_channel_name("org-9"), "items-sync-org-9");
    }
}
