//! Sync messages exchanged over the WebSocket connection and the local relay.
//!
//! A `SyncMessage` is a change signal, not a change delta: it tells peers that
//! a folder scope changed, and each peer refetches the authoritative state
//! instead of applying a patch. Duplicate delivery is harmless, which is what
//! allows the server path and the relay path to overlap.

use serde::{Deserialize, Serialize};

/// Mutation kind carried by an `items_changed` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ItemAction {
    /// A new item was created.
    Create,
    /// An existing item's fields changed.
    Update,
    /// An item was deleted.
    Delete,
    /// An item moved to a different parent folder.
    Move,
    /// An item switched between org and personal ownership.
    OwnershipChange,
}

/// Ownership scope of an item: shared with the organization or per-user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerType {
    /// Visible to every member of the organization.
    Org,
    /// Visible only to the owning user.
    Personal,
}

impl OwnerType {
    /// Wire name of the scope.
    pub fn as_str(self) -> &'static str {
        match self {
            OwnerType::Org => "org",
            OwnerType::Personal => "personal",
        }
    }
}

/// Message on the items sync channel.
///
/// Unknown `type` discriminators deserialize to `Other` so that protocol
/// additions never break older clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Items changed in a folder scope; receivers refetch if they display it.
    #[serde(rename_all = "camelCase")]
    ItemsChanged {
        /// What happened.
        action: ItemAction,
        /// Folder scope of the change (empty string = root).
        parent_id: String,
        /// Ownership scope of the affected item.
        owner_type: OwnerType,
        /// Acting user, set on personal-scope messages so other users can
        /// ignore changes they cannot see.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
    },
    /// Catch-all for message kinds this client does not know.
    #[serde(other)]
    Other,
}

impl SyncMessage {
    /// Build an `items_changed` notification without an acting user.
    pub fn items_changed(
        action: ItemAction,
        parent_id: impl Into<String>,
        owner_type: OwnerType,
    ) -> Self {
        SyncMessage::ItemsChanged {
            action,
            parent_id: parent_id.into(),
            owner_type,
            user_id: None,
        }
    }
}
